//! State shared between the control, audio and analysis threads
//!
//! Everything the audio thread touches here is wait-free: atomics, and the
//! output half of a triple buffer it owns outright.

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use triple_buffer::{Input, Output, TripleBuffer};

use heron_dsp::meter::SILENCE_DB;
use heron_dsp::{FilterSettings, SoftClipper};

/// Latest published filter settings, control side
///
/// Writers are serialized by a lock that only the control and analysis
/// threads take. Each publish also writes the snapshot into a triple buffer
/// whose output half, the `SettingsReceiver`, belongs to the audio thread.
pub struct SettingsCell {
    writer: Mutex<SettingsWriter>,
    generation: AtomicU64,
}

struct SettingsWriter {
    latest: FilterSettings,
    input: Input<FilterSettings>,
}

/// Audio-thread end of the settings handoff
///
/// Owned by the processor; nothing else can read from it.
pub struct SettingsReceiver {
    output: Output<FilterSettings>,
}

impl SettingsCell {
    /// Create the cell and the receiver the audio thread will own
    pub fn new(initial: FilterSettings) -> (Self, SettingsReceiver) {
        let (input, output) = TripleBuffer::new(&initial).split();
        let cell = Self {
            writer: Mutex::new(SettingsWriter {
                latest: initial,
                input,
            }),
            generation: AtomicU64::new(0),
        };
        (cell, SettingsReceiver { output })
    }

    /// Replace the snapshot; the audio thread sees it from its next block
    pub fn publish(&self, settings: FilterSettings) -> u64 {
        let mut writer = self.writer.lock();
        writer.latest = settings;
        writer.input.write(settings);
        self.generation.fetch_add(1, Ordering::AcqRel) + 1
    }

    /// Current snapshot and its generation, read consistently
    ///
    /// Blocks briefly on the writer lock; not for the audio thread.
    pub fn snapshot(&self) -> (FilterSettings, u64) {
        let writer = self.writer.lock();
        (writer.latest, self.generation.load(Ordering::Acquire))
    }

    /// Number of snapshots published so far
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }
}

impl SettingsReceiver {
    /// The newest snapshot published since the last pickup, if any
    ///
    /// Intermediate publishes are skipped; only the latest one is returned.
    ///
    /// # Real-time Safety
    /// Never blocks, never locks, never allocates.
    #[inline]
    pub fn take_pending(&mut self) -> Option<FilterSettings> {
        if !self.output.updated() {
            return None;
        }
        Some(*self.output.read())
    }

    /// Whether a publish is waiting to be picked up
    pub fn is_pending(&self) -> bool {
        self.output.updated()
    }
}

/// Meter values as seen by the display
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MeterReadings {
    /// Peak level entering the chain (dBFS)
    pub input_db: f32,
    /// Deepest soft-clip gain reduction in the last block (dB, <= 0); `None` while the clipper is off
    pub gain_reduction_db: Option<f32>,
    /// Peak level leaving the processor (dBFS)
    pub output_db: f32,
    /// RMS level leaving the processor (dBFS)
    pub output_rms_db: f32,
}

impl Default for MeterReadings {
    fn default() -> Self {
        Self {
            input_db: SILENCE_DB,
            gain_reduction_db: None,
            output_db: SILENCE_DB,
            output_rms_db: SILENCE_DB,
        }
    }
}

/// Last-block meter values written by the audio thread
///
/// Rust pattern: AtomicF32 doesn't exist, so values are stored as f32 bits.
/// A NaN gain reduction stands for "clipper disabled".
pub struct Meters {
    input_bits: AtomicU32,
    gain_reduction_bits: AtomicU32,
    output_bits: AtomicU32,
    output_rms_bits: AtomicU32,
}

impl Meters {
    pub fn new() -> Self {
        Self {
            input_bits: AtomicU32::new(SILENCE_DB.to_bits()),
            gain_reduction_bits: AtomicU32::new(f32::NAN.to_bits()),
            output_bits: AtomicU32::new(SILENCE_DB.to_bits()),
            output_rms_bits: AtomicU32::new(SILENCE_DB.to_bits()),
        }
    }

    #[inline]
    pub fn store(&self, readings: MeterReadings) {
        // Relaxed is enough: each value stands alone
        self.input_bits
            .store(readings.input_db.to_bits(), Ordering::Relaxed);
        self.gain_reduction_bits.store(
            readings.gain_reduction_db.unwrap_or(f32::NAN).to_bits(),
            Ordering::Relaxed,
        );
        self.output_bits
            .store(readings.output_db.to_bits(), Ordering::Relaxed);
        self.output_rms_bits
            .store(readings.output_rms_db.to_bits(), Ordering::Relaxed);
    }

    pub fn readings(&self) -> MeterReadings {
        let gain_reduction = f32::from_bits(self.gain_reduction_bits.load(Ordering::Relaxed));
        MeterReadings {
            input_db: f32::from_bits(self.input_bits.load(Ordering::Relaxed)),
            gain_reduction_db: (!gain_reduction.is_nan()).then_some(gain_reduction),
            output_db: f32::from_bits(self.output_bits.load(Ordering::Relaxed)),
            output_rms_db: f32::from_bits(self.output_rms_bits.load(Ordering::Relaxed)),
        }
    }

    pub fn reset(&self) {
        self.store(MeterReadings::default());
    }
}

impl Default for Meters {
    fn default() -> Self {
        Self::new()
    }
}

/// Everything the engine handle, processor and analysis pipeline share
pub struct SharedState {
    pub settings: SettingsCell,
    pub meters: Meters,
    pub clipper: SoftClipper,
    /// Rate the processor was last prepared at (Hz)
    sample_rate: AtomicU32,
}

impl SharedState {
    /// Shared state plus the settings receiver for the processor
    pub fn new(
        initial: FilterSettings,
        sample_rate: u32,
        clipper: SoftClipper,
    ) -> (Self, SettingsReceiver) {
        let (settings, receiver) = SettingsCell::new(initial);
        let shared = Self {
            settings,
            meters: Meters::new(),
            clipper,
            sample_rate: AtomicU32::new(sample_rate),
        };
        (shared, receiver)
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate.load(Ordering::Acquire)
    }

    pub fn set_sample_rate(&self, sample_rate: u32) {
        self.sample_rate.store(sample_rate, Ordering::Release);
    }
}
