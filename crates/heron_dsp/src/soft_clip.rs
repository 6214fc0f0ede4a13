//! Output Soft Clipper
//!
//! Optional safety stage after the EQ chain. Large shelf or peak boosts can
//! push the output past 0 dBFS; this stage bends the excess into a smooth tanh
//! curve instead of clipping hard, and reports how much it pulled the signal
//! down so the host can show a gain-reduction meter.
//!
//! # Algorithm
//!
//! - Below threshold: linear (unity gain)
//! - Above threshold: `threshold + headroom * tanh(excess / headroom)`
//!
//! Output approaches but never exceeds +/-1.0.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use crate::meter::{db_to_gain, gain_to_db, SILENCE_DB};

/// Soft clipper shared between the control thread and the audio thread
///
/// Threshold and enable flag are atomics, so the control side can change them
/// while the audio side is processing.
pub struct SoftClipper {
    /// Threshold where soft clipping begins (linear, 0.0 to 1.0)
    /// Stored as f32 bits for atomic access
    threshold_bits: AtomicU32,
    enabled: AtomicBool,
}

impl SoftClipper {
    /// Create an enabled clipper with its threshold `threshold_db` below 0 dBFS
    pub fn new(threshold_db: f32) -> Self {
        Self {
            threshold_bits: AtomicU32::new(Self::threshold_from_db(threshold_db).to_bits()),
            enabled: AtomicBool::new(true),
        }
    }

    fn threshold_from_db(db: f32) -> f32 {
        db_to_gain(db.min(0.0))
    }

    pub fn set_threshold_db(&self, db: f32) {
        let linear = Self::threshold_from_db(db);
        self.threshold_bits.store(linear.to_bits(), Ordering::Relaxed);
    }

    /// Current threshold in linear scale
    pub fn threshold(&self) -> f32 {
        f32::from_bits(self.threshold_bits.load(Ordering::Relaxed))
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Relaxed);
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Relaxed)
    }

    /// Process a single sample
    #[inline]
    pub fn process_sample(&self, sample: f32) -> f32 {
        if !self.is_enabled() {
            return sample;
        }
        soft_clip(sample, self.threshold())
    }

    /// Process a buffer in-place
    ///
    /// Returns the deepest gain reduction applied to any sample, in dB (0.0 or
    /// negative), or `None` while disabled.
    ///
    /// # Real-time Safety
    /// No allocations, O(n) time.
    #[inline]
    pub fn process_block(&self, buffer: &mut [f32]) -> Option<f32> {
        if !self.is_enabled() {
            return None;
        }

        let threshold = self.threshold();
        let mut deepest = 0.0_f32;
        for sample in buffer.iter_mut() {
            let input = *sample;
            let output = soft_clip(input, threshold);
            if output != input {
                deepest = deepest.min(gain_to_db(output / input, SILENCE_DB));
            }
            *sample = output;
        }
        Some(deepest)
    }
}

impl Default for SoftClipper {
    fn default() -> Self {
        Self::new(-1.0)
    }
}

/// Tanh soft clip; continuous at the threshold and bounded by +/-1.0
#[inline]
fn soft_clip(sample: f32, threshold: f32) -> f32 {
    let abs_sample = sample.abs();
    if abs_sample <= threshold {
        return sample;
    }

    let excess = abs_sample - threshold;
    let headroom = 1.0 - threshold;
    // Avoid division by zero at a 0 dBFS threshold
    let normalized_excess = excess / headroom.max(0.001);
    let saturated_excess = headroom * normalized_excess.tanh();

    sample.signum() * (threshold + saturated_excess)
}
