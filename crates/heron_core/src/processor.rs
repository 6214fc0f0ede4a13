//! Audio-thread processor
//!
//! The half of the engine the host moves onto its audio callback. Per block:
//!
//! 1. Pick up a newly published settings snapshot, if any
//! 2. Meter the input
//! 3. Run every channel through its own filter chain
//! 4. Soft clip (when enabled) and meter the output
//! 5. Push a mono downmix into the capture queue for analysis
//!
//! # Real-time Safety
//!
//! `process` never allocates, locks or blocks, and never logs. `prepare` and
//! `release` bracket a stream and are allowed to allocate.

use std::sync::Arc;

use tracing::{debug, info, warn};

use heron_dsp::meter::{block_peak, block_rms, gain_to_db, SILENCE_DB};
use heron_dsp::{CaptureWriter, FilterChain, FilterSettings};

use crate::config::StreamConfig;
use crate::error::{EngineError, EngineResult};
use crate::shared::{MeterReadings, SettingsReceiver, SharedState};

/// Processes interleaved audio on the audio thread
pub struct AudioProcessor {
    shared: Arc<SharedState>,
    settings: SettingsReceiver,
    capture: CaptureWriter,
    /// One chain per channel; empty until prepared
    chains: Vec<FilterChain>,
    stream: Option<StreamConfig>,
    /// Settings currently designed into the chains
    applied: FilterSettings,
}

impl AudioProcessor {
    pub(crate) fn new(
        shared: Arc<SharedState>,
        settings: SettingsReceiver,
        capture: CaptureWriter,
    ) -> Self {
        Self {
            shared,
            settings,
            capture,
            chains: Vec::new(),
            stream: None,
            applied: FilterSettings::all_bypassed(),
        }
    }

    /// Fix sample rate and channel count for the coming stream
    ///
    /// Builds one chain per channel from the latest published settings. If
    /// those do not fit the new sample rate (e.g. a band above the new
    /// Nyquist), the chains start fully bypassed until valid settings arrive.
    pub fn prepare(&mut self, config: StreamConfig) -> EngineResult<()> {
        config.validate().map_err(EngineError::ConfigError)?;
        let sample_rate = config.sample_rate as f32;

        // Anything pending is covered by the snapshot below
        let _ = self.settings.take_pending();
        let (latest, generation) = self.shared.settings.snapshot();

        let settings = match latest.validate(sample_rate) {
            Ok(()) => latest,
            Err(e) => {
                warn!(
                    "Settings generation {} invalid at {}Hz ({}), starting bypassed",
                    generation, config.sample_rate, e
                );
                FilterSettings::all_bypassed()
            }
        };

        let mut chains = Vec::with_capacity(config.channels as usize);
        for _ in 0..config.channels {
            chains.push(FilterChain::with_settings(&settings, sample_rate)?);
        }

        self.chains = chains;
        self.applied = settings;
        self.stream = Some(config);
        self.shared.set_sample_rate(config.sample_rate);
        self.shared.meters.reset();

        info!(
            "Processor prepared: {}Hz, {} channels, {} frames ({:.1}ms)",
            config.sample_rate,
            config.channels,
            config.buffer_size,
            config.latency_ms()
        );
        Ok(())
    }

    /// End the stream; `process` passes audio through until the next `prepare`
    pub fn release(&mut self) {
        if self.stream.take().is_some() {
            self.chains.clear();
            self.shared.meters.reset();
            debug!("Processor released");
        }
    }

    /// Process one interleaved buffer in place
    ///
    /// Unprepared processors leave the buffer untouched.
    ///
    /// # Real-time Safety
    /// No allocations, no locks, no logging, O(n) time.
    pub fn process(&mut self, buffer: &mut [f32]) {
        let Some(stream) = self.stream else {
            return;
        };
        let channels = stream.channels as usize;

        self.pick_up_settings(stream.sample_rate as f32);

        let input_db = gain_to_db(block_peak(buffer), SILENCE_DB);

        for frame in buffer.chunks_mut(channels) {
            for (sample, chain) in frame.iter_mut().zip(self.chains.iter_mut()) {
                *sample = chain.process_sample(*sample);
            }
        }

        let gain_reduction_db = self.shared.clipper.process_block(buffer);
        let output_db = gain_to_db(block_peak(buffer), SILENCE_DB);

        let scale = 1.0 / channels as f32;
        for frame in buffer.chunks(channels) {
            let mono: f32 = frame.iter().sum::<f32>() * scale;
            self.capture.push_sample(mono);
        }

        self.shared.meters.store(MeterReadings {
            input_db,
            gain_reduction_db,
            output_db,
            output_rms_db: gain_to_db(block_rms(buffer), SILENCE_DB),
        });
    }

    /// Apply the pending snapshot to every chain, or none of them
    #[inline]
    fn pick_up_settings(&mut self, sample_rate: f32) {
        let Some(settings) = self.settings.take_pending() else {
            return;
        };
        // Published snapshots were checked against this rate; re-check in
        // case a prepare at a different rate raced the publish.
        if settings.validate(sample_rate).is_err() {
            return;
        }
        for chain in &mut self.chains {
            if chain.apply_settings(&settings, sample_rate).is_err() {
                return;
            }
        }
        self.applied = settings;
    }

    pub fn is_prepared(&self) -> bool {
        self.stream.is_some()
    }

    pub fn stream_config(&self) -> Option<StreamConfig> {
        self.stream
    }

    /// Settings currently designed into the chains
    pub fn applied_settings(&self) -> &FilterSettings {
        &self.applied
    }

    /// Filter chain for one channel
    pub fn chain(&self, channel: usize) -> Option<&FilterChain> {
        self.chains.get(channel)
    }

    /// Capture blocks dropped because the analysis side fell behind
    pub fn dropped_blocks(&self) -> u64 {
        self.capture.dropped_blocks()
    }
}
