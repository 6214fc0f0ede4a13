//! Analysis pipeline
//!
//! Runs on the analysis thread once per refresh tick:
//!
//! ```text
//! CaptureReader ──history──▶ SpectrumAnalyzer ──frames──▶ path builder
//!                                                             │
//!                                         [AnalysisPath ring] ◀┘
//!                                                             │
//!                                     latest spectrum path ◀──┘
//! ```
//!
//! The analytic response curve is rebuilt only when the published settings
//! generation (or the sample rate, or the display bounds) changed since the
//! last tick.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use heron_dsp::spectrum::FRAME_QUEUE_CAPACITY;
use heron_dsp::{
    path_from_analytic_response, path_from_magnitude, ring_buffer, AnalysisPath, CaptureReader,
    DisplayBounds, FftOrder, FilterChain, FilterSettings, RingConsumer, RingProducer,
    SpectrumAnalyzer,
};

use crate::config::{validate_display_bounds, AnalyzerConfig};
use crate::shared::{MeterReadings, SharedState};

/// Everything the display needs for one refresh
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnalysisFrame {
    /// Latest spectrum curve; `None` when no new audio was analysed this tick
    pub spectrum: Option<AnalysisPath>,
    /// Filter response curve; `None` when unchanged since the previous frame
    pub response: Option<AnalysisPath>,
    pub meters: MeterReadings,
    /// Capture blocks dropped so far under overload
    pub dropped_blocks: u64,
}

/// Tick-driven spectrum and response producer
pub struct AnalysisPipeline {
    shared: Arc<SharedState>,
    capture: CaptureReader,
    analyzer: SpectrumAnalyzer,
    paths_tx: RingProducer<AnalysisPath>,
    paths_rx: RingConsumer<AnalysisPath>,
    /// Mirror of the audio chain used only for the analytic response
    response_chain: FilterChain,
    bounds: DisplayBounds,
    last_generation: Option<u64>,
    last_sample_rate: u32,
    response_stale: bool,
    last_dropped: u64,
    /// Problem found during a tick, for the engine to report as an event
    pending_error: Option<String>,
}

impl AnalysisPipeline {
    pub(crate) fn new(
        shared: Arc<SharedState>,
        capture: CaptureReader,
        config: &AnalyzerConfig,
    ) -> Self {
        let (paths_tx, paths_rx) = ring_buffer(FRAME_QUEUE_CAPACITY);
        Self {
            shared,
            capture,
            analyzer: SpectrumAnalyzer::new(config.fft_order, config.floor_db),
            paths_tx,
            paths_rx,
            response_chain: FilterChain::new(),
            bounds: config.display_bounds(),
            last_generation: None,
            last_sample_rate: 0,
            response_stale: true,
            last_dropped: 0,
            pending_error: None,
        }
    }

    /// Run one refresh
    pub fn tick(&mut self) -> AnalysisFrame {
        let sample_rate = self.shared.sample_rate();

        if self.capture.drain_available() > 0 {
            self.analyzer.produce(self.capture.history());
        }

        let bin_width = self.analyzer.bin_width_hz(sample_rate as f32);
        let transform_length = self.analyzer.transform_length();
        let floor_db = self.analyzer.floor_db();
        while let Some(frame) = self.analyzer.next_frame() {
            let path = path_from_magnitude(&frame, self.bounds, transform_length, bin_width, floor_db);
            // Drained below every tick; a full queue just skips this path
            let _ = self.paths_tx.try_push(path);
        }
        let spectrum = self.paths_rx.drain_latest();

        let dropped_blocks = self.capture.dropped_blocks();
        if dropped_blocks > self.last_dropped {
            warn!(
                "Analysis fell behind: {} capture blocks dropped ({} total)",
                dropped_blocks - self.last_dropped,
                dropped_blocks
            );
            self.last_dropped = dropped_blocks;
        }

        AnalysisFrame {
            spectrum,
            response: self.refresh_response(sample_rate),
            meters: self.shared.meters.readings(),
            dropped_blocks,
        }
    }

    /// Rebuild the response path if anything it depends on changed
    fn refresh_response(&mut self, sample_rate: u32) -> Option<AnalysisPath> {
        let (settings, generation) = self.shared.settings.snapshot();
        let changed = self.response_stale
            || self.last_generation != Some(generation)
            || self.last_sample_rate != sample_rate;
        if !changed {
            return None;
        }

        self.last_generation = Some(generation);
        self.last_sample_rate = sample_rate;
        self.response_stale = false;

        let sample_rate = sample_rate as f32;
        if let Err(e) = self.response_chain.apply_settings(&settings, sample_rate) {
            // The processor starts bypassed in this case; draw what it plays
            warn!(
                "Response curve bypassed: generation {} invalid at {}Hz ({})",
                generation, sample_rate, e
            );
            self.pending_error = Some(format!(
                "Filter settings do not fit {}Hz ({}); EQ bypassed",
                sample_rate, e
            ));
            if let Err(e) = self
                .response_chain
                .apply_settings(&FilterSettings::all_bypassed(), sample_rate)
            {
                warn!("Failed to bypass response chain: {}", e);
            }
        }
        Some(path_from_analytic_response(
            &self.response_chain,
            self.bounds,
            sample_rate,
        ))
    }

    /// Switch transform length; the history window follows
    pub fn set_fft_order(&mut self, order: FftOrder) {
        if order == self.analyzer.order() {
            return;
        }
        self.analyzer.set_order(order);
        self.capture.resize_history(order.len());
        // Paths built at the old resolution are stale
        while self.paths_rx.try_pop().is_some() {}
        debug!("FFT order set to {} samples", order.len());
    }

    pub fn set_floor_db(&mut self, floor_db: f32) {
        self.analyzer.set_floor_db(floor_db);
    }

    /// Move or resize the display; the response curve is rebuilt next tick
    ///
    /// Bounds that fail `validate_display_bounds` are ignored.
    pub fn set_display_bounds(&mut self, bounds: DisplayBounds) {
        if let Err(e) = validate_display_bounds(&bounds) {
            warn!("Ignoring display bounds: {}", e);
            return;
        }
        if bounds != self.bounds {
            self.bounds = bounds;
            self.response_stale = true;
        }
    }

    /// Force the response curve into the next frame
    pub fn invalidate_response(&mut self) {
        self.response_stale = true;
    }

    /// Error raised by the last tick, if any
    pub fn take_error(&mut self) -> Option<String> {
        self.pending_error.take()
    }

    pub fn fft_order(&self) -> FftOrder {
        self.analyzer.order()
    }

    pub fn display_bounds(&self) -> DisplayBounds {
        self.bounds
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use heron_dsp::{channel_capture, BandSettings, CaptureWriter, CutSettings, Slope, SoftClipper};

    const FS: u32 = 48000;

    fn pipeline(config: AnalyzerConfig) -> (AnalysisPipeline, CaptureWriter, Arc<SharedState>) {
        let (shared, _receiver) =
            SharedState::new(FilterSettings::default(), FS, SoftClipper::default());
        let shared = Arc::new(shared);
        let (writer, reader) = channel_capture(
            config.capture_block_len,
            config.capture_capacity_blocks,
            config.fft_order.len(),
        )
        .unwrap();
        let pipeline = AnalysisPipeline::new(Arc::clone(&shared), reader, &config);
        (pipeline, writer, shared)
    }

    fn sine(freq: f32, len: usize) -> Vec<f32> {
        (0..len)
            .map(|i| (2.0 * std::f32::consts::PI * freq * i as f32 / FS as f32).sin() * 0.5)
            .collect()
    }

    #[test]
    fn test_first_tick_has_response_but_no_spectrum() {
        let (mut pipeline, _writer, _) = pipeline(AnalyzerConfig::default());
        let frame = pipeline.tick();

        assert!(frame.spectrum.is_none());
        let response = frame.response.unwrap();
        assert_eq!(response.len(), 600);
        assert_eq!(frame.dropped_blocks, 0);
    }

    #[test]
    fn test_response_only_when_settings_change() {
        let (mut pipeline, _writer, shared) = pipeline(AnalyzerConfig::default());
        assert!(pipeline.tick().response.is_some());
        assert!(pipeline.tick().response.is_none());

        let mut settings = FilterSettings::default();
        settings.peaks[2] = BandSettings::new(2500.0).with_gain(9.0);
        shared.settings.publish(settings);

        let response = pipeline.tick().response.unwrap();
        // Centre line is y = 150 for a 300 high display; the boost pulls points above it
        assert!(response.points().iter().any(|p| p[1] < 100.0));
        assert!(pipeline.tick().response.is_none());
    }

    #[test]
    fn test_bounds_and_sample_rate_changes_rebuild_response() {
        let (mut pipeline, _writer, shared) = pipeline(AnalyzerConfig::default());
        pipeline.tick();

        pipeline.set_display_bounds(DisplayBounds::new(0.0, 0.0, 300.0, 200.0));
        assert_eq!(pipeline.tick().response.unwrap().len(), 300);

        shared.set_sample_rate(96000);
        assert!(pipeline.tick().response.is_some());

        pipeline.invalidate_response();
        assert!(pipeline.tick().response.is_some());
    }

    #[test]
    fn test_response_bypassed_when_settings_do_not_fit_new_rate() {
        let (mut pipeline, _writer, shared) = pipeline(AnalyzerConfig::default());
        let mut settings = FilterSettings::default();
        settings.high_cut = CutSettings::new(18000.0, Slope::Db48);
        shared.settings.publish(settings);

        let cut = pipeline.tick().response.unwrap();
        // Steep cut drops the right edge far below the 150 centre line
        assert!(cut.points().iter().any(|p| p[1] > 200.0));
        assert_eq!(pipeline.take_error(), None);

        // 18 kHz is above Nyquist at 32 kHz; the processor plays bypassed
        shared.set_sample_rate(32000);
        let flat = pipeline.tick().response.unwrap();
        assert!(
            flat.points().iter().all(|p| (p[1] - 150.0).abs() < 0.01),
            "response must match the bypassed audio chain"
        );
        assert!(pipeline.take_error().is_some());
        assert_eq!(pipeline.take_error(), None);
    }

    #[test]
    fn test_invalid_display_bounds_ignored() {
        let (mut pipeline, _writer, _) = pipeline(AnalyzerConfig::default());
        pipeline.tick();
        pipeline.set_display_bounds(DisplayBounds::new(0.0, 0.0, 1.0e12, 300.0));
        assert_eq!(pipeline.display_bounds(), AnalyzerConfig::default().display_bounds());
        assert!(pipeline.tick().response.is_none());
    }

    #[test]
    fn test_spectrum_follows_captured_audio() {
        let (mut pipeline, mut writer, _) = pipeline(AnalyzerConfig::default());

        writer.push(&sine(1500.0, 1024));
        let frame = pipeline.tick();
        assert!(frame.spectrum.is_some(), "a path is built once any block arrives");

        writer.push(&sine(1500.0, 2048));
        let spectrum = pipeline.tick().spectrum.unwrap();
        assert_eq!(spectrum.len(), 1 + 512);

        // Loudest point sits near 1.5 kHz on the log axis
        let (x, _) = spectrum
            .points()
            .iter()
            .map(|p| (p[0], p[1]))
            .min_by(|a, b| a.1.total_cmp(&b.1))
            .unwrap();
        let expected = heron_dsp::path::map_from_log10(1500.0, 20.0, 20000.0) * 600.0;
        assert!((f64::from(x) - expected).abs() < 6.0, "peak at x={x}, expected {expected}");

        assert!(pipeline.tick().spectrum.is_none(), "no new audio, no new path");
    }

    #[test]
    fn test_fft_order_change_resizes_history() {
        let (mut pipeline, mut writer, _) = pipeline(AnalyzerConfig::default());
        pipeline.set_fft_order(FftOrder::Order4096);
        assert_eq!(pipeline.fft_order(), FftOrder::Order4096);

        writer.push(&sine(1000.0, 4096));
        let spectrum = pipeline.tick().spectrum.unwrap();
        assert_eq!(spectrum.len(), 1 + 1024);
    }

    #[test]
    fn test_overload_is_reported_not_fatal() {
        let config = AnalyzerConfig {
            capture_block_len: 256,
            capture_capacity_blocks: 4,
            ..AnalyzerConfig::default()
        };
        let (mut pipeline, mut writer, _) = pipeline(config);

        writer.push(&vec![0.1; 256 * 10]);
        let frame = pipeline.tick();
        assert_eq!(frame.dropped_blocks, 6);
        assert!(frame.spectrum.is_some());
    }

    #[test]
    fn test_frame_carries_meters() {
        let (mut pipeline, _writer, shared) = pipeline(AnalyzerConfig::default());
        shared.meters.store(MeterReadings {
            input_db: -12.0,
            gain_reduction_db: Some(-0.5),
            output_db: -9.0,
            output_rms_db: -12.0,
        });
        let meters = pipeline.tick().meters;
        assert_eq!(meters.input_db, -12.0);
        assert_eq!(meters.gain_reduction_db, Some(-0.5));
        assert_eq!(meters.output_db, -9.0);
    }
}
