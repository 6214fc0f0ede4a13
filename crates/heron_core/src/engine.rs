//! EQ Engine Controller
//!
//! `Equalizer` is the control-thread handle. It is created together with the
//! `AudioProcessor` the host moves onto its audio callback:
//!
//! ```text
//! control thread                audio thread               analysis thread
//! Equalizer::publish ──cell──▶ AudioProcessor::process
//!                                   │ capture blocks
//!                                   └──────────────────────▶ AnalysisPipeline::tick
//! Equalizer::poll_event ◀──────────────── Event::Analysis ◀──────┘
//! ```
//!
//! Teardown order: `shutdown()` stops and joins the analysis thread first;
//! the host then drops the processor.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{bounded, unbounded, Receiver, RecvTimeoutError, Sender};
use tracing::{debug, error, info, warn};

use heron_dsp::{channel_capture, DisplayBounds, FftOrder, FilterSettings, SoftClipper};

use crate::analysis::{AnalysisFrame, AnalysisPipeline};
use crate::config::{validate_display_bounds, EngineConfig};
use crate::error::{EngineError, EngineResult};
use crate::message::{Command, Event};
use crate::processor::AudioProcessor;
use crate::shared::{MeterReadings, SharedState};

/// The main EQ engine controller
///
/// Lives on the control/UI thread. Settings go to the audio thread through
/// the shared settings cell; analysis runs on its own thread once started.
pub struct Equalizer {
    shared: Arc<SharedState>,

    /// Pipeline parked here while the analysis thread is not running
    pipeline: Option<AnalysisPipeline>,

    /// Channel for sending commands to the analysis thread
    command_sender: Option<Sender<Command>>,

    /// Events from the analysis thread
    event_sender: Sender<Event>,
    event_receiver: Receiver<Event>,

    /// Handle to the analysis thread; hands the pipeline back when joined
    analysis_thread: Option<JoinHandle<AnalysisPipeline>>,

    /// Flag to signal shutdown
    shutdown_flag: Arc<AtomicBool>,

    /// Whether the analysis thread is running
    is_running: Arc<AtomicBool>,

    config: EngineConfig,
}

impl Equalizer {
    /// Build the engine handle and its audio-thread processor
    pub fn new(config: EngineConfig) -> EngineResult<(Self, AudioProcessor)> {
        config.validate().map_err(EngineError::ConfigError)?;
        let analyzer = &config.analyzer;

        let clipper = SoftClipper::new(analyzer.soft_clip_threshold_db);
        clipper.set_enabled(analyzer.soft_clip_enabled);
        let (shared, settings_receiver) =
            SharedState::new(FilterSettings::default(), config.stream.sample_rate, clipper);
        let shared = Arc::new(shared);

        let (writer, reader) = channel_capture(
            analyzer.capture_block_len,
            analyzer.capture_capacity_blocks,
            analyzer.fft_order.len(),
        )?;
        let pipeline = AnalysisPipeline::new(Arc::clone(&shared), reader, analyzer);
        let processor = AudioProcessor::new(Arc::clone(&shared), settings_receiver, writer);

        let (event_sender, event_receiver) = unbounded::<Event>();

        debug!(
            "Equalizer created: {}Hz, FFT {}, capture {}x{} samples",
            config.stream.sample_rate,
            analyzer.fft_order.len(),
            analyzer.capture_capacity_blocks,
            analyzer.capture_block_len
        );

        let engine = Self {
            shared,
            pipeline: Some(pipeline),
            command_sender: None,
            event_sender,
            event_receiver,
            analysis_thread: None,
            shutdown_flag: Arc::new(AtomicBool::new(false)),
            is_running: Arc::new(AtomicBool::new(false)),
            config,
        };
        Ok((engine, processor))
    }

    /// Replace the filter settings
    ///
    /// Validated against the current sample rate; on success the audio thread
    /// applies the snapshot before its next block. Rejected settings leave
    /// everything as it was.
    pub fn publish(&self, settings: FilterSettings) -> EngineResult<()> {
        let sample_rate = self.shared.sample_rate();
        if let Err(e) = settings.validate(sample_rate as f32) {
            warn!("Rejected filter settings at {}Hz: {}", sample_rate, e);
            return Err(e.into());
        }
        let generation = self.shared.settings.publish(settings);
        debug!("Published filter settings generation {}", generation);
        Ok(())
    }

    /// Latest published settings
    pub fn settings(&self) -> FilterSettings {
        self.shared.settings.snapshot().0
    }

    /// Number of settings snapshots published so far
    pub fn settings_generation(&self) -> u64 {
        self.shared.settings.generation()
    }

    /// Spawn the analysis thread
    pub fn start_analysis(&mut self) -> EngineResult<()> {
        if self.analysis_thread.is_some() {
            return Err(EngineError::AlreadyRunning);
        }
        let pipeline = self
            .pipeline
            .take()
            .ok_or_else(|| EngineError::ConfigError("Analysis pipeline unavailable".into()))?;

        let (command_sender, command_receiver) = bounded::<Command>(32);
        self.shutdown_flag.store(false, Ordering::SeqCst);
        self.is_running.store(true, Ordering::SeqCst);

        // Clone for analysis thread
        let event_sender = self.event_sender.clone();
        let shutdown_clone = Arc::clone(&self.shutdown_flag);
        let running_clone = Arc::clone(&self.is_running);
        let period = self.config.analyzer.tick_period();

        let handle = thread::Builder::new()
            .name("heron-analysis".into())
            .spawn(move || {
                Self::analysis_thread_main(
                    pipeline,
                    command_receiver,
                    event_sender,
                    shutdown_clone,
                    running_clone,
                    period,
                )
            })
            .map_err(|e| {
                self.is_running.store(false, Ordering::SeqCst);
                EngineError::ThreadSpawn(e.to_string())
            })?;

        self.command_sender = Some(command_sender);
        self.analysis_thread = Some(handle);
        Ok(())
    }

    /// Stop and join the analysis thread
    ///
    /// The pipeline is kept, so `start_analysis` can be called again.
    pub fn shutdown(&mut self) -> EngineResult<()> {
        let handle = self.analysis_thread.take().ok_or(EngineError::NotRunning)?;

        // Signal shutdown
        self.shutdown_flag.store(true, Ordering::SeqCst);
        if let Some(sender) = self.command_sender.take() {
            let _ = sender.send(Command::Shutdown);
        }

        match handle.join() {
            Ok(pipeline) => self.pipeline = Some(pipeline),
            Err(_) => error!("Analysis thread panicked; analysis cannot be restarted"),
        }
        self.is_running.store(false, Ordering::SeqCst);
        Ok(())
    }

    /// Run one analysis tick on the calling thread
    ///
    /// For hosts that drive refreshes from their own timer instead of the
    /// analysis thread. Fails while the thread is running.
    pub fn analyze_now(&mut self) -> EngineResult<AnalysisFrame> {
        self.pipeline
            .as_mut()
            .map(AnalysisPipeline::tick)
            .ok_or(EngineError::AlreadyRunning)
    }

    /// Check if the analysis thread is running
    pub fn is_running(&self) -> bool {
        self.is_running.load(Ordering::SeqCst)
    }

    /// Change spectrum transform length
    pub fn set_fft_order(&mut self, order: FftOrder) -> EngineResult<()> {
        match self.pipeline.as_mut() {
            Some(pipeline) => {
                pipeline.set_fft_order(order);
                Ok(())
            }
            None => self.send_command(Command::SetFftOrder(order)),
        }
    }

    /// Change the spectrum floor (dB, negative)
    pub fn set_floor_db(&mut self, floor_db: f32) -> EngineResult<()> {
        if !floor_db.is_finite() || floor_db >= 0.0 {
            return Err(EngineError::ConfigError(format!(
                "Invalid floor: {}dB",
                floor_db
            )));
        }
        match self.pipeline.as_mut() {
            Some(pipeline) => {
                pipeline.set_floor_db(floor_db);
                Ok(())
            }
            None => self.send_command(Command::SetFloorDb(floor_db)),
        }
    }

    /// Move or resize the display area
    ///
    /// Rejects non-finite or non-positive sizes and edges longer than
    /// `MAX_DISPLAY_DIMENSION`.
    pub fn set_display_bounds(&mut self, bounds: DisplayBounds) -> EngineResult<()> {
        validate_display_bounds(&bounds).map_err(EngineError::ConfigError)?;
        match self.pipeline.as_mut() {
            Some(pipeline) => {
                pipeline.set_display_bounds(bounds);
                Ok(())
            }
            None => self.send_command(Command::SetDisplayBounds(bounds)),
        }
    }

    /// Ask for the response curve in the next frame
    pub fn refresh_response(&mut self) -> EngineResult<()> {
        match self.pipeline.as_mut() {
            Some(pipeline) => {
                pipeline.invalidate_response();
                Ok(())
            }
            None => self.send_command(Command::RefreshResponse),
        }
    }

    /// Enable or disable the output soft clipper
    pub fn set_soft_clip_enabled(&self, enabled: bool) {
        self.shared.clipper.set_enabled(enabled);
        debug!("Set soft clip enabled: {}", enabled);
    }

    /// Soft clipper threshold (dBFS, clamped to 0)
    pub fn set_soft_clip_threshold_db(&self, threshold_db: f32) {
        self.shared.clipper.set_threshold_db(threshold_db);
    }

    /// Latest meter values, read directly from the audio thread's atomics
    pub fn meters(&self) -> MeterReadings {
        self.shared.meters.readings()
    }

    /// Get next event (non-blocking)
    pub fn poll_event(&self) -> Option<Event> {
        self.event_receiver.try_recv().ok()
    }

    /// Get next event, waiting at most `timeout`
    pub fn wait_event(&self, timeout: Duration) -> Option<Event> {
        self.event_receiver.recv_timeout(timeout).ok()
    }

    /// Get current configuration
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Send command to analysis thread
    fn send_command(&self, command: Command) -> EngineResult<()> {
        self.command_sender
            .as_ref()
            .ok_or(EngineError::NotRunning)?
            .send(command)
            .map_err(|_| EngineError::ChannelSendError)
    }

    /// Analysis thread main loop
    fn analysis_thread_main(
        mut pipeline: AnalysisPipeline,
        command_receiver: Receiver<Command>,
        event_sender: Sender<Event>,
        shutdown_flag: Arc<AtomicBool>,
        is_running: Arc<AtomicBool>,
        period: Duration,
    ) -> AnalysisPipeline {
        info!("Analysis thread started ({:.1}ms tick)", period.as_secs_f64() * 1000.0);
        let _ = event_sender.send(Event::Started);

        let mut next_tick = Instant::now() + period;
        while !shutdown_flag.load(Ordering::SeqCst) {
            // Wake for commands as they arrive, tick on the deadline
            let timeout = next_tick.saturating_duration_since(Instant::now());
            match command_receiver.recv_timeout(timeout) {
                Ok(command) => match command {
                    Command::SetFftOrder(order) => {
                        pipeline.set_fft_order(order);
                        let _ = event_sender.send(Event::FftOrderChanged(order));
                    }
                    Command::SetFloorDb(floor_db) => {
                        debug!("Set spectrum floor to {}dB", floor_db);
                        pipeline.set_floor_db(floor_db);
                    }
                    Command::SetDisplayBounds(bounds) => {
                        debug!("Display bounds set to {}x{}", bounds.width, bounds.height);
                        pipeline.set_display_bounds(bounds);
                    }
                    Command::RefreshResponse => pipeline.invalidate_response(),
                    Command::Shutdown => {
                        info!("Shutdown command received");
                        shutdown_flag.store(true, Ordering::SeqCst);
                    }
                },
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => {
                    debug!("Command channel closed");
                    break;
                }
            }

            if !shutdown_flag.load(Ordering::SeqCst) && Instant::now() >= next_tick {
                let frame = pipeline.tick();
                if let Some(message) = pipeline.take_error() {
                    let _ = event_sender.send(Event::error(message));
                }
                if event_sender.send(Event::Analysis(frame)).is_err() {
                    break;
                }
                next_tick += period;
                // Skip missed ticks instead of bursting to catch up
                let now = Instant::now();
                if next_tick < now {
                    next_tick = now + period;
                }
            }
        }

        is_running.store(false, Ordering::SeqCst);
        let _ = event_sender.send(Event::Stopped);
        info!("Analysis thread stopped");
        pipeline
    }
}

impl Drop for Equalizer {
    fn drop(&mut self) {
        if self.analysis_thread.is_some() {
            let _ = self.shutdown();
        }
    }
}
