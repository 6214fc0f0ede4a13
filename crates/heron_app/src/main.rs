//! Heron demo host
//!
//! Stands in for a plugin host or audio device callback: a simulated audio
//! thread feeds a synthetic signal through the `AudioProcessor` in real time
//! while the control thread publishes settings and consumes analysis events
//! the way a renderer would.
//!
//! Usage: `heron [config.json]`. Log level via `RUST_LOG` (default `info`).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use heron_core::{
    AudioProcessor, BandSettings, CutSettings, EngineConfig, Equalizer, Event, FilterSettings,
    Slope,
};

/// How long each settings phase runs
const PHASE: Duration = Duration::from_secs(2);

fn main() -> Result<()> {
    // Initialize tracing for logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = load_config()?;
    info!(
        "Starting Heron demo: {}Hz, {} channels, {:.1}ms buffers",
        config.stream.sample_rate,
        config.stream.channels,
        config.stream.latency_ms()
    );

    let (mut engine, processor) = Equalizer::new(config).context("Failed to build engine")?;
    engine.start_analysis()?;

    let running = Arc::new(AtomicBool::new(true));
    let audio = spawn_audio_thread(processor, config, Arc::clone(&running))?;

    // Phase 1: flat
    let mut stats = FrameStats::default();
    pump_events(&engine, PHASE, &mut stats);
    stats.report("flat");

    // Phase 2: carve the low end, lift presence
    let mut settings = FilterSettings::default();
    settings.low_cut = CutSettings::new(120.0, Slope::Db24);
    settings.peaks[2] = BandSettings::new(3000.0).with_gain(6.0).with_q(1.4);
    settings.high_shelf = settings.high_shelf.with_gain(-3.0);
    engine.publish(settings).context("Failed to publish settings")?;
    info!("Published: {}", serde_json::to_string(&settings)?);

    let mut stats = FrameStats::default();
    pump_events(&engine, PHASE, &mut stats);
    stats.report("shaped");

    // Out-of-range settings are rejected and change nothing
    let mut bad = settings;
    bad.high_cut = CutSettings::new(96_000.0, Slope::Db12);
    if let Err(e) = engine.publish(bad) {
        info!("Rejected as expected: {}", e);
    }

    // Teardown: analysis thread first, then the audio side
    engine.shutdown()?;
    running.store(false, Ordering::SeqCst);
    let processor = audio
        .join()
        .map_err(|_| anyhow::anyhow!("Audio thread panicked"))?;
    info!(
        "Audio stopped; {} capture blocks dropped in total",
        processor.dropped_blocks()
    );
    drop(processor);

    // Drain whatever the analysis thread sent last
    while let Some(event) = engine.poll_event() {
        debug!("Late event: {}", event_name(&event));
    }
    Ok(())
}

/// Engine config from the JSON file named on the command line, or the defaults
fn load_config() -> Result<EngineConfig> {
    let Some(path) = std::env::args().nth(1) else {
        return Ok(EngineConfig::default());
    };
    let text = std::fs::read_to_string(&path).with_context(|| format!("Reading {}", path))?;
    let config: EngineConfig =
        serde_json::from_str(&text).with_context(|| format!("Parsing {}", path))?;
    info!("Loaded config from {}", path);
    Ok(config)
}

/// Run the processor against a synthetic signal at real-time pace
fn spawn_audio_thread(
    mut processor: AudioProcessor,
    config: EngineConfig,
    running: Arc<AtomicBool>,
) -> Result<thread::JoinHandle<AudioProcessor>> {
    let handle = thread::Builder::new()
        .name("heron-audio".into())
        .spawn(move || {
            if let Err(e) = processor.prepare(config.stream) {
                warn!("Failed to prepare processor: {}", e);
                return processor;
            }

            let stream = config.stream;
            let channels = stream.channels as usize;
            let frames = stream.buffer_size as usize;
            let period = Duration::from_secs_f64(frames as f64 / f64::from(stream.sample_rate));
            let mut signal = TestSignal::new(stream.sample_rate as f32);
            // Allocated once, before the loop
            let mut buffer = vec![0.0_f32; frames * channels];

            let mut next = Instant::now();
            while running.load(Ordering::SeqCst) {
                for frame in buffer.chunks_mut(channels) {
                    let sample = signal.next_sample();
                    frame.fill(sample);
                }
                processor.process(&mut buffer);

                next += period;
                if let Some(wait) = next.checked_duration_since(Instant::now()) {
                    thread::sleep(wait);
                }
            }
            processor.release();
            processor
        })
        .context("Failed to spawn audio thread")?;
    Ok(handle)
}

/// Three tones over a bed of white noise
struct TestSignal {
    phases: [f32; 3],
    increments: [f32; 3],
    noise_state: u32,
}

impl TestSignal {
    fn new(sample_rate: f32) -> Self {
        let tau = std::f32::consts::TAU;
        Self {
            phases: [0.0; 3],
            increments: [80.0, 1000.0, 3000.0].map(|f| tau * f / sample_rate),
            noise_state: 0x1234_5678,
        }
    }

    fn next_sample(&mut self) -> f32 {
        let mut sum = 0.0;
        for (phase, inc) in self.phases.iter_mut().zip(self.increments) {
            sum += phase.sin() * 0.2;
            *phase = (*phase + inc) % std::f32::consts::TAU;
        }
        // xorshift32
        self.noise_state ^= self.noise_state << 13;
        self.noise_state ^= self.noise_state >> 17;
        self.noise_state ^= self.noise_state << 5;
        let noise = self.noise_state as f32 / u32::MAX as f32 * 2.0 - 1.0;
        sum + noise * 0.02
    }
}

/// What the renderer would have drawn during one phase
#[derive(Default)]
struct FrameStats {
    frames: usize,
    spectra: usize,
    responses: usize,
    last_response_top: Option<f32>,
    peak_output_db: f32,
    last_output_rms_db: f32,
    dropped_blocks: u64,
}

impl FrameStats {
    fn report(&self, phase: &str) {
        info!(
            "[{}] {} frames, {} spectrum paths, {} response paths, output peak {:.1}dBFS, rms {:.1}dBFS, {} dropped blocks",
            phase,
            self.frames,
            self.spectra,
            self.responses,
            self.peak_output_db,
            self.last_output_rms_db,
            self.dropped_blocks
        );
        if let Some(top) = self.last_response_top {
            info!("[{}] response curve highest point at y={:.1}", phase, top);
        }
    }
}

/// Consume events for `duration`, folding analysis frames into `stats`
fn pump_events(engine: &Equalizer, duration: Duration, stats: &mut FrameStats) {
    stats.peak_output_db = f32::NEG_INFINITY;
    let deadline = Instant::now() + duration;
    while let Some(remaining) = deadline.checked_duration_since(Instant::now()) {
        let Some(event) = engine.wait_event(remaining) else {
            continue;
        };
        match event {
            Event::Analysis(frame) => {
                stats.frames += 1;
                stats.spectra += usize::from(frame.spectrum.is_some());
                if let Some(response) = frame.response {
                    stats.responses += 1;
                    stats.last_response_top = response
                        .points()
                        .iter()
                        .map(|p| p[1])
                        .min_by(|a, b| a.total_cmp(b));
                }
                stats.peak_output_db = stats.peak_output_db.max(frame.meters.output_db);
                stats.last_output_rms_db = frame.meters.output_rms_db;
                stats.dropped_blocks = frame.dropped_blocks;
            }
            Event::Error { message } => warn!("Engine error: {}", message),
            other => debug!("Event: {}", event_name(&other)),
        }
    }
}

fn event_name(event: &Event) -> &'static str {
    match event {
        Event::Started => "Started",
        Event::Stopped => "Stopped",
        Event::Error { .. } => "Error",
        Event::Analysis(_) => "Analysis",
        Event::FftOrderChanged(_) => "FftOrderChanged",
    }
}
