//! Heron Core - EQ Engine
//!
//! This crate wires the `heron_dsp` building blocks into a running engine:
//! - `AudioProcessor`: the audio-callback half (filter chains, metering, capture)
//! - `Equalizer`: the control half (settings publication, analysis thread, events)
//! - Lock-free handoff of settings and meters between the two
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     Control / UI Thread                     │
//! │  Equalizer::publish ──▶ SettingsCell    Event ◀── channel   │
//! └─────────────────────────────────────────────────────────────┘
//!              │ triple buffer                   ▲ crossbeam-channel
//!              ▼                                 │
//! ┌──────────────────────────────┐   ┌──────────────────────────┐
//! │         Audio Thread         │   │     Analysis Thread      │
//! │ FilterChain ──▶ SoftClipper  │   │ FFT ──▶ paths ──▶ frame  │
//! │      │ capture (rtrb)        │──▶│                          │
//! │  (Zero allocation path)      │   │                          │
//! └──────────────────────────────┘   └──────────────────────────┘
//! ```

mod analysis;
mod config;
mod engine;
mod error;
mod message;
mod processor;
mod shared;

pub use analysis::{AnalysisFrame, AnalysisPipeline};
pub use config::{
    validate_display_bounds, AnalyzerConfig, EngineConfig, StreamConfig, MAX_DISPLAY_DIMENSION,
};
pub use engine::Equalizer;
pub use error::{EngineError, EngineResult};
pub use message::{Command, Event};
pub use processor::AudioProcessor;
pub use shared::{MeterReadings, Meters, SettingsCell, SettingsReceiver, SharedState};

// Re-export DSP types for convenience
pub use heron_dsp::{
    AnalysisPath, BandSettings, CutSettings, DisplayBounds, FftOrder, FilterSettings, Slope,
    PEAK_BANDS,
};
