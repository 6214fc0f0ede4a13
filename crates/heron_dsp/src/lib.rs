//! Heron DSP - Digital Signal Processing Module
//!
//! This crate provides the signal path for Heron, including:
//! - RBJ cookbook coefficient design for peaks, shelves and Butterworth cuts
//! - A fixed-order filter chain (low cut, low shelf, four peaks, high shelf, high cut)
//! - Lock-free SPSC queues and block capture for handing audio to analysis
//! - FFT spectrum analysis and display-path generation
//! - An optional soft clipper feeding the gain-reduction meter
//!
//! # Architecture
//!
//! Everything here is single-threaded by construction; threads live in
//! `heron_core`. The processing path follows a strict "no allocation in audio
//! callback" rule: coefficients are designed up front and copied whole into
//! each stage between blocks.

pub mod block;
pub mod capture;
pub mod chain;
pub mod design;
mod error;
pub mod meter;
pub mod path;
pub mod ring_buffer;
pub mod settings;
mod soft_clip;
pub mod spectrum;

pub use biquad::Coefficients;
pub use block::{AudioBlock, AUDIO_BLOCK_CAPACITY};
pub use capture::{channel_capture, CaptureReader, CaptureWriter};
pub use chain::{ChainPosition, FilterChain};
pub use design::{make_cut_cascade, make_peak, make_shelf, CutKind, ShelfKind};
pub use error::{DesignError, DspError};
pub use path::{path_from_analytic_response, path_from_magnitude, AnalysisPath, DisplayBounds};
pub use ring_buffer::{ring_buffer, RingConsumer, RingProducer};
pub use settings::{BandSettings, CutSettings, FilterSettings, Slope, PEAK_BANDS};
pub use soft_clip::SoftClipper;
pub use spectrum::{AnalyzerState, FftOrder, MagnitudeFrame, SpectrumAnalyzer, DEFAULT_FLOOR_DB};
