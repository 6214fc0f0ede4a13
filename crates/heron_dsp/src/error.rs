//! DSP Error Types

use thiserror::Error;

/// Errors raised while designing filter coefficients
///
/// Returned synchronously to whoever applies settings. The chain keeps its
/// previous coefficients when one of these is produced.
#[derive(Error, Debug, Clone, Copy, PartialEq)]
pub enum DesignError {
    #[error("Sample rate must be positive and finite, got {0}")]
    InvalidSampleRate(f32),

    #[error("Invalid frequency {frequency}Hz (must be in (0, {nyquist}) Hz)")]
    InvalidFrequency { frequency: f32, nyquist: f32 },

    #[error("Invalid Q {0} (must be positive and finite)")]
    InvalidQ(f32),

    #[error("Invalid gain {0}dB (must be finite)")]
    InvalidGain(f32),
}

/// Errors that can occur while configuring DSP components
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DspError {
    #[error("Filter design error: {0}")]
    Design(#[from] DesignError),

    #[error("Invalid block length {got} (must be 1..={max})")]
    InvalidBlockLength { got: usize, max: usize },

    #[error("Ring buffer capacity must be positive")]
    InvalidCapacity,

    #[error("History length {history} shorter than block length {block}")]
    HistoryTooShort { history: usize, block: usize },
}
