//! Engine Error Types

use thiserror::Error;

/// Errors that can occur in the EQ engine
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Filter design error: {0}")]
    Design(#[from] heron_dsp::DesignError),

    #[error("DSP error: {0}")]
    Dsp(#[from] heron_dsp::DspError),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Analysis thread already running")]
    AlreadyRunning,

    #[error("Analysis thread not running")]
    NotRunning,

    #[error("Failed to spawn analysis thread: {0}")]
    ThreadSpawn(String),

    #[error("Channel send error - receiver dropped")]
    ChannelSendError,
}

/// Result type alias for engine operations
pub type EngineResult<T> = Result<T, EngineError>;
