//! Message Types for Thread Communication
//!
//! Commands flow from the control thread -> analysis thread
//! Events flow from the analysis thread -> control/UI thread
//!
//! Filter settings do not travel as commands: they go through the
//! `SettingsCell` triple buffer so the audio thread picks them up without
//! a channel or a lock.

use serde::{Deserialize, Serialize};

use heron_dsp::{DisplayBounds, FftOrder};

use crate::analysis::AnalysisFrame;

/// Commands sent to the running analysis thread
#[derive(Debug, Clone)]
pub enum Command {
    /// Change spectrum transform length
    SetFftOrder(FftOrder),

    /// Change the spectrum floor (dB)
    SetFloorDb(f32),

    /// Move or resize the display area
    SetDisplayBounds(DisplayBounds),

    /// Include the response curve in the next frame even if unchanged
    RefreshResponse,

    /// Stop the analysis thread
    Shutdown,
}

/// Events sent from the analysis thread
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum Event {
    /// Analysis thread started
    Started,

    /// Analysis thread stopped
    Stopped,

    /// Error occurred
    Error { message: String },

    /// One refresh worth of display data
    Analysis(AnalysisFrame),

    /// Spectrum transform length changed
    FftOrderChanged(FftOrder),
}

impl Event {
    /// Create an error event from any error type
    pub fn error<E: std::fmt::Display>(err: E) -> Self {
        Event::Error {
            message: err.to_string(),
        }
    }
}
