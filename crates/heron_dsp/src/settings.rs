//! Filter Settings Snapshot
//!
//! A complete, immutable description of every band in the chain. The control
//! surface assembles one of these and publishes it as a whole; the audio thread
//! never sees a partially updated value.

use serde::{Deserialize, Serialize};

use crate::design;
use crate::error::DesignError;

/// Number of peak (bell) bands in the chain
pub const PEAK_BANDS: usize = 4;

/// Maximum number of second-order sections in a cut cascade
pub const MAX_CUT_SECTIONS: usize = 4;

/// Cut filter steepness
///
/// Each step adds one cascaded second-order section.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Slope {
    #[default]
    Db12,
    Db24,
    Db36,
    Db48,
}

impl Slope {
    pub const ALL: [Slope; MAX_CUT_SECTIONS] = [Slope::Db12, Slope::Db24, Slope::Db36, Slope::Db48];

    /// Number of cascaded biquad sections (1-4)
    pub fn order(self) -> usize {
        match self {
            Slope::Db12 => 1,
            Slope::Db24 => 2,
            Slope::Db36 => 3,
            Slope::Db48 => 4,
        }
    }

    pub fn from_order(order: usize) -> Option<Self> {
        Self::ALL.get(order.checked_sub(1)?).copied()
    }
}

/// Peak or shelf band parameters
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BandSettings {
    pub frequency_hz: f32,
    pub gain_db: f32,
    pub q: f32,
    pub bypassed: bool,
}

impl BandSettings {
    /// Flat band (0 dB) at the given frequency
    pub fn new(frequency_hz: f32) -> Self {
        Self {
            frequency_hz,
            gain_db: 0.0,
            q: 1.0,
            bypassed: false,
        }
    }

    pub fn with_gain(mut self, gain_db: f32) -> Self {
        self.gain_db = gain_db;
        self
    }

    pub fn with_q(mut self, q: f32) -> Self {
        self.q = q;
        self
    }

    pub fn bypass(mut self, bypassed: bool) -> Self {
        self.bypassed = bypassed;
        self
    }

    fn validate(&self, sample_rate: f32) -> Result<(), DesignError> {
        if self.bypassed {
            return Ok(());
        }
        design::check_frequency(self.frequency_hz, sample_rate)?;
        design::check_q(self.q)?;
        design::check_gain(self.gain_db)
    }
}

/// Low-cut / high-cut parameters
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CutSettings {
    pub frequency_hz: f32,
    pub slope: Slope,
    pub bypassed: bool,
}

impl CutSettings {
    pub fn new(frequency_hz: f32, slope: Slope) -> Self {
        Self {
            frequency_hz,
            slope,
            bypassed: false,
        }
    }

    pub fn bypass(mut self, bypassed: bool) -> Self {
        self.bypassed = bypassed;
        self
    }

    fn validate(&self, sample_rate: f32) -> Result<(), DesignError> {
        if self.bypassed {
            return Ok(());
        }
        design::check_frequency(self.frequency_hz, sample_rate)
    }
}

/// Complete settings for every position of the filter chain
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FilterSettings {
    pub low_cut: CutSettings,
    pub low_shelf: BandSettings,
    pub peaks: [BandSettings; PEAK_BANDS],
    pub high_shelf: BandSettings,
    pub high_cut: CutSettings,
}

impl Default for FilterSettings {
    /// Flat response: cut filters bypassed, every other band at 0 dB
    fn default() -> Self {
        Self {
            low_cut: CutSettings::new(20.0, Slope::Db12).bypass(true),
            low_shelf: BandSettings::new(100.0).with_q(0.707),
            peaks: [
                BandSettings::new(250.0),
                BandSettings::new(1000.0),
                BandSettings::new(2500.0),
                BandSettings::new(6000.0),
            ],
            high_shelf: BandSettings::new(8000.0).with_q(0.707),
            high_cut: CutSettings::new(20000.0, Slope::Db12).bypass(true),
        }
    }
}

impl FilterSettings {
    /// Every position bypassed; useful as a base when isolating one band
    pub fn all_bypassed() -> Self {
        let defaults = Self::default();
        Self {
            low_cut: defaults.low_cut.bypass(true),
            low_shelf: defaults.low_shelf.bypass(true),
            peaks: defaults.peaks.map(|band| band.bypass(true)),
            high_shelf: defaults.high_shelf.bypass(true),
            high_cut: defaults.high_cut.bypass(true),
        }
    }

    /// Check every active band against the given sample rate
    ///
    /// Bypassed bands are not checked: they are never designed.
    pub fn validate(&self, sample_rate: f32) -> Result<(), DesignError> {
        design::check_sample_rate(sample_rate)?;
        self.low_cut.validate(sample_rate)?;
        self.low_shelf.validate(sample_rate)?;
        for peak in &self.peaks {
            peak.validate(sample_rate)?;
        }
        self.high_shelf.validate(sample_rate)?;
        self.high_cut.validate(sample_rate)
    }
}
