//! Engine, Stream and Analyzer Configuration

use serde::{Deserialize, Serialize};

use heron_dsp::{DisplayBounds, FftOrder, AUDIO_BLOCK_CAPACITY, DEFAULT_FLOOR_DB};

/// Largest display edge, in pixels, the path builders will size a curve for
pub const MAX_DISPLAY_DIMENSION: f32 = 16384.0;

/// Check a display area before paths are sized from it
pub fn validate_display_bounds(bounds: &DisplayBounds) -> Result<(), String> {
    let size_ok = |v: f32| v.is_finite() && v > 0.0 && v <= MAX_DISPLAY_DIMENSION;
    if !bounds.x.is_finite()
        || !bounds.y.is_finite()
        || !size_ok(bounds.width)
        || !size_ok(bounds.height)
    {
        return Err(format!(
            "Invalid display size: {}x{} at ({}, {})",
            bounds.width, bounds.height, bounds.x, bounds.y
        ));
    }
    Ok(())
}

/// Audio stream configuration
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StreamConfig {
    /// Sample rate in Hz (e.g., 44100, 48000, 96000)
    pub sample_rate: u32,

    /// Number of interleaved channels (1 = mono, 2 = stereo)
    pub channels: u16,

    /// Host buffer size in frames (lower = less latency, higher = more stability)
    pub buffer_size: u32,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            sample_rate: 48000,
            channels: 2,
            buffer_size: 512,
        }
    }
}

impl StreamConfig {
    /// Calculate latency in milliseconds for this configuration
    pub fn latency_ms(&self) -> f32 {
        (self.buffer_size as f32 / self.sample_rate as f32) * 1000.0
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.sample_rate < 8000 || self.sample_rate > 192000 {
            return Err(format!("Invalid sample rate: {}", self.sample_rate));
        }
        if self.channels == 0 || self.channels > 8 {
            return Err(format!("Invalid channel count: {}", self.channels));
        }
        if self.buffer_size < 32 || self.buffer_size > 8192 {
            return Err(format!("Invalid buffer size: {}", self.buffer_size));
        }
        Ok(())
    }
}

/// Spectrum analysis and display configuration
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AnalyzerConfig {
    /// Transform length of the spectrum analyzer
    pub fft_order: FftOrder,

    /// dB value substituted for silence; bottom of the spectrum display
    pub floor_db: f32,

    /// Analysis ticks per second
    pub refresh_hz: f32,

    /// Samples per captured block
    pub capture_block_len: usize,

    /// Capture queue depth in blocks
    pub capture_capacity_blocks: usize,

    /// Display area the paths are built for
    pub display_width: f32,
    pub display_height: f32,

    /// Start with the output soft clipper engaged
    pub soft_clip_enabled: bool,

    /// Soft clipper threshold (dBFS)
    pub soft_clip_threshold_db: f32,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            fft_order: FftOrder::default(),
            floor_db: DEFAULT_FLOOR_DB,
            refresh_hz: 60.0,
            capture_block_len: 512,
            capture_capacity_blocks: 64,
            display_width: 600.0,
            display_height: 300.0,
            soft_clip_enabled: false,
            soft_clip_threshold_db: -1.0,
        }
    }
}

impl AnalyzerConfig {
    /// Display rectangle anchored at the origin
    pub fn display_bounds(&self) -> DisplayBounds {
        DisplayBounds::new(0.0, 0.0, self.display_width, self.display_height)
    }

    /// Time between analysis ticks
    pub fn tick_period(&self) -> std::time::Duration {
        std::time::Duration::from_secs_f64(1.0 / f64::from(self.refresh_hz))
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        if !self.floor_db.is_finite() || self.floor_db >= 0.0 {
            return Err(format!("Invalid floor: {}dB", self.floor_db));
        }
        if !self.refresh_hz.is_finite() || self.refresh_hz <= 0.0 || self.refresh_hz > 240.0 {
            return Err(format!("Invalid refresh rate: {}Hz", self.refresh_hz));
        }
        if self.capture_block_len == 0 || self.capture_block_len > AUDIO_BLOCK_CAPACITY {
            return Err(format!(
                "Invalid capture block length: {}",
                self.capture_block_len
            ));
        }
        if self.capture_capacity_blocks == 0 {
            return Err("Capture queue needs at least one block".to_string());
        }
        validate_display_bounds(&self.display_bounds())?;
        if !self.soft_clip_threshold_db.is_finite() || self.soft_clip_threshold_db > 0.0 {
            return Err(format!(
                "Invalid soft clip threshold: {}dB",
                self.soft_clip_threshold_db
            ));
        }
        Ok(())
    }
}

/// Overall engine configuration
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Stream configuration
    pub stream: StreamConfig,

    /// Analysis configuration
    pub analyzer: AnalyzerConfig,
}

impl EngineConfig {
    /// Create config optimized for low latency
    pub fn low_latency() -> Self {
        Self {
            stream: StreamConfig {
                sample_rate: 48000,
                channels: 2,
                buffer_size: 128, // ~2.6ms latency
            },
            analyzer: AnalyzerConfig {
                capture_block_len: 128,
                capture_capacity_blocks: 128,
                ..AnalyzerConfig::default()
            },
        }
    }

    /// Create config optimized for stability
    pub fn stable() -> Self {
        Self {
            stream: StreamConfig {
                sample_rate: 48000,
                channels: 2,
                buffer_size: 1024, // ~21ms latency
            },
            analyzer: AnalyzerConfig {
                fft_order: FftOrder::Order4096,
                refresh_hz: 30.0,
                capture_block_len: 1024,
                capture_capacity_blocks: 32,
                ..AnalyzerConfig::default()
            },
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        self.stream.validate()?;
        self.analyzer.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = StreamConfig::default();
        assert_eq!(config.sample_rate, 48000);
        assert_eq!(config.channels, 2);
        assert_eq!(config.buffer_size, 512);

        let analyzer = AnalyzerConfig::default();
        assert_eq!(analyzer.fft_order, FftOrder::Order2048);
        assert_eq!(analyzer.floor_db, -48.0);
        assert!(!analyzer.soft_clip_enabled);
    }

    #[test]
    fn test_latency_calculation() {
        let config = StreamConfig {
            sample_rate: 48000,
            channels: 2,
            buffer_size: 480, // Exactly 10ms at 48kHz
        };
        let latency = config.latency_ms();
        assert!((latency - 10.0).abs() < 0.01);
    }

    #[test]
    fn test_validation() {
        let valid = StreamConfig::default();
        assert!(valid.validate().is_ok());

        let invalid_rate = StreamConfig {
            sample_rate: 100,
            ..Default::default()
        };
        assert!(invalid_rate.validate().is_err());

        let invalid_channels = StreamConfig {
            channels: 0,
            ..Default::default()
        };
        assert!(invalid_channels.validate().is_err());

        let invalid_buffer = StreamConfig {
            buffer_size: 10,
            ..Default::default()
        };
        assert!(invalid_buffer.validate().is_err());
    }

    #[test]
    fn test_analyzer_validation() {
        assert!(AnalyzerConfig::default().validate().is_ok());

        let cases = [
            AnalyzerConfig {
                floor_db: 0.0,
                ..Default::default()
            },
            AnalyzerConfig {
                refresh_hz: 0.0,
                ..Default::default()
            },
            AnalyzerConfig {
                capture_block_len: AUDIO_BLOCK_CAPACITY + 1,
                ..Default::default()
            },
            AnalyzerConfig {
                capture_capacity_blocks: 0,
                ..Default::default()
            },
            AnalyzerConfig {
                display_width: f32::NAN,
                ..Default::default()
            },
            AnalyzerConfig {
                display_height: 1.0e9,
                ..Default::default()
            },
            AnalyzerConfig {
                soft_clip_threshold_db: 3.0,
                ..Default::default()
            },
        ];
        for config in cases {
            assert!(config.validate().is_err(), "{config:?}");
        }
    }

    #[test]
    fn test_display_bounds_validation() {
        assert!(validate_display_bounds(&DisplayBounds::new(10.0, 20.0, 800.0, 400.0)).is_ok());
        let max = MAX_DISPLAY_DIMENSION;
        assert!(validate_display_bounds(&DisplayBounds::new(0.0, 0.0, max, max)).is_ok());

        for bounds in [
            DisplayBounds::new(0.0, 0.0, 0.0, 300.0),
            DisplayBounds::new(0.0, 0.0, 600.0, -1.0),
            DisplayBounds::new(0.0, 0.0, f32::INFINITY, 300.0),
            DisplayBounds::new(0.0, 0.0, 1.0e12, 300.0),
            DisplayBounds::new(f32::NAN, 0.0, 600.0, 300.0),
        ] {
            assert!(validate_display_bounds(&bounds).is_err(), "{bounds:?}");
        }
    }

    #[test]
    fn test_preset_configs() {
        let low_latency = EngineConfig::low_latency();
        let stable = EngineConfig::stable();

        assert!(low_latency.validate().is_ok());
        assert!(stable.validate().is_ok());
        assert!(low_latency.stream.buffer_size < stable.stream.buffer_size);
        assert!(low_latency.stream.latency_ms() < stable.stream.latency_ms());
    }

    #[test]
    fn test_tick_period() {
        let config = AnalyzerConfig {
            refresh_hz: 50.0,
            ..Default::default()
        };
        let period = config.tick_period().as_secs_f64();
        assert!((period - 0.020).abs() < 1e-6);
    }

    #[test]
    fn test_config_serialization() {
        let config = EngineConfig::stable();
        let json = serde_json::to_string(&config).unwrap();
        let deserialized: EngineConfig = serde_json::from_str(&json).unwrap();

        assert_eq!(config, deserialized);
    }
}
