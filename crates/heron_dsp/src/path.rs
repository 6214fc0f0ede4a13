//! Curve Path Builder
//!
//! Converts analysis results into display-space polylines. The rendering layer
//! owns colours, strokes and clipping; this module only produces points.
//!
//! Two curves are built:
//! - the live spectrum, from a [`MagnitudeFrame`]
//! - the analytic response of a [`FilterChain`], one point per horizontal pixel
//!
//! Frequency is mapped logarithmically over 20 Hz - 20 kHz on the x axis.
//! Points whose coordinates come out non-finite are skipped, never plotted.

use serde::{Deserialize, Serialize};

use crate::chain::FilterChain;
use crate::spectrum::MagnitudeFrame;

/// Lowest frequency on the x axis
pub const MIN_DISPLAY_FREQ_HZ: f64 = 20.0;

/// Highest frequency on the x axis
pub const MAX_DISPLAY_FREQ_HZ: f64 = 20_000.0;

/// Vertical range of the response curve, +/- dB
pub const RESPONSE_RANGE_DB: f64 = 24.0;

/// Only every n-th spectrum bin becomes a point
pub const PATH_BIN_STRIDE: usize = 2;

/// Display rectangle; origin top-left, y grows downward
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DisplayBounds {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl DisplayBounds {
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn top(&self) -> f32 {
        self.y
    }

    pub fn bottom(&self) -> f32 {
        self.y + self.height
    }
}

/// Ordered display-space points
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnalysisPath(Vec<[f32; 2]>);

impl AnalysisPath {
    pub fn points(&self) -> &[[f32; 2]] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    fn push_finite(&mut self, x: f32, y: f32) {
        if x.is_finite() && y.is_finite() {
            self.0.push([x, y]);
        }
    }
}

/// Normalized 0..1 position of `value` on a log10 axis from `min` to `max`
#[inline]
pub fn map_from_log10(value: f64, min: f64, max: f64) -> f64 {
    (value.log10() - min.log10()) / (max.log10() - min.log10())
}

/// Value at normalized position `proportion` on a log10 axis from `min` to `max`
#[inline]
pub fn map_to_log10(proportion: f64, min: f64, max: f64) -> f64 {
    10.0_f64.powf(min.log10() + proportion * (max.log10() - min.log10()))
}

/// Linear remap of `value` from `[src_lo, src_hi]` to `[dst_lo, dst_hi]`
#[inline]
fn remap(value: f64, src_lo: f64, src_hi: f64, dst_lo: f64, dst_hi: f64) -> f64 {
    dst_lo + (value - src_lo) / (src_hi - src_lo) * (dst_hi - dst_lo)
}

/// Polyline for one magnitude frame
///
/// Bin 0 anchors the path at the left edge; after that every
/// [`PATH_BIN_STRIDE`]-th bin is placed at its log-frequency position. dB values
/// map linearly from `floor_db` (bottom) to 0 dB (top).
pub fn path_from_magnitude(
    frame: &MagnitudeFrame,
    bounds: DisplayBounds,
    transform_length: usize,
    bin_width_hz: f32,
    floor_db: f32,
) -> AnalysisPath {
    let data = frame.as_slice();
    let bins = (transform_length / 2).min(data.len());
    let mut path = AnalysisPath(Vec::with_capacity(bins / PATH_BIN_STRIDE + 1));
    if bins == 0 {
        return path;
    }

    let top = f64::from(bounds.top());
    let bottom = f64::from(bounds.bottom());
    let floor = f64::from(floor_db);
    let y_for = |db: f32| remap(f64::from(db), floor, 0.0, bottom, top) as f32;

    path.push_finite(bounds.x, y_for(data[0]));

    for bin in (1..bins).step_by(PATH_BIN_STRIDE) {
        let freq = bin as f64 * f64::from(bin_width_hz);
        let normalized = map_from_log10(freq, MIN_DISPLAY_FREQ_HZ, MAX_DISPLAY_FREQ_HZ);
        let x = bounds.x + (normalized * f64::from(bounds.width)).floor() as f32;
        path.push_finite(x, y_for(data[bin]));
    }

    path
}

/// Polyline of the chain's analytic response, one point per horizontal pixel
///
/// dB values map linearly from -[`RESPONSE_RANGE_DB`] (bottom) to
/// +[`RESPONSE_RANGE_DB`] (top). Deterministic in the chain's coefficients, so
/// it only needs rebuilding when settings change.
pub fn path_from_analytic_response(
    chain: &FilterChain,
    bounds: DisplayBounds,
    sample_rate: f32,
) -> AnalysisPath {
    let pixels = if bounds.width.is_finite() && bounds.width > 0.0 {
        bounds.width as usize
    } else {
        0
    };
    let mut path = AnalysisPath(Vec::with_capacity(pixels));

    let top = f64::from(bounds.top());
    let bottom = f64::from(bounds.bottom());
    let sample_rate = f64::from(sample_rate);

    for pixel in 0..pixels {
        let freq = map_to_log10(
            pixel as f64 / pixels as f64,
            MIN_DISPLAY_FREQ_HZ,
            MAX_DISPLAY_FREQ_HZ,
        );
        let magnitude = chain.magnitude_response_at(freq, sample_rate);
        let db = 20.0 * magnitude.log10();
        let y = remap(db, -RESPONSE_RANGE_DB, RESPONSE_RANGE_DB, bottom, top);
        path.push_finite(bounds.x + pixel as f32, y as f32);
    }

    path
}
