//! Filter Coefficient Designer
//!
//! Pure functions computing biquad coefficients for the chain's peak, shelf
//! and cut stages. Based on the RBJ (Robert Bristow-Johnson) Audio EQ Cookbook,
//! with Butterworth pole placement for the cut cascades.
//!
//! Every function validates its input and returns a [`DesignError`] rather than
//! clamping silently. The one exception is the peak filter's frequency, which is
//! pulled down to 0.95 x Nyquist to keep the section stable near the bilinear
//! transform's singularity.
//!
//! Math is done in `f64`; only the final normalized coefficients are narrowed
//! to the `f32` record the audio path runs on.

use std::f64::consts::PI;

use biquad::Coefficients;

use crate::error::DesignError;
use crate::settings::{Slope, MAX_CUT_SECTIONS};

/// Highest usable peak frequency as a fraction of Nyquist
pub const PEAK_NYQUIST_LIMIT: f32 = 0.95;

/// Gains closer to 0 dB than this are treated as exactly unity
pub const UNITY_GAIN_EPSILON_DB: f32 = 1e-5;

/// Which end of the spectrum a shelf acts on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShelfKind {
    Low,
    High,
}

/// Which end of the spectrum a cut filter removes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CutKind {
    /// High-pass: removes content below the corner
    Low,
    /// Low-pass: removes content above the corner
    High,
}

/// Coefficients that pass the signal through untouched
#[inline]
pub fn identity() -> Coefficients<f32> {
    Coefficients {
        a1: 0.0,
        a2: 0.0,
        b0: 1.0,
        b1: 0.0,
        b2: 0.0,
    }
}

/// The 1-4 sections making up one cut filter
///
/// Fixed-size storage so designing a cascade never allocates.
#[derive(Debug, Clone, Copy)]
pub struct CutCascade {
    sections: [Coefficients<f32>; MAX_CUT_SECTIONS],
    len: usize,
}

impl CutCascade {
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn as_slice(&self) -> &[Coefficients<f32>] {
        &self.sections[..self.len]
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Coefficients<f32>> {
        self.as_slice().iter()
    }
}

pub(crate) fn check_sample_rate(sample_rate: f32) -> Result<(), DesignError> {
    if sample_rate.is_finite() && sample_rate > 0.0 {
        Ok(())
    } else {
        Err(DesignError::InvalidSampleRate(sample_rate))
    }
}

pub(crate) fn check_frequency(frequency: f32, sample_rate: f32) -> Result<(), DesignError> {
    check_sample_rate(sample_rate)?;
    let nyquist = sample_rate * 0.5;
    if frequency.is_finite() && frequency > 0.0 && frequency < nyquist {
        Ok(())
    } else {
        Err(DesignError::InvalidFrequency { frequency, nyquist })
    }
}

pub(crate) fn check_q(q: f32) -> Result<(), DesignError> {
    if q.is_finite() && q > 0.0 {
        Ok(())
    } else {
        Err(DesignError::InvalidQ(q))
    }
}

pub(crate) fn check_gain(gain_db: f32) -> Result<(), DesignError> {
    if gain_db.is_finite() {
        Ok(())
    } else {
        Err(DesignError::InvalidGain(gain_db))
    }
}

/// Intermediate values shared by every cookbook design
struct Prototype {
    cos_w0: f64,
    alpha: f64,
}

impl Prototype {
    fn new(frequency: f32, q: f64, sample_rate: f32) -> Self {
        let w0 = 2.0 * PI * f64::from(frequency) / f64::from(sample_rate);
        Self {
            cos_w0: w0.cos(),
            alpha: w0.sin() / (2.0 * q),
        }
    }
}

/// Normalize by a0 and narrow to the f32 record
fn normalize(b0: f64, b1: f64, b2: f64, a0: f64, a1: f64, a2: f64) -> Coefficients<f32> {
    Coefficients {
        a1: (a1 / a0) as f32,
        a2: (a2 / a0) as f32,
        b0: (b0 / a0) as f32,
        b1: (b1 / a0) as f32,
        b2: (b2 / a0) as f32,
    }
}

/// Peaking (bell) EQ section
pub fn make_peak(
    frequency: f32,
    gain_db: f32,
    q: f32,
    sample_rate: f32,
) -> Result<Coefficients<f32>, DesignError> {
    check_frequency(frequency, sample_rate)?;
    check_q(q)?;
    check_gain(gain_db)?;

    if gain_db.abs() < UNITY_GAIN_EPSILON_DB {
        return Ok(identity());
    }

    let frequency = frequency.min(sample_rate * 0.5 * PEAK_NYQUIST_LIMIT);
    let p = Prototype::new(frequency, f64::from(q), sample_rate);
    let a = 10.0_f64.powf(f64::from(gain_db) / 40.0);

    Ok(normalize(
        1.0 + p.alpha * a,
        -2.0 * p.cos_w0,
        1.0 - p.alpha * a,
        1.0 + p.alpha / a,
        -2.0 * p.cos_w0,
        1.0 - p.alpha / a,
    ))
}

/// Low or high shelf section
pub fn make_shelf(
    frequency: f32,
    gain_db: f32,
    q: f32,
    sample_rate: f32,
    kind: ShelfKind,
) -> Result<Coefficients<f32>, DesignError> {
    check_frequency(frequency, sample_rate)?;
    check_q(q)?;
    check_gain(gain_db)?;

    let p = Prototype::new(frequency, f64::from(q), sample_rate);
    let a = 10.0_f64.powf(f64::from(gain_db) / 40.0);
    let two_sqrt_a_alpha = 2.0 * a.sqrt() * p.alpha;
    let c = p.cos_w0;

    let coeffs = match kind {
        ShelfKind::Low => normalize(
            a * ((a + 1.0) - (a - 1.0) * c + two_sqrt_a_alpha),
            2.0 * a * ((a - 1.0) - (a + 1.0) * c),
            a * ((a + 1.0) - (a - 1.0) * c - two_sqrt_a_alpha),
            (a + 1.0) + (a - 1.0) * c + two_sqrt_a_alpha,
            -2.0 * ((a - 1.0) + (a + 1.0) * c),
            (a + 1.0) + (a - 1.0) * c - two_sqrt_a_alpha,
        ),
        ShelfKind::High => normalize(
            a * ((a + 1.0) + (a - 1.0) * c + two_sqrt_a_alpha),
            -2.0 * a * ((a - 1.0) + (a + 1.0) * c),
            a * ((a + 1.0) + (a - 1.0) * c - two_sqrt_a_alpha),
            (a + 1.0) - (a - 1.0) * c + two_sqrt_a_alpha,
            2.0 * ((a - 1.0) - (a + 1.0) * c),
            (a + 1.0) - (a - 1.0) * c - two_sqrt_a_alpha,
        ),
    };

    Ok(coeffs)
}

/// Q of section `index` in an `order`-section Butterworth cascade
///
/// The cascade has 2 x `order` poles; each section takes one conjugate pair.
fn butterworth_q(index: usize, order: usize) -> f64 {
    let poles = 2 * order;
    let theta = PI * (2 * index + 1) as f64 / (2 * poles) as f64;
    1.0 / (2.0 * theta.cos())
}

/// Butterworth cut filter built from `slope.order()` second-order sections
pub fn make_cut_cascade(
    frequency: f32,
    slope: Slope,
    sample_rate: f32,
    kind: CutKind,
) -> Result<CutCascade, DesignError> {
    check_frequency(frequency, sample_rate)?;

    let order = slope.order();
    let mut sections = [identity(); MAX_CUT_SECTIONS];

    for (index, section) in sections.iter_mut().take(order).enumerate() {
        let p = Prototype::new(frequency, butterworth_q(index, order), sample_rate);
        let c = p.cos_w0;
        *section = match kind {
            CutKind::Low => normalize(
                (1.0 + c) / 2.0,
                -(1.0 + c),
                (1.0 + c) / 2.0,
                1.0 + p.alpha,
                -2.0 * c,
                1.0 - p.alpha,
            ),
            CutKind::High => normalize(
                (1.0 - c) / 2.0,
                1.0 - c,
                (1.0 - c) / 2.0,
                1.0 + p.alpha,
                -2.0 * c,
                1.0 - p.alpha,
            ),
        };
    }

    Ok(CutCascade {
        sections,
        len: order,
    })
}

/// Analytic magnitude |H(e^jw)| of one section at `frequency`
pub fn section_magnitude(coeffs: &Coefficients<f32>, frequency: f64, sample_rate: f64) -> f64 {
    let w = 2.0 * PI * frequency / sample_rate;
    let (sin_w, cos_w) = w.sin_cos();
    let (sin_2w, cos_2w) = (2.0 * w).sin_cos();

    let b0 = f64::from(coeffs.b0);
    let b1 = f64::from(coeffs.b1);
    let b2 = f64::from(coeffs.b2);
    let a1 = f64::from(coeffs.a1);
    let a2 = f64::from(coeffs.a2);

    let num_re = b0 + b1 * cos_w + b2 * cos_2w;
    let num_im = -(b1 * sin_w + b2 * sin_2w);
    let den_re = 1.0 + a1 * cos_w + a2 * cos_2w;
    let den_im = -(a1 * sin_w + a2 * sin_2w);

    ((num_re * num_re + num_im * num_im) / (den_re * den_re + den_im * den_im)).sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;

    const FS: f32 = 48000.0;

    fn db(gain: f64) -> f64 {
        20.0 * gain.log10()
    }

    #[test]
    fn test_peak_hits_target_gain_at_center() {
        for &(freq, gain, q) in &[
            (100.0, 6.0, 0.7),
            (1000.0, -12.0, 1.0),
            (5000.0, 18.0, 4.0),
            (15000.0, -3.5, 2.0),
        ] {
            let c = make_peak(freq, gain, q, FS).unwrap();
            let measured = db(section_magnitude(&c, freq as f64, FS as f64));
            assert!(
                (measured - gain as f64).abs() < 0.05,
                "peak {freq}Hz {gain}dB measured {measured}dB"
            );
        }
    }

    #[test]
    fn test_peak_unity_gain_is_identity() {
        for gain in [0.0, 5e-6, -9e-6] {
            let c = make_peak(1000.0, gain, 1.0, FS).unwrap();
            assert_eq!((c.b0, c.b1, c.b2, c.a1, c.a2), (1.0, 0.0, 0.0, 0.0, 0.0));
        }
    }

    #[test]
    fn test_peak_clamps_near_nyquist() {
        let near = make_peak(23_500.0, 6.0, 1.0, FS).unwrap();
        let limit = make_peak(FS * 0.5 * PEAK_NYQUIST_LIMIT, 6.0, 1.0, FS).unwrap();
        assert_eq!(near.b0.to_bits(), limit.b0.to_bits());
        assert_eq!(near.a1.to_bits(), limit.a1.to_bits());
    }

    #[test]
    fn test_invalid_inputs_rejected() {
        assert!(matches!(
            make_peak(0.0, 3.0, 1.0, FS),
            Err(DesignError::InvalidFrequency { .. })
        ));
        assert!(matches!(
            make_peak(24_000.0, 3.0, 1.0, FS),
            Err(DesignError::InvalidFrequency { .. })
        ));
        assert!(matches!(
            make_peak(1000.0, 3.0, 0.0, FS),
            Err(DesignError::InvalidQ(_))
        ));
        assert!(matches!(
            make_shelf(1000.0, f32::NAN, 1.0, FS, ShelfKind::Low),
            Err(DesignError::InvalidGain(_))
        ));
        assert!(matches!(
            make_cut_cascade(-10.0, Slope::Db12, FS, CutKind::Low),
            Err(DesignError::InvalidFrequency { .. })
        ));
        assert!(matches!(
            make_cut_cascade(100.0, Slope::Db12, 0.0, CutKind::Low),
            Err(DesignError::InvalidSampleRate(_))
        ));
    }

    #[test]
    fn test_shelf_gains_at_extremes() {
        let low = make_shelf(200.0, 6.0, 0.707, FS, ShelfKind::Low).unwrap();
        assert!((db(section_magnitude(&low, 10.0, FS as f64)) - 6.0).abs() < 0.1);
        assert!(db(section_magnitude(&low, 15_000.0, FS as f64)).abs() < 0.1);

        let high = make_shelf(4000.0, -9.0, 0.707, FS, ShelfKind::High).unwrap();
        assert!((db(section_magnitude(&high, 23_000.0, FS as f64)) + 9.0).abs() < 0.3);
        assert!(db(section_magnitude(&high, 50.0, FS as f64)).abs() < 0.1);
    }

    #[test]
    fn test_cut_cascade_section_counts() {
        for slope in Slope::ALL {
            for kind in [CutKind::Low, CutKind::High] {
                let cascade = make_cut_cascade(1000.0, slope, FS, kind).unwrap();
                assert_eq!(cascade.len(), slope.order());
                assert_eq!(cascade.iter().count(), slope.order());
            }
        }
    }

    #[test]
    fn test_cut_cascade_is_minus_3db_at_corner() {
        for slope in Slope::ALL {
            let cascade = make_cut_cascade(1000.0, slope, FS, CutKind::Low).unwrap();
            let total: f64 = cascade
                .iter()
                .map(|c| section_magnitude(c, 1000.0, FS as f64))
                .product();
            assert!((db(total) + 3.01).abs() < 0.1, "{slope:?}: {}", db(total));
        }
    }

    #[test]
    fn test_cut_cascade_slope_steepens_with_order() {
        let attenuation = |slope| {
            let cascade = make_cut_cascade(2000.0, slope, FS, CutKind::High).unwrap();
            db(cascade
                .iter()
                .map(|c| section_magnitude(c, 8000.0, FS as f64))
                .product())
        };
        let a12 = attenuation(Slope::Db12);
        let a48 = attenuation(Slope::Db48);
        assert!(a12 < -20.0, "12dB/oct two octaves up: {a12}");
        assert!(a48 < a12 - 60.0, "48dB/oct should be much steeper: {a48}");
    }

    #[test]
    fn test_butterworth_q_single_section() {
        assert!((butterworth_q(0, 1) - std::f64::consts::FRAC_1_SQRT_2).abs() < 1e-12);
    }
}
