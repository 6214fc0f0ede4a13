//! Level helpers shared by metering and spectrum code

/// Level reported for silence when no explicit floor is given
pub const SILENCE_DB: f32 = -100.0;

/// Convert decibels to linear amplitude
/// Formula: amplitude = 10^(dB/20)
#[inline]
pub fn db_to_gain(db: f32) -> f32 {
    10.0_f32.powf(db / 20.0)
}

/// Convert linear amplitude to decibels, never going below `floor_db`
///
/// Zero, negative and non-finite gains map to the floor.
#[inline]
pub fn gain_to_db(gain: f32, floor_db: f32) -> f32 {
    if gain > 0.0 && gain.is_finite() {
        (20.0 * gain.log10()).max(floor_db)
    } else {
        floor_db
    }
}

/// Largest absolute sample value
#[inline]
pub fn block_peak(samples: &[f32]) -> f32 {
    samples.iter().fold(0.0_f32, |peak, s| peak.max(s.abs()))
}

/// Root-mean-square level; zero for an empty block
#[inline]
pub fn block_rms(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum: f32 = samples.iter().map(|s| s * s).sum();
    (sum / samples.len() as f32).sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_db_round_numbers() {
        assert!((db_to_gain(-6.0) - 0.501).abs() < 0.001);
        assert!((gain_to_db(0.5, SILENCE_DB) + 6.02).abs() < 0.01);
        assert_eq!(gain_to_db(1.0, SILENCE_DB), 0.0);
    }

    #[test]
    fn test_floor_substitutes_negative_infinity() {
        assert_eq!(gain_to_db(0.0, -48.0), -48.0);
        assert_eq!(gain_to_db(1e-9, -48.0), -48.0);
        assert_eq!(gain_to_db(f32::NAN, -48.0), -48.0);
    }

    #[test]
    fn test_peak_and_rms() {
        let block = [0.5, -1.0, 0.25, 0.0];
        assert_eq!(block_peak(&block), 1.0);
        let square = [0.5, -0.5, 0.5, -0.5];
        assert!((block_rms(&square) - 0.5).abs() < 1e-6);
        assert_eq!(block_rms(&[]), 0.0);
    }
}
