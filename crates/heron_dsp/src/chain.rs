//! Multiband Filter Chain
//!
//! Eight positions in fixed order:
//!
//! ```text
//! LowCut(x4) -> LowShelf -> Peak1 -> Peak2 -> Peak3 -> Peak4 -> HighShelf -> HighCut(x4)
//! ```
//!
//! Each position is independently bypassable. Cut positions hold four
//! second-order sections of which the first `slope.order()` are active.
//!
//! One chain processes one channel. Coefficients are swapped between blocks as
//! complete `Copy` records, never field by field.

use biquad::{Biquad, Coefficients, DirectForm2Transposed};

use crate::design::{self, CutCascade, CutKind, ShelfKind};
use crate::error::DesignError;
use crate::settings::{BandSettings, CutSettings, FilterSettings, MAX_CUT_SECTIONS, PEAK_BANDS};

/// A position in the chain
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChainPosition {
    LowCut,
    LowShelf,
    /// Peak band 0..PEAK_BANDS
    Peak(usize),
    HighShelf,
    HighCut,
}

impl ChainPosition {
    /// All positions in processing order
    pub const ALL: [ChainPosition; 4 + PEAK_BANDS] = [
        ChainPosition::LowCut,
        ChainPosition::LowShelf,
        ChainPosition::Peak(0),
        ChainPosition::Peak(1),
        ChainPosition::Peak(2),
        ChainPosition::Peak(3),
        ChainPosition::HighShelf,
        ChainPosition::HighCut,
    ];
}

/// One biquad section with its delay state
pub struct FilterStage {
    coeffs: Coefficients<f32>,
    // DirectForm2Transposed: better numerical stability than DF1
    filter: DirectForm2Transposed<f32>,
    bypassed: bool,
}

impl FilterStage {
    fn new() -> Self {
        let coeffs = design::identity();
        Self {
            coeffs,
            filter: DirectForm2Transposed::<f32>::new(coeffs),
            bypassed: true,
        }
    }

    /// Replace the coefficient set; delay registers are kept
    #[inline]
    fn set_coefficients(&mut self, coeffs: Coefficients<f32>) {
        self.coeffs = coeffs;
        self.filter.update_coefficients(coeffs);
    }

    #[inline]
    fn process(&mut self, sample: f32) -> f32 {
        if self.bypassed {
            sample
        } else {
            self.filter.run(sample)
        }
    }

    pub fn coefficients(&self) -> Coefficients<f32> {
        self.coeffs
    }

    pub fn is_bypassed(&self) -> bool {
        self.bypassed
    }
}

/// Designed coefficients for every position, computed before anything is committed
struct ChainDesign {
    low_cut: Option<CutCascade>,
    low_shelf: Option<Coefficients<f32>>,
    peaks: [Option<Coefficients<f32>>; PEAK_BANDS],
    high_shelf: Option<Coefficients<f32>>,
    high_cut: Option<CutCascade>,
}

impl ChainDesign {
    fn new(settings: &FilterSettings, sample_rate: f32) -> Result<Self, DesignError> {
        let cut = |band: &CutSettings, kind| {
            if band.bypassed {
                Ok(None)
            } else {
                design::make_cut_cascade(band.frequency_hz, band.slope, sample_rate, kind).map(Some)
            }
        };
        let shelf = |band: &BandSettings, kind| {
            if band.bypassed {
                Ok(None)
            } else {
                design::make_shelf(band.frequency_hz, band.gain_db, band.q, sample_rate, kind)
                    .map(Some)
            }
        };
        let peak = |band: &BandSettings| {
            if band.bypassed {
                Ok(None)
            } else {
                design::make_peak(band.frequency_hz, band.gain_db, band.q, sample_rate).map(Some)
            }
        };

        let mut peaks = [None; PEAK_BANDS];
        for (slot, band) in peaks.iter_mut().zip(settings.peaks.iter()) {
            *slot = peak(band)?;
        }

        Ok(Self {
            low_cut: cut(&settings.low_cut, CutKind::Low)?,
            low_shelf: shelf(&settings.low_shelf, ShelfKind::Low)?,
            peaks,
            high_shelf: shelf(&settings.high_shelf, ShelfKind::High)?,
            high_cut: cut(&settings.high_cut, CutKind::High)?,
        })
    }
}

fn commit_single(stage: &mut FilterStage, coeffs: Option<Coefficients<f32>>) {
    match coeffs {
        Some(coeffs) => {
            stage.set_coefficients(coeffs);
            stage.bypassed = false;
        }
        None => stage.bypassed = true,
    }
}

/// Activate the first `cascade.len()` sections and force the rest to bypass.
/// Deactivated sections keep their state so re-enabling them is not a reset.
fn commit_cascade(sections: &mut [FilterStage; MAX_CUT_SECTIONS], cascade: Option<CutCascade>) {
    let active = cascade.as_ref().map_or(&[][..], CutCascade::as_slice);
    for (index, section) in sections.iter_mut().enumerate() {
        match active.get(index) {
            Some(coeffs) => {
                section.set_coefficients(*coeffs);
                section.bypassed = false;
            }
            None => section.bypassed = true,
        }
    }
}

/// Single-channel multiband EQ
///
/// Designed for real-time use: `process_*` never allocates, locks or fails.
pub struct FilterChain {
    low_cut: [FilterStage; MAX_CUT_SECTIONS],
    low_shelf: FilterStage,
    peaks: [FilterStage; PEAK_BANDS],
    high_shelf: FilterStage,
    high_cut: [FilterStage; MAX_CUT_SECTIONS],
}

impl Default for FilterChain {
    fn default() -> Self {
        Self::new()
    }
}

impl FilterChain {
    /// Create a chain with every position bypassed
    pub fn new() -> Self {
        Self {
            low_cut: core::array::from_fn(|_| FilterStage::new()),
            low_shelf: FilterStage::new(),
            peaks: core::array::from_fn(|_| FilterStage::new()),
            high_shelf: FilterStage::new(),
            high_cut: core::array::from_fn(|_| FilterStage::new()),
        }
    }

    /// Create a chain already configured with `settings`
    pub fn with_settings(settings: &FilterSettings, sample_rate: f32) -> Result<Self, DesignError> {
        let mut chain = Self::new();
        chain.apply_settings(settings, sample_rate)?;
        Ok(chain)
    }

    /// Recompute and install coefficients for every active position
    ///
    /// All positions are designed first; if any fails, the chain is left exactly
    /// as it was. Does not allocate, so the audio thread may call this between
    /// blocks.
    pub fn apply_settings(
        &mut self,
        settings: &FilterSettings,
        sample_rate: f32,
    ) -> Result<(), DesignError> {
        let design = ChainDesign::new(settings, sample_rate)?;

        commit_cascade(&mut self.low_cut, design.low_cut);
        commit_single(&mut self.low_shelf, design.low_shelf);
        for (stage, coeffs) in self.peaks.iter_mut().zip(design.peaks) {
            commit_single(stage, coeffs);
        }
        commit_single(&mut self.high_shelf, design.high_shelf);
        commit_cascade(&mut self.high_cut, design.high_cut);

        Ok(())
    }

    /// Run one sample through every non-bypassed stage in position order
    ///
    /// # Real-time Safety
    /// No allocations, no syscalls, O(1) time.
    #[inline]
    pub fn process_sample(&mut self, sample: f32) -> f32 {
        let mut x = sample;
        for stage in self.low_cut.iter_mut() {
            x = stage.process(x);
        }
        x = self.low_shelf.process(x);
        for stage in self.peaks.iter_mut() {
            x = stage.process(x);
        }
        x = self.high_shelf.process(x);
        for stage in self.high_cut.iter_mut() {
            x = stage.process(x);
        }
        x
    }

    /// Process a mono buffer in-place
    #[inline]
    pub fn process_block(&mut self, samples: &mut [f32]) {
        for sample in samples.iter_mut() {
            *sample = self.process_sample(*sample);
        }
    }

    /// Product of every active stage's analytic magnitude at `frequency`
    ///
    /// Used by the analysis path only, never by `process_*`.
    pub fn magnitude_response_at(&self, frequency: f64, sample_rate: f64) -> f64 {
        self.stages()
            .filter(|stage| !stage.bypassed)
            .map(|stage| design::section_magnitude(&stage.coeffs, frequency, sample_rate))
            .product()
    }

    /// Clear the delay registers of every stage
    ///
    /// Call when the stream restarts to prevent ringing from stale state.
    pub fn reset(&mut self) {
        for stage in self.stages_mut() {
            stage.filter.reset_state();
        }
    }

    /// Whether every section at `position` is bypassed
    pub fn is_bypassed(&self, position: ChainPosition) -> bool {
        self.position(position).iter().all(FilterStage::is_bypassed)
    }

    /// Number of non-bypassed sections at `position`
    pub fn active_sections(&self, position: ChainPosition) -> usize {
        self.position(position)
            .iter()
            .filter(|stage| !stage.bypassed)
            .count()
    }

    /// Sections at `position` (four for cuts, one otherwise)
    ///
    /// # Panics
    /// Panics if a peak index is out of range.
    pub fn position(&self, position: ChainPosition) -> &[FilterStage] {
        match position {
            ChainPosition::LowCut => &self.low_cut,
            ChainPosition::LowShelf => std::slice::from_ref(&self.low_shelf),
            ChainPosition::Peak(index) => std::slice::from_ref(&self.peaks[index]),
            ChainPosition::HighShelf => std::slice::from_ref(&self.high_shelf),
            ChainPosition::HighCut => &self.high_cut,
        }
    }

    /// Coefficients of one section, `None` if `section` is out of range
    pub fn coefficients(&self, position: ChainPosition, section: usize) -> Option<Coefficients<f32>> {
        self.position(position)
            .get(section)
            .map(FilterStage::coefficients)
    }

    fn stages(&self) -> impl Iterator<Item = &FilterStage> {
        self.low_cut
            .iter()
            .chain(std::iter::once(&self.low_shelf))
            .chain(self.peaks.iter())
            .chain(std::iter::once(&self.high_shelf))
            .chain(self.high_cut.iter())
    }

    fn stages_mut(&mut self) -> impl Iterator<Item = &mut FilterStage> {
        self.low_cut
            .iter_mut()
            .chain(std::iter::once(&mut self.low_shelf))
            .chain(self.peaks.iter_mut())
            .chain(std::iter::once(&mut self.high_shelf))
            .chain(self.high_cut.iter_mut())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::Slope;

    const FS: f32 = 48000.0;

    fn sine(freq: f32, len: usize) -> Vec<f32> {
        (0..len)
            .map(|i| (2.0 * std::f32::consts::PI * freq * i as f32 / FS).sin() * 0.5)
            .collect()
    }

    fn rms(samples: &[f32]) -> f32 {
        (samples.iter().map(|s| s * s).sum::<f32>() / samples.len() as f32).sqrt()
    }

    fn section_bits(stage: &FilterStage) -> [u32; 5] {
        let c = stage.coeffs;
        [c.b0.to_bits(), c.b1.to_bits(), c.b2.to_bits(), c.a1.to_bits(), c.a2.to_bits()]
    }

    fn coeff_bits(chain: &FilterChain) -> Vec<[u32; 5]> {
        chain.stages().map(section_bits).collect()
    }

    #[test]
    fn test_new_chain_is_exact_passthrough() {
        let mut chain = FilterChain::new();
        let input = sine(440.0, 256);
        let mut output = input.clone();
        chain.process_block(&mut output);
        assert_eq!(input, output);
        assert_eq!(chain.magnitude_response_at(1000.0, FS as f64), 1.0);
    }

    #[test]
    fn test_peak_only_response_matches_gain() {
        for (freq, gain) in [(200.0_f32, 9.0_f32), (3000.0, -6.0), (12000.0, 4.5)] {
            let mut settings = FilterSettings::all_bypassed();
            settings.peaks[1] = BandSettings::new(freq).with_gain(gain).with_q(1.4);
            let chain = FilterChain::with_settings(&settings, FS).unwrap();

            let db = 20.0 * chain.magnitude_response_at(freq as f64, FS as f64).log10();
            assert!((db - gain as f64).abs() < 0.05, "{freq}Hz: {db} vs {gain}");
        }
    }

    #[test]
    fn test_unity_peak_is_passthrough_everywhere() {
        let mut settings = FilterSettings::all_bypassed();
        settings.peaks[0] = BandSettings::new(1000.0).with_gain(1e-6).with_q(2.0);
        let mut chain = FilterChain::with_settings(&settings, FS).unwrap();

        assert!(!chain.is_bypassed(ChainPosition::Peak(0)));
        for freq in [20.0, 100.0, 1000.0, 10_000.0, 20_000.0] {
            assert_eq!(chain.magnitude_response_at(freq, FS as f64), 1.0);
        }

        let input = sine(1000.0, 512);
        let mut output = input.clone();
        chain.process_block(&mut output);
        assert_eq!(input, output);
    }

    #[test]
    fn test_cut_slope_activates_exact_section_count() {
        for slope in Slope::ALL {
            let mut settings = FilterSettings::all_bypassed();
            settings.low_cut = CutSettings::new(100.0, slope);
            settings.high_cut = CutSettings::new(10_000.0, slope);
            let chain = FilterChain::with_settings(&settings, FS).unwrap();

            for position in [ChainPosition::LowCut, ChainPosition::HighCut] {
                let sections = chain.position(position);
                assert_eq!(chain.active_sections(position), slope.order());
                for (index, section) in sections.iter().enumerate() {
                    assert_eq!(section.is_bypassed(), index >= slope.order());
                }
            }
        }
    }

    #[test]
    fn test_lowering_slope_bypasses_trailing_sections() {
        let mut settings = FilterSettings::all_bypassed();
        settings.low_cut = CutSettings::new(200.0, Slope::Db48);
        let mut chain = FilterChain::with_settings(&settings, FS).unwrap();
        assert_eq!(chain.active_sections(ChainPosition::LowCut), 4);

        settings.low_cut.slope = Slope::Db24;
        chain.apply_settings(&settings, FS).unwrap();
        assert_eq!(chain.active_sections(ChainPosition::LowCut), 2);

        settings.low_cut.bypassed = true;
        chain.apply_settings(&settings, FS).unwrap();
        assert!(chain.is_bypassed(ChainPosition::LowCut));
    }

    #[test]
    fn test_deactivated_sections_keep_state_across_slope_changes() {
        let mut steep = FilterSettings::all_bypassed();
        steep.high_cut = CutSettings::new(5000.0, Slope::Db48);
        let mut shallow = steep;
        shallow.high_cut.slope = Slope::Db24;

        let mut reference = FilterChain::with_settings(&steep, FS).unwrap();
        let mut chain = FilterChain::with_settings(&steep, FS).unwrap();
        let dc = vec![0.5_f32; 4800];
        let mut scratch = dc.clone();
        reference.process_block(&mut scratch);
        let mut scratch = dc.clone();
        chain.process_block(&mut scratch);

        let trailing: Vec<([u32; 5], f32, f32)> = chain.high_cut[2..]
            .iter()
            .map(|s| (section_bits(s), s.filter.s1, s.filter.s2))
            .collect();
        assert!(trailing.iter().all(|(_, s1, s2)| *s1 != 0.0 && *s2 != 0.0));

        chain.apply_settings(&shallow, FS).unwrap();
        let mut scratch = dc.clone();
        chain.process_block(&mut scratch);
        for (section, (bits, s1, s2)) in chain.high_cut[2..].iter().zip(&trailing) {
            assert!(section.is_bypassed());
            assert_eq!(section_bits(section), *bits);
            assert_eq!((section.filter.s1, section.filter.s2), (*s1, *s2));
        }

        // Same history, but the trailing sections start from silence
        chain.apply_settings(&steep, FS).unwrap();
        let mut reset = FilterChain::with_settings(&steep, FS).unwrap();
        for (dst, src) in reset.stages_mut().zip(chain.stages()) {
            dst.filter.s1 = src.filter.s1;
            dst.filter.s2 = src.filter.s2;
        }
        for section in &mut reset.high_cut[2..] {
            section.filter.s1 = 0.0;
            section.filter.s2 = 0.0;
        }

        let mut expected = dc.clone();
        reference.process_block(&mut expected);
        let mut kept = dc.clone();
        chain.process_block(&mut kept);
        let mut restarted = dc.clone();
        reset.process_block(&mut restarted);

        let deviation = |out: &[f32]| {
            out.iter()
                .zip(&expected)
                .map(|(a, b)| (a - b).abs())
                .fold(0.0_f32, f32::max)
        };
        let kept_dev = deviation(&kept);
        let reset_dev = deviation(&restarted);
        assert!(reset_dev > 0.3, "reset transient {reset_dev}");
        assert!(
            kept_dev < 0.5 * reset_dev,
            "re-enabled sections glitch like a reset: {kept_dev} vs {reset_dev}"
        );
        assert!((kept[4799] - expected[4799]).abs() < 1e-3);
    }

    #[test]
    fn test_apply_settings_is_idempotent() {
        let mut settings = FilterSettings::default();
        settings.low_cut = CutSettings::new(60.0, Slope::Db36);
        settings.peaks[2] = BandSettings::new(2500.0).with_gain(-4.0).with_q(3.0);
        settings.high_shelf = BandSettings::new(9000.0).with_gain(3.0).with_q(0.7);

        let mut once = FilterChain::with_settings(&settings, FS).unwrap();
        let mut twice = FilterChain::with_settings(&settings, FS).unwrap();
        let before = coeff_bits(&twice);
        twice.apply_settings(&settings, FS).unwrap();
        assert_eq!(before, coeff_bits(&twice));

        let input = sine(700.0, 1024);
        let mut out_once = input.clone();
        let mut out_twice = input;
        once.process_block(&mut out_once);
        twice.process_block(&mut out_twice);
        assert_eq!(out_once, out_twice);
    }

    #[test]
    fn test_failed_apply_leaves_chain_untouched() {
        let mut settings = FilterSettings::all_bypassed();
        settings.peaks[0] = BandSettings::new(1000.0).with_gain(6.0);
        let mut chain = FilterChain::with_settings(&settings, FS).unwrap();
        let before = coeff_bits(&chain);

        let mut bad = settings;
        bad.peaks[0].gain_db = -3.0;
        bad.high_cut = CutSettings::new(30_000.0, Slope::Db12);
        assert!(chain.apply_settings(&bad, FS).is_err());

        assert_eq!(before, coeff_bits(&chain));
        assert!(chain.is_bypassed(ChainPosition::HighCut));
    }

    #[test]
    fn test_low_cut_attenuates_low_tone() {
        let mut settings = FilterSettings::all_bypassed();
        settings.low_cut = CutSettings::new(1000.0, Slope::Db24);

        let measure = |freq: f32| {
            let mut chain = FilterChain::with_settings(&settings, FS).unwrap();
            let mut block = sine(freq, 48000);
            chain.process_block(&mut block);
            // Skip the transient
            rms(&block[24000..])
        };

        let low = measure(100.0);
        let high = measure(5000.0);
        let difference_db = 20.0 * (high / low).log10();
        assert!(difference_db > 20.0, "only {difference_db}dB apart");
    }

    #[test]
    fn test_bypassed_positions_excluded_from_response() {
        let mut settings = FilterSettings::all_bypassed();
        settings.low_shelf = BandSettings::new(150.0).with_gain(12.0).with_q(0.7).bypass(true);
        let chain = FilterChain::with_settings(&settings, FS).unwrap();
        assert_eq!(chain.magnitude_response_at(50.0, FS as f64), 1.0);
    }

    #[test]
    fn test_reset_keeps_coefficients() {
        let mut settings = FilterSettings::all_bypassed();
        settings.peaks[3] = BandSettings::new(4000.0).with_gain(6.0);
        let mut chain = FilterChain::with_settings(&settings, FS).unwrap();
        let before = coeff_bits(&chain);

        let mut block = sine(4000.0, 256);
        chain.process_block(&mut block);
        chain.reset();

        assert_eq!(before, coeff_bits(&chain));
        assert!(chain.process_sample(0.0).abs() < f32::EPSILON);
    }
}
