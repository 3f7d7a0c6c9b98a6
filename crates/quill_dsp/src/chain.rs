//! Filter chain
//!
//! The runtime EQ topology: LowCut (4 stages) -> Peak (1 stage) ->
//! HighCut (4 stages). Each stage is one BiQuad; cut slopes are realized
//! by enabling 1..=4 stages of a group, never by reallocating the chain.
//!
//! Coefficient hot-swaps arrive as `Copy` [`ChainUpdate`] values and are
//! applied by the thread that owns the chain between samples, so a running
//! chain never observes a torn coefficient set.

use std::sync::atomic::{AtomicBool, Ordering};

use biquad::{Biquad, Coefficients, DirectForm2Transposed};

use crate::design::{
    self, identity_coefficients, ChainSettings, CutCoefficients,
};
use crate::error::DspError;

/// The three stage groups of the chain, in processing order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChainPosition {
    LowCut,
    Peak,
    HighCut,
}

/// A single biquad processing unit: filter state, the installed
/// coefficient record, and a bypass flag readable from other threads.
pub struct FilterStage {
    // DirectForm2Transposed: better numerical stability than DF1
    filter: DirectForm2Transposed<f32>,
    coefficients: Coefficients<f32>,
    bypassed: AtomicBool,
}

impl FilterStage {
    fn new() -> Self {
        let coefficients = identity_coefficients();
        Self {
            filter: DirectForm2Transposed::<f32>::new(coefficients),
            coefficients,
            bypassed: AtomicBool::new(true),
        }
    }

    /// Replace the installed coefficients. The stored record is what
    /// `coefficients()` reads back, bit for bit.
    fn install(&mut self, coefficients: Coefficients<f32>) {
        self.filter.update_coefficients(coefficients);
        self.coefficients = coefficients;
    }

    fn set_bypassed(&self, bypassed: bool) {
        self.bypassed.store(bypassed, Ordering::Release);
    }

    pub fn is_bypassed(&self) -> bool {
        self.bypassed.load(Ordering::Acquire)
    }

    pub fn coefficients(&self) -> &Coefficients<f32> {
        &self.coefficients
    }

    #[inline]
    fn run(&mut self, sample: f32) -> f32 {
        if self.bypassed.load(Ordering::Relaxed) {
            sample
        } else {
            self.filter.run(sample)
        }
    }

    fn reset(&mut self) {
        self.filter.reset_state();
    }
}

/// Coefficient/bypass replacement message for a running chain.
///
/// `Copy`, so it moves through the lock-free update fifo without heap
/// traffic; the audio callback drains pending updates at block start.
#[derive(Clone, Copy)]
pub enum ChainUpdate {
    Peak(Coefficients<f32>),
    LowCut(CutCoefficients),
    HighCut(CutCoefficients),
    Bypass {
        position: ChainPosition,
        bypassed: bool,
    },
}

/// One channel's cascade of filter stages.
///
/// Stereo uses two instances fed the same updates: coefficients are shared
/// by value, delay-line state never is.
pub struct MonoChain {
    low_cut: [FilterStage; 4],
    peak: FilterStage,
    high_cut: [FilterStage; 4],
    low_cut_bypassed: AtomicBool,
    peak_bypassed: AtomicBool,
    high_cut_bypassed: AtomicBool,
}

impl MonoChain {
    /// A flat chain: every stage bypassed, identity coefficients.
    pub fn new() -> Self {
        Self {
            low_cut: core::array::from_fn(|_| FilterStage::new()),
            peak: FilterStage::new(),
            high_cut: core::array::from_fn(|_| FilterStage::new()),
            low_cut_bypassed: AtomicBool::new(false),
            peak_bypassed: AtomicBool::new(false),
            high_cut_bypassed: AtomicBool::new(false),
        }
    }

    /// Bypass or enable a whole stage group.
    pub fn set_bypassed(&self, position: ChainPosition, bypassed: bool) {
        self.group_flag(position).store(bypassed, Ordering::Release);
    }

    pub fn is_bypassed(&self, position: ChainPosition) -> bool {
        self.group_flag(position).load(Ordering::Acquire)
    }

    fn group_flag(&self, position: ChainPosition) -> &AtomicBool {
        match position {
            ChainPosition::LowCut => &self.low_cut_bypassed,
            ChainPosition::Peak => &self.peak_bypassed,
            ChainPosition::HighCut => &self.high_cut_bypassed,
        }
    }

    /// Install new peak coefficients and mark the stage live.
    pub fn update_peak(&mut self, coefficients: Coefficients<f32>) {
        self.peak.install(coefficients);
        self.peak.set_bypassed(false);
    }

    /// Install a cut cascade into the low-cut group.
    pub fn update_low_cut(&mut self, coefficients: &CutCoefficients) {
        Self::update_cut(&mut self.low_cut, coefficients);
    }

    /// Install a cut cascade into the high-cut group.
    pub fn update_high_cut(&mut self, coefficients: &CutCoefficients) {
        Self::update_cut(&mut self.high_cut, coefficients);
    }

    /// Bypass every stage of the group first, then enable stages from the
    /// lowest index up. A stage `k` being active therefore always implies
    /// stages below `k` are active; the remaining stages keep their old
    /// coefficients but are inert while bypassed.
    fn update_cut(stages: &mut [FilterStage; 4], coefficients: &CutCoefficients) {
        for stage in stages.iter_mut() {
            stage.set_bypassed(true);
        }
        for k in 0..coefficients.len.min(stages.len()) {
            stages[k].install(coefficients.sections[k]);
            stages[k].set_bypassed(false);
        }
    }

    /// Apply one hot-swap message.
    pub fn apply(&mut self, update: ChainUpdate) {
        match update {
            ChainUpdate::Peak(coefficients) => self.update_peak(coefficients),
            ChainUpdate::LowCut(coefficients) => self.update_low_cut(&coefficients),
            ChainUpdate::HighCut(coefficients) => self.update_high_cut(&coefficients),
            ChainUpdate::Bypass { position, bypassed } => self.set_bypassed(position, bypassed),
        }
    }

    /// Redesign every group from a settings snapshot. Used for the display
    /// chain and at prepare time; the live audio chains receive the same
    /// coefficients as [`ChainUpdate`]s instead.
    pub fn update_from_settings(
        &mut self,
        settings: &ChainSettings,
        sample_rate: f32,
    ) -> Result<(), DspError> {
        self.update_peak(design::design_peak_filter(settings, sample_rate)?);
        self.update_low_cut(&design::design_low_cut_filter(settings, sample_rate)?);
        self.update_high_cut(&design::design_high_cut_filter(settings, sample_rate)?);

        self.set_bypassed(ChainPosition::LowCut, settings.low_cut_bypassed);
        self.set_bypassed(ChainPosition::Peak, settings.peak_bypassed);
        self.set_bypassed(ChainPosition::HighCut, settings.high_cut_bypassed);
        Ok(())
    }

    /// Cascade one sample through LowCut -> Peak -> HighCut.
    ///
    /// # Real-time Safety
    /// No allocations, no syscalls, no locks.
    #[inline]
    pub fn process_sample(&mut self, input: f32) -> f32 {
        let mut sample = input;

        if !self.low_cut_bypassed.load(Ordering::Relaxed) {
            for stage in self.low_cut.iter_mut() {
                sample = stage.run(sample);
            }
        }
        if !self.peak_bypassed.load(Ordering::Relaxed) {
            sample = self.peak.run(sample);
        }
        if !self.high_cut_bypassed.load(Ordering::Relaxed) {
            for stage in self.high_cut.iter_mut() {
                sample = stage.run(sample);
            }
        }

        sample
    }

    /// Process a mono buffer in place.
    #[inline]
    pub fn process_buffer(&mut self, samples: &mut [f32]) {
        for sample in samples.iter_mut() {
            *sample = self.process_sample(*sample);
        }
    }

    /// Number of live (not bypassed) stages in a group.
    pub fn active_stages(&self, position: ChainPosition) -> usize {
        match position {
            ChainPosition::Peak => usize::from(!self.peak.is_bypassed()),
            ChainPosition::LowCut => {
                self.low_cut.iter().filter(|s| !s.is_bypassed()).count()
            }
            ChainPosition::HighCut => {
                self.high_cut.iter().filter(|s| !s.is_bypassed()).count()
            }
        }
    }

    /// Bypass state of one stage within a group. For `Peak` the index is
    /// ignored; the group has a single stage.
    pub fn is_stage_bypassed(&self, position: ChainPosition, index: usize) -> bool {
        match position {
            ChainPosition::Peak => self.peak.is_bypassed(),
            ChainPosition::LowCut => self.low_cut[index].is_bypassed(),
            ChainPosition::HighCut => self.high_cut[index].is_bypassed(),
        }
    }

    /// Installed coefficients of one stage (the last value passed to an
    /// update, regardless of bypass state).
    pub fn stage_coefficients(
        &self,
        position: ChainPosition,
        index: usize,
    ) -> &Coefficients<f32> {
        match position {
            ChainPosition::Peak => self.peak.coefficients(),
            ChainPosition::LowCut => self.low_cut[index].coefficients(),
            ChainPosition::HighCut => self.high_cut[index].coefficients(),
        }
    }

    /// Analytic magnitude of the whole chain at `frequency` Hz: the product
    /// over every active, non-bypassed stage.
    pub fn magnitude_at(&self, frequency: f64, sample_rate: f64) -> f64 {
        let mut magnitude = 1.0;

        if !self.is_bypassed(ChainPosition::Peak) && !self.peak.is_bypassed() {
            magnitude *=
                design::magnitude_for_frequency(self.peak.coefficients(), frequency, sample_rate);
        }
        if !self.is_bypassed(ChainPosition::LowCut) {
            for stage in self.low_cut.iter().filter(|s| !s.is_bypassed()) {
                magnitude *=
                    design::magnitude_for_frequency(stage.coefficients(), frequency, sample_rate);
            }
        }
        if !self.is_bypassed(ChainPosition::HighCut) {
            for stage in self.high_cut.iter().filter(|s| !s.is_bypassed()) {
                magnitude *=
                    design::magnitude_for_frequency(stage.coefficients(), frequency, sample_rate);
            }
        }

        magnitude
    }

    /// Clear every delay line (call when the audio source changes).
    pub fn reset(&mut self) {
        for stage in self.low_cut.iter_mut() {
            stage.reset();
        }
        self.peak.reset();
        for stage in self.high_cut.iter_mut() {
            stage.reset();
        }
    }
}

impl Default for MonoChain {
    fn default() -> Self {
        Self::new()
    }
}

/// The stereo EQ: two independent mono chains fed identical updates.
///
/// Designed for real-time use: nothing in the process path allocates.
pub struct EqProcessor {
    left: MonoChain,
    right: MonoChain,
    sample_rate: f32,
}

impl EqProcessor {
    /// Create a processor with the default (flat) settings installed.
    pub fn new(sample_rate: f32) -> Self {
        let mut processor = Self {
            left: MonoChain::new(),
            right: MonoChain::new(),
            sample_rate,
        };
        processor
            .apply_settings(&ChainSettings::default())
            .expect("default settings always produce valid coefficients");
        processor
    }

    /// Rebuild every rate-dependent design and clear filter state. Called
    /// only at the host's prepare transition, never mid-block.
    pub fn prepare(
        &mut self,
        sample_rate: f32,
        settings: &ChainSettings,
    ) -> Result<(), DspError> {
        if !(sample_rate > 0.0) {
            return Err(DspError::InvalidSampleRate(sample_rate));
        }
        self.sample_rate = sample_rate;
        self.apply_settings(settings)?;
        self.reset();
        Ok(())
    }

    /// Design coefficients from a settings snapshot and install them into
    /// both channels.
    pub fn apply_settings(&mut self, settings: &ChainSettings) -> Result<(), DspError> {
        self.left.update_from_settings(settings, self.sample_rate)?;
        self.right.update_from_settings(settings, self.sample_rate)?;
        Ok(())
    }

    /// Apply one hot-swap message to both channels.
    pub fn apply_update(&mut self, update: ChainUpdate) {
        self.left.apply(update);
        self.right.apply(update);
    }

    /// Process one stereo frame.
    #[inline]
    pub fn process_frame(&mut self, left: f32, right: f32) -> (f32, f32) {
        (
            self.left.process_sample(left),
            self.right.process_sample(right),
        )
    }

    /// Process an interleaved stereo buffer in place: [L0, R0, L1, R1, ...]
    #[inline]
    pub fn process_interleaved(&mut self, buffer: &mut [f32]) {
        for frame in buffer.chunks_exact_mut(2) {
            let (l, r) = self.process_frame(frame[0], frame[1]);
            frame[0] = l;
            frame[1] = r;
        }
    }

    /// Process separate left/right channel buffers.
    #[inline]
    pub fn process_planar(&mut self, left: &mut [f32], right: &mut [f32]) {
        debug_assert_eq!(left.len(), right.len(), "channel buffers must match");

        for (l, r) in left.iter_mut().zip(right.iter_mut()) {
            let (new_l, new_r) = self.process_frame(*l, *r);
            *l = new_l;
            *r = new_r;
        }
    }

    pub fn left_chain(&self) -> &MonoChain {
        &self.left
    }

    pub fn right_chain(&self) -> &MonoChain {
        &self.right
    }

    pub fn sample_rate(&self) -> f32 {
        self.sample_rate
    }

    /// Clear both channels' delay lines.
    pub fn reset(&mut self) {
        self.left.reset();
        self.right.reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::design::Slope;
    use std::sync::Arc;

    const SAMPLE_RATE: f32 = 48_000.0;

    fn coeff_bits(c: &Coefficients<f32>) -> [u32; 5] {
        [
            c.b0.to_bits(),
            c.b1.to_bits(),
            c.b2.to_bits(),
            c.a1.to_bits(),
            c.a2.to_bits(),
        ]
    }

    #[test]
    fn new_chain_passes_audio_through() {
        let mut chain = MonoChain::new();
        for input in [0.5, -0.25, 1.0, 0.0] {
            assert_eq!(chain.process_sample(input), input);
        }
    }

    #[test]
    fn cut_update_activates_cumulative_stages() {
        // Every slope enables exactly the first slope+1 stages - Db48 must
        // enable all four, not just the highest.
        let mut chain = MonoChain::new();
        let mut settings = ChainSettings {
            low_cut_freq: 100.0,
            ..Default::default()
        };

        for slope in Slope::ALL {
            settings.low_cut_slope = slope;
            let cascade = design::design_low_cut_filter(&settings, SAMPLE_RATE).unwrap();
            chain.update_low_cut(&cascade);

            assert_eq!(chain.active_stages(ChainPosition::LowCut), slope.sections());
            for k in 0..4 {
                assert_eq!(
                    chain.is_stage_bypassed(ChainPosition::LowCut, k),
                    k >= slope.sections(),
                    "slope {:?}, stage {}",
                    slope,
                    k
                );
            }
        }
    }

    #[test]
    fn shrinking_the_slope_leaves_no_gaps() {
        let mut chain = MonoChain::new();
        let mut settings = ChainSettings {
            high_cut_freq: 8000.0,
            high_cut_slope: Slope::Db48,
            ..Default::default()
        };

        let wide = design::design_high_cut_filter(&settings, SAMPLE_RATE).unwrap();
        chain.update_high_cut(&wide);

        settings.high_cut_slope = Slope::Db24;
        let narrow = design::design_high_cut_filter(&settings, SAMPLE_RATE).unwrap();
        chain.update_high_cut(&narrow);

        // An active stage k implies all stages below k are active.
        let mut seen_bypassed = false;
        for k in 0..4 {
            let bypassed = chain.is_stage_bypassed(ChainPosition::HighCut, k);
            assert!(
                !seen_bypassed || bypassed,
                "gap in active stages at index {}",
                k
            );
            seen_bypassed |= bypassed;
        }
        assert_eq!(chain.active_stages(ChainPosition::HighCut), 2);
    }

    #[test]
    fn installed_coefficients_read_back_bit_for_bit() {
        let mut chain = MonoChain::new();
        let settings = ChainSettings {
            peak_freq: 1234.0,
            peak_gain_db: 5.5,
            peak_quality: 2.2,
            ..Default::default()
        };

        let peak = design::design_peak_filter(&settings, SAMPLE_RATE).unwrap();
        chain.update_peak(peak);
        assert_eq!(
            coeff_bits(chain.stage_coefficients(ChainPosition::Peak, 0)),
            coeff_bits(&peak)
        );

        let cascade = design::design_low_cut_filter(&settings, SAMPLE_RATE).unwrap();
        chain.update_low_cut(&cascade);
        assert_eq!(
            coeff_bits(chain.stage_coefficients(ChainPosition::LowCut, 0)),
            coeff_bits(&cascade.sections[0])
        );
    }

    #[test]
    fn group_bypass_restores_passthrough() {
        let mut chain = MonoChain::new();
        let settings = ChainSettings {
            peak_freq: 1000.0,
            peak_gain_db: 24.0,
            ..Default::default()
        };
        chain
            .update_from_settings(&settings, SAMPLE_RATE)
            .unwrap();

        chain.set_bypassed(ChainPosition::LowCut, true);
        chain.set_bypassed(ChainPosition::Peak, true);
        chain.set_bypassed(ChainPosition::HighCut, true);
        chain.reset();

        for input in [0.5, -0.5, 0.1] {
            assert_eq!(chain.process_sample(input), input);
        }
    }

    #[test]
    fn low_cut_removes_dc() {
        let mut chain = MonoChain::new();
        let settings = ChainSettings {
            low_cut_freq: 100.0,
            low_cut_slope: Slope::Db24,
            ..Default::default()
        };
        chain
            .update_from_settings(&settings, SAMPLE_RATE)
            .unwrap();

        let mut out = 0.0;
        for _ in 0..48_000 {
            out = chain.process_sample(1.0);
        }
        assert!(out.abs() < 0.01, "DC leaked through the low cut: {}", out);
    }

    #[test]
    fn peak_boost_raises_tone_amplitude() {
        let mut eq = EqProcessor::new(SAMPLE_RATE);
        let settings = ChainSettings {
            peak_freq: 1000.0,
            peak_gain_db: 12.0,
            peak_quality: 1.0,
            ..Default::default()
        };
        eq.apply_settings(&settings).unwrap();

        let mut max_input = 0.0_f32;
        let mut max_output = 0.0_f32;
        for i in 0..4800 {
            let t = i as f32 / SAMPLE_RATE;
            let sample = (std::f32::consts::TAU * 1000.0 * t).sin() * 0.25;
            max_input = max_input.max(sample.abs());

            let (out, _) = eq.process_frame(sample, sample);
            max_output = max_output.max(out.abs());
        }

        assert!(max_output > max_input * 1.5, "boost had no effect");
    }

    #[test]
    fn channels_keep_independent_state() {
        let mut eq = EqProcessor::new(SAMPLE_RATE);
        let settings = ChainSettings {
            low_cut_freq: 500.0,
            low_cut_slope: Slope::Db48,
            ..Default::default()
        };
        eq.apply_settings(&settings).unwrap();

        // Drive only the left channel; the right stays silent. Shared
        // filter state would bleed energy across.
        let mut right_peak = 0.0_f32;
        for i in 0..2400 {
            let t = i as f32 / SAMPLE_RATE;
            let sample = (std::f32::consts::TAU * 100.0 * t).sin();
            let (_, r) = eq.process_frame(sample, 0.0);
            right_peak = right_peak.max(r.abs());
        }
        assert_eq!(right_peak, 0.0);
    }

    #[test]
    fn apply_update_matches_direct_install() {
        let settings = ChainSettings {
            peak_freq: 2000.0,
            peak_gain_db: -6.0,
            high_cut_freq: 9000.0,
            high_cut_slope: Slope::Db36,
            ..Default::default()
        };
        let peak = design::design_peak_filter(&settings, SAMPLE_RATE).unwrap();
        let high = design::design_high_cut_filter(&settings, SAMPLE_RATE).unwrap();

        let mut via_updates = MonoChain::new();
        via_updates.apply(ChainUpdate::Peak(peak));
        via_updates.apply(ChainUpdate::HighCut(high));

        let mut direct = MonoChain::new();
        direct.update_peak(peak);
        direct.update_high_cut(&high);

        for freq in [100.0, 2000.0, 9000.0, 15_000.0] {
            let a = via_updates.magnitude_at(freq, SAMPLE_RATE as f64);
            let b = direct.magnitude_at(freq, SAMPLE_RATE as f64);
            assert_eq!(a, b);
        }
    }

    #[test]
    fn bypass_flags_are_safe_to_read_concurrently() {
        let chain = Arc::new(MonoChain::new());

        let toggler = {
            let chain = Arc::clone(&chain);
            std::thread::spawn(move || {
                for i in 0..10_000 {
                    chain.set_bypassed(ChainPosition::Peak, i % 2 == 0);
                }
            })
        };

        for _ in 0..10_000 {
            // Either state is valid - the read just has to be consistent.
            let _ = chain.is_bypassed(ChainPosition::Peak);
            let _ = chain.active_stages(ChainPosition::LowCut);
        }

        toggler.join().unwrap();
    }
}
