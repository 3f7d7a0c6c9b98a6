//! Filter-coefficient engine
//!
//! Pure functions turning user-facing [`ChainSettings`] into BiQuad
//! coefficient sets, based on the RBJ (Robert Bristow-Johnson) Audio EQ
//! Cookbook designs provided by the `biquad` crate. The peak band is a
//! single parametric bell; the low/high cut filters are Butterworth
//! cascades of second-order sections.
//!
//! All inputs are clamped to a safe range at this boundary so the audio
//! thread can never receive unstable or non-finite coefficients.

use biquad::{Coefficients, ToHertz, Type};
use rustfft::num_complex::Complex64;

use crate::error::DspError;

/// Lower edge of the audible band handled by the EQ (Hz)
pub const MIN_FREQUENCY: f32 = 20.0;

/// Upper edge of the audible band handled by the EQ (Hz)
pub const MAX_FREQUENCY: f32 = 20_000.0;

/// Peak gain range (dB)
pub const MAX_GAIN_DB: f32 = 24.0;

/// Peak Q range; above ~20 the bell becomes numerically fragile
pub const MIN_Q: f32 = 0.1;
pub const MAX_Q: f32 = 20.0;

/// Cut-filter steepness, encoded as the number of extra biquad sections.
///
/// Each section contributes 12 dB/octave, so `Db48` runs four second-order
/// sections (a Butterworth response of order 8).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Slope {
    #[default]
    Db12,
    Db24,
    Db36,
    Db48,
}

impl Slope {
    pub const ALL: [Slope; 4] = [Slope::Db12, Slope::Db24, Slope::Db36, Slope::Db48];

    /// Number of second-order sections realizing this slope.
    pub fn sections(self) -> usize {
        self as usize + 1
    }

    /// Butterworth prototype order (always even).
    pub fn order(self) -> usize {
        2 * self.sections()
    }

    pub fn db_per_octave(self) -> u32 {
        12 * (self as u32 + 1)
    }

    /// Decode a stored slope index (0..=3).
    pub fn from_index(index: usize) -> Option<Self> {
        match index {
            0 => Some(Slope::Db12),
            1 => Some(Slope::Db24),
            2 => Some(Slope::Db36),
            3 => Some(Slope::Db48),
            _ => None,
        }
    }
}

/// Immutable snapshot of every user-facing EQ parameter.
///
/// Recomputed from the authoritative parameter store on demand; carries no
/// identity beyond value equality.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChainSettings {
    pub peak_freq: f32,
    pub peak_gain_db: f32,
    pub peak_quality: f32,
    pub low_cut_freq: f32,
    pub high_cut_freq: f32,
    pub low_cut_slope: Slope,
    pub high_cut_slope: Slope,
    pub low_cut_bypassed: bool,
    pub peak_bypassed: bool,
    pub high_cut_bypassed: bool,
}

impl Default for ChainSettings {
    fn default() -> Self {
        Self {
            peak_freq: 750.0,
            peak_gain_db: 0.0,
            peak_quality: 1.0,
            low_cut_freq: MIN_FREQUENCY,
            high_cut_freq: MAX_FREQUENCY,
            low_cut_slope: Slope::Db12,
            high_cut_slope: Slope::Db12,
            low_cut_bypassed: false,
            peak_bypassed: false,
            high_cut_bypassed: false,
        }
    }
}

/// Coefficient set for one cut filter: up to four second-order sections,
/// of which the first `len` are meaningful.
///
/// Kept as a fixed array so the whole set is `Copy` and can travel through
/// the lock-free update fifo without touching the heap.
#[derive(Debug, Clone, Copy)]
pub struct CutCoefficients {
    pub sections: [Coefficients<f32>; 4],
    pub len: usize,
}

/// Pass-through biquad (b0 = 1, everything else 0).
pub fn identity_coefficients() -> Coefficients<f32> {
    Coefficients {
        a1: 0.0,
        a2: 0.0,
        b0: 1.0,
        b1: 0.0,
        b2: 0.0,
    }
}

/// Clamp a center/cutoff frequency into the band the designs are stable in.
/// The upper bound stays safely below Nyquist for low sample rates.
fn clamp_frequency(freq: f32, sample_rate: f32) -> f32 {
    let upper = (sample_rate * 0.45).min(MAX_FREQUENCY).max(MIN_FREQUENCY);
    freq.clamp(MIN_FREQUENCY, upper)
}

/// Design the parametric bell biquad for the peak band.
pub fn design_peak_filter(
    settings: &ChainSettings,
    sample_rate: f32,
) -> Result<Coefficients<f32>, DspError> {
    let freq = clamp_frequency(settings.peak_freq, sample_rate);
    let q = settings.peak_quality.clamp(MIN_Q, MAX_Q);
    let gain_db = settings.peak_gain_db.clamp(-MAX_GAIN_DB, MAX_GAIN_DB);

    // Type::PeakingEQ takes its gain in dB, not linear amplitude
    Coefficients::<f32>::from_params(
        Type::PeakingEQ(gain_db),
        sample_rate.hz(),
        freq.hz(),
        q,
    )
    .map_err(|_| DspError::InvalidCoefficients {
        frequency: freq,
        sample_rate,
    })
}

/// Q of the k-th second-order section of an order-N Butterworth prototype.
///
/// The analog poles sit on the unit circle at angles (2k+1)π/2N from the
/// imaginary axis; each conjugate pair maps to a section with
/// Q = 1 / (2·cos θ). Cascading the sections at a common cutoff reproduces
/// the maximally-flat response exactly.
fn butterworth_section_q(section: usize, order: usize) -> f32 {
    let theta = std::f64::consts::PI * (2 * section + 1) as f64 / (2 * order) as f64;
    (1.0 / (2.0 * theta.cos())) as f32
}

fn design_cut_cascade(
    freq: f32,
    slope: Slope,
    sample_rate: f32,
    filter_type: Type<f32>,
) -> Result<CutCoefficients, DspError> {
    let freq = clamp_frequency(freq, sample_rate);
    let order = slope.order();

    let mut sections = [identity_coefficients(); 4];
    for (k, section) in sections.iter_mut().take(slope.sections()).enumerate() {
        let q = butterworth_section_q(k, order);
        *section = Coefficients::<f32>::from_params(filter_type, sample_rate.hz(), freq.hz(), q)
            .map_err(|_| DspError::InvalidCoefficients {
                frequency: freq,
                sample_rate,
            })?;
    }

    Ok(CutCoefficients {
        sections,
        len: slope.sections(),
    })
}

/// Design the low-cut (high-pass) Butterworth cascade.
pub fn design_low_cut_filter(
    settings: &ChainSettings,
    sample_rate: f32,
) -> Result<CutCoefficients, DspError> {
    design_cut_cascade(
        settings.low_cut_freq,
        settings.low_cut_slope,
        sample_rate,
        Type::HighPass,
    )
}

/// Design the high-cut (low-pass) Butterworth cascade.
pub fn design_high_cut_filter(
    settings: &ChainSettings,
    sample_rate: f32,
) -> Result<CutCoefficients, DspError> {
    design_cut_cascade(
        settings.high_cut_freq,
        settings.high_cut_slope,
        sample_rate,
        Type::LowPass,
    )
}

/// Magnitude of one biquad's transfer function at `frequency` Hz.
///
/// Evaluates H(e^jω) from the normalized coefficients in f64 so the
/// response curve stays smooth even for high-Q bells.
pub fn magnitude_for_frequency(
    coeffs: &Coefficients<f32>,
    frequency: f64,
    sample_rate: f64,
) -> f64 {
    let omega = std::f64::consts::TAU * frequency / sample_rate;
    let z1 = Complex64::from_polar(1.0, -omega);
    let z2 = z1 * z1;

    let numerator = coeffs.b0 as f64 + coeffs.b1 as f64 * z1 + coeffs.b2 as f64 * z2;
    let denominator = 1.0 + coeffs.a1 as f64 * z1 + coeffs.a2 as f64 * z2;

    (numerator / denominator).norm()
}

/// Convert decibels to linear amplitude: 10^(dB/20).
#[inline]
pub fn db_to_gain(db: f32) -> f32 {
    10.0_f32.powf(db / 20.0)
}

/// Convert linear amplitude to decibels, clamped to a floor instead of
/// running off to -inf for silent bins.
#[inline]
pub fn gain_to_decibels(gain: f32, minus_infinity_db: f32) -> f32 {
    if gain > 0.0 {
        (20.0 * gain.log10()).max(minus_infinity_db)
    } else {
        minus_infinity_db
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE_RATE: f32 = 48_000.0;

    fn db(mag: f64) -> f64 {
        20.0 * mag.log10()
    }

    #[test]
    fn slope_encodes_section_count() {
        assert_eq!(Slope::Db12.sections(), 1);
        assert_eq!(Slope::Db24.sections(), 2);
        assert_eq!(Slope::Db36.sections(), 3);
        assert_eq!(Slope::Db48.sections(), 4);
        assert_eq!(Slope::Db48.order(), 8);
        assert_eq!(Slope::Db36.db_per_octave(), 36);
        assert_eq!(Slope::from_index(2), Some(Slope::Db36));
        assert_eq!(Slope::from_index(4), None);
    }

    #[test]
    fn cut_designs_return_one_section_per_slope_step() {
        for slope in Slope::ALL {
            let settings = ChainSettings {
                low_cut_freq: 100.0,
                low_cut_slope: slope,
                high_cut_freq: 10_000.0,
                high_cut_slope: slope,
                ..Default::default()
            };
            let low = design_low_cut_filter(&settings, SAMPLE_RATE).unwrap();
            let high = design_high_cut_filter(&settings, SAMPLE_RATE).unwrap();
            assert_eq!(low.len, slope.sections());
            assert_eq!(high.len, slope.sections());
        }
    }

    #[test]
    fn butterworth_cascade_is_3db_down_at_cutoff() {
        // The combined response of the sections must hit the Butterworth
        // -3.01 dB point at the cutoff for every slope.
        for slope in Slope::ALL {
            let settings = ChainSettings {
                low_cut_freq: 100.0,
                low_cut_slope: slope,
                ..Default::default()
            };
            let cascade = design_low_cut_filter(&settings, SAMPLE_RATE).unwrap();

            let mut mag = 1.0;
            for section in &cascade.sections[..cascade.len] {
                mag *= magnitude_for_frequency(section, 100.0, SAMPLE_RATE as f64);
            }
            assert!(
                (db(mag) + 3.01).abs() < 0.5,
                "slope {:?}: cutoff response {} dB",
                slope,
                db(mag)
            );
        }
    }

    #[test]
    fn peak_filter_boosts_center_by_requested_gain() {
        let settings = ChainSettings {
            peak_freq: 1000.0,
            peak_gain_db: 6.0,
            peak_quality: 1.0,
            ..Default::default()
        };
        let coeffs = design_peak_filter(&settings, SAMPLE_RATE).unwrap();

        let at_center = magnitude_for_frequency(&coeffs, 1000.0, SAMPLE_RATE as f64);
        assert!((db(at_center) - 6.0).abs() < 0.1, "center: {} dB", db(at_center));

        // Far away from the bell the response returns to flat
        let far = magnitude_for_frequency(&coeffs, 40.0, SAMPLE_RATE as f64);
        assert!(db(far).abs() < 0.5, "far field: {} dB", db(far));
    }

    #[test]
    fn scenario_cut_filters_attenuate_stop_band() {
        let settings = ChainSettings {
            peak_freq: 1000.0,
            peak_gain_db: 6.0,
            peak_quality: 1.0,
            low_cut_freq: 100.0,
            low_cut_slope: Slope::Db12,
            high_cut_freq: 10_000.0,
            high_cut_slope: Slope::Db12,
            ..Default::default()
        };

        let low = design_low_cut_filter(&settings, SAMPLE_RATE).unwrap();
        let at_20 = magnitude_for_frequency(&low.sections[0], 20.0, SAMPLE_RATE as f64);
        assert!(db(at_20) < -10.0, "low cut at 20 Hz: {} dB", db(at_20));

        let high = design_high_cut_filter(&settings, SAMPLE_RATE).unwrap();
        let at_20k = magnitude_for_frequency(&high.sections[0], 20_000.0, SAMPLE_RATE as f64);
        assert!(db(at_20k) < -10.0, "high cut at 20 kHz: {} dB", db(at_20k));
    }

    #[test]
    fn out_of_range_inputs_are_clamped_not_rejected() {
        let settings = ChainSettings {
            peak_freq: -500.0, // below the band
            peak_quality: 0.0, // degenerate Q
            peak_gain_db: 90.0,
            low_cut_freq: 1.0e9, // above Nyquist
            ..Default::default()
        };

        let peak = design_peak_filter(&settings, SAMPLE_RATE).unwrap();
        for c in [peak.b0, peak.b1, peak.b2, peak.a1, peak.a2] {
            assert!(c.is_finite());
        }

        let low = design_low_cut_filter(&settings, SAMPLE_RATE).unwrap();
        for section in &low.sections[..low.len] {
            for c in [section.b0, section.b1, section.b2, section.a1, section.a2] {
                assert!(c.is_finite());
            }
        }
    }

    #[test]
    fn small_settings_deltas_produce_small_coefficient_deltas() {
        let base = ChainSettings {
            peak_freq: 1000.0,
            peak_gain_db: 6.0,
            ..Default::default()
        };
        let nudged = ChainSettings {
            peak_freq: 1001.0,
            ..base
        };

        let a = design_peak_filter(&base, SAMPLE_RATE).unwrap();
        let b = design_peak_filter(&nudged, SAMPLE_RATE).unwrap();

        for (x, y) in [
            (a.b0, b.b0),
            (a.b1, b.b1),
            (a.b2, b.b2),
            (a.a1, b.a1),
            (a.a2, b.a2),
        ] {
            assert!((x - y).abs() < 0.01, "coefficient jumped: {} -> {}", x, y);
        }
    }

    #[test]
    fn identity_coefficients_are_flat() {
        let id = identity_coefficients();
        for freq in [20.0, 1000.0, 20_000.0] {
            let mag = magnitude_for_frequency(&id, freq, SAMPLE_RATE as f64);
            assert!((mag - 1.0).abs() < 1e-12);
        }
    }

    #[test]
    fn decibel_helpers_round_trip() {
        assert!((db_to_gain(6.0) - 1.9953).abs() < 1e-3);
        assert!((gain_to_decibels(2.0, -48.0) - 6.0206).abs() < 1e-3);
        assert_eq!(gain_to_decibels(0.0, -48.0), -48.0);
        assert_eq!(gain_to_decibels(1.0e-9, -48.0), -48.0);
    }
}
