//! Built-in EQ Presets

use crate::design::{ChainSettings, Slope};

/// Named chain settings preset
pub type Preset = (&'static str, ChainSettings);

const FLAT: ChainSettings = ChainSettings {
    peak_freq: 750.0,
    peak_gain_db: 0.0,
    peak_quality: 1.0,
    low_cut_freq: 20.0,
    high_cut_freq: 20_000.0,
    low_cut_slope: Slope::Db12,
    high_cut_slope: Slope::Db12,
    low_cut_bypassed: false,
    peak_bypassed: false,
    high_cut_bypassed: false,
};

/// List of built-in presets
pub const PRESETS: &[Preset] = &[
    ("Flat", FLAT),
    (
        "Rumble Guard", // kill stage noise below the band
        ChainSettings {
            low_cut_freq: 80.0,
            low_cut_slope: Slope::Db24,
            ..FLAT
        },
    ),
    (
        "Presence",
        ChainSettings {
            peak_freq: 3_000.0,
            peak_gain_db: 4.0,
            peak_quality: 0.8,
            ..FLAT
        },
    ),
    (
        "Warmth",
        ChainSettings {
            peak_freq: 250.0,
            peak_gain_db: 3.0,
            peak_quality: 0.7,
            ..FLAT
        },
    ),
    (
        "Telephone",
        ChainSettings {
            low_cut_freq: 300.0,
            low_cut_slope: Slope::Db48,
            high_cut_freq: 3_400.0,
            high_cut_slope: Slope::Db48,
            ..FLAT
        },
    ),
];
