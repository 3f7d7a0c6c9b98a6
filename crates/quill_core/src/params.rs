//! Parameter Store
//!
//! The authoritative home of every user-facing EQ parameter. Host/UI
//! threads write values through lock-free atomic cells; the analysis
//! thread takes [`chain_settings`](ParameterStore::chain_settings)
//! snapshots on demand.
//!
//! Change notification is a single monotone dirty flag: any number of
//! writers set it, exactly one consumer claims it per recompute via
//! compare-and-swap. No parameter values are read inside the notification
//! path itself, so notifiers never order against the consumer's work.

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};

use quill_dsp::{ChainSettings, Slope, MAX_FREQUENCY, MAX_GAIN_DB, MIN_FREQUENCY};

/// Peak Q range exposed to the host (narrower than what the design math
/// tolerates)
pub const PARAM_MIN_Q: f32 = 0.1;
pub const PARAM_MAX_Q: f32 = 10.0;

/// Identifies one user-facing parameter.
///
/// Everything is addressed as an f32 value, host-automation style: slopes
/// carry their index (0..=3), bypass flags are 0.0/1.0.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParameterId {
    PeakFreq,
    PeakGainDb,
    PeakQuality,
    LowCutFreq,
    HighCutFreq,
    LowCutSlope,
    HighCutSlope,
    LowCutBypassed,
    PeakBypassed,
    HighCutBypassed,
}

/// Lock-free parameter storage shared between notifier threads and the
/// analysis thread.
///
/// f32 values live in `AtomicU32` cells as raw bits (there is no
/// `AtomicF32`); single-value Relaxed accesses are sufficient since the
/// dirty flag is what sequences recomputation.
pub struct ParameterStore {
    peak_freq: AtomicU32,
    peak_gain_db: AtomicU32,
    peak_quality: AtomicU32,
    low_cut_freq: AtomicU32,
    high_cut_freq: AtomicU32,
    low_cut_slope: AtomicUsize,
    high_cut_slope: AtomicUsize,
    low_cut_bypassed: AtomicBool,
    peak_bypassed: AtomicBool,
    high_cut_bypassed: AtomicBool,
    dirty: AtomicBool,
}

impl ParameterStore {
    /// Store initialised to the default (flat) settings, with a pending
    /// change so the first analysis tick installs them.
    pub fn new() -> Self {
        let defaults = ChainSettings::default();
        Self {
            peak_freq: AtomicU32::new(defaults.peak_freq.to_bits()),
            peak_gain_db: AtomicU32::new(defaults.peak_gain_db.to_bits()),
            peak_quality: AtomicU32::new(defaults.peak_quality.to_bits()),
            low_cut_freq: AtomicU32::new(defaults.low_cut_freq.to_bits()),
            high_cut_freq: AtomicU32::new(defaults.high_cut_freq.to_bits()),
            low_cut_slope: AtomicUsize::new(defaults.low_cut_slope as usize),
            high_cut_slope: AtomicUsize::new(defaults.high_cut_slope as usize),
            low_cut_bypassed: AtomicBool::new(defaults.low_cut_bypassed),
            peak_bypassed: AtomicBool::new(defaults.peak_bypassed),
            high_cut_bypassed: AtomicBool::new(defaults.high_cut_bypassed),
            dirty: AtomicBool::new(true),
        }
    }

    /// Write one parameter (value clamped into its range) and mark the
    /// store dirty. Safe to call from any thread.
    pub fn set(&self, id: ParameterId, value: f32) {
        match id {
            ParameterId::PeakFreq => self.store_f32(
                &self.peak_freq,
                value.clamp(MIN_FREQUENCY, MAX_FREQUENCY),
            ),
            ParameterId::PeakGainDb => {
                self.store_f32(&self.peak_gain_db, value.clamp(-MAX_GAIN_DB, MAX_GAIN_DB))
            }
            ParameterId::PeakQuality => {
                self.store_f32(&self.peak_quality, value.clamp(PARAM_MIN_Q, PARAM_MAX_Q))
            }
            ParameterId::LowCutFreq => self.store_f32(
                &self.low_cut_freq,
                value.clamp(MIN_FREQUENCY, MAX_FREQUENCY),
            ),
            ParameterId::HighCutFreq => self.store_f32(
                &self.high_cut_freq,
                value.clamp(MIN_FREQUENCY, MAX_FREQUENCY),
            ),
            ParameterId::LowCutSlope => {
                let index = (value.round().max(0.0) as usize).min(3);
                self.low_cut_slope.store(index, Ordering::Relaxed);
            }
            ParameterId::HighCutSlope => {
                let index = (value.round().max(0.0) as usize).min(3);
                self.high_cut_slope.store(index, Ordering::Relaxed);
            }
            ParameterId::LowCutBypassed => self
                .low_cut_bypassed
                .store(value >= 0.5, Ordering::Relaxed),
            ParameterId::PeakBypassed => {
                self.peak_bypassed.store(value >= 0.5, Ordering::Relaxed)
            }
            ParameterId::HighCutBypassed => self
                .high_cut_bypassed
                .store(value >= 0.5, Ordering::Relaxed),
        }
        self.notify_changed();
    }

    fn store_f32(&self, cell: &AtomicU32, value: f32) {
        cell.store(value.to_bits(), Ordering::Relaxed);
    }

    fn load_f32(cell: &AtomicU32) -> f32 {
        f32::from_bits(cell.load(Ordering::Relaxed))
    }

    /// Mark the store changed without touching any value. This is the
    /// notification hook - it does nothing but set the dirty flag, so it
    /// is safe to call from inside any host callback.
    pub fn notify_changed(&self) {
        self.dirty.store(true, Ordering::Release);
    }

    /// Claim a pending change. Returns true to exactly one caller per
    /// change, no matter how many redundant notifications preceded it.
    pub fn claim_changes(&self) -> bool {
        self.dirty
            .compare_exchange(true, false, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Whether a change is pending (without claiming it).
    pub fn has_pending_changes(&self) -> bool {
        self.dirty.load(Ordering::Acquire)
    }

    /// Snapshot every parameter into a value-type settings record.
    pub fn chain_settings(&self) -> ChainSettings {
        ChainSettings {
            peak_freq: Self::load_f32(&self.peak_freq),
            peak_gain_db: Self::load_f32(&self.peak_gain_db),
            peak_quality: Self::load_f32(&self.peak_quality),
            low_cut_freq: Self::load_f32(&self.low_cut_freq),
            high_cut_freq: Self::load_f32(&self.high_cut_freq),
            low_cut_slope: Slope::from_index(self.low_cut_slope.load(Ordering::Relaxed))
                .unwrap_or_default(),
            high_cut_slope: Slope::from_index(self.high_cut_slope.load(Ordering::Relaxed))
                .unwrap_or_default(),
            low_cut_bypassed: self.low_cut_bypassed.load(Ordering::Relaxed),
            peak_bypassed: self.peak_bypassed.load(Ordering::Relaxed),
            high_cut_bypassed: self.high_cut_bypassed.load(Ordering::Relaxed),
        }
    }

    /// Write a whole settings snapshot (e.g. a preset) in one go.
    pub fn apply_settings(&self, settings: &ChainSettings) {
        self.set(ParameterId::PeakFreq, settings.peak_freq);
        self.set(ParameterId::PeakGainDb, settings.peak_gain_db);
        self.set(ParameterId::PeakQuality, settings.peak_quality);
        self.set(ParameterId::LowCutFreq, settings.low_cut_freq);
        self.set(ParameterId::HighCutFreq, settings.high_cut_freq);
        self.set(ParameterId::LowCutSlope, settings.low_cut_slope as usize as f32);
        self.set(
            ParameterId::HighCutSlope,
            settings.high_cut_slope as usize as f32,
        );
        self.set(
            ParameterId::LowCutBypassed,
            f32::from(settings.low_cut_bypassed),
        );
        self.set(ParameterId::PeakBypassed, f32::from(settings.peak_bypassed));
        self.set(
            ParameterId::HighCutBypassed,
            f32::from(settings.high_cut_bypassed),
        );
    }
}

impl Default for ParameterStore {
    fn default() -> Self {
        Self::new()
    }
}
