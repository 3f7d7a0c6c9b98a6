//! Quill DSP - Signal-Processing Core
//!
//! This crate provides the signal path of the Quill parametric equalizer:
//! - Cascaded IIR filter chain (low cut / peak bell / high cut) with
//!   per-stage bypass and atomic coefficient hot-swapping
//! - Lock-free SPSC fifos moving audio blocks, FFT frames and rendered
//!   paths between the real-time and analysis threads
//! - Windowed-FFT spectrum pipeline producing renderable magnitude curves
//! - Analytic response-curve sampling straight from the installed
//!   coefficients
//!
//! # Architecture
//!
//! The processing path follows a strict "no allocation in audio callback"
//! rule. Coefficients are designed off-thread and shipped to the running
//! chains as `Copy` values over a lock-free fifo.

mod analyzer;
mod chain;
mod design;
mod error;
mod fifo;
mod presets;
mod spectrum;

pub use analyzer::{
    map_from_log10, map_to_log10, remap, response_curve, response_path, AnalyzerPathGenerator,
    PathPoint, PathProducer, PlotBounds, RESPONSE_CURVE_MAX_DB, RESPONSE_CURVE_MIN_DB,
};
pub use chain::{ChainPosition, ChainUpdate, EqProcessor, MonoChain};
pub use design::{
    db_to_gain, design_high_cut_filter, design_low_cut_filter, design_peak_filter,
    gain_to_decibels, identity_coefficients, magnitude_for_frequency, ChainSettings,
    CutCoefficients, Slope, MAX_FREQUENCY, MAX_GAIN_DB, MAX_Q, MIN_FREQUENCY, MIN_Q,
};
pub use error::DspError;
pub use fifo::{Fifo, SampleBlockFifo, BLOCK_FIFO_CAPACITY};
pub use presets::{Preset, PRESETS};
pub use spectrum::{FftDataGenerator, FftOrder, ANALYZER_FLOOR_DB};
