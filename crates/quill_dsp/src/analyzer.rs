//! Analyzer path generation and the analytic response curve
//!
//! The renderable half of the spectrum pipeline: a rolling mono window fed
//! from the audio-thread block fifo, FFT frames turned into log-frequency
//! polylines, and the analytic response curve sampled directly from the
//! installed filter coefficients. Everything here runs on the analysis
//! thread; the rendering layer only ever receives finished point lists.

use std::sync::Arc;

use crate::chain::MonoChain;
use crate::design::{MAX_FREQUENCY, MIN_FREQUENCY};
use crate::fifo::{Fifo, SampleBlockFifo};
use crate::spectrum::{FftDataGenerator, FftOrder, ANALYZER_FLOOR_DB};

/// Paths the generator can buffer before the renderer drains them.
const PATH_FIFO_CAPACITY: usize = 30;

/// Sample every 2nd FFT bin when building the spectrum polyline - half the
/// points at no visible loss.
const PATH_RESOLUTION: usize = 2;

/// Display range of the analytic response curve (dB).
pub const RESPONSE_CURVE_MIN_DB: f32 = -24.0;
pub const RESPONSE_CURVE_MAX_DB: f32 = 24.0;

/// One vertex of a renderable polyline.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct PathPoint {
    pub x: f32,
    pub y: f32,
}

/// Pixel rectangle the curves are mapped into.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlotBounds {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl PlotBounds {
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self { x, y, width, height }
    }

    pub fn bottom(&self) -> f32 {
        self.y + self.height
    }
}

/// Linear remap of `value` from [in_min, in_max] to [out_min, out_max].
#[inline]
pub fn remap(value: f32, in_min: f32, in_max: f32, out_min: f32, out_max: f32) -> f32 {
    out_min + (value - in_min) / (in_max - in_min) * (out_max - out_min)
}

/// Normalized (0..1) horizontal position of `freq` on the log axis.
#[inline]
pub fn map_from_log10(freq: f32, min_freq: f32, max_freq: f32) -> f32 {
    (freq / min_freq).log10() / (max_freq / min_freq).log10()
}

/// Inverse of [`map_from_log10`]: frequency at a normalized position.
#[inline]
pub fn map_to_log10(normalized: f64, min_freq: f64, max_freq: f64) -> f64 {
    min_freq * (max_freq / min_freq).powf(normalized)
}

/// Converts magnitude-in-decibel frames into spectrum polylines.
///
/// X is the log-frequency position over 20 Hz..20 kHz, y maps
/// [floor, 0 dB] linearly onto [bottom, top]. Non-finite y values clamp to
/// the bottom edge instead of breaking the polyline.
pub struct AnalyzerPathGenerator {
    path_fifo: Fifo<Vec<PathPoint>>,
    path: Vec<PathPoint>,
}

impl AnalyzerPathGenerator {
    pub fn new() -> Self {
        let mut path_fifo = Fifo::new();
        path_fifo.prepare(PATH_FIFO_CAPACITY, Vec::new());
        Self {
            path_fifo,
            path: Vec::new(),
        }
    }

    /// Build a polyline from one dB frame and queue it.
    ///
    /// `bin_width` is `sample_rate / fft_size` in Hz.
    pub fn generate_path(
        &mut self,
        frame: &[f32],
        bounds: PlotBounds,
        bin_width: f32,
        minus_infinity_db: f32,
    ) {
        if frame.is_empty() {
            return;
        }

        let top = bounds.y;
        let bottom = bounds.bottom();
        let map_db = |db: f32| remap(db, minus_infinity_db, 0.0, bottom, top);

        self.path.clear();

        // Bin 0 is DC; it anchors the path at the left edge.
        let mut y = map_db(frame[0]);
        if !y.is_finite() {
            y = bottom;
        }
        self.path.push(PathPoint { x: bounds.x, y });

        for bin in (1..frame.len()).step_by(PATH_RESOLUTION) {
            let y = map_db(frame[bin]);
            if y.is_finite() {
                let freq = bin as f32 * bin_width;
                let normalized_x = map_from_log10(freq, MIN_FREQUENCY, MAX_FREQUENCY);
                self.path.push(PathPoint {
                    x: bounds.x + (normalized_x * bounds.width).floor(),
                    y,
                });
            }
        }

        let _ = self.path_fifo.push(&self.path);
    }

    pub fn num_paths_available(&self) -> usize {
        self.path_fifo.num_available()
    }

    /// Pull the oldest queued path into `out`.
    pub fn pull_path(&self, out: &mut Vec<PathPoint>) -> bool {
        self.path_fifo.pull(out)
    }
}

impl Default for AnalyzerPathGenerator {
    fn default() -> Self {
        Self::new()
    }
}

/// Drives the whole measured-spectrum pipeline for one channel: drains the
/// block fifo, slides the rolling mono window, transforms completed
/// windows, and keeps the most recent finished polyline for the renderer.
pub struct PathProducer {
    block_fifo: Arc<SampleBlockFifo>,
    fft_generator: FftDataGenerator,
    path_generator: AnalyzerPathGenerator,
    /// Rolling analysis window, always exactly one FFT frame long.
    mono_buffer: Vec<f32>,
    incoming_block: Vec<f32>,
    frame: Vec<f32>,
    latest_path: Vec<PathPoint>,
    sample_rate: f32,
}

impl PathProducer {
    pub fn new(block_fifo: Arc<SampleBlockFifo>, order: FftOrder, sample_rate: f32) -> Self {
        Self {
            block_fifo,
            fft_generator: FftDataGenerator::new(order),
            path_generator: AnalyzerPathGenerator::new(),
            mono_buffer: vec![0.0; order.size()],
            incoming_block: Vec::new(),
            frame: Vec::new(),
            latest_path: Vec::new(),
            sample_rate,
        }
    }

    /// Switch FFT frame size: re-provisions the generator and the rolling
    /// window together so their lengths can never disagree mid-frame.
    pub fn set_order(&mut self, order: FftOrder) {
        self.fft_generator.change_order(order);
        self.mono_buffer = vec![0.0; order.size()];
        self.latest_path.clear();
    }

    pub fn order(&self) -> FftOrder {
        self.fft_generator.order()
    }

    pub fn set_sample_rate(&mut self, sample_rate: f32) {
        self.sample_rate = sample_rate;
    }

    /// One analysis cycle: accumulate, transform, and regenerate paths.
    pub fn process(&mut self, bounds: PlotBounds) {
        // Accumulate: slide the rolling window left by one block and
        // append the new samples at the tail; transform each new window.
        while self.block_fifo.pull_block(&mut self.incoming_block) {
            let window_len = self.mono_buffer.len();
            let block_len = self.incoming_block.len().min(window_len);

            self.mono_buffer.copy_within(block_len.., 0);
            self.mono_buffer[window_len - block_len..]
                .copy_from_slice(&self.incoming_block[..block_len]);

            self.fft_generator
                .produce_fft_data(&self.mono_buffer, ANALYZER_FLOOR_DB);
        }

        // Convert every pending frame into a polyline.
        let bin_width = self.sample_rate / self.fft_generator.fft_size() as f32;
        while self.fft_generator.pull_frame(&mut self.frame) {
            self.path_generator
                .generate_path(&self.frame, bounds, bin_width, ANALYZER_FLOOR_DB);
        }

        // Keep only the most recent completed path for display.
        while self.path_generator.pull_path(&mut self.latest_path) {}
    }

    /// The most recently completed spectrum polyline (empty until the
    /// first frame has been analyzed).
    pub fn latest_path(&self) -> &[PathPoint] {
        &self.latest_path
    }
}

/// Sample the chain's analytic magnitude response, one dB value per pixel
/// column over the 20 Hz..20 kHz log axis.
///
/// Pure function of the installed coefficients and `width` - calling it
/// twice yields identical output.
pub fn response_curve(chain: &MonoChain, width: usize, sample_rate: f64) -> Vec<f32> {
    (0..width)
        .map(|i| {
            let normalized = i as f64 / width as f64;
            let freq = map_to_log10(normalized, MIN_FREQUENCY as f64, MAX_FREQUENCY as f64);
            let magnitude = chain.magnitude_at(freq, sample_rate);
            (20.0 * magnitude.max(1.0e-12).log10()) as f32
        })
        .collect()
}

/// Map a response curve into pixel space: one point per column, dB range
/// [-24, +24] onto [bottom, top].
pub fn response_path(magnitudes_db: &[f32], bounds: PlotBounds) -> Vec<PathPoint> {
    magnitudes_db
        .iter()
        .enumerate()
        .map(|(i, &db)| PathPoint {
            x: bounds.x + i as f32,
            y: remap(
                db,
                RESPONSE_CURVE_MIN_DB,
                RESPONSE_CURVE_MAX_DB,
                bounds.bottom(),
                bounds.y,
            ),
        })
        .collect()
}
