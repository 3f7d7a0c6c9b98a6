//! FFT spectrum pipeline
//!
//! Turns windowed audio frames into per-bin magnitude-in-decibel data for
//! the analyzer overlay. One frame: Blackman-Harris window -> forward FFT
//! -> magnitude for the first size/2 bins -> normalize by bin count ->
//! decibels with a floor. Completed frames queue in a lock-free fifo so
//! the path generator can drain them at its own cadence.

use std::sync::Arc;

use rustfft::{num_complex::Complex, Fft, FftPlanner};

use crate::design::gain_to_decibels;
use crate::error::DspError;
use crate::fifo::Fifo;

/// Decibel floor of the analyzer: bins below this render as silence
/// instead of running off to -inf.
pub const ANALYZER_FLOOR_DB: f32 = -48.0;

/// Frames the generator can buffer before the path producer drains them.
const FRAME_FIFO_CAPACITY: usize = 30;

/// Supported FFT frame sizes, stored as the power-of-two exponent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FftOrder {
    #[default]
    Order2048 = 11,
    Order4096 = 12,
    Order8192 = 13,
}

impl FftOrder {
    /// Frame length in samples.
    pub fn size(self) -> usize {
        1 << (self as usize)
    }

    /// Number of magnitude bins produced per frame.
    pub fn num_bins(self) -> usize {
        self.size() / 2
    }

    /// Decode a stored exponent (11..=13).
    pub fn from_exponent(exponent: usize) -> Result<Self, DspError> {
        match exponent {
            11 => Ok(FftOrder::Order2048),
            12 => Ok(FftOrder::Order4096),
            13 => Ok(FftOrder::Order8192),
            other => Err(DspError::InvalidFftOrder(other)),
        }
    }
}

/// Pre-computed 4-term Blackman-Harris window (low spectral leakage).
struct AnalysisWindow {
    coeffs: Vec<f32>,
}

impl AnalysisWindow {
    fn new(size: usize) -> Self {
        const A0: f32 = 0.35875;
        const A1: f32 = 0.48829;
        const A2: f32 = 0.14128;
        const A3: f32 = 0.01168;

        let coeffs = (0..size)
            .map(|n| {
                let x = std::f32::consts::TAU * n as f32 / (size - 1) as f32;
                A0 - A1 * x.cos() + A2 * (2.0 * x).cos() - A3 * (3.0 * x).cos()
            })
            .collect();
        Self { coeffs }
    }

    #[inline]
    fn apply(&self, sample: f32, index: usize) -> f32 {
        sample * self.coeffs[index]
    }
}

/// Produces magnitude-in-decibel frames from audio windows.
///
/// Owned and driven by the analysis thread; nothing here runs on the audio
/// callback. The FFT plan, window table, scratch buffers and frame fifo are
/// all sized by the current order and only ever replaced together by
/// [`change_order`](FftDataGenerator::change_order).
pub struct FftDataGenerator {
    order: FftOrder,
    window: AnalysisWindow,
    fft: Arc<dyn Fft<f32>>,
    scratch: Vec<Complex<f32>>,
    frame: Vec<f32>,
    frame_fifo: Fifo<Vec<f32>>,
}

impl FftDataGenerator {
    pub fn new(order: FftOrder) -> Self {
        let size = order.size();
        let mut frame_fifo = Fifo::new();
        frame_fifo.prepare(FRAME_FIFO_CAPACITY, vec![0.0; order.num_bins()]);

        Self {
            order,
            window: AnalysisWindow::new(size),
            fft: FftPlanner::new().plan_fft_forward(size),
            scratch: vec![Complex::new(0.0, 0.0); size],
            frame: vec![0.0; order.num_bins()],
            frame_fifo,
        }
    }

    /// Re-provision the window, FFT plan, scratch buffers and frame fifo
    /// for a new frame size. Any queued frames are discarded; buffers are
    /// never resized while data is in flight.
    pub fn change_order(&mut self, order: FftOrder) {
        *self = Self::new(order);
    }

    pub fn order(&self) -> FftOrder {
        self.order
    }

    pub fn fft_size(&self) -> usize {
        self.order.size()
    }

    /// Window `samples`, transform, and queue the resulting dB frame.
    ///
    /// `samples` must be exactly one frame long. A mismatch means the
    /// caller changed order without re-provisioning its window buffer:
    /// fatal in debug builds, a skipped frame in release.
    pub fn produce_fft_data(&mut self, samples: &[f32], minus_infinity_db: f32) {
        let size = self.order.size();
        debug_assert_eq!(samples.len(), size, "frame length does not match FFT order");
        if samples.len() != size {
            return;
        }

        for (i, sample) in samples.iter().enumerate() {
            self.scratch[i] = Complex::new(self.window.apply(*sample, i), 0.0);
        }

        self.fft.process(&mut self.scratch);

        let num_bins = self.order.num_bins();
        for i in 0..num_bins {
            // Normalize by bin count; non-finite bins become silence
            // rather than poisoning the frame.
            let mut v = self.scratch[i].norm() / num_bins as f32;
            if !v.is_finite() {
                v = 0.0;
            }
            self.frame[i] = gain_to_decibels(v, minus_infinity_db);
        }

        // A full fifo just drops this frame - the consumer is behind.
        let _ = self.frame_fifo.push(&self.frame);
    }

    /// Number of complete frames ready for the path generator.
    pub fn num_available_frames(&self) -> usize {
        self.frame_fifo.num_available()
    }

    /// Pull the oldest queued frame into `out`.
    pub fn pull_frame(&self, out: &mut Vec<f32>) -> bool {
        self.frame_fifo.pull(out)
    }
}
