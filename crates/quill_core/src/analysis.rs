//! Analysis Worker
//!
//! The background half of the engine: a periodic tick (default 60 Hz)
//! that claims the parameter store's dirty flag, redesigns coefficients,
//! hot-swaps them into the audio chains and its own display chain, runs
//! the spectrum pipeline, and publishes a [`DisplayFrame`] for the
//! rendering layer.
//!
//! Nothing here ever blocks the audio thread: coefficients travel through
//! a lock-free fifo, and a fault on this path degrades the display only.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use tracing::{debug, warn};

use quill_dsp::{
    design_high_cut_filter, design_low_cut_filter, design_peak_filter, response_curve,
    ChainPosition, ChainSettings, ChainUpdate, DspError, Fifo, FftOrder, MonoChain, PathPoint,
    PathProducer, PlotBounds, SampleBlockFifo,
};

use crate::params::ParameterStore;

/// Pending coefficient hot-swaps the audio callback can lag behind by.
pub const UPDATE_FIFO_CAPACITY: usize = 64;

/// Everything the rendering layer needs for one repaint: the analytic
/// response curve (dB per pixel column), the latest measured spectrum
/// polyline, and the group bypass states.
#[derive(Debug, Clone, Default)]
pub struct DisplayFrame {
    pub response_db: Vec<f32>,
    pub spectrum_path: Vec<PathPoint>,
    pub low_cut_bypassed: bool,
    pub peak_bypassed: bool,
    pub high_cut_bypassed: bool,
}

/// Owns the display-side filter chain and the spectrum pipeline; driven by
/// a dedicated thread via [`run`](AnalysisWorker::run) or directly via
/// [`tick`](AnalysisWorker::tick) in tests.
pub struct AnalysisWorker {
    params: Arc<ParameterStore>,
    updates: Arc<Fifo<ChainUpdate>>,
    path_producer: PathProducer,
    /// Chain used only for the analytic response curve - same coefficient
    /// updates as the audio chains, independent (unused) filter state.
    display_chain: MonoChain,
    display: Arc<RwLock<DisplayFrame>>,
    fft_exponent: Arc<AtomicUsize>,
    sample_rate: f32,
    bounds: PlotBounds,
}

impl AnalysisWorker {
    pub fn new(
        params: Arc<ParameterStore>,
        updates: Arc<Fifo<ChainUpdate>>,
        block_fifo: Arc<SampleBlockFifo>,
        display: Arc<RwLock<DisplayFrame>>,
        fft_exponent: Arc<AtomicUsize>,
        sample_rate: f32,
        bounds: PlotBounds,
    ) -> Self {
        let order = FftOrder::from_exponent(fft_exponent.load(Ordering::Acquire))
            .unwrap_or_default();

        Self {
            params,
            updates,
            path_producer: PathProducer::new(block_fifo, order, sample_rate),
            display_chain: MonoChain::new(),
            display,
            fft_exponent,
            sample_rate,
            bounds,
        }
    }

    /// One analysis cycle: apply pending order/settings changes, run the
    /// spectrum pipeline, publish the display frame.
    pub fn tick(&mut self) {
        let desired_exponent = self.fft_exponent.load(Ordering::Acquire);
        if desired_exponent != self.path_producer.order() as usize {
            match FftOrder::from_exponent(desired_exponent) {
                Ok(order) => {
                    debug!(fft_size = order.size(), "re-provisioning analyzer");
                    self.path_producer.set_order(order);
                }
                Err(e) => warn!("ignoring FFT order change: {}", e),
            }
        }

        if self.params.claim_changes() {
            let settings = self.params.chain_settings();
            if let Err(e) = self.update_chains(&settings) {
                // Analysis faults must never reach the audio thread; skip
                // this cycle and keep the previous coefficients.
                warn!("coefficient update skipped: {}", e);
            }
        }

        self.path_producer.process(self.bounds);
        self.publish();
    }

    /// Redesign all coefficients from a settings snapshot, install them in
    /// the display chain, and ship the identical values to the audio
    /// chains through the update fifo.
    fn update_chains(&mut self, settings: &ChainSettings) -> Result<(), DspError> {
        let peak = design_peak_filter(settings, self.sample_rate)?;
        let low_cut = design_low_cut_filter(settings, self.sample_rate)?;
        let high_cut = design_high_cut_filter(settings, self.sample_rate)?;

        self.display_chain.update_peak(peak);
        self.display_chain.update_low_cut(&low_cut);
        self.display_chain.update_high_cut(&high_cut);
        self.display_chain
            .set_bypassed(ChainPosition::LowCut, settings.low_cut_bypassed);
        self.display_chain
            .set_bypassed(ChainPosition::Peak, settings.peak_bypassed);
        self.display_chain
            .set_bypassed(ChainPosition::HighCut, settings.high_cut_bypassed);

        let shipped = self.updates.push(&ChainUpdate::Peak(peak))
            && self.updates.push(&ChainUpdate::LowCut(low_cut))
            && self.updates.push(&ChainUpdate::HighCut(high_cut))
            && self.updates.push(&ChainUpdate::Bypass {
                position: ChainPosition::LowCut,
                bypassed: settings.low_cut_bypassed,
            })
            && self.updates.push(&ChainUpdate::Bypass {
                position: ChainPosition::Peak,
                bypassed: settings.peak_bypassed,
            })
            && self.updates.push(&ChainUpdate::Bypass {
                position: ChainPosition::HighCut,
                bypassed: settings.high_cut_bypassed,
            });

        if !shipped {
            // Update fifo saturated - leave the store dirty so the next
            // tick re-ships a complete, consistent set.
            self.params.notify_changed();
        }

        Ok(())
    }

    /// Regenerate the render payload from the current chain and the most
    /// recent spectrum path.
    fn publish(&mut self) {
        let response = response_curve(
            &self.display_chain,
            self.bounds.width as usize,
            self.sample_rate as f64,
        );

        let mut frame = self.display.write();
        frame.response_db = response;
        frame.spectrum_path.clear();
        frame
            .spectrum_path
            .extend_from_slice(self.path_producer.latest_path());
        frame.low_cut_bypassed = self.display_chain.is_bypassed(ChainPosition::LowCut);
        frame.peak_bypassed = self.display_chain.is_bypassed(ChainPosition::Peak);
        frame.high_cut_bypassed = self.display_chain.is_bypassed(ChainPosition::HighCut);
    }

    /// Tick until `shutdown` is raised. The periodic tick is the only
    /// scheduling primitive: a delayed tick defers updates, never loses
    /// them (the dirty flag persists).
    pub fn run(mut self, shutdown: Arc<AtomicBool>, interval: Duration) {
        while !shutdown.load(Ordering::Acquire) {
            self.tick();
            std::thread::sleep(interval);
        }
    }
}
