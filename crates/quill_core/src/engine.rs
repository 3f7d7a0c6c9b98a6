//! Audio Engine - Main Entry Point
//!
//! The AudioEngine owns the two execution contexts of the EQ:
//!
//! ```text
//! Controlling thread
//!   AudioEngine ──commands──▶ control thread ◀──events── AudioEngine
//!                               │
//!                               ├─ CPAL duplex stream (real-time callbacks)
//!                               │    capture -> rtrb -> EQ chains -> output
//!                               │                         │ mono tap
//!                               │                         ▼
//!                               │                  SampleBlockFifo
//!                               │                         │
//!                               └─ analysis thread (60 Hz tick)
//!                                    dirty flag -> coefficients -> update fifo
//!                                    block fifo -> FFT -> spectrum path
//!                                    publishes DisplayFrame
//! ```
//!
//! Parameter changes bypass the command channel entirely: notifier threads
//! write the lock-free [`ParameterStore`] and the analysis thread picks the
//! change up on its own schedule.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use cpal::traits::HostTrait;
use crossbeam_channel::{bounded, unbounded, Receiver, RecvTimeoutError, Sender};
use parking_lot::RwLock;
use tracing::{error, info, warn};

use quill_dsp::{ChainPosition, ChainUpdate, Fifo, FftOrder, PlotBounds, SampleBlockFifo};

use crate::analysis::{AnalysisWorker, DisplayFrame, UPDATE_FIFO_CAPACITY};
use crate::config::EngineConfig;
use crate::error::{EngineError, EngineResult};
use crate::message::{Command, Event};
use crate::params::ParameterStore;
use crate::stream::AudioStream;

/// A running stream plus the analysis thread that serves it.
struct ActiveStream {
    stream: AudioStream,
    analysis_stop: Arc<AtomicBool>,
    analysis_thread: JoinHandle<()>,
}

/// The main audio engine controller
///
/// Lives on the controlling thread and communicates with the control
/// thread via channels; parameters and the display frame are shared
/// lock-free / behind a read-write lock respectively.
pub struct AudioEngine {
    /// Channel for sending commands to the control thread
    command_sender: Sender<Command>,

    /// Channel for receiving events from the control thread
    event_receiver: Receiver<Event>,

    /// Handle to the control thread
    control_thread: Option<JoinHandle<()>>,

    /// Flag to signal shutdown
    shutdown_flag: Arc<AtomicBool>,

    /// Whether a stream is currently running
    is_running: Arc<AtomicBool>,

    /// Authoritative parameter storage, shared with notifiers and the
    /// analysis thread
    params: Arc<ParameterStore>,

    /// Latest render payload published by the analysis thread
    display: Arc<RwLock<DisplayFrame>>,

    /// Current configuration
    config: EngineConfig,
}

impl AudioEngine {
    /// Create a new audio engine with default configuration
    pub fn new() -> EngineResult<Self> {
        Self::with_config(EngineConfig::default())
    }

    /// Create a new audio engine with custom configuration
    pub fn with_config(config: EngineConfig) -> EngineResult<Self> {
        config.validate().map_err(EngineError::ConfigError)?;

        let (command_sender, command_receiver) = bounded::<Command>(32);
        let (event_sender, event_receiver) = unbounded::<Event>();

        let shutdown_flag = Arc::new(AtomicBool::new(false));
        let is_running = Arc::new(AtomicBool::new(false));
        let params = Arc::new(ParameterStore::new());
        let display = Arc::new(RwLock::new(DisplayFrame::default()));
        let fft_exponent = Arc::new(AtomicUsize::new(config.analyzer.fft_exponent));

        let shutdown_clone = Arc::clone(&shutdown_flag);
        let running_clone = Arc::clone(&is_running);
        let params_clone = Arc::clone(&params);
        let display_clone = Arc::clone(&display);
        let exponent_clone = Arc::clone(&fft_exponent);
        let config_clone = config.clone();

        let control_thread = thread::Builder::new()
            .name("quill-control".into())
            .spawn(move || {
                Self::control_thread_main(
                    command_receiver,
                    event_sender,
                    shutdown_clone,
                    running_clone,
                    params_clone,
                    display_clone,
                    exponent_clone,
                    config_clone,
                );
            })
            .map_err(|e| EngineError::StreamBuildError(e.to_string()))?;

        Ok(Self {
            command_sender,
            event_receiver,
            control_thread: Some(control_thread),
            shutdown_flag,
            is_running,
            params,
            display,
            config,
        })
    }

    /// Start audio processing
    pub fn start(&self) -> EngineResult<()> {
        self.send_command(Command::Start)
    }

    /// Stop audio processing
    pub fn stop(&self) -> EngineResult<()> {
        self.send_command(Command::Stop)
    }

    /// Switch the analyzer's FFT frame size
    pub fn set_fft_order(&self, order: FftOrder) -> EngineResult<()> {
        self.send_command(Command::SetFftOrder(order))
    }

    /// Bypass all processing
    pub fn set_bypass(&self, bypassed: bool) -> EngineResult<()> {
        self.send_command(Command::SetBypass(bypassed))
    }

    /// Set master volume (0.0 - 2.0)
    pub fn set_master_volume(&self, volume: f32) -> EngineResult<()> {
        self.send_command(Command::SetMasterVolume(volume))
    }

    /// Request state update
    pub fn request_state(&self) -> EngineResult<()> {
        self.send_command(Command::RequestState)
    }

    /// The parameter store notifiers and UI bindings write into
    pub fn params(&self) -> Arc<ParameterStore> {
        Arc::clone(&self.params)
    }

    /// Snapshot of the latest render payload (response curve, spectrum
    /// path, bypass states)
    pub fn display(&self) -> DisplayFrame {
        self.display.read().clone()
    }

    /// Check if a stream is currently running
    pub fn is_running(&self) -> bool {
        self.is_running.load(Ordering::SeqCst)
    }

    /// Get next event (non-blocking)
    pub fn poll_event(&self) -> Option<Event> {
        self.event_receiver.try_recv().ok()
    }

    /// Get next event (blocking)
    pub fn wait_event(&self) -> Option<Event> {
        self.event_receiver.recv().ok()
    }

    /// Get current configuration
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Send command to the control thread
    fn send_command(&self, command: Command) -> EngineResult<()> {
        self.command_sender
            .send(command)
            .map_err(|_| EngineError::ChannelSendError)
    }

    /// Control thread main loop
    #[allow(clippy::too_many_arguments)]
    fn control_thread_main(
        command_receiver: Receiver<Command>,
        event_sender: Sender<Event>,
        shutdown_flag: Arc<AtomicBool>,
        is_running: Arc<AtomicBool>,
        params: Arc<ParameterStore>,
        display: Arc<RwLock<DisplayFrame>>,
        fft_exponent: Arc<AtomicUsize>,
        config: EngineConfig,
    ) {
        info!("control thread started");

        let mut active: Option<ActiveStream> = None;

        while !shutdown_flag.load(Ordering::SeqCst) {
            // Timeout doubles as the level-meter cadence (~60fps)
            match command_receiver.recv_timeout(Duration::from_millis(16)) {
                Ok(Command::Start) => {
                    if active.is_some() {
                        warn!("engine already running");
                        let _ = event_sender.send(Event::error(EngineError::AlreadyRunning));
                        continue;
                    }

                    match Self::start_stream(
                        &config,
                        &event_sender,
                        &params,
                        &display,
                        &fft_exponent,
                    ) {
                        Ok(started) => {
                            info!(
                                sample_rate = config.stream.sample_rate,
                                buffer_size = config.stream.buffer_size,
                                "audio stream started"
                            );
                            active = Some(started);
                            is_running.store(true, Ordering::SeqCst);
                            let _ = event_sender.send(Event::Started);
                        }
                        Err(e) => {
                            error!("failed to start stream: {}", e);
                            let _ = event_sender.send(Event::error(e));
                        }
                    }
                }
                Ok(Command::Stop) => {
                    if active.is_none() {
                        let _ = event_sender.send(Event::error(EngineError::NotRunning));
                        continue;
                    }
                    Self::stop_active(&mut active);
                    is_running.store(false, Ordering::SeqCst);
                    let _ = event_sender.send(Event::Stopped);
                    info!("audio stream stopped");
                }
                Ok(Command::SetFftOrder(order)) => {
                    // The analysis thread re-provisions on its next tick
                    fft_exponent.store(order as usize, Ordering::SeqCst);
                }
                Ok(Command::SetBypass(bypassed)) => {
                    if let Some(active) = &active {
                        active.stream.set_bypass(bypassed);
                    }
                }
                Ok(Command::SetMasterVolume(volume)) => {
                    if let Some(active) = &active {
                        active.stream.set_master_volume(volume);
                    }
                }
                Ok(Command::RequestState) => {
                    let _ = event_sender.send(Event::StateUpdate {
                        is_running: active.is_some(),
                        sample_rate: config.stream.sample_rate,
                        fft_size: 1 << fft_exponent.load(Ordering::SeqCst),
                    });
                }
                Ok(Command::Shutdown) => break,
                Err(RecvTimeoutError::Timeout) => {
                    if let Some(active) = &active {
                        let (left, right) = active.stream.peaks();
                        let _ = event_sender.try_send(Event::LevelUpdate { left, right });
                    }
                }
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }

        Self::stop_active(&mut active);
        is_running.store(false, Ordering::SeqCst);
        info!("control thread exiting");
    }

    /// Build the duplex stream, its fifos and the analysis thread.
    fn start_stream(
        config: &EngineConfig,
        event_sender: &Sender<Event>,
        params: &Arc<ParameterStore>,
        display: &Arc<RwLock<DisplayFrame>>,
        fft_exponent: &Arc<AtomicUsize>,
    ) -> EngineResult<ActiveStream> {
        let host = cpal::default_host();
        let capture_device = host
            .default_input_device()
            .ok_or(EngineError::NoInputDevice)?;
        let output_device = host
            .default_output_device()
            .ok_or(EngineError::NoOutputDevice)?;

        // Fresh fifos per stream: `prepare` is only legal before sharing
        let mut block_fifo = SampleBlockFifo::new();
        block_fifo.prepare(config.stream.buffer_size as usize);
        let block_fifo = Arc::new(block_fifo);

        let mut updates = Fifo::new();
        updates.prepare(
            UPDATE_FIFO_CAPACITY,
            ChainUpdate::Bypass {
                position: ChainPosition::Peak,
                bypassed: false,
            },
        );
        let updates = Arc::new(updates);

        let settings = params.chain_settings();
        // The fresh display chain needs the same settings installed
        params.notify_changed();

        let stream = AudioStream::new_with_capture(
            config.stream.clone(),
            &capture_device,
            &output_device,
            event_sender.clone(),
            Arc::clone(&block_fifo),
            Arc::clone(&updates),
            &settings,
        )?;

        let bounds = PlotBounds::new(
            0.0,
            0.0,
            config.analyzer.plot_width as f32,
            config.analyzer.plot_height as f32,
        );
        let worker = AnalysisWorker::new(
            Arc::clone(params),
            updates,
            block_fifo,
            Arc::clone(display),
            Arc::clone(fft_exponent),
            config.stream.sample_rate as f32,
            bounds,
        );

        let analysis_stop = Arc::new(AtomicBool::new(false));
        let stop_clone = Arc::clone(&analysis_stop);
        let interval = config.analyzer.tick_interval();
        let analysis_thread = thread::Builder::new()
            .name("quill-analysis".into())
            .spawn(move || worker.run(stop_clone, interval))
            .map_err(|e| EngineError::StreamBuildError(e.to_string()))?;

        Ok(ActiveStream {
            stream,
            analysis_stop,
            analysis_thread,
        })
    }

    /// Stop the CPAL streams first, then the analysis thread.
    fn stop_active(active: &mut Option<ActiveStream>) {
        if let Some(active) = active.take() {
            drop(active.stream);
            active.analysis_stop.store(true, Ordering::Release);
            let _ = active.analysis_thread.join();
        }
    }
}

impl Drop for AudioEngine {
    fn drop(&mut self) {
        let _ = self.command_sender.send(Command::Shutdown);
        self.shutdown_flag.store(true, Ordering::SeqCst);
        if let Some(handle) = self.control_thread.take() {
            let _ = handle.join();
        }
    }
}
