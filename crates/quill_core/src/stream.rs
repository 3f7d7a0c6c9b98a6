//! Audio Stream Management
//!
//! Low-level CPAL stream setup and the real-time callbacks.
//!
//! # Audio Flow
//!
//! ```text
//! Input device -> capture callback -> rtrb ring -> output callback
//!                                                    |  EQ chain (L/R)
//!                                                    |  mono tap -> SampleBlockFifo -> analysis thread
//!                                                    v
//!                                                 Output device
//! ```
//!
//! The output callback is the real-time context: it drains pending
//! coefficient updates from a lock-free fifo, cascades every frame through
//! the two filter chains, taps a mono mix into the analyzer's block fifo,
//! and never blocks, locks or allocates.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;

use cpal::traits::{DeviceTrait, StreamTrait};
use cpal::{Device, Stream, StreamConfig as CpalStreamConfig};
use crossbeam_channel::Sender;
use rtrb::{Consumer, Producer, RingBuffer};

use quill_dsp::{ChainPosition, ChainSettings, ChainUpdate, EqProcessor, Fifo, SampleBlockFifo};

use crate::config::StreamConfig;
use crate::error::{EngineError, EngineResult};
use crate::message::Event;

/// Shared state between audio callback and control thread
pub struct SharedState {
    /// Whether processing is bypassed
    pub bypassed: AtomicBool,

    /// Master volume (stored as u32, interpreted as f32 bits -
    /// AtomicF32 doesn't exist, so we bit-cast)
    master_volume_bits: AtomicU32,

    /// Peak level left channel (for meters)
    peak_left_bits: AtomicU32,

    /// Peak level right channel
    peak_right_bits: AtomicU32,
}

impl SharedState {
    pub fn new() -> Self {
        Self {
            bypassed: AtomicBool::new(false),
            master_volume_bits: AtomicU32::new(1.0_f32.to_bits()),
            peak_left_bits: AtomicU32::new(0.0_f32.to_bits()),
            peak_right_bits: AtomicU32::new(0.0_f32.to_bits()),
        }
    }

    pub fn set_master_volume(&self, volume: f32) {
        self.master_volume_bits
            .store(volume.clamp(0.0, 2.0).to_bits(), Ordering::Relaxed);
    }

    pub fn master_volume(&self) -> f32 {
        f32::from_bits(self.master_volume_bits.load(Ordering::Relaxed))
    }

    pub fn set_peaks(&self, left: f32, right: f32) {
        self.peak_left_bits.store(left.to_bits(), Ordering::Relaxed);
        self.peak_right_bits.store(right.to_bits(), Ordering::Relaxed);
    }

    pub fn peaks(&self) -> (f32, f32) {
        (
            f32::from_bits(self.peak_left_bits.load(Ordering::Relaxed)),
            f32::from_bits(self.peak_right_bits.load(Ordering::Relaxed)),
        )
    }
}

impl Default for SharedState {
    fn default() -> Self {
        Self::new()
    }
}

/// Manages an active duplex audio stream.
pub struct AudioStream {
    /// The underlying CPAL streams (held to keep audio flowing; nothing
    /// calls methods on them after play)
    #[allow(dead_code)]
    capture_stream: Stream,

    #[allow(dead_code)]
    output_stream: Stream,

    /// Shared state for atomic updates from the control thread
    pub shared: Arc<SharedState>,

    /// Current stream configuration
    pub config: StreamConfig,
}

impl AudioStream {
    /// Build and start the capture -> DSP -> output pair.
    ///
    /// * `block_fifo` - receives the processed mono mix for the analyzer
    /// * `updates` - coefficient hot-swaps drained at each block start
    /// * `settings` - initial chain settings installed before audio flows
    pub fn new_with_capture(
        config: StreamConfig,
        capture_device: &Device,
        output_device: &Device,
        event_sender: Sender<Event>,
        block_fifo: Arc<SampleBlockFifo>,
        updates: Arc<Fifo<ChainUpdate>>,
        settings: &ChainSettings,
    ) -> EngineResult<Self> {
        config.validate().map_err(EngineError::ConfigError)?;

        let shared = Arc::new(SharedState::new());

        // Ring buffer between the capture and output callbacks.
        // Size: 4x buffer size for safety margin
        let ring_size = config.buffer_size as usize * config.channels as usize * 4;
        let (producer, consumer) = RingBuffer::<f32>::new(ring_size);

        let cpal_config = CpalStreamConfig {
            channels: config.channels,
            sample_rate: cpal::SampleRate(config.sample_rate),
            buffer_size: cpal::BufferSize::Fixed(config.buffer_size),
        };

        let mut eq = EqProcessor::new(config.sample_rate as f32);
        eq.prepare(config.sample_rate as f32, settings)?;

        let capture_stream =
            Self::build_capture_stream(capture_device, &cpal_config, producer, event_sender.clone())?;
        let output_stream = Self::build_output_stream(
            output_device,
            &cpal_config,
            consumer,
            Arc::clone(&shared),
            eq,
            block_fifo,
            updates,
            event_sender,
        )?;

        capture_stream
            .play()
            .map_err(|e| EngineError::StreamPlayError(e.to_string()))?;
        output_stream
            .play()
            .map_err(|e| EngineError::StreamPlayError(e.to_string()))?;

        Ok(Self {
            capture_stream,
            output_stream,
            shared,
            config,
        })
    }

    fn build_capture_stream(
        device: &Device,
        config: &CpalStreamConfig,
        mut producer: Producer<f32>,
        event_sender: Sender<Event>,
    ) -> EngineResult<Stream> {
        let err_sender = event_sender.clone();

        let stream = device
            .build_input_stream(
                config,
                move |data: &[f32], _: &cpal::InputCallbackInfo| {
                    // Real-time audio callback - NO allocations allowed here
                    let written = producer.write_chunk_uninit(data.len()).map_or(0, |mut chunk| {
                        let len = chunk.len().min(data.len());
                        for (i, slot) in chunk.as_mut_slices().0.iter_mut().enumerate().take(len) {
                            slot.write(data[i]);
                        }
                        // SAFETY: the first `len` slots were just initialized
                        unsafe { chunk.commit_all() };
                        len
                    });

                    if written < data.len() {
                        // Overflow - the output side is not consuming fast enough
                        let _ = event_sender.try_send(Event::BufferUnderrun);
                    }
                },
                move |err| {
                    let _ = err_sender.try_send(Event::error(err));
                },
                None, // No timeout
            )
            .map_err(|e| EngineError::StreamBuildError(e.to_string()))?;

        Ok(stream)
    }

    #[allow(clippy::too_many_arguments)]
    fn build_output_stream(
        device: &Device,
        config: &CpalStreamConfig,
        mut consumer: Consumer<f32>,
        shared: Arc<SharedState>,
        mut eq: EqProcessor,
        block_fifo: Arc<SampleBlockFifo>,
        updates: Arc<Fifo<ChainUpdate>>,
        event_sender: Sender<Event>,
    ) -> EngineResult<Stream> {
        let err_sender = event_sender.clone();

        // Scratch slot for pulled updates; overwritten before use
        let mut pending_update = ChainUpdate::Bypass {
            position: ChainPosition::Peak,
            bypassed: false,
        };

        let stream = device
            .build_output_stream(
                config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    // Real-time audio callback - NO allocations allowed here

                    // Apply pending coefficient hot-swaps at block start so
                    // no sample ever sees a torn set.
                    while updates.pull(&mut pending_update) {
                        eq.apply_update(pending_update);
                    }

                    // Pull captured samples from the ring buffer
                    let available = consumer.slots();
                    let to_read = data.len().min(available);

                    if to_read < data.len() {
                        // Underrun - fill with silence
                        data.fill(0.0);
                        let _ = event_sender.try_send(Event::BufferUnderrun);
                    }

                    if let Ok(chunk) = consumer.read_chunk(to_read) {
                        let (first, second) = chunk.as_slices();
                        data[..first.len()].copy_from_slice(first);
                        if !second.is_empty() {
                            data[first.len()..first.len() + second.len()].copy_from_slice(second);
                        }
                        chunk.commit_all();
                    }

                    // Cascade through the filter chains
                    if !shared.bypassed.load(Ordering::Relaxed) {
                        eq.process_interleaved(data);
                    }

                    // Apply master volume
                    let volume = shared.master_volume();
                    if (volume - 1.0).abs() > 0.001 {
                        for sample in data.iter_mut() {
                            *sample *= volume;
                        }
                    }

                    // Feed the analyzer a mono mix of the processed audio
                    // and track peaks for metering. Block fifo saturation
                    // silently drops blocks - visualization only.
                    let mut peak_l = 0.0_f32;
                    let mut peak_r = 0.0_f32;
                    for frame in data.chunks(2) {
                        if frame.len() == 2 {
                            block_fifo.push_sample((frame[0] + frame[1]) * 0.5);
                            peak_l = peak_l.max(frame[0].abs());
                            peak_r = peak_r.max(frame[1].abs());
                        }
                    }
                    shared.set_peaks(peak_l, peak_r);
                },
                move |err| {
                    let _ = err_sender.try_send(Event::error(err));
                },
                None,
            )
            .map_err(|e| EngineError::StreamBuildError(e.to_string()))?;

        Ok(stream)
    }

    /// Get current peak levels (for UI meters)
    pub fn peaks(&self) -> (f32, f32) {
        self.shared.peaks()
    }

    /// Set bypass state
    pub fn set_bypass(&self, bypassed: bool) {
        self.shared.bypassed.store(bypassed, Ordering::Relaxed);
    }

    /// Set master volume (0.0 - 2.0, 1.0 = unity)
    pub fn set_master_volume(&self, volume: f32) {
        self.shared.set_master_volume(volume);
    }
}
