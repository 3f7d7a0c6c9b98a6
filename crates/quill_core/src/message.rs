//! Message Types for Thread Communication
//!
//! Commands flow from the controlling thread -> audio control thread.
//! Events flow from the audio control thread -> controlling thread.
//! Parameter changes do NOT travel as commands; they go through the
//! lock-free `ParameterStore` so notifiers never wait on this channel.

use serde::{Deserialize, Serialize};

use quill_dsp::FftOrder;

/// Commands sent to the audio control thread
#[derive(Debug, Clone)]
pub enum Command {
    /// Start audio processing
    Start,

    /// Stop audio processing
    Stop,

    /// Switch the analyzer FFT frame size. Takes effect on the next
    /// analysis tick; all analyzer buffers are re-provisioned.
    SetFftOrder(FftOrder),

    /// Bypass all processing (the chains keep their coefficients)
    SetBypass(bool),

    /// Set master volume (0.0 - 2.0, 1.0 = unity)
    SetMasterVolume(f32),

    /// Request current state (triggers StateUpdate event)
    RequestState,

    /// Shutdown the engine
    Shutdown,
}

/// Events sent from the audio control thread
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum Event {
    /// Engine started successfully
    Started,

    /// Engine stopped
    Stopped,

    /// Error occurred
    Error { message: String },

    /// Audio level update (for meters)
    /// Contains peak levels: (left, right) in range 0.0 - 1.0
    LevelUpdate { left: f32, right: f32 },

    /// Current state snapshot
    StateUpdate {
        is_running: bool,
        sample_rate: u32,
        fft_size: usize,
    },

    /// Buffer underrun detected (audio glitch)
    BufferUnderrun,
}

impl Event {
    /// Create an error event from any error type
    pub fn error<E: std::fmt::Display>(err: E) -> Self {
        Event::Error {
            message: err.to_string(),
        }
    }
}
