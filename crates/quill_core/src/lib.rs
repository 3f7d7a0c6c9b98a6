//! Quill Core - Audio Engine
//!
//! This crate wires the Quill DSP core to real audio:
//! - CPAL duplex stream management with real-time callbacks
//! - Lock-free parameter store with dirty-flag change notification
//! - Background analysis thread (coefficient hot-swapping + spectrum)
//! - Command/event channels between the controlling and control threads
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                   Controlling thread                        │
//! │  (UI/host) ──commands──▶ AudioEngine ◀──events── (UI/host)  │
//! │       └──── parameter writes (lock-free atomics) ────┐      │
//! └───────────────────────────────────────────────────── │ ─────┘
//!                              │ crossbeam-channel        ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │  Audio thread: capture ──rtrb──▶ EQ chains ──▶ output       │
//! │        (zero allocation)      │ mono tap                    │
//! │                               ▼                             │
//! │  Analysis thread: block fifo ──▶ FFT ──▶ display frame      │
//! │        coefficient updates ──fifo──▶ audio thread           │
//! └─────────────────────────────────────────────────────────────┘
//! ```

mod analysis;
mod config;
mod engine;
mod error;
mod message;
mod params;
mod stream;

pub use analysis::{AnalysisWorker, DisplayFrame, UPDATE_FIFO_CAPACITY};
pub use config::{AnalyzerConfig, EngineConfig, StreamConfig};
pub use engine::AudioEngine;
pub use error::{EngineError, EngineResult};
pub use message::{Command, Event};
pub use params::{ParameterId, ParameterStore, PARAM_MAX_Q, PARAM_MIN_Q};
pub use stream::{AudioStream, SharedState};

// Re-export DSP types for convenience
pub use quill_dsp::{
    ChainPosition, ChainSettings, FftOrder, PathPoint, PlotBounds, Slope, PRESETS,
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_crate_exports() {
        // Verify public API is accessible
        let _config = EngineConfig::default();
        let _params = ParameterStore::new();
    }
}
