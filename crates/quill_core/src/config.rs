//! Engine and Stream Configuration

use serde::{Deserialize, Serialize};

/// Audio stream configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamConfig {
    /// Sample rate in Hz (e.g., 44100, 48000, 96000)
    pub sample_rate: u32,

    /// Number of audio channels (the EQ chain is stereo)
    pub channels: u16,

    /// Buffer size in frames (lower = less latency, higher = more stability)
    pub buffer_size: u32,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            sample_rate: 48000,
            channels: 2,
            buffer_size: 512,
        }
    }
}

impl StreamConfig {
    /// Calculate latency in milliseconds for this configuration
    pub fn latency_ms(&self) -> f32 {
        (self.buffer_size as f32 / self.sample_rate as f32) * 1000.0
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.sample_rate < 8000 || self.sample_rate > 192_000 {
            return Err(format!("Invalid sample rate: {}", self.sample_rate));
        }
        if self.channels != 2 {
            return Err(format!("Invalid channel count: {}", self.channels));
        }
        if self.buffer_size < 32 || self.buffer_size > 8192 {
            return Err(format!("Invalid buffer size: {}", self.buffer_size));
        }
        Ok(())
    }
}

/// Spectrum analyzer configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyzerConfig {
    /// FFT frame size as a power-of-two exponent (11 = 2048, 12 = 4096,
    /// 13 = 8192)
    pub fft_exponent: usize,

    /// Analysis/display refresh rate in Hz
    pub refresh_hz: u32,

    /// Pixel width of the plot area the curves are generated for
    pub plot_width: u32,

    /// Pixel height of the plot area
    pub plot_height: u32,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            fft_exponent: 11,
            refresh_hz: 60,
            plot_width: 600,
            plot_height: 200,
        }
    }
}

impl AnalyzerConfig {
    pub fn validate(&self) -> Result<(), String> {
        if !(11..=13).contains(&self.fft_exponent) {
            return Err(format!("Invalid FFT exponent: {}", self.fft_exponent));
        }
        if self.refresh_hz == 0 || self.refresh_hz > 240 {
            return Err(format!("Invalid refresh rate: {}", self.refresh_hz));
        }
        if self.plot_width == 0 || self.plot_height == 0 {
            return Err("Plot area must be non-empty".into());
        }
        Ok(())
    }

    /// Tick interval of the analysis thread
    pub fn tick_interval(&self) -> std::time::Duration {
        std::time::Duration::from_micros(1_000_000 / self.refresh_hz as u64)
    }
}

/// Overall engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Stream configuration
    pub stream: StreamConfig,

    /// Analyzer configuration
    pub analyzer: AnalyzerConfig,

    /// Ring buffer capacity in frames (should be multiple of buffer_size)
    pub ring_buffer_frames: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            stream: StreamConfig::default(),
            analyzer: AnalyzerConfig::default(),
            // 4 buffers worth of ring buffer capacity
            ring_buffer_frames: 512 * 4,
        }
    }
}

impl EngineConfig {
    /// Create config optimized for low latency
    pub fn low_latency() -> Self {
        Self {
            stream: StreamConfig {
                sample_rate: 48000,
                channels: 2,
                buffer_size: 128, // ~2.6ms latency
            },
            ring_buffer_frames: 128 * 8,
            ..Default::default()
        }
    }

    /// Create config optimized for stability
    pub fn stable() -> Self {
        Self {
            stream: StreamConfig {
                sample_rate: 48000,
                channels: 2,
                buffer_size: 1024, // ~21ms latency
            },
            ring_buffer_frames: 1024 * 4,
            ..Default::default()
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        self.stream.validate()?;
        self.analyzer.validate()
    }
}
