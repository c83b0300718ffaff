//! Configuration for audio capture and analysis

use serde::{Deserialize, Serialize};

/// Audio capture and analysis configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    /// Open the capture device at startup
    pub enabled: bool,

    /// Requested sample rate (Hz)
    pub sample_rate: u32,

    /// Requested number of channels
    pub channels: u16,

    /// Samples per analysis chunk
    pub chunk_size: usize,

    /// Sleep while audio is off or no client is connected (ms)
    pub idle_interval_ms: u64,

    /// Pause between active cycles (ms)
    pub pacing_interval_ms: u64,

    /// Capture configuration
    pub capture: CaptureConfig,

    /// Analysis configuration
    pub analysis: AnalysisConfig,
}

/// Audio capture configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// Device name or substring (None = default loopback source)
    pub device_name: Option<String>,

    /// How long a read waits for a full chunk before reporting no data (ms)
    pub read_timeout_ms: u64,

    /// Callback buffers queued between the device and the extractor
    pub queue_depth: usize,
}

/// One closed frequency range and its normalization divisor
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BandConfig {
    pub low_hz: f32,
    pub high_hz: f32,
    /// Empirically tuned; band energy / divisor is clamped to [0, 1]
    pub divisor: f32,
}

impl BandConfig {
    pub fn contains(&self, hz: f32) -> bool {
        hz >= self.low_hz && hz <= self.high_hz
    }
}

/// Audio analysis configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    pub bass: BandConfig,
    pub mid: BandConfig,
    pub high: BandConfig,

    /// Number of bass values averaged for the published level
    pub smoothing_window: usize,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            sample_rate: 44100,
            channels: 1,
            chunk_size: 1024,
            idle_interval_ms: 100,
            pacing_interval_ms: 10,
            capture: CaptureConfig::default(),
            analysis: AnalysisConfig::default(),
        }
    }
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            device_name: None,
            read_timeout_ms: 250,
            queue_depth: 64,
        }
    }
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            bass: BandConfig { low_hz: 60.0, high_hz: 250.0, divisor: 30.0 },
            mid: BandConfig { low_hz: 251.0, high_hz: 2000.0, divisor: 20.0 },
            high: BandConfig { low_hz: 2001.0, high_hz: 6000.0, divisor: 35.0 },
            smoothing_window: 5,
        }
    }
}

impl AudioConfig {
    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.sample_rate == 0 {
            return Err("Sample rate must be greater than 0".to_string());
        }

        if self.sample_rate > 192000 {
            return Err("Sample rate too high (max 192000 Hz)".to_string());
        }

        if self.channels == 0 {
            return Err("Number of channels must be greater than 0".to_string());
        }

        if self.channels > 8 {
            return Err("Too many channels (max 8)".to_string());
        }

        if self.chunk_size == 0 {
            return Err("Chunk size must be greater than 0".to_string());
        }

        if self.chunk_size > 65536 {
            return Err("Chunk size too large (max 65536)".to_string());
        }

        if self.idle_interval_ms == 0 {
            return Err("Idle interval must be greater than 0".to_string());
        }

        if self.idle_interval_ms > 10000 {
            return Err("Idle interval too large (max 10000 ms)".to_string());
        }

        if self.pacing_interval_ms > 1000 {
            return Err("Pacing interval too large (max 1000 ms)".to_string());
        }

        self.capture.validate()?;
        self.analysis.validate(self.sample_rate)?;

        Ok(())
    }
}

impl CaptureConfig {
    /// Validate capture configuration
    pub fn validate(&self) -> Result<(), String> {
        if let Some(ref name) = self.device_name {
            if name.is_empty() {
                return Err("Device name cannot be empty".to_string());
            }
            if name.len() > 256 {
                return Err("Device name too long (max 256 chars)".to_string());
            }
            if name.contains('\0') {
                return Err("Device name contains null byte".to_string());
            }
        }

        if self.read_timeout_ms == 0 {
            return Err("Read timeout must be greater than 0".to_string());
        }

        if self.queue_depth == 0 {
            return Err("Queue depth must be greater than 0".to_string());
        }

        if self.queue_depth > 4096 {
            return Err("Queue depth too large (max 4096)".to_string());
        }

        Ok(())
    }
}

impl AnalysisConfig {
    /// Validate analysis configuration against the capture sample rate
    pub fn validate(&self, sample_rate: u32) -> Result<(), String> {
        let nyquist = sample_rate as f32 / 2.0;
        for (name, band) in [("bass", &self.bass), ("mid", &self.mid), ("high", &self.high)] {
            if !(band.low_hz >= 0.0 && band.low_hz <= band.high_hz) {
                return Err(format!("{} band range is inverted or negative", name));
            }
            if band.low_hz > nyquist {
                return Err(format!("{} band starts above Nyquist ({} Hz)", name, nyquist));
            }
            if !(band.divisor > 0.0) || !band.divisor.is_finite() {
                return Err(format!("{} band divisor must be positive", name));
            }
        }

        if self.bass.high_hz >= self.mid.low_hz || self.mid.high_hz >= self.high.low_hz {
            return Err("Frequency bands must be disjoint and ascending".to_string());
        }

        if self.smoothing_window == 0 {
            return Err("Smoothing window must hold at least one value".to_string());
        }

        if self.smoothing_window > 1024 {
            return Err("Smoothing window too large (max 1024)".to_string());
        }

        Ok(())
    }
}
