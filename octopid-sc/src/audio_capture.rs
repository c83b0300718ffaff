//! Loopback capture of system audio

use crate::config::{AudioConfig, CaptureConfig};
use crate::error::AudioError;
use async_trait::async_trait;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, Host, SampleFormat, SampleRate, Stream, StreamConfig};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

/// Source of mono sample chunks
#[async_trait]
pub trait CaptureSource: Send {
    /// Read exactly `frame_count` samples. An empty vector means no data
    /// arrived in time and is not an error; an `Err` is a device failure.
    async fn read(&mut self, frame_count: usize) -> Result<Vec<f32>, AudioError>;

    /// Drop samples buffered while nobody was reading
    fn discard_buffered(&mut self) {}

    /// Actual sample rate of the delivered samples
    fn sample_rate(&self) -> u32;
}

/// System audio captured through a loopback/monitor input
///
/// The cpal stream is not `Send`, so it lives on a dedicated thread for as
/// long as this handle exists. Dropping the handle releases the device.
pub struct LoopbackCapture {
    config: Arc<CaptureConfig>,
    device_name: String,
    sample_rate: u32,
    samples_rx: mpsc::Receiver<Vec<f32>>,
    pending: Vec<f32>,
    device_lost: Arc<AtomicBool>,
    shutdown_tx: Option<crossbeam_channel::Sender<()>>,
    stream_thread: Option<thread::JoinHandle<()>>,
}

impl LoopbackCapture {
    /// Open the loopback source described by an audio configuration
    pub fn open(config: &AudioConfig) -> Result<Self, AudioError> {
        Self::open_loopback_input(config.capture.clone(), config.sample_rate, config.channels)
    }

    /// Open the loopback source, preferring the requested rate and channel count
    pub fn open_loopback_input(
        config: CaptureConfig,
        sample_rate: u32,
        channels: u16,
    ) -> Result<Self, AudioError> {
        config.validate().map_err(AudioError::Config)?;

        let host = cpal::default_host();
        let device = Self::select_device(&host, &config)?;
        let device_name = device.name().unwrap_or_else(|_| "unknown".to_string());
        let (stream_config, sample_format) = Self::negotiate_config(&device, sample_rate, channels)?;

        info!(
            "Audio capture: {} @ {}Hz, {}ch, {:?}",
            device_name, stream_config.sample_rate.0, stream_config.channels, sample_format
        );

        let (samples_tx, samples_rx) = mpsc::channel::<Vec<f32>>(config.queue_depth);
        let device_lost = Arc::new(AtomicBool::new(false));
        let (ready_tx, ready_rx) = crossbeam_channel::bounded::<Result<(), AudioError>>(1);
        let (shutdown_tx, shutdown_rx) = crossbeam_channel::bounded::<()>(1);

        let actual_rate = stream_config.sample_rate.0;
        let lost = Arc::clone(&device_lost);
        let stream_thread = thread::Builder::new()
            .name("octopid-capture".to_string())
            .spawn(move || {
                let stream = match build_stream(&device, &stream_config, sample_format, samples_tx, lost) {
                    Ok(stream) => stream,
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };
                if let Err(e) = stream.play() {
                    let _ = ready_tx.send(Err(AudioError::Capture(format!(
                        "Failed to start stream: {}",
                        e
                    ))));
                    return;
                }
                let _ = ready_tx.send(Ok(()));

                // Blocks until the handle is dropped (sender disconnects)
                let _ = shutdown_rx.recv();
                drop(stream);
                debug!("Audio capture stream released");
            })
            .map_err(|e| AudioError::Capture(format!("Failed to spawn capture thread: {}", e)))?;

        let started = ready_rx
            .recv()
            .map_err(|_| AudioError::Capture("Capture thread exited before start".to_string()))?;
        if let Err(e) = started {
            let _ = stream_thread.join();
            return Err(e);
        }

        Ok(Self {
            config: Arc::new(config),
            device_name,
            sample_rate: actual_rate,
            samples_rx,
            pending: Vec::new(),
            device_lost,
            shutdown_tx: Some(shutdown_tx),
            stream_thread: Some(stream_thread),
        })
    }

    pub fn device_name(&self) -> &str {
        &self.device_name
    }

    /// Pick the device to capture from.
    ///
    /// Order: configured name, default output opened as input (WASAPI
    /// loopback), a "monitor" input (PulseAudio/PipeWire), default input.
    fn select_device(host: &Host, config: &CaptureConfig) -> Result<Device, AudioError> {
        if let Some(ref name) = config.device_name {
            return Self::find_device_by_name(host, name)?
                .ok_or_else(|| AudioError::Device(format!("No capture device matching '{}'", name)));
        }

        if let Some(output) = host.default_output_device() {
            if output.default_input_config().is_ok() {
                return Ok(output);
            }
        }

        const MAX_DEVICES_TO_CHECK: usize = 100;
        if let Ok(devices) = host.input_devices() {
            for device in devices.take(MAX_DEVICES_TO_CHECK) {
                if let Ok(name) = device.name() {
                    if name.to_lowercase().contains("monitor") {
                        return Ok(device);
                    }
                }
            }
        }

        warn!("No loopback source found, falling back to the default input device");
        host.default_input_device()
            .ok_or_else(|| AudioError::Device("No input device available".to_string()))
    }

    /// Find device by exact name or substring
    fn find_device_by_name(host: &Host, name: &str) -> Result<Option<Device>, AudioError> {
        const MAX_DEVICES_TO_CHECK: usize = 100;
        let devices = host
            .input_devices()
            .map_err(|e| AudioError::Device(format!("Failed to enumerate devices: {}", e)))?;

        for device in devices.take(MAX_DEVICES_TO_CHECK) {
            if let Ok(device_name) = device.name() {
                if device_name == name || device_name.contains(name) {
                    return Ok(Some(device));
                }
            }
        }

        Ok(None)
    }

    /// Requested rate/channels when the device supports them, else its default
    fn negotiate_config(
        device: &Device,
        sample_rate: u32,
        channels: u16,
    ) -> Result<(StreamConfig, SampleFormat), AudioError> {
        let ranges: Vec<_> = device
            .supported_input_configs()
            .map_err(|e| AudioError::Device(format!("Failed to get supported configs: {}", e)))?
            .collect();

        for format in [SampleFormat::F32, SampleFormat::I16] {
            let matching = ranges.iter().find(|range| {
                range.sample_format() == format
                    && range.channels() == channels
                    && range.min_sample_rate().0 <= sample_rate
                    && sample_rate <= range.max_sample_rate().0
            });
            if let Some(range) = matching {
                let supported = range.clone().with_sample_rate(SampleRate(sample_rate));
                return Ok((supported.config(), format));
            }
        }

        let fallback = device
            .default_input_config()
            .map_err(|e| AudioError::Device(format!("Failed to get default config: {}", e)))?;
        warn!(
            "Device does not support {}Hz/{}ch, using {}Hz/{}ch (downmixed to mono)",
            sample_rate,
            channels,
            fallback.sample_rate().0,
            fallback.channels()
        );
        Ok((fallback.config(), fallback.sample_format()))
    }

    /// Get available input devices
    pub fn list_devices() -> Result<Vec<String>, AudioError> {
        let host = cpal::default_host();
        let devices = host
            .input_devices()
            .map_err(|e| AudioError::Device(format!("Failed to enumerate devices: {}", e)))?;

        Ok(devices.filter_map(|device| device.name().ok()).collect())
    }
}

#[async_trait]
impl CaptureSource for LoopbackCapture {
    async fn read(&mut self, frame_count: usize) -> Result<Vec<f32>, AudioError> {
        if frame_count == 0 {
            return Ok(Vec::new());
        }

        let deadline = tokio::time::Instant::now() + Duration::from_millis(self.config.read_timeout_ms);
        while self.pending.len() < frame_count {
            if self.device_lost.load(Ordering::Acquire) {
                return Err(AudioError::Device(format!(
                    "Capture device '{}' became unavailable",
                    self.device_name
                )));
            }
            match tokio::time::timeout_at(deadline, self.samples_rx.recv()).await {
                Ok(Some(chunk)) => self.pending.extend_from_slice(&chunk),
                Ok(None) => {
                    return Err(AudioError::Capture("Capture stream closed".to_string()));
                }
                // Partial data stays pending for the next read
                Err(_) => return Ok(Vec::new()),
            }
        }

        Ok(self.pending.drain(..frame_count).collect())
    }

    fn discard_buffered(&mut self) {
        self.pending.clear();
        let mut dropped = 0usize;
        while self.samples_rx.try_recv().is_ok() {
            dropped += 1;
        }
        if dropped > 0 {
            debug!("Discarded {} stale capture buffers", dropped);
        }
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }
}

impl Drop for LoopbackCapture {
    fn drop(&mut self) {
        // Disconnecting the channel wakes the stream thread
        self.shutdown_tx.take();
        if let Some(handle) = self.stream_thread.take() {
            if handle.join().is_err() {
                error!("Audio capture thread panicked");
            }
        }
        info!("Audio capture stopped");
    }
}

fn build_stream(
    device: &Device,
    config: &StreamConfig,
    sample_format: SampleFormat,
    samples_tx: mpsc::Sender<Vec<f32>>,
    device_lost: Arc<AtomicBool>,
) -> Result<Stream, AudioError> {
    let channels = config.channels as usize;
    let on_error = move |err: cpal::StreamError| {
        error!("Audio stream error: {}", err);
        device_lost.store(true, Ordering::Release);
    };

    let stream = match sample_format {
        SampleFormat::F32 => device.build_input_stream(
            config,
            move |data: &[f32], _: &cpal::InputCallbackInfo| {
                forward(&samples_tx, downmix(data, channels, |s| s));
            },
            on_error,
            None,
        ),
        SampleFormat::I16 => device.build_input_stream(
            config,
            move |data: &[i16], _: &cpal::InputCallbackInfo| {
                forward(&samples_tx, downmix(data, channels, |s| s as f32 / 32768.0));
            },
            on_error,
            None,
        ),
        other => {
            return Err(AudioError::Format(format!("Unsupported sample format {:?}", other)));
        }
    };

    stream.map_err(|e| AudioError::Capture(format!("Failed to build stream: {}", e)))
}

fn forward(samples_tx: &mpsc::Sender<Vec<f32>>, samples: Vec<f32>) {
    if samples.is_empty() {
        return;
    }
    if samples_tx.try_send(samples).is_err() {
        debug!("Audio buffer full, dropping samples");
    }
}

/// Average interleaved frames down to mono, zeroing non-finite samples
pub(crate) fn downmix<T: Copy>(data: &[T], channels: usize, convert: impl Fn(T) -> f32) -> Vec<f32> {
    let finite = |s: f32| if s.is_finite() { s } else { 0.0 };
    if channels <= 1 {
        return data.iter().map(|&s| finite(convert(s))).collect();
    }
    data.chunks_exact(channels)
        .map(|frame| frame.iter().map(|&s| finite(convert(s))).sum::<f32>() / channels as f32)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_downmix_mono_passthrough() {
        assert_eq!(downmix(&[0.1f32, -0.2, 0.3], 1, |s| s), vec![0.1, -0.2, 0.3]);
    }

    #[test]
    fn test_downmix_averages_stereo_frames() {
        let mono = downmix(&[1.0f32, 0.0, -0.5, -0.5, f32::NAN, 1.0], 2, |s| s);
        assert_eq!(mono, vec![0.5, -0.5, 0.5]);
    }

    #[test]
    fn test_downmix_converts_i16() {
        let mono = downmix(&[i16::MIN, 16384i16], 1, |s| s as f32 / 32768.0);
        assert_eq!(mono, vec![-1.0, 0.5]);
    }
}
