//! Continuous audio feature extraction loop

use crate::audio_analyzer::{AudioAnalyzer, BandLevels};
use crate::audio_capture::CaptureSource;
use crate::config::AudioConfig;
use crate::error::AudioError;
use octopid_core::{ControlState, MessageSink, ServerMessage};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Result of a single extractor cycle
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TickOutcome {
    /// Audio off or no client; nothing was read
    Idle,
    /// The capture returned no samples this cycle
    NoData,
    /// Levels were computed and handed to the sink
    Published(BandLevels),
}

/// Reads the capture source, analyzes each chunk and publishes band levels
/// to the active session while audio is enabled.
pub struct FeatureExtractor<C: CaptureSource> {
    capture: C,
    analyzer: AudioAnalyzer,
    control: Arc<ControlState>,
    sink: Arc<dyn MessageSink>,
    chunk_size: usize,
    idle_interval: Duration,
    pacing_interval: Duration,
    was_active: bool,
}

impl<C: CaptureSource> FeatureExtractor<C> {
    pub fn new(
        config: &AudioConfig,
        capture: C,
        control: Arc<ControlState>,
        sink: Arc<dyn MessageSink>,
    ) -> Result<Self, AudioError> {
        config.validate().map_err(AudioError::Config)?;
        let analyzer = AudioAnalyzer::new(config.analysis.clone(), capture.sample_rate())?;

        Ok(Self {
            capture,
            analyzer,
            control,
            sink,
            chunk_size: config.chunk_size,
            idle_interval: Duration::from_millis(config.idle_interval_ms),
            pacing_interval: Duration::from_millis(config.pacing_interval_ms),
            was_active: false,
        })
    }

    pub fn analyzer(&self) -> &AudioAnalyzer {
        &self.analyzer
    }

    fn is_active(&self) -> bool {
        self.control.is_audio_enabled() && self.sink.has_session()
    }

    /// One cycle: gate, read, analyze, publish
    pub async fn tick(&mut self) -> Result<TickOutcome, AudioError> {
        if !self.is_active() {
            self.was_active = false;
            return Ok(TickOutcome::Idle);
        }
        if !self.was_active {
            self.capture.discard_buffered();
            self.was_active = true;
        }

        let samples = self.capture.read(self.chunk_size).await?;
        let Some(levels) = self.analyzer.process(&samples) else {
            return Ok(TickOutcome::NoData);
        };

        // Audio may have been switched off while we were reading. The check
        // and the send are one step for the sink, so a reset can't be overtaken.
        let control = &self.control;
        let message = ServerMessage::audio(levels.bass, levels.mid, levels.high);
        if !self.sink.send_if(message, &|| control.is_audio_enabled()) {
            return Ok(TickOutcome::Idle);
        }
        Ok(TickOutcome::Published(levels))
    }

    /// Run until cancelled or until the capture device fails.
    ///
    /// The capture source is dropped (and the device released) when this
    /// returns, whichever way it exits.
    pub async fn run(mut self, cancel: CancellationToken) {
        info!("Feature extractor started ({} samples per chunk)", self.chunk_size);

        loop {
            let outcome = tokio::select! {
                () = cancel.cancelled() => break,
                outcome = self.tick() => outcome,
            };

            let pause = match outcome {
                Ok(TickOutcome::Idle) => self.idle_interval,
                Ok(TickOutcome::NoData) | Ok(TickOutcome::Published(_)) => self.pacing_interval,
                Err(e) if e.is_fatal() => {
                    error!("Audio capture failed, disabling audio until restart: {}", e);
                    self.control.mark_capture_faulted();
                    break;
                }
                Err(e) => {
                    warn!("Audio cycle skipped: {}", e);
                    self.pacing_interval
                }
            };

            tokio::select! {
                () = cancel.cancelled() => break,
                () = tokio::time::sleep(pause) => {}
            }
        }

        info!("Feature extractor stopped");
    }
}
