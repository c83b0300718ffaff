//! Wires the extractor, control plane and bridge together

use crate::config::OctopidConfig;
use octopid_core::{ControlState, Result};
use octopid_me::{AvatarBridge, CommandInterpreter, DemoSequencer, SessionManager};
use octopid_sc::{FeatureExtractor, LoopbackCapture};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// One running server instance
pub struct OctopidServer {
    config: OctopidConfig,
    control: Arc<ControlState>,
    sessions: Arc<SessionManager>,
    demo: Arc<DemoSequencer>,
    bridge: AvatarBridge,
}

impl OctopidServer {
    pub fn new(config: OctopidConfig) -> Self {
        let control = Arc::new(ControlState::new());
        let sessions = Arc::new(SessionManager::new(Arc::clone(&control)));
        let demo = Arc::new(DemoSequencer::new(
            sessions.clone(),
            Arc::clone(&control),
            config.demo.clone(),
        ));
        let interpreter = Arc::new(CommandInterpreter::new(
            sessions.clone(),
            Arc::clone(&control),
            Arc::clone(&demo),
        ));
        let bridge = AvatarBridge::new(config.network.clone(), Arc::clone(&sessions), interpreter);

        Self {
            config,
            control,
            sessions,
            demo,
            bridge,
        }
    }

    pub fn control(&self) -> &Arc<ControlState> {
        &self.control
    }

    pub fn sessions(&self) -> &Arc<SessionManager> {
        &self.sessions
    }

    /// Serve on the configured address until `shutdown` fires
    pub async fn run(self, shutdown: CancellationToken) -> Result<()> {
        let addr = self.config.network.bind_address();
        let listener = TcpListener::bind(&addr).await?;
        self.run_on(listener, shutdown).await
    }

    /// Serve on an already bound listener until `shutdown` fires
    pub async fn run_on(self, listener: TcpListener, shutdown: CancellationToken) -> Result<()> {
        let tasks = shutdown.child_token();
        let extractor = self.spawn_extractor(tasks.clone()).await;

        let served = self.bridge.serve(listener, shutdown).await;

        // The bridge may also return on a server error; stop everything else either way
        tasks.cancel();
        self.demo.stop().await;
        if let Some(handle) = extractor {
            let _ = handle.await;
        }
        info!("OctopID stopped");

        served.map_err(Into::into)
    }

    /// Open the capture device and start the extractor. A missing device
    /// leaves the server running with audio unavailable.
    async fn spawn_extractor(&self, cancel: CancellationToken) -> Option<JoinHandle<()>> {
        let audio = self.config.audio.clone();
        if !audio.enabled {
            info!("Audio capture disabled by configuration");
            return None;
        }

        let opened = tokio::task::spawn_blocking({
            let audio = audio.clone();
            move || LoopbackCapture::open(&audio)
        })
        .await;

        let capture = match opened {
            Ok(Ok(capture)) => capture,
            Ok(Err(e)) => {
                error!("Could not open audio capture, continuing without audio: {}", e);
                self.control.mark_capture_faulted();
                return None;
            }
            Err(e) => {
                error!("Audio capture setup panicked, continuing without audio: {}", e);
                self.control.mark_capture_faulted();
                return None;
            }
        };
        info!(
            "Capturing from '{}' at {} Hz",
            capture.device_name(),
            octopid_sc::CaptureSource::sample_rate(&capture)
        );

        let sink = self.sessions.clone();
        match FeatureExtractor::new(&audio, capture, Arc::clone(&self.control), sink) {
            Ok(extractor) => Some(tokio::spawn(extractor.run(cancel))),
            Err(e) => {
                error!("Could not start feature extractor: {}", e);
                self.control.mark_capture_faulted();
                None
            }
        }
    }
}
