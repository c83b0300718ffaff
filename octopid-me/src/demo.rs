//! Demo mode: cycle through every mood, always ending on neutral

use crate::config::DemoConfig;
use octopid_core::{ControlState, MessageSink, Mood, ServerMessage};
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

struct DemoRun {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

/// Runs at most one demo at a time
///
/// A run stops when its token is cancelled (push) or when the shared
/// `demo_running` flag is cleared by someone else, such as a disconnect
/// (polled once per slice). Either way the neutral finalizer runs.
pub struct DemoSequencer {
    sink: Arc<dyn MessageSink>,
    control: Arc<ControlState>,
    config: DemoConfig,
    run: Mutex<Option<DemoRun>>,
}

impl DemoSequencer {
    pub fn new(sink: Arc<dyn MessageSink>, control: Arc<ControlState>, config: DemoConfig) -> Self {
        Self {
            sink,
            control,
            config,
            run: Mutex::new(None),
        }
    }

    pub fn is_running(&self) -> bool {
        self.control.is_demo_running()
    }

    /// Launch the sequence in the background; false if one is already running
    pub async fn start(&self) -> bool {
        let mut run = self.run.lock().await;
        if self.control.is_demo_running() {
            debug!("Demo already running, ignoring start");
            return false;
        }

        // A previous run may still be inside its last slice after an
        // external clear; let its finalizer go out first.
        if let Some(previous) = run.take() {
            previous.cancel.cancel();
            let _ = previous.handle.await;
        }

        if !self.control.try_start_demo() {
            return false;
        }

        let cancel = CancellationToken::new();
        let handle = tokio::spawn(run_sequence(
            Arc::clone(&self.sink),
            Arc::clone(&self.control),
            self.config.clone(),
            cancel.clone(),
        ));
        *run = Some(DemoRun { cancel, handle });
        info!("Demo started ({:?} per mood)", self.config.hold_duration());
        true
    }

    /// Stop the running demo and wait for its finalizer; false if none was running
    pub async fn stop(&self) -> bool {
        let was_running = self.halt().await;
        if was_running {
            info!("Demo stopped");
        } else {
            debug!("No demo running, ignoring stop");
        }
        was_running
    }

    /// Stop any demo before a manual command is applied, so the demo cannot
    /// overwrite it. Returns true if a demo was interrupted.
    pub async fn preempt(&self) -> bool {
        let interrupted = self.halt().await;
        if interrupted {
            info!("Demo interrupted by manual command");
        }
        interrupted
    }

    /// Wait for the current run to end on its own
    pub async fn join(&self) {
        let mut run = self.run.lock().await;
        if let Some(current) = run.take() {
            let _ = current.handle.await;
        }
    }

    async fn halt(&self) -> bool {
        let mut run = self.run.lock().await;
        let was_running = self.control.stop_demo();
        if let Some(current) = run.take() {
            current.cancel.cancel();
            let _ = current.handle.await;
        }
        was_running
    }
}

/// Sends neutral and clears the flag when the run ends, however it ends
struct Finalizer {
    sink: Arc<dyn MessageSink>,
    control: Arc<ControlState>,
}

impl Drop for Finalizer {
    fn drop(&mut self) {
        self.sink.send(ServerMessage::mood(Mood::Neutral));
        self.control.stop_demo();
        debug!("Demo finalized on neutral");
    }
}

async fn run_sequence(
    sink: Arc<dyn MessageSink>,
    control: Arc<ControlState>,
    config: DemoConfig,
    cancel: CancellationToken,
) {
    let _finalizer = Finalizer {
        sink: Arc::clone(&sink),
        control: Arc::clone(&control),
    };
    let slice = config.slice_interval();

    'moods: for mood in Mood::demo_sequence() {
        if cancel.is_cancelled() || !control.is_demo_running() {
            break;
        }
        debug!("Demo mood: {}", mood);
        sink.send(ServerMessage::mood(mood));

        for _ in 0..config.slices_per_mood {
            if !control.is_demo_running() {
                break 'moods;
            }
            tokio::select! {
                () = cancel.cancelled() => break 'moods,
                () = tokio::time::sleep(slice) => {}
            }
            if !control.is_demo_running() {
                break 'moods;
            }
        }
    }
}
