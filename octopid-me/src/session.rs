//! Single active session with newest-connection-wins semantics

use octopid_core::{ControlState, MessageSink, ServerMessage};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, info, warn};

/// Monotonically assigned connection identity
pub type SessionId = u64;

/// WebSocket normal closure
pub const CLOSE_NORMAL: u16 = 1000;

/// Close reason sent to an evicted client
pub const SUPERSEDED_REASON: &str = "superseded by a newer connection";

/// Capacity of each connection's outbound queue
pub const OUTBOUND_QUEUE_DEPTH: usize = 256;

/// Slots kept free of audio level ticks so moods, resets and the close
/// still fit behind a stalled client
pub const CONTROL_HEADROOM: usize = 32;

/// Items queued for a connection's writer task, delivered in order
#[derive(Debug, Clone, PartialEq)]
pub enum Outbound {
    Message(ServerMessage),
    Close { code: u16, reason: String },
}

struct ActiveSession {
    id: SessionId,
    tx: mpsc::Sender<Outbound>,
    connected_at: Instant,
}

impl ActiveSession {
    /// Never blocks. Level ticks are shed first once the queue backs up.
    fn enqueue(&self, item: Outbound) -> bool {
        let is_tick = matches!(&item, Outbound::Message(message) if message.is_level_tick());
        if is_tick && self.tx.capacity() <= CONTROL_HEADROOM {
            debug!("Session {}: outbound queue backed up, dropping audio tick", self.id);
            return false;
        }
        match self.tx.try_send(item) {
            Ok(()) => true,
            Err(TrySendError::Full(item)) => {
                warn!("Session {}: outbound queue full, dropping {:?}", self.id, item);
                false
            }
            Err(TrySendError::Closed(_)) => false,
        }
    }
}

/// Owns the one live connection
///
/// All access to the active session goes through one mutex, so a send can
/// never interleave with an eviction or a disconnect.
pub struct SessionManager {
    active: Mutex<Option<ActiveSession>>,
    next_id: AtomicU64,
    control: Arc<ControlState>,
}

impl SessionManager {
    pub fn new(control: Arc<ControlState>) -> Self {
        Self {
            active: Mutex::new(None),
            next_id: AtomicU64::new(1),
            control,
        }
    }

    /// Register a new connection, evicting the current one first.
    ///
    /// Returns the new session's id and the queue its writer drains.
    pub fn on_connect(&self) -> (SessionId, mpsc::Receiver<Outbound>) {
        let (tx, rx) = mpsc::channel(OUTBOUND_QUEUE_DEPTH);

        // Ids are assigned under the lock so the newest id always wins
        let mut active = self.active.lock();
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        if let Some(previous) = active.take() {
            info!(
                "Evicting session {} (connected {:?} ago) in favour of session {}",
                previous.id,
                previous.connected_at.elapsed(),
                id
            );
            // If even the close does not fit, dropping the sender below still
            // ends the old writer once it drains
            previous.enqueue(Outbound::Close {
                code: CLOSE_NORMAL,
                reason: SUPERSEDED_REASON.to_string(),
            });
        }
        *active = Some(ActiveSession {
            id,
            tx,
            connected_at: Instant::now(),
        });
        info!("Session {} connected", id);

        (id, rx)
    }

    /// Forget `id` if it is still the active session. A running demo loses
    /// its audience and is told to stop; audio stays as it was.
    pub fn on_disconnect(&self, id: SessionId) -> bool {
        let mut active = self.active.lock();
        if active.as_ref().map_or(true, |session| session.id != id) {
            debug!("Session {} closed after being superseded", id);
            return false;
        }
        *active = None;
        drop(active);

        if self.control.stop_demo() {
            info!("Session {} disconnected, stopping demo", id);
        } else {
            info!("Session {} disconnected", id);
        }
        true
    }

    pub fn active_id(&self) -> Option<SessionId> {
        self.active.lock().as_ref().map(|session| session.id)
    }

    /// Queue a message for the active session; returns whether it was queued.
    /// A dead connection is not an error, its disconnect path cleans up.
    pub fn deliver(&self, message: ServerMessage) -> bool {
        let active = self.active.lock();
        match active.as_ref() {
            Some(session) => session.enqueue(Outbound::Message(message)),
            None => false,
        }
    }

    /// Evaluate `gate` and deliver only if it passes, holding the session
    /// lock across both so no other send can land in between.
    pub fn deliver_if(&self, message: ServerMessage, gate: &dyn Fn() -> bool) -> bool {
        let active = self.active.lock();
        if !gate() {
            return false;
        }
        if let Some(session) = active.as_ref() {
            session.enqueue(Outbound::Message(message));
        }
        true
    }

    /// Single-client design: broadcasting is delivering to the active session
    pub fn broadcast(&self, message: ServerMessage) {
        self.deliver(message);
    }
}

impl MessageSink for SessionManager {
    fn has_session(&self) -> bool {
        self.active.lock().is_some()
    }

    fn send(&self, message: ServerMessage) {
        self.deliver(message);
    }

    fn send_if(&self, message: ServerMessage, gate: &dyn Fn() -> bool) -> bool {
        self.deliver_if(message, gate)
    }
}
