//! WebSocket bridge serving the active avatar client

use crate::commands::CommandInterpreter;
use crate::config::BridgeConfig;
use crate::error::AvatarError;
use crate::session::{Outbound, SessionId, SessionManager};
use axum::extract::ws::{CloseFrame, Message, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::response::Response;
use axum::routing::get;
use axum::Router;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Close code sent to connected clients when the server stops
const CLOSE_GOING_AWAY: u16 = 1001;

/// Multiple of `max_message_size` past which the transport refuses a frame
const HARD_LIMIT_FACTOR: usize = 4;

/// WebSocket endpoint for the avatar renderer and controllers
pub struct AvatarBridge {
    config: BridgeConfig,
    sessions: Arc<SessionManager>,
    interpreter: Arc<CommandInterpreter>,
}

#[derive(Clone)]
struct BridgeState {
    sessions: Arc<SessionManager>,
    interpreter: Arc<CommandInterpreter>,
    max_message_size: usize,
    shutdown: CancellationToken,
}

impl AvatarBridge {
    pub fn new(
        config: BridgeConfig,
        sessions: Arc<SessionManager>,
        interpreter: Arc<CommandInterpreter>,
    ) -> Self {
        Self {
            config,
            sessions,
            interpreter,
        }
    }

    pub fn router(&self, shutdown: CancellationToken) -> Router {
        Router::new()
            .route("/", get(websocket_handler))
            .with_state(BridgeState {
                sessions: Arc::clone(&self.sessions),
                interpreter: Arc::clone(&self.interpreter),
                max_message_size: self.config.max_message_size,
                shutdown,
            })
    }

    /// Bind the configured address and serve until `shutdown` fires
    pub async fn start(&self, shutdown: CancellationToken) -> Result<(), AvatarError> {
        self.config.validate().map_err(AvatarError::Config)?;
        let addr = self.config.bind_address();
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|e| AvatarError::Network(format!("Failed to bind to {}: {}", addr, e)))?;
        self.serve(listener, shutdown).await
    }

    /// Serve on an already bound listener
    pub async fn serve(&self, listener: TcpListener, shutdown: CancellationToken) -> Result<(), AvatarError> {
        let local = listener.local_addr()?;
        info!("Avatar bridge listening on ws://{}", local);

        let app = self.router(shutdown.clone());
        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown.cancelled_owned())
            .await
            .map_err(|e| AvatarError::Network(format!("Avatar bridge server error: {}", e)))?;

        info!("Avatar bridge stopped");
        Ok(())
    }
}

async fn websocket_handler(ws: WebSocketUpgrade, State(state): State<BridgeState>) -> Response {
    // Frames past the hard cap fail the connection before being buffered;
    // frames between the two limits are dropped with a warning below.
    ws.max_message_size(hard_frame_limit(state.max_message_size))
        .max_frame_size(hard_frame_limit(state.max_message_size))
        .on_upgrade(|socket| handle_socket(socket, state))
}

/// Transport-level ceiling for inbound messages
fn hard_frame_limit(max_message_size: usize) -> usize {
    max_message_size.saturating_mul(HARD_LIMIT_FACTOR)
}

async fn handle_socket(socket: WebSocket, state: BridgeState) {
    use futures_util::StreamExt;

    let (id, outbound) = state.sessions.on_connect();
    let (sender, mut receiver) = socket.split();

    let mut send_task = tokio::spawn(write_outbound(id, sender, outbound, state.shutdown.clone()));

    let sessions = Arc::clone(&state.sessions);
    let interpreter = Arc::clone(&state.interpreter);
    let max_message_size = state.max_message_size;
    let mut recv_task = tokio::spawn(async move {
        while let Some(frame) = receiver.next().await {
            match frame {
                Ok(Message::Text(text)) => {
                    if text.len() > max_message_size {
                        warn!(
                            "Session {}: dropping oversized message ({} bytes, max {})",
                            id,
                            text.len(),
                            max_message_size
                        );
                        continue;
                    }
                    if sessions.active_id() != Some(id) {
                        debug!("Session {}: superseded, dropping command", id);
                        continue;
                    }
                    interpreter.handle_text(&text).await;
                }
                Ok(Message::Binary(data)) => {
                    warn!("Session {}: ignoring binary message ({} bytes)", id, data.len());
                }
                Ok(Message::Close(frame)) => {
                    debug!("Session {}: client closed: {:?}", id, frame);
                    break;
                }
                Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => {}
                Err(e) => {
                    warn!("Session {}: receive error: {}", id, e);
                    break;
                }
            }
        }
    });

    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    state.sessions.on_disconnect(id);
}

/// Drain the session queue onto the socket, in order
async fn write_outbound(
    id: SessionId,
    mut sender: futures_util::stream::SplitSink<WebSocket, Message>,
    mut outbound: mpsc::Receiver<Outbound>,
    shutdown: CancellationToken,
) {
    use futures_util::SinkExt;

    loop {
        let item = tokio::select! {
            () = shutdown.cancelled() => Outbound::Close {
                code: CLOSE_GOING_AWAY,
                reason: "server shutting down".to_string(),
            },
            item = outbound.recv() => match item {
                Some(item) => item,
                None => break,
            },
        };

        match item {
            Outbound::Message(message) => {
                let json = match message.to_json() {
                    Ok(json) => json,
                    Err(e) => {
                        warn!("Session {}: failed to encode message: {}", id, e);
                        continue;
                    }
                };
                if sender.send(Message::Text(json)).await.is_err() {
                    debug!("Session {}: send failed, connection gone", id);
                    break;
                }
            }
            Outbound::Close { code, reason } => {
                debug!("Session {}: closing with {} ({})", id, code, reason);
                let frame = CloseFrame {
                    code,
                    reason: reason.into(),
                };
                let _ = sender.send(Message::Close(Some(frame))).await;
                break;
            }
        }
    }
}
