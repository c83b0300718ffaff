//! Thin WebSocket client for the avatar control channel

use futures_util::{SinkExt, StreamExt};
use octopid_core::{Command, ServerMessage};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, warn};

/// Outcome of waiting for one server message
#[derive(Debug)]
pub enum Received {
    Message(ServerMessage),
    Idle,
    Closed,
}

pub struct ControllerClient {
    socket: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

impl ControllerClient {
    pub async fn connect(url: &str) -> anyhow::Result<Self> {
        let (socket, _) = connect_async(url)
            .await
            .map_err(|e| anyhow::anyhow!("Could not connect to {}: {}. Is octopid-server running?", url, e))?;
        debug!("Connected to {}", url);
        Ok(Self { socket })
    }

    pub async fn send(&mut self, command: Command) -> anyhow::Result<()> {
        let payload = command.encode();
        self.socket.send(Message::Text(payload.clone())).await?;
        println!("Sent command: {}", payload);
        Ok(())
    }

    /// Wait up to `wait` for the next server message
    pub async fn next_message(&mut self, wait: Duration) -> Received {
        let deadline = tokio::time::Instant::now() + wait;
        loop {
            let frame = match tokio::time::timeout_at(deadline, self.socket.next()).await {
                Err(_) => return Received::Idle,
                Ok(None) => return Received::Closed,
                Ok(Some(frame)) => frame,
            };
            match frame {
                Ok(Message::Text(text)) => match serde_json::from_str::<ServerMessage>(&text) {
                    Ok(message) => return Received::Message(message),
                    Err(e) => warn!("Unrecognized server message {}: {}", text, e),
                },
                Ok(Message::Close(frame)) => {
                    if let Some(frame) = frame {
                        println!("Server closed the connection: {} ({})", frame.reason, u16::from(frame.code));
                    }
                    return Received::Closed;
                }
                Ok(_) => {}
                Err(e) => {
                    warn!("Connection error: {}", e);
                    return Received::Closed;
                }
            }
        }
    }

    /// Keep the connection serviced (pings answered, messages drained) for `duration`
    pub async fn hold(&mut self, duration: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + duration;
        loop {
            let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
            if remaining.is_zero() {
                return true;
            }
            match tokio::time::timeout(remaining, self.socket.next()).await {
                Err(_) => return true,
                Ok(None) | Ok(Some(Err(_))) | Ok(Some(Ok(Message::Close(_)))) => return false,
                Ok(Some(Ok(_))) => {}
            }
        }
    }

    pub async fn close(mut self) -> anyhow::Result<()> {
        self.socket.close(None).await?;
        Ok(())
    }
}
