//! octopid-me: control plane for the OctopID avatar
//!
//! Provides:
//! - Single active session with newest-connection-wins eviction
//! - Command interpreter for mood, audio and demo commands
//! - Interruptible demo sequencer cycling through every mood
//! - WebSocket bridge serving the active client

pub mod error;
pub mod config;
pub mod session;
pub mod demo;
pub mod commands;
pub mod bridge;

pub use error::AvatarError;
pub use config::{BridgeConfig, DemoConfig};
pub use session::{Outbound, SessionId, SessionManager};
pub use demo::DemoSequencer;
pub use commands::CommandInterpreter;
pub use bridge::AvatarBridge;
