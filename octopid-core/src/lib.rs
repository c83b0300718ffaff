//! octopid-core: shared vocabulary for the OctopID avatar server
//!
//! Holds the pieces every other crate agrees on:
//! - The closed `Mood` enumeration (also the renderer's source of truth)
//! - Wire protocol messages in both directions
//! - Process-wide `ControlState` flags
//! - The `MessageSink` seam between producers and the active session

pub mod error;
pub mod mood;
pub mod protocol;
pub mod control;
pub mod sink;

pub use error::{Error, Result};
pub use mood::Mood;
pub use protocol::{AudioCommand, Command, DemoCommand, ProtocolError, ServerMessage};
pub use control::ControlState;
pub use sink::MessageSink;
