//! WebSocket wire protocol
//!
//! Every frame is a UTF-8 JSON object tagged by `type`.

use crate::mood::Mood;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::fmt;
use thiserror::Error;

/// Messages sent to the connected client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ServerMessage {
    /// Audio band levels in [0, 1]
    Audio {
        bass: f32,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        mids: Option<f32>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        highs: Option<f32>,
    },
    /// Expression change
    Mood { mood: Mood },
}

impl ServerMessage {
    pub fn audio(bass: f32, mids: f32, highs: f32) -> Self {
        ServerMessage::Audio {
            bass,
            mids: Some(mids),
            highs: Some(highs),
        }
    }

    /// `{"type":"audio","bass":0}`, tells the renderer to close the mouth
    pub fn audio_reset() -> Self {
        ServerMessage::Audio {
            bass: 0.0,
            mids: None,
            highs: None,
        }
    }

    pub fn mood(mood: Mood) -> Self {
        ServerMessage::Mood { mood }
    }

    /// A live level reading from the extractor, as opposed to the reset
    pub fn is_level_tick(&self) -> bool {
        matches!(self, ServerMessage::Audio { mids: Some(_), .. })
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioCommand {
    On,
    Off,
}

impl AudioCommand {
    pub fn as_str(&self) -> &'static str {
        match self {
            AudioCommand::On => "on",
            AudioCommand::Off => "off",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DemoCommand {
    Start,
    Stop,
}

impl DemoCommand {
    pub fn as_str(&self) -> &'static str {
        match self {
            DemoCommand::Start => "start",
            DemoCommand::Stop => "stop",
        }
    }
}

/// Validated inbound control command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    SetMood(Mood),
    AudioToggle(AudioCommand),
    DemoControl(DemoCommand),
}

/// Why an inbound frame was rejected
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("malformed JSON: {0}")]
    Malformed(String),

    #[error("unknown message type '{0}'")]
    UnknownType(String),

    #[error("message type '{kind}' is missing field '{field}'")]
    MissingField { kind: &'static str, field: &'static str },

    #[error("unknown mood '{0}'")]
    UnknownMood(String),

    #[error("unknown {kind} command '{value}'")]
    UnknownCommand { kind: &'static str, value: String },
}

impl ProtocolError {
    /// Whether the frame carried a `type` other than `demo`. Such frames
    /// still interrupt a running demo even though they are otherwise ignored.
    pub fn preempts_demo(&self) -> bool {
        match self {
            ProtocolError::Malformed(_) => false,
            ProtocolError::UnknownType(_) | ProtocolError::UnknownMood(_) => true,
            ProtocolError::MissingField { kind, .. } | ProtocolError::UnknownCommand { kind, .. } => {
                *kind != "demo"
            }
        }
    }
}

/// Loose shape of an inbound frame before validation
#[derive(Deserialize)]
struct RawCommand {
    #[serde(rename = "type")]
    kind: String,
    mood: Option<String>,
    command: Option<String>,
}

impl Command {
    /// Decode and validate one text frame
    pub fn decode(text: &str) -> Result<Command, ProtocolError> {
        let raw: RawCommand =
            serde_json::from_str(text).map_err(|e| ProtocolError::Malformed(e.to_string()))?;

        match raw.kind.as_str() {
            "mood" => {
                let name = raw.mood.ok_or(ProtocolError::MissingField {
                    kind: "mood",
                    field: "mood",
                })?;
                let mood = name
                    .parse::<Mood>()
                    .map_err(|_| ProtocolError::UnknownMood(name.clone()))?;
                Ok(Command::SetMood(mood))
            }
            "audio" => {
                let value = raw.command.ok_or(ProtocolError::MissingField {
                    kind: "audio",
                    field: "command",
                })?;
                match value.as_str() {
                    "on" => Ok(Command::AudioToggle(AudioCommand::On)),
                    "off" => Ok(Command::AudioToggle(AudioCommand::Off)),
                    _ => Err(ProtocolError::UnknownCommand { kind: "audio", value }),
                }
            }
            "demo" => {
                let value = raw.command.ok_or(ProtocolError::MissingField {
                    kind: "demo",
                    field: "command",
                })?;
                match value.as_str() {
                    "start" => Ok(Command::DemoControl(DemoCommand::Start)),
                    "stop" => Ok(Command::DemoControl(DemoCommand::Stop)),
                    _ => Err(ProtocolError::UnknownCommand { kind: "demo", value }),
                }
            }
            _ => Err(ProtocolError::UnknownType(raw.kind)),
        }
    }

    /// Client-side wire form
    pub fn encode(&self) -> String {
        let value = match self {
            Command::SetMood(mood) => json!({ "type": "mood", "mood": mood.as_str() }),
            Command::AudioToggle(cmd) => json!({ "type": "audio", "command": cmd.as_str() }),
            Command::DemoControl(cmd) => json!({ "type": "demo", "command": cmd.as_str() }),
        };
        value.to_string()
    }

    pub fn is_demo(&self) -> bool {
        matches!(self, Command::DemoControl(_))
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::SetMood(mood) => write!(f, "mood {}", mood),
            Command::AudioToggle(cmd) => write!(f, "audio {}", cmd.as_str()),
            Command::DemoControl(cmd) => write!(f, "demo {}", cmd.as_str()),
        }
    }
}
