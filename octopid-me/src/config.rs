//! Configuration for the WebSocket bridge and demo mode

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// WebSocket bridge configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// Listen address (localhost by default, no TLS, no auth)
    pub host: String,

    /// Listen port
    pub port: u16,

    /// Largest inbound text frame accepted (bytes)
    pub max_message_size: usize,
}

/// Demo sequencer timing
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DemoConfig {
    /// Length of one interruptible wait slice (ms); bounds stop latency
    pub slice_interval_ms: u64,

    /// Slices each mood is held for
    pub slices_per_mood: u32,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8760,
            max_message_size: 64 * 1024,
        }
    }
}

impl Default for DemoConfig {
    fn default() -> Self {
        Self {
            slice_interval_ms: 100,
            slices_per_mood: 30,
        }
    }
}

impl BridgeConfig {
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.host.is_empty() {
            return Err("Bridge host cannot be empty".to_string());
        }

        if self.host.len() > 253 || self.host.chars().any(|c| c.is_whitespace() || c.is_control()) {
            return Err("Bridge host contains invalid characters".to_string());
        }

        if self.port == 0 {
            return Err("Bridge port cannot be 0".to_string());
        }

        if self.max_message_size == 0 {
            return Err("Max message size must be greater than 0".to_string());
        }

        if self.max_message_size > 1024 * 1024 {
            return Err("Max message size too large (max 1 MiB)".to_string());
        }

        Ok(())
    }
}

impl DemoConfig {
    pub fn slice_interval(&self) -> Duration {
        Duration::from_millis(self.slice_interval_ms)
    }

    /// Time each mood stays on screen
    pub fn hold_duration(&self) -> Duration {
        self.slice_interval() * self.slices_per_mood
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.slice_interval_ms == 0 {
            return Err("Demo slice interval must be greater than 0".to_string());
        }

        if self.slice_interval_ms > 1000 {
            return Err("Demo slice interval too large (max 1000 ms)".to_string());
        }

        if self.slices_per_mood == 0 {
            return Err("Demo must hold each mood for at least one slice".to_string());
        }

        if self.slices_per_mood > 600 {
            return Err("Too many slices per mood (max 600)".to_string());
        }

        Ok(())
    }
}
