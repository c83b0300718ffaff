//! Server configuration: defaults, file, environment, then command line

use octopid_core::Error as CoreError;
use octopid_me::{BridgeConfig, DemoConfig};
use octopid_sc::AudioConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    IoError(String),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

impl From<ConfigError> for CoreError {
    fn from(err: ConfigError) -> Self {
        CoreError::Configuration(err.to_string())
    }
}

/// Complete server configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct OctopidConfig {
    /// WebSocket listener
    pub network: BridgeConfig,

    /// Filter used when RUST_LOG is not set
    pub log_level: LogLevel,

    pub audio: AudioConfig,

    pub demo: DemoConfig,
}

/// Default log filter directive, e.g. `info` or `octopid_me=debug,info`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LogLevel(pub String);

impl Default for LogLevel {
    fn default() -> Self {
        LogLevel("info".to_string())
    }
}

impl LogLevel {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl OctopidConfig {
    /// Load configuration from a JSON or TOML file
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::IoError(format!("{}: {}", path.display(), e)))?;

        match path.extension().and_then(|ext| ext.to_str()) {
            Some("json") => serde_json::from_str(&content)
                .map_err(|e| ConfigError::ParseError(format!("{}: {}", path.display(), e))),
            Some("toml") => toml::from_str(&content)
                .map_err(|e| ConfigError::ParseError(format!("{}: {}", path.display(), e))),
            _ => Self::from_str(&content),
        }
    }

    /// Parse configuration, trying JSON first and then TOML
    pub fn from_str(content: &str) -> Result<Self, ConfigError> {
        if let Ok(config) = serde_json::from_str::<OctopidConfig>(content) {
            return Ok(config);
        }

        toml::from_str::<OctopidConfig>(content)
            .map_err(|e| ConfigError::ParseError(format!("neither JSON nor TOML: {}", e)))
    }

    /// Overlay `OCTOPID_*` environment variables
    pub fn apply_env(&mut self) -> Result<(), ConfigError> {
        self.apply_env_from(|key| std::env::var(key).ok())
    }

    pub fn apply_env_from(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<(), ConfigError> {
        if let Some(host) = lookup("OCTOPID_HOST") {
            self.network.host = host;
        }

        if let Some(port) = lookup("OCTOPID_PORT") {
            self.network.port = port
                .trim()
                .parse()
                .map_err(|_| ConfigError::Invalid(format!("OCTOPID_PORT is not a port number: '{}'", port)))?;
        }

        if let Some(level) = lookup("OCTOPID_LOG_LEVEL") {
            self.log_level = LogLevel(level);
        }

        if let Some(device) = lookup("OCTOPID_AUDIO_DEVICE") {
            self.audio.capture.device_name = Some(device);
        }

        Ok(())
    }

    /// Validate every section
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.network.validate().map_err(ConfigError::Invalid)?;
        self.audio.validate().map_err(ConfigError::Invalid)?;
        self.demo.validate().map_err(ConfigError::Invalid)?;

        if self.log_level.as_str().trim().is_empty() {
            return Err(ConfigError::Invalid("Log level cannot be empty".to_string()));
        }

        Ok(())
    }
}
