//! Error types for octopid-me

use octopid_core::Error as CoreError;
use thiserror::Error;

/// Control plane errors
#[derive(Error, Debug)]
pub enum AvatarError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Core error: {0}")]
    Core(#[from] CoreError),
}

impl From<AvatarError> for CoreError {
    fn from(err: AvatarError) -> Self {
        match err {
            AvatarError::Core(inner) => inner,
            AvatarError::Config(msg) => CoreError::Configuration(msg),
            other => CoreError::Session(other.to_string()),
        }
    }
}
