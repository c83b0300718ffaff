//! Error types for octopid-sc

use octopid_core::Error as CoreError;
use thiserror::Error;

/// Audio capture and analysis errors
#[derive(Error, Debug)]
pub enum AudioError {
    #[error("Audio capture error: {0}")]
    Capture(String),

    #[error("Audio device error: {0}")]
    Device(String),

    #[error("Audio format error: {0}")]
    Format(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl AudioError {
    /// Device-level failures end audio extraction until restart
    pub fn is_fatal(&self) -> bool {
        matches!(self, AudioError::Device(_) | AudioError::Capture(_))
    }
}

impl From<AudioError> for CoreError {
    fn from(err: AudioError) -> Self {
        CoreError::Audio(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_device_failures_are_fatal() {
        assert!(AudioError::Device("unplugged".to_string()).is_fatal());
        assert!(AudioError::Capture("stream closed".to_string()).is_fatal());
        assert!(!AudioError::Format("I24".to_string()).is_fatal());
        assert!(!AudioError::Config("chunk_size".to_string()).is_fatal());
    }

    #[test]
    fn test_converts_to_core_audio_error() {
        let err: CoreError = AudioError::Device("no input".to_string()).into();
        assert!(matches!(err, CoreError::Audio(msg) if msg == "Audio device error: no input"));
    }
}
