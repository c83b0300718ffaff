//! octopid-sc: sound capture and band-energy extraction
//!
//! Provides the audio side of the avatar server:
//! - Loopback capture of system audio (cpal)
//! - Spectral analysis into bass/mid/high energies (rustfft)
//! - Moving-average smoothing of the bass level
//! - The feature extractor loop publishing levels to the active session

pub mod error;
pub mod config;
pub mod smoothing;
pub mod audio_analyzer;
pub mod audio_capture;
pub mod feature_extractor;

pub use error::AudioError;
pub use config::{AnalysisConfig, AudioConfig, BandConfig, CaptureConfig};
pub use smoothing::SmoothingWindow;
pub use audio_analyzer::{AudioAnalyzer, Band, BandEnergy, BandLevels};
pub use audio_capture::{CaptureSource, LoopbackCapture};
pub use feature_extractor::{FeatureExtractor, TickOutcome};
