//! octopid-server: process bootstrap for the OctopID avatar server

pub mod config;
pub mod startup;

pub use config::{ConfigError, LogLevel, OctopidConfig};
pub use startup::OctopidServer;
