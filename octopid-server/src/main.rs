// OctopID - audio-reactive avatar server
// Streams system audio levels and mood changes to the face renderer

use clap::Parser;
use octopid_sc::LoopbackCapture;
use octopid_server::{LogLevel, OctopidConfig, OctopidServer};
use std::path::PathBuf;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "octopid-server")]
#[command(about = "Audio-reactive avatar server", long_about = None)]
#[command(version)]
struct Args {
    /// Configuration file (JSON or TOML)
    #[arg(long, short)]
    config: Option<PathBuf>,

    /// Listen host
    #[arg(long)]
    host: Option<String>,

    /// Listen port
    #[arg(long, short)]
    port: Option<u16>,

    /// Log level (error, warn, info, debug, trace); RUST_LOG takes precedence
    #[arg(long)]
    log_level: Option<String>,

    /// Capture device name or substring
    #[arg(long)]
    device: Option<String>,

    /// Do not open the capture device
    #[arg(long)]
    no_audio: bool,

    /// Print available audio devices and exit
    #[arg(long)]
    list_devices: bool,
}

impl Args {
    /// Defaults, then file, then environment, then flags
    fn load_config(&self) -> anyhow::Result<OctopidConfig> {
        let mut config = match &self.config {
            Some(path) => OctopidConfig::from_file(path)?,
            None => OctopidConfig::default(),
        };
        config.apply_env()?;

        if let Some(host) = &self.host {
            config.network.host = host.clone();
        }
        if let Some(port) = self.port {
            config.network.port = port;
        }
        if let Some(level) = &self.log_level {
            config.log_level = LogLevel(level.clone());
        }
        if let Some(device) = &self.device {
            config.audio.capture.device_name = Some(device.clone());
        }
        if self.no_audio {
            config.audio.enabled = false;
        }

        config.validate()?;
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    if args.list_devices {
        for name in LoopbackCapture::list_devices()? {
            println!("{}", name);
        }
        return Ok(());
    }

    let config = args.load_config()?;

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(config.log_level.as_str()))?;
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    info!("Starting OctopID on ws://{}", config.network.bind_address());

    let shutdown = CancellationToken::new();
    tokio::spawn({
        let shutdown = shutdown.clone();
        async move {
            wait_for_shutdown().await;
            shutdown.cancel();
        }
    });

    OctopidServer::new(config).run(shutdown).await?;
    Ok(())
}

/// Wait for Ctrl+C or SIGTERM
async fn wait_for_shutdown() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
}
