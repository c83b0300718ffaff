// OctopID controller
// Sends mood, audio and demo commands to a running octopid-server

mod client;

use clap::{Parser, Subcommand, ValueEnum};
use client::{ControllerClient, Received};
use octopid_core::{AudioCommand, Command, DemoCommand, Mood, ServerMessage};
use rand::seq::SliceRandom;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "octopid")]
#[command(about = "Control the OctopID avatar", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Server URL
    #[arg(long, default_value = "ws://127.0.0.1:8760", global = true)]
    url: String,

    #[arg(long, short, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Set the avatar's mood
    Mood {
        #[arg(value_parser = parse_mood)]
        mood: Mood,
    },

    /// Turn audio reactivity on or off
    Audio {
        #[arg(value_enum)]
        state: Toggle,
    },

    /// Start or stop the mood demo
    Demo {
        #[arg(value_enum)]
        action: DemoAction,
    },

    /// Print what the server sends
    Listen {
        /// Stop after this many seconds (runs until closed if omitted)
        #[arg(long)]
        seconds: Option<u64>,
    },

    /// Walk through moods, audio and the demo, ending on a random mood
    Showcase,

    /// List the moods the avatar knows
    Moods,
}

#[derive(Clone, Copy, ValueEnum)]
enum Toggle {
    On,
    Off,
}

#[derive(Clone, Copy, ValueEnum)]
enum DemoAction {
    Start,
    Stop,
}

impl From<Toggle> for Command {
    fn from(toggle: Toggle) -> Self {
        match toggle {
            Toggle::On => Command::AudioToggle(AudioCommand::On),
            Toggle::Off => Command::AudioToggle(AudioCommand::Off),
        }
    }
}

impl From<DemoAction> for Command {
    fn from(action: DemoAction) -> Self {
        match action {
            DemoAction::Start => Command::DemoControl(DemoCommand::Start),
            DemoAction::Stop => Command::DemoControl(DemoCommand::Stop),
        }
    }
}

fn parse_mood(name: &str) -> Result<Mood, String> {
    name.parse::<Mood>().map_err(|e| {
        let known: Vec<&str> = Mood::ALL.iter().map(|m| m.as_str()).collect();
        format!("{} (expected one of: {})", e, known.join(", "))
    })
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    if cli.verbose {
        tracing_subscriber::fmt()
            .with_max_level(tracing::Level::DEBUG)
            .init();
    }

    match cli.command {
        Commands::Mood { mood } => send_one(&cli.url, Command::SetMood(mood)).await?,
        Commands::Audio { state } => send_one(&cli.url, state.into()).await?,
        Commands::Demo { action } => send_one(&cli.url, action.into()).await?,
        Commands::Listen { seconds } => listen(&cli.url, seconds.map(Duration::from_secs)).await?,
        Commands::Showcase => showcase(&cli.url).await?,
        Commands::Moods => {
            for mood in Mood::ALL {
                println!("{}", mood);
            }
        }
    }

    Ok(())
}

async fn send_one(url: &str, command: Command) -> anyhow::Result<()> {
    let mut client = ControllerClient::connect(url).await?;
    client.send(command).await?;
    // Let the server read the frame before the close arrives
    client.hold(Duration::from_millis(200)).await;
    client.close().await
}

async fn listen(url: &str, limit: Option<Duration>) -> anyhow::Result<()> {
    let mut client = ControllerClient::connect(url).await?;
    println!("Listening on {} (Ctrl+C to stop)", url);

    let deadline = limit.map(|d| tokio::time::Instant::now() + d);
    loop {
        let wait = match deadline {
            Some(deadline) => deadline.saturating_duration_since(tokio::time::Instant::now()),
            None => Duration::from_secs(3600),
        };
        if wait.is_zero() {
            break;
        }

        match client.next_message(wait).await {
            Received::Message(ServerMessage::Audio { bass, mids, highs }) => {
                println!(
                    "audio  bass={:.3} mids={} highs={}",
                    bass,
                    mids.map_or("-".to_string(), |v| format!("{:.3}", v)),
                    highs.map_or("-".to_string(), |v| format!("{:.3}", v)),
                );
            }
            Received::Message(ServerMessage::Mood { mood }) => println!("mood   {}", mood),
            Received::Idle => {}
            Received::Closed => return Ok(()),
        }
    }

    client.close().await
}

async fn showcase(url: &str) -> anyhow::Result<()> {
    let mut client = ControllerClient::connect(url).await?;
    println!("Connected to {}", url);

    println!("\nCycling through some moods...");
    for mood in [Mood::Happy, Mood::Sad, Mood::Surprised, Mood::Angry, Mood::Neutral] {
        client.send(Command::SetMood(mood)).await?;
        pause(&mut client, 2).await?;
    }

    println!("\nTurning audio on. Play some music or talk!");
    client.send(Command::AudioToggle(AudioCommand::On)).await?;
    pause(&mut client, 8).await?;

    println!("\nTurning audio off.");
    client.send(Command::AudioToggle(AudioCommand::Off)).await?;
    pause(&mut client, 2).await?;

    println!("\nStarting the demo...");
    client.send(Command::DemoControl(DemoCommand::Start)).await?;
    pause(&mut client, 10).await?;

    println!("\nStopping the demo.");
    client.send(Command::DemoControl(DemoCommand::Stop)).await?;
    pause(&mut client, 2).await?;

    let mood = Mood::ALL
        .choose(&mut rand::thread_rng())
        .copied()
        .unwrap_or_default();
    println!("\nSetting a final random mood: {}", mood);
    client.send(Command::SetMood(mood)).await?;
    pause(&mut client, 3).await?;

    println!("\nShowcase finished.");
    client.close().await
}

async fn pause(client: &mut ControllerClient, seconds: u64) -> anyhow::Result<()> {
    if client.hold(Duration::from_secs(seconds)).await {
        Ok(())
    } else {
        anyhow::bail!("Connection closed by the server (another client may have connected)")
    }
}
