use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use cadence_audio::{MediaBackend, SimulatedBackend};
use cadence_bridge::BridgeHost;
use cadence_core::{init_logging, AppDirs, BackendKind, Config, PlayerSettings};
use cadence_player::{ChannelSink, PlayerEvent, PlayerRegistry};
use clap::{Parser, Subcommand, ValueEnum};
use thiserror::Error;

#[derive(Debug, Parser)]
#[command(name = "cadence", version, about = "Audio players behind a method channel")]
struct Cli {
    /// Backend override (takes precedence over config)
    #[arg(long, global = true, value_enum)]
    backend: Option<BackendArg>,
    /// Directory holding config.toml and logs instead of the platform defaults
    #[arg(long, global = true)]
    config_root: Option<PathBuf>,
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Serve the method channel on stdin/stdout (default)
    Serve,
    /// Play one source and print its events until it finishes
    Play(PlayCommand),
    /// Print the effective configuration
    Config,
}

#[derive(Debug, Parser, Clone)]
struct PlayCommand {
    /// File path or URL
    source: String,
    /// Identifier tagging the player's events
    #[arg(long, default_value = "cli")]
    uid: String,
    /// Milliseconds between position reports, 0 disables them
    #[arg(long)]
    position_interval: Option<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum BackendArg {
    Simulated,
    Cpal,
}

impl From<BackendArg> for BackendKind {
    fn from(arg: BackendArg) -> Self {
        match arg {
            BackendArg::Simulated => BackendKind::Simulated,
            BackendArg::Cpal => BackendKind::Cpal,
        }
    }
}

#[derive(Debug, Error)]
enum BackendError {
    #[error("the {0} backend is not compiled in (rebuild with --features cpal-backend)")]
    NotCompiled(&'static str),
}

fn build_backend(kind: BackendKind) -> Result<Arc<dyn MediaBackend>, BackendError> {
    match kind {
        BackendKind::Simulated => Ok(Arc::new(SimulatedBackend::default())),
        #[cfg(feature = "cpal-backend")]
        BackendKind::Cpal => Ok(Arc::new(cadence_audio::CpalBackend)),
        #[cfg(not(feature = "cpal-backend"))]
        BackendKind::Cpal => Err(BackendError::NotCompiled("cpal")),
    }
}

fn effective_settings(config: &Config, backend: Option<BackendArg>) -> PlayerSettings {
    let mut settings = config.player.clone();
    if let Some(backend) = backend {
        settings.backend = backend.into();
    }
    settings
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let dirs = match &cli.config_root {
        Some(root) => AppDirs::rooted_at(root),
        None => AppDirs::discover()?,
    };
    let config = Config::load_or_default(&dirs)?;
    let _logging = init_logging(&config.logging, &dirs)?;
    let settings = effective_settings(&config, cli.backend);

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(settings).await,
        Command::Play(play) => play_once(play, settings).await,
        Command::Config => {
            println!("config: {}", Config::config_path(&dirs).display());
            println!("logs: {}", dirs.log_dir().display());
            print_settings(&settings);
            Ok(())
        }
    }
}

async fn serve(settings: PlayerSettings) -> Result<()> {
    let backend = build_backend(settings.backend)?;
    tracing::info!(backend = ?settings.backend, "serving method channel on stdio");
    let host = BridgeHost::new(std::io::stdout(), backend, settings)?;
    host.serve(tokio::io::BufReader::new(tokio::io::stdin()))
        .await?;
    Ok(())
}

async fn play_once(play: PlayCommand, settings: PlayerSettings) -> Result<()> {
    let backend = build_backend(settings.backend)?;
    let (sink, mut events) = ChannelSink::new();
    let registry = PlayerRegistry::new(Arc::new(sink), backend, settings);

    tracing::info!(uid = %play.uid, source = %play.source, "playing");
    registry
        .get_or_create(&play.uid)
        .play(play.source.clone(), play.position_interval)?;

    let mut failed = None;
    loop {
        tokio::select! {
            event = events.recv() => {
                let Some(tagged) = event else { break };
                println!("[{}] {}", tagged.uid, describe(&tagged.event));
                match tagged.event {
                    PlayerEvent::Stopped { completed: true } => break,
                    PlayerEvent::Error { code, message } => {
                        failed = Some(format!("{}: {message}", code.as_str()));
                        break;
                    }
                    _ => {}
                }
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("interrupted");
                break;
            }
        }
    }

    registry.shutdown_all().await;
    match failed {
        Some(reason) => anyhow::bail!("playback failed ({reason})"),
        None => Ok(()),
    }
}

fn describe(event: &PlayerEvent) -> String {
    match event {
        PlayerEvent::Buffering { percent } => format!("buffering {percent}%"),
        PlayerEvent::Ready { duration } => format!("ready ({})", clock(*duration)),
        PlayerEvent::Started { duration } => format!("playing ({})", clock(*duration)),
        PlayerEvent::Paused => "paused".to_string(),
        PlayerEvent::Stopped { completed: true } => "finished".to_string(),
        PlayerEvent::Stopped { completed: false } => "stopped".to_string(),
        PlayerEvent::Position { position } => clock(Some(*position)),
        PlayerEvent::Error { code, message } => format!("error {}: {message}", code.as_str()),
    }
}

fn clock(duration: Option<Duration>) -> String {
    match duration {
        Some(duration) => {
            let secs = duration.as_secs();
            format!("{}:{:02}", secs / 60, secs % 60)
        }
        None => "--:--".to_string(),
    }
}

fn print_settings(settings: &PlayerSettings) {
    println!("backend: {:?}", settings.backend);
    match settings.position_interval() {
        Some(interval) => println!("position interval: {}ms", interval.as_millis()),
        None => println!("position interval: disabled"),
    }
    println!("forward buffering: {}", settings.forward_buffering);
}

#[cfg(test)]
mod tests {
    use super::*;
    use cadence_player::ErrorCode;

    #[test]
    fn serve_is_the_default_command() {
        let cli = Cli::try_parse_from(["cadence"]).unwrap();
        assert!(cli.command.is_none());
        assert!(cli.backend.is_none());
    }

    #[test]
    fn play_accepts_global_overrides() {
        let cli = Cli::try_parse_from([
            "cadence",
            "play",
            "song.flac",
            "--uid",
            "p7",
            "--position-interval",
            "250",
            "--backend",
            "simulated",
        ])
        .unwrap();

        assert_eq!(cli.backend, Some(BackendArg::Simulated));
        match cli.command {
            Some(Command::Play(play)) => {
                assert_eq!(play.source, "song.flac");
                assert_eq!(play.uid, "p7");
                assert_eq!(play.position_interval, Some(250));
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn unknown_backend_rejected() {
        assert!(Cli::try_parse_from(["cadence", "--backend", "alsa"]).is_err());
    }

    #[test]
    fn backend_flag_overrides_config() {
        let config = Config::default();
        let settings = effective_settings(&config, Some(BackendArg::Cpal));
        assert_eq!(settings.backend, BackendKind::Cpal);
        assert_eq!(settings.position_interval_ms, config.player.position_interval_ms);

        assert_eq!(effective_settings(&config, None), config.player);
    }

    #[cfg(not(feature = "cpal-backend"))]
    #[test]
    fn cpal_requires_feature() {
        let err = build_backend(BackendKind::Cpal).err().expect("cpal is not compiled in");
        assert!(matches!(err, BackendError::NotCompiled("cpal")));
        assert!(build_backend(BackendKind::Simulated).is_ok());
    }

    #[test]
    fn events_are_described_for_humans() {
        assert_eq!(
            describe(&PlayerEvent::Started {
                duration: Some(Duration::from_secs(184))
            }),
            "playing (3:04)"
        );
        assert_eq!(describe(&PlayerEvent::Ready { duration: None }), "ready (--:--)");
        assert_eq!(describe(&PlayerEvent::Stopped { completed: true }), "finished");
        assert_eq!(
            describe(&PlayerEvent::error(ErrorCode::DataSource, "missing")),
            "error datasource: missing"
        );
    }
}
