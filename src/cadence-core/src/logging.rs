use crate::{config::LoggingConfig, paths::AppDirs};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use thiserror::Error;
use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_subscriber::fmt::writer::{BoxMakeWriter, MakeWriterExt};
use tracing_subscriber::{fmt, EnvFilter};

const DEFAULT_LOG_FILE: &str = "cadence.log";

/// Overrides the configured level with full `EnvFilter` directives, e.g.
/// `CADENCE_LOG=cadence_player=trace,info`.
pub const LOG_ENV: &str = "CADENCE_LOG";

/// Keeps the background file writer alive; drop it last to flush buffered lines.
pub struct LoggingGuard {
    _file: WorkerGuard,
}

/// Installs the global subscriber: a daily rolling file, plus stderr when enabled.
/// Nothing is ever written to stdout.
pub fn init_logging(config: &LoggingConfig, dirs: &AppDirs) -> Result<LoggingGuard, LoggingError> {
    let filter = level_filter(config, std::env::var(LOG_ENV).ok())?;
    let (file, guard) = rolling_file(config, dirs.log_dir())?;

    let writer = if config.stderr {
        BoxMakeWriter::new(std::io::stderr.and(file))
    } else {
        BoxMakeWriter::new(file)
    };

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_ansi(false)
        .with_writer(writer)
        .try_init()
        .map_err(LoggingError::Install)?;

    Ok(LoggingGuard { _file: guard })
}

fn level_filter(
    config: &LoggingConfig,
    override_directives: Option<String>,
) -> Result<EnvFilter, LoggingError> {
    let directives = override_directives
        .filter(|d| !d.trim().is_empty())
        .unwrap_or_else(|| config.level.as_filter_directive().to_string());
    EnvFilter::try_new(&directives)
        .map_err(|source| LoggingError::InvalidFilter { directives, source })
}

fn rolling_file(
    config: &LoggingConfig,
    log_dir: &Path,
) -> Result<(NonBlocking, WorkerGuard), LoggingError> {
    fs::create_dir_all(log_dir).map_err(|source| LoggingError::CreateDirectory {
        path: log_dir.to_path_buf(),
        source,
    })?;
    let prefix = config.file_name.as_deref().unwrap_or(DEFAULT_LOG_FILE);
    prune_logs(log_dir, prefix, config.max_log_files.max(1))?;

    let appender = tracing_appender::rolling::daily(log_dir, prefix);
    Ok(tracing_appender::non_blocking(appender))
}

/// Delete all but the `keep` most recently modified files starting with `prefix`.
fn prune_logs(dir: &Path, prefix: &str, keep: usize) -> Result<(), LoggingError> {
    let entries = fs::read_dir(dir).map_err(|source| LoggingError::ReadDir {
        path: dir.to_path_buf(),
        source,
    })?;

    let mut logs: Vec<(SystemTime, PathBuf)> = entries
        .flatten()
        .filter(|entry| entry.file_name().to_string_lossy().starts_with(prefix))
        .filter_map(|entry| Some((entry.metadata().ok()?.modified().ok()?, entry.path())))
        .collect();
    logs.sort_by(|a, b| b.0.cmp(&a.0));

    for (_, path) in logs.into_iter().skip(keep) {
        tracing::debug!(path = %path.display(), "removing old log file");
        fs::remove_file(&path).map_err(|source| LoggingError::Prune { path, source })?;
    }
    Ok(())
}

#[derive(Debug, Error)]
pub enum LoggingError {
    #[error("failed to create log directory {path}: {source}")]
    CreateDirectory {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid log filter '{directives}': {source}")]
    InvalidFilter {
        directives: String,
        source: tracing_subscriber::filter::ParseError,
    },
    #[error("failed to install tracing subscriber: {0}")]
    Install(Box<dyn std::error::Error + Send + Sync>),
    #[error("failed to list log directory {path}: {source}")]
    ReadDir {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to remove old log file {path}: {source}")]
    Prune {
        path: PathBuf,
        source: std::io::Error,
    },
}
