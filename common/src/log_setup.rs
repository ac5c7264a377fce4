//! Process-wide tracing setup: console output plus a daily rolling log file.

use std::path::PathBuf;
use std::sync::OnceLock;

use tracing::Level;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::fmt::writer::MakeWriterExt;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

static LOG_GUARD: OnceLock<WorkerGuard> = OnceLock::new();

#[derive(Debug, Clone)]
pub struct LogOptions {
    /// Filter used when `RUST_LOG` is not set, e.g. `"info"` or `"hdrmerge=debug"`.
    pub level: String,
    pub directory: PathBuf,
    pub file_prefix: String,
    pub max_files: usize,
}

impl Default for LogOptions {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            directory: PathBuf::from("logs"),
            file_prefix: "hdrmerge".to_string(),
            max_files: 5,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum LogSetupError {
    #[error("Invalid log filter '{filter}': {reason}")]
    InvalidFilter { filter: String, reason: String },
    #[error("Failed to create log directory '{path}': {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to create log file appender: {0}")]
    Appender(String),
    #[error("Logging already initialized")]
    AlreadyInitialized,
}

/// Installs the global subscriber. Warnings and errors go to stderr, everything
/// else to stdout; all events are also written to the rolling file.
pub fn setup_logging(options: &LogOptions) -> Result<(), LogSetupError> {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&options.level))
        .map_err(|e| LogSetupError::InvalidFilter {
            filter: options.level.clone(),
            reason: e.to_string(),
        })?;

    std::fs::create_dir_all(&options.directory).map_err(|source| LogSetupError::CreateDir {
        path: options.directory.clone(),
        source,
    })?;

    let file_appender = tracing_appender::rolling::Builder::new()
        .rotation(tracing_appender::rolling::Rotation::DAILY)
        .filename_prefix(&options.file_prefix)
        .filename_suffix("log")
        .max_log_files(options.max_files)
        .build(&options.directory)
        .map_err(|e| LogSetupError::Appender(e.to_string()))?;

    let (file_writer, guard) = tracing_appender::non_blocking(file_appender);
    LOG_GUARD
        .set(guard)
        .map_err(|_| LogSetupError::AlreadyInitialized)?;

    let console_writer = std::io::stdout
        .with_min_level(Level::INFO)
        .and(std::io::stderr.with_max_level(Level::WARN));

    let console_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_ansi(true)
        .with_writer(console_writer);

    let file_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_line_number(true)
        .with_file(true)
        .with_ansi(false)
        .with_writer(file_writer);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer)
        .with(file_layer)
        .try_init()
        .map_err(|_| LogSetupError::AlreadyInitialized)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_options() {
        let options = LogOptions::default();
        assert_eq!(options.level, "info");
        assert_eq!(options.file_prefix, "hdrmerge");
        assert_eq!(options.max_files, 5);
    }

    #[test]
    fn test_error_messages() {
        let err = LogSetupError::InvalidFilter {
            filter: "=bad".to_string(),
            reason: "parse error".to_string(),
        };
        assert_eq!(err.to_string(), "Invalid log filter '=bad': parse error");
        assert_eq!(
            LogSetupError::AlreadyInitialized.to_string(),
            "Logging already initialized"
        );
    }
}
