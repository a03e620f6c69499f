//! Logging setup
//!
//! Console output always goes to stderr. When the configuration names a log
//! directory, a daily-rotated file receives the same events without colors.

use crate::config::LogConfig;
use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::Level;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Layer};

const LOG_FILE_PREFIX: &str = "restic-runner";

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub level: Level,
    /// Directory for log files, console only when unset
    pub log_directory: Option<PathBuf>,
    /// Maximum number of log files to keep
    pub max_files: u32,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: Level::INFO,
            log_directory: None,
            max_files: 10,
        }
    }
}

impl LoggingConfig {
    /// Create from the command line level and the file settings of a config
    pub fn from_config(log_level: &str, log: &LogConfig) -> Self {
        Self {
            level: parse_level(log_level),
            log_directory: log.directory.clone(),
            max_files: log.max_files,
        }
    }
}

/// Map a level name to a tracing level, unknown names fall back to INFO
pub fn parse_level(name: &str) -> Level {
    match name.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" | "warning" => Level::WARN,
        "error" | "critical" => Level::ERROR,
        _ => Level::INFO,
    }
}

/// Initialize logging with console and optional file output
///
/// The returned guard must be kept alive for the duration of the program;
/// dropping it flushes pending file output.
pub fn init_logging(config: &LoggingConfig) -> Result<LogGuard> {
    let console_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_level(true)
        .with_filter(level_filter(config.level));

    let Some(ref directory) = config.log_directory else {
        tracing_subscriber::registry().with(console_layer).try_init()?;
        return Ok(LogGuard { _file_guard: None });
    };

    let log_dir = expand_tilde(directory);
    fs::create_dir_all(&log_dir)
        .with_context(|| format!("Failed to create log directory: {:?}", log_dir))?;

    let file_appender =
        RollingFileAppender::new(Rotation::DAILY, &log_dir, format!("{}.log", LOG_FILE_PREFIX));
    let (non_blocking, file_guard) = tracing_appender::non_blocking(file_appender);

    let file_layer = fmt::layer()
        .with_writer(non_blocking)
        .with_ansi(false)
        .with_target(true)
        .with_level(true)
        .with_filter(level_filter(config.level));

    tracing_subscriber::registry()
        .with(console_layer)
        .with(file_layer)
        .try_init()?;

    cleanup_old_logs(&log_dir, config.max_files)?;

    Ok(LogGuard {
        _file_guard: Some(file_guard),
    })
}

/// Run `f` with a temporary console subscriber, used before the
/// configuration that decides the final setup is loaded
pub fn with_console_logging<T>(level: Level, f: impl FnOnce() -> T) -> T {
    let subscriber = tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_env_filter(level_filter(level))
        .finish();
    tracing::subscriber::with_default(subscriber, f)
}

/// `RUST_LOG` wins over the configured level
fn level_filter(level: Level) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level.as_str().to_lowercase()))
}

fn expand_tilde(path: &Path) -> PathBuf {
    if let Ok(stripped) = path.strip_prefix("~") {
        if let Some(home) = dirs::home_dir() {
            return home.join(stripped);
        }
    }
    path.to_path_buf()
}

/// Keep only the `max_files` most recent log files
fn cleanup_old_logs(log_dir: &Path, max_files: u32) -> Result<()> {
    let mut log_files: Vec<_> = fs::read_dir(log_dir)?
        .filter_map(|entry| entry.ok())
        .filter(|entry| {
            entry
                .file_name()
                .to_string_lossy()
                .starts_with(LOG_FILE_PREFIX)
        })
        .collect();

    // Newest first
    log_files.sort_by(|a, b| {
        let a_time = a.metadata().and_then(|m| m.modified()).ok();
        let b_time = b.metadata().and_then(|m| m.modified()).ok();
        b_time.cmp(&a_time)
    });

    for file in log_files.into_iter().skip(max_files as usize) {
        if let Err(e) = fs::remove_file(file.path()) {
            tracing::warn!("Failed to remove old log file {:?}: {}", file.path(), e);
        } else {
            tracing::debug!("Removed old log file: {:?}", file.path());
        }
    }

    Ok(())
}

/// Guard that keeps the file writer alive
pub struct LogGuard {
    _file_guard: Option<WorkerGuard>,
}
