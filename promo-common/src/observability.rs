//! Shared observability helpers for the binary and integration tests.
//!
//! The logging initializer centralises our `tracing` setup: events always go
//! to `stderr`, and additionally to a daily rolling file when a log directory
//! is configured. Call [`init_logging`] once near process start; additional
//! callers are treated as no-ops and receive the originally resolved file path.

use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use anyhow::Context;
use chrono::Local;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::{LogFormat, LogLevel};

static LOG_GUARD: OnceLock<WorkerGuard> = OnceLock::new();
static LOG_PATH: OnceLock<Option<PathBuf>> = OnceLock::new();

const LOG_DIR_ENV: &str = "PROMO_LOG_DIR";

/// Configuration passed to [`init_logging`].
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Logical name of the component (used for file names).
    pub app_name: &'static str,
    /// Optional directory for the rolling file sink. If `None`, we consult
    /// `PROMO_LOG_DIR`; without either, only `stderr` is used.
    pub log_dir: Option<PathBuf>,
    /// Verbosity applied when `RUST_LOG` is unset.
    pub level: LogLevel,
    /// Preferred log encoding.
    pub format: LogFormat,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            app_name: "promo-watch",
            log_dir: None,
            level: LogLevel::Info,
            format: LogFormat::Text,
        }
    }
}

/// Initialise the global `tracing` subscriber.
///
/// Returns the concrete log file path for the current day when a file sink is
/// active.
pub fn init_logging(config: LogConfig) -> anyhow::Result<Option<PathBuf>> {
    if let Some(path) = LOG_PATH.get() {
        return Ok(path.clone());
    }

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.level.as_filter()));

    let mut full_path = None;
    let writer = match resolve_log_dir(config.log_dir.as_deref()) {
        Some(dir) => {
            std::fs::create_dir_all(&dir)
                .with_context(|| format!("failed to create log directory: {}", dir.display()))?;
            let log_filename = format!("{}.log", config.app_name);
            let today = Local::now().format("%Y-%m-%d").to_string();
            full_path = Some(dir.join(format!("{log_filename}.{today}")));

            let appender = rolling::daily(dir, log_filename);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let _ = LOG_GUARD.set(guard);
            Some(writer)
        }
        None => None,
    };

    match config.format {
        LogFormat::Text => {
            let file_layer = writer.map(|w| fmt::layer().with_writer(w).with_ansi(false));
            tracing_subscriber::registry()
                .with(env_filter)
                .with(file_layer)
                .with(fmt::layer().with_writer(std::io::stderr))
                .try_init()
                .map_err(|e| anyhow::anyhow!("tracing setup failed: {e}"))?;
        }
        LogFormat::Json => {
            let file_layer = writer.map(|w| fmt::layer().json().with_writer(w));
            tracing_subscriber::registry()
                .with(env_filter)
                .with(file_layer)
                .with(fmt::layer().json().with_writer(std::io::stderr))
                .try_init()
                .map_err(|e| anyhow::anyhow!("tracing setup failed: {e}"))?;
        }
    }

    let _ = LOG_PATH.set(full_path.clone());
    Ok(full_path)
}

fn resolve_log_dir(explicit: Option<&Path>) -> Option<PathBuf> {
    if let Some(dir) = explicit {
        return Some(expand_home(dir));
    }

    match std::env::var(LOG_DIR_ENV) {
        Ok(env_dir) if !env_dir.trim().is_empty() => Some(expand_home(Path::new(&env_dir))),
        _ => None,
    }
}

fn expand_home(path: &Path) -> PathBuf {
    if let Some(rest) = path.to_str().and_then(|s| s.strip_prefix("~/")) {
        if let Ok(home) = std::env::var("HOME") {
            return PathBuf::from(home).join(rest);
        }
    }
    path.to_path_buf()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_dir_wins() {
        let dir = resolve_log_dir(Some(Path::new("/var/log/promo")));
        assert_eq!(dir, Some(PathBuf::from("/var/log/promo")));
    }

    #[test]
    fn tilde_is_expanded_against_home() {
        if let Ok(home) = std::env::var("HOME") {
            let expanded = expand_home(Path::new("~/logs"));
            assert_eq!(expanded, PathBuf::from(home).join("logs"));
        }
    }

    #[test]
    fn relative_paths_are_left_alone() {
        assert_eq!(expand_home(Path::new("logs")), PathBuf::from("logs"));
    }
}
