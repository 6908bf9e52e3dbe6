//! Logging infrastructure for KLAXON.
//!
//! Structured logging using the `tracing` ecosystem: JSON lines to
//! `~/.klaxon/logs/klaxon.log` for machine parsing plus a human-readable
//! console layer on stderr. Lifecycle events carry the emitting session's
//! uid, so a multi-session simulation interleaves legibly in one log file.

use std::path::PathBuf;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{
    EnvFilter,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

use crate::error::{KlaxonError, Result};

/// Guard that must be held to ensure log flushing on shutdown.
///
/// When this guard is dropped, it flushes any pending log entries.
/// Keep this guard alive for the lifetime of the application.
pub struct LogGuard {
    _file_guard: Option<WorkerGuard>,
}

/// Initialize the KLAXON logging system.
///
/// Sets up file logging (JSON lines) and console logging to stderr.
///
/// # Arguments
///
/// * `log_dir` - Optional custom log directory. Defaults to `~/.klaxon/logs/`
/// * `verbose` - If true, sets log level to DEBUG. Otherwise uses INFO.
///
/// # Returns
///
/// A [`LogGuard`] that must be held for the application lifetime to ensure
/// logs are properly flushed on shutdown.
pub fn init_logging(log_dir: Option<PathBuf>, verbose: bool) -> Result<LogGuard> {
    let log_dir = match log_dir {
        Some(dir) => dir,
        None => default_log_dir()?,
    };

    std::fs::create_dir_all(&log_dir).map_err(|e| KlaxonError::DirectoryCreation {
        path: log_dir.clone(),
        source: e,
    })?;

    let file_appender = tracing_appender::rolling::daily(&log_dir, "klaxon.log");
    let (non_blocking_file, file_guard) = tracing_appender::non_blocking(file_appender);

    let default_level = if verbose { "debug" } else { "info" };
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("klaxon={default_level}")));

    // JSON layer for file output
    let file_layer = fmt::layer()
        .with_writer(non_blocking_file)
        .with_ansi(false)
        .json()
        .with_span_events(FmtSpan::CLOSE)
        .with_current_span(true);

    // Human-readable layer for console output
    let console_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_ansi(true)
        .with_target(true)
        .with_file(verbose)
        .with_line_number(verbose)
        .compact();

    tracing_subscriber::registry()
        .with(env_filter)
        .with(file_layer)
        .with(console_layer)
        .init();

    tracing::debug!(log_dir = %log_dir.display(), verbose, "logging initialized");

    Ok(LogGuard {
        _file_guard: Some(file_guard),
    })
}

/// Initialize minimal console-only logging for testing.
///
/// Simpler alternative to [`init_logging`] that only logs to the test writer.
pub fn init_test_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new("debug"))
        .with_test_writer()
        .try_init();
}

/// Get the default log directory path.
///
/// Returns `~/.klaxon/logs/`
pub fn default_log_dir() -> Result<PathBuf> {
    let home = std::env::var("HOME").map_err(|_| KlaxonError::Internal {
        message: "HOME environment variable not set".into(),
    })?;

    Ok(PathBuf::from(home).join(".klaxon").join("logs"))
}

/// Convenience macro for logging session lifecycle events.
///
/// # Example
///
/// ```ignore
/// log_session_event!("a91f", "become_active");
/// log_session_event!("a91f", "handoff", successor = "77c2");
/// ```
#[macro_export]
macro_rules! log_session_event {
    ($session_uid:expr, $event:expr) => {
        tracing::info!(
            target: "klaxon::session",
            session_uid = $session_uid,
            event = $event,
            "session event"
        )
    };
    ($session_uid:expr, $event:expr, $($field:tt)*) => {
        tracing::info!(
            target: "klaxon::session",
            session_uid = $session_uid,
            event = $event,
            $($field)*,
            "session event"
        )
    };
}
