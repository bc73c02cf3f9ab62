//! Tracing subscriber setup for the `switchboard` binary.
//!
//! The library only emits `tracing` events; installing a subscriber is the
//! binary's job.
//!
//! - [`init_production`] for `start`: daily-rotated JSON file plus stderr.
//! - [`init_cli`] for one-shot subcommands: stderr only.

use std::path::Path;

use anyhow::Context;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Log file prefix; the appender adds a `.YYYY-MM-DD` suffix.
pub const LOG_FILE_PREFIX: &str = "switchboard.log";

/// Keeps the non-blocking file writer alive.
///
/// Dropping it flushes pending entries, so hold it until shutdown.
pub struct LoggingGuard {
    _guard: WorkerGuard,
}

/// Filter from `RUST_LOG`, or `default_directive` when unset or invalid.
pub fn env_filter(default_directive: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive))
}

/// Install production logging.
///
/// JSON lines go to `{logs_dir}/switchboard.log.YYYY-MM-DD`, including the
/// current span so per-event `inbound` spans (channel, event id) are kept.
/// Human-readable lines go to stderr.
///
/// # Errors
///
/// Returns an error if the logs directory cannot be created.
pub fn init_production(logs_dir: &Path) -> anyhow::Result<LoggingGuard> {
    std::fs::create_dir_all(logs_dir)
        .with_context(|| format!("failed to create logs directory {}", logs_dir.display()))?;

    let file_appender = tracing_appender::rolling::daily(logs_dir, LOG_FILE_PREFIX);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let json_layer = tracing_subscriber::fmt::layer()
        .json()
        .with_current_span(true)
        .with_span_list(false)
        .with_writer(non_blocking);

    let console_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr);

    tracing_subscriber::registry()
        .with(env_filter("info"))
        .with(json_layer)
        .with(console_layer)
        .init();

    Ok(LoggingGuard { _guard: guard })
}

/// Install stderr-only logging for one-shot subcommands.
///
/// Defaults to `warn` so command output on stdout stays readable.
pub fn init_cli() {
    tracing_subscriber::fmt()
        .with_env_filter(env_filter("warn"))
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}
