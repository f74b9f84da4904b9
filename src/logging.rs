//! Logging configuration
//!
//! In the foreground finder logs to stdout. Once daemonized stdout is
//! `/dev/null`, so logs go to `~/.cache/finder/finder.log` (or platform
//! equivalent) with 10 MB size-based rotation.

use std::path::PathBuf;

use rolling_file::{BasicRollingFileAppender, RollingConditionBasic};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{
    EnvFilter,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

const FILTER_DIRECTIVE: &str = "info";
const MAX_LOG_SIZE: u64 = 10 * 1024 * 1024;

/// Where the daemon writes its log, if the platform has a cache dir
pub fn log_path() -> Option<PathBuf> {
    dirs::cache_dir().map(|cache| cache.join("finder").join("finder.log"))
}

/// Stdout-only logging for a foreground run.
pub fn init_foreground() {
    let stdout_layer = fmt::layer()
        .with_writer(std::io::stdout)
        .with_target(true)
        .with_span_events(FmtSpan::NONE);

    tracing_subscriber::registry()
        .with(stdout_layer)
        .with(EnvFilter::new(FILTER_DIRECTIVE))
        .init();

    tracing::debug!("logging initialized (stdout)");
}

/// File logging for a daemonized run.
///
/// Returns a `WorkerGuard` that MUST be held until exit so buffered lines
/// are flushed. If the log file can't be opened, nothing is logged: the
/// standard streams already point at `/dev/null`.
pub fn init_daemon() -> Option<WorkerGuard> {
    let log_path = log_path()?;

    if let Some(dir) = log_path.parent() {
        std::fs::create_dir_all(dir).ok()?;
    }

    // Keep only the latest rotated file (finder.log and finder.log.1)
    let file_appender = BasicRollingFileAppender::new(
        &log_path,
        RollingConditionBasic::new().max_size(MAX_LOG_SIZE),
        1,
    )
    .ok()?;

    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let file_layer = fmt::layer()
        .with_writer(non_blocking)
        .with_ansi(false)
        .with_target(true)
        .with_span_events(FmtSpan::NONE);

    tracing_subscriber::registry()
        .with(file_layer)
        .with(EnvFilter::new(FILTER_DIRECTIVE))
        .init();

    tracing::info!(log_file = ?log_path, "logging initialized");

    Some(guard)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_path_lives_under_finder_dir() {
        if let Some(path) = log_path() {
            assert!(path.ends_with("finder/finder.log"));
        }
    }
}
