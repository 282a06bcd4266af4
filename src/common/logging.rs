//! Logging and tracing configuration
//!
//! Cell progress (start, pass, fail, abort) is reported through `tracing`.
//! Logs are controlled by the `RUST_LOG` environment variable; the default
//! is INFO for this crate and WARN for dependencies.

use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use super::paths;

const DEFAULT_FILTER: &str = "trial=info,warn";

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
}

/// Initialize tracing to stderr only
pub fn init_console() {
    let _ = tracing_subscriber::registry()
        .with(env_filter())
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(true)
                .with_thread_ids(false)
                .with_file(false)
                .with_line_number(false)
                .compact(),
        )
        .try_init();
}

/// Initialize tracing to stderr and to `trial.log` inside `dir`
///
/// The returned guard flushes the file writer when dropped, so callers must
/// hold on to it for the lifetime of the run.
pub fn init_with_file(dir: &Path) -> std::io::Result<WorkerGuard> {
    std::fs::create_dir_all(dir)?;
    let appender = tracing_appender::rolling::never(dir, "trial.log");
    let (writer, guard) = tracing_appender::non_blocking(appender);

    let file_layer = fmt::layer()
        .with_writer(writer)
        .with_ansi(false)
        .with_target(true)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true);

    let stderr_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(true)
        .compact();

    let _ = tracing_subscriber::registry()
        .with(env_filter())
        .with(file_layer)
        .with(stderr_layer)
        .try_init();

    Ok(guard)
}

/// Initialize file logging in the default log directory, falling back to
/// stderr only when no directory is available
pub fn init_default() -> Option<WorkerGuard> {
    if let Some(dir) = paths::log_dir() {
        match init_with_file(&dir) {
            Ok(guard) => return Some(guard),
            Err(e) => eprintln!("Warning: Could not open log directory: {}", e),
        }
    }
    init_console();
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_with_file_creates_log_dir() {
        let dir = tempfile::tempdir().unwrap();
        let logs = dir.path().join("nested").join("logs");
        let guard = init_with_file(&logs).unwrap();
        tracing::info!("logging initialised");
        drop(guard);
        assert!(logs.is_dir());
    }
}
