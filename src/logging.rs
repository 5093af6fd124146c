//! Logging configuration for sqlbench.
//!
//! Logs go to stderr by default. Long benchmark runs can send them to a file
//! instead, which is truncated on every start.

use std::fs::{self, File};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Initializes logging to stderr.
pub fn init_stderr_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(env_filter())
        .with_writer(std::io::stderr)
        .init();
}

/// Initializes logging to `path`, without ANSI colors.
///
/// Falls back to stderr if the file cannot be created.
pub fn init_file_logging(path: &Path) {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        if let Err(e) = fs::create_dir_all(parent) {
            eprintln!("Warning: Could not create log directory: {e}");
            init_stderr_logging();
            return;
        }
    }

    let log_file = match File::create(path) {
        Ok(f) => f,
        Err(e) => {
            eprintln!("Warning: Could not create log file {}: {e}", path.display());
            init_stderr_logging();
            return;
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(env_filter())
        .with_writer(log_file)
        .with_ansi(false)
        .init();
}

/// Initializes logging from the `--log-file` argument.
///
/// `None` logs to stderr, `Some(None)` to [`default_log_path`].
pub fn init_logging(log_file: Option<Option<&Path>>) {
    match log_file {
        None => init_stderr_logging(),
        Some(Some(path)) => init_file_logging(path),
        Some(None) => init_file_logging(&default_log_path()),
    }
}

/// Returns the default log file path.
///
/// Uses the XDG state directory on Linux (`~/.local/state/sqlbench/sqlbench.log`),
/// or falls back to the config directory on other platforms.
pub fn default_log_path() -> PathBuf {
    if let Some(state_dir) = dirs::state_dir() {
        return state_dir.join("sqlbench").join("sqlbench.log");
    }

    if let Some(config_dir) = dirs::config_dir() {
        return config_dir.join("sqlbench").join("sqlbench.log");
    }

    std::env::temp_dir().join("sqlbench.log")
}
