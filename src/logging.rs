//! Tracing subscriber setup.
//!
//! The TUI owns the terminal, so in interactive mode logs go to a file.
//! Headless mode logs to stderr.

use std::fs::OpenOptions;
use std::path::Path;
use std::sync::Mutex;

use anyhow::{Context, Result};
use tracing_subscriber::EnvFilter;

/// Filter used when `RUST_LOG` is unset.
pub const DEFAULT_FILTER: &str = "agrowatch=info";

/// Default log file for interactive mode.
pub const DEFAULT_LOG_FILE: &str = "agrowatch.log";

/// Where log lines are written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogTarget<'a> {
    Stderr,
    File(&'a Path),
}

/// Install the global subscriber.
///
/// Calling this again after a subscriber is installed is a no-op.
pub fn init(target: LogTarget<'_>) -> Result<()> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);

    let result = match target {
        LogTarget::Stderr => builder.with_writer(std::io::stderr).try_init(),
        LogTarget::File(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open log file {}", path.display()))?;
            builder
                .with_ansi(false)
                .with_writer(Mutex::new(file))
                .try_init()
        }
    };

    // Already initialised (e.g. by a test harness).
    let _ = result;
    Ok(())
}
