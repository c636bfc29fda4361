//! Logging setup built on `tracing-subscriber`.
//!
//! `RUST_LOG` always wins when set. Otherwise the level follows the CLI
//! flags: `-q` shows errors only, no flag shows warnings, `-v` info and
//! `-vv` (or more) debug for this crate.

use std::fs::OpenOptions;
use std::path::Path;
use std::sync::Mutex;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt;

/// Default filter directive for a verbosity level.
#[must_use]
pub fn default_directive(verbose: u8, quiet: bool) -> &'static str {
    if quiet {
        return "error";
    }
    match verbose {
        0 => "warn",
        1 => "info,bh_relations=info",
        _ => "info,bh_relations=debug",
    }
}

/// Install the global subscriber.
///
/// Logs go to stderr, or to `log_file` (appending) when given.
///
/// # Errors
///
/// Returns an error if the log file cannot be opened or a global subscriber
/// is already installed.
pub fn init_logging(verbose: u8, quiet: bool, log_file: Option<&Path>) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive(verbose, quiet)));

    let builder = fmt()
        .with_env_filter(filter)
        .with_target(verbose > 1)
        .with_ansi(log_file.is_none() && std::env::var_os("NO_COLOR").is_none());

    if let Some(path) = log_file {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        builder
            .with_writer(Mutex::new(file))
            .try_init()
            .map_err(|e| anyhow::anyhow!(e))?;
    } else {
        builder
            .with_writer(std::io::stderr)
            .try_init()
            .map_err(|e| anyhow::anyhow!(e))?;
    }

    Ok(())
}

/// Subscriber for tests: captured by the test harness, debug for this crate.
///
/// Safe to call many times; only the first call installs anything.
pub fn init_test_logging() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("warn,bh_relations=debug"));
    let _ = fmt()
        .with_env_filter(filter)
        .with_test_writer()
        .try_init();
}
