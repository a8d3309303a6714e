//! Logging initialisation via tracing-subscriber.
//!
//! Call [`init`] once at startup, after the config is loaded. Logs go to
//! stderr; stdout is reserved for command output.

use anyhow::{anyhow, bail, Result};
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

/// Initialise the global tracing subscriber.
///
/// `RUST_LOG` takes precedence; `level` (from `[logging].level`) is the
/// fallback.
pub fn init(level: &str) -> Result<()> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => default_filter(level)?,
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|e| anyhow!("failed to set subscriber: {e}"))?;

    Ok(())
}

/// Filter for a `[logging].level` value.
///
/// A single word must be a level (`info`, `debug`, ...). Anything with `=`
/// or `,` is read as an `EnvFilter` directive list such as
/// `theark=debug,sqlx=warn`.
pub fn default_filter(level: &str) -> Result<EnvFilter> {
    let level = level.trim();
    if level.is_empty() {
        bail!("log level is empty");
    }
    if !level.contains(['=', ',']) && level.parse::<LevelFilter>().is_err() {
        bail!("'{level}' is not a log level (error, warn, info, debug, trace, off)");
    }
    EnvFilter::try_new(level).map_err(|e| anyhow!("bad log filter '{level}': {e}"))
}
