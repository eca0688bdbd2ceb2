// src/logging.rs

//! Tracing subscriber setup.
//!
//! The filter is chosen from the first of these that is set:
//! 1. `--log-level`
//! 2. `WATCHCMD_LOG`, either a bare level (`debug`) or a full filter
//!    directive (`watchcmd=debug,notify=warn`)
//! 3. `[driver].log_level`
//! 4. `info`
//!
//! Output goes to stderr; stdout belongs to `--print-events`.

use anyhow::{anyhow, Context, Result};
use tracing::Level;
use tracing_subscriber::EnvFilter;

use crate::cli::LogLevel;

/// Name of the environment variable consulted for the log filter.
pub const LOG_ENV_VAR: &str = "WATCHCMD_LOG";

/// Install the global subscriber. Call once, early in `main`.
pub fn init_logging(cli_level: Option<LogLevel>, config_level: Option<&str>) -> Result<()> {
    let filter = resolve_filter(cli_level, std::env::var(LOG_ENV_VAR).ok(), config_level)?;

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|e| anyhow!("installing tracing subscriber: {e}"))
}

fn resolve_filter(
    cli_level: Option<LogLevel>,
    env_value: Option<String>,
    config_level: Option<&str>,
) -> Result<EnvFilter> {
    if let Some(level) = cli_level {
        return Ok(EnvFilter::new(level.as_level().to_string()));
    }

    if let Some(raw) = env_value.filter(|v| !v.trim().is_empty()) {
        return match parse_level_str(&raw) {
            Some(level) => Ok(EnvFilter::new(level.to_string())),
            None => EnvFilter::try_new(raw.trim())
                .with_context(|| format!("{LOG_ENV_VAR}: invalid filter '{raw}'")),
        };
    }

    let level = config_level.and_then(parse_level_str).unwrap_or(Level::INFO);
    Ok(EnvFilter::new(level.to_string()))
}

/// Parse a bare level name, case-insensitively. `warning` is accepted too.
pub fn parse_level_str(s: &str) -> Option<Level> {
    match s.trim().to_ascii_lowercase().as_str() {
        "error" => Some(Level::ERROR),
        "warn" | "warning" => Some(Level::WARN),
        "info" => Some(Level::INFO),
        "debug" => Some(Level::DEBUG),
        "trace" => Some(Level::TRACE),
        _ => None,
    }
}
