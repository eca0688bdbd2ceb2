// src/cli.rs

//! Command-line interface (`clap` derive).

use clap::{Parser, ValueEnum};

/// Watch paths and run a command for every matching change.
#[derive(Debug, Clone, Parser)]
#[command(name = "watchcmd", version)]
pub struct CliArgs {
    /// Config file to load.
    #[arg(short, long, value_name = "PATH", default_value = "Watchcmd.toml")]
    pub config: String,

    /// Start only this `[task.<name>]` instead of all of them.
    #[arg(short, long, value_name = "NAME")]
    pub task: Option<String>,

    /// Log level; overrides `WATCHCMD_LOG` and `[driver].log_level`.
    #[arg(long, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,

    /// Echo every accepted event to stdout as one JSON object per line.
    #[arg(long)]
    pub print_events: bool,

    /// Validate the config and print the resolved tasks, then exit.
    #[arg(long)]
    pub dry_run: bool,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub fn as_level(self) -> tracing::Level {
        match self {
            LogLevel::Error => tracing::Level::ERROR,
            LogLevel::Warn => tracing::Level::WARN,
            LogLevel::Info => tracing::Level::INFO,
            LogLevel::Debug => tracing::Level::DEBUG,
            LogLevel::Trace => tracing::Level::TRACE,
        }
    }
}

/// Parse `std::env::args()`.
pub fn parse() -> CliArgs {
    CliArgs::parse()
}
