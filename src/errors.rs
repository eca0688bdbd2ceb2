// src/errors.rs

//! Crate-wide error type and result alias.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum WatchcmdError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Cannot subscribe to {path:?}: {reason}")]
    Subscription { path: PathBuf, reason: String },

    #[error("{count} paths to watch exceed the limit of {limit}")]
    TooManyPaths { count: usize, limit: usize },

    #[error("Notification source error: {0}")]
    Notify(#[from] notify::Error),

    #[error("event buffer full")]
    BufferFull,

    #[error("Task not found: {0}")]
    TaskNotFound(String),

    #[error("Task already exists: {0}")]
    TaskExists(String),

    #[error("Invalid watcher state: {0}")]
    InvalidState(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl WatchcmdError {
    pub fn subscription(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        WatchcmdError::Subscription {
            path: path.into(),
            reason: reason.to_string(),
        }
    }
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, WatchcmdError>;
