// src/config/loader.rs

use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::config::model::{ConfigFile, RawConfigFile};
use crate::errors::Result;

/// Read and deserialize a TOML config file. No semantic checks.
pub fn load_from_path(path: impl AsRef<Path>) -> Result<RawConfigFile> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path)?;
    Ok(toml::from_str(&contents)?)
}

/// Read, merge `[default]` into every task, validate, then make relative
/// paths absolute against the config file's directory.
pub fn load_and_validate(path: impl AsRef<Path>) -> Result<ConfigFile> {
    let path = path.as_ref();
    let mut config = ConfigFile::try_from(load_from_path(path)?)?;
    config.resolve_paths(&config_root_dir(path));
    debug!(?path, tasks = config.task.len(), "config loaded");
    Ok(config)
}

/// Directory a config file's relative paths are resolved against: its
/// parent, or the working directory for a bare file name.
pub fn config_root_dir(config_path: &Path) -> PathBuf {
    match config_path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
    }
}
