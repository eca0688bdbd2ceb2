// src/config/validate.rs

use std::collections::BTreeMap;

use crate::config::model::{ConfigFile, DriverSection, RawConfigFile, TaskConfig};
use crate::errors::{Result, WatchcmdError};
use crate::logging::parse_level_str;
use crate::types::EventKind;
use crate::watch::spec::build_ignore_set;

impl TryFrom<RawConfigFile> for ConfigFile {
    type Error = crate::errors::WatchcmdError;

    fn try_from(raw: RawConfigFile) -> std::result::Result<Self, Self::Error> {
        ensure_has_tasks(&raw)?;
        validate_driver_section(&raw.driver)?;

        let mut tasks = BTreeMap::new();
        for (name, task) in raw.task.iter() {
            let merged = raw.default.merge(task);
            merged.validate().map_err(|err| match err {
                WatchcmdError::ConfigError(msg) => {
                    WatchcmdError::ConfigError(format!("task '{name}': {msg}"))
                }
                other => other,
            })?;
            tasks.insert(name.clone(), merged);
        }

        Ok(ConfigFile::new_unchecked(raw.driver, tasks))
    }
}

fn ensure_has_tasks(cfg: &RawConfigFile) -> Result<()> {
    if cfg.task.is_empty() {
        return Err(WatchcmdError::ConfigError(
            "config must contain at least one [task.<name>] section".to_string(),
        ));
    }
    Ok(())
}

fn validate_driver_section(driver: &DriverSection) -> Result<()> {
    if driver.event_buffer_size == 0 {
        return Err(WatchcmdError::ConfigError(
            "[driver].event_buffer_size must be >= 1 (got 0)".to_string(),
        ));
    }

    if let Some(level) = driver.log_level.as_deref() {
        if parse_level_str(level).is_none() {
            return Err(WatchcmdError::ConfigError(format!(
                "[driver].log_level: unknown level '{level}'"
            )));
        }
    }

    Ok(())
}

impl TaskConfig {
    /// Check a (merged) task configuration.
    ///
    /// Everything that could otherwise fail while the watcher is running,
    /// such as malformed ignore globs, is rejected here.
    pub fn validate(&self) -> Result<()> {
        if self.paths.is_empty() {
            return Err(config_err("at least one path must be specified"));
        }

        if self.events.is_empty() {
            return Err(config_err("at least one event type must be specified"));
        }

        if self.exec_command.trim().is_empty() {
            return Err(config_err("exec_command must be specified"));
        }

        for event in self.events.iter() {
            event.parse::<EventKind>().map_err(WatchcmdError::ConfigError)?;
        }

        for (field, value) in [
            ("timeout", self.timeout),
            ("retry_interval", self.retry_interval),
            ("max_retries", self.max_retries),
        ] {
            if let Some(n) = value {
                if n < 0 {
                    return Err(WatchcmdError::ConfigError(format!(
                        "{field} must be non-negative (got {n})"
                    )));
                }
            }
        }

        build_ignore_set(&self.ignore_patterns)?;

        Ok(())
    }
}

fn config_err(msg: &str) -> WatchcmdError {
    WatchcmdError::ConfigError(msg.to_string())
}
