// src/config/model.rs

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::types::StreamClosedPolicy;

/// Default per-attempt command timeout, in seconds.
pub const DEFAULT_TIMEOUT_SECS: i64 = 60;
/// Default number of retries after a failed command.
pub const DEFAULT_MAX_RETRIES: i64 = 3;
/// Default pause between retries, in seconds.
pub const DEFAULT_RETRY_INTERVAL_SECS: i64 = 30;

/// Top-level configuration as read from a TOML file, before validation.
///
/// ```toml
/// [driver]
/// state_dir = ".watchcmd"
/// event_buffer_size = 1000
///
/// [default]
/// ignore_patterns = ["*.swp"]
///
/// [task.assets]
/// paths = ["assets"]
/// events = ["create", "modify"]
/// exec_command = "make"
/// exec_args = ["assets"]
/// ```
///
/// All sections except `[task.<name>]` are optional.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawConfigFile {
    #[serde(default)]
    pub driver: DriverSection,

    /// Settings merged underneath every task.
    #[serde(default)]
    pub default: TaskConfig,

    /// All tasks from `[task.<name>]`, keyed by task name.
    #[serde(default)]
    pub task: BTreeMap<String, TaskConfig>,
}

/// Validated configuration.
///
/// Tasks in here already have `[default]` merged in and passed
/// [`TaskConfig::validate`]. Only constructed through
/// `TryFrom<RawConfigFile>`.
#[derive(Debug, Clone)]
pub struct ConfigFile {
    pub driver: DriverSection,
    pub task: BTreeMap<String, TaskConfig>,
}

impl ConfigFile {
    pub(crate) fn new_unchecked(driver: DriverSection, task: BTreeMap<String, TaskConfig>) -> Self {
        Self { driver, task }
    }

    pub fn tasks(&self) -> &BTreeMap<String, TaskConfig> {
        &self.task
    }

    /// Make every relative watch path absolute against `base`.
    pub fn resolve_paths(&mut self, base: &std::path::Path) {
        for task in self.task.values_mut() {
            for path in task.paths.iter_mut() {
                if path.is_relative() {
                    *path = base.join(&*path);
                }
            }
        }
        if self.driver.state_dir.is_relative() {
            self.driver.state_dir = base.join(&self.driver.state_dir);
        }
    }
}

/// `[driver]` section: settings shared by all watchers of one process.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DriverSection {
    /// When false the process exits right after loading the config.
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Directory holding `state.json`.
    #[serde(default = "default_state_dir")]
    pub state_dir: PathBuf,

    /// Log level used when neither `--log-level` nor `WATCHCMD_LOG` is set.
    #[serde(default)]
    pub log_level: Option<String>,

    /// Maximum number of subscriptions per task (`0` = unlimited).
    #[serde(default = "default_max_watch_paths")]
    pub max_watch_paths: usize,

    /// Capacity of the per-task event forwarding buffer.
    #[serde(default = "default_event_buffer_size")]
    pub event_buffer_size: usize,

    /// What a watcher does when its event stream closes on its own.
    #[serde(default)]
    pub on_stream_closed: StreamClosedPolicy,
}

fn default_enabled() -> bool {
    true
}

fn default_state_dir() -> PathBuf {
    PathBuf::from(".watchcmd")
}

fn default_max_watch_paths() -> usize {
    100
}

fn default_event_buffer_size() -> usize {
    1000
}

impl Default for DriverSection {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            state_dir: default_state_dir(),
            log_level: None,
            max_watch_paths: default_max_watch_paths(),
            event_buffer_size: default_event_buffer_size(),
            on_stream_closed: StreamClosedPolicy::default(),
        }
    }
}

/// `[task.<name>]` section (also the shape of `[default]`).
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct TaskConfig {
    /// Paths to watch.
    #[serde(default)]
    pub paths: Vec<PathBuf>,

    /// Event kinds to react to (`create`, `modify`, `remove`, `rename`, `chmod`).
    #[serde(default)]
    pub events: Vec<String>,

    /// Command to execute on events.
    #[serde(default)]
    pub exec_command: String,

    #[serde(default)]
    pub exec_args: Vec<String>,

    /// Extra environment for the command.
    #[serde(default)]
    pub environment: BTreeMap<String, String>,

    /// Watch subdirectories too.
    #[serde(default)]
    pub recursive_watch: bool,

    /// Basename globs to ignore.
    #[serde(default)]
    pub ignore_patterns: Vec<String>,

    /// Seconds between retries of a failed command.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_interval: Option<i64>,

    /// Retries after a failed command.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_retries: Option<i64>,

    /// Per-attempt command timeout in seconds; `0` disables it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<i64>,
}

impl TaskConfig {
    /// Merge `other` over `self`, with `other` taking precedence.
    ///
    /// - non-empty lists and strings replace,
    /// - environment maps merge key by key,
    /// - `recursive_watch = true` wins,
    /// - numeric settings replace when set and non-zero; a `0` only sticks
    ///   when `self` leaves the setting unset.
    pub fn merge(&self, other: &TaskConfig) -> TaskConfig {
        let mut result = self.clone();

        if !other.paths.is_empty() {
            result.paths = other.paths.clone();
        }
        if !other.events.is_empty() {
            result.events = other.events.clone();
        }
        if !other.exec_command.is_empty() {
            result.exec_command = other.exec_command.clone();
        }
        if !other.exec_args.is_empty() {
            result.exec_args = other.exec_args.clone();
        }
        for (k, v) in other.environment.iter() {
            result.environment.insert(k.clone(), v.clone());
        }
        if other.recursive_watch {
            result.recursive_watch = true;
        }
        if !other.ignore_patterns.is_empty() {
            result.ignore_patterns = other.ignore_patterns.clone();
        }
        result.retry_interval = merge_number(self.retry_interval, other.retry_interval);
        result.max_retries = merge_number(self.max_retries, other.max_retries);
        result.timeout = merge_number(self.timeout, other.timeout);

        result
    }

    /// Effective timeout; `None` when disabled with `timeout = 0`.
    pub fn effective_timeout(&self) -> Option<Duration> {
        match self.timeout.unwrap_or(DEFAULT_TIMEOUT_SECS) {
            n if n <= 0 => None,
            n => Some(Duration::from_secs(n as u64)),
        }
    }

    pub fn effective_max_retries(&self) -> u32 {
        let n = self.max_retries.unwrap_or(DEFAULT_MAX_RETRIES).max(0);
        u32::try_from(n).unwrap_or(u32::MAX)
    }

    pub fn effective_retry_interval(&self) -> Duration {
        let n = self.retry_interval.unwrap_or(DEFAULT_RETRY_INTERVAL_SECS).max(0);
        Duration::from_secs(n as u64)
    }
}

// Negative values still replace so that validation reports them.
fn merge_number(base: Option<i64>, other: Option<i64>) -> Option<i64> {
    match (base, other) {
        (Some(b), Some(0)) => Some(b),
        (_, Some(n)) => Some(n),
        (b, None) => b,
    }
}
