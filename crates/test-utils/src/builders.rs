#![allow(dead_code)]

use std::collections::BTreeMap;
use std::path::PathBuf;

use watchcmd::config::{ConfigFile, DriverSection, RawConfigFile, TaskConfig};

/// Builder for `ConfigFile` to simplify test setup.
pub struct ConfigFileBuilder {
    config: RawConfigFile,
}

impl ConfigFileBuilder {
    pub fn new() -> Self {
        Self {
            config: RawConfigFile {
                driver: DriverSection::default(),
                default: TaskConfig::default(),
                task: BTreeMap::new(),
            },
        }
    }

    pub fn with_task(mut self, name: &str, task: TaskConfig) -> Self {
        self.config.task.insert(name.to_string(), task);
        self
    }

    pub fn with_default(mut self, default: TaskConfig) -> Self {
        self.config.default = default;
        self
    }

    pub fn with_driver(mut self, driver: DriverSection) -> Self {
        self.config.driver = driver;
        self
    }

    /// The unvalidated config, for tests that expect validation to fail.
    pub fn raw(self) -> RawConfigFile {
        self.config
    }

    pub fn build(self) -> ConfigFile {
        ConfigFile::try_from(self.config).expect("Failed to build valid config from builder")
    }
}

impl Default for ConfigFileBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for `TaskConfig`.
///
/// Starts from a task that passes validation: one path, `create` + `modify`,
/// and the given command.
pub struct TaskConfigBuilder {
    task: TaskConfig,
}

impl TaskConfigBuilder {
    pub fn new(cmd: &str) -> Self {
        Self {
            task: TaskConfig {
                paths: vec![PathBuf::from("/tmp")],
                events: vec!["create".to_string(), "modify".to_string()],
                exec_command: cmd.to_string(),
                ..TaskConfig::default()
            },
        }
    }

    /// Replace the watched paths.
    pub fn paths<I, P>(mut self, paths: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        self.task.paths = paths.into_iter().map(Into::into).collect();
        self
    }

    /// Replace the accepted events.
    pub fn events(mut self, events: &[&str]) -> Self {
        self.task.events = events.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn arg(mut self, arg: &str) -> Self {
        self.task.exec_args.push(arg.to_string());
        self
    }

    pub fn env(mut self, key: &str, value: &str) -> Self {
        self.task.environment.insert(key.to_string(), value.to_string());
        self
    }

    pub fn recursive(mut self, recursive: bool) -> Self {
        self.task.recursive_watch = recursive;
        self
    }

    pub fn ignore(mut self, pattern: &str) -> Self {
        self.task.ignore_patterns.push(pattern.to_string());
        self
    }

    pub fn timeout(mut self, secs: i64) -> Self {
        self.task.timeout = Some(secs);
        self
    }

    pub fn max_retries(mut self, n: i64) -> Self {
        self.task.max_retries = Some(n);
        self
    }

    pub fn retry_interval(mut self, secs: i64) -> Self {
        self.task.retry_interval = Some(secs);
        self
    }

    pub fn build(self) -> TaskConfig {
        self.task
    }
}
