// src/watch/spec.rs

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use globset::{Glob, GlobSet, GlobSetBuilder};

use crate::config::model::TaskConfig;
use crate::errors::{Result, WatchcmdError};
use crate::types::EventKind;

/// How the command dispatcher runs a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ExecPolicy {
    /// Per-attempt limit; the child is killed when it expires.
    pub timeout: Option<Duration>,
    /// Additional attempts after a failed one.
    pub max_retries: u32,
    /// Pause between attempts.
    pub retry_interval: Duration,
}

/// Immutable description of one watcher: what to watch and how to react.
///
/// Ignore globs are compiled once here, so matching never fails later.
#[derive(Clone)]
pub struct WatchSpec {
    paths: Vec<PathBuf>,
    accepted: BTreeSet<EventKind>,
    recursive: bool,
    ignore_patterns: Vec<String>,
    ignore_set: GlobSet,
    command: String,
    args: Vec<String>,
    environment: BTreeMap<String, String>,
    policy: ExecPolicy,
}

impl fmt::Debug for WatchSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WatchSpec")
            .field("paths", &self.paths)
            .field("accepted", &self.accepted)
            .field("recursive", &self.recursive)
            .field("ignore_patterns", &self.ignore_patterns)
            .field("command", &self.command)
            .field("args", &self.args)
            .finish_non_exhaustive()
    }
}

impl WatchSpec {
    pub fn builder() -> WatchSpecBuilder {
        WatchSpecBuilder::default()
    }

    pub fn paths(&self) -> &[PathBuf] {
        &self.paths
    }

    pub fn accepted_kinds(&self) -> &BTreeSet<EventKind> {
        &self.accepted
    }

    pub fn accepts(&self, kind: EventKind) -> bool {
        self.accepted.contains(&kind)
    }

    pub fn recursive(&self) -> bool {
        self.recursive
    }

    pub fn ignore_patterns(&self) -> &[String] {
        &self.ignore_patterns
    }

    /// True if `basename` matches any ignore glob.
    pub fn is_ignored(&self, basename: &str) -> bool {
        self.ignore_set.is_match(basename)
    }

    /// Command to run; empty means detection only.
    pub fn command(&self) -> &str {
        &self.command
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }

    pub fn environment(&self) -> &BTreeMap<String, String> {
        &self.environment
    }

    pub fn policy(&self) -> ExecPolicy {
        self.policy
    }
}

/// Build a [`WatchSpec`] from a task section.
///
/// Runs the full [`TaskConfig::validate`] first, so a command is mandatory
/// on this path.
impl TryFrom<&TaskConfig> for WatchSpec {
    type Error = WatchcmdError;

    fn try_from(cfg: &TaskConfig) -> std::result::Result<Self, Self::Error> {
        cfg.validate()?;

        let mut builder = WatchSpec::builder()
            .paths(cfg.paths.iter().cloned())
            .recursive(cfg.recursive_watch)
            .command(&cfg.exec_command)
            .args(cfg.exec_args.iter().cloned())
            .timeout(cfg.effective_timeout())
            .max_retries(cfg.effective_max_retries())
            .retry_interval(cfg.effective_retry_interval());

        for event in cfg.events.iter() {
            let kind = event.parse::<EventKind>().map_err(WatchcmdError::ConfigError)?;
            builder = builder.event(kind);
        }
        for pattern in cfg.ignore_patterns.iter() {
            builder = builder.ignore(pattern);
        }
        for (k, v) in cfg.environment.iter() {
            builder = builder.env(k, v);
        }

        builder.build()
    }
}

/// Builder for [`WatchSpec`].
#[derive(Debug, Clone, Default)]
pub struct WatchSpecBuilder {
    paths: Vec<PathBuf>,
    events: Vec<EventKind>,
    recursive: bool,
    ignore_patterns: Vec<String>,
    command: String,
    args: Vec<String>,
    environment: BTreeMap<String, String>,
    policy: ExecPolicy,
}

impl WatchSpecBuilder {
    pub fn path(mut self, path: impl Into<PathBuf>) -> Self {
        self.paths.push(path.into());
        self
    }

    pub fn paths<I, P>(mut self, paths: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        self.paths.extend(paths.into_iter().map(Into::into));
        self
    }

    pub fn event(mut self, kind: EventKind) -> Self {
        self.events.push(kind);
        self
    }

    pub fn events(mut self, kinds: impl IntoIterator<Item = EventKind>) -> Self {
        self.events.extend(kinds);
        self
    }

    pub fn recursive(mut self, recursive: bool) -> Self {
        self.recursive = recursive;
        self
    }

    pub fn ignore(mut self, pattern: impl Into<String>) -> Self {
        self.ignore_patterns.push(pattern.into());
        self
    }

    pub fn command(mut self, command: impl Into<String>) -> Self {
        self.command = command.into();
        self
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.environment.insert(key.into(), value.into());
        self
    }

    pub fn timeout(mut self, timeout: Option<Duration>) -> Self {
        self.policy.timeout = timeout;
        self
    }

    pub fn max_retries(mut self, retries: u32) -> Self {
        self.policy.max_retries = retries;
        self
    }

    pub fn retry_interval(mut self, interval: Duration) -> Self {
        self.policy.retry_interval = interval;
        self
    }

    /// Validate and freeze the spec.
    pub fn build(self) -> Result<WatchSpec> {
        if self.paths.is_empty() {
            return Err(WatchcmdError::ConfigError(
                "at least one path must be specified".to_string(),
            ));
        }
        if self.events.is_empty() {
            return Err(WatchcmdError::ConfigError(
                "at least one event type must be specified".to_string(),
            ));
        }
        if self.events.contains(&EventKind::Unknown) {
            return Err(WatchcmdError::ConfigError(
                "invalid event type: unknown".to_string(),
            ));
        }

        let ignore_set = build_ignore_set(&self.ignore_patterns)?;

        Ok(WatchSpec {
            paths: self.paths,
            accepted: self.events.into_iter().collect(),
            recursive: self.recursive,
            ignore_patterns: self.ignore_patterns,
            ignore_set,
            command: self.command,
            args: self.args,
            environment: self.environment,
            policy: self.policy,
        })
    }
}

/// Compile basename ignore globs into a single `GlobSet`.
///
/// Shell glob syntax: `*`, `?`, `[...]` classes and `\` escapes. Braces are
/// literal characters, not alternation. Since only basenames are matched,
/// `**` behaves like `*`.
pub fn build_ignore_set(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pat in patterns {
        let glob = Glob::new(&escape_braces(pat))
            .with_context(|| format!("invalid glob pattern: {pat}"))
            .map_err(|e| WatchcmdError::ConfigError(format!("{e:#}")))?;
        builder.add(glob);
    }
    builder
        .build()
        .map_err(|e| WatchcmdError::ConfigError(format!("building ignore globset: {e}")))
}

/// Wrap every `{` and `}` outside a character class in its own class.
fn escape_braces(pattern: &str) -> String {
    let mut out = String::with_capacity(pattern.len());
    let mut in_class = false;
    let mut chars = pattern.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '\\' => {
                out.push(c);
                if let Some(escaped) = chars.next() {
                    out.push(escaped);
                }
            }
            '[' if !in_class => {
                in_class = true;
                out.push(c);
                if let Some(&neg) = chars.peek().filter(|n| matches!(**n, '!' | '^')) {
                    out.push(neg);
                    chars.next();
                }
                // A `]` right after the opening bracket is a member.
                if chars.peek() == Some(&']') {
                    out.push(']');
                    chars.next();
                }
            }
            ']' if in_class => {
                in_class = false;
                out.push(c);
            }
            '{' | '}' if !in_class => {
                out.push('[');
                out.push(c);
                out.push(']');
            }
            _ => out.push(c),
        }
    }
    out
}
