// src/types.rs

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Kind of filesystem change, abstracted away from the notification
/// backend's own representation.
///
/// `Unknown` covers changes the backend reports that map to none of the five
/// configurable kinds (e.g. plain access events). It can never be listed in a
/// task's `events`, so such changes are always filtered out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    Create,
    Modify,
    Remove,
    Rename,
    Chmod,
    Unknown,
}

impl EventKind {
    /// The kinds that may appear in configuration.
    pub const CONFIGURABLE: [EventKind; 5] = [
        EventKind::Create,
        EventKind::Modify,
        EventKind::Remove,
        EventKind::Rename,
        EventKind::Chmod,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Create => "create",
            EventKind::Modify => "modify",
            EventKind::Remove => "remove",
            EventKind::Rename => "rename",
            EventKind::Chmod => "chmod",
            EventKind::Unknown => "unknown",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "create" => Ok(EventKind::Create),
            "modify" => Ok(EventKind::Modify),
            "remove" => Ok(EventKind::Remove),
            "rename" => Ok(EventKind::Rename),
            "chmod" => Ok(EventKind::Chmod),
            other => Err(format!(
                "invalid event type: {other} (expected one of create, modify, remove, rename, chmod)"
            )),
        }
    }
}

/// What the watch loop does when the notification source's event stream
/// ends without a prior stop request.
///
/// - `Stop`: treat it as a normal shutdown (default).
/// - `Fault`: log an error and leave the watcher in the `Faulted` state so
///   the owner can report it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamClosedPolicy {
    #[default]
    Stop,
    Fault,
}

impl FromStr for StreamClosedPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "stop" => Ok(StreamClosedPolicy::Stop),
            "fault" => Ok(StreamClosedPolicy::Fault),
            other => Err(format!(
                "invalid on_stream_closed: {other} (expected \"stop\" or \"fault\")"
            )),
        }
    }
}
