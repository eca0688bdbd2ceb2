// src/watch/event.rs

//! Backend-independent filesystem events.

use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use notify::event::ModifyKind;
use serde::{Deserialize, Serialize};

use crate::types::EventKind;

/// A single observed filesystem change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileEvent {
    #[serde(rename = "type")]
    pub kind: EventKind,
    pub path: PathBuf,
    pub timestamp: DateTime<Utc>,
}

impl FileEvent {
    /// New event observed now.
    pub fn new(kind: EventKind, path: impl Into<PathBuf>) -> Self {
        Self {
            kind,
            path: path.into(),
            timestamp: Utc::now(),
        }
    }

    /// Split a `notify` event into one `FileEvent` per affected path.
    pub fn from_notify(event: &notify::Event) -> Vec<FileEvent> {
        let kind = kind_from_notify(&event.kind);
        let timestamp = Utc::now();
        event
            .paths
            .iter()
            .map(|path| FileEvent {
                kind,
                path: path.clone(),
                timestamp,
            })
            .collect()
    }
}

/// JSON rendering, used for `--print-events` and log lines.
impl fmt::Display for FileEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match serde_json::to_string(self) {
            Ok(json) => f.write_str(&json),
            Err(_) => write!(f, "{} {}", self.kind, self.path.display()),
        }
    }
}

/// Map `notify`'s event kind onto [`EventKind`].
///
/// Renames and metadata changes arrive from `notify` as modify sub-kinds,
/// so they are checked before the generic modify arm.
pub fn kind_from_notify(kind: &notify::EventKind) -> EventKind {
    match kind {
        notify::EventKind::Create(_) => EventKind::Create,
        notify::EventKind::Modify(ModifyKind::Name(_)) => EventKind::Rename,
        notify::EventKind::Modify(ModifyKind::Metadata(_)) => EventKind::Chmod,
        notify::EventKind::Modify(_) => EventKind::Modify,
        notify::EventKind::Remove(_) => EventKind::Remove,
        notify::EventKind::Access(_) | notify::EventKind::Any | notify::EventKind::Other => {
            EventKind::Unknown
        }
    }
}
