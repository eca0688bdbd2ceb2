// src/watch/filter.rs

//! Accept/reject decision for a single event.

use crate::watch::event::FileEvent;
use crate::watch::spec::WatchSpec;

/// Returns true if `event` should trigger the command.
///
/// - The event kind must be one of the watch spec's accepted kinds.
/// - The final path segment must not match any ignore glob. Only the
///   basename is matched, never the full path.
pub fn should_handle(event: &FileEvent, spec: &WatchSpec) -> bool {
    if !spec.accepts(event.kind) {
        return false;
    }

    match event.path.file_name() {
        Some(name) => !spec.is_ignored(&name.to_string_lossy()),
        None => true,
    }
}
