// src/watch/registrar.rs

//! Subtree registration: which paths to hand to the notification source.
//!
//! The source is always driven in non-recursive mode, so recursive watching
//! means subscribing to every directory of the tree individually.

use std::path::{Path, PathBuf};

use tracing::debug;

use crate::errors::{Result, WatchcmdError};
use crate::fs::FileSystem;

/// Compute the full subscription list for `roots`.
///
/// - Non-recursive: `roots` unchanged. Missing or unreadable roots surface
///   later, when the source is asked to watch them.
/// - Recursive: every root plus every directory below it, depth first, with
///   directory entries visited in sorted order. Files are not subscribed on
///   their own; their directory covers them. A root that is not a directory
///   is kept as-is.
///
/// Any traversal failure aborts the whole computation.
pub fn compute_subscriptions(
    fs: &dyn FileSystem,
    roots: &[PathBuf],
    recursive: bool,
) -> Result<Vec<PathBuf>> {
    if !recursive {
        return Ok(roots.to_vec());
    }

    let mut out = Vec::new();
    for root in roots {
        if !fs.exists(root) {
            return Err(WatchcmdError::subscription(root, "path does not exist"));
        }
        if !fs.is_dir(root) {
            out.push(root.clone());
            continue;
        }
        let mut ancestors = Vec::new();
        walk_dir(fs, root, &mut ancestors, &mut out)?;
    }

    debug!(count = out.len(), "computed recursive subscriptions");
    Ok(out)
}

/// Pre-order walk of `dir`.
///
/// `ancestors` holds the canonical paths of the directories on the current
/// branch; meeting one of them again means a symlink loop.
fn walk_dir(
    fs: &dyn FileSystem,
    dir: &Path,
    ancestors: &mut Vec<PathBuf>,
    out: &mut Vec<PathBuf>,
) -> Result<()> {
    let canonical = fs
        .canonicalize(dir)
        .map_err(|e| WatchcmdError::subscription(dir, format!("{e:#}")))?;
    if ancestors.contains(&canonical) {
        return Err(WatchcmdError::subscription(
            dir,
            format!("symlink loop back to {:?}", canonical),
        ));
    }

    out.push(dir.to_path_buf());

    let mut entries = fs
        .read_dir(dir)
        .map_err(|e| WatchcmdError::subscription(dir, format!("{e:#}")))?;
    entries.sort();

    ancestors.push(canonical);
    for entry in entries {
        if fs.is_dir(&entry) {
            walk_dir(fs, &entry, ancestors, out)?;
        }
    }
    ancestors.pop();

    Ok(())
}
