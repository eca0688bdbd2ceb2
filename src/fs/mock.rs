// src/fs/mock.rs

//! In-memory [`FileSystem`] for tests.

use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use anyhow::{anyhow, bail, Result};

use super::FileSystem;

/// Upper bound on chained symlink hops when resolving a path.
const MAX_LINK_HOPS: usize = 32;

#[derive(Debug, Clone)]
pub enum MockEntry {
    File(Vec<u8>),
    /// Names of the children, in insertion order.
    Dir(Vec<String>),
    Symlink(PathBuf),
}

/// Shared, cloneable in-memory tree.
///
/// Paths are used verbatim as keys; tests should stick to one style
/// (typically absolute paths such as `/root/a`). Parents are created on
/// demand, like `mkdir -p`.
#[derive(Debug, Clone, Default)]
pub struct MockFileSystem {
    entries: Arc<Mutex<HashMap<PathBuf, MockEntry>>>,
}

type Entries = HashMap<PathBuf, MockEntry>;

impl MockFileSystem {
    pub fn new() -> Self {
        let mock = Self::default();
        {
            let mut entries = mock.lock();
            entries.insert(PathBuf::from("/"), MockEntry::Dir(Vec::new()));
            entries.insert(PathBuf::from("."), MockEntry::Dir(Vec::new()));
        }
        mock
    }

    pub fn add_file(&self, path: impl AsRef<Path>, content: impl Into<Vec<u8>>) {
        self.put(path.as_ref(), MockEntry::File(content.into()));
    }

    /// Create a directory and all missing parents.
    pub fn add_dir(&self, path: impl AsRef<Path>) {
        mkdir_p(&mut self.lock(), path.as_ref());
    }

    /// Add a symlink at `path` pointing to `target`.
    pub fn add_symlink(&self, path: impl AsRef<Path>, target: impl AsRef<Path>) {
        self.put(path.as_ref(), MockEntry::Symlink(target.as_ref().to_path_buf()));
    }

    /// Remove an entry and detach it from its parent.
    pub fn remove(&self, path: impl AsRef<Path>) {
        let path = path.as_ref();
        let mut entries = self.lock();
        entries.remove(path);
        if let (Some(parent), Some(name)) = (parent_of(path), path.file_name()) {
            if let Some(MockEntry::Dir(children)) = entries.get_mut(&parent) {
                children.retain(|c| c.as_str() != name.to_string_lossy());
            }
        }
    }

    fn put(&self, path: &Path, entry: MockEntry) {
        let mut entries = self.lock();
        entries.insert(path.to_path_buf(), entry);
        if let Some(parent) = parent_of(path) {
            mkdir_p(&mut entries, &parent);
            attach(&mut entries, &parent, path);
        }
    }

    fn lock(&self) -> MutexGuard<'_, Entries> {
        // Test helper: a poisoned lock means another test thread already failed.
        self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Look up `path` with every symlink along it resolved.
    fn lookup(&self, path: &Path) -> (PathBuf, Option<MockEntry>) {
        let entries = self.lock();
        let resolved = resolve(&entries, path);
        let entry = entries.get(&resolved).cloned();
        (resolved, entry)
    }
}

fn parent_of(path: &Path) -> Option<PathBuf> {
    let parent = path.parent()?;
    Some(if parent.as_os_str().is_empty() {
        PathBuf::from(".")
    } else {
        parent.to_path_buf()
    })
}

fn mkdir_p(entries: &mut Entries, path: &Path) {
    if entries.contains_key(path) {
        return;
    }
    entries.insert(path.to_path_buf(), MockEntry::Dir(Vec::new()));
    if let Some(parent) = parent_of(path).filter(|p| p != path) {
        mkdir_p(entries, &parent);
        attach(entries, &parent, path);
    }
}

fn attach(entries: &mut Entries, parent: &Path, child: &Path) {
    let Some(name) = child.file_name().map(|n| n.to_string_lossy().into_owned()) else {
        return;
    };
    if let Some(MockEntry::Dir(children)) = entries.get_mut(parent) {
        if !children.contains(&name) {
            children.push(name);
        }
    }
}

fn resolve(entries: &Entries, path: &Path) -> PathBuf {
    let mut resolved = PathBuf::new();
    for component in path.components() {
        match component {
            Component::ParentDir => {
                resolved.pop();
                continue;
            }
            Component::CurDir if !resolved.as_os_str().is_empty() => continue,
            other => resolved.push(other),
        }
        let mut hops = 0;
        while let Some(MockEntry::Symlink(target)) = entries.get(&resolved) {
            resolved = target.clone();
            hops += 1;
            if hops > MAX_LINK_HOPS {
                break;
            }
        }
    }
    resolved
}

impl FileSystem for MockFileSystem {
    fn read_dir(&self, path: &Path) -> Result<Vec<PathBuf>> {
        match self.lookup(path).1 {
            Some(MockEntry::Dir(children)) => {
                Ok(children.iter().map(|name| path.join(name)).collect())
            }
            _ => bail!("not a directory: {}", path.display()),
        }
    }

    fn is_dir(&self, path: &Path) -> bool {
        matches!(self.lookup(path).1, Some(MockEntry::Dir(_)))
    }

    fn exists(&self, path: &Path) -> bool {
        matches!(self.lookup(path).1, Some(MockEntry::File(_) | MockEntry::Dir(_)))
    }

    fn canonicalize(&self, path: &Path) -> Result<PathBuf> {
        match self.lookup(path) {
            (resolved, Some(MockEntry::File(_) | MockEntry::Dir(_))) => Ok(resolved),
            _ => bail!("no such file or directory: {}", path.display()),
        }
    }

    fn read_to_string(&self, path: &Path) -> Result<String> {
        match self.lookup(path).1 {
            Some(MockEntry::File(content)) => {
                String::from_utf8(content).map_err(|e| anyhow!("invalid UTF-8 in {}: {e}", path.display()))
            }
            Some(_) => bail!("is a directory: {}", path.display()),
            None => bail!("no such file: {}", path.display()),
        }
    }

    fn write(&self, path: &Path, contents: &[u8]) -> Result<()> {
        if let Some(MockEntry::Dir(_)) = self.lookup(path).1 {
            bail!("is a directory: {}", path.display());
        }
        self.add_file(path, contents);
        Ok(())
    }
}
