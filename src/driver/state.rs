// src/driver/state.rs

//! Persistent bookkeeping of tasks, stored as one JSON document.
//!
//! The effective path on disk is `<state_dir>/state.json`. The whole
//! document is rewritten on every mutation.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::model::TaskConfig;
use crate::errors::{Result, WatchcmdError};
use crate::fs::FileSystem;

/// File name of the state document inside `state_dir`.
pub const STATE_FILE_NAME: &str = "state.json";

/// Coarse task phase as recorded on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskPhase {
    Running,
    Completed,
}

/// Recorded state of one task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskState {
    pub id: String,
    pub started_at: DateTime<Utc>,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
    pub config: TaskConfig,
    pub events: Vec<String>,
    pub paths: Vec<PathBuf>,
    /// Exit code of the last dispatch; `-1` if it never exited normally.
    #[serde(default)]
    pub exit_code: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub status: TaskPhase,
}

impl TaskState {
    /// State for a task that has just been started.
    pub fn running(id: impl Into<String>, config: TaskConfig, started_at: DateTime<Utc>) -> Self {
        Self {
            id: id.into(),
            started_at,
            completed_at: None,
            events: config.events.clone(),
            paths: config.paths.clone(),
            config,
            exit_code: 0,
            error: None,
            status: TaskPhase::Running,
        }
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct StateDocument {
    #[serde(default)]
    tasks: BTreeMap<String, TaskState>,
}

/// In-memory task table mirrored to `state.json`.
#[derive(Debug)]
pub struct DriverState {
    fs: Arc<dyn FileSystem>,
    path: PathBuf,
    tasks: BTreeMap<String, TaskState>,
}

impl DriverState {
    pub fn new(fs: Arc<dyn FileSystem>, state_dir: &Path) -> Self {
        Self {
            fs,
            path: state_dir.join(STATE_FILE_NAME),
            tasks: BTreeMap::new(),
        }
    }

    /// Location of the state document.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Record a task and persist. If the write fails the table is left as
    /// it was.
    pub fn put_task(&mut self, state: TaskState) -> Result<()> {
        let id = state.id.clone();
        let previous = self.tasks.insert(id.clone(), state);
        if let Err(err) = self.persist() {
            match previous {
                Some(prev) => {
                    self.tasks.insert(id, prev);
                }
                None => {
                    self.tasks.remove(&id);
                }
            }
            return Err(err);
        }
        Ok(())
    }

    pub fn get_task(&self, id: &str) -> Result<&TaskState> {
        self.tasks
            .get(id)
            .ok_or_else(|| WatchcmdError::TaskNotFound(id.to_string()))
    }

    /// Remove a task. Removing an unknown id is not an error.
    pub fn delete_task(&mut self, id: &str) -> Result<()> {
        self.tasks.remove(id);
        self.persist()
    }

    /// All recorded tasks, ordered by id.
    pub fn list_tasks(&self) -> Vec<&TaskState> {
        self.tasks.values().collect()
    }

    pub fn update_status(&mut self, id: &str, status: TaskPhase) -> Result<()> {
        let task = self.task_mut(id)?;
        task.status = status;
        self.persist()
    }

    /// Mark a task completed with the result of its last dispatch.
    pub fn record_completion(&mut self, id: &str, exit_code: i32, error: Option<String>) -> Result<()> {
        let task = self.task_mut(id)?;
        task.completed_at = Some(Utc::now());
        task.exit_code = exit_code;
        if error.is_some() {
            task.error = error;
        }
        task.status = TaskPhase::Completed;
        self.persist()
    }

    /// Write the whole document to `state.json`.
    pub fn persist(&self) -> Result<()> {
        let doc = StateDocument {
            tasks: self.tasks.clone(),
        };
        let json = serde_json::to_vec_pretty(&doc)?;
        self.fs.write(&self.path, &json)?;
        debug!(path = ?self.path, tasks = self.tasks.len(), "persisted driver state");
        Ok(())
    }

    /// Replace the in-memory table with what is on disk.
    ///
    /// A missing file means there is nothing to restore.
    pub fn restore(&mut self) -> Result<()> {
        if !self.fs.exists(&self.path) {
            debug!(path = ?self.path, "no driver state to restore");
            return Ok(());
        }

        let contents = self.fs.read_to_string(&self.path)?;
        let doc: StateDocument = serde_json::from_str(&contents)?;
        self.tasks = doc.tasks;

        info!(path = ?self.path, tasks = self.tasks.len(), "restored driver state");
        Ok(())
    }

    fn task_mut(&mut self, id: &str) -> Result<&mut TaskState> {
        self.tasks
            .get_mut(id)
            .ok_or_else(|| WatchcmdError::TaskNotFound(id.to_string()))
    }
}
