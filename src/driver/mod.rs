// src/driver/mod.rs

//! Task driver: owns one watcher per task id and keeps the on-disk
//! bookkeeping in [`DriverState`] up to date.

pub mod state;

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::config::model::{DriverSection, TaskConfig};
use crate::errors::{Result, WatchcmdError};
use crate::exec::{CommandDispatcher, Dispatcher, ExecutionOutcome};
use crate::fs::FileSystem;
use crate::watch::{FileEvent, WatchSpec, WatcherHandle, WatcherOptions, WatcherState};

pub use state::{DriverState, TaskPhase, TaskState, STATE_FILE_NAME};

/// Error recorded for a task whose watcher ended `Faulted`.
pub const STREAM_CLOSED_ERROR: &str = "event stream closed unexpectedly";

/// A started task.
struct TaskHandle {
    watcher: WatcherHandle,
    started_at: DateTime<Utc>,
    completed_at: Option<DateTime<Utc>>,
    events: Option<mpsc::Receiver<FileEvent>>,
}

/// Snapshot returned by [`Driver::inspect_task`].
#[derive(Debug, Clone)]
pub struct TaskStatus {
    pub id: String,
    pub state: WatcherState,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub subscriptions: usize,
    pub last_outcome: Option<ExecutionOutcome>,
}

pub struct Driver {
    config: DriverSection,
    dispatcher: Arc<dyn Dispatcher>,
    state: DriverState,
    tasks: HashMap<String, TaskHandle>,
    forward_events: bool,
}

impl Driver {
    /// Driver that runs real commands.
    pub fn new(config: DriverSection, fs: Arc<dyn FileSystem>) -> Self {
        Self::with_dispatcher(config, fs, Arc::new(CommandDispatcher))
    }

    pub fn with_dispatcher(
        config: DriverSection,
        fs: Arc<dyn FileSystem>,
        dispatcher: Arc<dyn Dispatcher>,
    ) -> Self {
        let state = DriverState::new(fs, &config.state_dir);
        Self {
            config,
            dispatcher,
            state,
            tasks: HashMap::new(),
            forward_events: false,
        }
    }

    /// Give every task started from now on a forwarding buffer of
    /// `event_buffer_size` events, see [`take_event_stream`](Self::take_event_stream).
    pub fn with_event_forwarding(mut self, enabled: bool) -> Self {
        self.forward_events = enabled;
        self
    }

    /// Watcher options derived from the `[driver]` section.
    pub fn watcher_options(&self) -> WatcherOptions {
        WatcherOptions {
            on_stream_closed: self.config.on_stream_closed,
            max_subscriptions: match self.config.max_watch_paths {
                0 => None,
                n => Some(n),
            },
        }
    }

    pub fn config(&self) -> &DriverSection {
        &self.config
    }

    pub fn state(&self) -> &DriverState {
        &self.state
    }

    /// Load previously persisted bookkeeping.
    pub fn restore(&mut self) -> Result<()> {
        self.state.restore()
    }

    /// Validate `config`, start a watcher for it and record the task.
    pub fn start_task(&mut self, id: &str, config: TaskConfig) -> Result<()> {
        if self.tasks.contains_key(id) {
            return Err(WatchcmdError::TaskExists(id.to_string()));
        }

        let spec = WatchSpec::try_from(&config)?;
        let watcher =
            WatcherHandle::with_options(spec, Arc::clone(&self.dispatcher), self.watcher_options())?;
        self.start_task_with(id, config, watcher)
    }

    /// Record and start a task on a watcher built by the caller.
    ///
    /// `watcher` must not have been started yet. It is normally built from
    /// `config` with [`watcher_options`](Self::watcher_options).
    pub fn start_task_with(
        &mut self,
        id: &str,
        config: TaskConfig,
        mut watcher: WatcherHandle,
    ) -> Result<()> {
        if self.tasks.contains_key(id) {
            return Err(WatchcmdError::TaskExists(id.to_string()));
        }

        let events = if self.forward_events {
            Some(watcher.forward_events(self.config.event_buffer_size)?)
        } else {
            None
        };
        watcher.start()?;

        let started_at = Utc::now();
        // On failure `watcher` is dropped here, which cancels its loop.
        self.state
            .put_task(TaskState::running(id, config, started_at))?;

        info!(task = %id, subscriptions = watcher.subscriptions().len(), "task started");
        self.tasks.insert(
            id.to_string(),
            TaskHandle {
                watcher,
                started_at,
                completed_at: None,
                events,
            },
        );
        Ok(())
    }

    /// Take the receiving end of a task's forwarding buffer.
    ///
    /// `None` if forwarding is off or the stream was already taken.
    pub fn take_event_stream(&mut self, id: &str) -> Result<Option<mpsc::Receiver<FileEvent>>> {
        let handle = self
            .tasks
            .get_mut(id)
            .ok_or_else(|| WatchcmdError::TaskNotFound(id.to_string()))?;
        Ok(handle.events.take())
    }

    /// Stop a task's watcher and record how its last dispatch went.
    ///
    /// The task stays inspectable until [`destroy_task`](Self::destroy_task).
    pub async fn stop_task(&mut self, id: &str) -> Result<()> {
        let handle = self
            .tasks
            .get_mut(id)
            .ok_or_else(|| WatchcmdError::TaskNotFound(id.to_string()))?;

        handle.watcher.stop().await;
        if handle.completed_at.is_some() {
            return Ok(());
        }
        handle.completed_at = Some(Utc::now());

        let outcome = handle.watcher.last_outcome();
        let exit_code = outcome.as_ref().map_or(0, ExecutionOutcome::code_or_default);
        let error = if handle.watcher.state() == WatcherState::Faulted {
            warn!(task = %id, "task watcher faulted");
            Some(STREAM_CLOSED_ERROR.to_string())
        } else {
            outcome.and_then(|o| o.error)
        };

        self.state.record_completion(id, exit_code, error)?;
        info!(task = %id, exit_code, "task stopped");
        Ok(())
    }

    /// Stop a task and forget it, on disk as well.
    pub async fn destroy_task(&mut self, id: &str) -> Result<()> {
        match self.tasks.remove(id) {
            Some(mut handle) => handle.watcher.stop().await,
            None => {
                self.state.get_task(id)?;
            }
        }
        self.state.delete_task(id)?;
        info!(task = %id, "task destroyed");
        Ok(())
    }

    pub fn inspect_task(&self, id: &str) -> Result<TaskStatus> {
        let handle = self
            .tasks
            .get(id)
            .ok_or_else(|| WatchcmdError::TaskNotFound(id.to_string()))?;

        Ok(TaskStatus {
            id: id.to_string(),
            state: handle.watcher.state(),
            started_at: handle.started_at,
            completed_at: handle.completed_at,
            subscriptions: handle.watcher.subscriptions().len(),
            last_outcome: handle.watcher.last_outcome(),
        })
    }

    /// Ids of all live tasks, sorted.
    pub fn list_tasks(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.tasks.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Stop every task. Failures are logged, not returned.
    pub async fn shutdown(&mut self) {
        for id in self.list_tasks() {
            if let Err(err) = self.stop_task(&id).await {
                warn!(task = %id, error = %err, "failed to stop task cleanly");
            }
        }
        info!("driver shut down");
    }
}
