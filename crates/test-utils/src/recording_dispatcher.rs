use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};

use watchcmd::exec::{run_command, Dispatcher, ExecutionOutcome};
use watchcmd::watch::{FileEvent, WatchSpec};

/// A dispatcher that:
/// - records every event it is handed
/// - either reports success right away, or runs the real command.
#[derive(Clone, Default)]
pub struct RecordingDispatcher {
    dispatched: Arc<Mutex<Vec<FileEvent>>>,
    run_commands: bool,
}

impl RecordingDispatcher {
    /// Records only; no process is spawned.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records, then runs the watch spec's command like the production dispatcher.
    pub fn running_commands() -> Self {
        Self {
            dispatched: Arc::default(),
            run_commands: true,
        }
    }

    /// Events dispatched so far, in order.
    pub fn dispatched(&self) -> Vec<FileEvent> {
        self.dispatched.lock().unwrap().clone()
    }

    pub fn count(&self) -> usize {
        self.dispatched.lock().unwrap().len()
    }
}

impl Dispatcher for RecordingDispatcher {
    fn dispatch<'a>(
        &'a self,
        event: &'a FileEvent,
        spec: &'a WatchSpec,
    ) -> Pin<Box<dyn Future<Output = ExecutionOutcome> + Send + 'a>> {
        Box::pin(async move {
            {
                let mut guard = self.dispatched.lock().unwrap();
                guard.push(event.clone());
            }

            if self.run_commands {
                run_command(event, spec).await
            } else {
                ExecutionOutcome::skipped()
            }
        })
    }
}
