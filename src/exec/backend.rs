// src/exec/backend.rs

//! Pluggable command dispatcher abstraction.
//!
//! The watch loop talks to a `Dispatcher` instead of spawning processes
//! itself. Production code uses [`CommandDispatcher`]; tests can plug in a
//! dispatcher that records events without running anything.

use std::future::Future;
use std::pin::Pin;

use crate::exec::command::run_command;
use crate::exec::outcome::ExecutionOutcome;
use crate::watch::event::FileEvent;
use crate::watch::spec::WatchSpec;

/// Trait abstracting how an accepted event is reacted to.
///
/// The watch loop awaits the returned future before looking at the next
/// event, so implementations define how long one event blocks the loop.
pub trait Dispatcher: Send + Sync {
    fn dispatch<'a>(
        &'a self,
        event: &'a FileEvent,
        spec: &'a WatchSpec,
    ) -> Pin<Box<dyn Future<Output = ExecutionOutcome> + Send + 'a>>;
}

/// Real dispatcher: runs the watch spec's command as a child process.
#[derive(Debug, Clone, Copy, Default)]
pub struct CommandDispatcher;

impl Dispatcher for CommandDispatcher {
    fn dispatch<'a>(
        &'a self,
        event: &'a FileEvent,
        spec: &'a WatchSpec,
    ) -> Pin<Box<dyn Future<Output = ExecutionOutcome> + Send + 'a>> {
        Box::pin(run_command(event, spec))
    }
}
