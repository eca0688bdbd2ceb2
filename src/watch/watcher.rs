// src/watch/watcher.rs

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use notify::{Config, Event, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::errors::{Result, WatchcmdError};
use crate::exec::{Dispatcher, ExecutionOutcome};
use crate::fs::{FileSystem, RealFileSystem};
use crate::types::{EventKind, StreamClosedPolicy};
use crate::watch::buffer::EventBuffer;
use crate::watch::event::FileEvent;
use crate::watch::filter::should_handle;
use crate::watch::registrar::compute_subscriptions;
use crate::watch::spec::WatchSpec;

/// Lifecycle of a [`WatcherHandle`].
///
/// `Starting → Running → Stopped`. `Stopped` and `Faulted` are terminal;
/// a new handle is needed to watch again.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatcherState {
    Starting,
    Running,
    Stopped,
    /// The event stream closed on its own under [`StreamClosedPolicy::Fault`].
    Faulted,
}

/// Knobs that belong to the runtime rather than to the [`WatchSpec`].
#[derive(Debug, Clone, Copy, Default)]
pub struct WatcherOptions {
    pub on_stream_closed: StreamClosedPolicy,
    /// Refuse to start when more paths than this would be subscribed.
    pub max_subscriptions: Option<usize>,
}

/// The notification source before the loop takes it over.
struct NotifySource {
    watcher: Box<dyn Watcher + Send>,
    events: mpsc::UnboundedReceiver<Event>,
    errors: mpsc::UnboundedReceiver<notify::Error>,
}

impl NotifySource {
    fn new() -> Result<Self> {
        let (event_tx, events) = mpsc::unbounded_channel::<Event>();
        let (error_tx, errors) = mpsc::unbounded_channel::<notify::Error>();

        // Called synchronously on notify's own thread. The senders live only
        // inside this closure, so both streams close when the watcher goes.
        let watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| match res {
                Ok(event) => {
                    let _ = event_tx.send(event);
                }
                Err(err) => {
                    let _ = error_tx.send(err);
                }
            },
            Config::default(),
        )?;

        Ok(Self {
            watcher: Box::new(watcher),
            events,
            errors,
        })
    }

    /// Subscriptions go to a real watcher whose own events are dropped;
    /// the loop reads `events` and `errors` instead.
    fn detached(
        events: mpsc::UnboundedReceiver<Event>,
        errors: mpsc::UnboundedReceiver<notify::Error>,
    ) -> Result<Self> {
        let watcher = RecommendedWatcher::new(|_: notify::Result<Event>| {}, Config::default())?;
        Ok(Self {
            watcher: Box::new(watcher),
            events,
            errors,
        })
    }
}

/// One watch session: a [`WatchSpec`] bound to its subscription and its
/// background loop.
///
/// All watcher state is reachable only through the handle. Dropping a
/// running handle signals the loop to stop without waiting for it.
pub struct WatcherHandle {
    spec: Arc<WatchSpec>,
    dispatcher: Arc<dyn Dispatcher>,
    fs: Arc<dyn FileSystem>,
    options: WatcherOptions,
    state: Arc<Mutex<WatcherState>>,
    last_outcome: Arc<Mutex<Option<ExecutionOutcome>>>,
    source: Option<NotifySource>,
    forward: Option<EventBuffer>,
    subscriptions: Vec<PathBuf>,
    cancel: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl std::fmt::Debug for WatcherHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WatcherHandle")
            .field("paths", &self.spec.paths())
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl WatcherHandle {
    /// Create a watcher for `spec` with default options.
    ///
    /// Only the notification source is created here; nothing is subscribed
    /// until [`start`](Self::start).
    pub fn new(spec: WatchSpec, dispatcher: Arc<dyn Dispatcher>) -> Result<Self> {
        Self::with_options(spec, dispatcher, WatcherOptions::default())
    }

    pub fn with_options(
        spec: WatchSpec,
        dispatcher: Arc<dyn Dispatcher>,
        options: WatcherOptions,
    ) -> Result<Self> {
        Ok(Self::from_source(spec, dispatcher, options, NotifySource::new()?))
    }

    /// Create a watcher whose loop reads events and errors from the given
    /// streams instead of from the filesystem.
    ///
    /// Paths are still subscribed at [`start`](Self::start). Dropping every
    /// sender of `events` closes the stream, which the loop handles according
    /// to [`WatcherOptions::on_stream_closed`].
    pub fn with_event_source(
        spec: WatchSpec,
        dispatcher: Arc<dyn Dispatcher>,
        options: WatcherOptions,
        events: mpsc::UnboundedReceiver<Event>,
        errors: mpsc::UnboundedReceiver<notify::Error>,
    ) -> Result<Self> {
        let source = NotifySource::detached(events, errors)?;
        Ok(Self::from_source(spec, dispatcher, options, source))
    }

    fn from_source(
        spec: WatchSpec,
        dispatcher: Arc<dyn Dispatcher>,
        options: WatcherOptions,
        source: NotifySource,
    ) -> Self {
        Self {
            spec: Arc::new(spec),
            dispatcher,
            fs: Arc::new(RealFileSystem),
            options,
            state: Arc::new(Mutex::new(WatcherState::Starting)),
            last_outcome: Arc::new(Mutex::new(None)),
            source: Some(source),
            forward: None,
            subscriptions: Vec::new(),
            cancel: None,
            task: None,
        }
    }

    pub fn spec(&self) -> &WatchSpec {
        &self.spec
    }

    pub fn state(&self) -> WatcherState {
        read_lock(&self.state)
    }

    /// Paths registered with the notification source at start.
    pub fn subscriptions(&self) -> &[PathBuf] {
        &self.subscriptions
    }

    /// Outcome of the most recent dispatch, if any.
    pub fn last_outcome(&self) -> Option<ExecutionOutcome> {
        read_lock(&self.last_outcome)
    }

    /// Also forward every accepted event into a bounded buffer of
    /// `capacity` events. Must be called before [`start`](Self::start).
    pub fn forward_events(&mut self, capacity: usize) -> Result<mpsc::Receiver<FileEvent>> {
        if self.state() != WatcherState::Starting || self.source.is_none() {
            return Err(WatchcmdError::InvalidState(
                "event forwarding must be enabled before start".to_string(),
            ));
        }
        let (buffer, rx) = EventBuffer::new(capacity);
        self.forward = Some(buffer);
        Ok(rx)
    }

    /// Subscribe every path and spawn the watch loop.
    ///
    /// If any path fails to register, nothing is left running, the handle
    /// becomes `Stopped` and the error is returned.
    pub fn start(&mut self) -> Result<()> {
        let state = self.state();
        let mut source = match (state, self.source.take()) {
            (WatcherState::Starting, Some(source)) => source,
            _ => {
                return Err(WatchcmdError::InvalidState(format!(
                    "cannot start a watcher in state {state:?}"
                )));
            }
        };

        let subscriptions = match self.register(source.watcher.as_mut()) {
            Ok(subs) => subs,
            Err(err) => {
                // Dropping the source removes any partial registrations.
                drop(source);
                write_lock(&self.state, WatcherState::Stopped);
                return Err(err);
            }
        };

        info!(
            paths = ?self.spec.paths(),
            subscriptions = subscriptions.len(),
            recursive = self.spec.recursive(),
            "file watcher started"
        );
        self.subscriptions = subscriptions;

        let (cancel_tx, cancel_rx) = oneshot::channel::<()>();
        let ctx = LoopContext {
            spec: Arc::clone(&self.spec),
            dispatcher: Arc::clone(&self.dispatcher),
            fs: Arc::clone(&self.fs),
            forward: self.forward.take(),
            state: Arc::clone(&self.state),
            last_outcome: Arc::clone(&self.last_outcome),
            on_stream_closed: self.options.on_stream_closed,
        };

        write_lock(&self.state, WatcherState::Running);
        self.cancel = Some(cancel_tx);
        self.task = Some(tokio::spawn(watch_loop(ctx, source, cancel_rx)));

        Ok(())
    }

    /// Stop watching.
    ///
    /// Signals the loop and waits for it to exit; a command that is already
    /// running is allowed to finish. Never fails, and calling it again (or on
    /// a handle that never started) is a no-op.
    pub async fn stop(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            if cancel.send(()).is_err() {
                debug!("watch loop already exited before stop");
            }
        }

        if let Some(task) = self.task.take() {
            if let Err(err) = task.await {
                warn!(error = %err, "watch loop task ended abnormally");
            }
        }

        if self.source.take().is_some() {
            debug!("watcher stopped before it was started");
        }

        let mut state = match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if matches!(*state, WatcherState::Starting | WatcherState::Running) {
            *state = WatcherState::Stopped;
        }
    }

    fn register(&self, watcher: &mut (dyn Watcher + Send)) -> Result<Vec<PathBuf>> {
        let subscriptions =
            compute_subscriptions(self.fs.as_ref(), self.spec.paths(), self.spec.recursive())?;

        if let Some(limit) = self.options.max_subscriptions {
            if subscriptions.len() > limit {
                return Err(WatchcmdError::TooManyPaths {
                    count: subscriptions.len(),
                    limit,
                });
            }
        }

        for path in subscriptions.iter() {
            watcher
                .watch(path, RecursiveMode::NonRecursive)
                .map_err(|e| WatchcmdError::subscription(path, e))?;
            debug!(?path, "subscribed");
        }

        Ok(subscriptions)
    }
}

impl Drop for WatcherHandle {
    fn drop(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            let _ = cancel.send(());
        }
    }
}

/// Everything the background loop needs, detached from the handle.
struct LoopContext {
    spec: Arc<WatchSpec>,
    dispatcher: Arc<dyn Dispatcher>,
    fs: Arc<dyn FileSystem>,
    forward: Option<EventBuffer>,
    state: Arc<Mutex<WatcherState>>,
    last_outcome: Arc<Mutex<Option<ExecutionOutcome>>>,
    on_stream_closed: StreamClosedPolicy,
}

enum LoopExit {
    Cancelled,
    StreamClosed,
}

/// The watch loop: waits on events, source errors and cancellation, in
/// whatever order they arrive.
async fn watch_loop(ctx: LoopContext, source: NotifySource, mut cancel_rx: oneshot::Receiver<()>) {
    let NotifySource {
        mut watcher,
        mut events,
        mut errors,
    } = source;

    let exit = loop {
        tokio::select! {
            maybe_event = events.recv() => match maybe_event {
                Some(event) => handle_notify_event(&ctx, watcher.as_mut(), event).await,
                None => break LoopExit::StreamClosed,
            },
            Some(err) = errors.recv() => {
                warn!(error = %err, paths = ?err.paths, "watcher error");
            }
            // A dropped sender (handle dropped) counts as a stop request too.
            _ = &mut cancel_rx => break LoopExit::Cancelled,
        }
    };

    // Close the notification source.
    drop(watcher);

    match (exit, ctx.on_stream_closed) {
        (LoopExit::Cancelled, _) => {
            info!(paths = ?ctx.spec.paths(), "file watcher stopped");
            write_lock(&ctx.state, WatcherState::Stopped);
        }
        (LoopExit::StreamClosed, StreamClosedPolicy::Stop) => {
            info!(paths = ?ctx.spec.paths(), "event stream closed; watcher stopped");
            write_lock(&ctx.state, WatcherState::Stopped);
        }
        (LoopExit::StreamClosed, StreamClosedPolicy::Fault) => {
            error!(paths = ?ctx.spec.paths(), "event stream closed unexpectedly");
            write_lock(&ctx.state, WatcherState::Faulted);
        }
    }
}

async fn handle_notify_event(
    ctx: &LoopContext,
    watcher: &mut (dyn Watcher + Send),
    event: Event,
) {
    debug!(?event, "received notify event");

    for file_event in FileEvent::from_notify(&event) {
        if ctx.spec.recursive()
            && file_event.kind == EventKind::Create
            && ctx.fs.is_dir(&file_event.path)
        {
            register_new_directory(ctx, watcher, &file_event.path);
        }

        if !should_handle(&file_event, &ctx.spec) {
            debug!(path = ?file_event.path, kind = %file_event.kind, "event filtered out");
            continue;
        }

        info!(path = ?file_event.path, kind = %file_event.kind, "file event detected");

        if let Some(buffer) = ctx.forward.as_ref() {
            if let Err(err) = buffer.push(file_event.clone()) {
                warn!(path = ?file_event.path, error = %err, "dropping forwarded event");
            }
        }

        let outcome = ctx.dispatcher.dispatch(&file_event, &ctx.spec).await;
        log_outcome(&file_event, &outcome);
        write_lock(&ctx.last_outcome, Some(outcome));
    }
}

/// Subscribe a directory created under a recursively watched tree.
fn register_new_directory(ctx: &LoopContext, watcher: &mut (dyn Watcher + Send), dir: &Path) {
    let subscriptions = match compute_subscriptions(ctx.fs.as_ref(), &[dir.to_path_buf()], true) {
        Ok(subs) => subs,
        Err(err) => {
            warn!(?dir, error = %err, "failed to walk new directory");
            return;
        }
    };

    for path in subscriptions {
        match watcher.watch(&path, RecursiveMode::NonRecursive) {
            Ok(()) => debug!(?path, "subscribed new directory"),
            Err(err) => warn!(?path, error = %err, "failed to subscribe new directory"),
        }
    }
}

fn log_outcome(event: &FileEvent, outcome: &ExecutionOutcome) {
    if outcome.success {
        info!(
            path = ?event.path,
            exit_code = ?outcome.exit_code,
            attempts = outcome.attempts,
            output = %outcome.output.trim_end(),
            "command executed successfully"
        );
    } else {
        warn!(
            path = ?event.path,
            exit_code = ?outcome.exit_code,
            attempts = outcome.attempts,
            error = ?outcome.error,
            output = %outcome.output.trim_end(),
            "command execution failed"
        );
    }
}

fn read_lock<T: Clone>(mutex: &Mutex<T>) -> T {
    match mutex.lock() {
        Ok(guard) => guard.clone(),
        Err(poisoned) => poisoned.into_inner().clone(),
    }
}

fn write_lock<T>(mutex: &Mutex<T>, value: T) {
    match mutex.lock() {
        Ok(mut guard) => *guard = value,
        Err(poisoned) => *poisoned.into_inner() = value,
    }
}
