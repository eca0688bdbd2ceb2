// tests/watcher_lifecycle.rs

#![cfg(target_os = "linux")]

use std::error::Error;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use notify::event::{CreateKind, EventKind as NotifyKind};
use tokio::sync::mpsc;
use watchcmd::errors::WatchcmdError;
use watchcmd::types::{EventKind, StreamClosedPolicy};
use watchcmd::watch::{WatchSpec, WatcherHandle, WatcherOptions, WatcherState};
use watchcmd_test_utils::recording_dispatcher::RecordingDispatcher;
use watchcmd_test_utils::{init_tracing, wait_until, with_timeout};

type TestResult = Result<(), Box<dyn Error>>;

const SETTLE: Duration = Duration::from_millis(300);
const PATIENCE: Duration = Duration::from_secs(5);

fn basenames(dispatcher: &RecordingDispatcher) -> Vec<String> {
    dispatcher
        .dispatched()
        .iter()
        .filter_map(|e| e.path.file_name().map(|n| n.to_string_lossy().into_owned()))
        .collect()
}

fn create_spec(root: &Path) -> watchcmd::watch::WatchSpecBuilder {
    WatchSpec::builder().path(root).event(EventKind::Create)
}

#[tokio::test]
async fn ignored_files_are_not_dispatched() -> TestResult {
    init_tracing();
    let dir = tempfile::tempdir()?;
    let spec = create_spec(dir.path()).ignore("*.tmp").command("true").build()?;
    let dispatcher = RecordingDispatcher::running_commands();

    let mut watcher = WatcherHandle::new(spec, Arc::new(dispatcher.clone()))?;
    watcher.start()?;
    assert_eq!(watcher.state(), WatcherState::Running);
    assert_eq!(watcher.subscriptions(), &[dir.path().to_path_buf()]);

    fs::write(dir.path().join("a.tmp"), "ignored")?;
    fs::write(dir.path().join("b.txt"), "accepted")?;

    assert!(wait_until(PATIENCE, || dispatcher.count() >= 1).await);
    tokio::time::sleep(SETTLE).await;

    assert_eq!(basenames(&dispatcher), vec!["b.txt"]);
    let outcome = watcher.last_outcome().ok_or("no outcome recorded")?;
    assert!(outcome.success);
    assert_eq!(outcome.exit_code, Some(0));

    with_timeout(watcher.stop()).await;
    assert_eq!(watcher.state(), WatcherState::Stopped);
    Ok(())
}

#[tokio::test]
async fn failing_command_keeps_the_loop_running() -> TestResult {
    init_tracing();
    let dir = tempfile::tempdir()?;
    let spec = create_spec(dir.path())
        .command("sh")
        .args(["-c", "exit 1"])
        .build()?;
    let dispatcher = RecordingDispatcher::running_commands();

    let mut watcher = WatcherHandle::new(spec, Arc::new(dispatcher.clone()))?;
    watcher.start()?;

    fs::write(dir.path().join("first"), "1")?;
    assert!(wait_until(PATIENCE, || watcher.last_outcome().is_some()).await);

    let outcome = watcher.last_outcome().ok_or("no outcome recorded")?;
    assert!(!outcome.success);
    assert_eq!(outcome.exit_code, Some(1));
    assert_eq!(watcher.state(), WatcherState::Running);

    fs::write(dir.path().join("second"), "2")?;
    assert!(wait_until(PATIENCE, || dispatcher.count() >= 2).await);
    assert_eq!(basenames(&dispatcher), vec!["first", "second"]);
    assert_eq!(watcher.state(), WatcherState::Running);

    with_timeout(watcher.stop()).await;
    Ok(())
}

#[tokio::test]
async fn unaccepted_kinds_are_not_dispatched() -> TestResult {
    init_tracing();
    let dir = tempfile::tempdir()?;
    let existing = dir.path().join("existing.txt");
    fs::write(&existing, "before")?;

    let spec = WatchSpec::builder()
        .path(dir.path())
        .event(EventKind::Remove)
        .build()?;
    let dispatcher = RecordingDispatcher::new();

    let mut watcher = WatcherHandle::new(spec, Arc::new(dispatcher.clone()))?;
    watcher.start()?;

    fs::write(dir.path().join("new.txt"), "created")?;
    fs::write(&existing, "modified")?;
    fs::remove_file(&existing)?;

    assert!(wait_until(PATIENCE, || dispatcher.count() >= 1).await);
    tokio::time::sleep(SETTLE).await;

    let dispatched = dispatcher.dispatched();
    assert_eq!(dispatched.len(), 1);
    assert_eq!(dispatched[0].kind, EventKind::Remove);
    assert_eq!(dispatched[0].path, existing);

    with_timeout(watcher.stop()).await;
    Ok(())
}

#[tokio::test]
async fn stop_is_idempotent() -> TestResult {
    init_tracing();
    let dir = tempfile::tempdir()?;
    let spec = create_spec(dir.path()).build()?;

    let mut watcher = WatcherHandle::new(spec, Arc::new(RecordingDispatcher::new()))?;
    watcher.start()?;

    with_timeout(watcher.stop()).await;
    assert_eq!(watcher.state(), WatcherState::Stopped);
    with_timeout(watcher.stop()).await;
    assert_eq!(watcher.state(), WatcherState::Stopped);

    let err = watcher.start().unwrap_err();
    assert!(matches!(err, WatchcmdError::InvalidState(_)), "{err:?}");
    Ok(())
}

#[tokio::test]
async fn stop_before_start_is_allowed() -> TestResult {
    let dir = tempfile::tempdir()?;
    let spec = create_spec(dir.path()).build()?;

    let mut watcher = WatcherHandle::new(spec, Arc::new(RecordingDispatcher::new()))?;
    assert_eq!(watcher.state(), WatcherState::Starting);

    watcher.stop().await;
    assert_eq!(watcher.state(), WatcherState::Stopped);
    assert!(watcher.start().is_err());
    Ok(())
}

#[tokio::test]
async fn no_events_after_stop() -> TestResult {
    init_tracing();
    let dir = tempfile::tempdir()?;
    let spec = create_spec(dir.path()).build()?;
    let dispatcher = RecordingDispatcher::new();

    let mut watcher = WatcherHandle::new(spec, Arc::new(dispatcher.clone()))?;
    watcher.start()?;
    with_timeout(watcher.stop()).await;

    fs::write(dir.path().join("late.txt"), "too late")?;
    tokio::time::sleep(SETTLE).await;

    assert_eq!(dispatcher.count(), 0);
    Ok(())
}

#[tokio::test]
async fn start_fails_for_missing_path() -> TestResult {
    init_tracing();
    let dir = tempfile::tempdir()?;
    let missing = dir.path().join("does-not-exist");
    let spec = create_spec(&missing).build()?;

    let mut watcher = WatcherHandle::new(spec, Arc::new(RecordingDispatcher::new()))?;
    let err = watcher.start().unwrap_err();

    match err {
        WatchcmdError::Subscription { path, .. } => assert_eq!(path, missing),
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(watcher.state(), WatcherState::Stopped);

    // Stop after a failed start is still fine.
    with_timeout(watcher.stop()).await;
    assert_eq!(watcher.state(), WatcherState::Stopped);
    Ok(())
}

#[tokio::test]
async fn start_fails_when_too_many_paths() -> TestResult {
    init_tracing();
    let dir = tempfile::tempdir()?;
    fs::create_dir_all(dir.path().join("a/b"))?;
    let spec = create_spec(dir.path()).recursive(true).build()?;

    let options = WatcherOptions {
        max_subscriptions: Some(2),
        ..WatcherOptions::default()
    };
    let mut watcher =
        WatcherHandle::with_options(spec, Arc::new(RecordingDispatcher::new()), options)?;

    // Root, a and a/b.
    let err = watcher.start().unwrap_err();
    assert!(
        matches!(err, WatchcmdError::TooManyPaths { count: 3, limit: 2 }),
        "{err:?}"
    );
    assert_eq!(err.to_string(), "3 paths to watch exceed the limit of 2");
    assert_eq!(watcher.state(), WatcherState::Stopped);
    assert!(watcher.subscriptions().is_empty());
    Ok(())
}

#[tokio::test]
async fn recursive_watch_covers_existing_and_new_directories() -> TestResult {
    init_tracing();
    let dir = tempfile::tempdir()?;
    let sub = dir.path().join("sub");
    fs::create_dir_all(&sub)?;

    let spec = create_spec(dir.path()).recursive(true).build()?;
    let dispatcher = RecordingDispatcher::new();

    let mut watcher = WatcherHandle::new(spec, Arc::new(dispatcher.clone()))?;
    watcher.start()?;
    assert_eq!(watcher.subscriptions(), &[dir.path().to_path_buf(), sub.clone()]);

    fs::write(sub.join("deep.txt"), "x")?;
    assert!(wait_until(PATIENCE, || basenames(&dispatcher).contains(&"deep.txt".to_string())).await);

    // The directory's own create event registers it before it is dispatched.
    let fresh = dir.path().join("fresh");
    fs::create_dir(&fresh)?;
    assert!(wait_until(PATIENCE, || basenames(&dispatcher).contains(&"fresh".to_string())).await);

    fs::write(fresh.join("inside.txt"), "y")?;
    assert!(wait_until(PATIENCE, || basenames(&dispatcher).contains(&"inside.txt".to_string())).await);

    with_timeout(watcher.stop()).await;
    Ok(())
}

#[tokio::test]
async fn non_recursive_watch_ignores_subdirectories() -> TestResult {
    init_tracing();
    let dir = tempfile::tempdir()?;
    let sub = dir.path().join("sub");
    fs::create_dir_all(&sub)?;

    let spec = create_spec(dir.path()).build()?;
    let dispatcher = RecordingDispatcher::new();

    let mut watcher = WatcherHandle::new(spec, Arc::new(dispatcher.clone()))?;
    watcher.start()?;

    fs::write(sub.join("deep.txt"), "x")?;
    fs::write(dir.path().join("top.txt"), "y")?;

    assert!(wait_until(PATIENCE, || dispatcher.count() >= 1).await);
    tokio::time::sleep(SETTLE).await;
    assert_eq!(basenames(&dispatcher), vec!["top.txt"]);

    with_timeout(watcher.stop()).await;
    Ok(())
}

#[tokio::test]
async fn accepted_events_are_forwarded() -> TestResult {
    init_tracing();
    let dir = tempfile::tempdir()?;
    let spec = create_spec(dir.path()).ignore("*.tmp").build()?;

    let mut watcher = WatcherHandle::new(spec, Arc::new(RecordingDispatcher::new()))?;
    let mut events = watcher.forward_events(16)?;
    watcher.start()?;

    // Forwarding can only be set up before start.
    assert!(matches!(
        watcher.forward_events(16),
        Err(WatchcmdError::InvalidState(_))
    ));

    fs::write(dir.path().join("skip.tmp"), "x")?;
    fs::write(dir.path().join("keep.txt"), "y")?;

    let event = with_timeout(events.recv()).await.ok_or("forwarding closed")?;
    assert_eq!(event.kind, EventKind::Create);
    assert_eq!(event.path, dir.path().join("keep.txt"));

    with_timeout(watcher.stop()).await;

    // The loop owned the only sender; the stream ends with it.
    assert!(with_timeout(events.recv()).await.is_none());
    Ok(())
}

/// Start a watcher on `root` that reads from a channel instead of inotify.
fn start_channel_watcher(
    root: &Path,
    policy: StreamClosedPolicy,
    dispatcher: &RecordingDispatcher,
) -> Result<(WatcherHandle, mpsc::UnboundedSender<notify::Event>), Box<dyn Error>> {
    let spec = create_spec(root).ignore("*.tmp").build()?;
    let options = WatcherOptions {
        on_stream_closed: policy,
        ..WatcherOptions::default()
    };
    let (event_tx, events) = mpsc::unbounded_channel();
    let (_error_tx, errors) = mpsc::unbounded_channel();
    let mut watcher = WatcherHandle::with_event_source(
        spec,
        Arc::new(dispatcher.clone()),
        options,
        events,
        errors,
    )?;
    watcher.start()?;
    Ok((watcher, event_tx))
}

fn created(path: impl Into<std::path::PathBuf>) -> notify::Event {
    notify::Event::new(NotifyKind::Create(CreateKind::File)).add_path(path.into())
}

#[tokio::test]
async fn closed_event_stream_stops_the_watcher_by_default() -> TestResult {
    init_tracing();
    let dir = tempfile::tempdir()?;
    let dispatcher = RecordingDispatcher::new();
    let (mut watcher, event_tx) =
        start_channel_watcher(dir.path(), StreamClosedPolicy::Stop, &dispatcher)?;
    assert_eq!(watcher.subscriptions(), &[dir.path().to_path_buf()]);

    event_tx.send(created(dir.path().join("skip.tmp")))?;
    event_tx.send(created(dir.path().join("keep.txt")))?;
    drop(event_tx);

    assert!(wait_until(PATIENCE, || watcher.state() == WatcherState::Stopped).await);
    assert_eq!(basenames(&dispatcher), vec!["keep.txt"]);

    with_timeout(watcher.stop()).await;
    assert_eq!(watcher.state(), WatcherState::Stopped);
    Ok(())
}

#[tokio::test]
async fn closed_event_stream_faults_the_watcher_under_fault_policy() -> TestResult {
    init_tracing();
    let dir = tempfile::tempdir()?;
    let dispatcher = RecordingDispatcher::new();
    let (mut watcher, event_tx) =
        start_channel_watcher(dir.path(), StreamClosedPolicy::Fault, &dispatcher)?;

    drop(event_tx);
    assert!(wait_until(PATIENCE, || watcher.state() == WatcherState::Faulted).await);

    // Faulted is terminal; stopping afterwards does not hide it.
    with_timeout(watcher.stop()).await;
    assert_eq!(watcher.state(), WatcherState::Faulted);
    assert_eq!(dispatcher.count(), 0);
    Ok(())
}
