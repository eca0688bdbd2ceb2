// tests/driver_state.rs

use std::error::Error;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use watchcmd::config::DriverSection;
use tokio::sync::mpsc;
use watchcmd::driver::{
    Driver, DriverState, TaskPhase, TaskState, STATE_FILE_NAME, STREAM_CLOSED_ERROR,
};
use watchcmd::errors::WatchcmdError;
use watchcmd::fs::mock::MockFileSystem;
use watchcmd::fs::FileSystem;
use watchcmd::types::StreamClosedPolicy;
use watchcmd::watch::{WatchSpec, WatcherHandle, WatcherState};
use watchcmd_test_utils::builders::TaskConfigBuilder;
use watchcmd_test_utils::recording_dispatcher::RecordingDispatcher;
use watchcmd_test_utils::{init_tracing, wait_until, with_timeout};

type TestResult = Result<(), Box<dyn Error>>;

const STATE_DIR: &str = "/state";

fn state_path() -> PathBuf {
    Path::new(STATE_DIR).join(STATE_FILE_NAME)
}

fn driver_section() -> DriverSection {
    DriverSection {
        state_dir: PathBuf::from(STATE_DIR),
        ..DriverSection::default()
    }
}

fn sample_task(id: &str) -> TaskState {
    let config = TaskConfigBuilder::new("make").paths(["/src"]).build();
    TaskState::running(id, config, Utc::now())
}

#[test]
fn put_task_persists_the_whole_document() -> TestResult {
    let fs = Arc::new(MockFileSystem::new());
    let mut state = DriverState::new(fs.clone(), Path::new(STATE_DIR));

    state.put_task(sample_task("one"))?;
    state.put_task(sample_task("two"))?;

    assert_eq!(state.path(), state_path().as_path());
    let json: serde_json::Value = serde_json::from_str(&fs.read_to_string(&state_path())?)?;
    assert_eq!(json["tasks"]["one"]["id"], "one");
    assert_eq!(json["tasks"]["one"]["status"], "running");
    assert_eq!(json["tasks"]["one"]["paths"][0], "/src");
    assert_eq!(json["tasks"]["one"]["events"][0], "create");
    assert_eq!(json["tasks"]["two"]["config"]["exec_command"], "make");
    assert!(json["tasks"]["one"].get("error").is_none());
    Ok(())
}

#[test]
fn failed_write_leaves_the_table_unchanged() -> TestResult {
    let fs = Arc::new(MockFileSystem::new());
    let mut state = DriverState::new(fs.clone(), Path::new(STATE_DIR));
    state.put_task(sample_task("one"))?;

    // A directory where the document should go makes every write fail.
    fs.remove(state_path());
    fs.add_dir(state_path());

    assert!(state.put_task(sample_task("two")).is_err());
    let mut replaced = sample_task("one");
    replaced.exit_code = 9;
    assert!(state.put_task(replaced).is_err());

    let ids: Vec<&str> = state.list_tasks().into_iter().map(|t| t.id.as_str()).collect();
    assert_eq!(ids, vec!["one"]);
    assert_eq!(state.get_task("one")?.exit_code, 0);
    Ok(())
}

#[test]
fn completion_and_status_updates() -> TestResult {
    let fs = Arc::new(MockFileSystem::new());
    let mut state = DriverState::new(fs, Path::new(STATE_DIR));
    state.put_task(sample_task("t"))?;

    state.update_status("t", TaskPhase::Running)?;
    state.record_completion("t", 2, Some("exit status 2".to_string()))?;

    let task = state.get_task("t")?;
    assert_eq!(task.status, TaskPhase::Completed);
    assert_eq!(task.exit_code, 2);
    assert_eq!(task.error.as_deref(), Some("exit status 2"));
    assert!(task.completed_at.is_some());
    Ok(())
}

#[test]
fn unknown_tasks_are_reported() -> TestResult {
    let fs = Arc::new(MockFileSystem::new());
    let mut state = DriverState::new(fs, Path::new(STATE_DIR));

    assert!(matches!(state.get_task("ghost"), Err(WatchcmdError::TaskNotFound(_))));
    assert!(matches!(
        state.update_status("ghost", TaskPhase::Completed),
        Err(WatchcmdError::TaskNotFound(_))
    ));
    assert!(matches!(
        state.record_completion("ghost", 0, None),
        Err(WatchcmdError::TaskNotFound(_))
    ));
    // Deleting something that is not there is fine.
    state.delete_task("ghost")?;
    Ok(())
}

#[test]
fn restore_reads_back_what_was_persisted() -> TestResult {
    let fs = Arc::new(MockFileSystem::new());

    let mut original = DriverState::new(fs.clone(), Path::new(STATE_DIR));
    original.put_task(sample_task("b"))?;
    original.put_task(sample_task("a"))?;
    original.record_completion("b", 0, None)?;
    original.delete_task("a")?;

    let mut restored = DriverState::new(fs, Path::new(STATE_DIR));
    restored.restore()?;

    let ids: Vec<&str> = restored.list_tasks().into_iter().map(|t| t.id.as_str()).collect();
    assert_eq!(ids, vec!["b"]);
    assert_eq!(restored.get_task("b")?, original.get_task("b")?);
    Ok(())
}

#[test]
fn restore_without_state_file_is_empty() -> TestResult {
    let fs = Arc::new(MockFileSystem::new());
    let mut state = DriverState::new(fs, Path::new(STATE_DIR));
    state.restore()?;
    assert!(state.list_tasks().is_empty());
    Ok(())
}

#[test]
fn restore_rejects_corrupt_state() {
    let fs = Arc::new(MockFileSystem::new());
    fs.add_file(state_path(), b"{ not json".to_vec());

    let mut state = DriverState::new(fs, Path::new(STATE_DIR));
    assert!(matches!(state.restore(), Err(WatchcmdError::JsonError(_))));
}

#[tokio::test]
async fn driver_task_lifecycle() -> TestResult {
    init_tracing();
    let dir = tempfile::tempdir()?;
    let fs = Arc::new(MockFileSystem::new());
    let mut driver = Driver::with_dispatcher(
        driver_section(),
        fs.clone(),
        Arc::new(RecordingDispatcher::new()),
    );

    let task = TaskConfigBuilder::new("true").paths([dir.path()]).build();
    driver.start_task("watch", task.clone())?;

    assert!(matches!(
        driver.start_task("watch", task),
        Err(WatchcmdError::TaskExists(_))
    ));
    assert_eq!(driver.list_tasks(), vec!["watch".to_string()]);

    let status = driver.inspect_task("watch")?;
    assert_eq!(status.state, WatcherState::Running);
    assert_eq!(status.subscriptions, 1);
    assert!(status.completed_at.is_none());
    assert_eq!(driver.state().get_task("watch")?.status, TaskPhase::Running);

    with_timeout(driver.stop_task("watch")).await?;
    let status = driver.inspect_task("watch")?;
    assert_eq!(status.state, WatcherState::Stopped);
    assert!(status.completed_at.is_some());
    assert_eq!(driver.state().get_task("watch")?.status, TaskPhase::Completed);

    // Stopping again changes nothing.
    with_timeout(driver.stop_task("watch")).await?;

    with_timeout(driver.destroy_task("watch")).await?;
    assert!(matches!(
        driver.inspect_task("watch"),
        Err(WatchcmdError::TaskNotFound(_))
    ));
    assert!(driver.state().list_tasks().is_empty());
    assert!(driver.list_tasks().is_empty());

    let json: serde_json::Value = serde_json::from_str(&fs.read_to_string(&state_path())?)?;
    assert_eq!(json["tasks"], serde_json::json!({}));
    Ok(())
}

#[tokio::test]
async fn driver_rejects_unknown_ids() {
    let fs = Arc::new(MockFileSystem::new());
    let mut driver = Driver::with_dispatcher(
        driver_section(),
        fs,
        Arc::new(RecordingDispatcher::new()),
    );

    assert!(matches!(driver.stop_task("nope").await, Err(WatchcmdError::TaskNotFound(_))));
    assert!(matches!(driver.destroy_task("nope").await, Err(WatchcmdError::TaskNotFound(_))));
    assert!(matches!(driver.inspect_task("nope"), Err(WatchcmdError::TaskNotFound(_))));
    assert!(matches!(driver.take_event_stream("nope"), Err(WatchcmdError::TaskNotFound(_))));
}

#[tokio::test]
async fn driver_validates_before_subscribing() {
    let fs = Arc::new(MockFileSystem::new());
    let mut driver = Driver::with_dispatcher(
        driver_section(),
        fs.clone(),
        Arc::new(RecordingDispatcher::new()),
    );

    let bad = TaskConfigBuilder::new("true").paths(Vec::<PathBuf>::new()).build();
    assert!(matches!(
        driver.start_task("bad", bad),
        Err(WatchcmdError::ConfigError(_))
    ));
    assert!(driver.list_tasks().is_empty());
    assert!(!fs.exists(&state_path()));
}

#[tokio::test]
async fn driver_enforces_max_watch_paths() -> TestResult {
    let dir = tempfile::tempdir()?;
    std::fs::create_dir_all(dir.path().join("a/b"))?;

    let fs = Arc::new(MockFileSystem::new());
    let mut driver = Driver::with_dispatcher(
        DriverSection {
            max_watch_paths: 2,
            ..driver_section()
        },
        fs,
        Arc::new(RecordingDispatcher::new()),
    );

    let task = TaskConfigBuilder::new("true")
        .paths([dir.path()])
        .recursive(true)
        .build();
    assert!(matches!(
        driver.start_task("deep", task),
        Err(WatchcmdError::TooManyPaths { count: 3, limit: 2 })
    ));
    assert!(driver.list_tasks().is_empty());
    assert!(driver.state().list_tasks().is_empty());
    Ok(())
}

#[cfg(target_os = "linux")]
#[tokio::test]
async fn stop_records_last_dispatch_result() -> TestResult {
    init_tracing();
    let dir = tempfile::tempdir()?;
    let fs = Arc::new(MockFileSystem::new());
    let mut driver = Driver::new(driver_section(), fs).with_event_forwarding(true);

    let task = TaskConfigBuilder::new("sh")
        .arg("-c")
        .arg("exit 4")
        .paths([dir.path()])
        .events(&["create"])
        .max_retries(0)
        .build();
    driver.start_task("failing", task)?;
    let mut events = driver
        .take_event_stream("failing")?
        .ok_or("forwarding not enabled")?;
    assert!(driver.take_event_stream("failing")?.is_none());

    std::fs::write(dir.path().join("trigger.txt"), "go")?;

    let forwarded = with_timeout(events.recv()).await.ok_or("stream closed")?;
    assert_eq!(forwarded.path, dir.path().join("trigger.txt"));

    assert!(
        wait_until(std::time::Duration::from_secs(5), || {
            matches!(driver.inspect_task("failing"), Ok(s) if s.last_outcome.is_some())
        })
        .await
    );

    with_timeout(driver.shutdown()).await;

    let recorded = driver.state().get_task("failing")?;
    assert_eq!(recorded.status, TaskPhase::Completed);
    assert_eq!(recorded.exit_code, 4);
    assert_eq!(recorded.error.as_deref(), Some("exit status 4"));
    Ok(())
}

#[tokio::test]
async fn start_task_is_not_recorded_when_state_cannot_be_written() -> TestResult {
    init_tracing();
    let dir = tempfile::tempdir()?;
    let fs = Arc::new(MockFileSystem::new());
    fs.add_dir(state_path());
    let mut driver =
        Driver::with_dispatcher(driver_section(), fs, Arc::new(RecordingDispatcher::new()));

    let task = TaskConfigBuilder::new("true").paths([dir.path()]).build();
    assert!(driver.start_task("unsaved", task).is_err());

    assert!(driver.list_tasks().is_empty());
    assert!(driver.state().list_tasks().is_empty());
    assert!(matches!(
        driver.inspect_task("unsaved"),
        Err(WatchcmdError::TaskNotFound(_))
    ));
    Ok(())
}

/// Start `id` on a watcher fed by a channel and return that channel's sender.
fn start_with_event_source(
    driver: &mut Driver,
    id: &str,
    root: &Path,
) -> Result<mpsc::UnboundedSender<notify::Event>, Box<dyn Error>> {
    let task = TaskConfigBuilder::new("true").paths([root]).build();
    let (event_tx, events) = mpsc::unbounded_channel();
    let (_error_tx, errors) = mpsc::unbounded_channel();
    let watcher = WatcherHandle::with_event_source(
        WatchSpec::try_from(&task)?,
        Arc::new(RecordingDispatcher::new()),
        driver.watcher_options(),
        events,
        errors,
    )?;
    driver.start_task_with(id, task, watcher)?;
    Ok(event_tx)
}

#[tokio::test]
async fn faulted_watcher_is_recorded_with_an_error() -> TestResult {
    init_tracing();
    let dir = tempfile::tempdir()?;
    let mut driver = Driver::with_dispatcher(
        DriverSection {
            on_stream_closed: StreamClosedPolicy::Fault,
            ..driver_section()
        },
        Arc::new(MockFileSystem::new()),
        Arc::new(RecordingDispatcher::new()),
    );

    let event_tx = start_with_event_source(&mut driver, "flaky", dir.path())?;
    assert_eq!(driver.state().get_task("flaky")?.status, TaskPhase::Running);

    drop(event_tx);
    assert!(
        wait_until(std::time::Duration::from_secs(5), || {
            matches!(driver.inspect_task("flaky"), Ok(s) if s.state == WatcherState::Faulted)
        })
        .await
    );

    with_timeout(driver.stop_task("flaky")).await?;
    assert_eq!(driver.inspect_task("flaky")?.state, WatcherState::Faulted);
    let recorded = driver.state().get_task("flaky")?;
    assert_eq!(recorded.status, TaskPhase::Completed);
    assert_eq!(recorded.error.as_deref(), Some(STREAM_CLOSED_ERROR));
    Ok(())
}

#[tokio::test]
async fn closed_stream_under_stop_policy_completes_cleanly() -> TestResult {
    init_tracing();
    let dir = tempfile::tempdir()?;
    let mut driver = Driver::with_dispatcher(
        driver_section(),
        Arc::new(MockFileSystem::new()),
        Arc::new(RecordingDispatcher::new()),
    );

    let event_tx = start_with_event_source(&mut driver, "quiet", dir.path())?;
    drop(event_tx);
    assert!(
        wait_until(std::time::Duration::from_secs(5), || {
            matches!(driver.inspect_task("quiet"), Ok(s) if s.state == WatcherState::Stopped)
        })
        .await
    );

    with_timeout(driver.stop_task("quiet")).await?;
    let recorded = driver.state().get_task("quiet")?;
    assert_eq!(recorded.status, TaskPhase::Completed);
    assert_eq!(recorded.exit_code, 0);
    assert_eq!(recorded.error, None);
    Ok(())
}
