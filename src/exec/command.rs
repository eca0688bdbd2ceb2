// src/exec/command.rs

//! Running the configured command for one event.

use std::collections::BTreeMap;
use std::ffi::OsString;
use std::process::Stdio;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::exec::outcome::ExecutionOutcome;
use crate::watch::event::FileEvent;
use crate::watch::spec::WatchSpec;

/// Environment variable carrying the event's path.
pub const ENV_EVENT_PATH: &str = "WATCHER_EVENT_PATH";
/// Environment variable carrying the event's kind (`create`, `modify`, ...).
pub const ENV_EVENT_OP: &str = "WATCHER_EVENT_OP";

/// Full environment for the child process.
///
/// Inherited environment, then the two event variables, then the watch spec's
/// own variables; later entries override earlier ones.
pub fn build_environment(event: &FileEvent, spec: &WatchSpec) -> BTreeMap<OsString, OsString> {
    let mut env: BTreeMap<OsString, OsString> = std::env::vars_os().collect();
    env.insert(ENV_EVENT_PATH.into(), event.path.clone().into_os_string());
    env.insert(ENV_EVENT_OP.into(), event.kind.as_str().into());
    for (k, v) in spec.environment() {
        env.insert(k.into(), v.into());
    }
    env
}

/// Run the watch spec's command for `event`, honouring its timeout and retries.
///
/// Never fails: launch errors, non-zero exits and timeouts all end up in
/// the returned outcome.
pub async fn run_command(event: &FileEvent, spec: &WatchSpec) -> ExecutionOutcome {
    if spec.command().is_empty() {
        debug!(path = ?event.path, "no command configured; detection only");
        return ExecutionOutcome::skipped();
    }

    let policy = spec.policy();
    let mut attempt: u32 = 0;

    loop {
        attempt += 1;
        let mut outcome = run_attempt(event, spec, policy.timeout).await;
        outcome.attempts = attempt;

        if outcome.success || attempt > policy.max_retries {
            return outcome;
        }

        warn!(
            cmd = %spec.command(),
            attempt,
            max_retries = policy.max_retries,
            error = ?outcome.error,
            "command failed; retrying in {:?}",
            policy.retry_interval
        );
        tokio::time::sleep(policy.retry_interval).await;
    }
}

async fn run_attempt(
    event: &FileEvent,
    spec: &WatchSpec,
    timeout: Option<Duration>,
) -> ExecutionOutcome {
    let result = match timeout {
        Some(limit) => match tokio::time::timeout(limit, run_attempt_inner(event, spec)).await {
            Ok(result) => result,
            Err(_) => {
                // The child is killed when its future is dropped (kill_on_drop).
                warn!(cmd = %spec.command(), ?limit, "command timed out; killed");
                return ExecutionOutcome::timed_out(limit);
            }
        },
        None => run_attempt_inner(event, spec).await,
    };

    result.unwrap_or_else(|err| ExecutionOutcome::launch_failed(format!("{err:#}")))
}

async fn run_attempt_inner(event: &FileEvent, spec: &WatchSpec) -> Result<ExecutionOutcome> {
    info!(
        cmd = %spec.command(),
        args = ?spec.args(),
        path = ?event.path,
        kind = %event.kind,
        "starting command"
    );

    let mut cmd = Command::new(spec.command());
    cmd.args(spec.args())
        .env_clear()
        .envs(build_environment(event, spec))
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let mut child = cmd
        .spawn()
        .with_context(|| format!("spawning command '{}'", spec.command()))?;

    // Both pipes feed one channel so the output keeps arrival order.
    let (line_tx, mut line_rx) = mpsc::unbounded_channel::<String>();
    if let Some(stdout) = child.stdout.take() {
        forward_lines(stdout, line_tx.clone());
    }
    if let Some(stderr) = child.stderr.take() {
        forward_lines(stderr, line_tx.clone());
    }
    drop(line_tx);

    let mut output = String::new();
    while let Some(line) = line_rx.recv().await {
        output.push_str(&line);
        output.push('\n');
    }

    let status = child
        .wait()
        .await
        .with_context(|| format!("waiting for command '{}'", spec.command()))?;

    Ok(ExecutionOutcome::exited(status.code(), status.success(), output))
}

fn forward_lines<R>(reader: R, tx: mpsc::UnboundedSender<String>)
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut segments = BufReader::new(reader).split(b'\n');
        while let Ok(Some(segment)) = segments.next_segment().await {
            let line = String::from_utf8_lossy(&segment);
            if tx.send(line.trim_end_matches('\r').to_string()).is_err() {
                break;
            }
        }
    });
}
