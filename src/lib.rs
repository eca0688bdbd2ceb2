// src/lib.rs

pub mod cli;
pub mod config;
pub mod driver;
pub mod errors;
pub mod exec;
pub mod fs;
pub mod logging;
pub mod types;
pub mod watch;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::cli::CliArgs;
use crate::config::loader::load_and_validate;
use crate::config::model::{ConfigFile, TaskConfig};
use crate::driver::Driver;
use crate::errors::WatchcmdError;
use crate::fs::{FileSystem, RealFileSystem};
use crate::watch::FileEvent;

/// High-level entry point used by `main.rs`.
///
/// This wires together:
/// - config loading
/// - the task driver (one watcher per task)
/// - optional event printing
/// - Ctrl-C handling
pub async fn run(args: CliArgs) -> Result<()> {
    let config_path = PathBuf::from(&args.config);
    let cfg = load_and_validate(&config_path)?;

    if args.dry_run {
        print_dry_run(&cfg);
        return Ok(());
    }

    if !cfg.driver.enabled {
        info!("driver disabled by [driver].enabled = false; nothing to do");
        return Ok(());
    }

    let selected = select_tasks(&cfg, args.task.as_deref())?;

    let fs: Arc<dyn FileSystem> = Arc::new(RealFileSystem);
    let mut driver =
        Driver::new(cfg.driver.clone(), fs).with_event_forwarding(args.print_events);

    if let Err(err) = driver.restore() {
        warn!(error = %err, "ignoring unreadable driver state");
    }

    for (name, task) in selected {
        if let Err(err) = driver.start_task(name, task.clone()) {
            driver.shutdown().await;
            return Err(err).with_context(|| format!("starting task '{name}'"));
        }
        if let Some(rx) = driver.take_event_stream(name)? {
            spawn_event_printer(name.to_string(), rx);
        }
    }

    info!(tasks = ?driver.list_tasks(), "watching; press Ctrl+C to stop");

    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "failed to listen for Ctrl+C; shutting down");
    } else {
        info!("Ctrl+C received; shutting down");
    }

    driver.shutdown().await;
    Ok(())
}

/// Tasks to start: all of them, or just `only` if given.
fn select_tasks<'a>(
    cfg: &'a ConfigFile,
    only: Option<&str>,
) -> std::result::Result<Vec<(&'a str, &'a TaskConfig)>, WatchcmdError> {
    match only {
        Some(name) => cfg
            .task
            .get_key_value(name)
            .map(|(k, v)| vec![(k.as_str(), v)])
            .ok_or_else(|| WatchcmdError::TaskNotFound(name.to_string())),
        None => Ok(cfg.task.iter().map(|(k, v)| (k.as_str(), v)).collect()),
    }
}

/// Print forwarded events of one task as JSON lines on stdout.
fn spawn_event_printer(task: String, mut rx: mpsc::Receiver<FileEvent>) {
    tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            println!("{event}");
        }
        debug!(task = %task, "event stream closed");
    });
}

/// Simple dry-run output: print driver settings and tasks.
fn print_dry_run(cfg: &ConfigFile) {
    println!("watchcmd dry-run");
    println!("  driver.enabled = {}", cfg.driver.enabled);
    println!("  driver.state_dir = {}", cfg.driver.state_dir.display());
    println!("  driver.max_watch_paths = {}", cfg.driver.max_watch_paths);
    println!("  driver.event_buffer_size = {}", cfg.driver.event_buffer_size);
    println!("  driver.on_stream_closed = {:?}", cfg.driver.on_stream_closed);
    println!();

    println!("tasks ({}):", cfg.task.len());
    for (name, task) in cfg.task.iter() {
        println!("  - {name}");
        println!("      cmd: {} {}", task.exec_command, task.exec_args.join(" "));
        println!("      paths: {:?}", task.paths);
        println!("      events: {:?}", task.events);
        if task.recursive_watch {
            println!("      recursive_watch: true");
        }
        if !task.ignore_patterns.is_empty() {
            println!("      ignore_patterns: {:?}", task.ignore_patterns);
        }
        if !task.environment.is_empty() {
            println!("      environment: {:?}", task.environment);
        }
        match task.effective_timeout() {
            Some(limit) => println!("      timeout: {}s", limit.as_secs()),
            None => println!("      timeout: none"),
        }
        println!(
            "      retries: {} every {}s",
            task.effective_max_retries(),
            task.effective_retry_interval().as_secs()
        );
    }

    debug!("dry-run complete (nothing watched)");
}
