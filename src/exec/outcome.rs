// src/exec/outcome.rs

use std::time::Duration;

use serde::Serialize;

/// Result of one dispatch (all attempts included).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExecutionOutcome {
    /// Exit code of the last attempt, if the process exited normally.
    pub exit_code: Option<i32>,
    /// Combined stdout/stderr of the last attempt.
    pub output: String,
    pub success: bool,
    /// Attempts made; `0` when no process was spawned.
    pub attempts: u32,
    /// Launch failure or timeout description.
    pub error: Option<String>,
}

impl ExecutionOutcome {
    /// Outcome for detection-only specs (empty command).
    pub fn skipped() -> Self {
        Self {
            exit_code: Some(0),
            output: String::new(),
            success: true,
            attempts: 0,
            error: None,
        }
    }

    pub fn exited(code: Option<i32>, success: bool, output: String) -> Self {
        let error = if success {
            None
        } else {
            Some(match code {
                Some(code) => format!("exit status {code}"),
                None => "terminated by signal".to_string(),
            })
        };
        Self {
            exit_code: code,
            output,
            success,
            attempts: 1,
            error,
        }
    }

    pub fn launch_failed(error: impl Into<String>) -> Self {
        Self {
            exit_code: None,
            output: String::new(),
            success: false,
            attempts: 1,
            error: Some(error.into()),
        }
    }

    pub fn timed_out(limit: Duration) -> Self {
        Self::launch_failed(format!("timed out after {}s", limit.as_secs_f64()))
    }

    /// Exit code for bookkeeping: `-1` when the process never exited normally.
    pub fn code_or_default(&self) -> i32 {
        self.exit_code.unwrap_or(-1)
    }
}
