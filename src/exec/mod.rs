// src/exec/mod.rs

//! Process execution layer.
//!
//! - [`backend`] provides the `Dispatcher` trait and the production
//!   `CommandDispatcher`.
//! - [`command`] builds the child environment and runs the command with
//!   timeout and retries, capturing combined output.
//! - [`outcome`] holds `ExecutionOutcome`.

pub mod backend;
pub mod command;
pub mod outcome;

pub use backend::{CommandDispatcher, Dispatcher};
pub use command::{build_environment, run_command, ENV_EVENT_OP, ENV_EVENT_PATH};
pub use outcome::ExecutionOutcome;
