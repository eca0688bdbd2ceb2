// src/config/mod.rs

//! Configuration loading and validation for watchcmd.
//!
//! Responsibilities:
//! - Define the TOML-backed data model (`model.rs`).
//! - Load a config file from disk (`loader.rs`).
//! - Merge `[default]` into tasks and validate them (`validate.rs`).

pub mod loader;
pub mod model;
pub mod validate;

pub use loader::{load_and_validate, load_from_path};
pub use model::{ConfigFile, DriverSection, RawConfigFile, TaskConfig};
