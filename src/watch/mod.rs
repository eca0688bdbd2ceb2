// src/watch/mod.rs

//! File watching and change detection.
//!
//! This module is responsible for:
//! - Describing one watch session ([`WatchSpec`]) and deciding which events
//!   it cares about ([`filter`]).
//! - Expanding roots into concrete subscriptions ([`registrar`]).
//! - Wiring up a cross-platform filesystem watcher (`notify`) and running
//!   the event loop that dispatches commands ([`watcher`]).
//!
//! It does **not** know how commands are run; that is behind
//! [`crate::exec::Dispatcher`].

pub mod buffer;
pub mod event;
pub mod filter;
pub mod registrar;
pub mod spec;
pub mod watcher;

pub use buffer::EventBuffer;
pub use event::{kind_from_notify, FileEvent};
pub use filter::should_handle;
pub use registrar::compute_subscriptions;
pub use spec::{build_ignore_set, ExecPolicy, WatchSpec, WatchSpecBuilder};
pub use watcher::{WatcherHandle, WatcherOptions, WatcherState};
