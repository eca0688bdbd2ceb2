// src/watch/buffer.rs

//! Bounded, non-blocking forwarding of accepted events.
//!
//! The watch loop must never stall on a slow consumer, so a full buffer
//! drops the new event and reports [`WatchcmdError::BufferFull`].

use tokio::sync::mpsc;

use crate::errors::{Result, WatchcmdError};
use crate::watch::event::FileEvent;

/// Producer side of the forwarding buffer.
#[derive(Debug, Clone)]
pub struct EventBuffer {
    tx: mpsc::Sender<FileEvent>,
}

impl EventBuffer {
    /// Create a buffer holding at most `capacity` events (minimum 1).
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<FileEvent>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx }, rx)
    }

    /// Enqueue without waiting.
    ///
    /// A closed receiver is not an error: nobody is listening any more, so
    /// the event is simply discarded.
    pub fn push(&self, event: FileEvent) -> Result<()> {
        match self.tx.try_send(event) {
            Ok(()) => Ok(()),
            Err(mpsc::error::TrySendError::Full(_)) => Err(WatchcmdError::BufferFull),
            Err(mpsc::error::TrySendError::Closed(_)) => Ok(()),
        }
    }
}
