//! Reader-writer gate that blocks new work during teardown.
//!
//! Every public entry point and every dispatched event acquires a read
//! hold for its duration; shutdown acquires the write hold exactly once.
//! Acquisition is non-blocking on the read side: if shutdown has started
//! (or is waiting to start), `try_read` fails fast instead of queuing
//! behind the writer.

use crate::error::TrackerError;
use std::sync::Arc;
use tokio::sync::{OwnedRwLockReadGuard, OwnedRwLockWriteGuard, RwLock};

pub struct BusyGate {
    lock: Arc<RwLock<()>>,
}

/// Held for the duration of one read-gated operation. Dropping it
/// releases the hold; every call site MUST let this drop on every exit
/// path (including early returns and `?`).
pub type ReadHold = OwnedRwLockReadGuard<()>;

impl BusyGate {
    pub fn new() -> Self {
        Self {
            lock: Arc::new(RwLock::new(())),
        }
    }

    /// Fails fast with `ShuttingDown` if a shutdown has started rather
    /// than waiting for it to finish.
    pub fn try_read(&self) -> Result<ReadHold, TrackerError> {
        Arc::clone(&self.lock)
            .try_read_owned()
            .map_err(|_| TrackerError::ShuttingDown)
    }

    /// Waits for every in-flight read hold to drop, then returns the
    /// write hold. The caller is expected to leak this guard: once
    /// shutdown starts it never ends, so no further read hold may ever
    /// succeed again.
    pub async fn close(&self) -> OwnedRwLockWriteGuard<()> {
        Arc::clone(&self.lock).write_owned().await
    }
}

impl Default for BusyGate {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn read_succeeds_before_shutdown() {
        let gate = BusyGate::new();
        assert!(gate.try_read().is_ok());
    }

    #[tokio::test]
    async fn read_fails_fast_once_closed() {
        let gate = BusyGate::new();
        let _write = gate.close().await;
        assert!(matches!(gate.try_read(), Err(TrackerError::ShuttingDown)));
    }

    #[tokio::test]
    async fn close_waits_for_in_flight_reads_to_drop() {
        let gate = BusyGate::new();
        let read = gate.try_read().unwrap();
        drop(read);
        // Once the read hold is released, close() must complete.
        let _write = gate.close().await;
    }
}
