//! Snapshot publisher — the single published presence blob.
//!
//! DESIGN
//! ======
//! The published state is an immutable `Arc<Snapshot>` held in a
//! `tokio::sync::watch` channel. The channel's internal read/write lock is
//! the only lock: `publish` swaps the whole `Arc` in one write, so a reader
//! always gets the ordered records, their serialized form and the timestamp
//! they were published with in a single read. Push clients subscribe to the channel and are woken on
//! every publish instead of polling.
//!
//! ERROR HANDLING
//! ==============
//! Serialization happens before the swap. If it fails the previous snapshot
//! stays visible and the caller skips the cycle.

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use tokio::sync::watch;

use crate::model::PresenceRecord;

#[derive(Debug, thiserror::Error)]
#[error("snapshot serialization failed: {0}")]
pub struct SerializationError(#[from] serde_json::Error);

/// One published, self-consistent view of all associated clients.
#[derive(Debug, Clone)]
pub struct Snapshot {
    /// Published records in poll order.
    pub records: Arc<[PresenceRecord]>,
    /// JSON array of `records`.
    pub data: Arc<str>,
    /// Milliseconds since Unix epoch of the last publish; `0` until the
    /// first successful poll. Never decreases.
    pub last_update: i64,
    /// Number of records.
    pub count: usize,
}

impl Snapshot {
    fn empty() -> Self {
        Self { records: Arc::from(Vec::new()), data: Arc::from("[]"), last_update: 0, count: 0 }
    }

    /// Whether anything has been published yet.
    #[must_use]
    pub fn is_published(&self) -> bool {
        self.last_update > 0
    }
}

pub struct SnapshotPublisher {
    tx: watch::Sender<Arc<Snapshot>>,
}

impl Default for SnapshotPublisher {
    fn default() -> Self {
        Self::new()
    }
}

fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .ok()
        .and_then(|d| i64::try_from(d.as_millis()).ok())
        .unwrap_or(0)
}

impl SnapshotPublisher {
    #[must_use]
    pub fn new() -> Self {
        let (tx, _) = watch::channel(Arc::new(Snapshot::empty()));
        Self { tx }
    }

    /// Consistent point-in-time read.
    #[must_use]
    pub fn current(&self) -> Arc<Snapshot> {
        self.tx.borrow().clone()
    }

    /// Receiver woken on every publish.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<Arc<Snapshot>> {
        self.tx.subscribe()
    }

    /// Serialize `records` and atomically replace the published snapshot.
    /// Returns the new timestamp.
    ///
    /// # Errors
    ///
    /// Returns [`SerializationError`] without touching the published state.
    pub fn publish(&self, records: &[&PresenceRecord]) -> Result<i64, SerializationError> {
        let data = serde_json::to_string(records)?;
        let owned: Arc<[PresenceRecord]> = records.iter().map(|&r| r.clone()).collect();
        let mut stamped = 0;
        self.tx.send_modify(|current| {
            // EDGE: wall clock may step backwards; the timestamp may not.
            stamped = now_ms().max(current.last_update.saturating_add(1));
            *current = Arc::new(Snapshot {
                count: owned.len(),
                records: owned,
                data: Arc::from(data),
                last_update: stamped,
            });
        });
        Ok(stamped)
    }
}

#[cfg(test)]
#[path = "snapshot_test.rs"]
mod tests;
