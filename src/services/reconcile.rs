//! State reconciler — enrich, diff, publish, emit.
//!
//! DESIGN
//! ======
//! One `Reconciler` is owned by the poll loop, so the previous keyed state
//! needs no lock: cycle N+1 cannot start its diff until cycle N has returned
//! from [`Reconciler::reconcile`]. Per cycle:
//!
//! 1. Enrich every association row from one lease table, taken once per
//!    cycle, and the device directory. Missing matches leave fields empty.
//! 2. Key the rows by normalized MAC in poll order. A duplicate MAC keeps
//!    its first position and takes the last-seen values.
//! 3. Diff against the previous state.
//! 4. Publish the new ordered sequence.
//! 5. Swap the new state in and hand the events off.
//!
//! ERROR HANDLING
//! ==============
//! A serialization failure aborts the cycle at step 4. The computed events
//! are discarded, the previous snapshot stays visible and the previous keyed
//! state stays the diff base.
//!
//! Event hand-off uses `try_send` on a bounded queue. A full or closed queue
//! drops the event with a warning instead of stalling the poll loop.

use std::sync::Arc;

use indexmap::IndexMap;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, error, warn};

use crate::model::{AssociationRecord, PresenceEvent, PresenceRecord, normalize_mac};
use crate::services::directory::DeviceDirectory;
use crate::services::leases::{LeaseCache, LeaseTable};
use crate::services::snapshot::{SerializationError, SnapshotPublisher};

/// Presence state keyed by normalized MAC, in poll order.
pub type PresenceState = IndexMap<String, PresenceRecord>;

// =============================================================================
// DIFF
// =============================================================================

/// Events for the transition `old -> new`.
///
/// Connects, roams and level changes come first in `new` order, then
/// disconnects in `old` order. Roam and level change are independent
/// checks and may both fire for one key. Signals compare as strings.
#[must_use]
pub fn diff(old: &PresenceState, new: &PresenceState) -> Vec<PresenceEvent> {
    let mut events = Vec::new();
    for (mac, current) in new {
        let Some(previous) = old.get(mac) else {
            events.push(PresenceEvent::Connect { new: current.clone() });
            continue;
        };
        if previous.interface != current.interface {
            events.push(PresenceEvent::Roam { old: previous.clone(), new: current.clone() });
        }
        if previous.signal != current.signal {
            events.push(PresenceEvent::LevelChange { old: previous.clone(), new: current.clone() });
        }
    }
    for (mac, previous) in old {
        if !new.contains_key(mac) {
            events.push(PresenceEvent::Disconnect { old: previous.clone() });
        }
    }
    events
}

// =============================================================================
// RECONCILER
// =============================================================================

pub struct Reconciler {
    leases: Arc<LeaseCache>,
    directory: Arc<DeviceDirectory>,
    publisher: Arc<SnapshotPublisher>,
    events: mpsc::Sender<PresenceEvent>,
    previous: PresenceState,
}

impl Reconciler {
    #[must_use]
    pub fn new(
        leases: Arc<LeaseCache>,
        directory: Arc<DeviceDirectory>,
        publisher: Arc<SnapshotPublisher>,
        events: mpsc::Sender<PresenceEvent>,
    ) -> Self {
        Self { leases, directory, publisher, events, previous: PresenceState::new() }
    }

    /// State published by the last successful cycle.
    #[cfg(test)]
    #[must_use]
    pub fn previous(&self) -> &PresenceState {
        &self.previous
    }

    fn enrich(&self, leases: &LeaseTable, row: AssociationRecord) -> PresenceRecord {
        let mac = normalize_mac(&row.mac);
        let lease = leases.get(&mac).cloned().unwrap_or_default();
        let name = self
            .directory
            .get(&mac)
            .map(|device| device.name.clone())
            .unwrap_or_default();
        PresenceRecord {
            ip: lease.address,
            name,
            interface: row.interface,
            ssid: row.ssid,
            mac,
            signal: row.signal,
            hostname: lease.hostname,
            comment: lease.comment,
        }
    }

    /// Enrich and key one poll's rows.
    pub async fn build_state(&self, rows: Vec<AssociationRecord>) -> PresenceState {
        let leases = self.leases.table().await;
        let mut state = PresenceState::with_capacity(rows.len());
        for row in rows {
            let record = self.enrich(&leases, row);
            if record.mac.is_empty() {
                warn!(interface = %record.interface, "reconcile: association row without mac; skipped");
                continue;
            }
            // insert() keeps the first position for an existing key.
            state.insert(record.mac.clone(), record);
        }
        state
    }

    /// Run one cycle. Returns the number of events handed to the dispatcher.
    ///
    /// # Errors
    ///
    /// Returns [`SerializationError`] when the snapshot cannot be encoded;
    /// nothing is published, no events are sent and the previous state is kept.
    pub async fn reconcile(&mut self, rows: Vec<AssociationRecord>) -> Result<usize, SerializationError> {
        let state = self.build_state(rows).await;
        let events = diff(&self.previous, &state);

        let records: Vec<&PresenceRecord> = state.values().collect();
        let last_update = match self.publisher.publish(&records) {
            Ok(ts) => ts,
            Err(e) => {
                error!(error = %e, dropped = events.len(), "reconcile: publish failed; keeping previous snapshot");
                return Err(e);
            }
        };

        self.previous = state;
        debug!(clients = self.previous.len(), events = events.len(), last_update, "reconcile: cycle published");

        let mut sent = 0;
        for event in events {
            match self.events.try_send(event) {
                Ok(()) => sent += 1,
                Err(TrySendError::Full(event)) => {
                    warn!(kind = event.kind().as_str(), mac = %event.mac(), "reconcile: event queue full; event dropped");
                }
                Err(TrySendError::Closed(event)) => {
                    warn!(kind = event.kind().as_str(), mac = %event.mac(), "reconcile: event queue closed; event dropped");
                }
            }
        }
        Ok(sent)
    }
}

#[cfg(test)]
#[path = "reconcile_test.rs"]
mod tests;
