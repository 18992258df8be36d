//! Presence data model — raw upstream rows, enriched records, and events.
//!
//! DESIGN
//! ======
//! Hardware addresses are the reconciliation key everywhere. They are
//! normalized with [`normalize_mac`] at every boundary (lease table, device
//! directory, association rows) so lookups never depend on the casing a
//! particular router build happens to emit.
//!
//! `PresenceRecord` is also the wire format of the published snapshot; its
//! serde field names and declaration order are the JSON contract consumed
//! by push clients.

use serde::{Deserialize, Serialize};

/// Normalize a hardware address into the canonical key form.
#[must_use]
pub fn normalize_mac(mac: &str) -> String {
    mac.trim().to_ascii_uppercase()
}

// =============================================================================
// UPSTREAM ROWS
// =============================================================================

/// One DHCP lease, keyed by hardware address in the lease cache.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LeaseRecord {
    pub address: String,
    pub mac: String,
    pub server: String,
    pub hostname: String,
    pub comment: String,
}

/// One row of the controller's registration table for a single poll.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AssociationRecord {
    pub interface: String,
    pub ssid: String,
    pub mac: String,
    pub signal: String,
}

// =============================================================================
// PRESENCE RECORD
// =============================================================================

/// Enriched, canonical unit of presence state.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PresenceRecord {
    #[serde(rename = "IP")]
    pub ip: String,
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "Interface")]
    pub interface: String,
    #[serde(rename = "SSID")]
    pub ssid: String,
    #[serde(rename = "MAC")]
    pub mac: String,
    #[serde(rename = "Signal")]
    pub signal: String,
    #[serde(rename = "Hostname")]
    pub hostname: String,
    #[serde(rename = "Comment")]
    pub comment: String,
}

// =============================================================================
// EVENTS
// =============================================================================

/// Transition category, also used to pick a device's notification rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Connect,
    Disconnect,
    Roam,
    LevelChange,
}

impl EventKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Connect => "connect",
            Self::Disconnect => "disconnect",
            Self::Roam => "roaming",
            Self::LevelChange => "level",
        }
    }
}

/// A state transition detected between two consecutive polls.
///
/// Each variant carries exactly the records that make sense for it, so a
/// connect without a new record cannot be constructed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PresenceEvent {
    Connect { new: PresenceRecord },
    Disconnect { old: PresenceRecord },
    Roam { old: PresenceRecord, new: PresenceRecord },
    LevelChange { old: PresenceRecord, new: PresenceRecord },
}

impl PresenceEvent {
    #[must_use]
    pub fn kind(&self) -> EventKind {
        match self {
            Self::Connect { .. } => EventKind::Connect,
            Self::Disconnect { .. } => EventKind::Disconnect,
            Self::Roam { .. } => EventKind::Roam,
            Self::LevelChange { .. } => EventKind::LevelChange,
        }
    }

    /// Hardware address the event is about. Disconnects resolve on the old
    /// record, everything else on the new one.
    #[must_use]
    pub fn mac(&self) -> &str {
        match self {
            Self::Disconnect { old } => &old.mac,
            Self::Connect { new } | Self::Roam { new, .. } | Self::LevelChange { new, .. } => &new.mac,
        }
    }
}

#[cfg(test)]
#[path = "model_test.rs"]
mod tests;
