//! Upstream capabilities consumed by the presence engine.
//!
//! The poller and the lease cache only see these traits; the RouterOS
//! implementations live in `crate::routeros` and tests substitute scripted
//! doubles.

use crate::model::{AssociationRecord, LeaseRecord};
use crate::routeros::codec::CodecError;

// =============================================================================
// ERROR
// =============================================================================

/// Failure talking to an upstream router. Always recoverable.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("not connected")]
    NotConnected,
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
    #[error("protocol error: {0}")]
    Protocol(#[from] CodecError),
    #[error("timed out after {0:?}")]
    Timeout(std::time::Duration),
    #[error("authentication failed: {0}")]
    Auth(String),
    #[error("command failed: {message}")]
    Trap { message: String },
    #[error("router closed the session: {0}")]
    Fatal(String),
}

// =============================================================================
// CAPABILITIES
// =============================================================================

/// Long-lived source of the association (registration) table.
#[async_trait::async_trait]
pub trait AssociationSource: Send {
    /// Establish (or re-establish) the upstream session.
    async fn connect(&mut self) -> Result<(), FetchError>;

    /// Fetch the current association rows in controller order.
    async fn fetch(&mut self) -> Result<Vec<AssociationRecord>, FetchError>;

    /// Tear down the session. Safe to call when already closed.
    async fn close(&mut self);
}

/// Source of the DHCP lease table.
#[async_trait::async_trait]
pub trait LeaseSource: Send + Sync {
    async fn fetch_leases(&self) -> Result<Vec<LeaseRecord>, FetchError>;
}
