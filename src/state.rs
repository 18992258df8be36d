//! Shared application state.
//!
//! DESIGN
//! ======
//! `AppState` is injected into Axum handlers via the `State` extractor.
//! Handlers only read: the snapshot publisher for the current presence blob
//! and the lease cache for health reporting. Every writer lives in a
//! background task spawned by `main`.

use std::sync::Arc;

use crate::services::leases::LeaseCache;
use crate::services::snapshot::SnapshotPublisher;

#[derive(Clone)]
pub struct AppState {
    pub snapshot: Arc<SnapshotPublisher>,
    pub leases: Arc<LeaseCache>,
}

impl AppState {
    #[must_use]
    pub fn new(snapshot: Arc<SnapshotPublisher>, leases: Arc<LeaseCache>) -> Self {
        Self { snapshot, leases }
    }
}
