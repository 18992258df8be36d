//! Presence engine services.
//!
//! ARCHITECTURE
//! ============
//! `poller` drives `reconcile`, which reads `leases` and `directory`,
//! publishes through `snapshot`, and queues events for `dispatch`.
//! `dispatch` hands configured notifications to `webhook`. Route handlers
//! only read the published snapshot.

pub mod directory;
pub mod dispatch;
pub mod leases;
pub mod poller;
pub mod reconcile;
pub mod snapshot;
pub mod webhook;
