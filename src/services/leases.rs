//! Lease cache — periodically refreshed DHCP lease table.
//!
//! DESIGN
//! ======
//! The table lives behind `RwLock<Arc<LeaseTable>>`. A refresh fetches and
//! builds the new table with no lock held, then takes the write lock only
//! for the pointer swap, so lookups are never stalled behind a slow router
//! and never observe a half-built table.
//!
//! ERROR HANDLING
//! ==============
//! A failed refresh leaves the previous table untouched. The refresh task
//! logs the failure and tries again on the next tick; nothing downstream
//! ever sees the error.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::model::{LeaseRecord, normalize_mac};
use crate::source::{FetchError, LeaseSource};

/// Leases keyed by normalized hardware address.
pub type LeaseTable = HashMap<String, LeaseRecord>;

#[derive(Default)]
pub struct LeaseCache {
    table: RwLock<Arc<LeaseTable>>,
}

impl LeaseCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the whole table. Returns the number of distinct addresses.
    ///
    /// When a hardware address appears more than once (several DHCP
    /// servers), the first lease wins.
    pub async fn replace(&self, leases: Vec<LeaseRecord>) -> usize {
        let mut table = LeaseTable::with_capacity(leases.len());
        for mut lease in leases {
            lease.mac = normalize_mac(&lease.mac);
            if lease.mac.is_empty() {
                continue;
            }
            table.entry(lease.mac.clone()).or_insert(lease);
        }
        let count = table.len();
        *self.table.write().await = Arc::new(table);
        count
    }

    /// Fetch from `source` and swap the table in on success.
    ///
    /// # Errors
    ///
    /// Returns the fetch error; the cached table is left as it was.
    pub async fn refresh(&self, source: &dyn LeaseSource) -> Result<usize, FetchError> {
        let leases = source.fetch_leases().await?;
        Ok(self.replace(leases).await)
    }

    /// The whole current table. Holding the returned `Arc` pins one
    /// consistent table for as long as the caller needs it.
    pub async fn table(&self) -> Arc<LeaseTable> {
        self.table.read().await.clone()
    }

    #[cfg(test)]
    pub async fn lookup(&self, mac: &str) -> Option<LeaseRecord> {
        self.table.read().await.get(&normalize_mac(mac)).cloned()
    }

    pub async fn len(&self) -> usize {
        self.table.read().await.len()
    }
}

/// Spawn the refresh loop. The first refresh runs immediately.
pub fn spawn_lease_refresh_task(
    cache: Arc<LeaseCache>,
    source: Arc<dyn LeaseSource>,
    period: Duration,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    info!(period = %humantime::format_duration(period), "lease refresh configured");
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }
            match cache.refresh(source.as_ref()).await {
                Ok(count) => debug!(count, "lease table reloaded"),
                Err(e) => error!(error = %e, "lease refresh failed; keeping previous table"),
            }
        }
        debug!("lease refresh task stopped");
    })
}

#[cfg(test)]
#[path = "leases_test.rs"]
mod tests;
