//! Association poller — fixed-interval fetch with reconnect-forever.
//!
//! LIFECYCLE
//! =========
//! 1. Connect through the reconnect loop, so an unreachable controller at
//!    startup is retried instead of failing the process.
//! 2. Fetch, hand the rows to the reconciler, sleep `interval`, repeat.
//! 3. On any fetch error: close the session, sleep `backoff`, reconnect.
//!    Each failed attempt is logged and retried indefinitely; after a
//!    successful reconnect the next poll runs immediately.
//!
//! The cancellation token is only fired on process shutdown. It is checked
//! at each sleep and each fetch boundary.

use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::services::reconcile::Reconciler;
use crate::source::AssociationSource;

/// Sleep between reconnect attempts.
pub const RECONNECT_BACKOFF: Duration = Duration::from_secs(5);

pub struct AssociationPoller<S> {
    source: S,
    reconciler: Reconciler,
    interval: Duration,
    backoff: Duration,
}

/// Sleep for `period` unless cancelled first. Returns `false` on cancel.
async fn sleep_or_cancel(period: Duration, cancel: &CancellationToken) -> bool {
    tokio::select! {
        biased;
        () = cancel.cancelled() => false,
        () = tokio::time::sleep(period) => true,
    }
}

impl<S: AssociationSource> AssociationPoller<S> {
    #[must_use]
    pub fn new(source: S, reconciler: Reconciler, interval: Duration) -> Self {
        Self { source, reconciler, interval, backoff: RECONNECT_BACKOFF }
    }

    #[must_use]
    pub fn with_backoff(mut self, backoff: Duration) -> Self {
        self.backoff = backoff;
        self
    }

    /// Retry `connect` every `backoff` until it succeeds. Returns `false`
    /// if cancelled first.
    async fn reconnect(&mut self, cancel: &CancellationToken) -> bool {
        let mut attempt: u64 = 0;
        loop {
            if !sleep_or_cancel(self.backoff, cancel).await {
                return false;
            }
            attempt += 1;
            match self.source.connect().await {
                Ok(()) => {
                    warn!(attempts = attempt, "poller: reconnected");
                    return true;
                }
                Err(e) => error!(attempt, error = %e, "poller: connect failed"),
            }
        }
    }

    async fn connect_initial(&mut self, cancel: &CancellationToken) -> bool {
        match self.source.connect().await {
            Ok(()) => {
                info!("poller: connected");
                true
            }
            Err(e) => {
                error!(error = %e, "poller: connect failed");
                self.reconnect(cancel).await
            }
        }
    }

    /// Drive the loop until `cancel` fires.
    pub async fn run(mut self, cancel: CancellationToken) {
        info!(interval = %humantime::format_duration(self.interval), "poller: starting");
        if self.connect_initial(&cancel).await {
            loop {
                let fetched = tokio::select! {
                    biased;
                    () = cancel.cancelled() => break,
                    fetched = self.source.fetch() => fetched,
                };
                match fetched {
                    Ok(rows) => {
                        debug!(rows = rows.len(), "poller: fetched");
                        // Errors are logged inside; the previous state stands.
                        let _ = self.reconciler.reconcile(rows).await;
                        if !sleep_or_cancel(self.interval, &cancel).await {
                            break;
                        }
                    }
                    Err(e) => {
                        error!(error = %e, "poller: fetch failed; reconnecting");
                        self.source.close().await;
                        if !self.reconnect(&cancel).await {
                            break;
                        }
                    }
                }
            }
        }
        self.source.close().await;
        debug!("poller: stopped");
    }
}

/// Spawn the poll loop on its own task.
pub fn spawn_poller_task<S>(poller: AssociationPoller<S>, cancel: CancellationToken) -> JoinHandle<()>
where
    S: AssociationSource + 'static,
{
    tokio::spawn(poller.run(cancel))
}

#[cfg(test)]
#[path = "poller_test.rs"]
mod tests;
