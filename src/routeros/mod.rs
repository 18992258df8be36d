//! RouterOS-backed upstream sources.
//!
//! SYSTEM CONTEXT
//! ==============
//! The association table comes from a CAPsMAN controller (or a standalone
//! wireless router) over one long-lived API session owned by the poller.
//! The DHCP lease table usually lives on a different router and is read
//! with a short-lived session per refresh.

pub mod client;
pub mod codec;

use std::time::Duration;

use tracing::debug;

use crate::config::{RouterConfig, RouterMode};
use crate::model::{AssociationRecord, LeaseRecord};
use crate::source::{AssociationSource, FetchError, LeaseSource};
use client::RouterOsClient;
use codec::Row;

pub const LEASE_PRINT: &str = "/ip/dhcp-server/lease/print";

impl RouterMode {
    /// Registration-table print command for this controller mode.
    #[must_use]
    pub fn command(self) -> &'static str {
        match self {
            Self::CapsMan => "/caps-man/registration-table/print",
            Self::Wifi => "/interface/wireless/registration-table/print",
        }
    }

    /// Extract the signal value for this mode. Wireless mode reports
    /// `signal-strength` as `-63@6Mbps`; only the part before `@` is kept.
    #[must_use]
    pub fn signal(self, row: &Row) -> String {
        match self {
            Self::CapsMan => field(row, "rx-signal"),
            Self::Wifi => {
                let raw = field(row, "signal-strength");
                match raw.find('@') {
                    Some(i) if i > 0 => raw[..i].to_owned(),
                    _ => raw,
                }
            }
        }
    }
}

fn field(row: &Row, key: &str) -> String {
    row.get(key).cloned().unwrap_or_default()
}

#[must_use]
pub fn association_from_row(row: &Row, mode: RouterMode) -> AssociationRecord {
    AssociationRecord {
        interface: field(row, "interface"),
        ssid: field(row, "ssid"),
        mac: field(row, "mac-address"),
        signal: mode.signal(row),
    }
}

#[must_use]
pub fn lease_from_row(row: &Row) -> LeaseRecord {
    LeaseRecord {
        address: field(row, "address"),
        mac: field(row, "mac-address"),
        server: field(row, "server"),
        hostname: field(row, "host-name"),
        comment: field(row, "comment"),
    }
}

// =============================================================================
// ASSOCIATION SOURCE
// =============================================================================

/// Registration table reader holding one persistent session.
pub struct RouterOsAssociationSource {
    address: String,
    username: String,
    password: String,
    timeout: Duration,
    mode: RouterMode,
    client: Option<RouterOsClient>,
}

impl RouterOsAssociationSource {
    #[must_use]
    pub fn new(config: &RouterConfig) -> Self {
        Self {
            address: config.address.clone(),
            username: config.username.clone(),
            password: config.password.clone(),
            timeout: config.timeout,
            mode: config.mode,
            client: None,
        }
    }
}

#[async_trait::async_trait]
impl AssociationSource for RouterOsAssociationSource {
    async fn connect(&mut self) -> Result<(), FetchError> {
        self.close().await;
        let client = RouterOsClient::connect(&self.address, &self.username, &self.password, self.timeout).await?;
        self.client = Some(client);
        Ok(())
    }

    async fn fetch(&mut self) -> Result<Vec<AssociationRecord>, FetchError> {
        let mode = self.mode;
        let client = self.client.as_mut().ok_or(FetchError::NotConnected)?;
        let rows = client.run(mode.command()).await?;
        Ok(rows.iter().map(|row| association_from_row(row, mode)).collect())
    }

    async fn close(&mut self) {
        if let Some(client) = self.client.take() {
            client.close().await;
        }
    }
}

// =============================================================================
// LEASE SOURCE
// =============================================================================

/// DHCP lease reader; dials a fresh session for every refresh.
pub struct RouterOsLeaseSource {
    address: String,
    username: String,
    password: String,
    timeout: Duration,
}

impl RouterOsLeaseSource {
    #[must_use]
    pub fn new(config: &RouterConfig) -> Self {
        Self {
            address: config.address.clone(),
            username: config.username.clone(),
            password: config.password.clone(),
            timeout: config.timeout,
        }
    }
}

#[async_trait::async_trait]
impl LeaseSource for RouterOsLeaseSource {
    async fn fetch_leases(&self) -> Result<Vec<LeaseRecord>, FetchError> {
        let mut client = RouterOsClient::connect(&self.address, &self.username, &self.password, self.timeout).await?;
        let result = client.run(LEASE_PRINT).await;
        client.close().await;
        let rows = result?;
        debug!(address = %self.address, count = rows.len(), "routeros: lease table fetched");
        Ok(rows.iter().map(lease_from_row).collect())
    }
}

#[cfg(test)]
#[path = "mod_test.rs"]
mod tests;
