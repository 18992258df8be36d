//! Device directory — configured devices keyed by hardware address.
//!
//! Built once from config and shared read-only, so it needs no lock.

use std::collections::HashMap;

use crate::config::{DeviceConfig, NotifyRule};
use crate::model::{EventKind, normalize_mac};

/// A configured device with its per-event notification rules.
#[derive(Debug, Clone, Default)]
pub struct DeviceRecord {
    pub name: String,
    pub mac: String,
    pub on_connect: NotifyRule,
    pub on_disconnect: NotifyRule,
    pub on_roaming: NotifyRule,
    pub on_level: NotifyRule,
}

impl DeviceRecord {
    /// The configured rule for `kind`, or `None` when it names no URL.
    #[must_use]
    pub fn rule(&self, kind: EventKind) -> Option<&NotifyRule> {
        let rule = match kind {
            EventKind::Connect => &self.on_connect,
            EventKind::Disconnect => &self.on_disconnect,
            EventKind::Roam => &self.on_roaming,
            EventKind::LevelChange => &self.on_level,
        };
        rule.is_configured().then_some(rule)
    }
}

impl From<&DeviceConfig> for DeviceRecord {
    fn from(config: &DeviceConfig) -> Self {
        Self {
            name: config.name.clone(),
            mac: normalize_mac(&config.mac),
            on_connect: config.on_connect.clone(),
            on_disconnect: config.on_disconnect.clone(),
            on_roaming: config.on_roaming.clone(),
            on_level: config.on_level.clone(),
        }
    }
}

#[derive(Debug, Default)]
pub struct DeviceDirectory {
    devices: HashMap<String, DeviceRecord>,
}

impl DeviceDirectory {
    #[must_use]
    pub fn from_config(devices: &[DeviceConfig]) -> Self {
        Self::from_records(devices.iter().map(DeviceRecord::from))
    }

    #[must_use]
    pub fn from_records(records: impl IntoIterator<Item = DeviceRecord>) -> Self {
        let devices = records
            .into_iter()
            .map(|mut rec| {
                rec.mac = normalize_mac(&rec.mac);
                (rec.mac.clone(), rec)
            })
            .collect();
        Self { devices }
    }

    #[must_use]
    pub fn get(&self, mac: &str) -> Option<&DeviceRecord> {
        self.devices.get(&normalize_mac(mac))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.devices.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }
}
