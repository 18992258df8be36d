//! Event dispatcher — device resolution and fire-and-forget notifications.
//!
//! DESIGN
//! ======
//! A single consumer task drains the reconciler's bounded event queue. For
//! each event it resolves the device by the event's MAC (the old record for
//! disconnects, the new one otherwise), picks the device's rule for the
//! event kind, and spawns the notifier call. The consumer never awaits a
//! notification, so one slow webhook cannot back up the queue.
//!
//! ERROR HANDLING
//! ==============
//! Unknown devices and unconfigured rules are logged at `debug` and
//! dropped. Notifier failures are logged at `warn` by the spawned task.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::model::PresenceEvent;
use crate::services::directory::{DeviceDirectory, DeviceRecord};
use crate::services::webhook::{NotifyParams, Notifier};

/// Placeholder values for `event` on `device`. Fields that do not apply to
/// the event kind are empty.
#[must_use]
pub fn notify_params(device: &DeviceRecord, event: &PresenceEvent) -> NotifyParams {
    let (roaming_from, roaming_to, level_from, level_to) = match event {
        PresenceEvent::Connect { new } => ("", "", "", new.signal.as_str()),
        PresenceEvent::Disconnect { old } => ("", "", old.signal.as_str(), ""),
        PresenceEvent::Roam { old, new } => (
            old.interface.as_str(),
            new.interface.as_str(),
            old.signal.as_str(),
            new.signal.as_str(),
        ),
        PresenceEvent::LevelChange { old, new } => ("", "", old.signal.as_str(), new.signal.as_str()),
    };
    NotifyParams::from([
        ("name", device.name.clone()),
        ("mac", device.mac.clone()),
        ("roaming.from", roaming_from.to_owned()),
        ("roaming.to", roaming_to.to_owned()),
        ("level.from", level_from.to_owned()),
        ("level.to", level_to.to_owned()),
    ])
}

fn log_event(event: &PresenceEvent) {
    match event {
        PresenceEvent::Connect { new } => {
            info!(mac = %new.mac, name = %new.name, interface = %new.interface, ip = %new.ip, signal = %new.signal, "client connected");
        }
        PresenceEvent::Disconnect { old } => {
            info!(mac = %old.mac, name = %old.name, interface = %old.interface, ip = %old.ip, "client disconnected");
        }
        PresenceEvent::Roam { old, new } => {
            info!(mac = %new.mac, name = %new.name, from = %old.interface, to = %new.interface, "client roaming");
        }
        PresenceEvent::LevelChange { old, new } => {
            debug!(mac = %new.mac, name = %new.name, from = %old.signal, to = %new.signal, "client signal changed");
        }
    }
}

pub struct EventDispatcher {
    directory: Arc<DeviceDirectory>,
    notifier: Arc<dyn Notifier>,
}

impl EventDispatcher {
    #[must_use]
    pub fn new(directory: Arc<DeviceDirectory>, notifier: Arc<dyn Notifier>) -> Self {
        Self { directory, notifier }
    }

    /// Handle one event. Returns the spawned notification task, if any.
    pub fn dispatch(&self, event: &PresenceEvent) -> Option<JoinHandle<()>> {
        log_event(event);

        let kind = event.kind();
        let Some(device) = self.directory.get(event.mac()) else {
            debug!(mac = %event.mac(), kind = kind.as_str(), "dispatch: unknown device; dropped");
            return None;
        };
        let Some(rule) = device.rule(kind) else {
            debug!(mac = %device.mac, kind = kind.as_str(), "dispatch: no rule configured");
            return None;
        };

        let rule = rule.clone();
        let params = notify_params(device, event);
        let notifier = self.notifier.clone();
        Some(tokio::spawn(async move {
            if let Err(e) = notifier.notify(&rule, &params).await {
                warn!(
                    kind = kind.as_str(),
                    mac = params.get("mac").map_or("", String::as_str),
                    error = %e,
                    "dispatch: notification failed"
                );
            }
        }))
    }
}

/// Spawn the dedicated consumer. Exits when every sender is dropped.
pub fn spawn_dispatcher_task(dispatcher: EventDispatcher, mut rx: mpsc::Receiver<PresenceEvent>) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            let _ = dispatcher.dispatch(&event);
        }
        debug!("dispatcher task stopped");
    })
}

#[cfg(test)]
#[path = "dispatch_test.rs"]
mod tests;
