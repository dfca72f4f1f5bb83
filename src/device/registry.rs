use std::collections::HashMap;
use indexmap::IndexMap;
use log::info;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;

use crate::device::models::{find_model, UNKNOWN_MODEL};
use crate::device::transport::KnownDevice;
use crate::device::types::DeviceIdentity;
use crate::error::ConfigError;

/// A paired accessory as recorded by the pairing side.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistryEntry {
    pub path: String,
    pub alias: String,
    #[serde(default = "unknown_model")]
    pub model: String,
    pub connected: bool,
    pub paired: bool,
}

fn unknown_model() -> String {
    String::from(UNKNOWN_MODEL)
}

fn presence_entry(device: &KnownDevice) -> RegistryEntry {
    RegistryEntry {
        path: device.path.clone(),
        alias: device.alias.clone(),
        model: unknown_model(),
        connected: device.connected,
        paired: true,
    }
}

impl RegistryEntry {
    pub fn is_trackable(&self) -> bool {
        self.connected && self.model != UNKNOWN_MODEL
    }
}

/// Connected entries with an assigned model, in registry order.
pub fn known_identities<'a, I>(entries: I) -> Vec<DeviceIdentity>
where
    I: IntoIterator<Item = &'a RegistryEntry>,
{
    entries
        .into_iter()
        .filter(|entry| entry.is_trackable())
        .map(|entry| DeviceIdentity {
            path: entry.path.clone(),
            model_code: entry.model.clone(),
            alias: entry.alias.clone(),
        })
        .collect()
}

/**
 * Ordered set of paired accessories, keyed by path. Every change that alters the list of known
 * identities is pushed to subscribers.
 */
pub struct DeviceRegistry {
    entries: IndexMap<String, RegistryEntry>,
    sender: watch::Sender<Vec<DeviceIdentity>>,
}

impl DeviceRegistry {
    pub fn new(entries: Vec<RegistryEntry>) -> Self {
        let entries: IndexMap<String, RegistryEntry> = entries
            .into_iter()
            .map(|entry| (entry.path.clone(), entry))
            .collect();
        let (sender, _) = watch::channel(known_identities(entries.values()));

        DeviceRegistry { entries, sender }
    }

    pub fn subscribe(&self) -> watch::Receiver<Vec<DeviceIdentity>> {
        self.sender.subscribe()
    }

    pub fn entries(&self) -> impl Iterator<Item = &RegistryEntry> {
        self.entries.values()
    }

    pub fn get(&self, path: &str) -> Option<&RegistryEntry> {
        self.entries.get(path)
    }

    pub fn known_identities(&self) -> Vec<DeviceIdentity> {
        known_identities(self.entries.values())
    }

    pub fn has_trackable(&self) -> bool {
        self.entries.values().any(RegistryEntry::is_trackable)
    }

    /**
     * Adds a device, or updates alias and connection flags of a known one. The model of an
     * existing entry is kept; a new entry without a known model gets the unknown model.
     */
    pub fn upsert(&mut self, entry: RegistryEntry) {
        self.merge(entry);
        self.notify();
    }

    pub fn set_model(&mut self, path: &str, model: &str) -> Result<bool, ConfigError> {
        let model = match find_model(model) {
            Some(model) => model.code,
            None if model == UNKNOWN_MODEL => UNKNOWN_MODEL,
            None => return Err(ConfigError::InvalidModel(model.to_string())),
        };

        let updated = match self.entries.get_mut(path) {
            Some(entry) => {
                entry.model = model.to_string();
                true
            },
            None => false,
        };
        self.notify();
        Ok(updated)
    }

    /// An unpaired device stays listed but is no longer tracked.
    pub fn mark_removed(&mut self, path: &str) {
        self.unmark(path);
        self.notify();
    }

    /**
     * Brings the registry in line with what the bluetooth stack reports. Entries the stack no
     * longer lists are marked removed; newly connected devices are added without a model.
     * Subscribers are notified once. Returns whether any entry changed.
     */
    pub fn sync_presence(&mut self, devices: &[KnownDevice]) -> bool {
        let before: Vec<RegistryEntry> = self.entries.values().cloned().collect();
        let reported: HashMap<&str, &KnownDevice> = devices
            .iter()
            .map(|device| (device.path.as_str(), device))
            .collect();

        let paths: Vec<String> = self.entries.keys().cloned().collect();
        for path in paths {
            match reported.get(path.as_str()) {
                Some(device) => self.merge(presence_entry(device)),
                None => self.unmark(&path),
            }
        }

        for device in devices {
            if device.connected && !self.entries.contains_key(&device.path) {
                self.merge(presence_entry(device));
            }
        }

        self.notify();
        !self.entries.values().eq(before.iter())
    }

    fn merge(&mut self, entry: RegistryEntry) {
        match self.entries.get_mut(&entry.path) {
            Some(existing) => {
                if existing.connected != entry.connected {
                    info!("Device {} {}", entry.path, if entry.connected { "connected" } else { "disconnected" });
                }
                existing.alias = entry.alias;
                existing.connected = entry.connected;
                existing.paired = entry.paired;
            },
            None => {
                let mut entry = entry;
                if find_model(&entry.model).is_none() {
                    entry.model = unknown_model();
                }
                info!("Registering device {} ({})", entry.path, entry.alias);
                self.entries.insert(entry.path.clone(), entry);
            },
        }
    }

    fn unmark(&mut self, path: &str) {
        if let Some(entry) = self.entries.get_mut(path) {
            if entry.connected || entry.paired {
                info!("Device {} was removed", path);
            }
            entry.connected = false;
            entry.paired = false;
        }
    }

    fn notify(&self) {
        let identities = self.known_identities();
        self.sender.send_if_modified(|current| {
            if *current == identities {
                return false;
            }
            *current = identities;
            true
        });
    }
}
