use std::sync::Arc;
use log::{debug, warn};

use crate::device::constants::{
    HEX_CHARGE_STATUS, HEX_POD_A, HEX_POD_B, MANUFACTURER_DATA_LENGTH, MANUFACTURER_ID, MIN_RSSI,
    NIBBLE_DISCONNECTED, PROXIMITY_PAIRING_LENGTHS, PROXIMITY_PAIRING_TYPE,
};
use crate::device::decoder::nibble_at;
use crate::device::models::is_ghost_filtered;
use crate::device::transport::{with_deadline, Transport, VisibleDevice};
use crate::device::types::ScannedAdvertisement;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourceSettings {
    pub min_rssi: i16,
    pub drop_ghost_advertisements: bool,
}

impl Default for SourceSettings {
    fn default() -> Self {
        SourceSettings {
            min_rssi: MIN_RSSI,
            drop_ghost_advertisements: true,
        }
    }
}

/// Lists the visible devices and keeps the advertisements that look like they come from an accessory.
pub struct AdvertisementSource {
    transport: Arc<dyn Transport>,
    settings: SourceSettings,
}

impl AdvertisementSource {
    pub fn new(transport: Arc<dyn Transport>, settings: SourceSettings) -> Self {
        AdvertisementSource { transport, settings }
    }

    pub fn settings(&self) -> &SourceSettings {
        &self.settings
    }

    /// Never fails: a failed enumeration yields an empty list, a failed device is skipped.
    pub async fn scan(&self) -> Vec<ScannedAdvertisement> {
        let devices = match with_deadline(self.transport.list_visible_devices()).await {
            Ok(devices) => devices,
            Err(err) => {
                warn!("Listing visible devices failed: {}", err);
                return Vec::new();
            },
        };

        let mut scanned = Vec::new();
        for device in devices {
            match device {
                Err(err) => warn!("Could not query device for properties: {}", err),
                Ok(device) => {
                    if let Some(advertisement) = accept(&device, &self.settings) {
                        debug!("Accepted advertisement from {} rssi {}: {}", device.path, advertisement.rssi, advertisement.hex);
                        scanned.push(advertisement);
                    }
                },
            }
        }

        scanned
    }
}

/// Whether `bytes` carries the proximity pairing signature and length.
pub fn has_signature(bytes: &[u8]) -> bool {
    bytes.len() == MANUFACTURER_DATA_LENGTH
        && bytes[0] == PROXIMITY_PAIRING_TYPE
        && PROXIMITY_PAIRING_LENGTHS.contains(&bytes[1])
}

/// Both pods charging, or both pods disconnected: a broadcast known to carry no real state.
pub fn is_ghost(advertisement: &ScannedAdvertisement) -> bool {
    if !is_ghost_filtered(advertisement.model_field()) {
        return false;
    }

    let bytes = &advertisement.raw_bytes;
    let charge = nibble_at(bytes, HEX_CHARGE_STATUS);
    let both_charging = charge & 0b0011 == 0b0011;
    let both_disconnected = nibble_at(bytes, HEX_POD_A) == NIBBLE_DISCONNECTED
        && nibble_at(bytes, HEX_POD_B) == NIBBLE_DISCONNECTED;

    both_charging || both_disconnected
}

pub fn accept(device: &VisibleDevice, settings: &SourceSettings) -> Option<ScannedAdvertisement> {
    // connected devices can show up without an rssi even when discovery filters on it
    let rssi = device.rssi?;
    if rssi < settings.min_rssi {
        return None;
    }

    let bytes = device.manufacturer_data.get(&MANUFACTURER_ID)?;
    if !has_signature(bytes) {
        return None;
    }

    let advertisement = ScannedAdvertisement::new(bytes.clone(), rssi);
    if settings.drop_ghost_advertisements && is_ghost(&advertisement) {
        debug!("Dropping ghost advertisement from {}: {}", device.path, advertisement.hex);
        return None;
    }

    Some(advertisement)
}
