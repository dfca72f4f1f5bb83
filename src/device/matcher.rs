use chrono::{DateTime, Local};

use crate::device::decoder::decode_at;
use crate::device::types::{BatteryReport, DeviceIdentity, MatchedDevice, ScannedAdvertisement};

/// Result of one matching cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchOutcome {
    /// One entry per known identity, in registry order.
    pub devices: Vec<MatchedDevice>,
    pub matched_count: usize,
}

impl MatchOutcome {
    pub fn known_count(&self) -> usize {
        self.devices.len()
    }

    pub fn is_complete(&self) -> bool {
        self.matched_count == self.known_count()
    }
}

pub fn match_devices(known: &[DeviceIdentity], scanned: Vec<ScannedAdvertisement>) -> MatchOutcome {
    match_devices_at(known, scanned, &Local::now())
}

/**
 * Associates every known identity with at most one advertisement. Advertisements are tried
 * strongest signal first, identities in registry order, so with several accessories of the same
 * model the first registered one gets the strongest broadcast. Identities without a match get the
 * stale report.
 */
pub fn match_devices_at(
    known: &[DeviceIdentity],
    mut scanned: Vec<ScannedAdvertisement>,
    now: &DateTime<Local>,
) -> MatchOutcome {
    // stable sort: equal rssi keeps the scan order
    scanned.sort_by(|a, b| b.rssi.cmp(&a.rssi));

    let mut devices = Vec::with_capacity(known.len());
    let mut matched_count = 0;

    for identity in known {
        let position = scanned
            .iter()
            .position(|advertisement| advertisement.matches_model(&identity.model_code));

        let report = match position {
            Some(index) => {
                let advertisement = scanned.remove(index);
                matched_count += 1;
                decode_at(&advertisement.raw_bytes, now)
            },
            None => BatteryReport::stale(),
        };

        devices.push(MatchedDevice { identity: identity.clone(), report });
    }

    MatchOutcome { devices, matched_count }
}
