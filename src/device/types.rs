use std::fmt::Write as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::device::constants::{HEX_LEGACY_MODEL, HEX_MODEL_END, HEX_MODEL_START, LEVEL_NOT_APPLICABLE};
use crate::device::models::{find_model, PodLayout};

/// A paired accessory with an assigned model, as handed over by the device registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceIdentity {
    pub path: String,
    pub model_code: String,
    pub alias: String,
}

/// Time of the last decoded advertisement. Serialized as `-2` when there is no fresh data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Stamp {
    NotUpdated,
    At(String),
}

impl Stamp {
    pub fn is_updated(&self) -> bool {
        matches!(self, Stamp::At(_))
    }
}

impl Serialize for Stamp {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Stamp::NotUpdated => serializer.serialize_i8(LEVEL_NOT_APPLICABLE),
            Stamp::At(value) => serializer.serialize_str(value),
        }
    }
}

impl<'de> Deserialize<'de> for Stamp {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum RawStamp {
            Sentinel(i64),
            Text(String),
        }

        Ok(match RawStamp::deserialize(deserializer)? {
            RawStamp::Sentinel(_) => Stamp::NotUpdated,
            RawStamp::Text(value) => Stamp::At(value),
        })
    }
}

/**
 * Battery state decoded from one advertisement.
 * Levels are 0..=100, -1 for a disconnected pod, -2 when the value must not replace the one
 * displayed previously.
 */
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatteryReport {
    pub left_level: i8,
    pub right_level: i8,
    pub case_level: i8,
    pub single_level: i8,
    pub left_status: bool,
    pub right_status: bool,
    pub case_status: bool,
    pub single_status: bool,
    pub updated_time: Stamp,
    pub updated_date: Stamp,
}

impl BatteryReport {
    /// The "no fresh data this cycle" report.
    pub fn stale() -> Self {
        BatteryReport {
            left_level: LEVEL_NOT_APPLICABLE,
            right_level: LEVEL_NOT_APPLICABLE,
            case_level: LEVEL_NOT_APPLICABLE,
            single_level: LEVEL_NOT_APPLICABLE,
            left_status: false,
            right_status: false,
            case_status: false,
            single_status: false,
            updated_time: Stamp::NotUpdated,
            updated_date: Stamp::NotUpdated,
        }
    }

    pub fn is_stale(&self) -> bool {
        !self.updated_time.is_updated()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum BatteryInfo {
    Single {
        level: i8,
        charging: bool,
    },
    #[serde(rename_all = "camelCase")]
    Dual {
        left_level: i8,
        right_level: i8,
        case_level: i8,
        left_charging: bool,
        right_charging: bool,
        case_charging: bool,
    },
}

/// Manufacturer data of one visible device. Only lives for a single scan cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScannedAdvertisement {
    pub raw_bytes: Vec<u8>,
    pub rssi: i16,
    pub hex: String,
}

impl ScannedAdvertisement {
    pub fn new(raw_bytes: Vec<u8>, rssi: i16) -> Self {
        let hex = to_hex(&raw_bytes);
        ScannedAdvertisement { raw_bytes, rssi, hex }
    }

    /// Four character model field, e.g. `0220`.
    pub fn model_field(&self) -> &str {
        self.hex.get(HEX_MODEL_START..HEX_MODEL_END).unwrap_or("")
    }

    /// Single character model field used by older accessories.
    pub fn legacy_model_field(&self) -> &str {
        self.hex.get(HEX_LEGACY_MODEL..HEX_LEGACY_MODEL + 1).unwrap_or("")
    }

    pub fn matches_model(&self, model_code: &str) -> bool {
        let field = match model_code.len() {
            4 => self.model_field(),
            1 => self.legacy_model_field(),
            _ => return false,
        };

        !field.is_empty() && field.eq_ignore_ascii_case(model_code)
    }
}

pub fn to_hex(bytes: &[u8]) -> String {
    let mut hex = String::with_capacity(bytes.len() * 2);
    for byte in bytes {
        // writing into a String cannot fail
        let _ = write!(hex, "{:02x}", byte);
    }
    hex
}

/// One entry of the published list; there is exactly one per tracked identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchedDevice {
    pub identity: DeviceIdentity,
    pub report: BatteryReport,
}

impl MatchedDevice {
    pub fn layout(&self) -> Option<PodLayout> {
        find_model(&self.identity.model_code).map(|model| model.layout)
    }

    pub fn info(&self) -> Option<BatteryInfo> {
        let report = &self.report;
        self.layout().map(|layout| match layout {
            PodLayout::Single => BatteryInfo::Single {
                level: report.single_level,
                charging: report.single_status,
            },
            PodLayout::Dual => BatteryInfo::Dual {
                left_level: report.left_level,
                right_level: report.right_level,
                case_level: report.case_level,
                left_charging: report.left_status,
                right_charging: report.right_status,
                case_charging: report.case_status,
            },
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum SchedulerState {
    Idle,
    Discovering,
    ScanAndPublish,
    Stopped,
}

#[derive(Debug, Clone)]
pub enum MonitorEvent {
    StateChange(SchedulerState),
    Devices(Vec<MatchedDevice>),
}
