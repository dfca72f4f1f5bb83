/**
 * How often (seconds) the discovery scheduler ticks.
 */
pub const TICK_INTERVAL: u64 = 5;

/**
 * Advertisements received below this signal strength (dBm) are ignored.
 */
pub const MIN_RSSI: i16 = -70;

/**
 * Manufacturer id (Apple) under which the accessories publish their status.
 */
pub const MANUFACTURER_ID: u16 = 76;

/**
 * Exact length of the proximity pairing payload.
 */
pub const MANUFACTURER_DATA_LENGTH: usize = 27;

/**
 * First byte of the payload: proximity pairing message type.
 */
pub const PROXIMITY_PAIRING_TYPE: u8 = 0x07;

/**
 * Accepted values for the second byte of the payload (message length).
 */
pub const PROXIMITY_PAIRING_LENGTHS: [u8; 2] = [0x19, 0x13];

/**
 * Idle window (ticks) after every known device was matched, about 60 seconds.
 */
pub const FULL_MATCH_IDLE_TICKS: u32 = 12;

/**
 * Idle window (ticks) after a partial or empty match, about 15 seconds.
 */
pub const PARTIAL_MATCH_IDLE_TICKS: u32 = 3;

/**
 * Smallest idle window the duty cycle accepts: the stop at tick 2 has to happen before the restart.
 */
pub const MIN_IDLE_TICKS: u32 = 3;

/**
 * Tick (since discovery started) at which visible devices are scanned and matched.
 */
pub const SCAN_TICK: u32 = 1;

/**
 * Tick at which discovery is stopped again.
 */
pub const STOP_DISCOVERY_TICK: u32 = 2;

/**
 * How long (milliseconds) a single call into the bluetooth stack may take.
 */
pub const TRANSPORT_DEADLINE: u64 = 4000;

// Hex offsets into the lowercase hex rendition of the payload
pub const HEX_MODEL_START: usize = 6;
pub const HEX_MODEL_END: usize = 10;
pub const HEX_LEGACY_MODEL: usize = 7;
pub const HEX_FLIP: usize = 10;
pub const HEX_POD_A: usize = 12;
pub const HEX_POD_B: usize = 13;
pub const HEX_CHARGE_STATUS: usize = 14;
pub const HEX_CASE: usize = 15;

/**
 * Nibble value reported for a pod that is not connected / out of the case.
 */
pub const NIBBLE_DISCONNECTED: u8 = 15;

/**
 * Level for fields that do not apply (or carry no fresh data); consumers keep their previous value.
 */
pub const LEVEL_NOT_APPLICABLE: i8 = -2;

/**
 * Level for a pod that is applicable but currently disconnected.
 */
pub const LEVEL_DISCONNECTED: i8 = -1;

/**
 * Level reported when the raw level is 0, so that an almost empty pod is not shown as 0%.
 */
pub const LEVEL_FLOOR: i8 = 5;

pub const UPDATED_TIME_FORMAT: &str = "%X";
pub const UPDATED_DATE_FORMAT: &str = "%d %a %Y";
