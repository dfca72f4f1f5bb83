use chrono::{DateTime, Local};

use crate::device::constants::{
    HEX_CASE, HEX_CHARGE_STATUS, HEX_FLIP, HEX_POD_A, HEX_POD_B, LEVEL_DISCONNECTED, LEVEL_FLOOR,
    NIBBLE_DISCONNECTED, UPDATED_DATE_FORMAT, UPDATED_TIME_FORMAT,
};
use crate::device::types::{BatteryReport, Stamp};

const CHARGE_POD_A: u8 = 0b0001;
const CHARGE_POD_B: u8 = 0b0010;
const CHARGE_CASE: u8 = 0b0100;
const FLIP_MASK: u8 = 0x02;

/**
 * Returns the nibble at `offset` of the hex rendition of `bytes`: even offsets are the high
 * nibble of a byte, odd offsets the low nibble. Offsets past the end read as 0.
 */
pub fn nibble_at(bytes: &[u8], offset: usize) -> u8 {
    match bytes.get(offset / 2) {
        Some(byte) if offset % 2 == 0 => byte >> 4,
        Some(byte) => byte & 0x0f,
        None => 0,
    }
}

/// Converts a raw 4 bit level into a percentage.
pub fn correct_level(value: u8) -> i8 {
    if value == NIBBLE_DISCONNECTED {
        LEVEL_DISCONNECTED
    } else if value == 0 {
        LEVEL_FLOOR
    } else if value > 9 {
        100
    } else {
        (value * 10) as i8
    }
}

/// Whether left and right are swapped in this broadcast.
pub fn is_flipped(bytes: &[u8]) -> bool {
    nibble_at(bytes, HEX_FLIP) & FLIP_MASK == 0
}

/**
 * Decodes a proximity pairing payload that already passed the length and signature checks.
 * Malformed input does not fail, it just produces meaningless levels.
 */
pub fn decode_at(bytes: &[u8], now: &DateTime<Local>) -> BatteryReport {
    let flip = is_flipped(bytes);
    let pod_a = nibble_at(bytes, HEX_POD_A);
    let pod_b = nibble_at(bytes, HEX_POD_B);
    let charge = nibble_at(bytes, HEX_CHARGE_STATUS);

    let (left, right) = if flip { (pod_a, pod_b) } else { (pod_b, pod_a) };
    let (left_mask, right_mask) = if flip {
        (CHARGE_POD_B, CHARGE_POD_A)
    } else {
        (CHARGE_POD_A, CHARGE_POD_B)
    };

    BatteryReport {
        left_level: correct_level(left),
        right_level: correct_level(right),
        case_level: correct_level(nibble_at(bytes, HEX_CASE)),
        single_level: correct_level(pod_b),
        left_status: charge & left_mask != 0,
        right_status: charge & right_mask != 0,
        case_status: charge & CHARGE_CASE != 0,
        single_status: charge & CHARGE_POD_A != 0,
        updated_time: Stamp::At(now.format(UPDATED_TIME_FORMAT).to_string()),
        updated_date: Stamp::At(now.format(UPDATED_DATE_FORMAT).to_string()),
    }
}

pub fn decode(bytes: &[u8]) -> BatteryReport {
    decode_at(bytes, &Local::now())
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use chrono::TimeZone;

    /// Builds a 27 byte payload for `model` ("0220" style) with the given nibble bytes.
    pub(crate) fn payload(model: u16, flip_byte: u8, pods: u8, status: u8) -> Vec<u8> {
        let mut bytes = vec![0u8; 27];
        bytes[0] = 0x07;
        bytes[1] = 0x19;
        bytes[2] = 0x01;
        bytes[3] = (model >> 8) as u8;
        bytes[4] = (model & 0xff) as u8;
        bytes[5] = flip_byte;
        bytes[6] = pods;
        bytes[7] = status;
        bytes
    }

    fn noon() -> DateTime<Local> {
        Local.with_ymd_and_hms(2024, 3, 9, 12, 30, 0).unwrap()
    }

    #[test]
    fn correct_level_covers_every_nibble() {
        assert_eq!(correct_level(15), -1);
        assert_eq!(correct_level(0), 5);
        for v in 1..=9u8 {
            assert_eq!(correct_level(v), (v * 10) as i8);
        }
        for v in 10..=14u8 {
            assert_eq!(correct_level(v), 100);
        }
    }

    #[test]
    fn nibbles_follow_hex_offsets() {
        let bytes = [0x07, 0x19, 0xab];
        assert_eq!(nibble_at(&bytes, 0), 0x0);
        assert_eq!(nibble_at(&bytes, 1), 0x7);
        assert_eq!(nibble_at(&bytes, 4), 0xa);
        assert_eq!(nibble_at(&bytes, 5), 0xb);
        assert_eq!(nibble_at(&bytes, 6), 0);
    }

    #[test]
    fn unflipped_payload() {
        // flip nibble 0x2 has bit 1 set, so left comes from offset 13 and right from offset 12
        let bytes = payload(0x0220, 0x2b, 0x97, 0x15);
        assert!(!is_flipped(&bytes));

        let report = decode_at(&bytes, &noon());
        assert_eq!(report.left_level, 70);
        assert_eq!(report.right_level, 90);
        assert_eq!(report.case_level, 50);
        assert_eq!(report.single_level, 70);
        assert!(report.left_status);
        assert!(!report.right_status);
        assert!(!report.case_status);
        assert!(report.single_status);
    }

    #[test]
    fn flipped_payload_swaps_pods_and_charge_bits() {
        let bytes = payload(0x0220, 0x0b, 0x97, 0x15);
        assert!(is_flipped(&bytes));

        let report = decode_at(&bytes, &noon());
        assert_eq!(report.left_level, 90);
        assert_eq!(report.right_level, 70);
        assert_eq!(report.single_level, 70);
        assert!(!report.left_status);
        assert!(report.right_status);
        assert!(report.single_status);
    }

    #[test]
    fn case_bit_is_never_flipped() {
        for flip_byte in [0x0b, 0x2b] {
            let report = decode_at(&payload(0x0220, flip_byte, 0x55, 0x4f), &noon());
            assert!(report.case_status);
            assert!(!report.left_status);
            assert!(!report.right_status);
            assert_eq!(report.case_level, -1);
        }
    }

    #[test]
    fn disconnected_and_empty_pods() {
        let report = decode_at(&payload(0x0220, 0x2b, 0xf0, 0x0a), &noon());
        assert_eq!(report.left_level, 5);
        assert_eq!(report.right_level, -1);
        assert_eq!(report.case_level, 100);
    }

    #[test]
    fn stamps_use_local_time() {
        let report = decode_at(&payload(0x0220, 0x2b, 0x55, 0x05), &noon());
        assert_eq!(report.updated_date, Stamp::At(String::from("09 Sat 2024")));
        assert!(report.updated_time.is_updated());
        assert!(!report.is_stale());
    }
}
