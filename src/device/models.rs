use serde::{Deserialize, Serialize};

/// Shape of the accessory: one battery, or two pods plus a charging case.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PodLayout {
    Single,
    Dual,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Model {
    pub code: &'static str,
    pub name: &'static str,
    pub layout: PodLayout,
}

/// Model code used by the registry for a device whose model has not been assigned yet.
pub const UNKNOWN_MODEL: &str = "-1";

pub const MODELS: [Model; 14] = [
    Model { code: "0220", name: "AirPods 1st Gen", layout: PodLayout::Dual },
    Model { code: "0F20", name: "AirPods 2nd Gen", layout: PodLayout::Dual },
    Model { code: "1320", name: "AirPods 3rd Gen", layout: PodLayout::Dual },
    Model { code: "0E20", name: "AirPods Pro", layout: PodLayout::Dual },
    Model { code: "1420", name: "AirPods Pro 2nd Gen", layout: PodLayout::Dual },
    Model { code: "2420", name: "AirPods Pro 2nd Gen USB-C", layout: PodLayout::Dual },
    Model { code: "1220", name: "Beats Fit Pro", layout: PodLayout::Dual },
    Model { code: "0520", name: "Beats X", layout: PodLayout::Single },
    Model { code: "1020", name: "Beats Flex", layout: PodLayout::Single },
    Model { code: "0620", name: "Beats Solo 3", layout: PodLayout::Single },
    Model { code: "0320", name: "Powerbeats 3", layout: PodLayout::Single },
    Model { code: "9", name: "Beats Studio 3", layout: PodLayout::Single },
    Model { code: "A", name: "AirPods Max", layout: PodLayout::Single },
    Model { code: "B", name: "Powerbeats Pro", layout: PodLayout::Dual },
];

/**
 * In-ear models whose broadcasts are subject to the ghost advertisement filter
 * (both pods charging, or both pods disconnected, at the same time).
 */
pub const GHOST_FILTERED_MODELS: [&str; 7] = ["0220", "0F20", "1320", "0E20", "1420", "2420", "1220"];

pub fn find_model(code: &str) -> Option<&'static Model> {
    MODELS.iter().find(|model| model.code.eq_ignore_ascii_case(code))
}

pub fn is_ghost_filtered(code: &str) -> bool {
    GHOST_FILTERED_MODELS.iter().any(|model| model.eq_ignore_ascii_case(code))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_ignores_case() {
        assert_eq!(find_model("0f20").map(|m| m.name), Some("AirPods 2nd Gen"));
        assert_eq!(find_model("a").map(|m| m.layout), Some(PodLayout::Single));
        assert!(find_model(UNKNOWN_MODEL).is_none());
        assert!(find_model("FFFF").is_none());
    }

    #[test]
    fn ghost_filter_only_covers_in_ear_models() {
        assert!(is_ghost_filtered("0e20"));
        assert!(!is_ghost_filtered("0520"));
        assert!(!is_ghost_filtered("B"));
    }
}
