use serde::{Deserialize, Serialize};
use tokio::time::Duration;

use crate::device::constants::{
    FULL_MATCH_IDLE_TICKS, MIN_IDLE_TICKS, MIN_RSSI, PARTIAL_MATCH_IDLE_TICKS, TICK_INTERVAL, TRANSPORT_DEADLINE,
};
use crate::device::models::{find_model, UNKNOWN_MODEL};
use crate::device::registry::RegistryEntry;
use crate::device::scheduler::SchedulerSettings;
use crate::device::source::SourceSettings;
use crate::error::ConfigError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Config {
    pub min_rssi: i16,
    pub tick_interval_secs: u64,
    pub full_match_idle_ticks: u32,
    pub partial_match_idle_ticks: u32,
    pub drop_ghost_advertisements: bool,
    pub devices: Vec<RegistryEntry>,
}

impl Config {
    pub fn validate(&self) -> Result<(), ConfigError> {
        // a transport call must be over before the next tick
        if Duration::from_secs(self.tick_interval_secs) <= Duration::from_millis(TRANSPORT_DEADLINE) {
            return Err(ConfigError::TickIntervalTooShort(self.tick_interval_secs));
        }

        for ticks in [self.full_match_idle_ticks, self.partial_match_idle_ticks] {
            if ticks < MIN_IDLE_TICKS {
                return Err(ConfigError::IdleWindowTooShort(ticks));
            }
        }

        for device in &self.devices {
            if device.model != UNKNOWN_MODEL && find_model(&device.model).is_none() {
                return Err(ConfigError::InvalidModel(device.model.clone()));
            }
        }

        Ok(())
    }

    pub fn source_settings(&self) -> SourceSettings {
        SourceSettings {
            min_rssi: self.min_rssi,
            drop_ghost_advertisements: self.drop_ghost_advertisements,
        }
    }

    pub fn scheduler_settings(&self) -> SchedulerSettings {
        SchedulerSettings {
            tick_interval: Duration::from_secs(self.tick_interval_secs),
            full_match_idle_ticks: self.full_match_idle_ticks,
            partial_match_idle_ticks: self.partial_match_idle_ticks,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            min_rssi: MIN_RSSI,
            tick_interval_secs: TICK_INTERVAL,
            full_match_idle_ticks: FULL_MATCH_IDLE_TICKS,
            partial_match_idle_ticks: PARTIAL_MATCH_IDLE_TICKS,
            drop_ghost_advertisements: true,
            devices: Vec::new(),
        }
    }
}
