use std::collections::HashMap;
use std::future::Future;
use async_trait::async_trait;
use btleplug::api::{Central, Manager as _, Peripheral as _, ScanFilter};
use btleplug::platform::{Adapter, Manager};
use log::{debug, info, warn};
use tokio::time::{sleep, Duration};

use crate::device::constants::TRANSPORT_DEADLINE;
use crate::error::TransportError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiscoveryTransport {
    Le,
}

/// Restricts discovery to low energy devices above a signal strength floor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveryFilter {
    pub transport: DiscoveryTransport,
    pub rssi_floor: i16,
}

/// A device currently known to the bluetooth stack, with its manufacturer data keyed by vendor id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VisibleDevice {
    pub path: String,
    pub rssi: Option<i16>,
    pub manufacturer_data: HashMap<u16, Vec<u8>>,
}

/// A device the bluetooth stack keeps an object for, whether or not it is in range.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KnownDevice {
    pub path: String,
    pub alias: String,
    pub connected: bool,
}

/**
 * The system bluetooth service as seen by the monitor. Implementations must not retry on their
 * own; failures are reported to the caller which logs them and carries on with the next tick.
 */
#[async_trait]
pub trait Transport: Send + Sync {
    /**
     * Starts discovery. Stacks that can not filter on transport or signal strength while
     * discovering (btleplug only filters on services) may discover more than `filter` allows;
     * the Advertisement Source applies the same restriction to every listed device.
     */
    async fn start_discovery(&self, filter: &DiscoveryFilter) -> Result<(), TransportError>;

    /// Stops discovery and resets any discovery filter.
    async fn stop_discovery(&self) -> Result<(), TransportError>;

    /// The outer error means the enumeration itself failed, inner errors concern one device.
    async fn list_visible_devices(&self) -> Result<Vec<Result<VisibleDevice, TransportError>>, TransportError>;

    /// Every device the stack knows about, with its current connection state.
    async fn list_known_devices(&self) -> Result<Vec<KnownDevice>, TransportError>;
}

/// Fails with `TransportError::Timeout` if `fut` does not complete within `TRANSPORT_DEADLINE`.
pub async fn with_deadline<T, F>(fut: F) -> Result<T, TransportError>
where
    F: Future<Output = Result<T, TransportError>>,
{
    tokio::select! {
        _ = sleep(Duration::from_millis(TRANSPORT_DEADLINE)) => {
            Err(TransportError::Timeout(TRANSPORT_DEADLINE))
        }
        result = fut => result,
    }
}

/// Transport backed by btleplug, using every adapter the platform reports.
pub struct BtleplugTransport {
    adapters: Vec<Adapter>,
}

impl BtleplugTransport {
    pub async fn new() -> Result<Self, TransportError> {
        let manager = Manager::new().await?;
        let adapters = manager.adapters().await?;
        if adapters.is_empty() {
            return Err(TransportError::NoAdapter);
        }

        for adapter in &adapters {
            info!("Using adapter {}", adapter.adapter_info().await.unwrap_or("UNKNOWN".to_string()));
        }

        Ok(BtleplugTransport { adapters })
    }
}

#[async_trait]
impl Transport for BtleplugTransport {
    async fn start_discovery(&self, filter: &DiscoveryFilter) -> Result<(), TransportError> {
        debug!("Starting discovery ({:?}, rssi >= {})", filter.transport, filter.rssi_floor);
        for adapter in &self.adapters {
            adapter.start_scan(ScanFilter::default()).await?;
        }
        Ok(())
    }

    async fn stop_discovery(&self) -> Result<(), TransportError> {
        debug!("Stopping discovery");
        for adapter in &self.adapters {
            adapter.stop_scan().await?;
        }
        Ok(())
    }

    async fn list_visible_devices(&self) -> Result<Vec<Result<VisibleDevice, TransportError>>, TransportError> {
        let mut devices = Vec::new();

        for adapter in &self.adapters {
            let peripherals = match adapter.peripherals().await {
                Ok(v) => v,
                Err(err) => {
                    warn!("Failed to query BLE adapter for peripherals: {}", err);
                    continue;
                },
            };

            for peripheral in peripherals {
                let device = match peripheral.properties().await {
                    Err(err) => Err(TransportError::from(err)),
                    Ok(None) => Err(TransportError::MissingProperties(peripheral.address().to_string())),
                    Ok(Some(properties)) => Ok(VisibleDevice {
                        path: properties.address.to_string(),
                        rssi: properties.rssi,
                        manufacturer_data: properties.manufacturer_data,
                    }),
                };
                devices.push(device);
            }
        }

        Ok(devices)
    }

    async fn list_known_devices(&self) -> Result<Vec<KnownDevice>, TransportError> {
        let mut devices = Vec::new();

        for adapter in &self.adapters {
            for peripheral in adapter.peripherals().await? {
                let path = peripheral.address().to_string();
                let connected = match peripheral.is_connected().await {
                    Ok(connected) => connected,
                    Err(err) => {
                        warn!("Error checking connection state of {}: {:?}", path, err);
                        false
                    },
                };
                let alias = match peripheral.properties().await {
                    Ok(Some(properties)) => properties.local_name.unwrap_or_else(|| path.clone()),
                    _ => path.clone(),
                };

                devices.push(KnownDevice { path, alias, connected });
            }
        }

        Ok(devices)
    }
}
