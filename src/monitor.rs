use std::collections::HashMap;
use std::io::Write;
use std::sync::Arc;
use futures::StreamExt;
use futures::channel::mpsc::channel;
use log::{debug, info, warn};
use serde::Serialize;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;

use crate::Args;
use crate::config::io::ConfigIO;
use crate::config::types::Config;
use crate::device::decoder::decode;
use crate::device::models::find_model;
use crate::device::presence::presence_watcher;
use crate::device::registry::DeviceRegistry;
use crate::device::scheduler::discovery_scheduler;
use crate::device::source::AdvertisementSource;
use crate::device::transport::{
    with_deadline, BtleplugTransport, DiscoveryFilter, DiscoveryTransport, KnownDevice, Transport,
};
use crate::device::types::{BatteryInfo, BatteryReport, MatchedDevice, MonitorEvent};
use crate::error::{AppRunError, ConfigError};

/// One line item of the published list, as written to stdout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceStatus {
    pub path: String,
    pub alias: String,
    pub model: String,
    pub model_name: Option<&'static str>,
    pub report: BatteryReport,
    pub info: Option<BatteryInfo>,
}

/**
 * Keeps what is currently displayed per device. A stale report leaves the previous one in place;
 * a device that never had fresh data shows the stale report.
 */
#[derive(Debug, Default)]
pub struct DisplayBoard {
    reports: HashMap<String, BatteryReport>,
}

impl DisplayBoard {
    pub fn apply(&mut self, devices: &[MatchedDevice]) -> Vec<DeviceStatus> {
        devices
            .iter()
            .map(|device| {
                let path = &device.identity.path;
                if !device.report.is_stale() || !self.reports.contains_key(path) {
                    self.reports.insert(path.clone(), device.report.clone());
                }

                let displayed = MatchedDevice {
                    identity: device.identity.clone(),
                    report: self.reports[path].clone(),
                };

                DeviceStatus {
                    path: path.clone(),
                    alias: device.identity.alias.clone(),
                    model: device.identity.model_code.clone(),
                    model_name: find_model(&device.identity.model_code).map(|model| model.name),
                    info: displayed.info(),
                    report: displayed.report,
                }
            })
            .collect()
    }
}

/// Splits `<PATH>=<MODEL>`; the path may itself contain `=`.
pub fn parse_model_assignment(value: &str) -> Option<(&str, &str)> {
    let (path, model) = value.rsplit_once('=')?;
    if path.is_empty() || model.is_empty() {
        return None;
    }
    Some((path, model))
}

async fn apply_model_assignments(
    assignments: &[String],
    registry: &mut DeviceRegistry,
    config: &mut Config,
    config_io: &ConfigIO,
) -> Result<(), ConfigError> {
    if assignments.is_empty() {
        return Ok(());
    }

    for assignment in assignments {
        let (path, model) = parse_model_assignment(assignment)
            .ok_or_else(|| ConfigError::InvalidModel(assignment.clone()))?;
        if registry.set_model(path, model)? {
            info!("Assigned model {} to {}", model, path);
        } else {
            warn!("No registered device with path {}", path);
        }
    }

    config.devices = registry.entries().cloned().collect();
    config_io.save(config).await
}

async fn apply_presence(
    devices: &[KnownDevice],
    registry: &mut DeviceRegistry,
    config: &mut Config,
    config_io: &ConfigIO,
) {
    if !registry.sync_presence(devices) {
        return;
    }

    if !registry.has_trackable() {
        info!("No connected device has a model assigned, use --set-model <PATH>=<MODEL> to track one");
    }

    config.devices = registry.entries().cloned().collect();
    if let Err(err) = config_io.save(config).await {
        warn!("Failed to save device registry: {}", err);
    }
}

fn write_statuses(statuses: &[DeviceStatus]) -> Result<(), AppRunError> {
    let line = serde_json::to_string(statuses)?;
    let mut stdout = std::io::stdout().lock();
    writeln!(stdout, "{}", line)?;
    stdout.flush()?;
    Ok(())
}

pub async fn run_monitor(args: Args) -> Result<(), AppRunError> {
    let config_io = ConfigIO::new_sync(args.config.clone())?;
    let mut locker = config_io.locker()?;
    let _lock_guard = locker.lock()?;

    let mut config = config_io.read().await?;
    let mut registry = DeviceRegistry::new(config.devices.clone());
    apply_model_assignments(&args.set_model, &mut registry, &mut config, &config_io).await?;

    let transport: Arc<dyn Transport> = Arc::new(BtleplugTransport::new().await?);
    let source = Arc::new(AdvertisementSource::new(transport.clone(), config.source_settings()));

    let cancel = CancellationToken::new();
    let (presence_sender, mut presence_receiver) = channel::<Vec<KnownDevice>>(4);
    let presence_handle = presence_watcher(
        cancel.clone(),
        transport.clone(),
        config.scheduler_settings().tick_interval,
        presence_sender,
    );

    let (sender, mut receiver) = channel::<MonitorEvent>(64);
    let handle = discovery_scheduler(
        cancel.clone(),
        registry.subscribe(),
        transport,
        source,
        config.scheduler_settings(),
        sender,
    );

    let mut board = DisplayBoard::default();

    'mainloop: loop {
        tokio::select! {
            result = tokio::signal::ctrl_c() => {
                if let Err(err) = result {
                    warn!("Failed to listen for ctrl-c: {}", err);
                }
                info!("Shutting down");
                break 'mainloop;
            },
            event = receiver.next() => match event {
                None => break 'mainloop,
                Some(MonitorEvent::StateChange(state)) => debug!("Scheduler state: {:?}", state),
                Some(MonitorEvent::Devices(devices)) => write_statuses(&board.apply(&devices))?,
            },
            Some(devices) = presence_receiver.next() => {
                apply_presence(&devices, &mut registry, &mut config, &config_io).await;
            },
        }
    }

    cancel.cancel();
    if let Err(err) = handle.await {
        warn!("Discovery scheduler failed: {}", err);
    }
    drop(presence_receiver);
    if let Err(err) = presence_handle.await {
        warn!("Presence watcher failed: {}", err);
    }

    // keeps the registry (and so the scheduler's subscription) alive until the end
    drop(registry);
    Ok(())
}

/// Starts discovery once, logs every accessory advertisement in range, and stops again.
pub async fn run_dump(args: Args) -> Result<(), AppRunError> {
    let config_io = ConfigIO::new_sync(args.config.clone())?;
    let config = config_io.read().await?;

    let transport: Arc<dyn Transport> = Arc::new(BtleplugTransport::new().await?);
    let source = AdvertisementSource::new(transport.clone(), config.source_settings());
    let filter = DiscoveryFilter {
        transport: DiscoveryTransport::Le,
        rssi_floor: config.min_rssi,
    };

    if let Err(err) = with_deadline(transport.start_discovery(&filter)).await {
        warn!("Start discovery failed: {}", err);
    }
    sleep(config.scheduler_settings().tick_interval).await;

    let scanned = source.scan().await;
    if scanned.is_empty() {
        info!("No accessory advertisements in range");
    }

    for advertisement in &scanned {
        let report = decode(&advertisement.raw_bytes);
        info!("------------------------------------------");
        info!("Manufacturer data        : {}", advertisement.hex);
        info!("Rssi                     : {}", advertisement.rssi);
        info!("Model (4 characters)     : {}", advertisement.model_field());
        info!("Model (1 character)      : {}", advertisement.legacy_model_field());
        info!("Left level / charging    : {} / {}", report.left_level, report.left_status);
        info!("Right level / charging   : {} / {}", report.right_level, report.right_status);
        info!("Case level / charging    : {} / {}", report.case_level, report.case_status);
        info!("Single level / charging  : {} / {}", report.single_level, report.single_status);
    }

    if let Err(err) = with_deadline(transport.stop_discovery()).await {
        warn!("Stop discovery failed: {}", err);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::types::{DeviceIdentity, Stamp};

    fn device(path: &str, model: &str, report: BatteryReport) -> MatchedDevice {
        MatchedDevice {
            identity: DeviceIdentity {
                path: String::from(path),
                model_code: String::from(model),
                alias: String::from("Pods"),
            },
            report,
        }
    }

    fn fresh(level: i8) -> BatteryReport {
        BatteryReport {
            left_level: level,
            right_level: level,
            case_level: level,
            single_level: level,
            left_status: false,
            right_status: true,
            case_status: false,
            single_status: false,
            updated_time: Stamp::At(String::from("12:00:00")),
            updated_date: Stamp::At(String::from("09 Sat 2024")),
        }
    }

    #[test]
    fn stale_reports_keep_the_displayed_value() {
        let mut board = DisplayBoard::default();

        let first = board.apply(&[device("A", "0220", fresh(80))]);
        assert_eq!(first[0].report.left_level, 80);
        assert_eq!(first[0].model_name, Some("AirPods 1st Gen"));

        let second = board.apply(&[device("A", "0220", BatteryReport::stale())]);
        assert_eq!(second[0].report, fresh(80));
        assert!(matches!(second[0].info, Some(BatteryInfo::Dual { left_level: 80, right_charging: true, .. })));

        let third = board.apply(&[device("A", "0220", fresh(40))]);
        assert_eq!(third[0].report.left_level, 40);
    }

    #[test]
    fn never_seen_device_shows_stale_report() {
        let mut board = DisplayBoard::default();
        let statuses = board.apply(&[device("B", "A", BatteryReport::stale())]);
        assert!(statuses[0].report.is_stale());
        assert_eq!(statuses[0].info, Some(BatteryInfo::Single { level: -2, charging: false }));
    }

    #[test]
    fn model_assignments() {
        assert_eq!(parse_model_assignment("/org/bluez/hci0/dev_AA=0E20"), Some(("/org/bluez/hci0/dev_AA", "0E20")));
        assert_eq!(parse_model_assignment("a=b=A"), Some(("a=b", "A")));
        assert_eq!(parse_model_assignment("=0E20"), None);
        assert_eq!(parse_model_assignment("no-model"), None);
    }
}
