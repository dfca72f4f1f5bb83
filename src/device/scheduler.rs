use std::sync::Arc;
use futures::{SinkExt, StreamExt};
use futures::channel::mpsc::{channel, Sender};
use log::{debug, info, warn};
use tokio::spawn;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Duration, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::device::constants::{
    FULL_MATCH_IDLE_TICKS, PARTIAL_MATCH_IDLE_TICKS, SCAN_TICK, STOP_DISCOVERY_TICK, TICK_INTERVAL,
};
use crate::device::matcher::{match_devices, MatchOutcome};
use crate::device::source::AdvertisementSource;
use crate::device::transport::{with_deadline, DiscoveryFilter, DiscoveryTransport, Transport};
use crate::device::types::{DeviceIdentity, MonitorEvent, SchedulerState};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulerSettings {
    pub tick_interval: Duration,
    pub full_match_idle_ticks: u32,
    pub partial_match_idle_ticks: u32,
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        SchedulerSettings {
            tick_interval: Duration::from_secs(TICK_INTERVAL),
            full_match_idle_ticks: FULL_MATCH_IDLE_TICKS,
            partial_match_idle_ticks: PARTIAL_MATCH_IDLE_TICKS,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickAction {
    Scan,
    StopDiscovery,
    StartDiscovery,
}

/**
 * Tick counter of the discovery duty cycle. Counts from 0 to `delay` and wraps; scans at tick 1,
 * stops discovery at tick 2 and restarts it at tick `delay`. The delay adapts to how well the last
 * scan matched.
 */
#[derive(Debug, Clone)]
pub struct DutyCycle {
    counter: u32,
    delay: u32,
    discovering: bool,
    full_match_idle_ticks: u32,
    partial_match_idle_ticks: u32,
}

impl DutyCycle {
    pub fn new(settings: &SchedulerSettings) -> Self {
        DutyCycle {
            counter: 0,
            delay: settings.partial_match_idle_ticks,
            discovering: false,
            full_match_idle_ticks: settings.full_match_idle_ticks,
            partial_match_idle_ticks: settings.partial_match_idle_ticks,
        }
    }

    pub fn counter(&self) -> u32 {
        self.counter
    }

    pub fn delay(&self) -> u32 {
        self.delay
    }

    pub fn is_discovering(&self) -> bool {
        self.discovering
    }

    pub fn set_discovering(&mut self, discovering: bool) {
        self.discovering = discovering;
    }

    pub fn state(&self) -> SchedulerState {
        if self.discovering {
            SchedulerState::Discovering
        } else {
            SchedulerState::Stopped
        }
    }

    pub fn tick(&mut self) -> Option<TickAction> {
        let action = match self.counter {
            SCAN_TICK if self.discovering => Some(TickAction::Scan),
            STOP_DISCOVERY_TICK if self.discovering => Some(TickAction::StopDiscovery),
            counter if counter == self.delay => Some(TickAction::StartDiscovery),
            _ => None,
        };

        self.counter = if self.counter >= self.delay { 0 } else { self.counter + 1 };
        action
    }

    /// Picks the next idle window and returns it.
    pub fn record_match(&mut self, matched_count: usize, known_count: usize) -> u32 {
        self.delay = if matched_count == known_count {
            self.full_match_idle_ticks
        } else {
            self.partial_match_idle_ticks
        };
        self.delay
    }
}

enum CycleEvent {
    DiscoveryStarted(bool),
    Matched(MatchOutcome),
}

async fn start_discovery(transport: &dyn Transport, filter: &DiscoveryFilter) -> bool {
    match with_deadline(transport.start_discovery(filter)).await {
        Ok(()) => true,
        Err(err) => {
            warn!("Start discovery failed: {}", err);
            false
        },
    }
}

async fn stop_discovery(transport: &dyn Transport) {
    if let Err(err) = with_deadline(transport.stop_discovery()).await {
        warn!("Stop discovery failed: {}", err);
    }
}

/// Never waits for the presentation side; an event that does not fit is dropped.
fn publish(publisher: &mut Sender<MonitorEvent>, event: MonitorEvent) {
    if let Err(err) = publisher.try_send(event) {
        if err.is_full() {
            warn!("Presentation is not keeping up, dropping monitor event");
        } else {
            warn!("Failed to publish monitor event: {}", err);
        }
    }
}

fn publish_state(publisher: &mut Sender<MonitorEvent>, previous: &mut Option<SchedulerState>, state: SchedulerState) {
    if previous.as_ref() != Some(&state) {
        publish(publisher, MonitorEvent::StateChange(state));
        *previous = Some(state);
    }
}

/// Runs the duty cycle for a fixed set of identities until `cancel` fires.
async fn run_duty_cycle(
    cancel: CancellationToken,
    identities: Arc<Vec<DeviceIdentity>>,
    transport: Arc<dyn Transport>,
    source: Arc<AdvertisementSource>,
    settings: SchedulerSettings,
    mut publisher: Sender<MonitorEvent>,
) {
    let filter = DiscoveryFilter {
        transport: DiscoveryTransport::Le,
        rssi_floor: source.settings().min_rssi,
    };
    let (event_sender, mut event_receiver) = channel::<CycleEvent>(16);
    let mut duty_cycle = DutyCycle::new(&settings);
    let mut previous_state: Option<SchedulerState> = None;

    info!("Tracking {} device(s)", identities.len());

    // every transport call runs in its own task so that a slow reply never holds up the timer
    let spawn_start = |mut sender: Sender<CycleEvent>| {
        let transport = transport.clone();
        let filter = filter.clone();
        spawn(async move {
            let started = start_discovery(transport.as_ref(), &filter).await;
            let _ = sender.send(CycleEvent::DiscoveryStarted(started)).await;
        })
    };

    // set while a start has not reported back yet
    let mut pending_start: Option<JoinHandle<()>> = Some(spawn_start(event_sender.clone()));

    let mut ticks = interval_at(Instant::now() + settings.tick_interval, settings.tick_interval);
    ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);

    'mainloop: loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                break 'mainloop;
            },
            _ = ticks.tick() => {
                let counter = duty_cycle.counter();
                match duty_cycle.tick() {
                    Some(TickAction::Scan) => {
                        debug!("Tick {}: scanning", counter);
                        publish_state(&mut publisher, &mut previous_state, SchedulerState::ScanAndPublish);

                        let source = source.clone();
                        let identities = identities.clone();
                        let mut sender = event_sender.clone();
                        spawn(async move {
                            let scanned = source.scan().await;
                            let outcome = match_devices(&identities, scanned);
                            let _ = sender.send(CycleEvent::Matched(outcome)).await;
                        });
                    },
                    Some(TickAction::StopDiscovery) => {
                        debug!("Tick {}: stopping discovery", counter);
                        duty_cycle.set_discovering(false);
                        publish_state(&mut publisher, &mut previous_state, duty_cycle.state());

                        let transport = transport.clone();
                        spawn(async move {
                            stop_discovery(transport.as_ref()).await;
                        });
                    },
                    Some(TickAction::StartDiscovery) => {
                        debug!("Tick {}: starting discovery", counter);
                        pending_start = Some(spawn_start(event_sender.clone()));
                    },
                    None => {},
                }
            },
            Some(event) = event_receiver.next() => {
                match event {
                    CycleEvent::DiscoveryStarted(started) => {
                        pending_start = None;
                        duty_cycle.set_discovering(started);
                        publish_state(&mut publisher, &mut previous_state, duty_cycle.state());
                    },
                    CycleEvent::Matched(outcome) => {
                        let delay = duty_cycle.record_match(outcome.matched_count, outcome.known_count());
                        debug!(
                            "Matched {} of {} device(s), next discovery in {} ticks",
                            outcome.matched_count,
                            outcome.known_count(),
                            delay,
                        );

                        if !outcome.devices.is_empty() {
                            publish(&mut publisher, MonitorEvent::Devices(outcome.devices));
                        }
                        publish_state(&mut publisher, &mut previous_state, duty_cycle.state());
                    },
                }
            },
        }
    }

    // a start still in flight would turn discovery back on after the stop
    if let Some(start) = pending_start.take() {
        if let Err(err) = start.await {
            warn!("Start discovery task failed: {}", err);
        }
        stop_discovery(transport.as_ref()).await;
    } else if duty_cycle.is_discovering() {
        stop_discovery(transport.as_ref()).await;
    }
}

/**
 * Starts and stops the duty cycle as the set of known identities changes. A change restarts the
 * cycle from scratch; an empty set leaves the scheduler idle.
 */
pub fn discovery_scheduler(
    cancel: CancellationToken,
    mut identities: watch::Receiver<Vec<DeviceIdentity>>,
    transport: Arc<dyn Transport>,
    source: Arc<AdvertisementSource>,
    settings: SchedulerSettings,
    mut publisher: Sender<MonitorEvent>,
) -> JoinHandle<()> {
    spawn(async move {
        let mut cycle: Option<(CancellationToken, JoinHandle<()>)> = None;

        'mainloop: loop {
            let known = identities.borrow_and_update().clone();

            if let Some((cycle_cancel, handle)) = cycle.take() {
                cycle_cancel.cancel();
                if let Err(err) = handle.await {
                    warn!("Duty cycle task failed: {}", err);
                }
            }

            if known.is_empty() {
                info!("No connected devices with a model, discovery scheduler is idle");
                publish(&mut publisher, MonitorEvent::StateChange(SchedulerState::Idle));
            } else {
                let cycle_cancel = cancel.child_token();
                let handle = spawn(run_duty_cycle(
                    cycle_cancel.clone(),
                    Arc::new(known),
                    transport.clone(),
                    source.clone(),
                    settings,
                    publisher.clone(),
                ));
                cycle = Some((cycle_cancel, handle));
            }

            tokio::select! {
                _ = cancel.cancelled() => {
                    break 'mainloop;
                },
                changed = identities.changed() => {
                    if changed.is_err() {
                        // registry is gone, keep running with the last known identities
                        cancel.cancelled().await;
                        break 'mainloop;
                    }
                    info!("Device registry changed, restarting discovery scheduler");
                },
            }
        }

        if let Some((cycle_cancel, handle)) = cycle.take() {
            cycle_cancel.cancel();
            if let Err(err) = handle.await {
                warn!("Duty cycle task failed: {}", err);
            }
        }
        info!("Discovery scheduler stopped");
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn actions(duty_cycle: &mut DutyCycle, ticks: usize) -> Vec<Option<TickAction>> {
        (0..ticks).map(|_| duty_cycle.tick()).collect()
    }

    #[test]
    fn adaptive_delay() {
        let mut duty_cycle = DutyCycle::new(&SchedulerSettings::default());
        assert_eq!(duty_cycle.delay(), 3);
        assert_eq!(duty_cycle.record_match(3, 3), 12);
        assert_eq!(duty_cycle.record_match(1, 3), 3);
        assert_eq!(duty_cycle.record_match(0, 2), 3);
        assert_eq!(duty_cycle.record_match(0, 0), 12);
    }

    #[test]
    fn short_cycle() {
        let mut duty_cycle = DutyCycle::new(&SchedulerSettings::default());
        duty_cycle.set_discovering(true);

        let first = actions(&mut duty_cycle, 2);
        assert_eq!(first, [None, Some(TickAction::Scan)]);

        assert_eq!(duty_cycle.tick(), Some(TickAction::StopDiscovery));
        duty_cycle.set_discovering(false);
        assert_eq!(duty_cycle.tick(), Some(TickAction::StartDiscovery));
        assert_eq!(duty_cycle.counter(), 0);

        duty_cycle.set_discovering(true);
        assert_eq!(actions(&mut duty_cycle, 2), [None, Some(TickAction::Scan)]);
    }

    #[test]
    fn long_cycle_after_full_match() {
        let mut duty_cycle = DutyCycle::new(&SchedulerSettings::default());
        duty_cycle.set_discovering(true);
        assert_eq!(actions(&mut duty_cycle, 2), [None, Some(TickAction::Scan)]);
        duty_cycle.record_match(2, 2);

        assert_eq!(duty_cycle.tick(), Some(TickAction::StopDiscovery));
        duty_cycle.set_discovering(false);

        // ticks 3..=11 are idle, tick 12 restarts discovery
        assert!(actions(&mut duty_cycle, 9).iter().all(Option::is_none));
        assert_eq!(duty_cycle.tick(), Some(TickAction::StartDiscovery));
        assert_eq!(duty_cycle.counter(), 0);
    }

    #[test]
    fn no_scan_without_discovery() {
        let mut duty_cycle = DutyCycle::new(&SchedulerSettings::default());
        assert_eq!(actions(&mut duty_cycle, 4), [None, None, None, Some(TickAction::StartDiscovery)]);
    }

    #[test]
    fn shrinking_delay_still_restarts() {
        let mut duty_cycle = DutyCycle::new(&SchedulerSettings::default());
        duty_cycle.record_match(1, 1);
        assert!(actions(&mut duty_cycle, 6).iter().all(Option::is_none));

        // counter is past the new delay: wrap, then restart at the delay
        duty_cycle.record_match(0, 1);
        assert_eq!(duty_cycle.tick(), None);
        assert_eq!(duty_cycle.counter(), 0);
        assert_eq!(actions(&mut duty_cycle, 4), [None, None, None, Some(TickAction::StartDiscovery)]);
    }
}
