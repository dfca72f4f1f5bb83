use std::sync::Arc;
use futures::SinkExt;
use futures::channel::mpsc::Sender;
use log::{info, warn};
use tokio::spawn;
use tokio::task::JoinHandle;
use tokio::time::{interval, Duration, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::device::transport::{with_deadline, KnownDevice, Transport};

/**
 * Polls the bluetooth stack for the devices it knows and their connection state, and sends each
 * snapshot to `sender`. The first poll happens right away. A failed poll is logged and skipped so
 * the registry keeps its last state.
 */
pub fn presence_watcher(
    cancel: CancellationToken,
    transport: Arc<dyn Transport>,
    poll_interval: Duration,
    mut sender: Sender<Vec<KnownDevice>>,
) -> JoinHandle<()> {
    spawn(async move {
        let mut polls = interval(poll_interval);
        polls.set_missed_tick_behavior(MissedTickBehavior::Delay);

        'mainloop: loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    break 'mainloop;
                },
                _ = polls.tick() => {
                    let devices = match with_deadline(transport.list_known_devices()).await {
                        Ok(devices) => devices,
                        Err(err) => {
                            warn!("Failed to list known devices: {}", err);
                            continue 'mainloop;
                        },
                    };

                    if sender.send(devices).await.is_err() {
                        break 'mainloop;
                    }
                },
            }
        }

        info!("Presence watcher stopped");
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use async_trait::async_trait;
    use futures::StreamExt;
    use futures::channel::mpsc::channel;
    use crate::device::transport::{DiscoveryFilter, VisibleDevice};
    use crate::error::TransportError;

    struct PollingTransport {
        polls: Mutex<u32>,
    }

    #[async_trait]
    impl Transport for PollingTransport {
        async fn start_discovery(&self, _filter: &DiscoveryFilter) -> Result<(), TransportError> {
            Ok(())
        }

        async fn stop_discovery(&self) -> Result<(), TransportError> {
            Ok(())
        }

        async fn list_visible_devices(&self) -> Result<Vec<Result<VisibleDevice, TransportError>>, TransportError> {
            Ok(Vec::new())
        }

        async fn list_known_devices(&self) -> Result<Vec<KnownDevice>, TransportError> {
            let mut polls = self.polls.lock().unwrap();
            *polls += 1;
            // every second poll fails
            if *polls % 2 == 0 {
                return Err(TransportError::NoAdapter);
            }
            Ok(vec![KnownDevice {
                path: String::from("AA:BB:CC:DD:EE:FF"),
                alias: format!("poll {}", *polls),
                connected: true,
            }])
        }
    }

    #[tokio::test(start_paused = true)]
    async fn failed_polls_are_skipped() {
        let transport = Arc::new(PollingTransport { polls: Mutex::new(0) });
        let (sender, mut receiver) = channel(4);
        let cancel = CancellationToken::new();
        let handle = presence_watcher(cancel.clone(), transport.clone(), Duration::from_secs(5), sender);

        let first = receiver.next().await.unwrap();
        assert_eq!(first[0].alias, "poll 1");
        let second = receiver.next().await.unwrap();
        assert_eq!(second[0].alias, "poll 3");

        cancel.cancel();
        handle.await.unwrap();
        assert_eq!(*transport.polls.lock().unwrap(), 3);
    }
}
