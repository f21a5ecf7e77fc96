//! Background task that owns the broker client.
//!
//! Workers never touch the broker. They hand [`BridgeEvent`]s to a
//! [`BridgeSender`], which enqueues without blocking. The forwarder task
//! drains the queue and publishes one event at a time.

use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::client::EventBridgeClient;
use crate::message::BridgeEvent;

/// Extra time granted to the task on shutdown beyond the client's own bounds.
const SHUTDOWN_SLACK: Duration = Duration::from_secs(1);

/// Entry point for starting a forwarder task.
pub struct BridgeForwarder;

impl BridgeForwarder {
    /// Spawn the forwarder task with a queue of `queue` events.
    pub fn spawn(client: EventBridgeClient, queue: usize) -> (BridgeHandle, BridgeSender) {
        let (tx, rx) = mpsc::channel(queue.max(1));
        let (stop_tx, stop_rx) = oneshot::channel();
        // An in-flight publish may need a connect and a publish; then comes the disconnect.
        let grace = client.timeout() * 3 + SHUTDOWN_SLACK;

        let task = tokio::spawn(run(client, rx, stop_rx));
        tracing::info!(queue, "MQTT bridge forwarder started");

        (
            BridgeHandle {
                stop: stop_tx,
                task,
                grace,
            },
            BridgeSender { tx },
        )
    }
}

/// Cloneable, non-blocking handle for submitting events.
#[derive(Debug, Clone)]
pub struct BridgeSender {
    tx: mpsc::Sender<BridgeEvent>,
}

impl BridgeSender {
    /// Enqueue an event. Returns false if it was dropped.
    pub fn forward(&self, event: BridgeEvent) -> bool {
        match self.tx.try_send(event) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(event)) => {
                tracing::warn!(action = %event.action, "Bridge queue full, dropping event");
                false
            }
            Err(mpsc::error::TrySendError::Closed(event)) => {
                tracing::debug!(action = %event.action, "Bridge stopped, dropping event");
                false
            }
        }
    }
}

/// Owner handle of the forwarder task.
#[derive(Debug)]
pub struct BridgeHandle {
    stop: oneshot::Sender<()>,
    task: JoinHandle<()>,
    grace: Duration,
}

impl BridgeHandle {
    /// Stop the task and disconnect from the broker.
    pub async fn shutdown(self) {
        let Self {
            stop,
            mut task,
            grace,
        } = self;

        if stop.send(()).is_err() {
            tracing::debug!("Bridge forwarder already exited");
        }

        match tokio::time::timeout(grace, &mut task).await {
            Ok(Ok(())) => tracing::info!("MQTT bridge stopped"),
            Ok(Err(e)) => tracing::error!(error = %e, "MQTT bridge task failed"),
            Err(_) => {
                tracing::warn!(?grace, "MQTT bridge did not stop in time, aborting");
                task.abort();
            }
        }
    }
}

async fn run(
    mut client: EventBridgeClient,
    mut rx: mpsc::Receiver<BridgeEvent>,
    mut stop: oneshot::Receiver<()>,
) {
    loop {
        tokio::select! {
            biased;
            _ = &mut stop => break,
            event = rx.recv() => match event {
                Some(event) => {
                    if !client
                        .publish_event(&event.source_label, &event.action, event.payload)
                        .await
                    {
                        tracing::debug!(action = %event.action, "Event not delivered");
                    }
                }
                None => break,
            },
        }
    }

    client.disconnect().await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BridgeConfig;
    use crate::transport::mock::MockTransport;

    #[tokio::test]
    async fn test_forward_and_shutdown() {
        let (transport, probe) = MockTransport::boxed();
        let client = EventBridgeClient::with_transport(BridgeConfig::default(), transport);
        let (handle, sender) = BridgeForwarder::spawn(client, 8);

        assert!(sender.forward(BridgeEvent::new("pad", "a")));
        for _ in 0..50 {
            if !probe.published().is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(probe.published().len(), 1);

        handle.shutdown().await;
        assert_eq!(probe.disconnects(), 1);
        assert!(!sender.forward(BridgeEvent::new("pad", "b")));
    }

    #[tokio::test]
    async fn test_full_queue_drops_events() {
        let (transport, probe) = MockTransport::boxed();
        probe.set_hang_connect(true);
        let client = EventBridgeClient::with_transport(BridgeConfig::default(), transport)
            .with_timeout(Duration::from_millis(100));
        let (handle, sender) = BridgeForwarder::spawn(client, 1);

        let accepted = (0..10)
            .filter(|i| sender.forward(BridgeEvent::new("pad", format!("a{}", i))))
            .count();
        assert!(accepted < 10);

        handle.shutdown().await;
    }
}
