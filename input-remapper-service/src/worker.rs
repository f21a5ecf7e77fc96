//! Per-device remapping loop.

use serde_json::json;
use tokio::sync::watch;

use remapper_bridge::{BridgeEvent, BridgeSender};
use remapper_common::InputEvent;

use crate::capture::EventSource;
use crate::mapping::{HandlerChain, HandlerOutput};
use crate::registry::InjectionTarget;

/// Why a worker returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerExit {
    /// The stop signal was received.
    Stopped,
    /// The capture source closed.
    SourceClosed,
}

/// Reads one device, remaps, injects, and forwards actions.
pub struct Worker {
    device: String,
    chain: HandlerChain,
    target: InjectionTarget,
    source: Box<dyn EventSource>,
    bridge: Option<BridgeSender>,
}

impl Worker {
    pub fn new(
        device: impl Into<String>,
        chain: HandlerChain,
        target: InjectionTarget,
        source: Box<dyn EventSource>,
        bridge: Option<BridgeSender>,
    ) -> Self {
        Self {
            device: device.into(),
            chain,
            target,
            source,
            bridge,
        }
    }

    /// Run until stopped or until the source closes.
    ///
    /// The stop signal is checked between events. An event that is being
    /// processed is finished first.
    pub async fn run(mut self, mut stop: watch::Receiver<bool>) -> WorkerExit {
        tracing::info!(
            device = %self.device,
            output = %self.target.name(),
            mappings = self.chain.len(),
            "Worker started"
        );

        loop {
            tokio::select! {
                biased;
                changed = stop.changed() => {
                    if changed.is_err() || *stop.borrow() {
                        return WorkerExit::Stopped;
                    }
                }
                event = self.source.next_event() => match event {
                    Some(event) => self.process(event).await,
                    None => {
                        tracing::info!(device = %self.device, "Capture source closed");
                        return WorkerExit::SourceClosed;
                    }
                },
            }
        }
    }

    async fn process(&mut self, event: InputEvent) {
        for output in self.chain.handle(&event) {
            match output {
                HandlerOutput::Inject(remapped) => {
                    if let Err(e) = self.target.inject(&remapped).await {
                        tracing::warn!(device = %self.device, error = %e, "Failed to inject event");
                    }
                }
                HandlerOutput::Action(action) => {
                    let Some(bridge) = &self.bridge else {
                        continue;
                    };
                    tracing::debug!(device = %self.device, action = %action, "Forwarding action");
                    let payload = json!({
                        "type": event.event_type,
                        "code": event.code,
                        "value": event.value,
                    });
                    bridge.forward(BridgeEvent::new(&self.device, action).with_payload(payload));
                }
            }
        }
    }
}
