//! Broker client with an explicit connection state machine.

use std::time::Duration;

use serde_json::{Value, json};
use tokio::time::timeout;

use crate::config::BridgeConfig;
use crate::error::{BridgeError, Result};
use crate::message::{EventMessage, UNKNOWN_DEVICE};
use crate::transport::Transport;

/// Default bound on connect, publish and disconnect.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Action name used by [`EventBridgeClient::test_connection`].
pub const TEST_ACTION: &str = "connection_test";

/// Connection state of an [`EventBridgeClient`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

/// Publishes remap events to the configured broker topic.
///
/// Network failures never surface as errors. [`connect`](Self::connect) and
/// [`publish_event`](Self::publish_event) report them as `false` and log the
/// reason, so the caller can keep processing input regardless of broker
/// health.
pub struct EventBridgeClient {
    config: BridgeConfig,
    transport: Box<dyn Transport>,
    state: ConnectionState,
    timeout: Duration,
}

impl std::fmt::Debug for EventBridgeClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBridgeClient")
            .field("endpoint", &self.config.endpoint())
            .field("topic", &self.config.topic)
            .field("state", &self.state)
            .finish()
    }
}

#[cfg(feature = "mqtt")]
fn default_transport() -> Result<Box<dyn Transport>> {
    Ok(Box::new(crate::transport::MqttTransport::new(
        crate::transport::MqttTransport::process_client_id(),
    )))
}

#[cfg(not(feature = "mqtt"))]
fn default_transport() -> Result<Box<dyn Transport>> {
    Err(BridgeError::DependencyUnavailable(
        "built without the `mqtt` feature".to_string(),
    ))
}

impl EventBridgeClient {
    /// Create a client using the MQTT transport.
    ///
    /// No connection is made until [`connect`](Self::connect) or the first
    /// [`publish_event`](Self::publish_event).
    pub fn new(config: BridgeConfig) -> Result<Self> {
        config.validate()?;
        let transport = default_transport()?;
        Ok(Self::with_transport(config, transport))
    }

    /// Create a client on top of an arbitrary transport.
    ///
    /// The configuration is used as given; call [`BridgeConfig::validate`]
    /// first if it comes from an untrusted source.
    pub fn with_transport(config: BridgeConfig, transport: Box<dyn Transport>) -> Self {
        Self {
            config,
            transport,
            state: ConnectionState::Disconnected,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Override the connect/publish/disconnect bound.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Connected and the transport still reports a live session.
    pub fn is_connected(&self) -> bool {
        self.state == ConnectionState::Connected && self.transport.is_alive()
    }

    /// Open a session to the broker.
    pub async fn connect(&mut self) -> bool {
        if self.is_connected() {
            return true;
        }

        let endpoint = self.config.endpoint();
        self.state = ConnectionState::Connecting;
        tracing::info!(broker = %endpoint, "Connecting to MQTT broker");

        let outcome = match timeout(self.timeout, self.transport.connect(&self.config)).await {
            Ok(result) => result,
            Err(_) => Err(BridgeError::connectivity(format!(
                "timed out after {:?}",
                self.timeout
            ))),
        };

        match outcome {
            Ok(()) => {
                self.state = ConnectionState::Connected;
                tracing::info!(broker = %endpoint, "Connected to MQTT broker");
                true
            }
            Err(e) => {
                self.state = ConnectionState::Disconnected;
                tracing::warn!(broker = %endpoint, error = %e, "Failed to connect to MQTT broker");
                false
            }
        }
    }

    /// Publish one remap event, connecting first if needed.
    pub async fn publish_event(
        &mut self,
        source_label: &str,
        action: &str,
        payload: Option<Value>,
    ) -> bool {
        if self.state == ConnectionState::Connected && !self.transport.is_alive() {
            tracing::warn!("MQTT session lost, will reconnect");
            self.state = ConnectionState::Disconnected;
        }

        if self.state != ConnectionState::Connected && !self.connect().await {
            tracing::debug!(action, "Dropping event, broker unavailable");
            return false;
        }

        let message = EventMessage::new(self.resolve_label(source_label), action, payload);
        let body = match serde_json::to_vec(&message) {
            Ok(body) => body,
            Err(e) => {
                tracing::error!(action, error = %e, "Failed to encode event");
                return false;
            }
        };

        let topic = self.config.topic.clone();
        let publish = self
            .transport
            .publish(&topic, self.config.qos, self.config.retain, body);
        let outcome = match timeout(self.timeout, publish).await {
            Ok(result) => result,
            Err(_) => Err(BridgeError::publish(&topic, "timed out")),
        };

        match outcome {
            Ok(()) => {
                tracing::debug!(
                    topic = %topic,
                    device = %message.device,
                    action,
                    "Published event"
                );
                true
            }
            Err(e) => {
                tracing::warn!(error = %e, "Failed to publish event");
                self.state = ConnectionState::Disconnected;
                false
            }
        }
    }

    /// Close the session if one is open.
    pub async fn disconnect(&mut self) {
        if self.state == ConnectionState::Disconnected {
            tracing::debug!("MQTT client already disconnected");
            return;
        }
        if let Err(e) = self.close_session().await {
            tracing::warn!(error = %e, "Error while disconnecting from MQTT broker");
        }
    }

    /// Connect, publish a synthetic event and disconnect.
    ///
    /// The message names the first stage that failed.
    pub async fn test_connection(&mut self) -> (bool, String) {
        let endpoint = self.config.endpoint();
        let topic = self.config.topic.clone();

        if !self.connect().await {
            return (
                false,
                format!("Could not connect to MQTT broker at {}", endpoint),
            );
        }

        let label = self.resolve_label("");
        if !self
            .publish_event(&label, TEST_ACTION, Some(json!({ "test": true })))
            .await
        {
            if let Err(e) = self.close_session().await {
                tracing::debug!(error = %e, "Cleanup after failed test publish");
            }
            return (
                false,
                format!(
                    "Connected to MQTT broker at {} but failed to publish to {}",
                    endpoint, topic
                ),
            );
        }

        if let Err(e) = self.close_session().await {
            return (
                false,
                format!("Published test message but disconnect failed: {}", e),
            );
        }

        (
            true,
            format!(
                "Successfully connected to {} and published to {}",
                endpoint, topic
            ),
        )
    }

    async fn close_session(&mut self) -> Result<()> {
        let outcome = match timeout(self.timeout, self.transport.disconnect()).await {
            Ok(result) => result,
            Err(_) => Err(BridgeError::connectivity("disconnect timed out")),
        };
        self.state = ConnectionState::Disconnected;
        if outcome.is_ok() {
            tracing::info!(broker = %self.config.endpoint(), "Disconnected from MQTT broker");
        }
        outcome
    }

    fn resolve_label(&self, source_label: &str) -> String {
        if !source_label.is_empty() {
            return source_label.to_string();
        }
        self.config
            .default_device_name
            .clone()
            .filter(|name| !name.is_empty())
            .unwrap_or_else(|| UNKNOWN_DEVICE.to_string())
    }
}
