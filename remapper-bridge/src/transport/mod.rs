//! Broker transports.
//!
//! [`EventBridgeClient`](crate::EventBridgeClient) talks to the broker only
//! through the [`Transport`] trait. The client owns connection state and
//! timeouts. A transport only moves bytes.

use async_trait::async_trait;

use crate::config::BridgeConfig;
use crate::error::Result;

#[cfg(any(test, feature = "test-util"))]
pub mod mock;
#[cfg(feature = "mqtt")]
pub mod mqtt;

#[cfg(feature = "mqtt")]
pub use mqtt::MqttTransport;

/// A broker connection.
#[async_trait]
pub trait Transport: Send {
    /// Open a session to the broker described by `config`.
    ///
    /// Any previous session held by the transport is discarded first.
    async fn connect(&mut self, config: &BridgeConfig) -> Result<()>;

    /// Hand a message to the broker.
    async fn publish(&mut self, topic: &str, qos: u8, retain: bool, payload: Vec<u8>)
    -> Result<()>;

    /// Close the current session.
    async fn disconnect(&mut self) -> Result<()>;

    /// Whether the session opened by the last successful `connect` is still up.
    fn is_alive(&self) -> bool;
}
