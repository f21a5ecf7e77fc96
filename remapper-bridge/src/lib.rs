//! MQTT event bridge.
//!
//! Publishes remap actions to an MQTT broker so home-automation systems can
//! react to key presses. The pieces are:
//!
//! - [`BridgeConfig`]: the `mqtt_config.json` document
//! - [`EventBridgeClient`]: connection state machine over a [`Transport`]
//! - [`BridgeForwarder`]: the task that owns the client, fed by a
//!   non-blocking [`BridgeSender`]
//!
//! Broker outages never fail a caller. They show up as `false` results and
//! log lines.

pub mod client;
pub mod config;
pub mod error;
pub mod forwarder;
pub mod message;
pub mod transport;

pub use client::{ConnectionState, DEFAULT_TIMEOUT, EventBridgeClient, TEST_ACTION};
pub use config::{BridgeConfig, CONFIG_FILE_NAME, REQUIRED_FIELDS};
pub use error::{BridgeError, Result};
pub use forwarder::{BridgeForwarder, BridgeHandle, BridgeSender};
pub use message::{BridgeEvent, EventMessage, UNKNOWN_DEVICE};
pub use transport::Transport;
