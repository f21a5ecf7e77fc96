//! Message bodies published to the broker.

use serde::{Deserialize, Serialize};

use remapper_common::current_timestamp_millis;

/// Label used when neither the event nor the config names a device.
pub const UNKNOWN_DEVICE: &str = "unknown";

/// A remap event as published on the bridge topic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventMessage {
    /// Source device label.
    pub device: String,
    /// Action name from the mapping that fired.
    pub action: String,
    /// Unix epoch milliseconds when the message was built.
    pub timestamp: i64,
    /// Optional extra data supplied by the caller.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<serde_json::Value>,
}

impl EventMessage {
    /// Create a message stamped with the current time.
    pub fn new(
        device: impl Into<String>,
        action: impl Into<String>,
        payload: Option<serde_json::Value>,
    ) -> Self {
        Self {
            device: device.into(),
            action: action.into(),
            timestamp: current_timestamp_millis(),
            payload,
        }
    }
}

/// An event queued for forwarding to the broker.
#[derive(Debug, Clone, PartialEq)]
pub struct BridgeEvent {
    /// Source device label; may be empty to use the configured default.
    pub source_label: String,
    /// Action name.
    pub action: String,
    /// Optional extra data.
    pub payload: Option<serde_json::Value>,
}

impl BridgeEvent {
    /// Create a new bridge event without payload.
    pub fn new(source_label: impl Into<String>, action: impl Into<String>) -> Self {
        Self {
            source_label: source_label.into(),
            action: action.into(),
            payload: None,
        }
    }

    /// Attach a payload.
    pub fn with_payload(mut self, payload: serde_json::Value) -> Self {
        self.payload = Some(payload);
        self
    }
}
