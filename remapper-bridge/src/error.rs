//! Error types for the event bridge.

use thiserror::Error;

/// Result type alias using [`BridgeError`].
pub type Result<T> = std::result::Result<T, BridgeError>;

/// Errors that can occur in the event bridge.
///
/// Only configuration and construction errors ever leave the crate's public
/// operations. Connectivity and publish failures are converted to boolean
/// outcomes by [`EventBridgeClient`](crate::EventBridgeClient).
#[derive(Error, Debug)]
pub enum BridgeError {
    /// Configuration file not found.
    #[error("Configuration file not found: {path}")]
    ConfigNotFound { path: String },

    /// Configuration document is not well-formed.
    #[error("Failed to parse configuration: {0}")]
    ConfigParse(String),

    /// Configuration is incomplete or out of range.
    #[error("Configuration validation failed: {0}")]
    ConfigValidation(String),

    /// The broker client capability is not available in this build.
    #[error("MQTT support unavailable: {0}")]
    DependencyUnavailable(String),

    /// The broker could not be reached or refused the session.
    #[error("Connectivity failure: {0}")]
    Connectivity(String),

    /// Publishing a message failed.
    #[error("Failed to publish to {topic}: {message}")]
    Publish { topic: String, message: String },

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl BridgeError {
    /// Create a configuration validation error.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::ConfigValidation(msg.into())
    }

    /// Create a connectivity error.
    pub fn connectivity(msg: impl Into<String>) -> Self {
        Self::Connectivity(msg.into())
    }

    /// Create a publish error.
    pub fn publish(topic: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Publish {
            topic: topic.into(),
            message: msg.into(),
        }
    }
}

impl From<serde_json::Error> for BridgeError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}
