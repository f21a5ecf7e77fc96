//! Error types for the service.

use thiserror::Error;

/// Result type alias using [`ServiceError`].
pub type Result<T> = std::result::Result<T, ServiceError>;

/// Errors raised by the orchestrator, the supervisor and their collaborators.
#[derive(Error, Debug)]
pub enum ServiceError {
    /// Loading or validating a configuration document failed.
    #[error(transparent)]
    Config(#[from] remapper_common::Error),

    /// The mapping rules cannot be turned into handlers.
    #[error("Invalid mapping: {0}")]
    Mapping(String),

    /// Starting the device would violate target exclusivity.
    #[error("Device '{device}' conflicts with '{owner}' on target '{target}'")]
    DeviceConflict {
        device: String,
        target: String,
        owner: String,
    },

    /// The registry already leased this target.
    #[error("Target '{0}' is already in use")]
    TargetBusy(String),

    /// No rules exist for the device.
    #[error("Unknown device: {0}")]
    UnknownDevice(String),

    /// Opening or reading a capture source failed.
    #[error("Capture error: {0}")]
    Capture(String),

    /// Creating or writing a virtual output failed.
    #[error("Injection error: {0}")]
    Injection(String),

    /// The control interface could not be published or reached.
    #[error("Control interface error: {0}")]
    Control(String),

    /// Zenoh session error.
    #[error("Zenoh error: {0}")]
    Zenoh(String),
}

impl ServiceError {
    /// Create a mapping error.
    pub fn mapping(msg: impl Into<String>) -> Self {
        Self::Mapping(msg.into())
    }

    /// Create a capture error.
    pub fn capture(msg: impl Into<String>) -> Self {
        Self::Capture(msg.into())
    }

    /// Create an injection error.
    pub fn injection(msg: impl Into<String>) -> Self {
        Self::Injection(msg.into())
    }

    /// Create a control interface error.
    pub fn control(msg: impl Into<String>) -> Self {
        Self::Control(msg.into())
    }
}

impl From<zenoh::Error> for ServiceError {
    fn from(err: zenoh::Error) -> Self {
        Self::Zenoh(err.to_string())
    }
}
