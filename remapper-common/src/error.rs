//! Errors shared by the remapper crates.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// A configuration document could not be read, parsed or validated.
    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("zenoh: {0}")]
    Zenoh(#[from] zenoh::Error),

    #[error("malformed JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("malformed CBOR: {0}")]
    Cbor(String),

    #[error("invalid key expression: {0}")]
    KeyExpr(String),
}

impl Error {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn key_expr(msg: impl Into<String>) -> Self {
        Self::KeyExpr(msg.into())
    }
}

impl From<ciborium::ser::Error<std::io::Error>> for Error {
    fn from(e: ciborium::ser::Error<std::io::Error>) -> Self {
        Error::Cbor(e.to_string())
    }
}

impl From<ciborium::de::Error<std::io::Error>> for Error {
    fn from(e: ciborium::de::Error<std::io::Error>) -> Self {
        Error::Cbor(e.to_string())
    }
}

/// Result type alias using the common [`Error`].
pub type Result<T> = std::result::Result<T, Error>;
