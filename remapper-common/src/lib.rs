//! input-remapper common library
//!
//! Shared types and utilities for the input-remapper service crates:
//!
//! - [`event`] - Input event model (`InputEvent`, `EventKey`)
//! - [`serialization`] - JSON/CBOR encoding and decoding
//! - [`config`] - Configuration loading (JSON5 format) and the [`ConfigFile`] trait
//! - [`session`] - Zenoh session management
//! - [`keyexpr`] - Key expression builders
//! - [`error`] - Error types

pub mod config;
pub mod error;
pub mod event;
pub mod keyexpr;
pub mod serialization;
pub mod session;

pub use config::{
    ConfigFile, LogFormat, LoggingConfig, ZenohConfig, load_config, parse_config,
    user_config_path,
};
pub use error::{Error, Result};
pub use event::{EV_ABS, EV_KEY, EV_REL, EV_SYN, EventKey, InputEvent, current_timestamp_millis};
pub use keyexpr::{KEY_PREFIX, KeyExprBuilder, sanitize_chunk};
pub use serialization::{Format, decode, decode_auto, encode};
pub use session::{connect, zenoh_config};

/// Initialize tracing with the given configuration.
///
/// Supports two output formats:
/// - `LogFormat::Text` (default): Human-readable text format
/// - `LogFormat::Json`: Structured JSON format for log aggregation systems
///
/// `RUST_LOG` takes precedence over the configured level.
pub fn init_tracing(config: &LoggingConfig) -> Result<()> {
    use tracing_subscriber::{EnvFilter, fmt, prelude::*};

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));

    match config.format {
        LogFormat::Text => {
            tracing_subscriber::registry()
                .with(fmt::layer())
                .with(filter)
                .try_init()
                .map_err(|e| Error::config(format!("Failed to initialize tracing: {}", e)))?;
        }
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(fmt::layer().json())
                .with(filter)
                .try_init()
                .map_err(|e| Error::config(format!("Failed to initialize tracing: {}", e)))?;
        }
    }

    Ok(())
}
