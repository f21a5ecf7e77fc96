//! Zenoh session setup.

use serde::Serialize;
use zenoh::{Config, Session};

use crate::config::ZenohConfig;
use crate::error::{Error, Result};

/// Translate `config` into a Zenoh configuration.
///
/// The config is validated first, so a bad mode or endpoint never reaches
/// `zenoh::open`.
pub fn zenoh_config(config: &ZenohConfig) -> Result<Config> {
    config.validate()?;

    let mut zenoh_config = Config::default();
    insert(&mut zenoh_config, "mode", &config.mode)?;
    if !config.connect.is_empty() {
        insert(&mut zenoh_config, "connect/endpoints", &config.connect)?;
    }
    if !config.listen.is_empty() {
        insert(&mut zenoh_config, "listen/endpoints", &config.listen)?;
    }
    Ok(zenoh_config)
}

fn insert<T: Serialize + ?Sized>(config: &mut Config, key: &str, value: &T) -> Result<()> {
    let json = serde_json::to_string(value)?;
    config
        .insert_json5(key, &json)
        .map_err(|e| Error::config(format!("zenoh {}: {}", key, e)))
}

/// Open the session the service runs on.
pub async fn connect(config: &ZenohConfig) -> Result<Session> {
    let zenoh_config = zenoh_config(config)?;

    tracing::info!(
        mode = %config.mode,
        connect = ?config.connect,
        listen = ?config.listen,
        "Opening Zenoh session"
    );
    let session = zenoh::open(zenoh_config).await?;
    tracing::debug!(zid = %session.zid(), "Zenoh session open");

    Ok(session)
}
