//! Service configuration (`service.json5`).

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use remapper_common::{
    ConfigFile, Error, Format, KEY_PREFIX, KeyExprBuilder, LoggingConfig, Result, ZenohConfig,
    user_config_path,
};

/// File name of the service configuration.
pub const CONFIG_FILE_NAME: &str = "service.json5";

/// File name of the mapping rules.
pub const MAPPING_FILE_NAME: &str = "mappings.json5";

/// Top-level service configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GlobalConfig {
    /// Zenoh connection settings.
    #[serde(default)]
    pub zenoh: ZenohConfig,

    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Service behavior.
    #[serde(default)]
    pub service: ServiceSection,
}

/// The `service` section of [`GlobalConfig`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceSection {
    /// Prefix of every key the service declares.
    #[serde(default = "default_key_prefix")]
    pub key_prefix: String,

    /// Mapping rules file. Defaults to `mappings.json5` in the per-user
    /// config directory, wherever this file was loaded from.
    #[serde(default)]
    pub mapping_file: Option<PathBuf>,

    /// MQTT bridge configuration. Defaults to `~/mqtt_config.json`.
    #[serde(default)]
    pub mqtt_config: Option<PathBuf>,

    /// Devices started right after the control interface is published.
    #[serde(default)]
    pub autoload: Vec<String>,

    /// How long a worker may take to stop before it is aborted.
    #[serde(default = "default_shutdown_grace_ms")]
    pub shutdown_grace_ms: u64,

    /// Interval of the liveness tick that reaps finished workers.
    #[serde(default = "default_liveness_interval_ms")]
    pub liveness_interval_ms: u64,

    /// Capacity of the queue feeding the MQTT bridge.
    #[serde(default = "default_bridge_queue")]
    pub bridge_queue: usize,

    /// Encoding of remapped events published for the injector: "json" or "cbor".
    #[serde(default)]
    pub inject_format: Format,
}

fn default_key_prefix() -> String {
    KEY_PREFIX.to_string()
}

fn default_shutdown_grace_ms() -> u64 {
    3000
}

fn default_liveness_interval_ms() -> u64 {
    1000
}

fn default_bridge_queue() -> usize {
    256
}

impl Default for ServiceSection {
    fn default() -> Self {
        Self {
            key_prefix: default_key_prefix(),
            mapping_file: None,
            mqtt_config: None,
            autoload: Vec::new(),
            shutdown_grace_ms: default_shutdown_grace_ms(),
            liveness_interval_ms: default_liveness_interval_ms(),
            bridge_queue: default_bridge_queue(),
            inject_format: Format::default(),
        }
    }
}

impl GlobalConfig {
    /// Default location: `$XDG_CONFIG_HOME/input-remapper/service.json5`.
    pub fn default_path() -> PathBuf {
        user_config_path(CONFIG_FILE_NAME)
    }

    /// Where to read the mapping rules from.
    pub fn mapping_path(&self) -> PathBuf {
        self.service
            .mapping_file
            .clone()
            .unwrap_or_else(|| user_config_path(MAPPING_FILE_NAME))
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.service.shutdown_grace_ms)
    }

    pub fn liveness_interval(&self) -> Duration {
        Duration::from_millis(self.service.liveness_interval_ms)
    }

    /// Key expression builder for the configured prefix.
    pub fn keys(&self) -> Result<KeyExprBuilder> {
        KeyExprBuilder::new(&self.service.key_prefix)
    }
}

impl ConfigFile for GlobalConfig {
    fn validate(&self) -> Result<()> {
        self.zenoh
            .validate()
            .map_err(|e| Error::config(format!("zenoh: {}", e)))?;
        self.keys()
            .map_err(|e| Error::Config(format!("service.key_prefix: {}", e)))?;

        if self.service.shutdown_grace_ms == 0 {
            return Err(Error::Config(
                "service.shutdown_grace_ms must be greater than 0".to_string(),
            ));
        }
        if self.service.liveness_interval_ms == 0 {
            return Err(Error::Config(
                "service.liveness_interval_ms must be greater than 0".to_string(),
            ));
        }
        if self.service.bridge_queue == 0 {
            return Err(Error::Config(
                "service.bridge_queue must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}
