//! MQTT bridge configuration.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

use crate::error::{BridgeError, Result};

/// File name of the bridge configuration inside the user's home directory.
pub const CONFIG_FILE_NAME: &str = "mqtt_config.json";

/// Fields that must be present in a persisted configuration.
///
/// These are never filled in from defaults when loading from disk.
pub const REQUIRED_FIELDS: [&str; 4] = ["broker", "port", "username", "password"];

/// Connection settings for the MQTT event bridge.
///
/// Build one in code with struct update syntax over [`Default`], or load it
/// from disk with [`BridgeConfig::load`]. The two paths differ on purpose:
/// defaults only apply to configs built in code.
///
/// ```
/// use remapper_bridge::BridgeConfig;
///
/// let config = BridgeConfig {
///     broker: "10.0.0.5".to_string(),
///     username: Some("u".to_string()),
///     ..Default::default()
/// };
/// assert_eq!(config.port, 1883);
/// assert_eq!(config.topic, "key_remap/events");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// Broker host name or address.
    pub broker: String,
    /// Broker TCP port.
    pub port: u16,
    /// Optional user name for broker authentication.
    pub username: Option<String>,
    /// Optional password for broker authentication.
    pub password: Option<String>,
    /// Topic all remap events are published to.
    pub topic: String,
    /// MQTT quality-of-service level (0, 1 or 2).
    pub qos: u8,
    /// Whether the broker should retain published messages.
    pub retain: bool,
    /// Label used when an event carries no source device name.
    pub default_device_name: Option<String>,
    /// URL of the companion automation service (Home Assistant).
    pub ha_url: Option<String>,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            broker: "192.168.1.160".to_string(),
            port: 1883,
            username: None,
            password: None,
            topic: "key_remap/events".to_string(),
            qos: 1,
            retain: false,
            default_device_name: None,
            ha_url: None,
        }
    }
}

impl BridgeConfig {
    /// Default location: `~/mqtt_config.json`.
    pub fn default_path() -> PathBuf {
        dirs::home_dir().unwrap_or_default().join(CONFIG_FILE_NAME)
    }

    /// Load a configuration from a JSON file.
    ///
    /// # Errors
    ///
    /// - [`BridgeError::ConfigNotFound`] if the file does not exist
    /// - [`BridgeError::ConfigParse`] if the file is not a JSON object
    /// - [`BridgeError::ConfigValidation`] if any of [`REQUIRED_FIELDS`] is
    ///   missing (all missing names are listed) or a value is out of range
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(BridgeError::ConfigNotFound {
                path: path.display().to_string(),
            });
        }

        let content = std::fs::read_to_string(path)?;
        let document: Value = serde_json::from_str(&content).map_err(|e| {
            BridgeError::ConfigParse(format!("Invalid JSON in '{}': {}", path.display(), e))
        })?;

        let Value::Object(fields) = document else {
            return Err(BridgeError::ConfigParse(format!(
                "Invalid JSON in '{}': expected an object at the top level",
                path.display()
            )));
        };

        let missing: Vec<&str> = REQUIRED_FIELDS
            .iter()
            .copied()
            .filter(|name| !fields.contains_key(*name))
            .collect();
        if !missing.is_empty() {
            return Err(BridgeError::validation(format!(
                "Missing required fields: {}",
                missing.join(", ")
            )));
        }

        let config: Self = serde_json::from_value(Value::Object(fields)).map_err(|e| {
            BridgeError::validation(format!("Invalid value in '{}': {}", path.display(), e))
        })?;
        config.validate()?;

        Ok(config)
    }

    /// Write the configuration as pretty-printed JSON.
    ///
    /// Unset optional fields are written as `null` so the file always carries
    /// the full field set. Parent directories are created as needed.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let mut content = serde_json::to_string_pretty(&Value::Object(self.to_map()))?;
        content.push('\n');
        std::fs::write(path, content)?;

        tracing::debug!(path = %path.display(), "Saved MQTT configuration");
        Ok(())
    }

    /// Every field as a JSON map, with `null` for unset optional fields.
    pub fn to_map(&self) -> Map<String, Value> {
        let mut map = Map::new();
        map.insert("broker".to_string(), json!(self.broker));
        map.insert("port".to_string(), json!(self.port));
        map.insert("username".to_string(), json!(self.username));
        map.insert("password".to_string(), json!(self.password));
        map.insert("topic".to_string(), json!(self.topic));
        map.insert("qos".to_string(), json!(self.qos));
        map.insert("retain".to_string(), json!(self.retain));
        map.insert(
            "default_device_name".to_string(),
            json!(self.default_device_name),
        );
        map.insert("ha_url".to_string(), json!(self.ha_url));
        map
    }

    /// Check value ranges.
    pub fn validate(&self) -> Result<()> {
        if self.broker.trim().is_empty() {
            return Err(BridgeError::validation("broker must not be empty"));
        }
        if self.port == 0 {
            return Err(BridgeError::validation("port must be > 0"));
        }
        if self.qos > 2 {
            return Err(BridgeError::validation(format!(
                "qos must be 0, 1 or 2 (got {})",
                self.qos
            )));
        }
        if self.topic.is_empty() {
            return Err(BridgeError::validation("topic must not be empty"));
        }
        Ok(())
    }

    /// `broker:port`, for log and diagnostic messages.
    pub fn endpoint(&self) -> String {
        format!("{}:{}", self.broker, self.port)
    }
}
