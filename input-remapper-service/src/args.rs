//! Command line arguments.

use std::path::PathBuf;

use clap::Parser;

use remapper_bridge::BridgeConfig;
use remapper_common::LoggingConfig;

use crate::config::GlobalConfig;

/// Background service for input remapping.
#[derive(Parser, Debug, Clone, Default)]
#[command(name = "input-remapper-service", version, about)]
pub struct ServiceArgs {
    /// Log at debug level.
    #[arg(short, long)]
    pub debug: bool,

    /// Do not log the startup banner.
    #[arg(long)]
    pub hide_info: bool,

    /// Path to the service configuration file.
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Path to the MQTT bridge configuration file.
    #[arg(long)]
    pub mqtt_config: Option<PathBuf>,

    /// Override log level (trace, debug, info, warn, error).
    #[arg(long)]
    pub log_level: Option<String>,

    /// Check the MQTT broker connection and exit.
    #[arg(long)]
    pub test_mqtt: bool,
}

impl ServiceArgs {
    pub fn config_path(&self) -> PathBuf {
        self.config.clone().unwrap_or_else(GlobalConfig::default_path)
    }

    /// Bridge configuration path: flag, then config file, then `~/mqtt_config.json`.
    pub fn mqtt_config_path(&self, config: &GlobalConfig) -> PathBuf {
        self.mqtt_config
            .clone()
            .or_else(|| config.service.mqtt_config.clone())
            .unwrap_or_else(BridgeConfig::default_path)
    }

    /// Apply `--debug` and `--log-level` on top of the configured logging.
    pub fn logging(&self, base: &LoggingConfig) -> LoggingConfig {
        let mut logging = base.clone();
        if self.debug {
            logging.level = "debug".to_string();
        } else if let Some(level) = &self.log_level {
            logging.level = level.clone();
        }
        logging
    }
}
