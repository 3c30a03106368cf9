//! YAML configuration for the agent
//!
//! Handles:
//! - Config file loading with defaults for optional sections
//! - Validation (broker address is the only hard requirement)
//! - Sample configuration file generation (`--create-config`)

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("configuration file not found: {0}")]
    NotFound(String),
    #[error("error reading configuration file: {0}")]
    Io(#[from] std::io::Error),
    #[error("error parsing YAML configuration: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("missing 'broker' in mqtt configuration")]
    MissingBroker,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorConfig {
    pub mqtt: MqttSettings,
    #[serde(default)]
    pub monitor: MonitorSettings,
    #[serde(default)]
    pub logging: LoggingSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MqttSettings {
    #[serde(default)]
    pub broker: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorSettings {
    pub update_interval: u64,
    pub home_assistant_discovery: bool,
    pub fan_monitoring: FanSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FanSettings {
    pub enabled: bool,
    pub gpio_pin: u8,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    pub level: String,
}

fn default_port() -> u16 {
    1883
}

impl Default for MonitorSettings {
    fn default() -> Self {
        MonitorSettings {
            update_interval: 60,
            home_assistant_discovery: true,
            fan_monitoring: FanSettings::default(),
        }
    }
}

impl Default for FanSettings {
    fn default() -> Self {
        FanSettings { enabled: false, gpio_pin: 14 }
    }
}

impl Default for LoggingSettings {
    fn default() -> Self {
        LoggingSettings { level: "info".to_string() }
    }
}

/// Starter configuration written by `--create-config`
const SAMPLE_CONFIG: &str = "\
mqtt:
  broker: 192.168.1.100
  port: 1883
  username: null   # Optional
  password: null   # Optional
monitor:
  update_interval: 60
  home_assistant_discovery: true
  fan_monitoring:
    enabled: false
    gpio_pin: 14
logging:
  level: info      # trace, debug, info, warn, error
";

impl MonitorConfig {
    /// Load and validate a configuration file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::NotFound(path.display().to_string()));
        }
        let text = std::fs::read_to_string(path)?;
        let config: MonitorConfig = serde_yaml::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.mqtt.broker.trim().is_empty() {
            return Err(ConfigError::MissingBroker);
        }
        Ok(())
    }

    /// Write the sample configuration file
    pub fn write_sample(path: &Path) -> Result<(), ConfigError> {
        std::fs::write(path, SAMPLE_CONFIG)?;
        Ok(())
    }
}
