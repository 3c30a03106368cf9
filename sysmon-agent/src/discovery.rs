//! Home Assistant auto-discovery catalog
//!
//! One retained config record per catalog sensor, published under
//! `homeassistant/sensor/system_monitor_<hostname>_<key>/config`, plus an
//! optional binary_sensor record for the case fan. All records of one
//! device embed the same device block so Home Assistant groups the
//! resulting entities. Catalog generation is deterministic: the same
//! hostname always yields byte-identical payloads.

use std::time::Duration;

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::info;

use crate::mqtt::MessageSink;

/// Pause between retained discovery publishes, to avoid hammering the
/// broker/subscriber with the burst
const PUBLISH_PAUSE: Duration = Duration::from_millis(100);

/// Static description of one measurable quantity
#[derive(Debug, Clone, Copy)]
pub struct SensorSpec {
    pub name: &'static str,
    pub key: &'static str,
    pub unit: Option<&'static str>,
    pub icon: &'static str,
    pub device_class: Option<&'static str>,
    pub state_class: Option<&'static str>,
}

/// The fixed core sensor catalog. Increasing-only counters and durations
/// carry `total_increasing`; everything else is a plain measurement.
pub const SENSOR_CATALOG: &[SensorSpec] = &[
    SensorSpec {
        name: "CPU Usage",
        key: "cpu_percent",
        unit: Some("%"),
        icon: "mdi:cpu-64-bit",
        device_class: None,
        state_class: Some("measurement"),
    },
    SensorSpec {
        name: "CPU Temperature",
        key: "cpu_temp",
        unit: Some("°C"),
        icon: "mdi:thermometer",
        device_class: Some("temperature"),
        state_class: Some("measurement"),
    },
    SensorSpec {
        name: "Load Average",
        key: "load_avg",
        unit: None,
        icon: "mdi:chart-line",
        device_class: None,
        state_class: Some("measurement"),
    },
    SensorSpec {
        name: "Memory Usage",
        key: "memory_percent",
        unit: Some("%"),
        icon: "mdi:memory",
        device_class: None,
        state_class: Some("measurement"),
    },
    SensorSpec {
        name: "Memory Used",
        key: "memory_used_gb",
        unit: Some("GB"),
        icon: "mdi:memory",
        device_class: None,
        state_class: Some("measurement"),
    },
    SensorSpec {
        name: "Disk Usage",
        key: "disk_percent",
        unit: Some("%"),
        icon: "mdi:harddisk",
        device_class: None,
        state_class: Some("measurement"),
    },
    SensorSpec {
        name: "Disk Used",
        key: "disk_used_gb",
        unit: Some("GB"),
        icon: "mdi:harddisk",
        device_class: None,
        state_class: Some("measurement"),
    },
    SensorSpec {
        name: "Network Bytes Sent",
        key: "network_bytes_sent",
        unit: Some("B"),
        icon: "mdi:upload-network",
        device_class: None,
        state_class: Some("total_increasing"),
    },
    SensorSpec {
        name: "Network Bytes Received",
        key: "network_bytes_recv",
        unit: Some("B"),
        icon: "mdi:download-network",
        device_class: None,
        state_class: Some("total_increasing"),
    },
    SensorSpec {
        name: "Uptime",
        key: "uptime_hours",
        unit: Some("h"),
        icon: "mdi:clock-outline",
        device_class: Some("duration"),
        state_class: Some("total_increasing"),
    },
];

/// Device block shared by every discovery record of one agent instance
#[derive(Debug, Clone, Serialize)]
pub struct DeviceInfo {
    pub identifiers: Vec<String>,
    pub name: String,
    pub model: String,
    pub manufacturer: String,
    pub sw_version: String,
}

impl DeviceInfo {
    pub fn new(hostname: &str) -> Self {
        DeviceInfo {
            identifiers: vec![format!("system_monitor_{hostname}")],
            name: format!("System Monitor {hostname}"),
            model: "Raspberry Pi".to_string(),
            manufacturer: "System Monitor Script".to_string(),
            sw_version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

/// Discovery record for a regular sensor
#[derive(Debug, Serialize)]
struct SensorConfig<'a> {
    name: String,
    unique_id: String,
    state_topic: &'a str,
    value_template: String,
    icon: &'a str,
    device: &'a DeviceInfo,
    #[serde(skip_serializing_if = "Option::is_none")]
    unit_of_measurement: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    device_class: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    state_class: Option<&'a str>,
}

/// Discovery record for the fan binary sensor
#[derive(Debug, Serialize)]
struct BinarySensorConfig<'a> {
    name: String,
    unique_id: String,
    state_topic: &'a str,
    value_template: &'static str,
    payload_on: &'static str,
    payload_off: &'static str,
    icon: &'static str,
    device: &'a DeviceInfo,
}

/// Builds and publishes the one-time sensor-registration catalog
#[derive(Clone)]
pub struct DiscoveryPublisher {
    enabled: bool,
    fan_enabled: bool,
    hostname: String,
    state_topic: String,
    device: DeviceInfo,
}

impl DiscoveryPublisher {
    pub fn new(hostname: &str, enabled: bool, fan_enabled: bool) -> Self {
        DiscoveryPublisher {
            enabled,
            fan_enabled,
            hostname: hostname.to_string(),
            state_topic: format!("system_monitor/{hostname}/state"),
            device: DeviceInfo::new(hostname),
        }
    }

    pub fn enabled(&self) -> bool {
        self.enabled
    }

    /// Build all (topic, payload) discovery records. Deterministic and
    /// free of timestamps, so repeated calls are byte-identical.
    pub fn build_catalog(&self) -> Result<Vec<(String, Vec<u8>)>> {
        let mut records = Vec::with_capacity(SENSOR_CATALOG.len() + 1);

        for spec in SENSOR_CATALOG {
            let config = SensorConfig {
                name: format!("{} {}", self.hostname, spec.name),
                unique_id: format!("system_monitor_{}_{}", self.hostname, spec.key),
                state_topic: &self.state_topic,
                value_template: format!("{{{{ value_json.{} }}}}", spec.key),
                icon: spec.icon,
                device: &self.device,
                unit_of_measurement: spec.unit,
                device_class: spec.device_class,
                state_class: spec.state_class,
            };
            let topic = format!(
                "homeassistant/sensor/system_monitor_{}_{}/config",
                self.hostname, spec.key
            );
            let payload = serde_json::to_vec(&config)
                .with_context(|| format!("failed to serialize discovery record for {}", spec.key))?;
            records.push((topic, payload));
        }

        if self.fan_enabled {
            let config = BinarySensorConfig {
                name: format!("{} Case Fan", self.hostname),
                unique_id: format!("system_monitor_{}_fan_status", self.hostname),
                state_topic: &self.state_topic,
                value_template: "{% if value_json.fan_status %}ON{% else %}OFF{% endif %}",
                payload_on: "ON",
                payload_off: "OFF",
                icon: "mdi:fan",
                device: &self.device,
            };
            let topic = format!(
                "homeassistant/binary_sensor/system_monitor_{}_fan_status/config",
                self.hostname
            );
            let payload = serde_json::to_vec(&config)
                .context("failed to serialize fan discovery record")?;
            records.push((topic, payload));
        }

        Ok(records)
    }

    /// Publish the whole catalog, retained. Idempotent: every call
    /// re-publishes identical content. Returns the record count.
    pub async fn publish_catalog(&self, sink: &dyn MessageSink) -> Result<usize> {
        info!("Sending Home Assistant discovery messages...");

        let records = self.build_catalog()?;
        let count = records.len();
        for (topic, payload) in records {
            sink.publish_retained(&topic, payload)
                .await
                .with_context(|| format!("discovery publish failed on {topic}"))?;
            tokio::time::sleep(PUBLISH_PAUSE).await;
        }

        info!("Home Assistant discovery messages sent");
        Ok(count)
    }
}
