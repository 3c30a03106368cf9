//! Metrics sampling for the sysmon agent
//!
//! One `MetricsSnapshot` is produced per scheduler tick:
//! - CPU usage (1s measurement window) and temperature
//! - Load average (unix only)
//! - Memory and root filesystem usage
//! - Cumulative network counters and uptime
//! - Optional fan state via GPIO
//!
//! Individual probe failures degrade to absent fields; `sample()` itself
//! never fails.

pub mod fan;
pub mod probe;

use serde::Serialize;

use fan::FanMonitor;
use probe::HostProbe;

/// One complete set of sampled metrics, serialized as the retained
/// `<base>/state` JSON document. Optional fields serialize as `null`;
/// `fan_status` is omitted entirely when fan monitoring is disabled.
#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    pub cpu_percent: f64,
    pub cpu_temp: Option<f64>,
    pub load_avg: Option<f64>,
    pub memory_percent: f64,
    pub memory_used_gb: f64,
    pub memory_total_gb: f64,
    pub disk_percent: f64,
    pub disk_used_gb: f64,
    pub disk_total_gb: f64,
    pub network_bytes_sent: u64,
    pub network_bytes_recv: u64,
    pub uptime_hours: f64,
    /// Outer `None` = fan monitoring disabled (key omitted),
    /// inner `None` = enabled but the level could not be read.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fan_status: Option<Option<bool>>,
    pub timestamp: String,
}

impl MetricsSnapshot {
    /// One-line summary for the per-tick log
    pub fn summary(&self) -> String {
        let temp = match self.cpu_temp {
            Some(t) => format!("{t}°C"),
            None => "n/a".to_string(),
        };
        let mut line = format!(
            "CPU={}%, Temp={}, Memory={}%, Disk={}%",
            self.cpu_percent, temp, self.memory_percent, self.disk_percent
        );
        if let Some(Some(fan_on)) = self.fan_status {
            line.push_str(if fan_on { ", Fan=ON" } else { ", Fan=OFF" });
        }
        line
    }
}

/// Composes the host probes into one snapshot per tick
pub struct Sampler {
    probe: HostProbe,
    fan: Option<FanMonitor>,
}

impl Sampler {
    pub fn new(fan: Option<FanMonitor>) -> Self {
        Sampler {
            probe: HostProbe::new(),
            fan,
        }
    }

    /// Collect all system metrics. Always succeeds as a whole; individual
    /// probe failures show up as absent fields.
    pub async fn sample(&mut self) -> MetricsSnapshot {
        let cpu_percent = self.probe.cpu_percent().await;
        let cpu_temp = self.probe.cpu_temperature();
        let load_avg = self.probe.load_average();
        let memory = self.probe.memory();
        let disk = self.probe.disk();
        let (network_bytes_sent, network_bytes_recv) = self.probe.network_totals();
        let uptime_hours = self.probe.uptime_hours();

        let fan_status = match &self.fan {
            Some(monitor) => Some(monitor.read().await),
            None => None,
        };

        MetricsSnapshot {
            cpu_percent,
            cpu_temp,
            load_avg,
            memory_percent: memory.percent,
            memory_used_gb: memory.used_gb,
            memory_total_gb: memory.total_gb,
            disk_percent: disk.percent,
            disk_used_gb: disk.used_gb,
            disk_total_gb: disk.total_gb,
            network_bytes_sent,
            network_bytes_recv,
            uptime_hours,
            fan_status,
            timestamp: chrono::Local::now().to_rfc3339(),
        }
    }
}

/// Round to 1 decimal place (percentages, temperature, hours)
pub(crate) fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

/// Round to 2 decimal places (GiB values)
pub(crate) fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Fixed snapshot for unit tests across modules
#[cfg(test)]
pub(crate) fn sample_snapshot(fan_status: Option<Option<bool>>) -> MetricsSnapshot {
    MetricsSnapshot {
        cpu_percent: 42.1,
        cpu_temp: None,
        load_avg: None,
        memory_percent: 33.0,
        memory_used_gb: 1.25,
        memory_total_gb: 3.79,
        disk_percent: 75.5,
        disk_used_gb: 10.51,
        disk_total_gb: 13.92,
        network_bytes_sent: 123_456,
        network_bytes_recv: 654_321,
        uptime_hours: 12.3,
        fan_status,
        timestamp: "2024-01-01T00:00:00+00:00".to_string(),
    }
}
