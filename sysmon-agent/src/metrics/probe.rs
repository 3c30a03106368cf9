//! Host-level probes backing the metrics snapshot
//!
//! Each accessor fails independently: an unreadable source degrades to an
//! absent value (or a documented fallback) and never aborts sampling of
//! the other signals.

use std::path::{Path, PathBuf};
use std::time::Duration;

use sysinfo::{Disks, Networks, System};
use tracing::debug;

use super::{round1, round2};

/// Raspberry Pi thermal zone exposing millidegrees Celsius
const THERMAL_ZONE_PATH: &str = "/sys/class/thermal/thermal_zone0/temp";

/// Blocking measurement window for the CPU usage probe
const CPU_SAMPLE_WINDOW: Duration = Duration::from_secs(1);

const GIB: f64 = 1024.0 * 1024.0 * 1024.0;

/// Memory usage reading
#[derive(Debug, Clone, Copy)]
pub struct MemoryUsage {
    pub percent: f64,
    pub used_gb: f64,
    pub total_gb: f64,
}

/// Root filesystem usage reading
#[derive(Debug, Clone, Copy)]
pub struct DiskUsage {
    pub percent: f64,
    pub used_gb: f64,
    pub total_gb: f64,
}

/// Probes for the individual OS/hardware signals
pub struct HostProbe {
    system: System,
    disks: Disks,
    networks: Networks,
    thermal_path: PathBuf,
}

impl HostProbe {
    pub fn new() -> Self {
        HostProbe {
            system: System::new(),
            disks: Disks::new(),
            networks: Networks::new(),
            thermal_path: PathBuf::from(THERMAL_ZONE_PATH),
        }
    }

    #[cfg(test)]
    fn with_thermal_path(path: &Path) -> Self {
        let mut probe = Self::new();
        probe.thermal_path = path.to_path_buf();
        probe
    }

    /// Global CPU utilization over a ~1 second window, 1 decimal place.
    /// Intentionally blocks the tick for the duration of the window.
    pub async fn cpu_percent(&mut self) -> f64 {
        self.system.refresh_cpu_usage();
        tokio::time::sleep(CPU_SAMPLE_WINDOW).await;
        self.system.refresh_cpu_usage();
        round1(self.system.global_cpu_info().cpu_usage() as f64)
    }

    /// CPU temperature in Celsius from the fixed thermal zone.
    /// `None` on any read or parse failure.
    pub fn cpu_temperature(&self) -> Option<f64> {
        read_thermal_zone(&self.thermal_path)
    }

    /// 1-minute load average. `None` on platforms without the concept.
    pub fn load_average(&self) -> Option<f64> {
        if cfg!(unix) {
            Some(System::load_average().one)
        } else {
            None
        }
    }

    pub fn memory(&mut self) -> MemoryUsage {
        self.system.refresh_memory();
        let total = self.system.total_memory();
        let used = self.system.used_memory();
        let percent = if total > 0 {
            round1(used as f64 / total as f64 * 100.0)
        } else {
            0.0
        };
        MemoryUsage {
            percent,
            used_gb: round2(used as f64 / GIB),
            total_gb: round2(total as f64 / GIB),
        }
    }

    /// Root filesystem usage. Prefers the `/` mount point, falls back to
    /// the largest disk, zeros when the platform reports no disks at all.
    pub fn disk(&mut self) -> DiskUsage {
        self.disks.refresh_list();

        let root = self
            .disks
            .iter()
            .find(|d| d.mount_point() == Path::new("/"))
            .or_else(|| self.disks.iter().max_by_key(|d| d.total_space()));

        match root {
            Some(disk) => {
                let total = disk.total_space();
                let used = total.saturating_sub(disk.available_space());
                let percent = if total > 0 {
                    round1(used as f64 / total as f64 * 100.0)
                } else {
                    0.0
                };
                DiskUsage {
                    percent,
                    used_gb: round2(used as f64 / GIB),
                    total_gb: round2(total as f64 / GIB),
                }
            }
            None => {
                debug!("No disks visible to sysinfo, reporting zero disk usage");
                DiskUsage { percent: 0.0, used_gb: 0.0, total_gb: 0.0 }
            }
        }
    }

    /// Cumulative bytes (sent, received) since boot, summed over all
    /// interfaces. Counters may wrap on long uptimes; not corrected.
    pub fn network_totals(&mut self) -> (u64, u64) {
        self.networks.refresh_list();
        let mut sent = 0u64;
        let mut recv = 0u64;
        for (_name, data) in self.networks.iter() {
            sent = sent.wrapping_add(data.total_transmitted());
            recv = recv.wrapping_add(data.total_received());
        }
        (sent, recv)
    }

    /// Time since boot in hours, 1 decimal place
    pub fn uptime_hours(&self) -> f64 {
        round1(System::uptime() as f64 / 3600.0)
    }
}

impl Default for HostProbe {
    fn default() -> Self {
        Self::new()
    }
}

fn read_thermal_zone(path: &Path) -> Option<f64> {
    let raw = std::fs::read_to_string(path).ok()?;
    let millidegrees: f64 = raw.trim().parse().ok()?;
    Some(round1(millidegrees / 1000.0))
}
