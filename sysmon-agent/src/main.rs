//! sysmon-agent - System monitor with MQTT and Home Assistant auto-discovery
//!
//! Long-running agent that samples host metrics once per interval and
//! publishes them retained to an MQTT broker:
//! - Per-tick snapshot: CPU, temperature, memory, disk, network, uptime
//! - Optional GPIO fan monitoring via pinctrl
//! - Home Assistant auto-discovery on (re)connect
//! - Retry-forever tick loop with a short recovery delay on failure

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info};

use sysmon_agent::config::{ConfigError, MonitorConfig};
use sysmon_agent::discovery::DiscoveryPublisher;
use sysmon_agent::metrics::fan::FanMonitor;
use sysmon_agent::metrics::Sampler;
use sysmon_agent::mqtt::ConnectionManager;
use sysmon_agent::publish::MetricPublisher;

/// Fixed delay before resuming after a failed tick, deliberately shorter
/// than any sane update interval
const RECOVERY_DELAY: Duration = Duration::from_secs(10);

#[derive(Parser, Debug)]
#[command(name = "sysmon-agent", about = "System monitor with MQTT and Home Assistant auto-discovery")]
struct Cli {
    /// Configuration file path
    #[arg(short, long, default_value = "config.yaml")]
    config: PathBuf,

    /// Create a sample configuration file and exit
    #[arg(long)]
    create_config: bool,

    /// Enable debug logging
    #[arg(long)]
    debug: bool,

    /// MQTT broker hostname or IP (overrides config)
    #[arg(long)]
    broker: Option<String>,

    /// MQTT broker port (overrides config)
    #[arg(long)]
    port: Option<u16>,

    /// MQTT username (overrides config)
    #[arg(long)]
    username: Option<String>,

    /// MQTT password (overrides config)
    #[arg(long)]
    password: Option<String>,

    /// Update interval in seconds (overrides config)
    #[arg(long)]
    interval: Option<u64>,

    /// Disable Home Assistant discovery (overrides config)
    #[arg(long)]
    no_discovery: bool,
}

fn apply_overrides(config: &mut MonitorConfig, cli: &Cli) {
    if let Some(broker) = &cli.broker {
        config.mqtt.broker = broker.clone();
    }
    if let Some(port) = cli.port {
        config.mqtt.port = port;
    }
    if let Some(username) = &cli.username {
        config.mqtt.username = Some(username.clone());
    }
    if let Some(password) = &cli.password {
        config.mqtt.password = Some(password.clone());
    }
    if let Some(interval) = cli.interval {
        config.monitor.update_interval = interval;
    }
    if cli.no_discovery {
        config.monitor.home_assistant_discovery = false;
    }
}

fn init_logging(config_level: &str, debug_override: bool) {
    use tracing_subscriber::EnvFilter;

    let default_level = if debug_override { "debug" } else { config_level };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_level.to_string()));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

/// Sleep policy between ticks: policy as data so supervision is testable
/// without a clock
#[derive(Debug, Clone, Copy)]
struct TickPolicy {
    interval: Duration,
    recovery_delay: Duration,
}

impl TickPolicy {
    fn new(interval_secs: u64) -> Self {
        TickPolicy {
            interval: Duration::from_secs(interval_secs),
            recovery_delay: RECOVERY_DELAY,
        }
    }

    fn next_delay(&self, tick_ok: bool) -> Duration {
        if tick_ok {
            self.interval
        } else {
            self.recovery_delay
        }
    }
}

/// Main agent state: sampler, publishers and the broker session
struct Monitor {
    hostname: String,
    sampler: Sampler,
    publisher: MetricPublisher,
    connection: ConnectionManager,
    policy: TickPolicy,
}

impl Monitor {
    async fn new(config: MonitorConfig) -> Result<Self> {
        let hostname = gethostname::gethostname().to_string_lossy().to_string();
        if hostname.is_empty() {
            anyhow::bail!("could not determine hostname");
        }

        // One-time capability probe: a missing/broken pinctrl disables fan
        // monitoring for the whole process lifetime
        let fan = if config.monitor.fan_monitoring.enabled {
            FanMonitor::detect(config.monitor.fan_monitoring.gpio_pin).await
        } else {
            None
        };

        let discovery = DiscoveryPublisher::new(
            &hostname,
            config.monitor.home_assistant_discovery,
            fan.is_some(),
        );

        let connection = ConnectionManager::connect(
            &config.mqtt,
            &format!("sysmon-agent-{hostname}"),
            discovery,
        )
        .context("Failed to set up MQTT transport")?;

        Ok(Monitor {
            sampler: Sampler::new(fan),
            publisher: MetricPublisher::new(&hostname),
            hostname,
            connection,
            policy: TickPolicy::new(config.monitor.update_interval),
        })
    }

    /// Main monitoring loop. Per-tick errors are logged and followed by
    /// the short recovery delay; only the shutdown signal ends the loop.
    async fn run(&mut self) -> Result<()> {
        info!("Starting system monitor for {}", self.hostname);

        loop {
            // The signal races against the tick as well as the sleep, so
            // shutdown stays responsive while a sample is in flight
            let tick_result = tokio::select! {
                result = self.tick() => Some(result),
                _ = tokio::signal::ctrl_c() => None,
            };
            let tick_ok = match tick_result {
                Some(Ok(())) => true,
                Some(Err(e)) => {
                    error!(
                        "Error in monitoring loop (connection {:?}): {e:#}",
                        self.connection.state()
                    );
                    false
                }
                None => {
                    info!("Received interrupt signal, shutting down...");
                    break;
                }
            };

            tokio::select! {
                _ = tokio::time::sleep(self.policy.next_delay(tick_ok)) => {}
                _ = tokio::signal::ctrl_c() => {
                    info!("Received interrupt signal, shutting down...");
                    break;
                }
            }
        }

        self.connection.shutdown().await;
        info!("System monitor stopped");
        Ok(())
    }

    async fn tick(&mut self) -> Result<()> {
        let snapshot = self.sampler.sample().await;
        let handle = self.connection.handle();
        self.publisher.publish(&handle, &snapshot).await?;
        info!("Published metrics: {}", snapshot.summary());
        Ok(())
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if cli.create_config {
        match MonitorConfig::write_sample(&cli.config) {
            Ok(()) => {
                println!("Sample configuration file created at: {}", cli.config.display());
                println!("Please edit this file with your MQTT broker details and run the agent again.");
            }
            Err(e) => {
                eprintln!("Failed to create sample config: {e}");
                std::process::exit(1);
            }
        }
        return;
    }

    let mut config = match MonitorConfig::load(&cli.config) {
        Ok(config) => config,
        Err(ConfigError::NotFound(path)) => {
            eprintln!("Configuration file '{path}' not found.");
            eprintln!("Create a sample configuration file with: sysmon-agent --create-config");
            std::process::exit(1);
        }
        Err(e) => {
            eprintln!("Configuration error: {e}");
            std::process::exit(1);
        }
    };
    apply_overrides(&mut config, &cli);
    init_logging(&config.logging.level, cli.debug);

    let mut monitor = match Monitor::new(config).await {
        Ok(monitor) => monitor,
        Err(e) => {
            error!("Failed to start monitoring: {e:#}");
            std::process::exit(1);
        }
    };

    if let Err(e) = monitor.run().await {
        error!("Monitor execution failed: {e:#}");
        std::process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_definition() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn test_recovery_delay_shorter_than_interval() {
        let policy = TickPolicy::new(60);
        assert_eq!(policy.next_delay(true), Duration::from_secs(60));
        assert_eq!(policy.next_delay(false), Duration::from_secs(10));
        assert!(policy.next_delay(false) < policy.next_delay(true));
    }

    #[test]
    fn test_cli_overrides() {
        let cli = Cli::parse_from([
            "sysmon-agent",
            "--broker", "10.0.0.9",
            "--port", "1884",
            "--interval", "15",
            "--no-discovery",
        ]);

        let mut config: MonitorConfig =
            serde_yaml::from_str("mqtt:\n  broker: broker.local\n").unwrap();
        apply_overrides(&mut config, &cli);

        assert_eq!(config.mqtt.broker, "10.0.0.9");
        assert_eq!(config.mqtt.port, 1884);
        assert_eq!(config.monitor.update_interval, 15);
        assert!(!config.monitor.home_assistant_discovery);
    }
}
