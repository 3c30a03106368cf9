//! sysmon-agent - System metrics to MQTT with Home Assistant auto-discovery
//!
//! Library surface for the agent binary and its contract tests:
//! - [`metrics`]: host probes, fan capability and the per-tick snapshot
//! - [`mqtt`]: broker session state machine and publish seam
//! - [`discovery`]: Home Assistant auto-discovery catalog
//! - [`publish`]: retained state/scalar publication
//! - [`config`]: YAML configuration

pub mod config;
pub mod discovery;
pub mod metrics;
pub mod mqtt;
pub mod publish;
