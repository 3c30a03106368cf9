//! GPIO fan monitoring through the external `pinctrl` tool
//!
//! The fan state is exposed as a GPIO pin level. `pinctrl get <pin>` is
//! probed once at startup; when the command is missing or failing, fan
//! monitoring stays disabled for the whole process lifetime instead of
//! retrying on every tick.

use std::process::Output;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::process::Command;
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

/// Hard upper bound on a single pinctrl invocation
const PINCTRL_TIMEOUT: Duration = Duration::from_secs(5);

/// Parse `pinctrl get` output into a pin level.
///
/// Output format examples:
/// - `14: ip    -- | hi // GPIO14 = input`
/// - `14: op -- pn | lo // GPIO14 = output`
pub fn parse_pin_level(output: &str) -> Option<bool> {
    let lower = output.to_lowercase();
    if lower.contains("| hi") {
        Some(true)
    } else if lower.contains("| lo") {
        Some(false)
    } else {
        None
    }
}

/// Handle to an active fan monitor bound to one GPIO pin
#[derive(Debug, Clone)]
pub struct FanMonitor {
    pin: u8,
}

impl FanMonitor {
    /// Probe pinctrl availability once. `None` disables fan monitoring
    /// for the process lifetime.
    pub async fn detect(pin: u8) -> Option<Self> {
        match query_pin(pin).await {
            Ok(output) if output.status.success() => {
                info!("Fan monitoring enabled on GPIO pin {pin} (using pinctrl)");
                Some(FanMonitor { pin })
            }
            Ok(output) => {
                warn!(
                    "pinctrl command failed for GPIO pin {pin}: {}",
                    String::from_utf8_lossy(&output.stderr).trim()
                );
                None
            }
            Err(e) => {
                warn!("Failed to check pinctrl availability: {e:#}");
                None
            }
        }
    }

    /// Read the current pin level. Any failure (spawn error, non-zero
    /// exit, timeout, unparsable output) degrades to `None`.
    pub async fn read(&self) -> Option<bool> {
        let output = match query_pin(self.pin).await {
            Ok(output) => output,
            Err(e) => {
                error!("Error reading fan GPIO pin {} with pinctrl: {e:#}", self.pin);
                return None;
            }
        };

        if !output.status.success() {
            error!(
                "pinctrl command failed: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            );
            return None;
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let text = stdout.trim();
        debug!("pinctrl output for pin {}: {text}", self.pin);

        let level = parse_pin_level(text);
        if level.is_none() {
            warn!("Could not parse pinctrl output for pin {}: {text}", self.pin);
        }
        level
    }
}

/// Run `pinctrl get <pin>` with the fixed timeout
async fn query_pin(pin: u8) -> Result<Output> {
    let run = Command::new("pinctrl").arg("get").arg(pin.to_string()).output();
    timeout(PINCTRL_TIMEOUT, run)
        .await
        .with_context(|| format!("pinctrl timed out after {}s for GPIO pin {pin}", PINCTRL_TIMEOUT.as_secs()))?
        .with_context(|| format!("failed to run pinctrl for GPIO pin {pin}"))
}
