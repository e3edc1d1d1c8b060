//! # Device Discovery
//!
//! Scan for nearby peripherals with a fixed timeout and hand the chosen
//! address to whoever opens the session.

use std::fmt;
use std::time::Duration;

use tracing::{debug, info, warn};

use super::transport::BleTransport;
use crate::error::{MonitorError, Result};

/// Name shown for devices that do not advertise one
pub const UNNAMED_DEVICE: &str = "Unnamed";

/// Extra time granted to the transport beyond the scan window
const SCAN_GRACE: Duration = Duration::from_secs(1);

/// A peripheral seen during a scan
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredDevice {
    pub name: String,
    pub address: String,
}

impl DiscoveredDevice {
    pub fn new(name: Option<String>, address: impl Into<String>) -> Self {
        let name = name
            .map(|n| n.trim().to_string())
            .filter(|n| !n.is_empty())
            .unwrap_or_else(|| UNNAMED_DEVICE.to_string());

        Self {
            name,
            address: address.into(),
        }
    }

    /// List label, `"<name> — <address>"`
    pub fn label(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for DiscoveredDevice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} — {}", self.name, self.address)
    }
}

/// Scan for devices
///
/// Duplicate addresses are collapsed, keeping the first sighting. An empty
/// result is not an error.
///
/// # Arguments
///
/// * `transport` - BLE central to scan with
/// * `timeout` - Scan window
///
/// # Errors
///
/// Returns `DiscoveryFailure` if the transport fails or overruns the window
pub async fn discover_devices<T>(transport: &mut T, timeout: Duration) -> Result<Vec<DiscoveredDevice>>
where
    T: BleTransport + ?Sized,
{
    info!("Scanning for BLE devices ({:?})", timeout);

    let found = tokio::time::timeout(timeout + SCAN_GRACE, transport.scan(timeout))
        .await
        .map_err(|_| MonitorError::DiscoveryFailure(format!("scan did not finish within {:?}", timeout)))?
        .map_err(|e| match e {
            MonitorError::DiscoveryFailure(_) => e,
            other => MonitorError::DiscoveryFailure(other.to_string()),
        })?;

    let mut devices: Vec<DiscoveredDevice> = Vec::with_capacity(found.len());
    for device in found {
        if devices.iter().any(|d| d.address == device.address) {
            continue;
        }
        debug!("Found {}", device);
        devices.push(device);
    }

    info!("Scan finished, {} device(s) found", devices.len());
    Ok(devices)
}

/// Pick a device and report its address through `on_device_selected`
///
/// The `preferred` address wins when it was seen (compared
/// case-insensitively), otherwise the first device is taken. The callback
/// runs at most once.
pub fn choose_device<'a, F>(
    devices: &'a [DiscoveredDevice],
    preferred: Option<&str>,
    on_device_selected: F,
) -> Option<&'a DiscoveredDevice>
where
    F: FnOnce(&str),
{
    let preferred_match = preferred.and_then(|wanted| {
        devices
            .iter()
            .find(|d| d.address.eq_ignore_ascii_case(wanted))
    });

    if preferred_match.is_none() {
        if let Some(wanted) = preferred {
            warn!("Preferred device {} not found in scan results", wanted);
        }
    }

    let chosen = preferred_match.or_else(|| devices.first())?;
    info!("Selected {}", chosen);
    on_device_selected(&chosen.address);
    Some(chosen)
}
