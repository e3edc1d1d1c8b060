//! BLE transport backed by the platform Bluetooth stack via `bluest`
//!
//! Only built with the `bluetooth` cargo feature.

use std::time::Duration;

use async_trait::async_trait;
use bluest::{Adapter, Characteristic, Device};
use futures_util::StreamExt;
use tokio::sync::oneshot;
use tokio::time::{timeout_at, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};
use uuid::Uuid;

use super::discovery::DiscoveredDevice;
use super::transport::{BleTransport, NotificationHandler};
use crate::error::{MonitorError, Result};

/// Whether a platform device id refers to `address`
///
/// Device ids differ per platform (BlueZ object paths end in
/// `dev_A8_42_E3_AB_6D_AA`, Windows ids end in the colon form), so both sides
/// are compared with separators stripped.
fn id_matches_address(id: &str, address: &str) -> bool {
    let normalize = |s: &str| -> String {
        s.chars()
            .filter(|c| !matches!(c, ':' | '_' | '-'))
            .map(|c| c.to_ascii_uppercase())
            .collect()
    };

    let wanted = normalize(address);
    !wanted.is_empty() && normalize(id).ends_with(&wanted)
}

fn connection_failure(context: &str, e: impl std::fmt::Display) -> MonitorError {
    MonitorError::ConnectionFailure(format!("{}: {}", context, e))
}

pub struct BluestTransport {
    adapter: Option<Adapter>,
    device: Option<Device>,
    notify_cancel: CancellationToken,
    scan_timeout: Duration,
}

impl BluestTransport {
    /// # Arguments
    ///
    /// * `scan_timeout` - How long `connect` scans for a device that is not
    ///   already connected to the adapter
    pub fn new(scan_timeout: Duration) -> Self {
        Self {
            adapter: None,
            device: None,
            notify_cancel: CancellationToken::new(),
            scan_timeout,
        }
    }

    pub fn scan_timeout(&self) -> Duration {
        self.scan_timeout
    }

    async fn adapter(&mut self) -> Result<Adapter> {
        if let Some(adapter) = &self.adapter {
            return Ok(adapter.clone());
        }

        let adapter = Adapter::default()
            .await
            .ok_or_else(|| MonitorError::ConnectionFailure("default Bluetooth adapter not found".to_string()))?;
        adapter
            .wait_available()
            .await
            .map_err(|e| connection_failure("adapter unavailable", e))?;

        info!("Bluetooth adapter ready");
        self.adapter = Some(adapter.clone());
        Ok(adapter)
    }

    async fn find_device(adapter: &Adapter, address: &str, scan_timeout: Duration) -> Result<Device> {
        let connected = adapter
            .connected_devices()
            .await
            .map_err(|e| connection_failure("listing connected devices", e))?;
        if let Some(device) = connected
            .into_iter()
            .find(|d| id_matches_address(&d.id().to_string(), address))
        {
            debug!("{} is already connected to the adapter", address);
            return Ok(device);
        }

        let mut scan = adapter
            .scan(&[])
            .await
            .map_err(|e| connection_failure("starting scan", e))?;
        let deadline = Instant::now() + scan_timeout;

        while let Ok(Some(found)) = timeout_at(deadline, scan.next()).await {
            if id_matches_address(&found.device.id().to_string(), address) {
                return Ok(found.device);
            }
        }

        Err(MonitorError::ConnectionFailure(format!(
            "device {} not found within {:?}",
            address, scan_timeout
        )))
    }

    async fn find_characteristic(device: &Device, uuid: Uuid) -> Result<Characteristic> {
        let services = device
            .discover_services()
            .await
            .map_err(|e| connection_failure("discovering services", e))?;

        for service in services {
            let characteristics = service
                .discover_characteristics()
                .await
                .map_err(|e| connection_failure("discovering characteristics", e))?;
            if let Some(found) = characteristics.into_iter().find(|c| c.uuid() == uuid) {
                debug!("Characteristic {} found in service {}", uuid, service.uuid());
                return Ok(found);
            }
        }

        Err(MonitorError::ConnectionFailure(format!(
            "characteristic {} not found",
            uuid
        )))
    }
}

#[async_trait]
impl BleTransport for BluestTransport {
    async fn connect(&mut self, address: &str) -> Result<()> {
        let adapter = self.adapter().await?;
        let device = Self::find_device(&adapter, address, self.scan_timeout).await?;

        if !device.is_connected().await {
            adapter
                .connect_device(&device)
                .await
                .map_err(|e| connection_failure("connecting", e))?;
        }

        info!("Connected to {}", device.id());
        self.device = Some(device);
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<()> {
        self.notify_cancel.cancel();
        self.notify_cancel = CancellationToken::new();

        let Some(device) = self.device.take() else {
            return Ok(());
        };

        if let Some(adapter) = &self.adapter {
            if device.is_connected().await {
                adapter
                    .disconnect_device(&device)
                    .await
                    .map_err(|e| connection_failure("disconnecting", e))?;
            }
        }
        Ok(())
    }

    async fn start_notify(
        &mut self,
        characteristic: Uuid,
        handler: NotificationHandler,
    ) -> Result<()> {
        let device = self
            .device
            .as_ref()
            .ok_or_else(|| MonitorError::ConnectionFailure("not connected".to_string()))?;
        let notify_char = Self::find_characteristic(device, characteristic).await?;

        let cancel = self.notify_cancel.clone();
        let (ready_tx, ready_rx) = oneshot::channel::<std::result::Result<(), String>>();

        tokio::spawn(async move {
            let mut stream = match notify_char.notify().await {
                Ok(stream) => {
                    let _ = ready_tx.send(Ok(()));
                    stream
                }
                Err(e) => {
                    let _ = ready_tx.send(Err(e.to_string()));
                    return;
                }
            };

            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    item = stream.next() => match item {
                        Some(Ok(value)) => handler(value),
                        Some(Err(e)) => {
                            error!("Error in notification stream: {}", e);
                            break;
                        }
                        None => break,
                    },
                }
            }

            info!("Notification stream ended");
        });

        match ready_rx.await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(message)) => Err(connection_failure("subscribing", message)),
            Err(_) => Err(MonitorError::ConnectionFailure(
                "notification task ended before subscribing".to_string(),
            )),
        }
    }

    async fn is_connected(&self) -> bool {
        match &self.device {
            Some(device) => device.is_connected().await,
            None => false,
        }
    }

    async fn scan(&mut self, timeout: Duration) -> Result<Vec<DiscoveredDevice>> {
        let adapter = self
            .adapter()
            .await
            .map_err(|e| MonitorError::DiscoveryFailure(e.to_string()))?;
        let mut scan = adapter
            .scan(&[])
            .await
            .map_err(|e| MonitorError::DiscoveryFailure(e.to_string()))?;

        let deadline = Instant::now() + timeout;
        let mut devices = Vec::new();

        while let Ok(Some(found)) = timeout_at(deadline, scan.next()).await {
            let name = found
                .adv_data
                .local_name
                .or_else(|| found.device.name().ok());
            devices.push(DiscoveredDevice::new(name, found.device.id().to_string()));
        }

        Ok(devices)
    }
}
