//! # BLE Session Module
//!
//! Owns one connection to the BMS peripheral and one notification
//! subscription.
//!
//! This module handles:
//! - Connecting to a peripheral by address
//! - Subscribing to the telemetry characteristic
//! - Forwarding every notification to the caller in arrival order
//! - Graceful, idempotent teardown
//!
//! Failures never propagate to the caller: they are logged, the link is torn
//! down on a best-effort basis and the session returns to
//! [`SessionState::Disconnected`]. There is no automatic retry.

pub mod discovery;
pub mod simulator;
pub mod transport;

#[cfg(feature = "bluetooth")]
pub mod bluest_transport;

use std::fmt;

use tracing::{debug, error, info, trace, warn};
use uuid::Uuid;

use crate::error::{MonitorError, Result};
use crate::protocol::types::RawPayload;
use transport::{BleTransport, NotificationHandler};

/// Connection lifecycle of a [`BleSession`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Disconnected,
    Connecting,
    Listening,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            SessionState::Disconnected => "disconnected",
            SessionState::Connecting => "connecting",
            SessionState::Listening => "listening",
        };
        f.write_str(text)
    }
}

/// One BLE connection with a single notification subscription
pub struct BleSession<T: BleTransport> {
    transport: T,
    state: SessionState,
    address: Option<String>,
}

impl<T: BleTransport> fmt::Debug for BleSession<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BleSession")
            .field("state", &self.state)
            .field("address", &self.address)
            .finish_non_exhaustive()
    }
}

impl<T: BleTransport> BleSession<T> {
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            state: SessionState::Disconnected,
            address: None,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// True while notifications are being forwarded
    pub fn is_connected(&self) -> bool {
        self.state == SessionState::Listening
    }

    /// Address of the current (or last attempted) peripheral
    pub fn address(&self) -> Option<&str> {
        self.address.as_deref()
    }

    /// Direct access to the transport, e.g. for discovery scans
    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    /// Connect, subscribe and forward notifications to `on_data`
    ///
    /// Returns normally in every case; check [`BleSession::state`] afterwards.
    /// A call while a session is already active is ignored.
    ///
    /// # Arguments
    ///
    /// * `address` - Peripheral address (e.g. "A8:42:E3:AB:6D:AA")
    /// * `characteristic` - Notifying characteristic UUID
    /// * `on_data` - Receives every raw notification buffer
    pub async fn connect_and_listen<F>(&mut self, address: &str, characteristic: Uuid, on_data: F)
    where
        F: Fn(RawPayload) + Send + Sync + 'static,
    {
        if self.state != SessionState::Disconnected {
            warn!("Session already {}, ignoring connect to {}", self.state, address);
            return;
        }

        self.state = SessionState::Connecting;
        self.address = Some(address.to_string());
        info!("Connecting to {}...", address);

        match self.establish(address, characteristic, on_data).await {
            Ok(()) => {
                self.state = SessionState::Listening;
                info!("Listening for notifications on {}", characteristic);
            }
            Err(e) => {
                error!("Connection to {} failed: {}", address, e);
                if let Err(teardown) = self.transport.disconnect().await {
                    debug!("Teardown after failed connect: {}", teardown);
                }
                self.state = SessionState::Disconnected;
            }
        }
    }

    async fn establish<F>(&mut self, address: &str, characteristic: Uuid, on_data: F) -> Result<()>
    where
        F: Fn(RawPayload) + Send + Sync + 'static,
    {
        self.transport.connect(address).await?;

        if !self.transport.is_connected().await {
            return Err(MonitorError::ConnectionFailure(format!(
                "link to {} is not up after connect",
                address
            )));
        }

        let handler: NotificationHandler = Box::new(move |payload: RawPayload| {
            trace!("RX: {}", hex::encode_upper(&payload));
            on_data(payload);
        });

        self.transport.start_notify(characteristic, handler).await
    }

    /// Tear down the connection
    ///
    /// No-op when already disconnected. Transport errors are logged, never
    /// returned.
    pub async fn disconnect(&mut self) {
        if self.state == SessionState::Disconnected {
            debug!("Disconnect requested while already disconnected");
            return;
        }

        if let Err(e) = self.transport.disconnect().await {
            warn!("Error while disconnecting: {}", e);
        }

        self.state = SessionState::Disconnected;
        info!("Disconnected");
    }

    /// Poll the transport and mark a dropped link as disconnected
    pub async fn check_link(&mut self) -> SessionState {
        if self.state == SessionState::Listening && !self.transport.is_connected().await {
            warn!(
                "Link to {} dropped",
                self.address.as_deref().unwrap_or("peripheral")
            );
            self.state = SessionState::Disconnected;
        }
        self.state
    }
}
