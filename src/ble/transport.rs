//! Trait abstraction over the BLE stack to enable testing

use std::time::Duration;

use async_trait::async_trait;
use uuid::Uuid;

use super::discovery::DiscoveredDevice;
use crate::error::Result;
use crate::protocol::types::RawPayload;

/// Callback invoked for every notification, in arrival order
pub type NotificationHandler = Box<dyn Fn(RawPayload) + Send + Sync>;

/// Operations a session needs from a BLE central
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait BleTransport: Send {
    /// Connect to the peripheral at `address`
    async fn connect(&mut self, address: &str) -> Result<()>;

    /// Tear down the current connection and any subscription
    async fn disconnect(&mut self) -> Result<()>;

    /// Subscribe to `characteristic` and forward notifications to `handler`
    ///
    /// Returns once the subscription is confirmed; notifications are
    /// delivered from a background task afterwards.
    async fn start_notify(&mut self, characteristic: Uuid, handler: NotificationHandler)
        -> Result<()>;

    /// Whether the link is currently up
    async fn is_connected(&self) -> bool;

    /// Scan for advertising peripherals for at most `timeout`
    async fn scan(&mut self, timeout: Duration) -> Result<Vec<DiscoveredDevice>>;
}
