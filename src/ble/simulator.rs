//! Simulated BLE transport
//!
//! Stands in for a real peripheral when no hardware is around: after a
//! subscription it emits a random 8-byte payload every period. Half of the
//! payloads carry a known fault id in the first byte so the fault path gets
//! exercised too.

use std::time::Duration;

use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use tokio::time::{self, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use uuid::Uuid;

use super::discovery::DiscoveredDevice;
use super::transport::{BleTransport, NotificationHandler};
use crate::error::{MonitorError, Result};
use crate::protocol::faults::KNOWN_FAULT_IDS;
use crate::protocol::types::{RawPayload, PAYLOAD_SIZE};

/// Address reported by the simulated peripheral
pub const SIMULATED_ADDRESS: &str = "00:00:00:00:00:00";

/// Name reported by the simulated peripheral
pub const SIMULATED_NAME: &str = "CAN2Go Simulator";

/// Generate one random payload
///
/// With probability 1/2 the first byte is replaced by a known fault id.
pub fn random_payload<R: Rng>(rng: &mut R) -> RawPayload {
    let mut payload = [0u8; PAYLOAD_SIZE];
    rng.fill(&mut payload[..]);

    if rng.gen_bool(0.5) {
        if let Some(&fault_id) = KNOWN_FAULT_IDS.choose(rng) {
            payload[0] = fault_id;
        }
    }

    payload.to_vec()
}

pub struct SimulatedTransport {
    period: Duration,
    connected: bool,
    cancel: CancellationToken,
}

impl SimulatedTransport {
    pub fn new(period: Duration) -> Self {
        Self {
            period,
            connected: false,
            cancel: CancellationToken::new(),
        }
    }

    fn stop_emitting(&mut self) {
        self.cancel.cancel();
        self.cancel = CancellationToken::new();
    }
}

impl Default for SimulatedTransport {
    fn default() -> Self {
        Self::new(Duration::from_secs(1))
    }
}

impl Drop for SimulatedTransport {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

#[async_trait]
impl BleTransport for SimulatedTransport {
    async fn connect(&mut self, address: &str) -> Result<()> {
        info!("Simulated connection to {}", address);
        self.connected = true;
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<()> {
        self.stop_emitting();
        self.connected = false;
        debug!("Simulated link closed");
        Ok(())
    }

    async fn start_notify(
        &mut self,
        characteristic: Uuid,
        handler: NotificationHandler,
    ) -> Result<()> {
        if !self.connected {
            return Err(MonitorError::ConnectionFailure(
                "simulated peripheral is not connected".to_string(),
            ));
        }

        self.stop_emitting();
        let cancel = self.cancel.clone();
        let period = self.period;
        debug!("Simulating notifications on {} every {:?}", characteristic, period);

        tokio::spawn(async move {
            let mut rng = StdRng::from_entropy();
            let mut ticker = time::interval_at(Instant::now() + period, period);

            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => handler(random_payload(&mut rng)),
                }
            }
        });

        Ok(())
    }

    async fn is_connected(&self) -> bool {
        self.connected
    }

    async fn scan(&mut self, _timeout: Duration) -> Result<Vec<DiscoveredDevice>> {
        Ok(vec![DiscoveredDevice::new(
            Some(SIMULATED_NAME.to_string()),
            SIMULATED_ADDRESS,
        )])
    }
}
