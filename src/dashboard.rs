//! # Dashboard Controller
//!
//! Connects the BLE notification path to the state the presentation side
//! reads.
//!
//! ```text
//! BleSession ──on_new_data──► PayloadDispatcher ──► latest-payload cell ──► Recorder
//!                                     │
//!                                     └─► unbounded queue ──► Dashboard::run ──► DashboardState
//! ```
//!
//! Every buffer is applied twice: once as telemetry and once as a fault, each
//! attributed to module `(byte0 % 16) + 1`. A buffer too short for one path is
//! logged and skipped on that path only.

use std::sync::{Arc, PoisonError, RwLock};

use chrono::{DateTime, Local};
use tokio::sync::mpsc;
use tracing::{debug, info, trace, warn};

use crate::config::FaultConfig;
use crate::protocol::decoder::{decode_fault_at, decode_telemetry, module_for_payload};
use crate::protocol::types::{FaultEvent, ModuleId, ModuleSelector, RawPayload, TelemetrySummary};
use crate::telemetry::aggregator::TelemetryAggregator;
use crate::telemetry::fault_log::FaultLog;
use crate::telemetry::recorder::{latest_payload_cell, LatestPayloadReceiver, LatestPayloadSender};

/// Shared handle to the dashboard state
pub type SharedState = Arc<RwLock<DashboardState>>;

/// Text shown on the dashboard card
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CardLines {
    pub state_of_charge: String,
    pub state_of_health: String,
    pub voltage: String,
    pub temperature: String,
}

impl From<TelemetrySummary> for CardLines {
    fn from(summary: TelemetrySummary) -> Self {
        Self {
            state_of_charge: format!("{}%", summary.state_of_charge),
            state_of_health: format!("{}%", summary.state_of_health),
            voltage: format!("{:.2} V", summary.voltage),
            temperature: format!("{}°C", summary.temperature),
        }
    }
}

/// Everything the presentation side displays
#[derive(Debug, Clone)]
pub struct DashboardState {
    aggregator: TelemetryAggregator,
    faults: FaultLog,
    selected: ModuleSelector,
    fault_module: ModuleId,
    received: u64,
}

impl DashboardState {
    pub fn new(max_events_per_module: usize) -> Self {
        Self {
            aggregator: TelemetryAggregator::new(),
            faults: FaultLog::new(max_events_per_module),
            selected: ModuleSelector::Total,
            fault_module: ModuleId::from_index(0),
            received: 0,
        }
    }

    /// Apply one raw buffer to both the telemetry and the fault path
    pub fn apply(&mut self, raw: &[u8]) {
        self.apply_at(raw, Local::now());
    }

    /// Same as [`DashboardState::apply`] with an explicit fault timestamp
    pub fn apply_at(&mut self, raw: &[u8], timestamp: DateTime<Local>) {
        self.received += 1;

        match module_for_payload(raw).and_then(|id| Ok((id, decode_telemetry(raw)?))) {
            Ok((module_id, record)) => {
                trace!("{} telemetry: {:?}", module_id, record);
                self.aggregator.update(module_id, record);
            }
            Err(e) => warn!("Skipping telemetry update: {}", e),
        }

        match decode_fault_at(raw, timestamp) {
            Ok(event) => {
                debug!("{}: {}", event.module_id, event);
                self.faults.record(event);
            }
            Err(e) => warn!("Skipping fault record: {}", e),
        }
    }

    /// Choose what the dashboard card shows
    pub fn select(&mut self, selector: ModuleSelector) {
        self.selected = selector;
    }

    pub fn selected(&self) -> ModuleSelector {
        self.selected
    }

    /// Values for the current selection
    pub fn summary(&self) -> TelemetrySummary {
        self.aggregator.select(self.selected)
    }

    /// Card text for the current selection
    pub fn card_lines(&self) -> CardLines {
        self.summary().into()
    }

    /// Choose whose fault history is listed
    pub fn select_fault_module(&mut self, module_id: ModuleId) {
        self.fault_module = module_id;
    }

    pub fn fault_module(&self) -> ModuleId {
        self.fault_module
    }

    /// Fault history of the selected module, oldest first
    pub fn selected_faults(&self) -> Vec<FaultEvent> {
        self.faults.list(self.fault_module).cloned().collect()
    }

    pub fn aggregator(&self) -> &TelemetryAggregator {
        &self.aggregator
    }

    pub fn fault_log(&self) -> &FaultLog {
        &self.faults
    }

    pub fn clear_faults(&mut self) {
        self.faults.clear();
    }

    /// Buffers applied so far
    pub fn received_count(&self) -> u64 {
        self.received
    }
}

/// Inbound side: the `on_new_data` callback target
#[derive(Debug, Clone)]
pub struct PayloadDispatcher {
    latest: Arc<LatestPayloadSender>,
    queue: mpsc::UnboundedSender<RawPayload>,
}

impl PayloadDispatcher {
    /// Accept one notification
    ///
    /// Replaces the latest-payload cell and queues the buffer for the
    /// dashboard. Never blocks and never drops.
    pub fn on_new_data(&self, raw: RawPayload) {
        self.latest.send_replace(Some(raw.clone()));
        if self.queue.send(raw).is_err() {
            debug!("Dashboard stopped, payload not queued");
        }
    }
}

/// Consumer side: applies queued buffers to the shared state
#[derive(Debug)]
pub struct Dashboard {
    queue: mpsc::UnboundedReceiver<RawPayload>,
    state: SharedState,
}

impl Dashboard {
    /// Handle for readers of the dashboard state
    pub fn state(&self) -> SharedState {
        Arc::clone(&self.state)
    }

    /// Apply buffers until every dispatcher has been dropped
    ///
    /// Returns the number of buffers applied.
    pub async fn run(mut self) -> usize {
        info!("Dashboard started");
        let mut applied = 0;
        while let Some(raw) = self.queue.recv().await {
            self.apply(&raw);
            applied += 1;
        }
        info!("Dashboard stopped after {} payloads", applied);
        applied
    }

    /// Apply whatever is queued right now without waiting
    pub fn drain(&mut self) -> usize {
        let mut applied = 0;
        while let Ok(raw) = self.queue.try_recv() {
            self.apply(&raw);
            applied += 1;
        }
        applied
    }

    fn apply(&self, raw: &[u8]) {
        self.state
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .apply(raw);
    }
}

/// Build the dispatcher, the dashboard and the recorder's payload receiver
///
/// # Examples
///
/// ```
/// use can2go_monitor::config::FaultConfig;
/// use can2go_monitor::dashboard;
///
/// let (dispatcher, mut dashboard, latest) = dashboard::channel(&FaultConfig::default());
/// dispatcher.on_new_data(vec![255, 255, 0, 100, 40, 0, 0, 0]);
///
/// assert_eq!(dashboard.drain(), 1);
/// assert!(latest.borrow().is_some());
/// ```
pub fn channel(config: &FaultConfig) -> (PayloadDispatcher, Dashboard, LatestPayloadReceiver) {
    let (latest_tx, latest_rx) = latest_payload_cell();
    let (queue_tx, queue_rx) = mpsc::unbounded_channel();

    let dispatcher = PayloadDispatcher {
        latest: Arc::new(latest_tx),
        queue: queue_tx,
    };
    let dashboard = Dashboard {
        queue: queue_rx,
        state: Arc::new(RwLock::new(DashboardState::new(config.max_events_per_module))),
    };

    (dispatcher, dashboard, latest_rx)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::faults::FaultKind;

    fn module(id: u8) -> ModuleId {
        ModuleId::new(id).unwrap()
    }

    #[test]
    fn test_apply_updates_telemetry_and_faults() {
        let mut state = DashboardState::new(10);
        state.apply(&[255, 255, 0, 100, 40, 0, 0, 0]);

        // 255 % 16 + 1
        let record = state.aggregator().record(module(16));
        assert_eq!(record.state_of_charge_pct, 100);
        assert_eq!(record.state_of_health_pct, 100);
        assert_eq!(record.voltage(), 1.0);
        assert_eq!(record.temperature_c, 0);

        let faults: Vec<&FaultEvent> = state.fault_log().list(module(16)).collect();
        assert_eq!(faults.len(), 1);
        assert_eq!(faults[0].kind, FaultKind::Unknown(255));
        assert_eq!(faults[0].code, 255);
        assert_eq!(state.received_count(), 1);
    }

    #[test]
    fn test_known_fault_is_attributed_to_module() {
        let mut state = DashboardState::new(10);
        state.apply(&[145, 0x12, 0x12, 0xC0, 0x41, 0, 0, 0]);

        // 145 % 16 + 1
        state.select_fault_module(module(2));
        let faults = state.selected_faults();
        assert_eq!(faults.len(), 1);
        assert_eq!(faults[0].message(), "Cell Overvoltage");
        assert_eq!(faults[0].code, 0x12);
    }

    #[test]
    fn test_short_buffer_skips_only_telemetry() {
        let mut state = DashboardState::new(10);
        state.apply(&[3, 7]);

        assert_eq!(state.aggregator().total(), TelemetrySummary::default());
        assert_eq!(state.fault_log().len(module(4)), 1);
    }

    #[test]
    fn test_single_byte_buffer_is_ignored() {
        let mut state = DashboardState::new(10);
        state.apply(&[9]);
        state.apply(&[]);

        assert!(state.fault_log().is_empty());
        assert_eq!(state.aggregator().total(), TelemetrySummary::default());
        assert_eq!(state.received_count(), 2);
    }

    #[test]
    fn test_card_lines_for_module() {
        let mut state = DashboardState::new(10);
        // SOC 50%, SOH 100%, 51.23 V, 25 °C on BCU 1
        state.apply(&[128, 255, 0x14, 0x03, 65, 0, 0, 0]);
        state.select(ModuleSelector::Module(module(1)));

        let card = state.card_lines();
        assert_eq!(card.state_of_charge, "50%");
        assert_eq!(card.state_of_health, "100%");
        assert_eq!(card.voltage, "51.23 V");
        assert_eq!(card.temperature, "25°C");
    }

    #[test]
    fn test_card_lines_for_total() {
        let mut state = DashboardState::new(10);
        assert_eq!(state.selected(), ModuleSelector::Total);

        for first in 0..16u8 {
            // Byte 0 picks the module, so SOC differs per module
            state.apply(&[first, 255, 0x03, 0xE8, 60, 0, 0, 0]);
        }

        let card = state.card_lines();
        assert_eq!(card.state_of_health, "100%");
        assert_eq!(card.voltage, "10.00 V");
        assert_eq!(card.temperature, "20°C");
    }

    #[test]
    fn test_clear_faults() {
        let mut state = DashboardState::new(10);
        state.apply(&[145, 1]);
        state.clear_faults();
        assert!(state.fault_log().is_empty());
    }

    #[test]
    fn test_dispatch_and_drain_in_order() {
        let (dispatcher, mut dashboard, latest) = channel(&FaultConfig::default());

        dispatcher.on_new_data(vec![0, 10, 0, 0, 40]);
        dispatcher.on_new_data(vec![0, 20, 0, 0, 40]);
        assert_eq!(latest.borrow().as_deref(), Some(&[0, 20, 0, 0, 40][..]));

        assert_eq!(dashboard.drain(), 2);
        assert_eq!(dashboard.drain(), 0);

        let state = dashboard.state();
        let state = state.read().unwrap();
        // Last write wins for BCU 1
        assert_eq!(state.aggregator().record(module(1)).state_of_health_pct, 7);

        let codes: Vec<u8> = state.fault_log().list(module(1)).map(|e| e.code).collect();
        assert_eq!(codes, vec![10, 20]);
    }

    #[tokio::test]
    async fn test_run_stops_when_dispatchers_dropped() {
        let (dispatcher, dashboard, _latest) = channel(&FaultConfig::default());
        let state = dashboard.state();
        let worker = tokio::spawn(dashboard.run());

        let clone = dispatcher.clone();
        dispatcher.on_new_data(vec![1, 2, 3, 4, 5, 6, 7, 8]);
        clone.on_new_data(vec![2, 2, 3, 4, 5, 6, 7, 8]);
        drop(dispatcher);
        drop(clone);

        assert_eq!(worker.await.unwrap(), 2);
        assert_eq!(state.read().unwrap().received_count(), 2);
    }

    #[test]
    fn test_dispatch_after_dashboard_dropped_still_updates_latest() {
        let (dispatcher, dashboard, latest) = channel(&FaultConfig::default());
        drop(dashboard);

        dispatcher.on_new_data(vec![1, 2]);
        assert_eq!(latest.borrow().as_deref(), Some(&[1, 2][..]));
    }
}
