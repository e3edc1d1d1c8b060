//! # Fault Log
//!
//! Per-module history of decoded fault events, oldest first.
//!
//! Each module keeps at most `max_events_per_module` events; recording into a
//! full history evicts the oldest entry. [`FaultLog::clear`] empties every
//! history at once.

use std::collections::VecDeque;

use tracing::debug;

use crate::protocol::types::{FaultEvent, ModuleId, MODULE_COUNT};

#[derive(Debug, Clone)]
pub struct FaultLog {
    histories: [VecDeque<FaultEvent>; MODULE_COUNT],
    max_events_per_module: usize,
}

impl FaultLog {
    /// Create an empty log
    ///
    /// # Arguments
    ///
    /// * `max_events_per_module` - Retention limit per module (at least 1)
    pub fn new(max_events_per_module: usize) -> Self {
        Self {
            histories: Default::default(),
            max_events_per_module: max_events_per_module.max(1),
        }
    }

    /// Append an event to its module's history
    ///
    /// Returns the evicted event if the history was full.
    pub fn record(&mut self, event: FaultEvent) -> Option<FaultEvent> {
        let history = &mut self.histories[event.module_id.index()];
        let evicted = if history.len() >= self.max_events_per_module {
            history.pop_front()
        } else {
            None
        };

        if let Some(old) = &evicted {
            debug!("{} fault history full, evicting event from {}", old.module_id, old.timestamp);
        }

        history.push_back(event);
        evicted
    }

    /// Events of one module in insertion order
    pub fn list(&self, module_id: ModuleId) -> impl Iterator<Item = &FaultEvent> + '_ {
        self.histories[module_id.index()].iter()
    }

    pub fn len(&self, module_id: ModuleId) -> usize {
        self.histories[module_id.index()].len()
    }

    /// Number of events across all modules
    pub fn total_len(&self) -> usize {
        self.histories.iter().map(VecDeque::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.histories.iter().all(VecDeque::is_empty)
    }

    pub fn max_events_per_module(&self) -> usize {
        self.max_events_per_module
    }

    /// Discard every history
    pub fn clear(&mut self) {
        for history in &mut self.histories {
            history.clear();
        }
    }
}
