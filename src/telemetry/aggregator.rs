//! # Telemetry Aggregator
//!
//! Keeps the latest [`TelemetryRecord`] of each of the 16 modules and the
//! pack-wide "Total".
//!
//! The total is the per-field arithmetic mean over all 16 slots and is
//! recomputed from scratch on every update. Slots that have not reported yet
//! hold an all-zero record, so early totals lean towards zero until every
//! module has reported at least once.

use crate::protocol::types::{
    ModuleId, ModuleSelector, TelemetryRecord, TelemetrySummary, MODULE_COUNT,
};

#[derive(Debug, Clone, Default)]
pub struct TelemetryAggregator {
    modules: [TelemetryRecord; MODULE_COUNT],
    total: TelemetrySummary,
}

impl TelemetryAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the record of `module_id` and recompute the total
    pub fn update(&mut self, module_id: ModuleId, record: TelemetryRecord) {
        self.modules[module_id.index()] = record;
        self.total = self.compute_total();
    }

    /// Current values for a module or the pack total
    pub fn select(&self, selector: ModuleSelector) -> TelemetrySummary {
        match selector {
            ModuleSelector::Total => self.total,
            ModuleSelector::Module(id) => self.record(id).into(),
        }
    }

    pub fn record(&self, module_id: ModuleId) -> TelemetryRecord {
        self.modules[module_id.index()]
    }

    pub fn total(&self) -> TelemetrySummary {
        self.total
    }

    fn compute_total(&self) -> TelemetrySummary {
        let mut soc: u32 = 0;
        let mut soh: u32 = 0;
        let mut voltage_cv: u32 = 0;
        let mut temperature: i32 = 0;

        // Integer sums keep the mean of identical records exact
        for record in &self.modules {
            soc += u32::from(record.state_of_charge_pct);
            soh += u32::from(record.state_of_health_pct);
            voltage_cv += u32::from(record.voltage_cv);
            temperature += i32::from(record.temperature_c);
        }

        let count = MODULE_COUNT as f64;
        TelemetrySummary {
            state_of_charge: f64::from(soc) / count,
            state_of_health: f64::from(soh) / count,
            voltage: f64::from(voltage_cv) / count / 100.0,
            temperature: f64::from(temperature) / count,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn module(id: u8) -> ModuleId {
        ModuleId::new(id).unwrap()
    }

    fn sample_record() -> TelemetryRecord {
        TelemetryRecord {
            state_of_charge_pct: 87,
            state_of_health_pct: 95,
            voltage_cv: 5123,
            temperature_c: 31,
        }
    }

    #[test]
    fn test_initial_state_is_zero() {
        let aggregator = TelemetryAggregator::new();
        assert_eq!(aggregator.total(), TelemetrySummary::default());
        for id in ModuleId::all() {
            assert_eq!(aggregator.record(id), TelemetryRecord::default());
        }
    }

    #[test]
    fn test_total_equals_record_when_all_modules_identical() {
        let mut aggregator = TelemetryAggregator::new();
        let record = sample_record();

        for id in ModuleId::all() {
            aggregator.update(id, record);
        }

        assert_eq!(aggregator.select(ModuleSelector::Total), TelemetrySummary::from(record));
    }

    #[test]
    fn test_single_update_biases_total_towards_zero() {
        let mut aggregator = TelemetryAggregator::new();
        aggregator.update(
            module(3),
            TelemetryRecord {
                state_of_charge_pct: 80,
                state_of_health_pct: 96,
                voltage_cv: 3200,
                temperature_c: 16,
            },
        );

        let total = aggregator.total();
        assert_eq!(total.state_of_charge, 5.0);
        assert_eq!(total.state_of_health, 6.0);
        assert_eq!(total.voltage, 2.0);
        assert_eq!(total.temperature, 1.0);
    }

    #[test]
    fn test_update_replaces_previous_record() {
        let mut aggregator = TelemetryAggregator::new();
        aggregator.update(module(1), sample_record());
        let replacement = TelemetryRecord {
            state_of_charge_pct: 10,
            ..sample_record()
        };
        aggregator.update(module(1), replacement);

        assert_eq!(aggregator.record(module(1)), replacement);
        assert_eq!(aggregator.total().state_of_charge, 10.0 / 16.0);
    }

    #[test]
    fn test_negative_temperatures_average() {
        let mut aggregator = TelemetryAggregator::new();
        for id in ModuleId::all() {
            aggregator.update(
                id,
                TelemetryRecord {
                    temperature_c: -40,
                    ..Default::default()
                },
            );
        }
        assert_eq!(aggregator.total().temperature, -40.0);
    }

    #[test]
    fn test_select_module_has_no_side_effects() {
        let mut aggregator = TelemetryAggregator::new();
        aggregator.update(module(16), sample_record());
        let before = aggregator.total();

        let selected = aggregator.select(ModuleSelector::Module(module(16)));
        assert_eq!(selected, TelemetrySummary::from(sample_record()));
        assert_eq!(aggregator.total(), before);
    }
}
