//! # Payload Constants and Types
//!
//! Core definitions shared by the decoder, the dashboard and the recorder.

use std::fmt;

use chrono::{DateTime, Local};

use super::faults::FaultKind;

/// Nominal notification size in bytes
pub const PAYLOAD_SIZE: usize = 8;

/// Minimum buffer length for telemetry decoding (bytes 0..=4)
pub const TELEMETRY_MIN_LEN: usize = 5;

/// Minimum buffer length for fault decoding (bytes 0..=1)
pub const FAULT_MIN_LEN: usize = 2;

/// Number of monitored battery control units
pub const MODULE_COUNT: usize = 16;

/// Raw temperature byte offset (0 => -40 °C)
pub const TEMPERATURE_OFFSET_C: i16 = 40;

/// Timestamp format used for fault events and log entries
pub const TIMESTAMP_FORMAT: &str = "%d/%m/%Y %H:%M:%S";

/// A raw notification buffer as delivered by the transport
pub type RawPayload = Vec<u8>;

/// Battery control unit identifier (1-16)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ModuleId(u8);

impl ModuleId {
    /// Create a module id, returning `None` outside 1..=16
    pub fn new(id: u8) -> Option<Self> {
        if (1..=MODULE_COUNT as u8).contains(&id) {
            Some(Self(id))
        } else {
            None
        }
    }

    /// Module id for a zero-based slot index. Panics past the last module.
    pub(crate) fn from_index(index: usize) -> Self {
        assert!(index < MODULE_COUNT, "module index {} out of range", index);
        Self(index as u8 + 1)
    }

    /// One-based module number
    pub fn get(self) -> u8 {
        self.0
    }

    /// Zero-based slot index
    pub fn index(self) -> usize {
        self.0 as usize - 1
    }

    /// All 16 modules in order
    pub fn all() -> impl Iterator<Item = ModuleId> {
        (0..MODULE_COUNT).map(Self::from_index)
    }
}

impl fmt::Display for ModuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BCU {}", self.0)
    }
}

/// What the dashboard is showing: one module or the pack average
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ModuleSelector {
    #[default]
    Total,
    Module(ModuleId),
}

impl fmt::Display for ModuleSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModuleSelector::Total => write!(f, "Total"),
            ModuleSelector::Module(id) => id.fmt(f),
        }
    }
}

/// Decoded telemetry of a single module
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TelemetryRecord {
    /// State of charge in % (0-100)
    pub state_of_charge_pct: u8,

    /// State of health in % (0-100)
    pub state_of_health_pct: u8,

    /// Pack voltage in V/100
    pub voltage_cv: u16,

    /// Temperature in °C (-40 to 215)
    pub temperature_c: i16,
}

impl TelemetryRecord {
    /// Voltage in volts
    pub fn voltage(&self) -> f64 {
        f64::from(self.voltage_cv) / 100.0
    }
}

/// Displayable telemetry values.
///
/// For a single module this is an exact conversion of its [`TelemetryRecord`];
/// for the pack total every field is the mean over all modules.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct TelemetrySummary {
    pub state_of_charge: f64,
    pub state_of_health: f64,
    pub voltage: f64,
    pub temperature: f64,
}

impl From<TelemetryRecord> for TelemetrySummary {
    fn from(record: TelemetryRecord) -> Self {
        Self {
            state_of_charge: f64::from(record.state_of_charge_pct),
            state_of_health: f64::from(record.state_of_health_pct),
            voltage: record.voltage(),
            temperature: f64::from(record.temperature_c),
        }
    }
}

impl fmt::Display for TelemetrySummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "SOC {}% | SOH {}% | {:.2} V | {}°C",
            self.state_of_charge, self.state_of_health, self.voltage, self.temperature
        )
    }
}

/// A decoded fault notification
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FaultEvent {
    /// Module the fault is attributed to
    pub module_id: ModuleId,

    /// Fault resolved from the first payload byte
    pub kind: FaultKind,

    /// Raw detail code (second payload byte)
    pub code: u8,

    /// Capture time, assigned at decode time
    pub timestamp: DateTime<Local>,
}

impl FaultEvent {
    /// Human-readable description
    pub fn message(&self) -> String {
        self.kind.message()
    }
}

impl fmt::Display for FaultEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} | {}    Code: 0x{:02X}",
            self.message(),
            self.timestamp.format(TIMESTAMP_FORMAT),
            self.code
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_module_id_range() {
        assert!(ModuleId::new(0).is_none());
        assert!(ModuleId::new(17).is_none());
        assert_eq!(ModuleId::new(1).unwrap().index(), 0);
        assert_eq!(ModuleId::new(16).unwrap().index(), 15);
    }

    #[test]
    fn test_module_id_all() {
        let ids: Vec<u8> = ModuleId::all().map(ModuleId::get).collect();
        assert_eq!(ids, (1..=16).collect::<Vec<u8>>());
    }

    #[test]
    fn test_selector_display() {
        assert_eq!(ModuleSelector::Total.to_string(), "Total");
        let bcu = ModuleSelector::Module(ModuleId::new(7).unwrap());
        assert_eq!(bcu.to_string(), "BCU 7");
    }

    #[test]
    fn test_record_voltage() {
        let record = TelemetryRecord {
            voltage_cv: 65535,
            ..Default::default()
        };
        assert!((record.voltage() - 655.35).abs() < 1e-9);
    }

    #[test]
    fn test_summary_from_record() {
        let record = TelemetryRecord {
            state_of_charge_pct: 50,
            state_of_health_pct: 98,
            voltage_cv: 4820,
            temperature_c: -5,
        };
        let summary = TelemetrySummary::from(record);
        assert_eq!(summary.state_of_charge, 50.0);
        assert_eq!(summary.state_of_health, 98.0);
        assert_eq!(summary.voltage, 48.2);
        assert_eq!(summary.temperature, -5.0);
    }
}
