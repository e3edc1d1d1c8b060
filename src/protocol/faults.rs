//! # Fault Code Table
//!
//! Fixed mapping from the first payload byte to a fault description.

/// Fault identified by the first byte of a notification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FaultKind {
    CellOvervoltage,
    CellUndervoltage,
    OverTemperature,
    UnderTemperature,
    ChargeOvercurrent,
    DischargeOvercurrent,
    BmsCommunicationLost,
    PackUnbalanced,
    /// Any id outside the table, carried verbatim
    Unknown(u8),
}

/// Known fault ids in table order
pub const KNOWN_FAULT_IDS: [u8; 8] = [145, 146, 147, 148, 149, 150, 151, 152];

impl FaultKind {
    /// Resolve a fault id
    pub fn from_id(id: u8) -> Self {
        match id {
            145 => FaultKind::CellOvervoltage,
            146 => FaultKind::CellUndervoltage,
            147 => FaultKind::OverTemperature,
            148 => FaultKind::UnderTemperature,
            149 => FaultKind::ChargeOvercurrent,
            150 => FaultKind::DischargeOvercurrent,
            151 => FaultKind::BmsCommunicationLost,
            152 => FaultKind::PackUnbalanced,
            other => FaultKind::Unknown(other),
        }
    }

    /// Raw fault id
    pub fn id(self) -> u8 {
        match self {
            FaultKind::CellOvervoltage => 145,
            FaultKind::CellUndervoltage => 146,
            FaultKind::OverTemperature => 147,
            FaultKind::UnderTemperature => 148,
            FaultKind::ChargeOvercurrent => 149,
            FaultKind::DischargeOvercurrent => 150,
            FaultKind::BmsCommunicationLost => 151,
            FaultKind::PackUnbalanced => 152,
            FaultKind::Unknown(id) => id,
        }
    }

    pub fn is_known(self) -> bool {
        !matches!(self, FaultKind::Unknown(_))
    }

    /// Human-readable description
    pub fn message(self) -> String {
        let text = match self {
            FaultKind::CellOvervoltage => "Cell Overvoltage",
            FaultKind::CellUndervoltage => "Cell Undervoltage",
            FaultKind::OverTemperature => "Over Temperature",
            FaultKind::UnderTemperature => "Under Temperature",
            FaultKind::ChargeOvercurrent => "Charge Overcurrent",
            FaultKind::DischargeOvercurrent => "Discharge Overcurrent",
            FaultKind::BmsCommunicationLost => "BMS Communication Lost",
            FaultKind::PackUnbalanced => "Battery Pack Unbalanced",
            FaultKind::Unknown(id) => return format!("Unknown Error ID {}", id),
        };
        text.to_string()
    }
}
