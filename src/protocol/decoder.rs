//! # BMS Payload Decoder
//!
//! Decodes raw notification buffers into telemetry records and fault events.
//!
//! ## Payload Layout
//!
//! | Byte | Telemetry meaning              | Fault meaning |
//! |------|--------------------------------|---------------|
//! | 0    | SOC, scaled `x * 100 / 255`    | fault id      |
//! | 1    | SOH, scaled `x * 100 / 255`    | detail code   |
//! | 2-3  | voltage, big-endian, V/100     | -             |
//! | 4    | temperature, `x - 40` °C       | -             |
//! | 5-7  | unused                         | -             |

use chrono::{DateTime, Local};

use super::faults::FaultKind;
use super::types::*;
use crate::error::{MonitorError, Result};

/// Scale a raw byte to a 0-100 percentage (integer division)
fn scale_percent(raw: u8) -> u8 {
    (u16::from(raw) * 100 / 255) as u8
}

fn require_len(buffer: &[u8], expected: usize) -> Result<()> {
    if buffer.len() < expected {
        return Err(MonitorError::MalformedPayload {
            expected,
            actual: buffer.len(),
        });
    }
    Ok(())
}

/// Decode a telemetry record
///
/// # Arguments
///
/// * `buffer` - Raw notification (at least 5 bytes)
///
/// # Returns
///
/// * `Result<TelemetryRecord>` - Decoded telemetry
///
/// # Errors
///
/// Returns `MalformedPayload` if the buffer is shorter than 5 bytes
///
/// # Examples
///
/// ```
/// use can2go_monitor::protocol::decoder::decode_telemetry;
///
/// let record = decode_telemetry(&[255, 255, 0, 100, 40]).unwrap();
/// assert_eq!(record.state_of_charge_pct, 100);
/// assert_eq!(record.voltage(), 1.0);
/// assert_eq!(record.temperature_c, 0);
/// ```
pub fn decode_telemetry(buffer: &[u8]) -> Result<TelemetryRecord> {
    require_len(buffer, TELEMETRY_MIN_LEN)?;

    Ok(TelemetryRecord {
        state_of_charge_pct: scale_percent(buffer[0]),
        state_of_health_pct: scale_percent(buffer[1]),
        voltage_cv: u16::from_be_bytes([buffer[2], buffer[3]]),
        temperature_c: i16::from(buffer[4]) - TEMPERATURE_OFFSET_C,
    })
}

/// Module a buffer is attributed to: `(byte0 % 16) + 1`
///
/// # Errors
///
/// Returns `MalformedPayload` for an empty buffer
pub fn module_for_payload(buffer: &[u8]) -> Result<ModuleId> {
    require_len(buffer, 1)?;
    Ok(ModuleId::from_index(buffer[0] as usize % MODULE_COUNT))
}

/// Decode a fault event stamped with the current local time
///
/// # Errors
///
/// Returns `MalformedPayload` if the buffer is shorter than 2 bytes
pub fn decode_fault(buffer: &[u8]) -> Result<FaultEvent> {
    decode_fault_at(buffer, Local::now())
}

/// Decode a fault event with an explicit capture time
///
/// # Arguments
///
/// * `buffer` - Raw notification (at least 2 bytes)
/// * `timestamp` - Capture time to attach to the event
///
/// # Returns
///
/// * `Result<FaultEvent>` - Fault resolved through the code table; unknown ids
///   produce `FaultKind::Unknown`
pub fn decode_fault_at(buffer: &[u8], timestamp: DateTime<Local>) -> Result<FaultEvent> {
    require_len(buffer, FAULT_MIN_LEN)?;

    Ok(FaultEvent {
        module_id: module_for_payload(buffer)?,
        kind: FaultKind::from_id(buffer[0]),
        code: buffer[1],
        timestamp,
    })
}
