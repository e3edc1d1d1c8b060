//! # BMS Payload Protocol Module
//!
//! Decoding of the fixed-layout BMS notification payloads.
//!
//! This module handles:
//! - Telemetry decoding (SOC, SOH, pack voltage, temperature)
//! - Fault decoding against the fixed fault code table
//! - Module (BCU) attribution of incoming buffers
//!
//! Every notification is interpreted both as telemetry and as a fault
//! candidate; the payload carries no packet-type field.

pub mod types;
pub mod faults;
pub mod decoder;
