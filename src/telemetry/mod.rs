//! # Telemetry Module
//!
//! Per-module battery state kept from decoded notifications.
//!
//! This module handles:
//! - Latest telemetry of each BCU and the pack "Total" average
//! - Per-module fault history
//! - Sampling raw payloads into a timestamped log
//! - Exporting the log as a `.blf` text file

pub mod aggregator;
pub mod fault_log;
pub mod recorder;
