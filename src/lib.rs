//! # CAN2Go Monitor Library
//!
//! Monitor a 16-module battery management system over Bluetooth Low Energy.
//!
//! This library provides the core functionality for receiving raw BMS
//! notifications, decoding them into per-module telemetry and fault events,
//! and recording the raw stream to a text log.

pub mod ble;
pub mod config;
pub mod dashboard;
pub mod error;
pub mod protocol;
pub mod telemetry;
