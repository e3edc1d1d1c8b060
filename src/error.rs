//! # Error Types
//!
//! Custom error types for the CAN2Go monitor using `thiserror`.

use thiserror::Error;

/// Main error type for the CAN2Go monitor
#[derive(Debug, Error)]
pub enum MonitorError {
    /// Transport-level connect or subscribe error
    #[error("BLE connection failure: {0}")]
    ConnectionFailure(String),

    /// Buffer shorter than the decoder requires
    #[error("Malformed payload: expected at least {expected} bytes, got {actual}")]
    MalformedPayload { expected: usize, actual: usize },

    /// Recording interval is not a positive duration
    #[error("Invalid recording interval: {0}")]
    InvalidInterval(String),

    /// Export requested with nothing recorded
    #[error("Log is empty, nothing to export")]
    EmptyLog,

    /// Scan timeout or transport error during device discovery
    #[error("Device discovery failed: {0}")]
    DiscoveryFailure(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] toml::de::Error),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for the CAN2Go monitor
pub type Result<T> = std::result::Result<T, MonitorError>;
