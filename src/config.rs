//! # Configuration Module
//!
//! Handles loading and validating configuration from TOML files.

use serde::Deserialize;
use serde::de::Error;
use std::fs;
use std::path::Path;
use std::time::Duration;
use uuid::Uuid;

use crate::error::{MonitorError, Result};

/// Main configuration structure
#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub ble: BleConfig,
    #[serde(default)]
    pub recorder: RecorderConfig,
    #[serde(default)]
    pub faults: FaultConfig,
    #[serde(default)]
    pub dashboard: DashboardConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// BLE session configuration
#[derive(Debug, Deserialize, Clone)]
pub struct BleConfig {
    /// Peripheral address; empty means "pick one from a discovery scan"
    #[serde(default = "default_address")]
    pub address: String,

    #[serde(default = "default_characteristic_uuid")]
    pub characteristic_uuid: String,

    #[serde(default = "default_scan_timeout_ms")]
    pub scan_timeout_ms: u64,

    /// Use the simulated transport instead of the Bluetooth adapter
    #[serde(default)]
    pub simulate: bool,

    #[serde(default = "default_simulation_period_ms")]
    pub simulation_period_ms: u64,
}

/// Payload recorder configuration
#[derive(Debug, Deserialize, Clone)]
pub struct RecorderConfig {
    #[serde(default = "default_auto_start")]
    pub auto_start: bool,

    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,

    #[serde(default = "default_export_dir")]
    pub export_dir: String,
}

/// Fault history configuration
#[derive(Debug, Deserialize, Clone)]
pub struct FaultConfig {
    #[serde(default = "default_max_events_per_module")]
    pub max_events_per_module: usize,
}

/// Dashboard status reporting configuration
#[derive(Debug, Deserialize, Clone)]
pub struct DashboardConfig {
    #[serde(default = "default_status_interval_ms")]
    pub status_interval_ms: u64,
}

/// Log output configuration
#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    #[serde(default)]
    pub file_logging: bool,

    #[serde(default = "default_log_dir")]
    pub log_dir: String,
}

// Default value functions
fn default_address() -> String { "A8:42:E3:AB:6D:AA".to_string() }
fn default_characteristic_uuid() -> String { "abcd1234-5678-90ab-cdef-1234567890ab".to_string() }
fn default_scan_timeout_ms() -> u64 { 5000 }
fn default_simulation_period_ms() -> u64 { 1000 }

fn default_auto_start() -> bool { true }
fn default_interval_ms() -> u64 { 1000 }
fn default_export_dir() -> String { "./logs".to_string() }

fn default_max_events_per_module() -> usize { 1000 }

fn default_status_interval_ms() -> u64 { 5000 }

fn default_log_dir() -> String { "./logs".to_string() }

impl Default for BleConfig {
    fn default() -> Self {
        Self {
            address: default_address(),
            characteristic_uuid: default_characteristic_uuid(),
            scan_timeout_ms: default_scan_timeout_ms(),
            simulate: false,
            simulation_period_ms: default_simulation_period_ms(),
        }
    }
}

impl Default for RecorderConfig {
    fn default() -> Self {
        Self {
            auto_start: default_auto_start(),
            interval_ms: default_interval_ms(),
            export_dir: default_export_dir(),
        }
    }
}

impl Default for FaultConfig {
    fn default() -> Self {
        Self {
            max_events_per_module: default_max_events_per_module(),
        }
    }
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            status_interval_ms: default_status_interval_ms(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            file_logging: false,
            log_dir: default_log_dir(),
        }
    }
}

impl BleConfig {
    /// Notification characteristic as a UUID
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the string is not a valid UUID
    pub fn characteristic(&self) -> Result<Uuid> {
        Uuid::parse_str(&self.characteristic_uuid).map_err(|e| {
            MonitorError::Config(toml::de::Error::custom(format!(
                "characteristic_uuid '{}' is not a valid UUID: {}",
                self.characteristic_uuid, e
            )))
        })
    }

    pub fn scan_timeout(&self) -> Duration {
        Duration::from_millis(self.scan_timeout_ms)
    }

    pub fn simulation_period(&self) -> Duration {
        Duration::from_millis(self.simulation_period_ms)
    }
}

impl RecorderConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

impl DashboardConfig {
    pub fn status_interval(&self) -> Duration {
        Duration::from_millis(self.status_interval_ms)
    }
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the configuration file
    ///
    /// # Returns
    ///
    /// * `Result<Config>` - Loaded and validated configuration
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - File cannot be read
    /// - TOML parsing fails
    /// - Validation fails
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use can2go_monitor::config::Config;
    ///
    /// let config = Config::load("config/default.toml")?;
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        Self::from_toml(&contents)
    }

    /// Parse and validate configuration from a TOML string
    pub fn from_toml(contents: &str) -> Result<Self> {
        let config: Config = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values
    ///
    /// # Errors
    ///
    /// Returns error if any configuration value is out of valid range
    pub fn validate(&self) -> Result<()> {
        // Validate BLE configuration
        self.ble.characteristic()?;

        if self.ble.scan_timeout_ms == 0 || self.ble.scan_timeout_ms > 60000 {
            return Err(MonitorError::Config(
                toml::de::Error::custom("scan_timeout_ms must be between 1 and 60000")
            ));
        }

        if self.ble.simulation_period_ms == 0 || self.ble.simulation_period_ms > 60000 {
            return Err(MonitorError::Config(
                toml::de::Error::custom("simulation_period_ms must be between 1 and 60000")
            ));
        }

        // Validate recorder configuration
        if self.recorder.interval_ms == 0 || self.recorder.interval_ms > 3_600_000 {
            return Err(MonitorError::Config(
                toml::de::Error::custom("interval_ms must be between 1 and 3600000")
            ));
        }

        if self.recorder.export_dir.is_empty() {
            return Err(MonitorError::Config(
                toml::de::Error::custom("recorder export_dir cannot be empty")
            ));
        }

        if self.faults.max_events_per_module == 0 {
            return Err(MonitorError::Config(
                toml::de::Error::custom("max_events_per_module must be greater than 0")
            ));
        }

        if self.dashboard.status_interval_ms == 0 || self.dashboard.status_interval_ms > 60000 {
            return Err(MonitorError::Config(
                toml::de::Error::custom("status_interval_ms must be between 1 and 60000")
            ));
        }

        if self.logging.file_logging && self.logging.log_dir.is_empty() {
            return Err(MonitorError::Config(
                toml::de::Error::custom("logging log_dir cannot be empty when file logging is enabled")
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_config_from_file() {
        use std::io::Write;
        use tempfile::NamedTempFile;

        let toml_content = r#"
[ble]
address = "11:22:33:44:55:66"

[recorder]
interval_ms = 2000

[faults]

[dashboard]
"#;

        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(toml_content.as_bytes()).unwrap();
        temp_file.flush().unwrap();

        let config = Config::load(temp_file.path()).unwrap();
        assert_eq!(config.ble.address, "11:22:33:44:55:66");
        assert_eq!(config.recorder.interval(), Duration::from_secs(2));
        assert_eq!(config.faults.max_events_per_module, 1000);
        assert!(!config.logging.file_logging);
    }

    #[test]
    fn test_empty_document_uses_defaults() {
        let config = Config::from_toml("").unwrap();
        assert_eq!(config.ble.address, "A8:42:E3:AB:6D:AA");
        assert!(!config.ble.simulate);
        assert!(config.recorder.auto_start);
    }

    #[test]
    fn test_load_missing_file() {
        let result = Config::load("/nonexistent/can2go.toml");
        assert!(matches!(result, Err(MonitorError::Io(_))));
    }

    #[test]
    fn test_malformed_toml() {
        let result = Config::from_toml("[ble\naddress = ");
        assert!(matches!(result, Err(MonitorError::Config(_))));
    }

    #[test]
    fn test_characteristic_uuid_parses() {
        let config = Config::default();
        let uuid = config.ble.characteristic().unwrap();
        assert_eq!(uuid.to_string(), "abcd1234-5678-90ab-cdef-1234567890ab");
    }

    #[test]
    fn test_invalid_characteristic_uuid() {
        let mut config = Config::default();
        config.ble.characteristic_uuid = "not-a-uuid".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_empty_address_is_allowed() {
        let mut config = Config::default();
        config.ble.address = String::new();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_scan_timeout_zero() {
        let mut config = Config::default();
        config.ble.scan_timeout_ms = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_scan_timeout_too_high() {
        let mut config = Config::default();
        config.ble.scan_timeout_ms = 60001;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_simulation_period_zero() {
        let mut config = Config::default();
        config.ble.simulation_period_ms = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_recorder_interval_zero() {
        let mut config = Config::default();
        config.recorder.interval_ms = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_recorder_interval_too_high() {
        let mut config = Config::default();
        config.recorder.interval_ms = 3_600_001;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_empty_export_dir() {
        let mut config = Config::default();
        config.recorder.export_dir = String::new();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_max_events_per_module_zero() {
        let mut config = Config::default();
        config.faults.max_events_per_module = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_status_interval_zero() {
        let mut config = Config::default();
        config.dashboard.status_interval_ms = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_empty_log_dir_when_enabled() {
        let mut config = Config::default();
        config.logging.file_logging = true;
        config.logging.log_dir = String::new();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_empty_log_dir_when_disabled() {
        let mut config = Config::default();
        config.logging.file_logging = false;
        config.logging.log_dir = String::new();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_default_functions() {
        assert_eq!(default_address(), "A8:42:E3:AB:6D:AA");
        assert_eq!(default_characteristic_uuid(), "abcd1234-5678-90ab-cdef-1234567890ab");
        assert_eq!(default_scan_timeout_ms(), 5000);
        assert_eq!(default_simulation_period_ms(), 1000);
        assert_eq!(default_auto_start(), true);
        assert_eq!(default_interval_ms(), 1000);
        assert_eq!(default_export_dir(), "./logs");
        assert_eq!(default_max_events_per_module(), 1000);
        assert_eq!(default_status_interval_ms(), 5000);
        assert_eq!(default_log_dir(), "./logs");
    }
}
