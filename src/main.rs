//! # CAN2Go Monitor
//!
//! Headless monitor for a 16-module battery management system over BLE.
//!
//! Connects to the BMS peripheral, keeps the per-module dashboard state up to
//! date, periodically samples the raw payload stream and writes it to a
//! `.blf` text log on shutdown.

use std::path::{Path, PathBuf};
use std::sync::PoisonError;

use anyhow::{Context, Result};
use chrono::Local;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{error, info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

use can2go_monitor::ble::discovery::{choose_device, discover_devices};
use can2go_monitor::ble::simulator::SimulatedTransport;
use can2go_monitor::ble::transport::BleTransport;
use can2go_monitor::ble::{BleSession, SessionState};
use can2go_monitor::config::{Config, LoggingConfig};
use can2go_monitor::dashboard::{self, SharedState};
use can2go_monitor::error::MonitorError;
use can2go_monitor::telemetry::recorder::Recorder;

/// Configuration file used when none is given
const DEFAULT_CONFIG_PATH: &str = "config/default.toml";

/// Environment variable naming the configuration file
const CONFIG_ENV_VAR: &str = "CAN2GO_CONFIG";

/// File name prefix of the daily rolling log
const LOG_FILE_PREFIX: &str = "can2go-monitor.log";

/// File name prefix of exported recordings
const EXPORT_FILE_PREFIX: &str = "can2go";

/// Main entry point for the CAN2Go monitor
///
/// # Control Flow
///
/// 1. **Initialization**
///    - Load configuration (first CLI argument, `CAN2GO_CONFIG`, or
///      `config/default.toml`; built-in defaults when the default file is absent)
///    - Set up logging with a tracing subscriber, optionally to a daily file
///    - Pick the simulated or the Bluetooth transport
///
/// 2. **Session**
///    - Scan for devices when no address is configured
///    - Connect and subscribe to the telemetry characteristic
///    - Start the recorder if `recorder.auto_start` is set
///
/// 3. **Main Loop**
///    - Log the dashboard status every `dashboard.status_interval_ms`
///    - Stop when the link drops or on Ctrl+C
///
/// 4. **Graceful Shutdown**
///    - Disconnect, stop recording and export the log to `recorder.export_dir`
///
/// # Errors
///
/// Returns error if:
/// - The configuration file cannot be loaded
/// - No connection could be established
///
/// # Examples
///
/// ```bash
/// cargo run --release -- config/default.toml
/// cargo run --release --features bluetooth
/// ```
#[tokio::main]
async fn main() -> Result<()> {
    let (config, source) = load_config()?;
    let _log_guard = init_logging(&config.logging);

    info!("CAN2Go Monitor v{} starting...", env!("CARGO_PKG_VERSION"));
    match &source {
        Some(path) => info!("Configuration loaded from {}", path.display()),
        None => info!("No configuration file found, using defaults"),
    }

    if config.ble.simulate {
        info!("Using simulated transport");
        run(SimulatedTransport::new(config.ble.simulation_period()), &config).await
    } else {
        run_bluetooth(&config).await
    }
}

#[cfg(feature = "bluetooth")]
async fn run_bluetooth(config: &Config) -> Result<()> {
    use can2go_monitor::ble::bluest_transport::BluestTransport;

    run(BluestTransport::new(config.ble.scan_timeout()), config).await
}

#[cfg(not(feature = "bluetooth"))]
async fn run_bluetooth(_config: &Config) -> Result<()> {
    anyhow::bail!(
        "built without the `bluetooth` feature; set ble.simulate = true or rebuild with --features bluetooth"
    )
}

async fn run<T: BleTransport>(transport: T, config: &Config) -> Result<()> {
    let characteristic = config.ble.characteristic()?;

    let (dispatcher, dashboard, latest) = dashboard::channel(&config.faults);
    let state = dashboard.state();
    let dashboard_task = tokio::spawn(dashboard.run());

    let mut session = BleSession::new(transport);
    let Some(address) = select_address(&mut session, config).await? else {
        warn!("No BLE devices found, nothing to monitor");
        return Ok(());
    };

    session
        .connect_and_listen(&address, characteristic, move |raw| dispatcher.on_new_data(raw))
        .await;
    if !session.is_connected() {
        anyhow::bail!("could not connect to {}", address);
    }

    let mut recorder = Recorder::new(latest);
    if config.recorder.auto_start {
        recorder.start(config.recorder.interval())?;
    }

    let mut status_interval = interval(config.dashboard.status_interval());
    status_interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // First tick completes immediately
    status_interval.tick().await;

    info!("Press Ctrl+C to exit");

    loop {
        tokio::select! {
            _ = status_interval.tick() => {
                if session.check_link().await == SessionState::Disconnected {
                    warn!("Connection to {} lost", address);
                    break;
                }
                log_status(&state, &recorder);
            }

            _ = tokio::signal::ctrl_c() => {
                info!("Received Ctrl+C, shutting down...");
                break;
            }
        }
    }

    session.disconnect().await;
    recorder.stop();
    export_recording(&recorder, &config.recorder.export_dir);

    // Dropping the session releases the last dispatcher
    drop(session);
    match dashboard_task.await {
        Ok(applied) => info!("Total payloads processed: {}", applied),
        Err(e) => warn!("Dashboard task failed: {}", e),
    }

    Ok(())
}

/// Configured address, or the first device found by a scan
async fn select_address<T: BleTransport>(
    session: &mut BleSession<T>,
    config: &Config,
) -> Result<Option<String>> {
    if !config.ble.address.is_empty() {
        return Ok(Some(config.ble.address.clone()));
    }

    let devices = discover_devices(session.transport_mut(), config.ble.scan_timeout()).await?;
    for device in &devices {
        info!("  {}", device.label());
    }

    let mut selected = None;
    choose_device(&devices, None, |address| selected = Some(address.to_string()));
    Ok(selected)
}

fn log_status(state: &SharedState, recorder: &Recorder) {
    let state = state.read().unwrap_or_else(PoisonError::into_inner);
    info!(
        "{}: {} | {} payloads, {} faults, {} log entries",
        state.selected(),
        state.summary(),
        state.received_count(),
        state.fault_log().total_len(),
        recorder.len()
    );
}

fn export_recording(recorder: &Recorder, export_dir: &str) {
    let target = Path::new(export_dir).join(export_file_name(Local::now()));
    match recorder.export_to_file(target) {
        Ok(path) => info!("Recording saved to {}", path.display()),
        Err(MonitorError::EmptyLog) => warn!("Nothing recorded, no log exported"),
        Err(e) => error!("Failed to export recording: {}", e),
    }
}

fn export_file_name(now: chrono::DateTime<Local>) -> String {
    format!("{}_{}", EXPORT_FILE_PREFIX, now.format("%Y%m%d_%H%M%S"))
}

/// Resolve the configuration path, returning whether it was given explicitly
fn resolve_config_path(arg: Option<String>, env: Option<String>) -> (PathBuf, bool) {
    match arg.or(env) {
        Some(path) => (PathBuf::from(path), true),
        None => (PathBuf::from(DEFAULT_CONFIG_PATH), false),
    }
}

fn load_config() -> Result<(Config, Option<PathBuf>)> {
    let (path, explicit) =
        resolve_config_path(std::env::args().nth(1), std::env::var(CONFIG_ENV_VAR).ok());

    if !explicit && !path.exists() {
        return Ok((Config::default(), None));
    }

    let config = Config::load(&path)
        .with_context(|| format!("failed to load configuration from {}", path.display()))?;
    Ok((config, Some(path)))
}

fn init_logging(config: &LoggingConfig) -> Option<WorkerGuard> {
    let filter = EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into());
    let registry = tracing_subscriber::registry().with(filter).with(fmt::layer());

    if config.file_logging {
        let appender = tracing_appender::rolling::daily(&config.log_dir, LOG_FILE_PREFIX);
        let (writer, guard) = tracing_appender::non_blocking(appender);
        registry
            .with(fmt::layer().with_writer(writer).with_ansi(false))
            .init();
        Some(guard)
    } else {
        registry.init();
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_config_path_defaults() {
        let (path, explicit) = resolve_config_path(None, None);
        assert_eq!(path, PathBuf::from(DEFAULT_CONFIG_PATH));
        assert!(!explicit);
    }

    #[test]
    fn test_config_path_argument_wins_over_env() {
        let (path, explicit) = resolve_config_path(
            Some("cli.toml".to_string()),
            Some("env.toml".to_string()),
        );
        assert_eq!(path, PathBuf::from("cli.toml"));
        assert!(explicit);

        let (path, _) = resolve_config_path(None, Some("env.toml".to_string()));
        assert_eq!(path, PathBuf::from("env.toml"));
    }

    #[test]
    fn test_export_file_name() {
        let now = Local.with_ymd_and_hms(2026, 10, 19, 14, 3, 7).unwrap();
        assert_eq!(export_file_name(now), "can2go_20261019_140307");
    }

    #[test]
    fn test_default_config_file_is_valid() {
        let contents = include_str!("../config/default.toml");
        let config = Config::from_toml(contents).unwrap();
        assert_eq!(config.ble.address, "A8:42:E3:AB:6D:AA");
    }
}
