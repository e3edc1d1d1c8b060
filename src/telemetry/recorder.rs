//! # Payload Recorder
//!
//! Samples the most recently received raw payload at a fixed interval and
//! exports the samples as a plain text `.blf` log.
//!
//! ## Sampling
//!
//! The notification path only replaces the payload held in a
//! [`tokio::sync::watch`] cell; the recorder reads whatever is latest when its
//! timer fires. Notifications arriving between two ticks are not recorded and
//! a payload that did not change is recorded again. Ticks before the first
//! payload are skipped.
//!
//! ## Export Format
//!
//! One line per sample:
//!
//! ```text
//! 19/10/2026 14:03:07 || 91 1F 12 C0 41 00 00 00
//! ```
//!
//! This is a text log, not the binary BLF standard.

use std::fmt;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Local};
use tokio::sync::watch;
use tokio::time::{self, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace};

use crate::error::{MonitorError, Result};
use crate::protocol::types::{RawPayload, TIMESTAMP_FORMAT};

/// File extension of exported logs
pub const LOG_FILE_EXTENSION: &str = "blf";

/// Sampling intervals offered to the operator
pub const INTERVAL_PRESETS: [Duration; 6] = [
    Duration::from_millis(50),
    Duration::from_secs(2),
    Duration::from_secs(5),
    Duration::from_secs(10),
    Duration::from_secs(20),
    Duration::from_secs(50),
];

/// Longest accepted sampling interval
pub const MAX_INTERVAL: Duration = Duration::from_secs(3600);

/// Source of sample timestamps
pub type SampleClock = Arc<dyn Fn() -> DateTime<Local> + Send + Sync>;

/// Writer half of the latest-payload cell
pub type LatestPayloadSender = watch::Sender<Option<RawPayload>>;

/// Reader half of the latest-payload cell
pub type LatestPayloadReceiver = watch::Receiver<Option<RawPayload>>;

/// Create the single-slot cell holding the most recent payload
pub fn latest_payload_cell() -> (LatestPayloadSender, LatestPayloadReceiver) {
    watch::channel(None)
}

/// Uppercase hex bytes separated by single spaces
pub fn format_hex(payload: &[u8]) -> String {
    payload
        .iter()
        .map(|byte| format!("{:02X}", byte))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Parse an operator-entered interval in seconds (e.g. `"0.05"`, `"2"`)
///
/// # Errors
///
/// Returns `InvalidInterval` for non-numeric, non-finite, zero or negative
/// input, or for anything longer than [`MAX_INTERVAL`]
pub fn parse_interval(text: &str) -> Result<Duration> {
    let trimmed = text.trim();
    let seconds: f64 = trimmed
        .parse()
        .map_err(|_| MonitorError::InvalidInterval(format!("'{}' is not a number", trimmed)))?;

    if !seconds.is_finite() || seconds <= 0.0 {
        return Err(MonitorError::InvalidInterval(format!(
            "{} must be greater than 0 seconds",
            trimmed
        )));
    }

    let interval = Duration::try_from_secs_f64(seconds)
        .map_err(|e| MonitorError::InvalidInterval(format!("{}: {}", trimmed, e)))?;
    check_interval(interval)?;
    Ok(interval)
}

fn check_interval(interval: Duration) -> Result<()> {
    if interval.is_zero() {
        return Err(MonitorError::InvalidInterval(
            "interval must be greater than 0".to_string(),
        ));
    }
    if interval > MAX_INTERVAL {
        return Err(MonitorError::InvalidInterval(format!(
            "{:?} exceeds the maximum of {:?}",
            interval, MAX_INTERVAL
        )));
    }
    Ok(())
}

/// One sampled payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEntry {
    pub timestamp: DateTime<Local>,
    pub hex: String,
}

impl LogEntry {
    pub fn new(timestamp: DateTime<Local>, payload: &[u8]) -> Self {
        Self {
            timestamp,
            hex: format_hex(payload),
        }
    }
}

impl fmt::Display for LogEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} || {}", self.timestamp.format(TIMESTAMP_FORMAT), self.hex)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecorderState {
    Idle,
    Recording,
}

fn lock_entries(entries: &Mutex<Vec<LogEntry>>) -> MutexGuard<'_, Vec<LogEntry>> {
    entries.lock().unwrap_or_else(PoisonError::into_inner)
}

fn sample(
    latest: &LatestPayloadReceiver,
    entries: &Mutex<Vec<LogEntry>>,
    at: DateTime<Local>,
) -> Option<LogEntry> {
    let entry = latest
        .borrow()
        .as_deref()
        .map(|payload| LogEntry::new(at, payload))?;
    lock_entries(entries).push(entry.clone());
    Some(entry)
}

async fn sample_loop(
    latest: LatestPayloadReceiver,
    entries: Arc<Mutex<Vec<LogEntry>>>,
    interval: Duration,
    clock: SampleClock,
    cancel: CancellationToken,
) {
    let mut ticker = time::interval_at(Instant::now() + interval, interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {
                match sample(&latest, &entries, clock()) {
                    Some(entry) => trace!("Recorded {}", entry),
                    None => trace!("No payload received yet, skipping sample"),
                }
            }
        }
    }

    debug!("Sampling task finished");
}

/// Periodic raw payload recorder
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use can2go_monitor::telemetry::recorder::{latest_payload_cell, Recorder};
///
/// # #[tokio::main]
/// # async fn main() -> can2go_monitor::error::Result<()> {
/// let (latest_tx, latest_rx) = latest_payload_cell();
/// let mut recorder = Recorder::new(latest_rx);
///
/// recorder.start(Duration::from_secs(1))?;
/// latest_tx.send_replace(Some(vec![0x91, 0x1F, 0x12, 0xC0, 0x41, 0, 0, 0]));
/// recorder.record_latest();
/// recorder.stop();
///
/// let mut out = Vec::new();
/// recorder.export(&mut out)?;
/// assert!(String::from_utf8(out).unwrap().ends_with("|| 91 1F 12 C0 41 00 00 00\n"));
/// # Ok(())
/// # }
/// ```
pub struct Recorder {
    latest: LatestPayloadReceiver,
    entries: Arc<Mutex<Vec<LogEntry>>>,
    state: RecorderState,
    interval: Option<Duration>,
    clock: SampleClock,
    cancel: CancellationToken,
}

impl fmt::Debug for Recorder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Recorder")
            .field("state", &self.state)
            .field("interval", &self.interval)
            .field("entries", &self.len())
            .finish_non_exhaustive()
    }
}

impl Recorder {
    /// Recorder stamping samples with the local wall clock
    pub fn new(latest: LatestPayloadReceiver) -> Self {
        Self::with_clock(latest, Arc::new(Local::now))
    }

    pub fn with_clock(latest: LatestPayloadReceiver, clock: SampleClock) -> Self {
        Self {
            latest,
            entries: Arc::new(Mutex::new(Vec::new())),
            state: RecorderState::Idle,
            interval: None,
            clock,
            cancel: CancellationToken::new(),
        }
    }

    pub fn state(&self) -> RecorderState {
        self.state
    }

    /// Active sampling interval, if recording
    pub fn interval(&self) -> Option<Duration> {
        self.interval
    }

    /// Start sampling every `interval`
    ///
    /// Clears previously recorded entries. Must be called from within a tokio
    /// runtime.
    ///
    /// # Errors
    ///
    /// Returns `InvalidInterval` for a zero interval or one longer than
    /// [`MAX_INTERVAL`]
    pub fn start(&mut self, interval: Duration) -> Result<()> {
        check_interval(interval)?;

        self.halt();
        lock_entries(&self.entries).clear();

        let cancel = CancellationToken::new();
        tokio::spawn(sample_loop(
            self.latest.clone(),
            Arc::clone(&self.entries),
            interval,
            Arc::clone(&self.clock),
            cancel.clone(),
        ));

        self.cancel = cancel;
        self.state = RecorderState::Recording;
        self.interval = Some(interval);
        info!("Recording started, sampling every {:?}", interval);
        Ok(())
    }

    /// Take one sample of the latest payload now
    ///
    /// Returns `None` if no payload has been received yet.
    pub fn record_latest(&self) -> Option<LogEntry> {
        sample(&self.latest, &self.entries, (self.clock)())
    }

    /// Stop sampling, keeping the recorded entries for export
    ///
    /// Returns the number of recorded entries.
    pub fn stop(&mut self) -> usize {
        if self.state == RecorderState::Recording {
            self.halt();
            info!("Recording stopped with {} entries", self.len());
        }
        self.len()
    }

    /// Discard all entries and return to idle
    pub fn reset(&mut self) {
        self.halt();
        lock_entries(&self.entries).clear();
        info!("Recording log reset");
    }

    pub fn entries(&self) -> Vec<LogEntry> {
        lock_entries(&self.entries).clone()
    }

    pub fn len(&self) -> usize {
        lock_entries(&self.entries).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Write all entries as text, one line each
    ///
    /// # Returns
    ///
    /// * `Result<usize>` - Number of lines written
    ///
    /// # Errors
    ///
    /// Returns `EmptyLog` if nothing was recorded, or `Io` on write failure
    pub fn export<W: Write>(&self, mut writer: W) -> Result<usize> {
        let entries = self.entries();
        if entries.is_empty() {
            return Err(MonitorError::EmptyLog);
        }

        for entry in &entries {
            writeln!(writer, "{}", entry)?;
        }
        writer.flush()?;

        Ok(entries.len())
    }

    /// Export entries to a file
    ///
    /// A path without an extension gets `.blf` appended. Missing parent
    /// directories are created.
    ///
    /// # Returns
    ///
    /// * `Result<PathBuf>` - The path actually written
    ///
    /// # Errors
    ///
    /// Returns `EmptyLog` without touching the filesystem if nothing was recorded
    pub fn export_to_file<P: AsRef<Path>>(&self, path: P) -> Result<PathBuf> {
        if self.is_empty() {
            return Err(MonitorError::EmptyLog);
        }

        let mut path = path.as_ref().to_path_buf();
        if path.extension().is_none() {
            path.set_extension(LOG_FILE_EXTENSION);
        }

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }

        let lines = self.export(BufWriter::new(File::create(&path)?))?;
        info!("Exported {} log entries to {}", lines, path.display());
        Ok(path)
    }

    fn halt(&mut self) {
        self.cancel.cancel();
        self.state = RecorderState::Idle;
        self.interval = None;
    }
}

impl Drop for Recorder {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
