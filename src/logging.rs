/// Structured logging for the radar rainfall monitoring service
///
/// Provides context-rich logging with data-source and location identifiers,
/// timestamps, and severity levels on top of the `log` facade. Supports both
/// console output and file-based logging for daemon operations.

use chrono::Utc;
use log::{Level, LevelFilter, Log, Metadata, Record};
use std::fmt;
use std::fs::OpenOptions;
use std::io::Write;

// ---------------------------------------------------------------------------
// Data Source Types
// ---------------------------------------------------------------------------

/// Subsystem a log entry originates from. Used as the `log` target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataSource {
    Radar,
    Image,
    Database,
    Scheduler,
    System,
}

impl DataSource {
    pub fn target(&self) -> &'static str {
        match self {
            DataSource::Radar => "RADAR",
            DataSource::Image => "IMG",
            DataSource::Database => "DB",
            DataSource::Scheduler => "SCHED",
            DataSource::System => "SYS",
        }
    }
}

impl fmt::Display for DataSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.target())
    }
}

// ---------------------------------------------------------------------------
// Failure Classification
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureType {
    /// Expected failure - the radar publishes gaps between scans
    Expected,
    /// Endpoint down, misconfigured or serving garbage
    Unexpected,
    /// Not enough in the message to tell
    Unknown,
}

impl fmt::Display for FailureType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureType::Expected => write!(f, "EXPECTED"),
            FailureType::Unexpected => write!(f, "UNEXPECTED"),
            FailureType::Unknown => write!(f, "UNKNOWN"),
        }
    }
}

// ---------------------------------------------------------------------------
// Logger
// ---------------------------------------------------------------------------

/// `log::Log` backend for the service: console plus an optional append-only
/// file. Without console timestamps the console output is the compact
/// operator view and debug lines only reach the file.
pub struct Logger {
    min_level: LevelFilter,
    log_file: Option<String>,
    console_timestamps: bool,
}

impl Logger {
    pub fn new(min_level: LevelFilter, log_file: Option<String>, console_timestamps: bool) -> Self {
        Self {
            min_level,
            log_file,
            console_timestamps,
        }
    }

    fn format_entry(record: &Record) -> String {
        format!(
            "{} {} {}: {}",
            Utc::now().format("%Y-%m-%d %H:%M:%S UTC"),
            level_label(record.level()),
            record.target(),
            record.args()
        )
    }

    fn append_to_file(path: &str, entry: &str) -> std::io::Result<()> {
        let mut file = OpenOptions::new().create(true).append(true).open(path)?;
        writeln!(file, "{}", entry)?;
        Ok(())
    }
}

fn level_label(level: Level) -> &'static str {
    match level {
        Level::Error => "ERROR",
        Level::Warn => "WARN",
        Level::Info => "INFO",
        Level::Debug => "DEBUG",
        Level::Trace => "TRACE",
    }
}

impl Log for Logger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.min_level
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }

        let log_entry = Self::format_entry(record);

        if self.console_timestamps {
            match record.level() {
                Level::Error | Level::Warn => eprintln!("{}", log_entry),
                _ => println!("{}", log_entry),
            }
        } else {
            match record.level() {
                Level::Error => eprintln!("   ✗ {}: {}", record.target(), record.args()),
                Level::Warn => eprintln!("   ⚠ {}: {}", record.target(), record.args()),
                Level::Info => println!("   {}", record.args()),
                Level::Debug | Level::Trace => {} // Skip debug in non-timestamp mode
            }
        }

        if let Some(ref path) = self.log_file {
            if let Err(e) = Self::append_to_file(path, &log_entry) {
                eprintln!("rainmon: cannot append to {}: {}", path, e);
            }
        }
    }

    fn flush(&self) {}
}

// ---------------------------------------------------------------------------
// Public Logging Functions
// ---------------------------------------------------------------------------

/// Parses a level name from configuration, defaulting to `Info`.
pub fn parse_level(name: &str) -> LevelFilter {
    match name.trim().to_ascii_lowercase().as_str() {
        "off" => LevelFilter::Off,
        "error" => LevelFilter::Error,
        "warn" | "warning" => LevelFilter::Warn,
        "debug" => LevelFilter::Debug,
        "trace" => LevelFilter::Trace,
        _ => LevelFilter::Info,
    }
}

/// Install the service logger as the global `log` backend.
///
/// A second call is ignored (the first logger stays installed), which keeps
/// integration tests that initialise logging independently from failing.
pub fn init_logger(min_level: LevelFilter, log_file: Option<&str>, console_timestamps: bool) {
    let logger = Logger::new(min_level, log_file.map(String::from), console_timestamps);
    if log::set_boxed_logger(Box::new(logger)).is_ok() {
        log::set_max_level(min_level);
    }
}

fn with_location(location: Option<&str>, message: &str) -> String {
    match location {
        Some(name) => format!("[{}] {}", name, message),
        None => message.to_string(),
    }
}

/// Log a general informational message
pub fn info(source: DataSource, location: Option<&str>, message: &str) {
    log::info!(target: source.target(), "{}", with_location(location, message));
}

/// Log a warning message
pub fn warn(source: DataSource, location: Option<&str>, message: &str) {
    log::warn!(target: source.target(), "{}", with_location(location, message));
}

/// Log an error message
pub fn error(source: DataSource, location: Option<&str>, message: &str) {
    log::error!(target: source.target(), "{}", with_location(location, message));
}

/// Log a debug message
pub fn debug(source: DataSource, location: Option<&str>, message: &str) {
    log::debug!(target: source.target(), "{}", with_location(location, message));
}

// ---------------------------------------------------------------------------
// Failure Classification Helpers
// ---------------------------------------------------------------------------

/// Classify a radar-source failure based on its rendered error message.
pub fn classify_radar_failure(error_message: &str) -> FailureType {
    if error_message.contains("HTTP error: 404") {
        // Latest image not yet published for this scan
        FailureType::Expected
    } else if error_message.contains("HTTP error")
        || error_message.contains("timed out")
        || error_message.contains("Request failed")
    {
        FailureType::Unexpected
    } else if error_message.contains("Parse error")
        || error_message.contains("Invalid bounds")
        || error_message.contains("Invalid legend")
    {
        // Upstream format drift
        FailureType::Unexpected
    } else {
        FailureType::Unknown
    }
}

/// Log a radar or image failure with automatic classification
pub fn log_radar_failure(
    source: DataSource,
    location: Option<&str>,
    operation: &str,
    err: &dyn std::error::Error,
) {
    let error_msg = err.to_string();
    let failure_type = classify_radar_failure(&error_msg);

    let message = format!("{} failed [{}]: {}", operation, failure_type, error_msg);

    match failure_type {
        FailureType::Expected => debug(source, location, &message),
        FailureType::Unexpected => error(source, location, &message),
        FailureType::Unknown => warn(source, location, &message),
    }
}

// ---------------------------------------------------------------------------
// Run Summary Logging
// ---------------------------------------------------------------------------

/// Log the per-run tally of alerted, wet-but-below-threshold and dry locations
pub fn log_run_summary(station_id: &str, alerted: usize, below_threshold: usize, no_rain: usize, fallbacks: usize) {
    let message = format!(
        "Run complete for {}: {} alert, {} rain below threshold, {} no rain ({} fallback)",
        station_id, alerted, below_threshold, no_rain, fallbacks
    );

    if alerted > 0 || fallbacks > 0 {
        warn(DataSource::System, None, &message);
    } else {
        info(DataSource::System, None, &message);
    }
}
