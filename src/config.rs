//! Service configuration.
//!
//! Settings come from a TOML file; secrets come from the environment
//! (`DATABASE_URL`, optionally via a `.env` file). Example:
//!
//! ```toml
//! [radar]
//! station_id = "JAK"
//! endpoint = "https://radar.example.invalid/api/latest?radar={station}"
//! fetch_timeout_secs = 15
//!
//! [monitor]
//! threshold_mm_per_hour = 2.0
//! search_radius_km = 2.0
//! max_workers = 4
//! cadence = "*/5 * * * *"
//!
//! [[locations]]
//! name = "Pompa Pluit"
//! lat = -6.1167
//! lng = 106.7917
//! ```

use crate::locations;
use crate::model::MonitoredLocation;
use crate::scheduler::Cadence;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config file {path}: {message}")]
    Io { path: String, message: String },
    #[error("cannot parse config: {0}")]
    Parse(String),
    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub radar: RadarConfig,
    #[serde(default)]
    pub monitor: MonitorConfig,
    #[serde(default)]
    pub persistence: PersistenceConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub locations: Vec<MonitoredLocation>,
    /// Filled from the environment, never from the file.
    #[serde(skip)]
    pub database_url: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RadarConfig {
    pub station_id: String,
    /// Frame description URL; `{station}` is replaced with `station_id`.
    pub endpoint: String,
    #[serde(default = "default_fetch_timeout_secs")]
    pub fetch_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MonitorConfig {
    #[serde(default = "default_threshold")]
    pub threshold_mm_per_hour: f64,
    #[serde(default = "default_radius_km")]
    pub search_radius_km: f64,
    #[serde(default = "default_max_workers")]
    pub max_workers: usize,
    #[serde(default = "default_cadence")]
    pub cadence: String,
    #[serde(default = "default_stale_after_minutes")]
    pub stale_after_minutes: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PersistenceConfig {
    #[serde(default = "default_max_record_bytes")]
    pub max_record_bytes: usize,
    #[serde(default = "default_true")]
    pub include_base_image: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub file: Option<String>,
    #[serde(default = "default_true")]
    pub console_timestamps: bool,
}

fn default_fetch_timeout_secs() -> u64 {
    15
}
fn default_threshold() -> f64 {
    2.0
}
fn default_radius_km() -> f64 {
    2.0
}
fn default_max_workers() -> usize {
    4
}
fn default_cadence() -> String {
    "*/5 * * * *".to_string()
}
fn default_stale_after_minutes() -> u64 {
    60
}
/// 16 MiB document limit less 1 MiB of headroom.
fn default_max_record_bytes() -> usize {
    15 * 1024 * 1024
}
fn default_true() -> bool {
    true
}
fn default_log_level() -> String {
    "info".to_string()
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            threshold_mm_per_hour: default_threshold(),
            search_radius_km: default_radius_km(),
            max_workers: default_max_workers(),
            cadence: default_cadence(),
            stale_after_minutes: default_stale_after_minutes(),
        }
    }
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            max_record_bytes: default_max_record_bytes(),
            include_base_image: true,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: None,
            console_timestamps: true,
        }
    }
}

impl Config {
    /// Loads the TOML file at `path`, then `DATABASE_URL` from the
    /// environment (after reading `.env` if present).
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;

        let mut config = Self::from_toml_str(&text)?;

        dotenv::dotenv().ok();
        config.database_url = std::env::var("DATABASE_URL").ok().filter(|v| !v.is_empty());
        Ok(config)
    }

    /// Parses and validates configuration text. An empty location list is
    /// replaced with the built-in pump-station registry.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let mut config: Config = toml::from_str(text).map_err(|e| ConfigError::Parse(e.to_string()))?;
        if config.locations.is_empty() {
            config.locations = locations::default_locations();
        }
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.radar.station_id.trim().is_empty() {
            return Err(ConfigError::Invalid("radar.station_id is empty".to_string()));
        }
        if self.radar.endpoint.trim().is_empty() {
            return Err(ConfigError::Invalid("radar.endpoint is empty".to_string()));
        }
        if self.radar.fetch_timeout_secs == 0 {
            return Err(ConfigError::Invalid("radar.fetch_timeout_secs must be positive".to_string()));
        }
        if !(self.monitor.threshold_mm_per_hour.is_finite() && self.monitor.threshold_mm_per_hour > 0.0) {
            return Err(ConfigError::Invalid(format!(
                "monitor.threshold_mm_per_hour must be positive, got {}",
                self.monitor.threshold_mm_per_hour
            )));
        }
        if !(self.monitor.search_radius_km.is_finite() && self.monitor.search_radius_km > 0.0) {
            return Err(ConfigError::Invalid(format!(
                "monitor.search_radius_km must be positive, got {}",
                self.monitor.search_radius_km
            )));
        }
        if self.monitor.max_workers == 0 {
            return Err(ConfigError::Invalid("monitor.max_workers must be at least 1".to_string()));
        }
        Cadence::parse(&self.monitor.cadence)
            .map_err(|e| ConfigError::Invalid(format!("monitor.cadence: {}", e)))?;
        if self.persistence.max_record_bytes == 0 {
            return Err(ConfigError::Invalid("persistence.max_record_bytes must be positive".to_string()));
        }

        let problems = locations::validate_locations(&self.locations);
        if !problems.is_empty() {
            return Err(ConfigError::Invalid(problems.join("; ")));
        }
        Ok(())
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.radar.fetch_timeout_secs)
    }

    pub fn cadence(&self) -> Result<Cadence, ConfigError> {
        Cadence::parse(&self.monitor.cadence).map_err(ConfigError::Invalid)
    }
}
