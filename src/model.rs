/// Core data types for the radar rainfall monitoring service.
///
/// This module defines the shared domain model imported by all other modules:
/// frames, legends, monitored locations, readings, monitoring runs, and the
/// error taxonomy. It contains no I/O.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

// ---------------------------------------------------------------------------
// Geography
// ---------------------------------------------------------------------------

/// A WGS84 coordinate pair in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LatLng {
    pub lat: f64,
    pub lng: f64,
}

impl LatLng {
    pub fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }

    pub fn is_finite(&self) -> bool {
        self.lat.is_finite() && self.lng.is_finite()
    }
}

/// Geographic footprint of a radar image.
///
/// Fields are public so degenerate boxes can be represented (the georeference
/// mapper degrades gracefully on them), but frames parsed from the radar
/// source are always checked with [`GeoBounds::validate`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoBounds {
    pub southwest: LatLng,
    pub northeast: LatLng,
}

impl GeoBounds {
    pub fn new(southwest: LatLng, northeast: LatLng) -> Self {
        Self { southwest, northeast }
    }

    pub fn lat_span(&self) -> f64 {
        self.northeast.lat - self.southwest.lat
    }

    pub fn lng_span(&self) -> f64 {
        self.northeast.lng - self.southwest.lng
    }

    pub fn center(&self) -> LatLng {
        LatLng::new(
            (self.southwest.lat + self.northeast.lat) / 2.0,
            (self.southwest.lng + self.northeast.lng) / 2.0,
        )
    }

    pub fn contains(&self, point: LatLng) -> bool {
        point.lat >= self.southwest.lat
            && point.lat <= self.northeast.lat
            && point.lng >= self.southwest.lng
            && point.lng <= self.northeast.lng
    }

    /// Requires finite corners with `sw < ne` on both axes.
    pub fn validate(&self) -> Result<(), String> {
        if !self.southwest.is_finite() || !self.northeast.is_finite() {
            return Err("bounds contain non-finite coordinates".to_string());
        }
        if self.southwest.lat >= self.northeast.lat {
            return Err(format!(
                "southwest latitude {} is not below northeast latitude {}",
                self.southwest.lat, self.northeast.lat
            ));
        }
        if self.southwest.lng >= self.northeast.lng {
            return Err(format!(
                "southwest longitude {} is not below northeast longitude {}",
                self.southwest.lng, self.northeast.lng
            ));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Legend
// ---------------------------------------------------------------------------

/// One reflectivity level and the color the radar product paints it with.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LegendEntry {
    pub threshold_dbz: f64,
    pub color: [u8; 3],
}

/// Ordered (ascending dBZ) color legend of a radar product.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Legend {
    entries: Vec<LegendEntry>,
}

impl Legend {
    /// Builds a legend from parallel level / hex-color lists as published by
    /// the radar source. Levels must be finite and ascending.
    pub fn from_levels_and_colors(levels: &[f64], colors: &[String]) -> Result<Self, String> {
        if levels.is_empty() {
            return Err("legend has no levels".to_string());
        }
        if levels.len() != colors.len() {
            return Err(format!(
                "legend has {} levels but {} colors",
                levels.len(),
                colors.len()
            ));
        }

        let mut entries = Vec::with_capacity(levels.len());
        for (level, color) in levels.iter().zip(colors) {
            if !level.is_finite() {
                return Err(format!("legend level {} is not finite", level));
            }
            entries.push(LegendEntry {
                threshold_dbz: *level,
                color: parse_hex_color(color)?,
            });
        }
        Self::from_entries(entries)
    }

    pub fn from_entries(entries: Vec<LegendEntry>) -> Result<Self, String> {
        if entries.is_empty() {
            return Err("legend has no levels".to_string());
        }
        if entries
            .windows(2)
            .any(|pair| pair[1].threshold_dbz < pair[0].threshold_dbz)
        {
            return Err("legend levels are not in ascending order".to_string());
        }
        Ok(Self { entries })
    }

    pub fn entries(&self) -> &[LegendEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Parses `#RRGGBB`, `RRGGBB` or `#RGB` into an RGB triple.
pub fn parse_hex_color(raw: &str) -> Result<[u8; 3], String> {
    let hex = raw.trim().trim_start_matches('#');
    if !hex.is_ascii() {
        return Err(format!("invalid legend color '{}'", raw));
    }
    let expanded: String = match hex.len() {
        3 => hex.chars().flat_map(|c| [c, c]).collect(),
        6 => hex.to_string(),
        // #RRGGBBAA: alpha is ignored, legends are opaque swatches
        8 => hex[..6].to_string(),
        _ => return Err(format!("invalid legend color '{}'", raw)),
    };

    let channel = |i: usize| {
        u8::from_str_radix(&expanded[i..i + 2], 16)
            .map_err(|_| format!("invalid legend color '{}'", raw))
    };
    Ok([channel(0)?, channel(2)?, channel(4)?])
}

// ---------------------------------------------------------------------------
// Radar frame
// ---------------------------------------------------------------------------

/// An older frame listed by the radar source alongside the latest one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecentFrame {
    pub image_url: String,
    pub time_local: String,
}

/// A single radar snapshot, fully validated at the ingest boundary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RadarFrame {
    pub station_id: String,
    pub image_url: String,
    pub bounds: GeoBounds,
    pub legend: Legend,
    pub captured_at: DateTime<Utc>,
    /// Capture time as published by the source, in station-local time.
    pub captured_at_local: String,
    pub recent: Vec<RecentFrame>,
}

// ---------------------------------------------------------------------------
// Locations and readings
// ---------------------------------------------------------------------------

/// A fixed point (pump station) whose rainfall is monitored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonitoredLocation {
    pub name: String,
    pub lat: f64,
    pub lng: f64,
}

impl MonitoredLocation {
    pub fn new(name: impl Into<String>, lat: f64, lng: f64) -> Self {
        Self {
            name: name.into(),
            lat,
            lng,
        }
    }

    pub fn position(&self) -> LatLng {
        LatLng::new(self.lat, self.lng)
    }
}

/// Categorical rainfall intensity, in ascending order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Intensity {
    NoRain,
    Light,
    Moderate,
    Heavy,
    VeryHeavy,
}

impl Intensity {
    pub fn label(&self) -> &'static str {
        match self {
            Intensity::NoRain => "No Rain",
            Intensity::Light => "Light",
            Intensity::Moderate => "Moderate",
            Intensity::Heavy => "Heavy",
            Intensity::VeryHeavy => "Very Heavy",
        }
    }
}

impl std::fmt::Display for Intensity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Confidence note attached to readings that could not be sampled.
pub const FALLBACK_CONFIDENCE: &str = "fallback";

/// Rainfall estimate for one location in one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    pub location: MonitoredLocation,
    pub dbz: f64,
    pub rain_rate_mm_per_hour: f64,
    pub intensity: Intensity,
    pub confidence_note: String,
    pub pixel_x: u32,
    pub pixel_y: u32,
}

impl Reading {
    /// A "no data" reading used when a location could not be sampled.
    pub fn fallback(location: MonitoredLocation) -> Self {
        Self {
            location,
            dbz: 0.0,
            rain_rate_mm_per_hour: 0.0,
            intensity: Intensity::NoRain,
            confidence_note: FALLBACK_CONFIDENCE.to_string(),
            pixel_x: 0,
            pixel_y: 0,
        }
    }

    pub fn is_fallback(&self) -> bool {
        self.confidence_note == FALLBACK_CONFIDENCE
    }

    pub fn has_rain(&self) -> bool {
        self.rain_rate_mm_per_hour > 0.0
    }
}

/// One complete pass over every monitored location for a single frame.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MonitoringRun {
    pub frame: RadarFrame,
    pub readings: Vec<Reading>,
    pub threshold_mm_per_hour: f64,
    pub run_started_at: DateTime<Utc>,
    pub run_duration_ms: u64,
    /// Free-text observations gathered during the run (stale frame,
    /// degraded locations, ...). Persisted with the record.
    pub notes: Vec<String>,
}

impl MonitoringRun {
    /// Readings at or above the alert threshold.
    pub fn alerted_locations(&self) -> Vec<&Reading> {
        self.readings
            .iter()
            .filter(|r| r.rain_rate_mm_per_hour >= self.threshold_mm_per_hour)
            .collect()
    }

    pub fn readings_with_rain(&self) -> Vec<&Reading> {
        self.readings.iter().filter(|r| r.has_rain()).collect()
    }

    pub fn max_rain_rate(&self) -> f64 {
        self.readings
            .iter()
            .map(|r| r.rain_rate_mm_per_hour)
            .fold(0.0, f64::max)
    }

    pub fn summary(&self) -> RunSummary {
        let alerted = self.alerted_locations().len();
        let below_threshold = self
            .readings
            .iter()
            .filter(|r| r.has_rain() && r.rain_rate_mm_per_hour < self.threshold_mm_per_hour)
            .count();
        RunSummary {
            total: self.readings.len(),
            alerted,
            below_threshold,
            no_rain: self.readings.iter().filter(|r| !r.has_rain()).count(),
            fallbacks: self.readings.iter().filter(|r| r.is_fallback()).count(),
            max_rain_rate_mm_per_hour: self.max_rain_rate(),
        }
    }
}

/// Per-run tallies reported to the scheduler and the logs.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct RunSummary {
    pub total: usize,
    pub alerted: usize,
    /// Rain detected but below the alert threshold.
    pub below_threshold: usize,
    pub no_rain: usize,
    /// Locations degraded to a "no data" reading.
    pub fallbacks: usize,
    pub max_rain_rate_mm_per_hour: f64,
}

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Failures while fetching or parsing the radar frame description.
/// Fatal to the run: no frame, no run.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FrameFetchError {
    #[error("HTTP error: {0}")]
    HttpError(u16),
    #[error("Request failed: {0}")]
    Transport(String),
    #[error("Request timed out: {0}")]
    Timeout(String),
    #[error("Parse error: {0}")]
    ParseError(String),
    #[error("Invalid bounds: {0}")]
    InvalidBounds(String),
    #[error("Invalid legend: {0}")]
    InvalidLegend(String),
}

/// Failures obtaining a decodable raster for a frame.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ImageError {
    #[error("Image fetch failed: {0}")]
    Fetch(String),
    #[error("Image decode failed: {0}")]
    Decode(String),
    #[error("Image payload is empty")]
    Empty,
}

/// Why a single location degraded to a fallback reading.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SamplingDiagnostic {
    #[error("raster unavailable: {0}")]
    ImageUnavailable(String),
    #[error("location '{0}' has non-finite coordinates")]
    NonFiniteCoordinates(String),
    #[error("raster has zero size")]
    EmptyRaster,
}

/// Reasons a run is refused by the persistence gateway.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("record has no image payload")]
    EmptyImage,
    #[error("record bounds are malformed: {0}")]
    InvalidBounds(String),
    #[error("reading for '{location}' is invalid: {reason}")]
    InvalidReading { location: String, reason: String },
    #[error("record is {size} bytes, ceiling is {limit} bytes")]
    TooLarge { size: usize, limit: usize },
    #[error("record could not be serialized: {0}")]
    Serialize(String),
}

/// Datastore failures. The run's computation survives; only the write failed.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PersistenceError {
    #[error("datastore is not configured (DATABASE_URL unset)")]
    NotConfigured,
    #[error("datastore unreachable: {0}")]
    Connect(String),
    #[error("datastore write failed: {0}")]
    Write(String),
}

/// Failures that abort a monitoring run as a whole.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RunError {
    #[error(transparent)]
    FrameFetch(#[from] FrameFetchError),
    #[error(transparent)]
    Persistence(#[from] PersistenceError),
}

impl RunError {
    /// Named error category surfaced in scheduler status.
    pub fn category(&self) -> &'static str {
        match self {
            RunError::FrameFetch(_) => "FrameFetchError",
            RunError::Persistence(_) => "PersistenceError",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn jakarta_bounds() -> GeoBounds {
        GeoBounds::new(LatLng::new(-6.35, 106.65), LatLng::new(-6.08, 106.98))
    }

    #[test]
    fn test_bounds_validation_accepts_well_formed_box() {
        assert!(jakarta_bounds().validate().is_ok());
    }

    #[test]
    fn test_bounds_validation_rejects_inverted_latitude() {
        let bounds = GeoBounds::new(LatLng::new(-6.08, 106.65), LatLng::new(-6.35, 106.98));
        assert!(bounds.validate().is_err());
    }

    #[test]
    fn test_bounds_validation_rejects_zero_width() {
        let bounds = GeoBounds::new(LatLng::new(-6.35, 106.65), LatLng::new(-6.08, 106.65));
        assert!(bounds.validate().is_err());
    }

    #[test]
    fn test_parse_hex_color_variants() {
        assert_eq!(parse_hex_color("#00FF00"), Ok([0, 255, 0]));
        assert_eq!(parse_hex_color("0a0B0c"), Ok([10, 11, 12]));
        assert_eq!(parse_hex_color("#f0a"), Ok([255, 0, 170]));
        assert_eq!(parse_hex_color("#00FF00FF"), Ok([0, 255, 0]));
        assert!(parse_hex_color("#12345").is_err());
        assert!(parse_hex_color("#GG0000").is_err());
    }

    #[test]
    fn test_legend_rejects_mismatched_lengths() {
        let err = Legend::from_levels_and_colors(&[5.0, 10.0], &["#000000".to_string()]);
        assert!(err.is_err());
    }

    #[test]
    fn test_legend_rejects_descending_levels() {
        let colors = vec!["#00FF00".to_string(), "#0000FF".to_string()];
        assert!(Legend::from_levels_and_colors(&[20.0, 10.0], &colors).is_err());
    }

    #[test]
    fn test_alerted_locations_uses_inclusive_threshold() {
        let frame = RadarFrame {
            station_id: "JAK".to_string(),
            image_url: "https://example.invalid/latest.png".to_string(),
            bounds: jakarta_bounds(),
            legend: Legend::from_levels_and_colors(&[5.0], &["#00FF00".to_string()]).unwrap(),
            captured_at: Utc::now(),
            captured_at_local: String::new(),
            recent: Vec::new(),
        };
        let reading = |name: &str, rate: f64| Reading {
            location: MonitoredLocation::new(name, -6.2, 106.8),
            dbz: 30.0,
            rain_rate_mm_per_hour: rate,
            intensity: Intensity::Moderate,
            confidence_note: "test".to_string(),
            pixel_x: 0,
            pixel_y: 0,
        };
        let run = MonitoringRun {
            frame,
            readings: vec![reading("exact", 2.0), reading("below", 1.99), reading("none", 0.0)],
            threshold_mm_per_hour: 2.0,
            run_started_at: Utc::now(),
            run_duration_ms: 0,
            notes: Vec::new(),
        };

        let alerted: Vec<_> = run
            .alerted_locations()
            .iter()
            .map(|r| r.location.name.clone())
            .collect();
        assert_eq!(alerted, vec!["exact".to_string()]);

        let summary = run.summary();
        assert_eq!(summary.alerted, 1);
        assert_eq!(summary.below_threshold, 1);
        assert_eq!(summary.no_rain, 1);
        assert_eq!(summary.total, 3);
    }

    #[test]
    fn test_heavy_rain_under_a_high_threshold_counts_as_below_threshold() {
        let frame = RadarFrame {
            station_id: "JAK".to_string(),
            image_url: "https://radar.example.invalid/latest.png".to_string(),
            bounds: GeoBounds::new(LatLng::new(-6.35, 106.65), LatLng::new(-6.08, 106.98)),
            legend: Legend::from_levels_and_colors(&[20.0], &["#00FF00".to_string()])
                .expect("valid legend"),
            captured_at: Utc::now(),
            captured_at_local: String::new(),
            recent: Vec::new(),
        };
        let heavy = Reading {
            location: MonitoredLocation::new("Pluit", -6.2, 106.8),
            dbz: 40.0,
            rain_rate_mm_per_hour: 12.0,
            intensity: Intensity::Heavy,
            confidence_note: "test".to_string(),
            pixel_x: 0,
            pixel_y: 0,
        };
        let run = MonitoringRun {
            frame,
            readings: vec![heavy],
            threshold_mm_per_hour: 20.0,
            run_started_at: Utc::now(),
            run_duration_ms: 0,
            notes: Vec::new(),
        };

        let summary = run.summary();
        assert_eq!(summary.alerted, 0);
        assert_eq!(summary.below_threshold, 1);
        assert_eq!(summary.no_rain, 0);
    }

    #[test]
    fn test_run_error_categories() {
        let fetch: RunError = FrameFetchError::HttpError(503).into();
        let store: RunError = PersistenceError::Write("disk full".to_string()).into();
        assert_eq!(fetch.category(), "FrameFetchError");
        assert_eq!(store.category(), "PersistenceError");
        assert_eq!(fetch.to_string(), "HTTP error: 503");
    }
}
