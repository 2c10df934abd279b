//! The persisted projection of a monitoring run.
//!
//! Field names are camelCase to match the documents already stored by
//! downstream dashboards.

use crate::model::{GeoBounds, MonitoringRun};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Maximum number of location names spelled out in the record summary.
const SUMMARY_NAME_LIMIT: usize = 3;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Marker {
    pub lat: f64,
    pub lng: f64,
    pub name: String,
    pub time: String,
    pub dbz: f64,
    pub rain_rate: f64,
    pub intensity: String,
    pub confidence: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordMetadata {
    pub total_detected: usize,
    pub locations_with_rain: usize,
    pub max_rain_rate: f64,
    pub alert_count: usize,
    pub has_screenshot: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistedRecord {
    /// Human-readable summary of where rain was detected.
    pub location: String,
    pub radar_station: String,
    /// Base radar image as a data URL.
    pub screenshot: Option<String>,
    /// Annotated radar image as a data URL.
    pub annotated_screenshot: Option<String>,
    pub markers: Vec<Marker>,
    pub bounds: GeoBounds,
    pub notes: String,
    pub metadata: RecordMetadata,
    pub threshold_mm_per_hour: f64,
    pub captured_at: DateTime<Utc>,
    pub run_duration_ms: u64,
    pub is_auto_detected: bool,
    pub is_alert: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PersistedRecord {
    /// Projects `run` into a record. `created_at` is injected so building a
    /// record stays deterministic.
    pub fn from_run(
        run: &MonitoringRun,
        base_image: Option<&[u8]>,
        annotated_image: Option<&[u8]>,
        created_at: DateTime<Utc>,
    ) -> Self {
        let summary = run.summary();
        let time = if run.frame.captured_at_local.is_empty() {
            run.frame.captured_at.to_rfc3339()
        } else {
            run.frame.captured_at_local.clone()
        };

        let markers = run
            .readings
            .iter()
            .map(|r| Marker {
                lat: r.location.lat,
                lng: r.location.lng,
                name: r.location.name.clone(),
                time: time.clone(),
                dbz: r.dbz,
                rain_rate: r.rain_rate_mm_per_hour,
                intensity: r.intensity.label().to_string(),
                confidence: r.confidence_note.clone(),
            })
            .collect();

        let screenshot = base_image.filter(|b| !b.is_empty()).map(data_url);
        let annotated_screenshot = annotated_image.filter(|b| !b.is_empty()).map(data_url);

        Self {
            location: location_summary(run),
            radar_station: run.frame.station_id.clone(),
            metadata: RecordMetadata {
                total_detected: summary.total,
                locations_with_rain: run.readings_with_rain().len(),
                max_rain_rate: summary.max_rain_rate_mm_per_hour,
                alert_count: summary.alerted,
                has_screenshot: screenshot.is_some() || annotated_screenshot.is_some(),
            },
            screenshot,
            annotated_screenshot,
            markers,
            bounds: run.frame.bounds,
            notes: run.notes.join("\n"),
            threshold_mm_per_hour: run.threshold_mm_per_hour,
            captured_at: run.frame.captured_at,
            run_duration_ms: run.run_duration_ms,
            is_auto_detected: true,
            is_alert: summary.alerted > 0,
            created_at,
            updated_at: created_at,
        }
    }

    /// Serialized size in bytes, as stored.
    pub fn serialized_size(&self) -> Result<usize, serde_json::Error> {
        serde_json::to_vec(self).map(|bytes| bytes.len())
    }
}

/// Encodes image bytes as a `data:` URL, sniffing the MIME type.
pub fn data_url(bytes: &[u8]) -> String {
    let mime = image::guess_format(bytes)
        .map(|f| f.to_mime_type())
        .unwrap_or("application/octet-stream");
    format!("data:{};base64,{}", mime, STANDARD.encode(bytes))
}

fn location_summary(run: &MonitoringRun) -> String {
    let mut wet = run.readings_with_rain();
    if wet.is_empty() {
        return format!("No rain detected at {} locations", run.readings.len());
    }
    wet.sort_by(|a, b| b.rain_rate_mm_per_hour.total_cmp(&a.rain_rate_mm_per_hour));

    let names: Vec<&str> = wet
        .iter()
        .take(SUMMARY_NAME_LIMIT)
        .map(|r| r.location.name.as_str())
        .collect();
    let mut summary = names.join(", ");
    if wet.len() > SUMMARY_NAME_LIMIT {
        summary.push_str(&format!(" (+{} more)", wet.len() - SUMMARY_NAME_LIMIT));
    }
    summary
}
