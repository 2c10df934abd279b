//! Radar Source Verification Module
//!
//! Preflight check for a deployment: fetches the latest frame description,
//! downloads and decodes the image, and checks every configured location
//! against the frame footprint with a dry-run sample. Nothing is persisted.
//!
//! Run this before starting the scheduler against a new station or endpoint.

use crate::alert::staleness;
use crate::analysis::sampler;
use crate::ingest::radar::RadarSource;
use crate::ingest::raster::RasterDecoder;
use crate::model::{MonitoredLocation, RadarFrame};
use chrono::Utc;
use serde::{Deserialize, Serialize};

// ============================================================================
// Verification Results
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum VerificationStatus {
    Success,
    PartialSuccess,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FrameVerification {
    pub status: VerificationStatus,
    pub station_id: Option<String>,
    pub image_url: Option<String>,
    pub captured_at: Option<String>,
    pub age_minutes: Option<i64>,
    pub stale: bool,
    pub legend_levels: usize,
    pub recent_frames: usize,
    pub image_bytes: usize,
    pub image_size: Option<(u32, u32)>,
    pub error_message: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocationVerification {
    pub name: String,
    pub status: VerificationStatus,
    pub inside_bounds: bool,
    pub pixel: Option<(u32, u32)>,
    pub dbz: Option<f64>,
    pub rain_rate_mm_per_hour: Option<f64>,
    pub error_message: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerificationSummary {
    pub locations_total: usize,
    pub locations_working: usize,
    pub locations_outside: usize,
    pub locations_failed: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerificationReport {
    pub timestamp: String,
    pub frame: FrameVerification,
    pub locations: Vec<LocationVerification>,
    pub summary: VerificationSummary,
}

impl VerificationReport {
    /// `true` when the frame and image are usable and every location was
    /// sampled (in or out of coverage). A stale frame is still usable: the
    /// monitor processes it with a note.
    pub fn is_ready(&self) -> bool {
        let frame_usable = match self.frame.status {
            VerificationStatus::Success => true,
            VerificationStatus::PartialSuccess => {
                self.frame.error_message.is_none() && self.frame.image_size.is_some()
            }
            VerificationStatus::Failed => false,
        };
        frame_usable && self.summary.locations_failed == 0
    }
}

// ============================================================================
// Verification
// ============================================================================

/// Runs every preflight check. Never fails outright: problems are recorded in
/// the report.
pub fn run_verification(
    source: &dyn RadarSource,
    decoder: &dyn RasterDecoder,
    locations: &[MonitoredLocation],
    search_radius_km: f64,
    stale_after_minutes: u64,
) -> VerificationReport {
    let mut frame_result = FrameVerification {
        status: VerificationStatus::Failed,
        station_id: None,
        image_url: None,
        captured_at: None,
        age_minutes: None,
        stale: false,
        legend_levels: 0,
        recent_frames: 0,
        image_bytes: 0,
        image_size: None,
        error_message: None,
    };
    let failed_locations = |reason: &str| -> Vec<LocationVerification> {
        locations
            .iter()
            .map(|l| LocationVerification {
                name: l.name.clone(),
                status: VerificationStatus::Failed,
                inside_bounds: false,
                pixel: None,
                dbz: None,
                rain_rate_mm_per_hour: None,
                error_message: Some(reason.to_string()),
            })
            .collect()
    };

    println!("🔍 Fetching frame description...");
    let frame = match source.fetch_frame() {
        Ok(frame) => frame,
        Err(e) => {
            println!("  ✗ FAILED: {}", e);
            frame_result.error_message = Some(e.to_string());
            return finish(frame_result, failed_locations("no frame"));
        }
    };
    describe_frame(&mut frame_result, &frame, stale_after_minutes);
    println!(
        "  ✓ {} captured {} ({} legend levels)",
        frame.station_id, frame.captured_at, frame_result.legend_levels
    );
    if frame_result.stale {
        println!(
            "  ⚠ Frame is {} minutes old",
            frame_result.age_minutes.unwrap_or_default()
        );
    }

    println!("\n🔍 Downloading radar image...");
    let raster = match source
        .fetch_image(&frame)
        .and_then(|bytes| {
            frame_result.image_bytes = bytes.len();
            decoder.decode(&bytes)
        }) {
        Ok(raster) => raster,
        Err(e) => {
            println!("  ✗ FAILED: {}", e);
            frame_result.status = VerificationStatus::PartialSuccess;
            frame_result.error_message = Some(e.to_string());
            return finish(frame_result, failed_locations("no image"));
        }
    };
    frame_result.image_size = Some((raster.width(), raster.height()));
    frame_result.status = if frame_result.stale {
        VerificationStatus::PartialSuccess
    } else {
        VerificationStatus::Success
    };
    println!(
        "  ✓ {} bytes, {}x{} px",
        frame_result.image_bytes,
        raster.width(),
        raster.height()
    );

    println!("\n🔍 Sampling monitored locations...");
    let mut results = Vec::with_capacity(locations.len());
    for location in locations {
        print!("  {} ... ", location.name);
        let inside_bounds = frame.bounds.contains(location.position());
        let result = match sampler::sample(&frame, raster.as_ref(), location, search_radius_km) {
            Ok(reading) => {
                let status = if inside_bounds {
                    println!(
                        "✓ OK ({:.0} dBZ, {:.2} mm/h)",
                        reading.dbz, reading.rain_rate_mm_per_hour
                    );
                    VerificationStatus::Success
                } else {
                    println!("⚠ Outside frame, clamped to edge");
                    VerificationStatus::PartialSuccess
                };
                LocationVerification {
                    name: location.name.clone(),
                    status,
                    inside_bounds,
                    pixel: Some((reading.pixel_x, reading.pixel_y)),
                    dbz: Some(reading.dbz),
                    rain_rate_mm_per_hour: Some(reading.rain_rate_mm_per_hour),
                    error_message: None,
                }
            }
            Err(e) => {
                println!("✗ FAILED: {}", e);
                LocationVerification {
                    name: location.name.clone(),
                    status: VerificationStatus::Failed,
                    inside_bounds,
                    pixel: None,
                    dbz: None,
                    rain_rate_mm_per_hour: None,
                    error_message: Some(e.to_string()),
                }
            }
        };
        results.push(result);
    }

    finish(frame_result, results)
}

fn describe_frame(result: &mut FrameVerification, frame: &RadarFrame, stale_after_minutes: u64) {
    let now = Utc::now();
    result.station_id = Some(frame.station_id.clone());
    result.image_url = Some(frame.image_url.clone());
    result.captured_at = Some(frame.captured_at.to_rfc3339());
    result.age_minutes = Some(staleness::frame_age_minutes_at(frame, now));
    result.stale = staleness::is_frame_stale_at(frame, stale_after_minutes, now);
    result.legend_levels = frame.legend.len();
    result.recent_frames = frame.recent.len();
}

fn finish(frame: FrameVerification, locations: Vec<LocationVerification>) -> VerificationReport {
    let count = |status: VerificationStatus| locations.iter().filter(|l| l.status == status).count();
    let summary = VerificationSummary {
        locations_total: locations.len(),
        locations_working: count(VerificationStatus::Success),
        locations_outside: count(VerificationStatus::PartialSuccess),
        locations_failed: count(VerificationStatus::Failed),
    };
    VerificationReport {
        timestamp: Utc::now().to_rfc3339(),
        frame,
        locations,
        summary,
    }
}

pub fn print_summary(report: &VerificationReport) {
    println!("\n═══════════════════════════════════════════════════════════");
    println!("📊 VERIFICATION SUMMARY");
    println!("═══════════════════════════════════════════════════════════");
    println!();
    println!("Radar frame:      {:?}", report.frame.status);
    if let Some(message) = &report.frame.error_message {
        println!("                  {}", message);
    }
    println!(
        "Locations:        {}/{} in coverage  ({} outside, {} failed)",
        report.summary.locations_working,
        report.summary.locations_total,
        report.summary.locations_outside,
        report.summary.locations_failed
    );
    println!();
    println!(
        "Ready to monitor: {}",
        if report.is_ready() { "yes" } else { "no" }
    );
    println!("═══════════════════════════════════════════════════════════");
}
