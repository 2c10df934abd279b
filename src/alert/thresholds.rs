//! Rain-rate threshold checking.
//!
//! A location is alerted when its estimated rain rate reaches the configured
//! threshold. Risk levels drive marker emphasis in annotated snapshots.

use crate::analysis::physics::HIGH_RAIN_RATE;
use crate::model::{Intensity, Reading};

/// Risk levels, in ascending order of severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum RiskLevel {
    /// No measurable rain.
    Clear,
    /// Rain below the alert threshold.
    Watch,
    /// At or above the alert threshold.
    Alert,
    /// At or above the alert threshold and at least `HIGH_RAIN_RATE`.
    High,
}

impl RiskLevel {
    pub fn label(&self) -> &'static str {
        match self {
            RiskLevel::Clear => "Clear",
            RiskLevel::Watch => "Watch",
            RiskLevel::Alert => "Alert",
            RiskLevel::High => "High",
        }
    }
}

/// A rainfall alert raised for one location.
#[derive(Debug, Clone, PartialEq)]
pub struct RainAlert {
    pub location: String,
    pub rain_rate_mm_per_hour: f64,
    pub intensity: Intensity,
    pub risk: RiskLevel,
    pub message: String,
}

/// Inclusive threshold comparison: `rate >= threshold` alerts.
pub fn exceeds_threshold(rain_rate_mm_per_hour: f64, threshold_mm_per_hour: f64) -> bool {
    rain_rate_mm_per_hour >= threshold_mm_per_hour
}

pub fn risk_level(reading: &Reading, threshold_mm_per_hour: f64) -> RiskLevel {
    let rate = reading.rain_rate_mm_per_hour;
    if !reading.has_rain() {
        RiskLevel::Clear
    } else if !exceeds_threshold(rate, threshold_mm_per_hour) {
        RiskLevel::Watch
    } else if rate >= HIGH_RAIN_RATE {
        RiskLevel::High
    } else {
        RiskLevel::Alert
    }
}

/// Returns an alert if the reading's rain rate reaches `threshold_mm_per_hour`.
///
/// Returns `None` below the threshold.
pub fn check_rain_threshold(reading: &Reading, threshold_mm_per_hour: f64) -> Option<RainAlert> {
    if !exceeds_threshold(reading.rain_rate_mm_per_hour, threshold_mm_per_hour) {
        return None;
    }
    let risk = risk_level(reading, threshold_mm_per_hour);
    Some(RainAlert {
        location: reading.location.name.clone(),
        rain_rate_mm_per_hour: reading.rain_rate_mm_per_hour,
        intensity: reading.intensity,
        risk,
        message: format!(
            "{} rain at {}: {:.1} mm/h ({:.0} dBZ), threshold {:.1} mm/h",
            reading.intensity,
            reading.location.name,
            reading.rain_rate_mm_per_hour,
            reading.dbz,
            threshold_mm_per_hour
        ),
    })
}
