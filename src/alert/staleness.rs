/// Radar frame staleness detection.
///
/// The radar publishes a new scan every few minutes. When the upstream feed
/// stalls, the "latest" frame keeps being served and every run would quietly
/// re-report old rain. A stale frame is still processed, but the run records
/// a note and a warning is logged.
///
/// # Clock injection
/// All functions accept a `now: DateTime<Utc>` parameter rather than calling
/// `Utc::now()` internally, which keeps the tests deterministic.

use crate::model::RadarFrame;
use chrono::{DateTime, Utc};

/// Age of the frame in whole minutes relative to `now`. Negative when the
/// source clock runs ahead of ours.
pub fn frame_age_minutes_at(frame: &RadarFrame, now: DateTime<Utc>) -> i64 {
    (now - frame.captured_at).num_minutes()
}

/// Returns `true` if the frame is older than `max_age_minutes`.
///
/// Staleness is strictly greater than the threshold:
///   age > max_age_minutes  →  stale
///   age == max_age_minutes →  not stale
pub fn is_frame_stale_at(frame: &RadarFrame, max_age_minutes: u64, now: DateTime<Utc>) -> bool {
    let age = frame_age_minutes_at(frame, now);
    age > 0 && age as u64 > max_age_minutes
}

/// Convenience wrapper that uses the real current time.
pub fn is_frame_stale(frame: &RadarFrame, max_age_minutes: u64) -> bool {
    is_frame_stale_at(frame, max_age_minutes, Utc::now())
}
