/// Alert decisions for monitoring runs.
///
/// Submodules:
/// - `thresholds`: per-location rain-rate threshold checks.
/// - `staleness`: radar frame freshness.

pub mod staleness;
pub mod thresholds;
