//! Radius sampling: worst-case reflectivity around a monitored location.
//!
//! A pump station drains a catchment, not a point, so each location is
//! sampled over a disc of fixed real-world radius. The disc is converted to
//! pixels using the frame's angular resolution, and the maximum reflectivity
//! inside it is reported. Alerting cares about the worst cell nearby, not
//! the average.

use crate::analysis::{georef, legend, physics};
use crate::ingest::raster::RasterImage;
use crate::model::{GeoBounds, MonitoredLocation, RadarFrame, Reading, SamplingDiagnostic};

/// Mean Earth radius in kilometres.
pub const EARTH_RADIUS_KM: f64 = 6371.0;

/// Sampling radius band, in pixels.
pub const MIN_RADIUS_PX: f64 = 2.0;
pub const MAX_RADIUS_PX: f64 = 50.0;

/// Kilometres spanned by one degree of latitude.
pub fn km_per_degree_lat() -> f64 {
    EARTH_RADIUS_KM * std::f64::consts::PI / 180.0
}

/// Kilometres spanned by one degree of longitude at `lat_deg`.
pub fn km_per_degree_lng(lat_deg: f64) -> f64 {
    km_per_degree_lat() * lat_deg.to_radians().cos()
}

/// Converts `radius_km` into a pixel radius for a raster covering `bounds`,
/// evaluated at latitude `lat_deg`.
///
/// The X and Y radii are averaged and clamped to
/// [`MIN_RADIUS_PX`, `MAX_RADIUS_PX`], so degenerate frames can neither
/// collapse the disc nor make it span the image.
pub fn pixel_radius(radius_km: f64, bounds: &GeoBounds, width: u32, height: u32, lat_deg: f64) -> f64 {
    let km_per_px_x = bounds.lng_span() / f64::from(width) * km_per_degree_lng(lat_deg);
    let km_per_px_y = bounds.lat_span() / f64::from(height) * km_per_degree_lat();

    let radius_x = radius_km / km_per_px_x.abs();
    let radius_y = radius_km / km_per_px_y.abs();
    let radius = (radius_x + radius_y) / 2.0;

    if radius.is_nan() {
        MIN_RADIUS_PX
    } else {
        radius.clamp(MIN_RADIUS_PX, MAX_RADIUS_PX)
    }
}

/// Maximum dBZ observed inside a pixel disc, and how many pixels were read.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DiscSample {
    pub max_dbz: f64,
    pub samples: usize,
}

/// Scans the bounding square of the disc and classifies every pixel whose
/// center lies within `radius_px` of `(cx, cy)`.
pub fn sample_disc(
    raster: &dyn RasterImage,
    frame_legend: &crate::model::Legend,
    cx: u32,
    cy: u32,
    radius_px: f64,
) -> DiscSample {
    let reach = radius_px.ceil() as i64;
    let radius_sq = radius_px * radius_px;
    let (width, height) = (i64::from(raster.width()), i64::from(raster.height()));
    let (cx, cy) = (i64::from(cx), i64::from(cy));

    let mut max_dbz: f64 = 0.0;
    let mut samples = 0;
    for y in (cy - reach).max(0)..=(cy + reach).min(height - 1) {
        for x in (cx - reach).max(0)..=(cx + reach).min(width - 1) {
            let (dx, dy) = ((x - cx) as f64, (y - cy) as f64);
            if dx * dx + dy * dy > radius_sq {
                continue;
            }
            let dbz = legend::classify(raster.get_pixel(x as u32, y as u32), frame_legend);
            max_dbz = max_dbz.max(dbz);
            samples += 1;
        }
    }

    DiscSample { max_dbz, samples }
}

/// Estimates rainfall at `location` from the decoded frame raster.
pub fn sample(
    frame: &RadarFrame,
    raster: &dyn RasterImage,
    location: &MonitoredLocation,
    radius_km: f64,
) -> Result<Reading, SamplingDiagnostic> {
    let position = location.position();
    if !position.is_finite() {
        return Err(SamplingDiagnostic::NonFiniteCoordinates(location.name.clone()));
    }
    let (width, height) = (raster.width(), raster.height());
    if width == 0 || height == 0 {
        return Err(SamplingDiagnostic::EmptyRaster);
    }

    let pixel = georef::to_pixel(position, &frame.bounds, width, height);
    let radius_px = pixel_radius(radius_km, &frame.bounds, width, height, location.lat);
    let disc = sample_disc(raster, &frame.legend, pixel.x, pixel.y, radius_px);

    let rain_rate = physics::dbz_to_rain_rate(disc.max_dbz);
    let mut confidence_note = format!(
        "max of {} px within {:.1} px ({:.2} km)",
        disc.samples, radius_px, radius_km
    );
    if pixel.degenerate {
        confidence_note.push_str("; degenerate bounds, image center used");
    }

    Ok(Reading {
        location: location.clone(),
        dbz: disc.max_dbz,
        rain_rate_mm_per_hour: rain_rate,
        intensity: physics::classify_intensity(rain_rate),
        confidence_note,
        pixel_x: pixel.x,
        pixel_y: pixel.y,
    })
}
