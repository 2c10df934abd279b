//! Geographic to raster pixel mapping.
//!
//! Radar overlays are plain equirectangular images: longitude maps linearly
//! onto columns and latitude onto rows, with rows growing southward. The
//! mapping is one-directional; nothing in the service needs pixel → geo.

use crate::model::{GeoBounds, LatLng};

/// Result of mapping a coordinate onto a raster.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PixelPosition {
    pub x: u32,
    pub y: u32,
    /// Set when the bounds (or the point) could not be mapped and the image
    /// center was returned as a best-effort estimate.
    pub degenerate: bool,
}

/// Maps `point` onto a `width` × `height` raster covering `bounds`.
///
/// Points outside the bounds are clamped to the nearest edge pixel. Zero
/// spans or non-finite input return the image center with `degenerate` set
/// instead of failing, so one bad frame field never aborts a whole run.
pub fn to_pixel(point: LatLng, bounds: &GeoBounds, width: u32, height: u32) -> PixelPosition {
    let center = PixelPosition {
        x: width / 2,
        y: height / 2,
        degenerate: true,
    };
    if width == 0 || height == 0 {
        return PixelPosition {
            x: 0,
            y: 0,
            degenerate: true,
        };
    }

    let lng_span = bounds.lng_span();
    let lat_span = bounds.lat_span();
    if !(lng_span.is_finite() && lat_span.is_finite()) || lng_span == 0.0 || lat_span == 0.0 {
        return center;
    }
    if !point.is_finite() {
        return center;
    }

    let fx = (point.lng - bounds.southwest.lng) / lng_span;
    // Latitude grows northward, image rows grow downward
    let fy = (bounds.northeast.lat - point.lat) / lat_span;

    PixelPosition {
        x: scale_and_clamp(fx, width),
        y: scale_and_clamp(fy, height),
        degenerate: false,
    }
}

fn scale_and_clamp(fraction: f64, dimension: u32) -> u32 {
    let max = f64::from(dimension - 1);
    (fraction * max).round().clamp(0.0, max) as u32
}

#[cfg(test)]
mod tests {
    use super::*;

    fn jakarta_bounds() -> GeoBounds {
        GeoBounds::new(LatLng::new(-6.35, 106.65), LatLng::new(-6.08, 106.98))
    }

    #[test]
    fn test_corners_map_to_image_corners() {
        let b = jakarta_bounds();
        let nw = to_pixel(LatLng::new(-6.08, 106.65), &b, 512, 512);
        let se = to_pixel(LatLng::new(-6.35, 106.98), &b, 512, 512);
        assert_eq!((nw.x, nw.y), (0, 0));
        assert_eq!((se.x, se.y), (511, 511));
        assert!(!nw.degenerate && !se.degenerate);
    }

    #[test]
    fn test_center_maps_within_one_pixel_of_image_center() {
        let b = jakarta_bounds();
        let p = to_pixel(b.center(), &b, 512, 512);
        assert!((i64::from(p.x) - 256).abs() <= 1, "x = {}", p.x);
        assert!((i64::from(p.y) - 256).abs() <= 1, "y = {}", p.y);
    }

    #[test]
    fn test_points_outside_bounds_are_clamped_not_wrapped() {
        let b = jakarta_bounds();
        let far_points = [
            LatLng::new(10.0, 90.0),
            LatLng::new(-30.0, 150.0),
            LatLng::new(-6.2, -179.0),
            LatLng::new(89.9, 106.8),
        ];
        for point in far_points {
            let p = to_pixel(point, &b, 640, 480);
            assert!(p.x <= 639 && p.y <= 479, "{:?} mapped to {:?}", point, p);
        }
        let p = to_pixel(LatLng::new(10.0, 90.0), &b, 640, 480);
        assert_eq!((p.x, p.y), (0, 0));
    }

    #[test]
    fn test_northern_point_has_smaller_row() {
        let b = jakarta_bounds();
        let north = to_pixel(LatLng::new(-6.10, 106.8), &b, 512, 512);
        let south = to_pixel(LatLng::new(-6.30, 106.8), &b, 512, 512);
        assert!(north.y < south.y);
    }

    #[test]
    fn test_degenerate_bounds_return_center_without_panicking() {
        let flat = GeoBounds::new(LatLng::new(-6.2, 106.65), LatLng::new(-6.2, 106.98));
        let p = to_pixel(LatLng::new(-6.2, 106.8), &flat, 512, 300);
        assert_eq!((p.x, p.y), (256, 150));
        assert!(p.degenerate);
    }

    #[test]
    fn test_non_finite_point_returns_center() {
        let p = to_pixel(LatLng::new(f64::NAN, 106.8), &jakarta_bounds(), 100, 100);
        assert!(p.degenerate);
        assert_eq!((p.x, p.y), (50, 50));
    }

    #[test]
    fn test_zero_sized_image_does_not_underflow() {
        let p = to_pixel(LatLng::new(-6.2, 106.8), &jakarta_bounds(), 0, 0);
        assert_eq!((p.x, p.y), (0, 0));
        assert!(p.degenerate);
    }
}
