//! Color → reflectivity classification against a frame legend.
//!
//! Radar overlays are palette images: each reflectivity band is painted with
//! one legend color, then anti-aliased, alpha-blended and overprinted with
//! labels. Classification is deliberately biased toward reporting no rain
//! when a pixel is not a confident match for a legend swatch.

use crate::model::Legend;

/// Pixels with alpha below this carry no radar data.
pub const MIN_ALPHA: u8 = 40;

/// All channels at or below this value count as near-black basemap.
pub const NEAR_BLACK_MAX: u8 = 30;

/// All channels at or above this value count as near-white basemap.
pub const NEAR_WHITE_MIN: u8 = 225;

/// Largest RGB Euclidean distance (range 0 to 441) accepted as a legend match.
pub const MAX_MATCH_DISTANCE: f64 = 28.0;

/// Detailed outcome of classifying one pixel.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Classification {
    /// Transparent or near-transparent pixel.
    NoData,
    /// Near-black or near-white background bleed-through.
    Background,
    /// Nearest legend color was too far away to trust.
    Unmatched { distance: f64 },
    Level { index: usize, dbz: f64, distance: f64 },
}

impl Classification {
    pub fn dbz(&self) -> f64 {
        match self {
            Classification::Level { dbz, .. } => *dbz,
            _ => 0.0,
        }
    }
}

/// Classifies an RGBA sample and returns its reflectivity in dBZ
/// (0 when the pixel is not a reliable legend match).
pub fn classify(pixel: [u8; 4], legend: &Legend) -> f64 {
    classify_detailed(pixel, legend).dbz()
}

pub fn classify_detailed(pixel: [u8; 4], legend: &Legend) -> Classification {
    let [r, g, b, a] = pixel;
    if a < MIN_ALPHA {
        return Classification::NoData;
    }
    if is_near_black([r, g, b]) || is_near_white([r, g, b]) {
        return Classification::Background;
    }

    // Strict `<` keeps the first of equidistant legend entries
    let mut best: Option<(usize, f64)> = None;
    for (index, entry) in legend.entries().iter().enumerate() {
        let distance = color_distance([r, g, b], entry.color);
        match best {
            Some((_, best_distance)) if distance >= best_distance => {}
            _ => best = Some((index, distance)),
        }
    }

    match best {
        None => Classification::Unmatched {
            distance: f64::INFINITY,
        },
        Some((_, distance)) if distance > MAX_MATCH_DISTANCE => {
            Classification::Unmatched { distance }
        }
        Some((index, distance)) => Classification::Level {
            index,
            dbz: legend.entries()[index].threshold_dbz.max(0.0),
            distance,
        },
    }
}

/// Euclidean distance between two colors in RGB space.
pub fn color_distance(a: [u8; 3], b: [u8; 3]) -> f64 {
    let sq = |x: u8, y: u8| {
        let d = f64::from(x) - f64::from(y);
        d * d
    };
    (sq(a[0], b[0]) + sq(a[1], b[1]) + sq(a[2], b[2])).sqrt()
}

fn is_near_black(rgb: [u8; 3]) -> bool {
    rgb.iter().all(|&c| c <= NEAR_BLACK_MAX)
}

fn is_near_white(rgb: [u8; 3]) -> bool {
    rgb.iter().all(|&c| c >= NEAR_WHITE_MIN)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::LegendEntry;

    fn sample_legend() -> Legend {
        let levels = [5.0, 10.0, 15.0, 20.0, 30.0, 40.0, 50.0];
        let colors: Vec<String> = [
            "#ADD8E6", "#0000FF", "#00008B", "#00FF00", "#FFFF00", "#FFA500", "#FF0000",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect();
        Legend::from_levels_and_colors(&levels, &colors).expect("valid legend")
    }

    #[test]
    fn test_exact_legend_colors_classify_to_their_level() {
        let legend = sample_legend();
        for entry in legend.entries() {
            let [r, g, b] = entry.color;
            assert_eq!(classify([r, g, b, 255], &legend), entry.threshold_dbz);
        }
    }

    #[test]
    fn test_transparent_pixel_is_no_data_regardless_of_color() {
        let legend = sample_legend();
        assert_eq!(classify([0, 255, 0, 0], &legend), 0.0);
        assert_eq!(classify([255, 0, 0, MIN_ALPHA - 1], &legend), 0.0);
        assert_eq!(
            classify_detailed([255, 0, 0, 0], &legend),
            Classification::NoData
        );
    }

    #[test]
    fn test_background_colors_are_rejected() {
        let legend = sample_legend();
        assert_eq!(
            classify_detailed([10, 12, 8, 255], &legend),
            Classification::Background
        );
        assert_eq!(
            classify_detailed([250, 250, 240, 255], &legend),
            Classification::Background
        );
    }

    #[test]
    fn test_near_match_is_accepted() {
        let legend = sample_legend();
        // 10 units off pure green on one channel
        assert_eq!(classify([10, 245, 0, 255], &legend), 20.0);
    }

    #[test]
    fn test_far_match_is_rejected_instead_of_guessed() {
        let legend = sample_legend();
        // Magenta is nowhere near any swatch
        match classify_detailed([200, 0, 200, 255], &legend) {
            Classification::Unmatched { distance } => assert!(distance > MAX_MATCH_DISTANCE),
            other => panic!("expected Unmatched, got {:?}", other),
        }
    }

    #[test]
    fn test_equidistant_colors_pick_first_legend_entry() {
        let legend = Legend::from_entries(vec![
            LegendEntry {
                threshold_dbz: 10.0,
                color: [100, 100, 90],
            },
            LegendEntry {
                threshold_dbz: 20.0,
                color: [100, 100, 110],
            },
        ])
        .expect("valid legend");
        assert_eq!(classify([100, 100, 100, 255], &legend), 10.0);
    }

    #[test]
    fn test_color_distance_range() {
        assert_eq!(color_distance([0, 0, 0], [0, 0, 0]), 0.0);
        let max = color_distance([0, 0, 0], [255, 255, 255]);
        assert!((max - 441.67).abs() < 0.01);
    }
}
