//! Reflectivity to rainfall conversion.

use crate::model::Intensity;

/// Below this reflectivity the radar signal is treated as noise.
pub const MIN_DETECTABLE_DBZ: f64 = 5.0;

/// Marshall-Palmer coefficients for Z = a·R^b.
pub const MARSHALL_PALMER_A: f64 = 200.0;
pub const MARSHALL_PALMER_B: f64 = 1.6;

/// Rain rate (mm/h) above which a location counts as high risk.
pub const HIGH_RAIN_RATE: f64 = 10.0;

/// Converts reflectivity (dBZ) to rain rate (mm/h) with the Marshall-Palmer
/// relation Z = 200·R^1.6. Non-decreasing in `dbz`; zero below 5 dBZ.
pub fn dbz_to_rain_rate(dbz: f64) -> f64 {
    if !dbz.is_finite() || dbz < MIN_DETECTABLE_DBZ {
        return 0.0;
    }
    let z = 10f64.powf(dbz / 10.0);
    (z / MARSHALL_PALMER_A).powf(1.0 / MARSHALL_PALMER_B).max(0.0)
}

/// Buckets a rain rate into an intensity band. Each boundary value belongs
/// to the band above it.
pub fn classify_intensity(mm_per_hour: f64) -> Intensity {
    if mm_per_hour < 0.5 {
        Intensity::NoRain
    } else if mm_per_hour < 2.0 {
        Intensity::Light
    } else if mm_per_hour < 10.0 {
        Intensity::Moderate
    } else if mm_per_hour < 50.0 {
        Intensity::Heavy
    } else {
        Intensity::VeryHeavy
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_below_minimum_signal_is_zero() {
        for dbz in [-10.0, 0.0, 1.0, 4.0, 4.999] {
            assert_eq!(dbz_to_rain_rate(dbz), 0.0, "dbz {}", dbz);
        }
        assert_eq!(dbz_to_rain_rate(f64::NAN), 0.0);
    }

    #[test]
    fn test_rain_rate_is_monotonic_above_minimum() {
        let mut previous = 0.0;
        let mut dbz = 5.0;
        while dbz <= 75.0 {
            let rate = dbz_to_rain_rate(dbz);
            assert!(rate >= previous, "rate dropped at {} dBZ", dbz);
            previous = rate;
            dbz += 0.25;
        }
    }

    #[test]
    fn test_known_marshall_palmer_values() {
        // 20 dBZ: Z = 100, R = 0.5^(1/1.6)
        assert!((dbz_to_rain_rate(20.0) - 0.6484).abs() < 1e-3);
        // 23 dBZ is Z ≈ 200, i.e. roughly 1 mm/h
        assert!((dbz_to_rain_rate(23.0103) - 1.0).abs() < 1e-3);
        // 40 dBZ ≈ 11.5 mm/h
        assert!((dbz_to_rain_rate(40.0) - 11.53).abs() < 0.01);
    }

    #[test]
    fn test_intensity_band_boundaries() {
        assert_eq!(classify_intensity(0.0), Intensity::NoRain);
        assert_eq!(classify_intensity(0.49), Intensity::NoRain);
        assert_eq!(classify_intensity(0.5), Intensity::Light);
        assert_eq!(classify_intensity(1.99), Intensity::Light);
        assert_eq!(classify_intensity(2.0), Intensity::Moderate);
        assert_eq!(classify_intensity(9.99), Intensity::Moderate);
        assert_eq!(classify_intensity(10.0), Intensity::Heavy);
        assert_eq!(classify_intensity(49.99), Intensity::Heavy);
        assert_eq!(classify_intensity(50.0), Intensity::VeryHeavy);
        assert_eq!(classify_intensity(500.0), Intensity::VeryHeavy);
    }

    #[test]
    fn test_intensity_bands_are_contiguous_and_ordered() {
        let mut previous = Intensity::NoRain;
        let mut seen = vec![previous];
        let mut rate = 0.0;
        while rate < 100.0 {
            let band = classify_intensity(rate);
            assert!(band >= previous, "band went backwards at {}", rate);
            if band != previous {
                seen.push(band);
            }
            previous = band;
            rate += 0.01;
        }
        assert_eq!(seen.len(), 5);
    }
}
