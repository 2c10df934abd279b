/// Monitored-location registry for the radar rainfall monitoring service.
///
/// Defines the default list of pump stations sampled on every run. The
/// configuration file may replace it with its own `[[locations]]` list;
/// either way the monitor receives a plain `Vec<MonitoredLocation>` and
/// never creates or removes locations at runtime.

use crate::model::{GeoBounds, MonitoredLocation};
use std::collections::HashSet;

/// Static description of a pump station.
pub struct PumpStation {
    pub name: &'static str,
    /// WGS84 latitude.
    pub latitude: f64,
    /// WGS84 longitude.
    pub longitude: f64,
}

/// Default pump stations along the northern Jakarta drainage system,
/// ordered roughly west to east.
pub static PUMP_STATION_REGISTRY: &[PumpStation] = &[
    PumpStation {
        name: "Pompa Kamal Muara",
        latitude: -6.1056,
        longitude: 106.7408,
    },
    PumpStation {
        name: "Pompa Pluit",
        latitude: -6.1167,
        longitude: 106.7917,
    },
    PumpStation {
        name: "Pompa Waduk Melati",
        latitude: -6.1981,
        longitude: 106.8211,
    },
    PumpStation {
        name: "Pompa Pasar Ikan",
        latitude: -6.1264,
        longitude: 106.8083,
    },
    PumpStation {
        name: "Pompa Ancol",
        latitude: -6.1289,
        longitude: 106.8367,
    },
    PumpStation {
        name: "Pompa Sunter Selatan",
        latitude: -6.1497,
        longitude: 106.8611,
    },
    PumpStation {
        name: "Pompa Kali Item",
        latitude: -6.1447,
        longitude: 106.8508,
    },
    PumpStation {
        name: "Pompa Cakung Drain",
        latitude: -6.1522,
        longitude: 106.9347,
    },
];

/// The registry as owned monitoring locations.
pub fn default_locations() -> Vec<MonitoredLocation> {
    PUMP_STATION_REGISTRY
        .iter()
        .map(|s| MonitoredLocation::new(s.name, s.latitude, s.longitude))
        .collect()
}

/// Looks up a location by name. Returns `None` if not found.
pub fn find_location<'a>(locations: &'a [MonitoredLocation], name: &str) -> Option<&'a MonitoredLocation> {
    locations.iter().find(|l| l.name == name)
}

/// Locations that fall outside a frame's footprint. They are still sampled
/// (the georeference mapper clamps them to the image edge) but the result
/// says nothing about the location itself.
pub fn locations_outside<'a>(locations: &'a [MonitoredLocation], bounds: &GeoBounds) -> Vec<&'a MonitoredLocation> {
    locations
        .iter()
        .filter(|l| !bounds.contains(l.position()))
        .collect()
}

/// Checks a location list for empty names, duplicate names and
/// out-of-range coordinates. Returns one message per problem.
pub fn validate_locations(locations: &[MonitoredLocation]) -> Vec<String> {
    let mut problems = Vec::new();
    let mut seen = HashSet::new();

    for location in locations {
        if location.name.trim().is_empty() {
            problems.push("location with empty name".to_string());
        }
        if !seen.insert(location.name.as_str()) {
            problems.push(format!("duplicate location name '{}'", location.name));
        }
        if !(-90.0..=90.0).contains(&location.lat) || !(-180.0..=180.0).contains(&location.lng) {
            problems.push(format!(
                "location '{}' has out-of-range coordinates ({}, {})",
                location.name, location.lat, location.lng
            ));
        }
    }

    problems
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::LatLng;

    fn jakarta_bounds() -> GeoBounds {
        GeoBounds::new(LatLng::new(-6.35, 106.65), LatLng::new(-6.08, 106.98))
    }

    #[test]
    fn test_registry_is_valid() {
        let problems = validate_locations(&default_locations());
        assert!(problems.is_empty(), "registry problems: {:?}", problems);
    }

    #[test]
    fn test_registry_lies_within_jakarta_frame() {
        let locations = default_locations();
        let outside = locations_outside(&locations, &jakarta_bounds());
        assert!(
            outside.is_empty(),
            "stations outside the Jakarta radar footprint: {:?}",
            outside
        );
    }

    #[test]
    fn test_find_location() {
        let locations = default_locations();
        let pluit = find_location(&locations, "Pompa Pluit").expect("Pluit should be registered");
        assert!((pluit.lat + 6.1167).abs() < 1e-9);
        assert!(find_location(&locations, "Nowhere").is_none());
    }

    #[test]
    fn test_validation_flags_duplicates_and_bad_coordinates() {
        let locations = vec![
            MonitoredLocation::new("A", -6.2, 106.8),
            MonitoredLocation::new("A", -6.2, 106.8),
            MonitoredLocation::new("B", -95.0, 106.8),
            MonitoredLocation::new(" ", -6.2, 106.8),
        ];
        let problems = validate_locations(&locations);
        assert_eq!(problems.len(), 3, "{:?}", problems);
    }
}
