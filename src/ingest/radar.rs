/// Weather radar endpoint client
///
/// Retrieves the latest radar overlay description for one station: image
/// URL, overlay corner coordinates, reflectivity legend and capture time,
/// plus the list of frames published during the last hour. The loosely
/// typed upstream JSON is parsed into a validated `RadarFrame` right here,
/// so malformed bounds or legends never reach the sampler.
///
/// Expected response shape (numbers may also arrive as strings):
///
/// ```json
/// {
///   "Latest": { "file": "...png", "timeUTC": "2024-01-15 07:30 UTC", "timeLocal": "2024-01-15 14:30 WIB" },
///   "LastOneHour": { "file": ["..."], "timeLocal": ["..."] },
///   "bounds": { "overlayTLC": [-6.08, 106.65], "overlayBRC": [-6.35, 106.98] },
///   "legends": { "levels": [5, 10, 15], "colors": ["#ADD8E6", "#0000FF", "#00008B"] }
/// }
/// ```

use crate::model::{
    FrameFetchError, GeoBounds, ImageError, LatLng, Legend, RadarFrame, RecentFrame,
};
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::Deserialize;
use std::time::Duration;

/// Placeholder substituted with the station id in the endpoint URL.
pub const STATION_PLACEHOLDER: &str = "{station}";

// ============================================================================
// Radar API Response Structures
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct RadarResponse {
    #[serde(rename = "Latest", alias = "latest")]
    pub latest: LatestImage,
    #[serde(rename = "LastOneHour", alias = "lastOneHour", default)]
    pub last_one_hour: Option<RecentImages>,
    pub bounds: WireBounds,
    #[serde(rename = "legends", alias = "legend")]
    pub legend: WireLegend,
}

#[derive(Debug, Deserialize)]
pub struct LatestImage {
    #[serde(alias = "latestImageUrl")]
    pub file: String,
    #[serde(rename = "timeUTC", default)]
    pub time_utc: Option<String>,
    #[serde(rename = "timeLocal", alias = "captureTimeLocal", default)]
    pub time_local: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct RecentImages {
    #[serde(default)]
    pub file: Vec<String>,
    #[serde(rename = "timeLocal", default)]
    pub time_local: Vec<String>,
}

/// Overlay corners as `[lat, lng]` pairs.
#[derive(Debug, Deserialize)]
pub struct WireBounds {
    #[serde(rename = "overlayTLC", alias = "topLeftCorner")]
    pub top_left: [NumOrText; 2],
    #[serde(rename = "overlayBRC", alias = "bottomRightCorner")]
    pub bottom_right: [NumOrText; 2],
}

#[derive(Debug, Deserialize)]
pub struct WireLegend {
    pub levels: Vec<NumOrText>,
    pub colors: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum NumOrText {
    Num(f64),
    Text(String),
}

impl NumOrText {
    fn to_f64(&self, field: &str) -> Result<f64, FrameFetchError> {
        match self {
            NumOrText::Num(v) => Ok(*v),
            NumOrText::Text(s) => s.trim().parse().map_err(|_| {
                FrameFetchError::ParseError(format!("{} is not a number: '{}'", field, s))
            }),
        }
    }
}

// ============================================================================
// Radar source abstraction
// ============================================================================

/// Upstream provider of radar frames.
pub trait RadarSource: Send + Sync {
    /// Fetches and validates the latest frame description.
    fn fetch_frame(&self) -> Result<RadarFrame, FrameFetchError>;

    /// Downloads the encoded image for `frame`.
    fn fetch_image(&self, frame: &RadarFrame) -> Result<Vec<u8>, ImageError>;
}

/// Radar source backed by the station's HTTP endpoint.
pub struct HttpRadarSource {
    client: reqwest::blocking::Client,
    endpoint: String,
    station_id: String,
}

impl HttpRadarSource {
    /// `endpoint` may contain `{station}`, replaced with `station_id`.
    /// `timeout` bounds every request (frame description and image).
    pub fn new(endpoint: &str, station_id: &str, timeout: Duration) -> Result<Self, FrameFetchError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| FrameFetchError::Transport(e.to_string()))?;
        Ok(Self {
            client,
            endpoint: endpoint.to_string(),
            station_id: station_id.to_string(),
        })
    }

    pub fn frame_url(&self) -> String {
        self.endpoint.replace(STATION_PLACEHOLDER, &self.station_id)
    }

    pub fn station_id(&self) -> &str {
        &self.station_id
    }
}

impl RadarSource for HttpRadarSource {
    fn fetch_frame(&self) -> Result<RadarFrame, FrameFetchError> {
        let url = self.frame_url();

        let response = self
            .client
            .get(&url)
            .header("Accept", "application/json")
            .send()
            .map_err(request_error)?;

        if !response.status().is_success() {
            return Err(FrameFetchError::HttpError(response.status().as_u16()));
        }

        let body = response.text().map_err(request_error)?;
        parse_radar_response(&body, &self.station_id, Some(&url))
    }

    fn fetch_image(&self, frame: &RadarFrame) -> Result<Vec<u8>, ImageError> {
        let response = self
            .client
            .get(&frame.image_url)
            .send()
            .map_err(|e| ImageError::Fetch(e.to_string()))?;

        if !response.status().is_success() {
            return Err(ImageError::Fetch(format!("HTTP error: {}", response.status().as_u16())));
        }

        let bytes = response
            .bytes()
            .map_err(|e| ImageError::Fetch(e.to_string()))?;
        if bytes.is_empty() {
            return Err(ImageError::Empty);
        }
        Ok(bytes.to_vec())
    }
}

fn request_error(e: reqwest::Error) -> FrameFetchError {
    if e.is_timeout() {
        FrameFetchError::Timeout(e.to_string())
    } else {
        FrameFetchError::Transport(e.to_string())
    }
}

// ============================================================================
// Parsing
// ============================================================================

/// Parses a radar endpoint response body into a validated frame.
///
/// `base_url` resolves relative image paths; absolute URLs are kept as is.
pub fn parse_radar_response(
    body: &str,
    station_id: &str,
    base_url: Option<&str>,
) -> Result<RadarFrame, FrameFetchError> {
    let response: RadarResponse =
        serde_json::from_str(body).map_err(|e| FrameFetchError::ParseError(e.to_string()))?;

    let bounds = parse_bounds(&response.bounds)?;
    let legend = parse_legend(&response.legend)?;

    let image_url = resolve_url(base_url, &response.latest.file)?;
    let captured_at_local = response.latest.time_local.clone().unwrap_or_default();
    let captured_at = response
        .latest
        .time_utc
        .as_deref()
        .and_then(parse_capture_time)
        .unwrap_or_else(|| {
            crate::logging::warn(
                crate::logging::DataSource::Radar,
                None,
                &format!(
                    "Capture time missing or unparseable ({:?}), using fetch time",
                    response.latest.time_utc
                ),
            );
            Utc::now()
        });

    let recent_images = response.last_one_hour.unwrap_or_default();
    let recent = recent_images
        .file
        .iter()
        .enumerate()
        .filter_map(|(i, file)| {
            let time_local = recent_images.time_local.get(i).cloned().unwrap_or_default();
            resolve_url(base_url, file)
                .ok()
                .map(|image_url| RecentFrame { image_url, time_local })
        })
        .collect();

    Ok(RadarFrame {
        station_id: station_id.to_string(),
        image_url,
        bounds,
        legend,
        captured_at,
        captured_at_local,
        recent,
    })
}

/// Top-left is the north-west corner, bottom-right the south-east corner.
fn parse_bounds(wire: &WireBounds) -> Result<GeoBounds, FrameFetchError> {
    let north = wire.top_left[0].to_f64("overlayTLC latitude")?;
    let west = wire.top_left[1].to_f64("overlayTLC longitude")?;
    let south = wire.bottom_right[0].to_f64("overlayBRC latitude")?;
    let east = wire.bottom_right[1].to_f64("overlayBRC longitude")?;

    let bounds = GeoBounds::new(LatLng::new(south, west), LatLng::new(north, east));
    bounds.validate().map_err(FrameFetchError::InvalidBounds)?;
    Ok(bounds)
}

fn parse_legend(wire: &WireLegend) -> Result<Legend, FrameFetchError> {
    let levels = wire
        .levels
        .iter()
        .map(|l| l.to_f64("legend level"))
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| FrameFetchError::InvalidLegend(e.to_string()))?;
    Legend::from_levels_and_colors(&levels, &wire.colors).map_err(FrameFetchError::InvalidLegend)
}

fn resolve_url(base_url: Option<&str>, file: &str) -> Result<String, FrameFetchError> {
    let file = file.trim();
    if file.is_empty() {
        return Err(FrameFetchError::ParseError("latest image URL is empty".to_string()));
    }
    if file.starts_with("http://") || file.starts_with("https://") {
        return Ok(file.to_string());
    }
    let base = base_url.ok_or_else(|| {
        FrameFetchError::ParseError(format!("relative image path '{}' without base URL", file))
    })?;
    reqwest::Url::parse(base)
        .and_then(|b| b.join(file))
        .map(|u| u.to_string())
        .map_err(|e| FrameFetchError::ParseError(format!("bad image URL '{}': {}", file, e)))
}

/// Parses the UTC capture time published by the radar source.
///
/// Accepts RFC 3339 and `YYYY-MM-DD HH:MM[:SS]` with an optional trailing
/// `UTC` marker.
pub fn parse_capture_time(raw: &str) -> Option<DateTime<Utc>> {
    let trimmed = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(trimmed) {
        return Some(dt.with_timezone(&Utc));
    }
    let naive = trimmed.trim_end_matches("UTC").trim();
    ["%Y-%m-%d %H:%M:%S", "%Y-%m-%d %H:%M", "%Y-%m-%dT%H:%M:%S"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(naive, fmt).ok())
        .map(|dt| DateTime::from_naive_utc_and_offset(dt, Utc))
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    const SAMPLE_RESPONSE: &str = r##"{
        "Latest": {
            "file": "https://radar.example.invalid/JAK/JAK_20240115_0730.png",
            "timeUTC": "2024-01-15 07:30 UTC",
            "timeLocal": "2024-01-15 14:30 WIB"
        },
        "LastOneHour": {
            "file": ["JAK_20240115_0720.png", "JAK_20240115_0710.png"],
            "timeLocal": ["2024-01-15 14:20 WIB", "2024-01-15 14:10 WIB"]
        },
        "bounds": {
            "overlayTLC": ["-6.08", "106.65"],
            "overlayBRC": [-6.35, 106.98]
        },
        "legends": {
            "levels": [5, 10, 15, "20", 30],
            "colors": ["#ADD8E6", "#0000FF", "#00008B", "#00FF00", "#FFFF00"]
        }
    }"##;

    #[test]
    fn test_parse_sample_response() {
        let frame = parse_radar_response(
            SAMPLE_RESPONSE,
            "JAK",
            Some("https://radar.example.invalid/JAK/api.json"),
        )
        .expect("sample response should parse");

        assert_eq!(frame.station_id, "JAK");
        assert_eq!(frame.bounds.southwest, LatLng::new(-6.35, 106.65));
        assert_eq!(frame.bounds.northeast, LatLng::new(-6.08, 106.98));
        assert_eq!(frame.legend.len(), 5);
        assert_eq!(frame.legend.entries()[3].threshold_dbz, 20.0);
        assert_eq!(frame.legend.entries()[3].color, [0, 255, 0]);
        assert_eq!(
            frame.captured_at,
            Utc.with_ymd_and_hms(2024, 1, 15, 7, 30, 0).unwrap()
        );
        assert_eq!(frame.captured_at_local, "2024-01-15 14:30 WIB");
        assert_eq!(frame.recent.len(), 2);
        assert_eq!(
            frame.recent[0].image_url,
            "https://radar.example.invalid/JAK/JAK_20240115_0720.png"
        );
        assert_eq!(frame.recent[1].time_local, "2024-01-15 14:10 WIB");
    }

    #[test]
    fn test_alternate_field_names_are_accepted() {
        let body = r##"{
            "latest": { "latestImageUrl": "https://radar.example.invalid/a.png", "captureTimeLocal": "14:30" },
            "bounds": { "topLeftCorner": [-6.08, 106.65], "bottomRightCorner": [-6.35, 106.98] },
            "legend": { "levels": [20], "colors": ["#00FF00"] }
        }"##;
        let frame = parse_radar_response(body, "JAK", None).expect("should parse");
        assert_eq!(frame.image_url, "https://radar.example.invalid/a.png");
        assert_eq!(frame.captured_at_local, "14:30");
        assert!(frame.recent.is_empty());
    }

    #[test]
    fn test_inverted_bounds_are_rejected() {
        let body = SAMPLE_RESPONSE.replace(r#"["-6.08", "106.65"]"#, r#"["-6.40", "106.65"]"#);
        match parse_radar_response(&body, "JAK", None) {
            Err(FrameFetchError::InvalidBounds(_)) => {}
            other => panic!("expected InvalidBounds, got {:?}", other),
        }
    }

    #[test]
    fn test_mismatched_legend_is_rejected() {
        let body = SAMPLE_RESPONSE.replace(r##""#FFFF00"]"##, r##""#FFFF00", "#FF0000"]"##);
        match parse_radar_response(&body, "JAK", None) {
            Err(FrameFetchError::InvalidLegend(_)) => {}
            other => panic!("expected InvalidLegend, got {:?}", other),
        }
    }

    #[test]
    fn test_non_numeric_corner_is_a_parse_error() {
        let body = SAMPLE_RESPONSE.replace(r#""-6.08""#, r#""north""#);
        assert!(matches!(
            parse_radar_response(&body, "JAK", None),
            Err(FrameFetchError::ParseError(_))
        ));
    }

    #[test]
    fn test_garbage_body_is_a_parse_error() {
        assert!(matches!(
            parse_radar_response("<html>maintenance</html>", "JAK", None),
            Err(FrameFetchError::ParseError(_))
        ));
    }

    #[test]
    fn test_relative_image_without_base_is_rejected() {
        let body = SAMPLE_RESPONSE.replace(
            "https://radar.example.invalid/JAK/JAK_20240115_0730.png",
            "JAK_20240115_0730.png",
        );
        assert!(parse_radar_response(&body, "JAK", None).is_err());
        let frame = parse_radar_response(&body, "JAK", Some("https://radar.example.invalid/JAK/"))
            .expect("resolves against base");
        assert_eq!(frame.image_url, "https://radar.example.invalid/JAK/JAK_20240115_0730.png");
    }

    #[test]
    fn test_capture_time_formats() {
        let expected = Utc.with_ymd_and_hms(2024, 1, 15, 7, 30, 0).unwrap();
        assert_eq!(parse_capture_time("2024-01-15 07:30 UTC"), Some(expected));
        assert_eq!(parse_capture_time("2024-01-15 07:30:00"), Some(expected));
        assert_eq!(parse_capture_time("2024-01-15T07:30:00Z"), Some(expected));
        assert_eq!(parse_capture_time("2024-01-15T14:30:00+07:00"), Some(expected));
        assert_eq!(parse_capture_time("yesterday"), None);
    }

    #[test]
    fn test_frame_url_substitutes_station() {
        let source = HttpRadarSource::new(
            "https://radar.example.invalid/api?radar={station}",
            "JAK",
            Duration::from_secs(15),
        )
        .expect("client builds");
        assert_eq!(source.frame_url(), "https://radar.example.invalid/api?radar=JAK");
    }
}
