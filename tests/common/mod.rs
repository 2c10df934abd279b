//! Shared fixtures for the integration tests: a Jakarta radar frame, PNG
//! rasters painted with legend colors at chosen locations, and in-memory
//! fakes for the radar source and the record store.
#![allow(dead_code)]

use chrono::Utc;
use image::{DynamicImage, ImageFormat, Rgba, RgbaImage};
use rainmon_service::analysis::georef;
use rainmon_service::annotate::Annotator;
use rainmon_service::ingest::radar::RadarSource;
use rainmon_service::ingest::raster::ImageCrateDecoder;
use rainmon_service::model::{
    FrameFetchError, GeoBounds, ImageError, LatLng, Legend, MonitoredLocation, PersistenceError,
    RadarFrame,
};
use rainmon_service::monitor::{Monitor, MonitorSettings};
use rainmon_service::persist::{PersistedRecord, PersistenceGateway, RecordId, RecordStore};
use std::io::Cursor;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

pub const IMAGE_SIZE: u32 = 200;

pub const DBZ_20: [u8; 3] = [0x00, 0xFF, 0x00];
pub const DBZ_30: [u8; 3] = [0xFF, 0xFF, 0x00];
pub const DBZ_40: [u8; 3] = [0xFF, 0x00, 0x00];

// ---------------------------------------------------------------------------
// Frame and raster fixtures
// ---------------------------------------------------------------------------

pub fn jakarta_frame() -> RadarFrame {
    let levels = [5.0, 10.0, 15.0, 20.0, 30.0, 40.0];
    let colors: Vec<String> = ["#ADD8E6", "#0000FF", "#00008B", "#00FF00", "#FFFF00", "#FF0000"]
        .iter()
        .map(|s| s.to_string())
        .collect();
    RadarFrame {
        station_id: "JAK".to_string(),
        image_url: "https://radar.example.invalid/JAK/latest.png".to_string(),
        bounds: GeoBounds::new(LatLng::new(-6.35, 106.65), LatLng::new(-6.08, 106.98)),
        legend: Legend::from_levels_and_colors(&levels, &colors).expect("valid legend"),
        captured_at: Utc::now(),
        captured_at_local: String::new(),
        recent: Vec::new(),
    }
}

/// Three well-separated locations inside the Jakarta frame.
pub fn test_locations() -> Vec<MonitoredLocation> {
    vec![
        MonitoredLocation::new("Pompa Barat", -6.15, 106.75),
        MonitoredLocation::new("Pompa Timur", -6.25, 106.90),
        MonitoredLocation::new("Pompa Selatan", -6.30, 106.70),
    ]
}

/// Transparent PNG with a 5×5 swatch of `color` centered on each location.
pub fn painted_png(frame: &RadarFrame, spots: &[(&MonitoredLocation, [u8; 3])]) -> Vec<u8> {
    let mut image = RgbaImage::from_pixel(IMAGE_SIZE, IMAGE_SIZE, Rgba([0, 0, 0, 0]));
    for (location, [r, g, b]) in spots {
        let pixel = georef::to_pixel(location.position(), &frame.bounds, IMAGE_SIZE, IMAGE_SIZE);
        for dy in -2i64..=2 {
            for dx in -2i64..=2 {
                let x = pixel.x as i64 + dx;
                let y = pixel.y as i64 + dy;
                if (0..IMAGE_SIZE as i64).contains(&x) && (0..IMAGE_SIZE as i64).contains(&y) {
                    image.put_pixel(x as u32, y as u32, Rgba([*r, *g, *b, 255]));
                }
            }
        }
    }
    encode_png(image)
}

pub fn encode_png(image: RgbaImage) -> Vec<u8> {
    let mut bytes = Vec::new();
    DynamicImage::ImageRgba8(image)
        .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
        .expect("encode PNG fixture");
    bytes
}

// ---------------------------------------------------------------------------
// Fakes
// ---------------------------------------------------------------------------

pub struct FakeSource {
    pub frame: Result<RadarFrame, FrameFetchError>,
    pub image: Result<Vec<u8>, ImageError>,
    pub frame_calls: Arc<AtomicUsize>,
}

impl FakeSource {
    pub fn new(frame: RadarFrame, image: Vec<u8>) -> Self {
        Self {
            frame: Ok(frame),
            image: Ok(image),
            frame_calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn failing(error: FrameFetchError) -> Self {
        Self {
            frame: Err(error),
            image: Err(ImageError::Empty),
            frame_calls: Arc::new(AtomicUsize::new(0)),
        }
    }
}

impl RadarSource for FakeSource {
    fn fetch_frame(&self) -> Result<RadarFrame, FrameFetchError> {
        self.frame_calls.fetch_add(1, Ordering::SeqCst);
        self.frame.clone()
    }

    fn fetch_image(&self, _frame: &RadarFrame) -> Result<Vec<u8>, ImageError> {
        self.image.clone()
    }
}

/// Record store that keeps inserted records in memory.
#[derive(Clone, Default)]
pub struct MemoryStore {
    pub records: Arc<Mutex<Vec<PersistedRecord>>>,
    pub insert_calls: Arc<AtomicUsize>,
    pub fail: bool,
}

impl MemoryStore {
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn stored(&self) -> Vec<PersistedRecord> {
        self.records.lock().unwrap().clone()
    }
}

impl RecordStore for MemoryStore {
    fn insert(&self, record: &PersistedRecord) -> Result<RecordId, PersistenceError> {
        self.insert_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(PersistenceError::Write("disk full".to_string()));
        }
        let mut records = self.records.lock().unwrap();
        records.push(record.clone());
        Ok(records.len() as RecordId)
    }
}

pub fn build_monitor(source: FakeSource, store: MemoryStore, max_record_bytes: usize) -> Monitor {
    Monitor::new(
        Box::new(source),
        Box::new(ImageCrateDecoder),
        Annotator::without_fonts(),
        PersistenceGateway::new(Box::new(store), max_record_bytes, true),
        test_locations(),
        MonitorSettings::default(),
    )
}
