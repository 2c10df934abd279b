/// Persistence gateway for monitoring runs.
///
/// Validates a finished run, projects it into a `PersistedRecord`, enforces
/// the record size ceiling and writes exactly one append-only record per run
/// through a `RecordStore`.
///
/// Submodules:
/// - `record`: the stored document shape.
/// - `postgres`: the PostgreSQL `RecordStore`.

pub mod postgres;
pub mod record;

use crate::logging::{self, DataSource};
use crate::model::{MonitoringRun, PersistenceError, ValidationError};
use chrono::{DateTime, Utc};
pub use record::{Marker, PersistedRecord, RecordMetadata};

/// Identifier assigned by the store to an inserted record.
pub type RecordId = i64;

/// Append-only sink for persisted records.
pub trait RecordStore: Send + Sync {
    fn insert(&self, record: &PersistedRecord) -> Result<RecordId, PersistenceError>;
}

/// What happened to a run's record.
#[derive(Debug, Clone, PartialEq)]
pub enum PersistOutcome {
    Stored { record_id: RecordId, size_bytes: usize },
    /// The record failed validation and was not written.
    Rejected(ValidationError),
}

pub struct PersistenceGateway {
    store: Box<dyn RecordStore>,
    max_record_bytes: usize,
    include_base_image: bool,
}

impl PersistenceGateway {
    pub fn new(store: Box<dyn RecordStore>, max_record_bytes: usize, include_base_image: bool) -> Self {
        Self {
            store,
            max_record_bytes,
            include_base_image,
        }
    }

    pub fn max_record_bytes(&self) -> usize {
        self.max_record_bytes
    }

    /// Validates and writes one record for `run`.
    ///
    /// Validation failures are not errors: they come back as
    /// [`PersistOutcome::Rejected`] and are logged. Only datastore failures
    /// return `Err`.
    pub fn persist(
        &self,
        run: &MonitoringRun,
        base_image: Option<&[u8]>,
        annotated_image: Option<&[u8]>,
    ) -> Result<PersistOutcome, PersistenceError> {
        let (record, size_bytes) = match self.prepare(run, base_image, annotated_image, Utc::now()) {
            Ok(prepared) => prepared,
            Err(rejection) => {
                logging::warn(
                    DataSource::Database,
                    None,
                    &format!("Run record rejected, nothing written: {}", rejection),
                );
                return Ok(PersistOutcome::Rejected(rejection));
            }
        };

        let record_id = self.store.insert(&record).inspect_err(|e| {
            logging::error(DataSource::Database, None, &format!("Run record write failed: {}", e));
        })?;

        logging::info(
            DataSource::Database,
            None,
            &format!("Stored run record {} ({} bytes)", record_id, size_bytes),
        );
        Ok(PersistOutcome::Stored {
            record_id,
            size_bytes,
        })
    }

    /// Builds the record and checks every invariant without writing.
    pub fn prepare(
        &self,
        run: &MonitoringRun,
        base_image: Option<&[u8]>,
        annotated_image: Option<&[u8]>,
        created_at: DateTime<Utc>,
    ) -> Result<(PersistedRecord, usize), ValidationError> {
        validate_run(run, base_image, annotated_image)?;

        let base_image = if self.include_base_image { base_image } else { None };
        let record = PersistedRecord::from_run(run, base_image, annotated_image, created_at);

        let size = record
            .serialized_size()
            .map_err(|e| ValidationError::Serialize(e.to_string()))?;
        if size >= self.max_record_bytes {
            return Err(ValidationError::TooLarge {
                size,
                limit: self.max_record_bytes,
            });
        }
        Ok((record, size))
    }
}

/// Shape checks applied before a run may be persisted.
pub fn validate_run(
    run: &MonitoringRun,
    base_image: Option<&[u8]>,
    annotated_image: Option<&[u8]>,
) -> Result<(), ValidationError> {
    let has_image = [base_image, annotated_image]
        .iter()
        .any(|img| img.is_some_and(|bytes| !bytes.is_empty()));
    if !has_image {
        return Err(ValidationError::EmptyImage);
    }

    run.frame
        .bounds
        .validate()
        .map_err(ValidationError::InvalidBounds)?;

    for reading in &run.readings {
        let invalid = |reason: &str| ValidationError::InvalidReading {
            location: reading.location.name.clone(),
            reason: reason.to_string(),
        };
        if !reading.location.position().is_finite() {
            return Err(invalid("non-finite coordinates"));
        }
        if !(reading.dbz.is_finite() && reading.dbz >= 0.0) {
            return Err(invalid("dbz must be finite and non-negative"));
        }
        if !(reading.rain_rate_mm_per_hour.is_finite() && reading.rain_rate_mm_per_hour >= 0.0) {
            return Err(invalid("rain rate must be finite and non-negative"));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{GeoBounds, Intensity, LatLng, Legend, MonitoredLocation, RadarFrame, Reading};
    use std::sync::{Arc, Mutex};

    #[derive(Default, Clone)]
    struct MemoryStore {
        records: Arc<Mutex<Vec<PersistedRecord>>>,
    }

    impl RecordStore for MemoryStore {
        fn insert(&self, record: &PersistedRecord) -> Result<RecordId, PersistenceError> {
            let mut records = self.records.lock().unwrap();
            records.push(record.clone());
            Ok(records.len() as RecordId)
        }
    }

    struct DownStore;

    impl RecordStore for DownStore {
        fn insert(&self, _record: &PersistedRecord) -> Result<RecordId, PersistenceError> {
            Err(PersistenceError::Connect("connection refused".to_string()))
        }
    }

    fn sample_run() -> MonitoringRun {
        MonitoringRun {
            frame: RadarFrame {
                station_id: "JAK".to_string(),
                image_url: "https://radar.example.invalid/latest.png".to_string(),
                bounds: GeoBounds::new(LatLng::new(-6.35, 106.65), LatLng::new(-6.08, 106.98)),
                legend: Legend::from_levels_and_colors(&[20.0], &["#00FF00".to_string()])
                    .expect("valid legend"),
                captured_at: Utc::now(),
                captured_at_local: String::new(),
                recent: Vec::new(),
            },
            readings: vec![Reading {
                location: MonitoredLocation::new("Pompa Pluit", -6.1167, 106.7917),
                dbz: 20.0,
                rain_rate_mm_per_hour: 0.65,
                intensity: Intensity::Light,
                confidence_note: "test".to_string(),
                pixel_x: 10,
                pixel_y: 10,
            }],
            threshold_mm_per_hour: 2.0,
            run_started_at: Utc::now(),
            run_duration_ms: 5,
            notes: Vec::new(),
        }
    }

    const IMAGE: &[u8] = b"not really a png but non-empty";

    #[test]
    fn test_valid_run_is_stored_once() {
        let store = MemoryStore::default();
        let gateway = PersistenceGateway::new(Box::new(store.clone()), 1024 * 1024, true);

        let outcome = gateway.persist(&sample_run(), Some(IMAGE), None).expect("store is up");
        assert!(matches!(outcome, PersistOutcome::Stored { record_id: 1, .. }));
        assert_eq!(store.records.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_missing_image_is_rejected_without_writing() {
        let store = MemoryStore::default();
        let gateway = PersistenceGateway::new(Box::new(store.clone()), 1024 * 1024, true);

        let outcome = gateway.persist(&sample_run(), Some(&[]), None).expect("no store error");
        assert_eq!(outcome, PersistOutcome::Rejected(ValidationError::EmptyImage));
        assert!(store.records.lock().unwrap().is_empty());
    }

    #[test]
    fn test_oversized_record_is_rejected() {
        let store = MemoryStore::default();
        let gateway = PersistenceGateway::new(Box::new(store.clone()), 256, true);
        let big_image = vec![7u8; 4096];

        let outcome = gateway
            .persist(&sample_run(), Some(&big_image), None)
            .expect("no store error");
        match outcome {
            PersistOutcome::Rejected(ValidationError::TooLarge { size, limit }) => {
                assert!(size >= limit);
                assert_eq!(limit, 256);
            }
            other => panic!("expected TooLarge rejection, got {:?}", other),
        }
        assert!(store.records.lock().unwrap().is_empty());
    }

    #[test]
    fn test_record_exactly_at_ceiling_is_rejected() {
        let gateway = PersistenceGateway::new(Box::new(MemoryStore::default()), usize::MAX, true);
        let created = Utc::now();
        let (_, size) = gateway
            .prepare(&sample_run(), Some(IMAGE), None, created)
            .expect("fits");

        let at_ceiling = PersistenceGateway::new(Box::new(MemoryStore::default()), size, true);
        assert!(matches!(
            at_ceiling.prepare(&sample_run(), Some(IMAGE), None, created),
            Err(ValidationError::TooLarge { .. })
        ));
        let above = PersistenceGateway::new(Box::new(MemoryStore::default()), size + 1, true);
        assert!(above.prepare(&sample_run(), Some(IMAGE), None, created).is_ok());
    }

    #[test]
    fn test_negative_rain_rate_is_rejected() {
        let mut run = sample_run();
        run.readings[0].rain_rate_mm_per_hour = -1.0;
        assert!(matches!(
            validate_run(&run, Some(IMAGE), None),
            Err(ValidationError::InvalidReading { .. })
        ));
    }

    #[test]
    fn test_malformed_bounds_are_rejected() {
        let mut run = sample_run();
        run.frame.bounds = GeoBounds::new(LatLng::new(-6.0, 106.65), LatLng::new(-6.35, 106.98));
        assert!(matches!(
            validate_run(&run, Some(IMAGE), None),
            Err(ValidationError::InvalidBounds(_))
        ));
    }

    #[test]
    fn test_store_failure_is_an_error() {
        let gateway = PersistenceGateway::new(Box::new(DownStore), 1024 * 1024, true);
        assert!(matches!(
            gateway.persist(&sample_run(), Some(IMAGE), None),
            Err(PersistenceError::Connect(_))
        ));
    }

    #[test]
    fn test_base_image_can_be_left_out_of_record() {
        let gateway = PersistenceGateway::new(Box::new(MemoryStore::default()), 1024 * 1024, false);
        let (record, _) = gateway
            .prepare(&sample_run(), Some(IMAGE), Some(IMAGE), Utc::now())
            .expect("valid");
        assert!(record.screenshot.is_none());
        assert!(record.annotated_screenshot.is_some());
    }
}
