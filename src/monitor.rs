/// Monitoring orchestrator.
///
/// One call to [`Monitor::run_once`] is one monitoring run:
///
///   Fetching → Sampling → Annotating → Persisting → Done
///
/// with `Failed` reachable from any phase. Only two failures end a run early:
/// no frame description (nothing to sample) and a datastore error. Anything
/// that goes wrong for the image or for a single location degrades that
/// location to a fallback reading and the run carries on.
///
/// Locations are sampled in parallel on a bounded rayon pool. Readings come
/// back in location order and every one of them exists before annotation
/// starts.

use crate::alert::staleness;
use crate::alert::thresholds::{self, RainAlert};
use crate::analysis::sampler;
use crate::annotate::Annotator;
use crate::config::Config;
use crate::ingest::radar::{HttpRadarSource, RadarSource};
use crate::ingest::raster::{ImageCrateDecoder, RasterDecoder, RasterImage};
use crate::locations;
use crate::logging::{self, DataSource};
use crate::model::{
    FrameFetchError, MonitoredLocation, MonitoringRun, RadarFrame, Reading, RunError, RunSummary,
    SamplingDiagnostic,
};
use crate::persist::postgres::PostgresStore;
use crate::persist::{PersistOutcome, PersistenceGateway};
use chrono::Utc;
use rayon::prelude::*;
use std::time::Instant;

/// Knobs for a single run, taken from `[monitor]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MonitorSettings {
    pub search_radius_km: f64,
    pub max_workers: usize,
    pub stale_after_minutes: u64,
}

impl Default for MonitorSettings {
    fn default() -> Self {
        Self {
            search_radius_km: 2.0,
            max_workers: 4,
            stale_after_minutes: 60,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunPhase {
    Fetching,
    Sampling,
    Annotating,
    Persisting,
    Done,
    Failed,
}

/// Everything a finished run produced.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub run: MonitoringRun,
    pub summary: RunSummary,
    pub alerts: Vec<RainAlert>,
    /// Locations that fell back, with the reason.
    pub diagnostics: Vec<(String, SamplingDiagnostic)>,
    pub persistence: PersistOutcome,
    /// `false` when the stored image is the un-annotated base image (or
    /// there was no image at all).
    pub annotated: bool,
}

pub struct Monitor {
    source: Box<dyn RadarSource>,
    decoder: Box<dyn RasterDecoder>,
    annotator: Annotator,
    gateway: PersistenceGateway,
    locations: Vec<MonitoredLocation>,
    settings: MonitorSettings,
    pool: Option<rayon::ThreadPool>,
}

impl Monitor {
    pub fn new(
        source: Box<dyn RadarSource>,
        decoder: Box<dyn RasterDecoder>,
        annotator: Annotator,
        gateway: PersistenceGateway,
        locations: Vec<MonitoredLocation>,
        settings: MonitorSettings,
    ) -> Self {
        let pool = match rayon::ThreadPoolBuilder::new()
            .num_threads(settings.max_workers.max(1))
            .thread_name(|i| format!("rainmon-sampler-{}", i))
            .build()
        {
            Ok(pool) => Some(pool),
            Err(e) => {
                logging::warn(
                    DataSource::System,
                    None,
                    &format!("Sampler pool unavailable, sampling sequentially: {}", e),
                );
                None
            }
        };

        Self {
            source,
            decoder,
            annotator,
            gateway,
            locations,
            settings,
            pool,
        }
    }

    /// Wires the production collaborators from configuration: HTTP radar
    /// source, `image` decoder, system-font annotator and Postgres store.
    pub fn from_config(config: &Config) -> Result<Self, FrameFetchError> {
        let source = HttpRadarSource::new(
            &config.radar.endpoint,
            &config.radar.station_id,
            config.fetch_timeout(),
        )?;
        let store = PostgresStore::new(config.database_url.clone());
        if !store.is_configured() {
            logging::warn(
                DataSource::Database,
                None,
                "DATABASE_URL is not set; every run will fail at the persist step",
            );
        }
        let gateway = PersistenceGateway::new(
            Box::new(store),
            config.persistence.max_record_bytes,
            config.persistence.include_base_image,
        );

        Ok(Self::new(
            Box::new(source),
            Box::new(ImageCrateDecoder),
            Annotator::new(),
            gateway,
            config.locations.clone(),
            MonitorSettings {
                search_radius_km: config.monitor.search_radius_km,
                max_workers: config.monitor.max_workers,
                stale_after_minutes: config.monitor.stale_after_minutes,
            },
        ))
    }

    pub fn locations(&self) -> &[MonitoredLocation] {
        &self.locations
    }

    /// Executes one full monitoring run against the latest frame.
    pub fn run_once(&self, threshold_mm_per_hour: f64) -> Result<RunReport, RunError> {
        let started = Instant::now();
        let run_started_at = Utc::now();
        let mut notes = Vec::new();

        enter(RunPhase::Fetching);
        let frame = match self.source.fetch_frame() {
            Ok(frame) => frame,
            Err(e) => {
                logging::log_radar_failure(DataSource::Radar, None, "Frame fetch", &e);
                enter(RunPhase::Failed);
                return Err(RunError::FrameFetch(e));
            }
        };
        logging::info(
            DataSource::Radar,
            Some(&frame.station_id),
            &format!("Frame captured {} ({})", frame.captured_at, frame.image_url),
        );

        if staleness::is_frame_stale_at(&frame, self.settings.stale_after_minutes, run_started_at) {
            let note = format!(
                "Frame is stale: captured {} minutes ago",
                staleness::frame_age_minutes_at(&frame, run_started_at)
            );
            logging::warn(DataSource::Radar, Some(&frame.station_id), &note);
            notes.push(note);
        }
        let outside = locations::locations_outside(&self.locations, &frame.bounds);
        if !outside.is_empty() {
            let names: Vec<&str> = outside.iter().map(|l| l.name.as_str()).collect();
            notes.push(format!("Outside radar coverage: {}", names.join(", ")));
        }

        let base_image = match self.source.fetch_image(&frame) {
            Ok(bytes) => Some(bytes),
            Err(e) => {
                logging::log_radar_failure(DataSource::Image, None, "Image fetch", &e);
                notes.push(format!("Radar image unavailable: {}", e));
                None
            }
        };

        enter(RunPhase::Sampling);
        let raster = match base_image.as_deref() {
            Some(bytes) => self.decoder.decode(bytes).map_err(|e| {
                logging::log_radar_failure(DataSource::Image, None, "Image decode", &e);
                notes.push(format!("Radar image undecodable: {}", e));
                e.to_string()
            }),
            None => Err("no image".to_string()),
        };
        let outcomes = match &raster {
            Ok(raster) => self.sample_all(&frame, raster.as_ref()),
            Err(reason) => self
                .locations
                .iter()
                .map(|_| Err(SamplingDiagnostic::ImageUnavailable(reason.clone())))
                .collect(),
        };
        let (readings, diagnostics) = merge_readings(&self.locations, outcomes);
        if !diagnostics.is_empty() {
            notes.push(format!(
                "{} of {} locations fell back to no-data readings",
                diagnostics.len(),
                self.locations.len()
            ));
        }

        let run = MonitoringRun {
            frame,
            readings,
            threshold_mm_per_hour,
            run_started_at,
            run_duration_ms: started.elapsed().as_millis() as u64,
            notes,
        };
        let summary = run.summary();
        let alerts: Vec<RainAlert> = run
            .readings
            .iter()
            .filter_map(|r| thresholds::check_rain_threshold(r, threshold_mm_per_hour))
            .collect();
        for alert in &alerts {
            logging::warn(DataSource::System, Some(&alert.location), &alert.message);
        }
        logging::log_run_summary(
            &run.frame.station_id,
            summary.alerted,
            summary.below_threshold,
            summary.no_rain,
            summary.fallbacks,
        );

        enter(RunPhase::Annotating);
        // Only annotate an image the decoder accepted
        let annotated_image = match (&base_image, &raster) {
            (Some(bytes), Ok(_)) => match self.annotator.annotate(bytes, &run) {
                Ok(png) => Some(png),
                Err(e) => {
                    logging::warn(
                        DataSource::Image,
                        None,
                        &format!("Annotation failed, storing base image only: {}", e),
                    );
                    None
                }
            },
            _ => None,
        };

        enter(RunPhase::Persisting);
        let persistence = match self
            .gateway
            .persist(&run, base_image.as_deref(), annotated_image.as_deref())
        {
            Ok(outcome) => outcome,
            Err(e) => {
                enter(RunPhase::Failed);
                return Err(RunError::Persistence(e));
            }
        };

        enter(RunPhase::Done);
        Ok(RunReport {
            run,
            summary,
            alerts,
            diagnostics,
            persistence,
            annotated: annotated_image.is_some(),
        })
    }

    fn sample_all(
        &self,
        frame: &RadarFrame,
        raster: &dyn RasterImage,
    ) -> Vec<Result<Reading, SamplingDiagnostic>> {
        let radius_km = self.settings.search_radius_km;
        let sample_one = |location: &MonitoredLocation| sampler::sample(frame, raster, location, radius_km);

        match &self.pool {
            Some(pool) => pool.install(|| self.locations.par_iter().map(sample_one).collect()),
            None => self.locations.iter().map(sample_one).collect(),
        }
    }
}

fn enter(phase: RunPhase) {
    logging::debug(DataSource::System, None, &format!("Run phase: {:?}", phase));
}

/// Pairs each location with its outcome, replacing failures with fallback
/// readings. Output order follows `locations`.
fn merge_readings(
    locations: &[MonitoredLocation],
    outcomes: Vec<Result<Reading, SamplingDiagnostic>>,
) -> (Vec<Reading>, Vec<(String, SamplingDiagnostic)>) {
    let mut readings = Vec::with_capacity(locations.len());
    let mut diagnostics = Vec::new();

    for (location, outcome) in locations.iter().zip(outcomes) {
        match outcome {
            Ok(reading) => readings.push(reading),
            Err(diagnostic) => {
                logging::warn(
                    DataSource::Image,
                    Some(&location.name),
                    &format!("Sampling degraded to fallback: {}", diagnostic),
                );
                diagnostics.push((location.name.clone(), diagnostic));
                readings.push(Reading::fallback(location.clone()));
            }
        }
    }

    (readings, diagnostics)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Intensity;

    #[test]
    fn test_merge_keeps_location_order_and_falls_back() {
        let locations = vec![
            MonitoredLocation::new("A", -6.2, 106.8),
            MonitoredLocation::new("B", f64::NAN, 106.8),
        ];
        let ok = Reading {
            location: locations[0].clone(),
            dbz: 20.0,
            rain_rate_mm_per_hour: 0.65,
            intensity: Intensity::Light,
            confidence_note: "test".to_string(),
            pixel_x: 3,
            pixel_y: 4,
        };
        let outcomes = vec![
            Ok(ok.clone()),
            Err(SamplingDiagnostic::NonFiniteCoordinates("B".to_string())),
        ];

        let (readings, diagnostics) = merge_readings(&locations, outcomes);
        assert_eq!(readings.len(), 2);
        assert_eq!(readings[0], ok);
        assert!(readings[1].is_fallback());
        assert_eq!(readings[1].location.name, "B");
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].0, "B");
    }

    #[test]
    fn test_default_settings() {
        let settings = MonitorSettings::default();
        assert_eq!(settings.max_workers, 4);
        assert_eq!(settings.search_radius_km, 2.0);
        assert_eq!(settings.stale_after_minutes, 60);
    }
}
