//! Radar rainfall estimation and monitoring.
//!
//! Periodically samples a weather-radar raster at fixed pump-station
//! locations, converts reflectivity to rain rate, raises threshold alerts and
//! persists one audit record (readings plus annotated image) per run.

pub mod alert;
pub mod analysis;
pub mod annotate;
pub mod config;
pub mod ingest;
pub mod locations;
pub mod logging;
pub mod model;
pub mod monitor;
pub mod persist;
pub mod scheduler;
pub mod verify;
