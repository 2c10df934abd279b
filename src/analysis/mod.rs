/// Raster analysis for the radar rainfall monitoring service.
///
/// Turns a decoded radar image into physical rainfall estimates at the
/// monitored locations. Everything here is pure and synchronous; fetching
/// and decoding live in `ingest`, orchestration in `monitor`.
///
/// Submodules:
/// - `georef`: geographic coordinates to raster pixel coordinates.
/// - `legend`: RGBA pixel to reflectivity (dBZ) via the frame legend.
/// - `physics`: dBZ to rain rate (Marshall-Palmer) and intensity bands.
/// - `sampler`: worst-case reflectivity within a radius around a location.

pub mod georef;
pub mod legend;
pub mod physics;
pub mod sampler;
