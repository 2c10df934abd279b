/// Data ingestion for the radar rainfall monitoring service.
///
/// Submodules:
/// - `radar`: radar endpoint client; parses the upstream JSON into a
///   validated `RadarFrame` and downloads the frame image.
/// - `raster`: image decoding behind the `RasterDecoder` / `RasterImage`
///   capability traits.

pub mod radar;
pub mod raster;
