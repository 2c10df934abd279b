//! Raster decoding capability.
//!
//! Sampling only needs dimensions and RGBA lookups, so the decoder is kept
//! behind two small traits. The production implementation uses the `image`
//! crate; tests build rasters in memory.

use crate::model::ImageError;
use image::{Rgba, RgbaImage};

/// A decoded raster the sampler can read pixels from.
pub trait RasterImage: Send + Sync {
    fn width(&self) -> u32;
    fn height(&self) -> u32;
    /// RGBA sample at `(x, y)`. Out-of-range coordinates read as fully
    /// transparent.
    fn get_pixel(&self, x: u32, y: u32) -> [u8; 4];
}

/// Turns encoded image bytes into a [`RasterImage`].
pub trait RasterDecoder: Send + Sync {
    fn decode(&self, bytes: &[u8]) -> Result<Box<dyn RasterImage>, ImageError>;
}

/// An RGBA8 raster held in memory.
#[derive(Debug, Clone)]
pub struct RgbaRaster {
    image: RgbaImage,
}

impl RgbaRaster {
    pub fn new(image: RgbaImage) -> Self {
        Self { image }
    }

    /// A raster of `width` × `height` filled with one color.
    pub fn filled(width: u32, height: u32, rgba: [u8; 4]) -> Self {
        Self::new(RgbaImage::from_pixel(width, height, Rgba(rgba)))
    }

    pub fn put_pixel(&mut self, x: u32, y: u32, rgba: [u8; 4]) {
        if x < self.image.width() && y < self.image.height() {
            self.image.put_pixel(x, y, Rgba(rgba));
        }
    }

    pub fn as_image(&self) -> &RgbaImage {
        &self.image
    }
}

impl RasterImage for RgbaRaster {
    fn width(&self) -> u32 {
        self.image.width()
    }

    fn height(&self) -> u32 {
        self.image.height()
    }

    fn get_pixel(&self, x: u32, y: u32) -> [u8; 4] {
        self.image
            .get_pixel_checked(x, y)
            .map(|p| p.0)
            .unwrap_or([0, 0, 0, 0])
    }
}

/// Decodes PNG / JPEG / GIF radar images with the `image` crate.
#[derive(Debug, Clone, Copy, Default)]
pub struct ImageCrateDecoder;

impl RasterDecoder for ImageCrateDecoder {
    fn decode(&self, bytes: &[u8]) -> Result<Box<dyn RasterImage>, ImageError> {
        if bytes.is_empty() {
            return Err(ImageError::Empty);
        }
        let decoded =
            image::load_from_memory(bytes).map_err(|e| ImageError::Decode(e.to_string()))?;
        Ok(Box::new(RgbaRaster::new(decoded.to_rgba8())))
    }
}
