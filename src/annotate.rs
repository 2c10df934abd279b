//! Snapshot annotation.
//!
//! Renders an SVG overlay describing every location with detected rain and
//! composites it onto a copy of the radar image, producing the audit image
//! stored with each run. Overlay construction is a pure function of the run,
//! so annotating the same frame and readings twice gives identical bytes.

use crate::alert::thresholds::{RiskLevel, exceeds_threshold, risk_level};
use crate::analysis::physics::HIGH_RAIN_RATE;
use crate::model::{MonitoringRun, Reading};
use image::{DynamicImage, ImageFormat, Rgba, RgbaImage};
use resvg::tiny_skia::{Pixmap, Transform};
use resvg::usvg::{Options, Tree, fontdb};
use std::io::Cursor;
use std::sync::Arc;
use thiserror::Error;

const MARKER_RADIUS: f64 = 6.0;
const HIGH_MARKER_RADIUS: f64 = 10.0;
const GLOW_RADIUS: f64 = 18.0;
const FONT_SIZE: f64 = 11.0;
/// Rough advance width of one label character at `FONT_SIZE`.
const CHAR_WIDTH: f64 = 6.5;

#[derive(Debug, Error)]
pub enum AnnotateError {
    #[error("cannot decode base image: {0}")]
    Decode(String),
    #[error("cannot build overlay: {0}")]
    Svg(String),
    #[error("cannot allocate {0}x{1} overlay")]
    Pixmap(u32, u32),
    #[error("cannot encode annotated image: {0}")]
    Encode(String),
}

pub struct Annotator {
    fontdb: Arc<fontdb::Database>,
}

impl Annotator {
    /// Annotator using the system fonts for labels.
    pub fn new() -> Self {
        let mut db = fontdb::Database::new();
        db.load_system_fonts();
        Self { fontdb: Arc::new(db) }
    }

    /// Annotator with an empty font database. Shapes still render; text is
    /// dropped. Useful on headless hosts and in tests.
    pub fn without_fonts() -> Self {
        Self {
            fontdb: Arc::new(fontdb::Database::new()),
        }
    }

    /// Draws the run's overlay onto `base` and returns PNG bytes.
    pub fn annotate(&self, base: &[u8], run: &MonitoringRun) -> Result<Vec<u8>, AnnotateError> {
        let image = image::load_from_memory(base).map_err(|e| AnnotateError::Decode(e.to_string()))?;
        let svg = build_overlay_svg(image.width(), image.height(), run);
        let composed = self.overlay_to_image(&image, &svg)?;

        let mut bytes = Vec::new();
        DynamicImage::ImageRgba8(composed)
            .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
            .map_err(|e| AnnotateError::Encode(e.to_string()))?;
        Ok(bytes)
    }

    fn overlay_to_image(&self, image: &DynamicImage, svg: &str) -> Result<RgbaImage, AnnotateError> {
        let mut options = Options::default();
        options.fontdb = Arc::clone(&self.fontdb);
        let tree = Tree::from_str(svg, &options).map_err(|e| AnnotateError::Svg(e.to_string()))?;

        let (width, height) = (image.width(), image.height());
        let mut pixmap = Pixmap::new(width, height).ok_or(AnnotateError::Pixmap(width, height))?;
        resvg::render(&tree, Transform::identity(), &mut pixmap.as_mut());

        let mut output = image.to_rgba8();
        for (x, y, pixel) in output.enumerate_pixels_mut() {
            let Some(overlay) = pixmap.pixel(x, y) else {
                continue;
            };
            let overlay = overlay.demultiply();
            let alpha = overlay.alpha();
            if alpha == 0 {
                continue;
            }
            let Rgba([r, g, b, a]) = *pixel;
            *pixel = Rgba([
                blend_channel(r, overlay.red(), alpha),
                blend_channel(g, overlay.green(), alpha),
                blend_channel(b, overlay.blue(), alpha),
                a.max(alpha),
            ]);
        }
        Ok(output)
    }
}

impl Default for Annotator {
    fn default() -> Self {
        Self::new()
    }
}

fn blend_channel(base: u8, overlay: u8, alpha: u8) -> u8 {
    let alpha_f = alpha as f32 / 255.0;
    (base as f32 * (1.0 - alpha_f) + overlay as f32 * alpha_f).round() as u8
}

/// Marker fill for a rain rate in mm/h.
pub fn marker_color(rain_rate_mm_per_hour: f64) -> &'static str {
    if rain_rate_mm_per_hour < 0.5 {
        "#9e9e9e"
    } else if rain_rate_mm_per_hour < 2.0 {
        "#43a047"
    } else if rain_rate_mm_per_hour < 10.0 {
        "#1e88e5"
    } else if rain_rate_mm_per_hour < 50.0 {
        "#fb8c00"
    } else {
        "#e53935"
    }
}

/// Readings drawn on the overlay: rain only, wettest first, ties by name.
pub fn annotated_readings(run: &MonitoringRun) -> Vec<&Reading> {
    let mut wet = run.readings_with_rain();
    wet.sort_by(|a, b| {
        b.rain_rate_mm_per_hour
            .total_cmp(&a.rain_rate_mm_per_hour)
            .then_with(|| a.location.name.cmp(&b.location.name))
    });
    wet
}

/// Builds the overlay SVG for an image of `width` x `height` pixels.
pub fn build_overlay_svg(width: u32, height: u32, run: &MonitoringRun) -> String {
    let mut svg = format!(
        r#"<svg xmlns="http://www.w3.org/2000/svg" width="{}" height="{}" viewBox="0 0 {} {}">"#,
        width, height, width, height
    );
    let threshold = run.threshold_mm_per_hour;

    // Legend box first so markers near the corner stay visible
    svg.push_str(&summary_box(run));

    for (index, reading) in annotated_readings(run).iter().enumerate() {
        let x = reading.pixel_x as f64;
        let y = reading.pixel_y as f64;
        let rate = reading.rain_rate_mm_per_hour;
        let color = marker_color(rate);
        let high = rate >= HIGH_RAIN_RATE;
        let radius = if high { HIGH_MARKER_RADIUS } else { MARKER_RADIUS };

        if high {
            svg.push_str(&format!(
                r#"<circle cx="{}" cy="{}" r="{}" fill="{}" fill-opacity="0.35"/>"#,
                x, y, GLOW_RADIUS, color
            ));
        }
        svg.push_str(&format!(
            r##"<circle cx="{}" cy="{}" r="{}" fill="{}" stroke="#ffffff" stroke-width="2"/>"##,
            x, y, radius, color
        ));

        // Numbered badge, top-right of the marker
        let (bx, by) = (x + radius, y - radius);
        svg.push_str(&format!(
            r##"<circle cx="{}" cy="{}" r="7" fill="#212121"/><text x="{}" y="{}" font-family="sans-serif" font-size="9" font-weight="bold" fill="#ffffff" text-anchor="middle">{}</text>"##,
            bx,
            by,
            bx,
            by + 3.0,
            index + 1
        ));

        let label = format!("{}: {:.1} mm/h", escape_xml(&reading.location.name), rate);
        let label_x = x + radius + 10.0;
        let label_w = reading.location.name.chars().count() as f64 * CHAR_WIDTH + 70.0;
        svg.push_str(&format!(
            r##"<rect x="{}" y="{}" width="{}" height="18" rx="3" fill="#ffffff" fill-opacity="0.85" stroke="{}"/><text x="{}" y="{}" font-family="sans-serif" font-size="{}" fill="#212121">{}</text>"##,
            label_x,
            y - 9.0,
            label_w,
            color,
            label_x + 4.0,
            y + 4.0,
            FONT_SIZE,
            label
        ));

        if exceeds_threshold(rate, threshold) {
            svg.push_str(&format!(
                r##"<rect x="{}" y="{}" width="44" height="14" rx="2" fill="#c62828"/><text x="{}" y="{}" font-family="sans-serif" font-size="10" font-weight="bold" fill="#ffffff">ALERT</text>"##,
                label_x,
                y - 25.0,
                label_x + 5.0,
                y - 14.0
            ));
        }
    }

    svg.push_str(&watermark(width, height, run));
    svg.push_str("</svg>");
    svg
}

fn summary_box(run: &MonitoringRun) -> String {
    let threshold = run.threshold_mm_per_hour;
    let count = |level: RiskLevel| {
        run.readings
            .iter()
            .filter(|r| risk_level(r, threshold) == level)
            .count()
    };
    let rows = [
        (RiskLevel::High, marker_color(50.0)),
        (RiskLevel::Alert, marker_color(threshold.max(2.0))),
        (RiskLevel::Watch, marker_color(0.5)),
        (RiskLevel::Clear, marker_color(0.0)),
    ];

    let mut out = format!(
        r##"<rect x="8" y="8" width="150" height="{}" rx="4" fill="#ffffff" fill-opacity="0.85" stroke="#616161"/><text x="16" y="24" font-family="sans-serif" font-size="{}" font-weight="bold" fill="#212121">Locations ({})</text>"##,
        28.0 + rows.len() as f64 * 16.0,
        FONT_SIZE,
        run.readings.len()
    );
    for (i, (level, color)) in rows.iter().enumerate() {
        let y = 40.0 + i as f64 * 16.0;
        out.push_str(&format!(
            r##"<circle cx="20" cy="{}" r="5" fill="{}"/><text x="32" y="{}" font-family="sans-serif" font-size="{}" fill="#212121">{}: {}</text>"##,
            y - 4.0,
            color,
            y,
            FONT_SIZE,
            level.label(),
            count(*level)
        ));
    }
    out
}

fn watermark(width: u32, height: u32, run: &MonitoringRun) -> String {
    let text = format!(
        "{} radar {} | run {}",
        escape_xml(&run.frame.station_id),
        run.frame.captured_at.format("%Y-%m-%d %H:%M UTC"),
        run.run_started_at.format("%H:%M:%S UTC")
    );
    format!(
        r##"<text x="{}" y="{}" font-family="sans-serif" font-size="10" fill="#ffffff" fill-opacity="0.9" stroke="#000000" stroke-width="0.3" text-anchor="end">{}</text>"##,
        width.saturating_sub(6),
        height.saturating_sub(6),
        text
    )
}

fn escape_xml(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            _ => out.push(c),
        }
    }
    out
}
