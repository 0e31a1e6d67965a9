//! Diagnostic HUD drawn over the frame.
//!
//! Purely observational: nothing here feeds back into control. The HUD is
//! built as an SVG document, rasterised with resvg and alpha-blended onto the
//! frame, so shapes that fall partly outside the frame are clipped.

use std::fmt::Write;
use std::sync::Arc;

use image::{Rgb, RgbImage};
use tiny_skia::{Pixmap, Transform};
use usvg::{Options, Tree, fontdb};

use crate::control_loop::TickReport;
use crate::error::{Result, TurretError};

pub const TARGET_COLOR: Rgb<u8> = Rgb([0, 255, 0]);
pub const DEADBAND_COLOR: Rgb<u8> = Rgb([255, 255, 255]);
pub const BALLISTIC_COLOR: Rgb<u8> = Rgb([255, 200, 0]);
pub const MODE_LABEL_COLOR: Rgb<u8> = Rgb([255, 255, 0]);

/// Radius of the dot drawn for markers and aim points.
const DOT_RADIUS: i32 = 5;
const FONT_SIZE: f64 = 14.0;

fn hex(color: Rgb<u8>) -> String {
    let [r, g, b] = color.0;
    format!("#{r:02x}{g:02x}{b:02x}")
}

/// SVG user units put integer coordinates on pixel corners; shift to the
/// pixel centre so a shape centred on (x, y) covers that pixel.
fn px(v: i32) -> f64 {
    v as f64 + 0.5
}

fn circle(svg: &mut String, center: (i32, i32), radius: i32, color: Rgb<u8>, width: f64) {
    if radius <= 0 {
        return;
    }
    let _ = write!(
        svg,
        r#"<circle cx="{}" cy="{}" r="{radius}" fill="none" stroke="{}" stroke-width="{width}"/>"#,
        px(center.0),
        px(center.1),
        hex(color)
    );
}

fn disc(svg: &mut String, center: (i32, i32), radius: i32, color: Rgb<u8>) {
    let _ = write!(
        svg,
        r#"<circle cx="{}" cy="{}" r="{radius}" fill="{}"/>"#,
        px(center.0),
        px(center.1),
        hex(color)
    );
}

fn line(svg: &mut String, from: (i32, i32), to: (i32, i32), color: Rgb<u8>) {
    let _ = write!(
        svg,
        r#"<line x1="{}" y1="{}" x2="{}" y2="{}" stroke="{}" stroke-width="2" stroke-linecap="round"/>"#,
        px(from.0),
        px(from.1),
        px(to.0),
        px(to.1),
        hex(color)
    );
}

fn text(svg: &mut String, at: (i32, i32), color: Rgb<u8>, weight: &str, label: &str) {
    let _ = write!(
        svg,
        r#"<text x="{}" y="{}" font-size="{FONT_SIZE}" font-weight="{weight}" fill="{}">{label}</text>"#,
        at.0,
        at.1,
        hex(color)
    );
}

/// HUD for one tick as an SVG document, or `None` for a skipped tick.
///
/// Deadband circle at the frame centre and the mode label. With a target:
/// a line from the raw target to the compensated aim point when they differ,
/// then the target itself (marker dot with its distance label, or blob
/// circle).
pub fn hud_svg(width: u32, height: u32, report: &TickReport, tolerance_px: i32) -> Option<String> {
    let center = report.frame_center?;

    let mut svg = format!(
        r#"<svg xmlns="http://www.w3.org/2000/svg" width="{width}" height="{height}" viewBox="0 0 {width} {height}">"#
    );
    circle(&mut svg, center, tolerance_px, DEADBAND_COLOR, 1.0);

    if let Some(detection) = report.detection {
        let target = (detection.x, detection.y);

        if let Some(aim) = report.aim_point
            && aim != target
        {
            line(&mut svg, target, aim, BALLISTIC_COLOR);
            disc(&mut svg, aim, DOT_RADIUS, BALLISTIC_COLOR);
        }

        match detection.distance_cm {
            Some(distance) => {
                disc(&mut svg, target, DOT_RADIUS, TARGET_COLOR);
                let label = format!("{distance:.0} cm");
                text(&mut svg, (target.0 + 8, target.1 - 8), TARGET_COLOR, "normal", &label);
            }
            None => {
                circle(&mut svg, target, detection.extent, TARGET_COLOR, 2.0);
                disc(&mut svg, target, 2, TARGET_COLOR);
            }
        }
    }

    let label = format!("Mode: {}", report.mode);
    text(&mut svg, (10, 22), MODE_LABEL_COLOR, "bold", &label);

    svg.push_str("</svg>");
    Some(svg)
}

/// Rasterises HUD overlays onto frames.
///
/// Holds the font database so system fonts are only scanned once.
pub struct HudRenderer {
    options: Options<'static>,
}

impl Default for HudRenderer {
    fn default() -> Self {
        Self::new()
    }
}

impl HudRenderer {
    pub fn new() -> Self {
        let mut fontdb = fontdb::Database::new();
        fontdb.load_system_fonts();

        let options = Options {
            fontdb: Arc::new(fontdb),
            font_family: "DejaVu Sans".to_string(),
            shape_rendering: usvg::ShapeRendering::CrispEdges,
            text_rendering: usvg::TextRendering::OptimizeLegibility,
            ..Default::default()
        };
        Self { options }
    }

    /// Draw the HUD for one tick. Skipped ticks draw nothing.
    pub fn draw(&self, image: &mut RgbImage, report: &TickReport, tolerance_px: i32) -> Result<()> {
        match hud_svg(image.width(), image.height(), report, tolerance_px) {
            Some(svg) => self.overlay(image, &svg),
            None => Ok(()),
        }
    }

    /// Render `svg_data` and blend it over `image` in place.
    pub fn overlay(&self, image: &mut RgbImage, svg_data: &str) -> Result<()> {
        let tree = Tree::from_str(svg_data, &self.options)
            .map_err(|e| TurretError::Overlay(format!("failed to parse HUD: {e}")))?;

        let mut pixmap = Pixmap::new(image.width(), image.height())
            .ok_or_else(|| TurretError::Overlay("frame has no pixels".to_string()))?;
        resvg::render(&tree, Transform::identity(), &mut pixmap.as_mut());

        for (x, y, pixel) in image.enumerate_pixels_mut() {
            let Some(overlay) = pixmap.pixel(x, y) else {
                continue;
            };
            if overlay.alpha() == 0 {
                continue;
            }
            let overlay = overlay.demultiply();
            let alpha = overlay.alpha();
            *pixel = Rgb([
                blend_channel(pixel[0], overlay.red(), alpha),
                blend_channel(pixel[1], overlay.green(), alpha),
                blend_channel(pixel[2], overlay.blue(), alpha),
            ]);
        }
        Ok(())
    }
}

fn blend_channel(base: u8, overlay: u8, alpha: u8) -> u8 {
    let alpha = alpha as f32 / 255.0;
    (base as f32 * (1.0 - alpha) + overlay as f32 * alpha).round() as u8
}

/// Window title text: mode plus the last distance estimate, if any.
pub fn hud_title(report: &TickReport) -> String {
    match report.detection.and_then(|d| d.distance_cm) {
        Some(distance) => format!("Mode: {} | Dist: {distance:.1} cm", report.mode),
        None => format!("Mode: {}", report.mode),
    }
}
