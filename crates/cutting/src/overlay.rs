//! Preview renderings of the cut lines.

use std::fmt::Write as _;

use image::imageops::{self, FilterType};
use image::{Rgba, RgbaImage};
use jigsaw_common::GridSpec;
use kurbo::{BezPath, PathEl, Point};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tiny_skia::{ColorU8, Paint, Pixmap, Stroke, Transform};

use crate::clip::skia_path;
use crate::edges::{Edge, EdgeSet};
use crate::error::{CutError, Result};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct OverlayStyle {
    /// Stroke width in pixels of the image the lines are drawn on
    pub width: f32,
    pub color: [u8; 4],
}

impl Default for OverlayStyle {
    fn default() -> Self {
        Self {
            width: 3.0,
            color: [0, 0, 0, 255],
        }
    }
}

/// Edge curve in pixel space
pub fn edge_path(edge: &Edge, grid: &GridSpec) -> BezPath {
    let cell_width = grid.cell_width();
    let cell_height = grid.cell_height();
    let to_pixels = |p: Point| Point::new(p.x * cell_width, p.y * cell_height);
    let mut path = BezPath::new();
    path.move_to(to_pixels(edge.start()));
    for seg in &edge.segments {
        path.curve_to(to_pixels(seg.p1), to_pixels(seg.p2), to_pixels(seg.p3));
    }
    path
}

/// Stroke every internal edge over `source`, laid out on `grid`.
///
/// `grid` must describe `source`. When `output_size` differs from the source
/// dimensions the result is resized to it, so lines drawn on an upscaled copy
/// come back at the original resolution.
pub fn render_overlay(
    source: &RgbaImage,
    grid: &GridSpec,
    edges: &EdgeSet,
    style: &OverlayStyle,
    output_size: (u32, u32),
) -> Result<RgbaImage> {
    let (width, height) = source.dimensions();
    if (grid.image_width, grid.image_height) != (width, height) || grid.size != edges.size {
        return Err(CutError::Raster(format!(
            "overlay grid {}x{} over {}x{} px does not match {}x{} px image with {}x{} edges",
            grid.size.rows,
            grid.size.columns,
            grid.image_width,
            grid.image_height,
            width,
            height,
            edges.size.rows,
            edges.size.columns
        )));
    }
    let mut pixmap = Pixmap::new(width, height)
        .ok_or_else(|| CutError::Raster(format!("failed to allocate {}x{} pixmap", width, height)))?;

    for (dst, src) in pixmap.pixels_mut().iter_mut().zip(source.pixels()) {
        *dst = ColorU8::from_rgba(src[0], src[1], src[2], src[3]).premultiply();
    }

    let mut paint = Paint::default();
    let [r, g, b, a] = style.color;
    paint.set_color_rgba8(r, g, b, a);
    paint.anti_alias = true;
    let stroke = Stroke {
        width: style.width,
        ..Stroke::default()
    };

    for edge in edges.iter() {
        if let Some(path) = skia_path(&edge_path(edge, grid), 0.0, 0.0) {
            pixmap.stroke_path(&path, &paint, &stroke, Transform::identity(), None);
        }
    }

    let rendered = RgbaImage::from_fn(width, height, |x, y| {
        let color = pixmap.pixels()[(y * width + x) as usize].demultiply();
        Rgba([color.red(), color.green(), color.blue(), color.alpha()])
    });

    if output_size == (width, height) {
        Ok(rendered)
    } else {
        Ok(imageops::resize(&rendered, output_size.0, output_size.1, FilterType::Lanczos3))
    }
}

/// The same lines as a standalone SVG document in the coordinates of `grid`
pub fn lines_svg(edges: &EdgeSet, grid: &GridSpec, style: &OverlayStyle) -> String {
    let [r, g, b, a] = style.color;
    let mut svg = String::new();
    let _ = writeln!(
        svg,
        r#"<svg xmlns="http://www.w3.org/2000/svg" width="{w}" height="{h}" viewBox="0 0 {w} {h}">"#,
        w = grid.image_width,
        h = grid.image_height
    );
    let _ = writeln!(
        svg,
        r#"<g fill="none" stroke="rgb({},{},{})" stroke-opacity="{:.3}" stroke-width="{}">"#,
        r,
        g,
        b,
        a as f32 / 255.0,
        style.width
    );
    for edge in edges.iter() {
        let mut d = String::new();
        for el in edge_path(edge, grid).elements() {
            match el {
                PathEl::MoveTo(p) => {
                    let _ = write!(d, "M{:.2} {:.2}", p.x, p.y);
                }
                PathEl::CurveTo(p1, p2, p3) => {
                    let _ = write!(
                        d,
                        " C{:.2} {:.2} {:.2} {:.2} {:.2} {:.2}",
                        p1.x, p1.y, p2.x, p2.y, p3.x, p3.y
                    );
                }
                _ => {}
            }
        }
        let _ = writeln!(svg, r#"<path d="{}"/>"#, d);
    }
    svg.push_str("</g>\n</svg>\n");
    svg
}
