//! Cutting piece bitmaps out of the source image.

use image::{Rgba, RgbaImage};
use jigsaw_common::{GridSpec, PieceMetadata, PixelBox, utils::piece_filename};
use kurbo::{BezPath, PathEl};
use tiny_skia::{FillRule, Mask, PathBuilder, Transform};
use tracing::trace;

use crate::edges::EdgeSet;
use crate::error::{CutError, Result};
use crate::outline::PieceOutline;

/// A clipped piece bitmap with its metadata
#[derive(Debug, Clone)]
pub struct ClippedPiece {
    pub image: RgbaImage,
    pub metadata: PieceMetadata,
}

/// Convert a kurbo path to tiny-skia, shifted by `(-dx, -dy)`
pub(crate) fn skia_path(path: &BezPath, dx: f64, dy: f64) -> Option<tiny_skia::Path> {
    let x = |v: f64| (v - dx) as f32;
    let y = |v: f64| (v - dy) as f32;
    let mut builder = PathBuilder::new();
    for el in path.elements() {
        match *el {
            PathEl::MoveTo(p) => builder.move_to(x(p.x), y(p.y)),
            PathEl::LineTo(p) => builder.line_to(x(p.x), y(p.y)),
            PathEl::QuadTo(p1, p2) => builder.quad_to(x(p1.x), y(p1.y), x(p2.x), y(p2.y)),
            PathEl::CurveTo(p1, p2, p3) => {
                builder.cubic_to(x(p1.x), y(p1.y), x(p2.x), y(p2.y), x(p3.x), y(p3.y))
            }
            PathEl::ClosePath => builder.close(),
        }
    }
    builder.finish()
}

/// Bounding box of a piece: its cell grown by the largest possible tab overshoot
pub fn piece_bounds(grid: &GridSpec, edges: &EdgeSet, row: u32, col: u32) -> PixelBox {
    let overshoot = edges.shape.max_overshoot();
    grid.expanded_cell(
        row,
        col,
        overshoot * grid.cell_width(),
        overshoot * grid.cell_height(),
    )
}

/// Clip piece `(row, col)` out of `source`.
///
/// Only the bounding-box region is copied; pixels outside the outline become
/// transparent and boundary pixels carry anti-aliased coverage.
pub fn clip_piece(
    source: &RgbaImage,
    grid: &GridSpec,
    edges: &EdgeSet,
    row: u32,
    col: u32,
) -> Result<ClippedPiece> {
    if source.dimensions() != (grid.image_width, grid.image_height) {
        return Err(CutError::Raster(format!(
            "grid expects a {}x{} image, got {}x{}",
            grid.image_width,
            grid.image_height,
            source.width(),
            source.height()
        )));
    }

    let id = grid.size.piece_id(row, col);
    let bounds = piece_bounds(grid, edges, row, col);
    if bounds.is_empty() {
        return Err(CutError::ClipFailure {
            piece: id,
            reason: "empty bounding box".to_string(),
        });
    }

    let outline = PieceOutline::new(grid.size, row, col);
    let path = outline.to_bez_path(edges, grid)?;
    let path = skia_path(&path, bounds.x1 as f64, bounds.y1 as f64).ok_or_else(|| {
        CutError::ClipFailure {
            piece: id,
            reason: "outline could not be converted to a raster path".to_string(),
        }
    })?;

    let width = bounds.width();
    let height = bounds.height();
    let mut mask = Mask::new(width, height).ok_or_else(|| {
        CutError::Raster(format!("failed to allocate {}x{} mask", width, height))
    })?;
    mask.fill_path(&path, FillRule::Winding, true, Transform::identity());
    let coverage = mask.data();

    if coverage.iter().all(|c| *c == 0) {
        return Err(CutError::ClipFailure {
            piece: id,
            reason: "outline covers no pixels".to_string(),
        });
    }

    let mut image = RgbaImage::new(width, height);
    for (x, y, pixel) in image.enumerate_pixels_mut() {
        let cov = coverage[(y * width + x) as usize] as u32;
        if cov == 0 {
            continue;
        }
        let src = source.get_pixel(bounds.x1 + x, bounds.y1 + y);
        let alpha = (src[3] as u32 * cov + 127) / 255;
        *pixel = Rgba([src[0], src[1], src[2], alpha as u8]);
    }
    trace!("Clipped piece {} ({}x{})", id, width, height);

    let metadata = PieceMetadata {
        id,
        row,
        col,
        filename: piece_filename(id),
        x1: bounds.x1,
        y1: bounds.y1,
        x2: bounds.x2,
        y2: bounds.y2,
        width,
        height,
        kind: grid.size.kind(row, col),
        neighbours: grid.size.neighbors(row, col),
    };

    Ok(ClippedPiece { image, metadata })
}
