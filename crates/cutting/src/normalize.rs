//! Uniform piece canvases for training data.
//!
//! The source is cropped to the grid's aspect ratio and resized so every
//! cell is exactly `piece_size` pixels square. Clipped pieces are then
//! padded onto a square canvas whose side depends only on the configuration:
//!
//! ```text
//! side = piece_size + 2 * ceil(max_overshoot * piece_size)
//! ```

use image::imageops::{self, FilterType};
use image::{Rgba, RgbaImage};
use jigsaw_common::{CanvasInfo, GridSize, PixelBox};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString, IntoStaticStr, VariantNames};
use tracing::debug;

use crate::clip::ClippedPiece;
use crate::edges::ShapeConfig;
use crate::error::{CutError, Result};

/// How the canvas around a piece is filled
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq,
    Serialize, Deserialize, JsonSchema,
    Display, EnumString, EnumIter, VariantNames, IntoStaticStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum FillPolicy {
    /// Transparent
    #[default]
    None,
    Black,
    White,
    /// Mean color of the un-normalized source
    Average,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct NormalizationConfig {
    pub enabled: bool,
    /// Side of one grid cell after resizing, in pixels
    pub piece_size: u32,
    pub fill: FillPolicy,
}

impl Default for NormalizationConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            piece_size: 128,
            fill: FillPolicy::None,
        }
    }
}

impl NormalizationConfig {
    pub fn validate(&self) -> Result<()> {
        if self.piece_size == 0 {
            return Err(CutError::InvalidShape(
                "normalization piece_size must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Fixed square canvas shared by every piece of every normalized puzzle
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NormalizedCanvas {
    pub size: u32,
    pub margin: u32,
    pub piece_size: u32,
    pub fill: Rgba<u8>,
}

impl NormalizedCanvas {
    pub fn new(piece_size: u32, shape: &ShapeConfig, fill: Rgba<u8>) -> Self {
        let margin = Self::margin_for(piece_size, shape);
        Self {
            size: piece_size + 2 * margin,
            margin,
            piece_size,
            fill,
        }
    }

    pub fn margin_for(piece_size: u32, shape: &ShapeConfig) -> u32 {
        (shape.max_overshoot() * piece_size as f64).ceil() as u32
    }

    pub fn info(&self) -> CanvasInfo {
        CanvasInfo {
            size: self.size,
            piece_size: self.piece_size,
            margin: self.margin,
        }
    }

    /// Place a piece clipped from the normalized image so its cell is centered.
    pub fn pad(&self, piece: &ClippedPiece) -> RgbaImage {
        let meta = &piece.metadata;
        let cell_x = meta.col as i64 * self.piece_size as i64;
        let cell_y = meta.row as i64 * self.piece_size as i64;
        let offset_x = self.margin as i64 + meta.x1 as i64 - cell_x;
        let offset_y = self.margin as i64 + meta.y1 as i64 - cell_y;
        let (width, height) = piece.image.dimensions();

        assert!(
            offset_x >= 0
                && offset_y >= 0
                && offset_x + width as i64 <= self.size as i64
                && offset_y + height as i64 <= self.size as i64,
            "piece {} ({}x{} at {},{}) does not fit the {}px canvas",
            meta.id,
            width,
            height,
            offset_x,
            offset_y,
            self.size
        );

        let mut canvas = RgbaImage::from_pixel(self.size, self.size, self.fill);
        imageops::overlay(&mut canvas, &piece.image, offset_x, offset_y);
        canvas
    }

    /// The normalized image padded by the canvas margin
    pub fn preview(&self, normalized: &RgbaImage) -> RgbaImage {
        let (width, height) = normalized.dimensions();
        let mut canvas = RgbaImage::from_pixel(
            width + 2 * self.margin,
            height + 2 * self.margin,
            self.fill,
        );
        imageops::overlay(&mut canvas, normalized, self.margin as i64, self.margin as i64);
        canvas
    }
}

/// Centered crop with the grid's columns:rows aspect.
///
/// The cropped side is rounded up, so it may keep one pixel more than the
/// exact ratio, but never reaches past the source.
pub fn crop_box(width: u32, height: u32, size: GridSize) -> PixelBox {
    let (w, h) = (width as u64, height as u64);
    let (rows, columns) = (size.rows as u64, size.columns as u64);
    let (crop_w, crop_h) = if w * rows > h * columns {
        (((h * columns).div_ceil(rows)).min(w), h)
    } else {
        (w, ((w * rows).div_ceil(columns)).min(h))
    };
    let x1 = ((w - crop_w) / 2) as u32;
    let y1 = ((h - crop_h) / 2) as u32;
    PixelBox {
        x1,
        y1,
        x2: x1 + crop_w as u32,
        y2: y1 + crop_h as u32,
    }
}

/// Crop to aspect and resize to exactly `columns*piece_size x rows*piece_size`
pub fn normalize_source(source: &RgbaImage, size: GridSize, piece_size: u32) -> RgbaImage {
    let crop = crop_box(source.width(), source.height(), size);
    let target_width = size.columns * piece_size;
    let target_height = size.rows * piece_size;
    debug!(
        "Normalizing {}x{}: crop {:?}, resize to {}x{}",
        source.width(),
        source.height(),
        crop,
        target_width,
        target_height
    );
    let cropped = imageops::crop_imm(source, crop.x1, crop.y1, crop.width(), crop.height()).to_image();
    imageops::resize(&cropped, target_width, target_height, FilterType::Lanczos3)
}

/// Mean color of an image weighted by alpha, returned opaque.
///
/// Fully transparent images average to black.
pub fn average_color(image: &RgbaImage) -> Rgba<u8> {
    let mut sums = [0u64; 3];
    let mut weight = 0u64;
    for pixel in image.pixels() {
        let alpha = pixel[3] as u64;
        for (sum, channel) in sums.iter_mut().zip(pixel.0.iter()) {
            *sum += *channel as u64 * alpha;
        }
        weight += alpha;
    }
    if weight == 0 {
        return Rgba([0, 0, 0, 255]);
    }
    let mean = |sum: u64| ((sum + weight / 2) / weight) as u8;
    Rgba([mean(sums[0]), mean(sums[1]), mean(sums[2]), 255])
}

/// Canvas fill for `policy`; `source` is the image before normalization
pub fn fill_color(policy: FillPolicy, source: &RgbaImage) -> Rgba<u8> {
    match policy {
        FillPolicy::None => Rgba([0, 0, 0, 0]),
        FillPolicy::Black => Rgba([0, 0, 0, 255]),
        FillPolicy::White => Rgba([255, 255, 255, 255]),
        FillPolicy::Average => average_color(source),
    }
}
