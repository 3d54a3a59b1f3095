use std::borrow::Cow;

use image::RgbaImage;
use image::imageops::{self, FilterType};
use jigsaw_common::GridSize;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// When to upsample a source image before cutting
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct ScaleConfig {
    pub enabled: bool,
    /// Minimum length of the longest side, in pixels
    pub min_long_side: u32,
    /// Minimum length of the shorter cell side, in pixels
    pub min_cell_size: u32,
    /// Upscaling never grows the longest side past this
    pub max_long_side: u32,
}

impl Default for ScaleConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            min_long_side: 2000,
            min_cell_size: 64,
            max_long_side: 8192,
        }
    }
}

impl ScaleConfig {
    /// Upscale factor for an image of `width`x`height` cut into `size`; 1.0 means untouched.
    pub fn factor(&self, width: u32, height: u32, size: GridSize) -> f64 {
        if !self.enabled || width == 0 || height == 0 {
            return 1.0;
        }
        let long_side = width.max(height) as f64;
        let min_cell = (width as f64 / size.columns.max(1) as f64)
            .min(height as f64 / size.rows.max(1) as f64);

        let by_side = self.min_long_side as f64 / long_side;
        let by_cell = self.min_cell_size as f64 / min_cell;
        let mut factor = by_side.max(by_cell);
        if long_side * factor > self.max_long_side as f64 {
            factor = self.max_long_side as f64 / long_side;
        }
        factor.max(1.0)
    }
}

/// Result of [`upscale`]
#[derive(Debug)]
pub struct ScaledImage<'a> {
    pub image: Cow<'a, RgbaImage>,
    pub factor: f64,
}

impl ScaledImage<'_> {
    pub fn is_scaled(&self) -> bool {
        matches!(self.image, Cow::Owned(_))
    }
}

/// Lanczos3 upsample when the image or its cells are under the thresholds
pub fn upscale<'a>(source: &'a RgbaImage, size: GridSize, config: &ScaleConfig) -> ScaledImage<'a> {
    let (width, height) = source.dimensions();
    let factor = config.factor(width, height, size);
    if factor <= 1.0 {
        return ScaledImage {
            image: Cow::Borrowed(source),
            factor: 1.0,
        };
    }

    let new_width = ((width as f64 * factor).round() as u32).max(1);
    let new_height = ((height as f64 * factor).round() as u32).max(1);
    debug!(
        "Upscaling {}x{} -> {}x{} (factor {:.3})",
        width, height, new_width, new_height, factor
    );
    ScaledImage {
        image: Cow::Owned(imageops::resize(source, new_width, new_height, FilterType::Lanczos3)),
        factor,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_large_image_untouched() {
        let source = RgbaImage::new(2400, 1600);
        let scaled = upscale(&source, GridSize::new(4, 6), &ScaleConfig::default());
        assert!(!scaled.is_scaled());
        assert_eq!(scaled.factor, 1.0);
    }

    #[test]
    fn test_small_image_upscaled() {
        let source = RgbaImage::new(500, 250);
        let scaled = upscale(&source, GridSize::new(2, 4), &ScaleConfig::default());
        assert!(scaled.is_scaled());
        assert_eq!(scaled.image.dimensions(), (2000, 1000));
        assert!((scaled.factor - 4.0).abs() < 1e-12);
    }

    #[test]
    fn test_cell_size_drives_factor() {
        let config = ScaleConfig::default();
        // 2000 px wide, 100 columns: 20 px cells need a factor of 3.2
        let factor = config.factor(2000, 1000, GridSize::new(50, 100));
        assert!((factor - 3.2).abs() < 1e-12);
    }

    #[test]
    fn test_factor_is_capped() {
        let config = ScaleConfig {
            max_long_side: 3000,
            ..ScaleConfig::default()
        };
        let factor = config.factor(1000, 1000, GridSize::new(100, 100));
        assert!((factor - 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_disabled() {
        let config = ScaleConfig {
            enabled: false,
            ..ScaleConfig::default()
        };
        assert_eq!(config.factor(10, 10, GridSize::new(1, 2)), 1.0);
    }
}
