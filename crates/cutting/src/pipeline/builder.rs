use crate::{
    edges::ShapeConfig,
    error::Result,
    normalize::{FillPolicy, NormalizationConfig},
    overlay::OverlayStyle,
    pipeline::{CutterConfig, PuzzleCutter},
    scale::ScaleConfig,
};

/// Builder for configuring a [`PuzzleCutter`] with a fluent API
#[derive(Debug, Clone, Default)]
pub struct PuzzleCutterBuilder {
    config: CutterConfig,
}

impl PuzzleCutterBuilder {
    /// Create a new builder with default settings
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from an existing configuration
    pub fn from_config(config: CutterConfig) -> Self {
        Self { config }
    }

    /// Set the tab shape bounds
    pub fn with_shape(mut self, shape: ShapeConfig) -> Self {
        self.config.shape = shape;
        self
    }

    pub fn with_scale(mut self, scale: ScaleConfig) -> Self {
        self.config.scale = scale;
        self
    }

    /// Cut images at their original resolution
    pub fn without_scaling(mut self) -> Self {
        self.config.scale.enabled = false;
        self
    }

    pub fn with_overlay(mut self, style: OverlayStyle) -> Self {
        self.config.overlay = Some(style);
        self
    }

    /// Skip `lines.png` and `lines.svg`
    pub fn without_overlay(mut self) -> Self {
        self.config.overlay = None;
        self
    }

    /// Crop, resize and pad every piece onto a uniform canvas
    pub fn with_normalization(mut self, piece_size: u32, fill: FillPolicy) -> Self {
        self.config.normalization = NormalizationConfig {
            enabled: true,
            piece_size,
            fill,
        };
        self
    }

    pub fn with_max_pieces(mut self, max_pieces: u32) -> Self {
        self.config.max_pieces = max_pieces;
        self
    }

    /// Validate the configuration and build the cutter
    pub fn build(self) -> Result<PuzzleCutter> {
        PuzzleCutter::new(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CutError;

    #[test]
    fn test_builder_settings() {
        let cutter = PuzzleCutterBuilder::new()
            .without_overlay()
            .without_scaling()
            .with_max_pieces(50)
            .build()
            .unwrap();
        let config = cutter.config();
        assert!(config.overlay.is_none());
        assert!(!config.scale.enabled);
        assert_eq!(config.max_pieces, 50);
        assert!(cutter.generate_edges(jigsaw_common::GridSize::new(8, 8), 1).is_err());
    }

    #[test]
    fn test_builder_rejects_bad_shape() {
        let shape = ShapeConfig {
            amplitude_min: 0.3,
            amplitude_max: 0.2,
            ..ShapeConfig::default()
        };
        assert!(matches!(
            PuzzleCutterBuilder::new().with_shape(shape).build(),
            Err(CutError::InvalidShape(_))
        ));
        assert!(
            PuzzleCutterBuilder::new()
                .with_normalization(0, FillPolicy::Black)
                .build()
                .is_err()
        );
    }
}
