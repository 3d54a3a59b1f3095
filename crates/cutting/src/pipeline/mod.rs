pub mod builder;

use std::borrow::Cow;

use image::RgbaImage;
use jigsaw_common::{
    DEFAULT_MAX_PIECES, GridSize, GridSpec, PieceMetadata, PuzzleMetadata,
};
use rayon::prelude::*;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::{
    batch::CancellationToken,
    clip::clip_piece,
    edges::{EdgeSet, ShapeConfig},
    error::{CutError, Result},
    normalize::{NormalizationConfig, NormalizedCanvas, fill_color, normalize_source},
    overlay::{OverlayStyle, lines_svg, render_overlay},
    scale::{ScaleConfig, upscale},
    sources::{Sink, Source},
};

pub const METADATA_FILE: &str = "metadata.json";
pub const LINES_PNG: &str = "lines.png";
pub const LINES_SVG: &str = "lines.svg";
pub const NORMALIZED_PNG: &str = "normalized.png";
pub const EDGES_FILE: &str = "edges.json";
pub const PIECES_DIR: &str = "pieces";

/// How the grid of a cut is chosen
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GridRequest {
    /// Explicit rows and columns
    Dimensions { rows: u32, columns: u32 },
    /// Rows and columns picked to approximate a piece count for the image aspect
    PieceCount { pieces: u32 },
}

impl GridRequest {
    pub fn resolve(&self, width: u32, height: u32, max_pieces: u32) -> Result<GridSize> {
        let size = match *self {
            GridRequest::Dimensions { rows, columns } => GridSize::new(rows, columns),
            GridRequest::PieceCount { pieces } => {
                GridSize::for_piece_count(width, height, pieces, max_pieces)?
            }
        };
        size.validate(max_pieces)?;
        Ok(size)
    }

    pub fn requested_pieces(&self) -> Option<u32> {
        match *self {
            GridRequest::Dimensions { .. } => None,
            GridRequest::PieceCount { pieces } => Some(pieces),
        }
    }
}

impl Default for GridRequest {
    fn default() -> Self {
        GridRequest::Dimensions {
            rows: 4,
            columns: 6,
        }
    }
}

/// Everything that shapes a cut besides the seed and the grid
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct CutterConfig {
    pub shape: ShapeConfig,
    pub scale: ScaleConfig,
    /// `None` skips `lines.png` and `lines.svg`
    pub overlay: Option<OverlayStyle>,
    pub normalization: NormalizationConfig,
    pub max_pieces: u32,
}

impl Default for CutterConfig {
    fn default() -> Self {
        Self {
            shape: ShapeConfig::default(),
            scale: ScaleConfig::default(),
            overlay: Some(OverlayStyle::default()),
            normalization: NormalizationConfig::default(),
            max_pieces: DEFAULT_MAX_PIECES,
        }
    }
}

impl CutterConfig {
    pub fn validate(&self) -> Result<()> {
        self.shape.validate()?;
        self.normalization.validate()?;
        Ok(())
    }
}

/// One image to cut
#[derive(Debug, Clone, Copy)]
pub struct PuzzleJob<'a> {
    pub puzzle_id: &'a str,
    pub source: &'a dyn Source,
    pub requested_pieces: Option<u32>,
}

/// A piece that could not be clipped
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PieceFailure {
    pub piece: usize,
    pub reason: String,
}

#[derive(Debug, Clone)]
pub struct CutOutcome {
    pub metadata: PuzzleMetadata,
    pub failures: Vec<PieceFailure>,
    pub scale_factor: f64,
}

/// Cuts images along a frozen edge set and writes the results to a sink
#[derive(Debug, Clone)]
pub struct PuzzleCutter {
    config: CutterConfig,
}

impl PuzzleCutter {
    /// Create a new cutter builder
    pub fn builder() -> builder::PuzzleCutterBuilder {
        builder::PuzzleCutterBuilder::new()
    }

    pub fn new(config: CutterConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &CutterConfig {
        &self.config
    }

    pub fn generate_edges(&self, size: GridSize, seed: u64) -> Result<EdgeSet> {
        EdgeSet::generate(size, seed, &self.config.shape, self.config.max_pieces)
    }

    /// Cut one image. Pieces are clipped in parallel; a piece that fails to
    /// clip is recorded and left out, anything else aborts the image.
    pub fn cut(
        &self,
        job: PuzzleJob<'_>,
        edges: &EdgeSet,
        sink: &dyn Sink,
        cancel: &CancellationToken,
    ) -> Result<CutOutcome> {
        if cancel.is_cancelled() {
            return Err(CutError::Cancelled);
        }
        let size = edges.size;
        let source = job.source.load()?;
        let (source_width, source_height) = source.dimensions();
        GridSpec::with_limit(size, source_width, source_height, self.config.max_pieces)?;
        debug!("Cutting {} as {}x{}", job.source.description(), size.rows, size.columns);

        let normalization = &self.config.normalization;
        let (working, canvas, scale_factor): (Cow<'_, RgbaImage>, _, f64) = if normalization.enabled {
            let canvas = NormalizedCanvas::new(
                normalization.piece_size,
                &edges.shape,
                fill_color(normalization.fill, &source),
            );
            let normalized = normalize_source(&source, size, normalization.piece_size);
            (Cow::Owned(normalized), Some(canvas), 1.0)
        } else {
            let scaled = upscale(&source, size, &self.config.scale);
            (scaled.image, None, scaled.factor)
        };

        let grid = GridSpec::with_limit(size, working.width(), working.height(), self.config.max_pieces)?;

        let results: Vec<Result<PieceMetadata>> = (0..size.piece_count())
            .into_par_iter()
            .map(|id| {
                if cancel.is_cancelled() {
                    return Err(CutError::Cancelled);
                }
                let (row, col) = size.position(id);
                let piece = clip_piece(&working, &grid, edges, row, col)?;
                let mut metadata = piece.metadata.clone();
                let relative = format!("{}/{}", PIECES_DIR, metadata.filename);
                match &canvas {
                    Some(canvas) => {
                        let padded = canvas.pad(&piece);
                        metadata.width = padded.width();
                        metadata.height = padded.height();
                        sink.write_image(job.puzzle_id, &relative, &padded)?;
                    }
                    None => {
                        sink.write_image(job.puzzle_id, &relative, &piece.image)?;
                    }
                }
                Ok(metadata)
            })
            .collect();

        let mut pieces = Vec::with_capacity(results.len());
        let mut failures = Vec::new();
        for result in results {
            match result {
                Ok(metadata) => pieces.push(metadata),
                Err(CutError::ClipFailure { piece, reason }) => {
                    warn!("{}: skipping piece {}: {}", job.puzzle_id, piece, reason);
                    failures.push(PieceFailure { piece, reason });
                }
                Err(e) => return Err(e),
            }
        }

        if let Some(style) = &self.config.overlay {
            // Lines go back to the source resolution unless the image was normalized
            let output_size = if canvas.is_some() {
                working.dimensions()
            } else {
                (source_width, source_height)
            };
            let lines = render_overlay(&working, &grid, edges, style, output_size)?;
            sink.write_image(job.puzzle_id, LINES_PNG, &lines)?;
            let svg_grid = grid.resized(output_size.0, output_size.1);
            sink.write_text(job.puzzle_id, LINES_SVG, &lines_svg(edges, &svg_grid, style))?;
        }

        if let Some(canvas) = &canvas {
            sink.write_image(job.puzzle_id, NORMALIZED_PNG, &canvas.preview(&working))?;
        }

        let warning = if failures.is_empty() {
            None
        } else {
            let missing: Vec<String> = failures.iter().map(|f| f.piece.to_string()).collect();
            Some(format!("Missing pieces: {}", missing.join(", ")))
        };

        let metadata = PuzzleMetadata {
            puzzle_id: job.puzzle_id.to_string(),
            cut_id: edges.cut_id(),
            piece_count: pieces.len(),
            image_width: grid.image_width,
            image_height: grid.image_height,
            requested_pieces: job.requested_pieces,
            rows: size.rows,
            columns: size.columns,
            seed: edges.seed,
            canvas: canvas.map(|canvas| canvas.info()),
            pieces,
            warning,
        };
        sink.write_text(job.puzzle_id, METADATA_FILE, &metadata.to_json()?)?;

        info!(
            "Cut {} into {} pieces ({} failed)",
            job.puzzle_id,
            metadata.piece_count,
            failures.len()
        );

        Ok(CutOutcome {
            metadata,
            failures,
            scale_factor,
        })
    }
}
