//! # Cutting - Jigsaw Piece Engine
//!
//! Generates shared, interlocking bezier edges for a grid, assembles closed
//! piece outlines from them and clips piece bitmaps out of source images.
//!
//! ## Pipeline
//!
//! 1. [`edges::EdgeSet::generate`] draws every internal edge once from an
//!    explicit seed and freezes it.
//! 2. [`outline::PieceOutline`] walks four sides per piece, reusing each
//!    shared edge forward or reversed.
//! 3. [`clip::clip_piece`] rasterizes the outline into an anti-aliased mask.
//! 4. Optionally [`normalize`] pads pieces onto a uniform canvas.
//!
//! ## Example
//!
//! ```rust
//! use cutting::{CancellationToken, MemorySink, MemorySource, PuzzleCutter, PuzzleJob};
//! use image::{Rgba, RgbaImage};
//! use jigsaw_common::GridSize;
//!
//! let cutter = PuzzleCutter::builder().without_scaling().build().unwrap();
//! let edges = cutter.generate_edges(GridSize::new(2, 3), 42).unwrap();
//!
//! let source = MemorySource::new("demo", RgbaImage::from_pixel(300, 200, Rgba([200, 80, 40, 255])));
//! let sink = MemorySink::new();
//! let job = PuzzleJob { puzzle_id: "demo", source: &source, requested_pieces: None };
//! let outcome = cutter.cut(job, &edges, &sink, &CancellationToken::new()).unwrap();
//! assert_eq!(outcome.metadata.piece_count, 6);
//! ```

pub mod batch;
pub mod clip;
pub mod edges;
pub mod error;
pub mod normalize;
pub mod outline;
pub mod overlay;
pub mod pipeline;
pub mod scale;
pub mod sources;

pub use batch::{BatchJob, BatchRunner, BatchSummary, CancellationToken, JobReport};
pub use clip::{ClippedPiece, clip_piece};
pub use edges::{Edge, EdgeId, EdgeOrientation, EdgeSet, ShapeConfig};
pub use error::{CutError, Result};
pub use normalize::{FillPolicy, NormalizationConfig, NormalizedCanvas};
pub use outline::{BoundarySide, PieceOutline, Traversal};
pub use overlay::OverlayStyle;
pub use pipeline::{CutOutcome, CutterConfig, GridRequest, PieceFailure, PuzzleCutter, PuzzleJob};
pub use scale::ScaleConfig;
pub use sources::{DirectorySink, FileSource, MemorySink, MemorySource, Sink, Source};
