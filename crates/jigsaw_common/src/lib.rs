//! # Jigsaw Common - Shared Types and Utilities
//!
//! Grid topology, piece metadata and small helpers shared by the cutting
//! engine, the dataset builder and the command line tool.
//!
//! ## Example
//!
//! ```rust
//! use jigsaw_common::{GridSize, GridSpec, PieceKind};
//!
//! let grid = GridSpec::new(GridSize::new(3, 3), 900, 600).unwrap();
//! assert_eq!(grid.size.piece_count(), 9);
//! assert_eq!(grid.size.internal_edge_count(), 12);
//! assert_eq!(grid.size.kind(1, 1), PieceKind::Interior);
//! println!("cell: {:.1} x {:.1}", grid.cell_width(), grid.cell_height());
//! ```

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString, IntoStaticStr};
use thiserror::Error;

/// Upper bound on `rows * columns` unless a caller configures another one.
pub const DEFAULT_MAX_PIECES: u32 = 10_000;

/// Result type for grid operations
pub type Result<T> = std::result::Result<T, GridError>;

/// Errors raised while validating a grid request
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GridError {
    #[error("Invalid grid {rows}x{columns}: rows and columns must be >= 1 and rows*columns <= {max_pieces}")]
    InvalidGrid {
        rows: u32,
        columns: u32,
        max_pieces: u32,
    },

    #[error("Invalid piece count {requested}: need at least 2 and at most {max_pieces}")]
    InvalidPieceCount { requested: u32, max_pieces: u32 },

    #[error("Image {width}x{height} is too small for a {rows}x{columns} grid")]
    ImageTooSmall {
        width: u32,
        height: u32,
        rows: u32,
        columns: u32,
    },
}

/// Position of a piece relative to the image border
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash,
    Serialize, Deserialize, JsonSchema,
    Display, EnumString, EnumIter, IntoStaticStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum PieceKind {
    Corner,
    Edge,
    Interior,
}

/// Grid topology: how many rows and columns a cut has
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
pub struct GridSize {
    pub rows: u32,
    pub columns: u32,
}

impl GridSize {
    pub fn new(rows: u32, columns: u32) -> Self {
        Self { rows, columns }
    }

    /// Reject empty grids and grids with more than `max_pieces` pieces
    pub fn validate(&self, max_pieces: u32) -> Result<()> {
        let pieces = self.rows as u64 * self.columns as u64;
        if self.rows < 1 || self.columns < 1 || pieces > max_pieces as u64 {
            return Err(GridError::InvalidGrid {
                rows: self.rows,
                columns: self.columns,
                max_pieces,
            });
        }
        Ok(())
    }

    pub fn piece_count(&self) -> usize {
        self.rows as usize * self.columns as usize
    }

    /// Number of boundaries shared by two pieces
    pub fn internal_edge_count(&self) -> usize {
        self.vertical_edge_count() + self.horizontal_edge_count()
    }

    /// Boundaries between left/right neighbours
    pub fn vertical_edge_count(&self) -> usize {
        self.rows as usize * (self.columns as usize).saturating_sub(1)
    }

    /// Boundaries between top/bottom neighbours
    pub fn horizontal_edge_count(&self) -> usize {
        (self.rows as usize).saturating_sub(1) * self.columns as usize
    }

    pub fn piece_id(&self, row: u32, col: u32) -> usize {
        row as usize * self.columns as usize + col as usize
    }

    pub fn position(&self, id: usize) -> (u32, u32) {
        let columns = self.columns as usize;
        ((id / columns) as u32, (id % columns) as u32)
    }

    /// Neighbour ids in ascending order
    pub fn neighbors(&self, row: u32, col: u32) -> Vec<usize> {
        let mut out = Vec::with_capacity(4);
        if row > 0 {
            out.push(self.piece_id(row - 1, col));
        }
        if col > 0 {
            out.push(self.piece_id(row, col - 1));
        }
        if col + 1 < self.columns {
            out.push(self.piece_id(row, col + 1));
        }
        if row + 1 < self.rows {
            out.push(self.piece_id(row + 1, col));
        }
        out
    }

    /// Number of image borders the piece touches
    pub fn border_count(&self, row: u32, col: u32) -> u32 {
        [
            row == 0,
            row + 1 == self.rows,
            col == 0,
            col + 1 == self.columns,
        ]
        .into_iter()
        .filter(|touches| *touches)
        .count() as u32
    }

    /// Two or more borders make a corner, so every piece of a 1xN strip is one.
    pub fn kind(&self, row: u32, col: u32) -> PieceKind {
        match self.border_count(row, col) {
            0 => PieceKind::Interior,
            1 => PieceKind::Edge,
            _ => PieceKind::Corner,
        }
    }

    /// Pick a grid close to `target` pieces whose cells are closest to square.
    pub fn for_piece_count(width: u32, height: u32, target: u32, max_pieces: u32) -> Result<Self> {
        if target < 2 || target > max_pieces {
            return Err(GridError::InvalidPieceCount {
                requested: target,
                max_pieces,
            });
        }
        let aspect = width.max(1) as f64 / height.max(1) as f64;
        let mut best: Option<(GridSize, f64)> = None;
        for rows in 1..=target {
            let ideal = target as f64 / rows as f64;
            for columns in [ideal.floor() as u32, ideal.ceil() as u32] {
                if columns == 0 || rows as u64 * columns as u64 > max_pieces as u64 {
                    continue;
                }
                let actual = rows * columns;
                let count_term = (actual as f64 - target as f64).abs() / target as f64;
                let cell_ratio = aspect * rows as f64 / columns as f64;
                let shape_term = cell_ratio.ln().abs();
                let score = count_term * 4.0 + shape_term;
                match &best {
                    Some((_, best_score)) if score >= *best_score => {}
                    _ => best = Some((GridSize::new(rows, columns), score)),
                }
            }
        }
        best.map(|(size, _)| size).ok_or(GridError::InvalidPieceCount {
            requested: target,
            max_pieces,
        })
    }
}

/// Grid topology bound to the pixel size of one source image
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct GridSpec {
    pub size: GridSize,
    pub image_width: u32,
    pub image_height: u32,
}

impl GridSpec {
    /// Create a grid with the default piece limit
    pub fn new(size: GridSize, image_width: u32, image_height: u32) -> Result<Self> {
        Self::with_limit(size, image_width, image_height, DEFAULT_MAX_PIECES)
    }

    /// Create a grid, requiring at least one pixel per cell
    pub fn with_limit(
        size: GridSize,
        image_width: u32,
        image_height: u32,
        max_pieces: u32,
    ) -> Result<Self> {
        size.validate(max_pieces)?;
        if image_width < size.columns || image_height < size.rows {
            return Err(GridError::ImageTooSmall {
                width: image_width,
                height: image_height,
                rows: size.rows,
                columns: size.columns,
            });
        }
        Ok(Self {
            size,
            image_width,
            image_height,
        })
    }

    /// Same topology over an image of another size
    pub fn resized(&self, image_width: u32, image_height: u32) -> Self {
        Self {
            size: self.size,
            image_width,
            image_height,
        }
    }

    pub fn cell_width(&self) -> f64 {
        self.image_width as f64 / self.size.columns as f64
    }

    pub fn cell_height(&self) -> f64 {
        self.image_height as f64 / self.size.rows as f64
    }

    /// Pixel position of grid corner (`row` in `0..=rows`, `col` in `0..=columns`).
    ///
    /// Every outline and every edge anchors on this function, so shared
    /// corners are bitwise equal no matter which piece asks.
    pub fn corner(&self, row: u32, col: u32) -> (f64, f64) {
        (col as f64 * self.cell_width(), row as f64 * self.cell_height())
    }

    /// Cell rectangle expanded by `margin_x`/`margin_y` pixels on each side,
    /// rounded outwards and clamped to the image.
    pub fn expanded_cell(&self, row: u32, col: u32, margin_x: f64, margin_y: f64) -> PixelBox {
        let (left, top) = self.corner(row, col);
        let (right, bottom) = self.corner(row + 1, col + 1);
        let clamp_x = |v: f64| v.clamp(0.0, self.image_width as f64) as u32;
        let clamp_y = |v: f64| v.clamp(0.0, self.image_height as f64) as u32;
        PixelBox {
            x1: clamp_x((left - margin_x).floor()),
            y1: clamp_y((top - margin_y).floor()),
            x2: clamp_x((right + margin_x).ceil()),
            y2: clamp_y((bottom + margin_y).ceil()),
        }
    }
}

/// Pixel rectangle, `x2`/`y2` exclusive
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct PixelBox {
    pub x1: u32,
    pub y1: u32,
    pub x2: u32,
    pub y2: u32,
}

impl PixelBox {
    pub fn width(&self) -> u32 {
        self.x2.saturating_sub(self.x1)
    }

    pub fn height(&self) -> u32 {
        self.y2.saturating_sub(self.y1)
    }

    pub fn is_empty(&self) -> bool {
        self.width() == 0 || self.height() == 0
    }

    pub fn contains(&self, x: u32, y: u32) -> bool {
        x >= self.x1 && x < self.x2 && y >= self.y1 && y < self.y2
    }
}

/// Metadata reported for one clipped piece
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct PieceMetadata {
    pub id: usize,
    pub row: u32,
    pub col: u32,
    pub filename: String,
    pub x1: u32,
    pub y1: u32,
    pub x2: u32,
    pub y2: u32,
    /// Width of the stored bitmap
    pub width: u32,
    /// Height of the stored bitmap
    pub height: u32,
    #[serde(rename = "type")]
    pub kind: PieceKind,
    pub neighbours: Vec<usize>,
}

impl PieceMetadata {
    pub fn bounds(&self) -> PixelBox {
        PixelBox {
            x1: self.x1,
            y1: self.y1,
            x2: self.x2,
            y2: self.y2,
        }
    }
}

/// Fixed canvas every normalized piece was padded onto
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct CanvasInfo {
    pub size: u32,
    pub piece_size: u32,
    pub margin: u32,
}

/// Everything written to `metadata.json` for one cut image
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct PuzzleMetadata {
    pub puzzle_id: String,
    /// Identifies the shared edge set; pieces of puzzles with equal cut ids
    /// and positions have identical shapes.
    pub cut_id: String,
    pub piece_count: usize,
    pub image_width: u32,
    pub image_height: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requested_pieces: Option<u32>,
    pub rows: u32,
    pub columns: u32,
    pub seed: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub canvas: Option<CanvasInfo>,
    pub pieces: Vec<PieceMetadata>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
}

impl PuzzleMetadata {
    pub fn grid_size(&self) -> GridSize {
        GridSize::new(self.rows, self.columns)
    }

    pub fn piece(&self, id: usize) -> Option<&PieceMetadata> {
        self.pieces.iter().find(|piece| piece.id == id)
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    pub fn from_json(content: &str) -> serde_json::Result<Self> {
        serde_json::from_str(content)
    }
}

/// Utility functions for file naming
pub mod utils {
    /// File name of a piece bitmap inside the `pieces/` directory
    pub fn piece_filename(id: usize) -> String {
        format!("piece_{}.png", id)
    }

    /// Check if a file extension indicates a decodable image
    pub fn is_image_file(filename: &str) -> bool {
        if let Some(ext) = std::path::Path::new(filename)
            .extension()
            .and_then(|ext| ext.to_str())
        {
            matches!(
                ext.to_lowercase().as_str(),
                "png" | "jpg" | "jpeg"
            )
        } else {
            false
        }
    }

    /// Puzzle id derived from an image path (its file stem)
    pub fn puzzle_id_from_path(path: &std::path::Path) -> String {
        path.file_stem()
            .and_then(|stem| stem.to_str())
            .map(|stem| stem.to_string())
            .unwrap_or_else(|| "puzzle".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_grid_counts() {
        for rows in 1..6 {
            for columns in 1..6 {
                let size = GridSize::new(rows, columns);
                assert_eq!(size.piece_count(), (rows * columns) as usize);
                assert_eq!(
                    size.internal_edge_count(),
                    (rows * (columns - 1) + (rows - 1) * columns) as usize
                );
            }
        }
    }

    #[test]
    fn test_invalid_grid() {
        assert!(GridSize::new(0, 3).validate(DEFAULT_MAX_PIECES).is_err());
        assert!(GridSize::new(3, 0).validate(DEFAULT_MAX_PIECES).is_err());
        assert!(GridSize::new(101, 100).validate(DEFAULT_MAX_PIECES).is_err());
        assert!(GridSize::new(100, 100).validate(DEFAULT_MAX_PIECES).is_ok());
    }

    #[test]
    fn test_classification_counts() {
        let size = GridSize::new(4, 6);
        let mut corners = 0;
        let mut edges = 0;
        let mut interior = 0;
        for row in 0..size.rows {
            for col in 0..size.columns {
                let neighbours = size.neighbors(row, col).len();
                match size.kind(row, col) {
                    PieceKind::Corner => {
                        corners += 1;
                        assert_eq!(neighbours, 2);
                    }
                    PieceKind::Edge => {
                        edges += 1;
                        assert_eq!(neighbours, 3);
                    }
                    PieceKind::Interior => {
                        interior += 1;
                        assert_eq!(neighbours, 4);
                    }
                }
            }
        }
        assert_eq!(corners, 4);
        assert_eq!(edges, 2 * (4 + 6) - 8);
        assert_eq!(interior, 24 - 4 - 12);
    }

    #[test]
    fn test_strip_grid() {
        let size = GridSize::new(1, 5);
        for col in 0..5 {
            assert!(size.neighbors(0, col).len() <= 2);
            assert_eq!(size.kind(0, col), PieceKind::Corner);
        }
        let pair = GridSize::new(1, 2);
        assert_eq!(pair.neighbors(0, 0), vec![1]);
        assert_eq!(pair.neighbors(0, 1), vec![0]);
    }

    #[test]
    fn test_corner_is_shared() {
        let grid = GridSpec::new(GridSize::new(3, 7), 1000, 701).unwrap();
        let (x, y) = grid.corner(2, 5);
        assert_eq!((x, y), grid.corner(2, 5));
        assert_eq!(grid.corner(3, 7), (1000.0, 701.0));
    }

    #[test]
    fn test_image_too_small() {
        let result = GridSpec::new(GridSize::new(10, 10), 5, 50);
        assert!(matches!(result, Err(GridError::ImageTooSmall { .. })));
    }

    #[test]
    fn test_expanded_cell_is_clamped() {
        let grid = GridSpec::new(GridSize::new(2, 2), 200, 100).unwrap();
        let corner = grid.expanded_cell(0, 0, 10.0, 10.0);
        assert_eq!(corner, PixelBox { x1: 0, y1: 0, x2: 110, y2: 60 });
        let inner = grid.expanded_cell(1, 1, 10.0, 10.0);
        assert_eq!(inner, PixelBox { x1: 90, y1: 40, x2: 200, y2: 100 });
    }

    #[test]
    fn test_for_piece_count() {
        let size = GridSize::for_piece_count(1600, 900, 100, DEFAULT_MAX_PIECES).unwrap();
        let actual = size.piece_count() as f64;
        assert!((actual - 100.0).abs() / 100.0 <= 0.1);
        assert!(size.columns > size.rows);

        assert!(GridSize::for_piece_count(100, 100, 1, DEFAULT_MAX_PIECES).is_err());
        assert_eq!(
            GridSize::for_piece_count(100, 100, 4, DEFAULT_MAX_PIECES).unwrap(),
            GridSize::new(2, 2)
        );
    }

    #[test]
    fn test_piece_kind_names() {
        assert_eq!(PieceKind::Corner.to_string(), "corner");
        assert_eq!("interior".parse::<PieceKind>().unwrap(), PieceKind::Interior);
        assert_eq!(serde_json::to_string(&PieceKind::Edge).unwrap(), "\"edge\"");
    }

    #[test]
    fn test_file_utilities() {
        assert_eq!(utils::piece_filename(7), "piece_7.png");
        assert!(utils::is_image_file("photo.JPG"));
        assert!(!utils::is_image_file("notes.txt"));
    }
}
