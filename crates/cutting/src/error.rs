use jigsaw_common::GridError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CutError {
    #[error(transparent)]
    Grid(#[from] GridError),

    #[error("Invalid shape configuration: {0}")]
    InvalidShape(String),

    #[error("Source image error ({path}): {reason}")]
    SourceImage { path: String, reason: String },

    #[error("Clip failure for piece {piece}: {reason}")]
    ClipFailure { piece: usize, reason: String },

    #[error("Edge set was generated for a {edge_rows}x{edge_columns} grid, image grid is {rows}x{columns}")]
    EdgeSetMismatch {
        edge_rows: u32,
        edge_columns: u32,
        rows: u32,
        columns: u32,
    },

    #[error("Invalid edge set: {0}")]
    InvalidEdgeSet(String),

    #[error("Rasterization error: {0}")]
    Raster(String),

    #[error("Image codec error: {0}")]
    Image(#[from] image::ImageError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Worker pool error: {0}")]
    WorkerPool(#[from] rayon::ThreadPoolBuildError),

    #[error("Cancelled")]
    Cancelled,
}

impl CutError {
    /// Errors caused by the input image rather than by the cutter
    pub fn is_source_error(&self) -> bool {
        matches!(
            self,
            CutError::SourceImage { .. } | CutError::Grid(GridError::ImageTooSmall { .. })
        )
    }
}

pub type Result<T> = std::result::Result<T, CutError>;
