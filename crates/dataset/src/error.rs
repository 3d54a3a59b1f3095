use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum DatasetError {
    #[error("Invalid split ratios: {0}")]
    InvalidSplit(String),

    #[error("Invalid pair configuration: {0}")]
    InvalidConfig(String),

    #[error("Puzzle {0} has no split assignment")]
    UnassignedPuzzle(String),

    #[error("No metadata.json in {0}")]
    MissingMetadata(PathBuf),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, DatasetError>;
