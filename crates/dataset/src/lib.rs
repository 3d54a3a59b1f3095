//! # Dataset - Labeled Piece Pairs
//!
//! Turns a directory of cut puzzles into labeled pair records for training a
//! piece matching model. Images are assigned to splits first, then pairs are
//! formed only among images of the same split and the same cut.

pub mod error;
pub mod pairs;
pub mod split;
pub mod writer;

use std::path::{Path, PathBuf};

use tracing::info;

pub use error::{DatasetError, Result};
pub use pairs::{
    PairCategory, PairConfig, PairDirection, PairGenerator, PairRecord, PuzzleEntry,
    group_by_position,
};
pub use split::{Split, SplitAssignment, SplitPlan};
pub use writer::{PairSummary, read_jsonl, write_jsonl};

pub const SUMMARY_FILE: &str = "summary.json";
pub const SPLITS_FILE: &str = "splits.json";

/// Files written by [`build_dataset`]
#[derive(Debug, Clone)]
pub struct DatasetOutput {
    pub summary: PairSummary,
    pub files: Vec<PathBuf>,
}

/// Discover puzzles under `puzzles_root`, assign splits, generate pairs and
/// write `<split>.jsonl`, `splits.json` and `summary.json` into `output_dir`.
pub fn build_dataset(
    puzzles_root: &Path,
    output_dir: &Path,
    plan: &SplitPlan,
    config: PairConfig,
) -> Result<DatasetOutput> {
    let puzzles = PuzzleEntry::discover(puzzles_root)?;
    let ids: Vec<&str> = puzzles.iter().map(|p| p.puzzle_id.as_str()).collect();
    let assignment = plan.assign(&ids)?;
    info!(
        "Assigned {} puzzles: {} train, {} test, {} valid",
        assignment.len(),
        assignment.count(Split::Train),
        assignment.count(Split::Test),
        assignment.count(Split::Valid)
    );

    let records = PairGenerator::new(config)?.generate(&puzzles, &assignment)?;

    std::fs::create_dir_all(output_dir)?;
    let mut files = Vec::new();
    for split in [Split::Train, Split::Test, Split::Valid] {
        let subset: Vec<PairRecord> = records.iter().filter(|r| r.split == split).cloned().collect();
        let path = output_dir.join(format!("{}.jsonl", split));
        write_jsonl(&subset, &path)?;
        files.push(path);
    }

    let splits_path = output_dir.join(SPLITS_FILE);
    std::fs::write(&splits_path, serde_json::to_string_pretty(&assignment)?)?;
    files.push(splits_path);

    let summary = PairSummary::from_records(&records);
    let summary_path = output_dir.join(SUMMARY_FILE);
    std::fs::write(&summary_path, summary.to_json()?)?;
    files.push(summary_path);

    Ok(DatasetOutput { summary, files })
}
