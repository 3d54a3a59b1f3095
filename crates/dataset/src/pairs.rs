//! Labeled piece pairs across many puzzles cut with the same edge set.
//!
//! A *position* is one internal edge of the grid: the pair of pieces on
//! either side of it. For a group of `N` images sharing a cut and a split,
//! with `P` positions per image, `k = min(shape_partners, N - 1)` partner
//! images and `E` eligible positions (those with at least one decoy, see
//! [`decoy_candidates`]), the generator emits:
//!
//! | category | count |
//! |---|---|
//! | correct | `N * P` |
//! | wrong orientation | `N * P` |
//! | wrong shape | `N * k * P` |
//! | wrong image | `N * E` |
//! | wrong nothing | `N * k * E` |

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use cutting::{EdgeId, EdgeOrientation};
use jigsaw_common::{GridSize, PuzzleMetadata};
use rand::{Rng, SeedableRng};
use rand_pcg::Pcg32;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString, IntoEnumIterator, IntoStaticStr};
use tracing::{debug, info};

use crate::error::{DatasetError, Result};
use crate::split::{Split, SplitAssignment};

const METADATA_FILE: &str = "metadata.json";
const PIECES_DIR: &str = "pieces";

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord,
    Serialize, Deserialize, JsonSchema,
    Display, EnumString, EnumIter, IntoStaticStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum PairCategory {
    /// Truly adjacent pieces of one image
    Correct,
    /// Same edge, right piece taken from a partner image
    WrongShape,
    /// A correct pair with left and right swapped
    WrongOrientation,
    /// Same image, right piece neither the left piece nor adjacent to it
    WrongImage,
    /// Partner image and a non-adjacent right piece
    WrongNothing,
}

impl PairCategory {
    pub fn is_match(&self) -> bool {
        matches!(self, PairCategory::Correct)
    }

    /// Records this category yields for a complete group of `images` puzzles
    pub fn expected_count(&self, images: usize, size: GridSize, shape_partners: usize) -> usize {
        let partners = shape_partners.min(images.saturating_sub(1));
        let positions = size.internal_edge_count();
        let eligible = eligible_positions(size);
        match self {
            PairCategory::Correct | PairCategory::WrongOrientation => images * positions,
            PairCategory::WrongShape => images * partners * positions,
            PairCategory::WrongImage => images * eligible,
            PairCategory::WrongNothing => images * partners * eligible,
        }
    }
}

/// How the two pieces of a pair sit next to each other
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord,
    Serialize, Deserialize, JsonSchema,
    Display, EnumString, EnumIter, IntoStaticStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum PairDirection {
    /// Left piece, right piece (a vertical edge)
    LeftRight,
    /// Top piece, bottom piece (a horizontal edge)
    TopBottom,
}

/// One internal edge seen as a pair of pieces
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Position {
    pub edge_index: usize,
    pub direction: PairDirection,
    pub first: usize,
    pub second: usize,
}

/// Every position of a grid, in edge index order
pub fn positions(size: GridSize) -> Vec<Position> {
    let mut out = Vec::with_capacity(size.internal_edge_count());
    for row in 0..size.rows {
        for col in 0..size.columns.saturating_sub(1) {
            out.push(position(size, EdgeId::vertical(row, col)));
        }
    }
    for row in 0..size.rows.saturating_sub(1) {
        for col in 0..size.columns {
            out.push(position(size, EdgeId::horizontal(row, col)));
        }
    }
    out
}

fn position(size: GridSize, edge: EdgeId) -> Position {
    let (row, col) = edge.owner();
    let (partner_row, partner_col) = edge.partner();
    Position {
        edge_index: edge.index(size),
        direction: match edge.orientation {
            EdgeOrientation::Vertical => PairDirection::LeftRight,
            EdgeOrientation::Horizontal => PairDirection::TopBottom,
        },
        first: size.piece_id(row, col),
        second: size.piece_id(partner_row, partner_col),
    }
}

/// For every position, the positions of the same direction whose right piece
/// can stand in as a decoy: it is not the left piece and not adjacent to it.
pub fn decoy_candidates(size: GridSize, positions: &[Position]) -> Vec<Vec<usize>> {
    positions
        .iter()
        .map(|position| {
            let (row, col) = size.position(position.first);
            let neighbors = size.neighbors(row, col);
            positions
                .iter()
                .enumerate()
                .filter(|(_, other)| {
                    other.direction == position.direction
                        && other.second != position.first
                        && !neighbors.contains(&other.second)
                })
                .map(|(q, _)| q)
                .collect()
        })
        .collect()
}

/// Positions with at least one decoy
pub fn eligible_positions(size: GridSize) -> usize {
    decoy_candidates(size, &positions(size))
        .iter()
        .filter(|candidates| !candidates.is_empty())
        .count()
}

/// A cut puzzle as seen by the pair generator
#[derive(Debug, Clone, PartialEq)]
pub struct PuzzleEntry {
    pub puzzle_id: String,
    pub cut_id: String,
    pub size: GridSize,
    /// Piece id to bitmap path; clipped-out pieces are absent
    pub pieces: BTreeMap<usize, PathBuf>,
}

impl PuzzleEntry {
    pub fn from_metadata(metadata: &PuzzleMetadata, puzzle_dir: &Path) -> Self {
        let pieces = metadata
            .pieces
            .iter()
            .map(|piece| (piece.id, puzzle_dir.join(PIECES_DIR).join(&piece.filename)))
            .collect();
        Self {
            puzzle_id: metadata.puzzle_id.clone(),
            cut_id: metadata.cut_id.clone(),
            size: metadata.grid_size(),
            pieces,
        }
    }

    /// Read `<puzzle_dir>/metadata.json`
    pub fn load(puzzle_dir: &Path) -> Result<Self> {
        let path = puzzle_dir.join(METADATA_FILE);
        if !path.is_file() {
            return Err(DatasetError::MissingMetadata(puzzle_dir.to_path_buf()));
        }
        let metadata = PuzzleMetadata::from_json(&std::fs::read_to_string(&path)?)?;
        Ok(Self::from_metadata(&metadata, puzzle_dir))
    }

    /// Every puzzle directory under `root` that has a `metadata.json`, sorted
    pub fn discover(root: &Path) -> Result<Vec<Self>> {
        let mut dirs = Vec::new();
        for entry in std::fs::read_dir(root)? {
            let path = entry?.path();
            if path.join(METADATA_FILE).is_file() {
                dirs.push(path);
            }
        }
        dirs.sort();
        dirs.iter().map(|dir| Self::load(dir)).collect()
    }
}

/// One labeled pair, one JSON line in the output
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct PairRecord {
    pub category: PairCategory,
    pub label: bool,
    pub split: Split,
    pub cut_id: String,
    pub puzzle_id: String,
    pub right_puzzle_id: String,
    pub left_piece: usize,
    pub right_piece: usize,
    pub direction: PairDirection,
    /// Edge shared by the left piece at its position
    pub edge_index: usize,
    pub left_path: PathBuf,
    pub right_path: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct PairConfig {
    pub seed: u64,
    /// Partner images per image for cross-image categories
    pub shape_partners: usize,
    pub categories: Vec<PairCategory>,
}

impl Default for PairConfig {
    fn default() -> Self {
        Self {
            seed: 0,
            shape_partners: 1,
            categories: PairCategory::iter().collect(),
        }
    }
}

impl PairConfig {
    pub fn includes(&self, category: PairCategory) -> bool {
        self.categories.contains(&category)
    }
}

/// 64-bit FNV-1a
fn fnv1a(text: &str) -> u64 {
    text.bytes().fold(0xcbf2_9ce4_8422_2325, |hash, byte| {
        (hash ^ byte as u64).wrapping_mul(0x0000_0100_0000_01b3)
    })
}

pub struct PairGenerator {
    config: PairConfig,
}

impl PairGenerator {
    pub fn new(config: PairConfig) -> Result<Self> {
        if config.categories.is_empty() {
            return Err(DatasetError::InvalidConfig(
                "at least one category is required".to_string(),
            ));
        }
        Ok(Self { config })
    }

    pub fn config(&self) -> &PairConfig {
        &self.config
    }

    /// Generate records for every group of puzzles sharing a cut and a split
    pub fn generate(
        &self,
        puzzles: &[PuzzleEntry],
        assignment: &SplitAssignment,
    ) -> Result<Vec<PairRecord>> {
        let mut groups: BTreeMap<(String, Split), Vec<&PuzzleEntry>> = BTreeMap::new();
        for puzzle in puzzles {
            let split = assignment
                .split_of(&puzzle.puzzle_id)
                .ok_or_else(|| DatasetError::UnassignedPuzzle(puzzle.puzzle_id.clone()))?;
            groups
                .entry((puzzle.cut_id.clone(), split))
                .or_default()
                .push(puzzle);
        }

        let mut records = Vec::new();
        for ((cut_id, split), mut group) in groups {
            group.sort_by(|a, b| a.puzzle_id.cmp(&b.puzzle_id));
            let size = group[0].size;
            if let Some(other) = group.iter().find(|p| p.size != size) {
                return Err(DatasetError::InvalidConfig(format!(
                    "puzzle {} has grid {}x{} but cut {} is {}x{}",
                    other.puzzle_id, other.size.rows, other.size.columns, cut_id, size.rows, size.columns
                )));
            }
            let before = records.len();
            self.generate_group(&cut_id, split, &group, assignment, &mut records);
            debug!(
                "Cut {} / {}: {} images, {} pairs",
                cut_id,
                split,
                group.len(),
                records.len() - before
            );
        }
        info!("Generated {} pairs from {} puzzles", records.len(), puzzles.len());
        Ok(records)
    }

    fn generate_group(
        &self,
        cut_id: &str,
        split: Split,
        group: &[&PuzzleEntry],
        assignment: &SplitAssignment,
        records: &mut Vec<PairRecord>,
    ) {
        let n = group.len();
        let partners = self.config.shape_partners.min(n - 1);
        let size = group[0].size;
        let positions = positions(size);

        let candidates = decoy_candidates(size, &positions);
        let decoy = |rng: &mut Pcg32, p: usize| -> Option<usize> {
            let options = &candidates[p];
            if options.is_empty() {
                return None;
            }
            Some(positions[options[rng.random_range(0..options.len())]].second)
        };

        let mut rng = Pcg32::seed_from_u64(
            self.config.seed ^ fnv1a(cut_id) ^ fnv1a(split.into()).rotate_left(17),
        );
        let mut emit = |category: PairCategory,
                        left: &PuzzleEntry,
                        left_piece: usize,
                        right: &PuzzleEntry,
                        right_piece: usize,
                        position: &Position| {
            if !self.config.includes(category) {
                return;
            }
            assert_eq!(
                assignment.split_of(&left.puzzle_id),
                assignment.split_of(&right.puzzle_id),
                "pair mixes splits"
            );
            let (Some(left_path), Some(right_path)) =
                (left.pieces.get(&left_piece), right.pieces.get(&right_piece))
            else {
                return;
            };
            records.push(PairRecord {
                category,
                label: category.is_match(),
                split,
                cut_id: cut_id.to_string(),
                puzzle_id: left.puzzle_id.clone(),
                right_puzzle_id: right.puzzle_id.clone(),
                left_piece,
                right_piece,
                direction: position.direction,
                edge_index: position.edge_index,
                left_path: left_path.clone(),
                right_path: right_path.clone(),
            });
        };

        for (i, &image) in group.iter().enumerate() {
            let partner_images: Vec<&PuzzleEntry> =
                (1..=partners).map(|offset| group[(i + offset) % n]).collect();

            for position in &positions {
                emit(PairCategory::Correct, image, position.first, image, position.second, position);
                emit(PairCategory::WrongOrientation, image, position.second, image, position.first, position);
            }
            for &partner in &partner_images {
                for position in &positions {
                    emit(PairCategory::WrongShape, image, position.first, partner, position.second, position);
                }
            }
            for (p, position) in positions.iter().enumerate() {
                if let Some(right) = decoy(&mut rng, p) {
                    emit(PairCategory::WrongImage, image, position.first, image, right, position);
                }
            }
            for &partner in &partner_images {
                for (p, position) in positions.iter().enumerate() {
                    if let Some(right) = decoy(&mut rng, p) {
                        emit(PairCategory::WrongNothing, image, position.first, partner, right, position);
                    }
                }
            }
        }
    }
}

/// Records sharing a cut and an edge index, for position-level analysis
pub fn group_by_position(records: &[PairRecord]) -> BTreeMap<(String, usize), Vec<&PairRecord>> {
    let mut groups: BTreeMap<(String, usize), Vec<&PairRecord>> = BTreeMap::new();
    for record in records {
        groups
            .entry((record.cut_id.clone(), record.edge_index))
            .or_default()
            .push(record);
    }
    groups
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(id: &str, cut: &str, size: GridSize) -> PuzzleEntry {
        let pieces = (0..size.piece_count())
            .map(|piece| (piece, PathBuf::from(format!("{}/pieces/piece_{}.png", id, piece))))
            .collect();
        PuzzleEntry {
            puzzle_id: id.to_string(),
            cut_id: cut.to_string(),
            size,
            pieces,
        }
    }

    fn all_in(split: Split, puzzles: &[PuzzleEntry]) -> SplitAssignment {
        let mut assignment = SplitAssignment::default();
        for puzzle in puzzles {
            assignment.insert(puzzle.puzzle_id.clone(), split);
        }
        assignment
    }

    fn count(records: &[PairRecord], category: PairCategory) -> usize {
        records.iter().filter(|r| r.category == category).count()
    }

    #[test]
    fn test_category_counts_match_formulas() {
        for (rows, columns, images, partners) in [(3, 3, 4, 2), (2, 5, 3, 1), (1, 4, 2, 3), (4, 1, 5, 2)] {
            let size = GridSize::new(rows, columns);
            let puzzles: Vec<_> = (0..images)
                .map(|i| entry(&format!("img{}", i), "cut", size))
                .collect();
            let config = PairConfig {
                seed: 3,
                shape_partners: partners,
                ..PairConfig::default()
            };
            let records = PairGenerator::new(config)
                .unwrap()
                .generate(&puzzles, &all_in(Split::Train, &puzzles))
                .unwrap();
            for category in PairCategory::iter() {
                assert_eq!(
                    count(&records, category),
                    category.expected_count(images, size, partners),
                    "{:?} on {}x{}",
                    category,
                    rows,
                    columns
                );
            }
        }
    }

    #[test]
    fn test_three_by_three_single_image() {
        let size = GridSize::new(3, 3);
        let puzzles = vec![entry("solo", "cut", size)];
        let records = PairGenerator::new(PairConfig::default())
            .unwrap()
            .generate(&puzzles, &all_in(Split::Test, &puzzles))
            .unwrap();
        assert_eq!(count(&records, PairCategory::Correct), 12);
        assert_eq!(count(&records, PairCategory::WrongShape), 0);
        assert_eq!(count(&records, PairCategory::WrongImage), 12);
        for record in records.iter().filter(|r| r.category == PairCategory::WrongImage) {
            let correct_right = positions(size)
                .into_iter()
                .find(|p| p.edge_index == record.edge_index)
                .unwrap()
                .second;
            assert_ne!(record.right_piece, correct_right);
        }
    }

    #[test]
    fn test_decoys_are_never_self_or_adjacent() {
        for (rows, columns) in [(1, 3), (3, 3), (2, 4)] {
            let size = GridSize::new(rows, columns);
            let puzzles = vec![entry("a", "cut", size), entry("b", "cut", size)];
            for seed in 0..50 {
                let config = PairConfig {
                    seed,
                    ..PairConfig::default()
                };
                let records = PairGenerator::new(config)
                    .unwrap()
                    .generate(&puzzles, &all_in(Split::Train, &puzzles))
                    .unwrap();
                let decoys = records.iter().filter(|r| {
                    matches!(r.category, PairCategory::WrongImage | PairCategory::WrongNothing)
                });
                for record in decoys {
                    let (row, col) = size.position(record.left_piece);
                    assert_ne!(record.right_piece, record.left_piece, "{}x{} seed {}", rows, columns, seed);
                    assert!(
                        !size.neighbors(row, col).contains(&record.right_piece),
                        "{}x{} seed {}: {} next to {}",
                        rows,
                        columns,
                        seed,
                        record.left_piece,
                        record.right_piece
                    );
                }
            }
        }
    }

    #[test]
    fn test_one_by_three_decoys() {
        let size = GridSize::new(1, 3);
        let candidates = decoy_candidates(size, &positions(size));
        // piece 0 can only be paired with piece 2; piece 1 touches both others
        assert_eq!(candidates, vec![vec![1], vec![]]);
        assert_eq!(eligible_positions(size), 1);
        assert_eq!(eligible_positions(GridSize::new(3, 3)), 12);
    }

    #[test]
    fn test_wrong_shape_uses_same_edge() {
        let size = GridSize::new(2, 3);
        let puzzles = vec![entry("a", "cut", size), entry("b", "cut", size)];
        let records = PairGenerator::new(PairConfig::default())
            .unwrap()
            .generate(&puzzles, &all_in(Split::Train, &puzzles))
            .unwrap();
        let correct: BTreeMap<usize, (usize, usize)> = records
            .iter()
            .filter(|r| r.category == PairCategory::Correct && r.puzzle_id == "a")
            .map(|r| (r.edge_index, (r.left_piece, r.right_piece)))
            .collect();
        let wrong_shape: Vec<_> = records
            .iter()
            .filter(|r| r.category == PairCategory::WrongShape && r.puzzle_id == "a")
            .collect();
        assert_eq!(wrong_shape.len(), size.internal_edge_count());
        for record in wrong_shape {
            assert_eq!(record.right_puzzle_id, "b");
            assert_eq!(correct[&record.edge_index], (record.left_piece, record.right_piece));
            assert!(!record.label);
        }
    }

    #[test]
    fn test_no_split_mixing() {
        let size = GridSize::new(2, 2);
        let puzzles: Vec<_> = (0..6).map(|i| entry(&format!("p{}", i), "cut", size)).collect();
        let mut assignment = SplitAssignment::default();
        for (i, puzzle) in puzzles.iter().enumerate() {
            let split = if i % 2 == 0 { Split::Train } else { Split::Valid };
            assignment.insert(puzzle.puzzle_id.clone(), split);
        }
        let config = PairConfig {
            shape_partners: 5,
            ..PairConfig::default()
        };
        let records = PairGenerator::new(config).unwrap().generate(&puzzles, &assignment).unwrap();
        for record in &records {
            assert_eq!(assignment.split_of(&record.puzzle_id), Some(record.split));
            assert_eq!(assignment.split_of(&record.right_puzzle_id), Some(record.split));
        }
        // three images per split, so two partners each
        assert_eq!(
            count(&records, PairCategory::WrongShape),
            2 * PairCategory::WrongShape.expected_count(3, size, 5)
        );
    }

    #[test]
    fn test_cuts_are_not_mixed() {
        let puzzles = vec![
            entry("a", "cut1", GridSize::new(2, 2)),
            entry("b", "cut2", GridSize::new(2, 2)),
        ];
        let records = PairGenerator::new(PairConfig::default())
            .unwrap()
            .generate(&puzzles, &all_in(Split::Train, &puzzles))
            .unwrap();
        assert_eq!(count(&records, PairCategory::WrongShape), 0);
        assert!(records.iter().all(|r| r.puzzle_id == r.right_puzzle_id));
    }

    #[test]
    fn test_deterministic_and_filtered() {
        let size = GridSize::new(3, 4);
        let puzzles: Vec<_> = (0..3).map(|i| entry(&format!("q{}", i), "cut", size)).collect();
        let assignment = all_in(Split::Train, &puzzles);
        let generator = PairGenerator::new(PairConfig {
            seed: 11,
            shape_partners: 2,
            ..PairConfig::default()
        })
        .unwrap();
        assert_eq!(
            generator.generate(&puzzles, &assignment).unwrap(),
            generator.generate(&puzzles, &assignment).unwrap()
        );

        let only_correct = PairGenerator::new(PairConfig {
            categories: vec![PairCategory::Correct],
            ..PairConfig::default()
        })
        .unwrap();
        let records = only_correct.generate(&puzzles, &assignment).unwrap();
        assert!(records.iter().all(|r| r.label));
        assert_eq!(records.len(), 3 * size.internal_edge_count());
    }

    #[test]
    fn test_missing_pieces_are_skipped() {
        let size = GridSize::new(1, 2);
        let mut puzzle = entry("gap", "cut", size);
        puzzle.pieces.remove(&1);
        let puzzles = vec![puzzle];
        let records = PairGenerator::new(PairConfig::default())
            .unwrap()
            .generate(&puzzles, &all_in(Split::Train, &puzzles))
            .unwrap();
        assert!(records.is_empty());
    }

    #[test]
    fn test_unassigned_puzzle() {
        let puzzles = vec![entry("x", "cut", GridSize::new(2, 2))];
        let result = PairGenerator::new(PairConfig::default())
            .unwrap()
            .generate(&puzzles, &SplitAssignment::default());
        assert!(matches!(result, Err(DatasetError::UnassignedPuzzle(_))));
    }

    #[test]
    fn test_group_by_position() {
        let size = GridSize::new(2, 2);
        let puzzles = vec![entry("a", "cut", size), entry("b", "cut", size)];
        let records = PairGenerator::new(PairConfig::default())
            .unwrap()
            .generate(&puzzles, &all_in(Split::Train, &puzzles))
            .unwrap();
        let grouped = group_by_position(&records);
        assert_eq!(grouped.len(), size.internal_edge_count());
        assert_eq!(grouped.values().map(Vec::len).sum::<usize>(), records.len());
    }

    #[test]
    fn test_one_by_two_positions() {
        let size = GridSize::new(1, 2);
        let all = positions(size);
        assert_eq!(all.len(), 1);
        assert_eq!((all[0].first, all[0].second), (0, 1));
        assert_eq!(all[0].direction, PairDirection::LeftRight);
        assert_eq!(eligible_positions(size), 0);
    }
}
