use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::pairs::{PairCategory, PairRecord};
use crate::split::Split;

/// Write one JSON object per line
pub fn write_jsonl(records: &[PairRecord], path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let mut writer = BufWriter::new(File::create(path)?);
    for record in records {
        serde_json::to_writer(&mut writer, record)?;
        writer.write_all(b"\n")?;
    }
    writer.flush()?;
    Ok(())
}

pub fn read_jsonl(path: &Path) -> Result<Vec<PairRecord>> {
    let reader = BufReader::new(File::open(path)?);
    let mut records = Vec::new();
    for line in reader.lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        records.push(serde_json::from_str(&line)?);
    }
    Ok(records)
}

/// Pair counts per split and category
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PairSummary {
    pub total: usize,
    pub counts: BTreeMap<Split, BTreeMap<PairCategory, usize>>,
}

impl PairSummary {
    pub fn from_records(records: &[PairRecord]) -> Self {
        let mut summary = Self::default();
        for record in records {
            *summary
                .counts
                .entry(record.split)
                .or_default()
                .entry(record.category)
                .or_default() += 1;
            summary.total += 1;
        }
        summary
    }

    pub fn count(&self, split: Split, category: PairCategory) -> usize {
        self.counts
            .get(&split)
            .and_then(|by_category| by_category.get(&category))
            .copied()
            .unwrap_or(0)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pairs::PairDirection;
    use std::path::PathBuf;

    fn record(category: PairCategory, split: Split) -> PairRecord {
        PairRecord {
            category,
            label: category.is_match(),
            split,
            cut_id: "2x2-0000000000000001".to_string(),
            puzzle_id: "a".to_string(),
            right_puzzle_id: "a".to_string(),
            left_piece: 0,
            right_piece: 1,
            direction: PairDirection::LeftRight,
            edge_index: 0,
            left_path: PathBuf::from("a/pieces/piece_0.png"),
            right_path: PathBuf::from("a/pieces/piece_1.png"),
        }
    }

    #[test]
    fn test_jsonl_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pairs").join("train.jsonl");
        let records = vec![
            record(PairCategory::Correct, Split::Train),
            record(PairCategory::WrongImage, Split::Train),
        ];
        write_jsonl(&records, &path).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content.lines().count(), 2);
        assert!(content.lines().next().unwrap().contains("\"category\":\"correct\""));
        assert_eq!(read_jsonl(&path).unwrap(), records);
    }

    #[test]
    fn test_summary_counts() {
        let records = vec![
            record(PairCategory::Correct, Split::Train),
            record(PairCategory::Correct, Split::Train),
            record(PairCategory::WrongShape, Split::Valid),
        ];
        let summary = PairSummary::from_records(&records);
        assert_eq!(summary.total, 3);
        assert_eq!(summary.count(Split::Train, PairCategory::Correct), 2);
        assert_eq!(summary.count(Split::Valid, PairCategory::WrongShape), 1);
        assert_eq!(summary.count(Split::Test, PairCategory::Correct), 0);
        assert!(summary.to_json().unwrap().contains("wrong_shape"));
    }
}
