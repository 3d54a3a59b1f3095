use std::collections::BTreeMap;

use rand::SeedableRng;
use rand::seq::SliceRandom;
use rand_pcg::Pcg32;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString, IntoStaticStr};

use crate::error::{DatasetError, Result};

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord,
    Serialize, Deserialize, JsonSchema,
    Display, EnumString, EnumIter, IntoStaticStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Split {
    Train,
    Test,
    Valid,
}

/// Seeded, ratio-based assignment of whole images to splits
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct SplitPlan {
    pub seed: u64,
    pub train: f64,
    pub test: f64,
    pub valid: f64,
}

impl Default for SplitPlan {
    fn default() -> Self {
        Self {
            seed: 0,
            train: 0.8,
            test: 0.1,
            valid: 0.1,
        }
    }
}

impl SplitPlan {
    pub fn validate(&self) -> Result<()> {
        let ratios = [self.train, self.test, self.valid];
        if ratios.iter().any(|r| !r.is_finite() || *r < 0.0) {
            return Err(DatasetError::InvalidSplit(
                "ratios must be finite and non-negative".to_string(),
            ));
        }
        let total: f64 = ratios.iter().sum();
        if (total - 1.0).abs() > 1e-6 {
            return Err(DatasetError::InvalidSplit(format!(
                "ratios sum to {}, expected 1",
                total
            )));
        }
        Ok(())
    }

    /// Shuffle the ids with the plan seed and cut the sequence by ratio.
    ///
    /// The result does not depend on the order of `puzzle_ids`.
    pub fn assign<S: AsRef<str>>(&self, puzzle_ids: &[S]) -> Result<SplitAssignment> {
        self.validate()?;
        let mut ids: Vec<String> = puzzle_ids.iter().map(|id| id.as_ref().to_string()).collect();
        ids.sort();
        ids.dedup();
        let mut rng = Pcg32::seed_from_u64(self.seed);
        ids.shuffle(&mut rng);

        let n = ids.len();
        let train = ((n as f64 * self.train).round() as usize).min(n);
        let test = ((n as f64 * self.test).round() as usize).min(n - train);

        let splits = ids
            .into_iter()
            .enumerate()
            .map(|(i, id)| {
                let split = if i < train {
                    Split::Train
                } else if i < train + test {
                    Split::Test
                } else {
                    Split::Valid
                };
                (id, split)
            })
            .collect();
        Ok(SplitAssignment { splits })
    }
}

/// Split of every image, fixed before any pair is generated
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SplitAssignment {
    splits: BTreeMap<String, Split>,
}

impl SplitAssignment {
    pub fn split_of(&self, puzzle_id: &str) -> Option<Split> {
        self.splits.get(puzzle_id).copied()
    }

    pub fn insert(&mut self, puzzle_id: impl Into<String>, split: Split) {
        self.splits.insert(puzzle_id.into(), split);
    }

    pub fn len(&self) -> usize {
        self.splits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.splits.is_empty()
    }

    pub fn count(&self, split: Split) -> usize {
        self.splits.values().filter(|s| **s == split).count()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, Split)> {
        self.splits.iter().map(|(id, split)| (id.as_str(), *split))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("img{:03}", i)).collect()
    }

    #[test]
    fn test_ratio_counts() {
        let assignment = SplitPlan::default().assign(&ids(10)).unwrap();
        assert_eq!(assignment.len(), 10);
        assert_eq!(assignment.count(Split::Train), 8);
        assert_eq!(assignment.count(Split::Test), 1);
        assert_eq!(assignment.count(Split::Valid), 1);
    }

    #[test]
    fn test_assignment_is_order_independent() {
        let plan = SplitPlan {
            seed: 99,
            ..SplitPlan::default()
        };
        let forward = ids(25);
        let mut backward = forward.clone();
        backward.reverse();
        assert_eq!(plan.assign(&forward).unwrap(), plan.assign(&backward).unwrap());
    }

    #[test]
    fn test_invalid_ratios() {
        let plan = SplitPlan {
            train: 0.9,
            test: 0.2,
            valid: 0.1,
            ..SplitPlan::default()
        };
        assert!(matches!(plan.assign(&ids(3)), Err(DatasetError::InvalidSplit(_))));
    }

    #[test]
    fn test_split_names() {
        assert_eq!(Split::Valid.to_string(), "valid");
        assert_eq!("train".parse::<Split>().unwrap(), Split::Train);
    }
}
