//! Holdout and k-fold partitioning
//!
//! Both splitters produce contiguous index ranges. Holdout splitting can
//! optionally permute the rows first with a seeded generator; k-fold never
//! shuffles, the last fold absorbs the remainder.

use crate::error::{QualityError, Result};
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

/// Train / validation fractions; the test slice takes the remainder
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SplitFractions {
    pub train: f64,
    pub validation: f64,
}

impl Default for SplitFractions {
    fn default() -> Self {
        Self {
            train: 0.70,
            validation: 0.15,
        }
    }
}

impl SplitFractions {
    pub fn new(train: f64, validation: f64) -> Self {
        Self { train, validation }
    }

    /// Fraction left for the test slice
    pub fn test(&self) -> f64 {
        1.0 - self.train - self.validation
    }

    fn validate(&self) -> Result<()> {
        for (name, value) in [("train", self.train), ("validation", self.validation)] {
            if !(0.0..=1.0).contains(&value) {
                return Err(QualityError::invalid_parameter(
                    format!("fractions.{}", name),
                    value,
                    "must lie in [0, 1]",
                ));
            }
        }
        if self.train + self.validation > 1.0 + 1e-9 {
            return Err(QualityError::invalid_parameter(
                "fractions",
                format!("{} + {}", self.train, self.validation),
                "train + validation must not exceed 1",
            ));
        }
        Ok(())
    }
}

/// Row ordering applied before a holdout split
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShuffleMode {
    /// Keep input order (reproduces artifacts trained on unshuffled splits)
    #[default]
    Preserve,
    /// Permute rows with a seeded generator
    Seeded(u64),
}

/// Row indices for the three holdout slices
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HoldoutSplit {
    pub train: Vec<usize>,
    pub validation: Vec<usize>,
    pub test: Vec<usize>,
}

/// Split `n_samples` rows into train/validation/test.
///
/// `train_end = floor(train * n)`, `val_end = train_end + floor(validation * n)`.
/// Any slice with a positive fraction that comes out empty is a
/// [`QualityError::DegenerateSplit`].
pub fn holdout_split(
    n_samples: usize,
    fractions: SplitFractions,
    shuffle: ShuffleMode,
) -> Result<HoldoutSplit> {
    fractions.validate()?;
    if n_samples == 0 {
        return Err(QualityError::EmptyDataset("cannot split zero rows".to_string()));
    }

    let train_end = (fractions.train * n_samples as f64).floor() as usize;
    let val_end = train_end + (fractions.validation * n_samples as f64).floor() as usize;
    let val_end = val_end.min(n_samples);

    let slices = [
        ("train", fractions.train, train_end),
        ("validation", fractions.validation, val_end - train_end),
        ("test", fractions.test(), n_samples - val_end),
    ];
    for (name, fraction, size) in slices {
        if fraction > 1e-9 && size == 0 {
            return Err(QualityError::DegenerateSplit {
                requested: format!("{} slice of {:.2}", name, fraction),
                available: n_samples,
            });
        }
    }

    let mut indices: Vec<usize> = (0..n_samples).collect();
    if let ShuffleMode::Seeded(seed) = shuffle {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        indices.shuffle(&mut rng);
    }

    Ok(HoldoutSplit {
        train: indices[..train_end].to_vec(),
        validation: indices[train_end..val_end].to_vec(),
        test: indices[val_end..].to_vec(),
    })
}

/// A single k-fold rotation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fold {
    pub fold_idx: usize,
    pub train_indices: Vec<usize>,
    pub validation_indices: Vec<usize>,
}

/// Fold sizes: `floor(n / k)` each, the last fold takes the remainder
pub fn fold_sizes(n_samples: usize, k: usize) -> Result<Vec<usize>> {
    if k < 2 {
        return Err(QualityError::invalid_parameter(
            "k",
            k,
            "cross-validation needs at least 2 folds",
        ));
    }
    if k > n_samples {
        return Err(QualityError::DegenerateSplit {
            requested: format!("{} folds", k),
            available: n_samples,
        });
    }

    let base = n_samples / k;
    let mut sizes = vec![base; k];
    sizes[k - 1] = n_samples - base * (k - 1);
    Ok(sizes)
}

/// Partition `n_samples` rows into `k` contiguous folds
pub fn k_fold(n_samples: usize, k: usize) -> Result<Vec<Fold>> {
    let sizes = fold_sizes(n_samples, k)?;

    let mut folds = Vec::with_capacity(k);
    let mut start = 0;
    for (fold_idx, size) in sizes.into_iter().enumerate() {
        let end = start + size;
        folds.push(Fold {
            fold_idx,
            train_indices: (0..start).chain(end..n_samples).collect(),
            validation_indices: (start..end).collect(),
        });
        start = end;
    }

    Ok(folds)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_holdout_70_15_15() {
        let split = holdout_split(20, SplitFractions::default(), ShuffleMode::Preserve).unwrap();
        assert_eq!(split.train, (0..14).collect::<Vec<_>>());
        assert_eq!(split.validation, (14..17).collect::<Vec<_>>());
        assert_eq!(split.test, (17..20).collect::<Vec<_>>());
    }

    #[test]
    fn test_holdout_shuffle_is_seeded_permutation() {
        let a = holdout_split(50, SplitFractions::default(), ShuffleMode::Seeded(7)).unwrap();
        let b = holdout_split(50, SplitFractions::default(), ShuffleMode::Seeded(7)).unwrap();
        assert_eq!(a, b);

        let mut all: Vec<usize> = a.train.iter().chain(&a.validation).chain(&a.test).copied().collect();
        assert_ne!(all, (0..50).collect::<Vec<_>>());
        all.sort_unstable();
        assert_eq!(all, (0..50).collect::<Vec<_>>());
    }

    #[test]
    fn test_holdout_too_small() {
        let err = holdout_split(4, SplitFractions::default(), ShuffleMode::Preserve).unwrap_err();
        assert!(matches!(err, QualityError::DegenerateSplit { .. }));
    }

    #[test]
    fn test_holdout_invalid_fractions() {
        let err = holdout_split(10, SplitFractions::new(0.9, 0.3), ShuffleMode::Preserve).unwrap_err();
        assert!(matches!(err, QualityError::InvalidParameter { .. }));
    }

    #[test]
    fn test_fold_sizes_remainder_in_last() {
        assert_eq!(fold_sizes(17, 5).unwrap(), vec![3, 3, 3, 3, 5]);
        assert_eq!(fold_sizes(10, 5).unwrap(), vec![2, 2, 2, 2, 2]);
    }

    #[test]
    fn test_k_fold_covers_every_row_once() {
        let folds = k_fold(17, 5).unwrap();
        assert_eq!(folds.len(), 5);

        let mut seen: Vec<usize> = folds.iter().flat_map(|f| f.validation_indices.clone()).collect();
        seen.sort_unstable();
        assert_eq!(seen, (0..17).collect::<Vec<_>>());

        for fold in &folds {
            assert_eq!(fold.train_indices.len() + fold.validation_indices.len(), 17);
            for idx in &fold.validation_indices {
                assert!(!fold.train_indices.contains(idx));
            }
        }
    }

    #[test]
    fn test_k_fold_degenerate() {
        assert!(matches!(
            k_fold(3, 5),
            Err(QualityError::DegenerateSplit { .. })
        ));
        assert!(matches!(
            k_fold(10, 1),
            Err(QualityError::InvalidParameter { .. })
        ));
    }
}
