//! Feature importance
//!
//! Two strategies: split frequency (tree bags only) and permutation
//! importance (any model). Permutation importance is the increase in RMSE
//! after shuffling one column, averaged over `n_repeats` shuffles.

use crate::error::{QualityError, Result};
use crate::training::{Ensemble, Model, TreeBag};
use ndarray::{Array1, Array2};
use rand::prelude::*;
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use tracing::debug;

/// Which importance measure to compute
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "strategy", rename_all = "snake_case")]
pub enum ImportanceStrategy {
    /// Share of split nodes that test each feature
    SplitFrequency,
    /// RMSE increase after shuffling each feature
    Permutation { n_repeats: usize },
}

impl Default for ImportanceStrategy {
    fn default() -> Self {
        ImportanceStrategy::Permutation { n_repeats: 5 }
    }
}

/// Per-feature importance scores
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportanceResult {
    pub feature_names: Vec<String>,
    /// Mean importance per feature
    pub importances_mean: Vec<f64>,
    /// Std across repeats (zero for split frequency)
    pub importances_std: Vec<f64>,
    /// Raw score per feature per repeat
    pub importances_raw: Vec<Vec<f64>>,
}

impl ImportanceResult {
    /// Feature indices by descending importance, ties by name
    pub fn sorted_indices(&self) -> Vec<usize> {
        let mut indices: Vec<usize> = (0..self.importances_mean.len()).collect();
        indices.sort_by(|&a, &b| {
            self.importances_mean[b]
                .partial_cmp(&self.importances_mean[a])
                .unwrap_or(Ordering::Equal)
                .then_with(|| self.name(a).cmp(self.name(b)))
        });
        indices
    }

    /// `(name, score)` pairs by descending importance
    pub fn ranking(&self) -> Vec<(String, f64)> {
        self.sorted_indices()
            .into_iter()
            .map(|i| (self.name(i).to_string(), self.importances_mean[i]))
            .collect()
    }

    /// Top k `(name, score)` pairs
    pub fn top_k(&self, k: usize) -> Vec<(String, f64)> {
        let mut ranking = self.ranking();
        ranking.truncate(k);
        ranking
    }

    /// Score of one feature by name
    pub fn importance_of(&self, name: &str) -> Option<f64> {
        self.feature_names
            .iter()
            .position(|n| n == name)
            .map(|i| self.importances_mean[i])
    }

    fn name(&self, idx: usize) -> &str {
        self.feature_names.get(idx).map(String::as_str).unwrap_or("")
    }
}

/// Split counts per feature across all trees, normalized by the total count.
///
/// A bag whose trees are all leaves yields all zeros.
pub fn split_frequency(bag: &TreeBag, feature_names: &[String]) -> Result<ImportanceResult> {
    if feature_names.len() != bag.n_features() {
        return Err(QualityError::ShapeMismatch {
            expected: format!("{} feature names", bag.n_features()),
            actual: format!("{} feature names", feature_names.len()),
        });
    }

    let counts = bag.split_counts();
    let total: usize = counts.iter().sum();
    let importances_mean: Vec<f64> = counts
        .iter()
        .map(|&c| if total == 0 { 0.0 } else { c as f64 / total as f64 })
        .collect();

    Ok(ImportanceResult {
        feature_names: feature_names.to_vec(),
        importances_std: vec![0.0; counts.len()],
        importances_raw: importances_mean.iter().map(|&v| vec![v]).collect(),
        importances_mean,
    })
}

/// Permutation importance over any prediction function
pub struct PermutationImportance<F>
where
    F: Fn(&Array2<f64>) -> Result<Array1<f64>> + Sync,
{
    predict_fn: F,
    n_repeats: usize,
}

impl<F> PermutationImportance<F>
where
    F: Fn(&Array2<f64>) -> Result<Array1<f64>> + Sync,
{
    pub fn new(predict_fn: F) -> Self {
        Self {
            predict_fn,
            n_repeats: 5,
        }
    }

    /// Set number of shuffles per feature
    pub fn with_n_repeats(mut self, n_repeats: usize) -> Self {
        self.n_repeats = n_repeats.max(1);
        self
    }

    /// Score every column of `x`.
    ///
    /// Columns are processed in parallel, each with its own generator seeded
    /// from `rng`. A constant column scores exactly 0.
    pub fn compute<R: Rng + ?Sized>(
        &self,
        x: &Array2<f64>,
        y: &Array1<f64>,
        feature_names: &[String],
        rng: &mut R,
    ) -> Result<ImportanceResult> {
        let n_features = x.ncols();
        if feature_names.len() != n_features {
            return Err(QualityError::ShapeMismatch {
                expected: format!("{} feature names", n_features),
                actual: format!("{} feature names", feature_names.len()),
            });
        }
        if x.nrows() == 0 {
            return Err(QualityError::EmptyDataset("no rows to permute".to_string()));
        }

        let baseline = rmse(&(self.predict_fn)(x)?, y)?;
        let seeds: Vec<u64> = (0..n_features).map(|_| rng.gen()).collect();

        let importances_raw = seeds
            .into_par_iter()
            .enumerate()
            .map(|(feature_idx, seed)| self.permute_feature(x, y, feature_idx, seed, baseline))
            .collect::<Result<Vec<Vec<f64>>>>()?;

        let importances_mean: Vec<f64> = importances_raw
            .iter()
            .map(|scores| scores.iter().sum::<f64>() / scores.len() as f64)
            .collect();

        let importances_std: Vec<f64> = importances_raw
            .iter()
            .zip(importances_mean.iter())
            .map(|(scores, mean)| {
                let variance: f64 =
                    scores.iter().map(|s| (s - mean).powi(2)).sum::<f64>() / scores.len() as f64;
                variance.sqrt()
            })
            .collect();

        debug!(n_features, n_repeats = self.n_repeats, baseline_rmse = baseline, "Permutation importance computed");

        Ok(ImportanceResult {
            feature_names: feature_names.to_vec(),
            importances_mean,
            importances_std,
            importances_raw,
        })
    }

    fn permute_feature(
        &self,
        x: &Array2<f64>,
        y: &Array1<f64>,
        feature_idx: usize,
        seed: u64,
        baseline: f64,
    ) -> Result<Vec<f64>> {
        let column = x.column(feature_idx);
        let first = column[0];
        if column.iter().all(|&v| v == first) {
            return Ok(vec![0.0; self.n_repeats]);
        }

        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let mut x_permuted = x.clone();
        let mut values: Vec<f64> = column.to_vec();

        (0..self.n_repeats)
            .map(|_| {
                values.shuffle(&mut rng);
                for (row, &v) in values.iter().enumerate() {
                    x_permuted[[row, feature_idx]] = v;
                }
                let permuted = rmse(&(self.predict_fn)(&x_permuted)?, y)?;
                Ok(permuted - baseline)
            })
            .collect()
    }
}

/// Importance of every feature of a trained model.
///
/// `x` must be aligned to the model's feature names and unscaled, exactly as
/// passed to [`Model::evaluate`].
pub fn importance_report<R: Rng + ?Sized>(
    model: &Model,
    x: &Array2<f64>,
    y: &Array1<f64>,
    strategy: ImportanceStrategy,
    rng: &mut R,
) -> Result<ImportanceResult> {
    match strategy {
        ImportanceStrategy::SplitFrequency => match &model.ensemble {
            Ensemble::TreeBag(bag) => split_frequency(bag, &model.feature_names),
            _ => Err(QualityError::Validation(format!(
                "split-frequency importance needs a tree-bag model, got {}",
                model.kind()
            ))),
        },
        ImportanceStrategy::Permutation { n_repeats } => {
            PermutationImportance::new(|data: &Array2<f64>| model.predict_matrix(data))
                .with_n_repeats(n_repeats)
                .compute(x, y, &model.feature_names, rng)
        }
    }
}

/// `(feature name, score)` pairs sorted by descending importance
pub fn feature_importance<R: Rng + ?Sized>(
    model: &Model,
    x: &Array2<f64>,
    y: &Array1<f64>,
    strategy: ImportanceStrategy,
    rng: &mut R,
) -> Result<Vec<(String, f64)>> {
    Ok(importance_report(model, x, y, strategy, rng)?.ranking())
}

fn rmse(predictions: &Array1<f64>, y: &Array1<f64>) -> Result<f64> {
    if predictions.len() != y.len() {
        return Err(QualityError::ShapeMismatch {
            expected: format!("{} predictions", y.len()),
            actual: format!("{} predictions", predictions.len()),
        });
    }
    let mse = predictions
        .iter()
        .zip(y.iter())
        .map(|(p, t)| (p - t).powi(2))
        .sum::<f64>()
        / y.len() as f64;
    Ok(mse.sqrt())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::training::{train_bag, train_linear, BagConfig, LinearConfig, TreeParams};
    use ndarray::array;

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_permutation_finds_signal_column() {
        // y depends only on column 0
        let x = Array2::from_shape_fn((40, 2), |(i, j)| if j == 0 { i as f64 } else { ((i * 13) % 7) as f64 });
        let y: Array1<f64> = x.column(0).mapv(|v| v / 40.0);

        let result = PermutationImportance::new(|data: &Array2<f64>| Ok(data.column(0).mapv(|v| v / 40.0)))
            .with_n_repeats(3)
            .compute(&x, &y, &names(&["signal", "noise"]), &mut ChaCha8Rng::seed_from_u64(1))
            .unwrap();

        assert!(result.importances_mean[0] > 0.0);
        assert_eq!(result.importances_mean[1], 0.0);
        assert_eq!(result.ranking()[0].0, "signal");
    }

    #[test]
    fn test_constant_column_scores_zero() {
        let x = array![[1.0, 5.0], [2.0, 5.0], [3.0, 5.0], [4.0, 5.0]];
        let y = array![0.1, 0.2, 0.3, 0.4];
        let feature_names = names(&["a", "constant"]);
        let model = train_linear(&x, &y, &feature_names, &LinearConfig::default()).unwrap();

        let result = importance_report(
            &model,
            &x,
            &y,
            ImportanceStrategy::Permutation { n_repeats: 4 },
            &mut ChaCha8Rng::seed_from_u64(7),
        )
        .unwrap();
        assert_eq!(result.importance_of("constant"), Some(0.0));
        assert_eq!(result.importances_std[1], 0.0);
    }

    #[test]
    fn test_split_frequency_normalized() {
        let x = array![[0.0, 1.0], [1.0, 1.0], [2.0, 0.0], [3.0, 0.0], [4.0, 1.0], [5.0, 0.0]];
        let y = array![0.0, 0.2, 0.4, 0.6, 0.8, 1.0];
        let config = BagConfig::default()
            .with_n_trees(5)
            .with_tree_params(TreeParams::unbounded());
        let model = train_bag(&x, &y, &names(&["a", "b"]), &config, &mut ChaCha8Rng::seed_from_u64(3)).unwrap();

        let result = importance_report(&model, &x, &y, ImportanceStrategy::SplitFrequency, &mut ChaCha8Rng::seed_from_u64(0)).unwrap();
        let total: f64 = result.importances_mean.iter().sum();
        assert!((total - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_split_frequency_rejects_linear() {
        let x = array![[0.0], [1.0], [2.0]];
        let y = array![0.0, 0.5, 1.0];
        let model = train_linear(&x, &y, &names(&["a"]), &LinearConfig::default()).unwrap();

        let err = importance_report(&model, &x, &y, ImportanceStrategy::SplitFrequency, &mut ChaCha8Rng::seed_from_u64(0)).unwrap_err();
        assert!(matches!(err, QualityError::Validation(_)));
    }

    #[test]
    fn test_ranking_tie_breaks_by_name() {
        let result = ImportanceResult {
            feature_names: names(&["zeta", "alpha", "mid"]),
            importances_mean: vec![0.2, 0.2, 0.5],
            importances_std: vec![0.0; 3],
            importances_raw: vec![vec![0.2], vec![0.2], vec![0.5]],
        };
        let ranked: Vec<String> = result.ranking().into_iter().map(|(n, _)| n).collect();
        assert_eq!(ranked, names(&["mid", "alpha", "zeta"]));
        assert_eq!(result.top_k(1), vec![("mid".to_string(), 0.5)]);
    }
}
