//! Bootstrap-aggregated regression trees

use super::config::BagConfig;
use super::decision_tree::{induce, TreeNode};
use crate::dataset::{check_training_inputs, select_rows};
use crate::error::{QualityError, Result};
use ndarray::{Array1, Array2, ArrayView1};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Independently trained trees; prediction is their mean
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TreeBag {
    trees: Vec<TreeNode>,
    n_features: usize,
}

impl TreeBag {
    /// Train `config.n_trees` trees on bootstrap resamples of `x`, `y`.
    ///
    /// One seed per tree is drawn from `rng` up front, so the result does not
    /// depend on how rayon schedules the trees.
    pub fn fit<R: Rng + ?Sized>(
        x: &Array2<f64>,
        y: &Array1<f64>,
        config: &BagConfig,
        rng: &mut R,
    ) -> Result<Self> {
        check_training_inputs(x, y)?;
        config.validate()?;

        let n_samples = x.nrows();
        let seeds: Vec<u64> = (0..config.n_trees).map(|_| rng.gen()).collect();

        debug!(
            n_trees = config.n_trees,
            max_depth = ?config.tree.max_depth,
            min_samples_split = config.tree.min_samples_split,
            n_samples,
            "Training tree bag"
        );

        let trees = seeds
            .into_par_iter()
            .map(|seed| {
                let mut tree_rng = ChaCha8Rng::seed_from_u64(seed);
                let sample: Vec<usize> = (0..n_samples)
                    .map(|_| tree_rng.gen_range(0..n_samples))
                    .collect();
                let (x_sample, y_sample) = select_rows(x, y, &sample);
                induce(&x_sample, &y_sample, &config.tree)
            })
            .collect::<Result<Vec<_>>>()?;

        debug!(
            n_trees = trees.len(),
            mean_depth = trees.iter().map(TreeNode::depth).sum::<usize>() as f64 / trees.len() as f64,
            "Tree bag trained"
        );

        Ok(Self {
            trees,
            n_features: x.ncols(),
        })
    }

    pub fn trees(&self) -> &[TreeNode] {
        &self.trees
    }

    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }

    pub fn n_features(&self) -> usize {
        self.n_features
    }

    /// Reject an empty bag or trees that do not fit `n_features`
    pub fn validate(&self) -> Result<()> {
        if self.trees.is_empty() {
            return Err(QualityError::Validation("tree bag holds no trees".to_string()));
        }
        for tree in &self.trees {
            tree.validate(self.n_features)?;
        }
        Ok(())
    }

    /// Mean of the trees' predictions for one row
    pub fn predict_row(&self, row: ArrayView1<f64>) -> f64 {
        let total: f64 = self.trees.iter().map(|tree| tree.predict(&row)).sum();
        total / self.trees.len() as f64
    }

    /// Predict every row of `x`
    pub fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        if x.ncols() != self.n_features {
            return Err(QualityError::ShapeMismatch {
                expected: format!("{} features", self.n_features),
                actual: format!("{} features", x.ncols()),
            });
        }
        Ok(x.rows().into_iter().map(|row| self.predict_row(row)).collect())
    }

    /// Number of splits on each feature across all trees
    pub fn split_counts(&self) -> Vec<usize> {
        let mut counts = vec![0; self.n_features];
        for tree in &self.trees {
            tree.accumulate_split_counts(&mut counts);
        }
        counts
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::training::decision_tree::TreeParams;
    use ndarray::array;

    fn toy_data() -> (Array2<f64>, Array1<f64>) {
        let x = array![
            [0.0, 1.0],
            [1.0, 0.0],
            [2.0, 1.0],
            [3.0, 0.0],
            [4.0, 1.0],
            [5.0, 0.0],
            [6.0, 1.0],
            [7.0, 0.0]
        ];
        let y = array![0.0, 0.1, 0.2, 0.3, 0.6, 0.7, 0.8, 0.9];
        (x, y)
    }

    #[test]
    fn test_single_tree_bag_matches_its_tree() {
        let (x, y) = toy_data();
        let config = BagConfig::default()
            .with_n_trees(1)
            .with_tree_params(TreeParams::unbounded());
        let bag = TreeBag::fit(&x, &y, &config, &mut ChaCha8Rng::seed_from_u64(3)).unwrap();

        assert_eq!(bag.n_trees(), 1);
        for row in x.rows() {
            assert_eq!(bag.predict_row(row), bag.trees()[0].predict(&row));
        }
    }

    #[test]
    fn test_seeded_training_is_reproducible() {
        let (x, y) = toy_data();
        let config = BagConfig::default().with_n_trees(8).with_min_samples_split(2);

        let a = TreeBag::fit(&x, &y, &config, &mut ChaCha8Rng::seed_from_u64(11)).unwrap();
        let b = TreeBag::fit(&x, &y, &config, &mut ChaCha8Rng::seed_from_u64(11)).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_predictions_finite_and_in_label_range() {
        let (x, y) = toy_data();
        let config = BagConfig::default().with_n_trees(10).with_min_samples_split(2);
        let bag = TreeBag::fit(&x, &y, &config, &mut ChaCha8Rng::seed_from_u64(5)).unwrap();

        let pred = bag.predict(&x).unwrap();
        for p in pred.iter() {
            assert!(p.is_finite());
            assert!((0.0..=0.9).contains(p));
        }
    }

    #[test]
    fn test_split_counts_cover_features() {
        let (x, y) = toy_data();
        let config = BagConfig::default().with_n_trees(4).with_min_samples_split(2);
        let bag = TreeBag::fit(&x, &y, &config, &mut ChaCha8Rng::seed_from_u64(1)).unwrap();

        let counts = bag.split_counts();
        assert_eq!(counts.len(), 2);
        let total_splits: usize = bag.trees().iter().map(TreeNode::n_splits).sum();
        assert_eq!(counts.iter().sum::<usize>(), total_splits);
    }

    #[test]
    fn test_zero_trees_rejected() {
        let (x, y) = toy_data();
        let config = BagConfig::default().with_n_trees(0);
        let err = TreeBag::fit(&x, &y, &config, &mut ChaCha8Rng::seed_from_u64(0)).unwrap_err();
        assert!(matches!(err, QualityError::InvalidParameter { .. }));
    }
}
