//! Integration test: behavioral guarantees of the training core

use approx::assert_abs_diff_eq;
use ndarray::{array, concatenate, Array1, Array2, Axis};
use quality_forest::dataset::{fold_sizes, k_fold};
use quality_forest::prelude::*;
use quality_forest::training::{TreeBag, TreeNode};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

/// Two informative columns plus deterministic noise
fn noisy_regression(n: usize, seed: u64) -> (Array2<f64>, Array1<f64>) {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let mut x = Array2::zeros((n, 2));
    let mut y = Array1::zeros(n);
    for i in 0..n {
        let a: f64 = rng.gen_range(0.0..10.0);
        let b: f64 = rng.gen_range(0.0..5.0);
        x[[i, 0]] = a;
        x[[i, 1]] = b;
        y[i] = 0.05 * a + 0.02 * b + rng.gen_range(-0.2..0.2);
    }
    (x, y)
}

fn names(n: usize) -> Vec<String> {
    (0..n).map(|i| format!("f{}", i)).collect()
}

#[test]
fn test_zero_depth_tree_is_mean_leaf() {
    let (x, y) = noisy_regression(23, 1);
    let expected = y.iter().sum::<f64>() / y.len() as f64;

    for min_samples_split in [0, 1, 2, 50] {
        let root = induce(&x, &y, &TreeParams::new(0, min_samples_split)).unwrap();
        match root {
            TreeNode::Leaf { value, n_samples } => {
                assert_eq!(value, expected);
                assert_eq!(n_samples, 23);
            }
            other => panic!("expected a leaf, got {:?}", other),
        }
    }
}

#[test]
fn test_perfectly_separable_split() {
    let x = array![[0.0], [1.0], [2.0], [3.0]];
    let y = array![0.0, 0.0, 1.0, 1.0];

    let root = induce(&x, &y, &TreeParams::new(1, 1)).unwrap();
    match &root {
        TreeNode::Split {
            feature_idx,
            threshold,
            ..
        } => {
            assert_eq!(*feature_idx, 0);
            assert_eq!(*threshold, 1.5);
        }
        other => panic!("expected a split, got {:?}", other),
    }
    assert_eq!(root.predict(&[0.5][..]), 0.0);
    assert_eq!(root.predict(&[2.5][..]), 1.0);
}

#[test]
fn test_single_tree_bag_matches_its_tree() {
    let (x, y) = noisy_regression(30, 2);
    let config = BagConfig::default()
        .with_n_trees(1)
        .with_tree_params(TreeParams::unbounded());
    let mut rng = ChaCha8Rng::seed_from_u64(7);

    let bag = TreeBag::fit(&x, &y, &config, &mut rng).unwrap();
    assert_eq!(bag.n_trees(), 1);

    let tree = &bag.trees()[0];
    for row in x.rows() {
        assert_eq!(bag.predict_row(row), tree.predict(&row));
    }
}

#[test]
fn test_cross_validated_r2_never_beats_training_r2() {
    let (x, y) = noisy_regression(60, 3);
    let feature_names = names(2);

    let configs: Vec<TrainerConfig> = vec![
        BagConfig::default().with_n_trees(10).into(),
        BoostConfig::default().with_n_estimators(20).into(),
        LinearConfig::default().into(),
    ];

    for config in configs {
        let mut rng = ChaCha8Rng::seed_from_u64(11);
        let model = Model::train(&x, &y, &feature_names, &config, &mut rng).unwrap();
        let in_sample = model.evaluate(&x, &y).unwrap();

        let cv = cross_validate(&x, &y, 5, &config, &mut rng).unwrap();
        assert!(
            cv.metrics.r2 <= in_sample.r2,
            "{}: cv r2 {} exceeded training r2 {}",
            config.name(),
            cv.metrics.r2,
            in_sample.r2
        );
    }
}

#[test]
fn test_constant_column_has_zero_importance() {
    let (x, y) = noisy_regression(40, 4);
    let constant = Array2::from_elem((x.nrows(), 1), 3.0);
    let x = concatenate(Axis(1), &[x.view(), constant.view()]).unwrap();
    let feature_names = vec!["a".to_string(), "b".to_string(), "constant".to_string()];

    let configs: Vec<TrainerConfig> = vec![
        BagConfig::default().with_n_trees(8).into(),
        BoostConfig::default().with_n_estimators(10).into(),
        LinearConfig::default().into(),
    ];

    for config in configs {
        let mut rng = ChaCha8Rng::seed_from_u64(5);
        let model = Model::train(&x, &y, &feature_names, &config, &mut rng).unwrap();
        let ranking = feature_importance(
            &model,
            &x,
            &y,
            ImportanceStrategy::Permutation { n_repeats: 4 },
            &mut rng,
        )
        .unwrap();

        let score = ranking
            .iter()
            .find(|(name, _)| name == "constant")
            .map(|(_, s)| *s)
            .unwrap();
        assert_eq!(score, 0.0, "{}", config.name());
    }
}

#[test]
fn test_fold_sizes_absorb_remainder() {
    assert_eq!(fold_sizes(17, 5).unwrap(), vec![3, 3, 3, 3, 5]);

    let folds = k_fold(17, 5).unwrap();
    let mut seen = vec![0usize; 17];
    for fold in &folds {
        assert_eq!(fold.train_indices.len() + fold.validation_indices.len(), 17);
        for &i in &fold.validation_indices {
            seen[i] += 1;
        }
    }
    assert!(seen.iter().all(|&count| count == 1));
}

#[test]
fn test_constant_labels_r2_is_finite() {
    let y = array![5.0, 5.0, 5.0, 5.0];

    let exact = Metrics::compute(&array![5.0, 5.0, 5.0, 5.0], &y).unwrap();
    assert_eq!(exact.r2, 1.0);

    let off = Metrics::compute(&array![4.0, 5.0, 6.0, 5.0], &y).unwrap();
    assert_eq!(off.r2, 0.0);
    assert_abs_diff_eq!(off.mae, 0.5, epsilon = 1e-12);
    assert!(off.rmse.is_finite());
}
