//! Integration test: dataset to serialized model

use approx::assert_abs_diff_eq;
use ndarray::{Array1, Array2};
use quality_forest::explainability::importance_report;
use quality_forest::prelude::*;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

/// Repositories whose score follows CI presence and test count
fn repositories(n: usize) -> Vec<TrainingExample> {
    (0..n)
        .map(|i| {
            let has_ci = if i % 3 == 0 { 0.0 } else { 1.0 };
            let test_files = (i % 7) as f64;
            let stars = ((i * 37) % 101) as f64;
            let label = 0.2 + 0.4 * has_ci + 0.05 * test_files;

            let mut features = FeatureVector::new()
                .with("hasCI", has_ci)
                .with("testFiles", test_files)
                .with("language", "rust");
            // Sparse key: absent on half the rows
            if i % 2 == 0 {
                features.insert("stars", stars);
            }
            TrainingExample::new(format!("owner/repo-{}", i), features, label)
        })
        .collect()
}

#[test]
fn test_build_dataset_aligns_columns() -> anyhow::Result<()> {
    let data = build_dataset(&repositories(10))?;

    assert_eq!(data.feature_names, vec!["hasCI", "stars", "testFiles"]);
    assert_eq!(data.x.shape(), &[10, 3]);
    assert_eq!(data.x[[1, 1]], 0.0);
    assert_eq!(data.ids[3], "owner/repo-3");
    Ok(())
}

#[test]
fn test_empty_input_is_rejected() {
    let err = build_dataset(&[]).unwrap_err();
    assert!(matches!(err, QualityError::EmptyDataset(_)));
}

#[test]
fn test_predict_reorders_and_zero_fills() -> anyhow::Result<()> {
    let data = build_dataset(&repositories(40))?;
    let mut rng = ChaCha8Rng::seed_from_u64(42);
    let model = train_bag(
        &data.x,
        &data.y,
        &data.feature_names,
        &BagConfig::default().with_n_trees(10),
        &mut rng,
    )?;

    // Same row built in a different key order gives the same prediction
    let forward = FeatureVector::new()
        .with("hasCI", 1.0)
        .with("stars", 12.0)
        .with("testFiles", 4.0);
    let backward = FeatureVector::new()
        .with("testFiles", 4.0)
        .with("stars", 12.0)
        .with("hasCI", 1.0);
    assert_eq!(model.predict(&forward), model.predict(&backward));

    // Missing keys behave like explicit zeros; unknown keys are ignored
    let sparse = FeatureVector::new().with("hasCI", 1.0).with("unseen", 99.0);
    let explicit = FeatureVector::new()
        .with("hasCI", 1.0)
        .with("stars", 0.0)
        .with("testFiles", 0.0);
    let score = model.predict(&sparse);
    assert!(score.is_finite());
    assert_eq!(score, model.predict(&explicit));
    Ok(())
}

#[test]
fn test_evaluate_and_cross_validate() -> anyhow::Result<()> {
    let data = build_dataset(&repositories(50))?;
    let mut rng = ChaCha8Rng::seed_from_u64(3);
    let config: TrainerConfig = BagConfig::default().with_n_trees(15).into();

    let model = Model::train(&data.x, &data.y, &data.feature_names, &config, &mut rng)?;
    let metrics = model.evaluate(&data.x, &data.y)?;
    assert!(metrics.r2 > 0.8);
    assert!(metrics.mae >= 0.0 && metrics.rmse >= metrics.mae);
    assert_eq!(metrics, model.training_metrics);

    let cv = cross_validate(&data.x, &data.y, 5, &config, &mut rng)?;
    assert_eq!(cv.n_folds(), 5);
    assert!(cv.metrics.std_r2.is_some());
    assert!(cv.metrics.r2 <= metrics.r2);

    let too_many = cross_validate(&data.x, &data.y, 51, &config, &mut rng).unwrap_err();
    assert!(matches!(too_many, QualityError::DegenerateSplit { .. }));
    Ok(())
}

#[test]
fn test_boosted_predictions_stay_in_label_range() -> anyhow::Result<()> {
    let data = build_dataset(&repositories(40))?;
    let stats = data.label_stats().unwrap();
    let config = BoostConfig::default()
        .with_n_estimators(30)
        .with_learning_rate(0.3)
        .with_weak_learner(WeakLearnerKind::Linear(LinearConfig::default()));

    let model = train_boosted(&data.x, &data.y, &data.feature_names, &config)?;
    let extreme = FeatureVector::new()
        .with("hasCI", 50.0)
        .with("testFiles", 500.0);
    let score = model.predict(&extreme);
    assert!(score >= stats.min - 1e-12 && score <= stats.max + 1e-12);
    Ok(())
}

#[test]
fn test_importance_ranks_informative_features() -> anyhow::Result<()> {
    let data = build_dataset(&repositories(60))?;
    let mut rng = ChaCha8Rng::seed_from_u64(9);
    let model = train_bag(
        &data.x,
        &data.y,
        &data.feature_names,
        &BagConfig::default().with_n_trees(20),
        &mut rng,
    )?;

    let ranking = feature_importance(&model, &data.x, &data.y, ImportanceStrategy::default(), &mut rng)?;
    assert_eq!(ranking.len(), 3);
    assert_eq!(ranking[0].0, "hasCI");
    assert!(ranking.windows(2).all(|w| w[0].1 >= w[1].1));

    let splits = importance_report(&model, &data.x, &data.y, ImportanceStrategy::SplitFrequency, &mut rng)?;
    let total: f64 = splits.importances_mean.iter().sum();
    assert_abs_diff_eq!(total, 1.0, epsilon = 1e-9);
    Ok(())
}

#[test]
fn test_grid_search_records_every_candidate() -> anyhow::Result<()> {
    let data = build_dataset(&repositories(60))?;
    let (x_train, y_train) = data.select_rows(&(0..45).collect::<Vec<_>>());
    let (x_val, y_val) = data.select_rows(&(45..60).collect::<Vec<_>>());

    let candidates: Vec<TrainerConfig> = vec![
        BagConfig::default().with_n_trees(10).with_max_depth(1).into(),
        BagConfig::default().with_n_trees(0).into(),
        BagConfig::default().with_n_trees(10).into(),
        LinearConfig::default().into(),
    ];
    let mut rng = ChaCha8Rng::seed_from_u64(1);
    let result = grid_search(&x_train, &y_train, &x_val, &y_val, &candidates, &mut rng)?;

    assert_eq!(result.candidates.len(), 4);
    assert_eq!(result.n_failed(), 1);
    assert!(result.candidates[1].error.is_some());
    assert!(result.candidates[1].metrics.is_none());

    let best = result.best().unwrap();
    assert_ne!(best.index, 1);
    let best_r2 = best.metrics.unwrap().r2;
    for candidate in result.candidates.iter().filter_map(|c| c.metrics) {
        assert!(candidate.r2 <= best_r2);
    }
    Ok(())
}

#[test]
fn test_grid_search_with_only_failures_is_an_error() {
    let x = ndarray::array![[0.0], [1.0], [2.0]];
    let y = Array1::from_vec(vec![0.0, 0.5, 1.0]);
    let candidates: Vec<TrainerConfig> = vec![BagConfig::default().with_n_trees(0).into()];
    let mut rng = ChaCha8Rng::seed_from_u64(1);

    assert!(grid_search(&x, &y, &x, &y, &candidates, &mut rng).is_err());
    assert!(grid_search(&x, &y, &x, &y, &[], &mut rng).is_err());
}

#[test]
fn test_model_json_roundtrip() -> anyhow::Result<()> {
    let data = build_dataset(&repositories(30))?;
    let mut rng = ChaCha8Rng::seed_from_u64(12);
    let model = train_bag(
        &data.x,
        &data.y,
        &data.feature_names,
        &BagConfig::default().with_n_trees(5),
        &mut rng,
    )?;

    let json = model.to_json()?;
    let document: serde_json::Value = serde_json::from_str(&json)?;
    assert_eq!(
        document["feature_names"],
        serde_json::json!(["hasCI", "stars", "testFiles"])
    );

    let restored = Model::from_json(&json)?;
    assert_eq!(restored, model);
    let sample = FeatureVector::new().with("hasCI", 1.0).with("testFiles", 2.0);
    assert_eq!(restored.predict(&sample), model.predict(&sample));
    Ok(())
}

#[test]
fn test_unbounded_model_survives_json() -> anyhow::Result<()> {
    // Geometric labels grow a chain far deeper than 128 levels
    let n = 300;
    let x = Array2::from_shape_fn((n, 1), |(i, _)| i as f64);
    let y = Array1::from_shape_fn(n, |i| 3f64.powi(i as i32));
    let config = BagConfig::default()
        .with_n_trees(1)
        .with_tree_params(TreeParams::unbounded());
    let mut rng = ChaCha8Rng::seed_from_u64(5);
    let model = train_bag(&x, &y, &["rank".to_string()], &config, &mut rng)?;

    let restored = Model::from_json(&model.to_json()?)?;
    assert_eq!(restored, model);
    assert_eq!(restored.predict_matrix(&x)?, model.predict_matrix(&x)?);
    Ok(())
}

#[test]
fn test_engine_run_with_shuffled_holdout() -> anyhow::Result<()> {
    let config = TrainingConfig::new(BagConfig::default().with_n_trees(10))
        .with_shuffle(ShuffleMode::Seeded(7))
        .with_cv_folds(4)
        .with_normalize(true);
    let engine = TrainEngine::new(config)?;
    let report = engine.run(&repositories(60))?;

    assert_eq!(report.split.train, 42);
    assert_eq!(report.split.validation, 9);
    assert_eq!(report.split.test, 9);
    assert!(report.model.scaler.is_some());
    assert_eq!(report.cross_validation.as_ref().map(|cv| cv.n_folds()), Some(4));
    assert!(report.importance.is_some());

    let restored = Model::from_json(&report.model.to_json()?)?;
    let sample = FeatureVector::new().with("hasCI", 1.0).with("testFiles", 6.0);
    assert_eq!(restored.predict(&sample), report.model.predict(&sample));
    Ok(())
}
