//! Quality Scoring Example
//!
//! Trains a repository quality model on synthetic feature maps, with a grid
//! search over the baseline sweep, and prints the resulting report.
//!
//! Run with `RUST_LOG=quality_forest=debug` for per-candidate logs.

use quality_forest::optimizer::ParameterGrid;
use quality_forest::prelude::*;
use rand::prelude::*;
use rand_chacha::ChaCha8Rng;

/// Synthetic repositories scored by a heuristic over their features
fn synthetic_repositories(n: usize, seed: u64) -> Vec<TrainingExample> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);

    (0..n)
        .map(|i| {
            let stars: f64 = rng.gen_range(0.0..5000.0);
            let has_ci = rng.gen_bool(0.6);
            let has_readme = rng.gen_bool(0.85);
            let test_files: f64 = rng.gen_range(0..40) as f64;
            let open_issues: f64 = rng.gen_range(0..200) as f64;

            let label = (0.15
                + 0.25 * f64::from(u8::from(has_ci))
                + 0.15 * f64::from(u8::from(has_readme))
                + 0.2 * (test_files / 40.0)
                + 0.15 * (stars.ln_1p() / 5000f64.ln_1p())
                - 0.1 * (open_issues / 200.0)
                + rng.gen_range(-0.05..0.05))
            .clamp(0.0, 1.0);

            let mut features = FeatureVector::new()
                .with("stars", stars)
                .with("hasCI", has_ci)
                .with("testFiles", test_files)
                .with("openIssues", open_issues)
                .with("primaryLanguage", "rust");
            // Booleans are not numeric; the extractor encodes the ones it wants kept
            features.insert("hasReadme", if has_readme { 1.0 } else { 0.0 });
            features.insert("hasCIFlag", if has_ci { 1.0 } else { 0.0 });

            TrainingExample::new(format!("example/repo-{:03}", i), features, label)
        })
        .collect()
}

fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "quality_forest=info".into()),
        )
        .init();

    let examples = synthetic_repositories(300, 7);
    println!("Dataset: {} repositories", examples.len());

    let mut candidates = ParameterGrid::baseline_sweep();
    candidates.extend(
        ParameterGrid::new()
            .with_n_estimators(vec![50, 100])
            .with_learning_rate(vec![0.05, 0.1])
            .boost_candidates(),
    );

    let config = TrainingConfig::default()
        .with_shuffle(ShuffleMode::Seeded(42))
        .with_normalize(true)
        .with_min_feature_variance(1e-6)
        .with_search(candidates);

    let engine = TrainEngine::new(config)?;
    let report = engine.run(&examples)?;

    println!("\nTraining Results:");
    println!("  Model: {}", report.model.kind());
    println!("  Features: {:?}", report.model.feature_names);
    if let Some(test) = &report.test {
        println!("  Test R²: {:.4}  MAE: {:.4}  RMSE: {:.4}", test.r2, test.mae, test.rmse);
    }
    if let Some(cv) = &report.cross_validation {
        println!(
            "  CV R²: {:.4} ± {:.4} over {} folds",
            cv.metrics.r2,
            cv.std_r2(),
            cv.n_folds()
        );
    }
    if let Some(importance) = &report.importance {
        println!("\nTop features:");
        for (name, score) in importance.top_k(3) {
            println!("  {:<12} {:.4}", name, score);
        }
    }
    println!("  Training time: {:.3}s", report.duration_secs);

    let sample = FeatureVector::new()
        .with("stars", 1200.0)
        .with("hasCIFlag", 1.0)
        .with("hasReadme", 1.0)
        .with("testFiles", 25.0);
    println!("\nPredicted quality for sample repository: {:.3}", report.model.predict(&sample));

    let artifact = report.model.to_json()?;
    println!("Serialized model: {} bytes", artifact.len());

    Ok(())
}
