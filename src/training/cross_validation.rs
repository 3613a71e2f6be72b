//! K-fold cross-validation
//!
//! Folds are contiguous (see [`crate::dataset::k_fold`]) and independent, so
//! they are trained in parallel. Each fold's generator is seeded up front from
//! the caller's RNG.

use super::config::TrainerConfig;
use super::metrics::Metrics;
use super::model::Ensemble;
use crate::dataset::{fold_sizes, k_fold, select_rows, Fold};
use crate::error::Result;
use ndarray::{Array1, Array2};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Metrics of one held-out fold
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FoldResult {
    pub fold_idx: usize,
    pub n_train: usize,
    pub n_validation: usize,
    pub metrics: Metrics,
}

/// Aggregated cross-validation outcome
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrossValidationReport {
    /// Mean metrics across folds; `std_r2` is always set
    pub metrics: Metrics,
    pub folds: Vec<FoldResult>,
}

impl CrossValidationReport {
    pub fn n_folds(&self) -> usize {
        self.folds.len()
    }

    /// Population std of R² across folds
    pub fn std_r2(&self) -> f64 {
        self.metrics.std_r2.unwrap_or(0.0)
    }
}

/// Cross-validate arbitrary train/predict functions.
///
/// `train` receives the fold's training rows and its index; `predict`
/// scores the fold's validation rows with the trained model.
pub fn cross_validate_with<M, T, P>(
    x: &Array2<f64>,
    y: &Array1<f64>,
    k: usize,
    train: T,
    predict: P,
) -> Result<CrossValidationReport>
where
    T: Fn(&Array2<f64>, &Array1<f64>, usize) -> Result<M> + Sync,
    P: Fn(&M, &Array2<f64>) -> Result<Array1<f64>> + Sync,
{
    let folds = k_fold(x.nrows(), k)?;

    let results = folds
        .par_iter()
        .map(|fold| run_fold(x, y, fold, &train, &predict))
        .collect::<Result<Vec<_>>>()?;

    let fold_metrics: Vec<Metrics> = results.iter().map(|r| r.metrics).collect();
    let metrics = Metrics::aggregate(&fold_metrics)?;

    debug!(
        k,
        mean_r2 = metrics.r2,
        std_r2 = ?metrics.std_r2,
        mean_mae = metrics.mae,
        "Cross-validation finished"
    );

    Ok(CrossValidationReport {
        metrics,
        folds: results,
    })
}

fn run_fold<M, T, P>(
    x: &Array2<f64>,
    y: &Array1<f64>,
    fold: &Fold,
    train: &T,
    predict: &P,
) -> Result<FoldResult>
where
    T: Fn(&Array2<f64>, &Array1<f64>, usize) -> Result<M>,
    P: Fn(&M, &Array2<f64>) -> Result<Array1<f64>>,
{
    let (x_train, y_train) = select_rows(x, y, &fold.train_indices);
    let (x_val, y_val) = select_rows(x, y, &fold.validation_indices);

    let model = train(&x_train, &y_train, fold.fold_idx)?;
    let metrics = Metrics::compute(&predict(&model, &x_val)?, &y_val)?;

    debug!(fold = fold.fold_idx, r2 = metrics.r2, mae = metrics.mae, "Fold evaluated");

    Ok(FoldResult {
        fold_idx: fold.fold_idx,
        n_train: y_train.len(),
        n_validation: y_val.len(),
        metrics,
    })
}

/// One generator seed per fold, drawn only once `k` is known to fit `n_samples`
pub(crate) fn fold_seeds<R: Rng + ?Sized>(n_samples: usize, k: usize, rng: &mut R) -> Result<Vec<u64>> {
    fold_sizes(n_samples, k)?;
    Ok((0..k).map(|_| rng.gen()).collect())
}

/// Cross-validate the model described by `config`
pub fn cross_validate<R: Rng + ?Sized>(
    x: &Array2<f64>,
    y: &Array1<f64>,
    k: usize,
    config: &TrainerConfig,
    rng: &mut R,
) -> Result<CrossValidationReport> {
    config.validate()?;
    let seeds = fold_seeds(x.nrows(), k, rng)?;

    cross_validate_with(
        x,
        y,
        k,
        |x_train, y_train, fold_idx| {
            let mut fold_rng = ChaCha8Rng::seed_from_u64(seeds[fold_idx]);
            Ensemble::fit(x_train, y_train, config, &mut fold_rng)
        },
        |model, x_val| model.predict(x_val),
    )
}
