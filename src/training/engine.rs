//! Training engine
//!
//! One parameterized pipeline from labelled examples to a [`Model`]:
//!
//! 1. build the feature matrix
//! 2. optionally drop low-variance columns
//! 3. holdout split (train / validation / test)
//! 4. optionally min-max scale, fitted on the training rows
//! 5. optionally grid-search candidates on the validation rows
//! 6. fit the final model on the training rows
//! 7. score validation and test rows, k-fold cross-validate train + validation
//! 8. compute feature importance

use super::config::TrainerConfig;
use super::cross_validation::{cross_validate_with, fold_seeds, CrossValidationReport};
use super::metrics::Metrics;
use super::model::{Ensemble, Model};
use crate::dataset::{
    build_dataset, holdout_split, select_rows, FeatureMatrix, IngestionReport, LabelStats,
    ShuffleMode, SplitFractions, TrainingExample,
};
use crate::error::{QualityError, Result};
use crate::explainability::{importance_report, ImportanceResult, ImportanceStrategy};
use crate::optimizer::{grid_search, SearchResult};
use crate::preprocessing::{MinMaxScaler, VarianceThreshold};
use ndarray::{Array1, Array2};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::{debug, info, warn};

/// Engine configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingConfig {
    /// Model to train when no search candidates are given
    pub trainer: TrainerConfig,
    /// Seed for every random draw in the run
    pub seed: u64,
    /// Folds for cross-validation on train + validation rows; 0 disables it
    pub cv_folds: usize,
    pub fractions: SplitFractions,
    pub shuffle: ShuffleMode,
    /// Min-max scale features, fitted on the training rows
    pub normalize: bool,
    /// Drop columns whose variance is below this value
    pub min_feature_variance: Option<f64>,
    /// `None` skips importance
    pub importance: Option<ImportanceStrategy>,
    /// Candidates to grid-search on the validation rows
    pub search: Option<Vec<TrainerConfig>>,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            trainer: TrainerConfig::default(),
            seed: 42,
            cv_folds: 5,
            fractions: SplitFractions::default(),
            shuffle: ShuffleMode::default(),
            normalize: false,
            min_feature_variance: None,
            importance: Some(ImportanceStrategy::default()),
            search: None,
        }
    }
}

impl TrainingConfig {
    pub fn new(trainer: impl Into<TrainerConfig>) -> Self {
        Self {
            trainer: trainer.into(),
            ..Default::default()
        }
    }

    /// Parse from JSON; absent fields take their defaults
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Set seed
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Set number of cross-validation folds (0 disables)
    pub fn with_cv_folds(mut self, k: usize) -> Self {
        self.cv_folds = k;
        self
    }

    /// Set holdout fractions
    pub fn with_fractions(mut self, fractions: SplitFractions) -> Self {
        self.fractions = fractions;
        self
    }

    /// Set row shuffling before the holdout split
    pub fn with_shuffle(mut self, shuffle: ShuffleMode) -> Self {
        self.shuffle = shuffle;
        self
    }

    /// Enable min-max scaling
    pub fn with_normalize(mut self, normalize: bool) -> Self {
        self.normalize = normalize;
        self
    }

    /// Enable variance-threshold feature selection
    pub fn with_min_feature_variance(mut self, threshold: f64) -> Self {
        self.min_feature_variance = Some(threshold);
        self
    }

    /// Set importance strategy (`None` skips importance)
    pub fn with_importance(mut self, strategy: Option<ImportanceStrategy>) -> Self {
        self.importance = strategy;
        self
    }

    /// Grid-search these candidates instead of training `trainer` directly
    pub fn with_search(mut self, candidates: Vec<TrainerConfig>) -> Self {
        self.search = Some(candidates);
        self
    }

    pub fn validate(&self) -> Result<()> {
        self.trainer.validate()?;
        if self.cv_folds == 1 {
            return Err(QualityError::invalid_parameter(
                "cv_folds",
                self.cv_folds,
                "use 0 to disable cross-validation or at least 2 folds",
            ));
        }
        if let Some(threshold) = self.min_feature_variance {
            if !threshold.is_finite() || threshold < 0.0 {
                return Err(QualityError::invalid_parameter(
                    "min_feature_variance",
                    threshold,
                    "must be finite and non-negative",
                ));
            }
        }
        if let Some(ImportanceStrategy::Permutation { n_repeats: 0 }) = self.importance {
            return Err(QualityError::invalid_parameter(
                "importance.n_repeats",
                0,
                "must be at least 1",
            ));
        }
        Ok(())
    }
}

/// Row counts of the holdout slices
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SplitSizes {
    pub train: usize,
    pub validation: usize,
    pub test: usize,
}

/// Everything a training run produced
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingReport {
    pub model: Model,
    pub ingestion: IngestionReport,
    pub label_stats: Option<LabelStats>,
    /// Columns removed by variance-threshold selection
    pub dropped_features: Vec<String>,
    pub split: SplitSizes,
    pub validation: Option<Metrics>,
    pub test: Option<Metrics>,
    pub cross_validation: Option<CrossValidationReport>,
    pub importance: Option<ImportanceResult>,
    pub search: Option<SearchResult>,
    pub duration_secs: f64,
}

/// Single entry point for training runs
#[derive(Debug, Clone)]
pub struct TrainEngine {
    config: TrainingConfig,
}

impl TrainEngine {
    pub fn new(config: TrainingConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &TrainingConfig {
        &self.config
    }

    /// Build the dataset from `examples` and run the full pipeline
    pub fn run(&self, examples: &[TrainingExample]) -> Result<TrainingReport> {
        let data = build_dataset(examples)?;
        self.run_matrix(data)
    }

    /// Run the pipeline on an already materialized dataset
    pub fn run_matrix(&self, data: FeatureMatrix) -> Result<TrainingReport> {
        let start = Instant::now();
        let config = &self.config;
        let mut rng = ChaCha8Rng::seed_from_u64(config.seed);

        let label_stats = data.label_stats();
        info!(
            n_examples = data.n_samples(),
            n_features = data.n_features(),
            clean = data.report.is_clean(),
            "Dataset built"
        );
        if let Some(stats) = &label_stats {
            debug!(min = stats.min, max = stats.max, mean = stats.mean, std = stats.std, "Label statistics");
        }

        let FeatureMatrix {
            x,
            y,
            feature_names,
            report: ingestion,
            ..
        } = data;

        let (x, feature_names, dropped_features) = match config.min_feature_variance {
            Some(threshold) => {
                let selection = VarianceThreshold::new(threshold).fit(&x)?;
                let kept = selection.select_names(&feature_names);
                let dropped: Vec<String> = feature_names
                    .iter()
                    .filter(|name| !kept.contains(name))
                    .cloned()
                    .collect();
                if !dropped.is_empty() {
                    info!(kept = kept.len(), dropped = dropped.len(), "Low-variance features removed");
                }
                (selection.apply(&x), kept, dropped)
            }
            None => (x, feature_names, Vec::new()),
        };

        let split = holdout_split(x.nrows(), config.fractions, config.shuffle)?;
        let sizes = SplitSizes {
            train: split.train.len(),
            validation: split.validation.len(),
            test: split.test.len(),
        };
        info!(train = sizes.train, validation = sizes.validation, test = sizes.test, "Holdout split");

        let (x_train, y_train) = select_rows(&x, &y, &split.train);
        let (x_val, y_val) = select_rows(&x, &y, &split.validation);
        let (x_test, y_test) = select_rows(&x, &y, &split.test);

        let scaler = if config.normalize {
            Some(MinMaxScaler::fit(&x_train)?)
        } else {
            None
        };
        let scale = |m: &Array2<f64>| -> Result<Array2<f64>> {
            match &scaler {
                Some(s) => s.transform(m),
                None => Ok(m.clone()),
            }
        };
        let x_train_fit = scale(&x_train)?;

        let (trainer, search) = match &config.search {
            Some(candidates) => {
                if y_val.is_empty() {
                    return Err(QualityError::Validation(
                        "grid search needs a non-empty validation slice".to_string(),
                    ));
                }
                let result = grid_search(&x_train_fit, &y_train, &scale(&x_val)?, &y_val, candidates, &mut rng)?;
                let best = result
                    .best_config()
                    .ok_or_else(|| QualityError::Training("grid search produced no winner".to_string()))?;
                (best, Some(result))
            }
            None => (config.trainer, None),
        };

        info!(algorithm = trainer.name(), "Fitting final model");
        let mut model = Model::train(&x_train_fit, &y_train, &feature_names, &trainer, &mut rng)?;
        if let Some(s) = scaler {
            model = model.with_scaler(s)?;
        }

        let validation = evaluate_slice(&model, &x_val, &y_val)?;
        let test = evaluate_slice(&model, &x_test, &y_test)?;

        let cross_validation = if config.cv_folds >= 2 {
            let mut cv_rows = split.train.clone();
            cv_rows.extend_from_slice(&split.validation);
            let (x_cv, y_cv) = select_rows(&x, &y, &cv_rows);
            Some(cross_validate_scaled(&x_cv, &y_cv, config.cv_folds, &trainer, config.normalize, &mut rng)?)
        } else {
            None
        };

        let importance = match config.importance {
            Some(strategy) => {
                let (x_imp, y_imp) = if y_test.is_empty() { (&x_train, &y_train) } else { (&x_test, &y_test) };
                Some(importance_report(&model, x_imp, y_imp, strategy, &mut rng)?)
            }
            None => None,
        };

        if let Some(m) = &test {
            info!(r2 = m.r2, mae = m.mae, rmse = m.rmse, "Test metrics");
        }
        if let Some(cv) = &cross_validation {
            info!(r2 = cv.metrics.r2, std_r2 = cv.std_r2(), mae = cv.metrics.mae, "Cross-validation metrics");
        }
        if ingestion.non_finite_labels > 0 {
            warn!(count = ingestion.non_finite_labels, "Labels were coerced to 0; metrics may be skewed");
        }

        Ok(TrainingReport {
            model,
            ingestion,
            label_stats,
            dropped_features,
            split: sizes,
            validation,
            test,
            cross_validation,
            importance,
            search,
            duration_secs: start.elapsed().as_secs_f64(),
        })
    }
}

fn evaluate_slice(model: &Model, x: &Array2<f64>, y: &Array1<f64>) -> Result<Option<Metrics>> {
    if y.is_empty() {
        return Ok(None);
    }
    model.evaluate(x, y).map(Some)
}

/// K-fold CV where each fold fits its own scaler on its training rows
fn cross_validate_scaled<R: Rng + ?Sized>(
    x: &Array2<f64>,
    y: &Array1<f64>,
    k: usize,
    trainer: &TrainerConfig,
    normalize: bool,
    rng: &mut R,
) -> Result<CrossValidationReport> {
    let seeds = fold_seeds(x.nrows(), k, rng)?;

    cross_validate_with(
        x,
        y,
        k,
        |x_train, y_train, fold_idx| {
            let mut fold_rng = ChaCha8Rng::seed_from_u64(seeds[fold_idx]);
            if normalize {
                let (scaler, scaled) = MinMaxScaler::fit_transform(x_train)?;
                let ensemble = Ensemble::fit(&scaled, y_train, trainer, &mut fold_rng)?;
                Ok((Some(scaler), ensemble))
            } else {
                Ok((None, Ensemble::fit(x_train, y_train, trainer, &mut fold_rng)?))
            }
        },
        |(scaler, ensemble), x_val| match scaler {
            Some(s) => ensemble.predict(&s.transform(x_val)?),
            None => ensemble.predict(x_val),
        },
    )
}
