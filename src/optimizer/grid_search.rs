//! Exhaustive grid search over trainer configurations

use crate::error::{QualityError, Result};
use crate::training::{
    BagConfig, BoostConfig, Ensemble, Metrics, TrainerConfig, TreeParams, WeakLearnerKind,
};
use ndarray::{Array1, Array2};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::{info, warn};

/// Outcome of one candidate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateResult {
    pub index: usize,
    pub config: TrainerConfig,
    /// Validation metrics, `None` when the candidate failed
    pub metrics: Option<Metrics>,
    /// Failure message, `None` on success
    pub error: Option<String>,
    pub duration_secs: f64,
}

impl CandidateResult {
    pub fn succeeded(&self) -> bool {
        self.metrics.is_some()
    }
}

/// Every candidate's result plus the winner
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    pub candidates: Vec<CandidateResult>,
    pub best_idx: Option<usize>,
    pub total_duration_secs: f64,
}

impl SearchResult {
    fn new() -> Self {
        Self {
            candidates: Vec::new(),
            best_idx: None,
            total_duration_secs: 0.0,
        }
    }

    /// Record a candidate; failed candidates never become best
    fn add_candidate(&mut self, result: CandidateResult) {
        let idx = self.candidates.len();

        let is_better = match (&result.metrics, self.best()) {
            (None, _) => false,
            (Some(_), None) => true,
            (Some(m), Some(best)) => best.metrics.map_or(true, |b| m.is_better_than(&b)),
        };
        if is_better {
            self.best_idx = Some(idx);
        }

        self.candidates.push(result);
    }

    /// Winning candidate (highest R², then lowest MAE, then lowest index)
    pub fn best(&self) -> Option<&CandidateResult> {
        self.best_idx.map(|idx| &self.candidates[idx])
    }

    pub fn best_config(&self) -> Option<TrainerConfig> {
        self.best().map(|c| c.config)
    }

    pub fn best_metrics(&self) -> Option<Metrics> {
        self.best().and_then(|c| c.metrics)
    }

    pub fn n_failed(&self) -> usize {
        self.candidates.iter().filter(|c| !c.succeeded()).count()
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Train every candidate on `(x, y)` and score it on `(x_val, y_val)`.
///
/// Candidates run in parallel, each with a generator seeded from `rng`. A
/// failing candidate is recorded with its error and skipped for selection;
/// only an empty candidate list or a sweep where every candidate failed is
/// an error.
pub fn grid_search<R: Rng + ?Sized>(
    x: &Array2<f64>,
    y: &Array1<f64>,
    x_val: &Array2<f64>,
    y_val: &Array1<f64>,
    candidates: &[TrainerConfig],
    rng: &mut R,
) -> Result<SearchResult> {
    if candidates.is_empty() {
        return Err(QualityError::Validation("grid search needs at least one candidate".to_string()));
    }

    let start = Instant::now();
    let seeds: Vec<u64> = candidates.iter().map(|_| rng.gen()).collect();

    let outcomes: Vec<CandidateResult> = candidates
        .par_iter()
        .zip(seeds)
        .enumerate()
        .map(|(index, (config, seed))| {
            let trial_start = Instant::now();
            let outcome = evaluate_candidate(x, y, x_val, y_val, config, seed);
            let duration_secs = trial_start.elapsed().as_secs_f64();

            match outcome {
                Ok(metrics) => CandidateResult {
                    index,
                    config: *config,
                    metrics: Some(metrics),
                    error: None,
                    duration_secs,
                },
                Err(e) => CandidateResult {
                    index,
                    config: *config,
                    metrics: None,
                    error: Some(e.to_string()),
                    duration_secs,
                },
            }
        })
        .collect();

    let mut result = SearchResult::new();
    for outcome in outcomes {
        match (&outcome.metrics, &outcome.error) {
            (Some(m), _) => info!(
                candidate = outcome.index,
                algorithm = outcome.config.name(),
                r2 = m.r2,
                mae = m.mae,
                rmse = m.rmse,
                "Candidate evaluated"
            ),
            (None, err) => warn!(
                candidate = outcome.index,
                algorithm = outcome.config.name(),
                error = err.as_deref().unwrap_or("unknown"),
                "Candidate failed"
            ),
        }
        result.add_candidate(outcome);
    }
    result.total_duration_secs = start.elapsed().as_secs_f64();

    match result.best() {
        Some(best) => {
            info!(
                best = best.index,
                n_candidates = result.candidates.len(),
                n_failed = result.n_failed(),
                "Grid search finished"
            );
            Ok(result)
        }
        None => Err(QualityError::Training(format!(
            "all {} grid-search candidates failed",
            candidates.len()
        ))),
    }
}

fn evaluate_candidate(
    x: &Array2<f64>,
    y: &Array1<f64>,
    x_val: &Array2<f64>,
    y_val: &Array1<f64>,
    config: &TrainerConfig,
    seed: u64,
) -> Result<Metrics> {
    config.validate()?;
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let ensemble = Ensemble::fit(x, y, config, &mut rng)?;
    Metrics::compute(&ensemble.predict(x_val)?, y_val)
}

/// Cartesian candidate builder.
///
/// Empty axes fall back to the corresponding default value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParameterGrid {
    pub n_trees: Vec<usize>,
    pub max_depth: Vec<usize>,
    pub min_samples_split: Vec<usize>,
    pub n_estimators: Vec<usize>,
    pub learning_rate: Vec<f64>,
    pub weak_learners: Vec<WeakLearnerKind>,
}

impl ParameterGrid {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_n_trees(mut self, values: impl Into<Vec<usize>>) -> Self {
        self.n_trees = values.into();
        self
    }

    pub fn with_max_depth(mut self, values: impl Into<Vec<usize>>) -> Self {
        self.max_depth = values.into();
        self
    }

    pub fn with_min_samples_split(mut self, values: impl Into<Vec<usize>>) -> Self {
        self.min_samples_split = values.into();
        self
    }

    pub fn with_n_estimators(mut self, values: impl Into<Vec<usize>>) -> Self {
        self.n_estimators = values.into();
        self
    }

    pub fn with_learning_rate(mut self, values: impl Into<Vec<f64>>) -> Self {
        self.learning_rate = values.into();
        self
    }

    pub fn with_weak_learners(mut self, values: impl Into<Vec<WeakLearnerKind>>) -> Self {
        self.weak_learners = values.into();
        self
    }

    /// n_trees × max_depth × min_samples_split tree-bag candidates
    pub fn bag_candidates(&self) -> Vec<TrainerConfig> {
        let defaults = BagConfig::default();
        let n_trees = or_default(&self.n_trees, defaults.n_trees);
        let depths = or_default(&self.max_depth, defaults.tree.max_depth.unwrap_or(10));
        let splits = or_default(&self.min_samples_split, defaults.tree.min_samples_split);

        let mut out = Vec::with_capacity(n_trees.len() * depths.len() * splits.len());
        for &n in &n_trees {
            for &depth in &depths {
                for &split in &splits {
                    out.push(TrainerConfig::TreeBag(
                        BagConfig::default()
                            .with_n_trees(n)
                            .with_tree_params(TreeParams::new(depth, split)),
                    ));
                }
            }
        }
        out
    }

    /// n_estimators × learning_rate × weak learner boosted candidates
    pub fn boost_candidates(&self) -> Vec<TrainerConfig> {
        let defaults = BoostConfig::default();
        let rounds = or_default(&self.n_estimators, defaults.n_estimators);
        let rates = or_default(&self.learning_rate, defaults.learning_rate);
        let learners = or_default(&self.weak_learners, defaults.weak_learner);

        let mut out = Vec::with_capacity(rounds.len() * rates.len() * learners.len());
        for &n in &rounds {
            for &lr in &rates {
                for &learner in &learners {
                    out.push(TrainerConfig::Boosted(
                        BoostConfig::default()
                            .with_n_estimators(n)
                            .with_learning_rate(lr)
                            .with_weak_learner(learner),
                    ));
                }
            }
        }
        out
    }

    /// The one-axis-at-a-time tree-bag sweep around the 50/10/10 baseline
    pub fn baseline_sweep() -> Vec<TrainerConfig> {
        [
            (50, 10, 10),
            (100, 10, 10),
            (200, 10, 10),
            (50, 15, 10),
            (50, 20, 10),
            (50, 10, 5),
            (50, 10, 20),
            (100, 15, 10),
            (200, 15, 10),
        ]
        .into_iter()
        .map(|(n, depth, split)| {
            TrainerConfig::TreeBag(
                BagConfig::default()
                    .with_n_trees(n)
                    .with_tree_params(TreeParams::new(depth, split)),
            )
        })
        .collect()
    }
}

fn or_default<T: Clone>(values: &[T], default: T) -> Vec<T> {
    if values.is_empty() {
        vec![default]
    } else {
        values.to_vec()
    }
}
