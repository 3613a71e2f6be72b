//! Residual-fitting boosted ensemble
//!
//! Starts from the label mean and adds `learning_rate × learner(x)` for each
//! weak learner in order. Every round is fitted to the residuals left by the
//! rounds before it, so training is strictly sequential.

use super::config::{BoostConfig, WeakLearnerKind};
use super::decision_tree::{induce, TreeNode};
use super::linear_models::{check_bounds, RidgeRegressor};
use crate::dataset::check_training_inputs;
use crate::error::{QualityError, Result};
use ndarray::{Array1, Array2, ArrayView1, Zip};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// A fitted weak learner
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "model", rename_all = "snake_case")]
pub enum WeakLearner {
    Tree(TreeNode),
    Linear(RidgeRegressor),
}

impl WeakLearner {
    fn fit(x: &Array2<f64>, residuals: &Array1<f64>, kind: &WeakLearnerKind) -> Result<Self> {
        match kind {
            WeakLearnerKind::Tree(params) => Ok(WeakLearner::Tree(induce(x, residuals, params)?)),
            WeakLearnerKind::Linear(config) => {
                Ok(WeakLearner::Linear(RidgeRegressor::fit(x, residuals, config)?))
            }
        }
    }

    pub fn predict_row(&self, row: ArrayView1<f64>) -> f64 {
        match self {
            WeakLearner::Tree(tree) => tree.predict(&row),
            WeakLearner::Linear(model) => model.predict_row(row),
        }
    }

    fn predict(&self, x: &Array2<f64>) -> Array1<f64> {
        x.rows().into_iter().map(|row| self.predict_row(row)).collect()
    }
}

/// Ordered weak learners on top of a constant base prediction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoostedEnsemble {
    base_prediction: f64,
    learning_rate: f64,
    learners: Vec<WeakLearner>,
    label_bounds: (f64, f64),
    n_features: usize,
}

impl BoostedEnsemble {
    /// Fit `config.n_estimators` weak learners on successive residuals.
    ///
    /// Running predictions are clamped to the label bounds after every round.
    pub fn fit(x: &Array2<f64>, y: &Array1<f64>, config: &BoostConfig) -> Result<Self> {
        check_training_inputs(x, y)?;
        config.validate()?;

        let n_samples = x.nrows();
        let (lo, hi) = config.label_bounds.unwrap_or_else(|| observed_range(y));
        let base_prediction = y.sum() / n_samples as f64;
        let mut current = Array1::from_elem(n_samples, base_prediction.clamp(lo, hi));
        let mut learners = Vec::with_capacity(config.n_estimators);

        debug!(
            n_estimators = config.n_estimators,
            learning_rate = config.learning_rate,
            weak_learner = ?config.weak_learner,
            n_samples,
            "Training boosted ensemble"
        );

        for round in 0..config.n_estimators {
            let residuals = y - &current;
            let learner = WeakLearner::fit(x, &residuals, &config.weak_learner)?;
            let update = learner.predict(x);

            Zip::from(&mut current).and(&update).for_each(|c, &u| {
                *c = (*c + config.learning_rate * u).clamp(lo, hi);
            });
            learners.push(learner);

            if round + 1 == config.n_estimators {
                let rmse = ((y - &current).mapv(|r| r * r).sum() / n_samples as f64).sqrt();
                debug!(rounds = learners.len(), train_rmse = rmse, "Boosted ensemble trained");
            }
        }

        Ok(Self {
            base_prediction,
            learning_rate: config.learning_rate,
            learners,
            label_bounds: (lo, hi),
            n_features: x.ncols(),
        })
    }

    pub fn base_prediction(&self) -> f64 {
        self.base_prediction
    }

    pub fn learning_rate(&self) -> f64 {
        self.learning_rate
    }

    pub fn learners(&self) -> &[WeakLearner] {
        &self.learners
    }

    pub fn label_bounds(&self) -> (f64, f64) {
        self.label_bounds
    }

    pub fn n_features(&self) -> usize {
        self.n_features
    }

    /// Check scalars, label bounds and every weak learner against `n_features`
    pub fn validate(&self) -> Result<()> {
        if !self.base_prediction.is_finite() || !self.learning_rate.is_finite() {
            return Err(QualityError::Validation(
                "base prediction and learning rate must be finite".to_string(),
            ));
        }
        check_bounds("label_bounds", self.label_bounds)?;
        for learner in &self.learners {
            match learner {
                WeakLearner::Tree(tree) => tree.validate(self.n_features)?,
                WeakLearner::Linear(model) => model.validate(self.n_features)?,
            }
        }
        Ok(())
    }

    /// `clamp(base + learning_rate × Σ learner(row))`
    pub fn predict_row(&self, row: ArrayView1<f64>) -> f64 {
        let boost: f64 = self.learners.iter().map(|l| l.predict_row(row)).sum();
        let (lo, hi) = self.label_bounds;
        (self.base_prediction + self.learning_rate * boost).clamp(lo, hi)
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
}

fn observed_range(y: &Array1<f64>) -> (f64, f64) {
    y.iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| (lo.min(v), hi.max(v)))
}
