//! Trained model artifact
//!
//! A [`Model`] bundles the fitted ensemble with the feature ordering it was
//! trained against, its hyperparameters, training metrics and (optionally)
//! the fitted scaler. It is the only thing that leaves a training run and
//! round-trips through JSON.

use super::bagging::TreeBag;
use super::boosting::BoostedEnsemble;
use super::config::{BagConfig, BoostConfig, LinearConfig, TrainerConfig};
use super::linear_models::RidgeRegressor;
use super::metrics::Metrics;
use crate::dataset::FeatureVector;
use crate::error::{QualityError, Result};
use crate::preprocessing::MinMaxScaler;
use ndarray::{Array1, Array2, ArrayView1};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::debug;

/// Fitted predictor of one of the three kinds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "payload", rename_all = "kebab-case")]
pub enum Ensemble {
    TreeBag(TreeBag),
    Boosted(BoostedEnsemble),
    Linear(RidgeRegressor),
}

/// Discriminant of [`Ensemble`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ModelKind {
    TreeBag,
    Boosted,
    Linear,
}

impl fmt::Display for ModelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ModelKind::TreeBag => "tree-bag",
            ModelKind::Boosted => "boosted",
            ModelKind::Linear => "linear",
        };
        write!(f, "{}", name)
    }
}

impl Ensemble {
    /// Fit whichever ensemble `config` names
    pub fn fit<R: Rng + ?Sized>(
        x: &Array2<f64>,
        y: &Array1<f64>,
        config: &TrainerConfig,
        rng: &mut R,
    ) -> Result<Self> {
        match config {
            TrainerConfig::TreeBag(c) => Ok(Ensemble::TreeBag(TreeBag::fit(x, y, c, rng)?)),
            TrainerConfig::Boosted(c) => Ok(Ensemble::Boosted(BoostedEnsemble::fit(x, y, c)?)),
            TrainerConfig::Linear(c) => Ok(Ensemble::Linear(RidgeRegressor::fit(x, y, c)?)),
        }
    }

    /// Structural checks on a deserialized ensemble
    pub fn validate(&self) -> Result<()> {
        match self {
            Ensemble::TreeBag(bag) => bag.validate(),
            Ensemble::Boosted(boosted) => boosted.validate(),
            Ensemble::Linear(model) => model.validate(model.n_features()),
        }
    }

    pub fn kind(&self) -> ModelKind {
        match self {
            Ensemble::TreeBag(_) => ModelKind::TreeBag,
            Ensemble::Boosted(_) => ModelKind::Boosted,
            Ensemble::Linear(_) => ModelKind::Linear,
        }
    }

    pub fn n_features(&self) -> usize {
        match self {
            Ensemble::TreeBag(m) => m.n_features(),
            Ensemble::Boosted(m) => m.n_features(),
            Ensemble::Linear(m) => m.n_features(),
        }
    }

    pub fn predict_row(&self, row: ArrayView1<f64>) -> f64 {
        match self {
            Ensemble::TreeBag(m) => m.predict_row(row),
            Ensemble::Boosted(m) => m.predict_row(row),
            Ensemble::Linear(m) => m.predict_row(row),
        }
    }

    pub fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        match self {
            Ensemble::TreeBag(m) => m.predict(x),
            Ensemble::Boosted(m) => m.predict(x),
            Ensemble::Linear(m) => m.predict(x),
        }
    }
}

/// Serializable trained model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Model {
    /// Column order the ensemble expects, exactly as in training
    pub feature_names: Vec<String>,
    pub ensemble: Ensemble,
    pub hyperparameters: TrainerConfig,
    /// Metrics on the rows the model was fitted to
    pub training_metrics: Metrics,
    /// Scaling applied to aligned rows before the ensemble sees them
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scaler: Option<MinMaxScaler>,
}

impl Model {
    /// Train a model of the kind named by `config`.
    ///
    /// `x` must already be aligned to `feature_names` (and scaled, when a
    /// scaler is attached afterwards with [`Model::with_scaler`]).
    pub fn train<R: Rng + ?Sized>(
        x: &Array2<f64>,
        y: &Array1<f64>,
        feature_names: &[String],
        config: &TrainerConfig,
        rng: &mut R,
    ) -> Result<Self> {
        if feature_names.len() != x.ncols() {
            return Err(QualityError::ShapeMismatch {
                expected: format!("{} feature names", x.ncols()),
                actual: format!("{} feature names", feature_names.len()),
            });
        }

        let ensemble = Ensemble::fit(x, y, config, rng)?;
        Self::from_ensemble(ensemble, x, y, feature_names, config)
    }

    fn from_ensemble(
        ensemble: Ensemble,
        x: &Array2<f64>,
        y: &Array1<f64>,
        feature_names: &[String],
        config: &TrainerConfig,
    ) -> Result<Self> {
        if feature_names.len() != x.ncols() {
            return Err(QualityError::ShapeMismatch {
                expected: format!("{} feature names", x.ncols()),
                actual: format!("{} feature names", feature_names.len()),
            });
        }
        let training_metrics = Metrics::compute(&ensemble.predict(x)?, y)?;

        debug!(
            kind = %ensemble.kind(),
            n_samples = x.nrows(),
            n_features = x.ncols(),
            train_r2 = training_metrics.r2,
            "Model trained"
        );

        Ok(Self {
            feature_names: feature_names.to_vec(),
            ensemble,
            hyperparameters: *config,
            training_metrics,
            scaler: None,
        })
    }

    /// Attach the scaler that produced the training matrix
    pub fn with_scaler(mut self, scaler: MinMaxScaler) -> Result<Self> {
        if scaler.n_features() != self.feature_names.len() {
            return Err(QualityError::ShapeMismatch {
                expected: format!("{} scaled features", self.feature_names.len()),
                actual: format!("{} scaled features", scaler.n_features()),
            });
        }
        self.scaler = Some(scaler);
        Ok(self)
    }

    pub fn kind(&self) -> ModelKind {
        self.ensemble.kind()
    }

    /// Predict a single feature map.
    ///
    /// The map is reordered into `feature_names`; names it lacks are
    /// zero-filled and names the model does not know are ignored.
    pub fn predict(&self, features: &FeatureVector) -> f64 {
        let aligned = features.align(&self.feature_names);
        if aligned.missing > 0 || aligned.unknown > 0 {
            debug!(
                missing = aligned.missing,
                unknown = aligned.unknown,
                "Feature vector did not match model ordering; zero-filled"
            );
        }

        let mut values = aligned.values;
        if let Some(scaler) = &self.scaler {
            scaler.scale_in_place(&mut values);
        }
        self.ensemble.predict_row(ArrayView1::from(&values[..]))
    }

    /// Predict rows already aligned to `feature_names` (unscaled)
    pub fn predict_matrix(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        if x.ncols() != self.feature_names.len() {
            return Err(QualityError::ShapeMismatch {
                expected: format!("{} features", self.feature_names.len()),
                actual: format!("{} features", x.ncols()),
            });
        }
        match &self.scaler {
            Some(scaler) => self.ensemble.predict(&scaler.transform(x)?),
            None => self.ensemble.predict(x),
        }
    }

    /// Score the model on aligned, unscaled rows
    pub fn evaluate(&self, x: &Array2<f64>, y: &Array1<f64>) -> Result<Metrics> {
        Metrics::compute(&self.predict_matrix(x)?, y)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Parse and validate a serialized model.
    ///
    /// Anything that would make `predict` misbehave (out-of-range split
    /// features, non-finite values, empty bags, mis-sized weights, inverted
    /// bounds) is a [`QualityError::Serialization`].
    pub fn from_json(json: &str) -> Result<Self> {
        let model: Model = serde_json::from_str(json)?;
        model
            .ensemble
            .validate()
            .map_err(|e| QualityError::Serialization(format!("invalid model: {}", e)))?;
        if model.ensemble.n_features() != model.feature_names.len() {
            return Err(QualityError::Serialization(format!(
                "model expects {} features but lists {} names",
                model.ensemble.n_features(),
                model.feature_names.len()
            )));
        }
        if let Some(scaler) = &model.scaler {
            scaler
                .validate()
                .map_err(|e| QualityError::Serialization(format!("invalid model: {}", e)))?;
            if scaler.n_features() != model.feature_names.len() {
                return Err(QualityError::Serialization(format!(
                    "scaler covers {} features but model lists {} names",
                    scaler.n_features(),
                    model.feature_names.len()
                )));
            }
        }
        Ok(model)
    }
}

/// Train a tree-bag model
pub fn train_bag<R: Rng + ?Sized>(
    x: &Array2<f64>,
    y: &Array1<f64>,
    feature_names: &[String],
    config: &BagConfig,
    rng: &mut R,
) -> Result<Model> {
    Model::train(x, y, feature_names, &TrainerConfig::TreeBag(*config), rng)
}

/// Train a boosted model
pub fn train_boosted(
    x: &Array2<f64>,
    y: &Array1<f64>,
    feature_names: &[String],
    config: &BoostConfig,
) -> Result<Model> {
    let ensemble = Ensemble::Boosted(BoostedEnsemble::fit(x, y, config)?);
    Model::from_ensemble(ensemble, x, y, feature_names, &TrainerConfig::Boosted(*config))
}

/// Train a ridge regression model
pub fn train_linear(
    x: &Array2<f64>,
    y: &Array1<f64>,
    feature_names: &[String],
    config: &LinearConfig,
) -> Result<Model> {
    let ensemble = Ensemble::Linear(RidgeRegressor::fit(x, y, config)?);
    Model::from_ensemble(ensemble, x, y, feature_names, &TrainerConfig::Linear(*config))
}
