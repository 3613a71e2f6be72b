//! Hyperparameters for the three model kinds

use crate::error::{QualityError, Result};
use serde::{Deserialize, Serialize};

pub use super::decision_tree::TreeParams;
pub use super::linear_models::LinearConfig;

/// Bootstrap-aggregated tree ensemble
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BagConfig {
    pub n_trees: usize,
    #[serde(flatten)]
    pub tree: TreeParams,
}

impl Default for BagConfig {
    fn default() -> Self {
        Self {
            n_trees: 50,
            tree: TreeParams::default(),
        }
    }
}

impl BagConfig {
    /// Set number of trees
    pub fn with_n_trees(mut self, n_trees: usize) -> Self {
        self.n_trees = n_trees;
        self
    }

    /// Set maximum tree depth
    pub fn with_max_depth(mut self, depth: usize) -> Self {
        self.tree.max_depth = Some(depth);
        self
    }

    /// Set minimum samples to split
    pub fn with_min_samples_split(mut self, min_samples: usize) -> Self {
        self.tree.min_samples_split = min_samples;
        self
    }

    /// Replace the per-tree limits wholesale
    pub fn with_tree_params(mut self, tree: TreeParams) -> Self {
        self.tree = tree;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.n_trees == 0 {
            return Err(QualityError::invalid_parameter(
                "n_trees",
                self.n_trees,
                "a bag needs at least one tree",
            ));
        }
        Ok(())
    }
}

/// Weak learner fitted to each boosting round's residuals
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WeakLearnerKind {
    Tree(TreeParams),
    Linear(LinearConfig),
}

impl Default for WeakLearnerKind {
    fn default() -> Self {
        WeakLearnerKind::Tree(TreeParams::new(3, 10))
    }
}

/// Residual-fitting sequential ensemble
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoostConfig {
    pub n_estimators: usize,
    pub learning_rate: f64,
    pub weak_learner: WeakLearnerKind,
    /// Clamp range for predictions; `None` uses the observed training label range
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label_bounds: Option<(f64, f64)>,
}

impl Default for BoostConfig {
    fn default() -> Self {
        Self {
            n_estimators: 50,
            learning_rate: 0.1,
            weak_learner: WeakLearnerKind::default(),
            label_bounds: None,
        }
    }
}

impl BoostConfig {
    /// Set number of boosting rounds
    pub fn with_n_estimators(mut self, n_estimators: usize) -> Self {
        self.n_estimators = n_estimators;
        self
    }

    /// Set learning rate
    pub fn with_learning_rate(mut self, lr: f64) -> Self {
        self.learning_rate = lr;
        self
    }

    /// Set weak learner
    pub fn with_weak_learner(mut self, weak_learner: WeakLearnerKind) -> Self {
        self.weak_learner = weak_learner;
        self
    }

    /// Fix the prediction clamp range
    pub fn with_label_bounds(mut self, lo: f64, hi: f64) -> Self {
        self.label_bounds = Some((lo, hi));
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.n_estimators == 0 {
            return Err(QualityError::invalid_parameter(
                "n_estimators",
                self.n_estimators,
                "boosting needs at least one round",
            ));
        }
        if !self.learning_rate.is_finite() || self.learning_rate <= 0.0 {
            return Err(QualityError::invalid_parameter(
                "learning_rate",
                self.learning_rate,
                "must be positive and finite",
            ));
        }
        if let Some((lo, hi)) = self.label_bounds {
            if !(lo.is_finite() && hi.is_finite() && lo <= hi) {
                return Err(QualityError::invalid_parameter(
                    "label_bounds",
                    format!("({}, {})", lo, hi),
                    "must be a finite range with lo <= hi",
                ));
            }
        }
        if let WeakLearnerKind::Linear(linear) = &self.weak_learner {
            linear.validate()?;
        }
        Ok(())
    }
}

/// Which model to train, with its hyperparameters.
///
/// Persisted verbatim as a model's `hyperparameters`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "algorithm", rename_all = "kebab-case")]
pub enum TrainerConfig {
    TreeBag(BagConfig),
    Boosted(BoostConfig),
    Linear(LinearConfig),
}

impl Default for TrainerConfig {
    fn default() -> Self {
        TrainerConfig::TreeBag(BagConfig::default())
    }
}

impl TrainerConfig {
    pub fn validate(&self) -> Result<()> {
        match self {
            TrainerConfig::TreeBag(c) => c.validate(),
            TrainerConfig::Boosted(c) => c.validate(),
            TrainerConfig::Linear(c) => c.validate(),
        }
    }

    /// Short label used in logs
    pub fn name(&self) -> &'static str {
        match self {
            TrainerConfig::TreeBag(_) => "tree-bag",
            TrainerConfig::Boosted(_) => "boosted",
            TrainerConfig::Linear(_) => "linear",
        }
    }
}

impl From<BagConfig> for TrainerConfig {
    fn from(config: BagConfig) -> Self {
        TrainerConfig::TreeBag(config)
    }
}

impl From<BoostConfig> for TrainerConfig {
    fn from(config: BoostConfig) -> Self {
        TrainerConfig::Boosted(config)
    }
}

impl From<LinearConfig> for TrainerConfig {
    fn from(config: LinearConfig) -> Self {
        TrainerConfig::Linear(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_baseline_sweep() {
        let bag = BagConfig::default();
        assert_eq!(bag.n_trees, 50);
        assert_eq!(bag.tree.max_depth, Some(10));
        assert_eq!(bag.tree.min_samples_split, 10);

        let boost = BoostConfig::default();
        assert_eq!(boost.n_estimators, 50);
        assert_eq!(boost.learning_rate, 0.1);
    }

    #[test]
    fn test_trainer_config_json_is_tagged() {
        let config = TrainerConfig::from(BagConfig::default().with_n_trees(5));
        let json = serde_json::to_value(config).unwrap();
        assert_eq!(json["algorithm"], "tree-bag");
        assert_eq!(json["n_trees"], 5);
        assert_eq!(json["max_depth"], 10);

        let back: TrainerConfig = serde_json::from_value(json).unwrap();
        assert_eq!(back, config);
    }

    #[test]
    fn test_boost_config_from_json() {
        let json = r#"{
            "algorithm": "boosted",
            "n_estimators": 20,
            "learning_rate": 0.3,
            "weak_learner": { "type": "linear", "l2_penalty": 0.5 }
        }"#;
        let config: TrainerConfig = serde_json::from_str(json).unwrap();
        match config {
            TrainerConfig::Boosted(b) => {
                assert_eq!(b.n_estimators, 20);
                assert_eq!(b.weak_learner, WeakLearnerKind::Linear(LinearConfig { l2_penalty: 0.5 }));
                assert_eq!(b.label_bounds, None);
            }
            other => panic!("unexpected config {:?}", other),
        }
    }

    #[test]
    fn test_validation() {
        assert!(BagConfig::default().with_n_trees(0).validate().is_err());
        assert!(BoostConfig::default().with_learning_rate(0.0).validate().is_err());
        assert!(BoostConfig::default().with_label_bounds(1.0, 0.0).validate().is_err());
        assert!(TrainerConfig::default().validate().is_ok());
    }
}
