//! Model training
//!
//! - CART regression trees
//! - Bootstrap-aggregated tree bags
//! - Boosted ensembles with tree or ridge weak learners
//! - Ridge regression
//! - Regression metrics and k-fold cross-validation
//! - The [`Model`] artifact and the end-to-end [`TrainEngine`]

mod config;
mod engine;
mod metrics;
mod model;
pub mod bagging;
pub mod boosting;
pub mod cross_validation;
pub mod decision_tree;
pub mod linear_models;

pub use bagging::TreeBag;
pub use boosting::{BoostedEnsemble, WeakLearner};
pub use config::{BagConfig, BoostConfig, LinearConfig, TrainerConfig, TreeParams, WeakLearnerKind};
pub use cross_validation::{cross_validate, cross_validate_with, CrossValidationReport, FoldResult};
pub use decision_tree::{induce, RegressionTree, TreeNode};
pub use engine::{SplitSizes, TrainEngine, TrainingConfig, TrainingReport};
pub use linear_models::RidgeRegressor;
pub use metrics::Metrics;
pub use model::{train_bag, train_boosted, train_linear, Ensemble, Model, ModelKind};
