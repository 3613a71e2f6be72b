//! Quality Forest - regression ensembles for repository quality scores
//!
//! Turns per-repository feature maps and scalar quality labels into a
//! serializable prediction model, and measures how well it generalizes.
//!
//! # Modules
//!
//! - [`dataset`] - Feature vectors, dataset building, holdout and k-fold splits
//! - [`preprocessing`] - Min-max scaling and variance-threshold selection
//! - [`training`] - CART trees, tree bags, boosting, ridge, metrics, cross-validation, engine
//! - [`explainability`] - Split-frequency and permutation feature importance
//! - [`optimizer`] - Grid search over trainer configurations
//!
//! # Example
//!
//! ```no_run
//! use quality_forest::prelude::*;
//!
//! # fn main() -> quality_forest::Result<()> {
//! let examples = vec![
//!     TrainingExample::new("a/b", FeatureVector::new().with("stars", 120.0), 0.7),
//!     // ...
//! ];
//! let engine = TrainEngine::new(TrainingConfig::new(BagConfig::default()))?;
//! let report = engine.run(&examples)?;
//! let score = report.model.predict(&FeatureVector::new().with("stars", 80.0));
//! # let _ = score;
//! # Ok(())
//! # }
//! ```

pub mod error;

pub mod dataset;
pub mod preprocessing;
pub mod training;

pub mod explainability;
pub mod optimizer;

pub use error::{QualityError, Result};

/// Re-export commonly used types
pub mod prelude {
    // Error handling
    pub use crate::error::{QualityError, Result};

    // Data
    pub use crate::dataset::{
        build_dataset, holdout_split, k_fold, Dataset, FeatureMatrix, FeatureValue, FeatureVector,
        ShuffleMode, SplitFractions, TrainingExample,
    };

    // Preprocessing
    pub use crate::preprocessing::{MinMaxScaler, VarianceThreshold};

    // Training
    pub use crate::training::{
        cross_validate, induce, train_bag, train_boosted, train_linear, BagConfig, BoostConfig,
        LinearConfig, Metrics, Model, ModelKind, TrainEngine, TrainerConfig, TrainingConfig,
        TrainingReport, TreeParams, WeakLearnerKind,
    };

    // Explainability
    pub use crate::explainability::{feature_importance, ImportanceResult, ImportanceStrategy};

    // Optimization
    pub use crate::optimizer::{grid_search, ParameterGrid, SearchResult};
}
