//! Model explainability
//!
//! Split-frequency and permutation feature importance.

mod importance;

pub use importance::{
    feature_importance, importance_report, split_frequency, ImportanceResult, ImportanceStrategy,
    PermutationImportance,
};
