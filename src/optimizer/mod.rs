//! Hyperparameter search
//!
//! Grid search over trainer configurations, selecting on validation R²
//! with MAE as the tie-breaker.

mod grid_search;

pub use grid_search::{grid_search, CandidateResult, ParameterGrid, SearchResult};
