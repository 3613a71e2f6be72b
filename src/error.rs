//! Error types for the quality-forest training engine

use thiserror::Error;

/// Result type alias for engine operations
pub type Result<T> = std::result::Result<T, QualityError>;

/// Main error type for the training engine
#[derive(Error, Debug)]
pub enum QualityError {
    #[error("Empty dataset: {0}")]
    EmptyDataset(String),

    #[error("Degenerate split: requested {requested}, but only {available} rows available")]
    DegenerateSplit { requested: String, available: usize },

    #[error("Shape mismatch: expected {expected}, got {actual}")]
    ShapeMismatch { expected: String, actual: String },

    #[error("Non-finite value: {0}")]
    NonFiniteValue(String),

    #[error("Invalid parameter: {name} = {value}, {reason}")]
    InvalidParameter {
        name: String,
        value: String,
        reason: String,
    },

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Training error: {0}")]
    Training(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Invalid shape: {0}")]
    Shape(#[from] ndarray::ShapeError),
}

impl QualityError {
    pub(crate) fn invalid_parameter(
        name: impl Into<String>,
        value: impl ToString,
        reason: impl Into<String>,
    ) -> Self {
        QualityError::InvalidParameter {
            name: name.into(),
            value: value.to_string(),
            reason: reason.into(),
        }
    }
}

impl From<serde_json::Error> for QualityError {
    fn from(err: serde_json::Error) -> Self {
        QualityError::Serialization(err.to_string())
    }
}
