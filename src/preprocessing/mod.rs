//! Column preprocessing applied between ingestion and training

pub mod feature_selection;
pub mod scaler;

pub use feature_selection::{FeatureSelection, VarianceThreshold};
pub use scaler::MinMaxScaler;
