//! Variance-threshold feature selection

use crate::error::{QualityError, Result};
use ndarray::{Array2, Axis};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Drops columns whose population variance falls below a threshold
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VarianceThreshold {
    pub threshold: f64,
}

impl Default for VarianceThreshold {
    fn default() -> Self {
        Self { threshold: 0.01 }
    }
}

/// Outcome of a selection pass
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureSelection {
    /// Kept column indices, ascending
    pub selected: Vec<usize>,
    /// Population variance of every input column
    pub variances: Vec<f64>,
}

impl FeatureSelection {
    /// Keep only the selected columns of `x`
    pub fn apply(&self, x: &Array2<f64>) -> Array2<f64> {
        x.select(Axis(1), &self.selected)
    }

    /// Keep only the selected names
    pub fn select_names(&self, names: &[String]) -> Vec<String> {
        self.selected
            .iter()
            .filter_map(|&i| names.get(i).cloned())
            .collect()
    }
}

impl VarianceThreshold {
    pub fn new(threshold: f64) -> Self {
        Self { threshold }
    }

    /// Score every column of `x` and keep those with variance `>= threshold`.
    ///
    /// Fails when no column survives.
    pub fn fit(&self, x: &Array2<f64>) -> Result<FeatureSelection> {
        if x.nrows() == 0 {
            return Err(QualityError::EmptyDataset("cannot select features on zero rows".to_string()));
        }

        let n = x.nrows() as f64;
        let variances: Vec<f64> = x
            .axis_iter(Axis(1))
            .map(|col| {
                let mean = col.sum() / n;
                col.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n
            })
            .collect();

        let selected: Vec<usize> = variances
            .iter()
            .enumerate()
            .filter(|(_, &v)| v >= self.threshold)
            .map(|(i, _)| i)
            .collect();

        debug!(
            threshold = self.threshold,
            kept = selected.len(),
            dropped = variances.len() - selected.len(),
            "Variance threshold applied"
        );

        if selected.is_empty() {
            return Err(QualityError::Validation(format!(
                "no feature has variance >= {}",
                self.threshold
            )));
        }

        Ok(FeatureSelection { selected, variances })
    }
}
