//! Regression metrics

use crate::error::{QualityError, Result};
use ndarray::Array1;
use serde::{Deserialize, Serialize};

/// R², MAE and RMSE for one set of predictions
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Metrics {
    pub r2: f64,
    pub mae: f64,
    pub rmse: f64,
    /// Population std of R² across folds, present only for cross-validated metrics
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub std_r2: Option<f64>,
}

impl Metrics {
    /// Score `predictions` against `y_true`.
    ///
    /// R² is clamped to `[-1, 1]`. When the labels have no spread, R² is 1 if
    /// every prediction is exact and 0 otherwise.
    pub fn compute(predictions: &Array1<f64>, y_true: &Array1<f64>) -> Result<Self> {
        if predictions.len() != y_true.len() {
            return Err(QualityError::ShapeMismatch {
                expected: format!("{} predictions", y_true.len()),
                actual: format!("{} predictions", predictions.len()),
            });
        }
        if y_true.is_empty() {
            return Err(QualityError::EmptyDataset(
                "cannot score an empty label vector".to_string(),
            ));
        }

        let n = y_true.len() as f64;
        let errors: Vec<f64> = predictions
            .iter()
            .zip(y_true.iter())
            .map(|(p, t)| p - t)
            .collect();

        let mae = errors.iter().map(|e| e.abs()).sum::<f64>() / n;
        let ss_res: f64 = errors.iter().map(|e| e * e).sum();
        let rmse = (ss_res / n).sqrt();

        let y_mean = y_true.iter().sum::<f64>() / n;
        let ss_tot: f64 = y_true.iter().map(|y| (y - y_mean).powi(2)).sum();

        Ok(Self {
            r2: r_squared(ss_res, ss_tot),
            mae,
            rmse,
            std_r2: None,
        })
    }

    /// Mean of each metric across folds, with the population std of R²
    pub fn aggregate(folds: &[Metrics]) -> Result<Self> {
        if folds.is_empty() {
            return Err(QualityError::EmptyDataset("no fold metrics to aggregate".to_string()));
        }
        let n = folds.len() as f64;
        let mean = |f: fn(&Metrics) -> f64| folds.iter().map(f).sum::<f64>() / n;

        let r2 = mean(|m| m.r2);
        let variance = folds.iter().map(|m| (m.r2 - r2).powi(2)).sum::<f64>() / n;

        Ok(Self {
            r2,
            mae: mean(|m| m.mae),
            rmse: mean(|m| m.rmse),
            std_r2: Some(variance.sqrt()),
        })
    }

    /// Higher R² wins, then lower MAE
    pub fn is_better_than(&self, other: &Metrics) -> bool {
        self.r2 > other.r2 || (self.r2 == other.r2 && self.mae < other.mae)
    }
}

fn r_squared(ss_res: f64, ss_tot: f64) -> f64 {
    if ss_tot == 0.0 || !ss_tot.is_finite() {
        return if ss_res == 0.0 { 1.0 } else { 0.0 };
    }
    let r2 = 1.0 - ss_res / ss_tot;
    if r2.is_finite() {
        r2.clamp(-1.0, 1.0)
    } else {
        -1.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    #[test]
    fn test_perfect_predictions() {
        let y = array![0.1, 0.5, 0.9];
        let m = Metrics::compute(&y, &y).unwrap();
        assert_eq!(m.r2, 1.0);
        assert_eq!(m.mae, 0.0);
        assert_eq!(m.rmse, 0.0);
    }

    #[test]
    fn test_known_values() {
        let y = array![1.0, 2.0, 3.0, 4.0];
        let pred = array![1.5, 2.0, 2.5, 4.0];
        let m = Metrics::compute(&pred, &y).unwrap();

        // ss_res = 0.5, ss_tot = 5
        assert_abs_diff_eq!(m.r2, 0.9, epsilon = 1e-12);
        assert_abs_diff_eq!(m.mae, 0.25, epsilon = 1e-12);
        assert_abs_diff_eq!(m.rmse, (0.5f64 / 4.0).sqrt(), epsilon = 1e-12);
    }

    #[test]
    fn test_constant_labels() {
        let y = array![5.0, 5.0, 5.0, 5.0];
        let exact = Metrics::compute(&y, &y).unwrap();
        assert_eq!(exact.r2, 1.0);

        let off = Metrics::compute(&array![5.0, 4.0, 5.0, 6.0], &y).unwrap();
        assert_eq!(off.r2, 0.0);
        assert!(off.mae.is_finite());
    }

    #[test]
    fn test_r2_clamped_below() {
        let y = array![0.0, 1.0];
        let pred = array![10.0, -10.0];
        let m = Metrics::compute(&pred, &y).unwrap();
        assert_eq!(m.r2, -1.0);
    }

    #[test]
    fn test_length_mismatch() {
        let err = Metrics::compute(&array![1.0], &array![1.0, 2.0]).unwrap_err();
        assert!(matches!(err, QualityError::ShapeMismatch { .. }));
    }

    #[test]
    fn test_aggregate_mean_and_std() {
        let folds = [
            Metrics { r2: 0.5, mae: 0.1, rmse: 0.2, std_r2: None },
            Metrics { r2: 0.7, mae: 0.3, rmse: 0.4, std_r2: None },
        ];
        let agg = Metrics::aggregate(&folds).unwrap();
        assert_abs_diff_eq!(agg.r2, 0.6, epsilon = 1e-12);
        assert_abs_diff_eq!(agg.mae, 0.2, epsilon = 1e-12);
        assert_abs_diff_eq!(agg.rmse, 0.3, epsilon = 1e-12);
        assert_abs_diff_eq!(agg.std_r2.unwrap(), 0.1, epsilon = 1e-12);
    }

    #[test]
    fn test_ordering_prefers_r2_then_mae() {
        let a = Metrics { r2: 0.8, mae: 0.2, rmse: 0.3, std_r2: None };
        let b = Metrics { r2: 0.8, mae: 0.1, rmse: 0.3, std_r2: None };
        let c = Metrics { r2: 0.9, mae: 0.5, rmse: 0.6, std_r2: None };
        assert!(b.is_better_than(&a));
        assert!(c.is_better_than(&b));
        assert!(!a.is_better_than(&a));
    }
}
