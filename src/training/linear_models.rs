//! Ridge regression
//!
//! Used both as a standalone `linear` model and as a boosting weak learner.
//! Solves the centered normal equations `(XᵀX + λI) w = Xᵀy` by Cholesky
//! decomposition, then recovers the intercept from the column means.

use crate::dataset::check_training_inputs;
use crate::error::{QualityError, Result};
use ndarray::{Array1, Array2, ArrayView1, Axis};
use serde::{Deserialize, Serialize};

/// Ridge hyperparameters
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LinearConfig {
    /// L2 penalty added to the diagonal of XᵀX
    pub l2_penalty: f64,
}

impl Default for LinearConfig {
    fn default() -> Self {
        Self { l2_penalty: 0.01 }
    }
}

impl LinearConfig {
    /// Set L2 penalty
    pub fn with_l2_penalty(mut self, l2_penalty: f64) -> Self {
        self.l2_penalty = l2_penalty;
        self
    }

    pub(crate) fn validate(&self) -> Result<()> {
        if !self.l2_penalty.is_finite() || self.l2_penalty < 0.0 {
            return Err(QualityError::invalid_parameter(
                "l2_penalty",
                self.l2_penalty,
                "must be finite and non-negative",
            ));
        }
        Ok(())
    }
}

/// Fitted ridge regressor; predictions are clamped to the training label range
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RidgeRegressor {
    pub coefficients: Array1<f64>,
    pub intercept: f64,
    pub label_range: (f64, f64),
}

impl RidgeRegressor {
    /// Fit to `x`, `y`
    pub fn fit(x: &Array2<f64>, y: &Array1<f64>, config: &LinearConfig) -> Result<Self> {
        check_training_inputs(x, y)?;
        config.validate()?;

        let n_features = x.ncols();
        let x_mean = x
            .mean_axis(Axis(0))
            .ok_or_else(|| QualityError::EmptyDataset("no rows to fit".to_string()))?;
        let y_mean = y.sum() / y.len() as f64;

        let x_centered = x - &x_mean.view().insert_axis(Axis(0));
        let y_centered = y.mapv(|v| v - y_mean);

        let mut xtx = x_centered.t().dot(&x_centered);
        for i in 0..n_features {
            xtx[[i, i]] += config.l2_penalty;
        }
        let xty = x_centered.t().dot(&y_centered);

        let coefficients = cholesky_solve(&xtx, &xty).ok_or_else(|| {
            QualityError::Training(
                "normal equations are singular; use a positive l2_penalty".to_string(),
            )
        })?;
        let intercept = y_mean - coefficients.dot(&x_mean);

        let label_range = y
            .iter()
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| (lo.min(v), hi.max(v)));

        Ok(Self {
            coefficients,
            intercept,
            label_range,
        })
    }

    pub fn n_features(&self) -> usize {
        self.coefficients.len()
    }

    /// Check width, finiteness and an ordered label range
    pub fn validate(&self, n_features: usize) -> Result<()> {
        if self.coefficients.len() != n_features {
            return Err(QualityError::Validation(format!(
                "ridge model has {} coefficients for {} features",
                self.coefficients.len(),
                n_features
            )));
        }
        if !self.intercept.is_finite() || self.coefficients.iter().any(|c| !c.is_finite()) {
            return Err(QualityError::Validation("ridge weights are not finite".to_string()));
        }
        check_bounds("label_range", self.label_range)
    }

    /// Predict one row
    pub fn predict_row(&self, row: ArrayView1<f64>) -> f64 {
        let raw = self.intercept + row.dot(&self.coefficients);
        raw.clamp(self.label_range.0, self.label_range.1)
    }

    /// Predict every row of `x`
    pub fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        if x.ncols() != self.n_features() {
            return Err(QualityError::ShapeMismatch {
                expected: format!("{} features", self.n_features()),
                actual: format!("{} features", x.ncols()),
            });
        }
        Ok(x.rows().into_iter().map(|row| self.predict_row(row)).collect())
    }
}

/// Solve `a · w = b` for symmetric positive-definite `a`.
///
/// Retries once with a small diagonal ridge when `a` is only semi-definite.
fn cholesky_solve(a: &Array2<f64>, b: &Array1<f64>) -> Option<Array1<f64>> {
    let n = a.nrows();
    if n != a.ncols() || n != b.len() {
        return None;
    }
    if let Some(l) = cholesky_factor(a) {
        return Some(substitute(&l, b));
    }

    let ridge = 1e-8 * a.diag().iter().map(|v| v.abs()).sum::<f64>() / n.max(1) as f64;
    if ridge <= 0.0 {
        return None;
    }
    let mut a_reg = a.clone();
    for k in 0..n {
        a_reg[[k, k]] += ridge;
    }
    cholesky_factor(&a_reg).map(|l| substitute(&l, b))
}

/// Lower-triangular `L` with `a = L Lᵀ`
fn cholesky_factor(a: &Array2<f64>) -> Option<Array2<f64>> {
    let n = a.nrows();
    let mut l = Array2::zeros((n, n));

    for i in 0..n {
        for j in 0..=i {
            let mut sum = 0.0;
            for k in 0..j {
                sum += l[[i, k]] * l[[j, k]];
            }

            if i == j {
                let diag = a[[i, i]] - sum;
                if diag <= 0.0 || !diag.is_finite() {
                    return None;
                }
                l[[i, j]] = diag.sqrt();
            } else {
                l[[i, j]] = (a[[i, j]] - sum) / l[[j, j]];
            }
        }
    }

    Some(l)
}

/// Forward then back substitution through `L` and `Lᵀ`
fn substitute(l: &Array2<f64>, b: &Array1<f64>) -> Array1<f64> {
    let n = l.nrows();

    let mut z = Array1::zeros(n);
    for i in 0..n {
        let mut sum = 0.0;
        for j in 0..i {
            sum += l[[i, j]] * z[j];
        }
        z[i] = (b[i] - sum) / l[[i, i]];
    }

    let mut w = Array1::zeros(n);
    for i in (0..n).rev() {
        let mut sum = 0.0;
        for j in (i + 1)..n {
            sum += l[[j, i]] * w[j];
        }
        w[i] = (z[i] - sum) / l[[i, i]];
    }

    w
}

/// `lo <= hi` with both ends finite, so `clamp` is safe
pub(crate) fn check_bounds(name: &str, (lo, hi): (f64, f64)) -> Result<()> {
    if !lo.is_finite() || !hi.is_finite() || lo > hi {
        return Err(QualityError::Validation(format!(
            "{} ({}, {}) is not an ordered finite range",
            name, lo, hi
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    #[test]
    fn test_recovers_linear_relation() {
        // y = 0.1 + 0.2 * x0 - 0.05 * x1
        let x = array![
            [0.0, 1.0],
            [1.0, 0.0],
            [2.0, 3.0],
            [3.0, 1.0],
            [4.0, 2.0],
            [5.0, 5.0]
        ];
        let y: Array1<f64> = x
            .rows()
            .into_iter()
            .map(|r| 0.1 + 0.2 * r[0] - 0.05 * r[1])
            .collect();

        let model = RidgeRegressor::fit(&x, &y, &LinearConfig::default().with_l2_penalty(0.0)).unwrap();
        assert_abs_diff_eq!(model.coefficients[0], 0.2, epsilon = 1e-6);
        assert_abs_diff_eq!(model.coefficients[1], -0.05, epsilon = 1e-6);
        assert_abs_diff_eq!(model.intercept, 0.1, epsilon = 1e-6);

        let pred = model.predict(&x).unwrap();
        for (p, t) in pred.iter().zip(y.iter()) {
            assert_abs_diff_eq!(*p, *t, epsilon = 1e-6);
        }
    }

    #[test]
    fn test_penalty_shrinks_coefficients() {
        let x = array![[0.0], [1.0], [2.0], [3.0]];
        let y = array![0.0, 0.1, 0.2, 0.3];

        let loose = RidgeRegressor::fit(&x, &y, &LinearConfig::default().with_l2_penalty(0.0)).unwrap();
        let tight = RidgeRegressor::fit(&x, &y, &LinearConfig::default().with_l2_penalty(10.0)).unwrap();
        assert!(tight.coefficients[0].abs() < loose.coefficients[0].abs());
    }

    #[test]
    fn test_predictions_clamped_to_label_range() {
        let x = array![[0.0], [1.0], [2.0]];
        let y = array![0.0, 0.5, 1.0];
        let model = RidgeRegressor::fit(&x, &y, &LinearConfig::default()).unwrap();

        let far = model.predict(&array![[100.0], [-100.0]]).unwrap();
        assert_eq!(far[0], 1.0);
        assert_eq!(far[1], 0.0);
    }

    #[test]
    fn test_constant_column_with_penalty() {
        let x = array![[1.0, 0.0], [1.0, 1.0], [1.0, 2.0]];
        let y = array![0.2, 0.4, 0.6];
        let model = RidgeRegressor::fit(&x, &y, &LinearConfig::default()).unwrap();
        assert_abs_diff_eq!(model.coefficients[0], 0.0, epsilon = 1e-12);
    }

    #[test]
    fn test_negative_penalty_rejected() {
        let x = array![[0.0], [1.0]];
        let y = array![0.0, 1.0];
        let err = RidgeRegressor::fit(&x, &y, &LinearConfig::default().with_l2_penalty(-1.0)).unwrap_err();
        assert!(matches!(err, QualityError::InvalidParameter { .. }));
    }
}
