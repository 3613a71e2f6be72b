//! Per-column min-max scaling

use crate::error::{QualityError, Result};
use ndarray::{Array2, ArrayViewMut1, Axis};
use serde::{Deserialize, Serialize};

/// Fitted column minima and ranges
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MinMaxScaler {
    mins: Vec<f64>,
    ranges: Vec<f64>,
}

impl MinMaxScaler {
    /// Learn per-column min and max from `x`
    pub fn fit(x: &Array2<f64>) -> Result<Self> {
        if x.nrows() == 0 {
            return Err(QualityError::EmptyDataset("cannot fit a scaler on zero rows".to_string()));
        }

        let (mins, ranges) = x
            .axis_iter(Axis(1))
            .map(|col| {
                let lo = col.iter().copied().fold(f64::INFINITY, f64::min);
                let hi = col.iter().copied().fold(f64::NEG_INFINITY, f64::max);
                (lo, hi - lo)
            })
            .unzip();

        Ok(Self { mins, ranges })
    }

    pub fn n_features(&self) -> usize {
        self.mins.len()
    }

    /// Map each column to `[0, 1]` using the fitted range; constant columns map to 0.
    ///
    /// Values outside the fitted range are not clipped.
    pub fn transform(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        self.check_width(x.ncols())?;
        let mut scaled = x.clone();
        for row in scaled.axis_iter_mut(Axis(0)) {
            self.transform_row_in_place(row);
        }
        Ok(scaled)
    }

    /// Fit on `x` and return it scaled
    pub fn fit_transform(x: &Array2<f64>) -> Result<(Self, Array2<f64>)> {
        let scaler = Self::fit(x)?;
        let scaled = scaler.transform(x)?;
        Ok((scaler, scaled))
    }

    /// Scale one aligned row in place; extra trailing values are left untouched
    pub fn scale_in_place(&self, values: &mut [f64]) {
        for (v, (&lo, &range)) in values.iter_mut().zip(self.mins.iter().zip(&self.ranges)) {
            *v = scale(*v, lo, range);
        }
    }

    fn transform_row_in_place(&self, mut row: ArrayViewMut1<f64>) {
        for (v, (&lo, &range)) in row.iter_mut().zip(self.mins.iter().zip(&self.ranges)) {
            *v = scale(*v, lo, range);
        }
    }

    /// Matching, finite minima and ranges
    pub fn validate(&self) -> Result<()> {
        if self.mins.len() != self.ranges.len() {
            return Err(QualityError::Validation(format!(
                "scaler has {} minima but {} ranges",
                self.mins.len(),
                self.ranges.len()
            )));
        }
        if self.mins.iter().chain(&self.ranges).any(|v| !v.is_finite()) {
            return Err(QualityError::Validation("scaler statistics are not finite".to_string()));
        }
        Ok(())
    }

    fn check_width(&self, width: usize) -> Result<()> {
        if width != self.mins.len() {
            return Err(QualityError::ShapeMismatch {
                expected: format!("{} features", self.mins.len()),
                actual: format!("{} features", width),
            });
        }
        Ok(())
    }
}

fn scale(v: f64, lo: f64, range: f64) -> f64 {
    if range > 0.0 {
        (v - lo) / range
    } else {
        0.0
    }
}
