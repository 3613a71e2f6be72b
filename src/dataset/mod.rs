//! Dataset construction
//!
//! Turns an ordered list of [`TrainingExample`]s into aligned numeric matrices:
//! - Feature names are the sorted union of every numeric-valued key
//! - Missing keys are zero-filled
//! - NaN, Infinity and non-numeric values are coerced to 0 and counted in an
//!   [`IngestionReport`] instead of failing the run

pub mod split;

pub use split::{fold_sizes, holdout_split, k_fold, Fold, HoldoutSplit, ShuffleMode, SplitFractions};

use crate::error::{QualityError, Result};
use ndarray::{Array1, Array2, Axis};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, warn};

/// A raw feature value as delivered by the feature extractor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FeatureValue {
    /// Numeric value (may still be NaN or infinite)
    Number(f64),
    /// Boolean flag
    Bool(bool),
    /// Free text
    Text(String),
    /// Explicit null
    Null,
}

impl FeatureValue {
    /// Whether this value takes part in the feature ordering
    pub fn is_numeric(&self) -> bool {
        matches!(self, FeatureValue::Number(_))
    }

    /// The value as a finite number, if it is one
    pub fn as_finite(&self) -> Option<f64> {
        match self {
            FeatureValue::Number(v) if v.is_finite() => Some(*v),
            _ => None,
        }
    }
}

impl From<f64> for FeatureValue {
    fn from(v: f64) -> Self {
        FeatureValue::Number(v)
    }
}

impl From<i64> for FeatureValue {
    fn from(v: i64) -> Self {
        FeatureValue::Number(v as f64)
    }
}

impl From<bool> for FeatureValue {
    fn from(v: bool) -> Self {
        FeatureValue::Bool(v)
    }
}

impl From<&str> for FeatureValue {
    fn from(v: &str) -> Self {
        FeatureValue::Text(v.to_string())
    }
}

impl From<String> for FeatureValue {
    fn from(v: String) -> Self {
        FeatureValue::Text(v)
    }
}

/// Mapping from feature name to value for one repository
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FeatureVector {
    values: BTreeMap<String, FeatureValue>,
}

impl FeatureVector {
    /// Create an empty feature vector
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert
    pub fn with(mut self, name: impl Into<String>, value: impl Into<FeatureValue>) -> Self {
        self.insert(name, value);
        self
    }

    /// Insert or replace a feature
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<FeatureValue>) {
        self.values.insert(name.into(), value.into());
    }

    /// Raw value for a feature
    pub fn get(&self, name: &str) -> Option<&FeatureValue> {
        self.values.get(name)
    }

    /// Numeric value for a feature, zero when missing or not finite
    pub fn value_or_zero(&self, name: &str) -> f64 {
        self.values
            .get(name)
            .and_then(FeatureValue::as_finite)
            .unwrap_or(0.0)
    }

    /// Names of all keys holding numeric values
    pub fn numeric_names(&self) -> impl Iterator<Item = &str> {
        self.values
            .iter()
            .filter(|(_, v)| v.is_numeric())
            .map(|(k, _)| k.as_str())
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &FeatureValue)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Reorder this vector into the given feature ordering.
    ///
    /// Names absent from the vector are zero-filled; keys not in the ordering are ignored.
    pub fn align(&self, feature_names: &[String]) -> AlignedRow {
        let mut missing = 0;
        let values = feature_names
            .iter()
            .map(|name| match self.values.get(name) {
                Some(value) => value.as_finite().unwrap_or(0.0),
                None => {
                    missing += 1;
                    0.0
                }
            })
            .collect();
        let unknown = self
            .values
            .keys()
            .filter(|k| !feature_names.contains(k))
            .count();

        AlignedRow {
            values,
            missing,
            unknown,
        }
    }
}

impl<K, V> FromIterator<(K, V)> for FeatureVector
where
    K: Into<String>,
    V: Into<FeatureValue>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            values: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

/// A feature vector laid out in a model's feature ordering
#[derive(Debug, Clone, PartialEq)]
pub struct AlignedRow {
    /// Values in training order
    pub values: Vec<f64>,
    /// Ordering slots that had no key in the input (zero-filled)
    pub missing: usize,
    /// Input keys the ordering does not know about (ignored)
    pub unknown: usize,
}

/// One labelled repository
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingExample {
    /// Stable identifier (repository slug or URL)
    pub id: String,
    /// Extracted features
    pub features: FeatureVector,
    /// Continuous quality score
    pub label: f64,
}

impl TrainingExample {
    pub fn new(id: impl Into<String>, features: FeatureVector, label: f64) -> Self {
        Self {
            id: id.into(),
            features,
            label,
        }
    }
}

/// Data-quality counters collected while materializing a dataset
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IngestionReport {
    /// Number of examples ingested
    pub n_examples: usize,
    /// Number of feature columns
    pub n_features: usize,
    /// Feature cells holding NaN or Infinity (coerced to 0)
    pub non_finite_features: usize,
    /// Feature cells holding non-numeric values under a numeric column (coerced to 0)
    pub non_numeric_features: usize,
    /// Labels holding NaN or Infinity (coerced to 0)
    pub non_finite_labels: usize,
}

impl IngestionReport {
    /// True when nothing had to be coerced
    pub fn is_clean(&self) -> bool {
        self.non_finite_features == 0 && self.non_numeric_features == 0 && self.non_finite_labels == 0
    }
}

/// Summary statistics of the label vector
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LabelStats {
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub std: f64,
}

impl LabelStats {
    /// Compute statistics, `None` for an empty label vector
    pub fn from_labels(y: &Array1<f64>) -> Option<Self> {
        if y.is_empty() {
            return None;
        }
        let n = y.len() as f64;
        let mean = y.sum() / n;
        let variance = y.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
        let min = y.iter().copied().fold(f64::INFINITY, f64::min);
        let max = y.iter().copied().fold(f64::NEG_INFINITY, f64::max);

        Some(Self {
            min,
            max,
            mean,
            std: variance.sqrt(),
        })
    }
}

/// Materialized dataset: `x` (n × m) aligned to `feature_names`, labels `y`
#[derive(Debug, Clone)]
pub struct FeatureMatrix {
    pub x: Array2<f64>,
    pub y: Array1<f64>,
    pub feature_names: Vec<String>,
    pub ids: Vec<String>,
    pub report: IngestionReport,
}

impl FeatureMatrix {
    pub fn n_samples(&self) -> usize {
        self.x.nrows()
    }

    pub fn n_features(&self) -> usize {
        self.x.ncols()
    }

    /// Column index of a feature
    pub fn feature_index(&self, name: &str) -> Option<usize> {
        self.feature_names.iter().position(|n| n == name)
    }

    /// Copy out the given rows
    pub fn select_rows(&self, indices: &[usize]) -> (Array2<f64>, Array1<f64>) {
        select_rows(&self.x, &self.y, indices)
    }

    pub fn label_stats(&self) -> Option<LabelStats> {
        LabelStats::from_labels(&self.y)
    }
}

/// Ordered examples plus their derived feature ordering
#[derive(Debug, Clone)]
pub struct Dataset<'a> {
    examples: &'a [TrainingExample],
    feature_names: Vec<String>,
}

impl<'a> Dataset<'a> {
    /// Derive the feature ordering, failing only when `examples` is empty
    pub fn new(examples: &'a [TrainingExample]) -> Result<Self> {
        if examples.is_empty() {
            return Err(QualityError::EmptyDataset(
                "no training examples supplied".to_string(),
            ));
        }
        Ok(Self {
            examples,
            feature_names: feature_ordering(examples),
        })
    }

    pub fn examples(&self) -> &'a [TrainingExample] {
        self.examples
    }

    pub fn feature_names(&self) -> &[String] {
        &self.feature_names
    }

    pub fn len(&self) -> usize {
        self.examples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.examples.is_empty()
    }

    /// Materialize `x`, `y` against this dataset's feature ordering
    pub fn materialize(&self) -> FeatureMatrix {
        materialize(self.examples, &self.feature_names)
    }
}

/// Build aligned matrices from examples.
///
/// Fails with [`QualityError::EmptyDataset`] when `examples` is empty.
pub fn build_dataset(examples: &[TrainingExample]) -> Result<FeatureMatrix> {
    Ok(Dataset::new(examples)?.materialize())
}

/// Sorted union of numeric-valued keys across all examples
fn feature_ordering(examples: &[TrainingExample]) -> Vec<String> {
    let names: BTreeSet<&str> = examples
        .iter()
        .flat_map(|ex| ex.features.numeric_names())
        .collect();
    names.into_iter().map(str::to_string).collect()
}

fn materialize(examples: &[TrainingExample], feature_names: &[String]) -> FeatureMatrix {
    let n = examples.len();
    let m = feature_names.len();
    let mut x = Array2::zeros((n, m));
    let mut y = Array1::zeros(n);
    let mut report = IngestionReport {
        n_examples: n,
        n_features: m,
        ..Default::default()
    };

    for (i, example) in examples.iter().enumerate() {
        for (j, name) in feature_names.iter().enumerate() {
            x[[i, j]] = match example.features.get(name) {
                None => 0.0,
                Some(FeatureValue::Number(v)) if v.is_finite() => *v,
                Some(FeatureValue::Number(v)) => {
                    debug!(id = %example.id, feature = %name, value = %v, "Coercing non-finite feature to 0");
                    report.non_finite_features += 1;
                    0.0
                }
                Some(_) => {
                    debug!(id = %example.id, feature = %name, "Coercing non-numeric feature to 0");
                    report.non_numeric_features += 1;
                    0.0
                }
            };
        }

        y[i] = if example.label.is_finite() {
            example.label
        } else {
            debug!(id = %example.id, label = %example.label, "Coercing non-finite label to 0");
            report.non_finite_labels += 1;
            0.0
        };
    }

    if !report.is_clean() {
        warn!(
            non_finite_features = report.non_finite_features,
            non_numeric_features = report.non_numeric_features,
            non_finite_labels = report.non_finite_labels,
            "Coerced invalid values to 0 during ingestion"
        );
    }

    FeatureMatrix {
        x,
        y,
        feature_names: feature_names.to_vec(),
        ids: examples.iter().map(|ex| ex.id.clone()).collect(),
        report,
    }
}

/// Copy the given rows out of `x` and `y`
pub fn select_rows(x: &Array2<f64>, y: &Array1<f64>, indices: &[usize]) -> (Array2<f64>, Array1<f64>) {
    (x.select(Axis(0), indices), y.select(Axis(0), indices))
}

/// Reject raw matrices that bypassed ingestion
pub(crate) fn check_training_inputs(x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
    if x.nrows() == 0 {
        return Err(QualityError::EmptyDataset("training matrix has no rows".to_string()));
    }
    if x.nrows() != y.len() {
        return Err(QualityError::ShapeMismatch {
            expected: format!("y length = {}", x.nrows()),
            actual: format!("y length = {}", y.len()),
        });
    }
    if let Some(pos) = x.iter().position(|v| !v.is_finite()) {
        let (row, col) = (pos / x.ncols().max(1), pos % x.ncols().max(1));
        return Err(QualityError::NonFiniteValue(format!(
            "feature matrix cell [{}, {}]",
            row, col
        )));
    }
    if let Some(row) = y.iter().position(|v| !v.is_finite()) {
        return Err(QualityError::NonFiniteValue(format!("label at row {}", row)));
    }
    Ok(())
}
