//! CART regression tree
//!
//! Recursive binary splitting on variance reduction. Rows route left iff
//! `x[feature_idx] <= threshold`. Split search sorts each feature once per
//! node and sweeps prefix sums, so a node costs O(features × n log n).
//!
//! Ties between candidates with exactly equal scores go to the lowest
//! feature index, then the lowest threshold.
//!
//! Trees serialize as a flat preorder node table with child indices, so the
//! JSON nesting depth stays constant however deep the tree grows.

use crate::dataset::check_training_inputs;
use crate::error::{QualityError, Result};
use ndarray::{Array1, Array2, ArrayView1};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::ops::Index;

/// Below this many (row, feature) cells a node is scanned on the calling thread
const PARALLEL_SCAN_CELLS: usize = 4096;

/// Regression tree node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(into = "NodeTable", try_from = "NodeTable")]
pub enum TreeNode {
    /// Leaf holding the mean label of the training rows that reached it
    Leaf { value: f64, n_samples: usize },
    /// Internal node
    Split {
        feature_idx: usize,
        threshold: f64,
        left: Box<TreeNode>,
        right: Box<TreeNode>,
        n_samples: usize,
        /// Variance reduction achieved by this split
        gain: f64,
    },
}

impl TreeNode {
    /// Walk splits until a leaf and return its value
    pub fn predict<S>(&self, sample: &S) -> f64
    where
        S: Index<usize, Output = f64> + ?Sized,
    {
        let mut node = self;
        loop {
            match node {
                TreeNode::Leaf { value, .. } => return *value,
                TreeNode::Split {
                    feature_idx,
                    threshold,
                    left,
                    right,
                    ..
                } => {
                    node = if sample[*feature_idx] <= *threshold {
                        left
                    } else {
                        right
                    };
                }
            }
        }
    }

    pub fn is_leaf(&self) -> bool {
        matches!(self, TreeNode::Leaf { .. })
    }

    /// Depth counted in edges (a lone leaf has depth 0)
    pub fn depth(&self) -> usize {
        match self {
            TreeNode::Leaf { .. } => 0,
            TreeNode::Split { left, right, .. } => 1 + left.depth().max(right.depth()),
        }
    }

    pub fn n_leaves(&self) -> usize {
        match self {
            TreeNode::Leaf { .. } => 1,
            TreeNode::Split { left, right, .. } => left.n_leaves() + right.n_leaves(),
        }
    }

    pub fn n_splits(&self) -> usize {
        match self {
            TreeNode::Leaf { .. } => 0,
            TreeNode::Split { left, right, .. } => 1 + left.n_splits() + right.n_splits(),
        }
    }

    /// Add one to `counts[f]` for every split on feature `f`
    pub fn accumulate_split_counts(&self, counts: &mut [usize]) {
        if let TreeNode::Split {
            feature_idx,
            left,
            right,
            ..
        } = self
        {
            if let Some(slot) = counts.get_mut(*feature_idx) {
                *slot += 1;
            }
            left.accumulate_split_counts(counts);
            right.accumulate_split_counts(counts);
        }
    }

    /// Check that every split reads a column below `n_features` and that all
    /// thresholds and leaf values are finite
    pub fn validate(&self, n_features: usize) -> Result<()> {
        let mut stack = vec![self];
        while let Some(node) = stack.pop() {
            match node {
                TreeNode::Leaf { value, .. } => {
                    if !value.is_finite() {
                        return Err(QualityError::Validation(format!(
                            "leaf value {} is not finite",
                            value
                        )));
                    }
                }
                TreeNode::Split {
                    feature_idx,
                    threshold,
                    left,
                    right,
                    ..
                } => {
                    if *feature_idx >= n_features {
                        return Err(QualityError::Validation(format!(
                            "split on feature {} but the tree has {} features",
                            feature_idx, n_features
                        )));
                    }
                    if !threshold.is_finite() {
                        return Err(QualityError::Validation(format!(
                            "split threshold {} is not finite",
                            threshold
                        )));
                    }
                    stack.push(right);
                    stack.push(left);
                }
            }
        }
        Ok(())
    }
}

/// Serialized form of a tree: nodes in preorder, children referenced by index
#[derive(Debug, Serialize, Deserialize)]
struct NodeTable {
    nodes: Vec<FlatNode>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum FlatNode {
    Leaf {
        value: f64,
        n_samples: usize,
    },
    Split {
        feature_idx: usize,
        threshold: f64,
        left: usize,
        right: usize,
        n_samples: usize,
        gain: f64,
    },
}

impl From<TreeNode> for NodeTable {
    fn from(root: TreeNode) -> Self {
        let mut nodes = Vec::new();
        // (node, parent index, is left child)
        let mut stack: Vec<(TreeNode, Option<(usize, bool)>)> = vec![(root, None)];

        while let Some((node, parent)) = stack.pop() {
            let idx = nodes.len();
            if let Some((parent_idx, is_left)) = parent {
                if let Some(FlatNode::Split { left, right, .. }) = nodes.get_mut(parent_idx) {
                    if is_left {
                        *left = idx;
                    } else {
                        *right = idx;
                    }
                }
            }

            match node {
                TreeNode::Leaf { value, n_samples } => nodes.push(FlatNode::Leaf { value, n_samples }),
                TreeNode::Split {
                    feature_idx,
                    threshold,
                    left,
                    right,
                    n_samples,
                    gain,
                } => {
                    nodes.push(FlatNode::Split {
                        feature_idx,
                        threshold,
                        left: 0,
                        right: 0,
                        n_samples,
                        gain,
                    });
                    stack.push((*right, Some((idx, false))));
                    stack.push((*left, Some((idx, true))));
                }
            }
        }

        Self { nodes }
    }
}

impl TryFrom<NodeTable> for TreeNode {
    type Error = String;

    /// Rebuild bottom-up; each child must come after its parent and be used once
    fn try_from(table: NodeTable) -> std::result::Result<Self, Self::Error> {
        let n = table.nodes.len();
        if n == 0 {
            return Err("tree has no nodes".to_string());
        }

        let mut built: Vec<Option<TreeNode>> = (0..n).map(|_| None).collect();
        for (idx, flat) in table.nodes.into_iter().enumerate().rev() {
            let node = match flat {
                FlatNode::Leaf { value, n_samples } => TreeNode::Leaf { value, n_samples },
                FlatNode::Split {
                    feature_idx,
                    threshold,
                    left,
                    right,
                    n_samples,
                    gain,
                } => TreeNode::Split {
                    feature_idx,
                    threshold,
                    left: take_child(&mut built, idx, left)?,
                    right: take_child(&mut built, idx, right)?,
                    n_samples,
                    gain,
                },
            };
            built[idx] = Some(node);
        }

        if let Some(orphan) = built.iter().skip(1).position(Option::is_some) {
            return Err(format!("node {} is not reachable from the root", orphan + 1));
        }
        built[0]
            .take()
            .ok_or_else(|| "tree root is missing".to_string())
    }
}

fn take_child(
    built: &mut [Option<TreeNode>],
    parent: usize,
    child: usize,
) -> std::result::Result<Box<TreeNode>, String> {
    if child <= parent || child >= built.len() {
        return Err(format!("node {} points to invalid child {}", parent, child));
    }
    built[child]
        .take()
        .map(Box::new)
        .ok_or_else(|| format!("node {} reuses child {}", parent, child))
}

/// Growth limits for one tree
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TreeParams {
    /// Maximum depth (`None` = grow until another limit stops it)
    pub max_depth: Option<usize>,
    /// Nodes with fewer rows than this become leaves
    pub min_samples_split: usize,
}

impl Default for TreeParams {
    fn default() -> Self {
        Self {
            max_depth: Some(10),
            min_samples_split: 10,
        }
    }
}

impl TreeParams {
    pub fn new(max_depth: usize, min_samples_split: usize) -> Self {
        Self {
            max_depth: Some(max_depth),
            min_samples_split,
        }
    }

    /// No depth limit, split down to single rows
    pub fn unbounded() -> Self {
        Self {
            max_depth: None,
            min_samples_split: 1,
        }
    }

    /// Set maximum depth
    pub fn with_max_depth(mut self, depth: usize) -> Self {
        self.max_depth = Some(depth);
        self
    }

    /// Set minimum samples to split
    pub fn with_min_samples_split(mut self, min_samples: usize) -> Self {
        self.min_samples_split = min_samples;
        self
    }
}

/// Fitted regression tree
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegressionTree {
    root: TreeNode,
    n_features: usize,
}

impl RegressionTree {
    /// Fit a tree to `x`, `y`
    pub fn fit(x: &Array2<f64>, y: &Array1<f64>, params: &TreeParams) -> Result<Self> {
        Ok(Self {
            root: induce(x, y, params)?,
            n_features: x.ncols(),
        })
    }

    pub fn root(&self) -> &TreeNode {
        &self.root
    }

    pub fn n_features(&self) -> usize {
        self.n_features
    }

    /// Predict one row
    pub fn predict_row(&self, row: ArrayView1<f64>) -> f64 {
        self.root.predict(&row)
    }

    /// Predict every row of `x`
    pub fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        if x.ncols() != self.n_features {
            return Err(QualityError::ShapeMismatch {
                expected: format!("{} features", self.n_features),
                actual: format!("{} features", x.ncols()),
            });
        }
        Ok(x.rows().into_iter().map(|row| self.root.predict(&row)).collect())
    }

    pub fn depth(&self) -> usize {
        self.root.depth()
    }

    pub fn n_leaves(&self) -> usize {
        self.root.n_leaves()
    }
}

/// Induce a tree over all rows of `x`
pub fn induce(x: &Array2<f64>, y: &Array1<f64>, params: &TreeParams) -> Result<TreeNode> {
    check_training_inputs(x, y)?;
    let indices: Vec<usize> = (0..x.nrows()).collect();
    Ok(build_node(x, y, &indices, params, 0))
}

struct SplitCandidate {
    feature_idx: usize,
    threshold: f64,
    score: f64,
}

fn build_node(
    x: &Array2<f64>,
    y: &Array1<f64>,
    indices: &[usize],
    params: &TreeParams,
    depth: usize,
) -> TreeNode {
    let n_samples = indices.len();
    let value = mean_of(y, indices);

    let depth_reached = params.max_depth.map_or(false, |d| depth >= d);
    if depth_reached || n_samples < params.min_samples_split || is_pure(y, indices) {
        return TreeNode::Leaf { value, n_samples };
    }

    let best = match find_best_split(x, y, indices) {
        Some(candidate) if candidate.score > 0.0 => candidate,
        _ => return TreeNode::Leaf { value, n_samples },
    };

    let (left_indices, right_indices): (Vec<usize>, Vec<usize>) = indices
        .iter()
        .partition(|&&i| x[[i, best.feature_idx]] <= best.threshold);

    // Thresholds sit strictly between observed values, so neither side is empty
    debug_assert!(!left_indices.is_empty() && !right_indices.is_empty());

    let left = Box::new(build_node(x, y, &left_indices, params, depth + 1));
    let right = Box::new(build_node(x, y, &right_indices, params, depth + 1));

    TreeNode::Split {
        feature_idx: best.feature_idx,
        threshold: best.threshold,
        left,
        right,
        n_samples,
        gain: best.score,
    }
}

fn find_best_split(x: &Array2<f64>, y: &Array1<f64>, indices: &[usize]) -> Option<SplitCandidate> {
    let n_features = x.ncols();
    let mean = mean_of(y, indices);

    // Centered labels keep the prefix sums well conditioned
    let total_sum: f64 = indices.iter().map(|&i| y[i] - mean).sum();
    let total_sq: f64 = indices.iter().map(|&i| (y[i] - mean).powi(2)).sum();

    let scan = |feature_idx: usize| scan_feature(x, y, indices, feature_idx, mean, total_sum, total_sq);

    let per_feature: Vec<Option<SplitCandidate>> = if indices.len() * n_features >= PARALLEL_SCAN_CELLS {
        (0..n_features).into_par_iter().map(scan).collect()
    } else {
        (0..n_features).map(scan).collect()
    };

    // Strict comparison in index order keeps the lowest feature on ties
    per_feature
        .into_iter()
        .flatten()
        .fold(None, |best: Option<SplitCandidate>, candidate| match best {
            Some(b) if b.score >= candidate.score => Some(b),
            _ => Some(candidate),
        })
}

fn scan_feature(
    x: &Array2<f64>,
    y: &Array1<f64>,
    indices: &[usize],
    feature_idx: usize,
    mean: f64,
    total_sum: f64,
    total_sq: f64,
) -> Option<SplitCandidate> {
    let n = indices.len();
    if n < 2 {
        return None;
    }
    let n_f = n as f64;

    let mut order = indices.to_vec();
    order.sort_by(|&a, &b| x[[a, feature_idx]].total_cmp(&x[[b, feature_idx]]));

    let total_variance = total_sq / n_f - (total_sum / n_f).powi(2);
    let mut left_sum = 0.0;
    let mut left_sq = 0.0;
    let mut best: Option<SplitCandidate> = None;

    for pos in 0..n - 1 {
        let r = y[order[pos]] - mean;
        left_sum += r;
        left_sq += r * r;

        let current = x[[order[pos], feature_idx]];
        let next = x[[order[pos + 1], feature_idx]];
        if next <= current {
            continue;
        }

        let n_left = (pos + 1) as f64;
        let n_right = n_f - n_left;
        let right_sum = total_sum - left_sum;
        let right_sq = total_sq - left_sq;

        let left_var = (left_sq / n_left - (left_sum / n_left).powi(2)).max(0.0);
        let right_var = (right_sq / n_right - (right_sum / n_right).powi(2)).max(0.0);
        let score = total_variance - (n_left / n_f) * left_var - (n_right / n_f) * right_var;

        if best.as_ref().map_or(true, |b| score > b.score) {
            best = Some(SplitCandidate {
                feature_idx,
                threshold: midpoint(current, next),
                score,
            });
        }
    }

    best
}

/// Midpoint that always routes `lo` left and `hi` right
fn midpoint(lo: f64, hi: f64) -> f64 {
    let mid = lo / 2.0 + hi / 2.0;
    if mid >= lo && mid < hi {
        mid
    } else {
        lo
    }
}

fn mean_of(y: &Array1<f64>, indices: &[usize]) -> f64 {
    if indices.is_empty() {
        return 0.0;
    }
    indices.iter().map(|&i| y[i]).sum::<f64>() / indices.len() as f64
}

fn is_pure(y: &Array1<f64>, indices: &[usize]) -> bool {
    match indices.first() {
        None => true,
        Some(&first) => {
            let first = y[first];
            indices.iter().all(|&i| y[i] == first)
        }
    }
}
