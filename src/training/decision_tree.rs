//! Decision tree implementation
//!
//! Leaves hold a value vector: class proportions for classifiers, the
//! target mean (one entry) for regressors. Keeping proportions rather than
//! the majority label lets the tree expose probabilities and lets exact
//! tree attribution explain each class output.

use super::config::TaskType;
use super::models::{argmax, check_width, unique_classes, Model, ScaledTree, TreeEnsemble, TreeOutput};
use crate::error::{MeovisError, Result};
use ndarray::{Array1, Array2, ArrayView1};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::BTreeMap;

/// Decision tree node
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum TreeNode {
    /// Leaf node with prediction value(s)
    Leaf {
        value: Vec<f64>,
        n_samples: usize,
    },
    /// Internal node with split
    Split {
        feature_idx: usize,
        threshold: f64,
        left: Box<TreeNode>,
        right: Box<TreeNode>,
        n_samples: usize,
        impurity: f64,
    },
}

impl TreeNode {
    /// Number of training samples that reached this node (the node cover)
    pub fn n_samples(&self) -> usize {
        match self {
            TreeNode::Leaf { n_samples, .. } | TreeNode::Split { n_samples, .. } => *n_samples,
        }
    }

    /// Maximum depth below (and including) this node
    pub fn depth(&self) -> usize {
        match self {
            TreeNode::Leaf { .. } => 1,
            TreeNode::Split { left, right, .. } => 1 + left.depth().max(right.depth()),
        }
    }

    pub fn n_leaves(&self) -> usize {
        match self {
            TreeNode::Leaf { .. } => 1,
            TreeNode::Split { left, right, .. } => left.n_leaves() + right.n_leaves(),
        }
    }

    fn leaf_for(&self, sample: ArrayView1<f64>) -> &[f64] {
        match self {
            TreeNode::Leaf { value, .. } => value,
            TreeNode::Split {
                feature_idx,
                threshold,
                left,
                right,
                ..
            } => {
                if sample[*feature_idx] <= *threshold {
                    left.leaf_for(sample)
                } else {
                    right.leaf_for(sample)
                }
            }
        }
    }
}

/// Impurity criterion
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum Criterion {
    /// Gini impurity (classification)
    Gini,
    /// Entropy (classification)
    Entropy,
    /// Mean squared error (regression)
    MSE,
}

impl Criterion {
    fn name(&self) -> &'static str {
        match self {
            Criterion::Gini => "gini",
            Criterion::Entropy => "entropy",
            Criterion::MSE => "squared_error",
        }
    }
}

/// Running statistics of the samples on one side of a candidate split
#[derive(Debug, Clone)]
struct SideStats {
    count: usize,
    sum: f64,
    sq_sum: f64,
    class_counts: Vec<usize>,
}

impl SideStats {
    fn empty(n_classes: usize) -> Self {
        Self {
            count: 0,
            sum: 0.0,
            sq_sum: 0.0,
            class_counts: vec![0; n_classes],
        }
    }

    fn add(&mut self, target: f64, class_idx: Option<usize>) {
        self.count += 1;
        self.sum += target;
        self.sq_sum += target * target;
        if let Some(c) = class_idx {
            self.class_counts[c] += 1;
        }
    }

    fn remove(&mut self, target: f64, class_idx: Option<usize>) {
        self.count -= 1;
        self.sum -= target;
        self.sq_sum -= target * target;
        if let Some(c) = class_idx {
            self.class_counts[c] -= 1;
        }
    }

    fn impurity(&self, criterion: Criterion) -> f64 {
        if self.count == 0 {
            return 0.0;
        }
        let n = self.count as f64;
        match criterion {
            Criterion::Gini => {
                1.0 - self
                    .class_counts
                    .iter()
                    .map(|&c| (c as f64 / n).powi(2))
                    .sum::<f64>()
            }
            Criterion::Entropy => -self
                .class_counts
                .iter()
                .filter(|&&c| c > 0)
                .map(|&c| {
                    let p = c as f64 / n;
                    p * p.log2()
                })
                .sum::<f64>(),
            // Var = E[X²] - E[X]², clamped against cancellation
            Criterion::MSE => (self.sq_sum / n - (self.sum / n).powi(2)).max(0.0),
        }
    }
}

/// Best split found for one node
#[derive(Debug, Clone, Copy)]
struct SplitCandidate {
    feature_idx: usize,
    threshold: f64,
    gain: f64,
}

/// Decision tree model
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionTree {
    /// Tree root
    root: Option<TreeNode>,
    /// Maximum depth
    pub max_depth: Option<usize>,
    /// Minimum samples to split
    pub min_samples_split: usize,
    /// Minimum samples in leaf
    pub min_samples_leaf: usize,
    /// Maximum features to consider per split
    pub max_features: Option<usize>,
    /// Impurity criterion
    pub criterion: Criterion,
    /// Seed for the per-split feature subset
    pub random_state: Option<u64>,
    /// Number of features
    n_features: usize,
    /// Feature importances
    feature_importances: Option<Array1<f64>>,
    /// Is classification task
    is_classification: bool,
    /// Classes (for classification)
    classes: Vec<f64>,
}

impl Default for DecisionTree {
    fn default() -> Self {
        Self::new_classifier()
    }
}

impl DecisionTree {
    /// Create a new classifier tree
    pub fn new_classifier() -> Self {
        Self {
            root: None,
            max_depth: None,
            min_samples_split: 2,
            min_samples_leaf: 1,
            max_features: None,
            criterion: Criterion::Gini,
            random_state: None,
            n_features: 0,
            feature_importances: None,
            is_classification: true,
            classes: Vec::new(),
        }
    }

    /// Create a new regressor tree
    pub fn new_regressor() -> Self {
        Self {
            criterion: Criterion::MSE,
            is_classification: false,
            ..Self::new_classifier()
        }
    }

    /// Set maximum depth
    pub fn with_max_depth(mut self, depth: usize) -> Self {
        self.max_depth = Some(depth);
        self
    }

    /// Set minimum samples to split
    pub fn with_min_samples_split(mut self, min_samples: usize) -> Self {
        self.min_samples_split = min_samples.max(2);
        self
    }

    /// Set minimum samples in leaf
    pub fn with_min_samples_leaf(mut self, min_samples: usize) -> Self {
        self.min_samples_leaf = min_samples.max(1);
        self
    }

    /// Limit the number of features examined at each split
    pub fn with_max_features(mut self, max_features: usize) -> Self {
        self.max_features = Some(max_features.max(1));
        self
    }

    /// Set criterion
    pub fn with_criterion(mut self, criterion: Criterion) -> Self {
        self.criterion = criterion;
        self
    }

    /// Set random state
    pub fn with_random_state(mut self, seed: u64) -> Self {
        self.random_state = Some(seed);
        self
    }

    pub fn is_classifier(&self) -> bool {
        self.is_classification
    }

    /// Root node, if fitted
    pub fn root(&self) -> Option<&TreeNode> {
        self.root.as_ref()
    }

    /// Fit the tree to training data
    pub fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<&mut Self> {
        let classes = if self.is_classification {
            unique_classes(y)?
        } else {
            Vec::new()
        };
        self.fit_with_classes(x, y, classes)
    }

    /// Fit against a fixed class list.
    ///
    /// Ensembles use this so every member tree emits probabilities in the
    /// same column order even when its bootstrap sample misses a class.
    pub(crate) fn fit_with_classes(
        &mut self,
        x: &Array2<f64>,
        y: &Array1<f64>,
        classes: Vec<f64>,
    ) -> Result<&mut Self> {
        let n_samples = x.nrows();
        let n_features = x.ncols();

        if n_samples != y.len() {
            return Err(MeovisError::Shape {
                expected: format!("y length = {}", n_samples),
                actual: format!("y length = {}", y.len()),
            });
        }
        if n_samples == 0 || n_features == 0 {
            return Err(MeovisError::Training(format!(
                "cannot fit a tree on a {}x{} matrix",
                n_samples, n_features
            )));
        }
        if y.iter().any(|v| !v.is_finite()) {
            return Err(MeovisError::Training("target contains non-finite values".to_string()));
        }

        self.n_features = n_features;
        self.classes = classes;

        let class_idx: Option<Vec<usize>> = if self.is_classification {
            let idx = y
                .iter()
                .map(|v| {
                    self.classes
                        .binary_search_by(|c| c.total_cmp(v))
                        .map_err(|_| MeovisError::Training(format!("label {} is not a known class", v)))
                })
                .collect::<Result<Vec<_>>>()?;
            Some(idx)
        } else {
            None
        };

        let mut rng = match self.random_state {
            Some(seed) => ChaCha8Rng::seed_from_u64(seed),
            None => ChaCha8Rng::from_entropy(),
        };

        let mut importances = vec![0.0; n_features];
        let indices: Vec<usize> = (0..n_samples).collect();
        let ctx = FitContext {
            x,
            y,
            class_idx: class_idx.as_deref(),
            n_classes: self.classes.len(),
        };
        let root = self.build_tree(&ctx, &indices, 0, &mut importances, &mut rng);
        self.root = Some(root);

        let total: f64 = importances.iter().sum();
        if total > 0.0 {
            for imp in &mut importances {
                *imp /= total;
            }
        }
        self.feature_importances = Some(Array1::from_vec(importances));

        Ok(self)
    }

    fn build_tree(
        &self,
        ctx: &FitContext<'_>,
        indices: &[usize],
        depth: usize,
        importances: &mut [f64],
        rng: &mut ChaCha8Rng,
    ) -> TreeNode {
        let n_samples = indices.len();
        let stats = ctx.stats(indices);
        let impurity = stats.impurity(self.criterion);

        let should_stop = n_samples < self.min_samples_split
            || n_samples < 2 * self.min_samples_leaf
            || self.max_depth.map_or(false, |d| depth >= d)
            || impurity <= 1e-12;

        if should_stop {
            return self.leaf(&stats);
        }

        let features = self.candidate_features(rng);
        let Some(best) = self.find_best_split(ctx, indices, &features, &stats, impurity) else {
            return self.leaf(&stats);
        };

        let (left_indices, right_indices): (Vec<usize>, Vec<usize>) = indices
            .iter()
            .partition(|&&i| ctx.x[[i, best.feature_idx]] <= best.threshold);

        importances[best.feature_idx] += n_samples as f64 * best.gain;

        let left = Box::new(self.build_tree(ctx, &left_indices, depth + 1, importances, rng));
        let right = Box::new(self.build_tree(ctx, &right_indices, depth + 1, importances, rng));

        TreeNode::Split {
            feature_idx: best.feature_idx,
            threshold: best.threshold,
            left,
            right,
            n_samples,
            impurity,
        }
    }

    fn candidate_features(&self, rng: &mut ChaCha8Rng) -> Vec<usize> {
        match self.max_features {
            Some(k) if k < self.n_features => {
                let mut picked = rand::seq::index::sample(rng, self.n_features, k).into_vec();
                picked.sort_unstable();
                picked
            }
            _ => (0..self.n_features).collect(),
        }
    }

    /// Sorted sweep over each candidate feature, parallel across features
    fn find_best_split(
        &self,
        ctx: &FitContext<'_>,
        indices: &[usize],
        features: &[usize],
        parent: &SideStats,
        parent_impurity: f64,
    ) -> Option<SplitCandidate> {
        let n = indices.len() as f64;
        let min_leaf = self.min_samples_leaf;

        let per_feature: Vec<Option<SplitCandidate>> = features
            .par_iter()
            .map(|&feature_idx| {
                let mut order: Vec<(f64, usize)> = indices
                    .iter()
                    .map(|&i| (ctx.x[[i, feature_idx]], i))
                    .collect();
                order.sort_by(|a, b| a.0.total_cmp(&b.0));

                let mut left = SideStats::empty(ctx.n_classes);
                let mut right = parent.clone();
                let mut best: Option<SplitCandidate> = None;

                for pos in 0..order.len() - 1 {
                    let (value, sample) = order[pos];
                    let target = ctx.y[sample];
                    let class = ctx.class_idx.map(|c| c[sample]);
                    left.add(target, class);
                    right.remove(target, class);

                    let next = order[pos + 1].0;
                    // NaN sorts last and always falls right of a finite threshold
                    if !(value < next) || !next.is_finite() {
                        continue;
                    }
                    if left.count < min_leaf || right.count < min_leaf {
                        continue;
                    }

                    let weighted = (left.count as f64 * left.impurity(self.criterion)
                        + right.count as f64 * right.impurity(self.criterion))
                        / n;
                    let gain = parent_impurity - weighted;
                    if gain > best.map_or(1e-12, |b| b.gain) {
                        best = Some(SplitCandidate {
                            feature_idx,
                            threshold: (value + next) / 2.0,
                            gain,
                        });
                    }
                }
                best
            })
            .collect();

        per_feature.into_iter().flatten().fold(None, |acc, cand| match acc {
            Some(b) if b.gain >= cand.gain => Some(b),
            _ => Some(cand),
        })
    }

    fn leaf(&self, stats: &SideStats) -> TreeNode {
        let value = if self.is_classification {
            let n = stats.count.max(1) as f64;
            stats.class_counts.iter().map(|&c| c as f64 / n).collect()
        } else {
            vec![stats.sum / stats.count.max(1) as f64]
        };
        TreeNode::Leaf {
            value,
            n_samples: stats.count,
        }
    }

    fn fitted_root(&self, x: &Array2<f64>) -> Result<&TreeNode> {
        let root = self.root.as_ref().ok_or(MeovisError::ModelNotFitted)?;
        check_width(self.n_features, x)?;
        Ok(root)
    }

    /// Get tree depth
    pub fn get_depth(&self) -> usize {
        self.root.as_ref().map_or(0, TreeNode::depth)
    }

    /// Get number of leaves
    pub fn get_n_leaves(&self) -> usize {
        self.root.as_ref().map_or(0, TreeNode::n_leaves)
    }

    /// Raw leaf value (mean) for each row; used by boosting
    pub(crate) fn predict_value(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        let root = self.fitted_root(x)?;
        Ok(x.outer_iter().map(|row| root.leaf_for(row)[0]).collect())
    }
}

/// Borrowed training inputs shared by the recursive builder
struct FitContext<'a> {
    x: &'a Array2<f64>,
    y: &'a Array1<f64>,
    class_idx: Option<&'a [usize]>,
    n_classes: usize,
}

impl FitContext<'_> {
    fn stats(&self, indices: &[usize]) -> SideStats {
        let mut stats = SideStats::empty(self.n_classes);
        for &i in indices {
            stats.add(self.y[i], self.class_idx.map(|c| c[i]));
        }
        stats
    }
}

impl Model for DecisionTree {
    fn algorithm_name(&self) -> &'static str {
        if self.is_classification {
            "DecisionTreeClassifier"
        } else {
            "DecisionTreeRegressor"
        }
    }

    fn task_type(&self) -> TaskType {
        if self.is_classification {
            TaskType::Classification
        } else {
            TaskType::Regression
        }
    }

    fn n_features(&self) -> usize {
        self.n_features
    }

    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        if !self.is_classification {
            return self.predict_value(x);
        }
        let proba = self.predict_proba(x)?;
        Ok(proba
            .outer_iter()
            .map(|row| self.classes[argmax(row)])
            .collect())
    }

    fn supports_proba(&self) -> bool {
        self.is_classification
    }

    fn predict_proba(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        if !self.is_classification {
            return Err(MeovisError::Prediction(
                "DecisionTreeRegressor does not expose class probabilities".to_string(),
            ));
        }
        let root = self.fitted_root(x)?;
        let n_classes = self.classes.len();
        let mut out = Array2::zeros((x.nrows(), n_classes));
        for (i, row) in x.outer_iter().enumerate() {
            for (j, p) in root.leaf_for(row).iter().enumerate() {
                out[[i, j]] = *p;
            }
        }
        Ok(out)
    }

    fn classes(&self) -> Option<&[f64]> {
        self.is_classification.then_some(self.classes.as_slice())
    }

    fn feature_importances(&self) -> Option<Array1<f64>> {
        self.feature_importances.clone()
    }

    fn tree_ensemble(&self) -> Option<TreeEnsemble<'_>> {
        let root = self.root.as_ref()?;
        let n_outputs = if self.is_classification { self.classes.len() } else { 1 };
        Some(TreeEnsemble {
            trees: vec![ScaledTree {
                root,
                scale: 1.0,
                feature_map: None,
            }],
            base_value: vec![0.0; n_outputs],
            n_outputs,
            output: if self.is_classification {
                TreeOutput::Probability
            } else {
                TreeOutput::Value
            },
        })
    }

    fn parameters(&self) -> BTreeMap<String, serde_json::Value> {
        let mut params = BTreeMap::new();
        params.insert("criterion".to_string(), json!(self.criterion.name()));
        params.insert("max_depth".to_string(), json!(self.max_depth));
        params.insert("min_samples_split".to_string(), json!(self.min_samples_split));
        params.insert("min_samples_leaf".to_string(), json!(self.min_samples_leaf));
        params.insert("max_features".to_string(), json!(self.max_features));
        params.insert("random_state".to_string(), json!(self.random_state));
        params
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_classifier_separable() {
        let x = array![[0.0, 0.0], [0.0, 1.0], [1.0, 0.0], [1.0, 1.0]];
        let y = array![0.0, 0.0, 1.0, 1.0];

        let mut tree = DecisionTree::new_classifier();
        tree.fit(&x, &y).unwrap();

        assert_eq!(tree.predict(&x).unwrap(), y);
        let proba = tree.predict_proba(&x).unwrap();
        assert_eq!(proba.dim(), (4, 2));
        assert!((proba[[0, 0]] - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_classifier_keeps_original_labels() {
        let x = array![[1.0], [2.0], [3.0], [4.0]];
        let y = array![3.0, 3.0, 7.0, 7.0];

        let mut tree = DecisionTree::new_classifier();
        tree.fit(&x, &y).unwrap();

        assert_eq!(tree.classes(), Some(&[3.0, 7.0][..]));
        assert_eq!(tree.predict(&x).unwrap(), y);
    }

    #[test]
    fn test_regressor_simple() {
        let x = array![[1.0], [2.0], [3.0], [4.0], [5.0]];
        let y = array![1.0, 2.0, 3.0, 4.0, 5.0];

        let mut tree = DecisionTree::new_regressor();
        tree.fit(&x, &y).unwrap();

        let predictions = tree.predict(&x).unwrap();
        let mse: f64 = predictions
            .iter()
            .zip(y.iter())
            .map(|(p, a)| (p - a).powi(2))
            .sum::<f64>()
            / y.len() as f64;
        assert!(mse < 1e-12, "MSE too high: {}", mse);
        assert!(!tree.supports_proba());
    }

    #[test]
    fn test_max_depth() {
        let x = array![[1.0, 1.0], [2.0, 2.0], [3.0, 3.0], [4.0, 4.0]];
        let y = array![0.0, 1.0, 0.0, 1.0];

        let mut tree = DecisionTree::new_classifier().with_max_depth(2);
        tree.fit(&x, &y).unwrap();

        // depth counts levels, so a depth-2 limit allows three levels of nodes
        assert!(tree.get_depth() <= 3);
    }

    #[test]
    fn test_feature_importances() {
        let x = array![[1.0, 0.0], [2.0, 0.0], [3.0, 0.0], [4.0, 0.0]];
        let y = array![0.0, 0.0, 1.0, 1.0];

        let mut tree = DecisionTree::new_classifier();
        tree.fit(&x, &y).unwrap();

        let importances = Model::feature_importances(&tree).unwrap();
        assert!((importances[0] - 1.0).abs() < 1e-12);
        assert_eq!(importances[1], 0.0);
    }

    #[test]
    fn test_node_cover_sums() {
        let x = array![[1.0], [2.0], [3.0], [4.0], [5.0], [6.0]];
        let y = array![1.0, 1.0, 2.0, 2.0, 5.0, 5.0];
        let mut tree = DecisionTree::new_regressor();
        tree.fit(&x, &y).unwrap();

        fn check(node: &TreeNode) {
            if let TreeNode::Split { left, right, n_samples, .. } = node {
                assert_eq!(left.n_samples() + right.n_samples(), *n_samples);
                check(left);
                check(right);
            }
        }
        let root = tree.root().unwrap();
        assert_eq!(root.n_samples(), 6);
        check(root);
    }

    #[test]
    fn test_nan_routes_right() {
        let x = array![[1.0], [2.0], [f64::NAN], [10.0]];
        let y = array![0.0, 0.0, 1.0, 1.0];
        let mut tree = DecisionTree::new_classifier();
        tree.fit(&x, &y).unwrap();
        let pred = tree.predict(&array![[f64::NAN]]).unwrap();
        assert_eq!(pred[0], 1.0);
    }

    #[test]
    fn test_width_mismatch_is_prediction_error() {
        let x = array![[1.0, 2.0], [2.0, 1.0]];
        let y = array![0.0, 1.0];
        let mut tree = DecisionTree::new_classifier();
        tree.fit(&x, &y).unwrap();
        let err = tree.predict(&array![[1.0]]).unwrap_err();
        assert!(matches!(err, MeovisError::Prediction(_)));
    }

    #[test]
    fn test_unfitted() {
        let tree = DecisionTree::new_regressor();
        assert!(matches!(
            tree.predict(&array![[1.0]]),
            Err(MeovisError::ModelNotFitted)
        ));
    }
}
