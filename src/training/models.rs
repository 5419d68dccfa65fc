//! Model trait, tree-ensemble view and the serializable model enum

use super::config::TaskType;
use super::decision_tree::{DecisionTree, TreeNode};
use super::gradient_boosting::{GradientBoostingClassifier, GradientBoostingRegressor};
use super::linear_models::{LinearRegression, LogisticRegression};
use super::naive_bayes::GaussianNaiveBayes;
use super::random_forest::RandomForest;
use crate::error::{MeovisError, Result};
use ndarray::{Array1, Array2, ArrayView1};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Trait for fitted estimators that can be analyzed.
///
/// All methods are read-only: probing a model for its capabilities never
/// mutates it, so a fitted model can be shared across threads.
pub trait Model: Send + Sync {
    /// Estimator name as reported in model info
    fn algorithm_name(&self) -> &'static str;

    /// Task the estimator was fitted for
    fn task_type(&self) -> TaskType;

    /// Number of input features seen during fit
    fn n_features(&self) -> usize;

    /// Point predictions (class labels for classifiers)
    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>>;

    /// Whether `predict_proba` is available
    fn supports_proba(&self) -> bool {
        false
    }

    /// Class probabilities, one column per entry of `classes()`
    fn predict_proba(&self, _x: &Array2<f64>) -> Result<Array2<f64>> {
        Err(MeovisError::Prediction(format!(
            "{} does not expose class probabilities",
            self.algorithm_name()
        )))
    }

    /// Sorted class labels (classifiers only)
    fn classes(&self) -> Option<&[f64]> {
        None
    }

    /// Normalized impurity-based importances (if available)
    fn feature_importances(&self) -> Option<Array1<f64>> {
        None
    }

    /// Tree structure for exact attribution (tree models only)
    fn tree_ensemble(&self) -> Option<TreeEnsemble<'_>> {
        None
    }

    /// Hyper-parameters as a flat mapping
    fn parameters(&self) -> BTreeMap<String, serde_json::Value>;
}

/// What the leaves of a tree ensemble add up to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TreeOutput {
    /// Per-class probabilities
    Probability,
    /// Regression value
    Value,
    /// Raw log-odds margin of a binary classifier
    LogOdds,
}

/// One tree of an ensemble with its contribution weight
#[derive(Debug, Clone, Copy)]
pub struct ScaledTree<'a> {
    pub root: &'a TreeNode,
    pub scale: f64,
    /// Maps the tree's local feature indices to model columns
    pub feature_map: Option<&'a [usize]>,
}

impl<'a> ScaledTree<'a> {
    pub fn global_feature(&self, local: usize) -> usize {
        match self.feature_map {
            Some(map) => map[local],
            None => local,
        }
    }
}

/// Borrowed view over the trees of a fitted model.
///
/// The explained output for a row is
/// `base_value + sum(tree.scale * leaf_value(tree, row))`, one entry per output.
#[derive(Debug, Clone)]
pub struct TreeEnsemble<'a> {
    pub trees: Vec<ScaledTree<'a>>,
    pub base_value: Vec<f64>,
    pub n_outputs: usize,
    pub output: TreeOutput,
}

impl<'a> TreeEnsemble<'a> {
    /// Ensemble output for one row, in the explained space
    pub fn raw_output(&self, row: ArrayView1<f64>) -> Vec<f64> {
        let mut out = self.base_value.clone();
        for tree in &self.trees {
            let leaf = leaf_value(tree, row);
            for (o, v) in out.iter_mut().zip(leaf.iter()) {
                *o += tree.scale * v;
            }
        }
        out
    }
}

fn leaf_value<'a>(tree: &ScaledTree<'a>, row: ArrayView1<f64>) -> &'a [f64] {
    let mut node = tree.root;
    loop {
        match node {
            TreeNode::Leaf { value, .. } => return value,
            TreeNode::Split {
                feature_idx,
                threshold,
                left,
                right,
                ..
            } => {
                let x = row[tree.global_feature(*feature_idx)];
                node = if x <= *threshold { &**left } else { &**right };
            }
        }
    }
}

/// Validate the feature width of a prediction input
pub(crate) fn check_width(expected: usize, x: &Array2<f64>) -> Result<()> {
    if x.ncols() != expected {
        return Err(MeovisError::Prediction(format!(
            "X has {} features, but the model was fitted with {}",
            x.ncols(),
            expected
        )));
    }
    Ok(())
}

/// Index of the largest value (first on ties)
pub(crate) fn argmax(values: ArrayView1<f64>) -> usize {
    let mut best = 0;
    for (i, v) in values.iter().enumerate() {
        if *v > values[best] {
            best = i;
        }
    }
    best
}

/// Sorted distinct labels of a classification target
pub(crate) fn unique_classes(y: &Array1<f64>) -> Result<Vec<f64>> {
    if y.iter().any(|v| !v.is_finite()) {
        return Err(MeovisError::Training(
            "classification target contains non-finite labels".to_string(),
        ));
    }
    let mut classes: Vec<f64> = y.to_vec();
    classes.sort_by(|a, b| a.total_cmp(b));
    classes.dedup();
    Ok(classes)
}

/// A fitted estimator of any supported family
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum TrainedModel {
    DecisionTree(DecisionTree),
    RandomForest(RandomForest),
    GradientBoostingRegressor(GradientBoostingRegressor),
    GradientBoostingClassifier(GradientBoostingClassifier),
    LinearRegression(LinearRegression),
    LogisticRegression(LogisticRegression),
    GaussianNaiveBayes(GaussianNaiveBayes),
}

impl TrainedModel {
    pub fn as_model(&self) -> &dyn Model {
        match self {
            TrainedModel::DecisionTree(m) => m,
            TrainedModel::RandomForest(m) => m,
            TrainedModel::GradientBoostingRegressor(m) => m,
            TrainedModel::GradientBoostingClassifier(m) => m,
            TrainedModel::LinearRegression(m) => m,
            TrainedModel::LogisticRegression(m) => m,
            TrainedModel::GaussianNaiveBayes(m) => m,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_argmax_prefers_first_on_ties() {
        assert_eq!(argmax(array![0.2, 0.4, 0.4].view()), 1);
        assert_eq!(argmax(array![0.5, 0.5].view()), 0);
    }

    #[test]
    fn test_unique_classes_sorted() {
        let y = array![2.0, 0.0, 1.0, 2.0, 0.0];
        assert_eq!(unique_classes(&y).unwrap(), vec![0.0, 1.0, 2.0]);
        assert!(unique_classes(&array![1.0, f64::NAN]).is_err());
    }

    #[test]
    fn test_check_width() {
        let x = Array2::<f64>::zeros((2, 3));
        assert!(check_width(3, &x).is_ok());
        assert!(matches!(check_width(4, &x), Err(MeovisError::Prediction(_))));
    }

    #[test]
    fn test_raw_output_matches_tree_prediction() {
        let x = array![[1.0, 0.0], [2.0, 0.0], [3.0, 1.0], [4.0, 1.0]];
        let y = array![1.0, 1.5, 3.0, 3.5];
        let mut tree = DecisionTree::new_regressor();
        tree.fit(&x, &y).unwrap();
        let model = TrainedModel::DecisionTree(tree);
        let ensemble = model.as_model().tree_ensemble().unwrap();
        let preds = model.as_model().predict(&x).unwrap();
        for (i, row) in x.outer_iter().enumerate() {
            assert!((ensemble.raw_output(row)[0] - preds[i]).abs() < 1e-12);
        }
    }
}
