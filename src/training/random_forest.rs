//! Random Forest implementation

use super::config::TaskType;
use super::decision_tree::{Criterion, DecisionTree};
use super::models::{argmax, check_width, unique_classes, Model, ScaledTree, TreeEnsemble, TreeOutput};
use crate::error::{MeovisError, Result};
use ndarray::{Array1, Array2, Axis};
use rand::{Rng, RngCore, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::BTreeMap;

/// Strategy for max features
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub enum MaxFeatures {
    /// Square root of n_features
    Sqrt,
    /// Log2 of n_features
    Log2,
    /// Fraction of n_features
    Fraction(f64),
    /// Fixed number
    Fixed(usize),
    /// All features
    All,
}

impl MaxFeatures {
    fn resolve(&self, n_features: usize) -> usize {
        match *self {
            MaxFeatures::Sqrt => (n_features as f64).sqrt().ceil() as usize,
            MaxFeatures::Log2 => (n_features as f64).log2().ceil() as usize,
            MaxFeatures::Fraction(f) => (n_features as f64 * f).ceil() as usize,
            MaxFeatures::Fixed(n) => n.min(n_features),
            MaxFeatures::All => n_features,
        }
        .clamp(1, n_features.max(1))
    }

    fn describe(&self) -> serde_json::Value {
        match self {
            MaxFeatures::Sqrt => json!("sqrt"),
            MaxFeatures::Log2 => json!("log2"),
            MaxFeatures::Fraction(f) => json!(f),
            MaxFeatures::Fixed(n) => json!(n),
            MaxFeatures::All => json!(null),
        }
    }
}

/// Random Forest model
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RandomForest {
    /// Individual trees
    trees: Vec<DecisionTree>,
    /// Number of trees
    pub n_estimators: usize,
    /// Maximum depth per tree
    pub max_depth: Option<usize>,
    /// Minimum samples to split
    pub min_samples_split: usize,
    /// Minimum samples in leaf
    pub min_samples_leaf: usize,
    /// Maximum features per split
    pub max_features: MaxFeatures,
    /// Bootstrap sampling
    pub bootstrap: bool,
    /// Impurity criterion
    pub criterion: Criterion,
    /// Random state
    pub random_state: Option<u64>,
    /// Is classification task
    is_classification: bool,
    /// Feature importances
    feature_importances: Option<Array1<f64>>,
    /// Number of features
    n_features: usize,
    /// Classes (for classification)
    classes: Vec<f64>,
}

impl Default for RandomForest {
    fn default() -> Self {
        Self::new_classifier(100)
    }
}

impl RandomForest {
    /// Create a new classifier forest
    pub fn new_classifier(n_estimators: usize) -> Self {
        Self {
            trees: Vec::new(),
            n_estimators: n_estimators.max(1),
            max_depth: None,
            min_samples_split: 2,
            min_samples_leaf: 1,
            max_features: MaxFeatures::Sqrt,
            bootstrap: true,
            criterion: Criterion::Gini,
            random_state: None,
            is_classification: true,
            feature_importances: None,
            n_features: 0,
            classes: Vec::new(),
        }
    }

    /// Create a new regressor forest
    pub fn new_regressor(n_estimators: usize) -> Self {
        Self {
            max_features: MaxFeatures::All,
            criterion: Criterion::MSE,
            is_classification: false,
            ..Self::new_classifier(n_estimators)
        }
    }

    /// Set maximum depth
    pub fn with_max_depth(mut self, depth: usize) -> Self {
        self.max_depth = Some(depth);
        self
    }

    /// Set minimum samples in leaf
    pub fn with_min_samples_leaf(mut self, min_samples: usize) -> Self {
        self.min_samples_leaf = min_samples;
        self
    }

    /// Set max features strategy
    pub fn with_max_features(mut self, max_features: MaxFeatures) -> Self {
        self.max_features = max_features;
        self
    }

    /// Set random state
    pub fn with_random_state(mut self, seed: u64) -> Self {
        self.random_state = Some(seed);
        self
    }

    /// Disable bootstrap sampling
    pub fn with_bootstrap(mut self, bootstrap: bool) -> Self {
        self.bootstrap = bootstrap;
        self
    }

    /// Fit the forest to training data
    pub fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<&mut Self> {
        let n_samples = x.nrows();
        let n_features = x.ncols();

        if n_samples != y.len() {
            return Err(MeovisError::Shape {
                expected: format!("y length = {}", n_samples),
                actual: format!("y length = {}", y.len()),
            });
        }
        if n_samples == 0 {
            return Err(MeovisError::Training("cannot fit a forest on zero rows".to_string()));
        }

        self.n_features = n_features;
        self.classes = if self.is_classification {
            unique_classes(y)?
        } else {
            Vec::new()
        };
        let max_features = self.max_features.resolve(n_features);

        // One seed per tree drawn up front keeps the fit deterministic under rayon
        let mut seeder = match self.random_state {
            Some(seed) => ChaCha8Rng::seed_from_u64(seed),
            None => ChaCha8Rng::from_entropy(),
        };
        let seeds: Vec<u64> = (0..self.n_estimators).map(|_| seeder.next_u64()).collect();

        let trees: Vec<DecisionTree> = seeds
            .into_par_iter()
            .map(|seed| -> Result<DecisionTree> {
                let mut rng = ChaCha8Rng::seed_from_u64(seed);

                let sample_indices: Vec<usize> = if self.bootstrap {
                    (0..n_samples).map(|_| rng.gen_range(0..n_samples)).collect()
                } else {
                    (0..n_samples).collect()
                };

                let x_boot = x.select(Axis(0), &sample_indices);
                let y_boot = y.select(Axis(0), &sample_indices);

                let mut tree = if self.is_classification {
                    DecisionTree::new_classifier()
                } else {
                    DecisionTree::new_regressor()
                };
                if let Some(d) = self.max_depth {
                    tree = tree.with_max_depth(d);
                }
                tree = tree
                    .with_min_samples_split(self.min_samples_split)
                    .with_min_samples_leaf(self.min_samples_leaf)
                    .with_criterion(self.criterion)
                    .with_max_features(max_features)
                    .with_random_state(rng.next_u64());

                tree.fit_with_classes(&x_boot, &y_boot, self.classes.clone())?;
                Ok(tree)
            })
            .collect::<Result<Vec<_>>>()?;

        self.trees = trees;
        self.compute_feature_importances();

        Ok(self)
    }

    fn compute_feature_importances(&mut self) {
        let mut total = vec![0.0; self.n_features];
        for tree in &self.trees {
            if let Some(imp) = Model::feature_importances(tree) {
                for (t, v) in total.iter_mut().zip(imp.iter()) {
                    *t += v;
                }
            }
        }
        let sum: f64 = total.iter().sum();
        if sum > 0.0 {
            for t in &mut total {
                *t /= sum;
            }
        }
        self.feature_importances = Some(Array1::from_vec(total));
    }

    /// Get number of trees
    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }

    fn ensure_fitted(&self, x: &Array2<f64>) -> Result<()> {
        if self.trees.is_empty() {
            return Err(MeovisError::ModelNotFitted);
        }
        check_width(self.n_features, x)
    }
}

impl Model for RandomForest {
    fn algorithm_name(&self) -> &'static str {
        if self.is_classification {
            "RandomForestClassifier"
        } else {
            "RandomForestRegressor"
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
        if self.is_classification {
            let proba = self.predict_proba(x)?;
            return Ok(proba
                .outer_iter()
                .map(|row| self.classes[argmax(row)])
                .collect());
        }

        self.ensure_fitted(x)?;
        let per_tree = self
            .trees
            .par_iter()
            .map(|tree| tree.predict_value(x))
            .collect::<Result<Vec<_>>>()?;
        let mut mean = Array1::<f64>::zeros(x.nrows());
        for preds in &per_tree {
            mean += preds;
        }
        Ok(mean / self.trees.len() as f64)
    }

    fn supports_proba(&self) -> bool {
        self.is_classification
    }

    /// Mean of the per-tree leaf proportions
    fn predict_proba(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        if !self.is_classification {
            return Err(MeovisError::Prediction(
                "RandomForestRegressor does not expose class probabilities".to_string(),
            ));
        }
        self.ensure_fitted(x)?;
        let per_tree = self
            .trees
            .par_iter()
            .map(|tree| tree.predict_proba(x))
            .collect::<Result<Vec<_>>>()?;
        let mut proba = Array2::<f64>::zeros((x.nrows(), self.classes.len()));
        for p in &per_tree {
            proba += p;
        }
        Ok(proba / self.trees.len() as f64)
    }

    fn classes(&self) -> Option<&[f64]> {
        self.is_classification.then_some(self.classes.as_slice())
    }

    fn feature_importances(&self) -> Option<Array1<f64>> {
        self.feature_importances.clone()
    }

    fn tree_ensemble(&self) -> Option<TreeEnsemble<'_>> {
        if self.trees.is_empty() {
            return None;
        }
        let scale = 1.0 / self.trees.len() as f64;
        let trees = self
            .trees
            .iter()
            .map(|t| {
                t.root().map(|root| ScaledTree {
                    root,
                    scale,
                    feature_map: None,
                })
            })
            .collect::<Option<Vec<_>>>()?;
        let n_outputs = if self.is_classification { self.classes.len() } else { 1 };
        Some(TreeEnsemble {
            trees,
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
        params.insert("n_estimators".to_string(), json!(self.n_estimators));
        params.insert("max_depth".to_string(), json!(self.max_depth));
        params.insert("min_samples_split".to_string(), json!(self.min_samples_split));
        params.insert("min_samples_leaf".to_string(), json!(self.min_samples_leaf));
        params.insert("max_features".to_string(), self.max_features.describe());
        params.insert("bootstrap".to_string(), json!(self.bootstrap));
        params.insert("random_state".to_string(), json!(self.random_state));
        params
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn blobs() -> (Array2<f64>, Array1<f64>) {
        let x = array![
            [1.0, 2.0], [1.5, 1.8], [1.2, 2.2], [0.8, 1.9],
            [5.0, 8.0], [6.0, 9.0], [5.5, 8.5], [6.2, 7.9],
        ];
        let y = array![0.0, 0.0, 0.0, 0.0, 1.0, 1.0, 1.0, 1.0];
        (x, y)
    }

    #[test]
    fn test_classifier() {
        let (x, y) = blobs();
        let mut rf = RandomForest::new_classifier(10).with_random_state(42);
        rf.fit(&x, &y).unwrap();

        assert_eq!(rf.n_trees(), 10);
        let predictions = rf.predict(&x).unwrap();
        let correct = predictions.iter().zip(y.iter()).filter(|(p, t)| p == t).count();
        assert!(correct >= 7);
    }

    #[test]
    fn test_regressor() {
        let x = array![[1.0], [2.0], [3.0], [4.0], [5.0], [6.0]];
        let y = array![1.0, 2.0, 3.0, 4.0, 5.0, 6.0];
        let mut rf = RandomForest::new_regressor(10).with_random_state(7);
        rf.fit(&x, &y).unwrap();

        let predictions = rf.predict(&x).unwrap();
        assert_eq!(predictions.len(), 6);
        assert!(predictions.iter().all(|p| (1.0..=6.0).contains(p)));
    }

    #[test]
    fn test_predict_proba_rows_sum_to_one() {
        let (x, y) = blobs();
        let mut rf = RandomForest::new_classifier(5).with_random_state(1);
        rf.fit(&x, &y).unwrap();

        let proba = rf.predict_proba(&x).unwrap();
        assert_eq!(proba.dim(), (8, 2));
        for row in proba.outer_iter() {
            assert!((row.sum() - 1.0).abs() < 1e-9);
        }
    }

    #[test]
    fn test_fit_is_deterministic_with_seed() {
        let (x, y) = blobs();
        let mut a = RandomForest::new_classifier(8).with_random_state(3);
        let mut b = RandomForest::new_classifier(8).with_random_state(3);
        a.fit(&x, &y).unwrap();
        b.fit(&x, &y).unwrap();
        assert_eq!(a.predict_proba(&x).unwrap(), b.predict_proba(&x).unwrap());
    }

    #[test]
    fn test_tree_ensemble_scale() {
        let (x, y) = blobs();
        let mut rf = RandomForest::new_classifier(4).with_random_state(9);
        rf.fit(&x, &y).unwrap();
        let ensemble = rf.tree_ensemble().unwrap();
        assert_eq!(ensemble.trees.len(), 4);
        assert!((ensemble.trees[0].scale - 0.25).abs() < 1e-12);
        let proba = rf.predict_proba(&x).unwrap();
        let raw = ensemble.raw_output(x.row(0));
        assert!((raw[1] - proba[[0, 1]]).abs() < 1e-12);
    }
}
