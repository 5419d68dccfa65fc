//! Gradient Boosting implementation
//!
//! Gradient boosted regression trees with row and column subsampling.
//! The regressor boosts squared error; the classifier boosts the binary
//! log-loss on the log-odds scale.

use ndarray::{Array1, Array2, Axis};
use rand::prelude::*;
use rand_xoshiro::Xoshiro256PlusPlus;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::BTreeMap;

use super::config::TaskType;
use super::decision_tree::DecisionTree;
use super::models::{argmax, check_width, unique_classes, Model, ScaledTree, TreeEnsemble, TreeOutput};
use crate::error::{MeovisError, Result};

/// Gradient Boosting configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GradientBoostingConfig {
    /// Number of boosting rounds (trees)
    pub n_estimators: usize,
    /// Learning rate (shrinkage)
    pub learning_rate: f64,
    /// Maximum tree depth
    pub max_depth: usize,
    /// Minimum samples per leaf
    pub min_samples_leaf: usize,
    /// Subsample ratio for each tree
    pub subsample: f64,
    /// Column subsample ratio
    pub colsample_bytree: f64,
    /// Random seed
    pub random_state: Option<u64>,
}

impl Default for GradientBoostingConfig {
    fn default() -> Self {
        Self {
            n_estimators: 100,
            learning_rate: 0.1,
            max_depth: 3,
            min_samples_leaf: 1,
            subsample: 1.0,
            colsample_bytree: 1.0,
            random_state: Some(42),
        }
    }
}

impl GradientBoostingConfig {
    fn parameters(&self) -> BTreeMap<String, serde_json::Value> {
        let mut params = BTreeMap::new();
        params.insert("n_estimators".to_string(), json!(self.n_estimators));
        params.insert("learning_rate".to_string(), json!(self.learning_rate));
        params.insert("max_depth".to_string(), json!(self.max_depth));
        params.insert("min_samples_leaf".to_string(), json!(self.min_samples_leaf));
        params.insert("subsample".to_string(), json!(self.subsample));
        params.insert("colsample_bytree".to_string(), json!(self.colsample_bytree));
        params.insert("random_state".to_string(), json!(self.random_state));
        params
    }
}

/// Fitted stages shared by the regressor and the classifier
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct BoostedTrees {
    trees: Vec<DecisionTree>,
    col_indices_per_tree: Vec<Vec<usize>>,
    feature_importances: Vec<f64>,
    n_features: usize,
}

impl BoostedTrees {
    /// Fit `n_estimators` stages; `residual` maps the current raw scores to
    /// the negative gradient each stage fits.
    fn fit<F>(
        config: &GradientBoostingConfig,
        x: &Array2<f64>,
        init: f64,
        residual: F,
    ) -> Result<Self>
    where
        F: Fn(&Array1<f64>) -> Array1<f64>,
    {
        let n_samples = x.nrows();
        let n_features = x.ncols();
        if n_samples == 0 || n_features == 0 {
            return Err(MeovisError::Training(format!(
                "cannot boost on a {}x{} matrix",
                n_samples, n_features
            )));
        }

        let mut rng = match config.random_state {
            Some(seed) => Xoshiro256PlusPlus::seed_from_u64(seed),
            None => Xoshiro256PlusPlus::from_entropy(),
        };

        let mut raw = Array1::from_elem(n_samples, init);
        let mut boosted = BoostedTrees {
            feature_importances: vec![0.0; n_features],
            n_features,
            ..Default::default()
        };

        for _ in 0..config.n_estimators {
            let target = residual(&raw);

            let rows = sample_indices(n_samples, config.subsample, &mut rng);
            let cols = sample_indices(n_features, config.colsample_bytree, &mut rng);
            let x_sub = x.select(Axis(0), &rows).select(Axis(1), &cols);
            let y_sub = target.select(Axis(0), &rows);

            let mut tree = DecisionTree::new_regressor()
                .with_max_depth(config.max_depth)
                .with_min_samples_leaf(config.min_samples_leaf);
            tree.fit(&x_sub, &y_sub)?;

            // Every row advances, not only the subsampled ones
            let step = tree.predict_value(&x.select(Axis(1), &cols))?;
            raw.scaled_add(config.learning_rate, &step);

            if let Some(imp) = Model::feature_importances(&tree) {
                for (local, &global) in cols.iter().enumerate() {
                    boosted.feature_importances[global] += imp[local];
                }
            }

            boosted.trees.push(tree);
            boosted.col_indices_per_tree.push(cols);
        }

        let total: f64 = boosted.feature_importances.iter().sum();
        if total > 0.0 {
            for imp in &mut boosted.feature_importances {
                *imp /= total;
            }
        }

        Ok(boosted)
    }

    fn raw_predict(&self, x: &Array2<f64>, init: f64, learning_rate: f64) -> Result<Array1<f64>> {
        if self.trees.is_empty() {
            return Err(MeovisError::ModelNotFitted);
        }
        check_width(self.n_features, x)?;
        let mut raw = Array1::from_elem(x.nrows(), init);
        for (tree, cols) in self.trees.iter().zip(self.col_indices_per_tree.iter()) {
            let step = tree.predict_value(&x.select(Axis(1), cols))?;
            raw.scaled_add(learning_rate, &step);
        }
        Ok(raw)
    }

    fn ensemble(&self, init: f64, learning_rate: f64, output: TreeOutput) -> Option<TreeEnsemble<'_>> {
        if self.trees.is_empty() {
            return None;
        }
        let trees = self
            .trees
            .iter()
            .zip(self.col_indices_per_tree.iter())
            .map(|(tree, cols)| {
                tree.root().map(|root| ScaledTree {
                    root,
                    scale: learning_rate,
                    feature_map: Some(cols.as_slice()),
                })
            })
            .collect::<Option<Vec<_>>>()?;
        Some(TreeEnsemble {
            trees,
            base_value: vec![init],
            n_outputs: 1,
            output,
        })
    }
}

fn sample_indices(n: usize, ratio: f64, rng: &mut Xoshiro256PlusPlus) -> Vec<usize> {
    let size = ((n as f64) * ratio).ceil().clamp(1.0, n as f64) as usize;
    let mut indices: Vec<usize> = (0..n).collect();
    if size < n {
        indices.shuffle(rng);
        indices.truncate(size);
        indices.sort_unstable();
    }
    indices
}

fn sigmoid(z: f64) -> f64 {
    1.0 / (1.0 + (-z).exp())
}

/// Gradient Boosting Regressor
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GradientBoostingRegressor {
    config: GradientBoostingConfig,
    stages: BoostedTrees,
    initial_prediction: f64,
}

impl GradientBoostingRegressor {
    pub fn new(config: GradientBoostingConfig) -> Self {
        Self {
            config,
            stages: BoostedTrees::default(),
            initial_prediction: 0.0,
        }
    }

    /// Fit the gradient boosting model
    pub fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        if x.nrows() != y.len() {
            return Err(MeovisError::Shape {
                expected: format!("y length = {}", x.nrows()),
                actual: format!("y length = {}", y.len()),
            });
        }
        self.initial_prediction = y.mean().unwrap_or(0.0);
        self.stages = BoostedTrees::fit(&self.config, x, self.initial_prediction, |raw| y - raw)?;
        Ok(())
    }
}

impl Model for GradientBoostingRegressor {
    fn algorithm_name(&self) -> &'static str {
        "GradientBoostingRegressor"
    }

    fn task_type(&self) -> TaskType {
        TaskType::Regression
    }

    fn n_features(&self) -> usize {
        self.stages.n_features
    }

    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        self.stages
            .raw_predict(x, self.initial_prediction, self.config.learning_rate)
    }

    fn feature_importances(&self) -> Option<Array1<f64>> {
        (!self.stages.trees.is_empty()).then(|| Array1::from_vec(self.stages.feature_importances.clone()))
    }

    fn tree_ensemble(&self) -> Option<TreeEnsemble<'_>> {
        self.stages
            .ensemble(self.initial_prediction, self.config.learning_rate, TreeOutput::Value)
    }

    fn parameters(&self) -> BTreeMap<String, serde_json::Value> {
        self.config.parameters()
    }
}

/// Binary Gradient Boosting Classifier
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GradientBoostingClassifier {
    config: GradientBoostingConfig,
    stages: BoostedTrees,
    initial_log_odds: f64,
    classes: Vec<f64>,
}

impl GradientBoostingClassifier {
    pub fn new(config: GradientBoostingConfig) -> Self {
        Self {
            config,
            stages: BoostedTrees::default(),
            initial_log_odds: 0.0,
            classes: Vec::new(),
        }
    }

    /// Fit binary classification; the larger label is the positive class
    pub fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        if x.nrows() != y.len() {
            return Err(MeovisError::Shape {
                expected: format!("y length = {}", x.nrows()),
                actual: format!("y length = {}", y.len()),
            });
        }
        let classes = unique_classes(y)?;
        if classes.len() != 2 {
            return Err(MeovisError::Training(format!(
                "GradientBoostingClassifier supports binary targets only, got {} classes",
                classes.len()
            )));
        }
        let positive = classes[1];
        let y01: Array1<f64> = y.mapv(|v| if v == positive { 1.0 } else { 0.0 });

        let p = y01.mean().unwrap_or(0.5).clamp(1e-10, 1.0 - 1e-10);
        self.initial_log_odds = (p / (1.0 - p)).ln();
        self.classes = classes;
        self.stages = BoostedTrees::fit(&self.config, x, self.initial_log_odds, |raw| {
            &y01 - &raw.mapv(sigmoid)
        })?;
        Ok(())
    }

    /// Raw log-odds margin for the positive class
    pub fn decision_function(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        self.stages
            .raw_predict(x, self.initial_log_odds, self.config.learning_rate)
    }
}

impl Model for GradientBoostingClassifier {
    fn algorithm_name(&self) -> &'static str {
        "GradientBoostingClassifier"
    }

    fn task_type(&self) -> TaskType {
        TaskType::Classification
    }

    fn n_features(&self) -> usize {
        self.stages.n_features
    }

    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        let proba = self.predict_proba(x)?;
        Ok(proba
            .outer_iter()
            .map(|row| self.classes[argmax(row)])
            .collect())
    }

    fn supports_proba(&self) -> bool {
        true
    }

    fn predict_proba(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        let margin = self.decision_function(x)?;
        let mut proba = Array2::<f64>::zeros((x.nrows(), 2));
        for (i, m) in margin.iter().enumerate() {
            let p = sigmoid(*m);
            proba[[i, 0]] = 1.0 - p;
            proba[[i, 1]] = p;
        }
        Ok(proba)
    }

    fn classes(&self) -> Option<&[f64]> {
        Some(&self.classes)
    }

    fn feature_importances(&self) -> Option<Array1<f64>> {
        (!self.stages.trees.is_empty()).then(|| Array1::from_vec(self.stages.feature_importances.clone()))
    }

    fn tree_ensemble(&self) -> Option<TreeEnsemble<'_>> {
        self.stages
            .ensemble(self.initial_log_odds, self.config.learning_rate, TreeOutput::LogOdds)
    }

    fn parameters(&self) -> BTreeMap<String, serde_json::Value> {
        self.config.parameters()
    }
}
