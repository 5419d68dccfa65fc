//! Training engine: fits one of the supported estimator families

use super::config::{ModelType, TaskType, TrainingConfig};
use super::decision_tree::DecisionTree;
use super::gradient_boosting::{GradientBoostingClassifier, GradientBoostingConfig, GradientBoostingRegressor};
use super::linear_models::{LinearRegression, LogisticRegression};
use super::models::TrainedModel;
use super::naive_bayes::GaussianNaiveBayes;
use super::random_forest::RandomForest;
use crate::error::{MeovisError, Result};
use ndarray::{Array1, Array2};
use std::time::Instant;
use tracing::info;

/// Main training engine
#[derive(Debug, Clone)]
pub struct TrainEngine {
    config: TrainingConfig,
}

impl TrainEngine {
    /// Create a new training engine
    pub fn new(config: TrainingConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &TrainingConfig {
        &self.config
    }

    /// Fit the configured estimator
    pub fn fit(&self, x: &Array2<f64>, y: &Array1<f64>) -> Result<TrainedModel> {
        let cfg = &self.config;
        self.validate(x, y)?;

        let start = Instant::now();
        let model = match (cfg.model_type, cfg.task_type) {
            (ModelType::DecisionTree, task) => {
                let mut tree = match task {
                    TaskType::Classification => DecisionTree::new_classifier(),
                    TaskType::Regression => DecisionTree::new_regressor(),
                }
                .with_min_samples_leaf(cfg.min_samples_leaf)
                .with_random_state(cfg.random_state);
                if let Some(d) = cfg.max_depth {
                    tree = tree.with_max_depth(d);
                }
                tree.fit(x, y)?;
                TrainedModel::DecisionTree(tree)
            }
            (ModelType::RandomForest, task) => {
                let mut forest = match task {
                    TaskType::Classification => RandomForest::new_classifier(cfg.n_estimators),
                    TaskType::Regression => RandomForest::new_regressor(cfg.n_estimators),
                }
                .with_min_samples_leaf(cfg.min_samples_leaf)
                .with_random_state(cfg.random_state);
                if let Some(d) = cfg.max_depth {
                    forest = forest.with_max_depth(d);
                }
                forest.fit(x, y)?;
                TrainedModel::RandomForest(forest)
            }
            (ModelType::GradientBoosting, task) => {
                let gb_config = GradientBoostingConfig {
                    n_estimators: cfg.n_estimators,
                    learning_rate: cfg.learning_rate,
                    max_depth: cfg.max_depth.unwrap_or(3),
                    min_samples_leaf: cfg.min_samples_leaf,
                    random_state: Some(cfg.random_state),
                    ..Default::default()
                };
                match task {
                    TaskType::Classification => {
                        let mut gb = GradientBoostingClassifier::new(gb_config);
                        gb.fit(x, y)?;
                        TrainedModel::GradientBoostingClassifier(gb)
                    }
                    TaskType::Regression => {
                        let mut gb = GradientBoostingRegressor::new(gb_config);
                        gb.fit(x, y)?;
                        TrainedModel::GradientBoostingRegressor(gb)
                    }
                }
            }
            (ModelType::LinearRegression, TaskType::Regression) => {
                let mut lr = LinearRegression::new();
                lr.fit(x, y)?;
                TrainedModel::LinearRegression(lr)
            }
            (ModelType::LogisticRegression, TaskType::Classification) => {
                let mut lr = LogisticRegression::new().with_learning_rate(cfg.learning_rate);
                lr.fit(x, y)?;
                TrainedModel::LogisticRegression(lr)
            }
            (ModelType::NaiveBayes, TaskType::Classification) => {
                let mut nb = GaussianNaiveBayes::new();
                nb.fit(x, y)?;
                TrainedModel::GaussianNaiveBayes(nb)
            }
            (model_type, task) => {
                return Err(MeovisError::Training(format!(
                    "{:?} cannot be trained for {}",
                    model_type, task
                )));
            }
        };

        info!(
            algorithm = model.as_model().algorithm_name(),
            rows = x.nrows(),
            features = x.ncols(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Model trained"
        );
        Ok(model)
    }

    fn validate(&self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        if x.nrows() != y.len() {
            return Err(MeovisError::Shape {
                expected: format!("y length = {}", x.nrows()),
                actual: format!("y length = {}", y.len()),
            });
        }
        let tree_based = matches!(
            self.config.model_type,
            ModelType::DecisionTree | ModelType::RandomForest | ModelType::GradientBoosting
        );
        // Trees route missing values to the right branch; other families cannot
        if !tree_based && x.iter().any(|v| v.is_nan()) {
            return Err(MeovisError::Training(format!(
                "{:?} cannot be trained on missing feature values",
                self.config.model_type
            )));
        }
        Ok(())
    }
}
