//! Task and training configuration

use crate::error::MeovisError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Type of ML task an analysis is evaluated as
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskType {
    /// Discrete labels (binary or multi-class)
    Classification,
    /// Continuous targets
    Regression,
}

impl TaskType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskType::Classification => "classification",
            TaskType::Regression => "regression",
        }
    }
}

impl fmt::Display for TaskType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskType {
    type Err = MeovisError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "classification" => Ok(TaskType::Classification),
            "regression" => Ok(TaskType::Regression),
            _ => Err(MeovisError::UnsupportedTaskType(s.to_string())),
        }
    }
}

/// Estimator family to train
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelType {
    DecisionTree,
    RandomForest,
    GradientBoosting,
    LinearRegression,
    LogisticRegression,
    NaiveBayes,
}

impl FromStr for ModelType {
    type Err = MeovisError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "decision_tree" | "tree" => Ok(ModelType::DecisionTree),
            "random_forest" | "forest" => Ok(ModelType::RandomForest),
            "gradient_boosting" | "gbm" => Ok(ModelType::GradientBoosting),
            "linear" | "linear_regression" => Ok(ModelType::LinearRegression),
            "logistic" | "logistic_regression" => Ok(ModelType::LogisticRegression),
            "naive_bayes" | "gaussian_nb" => Ok(ModelType::NaiveBayes),
            other => Err(MeovisError::InvalidInput(format!("Unknown model type: {}", other))),
        }
    }
}

/// Configuration for fitting one of the supported estimators
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingConfig {
    /// Type of ML task
    pub task_type: TaskType,
    /// Estimator family
    pub model_type: ModelType,
    /// Maximum depth of trees
    pub max_depth: Option<usize>,
    /// Minimum samples per leaf
    pub min_samples_leaf: usize,
    /// Number of trees (ensembles)
    pub n_estimators: usize,
    /// Learning rate (boosting, logistic regression)
    pub learning_rate: f64,
    /// Random seed for reproducibility
    pub random_state: u64,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            task_type: TaskType::Classification,
            model_type: ModelType::RandomForest,
            max_depth: None,
            min_samples_leaf: 1,
            n_estimators: 100,
            learning_rate: 0.1,
            random_state: 42,
        }
    }
}

impl TrainingConfig {
    pub fn new(task_type: TaskType, model_type: ModelType) -> Self {
        Self {
            task_type,
            model_type,
            ..Default::default()
        }
    }

    pub fn with_max_depth(mut self, depth: usize) -> Self {
        self.max_depth = Some(depth);
        self
    }

    pub fn with_n_estimators(mut self, n: usize) -> Self {
        self.n_estimators = n.max(1);
        self
    }

    pub fn with_learning_rate(mut self, lr: f64) -> Self {
        self.learning_rate = lr;
        self
    }

    pub fn with_random_state(mut self, seed: u64) -> Self {
        self.random_state = seed;
        self
    }
}
