//! Model training module
//!
//! Provides the estimator families an analysis can load:
//! - Decision trees and Random Forests
//! - Gradient boosting (regression, binary classification)
//! - Linear and logistic regression
//! - Gaussian Naive Bayes

mod config;
mod engine;
mod models;
pub mod decision_tree;
pub mod gradient_boosting;
pub mod linear_models;
pub mod naive_bayes;
pub mod random_forest;

pub use config::{ModelType, TaskType, TrainingConfig};
pub use decision_tree::{Criterion, DecisionTree, TreeNode};
pub use engine::TrainEngine;
pub use gradient_boosting::{GradientBoostingClassifier, GradientBoostingConfig, GradientBoostingRegressor};
pub use linear_models::{LinearRegression, LogisticRegression};
pub use models::{Model, ScaledTree, TrainedModel, TreeEnsemble, TreeOutput};
pub use naive_bayes::GaussianNaiveBayes;
pub use random_forest::{MaxFeatures, RandomForest};
