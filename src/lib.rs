//! Meovis - model analysis and interpretability engine
//!
//! Given a serialized model and a tabular dataset, Meovis computes
//! predictions, task-appropriate metrics and SHAP-style feature
//! attributions, and aggregates them into one immutable result.
//!
//! # Modules
//!
//! ## Inputs
//! - [`model`] - Model artifacts, loading and capability detection
//! - [`dataset`] - CSV/JSON loading and feature/target preparation
//! - [`training`] - The estimator families artifacts can contain
//!
//! ## Analysis
//! - [`metrics`] - Classification and regression metrics
//! - [`explain`] - TreeSHAP and permutation-sampling attributions
//! - [`analysis`] - Stage-tracked analysis and result aggregation
//!
//! ## Infrastructure
//! - [`cache`] - Fingerprint-keyed artifact cache
//! - [`service`] - Concurrent async analysis service
//! - [`config`] - Engine configuration
//! - [`cli`] - Command-line interface

// Core error handling
pub mod error;
pub mod config;

// Inputs
pub mod training;
pub mod model;
pub mod dataset;

// Analysis
pub mod metrics;
pub mod explain;
pub mod analysis;

// Infrastructure
pub mod cache;
pub mod service;
pub mod cli;

pub use error::{MeovisError, Result};

/// Re-export commonly used types
pub mod prelude {
    // Error handling
    pub use crate::error::{MeovisError, Result};

    // Configuration
    pub use crate::config::{EngineConfig, ServiceConfig};

    // Models and data
    pub use crate::model::{ModelArtifact, ModelInfo, ModelLoader, ModelMetadata};
    pub use crate::dataset::{DatasetFrame, DatasetLoader, DatasetPreparer, FeatureMatrix, TargetVector};
    pub use crate::training::{ModelType, TaskType, TrainEngine, TrainingConfig};

    // Analysis
    pub use crate::metrics::{evaluate, MetricsResult};
    pub use crate::explain::{AttributionBudget, AttributionConfig, AttributionEngine, AttributionResult, CancelToken};
    pub use crate::analysis::{AnalysisRequest, AnalysisResult, AnalysisStage, Analyzer};

    // Service
    pub use crate::service::{AnalysisHandle, AnalysisService, JobStatus};
}
