//! Attribution engine
//!
//! Per-feature SHAP-style attributions under sampling and width budgets:
//! - rows above `sample_size_cap` are sampled with a seeded ChaCha8 RNG
//! - only the first `feature_count_cap` columns are explained
//! - tree models get exact TreeSHAP, everything else permutation sampling
//!   against a seeded background batch
//!
//! Failures never propagate: they produce a degraded [`AttributionResult`].

mod budget;
mod config;
mod engine;
mod permutation;
mod result;
mod sampling;
mod tree_shap;

pub use budget::{AttributionBudget, CancelToken};
pub use config::AttributionConfig;
pub use engine::AttributionEngine;
pub use result::{AttributionResult, AttributionStrategy, AttributionValues, ExpectedValue, FeatureImportance};
pub use sampling::{cap_features, sample_rows, BACKGROUND_STREAM, ROW_STREAM};

use thiserror::Error;

/// Failures inside an attribution run; converted to a degraded result
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AttributionError {
    #[error("invalid attribution config: {0}")]
    InvalidConfig(String),

    #[error("nothing to explain: {0}")]
    EmptyInput(String),

    #[error("model evaluation failed: {0}")]
    Model(String),

    #[error("unsupported model internals: {0}")]
    Unsupported(String),

    #[error("non-finite attribution: {0}")]
    NonFinite(String),

    #[error("attribution timed out")]
    Timeout,

    #[error("attribution cancelled")]
    Cancelled,
}
