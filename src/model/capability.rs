//! Capability descriptor derived once when a model is loaded

use crate::training::Model;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Which attribution strategy a model admits
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    /// Tree structure is available for exact attribution
    TreeCapable,
    /// No tree structure, but class probabilities are available
    ProbabilisticOnly,
    /// Point predictions only
    PointPredictionOnly,
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Capability::TreeCapable => "tree_capable",
            Capability::ProbabilisticOnly => "probabilistic_only",
            Capability::PointPredictionOnly => "point_prediction_only",
        };
        f.write_str(name)
    }
}

/// What a loaded model can do, computed by probing it once
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CapabilityDescriptor {
    pub capability: Capability,
    pub supports_probability: bool,
    pub supports_feature_importance: bool,
    pub algorithm_name: String,
    pub parameters: BTreeMap<String, serde_json::Value>,
}

impl CapabilityDescriptor {
    /// Probe a fitted model. Only read-only trait methods are called.
    pub fn probe(model: &dyn Model) -> Self {
        let supports_probability = model.supports_proba();
        let supports_feature_importance = model.feature_importances().is_some();
        let capability = if model.tree_ensemble().is_some() {
            Capability::TreeCapable
        } else if supports_probability {
            Capability::ProbabilisticOnly
        } else {
            Capability::PointPredictionOnly
        };

        Self {
            capability,
            supports_probability,
            supports_feature_importance,
            algorithm_name: model.algorithm_name().to_string(),
            parameters: model.parameters(),
        }
    }
}
