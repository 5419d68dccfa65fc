//! Loaded model artifacts

use super::capability::{Capability, CapabilityDescriptor};
use crate::training::{Model, TaskType, TrainedModel};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Metadata stored next to the estimator in an artifact file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelMetadata {
    /// Model name
    pub name: String,
    /// Training timestamp (RFC 3339)
    pub trained_at: String,
    /// Feature names in column order
    pub feature_names: Vec<String>,
    /// Target column the model was trained on
    pub target_name: Option<String>,
    /// Original labels of an ordinal-encoded target
    pub class_names: Option<Vec<String>>,
    /// Category order of each ordinal-encoded feature at training time
    #[serde(default)]
    pub encodings: BTreeMap<String, Vec<String>>,
}

impl Default for ModelMetadata {
    fn default() -> Self {
        Self {
            name: "model".to_string(),
            trained_at: chrono::Utc::now().to_rfc3339(),
            feature_names: Vec::new(),
            target_name: None,
            class_names: None,
            encodings: BTreeMap::new(),
        }
    }
}

impl ModelMetadata {
    /// Create new metadata with name
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Set feature names
    pub fn with_features(mut self, features: Vec<String>) -> Self {
        self.feature_names = features;
        self
    }

    /// Set target name
    pub fn with_target(mut self, target: impl Into<String>) -> Self {
        self.target_name = Some(target.into());
        self
    }

    /// Set class names of a categorical target
    pub fn with_class_names(mut self, class_names: Option<Vec<String>>) -> Self {
        self.class_names = class_names;
        self
    }

    /// Set the category orders of encoded feature columns
    pub fn with_encodings(mut self, encodings: BTreeMap<String, Vec<String>>) -> Self {
        self.encodings = encodings;
        self
    }
}

/// Introspection summary of a loaded model
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelInfo {
    pub name: String,
    pub algorithm: String,
    pub task_type: TaskType,
    pub capability: Capability,
    pub supports_probability: bool,
    pub supports_feature_importance: bool,
    pub n_features: usize,
    pub feature_names: Vec<String>,
    pub classes: Option<Vec<String>>,
    pub parameters: BTreeMap<String, serde_json::Value>,
    /// Impurity importances keyed by feature name
    pub feature_importances: Option<BTreeMap<String, f64>>,
    pub trained_at: String,
}

/// An immutable, deserialized estimator with its capability descriptor.
///
/// Shared read-only (`Arc<ModelArtifact>`) between concurrent analyses.
#[derive(Debug, Clone)]
pub struct ModelArtifact {
    model: TrainedModel,
    metadata: ModelMetadata,
    capability: CapabilityDescriptor,
    source: Option<PathBuf>,
}

impl ModelArtifact {
    /// Wrap a fitted model; the capability descriptor is derived here once
    pub fn new(model: TrainedModel, metadata: ModelMetadata) -> Self {
        let capability = CapabilityDescriptor::probe(model.as_model());
        Self {
            model,
            metadata,
            capability,
            source: None,
        }
    }

    pub(crate) fn with_source(mut self, path: &Path) -> Self {
        self.source = Some(path.to_path_buf());
        self
    }

    /// The estimator behind the artifact
    pub fn model(&self) -> &dyn Model {
        self.model.as_model()
    }

    pub fn trained_model(&self) -> &TrainedModel {
        &self.model
    }

    pub fn metadata(&self) -> &ModelMetadata {
        &self.metadata
    }

    pub fn capability(&self) -> &CapabilityDescriptor {
        &self.capability
    }

    /// File the artifact was loaded from, if any
    pub fn source(&self) -> Option<&Path> {
        self.source.as_deref()
    }

    /// Feature names, falling back to `feature_{i}` when none were stored
    pub fn feature_names(&self) -> Vec<String> {
        if self.metadata.feature_names.len() == self.model().n_features() {
            self.metadata.feature_names.clone()
        } else {
            (0..self.model().n_features())
                .map(|i| format!("feature_{}", i))
                .collect()
        }
    }

    /// Display labels for the model's classes
    pub fn class_labels(&self) -> Option<Vec<String>> {
        let classes = self.model().classes()?;
        Some(
            classes
                .iter()
                .map(|&c| {
                    self.metadata
                        .class_names
                        .as_ref()
                        .filter(|_| c >= 0.0 && c.fract() == 0.0)
                        .and_then(|names| names.get(c as usize).cloned())
                        .unwrap_or_else(|| format_label(c))
                })
                .collect(),
        )
    }

    pub fn info(&self) -> ModelInfo {
        let model = self.model();
        let feature_names = self.feature_names();
        let feature_importances = model.feature_importances().map(|imp| {
            feature_names
                .iter()
                .cloned()
                .zip(imp.iter().copied())
                .collect::<BTreeMap<_, _>>()
        });

        ModelInfo {
            name: self.metadata.name.clone(),
            algorithm: self.capability.algorithm_name.clone(),
            task_type: model.task_type(),
            capability: self.capability.capability,
            supports_probability: self.capability.supports_probability,
            supports_feature_importance: self.capability.supports_feature_importance,
            n_features: model.n_features(),
            feature_names,
            classes: self.class_labels(),
            parameters: self.capability.parameters.clone(),
            feature_importances,
            trained_at: self.metadata.trained_at.clone(),
        }
    }
}

/// Integral labels print without a fractional part
pub(crate) fn format_label(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        format!("{}", value)
    }
}
