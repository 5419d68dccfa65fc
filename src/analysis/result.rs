//! Immutable analysis result

use crate::dataset::DatasetInfo;
use crate::explain::AttributionResult;
use crate::metrics::MetricsResult;
use crate::model::ModelInfo;
use crate::training::TaskType;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Everything an analysis produced, handed to [`AnalysisResult::aggregate`]
#[derive(Debug, Clone)]
pub struct AnalysisParts {
    pub model_ref: String,
    pub dataset_ref: String,
    pub task_type: TaskType,
    pub predictions: Vec<f64>,
    pub probabilities: Option<Vec<Vec<f64>>>,
    pub metrics: MetricsResult,
    pub attribution: AttributionResult,
    pub model_info: ModelInfo,
    pub dataset_info: DatasetInfo,
}

/// Write-once aggregate of one analysis
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisResult {
    id: Uuid,
    created_at: DateTime<Utc>,
    model_ref: String,
    dataset_ref: String,
    task_type: TaskType,
    predictions: Vec<f64>,
    probabilities: Option<Vec<Vec<f64>>>,
    metrics: MetricsResult,
    attribution: AttributionResult,
    model_info: ModelInfo,
    dataset_info: DatasetInfo,
}

impl AnalysisResult {
    /// Assemble the result; stamps a fresh id and the creation time
    pub fn aggregate(parts: AnalysisParts) -> Self {
        Self {
            id: Uuid::new_v4(),
            created_at: Utc::now(),
            model_ref: parts.model_ref,
            dataset_ref: parts.dataset_ref,
            task_type: parts.task_type,
            predictions: parts.predictions,
            probabilities: parts.probabilities,
            metrics: parts.metrics,
            attribution: parts.attribution,
            model_info: parts.model_info,
            dataset_info: parts.dataset_info,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn model_ref(&self) -> &str {
        &self.model_ref
    }

    pub fn dataset_ref(&self) -> &str {
        &self.dataset_ref
    }

    pub fn task_type(&self) -> TaskType {
        self.task_type
    }

    pub fn predictions(&self) -> &[f64] {
        &self.predictions
    }

    pub fn probabilities(&self) -> Option<&[Vec<f64>]> {
        self.probabilities.as_deref()
    }

    pub fn metrics(&self) -> &MetricsResult {
        &self.metrics
    }

    pub fn attribution(&self) -> &AttributionResult {
        &self.attribution
    }

    pub fn model_info(&self) -> &ModelInfo {
        &self.model_info
    }

    pub fn dataset_info(&self) -> &DatasetInfo {
        &self.dataset_info
    }

    pub fn to_json(&self) -> crate::error::Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}
