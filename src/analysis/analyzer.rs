//! Synchronous analysis pipeline

use super::result::{AnalysisParts, AnalysisResult};
use super::stage::AnalysisStage;
use crate::dataset::{DatasetFrame, DatasetPreparer, FeatureMatrix, TargetVector};
use crate::error::{MeovisError, Result};
use crate::explain::{AttributionBudget, AttributionConfig, AttributionEngine};
use crate::metrics::{self, MetricsResult};
use crate::model::{ModelArtifact, ModelLoader};
use crate::training::TaskType;
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Instant;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// What to analyze
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisRequest {
    pub model_path: PathBuf,
    pub dataset_path: PathBuf,
    /// Target column; the last column when absent
    #[serde(default)]
    pub target_column: Option<String>,
    /// Defaults to the model's own task
    #[serde(default)]
    pub task_type: Option<TaskType>,
}

impl AnalysisRequest {
    pub fn new(model_path: impl Into<PathBuf>, dataset_path: impl Into<PathBuf>) -> Self {
        Self {
            model_path: model_path.into(),
            dataset_path: dataset_path.into(),
            target_column: None,
            task_type: None,
        }
    }

    pub fn with_target_column(mut self, target: impl Into<String>) -> Self {
        self.target_column = Some(target.into());
        self
    }

    pub fn with_task_type(mut self, task: TaskType) -> Self {
        self.task_type = Some(task);
        self
    }
}

/// Output of a standalone prediction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionOutput {
    pub predictions: Vec<f64>,
    /// Row-major class probabilities for probabilistic models
    pub probabilities: Option<Vec<Vec<f64>>>,
    /// Column labels of `probabilities`
    pub classes: Option<Vec<String>>,
}

/// Stage bookkeeping for one run
struct Run {
    id: Uuid,
    stage: AnalysisStage,
}

impl Run {
    fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            stage: AnalysisStage::Requested,
        }
    }

    fn advance(&mut self, next: AnalysisStage) -> Result<()> {
        self.stage.advance(next)?;
        debug!(run = %self.id, stage = %self.stage, "Analysis stage");
        Ok(())
    }

    /// Record a fatal error and hand it back
    fn fail(&mut self, err: MeovisError) -> MeovisError {
        let failed = AnalysisStage::Failed {
            reason: err.to_string(),
        };
        if self.stage.can_transition_to(&failed) {
            error!(run = %self.id, from = %self.stage, error = %err, "Analysis failed");
            self.stage = failed;
        }
        err
    }
}

/// Runs predictions, metrics and attribution for a model/dataset pair
#[derive(Debug, Clone, Default)]
pub struct Analyzer {
    preparer: DatasetPreparer,
    attribution: AttributionEngine,
}

impl Analyzer {
    pub fn new(config: AttributionConfig) -> Self {
        Self {
            preparer: DatasetPreparer::default(),
            attribution: AttributionEngine::new(config),
        }
    }

    pub fn with_preparer(mut self, preparer: DatasetPreparer) -> Self {
        self.preparer = preparer;
        self
    }

    pub fn attribution_config(&self) -> &AttributionConfig {
        self.attribution.config()
    }

    pub fn preparer(&self) -> &DatasetPreparer {
        &self.preparer
    }

    /// Load both artifacts and analyze them without a time limit
    pub fn analyze(&self, request: &AnalysisRequest) -> Result<AnalysisResult> {
        self.analyze_with_budget(request, &AttributionBudget::unbounded())
    }

    /// Load both artifacts and analyze them; `budget` bounds attribution only
    /// and its timeout counts from the start of the attribution stage
    pub fn analyze_with_budget(
        &self,
        request: &AnalysisRequest,
        budget: &AttributionBudget,
    ) -> Result<AnalysisResult> {
        let mut run = Run::new();

        let artifact = ModelLoader::load(&request.model_path).map_err(|e| run.fail(e))?;
        run.advance(AnalysisStage::ModelLoaded)?;

        let frame = self
            .preparer
            .loader()
            .load(&request.dataset_path)
            .map_err(|e| run.fail(e))?;

        self.run(&mut run, &artifact, &frame, request, budget)
    }

    /// Analyze an already loaded model and dataset
    pub fn analyze_loaded(
        &self,
        artifact: &ModelArtifact,
        frame: &DatasetFrame,
        request: &AnalysisRequest,
        budget: &AttributionBudget,
    ) -> Result<AnalysisResult> {
        let mut run = Run::new();
        run.advance(AnalysisStage::ModelLoaded)?;
        self.run(&mut run, artifact, frame, request, budget)
    }

    fn run(
        &self,
        run: &mut Run,
        artifact: &ModelArtifact,
        frame: &DatasetFrame,
        request: &AnalysisRequest,
        budget: &AttributionBudget,
    ) -> Result<AnalysisResult> {
        let start = Instant::now();

        let (features, target) = self
            .prepare(artifact, frame, request.target_column.as_deref())
            .map_err(|e| run.fail(e))?;
        run.advance(AnalysisStage::DatasetPrepared)?;

        let output = self.predict(artifact, &features.values).map_err(|e| run.fail(e))?;
        run.advance(AnalysisStage::PredictionsComputed)?;

        let task = request
            .task_type
            .unwrap_or_else(|| artifact.model().task_type());
        let label_names = target
            .class_names
            .clone()
            .or_else(|| artifact.metadata().class_names.clone());
        let y_true = target.values.to_vec();
        let metrics = metrics::evaluate_with_labels(&y_true, &output.predictions, task, label_names.as_deref())
            .map_err(|e| run.fail(e))?;
        run.advance(AnalysisStage::MetricsComputed)?;

        let attribution = self
            .attribution
            .attribute_with_budget(artifact, &features, &budget.restarted());
        if attribution.degraded {
            warn!(
                run = %run.id,
                detail = attribution.error_detail.as_deref().unwrap_or(""),
                "Continuing with degraded attribution"
            );
        }
        run.advance(AnalysisStage::AttributionComputed {
            degraded: attribution.degraded,
        })?;

        let mut dataset_info = frame.info();
        dataset_info.target_column = Some(target.name.clone());

        let result = AnalysisResult::aggregate(AnalysisParts {
            model_ref: reference(artifact.source().map(|p| p.display().to_string()), &artifact.metadata().name),
            dataset_ref: request.dataset_path.display().to_string(),
            task_type: task,
            predictions: output.predictions,
            probabilities: output.probabilities,
            metrics,
            attribution,
            model_info: artifact.info(),
            dataset_info,
        });
        run.advance(AnalysisStage::Aggregated)?;

        let (metric, value) = result.metrics().primary_metric();
        info!(
            run = %run.id,
            result = %result.id(),
            rows = features.nrows(),
            features = features.ncols(),
            metric,
            value,
            degraded = result.attribution().degraded,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Analysis complete"
        );
        Ok(result)
    }

    /// Split `frame` using the category orders stored with the model
    pub fn prepare(
        &self,
        artifact: &ModelArtifact,
        frame: &DatasetFrame,
        target_column: Option<&str>,
    ) -> Result<(FeatureMatrix, TargetVector)> {
        let metadata = artifact.metadata();
        let (features, target) = DatasetPreparer::split_with_vocabulary(
            frame,
            target_column,
            &metadata.encodings,
            metadata.class_names.as_deref(),
        )?;
        self.check_feature_names(artifact, &features);
        Ok((features, target))
    }

    /// Score features; probabilities are included when the model provides them.
    ///
    /// Non-finite outputs (e.g. from missing cells fed to a linear model) are
    /// a [`MeovisError::Prediction`] naming the affected rows.
    pub fn predict(&self, artifact: &ModelArtifact, features: &Array2<f64>) -> Result<PredictionOutput> {
        let model = artifact.model();
        let as_prediction_error = |e: MeovisError| match e {
            MeovisError::Prediction(msg) => MeovisError::Prediction(msg),
            other => MeovisError::Prediction(other.to_string()),
        };

        let predictions = model.predict(features).map_err(as_prediction_error)?;
        check_finite("predictions", predictions.iter().map(|p| p.is_finite()))?;
        let probabilities = if artifact.capability().supports_probability {
            let proba = model.predict_proba(features).map_err(as_prediction_error)?;
            check_finite(
                "probabilities",
                proba.rows().into_iter().map(|r| r.iter().all(|p| p.is_finite())),
            )?;
            Some(proba.rows().into_iter().map(|r| r.to_vec()).collect())
        } else {
            None
        };

        Ok(PredictionOutput {
            predictions: predictions.to_vec(),
            classes: probabilities.as_ref().and_then(|_| artifact.class_labels()),
            probabilities,
        })
    }

    /// Standalone metrics
    pub fn evaluate(&self, y_true: &[f64], y_pred: &[f64], task_type: TaskType) -> Result<MetricsResult> {
        metrics::evaluate(y_true, y_pred, task_type)
    }

    fn check_feature_names(&self, artifact: &ModelArtifact, features: &FeatureMatrix) {
        let expected = &artifact.metadata().feature_names;
        if !expected.is_empty() && expected != &features.feature_names {
            warn!(
                model_features = ?expected,
                dataset_features = ?features.feature_names,
                "Dataset columns differ from the model's feature names"
            );
        }
    }
}

/// Rows shown in a non-finite output error
const MAX_REPORTED_ROWS: usize = 10;

fn check_finite(what: &str, rows: impl Iterator<Item = bool>) -> Result<()> {
    let bad: Vec<usize> = rows
        .enumerate()
        .filter(|(_, finite)| !finite)
        .map(|(i, _)| i)
        .collect();
    if bad.is_empty() {
        return Ok(());
    }
    let shown = &bad[..bad.len().min(MAX_REPORTED_ROWS)];
    let more = if bad.len() > shown.len() {
        format!(" and {} more", bad.len() - shown.len())
    } else {
        String::new()
    };
    Err(MeovisError::Prediction(format!(
        "non-finite {} for rows {:?}{}",
        what, shown, more
    )))
}

fn reference(source: Option<String>, name: &str) -> String {
    source.unwrap_or_else(|| name.to_string())
}
