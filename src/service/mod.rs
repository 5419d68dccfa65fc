//! Async analysis service
//!
//! Analyses are CPU-bound and run on tokio's blocking pool, bounded by a
//! semaphore. Loaded models and datasets are shared through fingerprint
//! caches. Each submitted analysis is tracked as a job and can be
//! cancelled; cancellation and the attribution timeout only degrade the
//! attribution step.

use crate::analysis::{AnalysisRequest, AnalysisResult, Analyzer};
use crate::cache::{ArtifactCache, CacheStats};
use crate::config::EngineConfig;
use crate::dataset::{DatasetFrame, DatasetLoader};
use crate::error::{MeovisError, Result};
use crate::explain::{AttributionBudget, CancelToken};
use crate::metrics::{self, MetricsResult};
use crate::model::{ModelArtifact, ModelLoader};
use crate::training::TaskType;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::{RwLock, Semaphore};
use tokio::task::JoinHandle;
use tracing::{error, info};
use uuid::Uuid;

/// Analysis job status
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Running,
    Completed { result_id: Uuid, degraded: bool },
    Failed { error: String },
}

/// Analysis job information
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisJob {
    pub id: Uuid,
    pub status: JobStatus,
    pub request: AnalysisRequest,
    pub created_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

struct ServiceState {
    config: EngineConfig,
    analyzer: Analyzer,
    loader: DatasetLoader,
    permits: Arc<Semaphore>,
    models: ArtifactCache<ModelArtifact>,
    datasets: ArtifactCache<DatasetFrame>,
    jobs: RwLock<HashMap<Uuid, AnalysisJob>>,
}

impl ServiceState {
    async fn set_status(&self, id: Uuid, status: JobStatus) {
        let mut jobs = self.jobs.write().await;
        if let Some(job) = jobs.get_mut(&id) {
            if matches!(status, JobStatus::Completed { .. } | JobStatus::Failed { .. }) {
                job.finished_at = Some(Utc::now());
            }
            job.status = status;
        }
    }

    /// Runs on the blocking pool
    fn run_blocking(&self, request: &AnalysisRequest, budget: &AttributionBudget) -> Result<AnalysisResult> {
        let artifact = self
            .models
            .get_or_load(&request.model_path, |p| ModelLoader::load(p))
            .map_err(|e| load_error(e, &request.model_path, MeovisError::ModelLoad))?;
        let frame = self
            .datasets
            .get_or_load(&request.dataset_path, |p| self.loader.load(p))
            .map_err(|e| load_error(e, &request.dataset_path, MeovisError::DatasetFormat))?;
        self.analyzer.analyze_loaded(&artifact, &frame, request, budget)
    }
}

/// A fingerprint failure means the file could not be read
fn load_error(err: MeovisError, path: &Path, wrap: fn(String) -> MeovisError) -> MeovisError {
    match err {
        MeovisError::Io(io) => wrap(format!("{}: {}", path.display(), io)),
        other => other,
    }
}

/// Handle to a submitted analysis
pub struct AnalysisHandle {
    id: Uuid,
    cancel: CancelToken,
    task: JoinHandle<Result<AnalysisResult>>,
}

impl AnalysisHandle {
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Abort the attribution step; predictions and metrics are still returned
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    pub async fn wait(self) -> Result<AnalysisResult> {
        self.task
            .await
            .map_err(|e| MeovisError::AnalysisFailed(format!("analysis task failed: {}", e)))?
    }
}

/// Concurrent analysis front-end
#[derive(Clone)]
pub struct AnalysisService {
    state: Arc<ServiceState>,
}

impl AnalysisService {
    pub fn new(config: EngineConfig) -> Result<Self> {
        config.validate()?;
        let service = &config.service;
        let state = ServiceState {
            analyzer: Analyzer::new(config.attribution.clone()),
            loader: DatasetLoader::new(),
            permits: Arc::new(Semaphore::new(service.max_concurrent_analyses)),
            models: ArtifactCache::new(service.cache_capacity, service.cache_ttl()),
            datasets: ArtifactCache::new(service.cache_capacity, service.cache_ttl()),
            jobs: RwLock::new(HashMap::new()),
            config,
        };
        Ok(Self {
            state: Arc::new(state),
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.state.config
    }

    /// Queue an analysis. Must be called within a tokio runtime.
    pub async fn submit(&self, request: AnalysisRequest) -> Result<AnalysisHandle> {
        let config = &self.state.config;
        if !config.accepts_model(&request.model_path) {
            return Err(MeovisError::ModelLoad(format!(
                "{}: extension not accepted (allowed: {})",
                request.model_path.display(),
                config.model_extensions.join(", ")
            )));
        }
        if !config.accepts_dataset(&request.dataset_path) {
            return Err(MeovisError::DatasetFormat(format!(
                "{}: extension not accepted (allowed: {})",
                request.dataset_path.display(),
                config.dataset_extensions.join(", ")
            )));
        }

        let id = Uuid::new_v4();
        let cancel = CancelToken::new();
        self.state.jobs.write().await.insert(
            id,
            AnalysisJob {
                id,
                status: JobStatus::Pending,
                request: request.clone(),
                created_at: Utc::now(),
                finished_at: None,
            },
        );

        let state = self.state.clone();
        let token = cancel.clone();
        let task = tokio::spawn(async move {
            let _permit = state
                .permits
                .clone()
                .acquire_owned()
                .await
                .map_err(|e| MeovisError::AnalysisFailed(e.to_string()))?;
            state.set_status(id, JobStatus::Running).await;

            let budget = AttributionBudget::unbounded()
                .with_timeout(state.config.service.attribution_timeout())
                .with_cancel(token);
            let worker = state.clone();
            let outcome = tokio::task::spawn_blocking(move || worker.run_blocking(&request, &budget))
                .await
                .map_err(|e| MeovisError::AnalysisFailed(format!("analysis worker panicked: {}", e)))
                .and_then(|r| r);

            match &outcome {
                Ok(result) => {
                    let status = JobStatus::Completed {
                        result_id: result.id(),
                        degraded: result.attribution().degraded,
                    };
                    state.set_status(id, status).await;
                }
                Err(err) => {
                    error!(job = %id, error = %err, "Analysis job failed");
                    state.set_status(id, JobStatus::Failed { error: err.to_string() }).await;
                }
            }
            outcome
        });

        info!(job = %id, "Analysis submitted");
        Ok(AnalysisHandle { id, cancel, task })
    }

    /// Submit and wait
    pub async fn analyze(&self, request: AnalysisRequest) -> Result<AnalysisResult> {
        self.submit(request).await?.wait().await
    }

    pub async fn status(&self, id: Uuid) -> Option<JobStatus> {
        self.state.jobs.read().await.get(&id).map(|j| j.status.clone())
    }

    pub async fn job(&self, id: Uuid) -> Option<AnalysisJob> {
        self.state.jobs.read().await.get(&id).cloned()
    }

    /// All jobs, oldest first
    pub async fn jobs(&self) -> Vec<AnalysisJob> {
        let mut jobs: Vec<AnalysisJob> = self.state.jobs.read().await.values().cloned().collect();
        jobs.sort_by_key(|j| j.created_at);
        jobs
    }

    /// Standalone metrics; pure and cheap, so computed inline
    pub fn evaluate(&self, y_true: &[f64], y_pred: &[f64], task_type: TaskType) -> Result<MetricsResult> {
        metrics::evaluate(y_true, y_pred, task_type)
    }

    /// Model and dataset cache statistics
    pub fn cache_stats(&self) -> (CacheStats, CacheStats) {
        (self.state.models.stats(), self.state.datasets.stats())
    }
}
