//! Meovis CLI Module
//!
//! Command-line interface for training artifacts, inspecting models and
//! datasets, and running analyses.

use clap::{Parser, Subcommand};
use colored::*;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use crate::analysis::{AnalysisRequest, AnalysisResult, Analyzer};
use crate::config::EngineConfig;
use crate::dataset::{DatasetLoader, DatasetPreparer};
use crate::metrics;
use crate::model::{ModelLoader, ModelMetadata};
use crate::service::AnalysisService;
use crate::training::{ModelType, TaskType, TrainEngine, TrainingConfig};

// ─── Styling helpers ───────────────────────────────────────────────────────────

fn dim(s: &str) -> ColoredString   { s.truecolor(100, 100, 100) }
fn accent(s: &str) -> ColoredString { s.truecolor(120, 170, 255) }
fn muted(s: &str) -> ColoredString  { s.truecolor(140, 140, 140) }
fn ok(s: &str) -> ColoredString     { s.truecolor(100, 210, 120) }

fn step_run(msg: &str) {
    eprint!("  {} {}... ", accent("›"), msg);
}

fn step_done(detail: &str) {
    eprintln!("{} {}", ok("done"), dim(detail));
}

fn section(title: &str) {
    eprintln!();
    eprintln!("  {}", title.white().bold());
    eprintln!("  {}", dim(&"─".repeat(56)));
}

// ─── CLI definition ────────────────────────────────────────────────────────────

#[derive(Parser)]
#[command(name = "meovis")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Model analysis and interpretability engine")]
#[command(long_about = None)]
pub struct Cli {
    /// JSON config file (defaults plus MEOVIS_* environment overrides otherwise)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Train a model and save it as an artifact
    Train {
        /// Input data file (CSV or JSON)
        #[arg(short, long)]
        data: PathBuf,

        /// Target column name (last column when omitted)
        #[arg(short, long)]
        target: Option<String>,

        /// Model type (decision_tree, random_forest, gradient_boosting, linear, logistic, naive_bayes)
        #[arg(short, long, default_value = "random_forest")]
        model: String,

        /// Task type (classification, regression)
        #[arg(long, default_value = "classification")]
        task: String,

        /// Maximum tree depth
        #[arg(long)]
        max_depth: Option<usize>,

        /// Number of trees for ensembles
        #[arg(long, default_value = "100")]
        n_estimators: usize,

        /// Random seed
        #[arg(long, default_value = "42")]
        seed: u64,

        /// Output artifact (.json or .bin)
        #[arg(short, long)]
        output: PathBuf,
    },

    /// Show model information
    Inspect {
        /// Model artifact
        #[arg(short, long)]
        model: PathBuf,
    },

    /// Show dataset information
    Info {
        /// Input data file
        #[arg(short, long)]
        data: PathBuf,
    },

    /// Compute predictions and metrics
    Evaluate {
        #[arg(short, long)]
        model: PathBuf,

        #[arg(short, long)]
        data: PathBuf,

        #[arg(short, long)]
        target: Option<String>,

        /// Override the model's task type
        #[arg(long)]
        task: Option<String>,
    },

    /// Full analysis: predictions, metrics and feature attributions
    Analyze {
        #[arg(short, long)]
        model: PathBuf,

        #[arg(short, long)]
        data: PathBuf,

        #[arg(short, long)]
        target: Option<String>,

        #[arg(long)]
        task: Option<String>,

        /// Attribution timeout in seconds
        #[arg(long)]
        timeout: Option<u64>,

        /// Number of top features to print
        #[arg(long, default_value = "10")]
        top: usize,

        /// Write the full result as JSON
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

pub fn load_config(path: Option<&Path>) -> anyhow::Result<EngineConfig> {
    let mut config = match path {
        Some(p) => EngineConfig::load(p)?,
        None => EngineConfig::default(),
    };
    config.apply_env();
    config.validate()?;
    Ok(config)
}

fn build_request(
    model: &Path,
    data: &Path,
    target: Option<&str>,
    task: Option<&str>,
) -> anyhow::Result<AnalysisRequest> {
    let mut request = AnalysisRequest::new(model, data);
    if let Some(t) = target {
        request = request.with_target_column(t);
    }
    if let Some(t) = task {
        request = request.with_task_type(t.parse()?);
    }
    Ok(request)
}

fn write_json(value: &serde_json::Value, output: Option<&Path>) -> anyhow::Result<()> {
    let text = serde_json::to_string_pretty(value)?;
    match output {
        Some(path) => {
            std::fs::write(path, text)?;
            eprintln!("  {} {}", ok("✓"), format!("wrote {}", path.display()));
        }
        None => println!("{}", text),
    }
    Ok(())
}

// ─── Commands ──────────────────────────────────────────────────────────────────

#[allow(clippy::too_many_arguments)]
pub fn cmd_train(
    data_path: &Path,
    target: Option<&str>,
    model_type: &str,
    task_type: &str,
    max_depth: Option<usize>,
    n_estimators: usize,
    seed: u64,
    output: &Path,
) -> anyhow::Result<()> {
    section("Train");

    let task: TaskType = task_type.parse()?;
    let model: ModelType = model_type.parse()?;

    step_run("Loading data");
    let start = Instant::now();
    let (features, target) = DatasetPreparer::default().prepare(data_path, target)?;
    step_done(&format!(
        "{} rows × {} features in {:?}",
        features.nrows(),
        features.ncols(),
        start.elapsed()
    ));

    let mut config = TrainingConfig::new(task, model)
        .with_n_estimators(n_estimators)
        .with_random_state(seed);
    if let Some(d) = max_depth {
        config = config.with_max_depth(d);
    }

    step_run(&format!("Training {}", model_type.cyan()));
    let start = Instant::now();
    let fitted = TrainEngine::new(config).fit(&features.values, &target.values)?;
    step_done(&format!("{:?}", start.elapsed()));

    let name = output
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("model")
        .to_string();
    let metadata = ModelMetadata::new(name)
        .with_features(features.feature_names.clone())
        .with_target(target.name.clone())
        .with_class_names(target.class_names.clone())
        .with_encodings(features.encodings.clone());
    ModelLoader::save(&fitted, &metadata, output)?;
    eprintln!("  {} {}", ok("✓"), format!("saved {}", output.display()));
    Ok(())
}

pub fn cmd_inspect(model_path: &Path) -> anyhow::Result<()> {
    let artifact = ModelLoader::load(model_path)?;
    write_json(&serde_json::to_value(artifact.info())?, None)
}

pub fn cmd_info(data_path: &Path) -> anyhow::Result<()> {
    section("Data Info");

    let frame = DatasetLoader::new().load(data_path)?;
    let info = frame.info();

    eprintln!("  {:<12} {}", muted("File"), data_path.display());
    eprintln!("  {:<12} {}", muted("Rows"), info.rows);
    eprintln!("  {:<12} {}", muted("Columns"), info.columns);
    eprintln!();
    eprintln!("  {:<20} {:<12} {:>6}", muted("Column"), muted("Type"), muted("Nulls"));
    eprintln!("  {}", dim(&"─".repeat(40)));
    for (name, dtype) in info.column_names.iter().zip(&info.dtypes) {
        let nulls = frame.column(name).map(|c| c.data.null_count()).unwrap_or(0);
        eprintln!("  {:<20} {:<12} {:>6}", name, dtype.truecolor(140, 140, 140), nulls);
    }
    eprintln!();

    write_json(&serde_json::to_value(&info)?, None)
}

pub fn cmd_evaluate(
    config: &EngineConfig,
    model: &Path,
    data: &Path,
    target: Option<&str>,
    task: Option<&str>,
) -> anyhow::Result<()> {
    section("Evaluate");
    let request = build_request(model, data, target, task)?;
    let artifact = ModelLoader::load(&request.model_path)?;
    let frame = DatasetLoader::new().load(&request.dataset_path)?;
    let analyzer = Analyzer::new(config.attribution.clone());

    let (features, truth) =
        analyzer.prepare(&artifact, &frame, request.target_column.as_deref())?;
    let output = analyzer.predict(&artifact, &features.values)?;
    let task_type = request
        .task_type
        .unwrap_or_else(|| artifact.model().task_type());
    let y_true = truth.values.to_vec();
    let label_names = truth
        .class_names
        .clone()
        .or_else(|| artifact.metadata().class_names.clone());
    let metrics = metrics::evaluate_with_labels(
        &y_true,
        &output.predictions,
        task_type,
        label_names.as_deref(),
    )?;

    let (name, score) = metrics.primary_metric();
    eprintln!("  {:<16} {}", muted(name), format!("{:.4}", score).white().bold());
    eprintln!();

    write_json(
        &serde_json::json!({
            "predictions": output.predictions,
            "probabilities": output.probabilities,
            "metrics": metrics,
        }),
        None,
    )
}

#[allow(clippy::too_many_arguments)]
pub async fn cmd_analyze(
    mut config: EngineConfig,
    model: &Path,
    data: &Path,
    target: Option<&str>,
    task: Option<&str>,
    timeout: Option<u64>,
    top: usize,
    output: Option<&Path>,
) -> anyhow::Result<()> {
    section("Analyze");
    if let Some(secs) = timeout {
        config = config.with_attribution_timeout(Duration::from_secs(secs));
    }
    let request = build_request(model, data, target, task)?;

    step_run("Running analysis");
    let start = Instant::now();
    let service = AnalysisService::new(config)?;
    let result = service.analyze(request).await?;
    step_done(&format!("{:?}", start.elapsed()));

    print_summary(&result, top);
    write_json(&serde_json::to_value(&result)?, output)
}

fn print_summary(result: &AnalysisResult, top: usize) {
    let (name, score) = result.metrics().primary_metric();
    eprintln!();
    eprintln!("  {:<16} {}", muted("Task"), result.task_type().to_string().white());
    eprintln!("  {:<16} {}", muted(name), format!("{:.4}", score).white().bold());

    let attribution = result.attribution();
    if attribution.is_degraded() {
        eprintln!(
            "  {:<16} {}",
            muted("Attribution"),
            format!(
                "unavailable: {}",
                attribution.error_detail.as_deref().unwrap_or("unknown error")
            )
            .yellow()
        );
        eprintln!();
        return;
    }

    eprintln!(
        "  {:<16} {}",
        muted("Attribution"),
        format!(
            "{} rows × {} features",
            attribution.sample_size_used, attribution.features_used
        )
        .white()
    );
    eprintln!();
    eprintln!("  {:<24} {:>12}", muted("Feature"), muted("mean |φ|"));
    eprintln!("  {}", dim(&"─".repeat(38)));
    for fi in attribution.top_features(top) {
        eprintln!("  {:<24} {:>12.4}", fi.feature, fi.mean_abs_attribution);
    }
    eprintln!();
}
