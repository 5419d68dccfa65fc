//! Combined analysis: predictions, metrics and attributions
//!
//! The [`Analyzer`] drives one analysis through its [`AnalysisStage`]s and
//! aggregates the outputs into a write-once [`AnalysisResult`]. Load,
//! preparation, prediction and metrics failures are fatal; attribution
//! failures only mark the attribution degraded.

mod analyzer;
mod result;
mod stage;

pub use analyzer::{AnalysisRequest, Analyzer, PredictionOutput};
pub use result::{AnalysisParts, AnalysisResult};
pub use stage::AnalysisStage;
