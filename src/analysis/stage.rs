//! Lifecycle of a single analysis

use crate::error::{MeovisError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Analysis stage. Stages only move forward; `Failed` and `Aggregated` are terminal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "stage", rename_all = "snake_case")]
pub enum AnalysisStage {
    Requested,
    ModelLoaded,
    DatasetPrepared,
    PredictionsComputed,
    MetricsComputed,
    AttributionComputed { degraded: bool },
    Aggregated,
    Failed { reason: String },
}

impl AnalysisStage {
    fn ordinal(&self) -> Option<u8> {
        match self {
            AnalysisStage::Requested => Some(0),
            AnalysisStage::ModelLoaded => Some(1),
            AnalysisStage::DatasetPrepared => Some(2),
            AnalysisStage::PredictionsComputed => Some(3),
            AnalysisStage::MetricsComputed => Some(4),
            AnalysisStage::AttributionComputed { .. } => Some(5),
            AnalysisStage::Aggregated => Some(6),
            AnalysisStage::Failed { .. } => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, AnalysisStage::Aggregated | AnalysisStage::Failed { .. })
    }

    /// Whether `next` directly follows this stage.
    ///
    /// Any stage up to metrics may fail; attribution problems never fail an
    /// analysis, they only mark the attribution degraded.
    pub fn can_transition_to(&self, next: &AnalysisStage) -> bool {
        match (self.ordinal(), next) {
            (Some(cur), AnalysisStage::Failed { .. }) => cur <= 4,
            (Some(cur), next) => next.ordinal() == Some(cur + 1),
            (None, _) => false,
        }
    }

    /// Move to `next`, rejecting illegal transitions
    pub fn advance(&mut self, next: AnalysisStage) -> Result<()> {
        if !self.can_transition_to(&next) {
            return Err(MeovisError::AnalysisFailed(format!(
                "illegal stage transition {} -> {}",
                self, next
            )));
        }
        *self = next;
        Ok(())
    }
}

impl fmt::Display for AnalysisStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AnalysisStage::Requested => f.write_str("requested"),
            AnalysisStage::ModelLoaded => f.write_str("model_loaded"),
            AnalysisStage::DatasetPrepared => f.write_str("dataset_prepared"),
            AnalysisStage::PredictionsComputed => f.write_str("predictions_computed"),
            AnalysisStage::MetricsComputed => f.write_str("metrics_computed"),
            AnalysisStage::AttributionComputed { degraded: false } => f.write_str("attribution_computed"),
            AnalysisStage::AttributionComputed { degraded: true } => f.write_str("attribution_degraded"),
            AnalysisStage::Aggregated => f.write_str("aggregated"),
            AnalysisStage::Failed { reason } => write!(f, "failed({})", reason),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_happy_path() {
        let mut stage = AnalysisStage::Requested;
        for next in [
            AnalysisStage::ModelLoaded,
            AnalysisStage::DatasetPrepared,
            AnalysisStage::PredictionsComputed,
            AnalysisStage::MetricsComputed,
            AnalysisStage::AttributionComputed { degraded: true },
            AnalysisStage::Aggregated,
        ] {
            stage.advance(next).unwrap();
        }
        assert!(stage.is_terminal());
    }

    #[test]
    fn test_skipping_is_rejected() {
        let mut stage = AnalysisStage::Requested;
        assert!(stage.advance(AnalysisStage::MetricsComputed).is_err());
        assert_eq!(stage, AnalysisStage::Requested);
    }

    #[test]
    fn test_failure_rules() {
        let fail = || AnalysisStage::Failed { reason: "x".into() };
        assert!(AnalysisStage::ModelLoaded.can_transition_to(&fail()));
        assert!(!AnalysisStage::AttributionComputed { degraded: false }.can_transition_to(&fail()));
        assert!(!fail().can_transition_to(&AnalysisStage::Requested));
        assert!(!AnalysisStage::Aggregated.can_transition_to(&AnalysisStage::Requested));
    }
}
