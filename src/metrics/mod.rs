//! Metrics engine
//!
//! [`evaluate`] checks lengths before anything else, then dispatches on the
//! task type to [`classification_metrics`] or [`regression_metrics`].

mod classification;
mod regression;

pub use classification::{classification_metrics, AverageReport, ClassReport, ClassificationMetrics};
pub use regression::{regression_metrics, RegressionMetrics};

use crate::error::{MeovisError, Result};
use crate::training::TaskType;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Metrics of one evaluation, tagged by task type
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "task_type", rename_all = "lowercase")]
pub enum MetricsResult {
    Classification(ClassificationMetrics),
    Regression(RegressionMetrics),
}

impl MetricsResult {
    pub fn task_type(&self) -> TaskType {
        match self {
            MetricsResult::Classification(_) => TaskType::Classification,
            MetricsResult::Regression(_) => TaskType::Regression,
        }
    }

    /// Headline score: accuracy for classification, R² for regression
    pub fn primary_metric(&self) -> (&'static str, f64) {
        match self {
            MetricsResult::Classification(m) => ("accuracy", m.accuracy),
            MetricsResult::Regression(m) => ("r2", m.r2),
        }
    }

    pub fn as_classification(&self) -> Option<&ClassificationMetrics> {
        match self {
            MetricsResult::Classification(m) => Some(m),
            MetricsResult::Regression(_) => None,
        }
    }

    pub fn as_regression(&self) -> Option<&RegressionMetrics> {
        match self {
            MetricsResult::Regression(m) => Some(m),
            MetricsResult::Classification(_) => None,
        }
    }
}

/// Evaluate predictions against the truth
pub fn evaluate(y_true: &[f64], y_pred: &[f64], task_type: TaskType) -> Result<MetricsResult> {
    evaluate_with_labels(y_true, y_pred, task_type, None)
}

/// Like [`evaluate`], with the task type given by name
/// (`classification` | `regression`)
pub fn evaluate_named(y_true: &[f64], y_pred: &[f64], task_type: &str) -> Result<MetricsResult> {
    check_lengths(y_true, y_pred)?;
    let task: TaskType = task_type.parse()?;
    evaluate(y_true, y_pred, task)
}

/// Evaluate with display names for ordinal-encoded class labels
pub fn evaluate_with_labels(
    y_true: &[f64],
    y_pred: &[f64],
    task_type: TaskType,
    label_names: Option<&[String]>,
) -> Result<MetricsResult> {
    check_lengths(y_true, y_pred)?;
    if y_true.is_empty() {
        return Err(MeovisError::InvalidInput(
            "cannot evaluate empty predictions".to_string(),
        ));
    }

    let result = match task_type {
        TaskType::Classification => {
            MetricsResult::Classification(classification_metrics(y_true, y_pred, label_names)?)
        }
        TaskType::Regression => MetricsResult::Regression(regression_metrics(y_true, y_pred)?),
    };

    let (metric, value) = result.primary_metric();
    debug!(task = %task_type, samples = y_true.len(), metric, value, "Metrics computed");
    Ok(result)
}

fn check_lengths(y_true: &[f64], y_pred: &[f64]) -> Result<()> {
    if y_true.len() != y_pred.len() {
        return Err(MeovisError::LengthMismatch {
            y_true: y_true.len(),
            y_pred: y_pred.len(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_length_mismatch_first() {
        // also an unknown task type; the length check wins
        let err = evaluate_named(&[1.0, 2.0], &[1.0], "clustering").unwrap_err();
        assert!(matches!(err, MeovisError::LengthMismatch { y_true: 2, y_pred: 1 }));
    }

    #[test]
    fn test_unknown_task_type() {
        let err = evaluate_named(&[1.0], &[1.0], "clustering").unwrap_err();
        assert!(matches!(err, MeovisError::UnsupportedTaskType(_)));
    }

    #[test]
    fn test_empty_input() {
        assert!(matches!(
            evaluate(&[], &[], TaskType::Regression),
            Err(MeovisError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_primary_metric_and_tag() {
        let result = evaluate(&[1.0, 0.0], &[1.0, 1.0], TaskType::Classification).unwrap();
        assert_eq!(result.primary_metric(), ("accuracy", 0.5));
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["task_type"], "classification");

        let result = evaluate(&[1.0, 2.0, 3.0], &[1.0, 2.0, 3.0], TaskType::Regression).unwrap();
        assert_eq!(result.primary_metric(), ("r2", 1.0));
        assert_eq!(result.task_type(), TaskType::Regression);
    }
}
