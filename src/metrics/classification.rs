//! Classification metrics
//!
//! Precision, recall and F1 follow the scikit-learn conventions: the
//! headline scores are weighted by support and any 0/0 ratio is 0.

use crate::error::{MeovisError, Result};
use crate::model::format_label;
use serde::{Deserialize, Serialize};

/// Scores for a single class
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassReport {
    pub label: String,
    pub precision: f64,
    pub recall: f64,
    pub f1_score: f64,
    /// Occurrences of the class in `y_true`
    pub support: usize,
}

/// Averaged scores over all classes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AverageReport {
    pub precision: f64,
    pub recall: f64,
    pub f1_score: f64,
    pub support: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationMetrics {
    pub accuracy: f64,
    /// Support-weighted precision
    pub precision: f64,
    /// Support-weighted recall
    pub recall: f64,
    /// Support-weighted F1
    pub f1_score: f64,
    /// Sorted union of true and predicted labels; indexes the confusion matrix
    pub labels: Vec<String>,
    /// `confusion_matrix[i][j]`: samples of true label `i` predicted as `j`
    pub confusion_matrix: Vec<Vec<usize>>,
    pub per_class: Vec<ClassReport>,
    pub macro_avg: AverageReport,
    pub weighted_avg: AverageReport,
}

/// Compute classification metrics. Lengths must already match.
///
/// `label_names` maps integral label values to display names (for
/// ordinal-encoded targets); other labels print as numbers.
pub fn classification_metrics(
    y_true: &[f64],
    y_pred: &[f64],
    label_names: Option<&[String]>,
) -> Result<ClassificationMetrics> {
    if y_true.iter().chain(y_pred).any(|v| !v.is_finite()) {
        return Err(MeovisError::InvalidInput(
            "class labels must be finite".to_string(),
        ));
    }

    let mut labels: Vec<f64> = y_true.iter().chain(y_pred).copied().collect();
    labels.sort_by(|a, b| a.total_cmp(b));
    labels.dedup();
    let index_of = |v: f64| labels.partition_point(|&l| l < v);

    let k = labels.len();
    let mut confusion = vec![vec![0usize; k]; k];
    for (&t, &p) in y_true.iter().zip(y_pred) {
        confusion[index_of(t)][index_of(p)] += 1;
    }

    let n = y_true.len();
    let correct: usize = (0..k).map(|i| confusion[i][i]).sum();
    let accuracy = correct as f64 / n as f64;

    let per_class: Vec<ClassReport> = (0..k)
        .map(|i| {
            let tp = confusion[i][i];
            let support: usize = confusion[i].iter().sum();
            let predicted: usize = confusion.iter().map(|row| row[i]).sum();
            let fp = predicted - tp;
            let fn_ = support - tp;
            ClassReport {
                label: display_label(labels[i], label_names),
                precision: ratio(tp, tp + fp),
                recall: ratio(tp, tp + fn_),
                f1_score: ratio(2 * tp, 2 * tp + fp + fn_),
                support,
            }
        })
        .collect();

    let macro_avg = AverageReport {
        precision: mean(per_class.iter().map(|c| c.precision), k),
        recall: mean(per_class.iter().map(|c| c.recall), k),
        f1_score: mean(per_class.iter().map(|c| c.f1_score), k),
        support: n,
    };
    let weighted = |f: fn(&ClassReport) -> f64| -> f64 {
        per_class
            .iter()
            .map(|c| f(c) * c.support as f64)
            .sum::<f64>()
            / n as f64
    };
    let weighted_avg = AverageReport {
        precision: weighted(|c| c.precision),
        recall: weighted(|c| c.recall),
        f1_score: weighted(|c| c.f1_score),
        support: n,
    };

    Ok(ClassificationMetrics {
        accuracy,
        precision: weighted_avg.precision,
        recall: weighted_avg.recall,
        f1_score: weighted_avg.f1_score,
        labels: per_class.iter().map(|c| c.label.clone()).collect(),
        confusion_matrix: confusion,
        per_class,
        macro_avg,
        weighted_avg,
    })
}

fn ratio(num: usize, den: usize) -> f64 {
    if den == 0 {
        0.0
    } else {
        num as f64 / den as f64
    }
}

fn mean(values: impl Iterator<Item = f64>, n: usize) -> f64 {
    if n == 0 {
        0.0
    } else {
        values.sum::<f64>() / n as f64
    }
}

fn display_label(value: f64, names: Option<&[String]>) -> String {
    names
        .filter(|_| value >= 0.0 && value.fract() == 0.0)
        .and_then(|names| names.get(value as usize).cloned())
        .unwrap_or_else(|| format_label(value))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_binary_accuracy() {
        let m = classification_metrics(&[1.0, 0.0, 1.0, 0.0, 1.0], &[1.0, 0.0, 1.0, 0.0, 0.0], None)
            .unwrap();
        assert!((m.accuracy - 0.8).abs() < 1e-12);
        assert_eq!(m.labels, vec!["0", "1"]);
        assert_eq!(m.confusion_matrix, vec![vec![2, 0], vec![1, 2]]);
        // class 0: p = 2/3, r = 1; class 1: p = 1, r = 2/3
        let expected_precision = (2.0 / 3.0) * 0.4 + 1.0 * 0.6;
        assert!((m.precision - expected_precision).abs() < 1e-12);
        let expected_recall = 1.0 * 0.4 + (2.0 / 3.0) * 0.6;
        assert!((m.recall - expected_recall).abs() < 1e-12);
    }

    #[test]
    fn test_zero_division_is_zero() {
        // label 2 is never predicted, label 3 never occurs in y_true
        let m = classification_metrics(&[1.0, 2.0], &[1.0, 3.0], None).unwrap();
        assert_eq!(m.labels, vec!["1", "2", "3"]);
        let class2 = &m.per_class[1];
        assert_eq!(class2.precision, 0.0);
        assert_eq!(class2.recall, 0.0);
        assert_eq!(class2.f1_score, 0.0);
        let class3 = &m.per_class[2];
        assert_eq!(class3.support, 0);
        assert_eq!(class3.precision, 0.0);
        assert!((m.precision - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_confusion_rows_sum_to_support() {
        let y_true = [0.0, 0.0, 1.0, 2.0, 2.0, 2.0, 1.0];
        let y_pred = [0.0, 1.0, 1.0, 2.0, 0.0, 2.0, 2.0];
        let m = classification_metrics(&y_true, &y_pred, None).unwrap();
        let row_sums: Vec<usize> = m.confusion_matrix.iter().map(|r| r.iter().sum()).collect();
        assert_eq!(row_sums, vec![2, 2, 3]);
        for c in &m.per_class {
            for v in [c.precision, c.recall, c.f1_score] {
                assert!((0.0..=1.0).contains(&v));
            }
        }
        assert!((0.0..=1.0).contains(&m.macro_avg.f1_score));
    }

    #[test]
    fn test_label_names() {
        let names = vec!["cat".to_string(), "dog".to_string()];
        let m = classification_metrics(&[0.0, 1.0], &[0.0, 1.0], Some(&names)).unwrap();
        assert_eq!(m.labels, names);
        assert_eq!(m.accuracy, 1.0);
    }

    #[test]
    fn test_nan_label_rejected() {
        assert!(classification_metrics(&[f64::NAN], &[1.0], None).is_err());
    }
}
