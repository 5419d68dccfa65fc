//! Integration tests for classification and regression metrics

use meovis::error::MeovisError;
use meovis::metrics::{evaluate, evaluate_named, evaluate_with_labels, MetricsResult};
use meovis::training::TaskType;

// ============================================================================
// Classification
// ============================================================================

#[test]
fn test_binary_classification_report() {
    let y_true = [1.0, 0.0, 1.0, 0.0, 1.0];
    let y_pred = [1.0, 0.0, 1.0, 0.0, 0.0];

    let result = evaluate(&y_true, &y_pred, TaskType::Classification).unwrap();
    let m = result.as_classification().unwrap();
    assert!((m.accuracy - 0.8).abs() < 1e-12);
    assert_eq!(m.labels, vec!["0", "1"]);
    assert_eq!(m.confusion_matrix, vec![vec![2, 0], vec![1, 2]]);

    // class 1: precision 1.0, recall 2/3
    let class1 = &m.per_class[1];
    assert!((class1.precision - 1.0).abs() < 1e-12);
    assert!((class1.recall - 2.0 / 3.0).abs() < 1e-12);
    assert!((class1.f1_score - 0.8).abs() < 1e-12);
    assert_eq!(class1.support, 3);
    assert_eq!(result.primary_metric(), ("accuracy", m.accuracy));
}

#[test]
fn test_multiclass_with_label_names() {
    let names = vec!["cat".to_string(), "dog".to_string(), "owl".to_string()];
    let y_true = [0.0, 1.0, 2.0, 2.0, 1.0, 0.0];
    let y_pred = [0.0, 2.0, 2.0, 2.0, 1.0, 1.0];

    let result = evaluate_with_labels(&y_true, &y_pred, TaskType::Classification, Some(&names)).unwrap();
    let m = result.as_classification().unwrap();
    assert_eq!(m.labels, names);
    assert!((m.accuracy - 4.0 / 6.0).abs() < 1e-12);

    let total: usize = m.confusion_matrix.iter().flatten().sum();
    assert_eq!(total, 6);
    for (row, report) in m.confusion_matrix.iter().zip(&m.per_class) {
        assert_eq!(row.iter().sum::<usize>(), report.support);
    }
}

#[test]
fn test_unpredicted_class_scores_zero() {
    let y_true = [0.0, 0.0, 1.0];
    let y_pred = [0.0, 0.0, 0.0];
    let result = evaluate(&y_true, &y_pred, TaskType::Classification).unwrap();
    let m = result.as_classification().unwrap();
    assert_eq!(m.per_class[1].precision, 0.0);
    assert_eq!(m.per_class[1].f1_score, 0.0);
    assert!(m.macro_avg.precision.is_finite());
}

// ============================================================================
// Regression
// ============================================================================

#[test]
fn test_regression_metrics() {
    let y_true = [1.0, 2.0, 3.0, 4.0];
    let y_pred = [1.5, 2.0, 2.5, 4.0];

    let result = evaluate(&y_true, &y_pred, TaskType::Regression).unwrap();
    let m = result.as_regression().unwrap();
    assert!((m.mse - 0.125).abs() < 1e-12);
    assert!((m.rmse - 0.125f64.sqrt()).abs() < 1e-12);
    assert!((m.mae - 0.25).abs() < 1e-12);
    assert!((m.r2 - 0.9).abs() < 1e-12);
    assert_eq!(result.task_type(), TaskType::Regression);
}

#[test]
fn test_result_serializes_with_task_tag() {
    let result = evaluate(&[1.0, 2.0], &[1.0, 2.0], TaskType::Regression).unwrap();
    let json = serde_json::to_value(&result).unwrap();
    assert_eq!(json["task_type"], "regression");
    let back: MetricsResult = serde_json::from_value(json).unwrap();
    assert_eq!(back.task_type(), TaskType::Regression);
}

#[test]
fn test_single_sample_r2_survives_json() {
    let result = evaluate(&[3.0], &[2.5], TaskType::Regression).unwrap();
    let text = serde_json::to_string(&result).unwrap();
    assert!(text.contains("\"r2\":null"));

    let back: MetricsResult = serde_json::from_str(&text).unwrap();
    let m = back.as_regression().unwrap();
    assert!(m.r2.is_nan());
    assert!((m.mae - 0.5).abs() < 1e-12);
}

// ============================================================================
// Errors
// ============================================================================

#[test]
fn test_length_mismatch() {
    let err = evaluate(&[1.0, 2.0], &[1.0], TaskType::Regression).unwrap_err();
    assert!(matches!(err, MeovisError::LengthMismatch { y_true: 2, y_pred: 1 }));
}

#[test]
fn test_unknown_task_name() {
    let err = evaluate_named(&[1.0], &[1.0], "clustering").unwrap_err();
    assert!(matches!(err, MeovisError::UnsupportedTaskType(_)));

    let ok = evaluate_named(&[1.0, 0.0], &[1.0, 0.0], "Classification").unwrap();
    assert_eq!(ok.task_type(), TaskType::Classification);
}

#[test]
fn test_empty_input_rejected() {
    assert!(matches!(
        evaluate(&[], &[], TaskType::Classification),
        Err(MeovisError::InvalidInput(_))
    ));
}
