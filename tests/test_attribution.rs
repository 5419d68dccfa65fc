//! Integration tests for feature attribution: strategies, caps, determinism
//! and degraded results

use meovis::dataset::FeatureMatrix;
use meovis::explain::{
    AttributionBudget, AttributionConfig, AttributionEngine, AttributionStrategy, CancelToken,
};
use meovis::model::{ModelArtifact, ModelMetadata};
use meovis::training::{ModelType, TaskType, TrainEngine, TrainingConfig};
use ndarray::{Array1, Array2};
use std::collections::BTreeMap;
use std::time::Duration;

// ============================================================================
// Helpers
// ============================================================================

fn features(values: Array2<f64>) -> FeatureMatrix {
    let names = (0..values.ncols()).map(|j| format!("f{}", j)).collect();
    FeatureMatrix {
        feature_names: names,
        values,
        encodings: BTreeMap::new(),
    }
}

fn grid(rows: usize, cols: usize) -> Array2<f64> {
    Array2::from_shape_fn((rows, cols), |(i, j)| ((i * (j + 3) + j * 5) % 17) as f64)
}

fn classification_data(rows: usize) -> (Array2<f64>, Array1<f64>) {
    let x = grid(rows, 4);
    let y = x
        .rows()
        .into_iter()
        .map(|r| if r[0] + r[1] > 16.0 { 1.0 } else { 0.0 })
        .collect();
    (x, y)
}

fn regression_data(rows: usize, cols: usize) -> (Array2<f64>, Array1<f64>) {
    let x = grid(rows, cols);
    let y = x.rows().into_iter().map(|r| 3.0 * r[0] - r[1] + 2.0).collect();
    (x, y)
}

fn train(config: TrainingConfig, x: &Array2<f64>, y: &Array1<f64>) -> ModelArtifact {
    let model = TrainEngine::new(config).fit(x, y).unwrap();
    let names = (0..x.ncols()).map(|j| format!("f{}", j)).collect();
    ModelArtifact::new(model, ModelMetadata::new("test").with_features(names))
}

fn rows_of(values: &[Vec<f64>]) -> Array2<f64> {
    let ncols = values.first().map(|r| r.len()).unwrap_or(0);
    Array2::from_shape_fn((values.len(), ncols), |(i, j)| values[i][j])
}

// ============================================================================
// Strategy selection and local accuracy
// ============================================================================

#[test]
fn test_forest_probabilities_sum_to_prediction() {
    let (x, y) = classification_data(150);
    let artifact = train(
        TrainingConfig::new(TaskType::Classification, ModelType::RandomForest)
            .with_n_estimators(5)
            .with_max_depth(4),
        &x,
        &y,
    );

    let result = AttributionEngine::default().attribute(&artifact, &features(x));
    assert!(!result.degraded, "{:?}", result.error_detail);
    assert_eq!(result.strategy, Some(AttributionStrategy::TreeShap));
    assert_eq!(result.attribution_values.n_outputs(), 2);

    let proba = artifact.model().predict_proba(&rows_of(&result.feature_values)).unwrap();
    let expected = result.expected_value.as_ref().unwrap();
    for k in 0..2 {
        let phi = result.attribution_values.output(k).unwrap();
        let base = expected.get(k).unwrap();
        for (i, row) in phi.iter().enumerate() {
            let total: f64 = base + row.iter().sum::<f64>();
            assert!((total - proba[[i, k]]).abs() < 1e-6, "row {} class {}", i, k);
        }
    }
}

#[test]
fn test_linear_regression_uses_permutation_sampling() {
    let (x, y) = regression_data(80, 3);
    let artifact = train(
        TrainingConfig::new(TaskType::Regression, ModelType::LinearRegression),
        &x,
        &y,
    );

    let result = AttributionEngine::default().attribute(&artifact, &features(x));
    assert!(!result.degraded, "{:?}", result.error_detail);
    assert_eq!(result.strategy, Some(AttributionStrategy::PermutationSampling));
    assert_eq!(result.attribution_values.n_outputs(), 1);

    let predictions = artifact.model().predict(&rows_of(&result.feature_values)).unwrap();
    let base = result.expected_value.as_ref().unwrap().get(0).unwrap();
    for (i, row) in result.attribution_values.output(0).unwrap().iter().enumerate() {
        let total: f64 = base + row.iter().sum::<f64>();
        assert!((total - predictions[i]).abs() < 1e-6);
    }
}

#[test]
fn test_logistic_regression_explains_each_class() {
    let (x, y) = classification_data(60);
    let artifact = train(
        TrainingConfig::new(TaskType::Classification, ModelType::LogisticRegression),
        &x,
        &y,
    );

    let config = AttributionConfig::default().with_n_permutations(4).with_background_size(20);
    let result = AttributionEngine::new(config).attribute(&artifact, &features(x));
    assert!(!result.degraded, "{:?}", result.error_detail);
    assert_eq!(result.attribution_values.n_outputs(), 2);
    assert_eq!(result.output_labels.as_deref().map(|l| l.len()), Some(2));
}

// ============================================================================
// Sampling and capping
// ============================================================================

#[test]
fn test_large_input_is_sampled_and_capped() {
    let (x, y) = regression_data(2000, 80);
    let artifact = train(
        TrainingConfig::new(TaskType::Regression, ModelType::DecisionTree).with_max_depth(4),
        &x,
        &y,
    );

    let result = AttributionEngine::default().attribute(&artifact, &features(x));
    assert!(!result.degraded, "{:?}", result.error_detail);
    assert_eq!(result.sample_size_used, 1000);
    assert_eq!(result.features_used, 50);
    assert_eq!(result.feature_names.len(), 50);
    assert_eq!(result.feature_names[49], "f49");
    assert_eq!(result.feature_values.len(), 1000);

    let values = result.attribution_values.output(0).unwrap();
    assert_eq!(values.len(), 1000);
    assert!(values.iter().all(|row| row.len() == 50));
}

#[test]
fn test_signal_feature_ranks_first() {
    let (x, y) = regression_data(300, 5);
    let artifact = train(
        TrainingConfig::new(TaskType::Regression, ModelType::DecisionTree).with_max_depth(6),
        &x,
        &y,
    );

    let result = AttributionEngine::default().attribute(&artifact, &features(x));
    let top = result.top_features(1);
    assert_eq!(top[0].feature, "f0");
    assert!(result
        .global_importance
        .windows(2)
        .all(|w| w[0].mean_abs_attribution >= w[1].mean_abs_attribution));
}

#[test]
fn test_same_seed_same_attributions() {
    let (x, y) = regression_data(120, 4);
    let artifact = train(
        TrainingConfig::new(TaskType::Regression, ModelType::LinearRegression),
        &x,
        &y,
    );
    let config = AttributionConfig::default()
        .with_sample_size_cap(40)
        .with_random_seed(7);

    let matrix = features(x);
    let a = AttributionEngine::new(config.clone()).attribute(&artifact, &matrix);
    let b = AttributionEngine::new(config).attribute(&artifact, &matrix);
    assert_eq!(a.attribution_values, b.attribution_values);
    assert_eq!(a.feature_values, b.feature_values);
    assert_eq!(a.sample_size_used, 40);
}

// ============================================================================
// Degraded results
// ============================================================================

#[test]
fn test_cancelled_attribution_is_degraded() {
    let (x, y) = classification_data(50);
    let artifact = train(
        TrainingConfig::new(TaskType::Classification, ModelType::DecisionTree),
        &x,
        &y,
    );
    let token = CancelToken::new();
    token.cancel();
    let budget = AttributionBudget::unbounded().with_cancel(token);

    let result = AttributionEngine::default().attribute_with_budget(&artifact, &features(x), &budget);
    assert!(result.is_degraded());
    assert!(result.error_detail.is_some());
    assert!(result.attribution_values.is_empty());
    assert_eq!(result.sample_size_used, 0);
    assert_eq!(result.strategy, Some(AttributionStrategy::TreeShap));
}

#[test]
fn test_expired_deadline_is_degraded() {
    let (x, y) = regression_data(50, 3);
    let artifact = train(
        TrainingConfig::new(TaskType::Regression, ModelType::LinearRegression),
        &x,
        &y,
    );
    let budget = AttributionBudget::unbounded().with_timeout(Duration::ZERO);

    let result = AttributionEngine::default().attribute_with_budget(&artifact, &features(x), &budget);
    assert!(result.degraded);
    assert!(result.error_detail.unwrap().contains("timed out"));
}

#[test]
fn test_invalid_config_is_degraded() {
    let (x, y) = regression_data(20, 2);
    let artifact = train(
        TrainingConfig::new(TaskType::Regression, ModelType::LinearRegression),
        &x,
        &y,
    );
    let config = AttributionConfig::default().with_sample_size_cap(0);
    let result = AttributionEngine::new(config).attribute(&artifact, &features(x));
    assert!(result.degraded);
}
