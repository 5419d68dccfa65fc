//! Attribution engine: sampling, capping, strategy selection, containment

use super::budget::AttributionBudget;
use super::config::AttributionConfig;
use super::permutation::{ModelOutput, PermutationExplainer};
use super::result::{rank_importance, AttributionResult, AttributionStrategy, AttributionValues, ExpectedValue};
use super::sampling::{cap_features, sample_rows, BACKGROUND_STREAM, ROW_STREAM};
use super::tree_shap;
use super::AttributionError;
use crate::dataset::FeatureMatrix;
use crate::model::{Capability, ModelArtifact};
use crate::training::TreeOutput;
use ndarray::{s, Array2, Axis};
use std::time::Instant;
use tracing::{info, warn};

/// Computes per-feature attributions for a model and feature matrix
#[derive(Debug, Clone, Default)]
pub struct AttributionEngine {
    config: AttributionConfig,
}

impl AttributionEngine {
    pub fn new(config: AttributionConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &AttributionConfig {
        &self.config
    }

    /// Attribute without deadline or cancellation
    pub fn attribute(&self, artifact: &ModelArtifact, features: &FeatureMatrix) -> AttributionResult {
        self.attribute_with_budget(artifact, features, &AttributionBudget::unbounded())
    }

    /// Attribute within `budget`. Never fails: any error yields a degraded
    /// result with `error_detail` set.
    pub fn attribute_with_budget(
        &self,
        artifact: &ModelArtifact,
        features: &FeatureMatrix,
        budget: &AttributionBudget,
    ) -> AttributionResult {
        let strategy = match artifact.capability().capability {
            Capability::TreeCapable => AttributionStrategy::TreeShap,
            Capability::ProbabilisticOnly | Capability::PointPredictionOnly => {
                AttributionStrategy::PermutationSampling
            }
        };
        let start = Instant::now();

        match self.try_attribute(artifact, features, budget, strategy) {
            Ok(result) => {
                info!(
                    strategy = ?strategy,
                    rows = result.sample_size_used,
                    features = result.features_used,
                    elapsed_ms = start.elapsed().as_millis() as u64,
                    "Attribution computed"
                );
                result
            }
            Err(err) => {
                warn!(strategy = ?strategy, error = %err, "Attribution degraded");
                AttributionResult::degraded(err.to_string(), Some(strategy))
            }
        }
    }

    fn try_attribute(
        &self,
        artifact: &ModelArtifact,
        features: &FeatureMatrix,
        budget: &AttributionBudget,
        strategy: AttributionStrategy,
    ) -> Result<AttributionResult, AttributionError> {
        self.config
            .validate()
            .map_err(|e| AttributionError::InvalidConfig(e.to_string()))?;
        budget.check()?;

        let model = artifact.model();
        let x = &features.values;
        if x.nrows() == 0 {
            return Err(AttributionError::EmptyInput("no rows to explain".to_string()));
        }
        if x.ncols() != model.n_features() {
            return Err(AttributionError::Model(format!(
                "X has {} features, but the model was fitted with {}",
                x.ncols(),
                model.n_features()
            )));
        }

        let cfg = &self.config;
        let rows = sample_rows(x.nrows(), cfg.sample_size_cap, cfg.random_seed, ROW_STREAM);
        let retained = cap_features(x.ncols(), cfg.feature_count_cap);
        let explained = x.select(Axis(0), &rows);

        let (matrices, expected, per_class) = match strategy {
            AttributionStrategy::TreeShap => {
                let ensemble = model.tree_ensemble().ok_or_else(|| {
                    AttributionError::Unsupported("model exposes no tree structure".to_string())
                })?;
                let per_class = ensemble.output == TreeOutput::Probability;
                let shap = tree_shap::explain(&ensemble, explained.view(), budget)?;
                let matrices: Vec<Array2<f64>> = shap
                    .values
                    .into_iter()
                    .map(|m| m.slice(s![.., ..retained]).to_owned())
                    .collect();
                (matrices, shap.expected_value, per_class)
            }
            AttributionStrategy::PermutationSampling => {
                let output = if model.supports_proba() {
                    ModelOutput::Probabilities
                } else {
                    ModelOutput::Prediction
                };
                let bg_rows = sample_rows(x.nrows(), cfg.background_size, cfg.random_seed, BACKGROUND_STREAM);
                let background = x.select(Axis(0), &bg_rows);
                let shap = PermutationExplainer::new(model, background.view(), output)
                    .with_n_permutations(cfg.n_permutations)
                    .with_seed(cfg.random_seed)
                    .explain(explained.view(), &rows, retained, budget)?;
                (
                    shap.values,
                    shap.expected_value,
                    output == ModelOutput::Probabilities,
                )
            }
        };

        let finite = matrices.iter().all(|m| m.iter().all(|v| v.is_finite()))
            && expected.iter().all(|v| v.is_finite());
        if !finite {
            return Err(AttributionError::NonFinite(
                "attribution produced non-finite values".to_string(),
            ));
        }

        let all_names = if features.feature_names.len() == x.ncols() {
            features.feature_names.clone()
        } else {
            artifact.feature_names()
        };
        let feature_names: Vec<String> = all_names.into_iter().take(retained).collect();
        let feature_values = explained
            .slice(s![.., ..retained])
            .rows()
            .into_iter()
            .map(|r| r.to_vec())
            .collect();
        let global_importance = rank_importance(&feature_names, &matrices);

        let expected_value = if per_class {
            ExpectedValue::PerClass(expected)
        } else {
            ExpectedValue::Scalar(expected.first().copied().unwrap_or(0.0))
        };

        Ok(AttributionResult {
            feature_names,
            feature_values,
            attribution_values: AttributionValues::from_matrices(&matrices, per_class),
            expected_value: Some(expected_value),
            output_labels: if per_class { artifact.class_labels() } else { None },
            sample_size_used: rows.len(),
            features_used: retained,
            strategy: Some(strategy),
            global_importance,
            degraded: false,
            error_detail: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::explain::CancelToken;
    use crate::model::ModelMetadata;
    use crate::training::{DecisionTree, GradientBoostingRegressor, GradientBoostingConfig, LinearRegression, TrainedModel};
    use ndarray::{array, Array1};
    use std::collections::BTreeMap;
    use std::time::Duration;

    fn matrix(values: Array2<f64>) -> FeatureMatrix {
        let names = (0..values.ncols()).map(|j| format!("f{}", j)).collect();
        FeatureMatrix {
            feature_names: names,
            values,
            encodings: BTreeMap::new(),
        }
    }

    fn wide_data(rows: usize, cols: usize) -> (Array2<f64>, Array1<f64>) {
        let x = Array2::from_shape_fn((rows, cols), |(i, j)| ((i * 7 + j * 3) % 11) as f64);
        let y = x.rows().into_iter().map(|r| r[0] + 0.5 * r[1]).collect();
        (x, y)
    }

    fn linear_artifact(x: &Array2<f64>, y: &Array1<f64>) -> ModelArtifact {
        let mut lr = LinearRegression::new();
        lr.fit(x, y).unwrap();
        ModelArtifact::new(TrainedModel::LinearRegression(lr), ModelMetadata::default())
    }

    #[test]
    fn test_tree_per_class_values() {
        let x = array![[0.0, 1.0], [1.0, 0.0], [2.0, 1.0], [3.0, 0.0]];
        let y = array![0.0, 0.0, 1.0, 1.0];
        let mut tree = DecisionTree::new_classifier();
        tree.fit(&x, &y).unwrap();
        let artifact = ModelArtifact::new(TrainedModel::DecisionTree(tree), ModelMetadata::default());

        let result = AttributionEngine::default().attribute(&artifact, &matrix(x));
        assert!(!result.degraded);
        assert_eq!(result.strategy, Some(AttributionStrategy::TreeShap));
        assert_eq!(result.attribution_values.n_outputs(), 2);
        assert_eq!(result.output_labels, Some(vec!["0".to_string(), "1".to_string()]));
        assert!(matches!(result.expected_value, Some(ExpectedValue::PerClass(ref v)) if v.len() == 2));
    }

    #[test]
    fn test_row_and_feature_caps() {
        let (x, y) = wide_data(120, 8);
        let artifact = linear_artifact(&x, &y);
        let config = AttributionConfig::default()
            .with_sample_size_cap(30)
            .with_feature_count_cap(5)
            .with_background_size(10)
            .with_n_permutations(2);
        let result = AttributionEngine::new(config).attribute(&artifact, &matrix(x));

        assert!(!result.degraded);
        assert_eq!(result.sample_size_used, 30);
        assert_eq!(result.features_used, 5);
        assert_eq!(result.feature_names, vec!["f0", "f1", "f2", "f3", "f4"]);
        let values = result.attribution_values.output(0).unwrap();
        assert_eq!(values.len(), 30);
        assert!(values.iter().all(|r| r.len() == 5));
        assert!(result.feature_values.iter().all(|r| r.len() == 5));
    }

    #[test]
    fn test_tree_values_are_sliced_to_cap() {
        let (x, y) = wide_data(40, 6);
        let config = GradientBoostingConfig {
            n_estimators: 5,
            ..Default::default()
        };
        let mut gb = GradientBoostingRegressor::new(config);
        gb.fit(&x, &y).unwrap();
        let artifact = ModelArtifact::new(TrainedModel::GradientBoostingRegressor(gb), ModelMetadata::default());
        let engine = AttributionEngine::new(AttributionConfig::default().with_feature_count_cap(2));
        let result = engine.attribute(&artifact, &matrix(x));
        assert_eq!(result.features_used, 2);
        assert!(matches!(result.expected_value, Some(ExpectedValue::Scalar(_))));
        assert!(result.attribution_values.output(0).unwrap().iter().all(|r| r.len() == 2));
    }

    #[test]
    fn test_timeout_degrades() {
        let (x, y) = wide_data(20, 3);
        let artifact = linear_artifact(&x, &y);
        let budget = AttributionBudget::unbounded().with_timeout(Duration::ZERO);
        let result = AttributionEngine::default().attribute_with_budget(&artifact, &matrix(x), &budget);
        assert!(result.degraded);
        assert!(result.attribution_values.is_empty());
        assert!(result.error_detail.unwrap().contains("timed out"));
    }

    #[test]
    fn test_cancel_degrades() {
        let (x, y) = wide_data(20, 3);
        let artifact = linear_artifact(&x, &y);
        let token = CancelToken::new();
        token.cancel();
        let budget = AttributionBudget::unbounded().with_cancel(token);
        let result = AttributionEngine::default().attribute_with_budget(&artifact, &matrix(x), &budget);
        assert!(result.degraded);
    }

    #[test]
    fn test_non_finite_degrades() {
        let (x, y) = wide_data(20, 2);
        let artifact = linear_artifact(&x, &y);
        let mut with_nan = x.clone();
        with_nan[[0, 0]] = f64::NAN;
        let result = AttributionEngine::default().attribute(&artifact, &matrix(with_nan));
        assert!(result.degraded);
        assert!(result.feature_names.is_empty());
    }

    #[test]
    fn test_width_mismatch_degrades() {
        let (x, y) = wide_data(20, 2);
        let artifact = linear_artifact(&x, &y);
        let result = AttributionEngine::default().attribute(&artifact, &matrix(array![[1.0, 2.0, 3.0]]));
        assert!(result.degraded);
    }
}
