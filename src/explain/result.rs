//! Attribution output

use ndarray::Array2;
use serde::{Deserialize, Serialize};

/// Strategy chosen from the model capability
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttributionStrategy {
    /// Exact path-dependent TreeSHAP
    TreeShap,
    /// Permutation sampling against a background sample
    PermutationSampling,
}

/// Attribution values: `[row][feature]`, or `[class][row][feature]`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttributionValues {
    Single(Vec<Vec<f64>>),
    PerClass(Vec<Vec<Vec<f64>>>),
}

impl AttributionValues {
    pub(crate) fn from_matrices(matrices: &[Array2<f64>], per_class: bool) -> Self {
        let to_rows = |m: &Array2<f64>| m.rows().into_iter().map(|r| r.to_vec()).collect::<Vec<_>>();
        if per_class {
            AttributionValues::PerClass(matrices.iter().map(to_rows).collect())
        } else {
            AttributionValues::Single(matrices.first().map(to_rows).unwrap_or_default())
        }
    }

    pub fn n_outputs(&self) -> usize {
        match self {
            AttributionValues::Single(_) => 1,
            AttributionValues::PerClass(v) => v.len(),
        }
    }

    /// Matrix of one output (class index for per-class values)
    pub fn output(&self, k: usize) -> Option<&[Vec<f64>]> {
        match self {
            AttributionValues::Single(v) if k == 0 => Some(v),
            AttributionValues::Single(_) => None,
            AttributionValues::PerClass(v) => v.get(k).map(|m| m.as_slice()),
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            AttributionValues::Single(v) => v.is_empty(),
            AttributionValues::PerClass(v) => v.is_empty(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ExpectedValue {
    Scalar(f64),
    PerClass(Vec<f64>),
}

impl ExpectedValue {
    pub fn get(&self, k: usize) -> Option<f64> {
        match self {
            ExpectedValue::Scalar(v) if k == 0 => Some(*v),
            ExpectedValue::Scalar(_) => None,
            ExpectedValue::PerClass(v) => v.get(k).copied(),
        }
    }
}

/// Mean absolute attribution of one feature over the explained rows
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureImportance {
    pub feature: String,
    pub mean_abs_attribution: f64,
}

/// Per-feature attributions of a sampled, width-capped batch.
///
/// A degraded result has empty arrays and carries the failure in
/// `error_detail`; predictions and metrics of the analysis are unaffected.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttributionResult {
    /// Retained columns, in column order
    pub feature_names: Vec<String>,
    /// Explained rows restricted to the retained columns
    pub feature_values: Vec<Vec<f64>>,
    pub attribution_values: AttributionValues,
    pub expected_value: Option<ExpectedValue>,
    /// Class labels of per-class values
    pub output_labels: Option<Vec<String>>,
    pub sample_size_used: usize,
    pub features_used: usize,
    pub strategy: Option<AttributionStrategy>,
    /// Features ranked by mean |attribution| (averaged over classes)
    pub global_importance: Vec<FeatureImportance>,
    pub degraded: bool,
    pub error_detail: Option<String>,
}

impl AttributionResult {
    pub(crate) fn degraded(detail: impl Into<String>, strategy: Option<AttributionStrategy>) -> Self {
        Self {
            feature_names: Vec::new(),
            feature_values: Vec::new(),
            attribution_values: AttributionValues::Single(Vec::new()),
            expected_value: None,
            output_labels: None,
            sample_size_used: 0,
            features_used: 0,
            strategy,
            global_importance: Vec::new(),
            degraded: true,
            error_detail: Some(detail.into()),
        }
    }

    pub fn is_degraded(&self) -> bool {
        self.degraded
    }

    /// Top `k` features by mean |attribution|
    pub fn top_features(&self, k: usize) -> &[FeatureImportance] {
        &self.global_importance[..k.min(self.global_importance.len())]
    }
}

/// Mean |phi| per column, averaged over outputs, sorted descending
pub(crate) fn rank_importance(names: &[String], matrices: &[Array2<f64>]) -> Vec<FeatureImportance> {
    let n_outputs = matrices.len().max(1) as f64;
    let mut ranked: Vec<FeatureImportance> = names
        .iter()
        .enumerate()
        .map(|(j, name)| {
            let total: f64 = matrices
                .iter()
                .map(|m| {
                    let col = m.column(j);
                    if col.is_empty() {
                        0.0
                    } else {
                        col.iter().map(|v| v.abs()).sum::<f64>() / col.len() as f64
                    }
                })
                .sum();
            FeatureImportance {
                feature: name.clone(),
                mean_abs_attribution: total / n_outputs,
            }
        })
        .collect();
    ranked.sort_by(|a, b| b.mean_abs_attribution.total_cmp(&a.mean_abs_attribution));
    ranked
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_rank_importance() {
        let names = vec!["a".to_string(), "b".to_string()];
        let m = array![[0.5, -2.0], [1.5, 1.0]];
        let ranked = rank_importance(&names, &[m]);
        assert_eq!(ranked[0].feature, "b");
        assert!((ranked[0].mean_abs_attribution - 1.5).abs() < 1e-12);
        assert!((ranked[1].mean_abs_attribution - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_untagged_serialization() {
        let single = AttributionValues::from_matrices(&[array![[1.0, 2.0]]], false);
        assert_eq!(serde_json::to_string(&single).unwrap(), "[[1.0,2.0]]");
        let per_class = AttributionValues::from_matrices(&[array![[1.0]], array![[-1.0]]], true);
        assert_eq!(per_class.n_outputs(), 2);
        assert_eq!(per_class.output(1), Some(&[vec![-1.0]][..]));
        assert_eq!(
            serde_json::to_string(&ExpectedValue::Scalar(0.5)).unwrap(),
            "0.5"
        );
    }

    #[test]
    fn test_degraded_is_empty() {
        let r = AttributionResult::degraded("boom", None);
        assert!(r.is_degraded());
        assert!(r.attribution_values.is_empty());
        assert_eq!(r.features_used, 0);
        assert_eq!(r.error_detail.as_deref(), Some("boom"));
    }
}
