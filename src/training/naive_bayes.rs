//! Naive Bayes classifiers
//!
//! Implements Gaussian Naive Bayes for continuous features.

use ndarray::{Array1, Array2, Axis};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::BTreeMap;
use std::f64::consts::PI;

use super::config::TaskType;
use super::models::{argmax, check_width, unique_classes, Model};
use crate::error::{MeovisError, Result};

/// Gaussian Naive Bayes Classifier
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GaussianNaiveBayes {
    /// Per-class feature means, shape (n_classes, n_features)
    means: Array2<f64>,
    /// Per-class feature variances, shape (n_classes, n_features)
    variances: Array2<f64>,
    /// Prior probability of each class
    priors: Array1<f64>,
    /// Sorted class labels
    classes: Vec<f64>,
    /// Portion of the largest feature variance added to every variance
    pub var_smoothing: f64,
}

impl Default for GaussianNaiveBayes {
    fn default() -> Self {
        Self::new()
    }
}

impl GaussianNaiveBayes {
    pub fn new() -> Self {
        Self {
            means: Array2::zeros((0, 0)),
            variances: Array2::zeros((0, 0)),
            priors: Array1::zeros(0),
            classes: Vec::new(),
            var_smoothing: 1e-9,
        }
    }

    /// Set variance smoothing parameter
    pub fn with_var_smoothing(mut self, smoothing: f64) -> Self {
        self.var_smoothing = smoothing;
        self
    }

    /// Fit the classifier
    pub fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        let n_samples = x.nrows();
        let n_features = x.ncols();
        if n_samples != y.len() {
            return Err(MeovisError::Shape {
                expected: format!("y length = {}", n_samples),
                actual: format!("y length = {}", y.len()),
            });
        }
        if n_samples == 0 {
            return Err(MeovisError::Training("cannot fit on zero rows".to_string()));
        }

        let classes = unique_classes(y)?;
        let n_classes = classes.len();
        let max_var = x
            .var_axis(Axis(0), 0.0)
            .iter()
            .fold(0.0f64, |acc, v| acc.max(*v));
        // Constant inputs still need a positive variance
        let epsilon = (self.var_smoothing * max_var).max(1e-12);

        let mut means = Array2::<f64>::zeros((n_classes, n_features));
        let mut variances = Array2::<f64>::zeros((n_classes, n_features));
        let mut priors = Array1::<f64>::zeros(n_classes);

        for (c, &label) in classes.iter().enumerate() {
            let rows: Vec<usize> = y
                .iter()
                .enumerate()
                .filter(|(_, &v)| v == label)
                .map(|(i, _)| i)
                .collect();
            let x_class = x.select(Axis(0), &rows);

            let mean = x_class.mean_axis(Axis(0)).unwrap_or_else(|| Array1::zeros(n_features));
            let var = x_class.var_axis(Axis(0), 0.0) + epsilon;

            means.row_mut(c).assign(&mean);
            variances.row_mut(c).assign(&var);
            priors[c] = rows.len() as f64 / n_samples as f64;
        }

        self.means = means;
        self.variances = variances;
        self.priors = priors;
        self.classes = classes;
        Ok(())
    }

    /// Predict normalized log probabilities
    pub fn predict_log_proba(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        if self.classes.is_empty() {
            return Err(MeovisError::ModelNotFitted);
        }
        check_width(self.means.ncols(), x)?;

        let mut log_probs = Array2::<f64>::zeros((x.nrows(), self.classes.len()));
        for (i, row) in x.outer_iter().enumerate() {
            for c in 0..self.classes.len() {
                let log_likelihood: f64 = row
                    .iter()
                    .zip(self.means.row(c).iter())
                    .zip(self.variances.row(c).iter())
                    .map(|((&xi, &mean), &var)| {
                        -0.5 * ((xi - mean).powi(2) / var + var.ln() + (2.0 * PI).ln())
                    })
                    .sum();
                log_probs[[i, c]] = self.priors[c].ln() + log_likelihood;
            }
        }

        // log-sum-exp normalization
        for mut row in log_probs.rows_mut() {
            let max_val = row.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
            let log_sum = row.iter().map(|&v| (v - max_val).exp()).sum::<f64>().ln();
            row.mapv_inplace(|v| v - max_val - log_sum);
        }

        Ok(log_probs)
    }

    /// Get class priors
    pub fn class_priors(&self) -> &Array1<f64> {
        &self.priors
    }
}

impl Model for GaussianNaiveBayes {
    fn algorithm_name(&self) -> &'static str {
        "GaussianNB"
    }

    fn task_type(&self) -> TaskType {
        TaskType::Classification
    }

    fn n_features(&self) -> usize {
        self.means.ncols()
    }

    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        let log_probs = self.predict_log_proba(x)?;
        Ok(log_probs
            .outer_iter()
            .map(|row| self.classes[argmax(row)])
            .collect())
    }

    fn supports_proba(&self) -> bool {
        true
    }

    fn predict_proba(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        Ok(self.predict_log_proba(x)?.mapv(f64::exp))
    }

    fn classes(&self) -> Option<&[f64]> {
        Some(&self.classes)
    }

    fn parameters(&self) -> BTreeMap<String, serde_json::Value> {
        let mut params = BTreeMap::new();
        params.insert("var_smoothing".to_string(), json!(self.var_smoothing));
        params
    }
}
