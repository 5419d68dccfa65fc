//! Linear model implementations

use super::config::TaskType;
use super::models::{argmax, check_width, unique_classes, Model};
use crate::error::{MeovisError, Result};
use ndarray::{Array1, Array2, Axis};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::BTreeMap;

/// Solve the square system `a * w = b` by Gaussian elimination with partial
/// pivoting. Returns `None` when `a` is numerically singular.
fn solve_linear_system(a: &Array2<f64>, b: &Array1<f64>) -> Option<Array1<f64>> {
    let n = a.nrows();
    if n != a.ncols() || n != b.len() {
        return None;
    }

    let mut m = a.clone();
    let mut rhs = b.clone();
    let scale = m.iter().fold(0.0f64, |acc, v| acc.max(v.abs())).max(1.0);

    for col in 0..n {
        let pivot_row = (col..n)
            .max_by(|&i, &j| m[[i, col]].abs().total_cmp(&m[[j, col]].abs()))
            .unwrap_or(col);
        if m[[pivot_row, col]].abs() < 1e-12 * scale {
            return None;
        }
        if pivot_row != col {
            for j in 0..n {
                m.swap([col, j], [pivot_row, j]);
            }
            rhs.swap(col, pivot_row);
        }

        for row in col + 1..n {
            let factor = m[[row, col]] / m[[col, col]];
            if factor == 0.0 {
                continue;
            }
            for j in col..n {
                m[[row, j]] -= factor * m[[col, j]];
            }
            rhs[row] -= factor * rhs[col];
        }
    }

    let mut w = Array1::<f64>::zeros(n);
    for i in (0..n).rev() {
        let mut sum = rhs[i];
        for j in i + 1..n {
            sum -= m[[i, j]] * w[j];
        }
        w[i] = sum / m[[i, i]];
    }
    Some(w)
}

/// Fitted weights of a linear model
#[derive(Debug, Clone, Serialize, Deserialize)]
struct LinearWeights {
    coefficients: Array1<f64>,
    intercept: f64,
}

impl LinearWeights {
    fn decision(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        check_width(self.coefficients.len(), x)?;
        Ok(x.dot(&self.coefficients) + self.intercept)
    }
}

fn check_lengths(x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
    if x.nrows() != y.len() {
        return Err(MeovisError::Shape {
            expected: format!("y length = {}", x.nrows()),
            actual: format!("y length = {}", y.len()),
        });
    }
    if x.nrows() == 0 {
        return Err(MeovisError::Training("cannot fit on zero rows".to_string()));
    }
    Ok(())
}

/// Ordinary least squares (optionally ridge-regularized) regression
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinearRegression {
    /// Whether to fit intercept
    pub fit_intercept: bool,
    /// Regularization strength (L2)
    pub alpha: f64,
    weights: Option<LinearWeights>,
}

impl Default for LinearRegression {
    fn default() -> Self {
        Self::new()
    }
}

impl LinearRegression {
    /// Create a new linear regression model
    pub fn new() -> Self {
        Self {
            fit_intercept: true,
            alpha: 0.0,
            weights: None,
        }
    }

    /// Enable/disable fitting intercept
    pub fn with_fit_intercept(mut self, fit_intercept: bool) -> Self {
        self.fit_intercept = fit_intercept;
        self
    }

    /// Set regularization strength (Ridge regression)
    pub fn with_alpha(mut self, alpha: f64) -> Self {
        self.alpha = alpha;
        self
    }

    /// Fitted coefficients, if any
    pub fn coefficients(&self) -> Option<&Array1<f64>> {
        self.weights.as_ref().map(|w| &w.coefficients)
    }

    pub fn intercept(&self) -> Option<f64> {
        self.weights.as_ref().map(|w| w.intercept)
    }

    /// Fit via the normal equations `(XᵀX + αI) w = Xᵀy` on centered data
    pub fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<&mut Self> {
        check_lengths(x, y)?;
        let n_features = x.ncols();

        let (x_mean, y_mean) = if self.fit_intercept {
            let x_mean = x
                .mean_axis(Axis(0))
                .ok_or_else(|| MeovisError::Training("empty feature matrix".to_string()))?;
            (x_mean, y.mean().unwrap_or(0.0))
        } else {
            (Array1::zeros(n_features), 0.0)
        };
        let x_centered = x - &x_mean.view().insert_axis(Axis(0));
        let y_centered = y - y_mean;

        let mut xtx = x_centered.t().dot(&x_centered);
        for i in 0..n_features {
            xtx[[i, i]] += self.alpha;
        }
        let xty = x_centered.t().dot(&y_centered);

        let coefficients = match solve_linear_system(&xtx, &xty) {
            Some(w) => w,
            None => {
                // Collinear columns: retry with a tiny ridge term
                let ridge = 1e-8 * xtx.diag().iter().map(|v| v.abs()).sum::<f64>().max(1.0);
                for i in 0..n_features {
                    xtx[[i, i]] += ridge;
                }
                solve_linear_system(&xtx, &xty).ok_or_else(|| {
                    MeovisError::Training("normal equations are singular".to_string())
                })?
            }
        };

        let intercept = y_mean - coefficients.dot(&x_mean);
        self.weights = Some(LinearWeights {
            coefficients,
            intercept,
        });
        Ok(self)
    }
}

impl Model for LinearRegression {
    fn algorithm_name(&self) -> &'static str {
        "LinearRegression"
    }

    fn task_type(&self) -> TaskType {
        TaskType::Regression
    }

    fn n_features(&self) -> usize {
        self.weights.as_ref().map_or(0, |w| w.coefficients.len())
    }

    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        self.weights
            .as_ref()
            .ok_or(MeovisError::ModelNotFitted)?
            .decision(x)
    }

    fn parameters(&self) -> BTreeMap<String, serde_json::Value> {
        let mut params = BTreeMap::new();
        params.insert("fit_intercept".to_string(), json!(self.fit_intercept));
        params.insert("alpha".to_string(), json!(self.alpha));
        params
    }
}

/// Logistic regression for binary classification
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogisticRegression {
    /// Regularization strength (L2)
    pub alpha: f64,
    /// Maximum iterations
    pub max_iter: usize,
    /// Convergence tolerance
    pub tol: f64,
    /// Learning rate
    pub learning_rate: f64,
    weights: Option<LinearWeights>,
    classes: Vec<f64>,
}

impl Default for LogisticRegression {
    fn default() -> Self {
        Self::new()
    }
}

impl LogisticRegression {
    /// Create a new logistic regression model
    pub fn new() -> Self {
        Self {
            alpha: 0.01,
            max_iter: 1000,
            tol: 1e-6,
            learning_rate: 0.1,
            weights: None,
            classes: Vec::new(),
        }
    }

    /// Set regularization strength
    pub fn with_alpha(mut self, alpha: f64) -> Self {
        self.alpha = alpha;
        self
    }

    /// Set maximum iterations
    pub fn with_max_iter(mut self, max_iter: usize) -> Self {
        self.max_iter = max_iter;
        self
    }

    /// Set learning rate
    pub fn with_learning_rate(mut self, lr: f64) -> Self {
        self.learning_rate = lr;
        self
    }

    fn sigmoid(z: &Array1<f64>) -> Array1<f64> {
        z.mapv(|v| 1.0 / (1.0 + (-v).exp()))
    }

    /// Fit the model using batch gradient descent.
    ///
    /// The larger of the two labels is the positive class.
    pub fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<&mut Self> {
        check_lengths(x, y)?;
        let classes = unique_classes(y)?;
        if classes.len() != 2 {
            return Err(MeovisError::Training(format!(
                "LogisticRegression supports binary targets only, got {} classes",
                classes.len()
            )));
        }
        let positive = classes[1];
        let y01 = y.mapv(|v| if v == positive { 1.0 } else { 0.0 });

        let n_samples = x.nrows() as f64;
        let mut weights = Array1::<f64>::zeros(x.ncols());
        let mut bias = 0.0;

        for _ in 0..self.max_iter {
            let linear = x.dot(&weights) + bias;
            let errors = Self::sigmoid(&linear) - &y01;
            let dw = x.t().dot(&errors) / n_samples + self.alpha * &weights;
            let db = errors.mean().unwrap_or(0.0);

            let grad_norm = (dw.mapv(|v| v * v).sum() + db * db).sqrt();
            if grad_norm < self.tol {
                break;
            }

            weights.scaled_add(-self.learning_rate, &dw);
            bias -= self.learning_rate * db;
        }

        self.weights = Some(LinearWeights {
            coefficients: weights,
            intercept: bias,
        });
        self.classes = classes;
        Ok(self)
    }

    /// Log-odds of the positive class
    pub fn decision_function(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        self.weights
            .as_ref()
            .ok_or(MeovisError::ModelNotFitted)?
            .decision(x)
    }
}

impl Model for LogisticRegression {
    fn algorithm_name(&self) -> &'static str {
        "LogisticRegression"
    }

    fn task_type(&self) -> TaskType {
        TaskType::Classification
    }

    fn n_features(&self) -> usize {
        self.weights.as_ref().map_or(0, |w| w.coefficients.len())
    }

    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        let proba = self.predict_proba(x)?;
        Ok(proba
            .outer_iter()
            .map(|row| self.classes[argmax(row)])
            .collect())
    }

    fn supports_proba(&self) -> bool {
        true
    }

    fn predict_proba(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        let p = Self::sigmoid(&self.decision_function(x)?);
        let mut proba = Array2::<f64>::zeros((x.nrows(), 2));
        proba.column_mut(0).assign(&p.mapv(|v| 1.0 - v));
        proba.column_mut(1).assign(&p);
        Ok(proba)
    }

    fn classes(&self) -> Option<&[f64]> {
        Some(&self.classes)
    }

    fn parameters(&self) -> BTreeMap<String, serde_json::Value> {
        let mut params = BTreeMap::new();
        params.insert("alpha".to_string(), json!(self.alpha));
        params.insert("max_iter".to_string(), json!(self.max_iter));
        params.insert("tol".to_string(), json!(self.tol));
        params.insert("learning_rate".to_string(), json!(self.learning_rate));
        params
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_linear_regression_exact_fit() {
        let x = array![[1.0, 0.0], [2.0, 1.0], [3.0, 0.0], [4.0, 1.0], [5.0, 3.0]];
        let y = x.map_axis(Axis(1), |r| 2.0 * r[0] - 0.5 * r[1] + 1.0);

        let mut model = LinearRegression::new();
        model.fit(&x, &y).unwrap();

        let coef = model.coefficients().unwrap();
        assert!((coef[0] - 2.0).abs() < 1e-9);
        assert!((coef[1] + 0.5).abs() < 1e-9);
        assert!((model.intercept().unwrap() - 1.0).abs() < 1e-9);
        assert!(!model.supports_proba());
    }

    #[test]
    fn test_linear_regression_collinear_columns() {
        let x = array![[1.0, 2.0], [2.0, 4.0], [3.0, 6.0], [4.0, 8.0]];
        let y = array![1.0, 2.0, 3.0, 4.0];

        let mut model = LinearRegression::new();
        model.fit(&x, &y).unwrap();
        let pred = model.predict(&x).unwrap();
        for (p, t) in pred.iter().zip(y.iter()) {
            assert!((p - t).abs() < 1e-3);
        }
    }

    #[test]
    fn test_logistic_regression() {
        let x = array![[0.0], [0.5], [1.0], [1.5], [3.5], [4.0], [4.5], [5.0]];
        let y = array![0.0, 0.0, 0.0, 0.0, 1.0, 1.0, 1.0, 1.0];

        let mut model = LogisticRegression::new().with_learning_rate(0.5);
        model.fit(&x, &y).unwrap();

        assert_eq!(model.predict(&x).unwrap(), y);
        let proba = model.predict_proba(&x).unwrap();
        for row in proba.outer_iter() {
            assert!((row.sum() - 1.0).abs() < 1e-12);
        }
        assert!(proba[[7, 1]] > proba[[0, 1]]);
    }

    #[test]
    fn test_logistic_regression_rejects_multiclass() {
        let x = array![[0.0], [1.0], [2.0]];
        let y = array![0.0, 1.0, 2.0];
        let mut model = LogisticRegression::new();
        assert!(matches!(model.fit(&x, &y), Err(MeovisError::Training(_))));
    }

    #[test]
    fn test_unfitted_predict() {
        let model = LinearRegression::new();
        assert!(matches!(
            model.predict(&array![[1.0]]),
            Err(MeovisError::ModelNotFitted)
        ));
    }
}
