//! Regression metrics

use crate::error::{MeovisError, Result};
use serde::{Deserialize, Deserializer, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegressionMetrics {
    /// Mean squared error
    pub mse: f64,
    /// `sqrt(mse)`
    pub rmse: f64,
    /// Mean absolute error
    pub mae: f64,
    /// Coefficient of determination. 1.0 / 0.0 for a constant truth
    /// (perfect / imperfect predictions), NaN below two samples.
    /// JSON carries NaN as `null`.
    #[serde(deserialize_with = "nan_from_null")]
    pub r2: f64,
}

fn nan_from_null<'de, D>(deserializer: D) -> std::result::Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<f64>::deserialize(deserializer)?.unwrap_or(f64::NAN))
}

/// Compute regression metrics. Lengths must already match.
pub fn regression_metrics(y_true: &[f64], y_pred: &[f64]) -> Result<RegressionMetrics> {
    if y_true.iter().chain(y_pred).any(|v| !v.is_finite()) {
        return Err(MeovisError::InvalidInput(
            "regression targets and predictions must be finite".to_string(),
        ));
    }

    let n = y_true.len() as f64;
    let (ss_res, abs_sum) = y_true
        .iter()
        .zip(y_pred)
        .fold((0.0, 0.0), |(sq, ab), (t, p)| {
            let e = t - p;
            (sq + e * e, ab + e.abs())
        });

    let mse = ss_res / n;
    let mae = abs_sum / n;

    let r2 = if y_true.len() < 2 {
        f64::NAN
    } else {
        let mean = y_true.iter().sum::<f64>() / n;
        let ss_tot: f64 = y_true.iter().map(|t| (t - mean).powi(2)).sum();
        if ss_tot == 0.0 {
            if ss_res == 0.0 {
                1.0
            } else {
                0.0
            }
        } else {
            1.0 - ss_res / ss_tot
        }
    };

    Ok(RegressionMetrics {
        mse,
        rmse: mse.sqrt(),
        mae,
        r2,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constant_offset() {
        let m = regression_metrics(&[1.0, 2.0, 3.0, 4.0], &[1.1, 2.1, 3.1, 4.1]).unwrap();
        assert!((m.mae - 0.1).abs() < 1e-9);
        assert!((m.mse - 0.01).abs() < 1e-9);
        assert_eq!(m.rmse, m.mse.sqrt());
        assert!((m.r2 - (1.0 - 0.04 / 5.0)).abs() < 1e-9);
    }

    #[test]
    fn test_constant_truth() {
        assert_eq!(regression_metrics(&[2.0, 2.0], &[2.0, 2.0]).unwrap().r2, 1.0);
        assert_eq!(regression_metrics(&[2.0, 2.0], &[2.0, 3.0]).unwrap().r2, 0.0);
    }

    #[test]
    fn test_single_sample_r2_is_nan() {
        let m = regression_metrics(&[1.0], &[0.5]).unwrap();
        assert!(m.r2.is_nan());
        assert!((m.mae - 0.5).abs() < 1e-12);
    }
}
