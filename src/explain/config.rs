//! Attribution budgets

use crate::error::{MeovisError, Result};
use serde::{Deserialize, Serialize};

/// Sampling and width budgets for one attribution run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AttributionConfig {
    /// Maximum number of explained rows
    pub sample_size_cap: usize,
    /// Maximum number of explained columns (the first ones are kept)
    pub feature_count_cap: usize,
    /// Seed for row sampling, background sampling and permutations
    pub random_seed: u64,
    /// Permutations per explained row for the sampling strategy
    pub n_permutations: usize,
    /// Background rows for the sampling strategy
    pub background_size: usize,
}

impl Default for AttributionConfig {
    fn default() -> Self {
        Self {
            sample_size_cap: 1000,
            feature_count_cap: 50,
            random_seed: 42,
            n_permutations: 8,
            background_size: 50,
        }
    }
}

impl AttributionConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_sample_size_cap(mut self, cap: usize) -> Self {
        self.sample_size_cap = cap;
        self
    }

    pub fn with_feature_count_cap(mut self, cap: usize) -> Self {
        self.feature_count_cap = cap;
        self
    }

    pub fn with_random_seed(mut self, seed: u64) -> Self {
        self.random_seed = seed;
        self
    }

    pub fn with_n_permutations(mut self, n: usize) -> Self {
        self.n_permutations = n;
        self
    }

    pub fn with_background_size(mut self, n: usize) -> Self {
        self.background_size = n;
        self
    }

    pub fn validate(&self) -> Result<()> {
        let zero = [
            ("sample_size_cap", self.sample_size_cap),
            ("feature_count_cap", self.feature_count_cap),
            ("n_permutations", self.n_permutations),
            ("background_size", self.background_size),
        ]
        .into_iter()
        .find(|(_, v)| *v == 0);

        match zero {
            Some((name, _)) => Err(MeovisError::Config(format!("{} must be positive", name))),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cfg = AttributionConfig::default();
        assert_eq!(cfg.sample_size_cap, 1000);
        assert_eq!(cfg.feature_count_cap, 50);
        assert_eq!(cfg.random_seed, 42);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn test_zero_cap_rejected() {
        let err = AttributionConfig::new().with_feature_count_cap(0).validate();
        assert!(matches!(err, Err(MeovisError::Config(msg)) if msg.contains("feature_count_cap")));
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let cfg: AttributionConfig = serde_json::from_str(r#"{"sample_size_cap": 10}"#).unwrap();
        assert_eq!(cfg.sample_size_cap, 10);
        assert_eq!(cfg.background_size, 50);
    }
}
