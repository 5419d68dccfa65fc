//! Engine configuration
//!
//! Defaults can be overridden from `MEOVIS_*` environment variables or a
//! JSON file.

use crate::dataset::DatasetFormat;
use crate::error::{MeovisError, Result};
use crate::explain::AttributionConfig;
use crate::model::ArtifactFormat;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use tracing::warn;

/// Limits of the analysis service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// Analyses running at once on the blocking pool
    pub max_concurrent_analyses: usize,
    /// Wall-clock budget of the attribution step
    pub attribution_timeout_secs: u64,
    /// Cached models and datasets (each)
    pub cache_capacity: usize,
    pub cache_ttl_secs: u64,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            max_concurrent_analyses: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(4),
            attribution_timeout_secs: 120,
            cache_capacity: 16,
            cache_ttl_secs: 600,
        }
    }
}

impl ServiceConfig {
    pub fn attribution_timeout(&self) -> Duration {
        Duration::from_secs(self.attribution_timeout_secs)
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }
}

/// Top-level configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub attribution: AttributionConfig,
    pub service: ServiceConfig,
    /// Accepted model file extensions
    pub model_extensions: Vec<String>,
    /// Accepted dataset file extensions
    pub dataset_extensions: Vec<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            attribution: AttributionConfig::default(),
            service: ServiceConfig::default(),
            model_extensions: ArtifactFormat::EXTENSIONS.iter().map(|s| s.to_string()).collect(),
            dataset_extensions: DatasetFormat::EXTENSIONS.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl EngineConfig {
    /// Defaults overridden by `MEOVIS_*` environment variables
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env();
        config
    }

    /// Read a JSON config file; missing fields keep their defaults
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| MeovisError::Config(format!("{}: {}", path.display(), e)))?;
        let config: Self = serde_json::from_str(&text)
            .map_err(|e| MeovisError::Config(format!("{}: {}", path.display(), e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn apply_env(&mut self) {
        let a = &mut self.attribution;
        a.sample_size_cap = env_or("MEOVIS_SHAP_SAMPLE_SIZE", a.sample_size_cap);
        a.feature_count_cap = env_or("MEOVIS_MAX_FEATURES_FOR_SHAP", a.feature_count_cap);
        a.random_seed = env_or("MEOVIS_RANDOM_SEED", a.random_seed);

        let s = &mut self.service;
        s.max_concurrent_analyses = env_or("MEOVIS_MAX_CONCURRENT_ANALYSES", s.max_concurrent_analyses);
        s.attribution_timeout_secs = env_or("MEOVIS_ATTRIBUTION_TIMEOUT_SECS", s.attribution_timeout_secs);
        s.cache_capacity = env_or("MEOVIS_CACHE_CAPACITY", s.cache_capacity);
        s.cache_ttl_secs = env_or("MEOVIS_CACHE_TTL_SECS", s.cache_ttl_secs);
    }

    pub fn with_attribution(mut self, attribution: AttributionConfig) -> Self {
        self.attribution = attribution;
        self
    }

    pub fn with_service(mut self, service: ServiceConfig) -> Self {
        self.service = service;
        self
    }

    pub fn with_max_concurrent_analyses(mut self, n: usize) -> Self {
        self.service.max_concurrent_analyses = n;
        self
    }

    pub fn with_attribution_timeout(mut self, timeout: Duration) -> Self {
        self.service.attribution_timeout_secs = timeout.as_secs();
        self
    }

    pub fn validate(&self) -> Result<()> {
        self.attribution.validate()?;
        if self.service.max_concurrent_analyses == 0 {
            return Err(MeovisError::Config(
                "max_concurrent_analyses must be positive".to_string(),
            ));
        }
        check_extensions("model", &self.model_extensions, &ArtifactFormat::EXTENSIONS)?;
        check_extensions("dataset", &self.dataset_extensions, &DatasetFormat::EXTENSIONS)?;
        Ok(())
    }

    /// Whether `path` has an accepted model extension
    pub fn accepts_model(&self, path: &Path) -> bool {
        has_extension(path, &self.model_extensions)
    }

    /// Whether `path` has an accepted dataset extension
    pub fn accepts_dataset(&self, path: &Path) -> bool {
        has_extension(path, &self.dataset_extensions)
    }
}

fn env_or<T: FromStr>(name: &str, default: T) -> T {
    match std::env::var(name) {
        Ok(raw) => raw.trim().parse().unwrap_or_else(|_| {
            warn!(variable = name, value = %raw, "Ignoring unparsable environment override");
            default
        }),
        Err(_) => default,
    }
}

fn check_extensions(kind: &str, configured: &[String], supported: &[&str]) -> Result<()> {
    if configured.is_empty() {
        return Err(MeovisError::Config(format!("no {} extensions configured", kind)));
    }
    match configured
        .iter()
        .find(|ext| !supported.contains(&ext.to_ascii_lowercase().as_str()))
    {
        Some(ext) => Err(MeovisError::Config(format!(
            "unsupported {} extension '{}'",
            kind, ext
        ))),
        None => Ok(()),
    }
}

fn has_extension(path: &Path, allowed: &[String]) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| allowed.iter().any(|a| a.eq_ignore_ascii_case(e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_is_valid() {
        let config = EngineConfig::default();
        assert!(config.validate().is_ok());
        assert!(config.accepts_model(Path::new("m.JSON")));
        assert!(!config.accepts_model(Path::new("m.pkl")));
        assert!(config.accepts_dataset(Path::new("d.csv")));
    }

    #[test]
    fn test_env_overrides() {
        std::env::set_var("MEOVIS_SHAP_SAMPLE_SIZE", "250");
        std::env::set_var("MEOVIS_CACHE_TTL_SECS", "not-a-number");
        let config = EngineConfig::from_env();
        std::env::remove_var("MEOVIS_SHAP_SAMPLE_SIZE");
        std::env::remove_var("MEOVIS_CACHE_TTL_SECS");

        assert_eq!(config.attribution.sample_size_cap, 250);
        assert_eq!(config.service.cache_ttl_secs, 600);
    }

    #[test]
    fn test_load_partial_file() {
        let mut file = tempfile::Builder::new().suffix(".json").tempfile().unwrap();
        write!(file, r#"{{"attribution": {{"feature_count_cap": 5}}, "service": {{"max_concurrent_analyses": 2}}}}"#).unwrap();
        let config = EngineConfig::load(file.path()).unwrap();
        assert_eq!(config.attribution.feature_count_cap, 5);
        assert_eq!(config.attribution.sample_size_cap, 1000);
        assert_eq!(config.service.max_concurrent_analyses, 2);
    }

    #[test]
    fn test_invalid_configs() {
        let config = EngineConfig::default().with_max_concurrent_analyses(0);
        assert!(matches!(config.validate(), Err(MeovisError::Config(_))));

        let mut config = EngineConfig::default();
        config.model_extensions = vec!["pkl".into()];
        assert!(config.validate().is_err());
    }
}
