//! Caching of loaded model and dataset artifacts

mod artifact_cache;

pub use artifact_cache::{fingerprint, ArtifactCache, CacheStats};
