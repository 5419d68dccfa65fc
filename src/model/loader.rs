//! Model artifact serialization
//!
//! Two on-disk formats are supported, chosen by file extension:
//! - `.json`: a JSON envelope `{magic, format_version, metadata, model}`
//! - `.bin`: a bincode envelope carrying magic bytes, a format version and
//!   an xxh3 checksum of the encoded estimator
//!
//! Any other extension is rejected as a model load error.

use super::artifact::{ModelArtifact, ModelMetadata};
use crate::error::{MeovisError, Result};
use crate::training::TrainedModel;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;
use tracing::{debug, info};
use xxhash_rust::xxh3::xxh3_64;

/// Magic bytes for Meovis model files
const MAGIC: [u8; 4] = *b"MEOV";
/// Current format version
const FORMAT_VERSION: u32 = 1;

/// Serialization format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ArtifactFormat {
    /// Portable, human-readable
    Json,
    /// Compact bincode envelope
    Binary,
}

impl ArtifactFormat {
    /// Supported model file extensions
    pub const EXTENSIONS: [&'static str; 2] = ["json", "bin"];

    /// Resolve the format from a path's extension
    pub fn from_path(path: &Path) -> Result<Self> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .unwrap_or_default();
        match ext.as_str() {
            "json" => Ok(ArtifactFormat::Json),
            "bin" => Ok(ArtifactFormat::Binary),
            other => Err(MeovisError::ModelLoad(format!(
                "unsupported model format '.{}' (expected one of: .json, .bin)",
                other
            ))),
        }
    }
}

#[derive(Serialize, Deserialize)]
struct JsonEnvelope {
    magic: String,
    format_version: u32,
    metadata: ModelMetadata,
    model: TrainedModel,
}

#[derive(Serialize, Deserialize)]
struct BinaryEnvelope {
    magic: [u8; 4],
    format_version: u32,
    metadata: ModelMetadata,
    model_data: Vec<u8>,
    checksum: u64,
}

/// Loads and saves model artifacts
#[derive(Debug, Clone, Copy, Default)]
pub struct ModelLoader;

impl ModelLoader {
    /// Deserialize an artifact and derive its capability descriptor.
    ///
    /// Every failure (missing file, unknown extension, corrupt payload,
    /// unfitted estimator) is reported as `MeovisError::ModelLoad`.
    pub fn load(path: impl AsRef<Path>) -> Result<ModelArtifact> {
        let path = path.as_ref();
        let format = ArtifactFormat::from_path(path)?;

        let mut bytes = Vec::new();
        File::open(path)
            .and_then(|f| BufReader::new(f).read_to_end(&mut bytes))
            .map_err(|e| MeovisError::ModelLoad(format!("{}: {}", path.display(), e)))?;

        let (metadata, model) = match format {
            ArtifactFormat::Json => Self::decode_json(&bytes),
            ArtifactFormat::Binary => Self::decode_binary(&bytes),
        }
        .map_err(|e| match e {
            MeovisError::ModelLoad(msg) => MeovisError::ModelLoad(format!("{}: {}", path.display(), msg)),
            other => MeovisError::ModelLoad(format!("{}: {}", path.display(), other)),
        })?;

        if model.as_model().n_features() == 0 {
            return Err(MeovisError::ModelLoad(format!(
                "{}: artifact contains an unfitted estimator",
                path.display()
            )));
        }

        let artifact = ModelArtifact::new(model, metadata).with_source(path);
        info!(
            path = %path.display(),
            algorithm = %artifact.capability().algorithm_name,
            capability = %artifact.capability().capability,
            "Model loaded"
        );
        Ok(artifact)
    }

    /// Serialize a fitted model; the format follows the file extension
    pub fn save(model: &TrainedModel, metadata: &ModelMetadata, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let format = ArtifactFormat::from_path(path)?;

        let bytes = match format {
            ArtifactFormat::Json => {
                let envelope = JsonEnvelope {
                    magic: String::from_utf8_lossy(&MAGIC).into_owned(),
                    format_version: FORMAT_VERSION,
                    metadata: metadata.clone(),
                    model: model.clone(),
                };
                serde_json::to_vec_pretty(&envelope)?
            }
            ArtifactFormat::Binary => {
                let model_data = bincode::serialize(model)?;
                let envelope = BinaryEnvelope {
                    magic: MAGIC,
                    format_version: FORMAT_VERSION,
                    metadata: metadata.clone(),
                    checksum: xxh3_64(&model_data),
                    model_data,
                };
                bincode::serialize(&envelope)?
            }
        };

        let mut writer = BufWriter::new(File::create(path)?);
        writer.write_all(&bytes)?;
        writer.flush()?;
        debug!(path = %path.display(), bytes = bytes.len(), "Model saved");
        Ok(())
    }

    fn decode_json(bytes: &[u8]) -> Result<(ModelMetadata, TrainedModel)> {
        let envelope: JsonEnvelope = serde_json::from_slice(bytes)?;
        if envelope.magic.as_bytes() != MAGIC {
            return Err(MeovisError::ModelLoad("not a Meovis model file".to_string()));
        }
        Self::check_version(envelope.format_version)?;
        Ok((envelope.metadata, envelope.model))
    }

    fn decode_binary(bytes: &[u8]) -> Result<(ModelMetadata, TrainedModel)> {
        if bytes.len() < MAGIC.len() || bytes[..MAGIC.len()] != MAGIC {
            return Err(MeovisError::ModelLoad("not a Meovis model file".to_string()));
        }
        let envelope: BinaryEnvelope = bincode::deserialize(bytes)?;
        Self::check_version(envelope.format_version)?;
        if xxh3_64(&envelope.model_data) != envelope.checksum {
            return Err(MeovisError::ModelLoad("checksum mismatch".to_string()));
        }
        let model: TrainedModel = bincode::deserialize(&envelope.model_data)?;
        Ok((envelope.metadata, model))
    }

    fn check_version(version: u32) -> Result<()> {
        if version > FORMAT_VERSION {
            return Err(MeovisError::ModelLoad(format!(
                "format version {} is newer than supported version {}",
                version, FORMAT_VERSION
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Capability;
    use crate::training::{GaussianNaiveBayes, RandomForest};
    use ndarray::array;
    use tempfile::tempdir;

    fn forest() -> TrainedModel {
        let x = array![[0.0, 1.0], [1.0, 1.0], [2.0, 0.0], [3.0, 0.0]];
        let y = array![0.0, 0.0, 1.0, 1.0];
        let mut rf = RandomForest::new_classifier(3).with_random_state(1);
        rf.fit(&x, &y).unwrap();
        TrainedModel::RandomForest(rf)
    }

    #[test]
    fn test_save_load_both_formats() {
        let dir = tempdir().unwrap();
        let model = forest();
        let metadata = ModelMetadata::new("rf").with_features(vec!["a".into(), "b".into()]);
        let x = array![[0.5, 1.0], [2.5, 0.0]];
        let expected = model.as_model().predict_proba(&x).unwrap();

        for file in ["model.json", "model.bin"] {
            let path = dir.path().join(file);
            ModelLoader::save(&model, &metadata, &path).unwrap();
            let artifact = ModelLoader::load(&path).unwrap();
            assert_eq!(artifact.capability().capability, Capability::TreeCapable);
            assert_eq!(artifact.feature_names(), vec!["a", "b"]);
            assert_eq!(artifact.source(), Some(path.as_path()));
            let proba = artifact.model().predict_proba(&x).unwrap();
            for (a, b) in proba.iter().zip(expected.iter()) {
                assert!((a - b).abs() < 1e-12);
            }
        }
    }

    #[test]
    fn test_unsupported_extension() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("model.pkl");
        std::fs::write(&path, b"whatever").unwrap();
        let err = ModelLoader::load(&path).unwrap_err();
        assert!(matches!(err, MeovisError::ModelLoad(msg) if msg.contains(".pkl")));
    }

    #[test]
    fn test_corrupt_binary_is_load_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("model.bin");
        let mut nb = GaussianNaiveBayes::new();
        nb.fit(&array![[0.0], [1.0]], &array![0.0, 1.0]).unwrap();
        ModelLoader::save(&TrainedModel::GaussianNaiveBayes(nb), &ModelMetadata::default(), &path).unwrap();

        let mut bytes = std::fs::read(&path).unwrap();
        let last = bytes.len() - 1;
        bytes[last] ^= 0xFF;
        std::fs::write(&path, &bytes).unwrap();

        assert!(matches!(ModelLoader::load(&path), Err(MeovisError::ModelLoad(_))));
    }

    #[test]
    fn test_garbage_json_is_load_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("model.json");
        std::fs::write(&path, b"{\"not\": \"a model\"}").unwrap();
        assert!(matches!(ModelLoader::load(&path), Err(MeovisError::ModelLoad(_))));
    }

    #[test]
    fn test_missing_file_is_load_error() {
        let err = ModelLoader::load("/definitely/not/here.json").unwrap_err();
        assert!(matches!(err, MeovisError::ModelLoad(_)));
    }
}
