//! Error types for the Meovis analysis engine

use thiserror::Error;

/// Result type alias for Meovis operations
pub type Result<T> = std::result::Result<T, MeovisError>;

/// Main error type for the analysis engine.
///
/// Every variant here is fatal for the operation that raised it. Attribution
/// failures are not represented here: they are contained inside the
/// attribution engine and surface as a degraded `AttributionResult`.
#[derive(Error, Debug)]
pub enum MeovisError {
    #[error("Model load error: {0}")]
    ModelLoad(String),

    #[error("Dataset format error: {0}")]
    DatasetFormat(String),

    #[error("Target column not found: {0}")]
    TargetColumnNotFound(String),

    #[error("Length mismatch: y_true has {y_true} values, y_pred has {y_pred}")]
    LengthMismatch { y_true: usize, y_pred: usize },

    #[error("Unsupported task type: {0}")]
    UnsupportedTaskType(String),

    #[error("Prediction error: {0}")]
    Prediction(String),

    #[error("Training error: {0}")]
    Training(String),

    #[error("Model not fitted")]
    ModelNotFitted,

    #[error("Invalid shape: expected {expected}, got {actual}")]
    Shape { expected: String, actual: String },

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Analysis failed: {0}")]
    AnalysisFailed(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl MeovisError {
    /// Whether the caller can fix the request and retry
    pub fn is_caller_correctable(&self) -> bool {
        matches!(
            self,
            MeovisError::TargetColumnNotFound(_)
                | MeovisError::LengthMismatch { .. }
                | MeovisError::UnsupportedTaskType(_)
                | MeovisError::InvalidInput(_)
        )
    }
}

impl From<polars::error::PolarsError> for MeovisError {
    fn from(err: polars::error::PolarsError) -> Self {
        MeovisError::DatasetFormat(err.to_string())
    }
}

impl From<serde_json::Error> for MeovisError {
    fn from(err: serde_json::Error) -> Self {
        MeovisError::Serialization(err.to_string())
    }
}

impl From<bincode::Error> for MeovisError {
    fn from(err: bincode::Error) -> Self {
        MeovisError::Serialization(err.to_string())
    }
}

impl From<ndarray::ShapeError> for MeovisError {
    fn from(err: ndarray::ShapeError) -> Self {
        MeovisError::Shape {
            expected: "valid shape".to_string(),
            actual: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = MeovisError::LengthMismatch { y_true: 3, y_pred: 2 };
        assert_eq!(
            err.to_string(),
            "Length mismatch: y_true has 3 values, y_pred has 2"
        );
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: MeovisError = io_err.into();
        assert!(matches!(err, MeovisError::Io(_)));
    }

    #[test]
    fn test_caller_correctable() {
        assert!(MeovisError::TargetColumnNotFound("y".into()).is_caller_correctable());
        assert!(!MeovisError::ModelLoad("bad".into()).is_caller_correctable());
    }
}
