//! Error types for fluid-infer.

use std::path::PathBuf;
use thiserror::Error;

use crate::tensor::DataType;

/// Result type alias for fluid-infer operations.
pub type Result<T> = std::result::Result<T, InferError>;

/// Errors that can occur while creating or running a session.
#[derive(Debug, Error)]
pub enum InferError {
    /// Neither (or both) program location modes are configured.
    #[error("Configuration error: {0}")]
    Config(String),

    /// The engine failed to load the program or its parameters.
    #[error("Model loading failed: {0}")]
    ModelLoad(String),

    /// Number of inputs does not match the program's feed targets.
    #[error("Wrong feed input size: expected {expected}, got {actual}")]
    FeedCount { expected: usize, actual: usize },

    /// Input element type the feed path cannot allocate.
    #[error("Unsupported feed type: {0}")]
    UnsupportedFeedType(DataType),

    /// Output element type the fetch path cannot convert.
    #[error("Unsupported fetch type: {0} (only float32 can be fetched)")]
    UnsupportedFetchType(DataType),

    /// Invalid tensor.
    #[error("Invalid tensor: {0}")]
    Tensor(String),

    /// Malformed or unsupported level-of-detail index.
    #[error("Invalid LoD: {0}")]
    Lod(String),

    /// The execution engine reported a failure.
    #[error("Engine error: {0}")]
    Engine(String),

    /// Global flags were already initialized with different values.
    #[error("Global flags already initialized with {existing:?}, refusing {requested:?}")]
    FlagConflict {
        existing: Vec<String>,
        requested: Vec<String>,
    },

    /// YAML parsing error.
    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// JSON parsing error.
    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// File not found.
    #[error("File not found: {}", .0.display())]
    FileNotFound(PathBuf),
}

impl InferError {
    /// Create a configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a model load error.
    pub fn model_load(msg: impl Into<String>) -> Self {
        Self::ModelLoad(msg.into())
    }

    /// Create a tensor error.
    pub fn tensor(msg: impl Into<String>) -> Self {
        Self::Tensor(msg.into())
    }

    /// Create a LoD error.
    pub fn lod(msg: impl Into<String>) -> Self {
        Self::Lod(msg.into())
    }

    /// Create an engine error.
    pub fn engine(msg: impl Into<String>) -> Self {
        Self::Engine(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = InferError::model_load("failed to load");
        assert_eq!(format!("{}", err), "Model loading failed: failed to load");

        let err = InferError::FeedCount {
            expected: 2,
            actual: 3,
        };
        assert_eq!(
            format!("{}", err),
            "Wrong feed input size: expected 2, got 3"
        );

        let err = InferError::UnsupportedFeedType(DataType::Float64);
        assert_eq!(format!("{}", err), "Unsupported feed type: float64");

        let err = InferError::FileNotFound(PathBuf::from("/models/mobilenet/__model__"));
        assert_eq!(
            format!("{}", err),
            "File not found: /models/mobilenet/__model__"
        );
    }
}
