//! Error types for the optimizer crate.

use std::path::PathBuf;

use metagente_llm::LlmError;
use thiserror::Error;

use crate::types::AgentRole;

/// Result type alias using the optimizer error type.
pub type Result<T> = std::result::Result<T, OptimizerError>;

/// Error type for optimizer operations.
#[derive(Debug, Error)]
pub enum OptimizerError {
    /// A model call for one role failed. Ends the current example only.
    #[error("{role} generation failed: {source}")]
    Generation {
        role: AgentRole,
        #[source]
        source: LlmError,
    },

    /// The dataset could not be read or is missing required columns.
    #[error("Dataset error: {0}")]
    Dataset(String),

    /// An output file could not be written.
    #[error("Failed to write {}: {source}", path.display())]
    Artifact {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Combining the winner list failed. Fatal for the whole pass.
    #[error("Aggregation failed: {0}")]
    Aggregation(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// CSV encoding or decoding error.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl OptimizerError {
    /// Create a generation error for a role.
    pub fn generation(role: AgentRole, source: LlmError) -> Self {
        Self::Generation { role, source }
    }

    /// Create a dataset error.
    pub fn dataset(msg: impl Into<String>) -> Self {
        Self::Dataset(msg.into())
    }

    /// Create an artifact error.
    pub fn artifact(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Artifact {
            path: path.into(),
            source,
        }
    }

    /// Create an internal error.
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Whether the failure came from the provider's content filter.
    pub fn is_content_filter(&self) -> bool {
        matches!(self, Self::Generation { source, .. } if source.is_content_filter())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generation_display() {
        let err = OptimizerError::generation(
            AgentRole::Teacher,
            LlmError::Network("connection reset".into()),
        );
        let text = err.to_string();
        assert!(text.starts_with("Teacher generation failed"));
        assert!(text.contains("connection reset"));
        assert!(!err.is_content_filter());
    }

    #[test]
    fn test_content_filter_detection() {
        let err = OptimizerError::generation(
            AgentRole::Summarizer,
            LlmError::ContentFilter("flagged".into()),
        );
        assert!(err.is_content_filter());
    }

    #[test]
    fn test_artifact_display() {
        let err = OptimizerError::artifact(
            "/tmp/out/results.csv",
            std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        );
        assert!(err.to_string().contains("/tmp/out/results.csv"));
    }
}
