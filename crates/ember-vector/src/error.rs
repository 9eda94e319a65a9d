//! Error types for knowledge retrieval.

use ember_core::error::EmberError;

/// Errors from the retrieval engine and knowledge index.
#[derive(Debug, thiserror::Error)]
pub enum RetrievalError {
    /// The text encoder could not produce a vector for the input. Distinct
    /// from a low-confidence answer, which is not an error.
    #[error("embedding unavailable: {0}")]
    EmbeddingUnavailable(String),
    #[error("embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },
    #[error("knowledge base is empty")]
    EmptyKnowledgeBase,
    #[error("invalid knowledge base: {0}")]
    InvalidKnowledgeBase(String),
}

impl From<RetrievalError> for EmberError {
    fn from(err: RetrievalError) -> Self {
        match err {
            RetrievalError::EmbeddingUnavailable(msg) => EmberError::Embedding(msg),
            other => EmberError::Knowledge(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retrieval_error_display() {
        let err = RetrievalError::EmbeddingUnavailable("empty input".to_string());
        assert_eq!(err.to_string(), "embedding unavailable: empty input");

        let err = RetrievalError::DimensionMismatch {
            expected: 384,
            actual: 12,
        };
        assert_eq!(
            err.to_string(),
            "embedding dimension mismatch: expected 384, got 12"
        );

        assert_eq!(
            RetrievalError::EmptyKnowledgeBase.to_string(),
            "knowledge base is empty"
        );
    }

    #[test]
    fn test_into_ember_error() {
        let err: EmberError = RetrievalError::EmbeddingUnavailable("timeout".into()).into();
        assert!(matches!(err, EmberError::Embedding(_)));

        let err: EmberError = RetrievalError::EmptyKnowledgeBase.into();
        assert!(matches!(err, EmberError::Knowledge(_)));
        assert!(err.to_string().contains("knowledge base is empty"));
    }
}
