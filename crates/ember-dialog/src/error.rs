//! Error types for the dialogue engine.

use ember_core::error::EmberError;
use ember_vector::RetrievalError;

/// Errors from the conversation graph and orchestrator.
#[derive(Debug, thiserror::Error)]
pub enum DialogError {
    #[error("unknown state: {0}")]
    UnknownState(String),
    #[error("transition from {from} targets unknown state {to}")]
    DanglingTransition { from: String, to: String },
    #[error("initial state {0} is not defined")]
    MissingInitialState(String),
    #[error("graph has no terminal state")]
    NoTerminalState,
    #[error("invalid graph: {0}")]
    InvalidGraph(String),
    #[error("retrieval failed: {0}")]
    Retrieval(#[from] RetrievalError),
    #[error("completion log error: {0}")]
    CompletionLog(String),
}

impl From<DialogError> for EmberError {
    fn from(err: DialogError) -> Self {
        match err {
            DialogError::Retrieval(inner) => inner.into(),
            other => EmberError::Dialog(other.to_string()),
        }
    }
}
