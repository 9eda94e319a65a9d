use thiserror::Error;

/// Top-level error type for the Ember system.
///
/// Subsystem crates define their own error types and implement
/// `From<SubsystemError> for EmberError` so that `?` works across crate
/// boundaries in the binary.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum EmberError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Embedding error: {0}")]
    Embedding(String),

    #[error("Knowledge base error: {0}")]
    Knowledge(String),

    #[error("Dialog error: {0}")]
    Dialog(String),
}

impl From<toml::de::Error> for EmberError {
    fn from(err: toml::de::Error) -> Self {
        EmberError::Config(err.to_string())
    }
}

impl From<serde_json::Error> for EmberError {
    fn from(err: serde_json::Error) -> Self {
        EmberError::Serialization(err.to_string())
    }
}

/// A specialized `Result` type for Ember operations.
pub type Result<T> = std::result::Result<T, EmberError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let cases: Vec<(EmberError, &str)> = vec![
            (
                EmberError::Config("bad key".to_string()),
                "Configuration error: bad key",
            ),
            (
                EmberError::Serialization("invalid json".to_string()),
                "Serialization error: invalid json",
            ),
            (
                EmberError::Embedding("model missing".to_string()),
                "Embedding error: model missing",
            ),
            (
                EmberError::Knowledge("empty".to_string()),
                "Knowledge base error: empty",
            ),
            (
                EmberError::Dialog("dangling".to_string()),
                "Dialog error: dangling",
            ),
        ];

        for (error, expected) in cases {
            assert_eq!(error.to_string(), expected);
        }
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: EmberError = io_err.into();
        assert!(matches!(err, EmberError::Io(_)));
        assert!(err.to_string().starts_with("I/O error:"));
        assert!(err.to_string().contains("file not found"));
    }

    #[test]
    fn test_error_from_toml_de() {
        let err: std::result::Result<toml::Value, _> = toml::from_str("invalid = [[[");
        let err: EmberError = err.unwrap_err().into();
        assert!(matches!(err, EmberError::Config(_)));
    }

    #[test]
    fn test_error_from_serde_json() {
        let err: std::result::Result<serde_json::Value, _> = serde_json::from_str("{ nope }");
        let err: EmberError = err.unwrap_err().into();
        assert!(matches!(err, EmberError::Serialization(_)));
    }

    #[test]
    fn test_result_type_with_question_mark() {
        fn inner() -> Result<String> {
            let io_result: std::result::Result<i32, std::io::Error> = Ok(42);
            let value = io_result?;
            Ok(value.to_string())
        }

        assert_eq!(inner().unwrap(), "42");
    }
}
