//! Error types for Care Companion.
//!
//! One enum covers every failure category of the assistant. The variants line
//! up with the stages of a conversation turn.

use thiserror::Error;

/// Unified error type for Care Companion.
///
/// All fallible functions return `Result<T, AppError>`.
/// We never panic; errors must be represented and propagated.
#[derive(Error, Debug)]
pub enum AppError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O and filesystem errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// LLM provider errors (transport, protocol, provider-side failures)
    #[error("LLM error: {0}")]
    Llm(String),

    /// Similarity index unreachable or malformed response. Fatal to a turn.
    #[error("Retrieval error: {0}")]
    Retrieval(String),

    /// Directory lookup or tool-binding failure. Recovered to empty tool output.
    #[error("Tool error: {0}")]
    Tool(String),

    /// Answer, judge, or fixer generation failure.
    #[error("Generation error: {0}")]
    Generation(String),

    /// Prompt system errors
    #[error("Prompt error: {0}")]
    Prompt(String),

    /// The output channel went away (client disconnected).
    #[error("Transport error: {0}")]
    Transport(String),

    /// Serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Generic errors
    #[error("{0}")]
    Other(String),
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Serialization(err.to_string())
    }
}

impl From<serde_yaml::Error> for AppError {
    fn from(err: serde_yaml::Error) -> Self {
        AppError::Serialization(err.to_string())
    }
}

/// Convenience type alias for Results with AppError.
pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_includes_category() {
        let err = AppError::Retrieval("connection refused".to_string());
        assert_eq!(err.to_string(), "Retrieval error: connection refused");
    }

    #[test]
    fn test_json_error_converts_to_serialization() {
        let err: AppError = serde_json::from_str::<serde_json::Value>("{")
            .unwrap_err()
            .into();
        assert!(matches!(err, AppError::Serialization(_)));
    }
}
