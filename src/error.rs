//! Error types for the timer engine and registry

use thiserror::Error;

/// Errors surfaced by engine construction, the registry and the codec
#[derive(Debug, Error)]
pub enum TimerError {
    /// Configuration rejected before the timer could enter a registry
    #[error("invalid timer '{name}': {reason}")]
    Validation { name: String, reason: String },

    /// A timer with this name is already registered
    #[error("timer '{0}' already exists")]
    DuplicateName(String),

    /// No timer with this name is registered
    #[error("timer '{0}' not found")]
    NotFound(String),

    /// One entry of a persisted document could not be decoded
    #[error("failed to decode timer '{name}': {reason}")]
    Serialization { name: String, reason: String },

    /// The persisted document as a whole is malformed
    #[error("malformed timer document: {0}")]
    Document(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl TimerError {
    pub(crate) fn validation(name: &str, reason: impl Into<String>) -> Self {
        Self::Validation {
            name: name.to_string(),
            reason: reason.into(),
        }
    }
}

/// Result alias for engine and registry operations
pub type Result<T, E = TimerError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_message_names_timer() {
        let err = TimerError::validation("tea", "interval must be positive");
        assert_eq!(
            err.to_string(),
            "invalid timer 'tea': interval must be positive"
        );
    }

    #[test]
    fn test_document_error_from_json() {
        let json_err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let err: TimerError = json_err.into();
        assert!(err.to_string().starts_with("malformed timer document"));
    }
}
