/*
    errors.rs - Error types for the store subsystem

    The store is the only shared mutable resource of the engine. Its errors
    describe infrastructure failures; business-rule violations live in
    `crate::errors::EngineError`.
*/

use thiserror::Error;

/// Errors that can occur in the store subsystem
#[derive(Debug, Error)]
pub enum StoreError {
    /// Record not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Concurrent modification conflict
    #[error("Concurrent modification: {0}")]
    Conflict(String),

    /// Storage backend failure
    #[error("Storage error: {0}")]
    Storage(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl StoreError {
    /// Whether retrying the same call may succeed
    pub fn is_retryable(&self) -> bool {
        matches!(self, StoreError::Conflict(_) | StoreError::Storage(_))
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Serialization(err.to_string())
    }
}

/// Result type for store operations
pub type StoreResult<T> = Result<T, StoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_error_display() {
        let err = StoreError::NotFound("message m1".to_string());
        assert_eq!(err.to_string(), "Not found: message m1");
    }

    #[test]
    fn test_retryable_classification() {
        assert!(StoreError::Conflict("x".into()).is_retryable());
        assert!(StoreError::Storage("io".into()).is_retryable());
        assert!(!StoreError::NotFound("x".into()).is_retryable());
        assert!(!StoreError::Serialization("x".into()).is_retryable());
    }

    #[test]
    fn test_serde_error_conversion() {
        let json_err = serde_json::from_str::<String>("not json").unwrap_err();
        let err: StoreError = json_err.into();
        assert!(matches!(err, StoreError::Serialization(_)));
    }
}
