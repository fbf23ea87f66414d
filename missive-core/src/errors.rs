//! Error taxonomy shared by every engine component

use crate::core_store::StoreError;
use std::time::Duration;
use thiserror::Error;

/// Result type for engine operations
pub type EngineResult<T> = Result<T, EngineError>;

/// Distinguishes between retryable and permanent errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Retryable,
    Permanent,
}

/// Errors surfaced by engine operations.
///
/// None of these is fatal to the process; callers may retry after fixing the
/// triggering condition.
#[derive(Error, Debug)]
pub enum EngineError {
    /// Referenced message, record or identity is absent
    #[error("Not found: {0}")]
    NotFound(String),

    /// Actor lacks the rights for the operation
    #[error("Forbidden: {actor} cannot {action} message {message}")]
    Forbidden {
        actor: String,
        action: &'static str,
        message: String,
    },

    /// Operation illegal for the current deletion/edit state
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Malformed encryption metadata
    #[error("Invalid envelope: {0}")]
    InvalidEnvelope(String),

    /// Entity already in its terminal state
    #[error("Already terminal: {0}")]
    AlreadyTerminal(String),

    /// Malformed caller input (content, emoji, key material)
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Time-limited operation attempted too late
    #[error("{operation} window of {}s has expired", window.as_secs())]
    WindowExpired {
        operation: &'static str,
        window: Duration,
    },

    /// Membership resolver failed
    #[error("Membership error: {0}")]
    Membership(String),

    /// Too many lost compare-and-swap rounds on one record
    #[error("Contention on {key} after {attempts} attempts")]
    Contention { key: String, attempts: usize },

    /// Persistent store failed
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

impl EngineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            EngineError::Contention { .. } => ErrorKind::Retryable,
            EngineError::Store(err) if err.is_retryable() => ErrorKind::Retryable,
            _ => ErrorKind::Permanent,
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.kind() == ErrorKind::Retryable
    }

    /// HTTP status the transport layer should answer with
    pub fn status_code(&self) -> u16 {
        match self {
            EngineError::NotFound(_) => 404,
            EngineError::Forbidden { .. } | EngineError::WindowExpired { .. } => 403,
            EngineError::InvalidState(_) | EngineError::Contention { .. } => 409,
            EngineError::AlreadyTerminal(_) => 410,
            EngineError::InvalidEnvelope(_) | EngineError::InvalidInput(_) => 422,
            EngineError::Membership(_) => 503,
            EngineError::Store(_) => 500,
        }
    }

    pub(crate) fn forbidden(actor: &impl ToString, action: &'static str, message: &impl ToString) -> Self {
        EngineError::Forbidden {
            actor: actor.to_string(),
            action,
            message: message.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = EngineError::forbidden(&"mallory", "hard-delete", &"m1");
        assert_eq!(err.to_string(), "Forbidden: mallory cannot hard-delete message m1");

        let err = EngineError::WindowExpired {
            operation: "edit",
            window: Duration::from_secs(300),
        };
        assert_eq!(err.to_string(), "edit window of 300s has expired");
    }

    #[test]
    fn test_retry_classification() {
        let contention = EngineError::Contention {
            key: "message m1".into(),
            attempts: 64,
        };
        assert!(contention.is_retryable());
        assert!(!EngineError::NotFound("m1".into()).is_retryable());
        assert!(EngineError::from(StoreError::Storage("disk".into())).is_retryable());
        assert!(!EngineError::from(StoreError::NotFound("x".into())).is_retryable());
    }

    #[test]
    fn test_status_codes() {
        assert_eq!(EngineError::NotFound("m".into()).status_code(), 404);
        assert_eq!(EngineError::AlreadyTerminal("m".into()).status_code(), 410);
        assert_eq!(EngineError::InvalidEnvelope("nonce".into()).status_code(), 422);
        assert_eq!(EngineError::InvalidState("deleted".into()).status_code(), 409);
    }
}
