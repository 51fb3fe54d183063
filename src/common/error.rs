//! Unified error type for the monitoring service.
//!
//! Validation and not-found errors surface to the admin API; execution-path
//! errors are captured in persisted records instead of propagating upward.

use thiserror::Error;
use uuid::Uuid;

/// Crate-wide error type.
#[derive(Debug, Error)]
pub enum VigilError {
    /// Invalid configuration or request input. Never retried.
    #[error("Validation error: {0}")]
    Validation(String),

    /// Entity missing from the store.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Check exists but is disabled.
    #[error("Check {0} is disabled")]
    Disabled(Uuid),

    /// Database error.
    #[error("Database error: {0}")]
    Database(String),

    /// Target or webhook connectivity, timeout, TLS.
    #[error("HTTP error: {0}")]
    Http(String),

    /// Circuit breaker refused the webhook attempt.
    #[error("Circuit breaker is open")]
    CircuitOpen,

    /// Shutdown or deadline interrupted the operation.
    #[error("Operation cancelled")]
    Cancelled,

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl VigilError {
    /// Safe message for external clients; full detail stays in server logs.
    pub fn external_message(&self) -> String {
        match self {
            Self::Validation(msg) => msg.clone(),
            Self::NotFound(what) => format!("Not found: {what}"),
            Self::Disabled(_) => "Check is disabled".to_string(),
            Self::Database(_) => "Database error".to_string(),
            Self::Http(_) => "Upstream request failed".to_string(),
            Self::CircuitOpen => "Alert delivery temporarily suspended".to_string(),
            Self::Cancelled => "Request cancelled".to_string(),
            Self::Serialization(_) => "Serialization error".to_string(),
            Self::Internal(_) => "Internal server error".to_string(),
        }
    }
}

/// Result type alias used throughout the crate.
pub type VigilResult<T> = Result<T, VigilError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_error_display() {
        let err = VigilError::Validation("at least one rule is required".into());
        assert_eq!(
            err.to_string(),
            "Validation error: at least one rule is required"
        );
    }

    #[test]
    fn disabled_error_includes_id() {
        let id = Uuid::new_v4();
        let err = VigilError::Disabled(id);
        assert!(err.to_string().contains(&id.to_string()));
    }

    #[test]
    fn database_detail_is_not_leaked_externally() {
        let err = VigilError::Database("connect refused 10.0.0.5:5432".into());
        assert_eq!(err.external_message(), "Database error");
    }

    #[test]
    fn validation_detail_is_kept_externally() {
        let err = VigilError::Validation("invalid operator: between".into());
        assert_eq!(err.external_message(), "invalid operator: between");
    }

    #[test]
    fn serde_error_converts() {
        let json_err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let err: VigilError = json_err.into();
        assert!(matches!(err, VigilError::Serialization(_)));
    }
}
