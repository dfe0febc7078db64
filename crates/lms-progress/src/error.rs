//! Error types for the progress engine.
//!
//! Errors are scoped to a single cache key: the action that failed records the
//! message in the store's error slot for that key and returns the error to its
//! caller. Nothing here cascades into unrelated keys.

use std::time::Duration;
use thiserror::Error;

/// Main error type for the progress engine.
///
/// The type is `Clone` because one in-flight fetch may be awaited by several
/// callers, each of which receives its own copy of the outcome.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ProgressError {
    // Backend errors
    #[error("Backend error during {operation}: {message}")]
    Backend { operation: String, message: String },

    #[error("Write conflict on {table}: {message}")]
    Conflict { table: String, message: String },

    #[error("Procedure {name} failed: {message}")]
    Procedure { name: String, message: String },

    // Scheduling errors
    #[error("Fetch for {key} timed out after {after:?}")]
    Timeout { key: String, after: Duration },

    #[error("Operation was cancelled")]
    Cancelled,

    // Lookup errors
    #[error("{entity} not found: {id}")]
    NotFound { entity: String, id: String },

    // Validation errors
    #[error("Validation error for {field}: {message}")]
    Validation { field: String, message: String },

    // Serialization errors
    #[error("JSON error: {message}")]
    Json { message: String },

    // Generic errors
    #[error("{0}")]
    Other(String),
}

/// Result type alias for progress engine operations.
pub type Result<T> = std::result::Result<T, ProgressError>;

impl From<serde_json::Error> for ProgressError {
    fn from(err: serde_json::Error) -> Self {
        ProgressError::Json {
            message: err.to_string(),
        }
    }
}

impl ProgressError {
    /// Create a backend error for the named operation.
    pub fn backend(operation: impl Into<String>, message: impl Into<String>) -> Self {
        ProgressError::Backend {
            operation: operation.into(),
            message: message.into(),
        }
    }

    /// Create a write-conflict error for the named table.
    pub fn conflict(table: impl Into<String>, message: impl Into<String>) -> Self {
        ProgressError::Conflict {
            table: table.into(),
            message: message.into(),
        }
    }

    /// Create a validation error.
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        ProgressError::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Check if this error is a transient failure worth retrying by the caller.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ProgressError::Backend { .. } | ProgressError::Timeout { .. }
        )
    }

    /// Check if this error is a duplicate-key / upsert race.
    pub fn is_conflict(&self) -> bool {
        matches!(self, ProgressError::Conflict { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ProgressError::NotFound {
            entity: "course".into(),
            id: "c-1".into(),
        };
        assert_eq!(err.to_string(), "course not found: c-1");

        let err = ProgressError::Timeout {
            key: "course-u1".into(),
            after: Duration::from_secs(30),
        };
        assert_eq!(err.to_string(), "Fetch for course-u1 timed out after 30s");
    }

    #[test]
    fn test_retryable_errors() {
        assert!(ProgressError::backend("fetch", "connection reset").is_retryable());
        assert!(ProgressError::Timeout {
            key: "team-t1".into(),
            after: Duration::from_secs(1),
        }
        .is_retryable());
        assert!(!ProgressError::Cancelled.is_retryable());
        assert!(!ProgressError::validation("user_id", "empty").is_retryable());
    }

    #[test]
    fn test_conflict_detection() {
        assert!(ProgressError::conflict("unit_progress", "duplicate key").is_conflict());
        assert!(!ProgressError::backend("upsert", "boom").is_conflict());
    }

    #[test]
    fn test_json_conversion() {
        let err: ProgressError = serde_json::from_str::<u32>("not json").unwrap_err().into();
        assert!(matches!(err, ProgressError::Json { .. }));
    }
}
