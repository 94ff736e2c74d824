//! Error types for the Schema Drift Agent
//!
//! One taxonomy shared by the lineage store, detection engine and
//! orchestrator.

use thiserror::Error;

/// Main error type
#[derive(Error, Debug)]
pub enum DriftError {
    /// Malformed snapshot input, rejected before persistence
    #[error("Validation failed: {0}")]
    Validation(String),

    /// Unknown component, snapshot, pipeline or ruleset
    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    /// Diff requested across different components
    #[error("Incompatible snapshots: current belongs to '{current}', previous to '{previous}'")]
    IncompatibleSnapshots { current: String, previous: String },

    /// Collaborator did not answer within the caller-supplied timeout
    #[error("{collaborator} timed out after {timeout_ms}ms")]
    CollaboratorTimeout {
        collaborator: &'static str,
        timeout_ms: u64,
    },

    /// Collaborator answered with an error
    #[error("{collaborator} failed: {message}")]
    CollaboratorFailure {
        collaborator: &'static str,
        message: String,
    },

    /// Lost the race to advance a component's latest snapshot
    #[error("Concurrent snapshot write for component '{component}'")]
    ConcurrencyConflict { component: String },

    /// Run cancelled between stages
    #[error("Run cancelled")]
    Cancelled,

    /// Metadata store backend error
    #[error("Store error: {0}")]
    Store(String),

    /// Configuration or catalog error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl DriftError {
    /// Create a validation error
    pub fn validation(msg: impl Into<String>) -> Self {
        DriftError::Validation(msg.into())
    }

    /// Create a not-found error
    pub fn not_found(kind: &'static str, id: impl Into<String>) -> Self {
        DriftError::NotFound { kind, id: id.into() }
    }

    /// Create a store error
    pub fn store(msg: impl ToString) -> Self {
        DriftError::Store(msg.to_string())
    }

    /// Short machine-readable category
    pub fn kind(&self) -> &'static str {
        match self {
            DriftError::Validation(_) => "validation",
            DriftError::NotFound { .. } => "not_found",
            DriftError::IncompatibleSnapshots { .. } => "incompatible_snapshots",
            DriftError::CollaboratorTimeout { .. } => "collaborator_timeout",
            DriftError::CollaboratorFailure { .. } => "collaborator_failure",
            DriftError::ConcurrencyConflict { .. } => "concurrency_conflict",
            DriftError::Cancelled => "cancelled",
            DriftError::Store(_) => "store",
            DriftError::Config(_) => "config",
            DriftError::Serialization(_) => "serialization",
        }
    }

    /// Check if this is a caller error (vs internal)
    pub fn is_user_error(&self) -> bool {
        matches!(
            self,
            DriftError::Validation(_) | DriftError::NotFound { .. } | DriftError::Config(_)
        )
    }

    /// Only snapshot write races are retried automatically
    pub fn is_retryable(&self) -> bool {
        matches!(self, DriftError::ConcurrencyConflict { .. })
    }

    /// HTTP status used at the request/response boundary
    pub fn status_code(&self) -> u16 {
        match self {
            DriftError::Validation(_) => 400,
            DriftError::NotFound { .. } => 404,
            DriftError::ConcurrencyConflict { .. } => 409,
            DriftError::Cancelled => 499,
            DriftError::CollaboratorTimeout { .. } => 504,
            DriftError::CollaboratorFailure { .. } => 502,
            _ => 500,
        }
    }

    /// Whether the error came from an external collaborator
    pub fn is_collaborator_error(&self) -> bool {
        matches!(
            self,
            DriftError::CollaboratorTimeout { .. } | DriftError::CollaboratorFailure { .. }
        )
    }
}

impl From<serde_json::Error> for DriftError {
    fn from(err: serde_json::Error) -> Self {
        DriftError::Serialization(format!("JSON error: {}", err))
    }
}

impl From<serde_yaml::Error> for DriftError {
    fn from(err: serde_yaml::Error) -> Self {
        DriftError::Serialization(format!("YAML error: {}", err))
    }
}

impl From<toml::de::Error> for DriftError {
    fn from(err: toml::de::Error) -> Self {
        DriftError::Serialization(format!("TOML error: {}", err))
    }
}

impl From<sled::Error> for DriftError {
    fn from(err: sled::Error) -> Self {
        DriftError::Store(err.to_string())
    }
}

impl From<std::io::Error> for DriftError {
    fn from(err: std::io::Error) -> Self {
        DriftError::Config(err.to_string())
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, DriftError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = DriftError::not_found("pipeline", "orders-etl");
        assert_eq!(err.to_string(), "pipeline not found: orders-etl");

        let err = DriftError::CollaboratorTimeout {
            collaborator: "connector",
            timeout_ms: 250,
        };
        assert_eq!(err.to_string(), "connector timed out after 250ms");
    }

    #[test]
    fn test_classification() {
        assert!(DriftError::validation("dup").is_user_error());
        assert!(!DriftError::store("poisoned").is_user_error());
        assert!(DriftError::ConcurrencyConflict { component: "c".into() }.is_retryable());
        assert!(!DriftError::Cancelled.is_retryable());
        assert!(DriftError::CollaboratorFailure {
            collaborator: "notifier",
            message: "503".into()
        }
        .is_collaborator_error());
    }

    #[test]
    fn test_kind_strings() {
        assert_eq!(DriftError::Cancelled.kind(), "cancelled");
        assert_eq!(
            DriftError::IncompatibleSnapshots {
                current: "a".into(),
                previous: "b".into()
            }
            .kind(),
            "incompatible_snapshots"
        );
    }
}
