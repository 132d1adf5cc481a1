//! Storage error taxonomy.
//!
//! Every backend translates its medium-specific failures (I/O errors,
//! SQLSTATE codes) into these variants, so callers stay backend-agnostic.
//! Write-path failures are always surfaced; nothing is logged-and-dropped.

use crate::catalog::Violations;

/// Result type for all storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Typed storage failures.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// Entity fields violate invariants; carries the full violation list.
    #[error("validation failed: {0}")]
    ValidationFailed(Violations),

    /// An entity with this identifier already exists.
    #[error("duplicate identifier: {0}")]
    DuplicateIdentifier(String),

    /// No entity with this identifier exists.
    #[error("not found: {0}")]
    NotFound(String),

    /// Bad pagination bounds or filter values.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Backend unreachable: filesystem permission error, connection failure.
    #[error("storage unavailable: {0}")]
    Unavailable(String),

    /// The backend did not respond in time (e.g. connection pool exhausted).
    #[error("operation timed out: {0}")]
    Timeout(String),

    /// Invariant breach inside the backend, e.g. a corrupt stored record.
    #[error("internal storage error: {0}")]
    Internal(String),
}

impl StorageError {
    /// A `NotFound` failure for the given identifier.
    #[must_use]
    pub fn not_found(id: impl Into<String>) -> Self {
        Self::NotFound(id.into())
    }

    /// A `DuplicateIdentifier` failure for the given identifier.
    #[must_use]
    pub fn duplicate(id: impl Into<String>) -> Self {
        Self::DuplicateIdentifier(id.into())
    }

    /// An `InvalidArgument` failure.
    #[must_use]
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidArgument(message.into())
    }

    /// An `Unavailable` failure.
    #[must_use]
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::Unavailable(message.into())
    }

    /// A `Timeout` failure.
    #[must_use]
    pub fn timeout(message: impl Into<String>) -> Self {
        Self::Timeout(message.into())
    }

    /// An `Internal` failure.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Short machine-readable name of the failure kind. Used by contract
    /// tests to compare behavior across backends.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::ValidationFailed(_) => "validation_failed",
            Self::DuplicateIdentifier(_) => "duplicate_identifier",
            Self::NotFound(_) => "not_found",
            Self::InvalidArgument(_) => "invalid_argument",
            Self::Unavailable(_) => "unavailable",
            Self::Timeout(_) => "timeout",
            Self::Internal(_) => "internal",
        }
    }
}

impl From<Violations> for StorageError {
    fn from(violations: Violations) -> Self {
        Self::ValidationFailed(violations)
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kinds() {
        assert_eq!(StorageError::not_found("x").kind(), "not_found");
        assert_eq!(StorageError::duplicate("x").kind(), "duplicate_identifier");
        assert_eq!(StorageError::invalid("bad limit").kind(), "invalid_argument");
        assert_eq!(StorageError::timeout("pool").kind(), "timeout");
    }

    #[test]
    fn test_violations_convert() {
        let mut violations = Violations::new();
        violations.push("title", "must not be empty");
        let err: StorageError = violations.into();
        assert_eq!(err.kind(), "validation_failed");
        assert!(err.to_string().contains("title"));
    }
}
