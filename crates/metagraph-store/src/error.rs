//! Store-level error types.

/// Result type alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors raised by the backing document store.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The referenced document does not exist.
    #[error("Not found: {0}")]
    NotFound(String),

    /// A compare-and-swap precondition failed; another writer committed
    /// between the precondition read and this write. The operation may be
    /// retried against fresh state.
    #[error("Conflict: concurrent modification detected")]
    Conflict,

    /// The operation exceeded its time budget.
    #[error("Operation timed out")]
    Timeout,

    /// A snapshot or cursor could not be released, or a transaction could
    /// not be confirmed.
    #[error("Resource error: {0}")]
    Resource(String),

    /// A document body could not be serialized or deserialized.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Internal error in the store layer.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl StoreError {
    pub fn not_found(reference: impl Into<String>) -> Self {
        StoreError::NotFound(reference.into())
    }

    pub fn serialization(err: impl std::fmt::Display) -> Self {
        StoreError::Serialization(err.to_string())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = StoreError::not_found("e_123");
        assert_eq!(err.to_string(), "Not found: e_123");

        let err = StoreError::Conflict;
        assert_eq!(err.to_string(), "Conflict: concurrent modification detected");

        let err = StoreError::Timeout;
        assert_eq!(err.to_string(), "Operation timed out");
    }
}
