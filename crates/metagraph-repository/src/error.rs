//! Repository error types.
//!
//! This module provides a [`RepositoryError`] enum that wraps store-level
//! errors and adds domain-specific error variants for repository
//! operations.

use metagraph_store::StoreError;

/// Result type alias for repository operations.
pub type RepositoryResult<T> = Result<T, RepositoryError>;

/// Errors that can occur during repository operations.
#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    /// The requested instance was not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// The entity exists only as a proxy; the caller asked for the full
    /// detail.
    #[error("Entity is only known as a proxy: {0}")]
    EntityProxyOnly(String),

    /// An instance with the same GUID already exists.
    #[error("Already exists: {0}")]
    AlreadyExists(String),

    /// Transaction conflict due to concurrent modification.
    ///
    /// The operation should typically be retried.
    #[error("Conflict: concurrent modification detected")]
    Conflict,

    /// A type GUID or name is not known to the type registry.
    #[error("Type not known: {0}")]
    TypeNotKnown(String),

    /// A reference copy clashed with an instance mastered elsewhere.
    #[error("Home collection conflict for {guid}: instance is mastered by {home}")]
    HomeCollectionConflict { guid: String, home: String },

    /// Validation of input data failed.
    #[error("Validation error: {0}")]
    Validation(String),

    /// Serialization or deserialization failed.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Operation timed out.
    #[error("Operation timed out")]
    Timeout,

    /// Store resource handling failed.
    #[error("Resource error: {0}")]
    Resource(String),

    /// Internal error in the repository layer.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<StoreError> for RepositoryError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(reference) => RepositoryError::NotFound(reference),
            StoreError::Conflict => RepositoryError::Conflict,
            StoreError::Timeout => RepositoryError::Timeout,
            StoreError::Resource(message) => RepositoryError::Resource(message),
            StoreError::Serialization(message) => RepositoryError::Serialization(message),
            StoreError::Internal(message) => RepositoryError::Internal(message),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn test_store_error_conversion() {
        let store_err = StoreError::not_found("e_123");
        let repo_err: RepositoryError = store_err.into();
        assert!(matches!(repo_err, RepositoryError::NotFound(_)));

        let repo_err: RepositoryError = StoreError::Conflict.into();
        assert!(matches!(repo_err, RepositoryError::Conflict));

        let repo_err: RepositoryError = StoreError::Timeout.into();
        assert!(matches!(repo_err, RepositoryError::Timeout));
    }

    #[test]
    fn test_error_display() {
        let err = RepositoryError::NotFound("entity guid-1".to_string());
        assert_eq!(err.to_string(), "Not found: entity guid-1");

        let err = RepositoryError::HomeCollectionConflict {
            guid: "guid-1".to_string(),
            home: "other-collection".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Home collection conflict for guid-1: instance is mastered by other-collection"
        );
    }
}
