//! Configuration validation
//!
//! Validates configuration values and ensures consistency.

use thiserror::Error;

use crate::{Config, ObservabilityConfig, RepositoryConfig, StoreConfig};

#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("Invalid query timeout: {0}ms (must be > 0)")]
    InvalidQueryTimeout(u64),

    #[error("Invalid page size: {0} (must be > 0)")]
    InvalidPageSize(usize),

    #[error("Invalid traversal depth: {0} (must be > 0)")]
    InvalidTraversalDepth(usize),

    #[error("Invalid worker thread count: {0} (must be > 0)")]
    InvalidWorkerThreads(usize),

    #[error("Invalid collection id: must not be empty when set")]
    EmptyCollectionId,

    #[error("Invalid log level: {0} (must be one of: trace, debug, info, warn, error)")]
    InvalidLogLevel(String),

    #[error("Invalid log format: {0} (must be one of: pretty, compact, json)")]
    InvalidLogFormat(String),

    #[error("Invalid backend: {0} (must be: memory)")]
    InvalidBackend(String),

    #[error("Multiple validation errors: {0:?}")]
    Multiple(Vec<ValidationError>),
}

/// Validation result type
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Validate complete configuration
pub fn validate(config: &Config) -> ValidationResult<()> {
    let mut errors = Vec::new();

    if let Err(e) = validate_repository(&config.repository) {
        errors.push(e);
    }

    if let Err(e) = validate_store(&config.store) {
        errors.push(e);
    }

    if let Err(e) = validate_observability(&config.observability) {
        errors.push(e);
    }

    if errors.is_empty() {
        Ok(())
    } else if errors.len() == 1 {
        Err(errors.remove(0))
    } else {
        Err(ValidationError::Multiple(errors))
    }
}

fn validate_repository(repository: &RepositoryConfig) -> ValidationResult<()> {
    if repository.query_timeout_ms == 0 {
        return Err(ValidationError::InvalidQueryTimeout(repository.query_timeout_ms));
    }
    if repository.max_page_size == 0 {
        return Err(ValidationError::InvalidPageSize(repository.max_page_size));
    }
    if repository.max_traversal_depth == 0 {
        return Err(ValidationError::InvalidTraversalDepth(repository.max_traversal_depth));
    }
    if repository.worker_threads == 0 {
        return Err(ValidationError::InvalidWorkerThreads(repository.worker_threads));
    }
    if let Some(id) = &repository.collection_id {
        if id.trim().is_empty() {
            return Err(ValidationError::EmptyCollectionId);
        }
    }
    Ok(())
}

fn validate_store(store: &StoreConfig) -> ValidationResult<()> {
    match store.backend.as_str() {
        "memory" => Ok(()),
        other => Err(ValidationError::InvalidBackend(other.to_string())),
    }
}

fn validate_observability(observability: &ObservabilityConfig) -> ValidationResult<()> {
    match observability.log_level.as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => {}
        other => return Err(ValidationError::InvalidLogLevel(other.to_string())),
    }
    match observability.log_format.as_str() {
        "pretty" | "compact" | "json" => Ok(()),
        other => Err(ValidationError::InvalidLogFormat(other.to_string())),
    }
}
