//! # Metagraph Observe - Observability Layer
//!
//! Structured logging for the metadata repository.

pub mod logging;

pub use logging::{init_logging, LogConfig, LogFormat};
