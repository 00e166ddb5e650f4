//! # Metagraph Repository
//!
//! The storage-adaptation core of the metagraph metadata repository: maps
//! a versioned, typed instance graph onto a bitemporal document store and
//! exposes lifecycle, search, history, and graph-traversal operations over
//! that mapping.
//!
//! The [`RepositoryConnector`] facade owns the store handle; the other
//! modules are stateless transformers it orchestrates:
//!
//! - [`mapper`] — instance ↔ document translation
//! - [`query`] — search criteria → store queries, with type-hierarchy
//!   expansion
//! - [`functions`] — atomic compound operations under a compare-and-swap
//!   discipline
//! - [`history`] — lazy version-history retrieval
//! - [`traverse`] — bounded neighborhood and path traversal over
//!   snapshots

pub mod connector;
pub mod error;
pub mod functions;
pub mod history;
pub mod mapper;
pub mod query;
pub mod traverse;

pub use connector::RepositoryConnector;
pub use error::{RepositoryError, RepositoryResult};
pub use functions::TxFunctions;
pub use query::QueryBuilder;
pub use traverse::GraphTraversal;
