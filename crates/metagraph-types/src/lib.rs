//! # Metagraph Types
//!
//! Shared type definitions for the Metagraph metadata repository.
//!
//! This crate provides the instance model (entities, relationships,
//! classifications), typed property values, search criteria, and the
//! read-only type registry contract used across the Metagraph ecosystem,
//! ensuring a single source of truth and preventing circular dependencies.

pub mod instance;
pub mod property;
pub mod registry;
pub mod search;

pub use instance::{
    AuditInfo, Classification, ClassificationOrigin, DocRef, Entity, InstanceGraph,
    InstanceHeader, InstanceKind, InstanceStatus, Provenance, Relationship,
};
pub use property::{Properties, PropertyValue};
pub use registry::{RelationshipEnds, TypeRegistry};
pub use search::{
    ClassificationMatch, Durability, EntitySearch, HistoryOrder, HistoryRange, NeighborhoodSpec,
    PropertyComparison, PropertyMatch, PropertyOp, RelationshipSearch, Sequencing, StringMode,
    StringStyle,
};

/// Mint a new globally unique instance identifier.
pub fn new_guid() -> String {
    uuid::Uuid::new_v4().to_string()
}
