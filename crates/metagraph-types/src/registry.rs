//! Read-only type registry contract.
//!
//! The registry itself is owned by the surrounding framework; the
//! repository consumes it purely as a lookup. Implementations are assumed
//! internally consistent for the duration of a single query build, but the
//! registry may grow between calls, so subtype closures are never cached
//! by callers.

use std::collections::BTreeSet;

use crate::instance::InstanceStatus;

/// The entity type names admissible at each end of a relationship type.
/// An entity type satisfies an end if it or any of its supertypes is
/// named in the set, which the registry resolves by listing the full
/// admissible closure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelationshipEnds {
    pub end_one: BTreeSet<String>,
    pub end_two: BTreeSet<String>,
}

/// Read-only view of the type definition registry.
pub trait TypeRegistry: Send + Sync {
    /// Resolve a type GUID to its name, or `None` if unknown.
    fn resolve_type_name(&self, guid: &str) -> Option<String>;

    /// Direct subtypes of the named type, or `None` if the type itself is
    /// unknown. Transitive closure is the caller's job and must be
    /// recomputed per call.
    fn subtypes_of(&self, name: &str) -> Option<BTreeSet<String>>;

    /// The statuses legal for instances of the named type, or `None` if
    /// the type is unknown.
    fn valid_statuses(&self, name: &str) -> Option<Vec<InstanceStatus>>;

    /// Endpoint constraints for a relationship type, or `None` if the
    /// type is unknown or not a relationship type.
    fn relationship_ends(&self, name: &str) -> Option<RelationshipEnds>;

    /// The unique identifying property names of an entity type; these are
    /// the properties a proxy retains.
    fn unique_properties(&self, name: &str) -> Vec<String>;
}
