//! The instance model: entities, relationships, classifications.
//!
//! An instance is a versioned, typed record with audit metadata and a home
//! metadata collection. Entities and relationships share a common
//! [`InstanceHeader`]; the proxy/detail duality of entities is a single
//! `proxy_only` flag on the common record rather than a parallel type
//! hierarchy.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::property::Properties;

/// The two stored instance kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum InstanceKind {
    Entity,
    Relationship,
}

/// A deterministic document reference, computable from (kind, GUID)
/// without a lookup.
///
/// Entities map to `e_{guid}` and relationships to `r_{guid}`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct DocRef(String);

impl DocRef {
    /// Reference for an entity document.
    pub fn entity(guid: &str) -> Self {
        Self(format!("e_{guid}"))
    }

    /// Reference for a relationship document.
    pub fn relationship(guid: &str) -> Self {
        Self(format!("r_{guid}"))
    }

    /// Reference for the given kind.
    pub fn for_kind(kind: InstanceKind, guid: &str) -> Self {
        match kind {
            InstanceKind::Entity => Self::entity(guid),
            InstanceKind::Relationship => Self::relationship(guid),
        }
    }

    /// The kind encoded in this reference, if the prefix is recognized.
    pub fn kind(&self) -> Option<InstanceKind> {
        match self.0.as_bytes().first() {
            Some(b'e') => Some(InstanceKind::Entity),
            Some(b'r') => Some(InstanceKind::Relationship),
            _ => None,
        }
    }

    /// The GUID portion of the reference.
    pub fn guid(&self) -> &str {
        self.0.get(2..).unwrap_or("")
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for DocRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Lifecycle status of an instance.
///
/// `Deleted` is terminal except for restore and purge; the status held
/// before deletion is remembered in [`InstanceHeader::status_on_delete`].
/// Which non-deleted statuses are legal is defined per type by the type
/// registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum InstanceStatus {
    Proposed,
    Draft,
    Prepared,
    Active,
    Deleted,
}

impl InstanceStatus {
    /// Every status except `Deleted`, the default search allow-list.
    pub fn all_active() -> Vec<InstanceStatus> {
        vec![
            InstanceStatus::Proposed,
            InstanceStatus::Draft,
            InstanceStatus::Prepared,
            InstanceStatus::Active,
        ]
    }

    /// Stable wire name, used inside document bodies.
    pub fn as_str(&self) -> &'static str {
        match self {
            InstanceStatus::Proposed => "Proposed",
            InstanceStatus::Draft => "Draft",
            InstanceStatus::Prepared => "Prepared",
            InstanceStatus::Active => "Active",
            InstanceStatus::Deleted => "Deleted",
        }
    }
}

/// Where an instance is mastered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Provenance {
    /// Mastered by the local metadata collection.
    Local,
    /// A reference copy mastered by another collection.
    External,
}

/// Audit metadata refreshed on every mutation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditInfo {
    pub created_by: String,
    pub create_time: Option<DateTime<Utc>>,
    pub updated_by: Option<String>,
    pub update_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub maintained_by: Vec<String>,
}

impl AuditInfo {
    /// Audit trail for a freshly created instance.
    pub fn created(user: &str, at: DateTime<Utc>) -> Self {
        Self {
            created_by: user.to_string(),
            create_time: Some(at),
            updated_by: None,
            update_time: None,
            maintained_by: vec![user.to_string()],
        }
    }

    /// Record a mutation by `user` at `at`.
    pub fn touch(&mut self, user: &str, at: DateTime<Utc>) {
        self.updated_by = Some(user.to_string());
        self.update_time = Some(at);
        if !self.maintained_by.iter().any(|m| m == user) {
            self.maintained_by.push(user.to_string());
        }
    }
}

/// Header shared by every instance kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstanceHeader {
    pub guid: String,
    pub type_name: String,
    /// Strictly increasing on every mutation, starting at 1.
    pub version: u64,
    pub status: InstanceStatus,
    /// The status held before a soft delete, used by restore.
    pub status_on_delete: Option<InstanceStatus>,
    /// Identifier of the metadata collection that masters this instance.
    pub home_collection: String,
    pub home_collection_name: Option<String>,
    pub provenance: Provenance,
    pub audit: AuditInfo,
    /// GUID this instance previously carried, if it was re-identified.
    pub re_identified_from: Option<String>,
    /// Type name this instance previously carried, if it was re-typed.
    pub re_typed_from: Option<String>,
}

impl InstanceHeader {
    /// Header for a new, locally mastered instance at version 1.
    pub fn new(
        guid: String,
        type_name: &str,
        status: InstanceStatus,
        home_collection: &str,
        user: &str,
        at: DateTime<Utc>,
    ) -> Self {
        Self {
            guid,
            type_name: type_name.to_string(),
            version: 1,
            status,
            status_on_delete: None,
            home_collection: home_collection.to_string(),
            home_collection_name: None,
            provenance: Provenance::Local,
            audit: AuditInfo::created(user, at),
            re_identified_from: None,
            re_typed_from: None,
        }
    }

    pub fn is_deleted(&self) -> bool {
        self.status == InstanceStatus::Deleted
    }
}

/// Origin of a classification attached to an entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ClassificationOrigin {
    /// Directly assigned to the entity.
    Assigned,
    /// Propagated along a relationship from another entity.
    Propagated,
}

/// A classification attached to an entity.
///
/// Classifications are independently versioned but always stored embedded
/// in their parent entity document; the name is unique per entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Classification {
    pub name: String,
    pub origin: ClassificationOrigin,
    /// GUID of the entity the classification propagated from, if any.
    pub origin_guid: Option<String>,
    pub version: u64,
    pub status: InstanceStatus,
    pub audit: AuditInfo,
    #[serde(default)]
    pub properties: Properties,
}

impl Classification {
    /// A directly assigned classification at version 1.
    pub fn assigned(name: &str, properties: Properties, user: &str, at: DateTime<Utc>) -> Self {
        Self {
            name: name.to_string(),
            origin: ClassificationOrigin::Assigned,
            origin_guid: None,
            version: 1,
            status: InstanceStatus::Active,
            audit: AuditInfo::created(user, at),
            properties,
        }
    }

    /// The most recent time this classification changed.
    pub fn last_change(&self) -> Option<DateTime<Utc>> {
        self.audit.update_time.or(self.audit.create_time)
    }
}

/// An entity instance.
///
/// When `proxy_only` is true the entity is known only as a relationship
/// endpoint stub carrying its minimal identifying properties; it must
/// never be returned where a full detail is contractually required.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    pub header: InstanceHeader,
    #[serde(default)]
    pub properties: Properties,
    #[serde(default)]
    pub classifications: Vec<Classification>,
    #[serde(default)]
    pub proxy_only: bool,
}

impl Entity {
    pub fn reference(&self) -> DocRef {
        DocRef::entity(&self.header.guid)
    }

    pub fn is_proxy_only(&self) -> bool {
        self.proxy_only
    }

    /// The classification with the given name, if attached.
    pub fn classification(&self, name: &str) -> Option<&Classification> {
        self.classifications.iter().find(|c| c.name == name)
    }

    /// A proxy view of this entity keeping only the named unique
    /// identifying properties and no classifications.
    pub fn proxy_view(&self, unique_properties: &[String]) -> Entity {
        let properties = self
            .properties
            .iter()
            .filter(|(name, _)| unique_properties.iter().any(|u| u == *name))
            .map(|(name, value)| (name.clone(), value.clone()))
            .collect();
        Entity {
            header: self.header.clone(),
            properties,
            classifications: Vec::new(),
            proxy_only: true,
        }
    }
}

/// A relationship between two entities.
///
/// Endpoints are carried as proxy-form entities so that a relationship is
/// renderable even when a full endpoint entity is not locally held.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Relationship {
    pub header: InstanceHeader,
    #[serde(default)]
    pub properties: Properties,
    pub end_one: Entity,
    pub end_two: Entity,
}

impl Relationship {
    pub fn reference(&self) -> DocRef {
        DocRef::relationship(&self.header.guid)
    }

    /// True if either endpoint is the given entity.
    pub fn touches(&self, guid: &str) -> bool {
        self.end_one.header.guid == guid || self.end_two.header.guid == guid
    }

    /// The endpoint opposite to `guid`, if `guid` is an endpoint at all.
    /// A self-loop returns the (identical) other end.
    pub fn other_end(&self, guid: &str) -> Option<&Entity> {
        if self.end_one.header.guid == guid {
            Some(&self.end_two)
        } else if self.end_two.header.guid == guid {
            Some(&self.end_one)
        } else {
            None
        }
    }
}

/// A traversal or search result pairing entities with the relationships
/// among them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InstanceGraph {
    pub entities: Vec<Entity>,
    pub relationships: Vec<Relationship>,
}

impl InstanceGraph {
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty() && self.relationships.is_empty()
    }

    pub fn contains_entity(&self, guid: &str) -> bool {
        self.entities.iter().any(|e| e.header.guid == guid)
    }
}
