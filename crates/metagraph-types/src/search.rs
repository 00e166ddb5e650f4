//! Search criteria, sequencing, and traversal specifications.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::instance::InstanceStatus;
use crate::property::PropertyValue;

/// How string comparisons interpret their operand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StringStyle {
    Exact,
    Contains,
    Regex,
}

/// String comparison mode: style plus case sensitivity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StringMode {
    pub style: StringStyle,
    pub case_sensitive: bool,
}

impl StringMode {
    pub fn exact() -> Self {
        Self { style: StringStyle::Exact, case_sensitive: true }
    }

    pub fn contains() -> Self {
        Self { style: StringStyle::Contains, case_sensitive: true }
    }

    pub fn regex() -> Self {
        Self { style: StringStyle::Regex, case_sensitive: true }
    }

    pub fn ignore_case(mut self) -> Self {
        self.case_sensitive = false;
        self
    }
}

/// Comparison operator for a single property.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PropertyOp {
    Eq,
    Neq,
    Lt,
    Lte,
    Gt,
    Gte,
    /// String matching under the given mode.
    Like(StringMode),
}

/// A single property comparison leaf.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropertyComparison {
    pub name: String,
    pub op: PropertyOp,
    pub value: PropertyValue,
}

/// A structured match-properties tree (AND / OR / NOT of comparisons).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PropertyMatch {
    All(Vec<PropertyMatch>),
    Any(Vec<PropertyMatch>),
    NoneOf(Vec<PropertyMatch>),
    Compare(PropertyComparison),
}

impl PropertyMatch {
    /// Convenience: a single equality comparison.
    pub fn eq(name: &str, value: PropertyValue) -> Self {
        PropertyMatch::Compare(PropertyComparison {
            name: name.to_string(),
            op: PropertyOp::Eq,
            value,
        })
    }

    /// Convenience: a single string match.
    pub fn like(name: &str, pattern: &str, mode: StringMode) -> Self {
        PropertyMatch::Compare(PropertyComparison {
            name: name.to_string(),
            op: PropertyOp::Like(mode),
            value: PropertyValue::String(pattern.to_string()),
        })
    }
}

/// A filter on entity classifications: the classification must be present
/// by name, optionally with matching classification properties.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationMatch {
    pub name: String,
    pub properties: Option<PropertyMatch>,
}

/// Result ordering for searches.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Sequencing {
    /// Order by GUID, the default.
    ByGuid,
    /// Order by a named property value.
    ByProperty { name: String, ascending: bool },
}

impl Default for Sequencing {
    fn default() -> Self {
        Sequencing::ByGuid
    }
}

/// Criteria for an entity search.
///
/// A `page_size` of zero means "return everything, up to the configured
/// maximum". Deduplication and the `from_element`/`page_size` window are
/// applied by the connector, not the store.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EntitySearch {
    /// Filter to this type GUID and all of its subtypes.
    pub type_guid: Option<String>,
    /// Restrict the subtype expansion to this explicit set of type GUIDs.
    pub subtype_guids: Vec<String>,
    pub properties: Option<PropertyMatch>,
    pub classifications: Vec<ClassificationMatch>,
    /// Free-text search across all string-valued properties.
    pub text: Option<String>,
    /// Status allow-list; empty means every non-deleted status.
    pub statuses: Vec<InstanceStatus>,
    #[serde(default)]
    pub sequencing: Sequencing,
    pub from_element: usize,
    pub page_size: usize,
}

/// Criteria for a relationship search.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RelationshipSearch {
    pub type_guid: Option<String>,
    pub subtype_guids: Vec<String>,
    pub properties: Option<PropertyMatch>,
    pub text: Option<String>,
    pub statuses: Vec<InstanceStatus>,
    #[serde(default)]
    pub sequencing: Sequencing,
    pub from_element: usize,
    pub page_size: usize,
}

/// Chronological direction for history results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HistoryOrder {
    /// Oldest first.
    Forward,
    /// Most recent first, the store's natural order.
    Backward,
}

/// A bounded window over an instance's version history.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HistoryRange {
    /// Versions valid strictly before this bound are not materialized,
    /// except the one version that was current at the bound itself.
    pub earliest: Option<DateTime<Utc>>,
    pub offset: usize,
    /// Zero means the configured maximum page size.
    pub page_size: usize,
}

/// Write durability modes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Durability {
    /// Block until the write is confirmed visible to subsequent reads.
    Synchronous,
    /// Return once the write is durably queued; no post-state is readable
    /// yet, so mutations return no resulting instance.
    Asynchronous,
}

/// Filters and bounds for a neighborhood traversal.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NeighborhoodSpec {
    /// Entity type allow-list (names, including subtypes already expanded
    /// by the caller); empty means all.
    pub entity_types: Vec<String>,
    /// Relationship type allow-list; empty means all.
    pub relationship_types: Vec<String>,
    /// Status allow-list applied to both entities and relationships;
    /// empty means every non-deleted status.
    pub statuses: Vec<InstanceStatus>,
    /// Classification names the reached entities must carry; applies to
    /// entities only. Empty means no classification constraint.
    pub classifications: Vec<String>,
    /// Traversal depth; negative means unbounded (capped at the
    /// configured maximum depth).
    pub level: i32,
    /// When false, relationships are omitted from the result graph.
    pub include_relationships: bool,
}

impl NeighborhoodSpec {
    pub fn unbounded() -> Self {
        Self { level: -1, include_relationships: true, ..Default::default() }
    }

    pub fn with_level(level: i32) -> Self {
        Self { level, include_relationships: true, ..Default::default() }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn test_string_mode_builders() {
        let mode = StringMode::contains().ignore_case();
        assert_eq!(mode.style, StringStyle::Contains);
        assert!(!mode.case_sensitive);
    }

    #[test]
    fn test_default_sequencing_is_by_guid() {
        assert_eq!(Sequencing::default(), Sequencing::ByGuid);
        let search = EntitySearch::default();
        assert_eq!(search.sequencing, Sequencing::ByGuid);
        assert_eq!(search.page_size, 0);
    }

    #[test]
    fn test_property_match_round_trip() {
        let tree = PropertyMatch::All(vec![
            PropertyMatch::eq("level", PropertyValue::Int(3)),
            PropertyMatch::NoneOf(vec![PropertyMatch::like(
                "name",
                "tmp.*",
                StringMode::regex(),
            )]),
        ]);
        let json = serde_json::to_string(&tree).unwrap();
        let back: PropertyMatch = serde_json::from_str(&json).unwrap();
        assert_eq!(tree, back);
    }
}
