//! Query construction from search criteria.
//!
//! Builds opaque store queries out of type filters, structured property
//! trees, classification filters, free-text patterns, status allow-lists
//! and sequencing specs. Type filters are always expanded to the
//! transitive closure of subtypes, recomputed on every call because the
//! registry may grow at runtime.
//!
//! Property and text predicates are emitted before the type predicate:
//! selective predicates evaluated early keep intermediate result sets
//! small on broad, near-untyped searches.

use std::collections::BTreeSet;

use metagraph_store::{
    ConditionTree, Predicate, PropertyCondition, Query, QueryOrder, QueryTarget,
};
use metagraph_store::fields;
use metagraph_types::{
    ClassificationMatch, EntitySearch, InstanceKind, InstanceStatus, PropertyMatch,
    RelationshipSearch, Sequencing, TypeRegistry,
};

use crate::error::{RepositoryError, RepositoryResult};

/// Builds store queries against a type registry.
pub struct QueryBuilder<'a> {
    registry: &'a dyn TypeRegistry,
}

impl<'a> QueryBuilder<'a> {
    pub fn new(registry: &'a dyn TypeRegistry) -> Self {
        Self { registry }
    }

    /// Build an entity search query. `text_index` routes the query to the
    /// accelerated text index when it carries a free-text predicate.
    pub fn entity_query(
        &self,
        search: &EntitySearch,
        text_index: bool,
    ) -> RepositoryResult<Query> {
        let mut predicates = Vec::new();
        if let Some(tree) = &search.properties {
            predicates.push(Predicate::Condition(property_tree(tree)));
        }
        if let Some(pattern) = &search.text {
            predicates.push(text_predicate(pattern)?);
        }
        for classification in &search.classifications {
            predicates.push(classification_predicate(classification));
        }
        if let Some(names) = self.type_closure(search.type_guid.as_deref(), &search.subtype_guids)? {
            predicates.push(Predicate::TypeIn(names));
        }
        predicates.push(Predicate::KindIs(InstanceKind::Entity));
        predicates.push(Predicate::StatusIn(status_allow_list(&search.statuses)));

        Ok(Query {
            predicates,
            order: sequencing_order(&search.sequencing),
            target: query_target(search.text.as_deref(), text_index),
        })
    }

    /// Build a relationship search query.
    pub fn relationship_query(
        &self,
        search: &RelationshipSearch,
        text_index: bool,
    ) -> RepositoryResult<Query> {
        let mut predicates = Vec::new();
        if let Some(tree) = &search.properties {
            predicates.push(Predicate::Condition(property_tree(tree)));
        }
        if let Some(pattern) = &search.text {
            predicates.push(text_predicate(pattern)?);
        }
        if let Some(names) = self.type_closure(search.type_guid.as_deref(), &search.subtype_guids)? {
            predicates.push(Predicate::TypeIn(names));
        }
        predicates.push(Predicate::KindIs(InstanceKind::Relationship));
        predicates.push(Predicate::StatusIn(status_allow_list(&search.statuses)));

        Ok(Query {
            predicates,
            order: sequencing_order(&search.sequencing),
            target: query_target(search.text.as_deref(), text_index),
        })
    }

    /// Query for the relationships touching one entity, optionally
    /// restricted by relationship type names and statuses.
    pub fn attached_relationships_query(
        &self,
        entity_guid: &str,
        type_names: &[String],
        statuses: &[InstanceStatus],
    ) -> Query {
        let mut predicates = vec![Predicate::EndpointGuid(entity_guid.to_string())];
        if !type_names.is_empty() {
            predicates.push(Predicate::TypeIn(type_names.iter().cloned().collect()));
        }
        predicates.push(Predicate::KindIs(InstanceKind::Relationship));
        predicates.push(Predicate::StatusIn(status_allow_list(statuses)));
        Query { predicates, ..Query::default() }
    }

    /// Expand a type filter to the transitive closure of subtype names.
    ///
    /// Returns `None` when no type filter applies. An explicit subtype set
    /// restricts the expansion to those subtrees. An unresolvable GUID is
    /// [`RepositoryError::TypeNotKnown`], distinct from "type known but no
    /// matches".
    pub fn type_closure(
        &self,
        type_guid: Option<&str>,
        subtype_guids: &[String],
    ) -> RepositoryResult<Option<BTreeSet<String>>> {
        if !subtype_guids.is_empty() {
            let mut closure = BTreeSet::new();
            for guid in subtype_guids {
                closure.extend(self.closure_of_guid(guid)?);
            }
            return Ok(Some(closure));
        }
        match type_guid {
            Some(guid) => Ok(Some(self.closure_of_guid(guid)?)),
            None => Ok(None),
        }
    }

    fn closure_of_guid(&self, guid: &str) -> RepositoryResult<BTreeSet<String>> {
        let name = self
            .registry
            .resolve_type_name(guid)
            .ok_or_else(|| RepositoryError::TypeNotKnown(guid.to_string()))?;

        let mut closure = BTreeSet::new();
        let mut frontier = vec![name];
        while let Some(current) = frontier.pop() {
            let children = self
                .registry
                .subtypes_of(&current)
                .ok_or_else(|| RepositoryError::TypeNotKnown(current.clone()))?;
            if closure.insert(current) {
                frontier.extend(children);
            }
        }
        Ok(closure)
    }
}

/// The status allow-list for a search; an empty request means every
/// non-deleted status.
pub fn status_allow_list(requested: &[InstanceStatus]) -> Vec<InstanceStatus> {
    if requested.is_empty() {
        InstanceStatus::all_active()
    } else {
        requested.to_vec()
    }
}

/// Apply the caller-side `from_element`/`page_size` window to a
/// deduplicated result list. A page size of zero means everything up to
/// the configured maximum.
pub fn apply_window<T>(
    items: Vec<T>,
    from_element: usize,
    page_size: usize,
    max_page_size: usize,
) -> Vec<T> {
    let size = if page_size == 0 {
        max_page_size
    } else {
        page_size.min(max_page_size)
    };
    items.into_iter().skip(from_element).take(size).collect()
}

fn property_tree(tree: &PropertyMatch) -> ConditionTree {
    convert_tree(tree, &fields::property)
}

fn convert_tree(tree: &PropertyMatch, field_name: &dyn Fn(&str) -> String) -> ConditionTree {
    match tree {
        PropertyMatch::All(children) => {
            ConditionTree::All(children.iter().map(|c| convert_tree(c, field_name)).collect())
        }
        PropertyMatch::Any(children) => {
            ConditionTree::Any(children.iter().map(|c| convert_tree(c, field_name)).collect())
        }
        PropertyMatch::NoneOf(children) => {
            ConditionTree::NoneOf(children.iter().map(|c| convert_tree(c, field_name)).collect())
        }
        PropertyMatch::Compare(comparison) => ConditionTree::Leaf(PropertyCondition {
            field: field_name(&comparison.name),
            op: comparison.op,
            value: comparison.value.clone(),
        }),
    }
}

fn classification_predicate(filter: &ClassificationMatch) -> Predicate {
    Predicate::Classification {
        name: filter.name.clone(),
        // Classification properties are stored under their raw names
        // inside the embedded classification, not namespaced.
        conditions: filter
            .properties
            .as_ref()
            .map(|tree| convert_tree(tree, &str::to_string)),
    }
}

fn text_predicate(pattern: &str) -> RepositoryResult<Predicate> {
    regex::Regex::new(pattern)
        .map_err(|e| RepositoryError::Validation(format!("invalid search expression: {e}")))?;
    Ok(Predicate::Text {
        pattern: pattern.to_string(),
        case_sensitive: true,
    })
}

fn sequencing_order(sequencing: &Sequencing) -> QueryOrder {
    match sequencing {
        Sequencing::ByGuid => QueryOrder::ByRef,
        Sequencing::ByProperty { name, ascending } => QueryOrder::ByField {
            field: fields::property(name),
            ascending: *ascending,
        },
    }
}

fn query_target(text: Option<&str>, text_index: bool) -> QueryTarget {
    if text_index && text.is_some() {
        QueryTarget::TextIndex
    } else {
        QueryTarget::Store
    }
}
