//! Store query objects and predicate evaluation.
//!
//! A [`Query`] is built by the repository's query builder and consumed
//! opaquely by a backend. Predicates are evaluated in the order they were
//! emitted; builders put the most selective (property and text) predicates
//! first so that backends which short-circuit evaluate cheaply on broad
//! searches.

use std::collections::BTreeSet;

use metagraph_types::{InstanceKind, InstanceStatus, PropertyOp, PropertyValue, StringMode,
    StringStyle};
use serde::{Deserialize, Serialize};

use crate::error::{StoreError, StoreResult};
use crate::fields;
use crate::Document;

/// Which backend the query is aimed at. The accelerated text index, when
/// configured, must yield result sets equivalent to the main store up to
/// ordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum QueryTarget {
    #[default]
    Store,
    TextIndex,
}

/// Result ordering applied by the backend. Deduplication and paging are
/// the caller's responsibility.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum QueryOrder {
    #[default]
    ByRef,
    ByField {
        field: String,
        ascending: bool,
    },
}

/// A single comparison against one document body field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropertyCondition {
    pub field: String,
    pub op: PropertyOp,
    pub value: PropertyValue,
}

/// AND / OR / NOT tree over property conditions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ConditionTree {
    All(Vec<ConditionTree>),
    Any(Vec<ConditionTree>),
    NoneOf(Vec<ConditionTree>),
    Leaf(PropertyCondition),
}

/// A query predicate. Between them, predicates are conjunctive.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Predicate {
    /// Structured property comparisons; leaf fields are full body field
    /// names (already namespaced).
    Condition(ConditionTree),
    /// Free-text match over every string-valued property field. The
    /// pattern is a full-match regex.
    Text { pattern: String, case_sensitive: bool },
    /// A classification with the given name must be attached; leaf fields
    /// in the condition tree are raw classification property names.
    Classification { name: String, conditions: Option<ConditionTree> },
    /// The document type name must be in the set (subtype closure already
    /// expanded by the builder).
    TypeIn(BTreeSet<String>),
    /// The document status must be in the allow-list.
    StatusIn(Vec<InstanceStatus>),
    /// The document kind must match.
    KindIs(InstanceKind),
    /// A relationship endpoint must reference the given entity GUID.
    EndpointGuid(String),
}

/// An opaque store query.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Query {
    pub predicates: Vec<Predicate>,
    pub order: QueryOrder,
    pub target: QueryTarget,
}

impl Query {
    /// Evaluate every predicate against a document, in emission order.
    pub fn matches(&self, document: &Document) -> StoreResult<bool> {
        for predicate in &self.predicates {
            if !predicate.matches(document)? {
                return Ok(false);
            }
        }
        Ok(true)
    }
}

impl Predicate {
    pub fn matches(&self, document: &Document) -> StoreResult<bool> {
        let body = document.body.as_object().ok_or_else(|| {
            StoreError::Serialization("document body is not an object".to_string())
        })?;
        match self {
            Predicate::Condition(tree) => {
                eval_tree(tree, &|field| body.get(field).cloned())
            }
            Predicate::Text { pattern, case_sensitive } => {
                let regex = build_regex(pattern, *case_sensitive, true)?;
                for (field, value) in body {
                    if fields::property_name(field).is_none() {
                        continue;
                    }
                    if let Ok(PropertyValue::String(s)) =
                        serde_json::from_value::<PropertyValue>(value.clone())
                    {
                        if regex.is_match(&s) {
                            return Ok(true);
                        }
                    }
                }
                Ok(false)
            }
            Predicate::Classification { name, conditions } => {
                let Some(list) = body.get(fields::CLASSIFICATIONS).and_then(|v| v.as_array())
                else {
                    return Ok(false);
                };
                for item in list {
                    if item.get("name").and_then(|n| n.as_str()) != Some(name.as_str()) {
                        continue;
                    }
                    match conditions {
                        None => return Ok(true),
                        Some(tree) => {
                            let props = item.get("properties").cloned();
                            let matched = eval_tree(tree, &|field| {
                                props.as_ref().and_then(|p| p.get(field)).cloned()
                            })?;
                            if matched {
                                return Ok(true);
                            }
                        }
                    }
                }
                Ok(false)
            }
            Predicate::TypeIn(names) => Ok(body
                .get(fields::TYPE)
                .and_then(|v| v.as_str())
                .is_some_and(|t| names.contains(t))),
            Predicate::StatusIn(statuses) => Ok(body
                .get(fields::STATUS)
                .and_then(|v| v.as_str())
                .is_some_and(|s| statuses.iter().any(|allowed| allowed.as_str() == s))),
            Predicate::KindIs(kind) => Ok(document.kind == *kind),
            Predicate::EndpointGuid(guid) => {
                let matches_end = |field: &str| {
                    body.get(field).and_then(|v| v.as_str()) == Some(guid.as_str())
                };
                Ok(matches_end(fields::END_ONE_GUID) || matches_end(fields::END_TWO_GUID))
            }
        }
    }
}

fn eval_tree(
    tree: &ConditionTree,
    lookup: &dyn Fn(&str) -> Option<serde_json::Value>,
) -> StoreResult<bool> {
    match tree {
        ConditionTree::All(children) => {
            for child in children {
                if !eval_tree(child, lookup)? {
                    return Ok(false);
                }
            }
            Ok(true)
        }
        ConditionTree::Any(children) => {
            for child in children {
                if eval_tree(child, lookup)? {
                    return Ok(true);
                }
            }
            Ok(false)
        }
        ConditionTree::NoneOf(children) => {
            for child in children {
                if eval_tree(child, lookup)? {
                    return Ok(false);
                }
            }
            Ok(true)
        }
        ConditionTree::Leaf(condition) => eval_condition(condition, lookup),
    }
}

/// A comparison against an absent field never matches; negation is
/// expressed at the tree level.
fn eval_condition(
    condition: &PropertyCondition,
    lookup: &dyn Fn(&str) -> Option<serde_json::Value>,
) -> StoreResult<bool> {
    let Some(raw) = lookup(&condition.field) else {
        return Ok(false);
    };
    let actual: PropertyValue =
        serde_json::from_value(raw).map_err(StoreError::serialization)?;

    match condition.op {
        PropertyOp::Eq => Ok(actual == condition.value),
        PropertyOp::Neq => Ok(actual != condition.value),
        PropertyOp::Lt => Ok(actual.compare(&condition.value) == std::cmp::Ordering::Less),
        PropertyOp::Lte => Ok(actual.compare(&condition.value) != std::cmp::Ordering::Greater),
        PropertyOp::Gt => Ok(actual.compare(&condition.value) == std::cmp::Ordering::Greater),
        PropertyOp::Gte => Ok(actual.compare(&condition.value) != std::cmp::Ordering::Less),
        PropertyOp::Like(mode) => {
            let (PropertyValue::String(haystack), PropertyValue::String(needle)) =
                (&actual, &condition.value)
            else {
                return Ok(false);
            };
            string_match(haystack, needle, mode)
        }
    }
}

/// Match a string under the given mode. `Exact` compares whole strings,
/// `Contains` is a substring test, `Regex` is a full-string regex match.
pub fn string_match(haystack: &str, needle: &str, mode: StringMode) -> StoreResult<bool> {
    match mode.style {
        StringStyle::Exact => {
            if mode.case_sensitive {
                Ok(haystack == needle)
            } else {
                Ok(haystack.eq_ignore_ascii_case(needle))
            }
        }
        StringStyle::Contains => {
            if mode.case_sensitive {
                Ok(haystack.contains(needle))
            } else {
                Ok(haystack.to_lowercase().contains(&needle.to_lowercase()))
            }
        }
        StringStyle::Regex => {
            let regex = build_regex(needle, mode.case_sensitive, true)?;
            Ok(regex.is_match(haystack))
        }
    }
}

fn build_regex(pattern: &str, case_sensitive: bool, anchored: bool) -> StoreResult<regex::Regex> {
    let pattern = if anchored {
        format!("^(?:{pattern})$")
    } else {
        pattern.to_string()
    };
    regex::RegexBuilder::new(&pattern)
        .case_insensitive(!case_sensitive)
        .build()
        .map_err(|e| StoreError::Internal(format!("invalid regex predicate: {e}")))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use chrono::Utc;
    use metagraph_types::DocRef;
    use serde_json::json;

    use super::*;

    fn doc(body: serde_json::Value) -> Document {
        Document {
            reference: DocRef::entity("g1"),
            kind: InstanceKind::Entity,
            version: 1,
            valid_time: Utc::now(),
            body,
        }
    }

    fn prop_json(value: &PropertyValue) -> serde_json::Value {
        serde_json::to_value(value).unwrap()
    }

    #[test]
    fn test_type_predicate() {
        let document = doc(json!({ "instance/type": "Database" }));
        let mut names = BTreeSet::new();
        names.insert("Database".to_string());
        assert!(Predicate::TypeIn(names.clone()).matches(&document).unwrap());

        let document = doc(json!({ "instance/type": "GlossaryTerm" }));
        assert!(!Predicate::TypeIn(names).matches(&document).unwrap());
    }

    #[test]
    fn test_status_predicate() {
        let document = doc(json!({ "instance/status": "Active" }));
        let allow = vec![InstanceStatus::Active, InstanceStatus::Draft];
        assert!(Predicate::StatusIn(allow.clone()).matches(&document).unwrap());

        let document = doc(json!({ "instance/status": "Deleted" }));
        assert!(!Predicate::StatusIn(allow).matches(&document).unwrap());
    }

    #[test]
    fn test_condition_eq_and_absent_field() {
        let document = doc(json!({
            "props/level": prop_json(&PropertyValue::Int(5)),
        }));
        let tree = ConditionTree::Leaf(PropertyCondition {
            field: "props/level".to_string(),
            op: PropertyOp::Eq,
            value: PropertyValue::Int(5),
        });
        assert!(Predicate::Condition(tree).matches(&document).unwrap());

        let absent = ConditionTree::Leaf(PropertyCondition {
            field: "props/missing".to_string(),
            op: PropertyOp::Eq,
            value: PropertyValue::Int(5),
        });
        assert!(!Predicate::Condition(absent).matches(&document).unwrap());
    }

    #[test]
    fn test_condition_tree_combinators() {
        let document = doc(json!({
            "props/a": prop_json(&PropertyValue::Int(1)),
            "props/b": prop_json(&PropertyValue::Int(2)),
        }));
        let leaf = |field: &str, value: i64| {
            ConditionTree::Leaf(PropertyCondition {
                field: field.to_string(),
                op: PropertyOp::Eq,
                value: PropertyValue::Int(value),
            })
        };

        let all = ConditionTree::All(vec![leaf("props/a", 1), leaf("props/b", 2)]);
        assert!(Predicate::Condition(all).matches(&document).unwrap());

        let any = ConditionTree::Any(vec![leaf("props/a", 9), leaf("props/b", 2)]);
        assert!(Predicate::Condition(any).matches(&document).unwrap());

        let none = ConditionTree::NoneOf(vec![leaf("props/a", 1)]);
        assert!(!Predicate::Condition(none).matches(&document).unwrap());
    }

    #[test]
    fn test_like_modes() {
        let value = "Customer Ledger";
        assert!(string_match(value, "Customer Ledger", StringMode::exact()).unwrap());
        assert!(!string_match(value, "customer ledger", StringMode::exact()).unwrap());
        assert!(string_match(value, "customer ledger", StringMode::exact().ignore_case()).unwrap());
        assert!(string_match(value, "Ledger", StringMode::contains()).unwrap());
        assert!(string_match(value, "Cust.*", StringMode::regex()).unwrap());
        // Regex matches are anchored, substring hits are not enough.
        assert!(!string_match(value, "Ledger", StringMode::regex()).unwrap());
    }

    #[test]
    fn test_text_predicate_spans_all_string_properties() {
        let document = doc(json!({
            "props/displayName": prop_json(&PropertyValue::String("payroll db".to_string())),
            "props/level": prop_json(&PropertyValue::Int(3)),
        }));
        let hit = Predicate::Text { pattern: ".*payroll.*".to_string(), case_sensitive: true };
        assert!(hit.matches(&document).unwrap());

        let miss = Predicate::Text { pattern: ".*ledger.*".to_string(), case_sensitive: true };
        assert!(!miss.matches(&document).unwrap());
    }

    #[test]
    fn test_classification_predicate() {
        let document = doc(json!({
            "classifications": [{
                "name": "Confidential",
                "properties": {
                    "level": prop_json(&PropertyValue::Int(3)),
                },
            }],
        }));

        let by_name =
            Predicate::Classification { name: "Confidential".to_string(), conditions: None };
        assert!(by_name.matches(&document).unwrap());

        let with_props = Predicate::Classification {
            name: "Confidential".to_string(),
            conditions: Some(ConditionTree::Leaf(PropertyCondition {
                field: "level".to_string(),
                op: PropertyOp::Gte,
                value: PropertyValue::Int(3),
            })),
        };
        assert!(with_props.matches(&document).unwrap());

        let wrong_name =
            Predicate::Classification { name: "PublicData".to_string(), conditions: None };
        assert!(!wrong_name.matches(&document).unwrap());
    }

    #[test]
    fn test_endpoint_predicate() {
        let document = Document {
            reference: DocRef::relationship("r1"),
            kind: InstanceKind::Relationship,
            version: 1,
            valid_time: Utc::now(),
            body: json!({ "rel/endOneGuid": "g1", "rel/endTwoGuid": "g2" }),
        };
        assert!(Predicate::EndpointGuid("g1".to_string()).matches(&document).unwrap());
        assert!(Predicate::EndpointGuid("g2".to_string()).matches(&document).unwrap());
        assert!(!Predicate::EndpointGuid("g3".to_string()).matches(&document).unwrap());
    }
}
