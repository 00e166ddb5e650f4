//! Typed property values carried by instances.
//!
//! Every property declares its primitive or collection kind so that a
//! value written through the document mapper round-trips exactly,
//! including enum ordinals and nested collections.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A property bag keyed by namespaced property name.
pub type Properties = BTreeMap<String, PropertyValue>;

/// A typed property value.
///
/// The tag is serialized alongside the value so that, for example, an
/// integer-valued property is never silently widened into a float when it
/// passes through a document body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value")]
pub enum PropertyValue {
    String(String),
    Int(i64),
    Float(f64),
    Boolean(bool),
    Date(DateTime<Utc>),
    /// An enumeration literal: the ordinal is authoritative, the symbol is
    /// carried for readability.
    Enum { ordinal: i32, symbol: String },
    Array(Vec<PropertyValue>),
    Map(BTreeMap<String, PropertyValue>),
}

impl PropertyValue {
    /// Returns the string content if this is a string-valued property.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            PropertyValue::String(s) => Some(s),
            _ => None,
        }
    }

    /// Returns true for string-valued properties, the domain of free-text
    /// search predicates.
    pub fn is_string(&self) -> bool {
        matches!(self, PropertyValue::String(_))
    }

    /// Total ordering across values of the same kind; values of different
    /// kinds compare by kind tag so that sequencing by property is stable.
    pub fn compare(&self, other: &PropertyValue) -> std::cmp::Ordering {
        use std::cmp::Ordering;
        match (self, other) {
            (PropertyValue::String(a), PropertyValue::String(b)) => a.cmp(b),
            (PropertyValue::Int(a), PropertyValue::Int(b)) => a.cmp(b),
            (PropertyValue::Float(a), PropertyValue::Float(b)) => {
                a.partial_cmp(b).unwrap_or(Ordering::Equal)
            }
            (PropertyValue::Boolean(a), PropertyValue::Boolean(b)) => a.cmp(b),
            (PropertyValue::Date(a), PropertyValue::Date(b)) => a.cmp(b),
            (PropertyValue::Enum { ordinal: a, .. }, PropertyValue::Enum { ordinal: b, .. }) => {
                a.cmp(b)
            }
            (a, b) => a.kind_tag().cmp(&b.kind_tag()),
        }
    }

    fn kind_tag(&self) -> u8 {
        match self {
            PropertyValue::String(_) => 0,
            PropertyValue::Int(_) => 1,
            PropertyValue::Float(_) => 2,
            PropertyValue::Boolean(_) => 3,
            PropertyValue::Date(_) => 4,
            PropertyValue::Enum { .. } => 5,
            PropertyValue::Array(_) => 6,
            PropertyValue::Map(_) => 7,
        }
    }
}
