//! A map-backed type registry with a small realistic hierarchy.

use std::collections::{BTreeMap, BTreeSet};

use metagraph_types::{InstanceStatus, RelationshipEnds, TypeRegistry};

#[derive(Debug, Clone)]
struct TypeDef {
    guid: String,
    supertype: Option<String>,
    statuses: Vec<InstanceStatus>,
    unique_properties: Vec<String>,
    ends: Option<RelationshipEnds>,
}

/// In-memory [`TypeRegistry`] for tests.
///
/// The default catalog models a slice of an asset-catalog type system:
///
/// ```text
/// Referenceable
/// ├── Asset
/// │   ├── DataSet
/// │   └── Database
/// └── GlossaryTerm
/// ```
///
/// with two relationship types, `SemanticAssignment` (any referenceable to
/// a glossary term) and `DataContentForDataSet` (asset to data set).
#[derive(Debug, Clone, Default)]
pub struct SimpleTypeRegistry {
    defs: BTreeMap<String, TypeDef>,
    by_guid: BTreeMap<String, String>,
}

impl SimpleTypeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The standard test catalog described in the type-level docs.
    pub fn with_default_catalog() -> Self {
        let mut registry = Self::new();
        registry.add_entity_type("Referenceable", "t-referenceable", None, &["qualifiedName"]);
        registry.add_entity_type("Asset", "t-asset", Some("Referenceable"), &[]);
        registry.add_entity_type("DataSet", "t-dataset", Some("Asset"), &[]);
        registry.add_entity_type("Database", "t-database", Some("Asset"), &[]);
        registry.add_entity_type("GlossaryTerm", "t-glossary-term", Some("Referenceable"), &[]);
        registry.add_relationship_type(
            "SemanticAssignment",
            "t-semantic-assignment",
            &["Referenceable", "Asset", "DataSet", "Database", "GlossaryTerm"],
            &["GlossaryTerm"],
        );
        registry.add_relationship_type(
            "DataContentForDataSet",
            "t-data-content",
            &["Asset", "DataSet", "Database"],
            &["DataSet"],
        );
        registry
    }

    pub fn add_entity_type(
        &mut self,
        name: &str,
        guid: &str,
        supertype: Option<&str>,
        unique_properties: &[&str],
    ) {
        self.insert(
            name,
            TypeDef {
                guid: guid.to_string(),
                supertype: supertype.map(str::to_string),
                statuses: InstanceStatus::all_active(),
                unique_properties: unique_properties.iter().map(|p| p.to_string()).collect(),
                ends: None,
            },
        );
    }

    pub fn add_relationship_type(
        &mut self,
        name: &str,
        guid: &str,
        end_one: &[&str],
        end_two: &[&str],
    ) {
        let to_set = |names: &[&str]| names.iter().map(|n| n.to_string()).collect();
        self.insert(
            name,
            TypeDef {
                guid: guid.to_string(),
                supertype: None,
                statuses: InstanceStatus::all_active(),
                unique_properties: Vec::new(),
                ends: Some(RelationshipEnds {
                    end_one: to_set(end_one),
                    end_two: to_set(end_two),
                }),
            },
        );
    }

    fn insert(&mut self, name: &str, def: TypeDef) {
        self.by_guid.insert(def.guid.clone(), name.to_string());
        self.defs.insert(name.to_string(), def);
    }
}

impl TypeRegistry for SimpleTypeRegistry {
    fn resolve_type_name(&self, guid: &str) -> Option<String> {
        self.by_guid.get(guid).cloned()
    }

    fn subtypes_of(&self, name: &str) -> Option<BTreeSet<String>> {
        self.defs.get(name)?;
        Some(
            self.defs
                .iter()
                .filter(|(_, def)| def.supertype.as_deref() == Some(name))
                .map(|(child, _)| child.clone())
                .collect(),
        )
    }

    fn valid_statuses(&self, name: &str) -> Option<Vec<InstanceStatus>> {
        self.defs.get(name).map(|def| def.statuses.clone())
    }

    fn relationship_ends(&self, name: &str) -> Option<RelationshipEnds> {
        self.defs.get(name).and_then(|def| def.ends.clone())
    }

    fn unique_properties(&self, name: &str) -> Vec<String> {
        // Unique properties are inherited down the supertype chain.
        let mut collected = Vec::new();
        let mut current = Some(name.to_string());
        while let Some(type_name) = current {
            let Some(def) = self.defs.get(&type_name) else {
                break;
            };
            for property in &def.unique_properties {
                if !collected.contains(property) {
                    collected.push(property.clone());
                }
            }
            current = def.supertype.clone();
        }
        collected
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_catalog_hierarchy() {
        let registry = SimpleTypeRegistry::with_default_catalog();

        let children = registry.subtypes_of("Referenceable").unwrap();
        assert!(children.contains("Asset"));
        assert!(children.contains("GlossaryTerm"));
        assert!(!children.contains("DataSet")); // not a direct subtype

        let leaves = registry.subtypes_of("Database").unwrap();
        assert!(leaves.is_empty());

        assert!(registry.subtypes_of("NoSuchType").is_none());
    }

    #[test]
    fn test_guid_resolution() {
        let registry = SimpleTypeRegistry::with_default_catalog();
        assert_eq!(registry.resolve_type_name("t-asset").as_deref(), Some("Asset"));
        assert!(registry.resolve_type_name("t-missing").is_none());
    }

    #[test]
    fn test_unique_properties_inherited() {
        let registry = SimpleTypeRegistry::with_default_catalog();
        assert_eq!(registry.unique_properties("Database"), vec!["qualifiedName".to_string()]);
    }

    #[test]
    fn test_relationship_ends() {
        let registry = SimpleTypeRegistry::with_default_catalog();
        let ends = registry.relationship_ends("SemanticAssignment").unwrap();
        assert!(ends.end_one.contains("Database"));
        assert!(ends.end_two.contains("GlossaryTerm"));
        assert!(!ends.end_two.contains("Database"));

        assert!(registry.relationship_ends("Asset").is_none());
    }
}
