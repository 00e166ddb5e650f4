//! Helpers for creating test instances with sensible defaults.

use chrono::Utc;
use metagraph_types::{
    new_guid, Classification, Entity, InstanceHeader, InstanceStatus, Properties, PropertyValue,
    Relationship,
};

/// Collection id used for locally mastered test instances.
pub const TEST_COLLECTION: &str = "test-collection";

/// User name stamped into test audit info.
pub const TEST_USER: &str = "tester";

/// Create an active test entity of the given type with a generated GUID
/// and a `qualifiedName` property derived from it.
pub fn test_entity(type_name: &str) -> Entity {
    let guid = new_guid();
    let qualified_name = format!("{type_name}::{guid}");
    entity_with(type_name, guid, &qualified_name)
}

/// Create an active test entity with an explicit `qualifiedName`.
pub fn test_entity_named(type_name: &str, qualified_name: &str) -> Entity {
    entity_with(type_name, new_guid(), qualified_name)
}

fn entity_with(type_name: &str, guid: String, qualified_name: &str) -> Entity {
    let mut properties = Properties::new();
    properties.insert(
        "qualifiedName".to_string(),
        PropertyValue::String(qualified_name.to_string()),
    );
    Entity {
        header: InstanceHeader::new(
            guid,
            type_name,
            InstanceStatus::Active,
            TEST_COLLECTION,
            TEST_USER,
            Utc::now(),
        ),
        properties,
        classifications: Vec::new(),
        proxy_only: false,
    }
}

/// Create an active test relationship between two entities.
pub fn test_relationship(type_name: &str, end_one: Entity, end_two: Entity) -> Relationship {
    Relationship {
        header: InstanceHeader::new(
            new_guid(),
            type_name,
            InstanceStatus::Active,
            TEST_COLLECTION,
            TEST_USER,
            Utc::now(),
        ),
        properties: Properties::new(),
        end_one,
        end_two,
    }
}

/// Create an assigned test classification with no properties.
pub fn test_classification(name: &str) -> Classification {
    Classification::assigned(name, Properties::new(), TEST_USER, Utc::now())
}
