//! Delete and purge cascades over relationships with mixed home
//! collections.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use std::sync::Arc;

use chrono::Utc;
use metagraph_config::RepositoryConfig;
use metagraph_repository::{RepositoryConnector, RepositoryError};
use metagraph_store::{Document, DocumentStore, MemoryStore, Transaction};
use metagraph_test_fixtures::{
    test_entity, test_relationship, SimpleTypeRegistry, TEST_COLLECTION, TEST_USER,
};
use metagraph_types::{DocRef, Entity, InstanceKind, InstanceStatus, Provenance, Relationship};
use serde_json::json;

fn connector() -> RepositoryConnector {
    connector_over(MemoryStore::new())
}

fn connector_over(store: MemoryStore) -> RepositoryConnector {
    let config = RepositoryConfig {
        collection_id: Some(TEST_COLLECTION.to_string()),
        ..RepositoryConfig::default()
    };
    RepositoryConnector::builder()
        .store(Arc::new(store))
        .registry(Arc::new(SimpleTypeRegistry::with_default_catalog()))
        .config(config)
        .build()
}

/// A relationship copy mastered by another collection, endpoints already
/// in proxy form.
fn external_relationship(type_name: &str, end_one: &Entity, end_two: &Entity) -> Relationship {
    let mut relationship = test_relationship(
        type_name,
        end_one.proxy_view(&["qualifiedName".to_string()]),
        end_two.proxy_view(&["qualifiedName".to_string()]),
    );
    relationship.header.home_collection = "remote-collection".to_string();
    relationship.header.provenance = Provenance::External;
    relationship
}

#[tokio::test]
async fn test_delete_soft_deletes_local_and_purges_external_relationships() {
    let connector = connector();
    let asset = connector.add_entity(test_entity("Database")).await.unwrap().unwrap();
    let term = connector.add_entity(test_entity("GlossaryTerm")).await.unwrap().unwrap();
    let other_term = connector.add_entity(test_entity("GlossaryTerm")).await.unwrap().unwrap();

    let local = connector
        .add_relationship(test_relationship("SemanticAssignment", asset.clone(), term))
        .await
        .unwrap()
        .unwrap();
    let external = external_relationship("SemanticAssignment", &asset, &other_term);
    let external_guid = external.header.guid.clone();
    connector.save_relationship_reference_copy(external).await.unwrap();

    connector.delete_entity(&asset.header.guid, TEST_USER).await.unwrap();

    // The locally mastered relationship is soft-deleted and restorable.
    let deleted = connector.get_relationship(&local.header.guid).await.unwrap();
    assert_eq!(deleted.header.status, InstanceStatus::Deleted);
    assert_eq!(deleted.header.status_on_delete, Some(InstanceStatus::Active));

    // The external copy was purged outright.
    assert!(matches!(
        connector.get_relationship(&external_guid).await,
        Err(RepositoryError::NotFound(_))
    ));
}

#[tokio::test]
async fn test_purge_evicts_all_touching_relationships_any_status() {
    let connector = connector();
    let asset = connector.add_entity(test_entity("Database")).await.unwrap().unwrap();
    let term = connector.add_entity(test_entity("GlossaryTerm")).await.unwrap().unwrap();
    let relationship = connector
        .add_relationship(test_relationship("SemanticAssignment", asset.clone(), term.clone()))
        .await
        .unwrap()
        .unwrap();

    // The delete cascade already soft-deleted the relationship; purge must
    // still pick it up despite its Deleted status.
    connector.delete_entity(&asset.header.guid, TEST_USER).await.unwrap();
    connector.purge_entity(&asset.header.guid).await.unwrap();

    assert!(matches!(
        connector.get_relationship(&relationship.header.guid).await,
        Err(RepositoryError::NotFound(_))
    ));
    // The surviving endpoint is untouched.
    assert_eq!(
        connector.get_entity(&term.header.guid).await.unwrap().header.version,
        1
    );
}

#[tokio::test]
async fn test_delete_cascade_skips_relationships_of_other_entities() {
    let connector = connector();
    let a = connector.add_entity(test_entity("Database")).await.unwrap().unwrap();
    let b = connector.add_entity(test_entity("DataSet")).await.unwrap().unwrap();
    let term = connector.add_entity(test_entity("GlossaryTerm")).await.unwrap().unwrap();

    connector
        .add_relationship(test_relationship("SemanticAssignment", a.clone(), term.clone()))
        .await
        .unwrap();
    let unrelated = connector
        .add_relationship(test_relationship("SemanticAssignment", b, term))
        .await
        .unwrap()
        .unwrap();

    connector.delete_entity(&a.header.guid, TEST_USER).await.unwrap();

    let survivor = connector.get_relationship(&unrelated.header.guid).await.unwrap();
    assert_eq!(survivor.header.status, InstanceStatus::Active);
    assert_eq!(survivor.header.version, 1);
}

#[tokio::test]
async fn test_cascade_skips_unreadable_relationship_and_delete_proceeds() {
    let store = MemoryStore::new();
    let connector = connector_over(store.clone());
    let asset = connector.add_entity(test_entity("Database")).await.unwrap().unwrap();

    // A relationship document that matches the cascade query but cannot
    // be read back as a relationship (no header, no endpoints).
    let corrupt = Document {
        reference: DocRef::relationship("broken-rel"),
        kind: InstanceKind::Relationship,
        version: 1,
        valid_time: Utc::now(),
        body: json!({
            "instance/status": "Active",
            "rel/endOneGuid": asset.header.guid,
        }),
    };
    store.submit(Transaction::new().put(corrupt, Some(0))).await.unwrap();

    // The unreadable relationship is skipped; the delete itself lands.
    let deleted = connector
        .delete_entity(&asset.header.guid, TEST_USER)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(deleted.header.status, InstanceStatus::Deleted);
    assert_eq!(deleted.header.status_on_delete, Some(InstanceStatus::Active));
}

#[tokio::test]
async fn test_restore_after_cascade_does_not_revive_relationships() {
    let connector = connector();
    let asset = connector.add_entity(test_entity("Database")).await.unwrap().unwrap();
    let term = connector.add_entity(test_entity("GlossaryTerm")).await.unwrap().unwrap();
    let relationship = connector
        .add_relationship(test_relationship("SemanticAssignment", asset.clone(), term))
        .await
        .unwrap()
        .unwrap();

    connector.delete_entity(&asset.header.guid, TEST_USER).await.unwrap();
    let restored = connector.restore_entity(&asset.header.guid, TEST_USER).await.unwrap().unwrap();
    assert_eq!(restored.header.status, InstanceStatus::Active);

    // Relationship restore is a separate, explicit operation.
    let still_deleted = connector.get_relationship(&relationship.header.guid).await.unwrap();
    assert_eq!(still_deleted.header.status, InstanceStatus::Deleted);
}
