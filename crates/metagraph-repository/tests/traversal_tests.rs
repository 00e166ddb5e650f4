//! Neighborhood expansion and path search over a small semantic graph.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use std::sync::Arc;

use metagraph_config::RepositoryConfig;
use metagraph_repository::{RepositoryConnector, RepositoryError};
use metagraph_store::MemoryStore;
use metagraph_test_fixtures::{
    test_entity, test_relationship, SimpleTypeRegistry, TEST_COLLECTION, TEST_USER,
};
use metagraph_types::{Entity, NeighborhoodSpec};

fn connector() -> RepositoryConnector {
    let config = RepositoryConfig {
        collection_id: Some(TEST_COLLECTION.to_string()),
        ..RepositoryConfig::default()
    };
    RepositoryConnector::builder()
        .store(Arc::new(MemoryStore::new()))
        .registry(Arc::new(SimpleTypeRegistry::with_default_catalog()))
        .config(config)
        .build()
}

async fn entity(connector: &RepositoryConnector, type_name: &str) -> Entity {
    connector.add_entity(test_entity(type_name)).await.unwrap().unwrap()
}

async fn link(connector: &RepositoryConnector, one: &Entity, two: &Entity) {
    connector
        .add_relationship(test_relationship("SemanticAssignment", one.clone(), two.clone()))
        .await
        .unwrap();
}

#[tokio::test]
async fn test_neighborhood_level_one_is_direct_neighbors_only() {
    let connector = connector();
    let a = entity(&connector, "Database").await;
    let b = entity(&connector, "GlossaryTerm").await;
    let c = entity(&connector, "GlossaryTerm").await;
    let d = entity(&connector, "DataSet").await;
    link(&connector, &a, &b).await;
    link(&connector, &a, &c).await;
    link(&connector, &d, &b).await; // two hops from a

    let graph = connector
        .entity_neighborhood(&a.header.guid, &NeighborhoodSpec::with_level(1))
        .await
        .unwrap();

    assert_eq!(graph.entities.len(), 3);
    assert!(graph.contains_entity(&a.header.guid));
    assert!(graph.contains_entity(&b.header.guid));
    assert!(graph.contains_entity(&c.header.guid));
    assert!(!graph.contains_entity(&d.header.guid));
    assert_eq!(graph.relationships.len(), 2);
}

#[tokio::test]
async fn test_neighborhood_without_relationships_keeps_entities() {
    let connector = connector();
    let a = entity(&connector, "Database").await;
    let b = entity(&connector, "GlossaryTerm").await;
    link(&connector, &a, &b).await;

    let spec = NeighborhoodSpec { level: 1, include_relationships: false, ..Default::default() };
    let graph = connector.entity_neighborhood(&a.header.guid, &spec).await.unwrap();

    assert_eq!(graph.entities.len(), 2);
    assert!(graph.relationships.is_empty());
}

#[tokio::test]
async fn test_neighborhood_unbounded_reaches_transitive_neighbors() {
    let connector = connector();
    let a = entity(&connector, "Database").await;
    let b = entity(&connector, "GlossaryTerm").await;
    let c = entity(&connector, "DataSet").await;
    link(&connector, &a, &b).await;
    link(&connector, &c, &b).await;

    let graph = connector
        .entity_neighborhood(&a.header.guid, &NeighborhoodSpec::unbounded())
        .await
        .unwrap();

    assert_eq!(graph.entities.len(), 3);
    assert_eq!(graph.relationships.len(), 2);
}

#[tokio::test]
async fn test_neighborhood_entity_type_filter_prunes_subtree() {
    let connector = connector();
    let a = entity(&connector, "Database").await;
    let term = entity(&connector, "GlossaryTerm").await;
    let dataset = entity(&connector, "DataSet").await;
    link(&connector, &a, &term).await;
    link(&connector, &dataset, &term).await;

    let spec = NeighborhoodSpec {
        entity_types: vec!["GlossaryTerm".to_string()],
        ..NeighborhoodSpec::unbounded()
    };
    let graph = connector.entity_neighborhood(&a.header.guid, &spec).await.unwrap();

    // Only the term is admissible, so the dataset behind it is never
    // reached either.
    assert_eq!(graph.entities.len(), 2);
    assert!(graph.contains_entity(&term.header.guid));
    assert!(!graph.contains_entity(&dataset.header.guid));
    assert_eq!(graph.relationships.len(), 1);
}

#[tokio::test]
async fn test_neighborhood_excludes_deleted_neighbors() {
    let connector = connector();
    let a = entity(&connector, "Database").await;
    let b = entity(&connector, "GlossaryTerm").await;
    let c = entity(&connector, "GlossaryTerm").await;
    link(&connector, &a, &b).await;
    link(&connector, &a, &c).await;

    // Deleting c also soft-deletes its attached relationship, so neither
    // shows up in a default-status traversal.
    connector.delete_entity(&c.header.guid, TEST_USER).await.unwrap();

    let graph = connector
        .entity_neighborhood(&a.header.guid, &NeighborhoodSpec::with_level(1))
        .await
        .unwrap();
    assert_eq!(graph.entities.len(), 2);
    assert!(!graph.contains_entity(&c.header.guid));
    assert_eq!(graph.relationships.len(), 1);
}

#[tokio::test]
async fn test_neighborhood_missing_start_is_not_found() {
    let connector = connector();
    assert!(matches!(
        connector.entity_neighborhood("missing", &NeighborhoodSpec::with_level(1)).await,
        Err(RepositoryError::NotFound(_))
    ));
}

#[tokio::test]
async fn test_paths_between_excludes_dead_end_branches() {
    let connector = connector();
    // a -- b -- c -- d, plus a dead-end branch a -- e.
    let a = entity(&connector, "Database").await;
    let b = entity(&connector, "GlossaryTerm").await;
    let c = entity(&connector, "DataSet").await;
    let d = entity(&connector, "GlossaryTerm").await;
    let e = entity(&connector, "GlossaryTerm").await;
    link(&connector, &a, &b).await;
    link(&connector, &c, &b).await;
    link(&connector, &c, &d).await;
    link(&connector, &a, &e).await;

    let graph = connector
        .linking_entities(&a.header.guid, &d.header.guid, &[])
        .await
        .unwrap();

    assert_eq!(graph.entities.len(), 4);
    for node in [&a, &b, &c, &d] {
        assert!(graph.contains_entity(&node.header.guid));
    }
    assert!(!graph.contains_entity(&e.header.guid));
    assert_eq!(graph.relationships.len(), 3);
}

#[tokio::test]
async fn test_paths_between_disconnected_is_empty() {
    let connector = connector();
    let a = entity(&connector, "Database").await;
    let b = entity(&connector, "GlossaryTerm").await;

    let graph = connector
        .linking_entities(&a.header.guid, &b.header.guid, &[])
        .await
        .unwrap();
    assert!(graph.is_empty());
}

#[tokio::test]
async fn test_paths_between_same_entity_is_start_only() {
    let connector = connector();
    let a = entity(&connector, "Database").await;

    let graph = connector
        .linking_entities(&a.header.guid, &a.header.guid, &[])
        .await
        .unwrap();
    assert_eq!(graph.entities.len(), 1);
    assert!(graph.relationships.is_empty());
}
