//! Entity and relationship search through the connector, plus version
//! history and point-in-time reads.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use metagraph_config::RepositoryConfig;
use metagraph_repository::{RepositoryConnector, RepositoryError};
use metagraph_store::MemoryStore;
use metagraph_test_fixtures::{
    test_entity, test_entity_named, test_relationship, SimpleTypeRegistry, TEST_COLLECTION,
    TEST_USER,
};
use metagraph_types::{
    ClassificationMatch, EntitySearch, HistoryOrder, HistoryRange, InstanceStatus, PropertyMatch,
    PropertyValue, RelationshipSearch, Sequencing, StringMode,
};

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

/// Mutation timestamps must be distinguishable for point-in-time reads.
async fn tick() {
    tokio::time::sleep(Duration::from_millis(5)).await;
}

#[tokio::test]
async fn test_find_entities_expands_type_closure() {
    let connector = connector();
    connector.add_entity(test_entity("Database")).await.unwrap();
    connector.add_entity(test_entity("DataSet")).await.unwrap();
    connector.add_entity(test_entity("GlossaryTerm")).await.unwrap();

    // Asset covers Database and DataSet but not GlossaryTerm.
    let search = EntitySearch { type_guid: Some("t-asset".to_string()), ..Default::default() };
    let found = connector.find_entities(&search).await.unwrap();
    assert_eq!(found.len(), 2);
    assert!(found.iter().all(|e| e.header.type_name != "GlossaryTerm"));

    let search = EntitySearch {
        type_guid: Some("t-referenceable".to_string()),
        ..Default::default()
    };
    assert_eq!(connector.find_entities(&search).await.unwrap().len(), 3);
}

#[tokio::test]
async fn test_proxy_only_entities_are_never_returned_as_details() {
    let connector = connector();
    let mut proxy = test_entity("Database");
    proxy.proxy_only = true;
    let guid = proxy.header.guid.clone();
    connector.add_entity(proxy).await.unwrap();
    connector.add_entity(test_entity("Database")).await.unwrap();
    tick().await;

    assert!(matches!(
        connector.get_entity(&guid).await,
        Err(RepositoryError::EntityProxyOnly(_))
    ));
    assert!(matches!(
        connector.get_entity_at(&guid, Utc::now()).await,
        Err(RepositoryError::EntityProxyOnly(_))
    ));

    // Searches return full details, so the proxy holding is invisible
    // there; only the real entity comes back.
    let found = connector.find_entities(&EntitySearch::default()).await.unwrap();
    assert_eq!(found.len(), 1);
    assert!(found.iter().all(|e| e.header.guid != guid));

    // The proxy is still locally known in summary form.
    assert!(connector.get_entity_summary(&guid).await.unwrap().is_proxy_only());
}

#[tokio::test]
async fn test_find_entities_unknown_type_guid_is_an_error() {
    let connector = connector();
    let search = EntitySearch { type_guid: Some("t-bogus".to_string()), ..Default::default() };
    assert!(matches!(
        connector.find_entities(&search).await,
        Err(RepositoryError::TypeNotKnown(_))
    ));
}

#[tokio::test]
async fn test_find_entities_by_property_and_text() {
    let connector = connector();
    connector
        .add_entity(test_entity_named("Database", "prod.orders"))
        .await
        .unwrap();
    connector
        .add_entity(test_entity_named("Database", "staging.orders"))
        .await
        .unwrap();
    connector
        .add_entity(test_entity_named("Database", "prod.customers"))
        .await
        .unwrap();

    let search = EntitySearch {
        properties: Some(PropertyMatch::like(
            "qualifiedName",
            "prod\\..*",
            StringMode::regex(),
        )),
        ..Default::default()
    };
    assert_eq!(connector.find_entities(&search).await.unwrap().len(), 2);

    let search = EntitySearch {
        properties: Some(PropertyMatch::eq(
            "qualifiedName",
            PropertyValue::String("staging.orders".to_string()),
        )),
        ..Default::default()
    };
    assert_eq!(connector.find_entities(&search).await.unwrap().len(), 1);

    // Free text is a full-match pattern over all string properties.
    let search = EntitySearch { text: Some(".*orders.*".to_string()), ..Default::default() };
    assert_eq!(connector.find_entities(&search).await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_text_index_enabled_search_is_equivalent() {
    let config = RepositoryConfig {
        collection_id: Some(TEST_COLLECTION.to_string()),
        text_index_enabled: true,
        ..RepositoryConfig::default()
    };
    let connector = RepositoryConnector::builder()
        .store(Arc::new(MemoryStore::new()))
        .registry(Arc::new(SimpleTypeRegistry::with_default_catalog()))
        .config(config)
        .build();
    connector.add_entity(test_entity_named("Database", "prod.orders")).await.unwrap();
    connector.add_entity(test_entity_named("Database", "staging.orders")).await.unwrap();

    // Routing to the accelerated index must not change the result set.
    let search = EntitySearch { text: Some(".*orders.*".to_string()), ..Default::default() };
    assert_eq!(connector.find_entities(&search).await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_find_entities_invalid_text_pattern_is_validation() {
    let connector = connector();
    let search = EntitySearch { text: Some("(unclosed".to_string()), ..Default::default() };
    assert!(matches!(
        connector.find_entities(&search).await,
        Err(RepositoryError::Validation(_))
    ));
}

#[tokio::test]
async fn test_find_entities_by_classification() {
    let connector = connector();
    let tagged = connector.add_entity(test_entity("Database")).await.unwrap().unwrap();
    connector.add_entity(test_entity("Database")).await.unwrap();
    connector
        .classify_entity(
            &tagged.header.guid,
            "Confidential",
            [("level".to_string(), PropertyValue::Int(3))].into(),
            TEST_USER,
        )
        .await
        .unwrap();

    let search = EntitySearch {
        classifications: vec![ClassificationMatch {
            name: "Confidential".to_string(),
            properties: None,
        }],
        ..Default::default()
    };
    let found = connector.find_entities(&search).await.unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].header.guid, tagged.header.guid);

    // Classification property filters use the raw property names.
    let search = EntitySearch {
        classifications: vec![ClassificationMatch {
            name: "Confidential".to_string(),
            properties: Some(PropertyMatch::eq("level", PropertyValue::Int(9))),
        }],
        ..Default::default()
    };
    assert!(connector.find_entities(&search).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_find_entities_status_allow_list_defaults_to_non_deleted() {
    let connector = connector();
    let doomed = connector.add_entity(test_entity("Database")).await.unwrap().unwrap();
    let draft = connector.add_entity(test_entity("Database")).await.unwrap().unwrap();
    connector
        .update_entity_status(&draft.header.guid, InstanceStatus::Draft, TEST_USER)
        .await
        .unwrap();
    connector.delete_entity(&doomed.header.guid, TEST_USER).await.unwrap();

    let search = EntitySearch::default();
    assert_eq!(connector.find_entities(&search).await.unwrap().len(), 1);

    let search = EntitySearch {
        statuses: vec![InstanceStatus::Deleted],
        ..Default::default()
    };
    let found = connector.find_entities(&search).await.unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].header.guid, doomed.header.guid);
}

#[tokio::test]
async fn test_find_entities_sequencing_and_paging() {
    let connector = connector();
    for name in ["c.table", "a.table", "b.table"] {
        connector.add_entity(test_entity_named("DataSet", name)).await.unwrap();
    }

    let search = EntitySearch {
        sequencing: Sequencing::ByProperty { name: "qualifiedName".to_string(), ascending: true },
        ..Default::default()
    };
    let names: Vec<_> = connector
        .find_entities(&search)
        .await
        .unwrap()
        .iter()
        .map(|e| e.properties.get("qualifiedName").cloned().unwrap())
        .collect();
    assert_eq!(
        names,
        vec![
            PropertyValue::String("a.table".to_string()),
            PropertyValue::String("b.table".to_string()),
            PropertyValue::String("c.table".to_string()),
        ]
    );

    // Two windows of one, then one window of two, over the same ordering.
    let page = |from_element, page_size| EntitySearch {
        sequencing: Sequencing::ByProperty { name: "qualifiedName".to_string(), ascending: true },
        from_element,
        page_size,
        ..Default::default()
    };
    let first = connector.find_entities(&page(0, 1)).await.unwrap();
    let second = connector.find_entities(&page(1, 1)).await.unwrap();
    let both = connector.find_entities(&page(0, 2)).await.unwrap();
    assert_eq!(
        vec![first[0].header.guid.clone(), second[0].header.guid.clone()],
        both.iter().map(|e| e.header.guid.clone()).collect::<Vec<_>>()
    );
}

#[tokio::test]
async fn test_find_relationships_and_attached_paging() {
    let connector = connector();
    let asset = connector.add_entity(test_entity("Database")).await.unwrap().unwrap();
    for _ in 0..3 {
        let term = connector.add_entity(test_entity("GlossaryTerm")).await.unwrap().unwrap();
        connector
            .add_relationship(test_relationship("SemanticAssignment", asset.clone(), term))
            .await
            .unwrap();
    }

    let search = RelationshipSearch {
        type_guid: Some("t-semantic-assignment".to_string()),
        ..Default::default()
    };
    assert_eq!(connector.find_relationships(&search).await.unwrap().len(), 3);

    let all = connector
        .relationships_for_entity(&asset.header.guid, &[], 0, 0)
        .await
        .unwrap();
    assert_eq!(all.len(), 3);
    let window = connector
        .relationships_for_entity(&asset.header.guid, &[], 1, 2)
        .await
        .unwrap();
    assert_eq!(window.len(), 2);
    assert_eq!(window[0].header.guid, all[1].header.guid);
}

#[tokio::test]
async fn test_point_in_time_read_sees_old_version() {
    let connector = connector();
    let created = connector.add_entity(test_entity("Database")).await.unwrap().unwrap();
    let guid = created.header.guid.clone();

    tick().await;
    let before_update = Utc::now();
    tick().await;

    connector
        .update_entity_properties(
            &guid,
            [("sizeGb".to_string(), PropertyValue::Int(42))].into(),
            TEST_USER,
        )
        .await
        .unwrap();

    let old = connector.get_entity_at(&guid, before_update).await.unwrap();
    assert_eq!(old.header.version, 1);
    assert!(!old.properties.contains_key("sizeGb"));

    let current = connector.get_entity(&guid).await.unwrap();
    assert_eq!(current.header.version, 2);
}

#[tokio::test]
async fn test_entity_history_order_bound_and_paging() {
    let connector = connector();
    let created = connector.add_entity(test_entity("Database")).await.unwrap().unwrap();
    let guid = created.header.guid.clone();

    tick().await;
    connector
        .update_entity_properties(
            &guid,
            [("v".to_string(), PropertyValue::Int(2))].into(),
            TEST_USER,
        )
        .await
        .unwrap();
    tick().await;
    let between = Utc::now();
    tick().await;
    connector
        .update_entity_properties(
            &guid,
            [("v".to_string(), PropertyValue::Int(3))].into(),
            TEST_USER,
        )
        .await
        .unwrap();

    let backward = connector
        .entity_history(&guid, &HistoryRange::default(), HistoryOrder::Backward)
        .await
        .unwrap();
    assert_eq!(
        backward.iter().map(|e| e.header.version).collect::<Vec<_>>(),
        vec![3, 2, 1]
    );

    let forward = connector
        .entity_history(&guid, &HistoryRange::default(), HistoryOrder::Forward)
        .await
        .unwrap();
    assert_eq!(
        forward.iter().map(|e| e.header.version).collect::<Vec<_>>(),
        vec![1, 2, 3]
    );

    // The version current at the bound is included, anything older is not.
    let range = HistoryRange { earliest: Some(between), ..Default::default() };
    let bounded = connector.entity_history(&guid, &range, HistoryOrder::Backward).await.unwrap();
    assert_eq!(
        bounded.iter().map(|e| e.header.version).collect::<Vec<_>>(),
        vec![3, 2]
    );

    // Two pages of one equal one page of two.
    let page = |offset, page_size| HistoryRange { earliest: None, offset, page_size };
    let first = connector
        .entity_history(&guid, &page(0, 1), HistoryOrder::Backward)
        .await
        .unwrap();
    let second = connector
        .entity_history(&guid, &page(1, 1), HistoryOrder::Backward)
        .await
        .unwrap();
    assert_eq!(first[0].header.version, 3);
    assert_eq!(second[0].header.version, 2);
}

#[tokio::test]
async fn test_history_of_unknown_instance_is_not_found() {
    let connector = connector();
    assert!(matches!(
        connector
            .entity_history("missing", &HistoryRange::default(), HistoryOrder::Backward)
            .await,
        Err(RepositoryError::NotFound(_))
    ));
    assert!(matches!(
        connector
            .relationship_history("missing", &HistoryRange::default(), HistoryOrder::Backward)
            .await,
        Err(RepositoryError::NotFound(_))
    ));
}
