//! Repository connector facade.
//!
//! This module provides [`RepositoryConnector`], the single owner of the
//! store handle and the operation surface consumed by the API layer.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────┐
//! │              RepositoryConnector                │
//! │     (facade owned by the API layer caller)      │
//! ├──────────┬──────────────┬───────────────────────┤
//! │ QueryBld │ TxFunctions  │    GraphTraversal     │
//! │  mapper  │   history    │                       │
//! └──────────┴──────────────┴───────────────────────┘
//!                      │
//!                      ▼
//!             DocumentStore (dyn)
//! ```
//!
//! All multi-query reads open exactly one snapshot and reuse it; writes go
//! through the transaction function engine one transaction per logical
//! operation. Query and traversal calls are bounded by the configured
//! timeout and report overruns as [`RepositoryError::Timeout`].

use std::collections::BTreeSet;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use tracing::{debug, Instrument};

use metagraph_config::RepositoryConfig;
use metagraph_observe::logging::{
    instance_span, log_slow_query, record_instance_result, record_search_result,
    record_traversal_result, search_span, traversal_span,
};
use metagraph_store::{Document, DocumentStore, Snapshot};
use metagraph_types::{
    new_guid, DocRef, Entity, EntitySearch, HistoryOrder, HistoryRange, InstanceGraph,
    InstanceStatus, NeighborhoodSpec, Properties, Relationship, RelationshipSearch, TypeRegistry,
};

use crate::error::{RepositoryError, RepositoryResult};
use crate::functions::TxFunctions;
use crate::history;
use crate::mapper;
use crate::query::{apply_window, QueryBuilder};
use crate::traverse::GraphTraversal;

/// Queries slower than this are logged as warnings.
const SLOW_QUERY_THRESHOLD_MS: u128 = 1_000;

/// The repository connector: owns the store session and orchestrates the
/// mapper, query builder, transaction functions, history accessor, and
/// traversal engine.
pub struct RepositoryConnector {
    store: Arc<dyn DocumentStore>,
    registry: Arc<dyn TypeRegistry>,
    config: RepositoryConfig,
    collection_id: String,
}

#[bon::bon]
impl RepositoryConnector {
    /// Create a connector over a store and type registry.
    ///
    /// # Example
    ///
    /// ```ignore
    /// let connector = RepositoryConnector::builder()
    ///     .store(Arc::new(MemoryStore::new()))
    ///     .registry(Arc::new(registry))
    ///     .build();
    /// ```
    #[builder]
    pub fn new(
        store: Arc<dyn DocumentStore>,
        registry: Arc<dyn TypeRegistry>,
        config: Option<RepositoryConfig>,
    ) -> Self {
        let config = config.unwrap_or_default();
        let collection_id = config.collection_id.clone().unwrap_or_else(new_guid);
        debug!(collection_id = %collection_id, "Repository connector created");
        Self { store, registry, config, collection_id }
    }
}

impl RepositoryConnector {
    /// Identifier of the metadata collection this connector masters.
    pub fn collection_id(&self) -> &str {
        &self.collection_id
    }

    pub fn collection_name(&self) -> &str {
        &self.config.collection_name
    }

    // =========================================================================
    // Entity reads
    // =========================================================================

    /// Fetch the full detail of an entity. A proxy-only entity is never
    /// returned where a detail is required.
    pub async fn get_entity(&self, guid: &str) -> RepositoryResult<Entity> {
        let span = instance_span("get_entity", guid);
        let started = Instant::now();
        let entity = self.get_entity_summary(guid).instrument(span.clone()).await?;
        if entity.is_proxy_only() {
            return Err(RepositoryError::EntityProxyOnly(guid.to_string()));
        }
        record_instance_result(&span, entity.header.version, started.elapsed().as_millis());
        Ok(entity)
    }

    /// Fetch an entity in whatever form it is held, proxy included.
    pub async fn get_entity_summary(&self, guid: &str) -> RepositoryResult<Entity> {
        let snapshot = self.store.snapshot().await?;
        self.entity_from(snapshot.as_ref(), guid).await
    }

    /// The entity if it is held locally in any form, without error on
    /// absence.
    pub async fn is_entity_known(&self, guid: &str) -> RepositoryResult<Option<Entity>> {
        let snapshot = self.store.snapshot().await?;
        match snapshot.get(&DocRef::entity(guid)).await? {
            Some(document) => Ok(Some(mapper::entity_from_document(&document)?)),
            None => Ok(None),
        }
    }

    /// Fetch the full detail of an entity as it was valid at the given
    /// moment. A proxy-only entity is never returned where a detail is
    /// required.
    pub async fn get_entity_at(
        &self,
        guid: &str,
        as_of: DateTime<Utc>,
    ) -> RepositoryResult<Entity> {
        let snapshot = self.store.snapshot_at(as_of).await?;
        let entity = self.entity_from(snapshot.as_ref(), guid).await?;
        if entity.is_proxy_only() {
            return Err(RepositoryError::EntityProxyOnly(guid.to_string()));
        }
        Ok(entity)
    }

    /// Search for entities. Results are deduplicated by reference before
    /// the paging window is applied.
    pub async fn find_entities(&self, search: &EntitySearch) -> RepositoryResult<Vec<Entity>> {
        let span = search_span("find_entities", search.type_guid.as_deref());
        let started = Instant::now();
        let query = QueryBuilder::new(self.registry.as_ref())
            .entity_query(search, self.config.text_index_enabled)?;
        let documents = self
            .timed(async {
                let snapshot = self.store.snapshot().await?;
                Ok(snapshot.search(&query).await?)
            })
            .instrument(span.clone())
            .await?;
        // Searches return full details, so proxy-only holdings are
        // filtered before the window is applied.
        let entities = dedup_by_reference(documents)
            .iter()
            .map(mapper::entity_from_document)
            .filter(|entity| !matches!(entity, Ok(e) if e.is_proxy_only()))
            .collect::<RepositoryResult<Vec<_>>>()?;
        let page = apply_window(
            entities,
            search.from_element,
            search.page_size,
            self.config.max_page_size,
        );
        let elapsed = started.elapsed().as_millis();
        record_search_result(&span, page.len(), elapsed);
        log_slow_query("find_entities", elapsed, SLOW_QUERY_THRESHOLD_MS);
        Ok(page)
    }

    // =========================================================================
    // Relationship reads
    // =========================================================================

    pub async fn get_relationship(&self, guid: &str) -> RepositoryResult<Relationship> {
        let snapshot = self.store.snapshot().await?;
        self.relationship_from(snapshot.as_ref(), guid).await
    }

    pub async fn get_relationship_at(
        &self,
        guid: &str,
        as_of: DateTime<Utc>,
    ) -> RepositoryResult<Relationship> {
        let snapshot = self.store.snapshot_at(as_of).await?;
        self.relationship_from(snapshot.as_ref(), guid).await
    }

    pub async fn find_relationships(
        &self,
        search: &RelationshipSearch,
    ) -> RepositoryResult<Vec<Relationship>> {
        let span = search_span("find_relationships", search.type_guid.as_deref());
        let started = Instant::now();
        let query = QueryBuilder::new(self.registry.as_ref())
            .relationship_query(search, self.config.text_index_enabled)?;
        let documents = self
            .timed(async {
                let snapshot = self.store.snapshot().await?;
                Ok(snapshot.search(&query).await?)
            })
            .instrument(span.clone())
            .await?;
        let relationships = dedup_by_reference(documents)
            .iter()
            .map(mapper::relationship_from_document)
            .collect::<RepositoryResult<Vec<_>>>()?;
        let page = apply_window(
            relationships,
            search.from_element,
            search.page_size,
            self.config.max_page_size,
        );
        let elapsed = started.elapsed().as_millis();
        record_search_result(&span, page.len(), elapsed);
        log_slow_query("find_relationships", elapsed, SLOW_QUERY_THRESHOLD_MS);
        Ok(page)
    }

    /// The relationships attached to one entity, paged.
    pub async fn relationships_for_entity(
        &self,
        guid: &str,
        statuses: &[InstanceStatus],
        from_element: usize,
        page_size: usize,
    ) -> RepositoryResult<Vec<Relationship>> {
        let query = QueryBuilder::new(self.registry.as_ref())
            .attached_relationships_query(guid, &[], statuses);
        let documents = self
            .timed(async {
                let snapshot = self.store.snapshot().await?;
                Ok(snapshot.search(&query).await?)
            })
            .await?;
        let relationships = dedup_by_reference(documents)
            .iter()
            .map(mapper::relationship_from_document)
            .collect::<RepositoryResult<Vec<_>>>()?;
        Ok(apply_window(relationships, from_element, page_size, self.config.max_page_size))
    }

    // =========================================================================
    // Entity lifecycle
    // =========================================================================

    pub async fn add_entity(&self, entity: Entity) -> RepositoryResult<Option<Entity>> {
        self.functions().create_entity(entity).await
    }

    pub async fn update_entity_status(
        &self,
        guid: &str,
        status: InstanceStatus,
        user: &str,
    ) -> RepositoryResult<Option<Entity>> {
        self.functions().update_entity_status(guid, status, user).await
    }

    pub async fn update_entity_properties(
        &self,
        guid: &str,
        properties: Properties,
        user: &str,
    ) -> RepositoryResult<Option<Entity>> {
        self.functions().update_entity_properties(guid, properties, user).await
    }

    pub async fn classify_entity(
        &self,
        guid: &str,
        classification: &str,
        properties: Properties,
        user: &str,
    ) -> RepositoryResult<Option<Entity>> {
        self.functions().classify_entity(guid, classification, properties, user).await
    }

    pub async fn declassify_entity(
        &self,
        guid: &str,
        classification: &str,
        user: &str,
    ) -> RepositoryResult<Option<Entity>> {
        self.functions().declassify_entity(guid, classification, user).await
    }

    pub async fn reclassify_entity(
        &self,
        guid: &str,
        classification: &str,
        properties: Properties,
        user: &str,
    ) -> RepositoryResult<Option<Entity>> {
        self.functions().reclassify_entity(guid, classification, properties, user).await
    }

    pub async fn delete_entity(&self, guid: &str, user: &str) -> RepositoryResult<Option<Entity>> {
        self.functions().delete_entity(guid, user).await
    }

    pub async fn purge_entity(&self, guid: &str) -> RepositoryResult<()> {
        self.functions().purge_entity(guid).await
    }

    pub async fn restore_entity(&self, guid: &str, user: &str) -> RepositoryResult<Option<Entity>> {
        self.functions().restore_entity(guid, user).await
    }

    pub async fn re_identify_entity(
        &self,
        old_guid: &str,
        new_guid: &str,
        user: &str,
    ) -> RepositoryResult<Option<Entity>> {
        self.functions().re_identify_entity(old_guid, new_guid, user).await
    }

    pub async fn re_type_entity(
        &self,
        guid: &str,
        new_type_guid: &str,
        user: &str,
    ) -> RepositoryResult<Option<Entity>> {
        self.functions().re_type_entity(guid, new_type_guid, user).await
    }

    pub async fn re_home_entity(
        &self,
        guid: &str,
        new_home: &str,
        new_home_name: Option<&str>,
        user: &str,
    ) -> RepositoryResult<Option<Entity>> {
        self.functions().re_home_entity(guid, new_home, new_home_name, user).await
    }

    // =========================================================================
    // Relationship lifecycle
    // =========================================================================

    pub async fn add_relationship(
        &self,
        relationship: Relationship,
    ) -> RepositoryResult<Option<Relationship>> {
        self.functions().create_relationship(relationship).await
    }

    pub async fn update_relationship_status(
        &self,
        guid: &str,
        status: InstanceStatus,
        user: &str,
    ) -> RepositoryResult<Option<Relationship>> {
        self.functions().update_relationship_status(guid, status, user).await
    }

    pub async fn update_relationship_properties(
        &self,
        guid: &str,
        properties: Properties,
        user: &str,
    ) -> RepositoryResult<Option<Relationship>> {
        self.functions().update_relationship_properties(guid, properties, user).await
    }

    pub async fn delete_relationship(
        &self,
        guid: &str,
        user: &str,
    ) -> RepositoryResult<Option<Relationship>> {
        self.functions().delete_relationship(guid, user).await
    }

    pub async fn purge_relationship(&self, guid: &str) -> RepositoryResult<()> {
        self.functions().purge_relationship(guid).await
    }

    pub async fn restore_relationship(
        &self,
        guid: &str,
        user: &str,
    ) -> RepositoryResult<Option<Relationship>> {
        self.functions().restore_relationship(guid, user).await
    }

    pub async fn re_identify_relationship(
        &self,
        old_guid: &str,
        new_guid: &str,
        user: &str,
    ) -> RepositoryResult<Option<Relationship>> {
        self.functions().re_identify_relationship(old_guid, new_guid, user).await
    }

    pub async fn re_type_relationship(
        &self,
        guid: &str,
        new_type_guid: &str,
        user: &str,
    ) -> RepositoryResult<Option<Relationship>> {
        self.functions().re_type_relationship(guid, new_type_guid, user).await
    }

    pub async fn re_home_relationship(
        &self,
        guid: &str,
        new_home: &str,
        new_home_name: Option<&str>,
        user: &str,
    ) -> RepositoryResult<Option<Relationship>> {
        self.functions().re_home_relationship(guid, new_home, new_home_name, user).await
    }

    // =========================================================================
    // Reference copies
    // =========================================================================

    pub async fn save_entity_reference_copy(&self, entity: Entity) -> RepositoryResult<()> {
        self.functions().save_entity_reference_copy(entity).await
    }

    pub async fn purge_entity_reference_copy(&self, guid: &str) -> RepositoryResult<()> {
        self.functions().purge_entity_reference_copy(guid).await
    }

    pub async fn save_relationship_reference_copy(
        &self,
        relationship: Relationship,
    ) -> RepositoryResult<()> {
        self.functions().save_relationship_reference_copy(relationship).await
    }

    pub async fn purge_relationship_reference_copy(&self, guid: &str) -> RepositoryResult<()> {
        self.functions().purge_relationship_reference_copy(guid).await
    }

    // =========================================================================
    // History
    // =========================================================================

    pub async fn entity_history(
        &self,
        guid: &str,
        range: &HistoryRange,
        order: HistoryOrder,
    ) -> RepositoryResult<Vec<Entity>> {
        let documents = self
            .timed(history::instance_history(
                self.store.as_ref(),
                &DocRef::entity(guid),
                range,
                order,
                self.config.max_page_size,
            ))
            .await?;
        if documents.is_empty() {
            return Err(RepositoryError::NotFound(format!("entity {guid}")));
        }
        documents.iter().map(mapper::entity_from_document).collect()
    }

    pub async fn relationship_history(
        &self,
        guid: &str,
        range: &HistoryRange,
        order: HistoryOrder,
    ) -> RepositoryResult<Vec<Relationship>> {
        let documents = self
            .timed(history::instance_history(
                self.store.as_ref(),
                &DocRef::relationship(guid),
                range,
                order,
                self.config.max_page_size,
            ))
            .await?;
        if documents.is_empty() {
            return Err(RepositoryError::NotFound(format!("relationship {guid}")));
        }
        documents.iter().map(mapper::relationship_from_document).collect()
    }

    // =========================================================================
    // Graph traversal
    // =========================================================================

    /// Bounded neighborhood expansion around one entity.
    pub async fn entity_neighborhood(
        &self,
        start_guid: &str,
        spec: &NeighborhoodSpec,
    ) -> RepositoryResult<InstanceGraph> {
        let depth = if spec.level < 0 {
            self.config.max_traversal_depth
        } else {
            (spec.level as usize).min(self.config.max_traversal_depth)
        };
        let span = traversal_span("entity_neighborhood", start_guid, depth);
        let started = Instant::now();
        let traversal =
            GraphTraversal::new(self.registry.as_ref(), self.config.max_traversal_depth);
        let graph = self
            .timed(async {
                let snapshot = self.store.snapshot().await?;
                traversal.neighborhood(snapshot.as_ref(), start_guid, spec).await
            })
            .instrument(span.clone())
            .await?;
        let elapsed = started.elapsed().as_millis();
        record_traversal_result(&span, graph.entities.len(), elapsed);
        log_slow_query("entity_neighborhood", elapsed, SLOW_QUERY_THRESHOLD_MS);
        Ok(graph)
    }

    /// Every path between two entities, or an empty graph when none
    /// exists.
    pub async fn linking_entities(
        &self,
        start_guid: &str,
        end_guid: &str,
        statuses: &[InstanceStatus],
    ) -> RepositoryResult<InstanceGraph> {
        let span =
            traversal_span("linking_entities", start_guid, self.config.max_traversal_depth);
        let started = Instant::now();
        let traversal =
            GraphTraversal::new(self.registry.as_ref(), self.config.max_traversal_depth);
        let graph = self
            .timed(async {
                let snapshot = self.store.snapshot().await?;
                traversal
                    .paths_between(snapshot.as_ref(), start_guid, end_guid, statuses)
                    .await
            })
            .instrument(span.clone())
            .await?;
        let elapsed = started.elapsed().as_millis();
        record_traversal_result(&span, graph.entities.len(), elapsed);
        log_slow_query("linking_entities", elapsed, SLOW_QUERY_THRESHOLD_MS);
        Ok(graph)
    }

    // =========================================================================
    // Internals
    // =========================================================================

    fn functions(&self) -> TxFunctions<'_> {
        TxFunctions::new(
            self.store.as_ref(),
            self.registry.as_ref(),
            &self.collection_id,
            self.config.durability,
            Duration::from_millis(self.config.query_timeout_ms),
        )
    }

    async fn entity_from(
        &self,
        snapshot: &dyn Snapshot,
        guid: &str,
    ) -> RepositoryResult<Entity> {
        let document = snapshot
            .get(&DocRef::entity(guid))
            .await?
            .ok_or_else(|| RepositoryError::NotFound(format!("entity {guid}")))?;
        mapper::entity_from_document(&document)
    }

    async fn relationship_from(
        &self,
        snapshot: &dyn Snapshot,
        guid: &str,
    ) -> RepositoryResult<Relationship> {
        let document = snapshot
            .get(&DocRef::relationship(guid))
            .await?
            .ok_or_else(|| RepositoryError::NotFound(format!("relationship {guid}")))?;
        mapper::relationship_from_document(&document)
    }

    /// Run a read under the configured query timeout.
    async fn timed<T>(
        &self,
        operation: impl Future<Output = RepositoryResult<T>>,
    ) -> RepositoryResult<T> {
        let budget = Duration::from_millis(self.config.query_timeout_ms);
        tokio::time::timeout(budget, operation)
            .await
            .map_err(|_| RepositoryError::Timeout)?
    }
}

/// Drop duplicate result tuples: multiple index paths may reach the same
/// document. Order of first occurrence is preserved.
fn dedup_by_reference(documents: Vec<Document>) -> Vec<Document> {
    let mut seen: BTreeSet<DocRef> = BTreeSet::new();
    documents
        .into_iter()
        .filter(|document| seen.insert(document.reference.clone()))
        .collect()
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use metagraph_store::MemoryStore;
    use metagraph_test_fixtures::{test_entity, SimpleTypeRegistry};

    use super::*;

    fn connector() -> RepositoryConnector {
        RepositoryConnector::builder()
            .store(Arc::new(MemoryStore::new()))
            .registry(Arc::new(SimpleTypeRegistry::with_default_catalog()))
            .build()
    }

    #[tokio::test]
    async fn test_get_entity_rejects_proxy_only() {
        let connector = connector();
        let mut entity = test_entity("Database");
        entity.proxy_only = true;
        let guid = entity.header.guid.clone();
        connector.add_entity(entity).await.unwrap();

        assert!(matches!(
            connector.get_entity(&guid).await,
            Err(RepositoryError::EntityProxyOnly(_))
        ));
        assert!(connector.get_entity_summary(&guid).await.unwrap().is_proxy_only());
    }

    #[tokio::test]
    async fn test_is_entity_known_is_silent_on_absence() {
        let connector = connector();
        assert!(connector.is_entity_known("missing").await.unwrap().is_none());
        assert!(matches!(
            connector.get_entity("missing").await,
            Err(RepositoryError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_collection_id_defaults_to_generated_guid() {
        let connector = connector();
        assert!(!connector.collection_id().is_empty());
        assert_eq!(connector.collection_name(), "metagraph-repository");
    }

    #[test]
    fn test_dedup_preserves_first_occurrence() {
        let entity = test_entity("Database");
        let document = crate::mapper::entity_to_document(&entity).unwrap();
        let documents = vec![document.clone(), document.clone()];
        assert_eq!(dedup_by_reference(documents).len(), 1);
    }
}
