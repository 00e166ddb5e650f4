//! Atomic compound operations over the document store.
//!
//! Every operation follows the same discipline: read the current document
//! through a fresh snapshot, verify preconditions, compute the new state,
//! and submit one transaction whose statements are guarded by the version
//! observed during the read. A concurrent writer landing in between makes
//! the whole transaction fail with [`RepositoryError::Conflict`]; nothing
//! is partially applied.
//!
//! Under synchronous durability the commit is verified and the resulting
//! instance re-read; under asynchronous durability operations return
//! `None` because no consistent post-state is readable yet.

use std::future::Future;
use std::time::Duration;

use chrono::Utc;
use tracing::warn;

use metagraph_store::{DocumentStore, ExpectedVersion, Snapshot, StoreError, Transaction};
use metagraph_types::{
    Classification, DocRef, Durability, Entity, InstanceHeader, InstanceStatus, Properties,
    Provenance, Relationship, TypeRegistry,
};

use crate::error::{RepositoryError, RepositoryResult};
use crate::mapper;
use crate::query::QueryBuilder;

/// Every lifecycle status, for cascade queries that must see deleted
/// instances too.
fn all_statuses() -> Vec<InstanceStatus> {
    let mut statuses = InstanceStatus::all_active();
    statuses.push(InstanceStatus::Deleted);
    statuses
}

/// The transaction function engine.
///
/// Stateless: borrows the store, registry, and collection identity from
/// the connector for the duration of one operation.
pub struct TxFunctions<'a> {
    store: &'a dyn DocumentStore,
    registry: &'a dyn TypeRegistry,
    collection_id: &'a str,
    durability: Durability,
    write_budget: Duration,
}

impl<'a> TxFunctions<'a> {
    pub fn new(
        store: &'a dyn DocumentStore,
        registry: &'a dyn TypeRegistry,
        collection_id: &'a str,
        durability: Durability,
        write_budget: Duration,
    ) -> Self {
        Self { store, registry, collection_id, durability, write_budget }
    }

    // ===== ENTITY LIFECYCLE =====

    /// Create a new entity at version 1.
    pub async fn create_entity(&self, entity: Entity) -> RepositoryResult<Option<Entity>> {
        let guid = entity.header.guid.clone();
        let document = mapper::entity_to_document(&entity)?;
        let txn = Transaction::new().put(document, Some(0));
        self.commit_creating(txn, &guid).await?;
        self.finish_entity(&guid).await
    }

    /// Create a new relationship, validating both endpoints against the
    /// current store state and the relationship type's end constraints.
    /// Endpoints are reduced to proxy form before storage.
    pub async fn create_relationship(
        &self,
        mut relationship: Relationship,
    ) -> RepositoryResult<Option<Relationship>> {
        let ends = self
            .registry
            .relationship_ends(&relationship.header.type_name)
            .ok_or_else(|| {
                RepositoryError::TypeNotKnown(relationship.header.type_name.clone())
            })?;

        let snapshot = self.store.snapshot().await?;
        relationship.end_one = self
            .validated_endpoint(snapshot.as_ref(), &relationship.end_one.header.guid, &ends.end_one)
            .await?;
        relationship.end_two = self
            .validated_endpoint(snapshot.as_ref(), &relationship.end_two.header.guid, &ends.end_two)
            .await?;

        let guid = relationship.header.guid.clone();
        let document = mapper::relationship_to_document(&relationship)?;
        let txn = Transaction::new().put(document, Some(0));
        self.commit_creating(txn, &guid).await?;
        self.finish_relationship(&guid).await
    }

    /// Update an entity's lifecycle status.
    pub async fn update_entity_status(
        &self,
        guid: &str,
        status: InstanceStatus,
        user: &str,
    ) -> RepositoryResult<Option<Entity>> {
        let mut entity = self.load_live_entity(guid).await?;
        self.check_status_legal(&entity.header.type_name, status)?;
        if entity.header.status == status {
            return Err(RepositoryError::Validation(format!(
                "entity {guid} already has status {}",
                status.as_str()
            )));
        }
        let expected = entity.header.version;
        entity.header.status = status;
        touch(&mut entity.header, user);
        self.put_entity(entity, Some(expected)).await?;
        self.finish_entity(guid).await
    }

    /// Replace an entity's property bag.
    pub async fn update_entity_properties(
        &self,
        guid: &str,
        properties: Properties,
        user: &str,
    ) -> RepositoryResult<Option<Entity>> {
        let mut entity = self.load_live_entity(guid).await?;
        let expected = entity.header.version;
        entity.properties = properties;
        touch(&mut entity.header, user);
        self.put_entity(entity, Some(expected)).await?;
        self.finish_entity(guid).await
    }

    /// Update a relationship's lifecycle status.
    pub async fn update_relationship_status(
        &self,
        guid: &str,
        status: InstanceStatus,
        user: &str,
    ) -> RepositoryResult<Option<Relationship>> {
        let mut relationship = self.load_live_relationship(guid).await?;
        self.check_status_legal(&relationship.header.type_name, status)?;
        if relationship.header.status == status {
            return Err(RepositoryError::Validation(format!(
                "relationship {guid} already has status {}",
                status.as_str()
            )));
        }
        let expected = relationship.header.version;
        relationship.header.status = status;
        touch(&mut relationship.header, user);
        self.put_relationship(relationship, Some(expected)).await?;
        self.finish_relationship(guid).await
    }

    /// Replace a relationship's property bag.
    pub async fn update_relationship_properties(
        &self,
        guid: &str,
        properties: Properties,
        user: &str,
    ) -> RepositoryResult<Option<Relationship>> {
        let mut relationship = self.load_live_relationship(guid).await?;
        let expected = relationship.header.version;
        relationship.properties = properties;
        touch(&mut relationship.header, user);
        self.put_relationship(relationship, Some(expected)).await?;
        self.finish_relationship(guid).await
    }

    // ===== CLASSIFICATIONS =====

    /// Attach a classification. Fails if the name is already present; a
    /// classification name is unique per entity.
    pub async fn classify_entity(
        &self,
        guid: &str,
        name: &str,
        properties: Properties,
        user: &str,
    ) -> RepositoryResult<Option<Entity>> {
        let mut entity = self.load_live_entity(guid).await?;
        if entity.classification(name).is_some() {
            return Err(RepositoryError::AlreadyExists(format!(
                "classification {name} on entity {guid}"
            )));
        }
        let expected = entity.header.version;
        entity
            .classifications
            .push(Classification::assigned(name, properties, user, Utc::now()));
        touch(&mut entity.header, user);
        self.put_entity(entity, Some(expected)).await?;
        self.finish_entity(guid).await
    }

    /// Remove a classification. Fails if absent.
    pub async fn declassify_entity(
        &self,
        guid: &str,
        name: &str,
        user: &str,
    ) -> RepositoryResult<Option<Entity>> {
        let mut entity = self.load_live_entity(guid).await?;
        if entity.classification(name).is_none() {
            return Err(RepositoryError::NotFound(format!(
                "classification {name} on entity {guid}"
            )));
        }
        let expected = entity.header.version;
        entity.classifications.retain(|c| c.name != name);
        touch(&mut entity.header, user);
        self.put_entity(entity, Some(expected)).await?;
        self.finish_entity(guid).await
    }

    /// Replace the properties of an existing classification, bumping both
    /// the classification's own version and the entity's.
    pub async fn reclassify_entity(
        &self,
        guid: &str,
        name: &str,
        properties: Properties,
        user: &str,
    ) -> RepositoryResult<Option<Entity>> {
        let mut entity = self.load_live_entity(guid).await?;
        let expected = entity.header.version;
        let Some(classification) =
            entity.classifications.iter_mut().find(|c| c.name == name)
        else {
            return Err(RepositoryError::NotFound(format!(
                "classification {name} on entity {guid}"
            )));
        };
        classification.properties = properties;
        classification.version += 1;
        classification.audit.touch(user, Utc::now());
        touch(&mut entity.header, user);
        self.put_entity(entity, Some(expected)).await?;
        self.finish_entity(guid).await
    }

    // ===== DELETE / PURGE / RESTORE =====

    /// Soft-delete an entity, remembering its prior status, and resolve
    /// every relationship touching it in the same transaction: locally
    /// homed relationships are soft-deleted, externally homed ones are
    /// purged. Per-relationship failures are reported and skipped; they
    /// never abort the entity's own delete.
    pub async fn delete_entity(&self, guid: &str, user: &str) -> RepositoryResult<Option<Entity>> {
        // One snapshot serves both the entity read and the cascade scan,
        // so the two cannot observe different store states.
        let snapshot = self.store.snapshot().await?;
        let mut entity = self.entity_via(snapshot.as_ref(), guid).await?;
        if entity.header.is_deleted() {
            return Err(RepositoryError::Validation(format!("entity {guid} is deleted")));
        }
        let expected = entity.header.version;
        entity.header.status_on_delete = Some(entity.header.status);
        entity.header.status = InstanceStatus::Deleted;
        touch(&mut entity.header, user);

        let mut txn = Transaction::new();
        for (mut relationship, version) in
            self.attached_relationships(snapshot.as_ref(), guid, &[]).await?
        {
            if relationship.header.home_collection == self.collection_id {
                relationship.header.status_on_delete = Some(relationship.header.status);
                relationship.header.status = InstanceStatus::Deleted;
                touch(&mut relationship.header, user);
                match mapper::relationship_to_document(&relationship) {
                    Ok(document) => txn = txn.put(document, Some(version)),
                    Err(err) => warn!(
                        relationship = %relationship.header.guid,
                        error = %err,
                        "Skipping relationship in delete cascade"
                    ),
                }
            } else {
                // Only the home collection may soft-delete; the proxy is
                // invalidated anyway, so the reference copy is purged.
                txn = txn.evict(relationship.reference(), Some(version));
            }
        }
        txn = txn.put(mapper::entity_to_document(&entity)?, Some(expected));
        self.commit(txn).await?;
        self.finish_entity(guid).await
    }

    /// Purge a previously deleted entity, evicting its entire history and
    /// that of every relationship touching it, local or not.
    pub async fn purge_entity(&self, guid: &str) -> RepositoryResult<()> {
        let snapshot = self.store.snapshot().await?;
        let entity = self.entity_via(snapshot.as_ref(), guid).await?;
        if !entity.header.is_deleted() {
            return Err(RepositoryError::Validation(format!(
                "entity {guid} must be deleted before purge"
            )));
        }

        let mut txn = Transaction::new();
        for (relationship, version) in self
            .attached_relationships(snapshot.as_ref(), guid, &all_statuses())
            .await?
        {
            txn = txn.evict(relationship.reference(), Some(version));
        }
        txn = txn.evict(DocRef::entity(guid), Some(entity.header.version));
        self.commit(txn).await?;
        Ok(())
    }

    /// Restore a soft-deleted entity to its remembered prior status.
    pub async fn restore_entity(&self, guid: &str, user: &str) -> RepositoryResult<Option<Entity>> {
        let mut entity = self.load_entity(guid).await?;
        if !entity.header.is_deleted() {
            return Err(RepositoryError::Validation(format!("entity {guid} is not deleted")));
        }
        let Some(prior) = entity.header.status_on_delete.take() else {
            return Err(RepositoryError::Internal(format!(
                "entity {guid} has no remembered status to restore"
            )));
        };
        let expected = entity.header.version;
        entity.header.status = prior;
        touch(&mut entity.header, user);
        self.put_entity(entity, Some(expected)).await?;
        self.finish_entity(guid).await
    }

    /// Soft-delete a relationship.
    pub async fn delete_relationship(
        &self,
        guid: &str,
        user: &str,
    ) -> RepositoryResult<Option<Relationship>> {
        let mut relationship = self.load_live_relationship(guid).await?;
        let expected = relationship.header.version;
        relationship.header.status_on_delete = Some(relationship.header.status);
        relationship.header.status = InstanceStatus::Deleted;
        touch(&mut relationship.header, user);
        self.put_relationship(relationship, Some(expected)).await?;
        self.finish_relationship(guid).await
    }

    /// Purge a previously deleted relationship.
    pub async fn purge_relationship(&self, guid: &str) -> RepositoryResult<()> {
        let relationship = self.load_relationship(guid).await?;
        if !relationship.header.is_deleted() {
            return Err(RepositoryError::Validation(format!(
                "relationship {guid} must be deleted before purge"
            )));
        }
        let txn = Transaction::new()
            .evict(DocRef::relationship(guid), Some(relationship.header.version));
        self.commit(txn).await?;
        Ok(())
    }

    /// Restore a soft-deleted relationship.
    pub async fn restore_relationship(
        &self,
        guid: &str,
        user: &str,
    ) -> RepositoryResult<Option<Relationship>> {
        let mut relationship = self.load_relationship(guid).await?;
        if !relationship.header.is_deleted() {
            return Err(RepositoryError::Validation(format!(
                "relationship {guid} is not deleted"
            )));
        }
        let Some(prior) = relationship.header.status_on_delete.take() else {
            return Err(RepositoryError::Internal(format!(
                "relationship {guid} has no remembered status to restore"
            )));
        };
        let expected = relationship.header.version;
        relationship.header.status = prior;
        touch(&mut relationship.header, user);
        self.put_relationship(relationship, Some(expected)).await?;
        self.finish_relationship(guid).await
    }

    // ===== IDENTITY / TYPE / HOME =====

    /// Change an entity's GUID: the old document is evicted, the entity is
    /// re-created under the new identifier, and every relationship endpoint
    /// referencing the old GUID is rewritten, all in one transaction.
    pub async fn re_identify_entity(
        &self,
        old_guid: &str,
        new_guid: &str,
        user: &str,
    ) -> RepositoryResult<Option<Entity>> {
        let mut entity = self.load_live_entity(old_guid).await?;
        let old_version = entity.header.version;
        entity.header.re_identified_from = Some(old_guid.to_string());
        entity.header.guid = new_guid.to_string();
        touch(&mut entity.header, user);

        let mut txn = Transaction::new()
            .evict(DocRef::entity(old_guid), Some(old_version))
            .put(mapper::entity_to_document(&entity)?, Some(0));

        let snapshot = self.store.snapshot().await?;
        for (mut relationship, version) in self
            .attached_relationships(snapshot.as_ref(), old_guid, &all_statuses())
            .await?
        {
            for end in [&mut relationship.end_one, &mut relationship.end_two] {
                if end.header.guid == old_guid {
                    end.header.re_identified_from = Some(old_guid.to_string());
                    end.header.guid = new_guid.to_string();
                }
            }
            touch(&mut relationship.header, user);
            txn = txn.put(mapper::relationship_to_document(&relationship)?, Some(version));
        }

        if let Err(err) = self.commit(txn).await {
            if matches!(err, RepositoryError::Conflict) && self.exists(new_guid).await? {
                return Err(RepositoryError::AlreadyExists(format!("entity {new_guid}")));
            }
            return Err(err);
        }
        self.finish_entity(new_guid).await
    }

    /// Change an entity's type descriptor, remembering the previous type.
    pub async fn re_type_entity(
        &self,
        guid: &str,
        new_type_guid: &str,
        user: &str,
    ) -> RepositoryResult<Option<Entity>> {
        let type_name = self
            .registry
            .resolve_type_name(new_type_guid)
            .ok_or_else(|| RepositoryError::TypeNotKnown(new_type_guid.to_string()))?;
        let mut entity = self.load_live_entity(guid).await?;
        let expected = entity.header.version;
        entity.header.re_typed_from = Some(entity.header.type_name.clone());
        entity.header.type_name = type_name;
        touch(&mut entity.header, user);
        self.put_entity(entity, Some(expected)).await?;
        self.finish_entity(guid).await
    }

    /// Move an entity to a new home collection. The instance becomes
    /// locally mastered.
    pub async fn re_home_entity(
        &self,
        guid: &str,
        new_home: &str,
        new_home_name: Option<&str>,
        user: &str,
    ) -> RepositoryResult<Option<Entity>> {
        let mut entity = self.load_live_entity(guid).await?;
        let expected = entity.header.version;
        entity.header.home_collection = new_home.to_string();
        entity.header.home_collection_name = new_home_name.map(str::to_string);
        entity.header.provenance = Provenance::Local;
        touch(&mut entity.header, user);
        self.put_entity(entity, Some(expected)).await?;
        self.finish_entity(guid).await
    }

    /// Change a relationship's type descriptor.
    pub async fn re_type_relationship(
        &self,
        guid: &str,
        new_type_guid: &str,
        user: &str,
    ) -> RepositoryResult<Option<Relationship>> {
        let type_name = self
            .registry
            .resolve_type_name(new_type_guid)
            .ok_or_else(|| RepositoryError::TypeNotKnown(new_type_guid.to_string()))?;
        let mut relationship = self.load_live_relationship(guid).await?;
        let expected = relationship.header.version;
        relationship.header.re_typed_from = Some(relationship.header.type_name.clone());
        relationship.header.type_name = type_name;
        touch(&mut relationship.header, user);
        self.put_relationship(relationship, Some(expected)).await?;
        self.finish_relationship(guid).await
    }

    /// Move a relationship to a new home collection.
    pub async fn re_home_relationship(
        &self,
        guid: &str,
        new_home: &str,
        new_home_name: Option<&str>,
        user: &str,
    ) -> RepositoryResult<Option<Relationship>> {
        let mut relationship = self.load_live_relationship(guid).await?;
        let expected = relationship.header.version;
        relationship.header.home_collection = new_home.to_string();
        relationship.header.home_collection_name = new_home_name.map(str::to_string);
        relationship.header.provenance = Provenance::Local;
        touch(&mut relationship.header, user);
        self.put_relationship(relationship, Some(expected)).await?;
        self.finish_relationship(guid).await
    }

    /// Change a relationship's GUID within one transaction.
    pub async fn re_identify_relationship(
        &self,
        old_guid: &str,
        new_guid: &str,
        user: &str,
    ) -> RepositoryResult<Option<Relationship>> {
        let mut relationship = self.load_live_relationship(old_guid).await?;
        let old_version = relationship.header.version;
        relationship.header.re_identified_from = Some(old_guid.to_string());
        relationship.header.guid = new_guid.to_string();
        touch(&mut relationship.header, user);

        let txn = Transaction::new()
            .evict(DocRef::relationship(old_guid), Some(old_version))
            .put(mapper::relationship_to_document(&relationship)?, Some(0));
        self.commit(txn).await?;
        self.finish_relationship(new_guid).await
    }

    // ===== REFERENCE COPIES =====

    /// Save an externally mastered entity copy. A GUID collision with an
    /// instance mastered elsewhere is a conflict; re-saving under the same
    /// home is an update.
    pub async fn save_entity_reference_copy(&self, entity: Entity) -> RepositoryResult<()> {
        let guid = entity.header.guid.clone();
        let snapshot = self.store.snapshot().await?;
        let existing = snapshot.get(&DocRef::entity(&guid)).await?;

        let expected = match existing {
            None => Some(0),
            Some(document) => {
                let current = mapper::entity_from_document(&document)?;
                if current.header.home_collection != entity.header.home_collection {
                    return Err(RepositoryError::HomeCollectionConflict {
                        guid,
                        home: current.header.home_collection,
                    });
                }
                Some(current.header.version)
            }
        };

        let txn = Transaction::new().put(mapper::entity_to_document(&entity)?, expected);
        self.commit(txn).await?;
        Ok(())
    }

    /// Remove a locally held entity reference copy and its history.
    pub async fn purge_entity_reference_copy(&self, guid: &str) -> RepositoryResult<()> {
        let entity = self.load_entity(guid).await?;
        if entity.header.provenance != Provenance::External {
            return Err(RepositoryError::Validation(format!(
                "entity {guid} is mastered locally, not a reference copy"
            )));
        }
        let txn = Transaction::new().evict(DocRef::entity(guid), Some(entity.header.version));
        self.commit(txn).await?;
        Ok(())
    }

    /// Save an externally mastered relationship copy.
    pub async fn save_relationship_reference_copy(
        &self,
        relationship: Relationship,
    ) -> RepositoryResult<()> {
        let guid = relationship.header.guid.clone();
        let snapshot = self.store.snapshot().await?;
        let existing = snapshot.get(&DocRef::relationship(&guid)).await?;

        let expected = match existing {
            None => Some(0),
            Some(document) => {
                let current = mapper::relationship_from_document(&document)?;
                if current.header.home_collection != relationship.header.home_collection {
                    return Err(RepositoryError::HomeCollectionConflict {
                        guid,
                        home: current.header.home_collection,
                    });
                }
                Some(current.header.version)
            }
        };

        let txn =
            Transaction::new().put(mapper::relationship_to_document(&relationship)?, expected);
        self.commit(txn).await?;
        Ok(())
    }

    /// Remove a locally held relationship reference copy and its history.
    pub async fn purge_relationship_reference_copy(&self, guid: &str) -> RepositoryResult<()> {
        let relationship = self.load_relationship(guid).await?;
        if relationship.header.provenance != Provenance::External {
            return Err(RepositoryError::Validation(format!(
                "relationship {guid} is mastered locally, not a reference copy"
            )));
        }
        let txn =
            Transaction::new().evict(DocRef::relationship(guid), Some(relationship.header.version));
        self.commit(txn).await?;
        Ok(())
    }

    // ===== INTERNALS =====

    async fn load_entity(&self, guid: &str) -> RepositoryResult<Entity> {
        let snapshot = self.store.snapshot().await?;
        self.entity_via(snapshot.as_ref(), guid).await
    }

    async fn entity_via(&self, snapshot: &dyn Snapshot, guid: &str) -> RepositoryResult<Entity> {
        let document = snapshot
            .get(&DocRef::entity(guid))
            .await?
            .ok_or_else(|| RepositoryError::NotFound(format!("entity {guid}")))?;
        mapper::entity_from_document(&document)
    }

    /// Load an entity and reject deleted ones; deleted instances accept no
    /// mutation other than restore and purge.
    async fn load_live_entity(&self, guid: &str) -> RepositoryResult<Entity> {
        let entity = self.load_entity(guid).await?;
        if entity.header.is_deleted() {
            return Err(RepositoryError::Validation(format!("entity {guid} is deleted")));
        }
        Ok(entity)
    }

    async fn load_relationship(&self, guid: &str) -> RepositoryResult<Relationship> {
        let snapshot = self.store.snapshot().await?;
        let document = snapshot
            .get(&DocRef::relationship(guid))
            .await?
            .ok_or_else(|| RepositoryError::NotFound(format!("relationship {guid}")))?;
        mapper::relationship_from_document(&document)
    }

    async fn load_live_relationship(&self, guid: &str) -> RepositoryResult<Relationship> {
        let relationship = self.load_relationship(guid).await?;
        if relationship.header.is_deleted() {
            return Err(RepositoryError::Validation(format!("relationship {guid} is deleted")));
        }
        Ok(relationship)
    }

    /// The relationships touching `guid` with their observed versions,
    /// read through the supplied snapshot. Unreadable documents are
    /// reported and skipped.
    async fn attached_relationships(
        &self,
        snapshot: &dyn Snapshot,
        guid: &str,
        statuses: &[InstanceStatus],
    ) -> RepositoryResult<Vec<(Relationship, u64)>> {
        let query = QueryBuilder::new(self.registry)
            .attached_relationships_query(guid, &[], statuses);
        let mut found = Vec::new();
        for document in snapshot.search(&query).await? {
            let version = document.version;
            match mapper::relationship_from_document(&document) {
                Ok(relationship) => found.push((relationship, version)),
                Err(err) => warn!(
                    reference = %document.reference,
                    error = %err,
                    "Skipping unreadable relationship during cascade"
                ),
            }
        }
        Ok(found)
    }

    async fn validated_endpoint(
        &self,
        snapshot: &dyn Snapshot,
        guid: &str,
        admissible: &std::collections::BTreeSet<String>,
    ) -> RepositoryResult<Entity> {
        let document = snapshot
            .get(&DocRef::entity(guid))
            .await?
            .ok_or_else(|| RepositoryError::NotFound(format!("endpoint entity {guid}")))?;
        let entity = mapper::entity_from_document(&document)?;
        if entity.header.is_deleted() {
            return Err(RepositoryError::Validation(format!(
                "endpoint entity {guid} is deleted"
            )));
        }
        if !admissible.contains(&entity.header.type_name) {
            return Err(RepositoryError::Validation(format!(
                "entity type {} is not admissible at this relationship end",
                entity.header.type_name
            )));
        }
        let unique = self.registry.unique_properties(&entity.header.type_name);
        Ok(entity.proxy_view(&unique))
    }

    fn check_status_legal(&self, type_name: &str, status: InstanceStatus) -> RepositoryResult<()> {
        let legal = self
            .registry
            .valid_statuses(type_name)
            .ok_or_else(|| RepositoryError::TypeNotKnown(type_name.to_string()))?;
        if !legal.contains(&status) {
            return Err(RepositoryError::Validation(format!(
                "status {} is not legal for type {type_name}",
                status.as_str()
            )));
        }
        Ok(())
    }

    async fn put_entity(&self, entity: Entity, expected: ExpectedVersion) -> RepositoryResult<()> {
        let document = mapper::entity_to_document(&entity)?;
        self.commit(Transaction::new().put(document, expected)).await
    }

    async fn put_relationship(
        &self,
        relationship: Relationship,
        expected: ExpectedVersion,
    ) -> RepositoryResult<()> {
        let document = mapper::relationship_to_document(&relationship)?;
        self.commit(Transaction::new().put(document, expected)).await
    }

    /// Submit a transaction and, under synchronous durability, verify the
    /// commit rather than assume it. The whole submit-and-verify sequence
    /// runs under the write budget; a hung backend surfaces as
    /// [`RepositoryError::Timeout`] instead of blocking the mutation.
    async fn commit(&self, txn: Transaction) -> RepositoryResult<()> {
        self.bounded(async {
            let token = self.store.submit(txn).await?;
            if self.durability == Durability::Synchronous {
                self.store.await_commit(token).await?;
            }
            Ok(())
        })
        .await
    }

    /// Commit a creation transaction, reporting a version-guard failure as
    /// "already exists" rather than a retryable conflict.
    async fn commit_creating(&self, txn: Transaction, guid: &str) -> RepositoryResult<()> {
        self.bounded(async {
            match self.store.submit(txn).await {
                Ok(token) => {
                    if self.durability == Durability::Synchronous {
                        self.store.await_commit(token).await?;
                    }
                    Ok(())
                }
                Err(StoreError::Conflict) => {
                    Err(RepositoryError::AlreadyExists(format!("instance {guid}")))
                }
                Err(err) => Err(err.into()),
            }
        })
        .await
    }

    async fn bounded<T>(
        &self,
        operation: impl Future<Output = RepositoryResult<T>>,
    ) -> RepositoryResult<T> {
        tokio::time::timeout(self.write_budget, operation)
            .await
            .map_err(|_| RepositoryError::Timeout)?
    }

    async fn exists(&self, guid: &str) -> RepositoryResult<bool> {
        let snapshot = self.store.snapshot().await?;
        Ok(snapshot.get(&DocRef::entity(guid)).await?.is_some())
    }

    /// Re-read the written entity under synchronous durability; under
    /// asynchronous durability there is no readable post-state yet.
    async fn finish_entity(&self, guid: &str) -> RepositoryResult<Option<Entity>> {
        match self.durability {
            Durability::Synchronous => Ok(Some(self.load_entity(guid).await?)),
            Durability::Asynchronous => Ok(None),
        }
    }

    async fn finish_relationship(&self, guid: &str) -> RepositoryResult<Option<Relationship>> {
        match self.durability {
            Durability::Synchronous => Ok(Some(self.load_relationship(guid).await?)),
            Durability::Asynchronous => Ok(None),
        }
    }
}

/// Record a mutation on an instance header: bump the version and refresh
/// the audit trail.
fn touch(header: &mut InstanceHeader, user: &str) {
    header.version += 1;
    header.audit.touch(user, Utc::now());
}
