//! Graph traversal over point-in-time snapshots.
//!
//! Both algorithms run every query of one traversal against a single
//! snapshot, so the result is internally consistent even while writers
//! are active. Entities and relationships are deduplicated by reference
//! as they accumulate; materialization is the expensive step.

use std::collections::BTreeSet;

use async_recursion::async_recursion;

use metagraph_store::Snapshot;
use metagraph_types::{
    DocRef, Entity, InstanceGraph, InstanceStatus, NeighborhoodSpec, Relationship, TypeRegistry,
};

use crate::error::{RepositoryError, RepositoryResult};
use crate::mapper;
use crate::query::{status_allow_list, QueryBuilder};

/// Bounded traversal engine. Stateless; borrows the registry from the
/// connector for query construction.
pub struct GraphTraversal<'a> {
    registry: &'a dyn TypeRegistry,
    max_depth: usize,
}

/// Accumulates a result graph keyed by reference so every instance is
/// materialized at most once.
#[derive(Default)]
struct GraphAccumulator {
    entities: Vec<Entity>,
    relationships: Vec<Relationship>,
    seen_entities: BTreeSet<String>,
    seen_relationships: BTreeSet<String>,
}

impl GraphAccumulator {
    fn add_entity(&mut self, entity: Entity) {
        if self.seen_entities.insert(entity.header.guid.clone()) {
            self.entities.push(entity);
        }
    }

    fn add_relationship(&mut self, relationship: Relationship) {
        if self.seen_relationships.insert(relationship.header.guid.clone()) {
            self.relationships.push(relationship);
        }
    }

    fn into_graph(self, include_relationships: bool) -> InstanceGraph {
        InstanceGraph {
            entities: self.entities,
            relationships: if include_relationships {
                self.relationships
            } else {
                Vec::new()
            },
        }
    }
}

impl<'a> GraphTraversal<'a> {
    pub fn new(registry: &'a dyn TypeRegistry, max_depth: usize) -> Self {
        Self { registry, max_depth }
    }

    /// Breadth-first neighborhood expansion around one entity.
    ///
    /// The starting entity is always part of the result, even with no
    /// neighbors. A negative level means unbounded, capped at the
    /// configured maximum depth.
    pub async fn neighborhood(
        &self,
        snapshot: &dyn Snapshot,
        start_guid: &str,
        spec: &NeighborhoodSpec,
    ) -> RepositoryResult<InstanceGraph> {
        let start = self.load_entity(snapshot, start_guid).await?;
        let depth = if spec.level < 0 {
            self.max_depth
        } else {
            (spec.level as usize).min(self.max_depth)
        };

        let mut graph = GraphAccumulator::default();
        graph.add_entity(start);
        let mut visited: BTreeSet<String> = [start_guid.to_string()].into();
        let mut frontier = vec![start_guid.to_string()];

        for _ in 0..depth {
            if frontier.is_empty() {
                break;
            }
            let mut next_frontier = Vec::new();
            for guid in &frontier {
                for relationship in self
                    .attached(snapshot, guid, &spec.relationship_types, &spec.statuses)
                    .await?
                {
                    let Some(other) = relationship.other_end(guid) else {
                        continue;
                    };
                    let other_guid = other.header.guid.clone();
                    if visited.contains(&other_guid) {
                        // The relationship between two already-visited
                        // entities still belongs to the neighborhood.
                        if self.entity_admissible(&graph, &other_guid) {
                            graph.add_relationship(relationship);
                        }
                        continue;
                    }
                    let Some(neighbor) =
                        snapshot.get(&DocRef::entity(&other_guid)).await?
                    else {
                        continue;
                    };
                    let neighbor = mapper::entity_from_document(&neighbor)?;
                    if !self.passes_entity_filters(&neighbor, spec) {
                        continue;
                    }
                    visited.insert(other_guid.clone());
                    graph.add_entity(neighbor);
                    graph.add_relationship(relationship);
                    next_frontier.push(other_guid);
                }
            }
            frontier = next_frontier;
        }

        Ok(graph.into_graph(spec.include_relationships))
    }

    /// Depth-first path search from `start_guid` to `end_guid`.
    ///
    /// Every successful chain is retained in full. A result containing
    /// only the start entity means no path exists and is returned empty;
    /// start == end is the degenerate zero-relationship result.
    pub async fn paths_between(
        &self,
        snapshot: &dyn Snapshot,
        start_guid: &str,
        end_guid: &str,
        statuses: &[InstanceStatus],
    ) -> RepositoryResult<InstanceGraph> {
        let start = self.load_entity(snapshot, start_guid).await?;
        let mut graph = GraphAccumulator::default();
        graph.add_entity(start);

        if start_guid == end_guid {
            return Ok(graph.into_graph(true));
        }

        let mut visited: BTreeSet<String> = [start_guid.to_string()].into();
        self.explore(
            snapshot,
            start_guid,
            end_guid,
            self.max_depth,
            statuses,
            &mut visited,
            &mut graph,
        )
        .await?;

        if graph.entities.len() == 1 {
            return Ok(InstanceGraph::default());
        }
        Ok(graph.into_graph(true))
    }

    /// Explore all neighbors of `current`, retaining every chain that
    /// reaches `end_guid`. Returns whether any chain from here succeeded.
    #[async_recursion]
    #[allow(clippy::too_many_arguments)]
    async fn explore(
        &self,
        snapshot: &dyn Snapshot,
        current: &str,
        end_guid: &str,
        depth: usize,
        statuses: &[InstanceStatus],
        visited: &mut BTreeSet<String>,
        graph: &mut GraphAccumulator,
    ) -> RepositoryResult<bool> {
        if depth == 0 {
            return Ok(false);
        }
        let mut reached = false;
        for relationship in self.attached(snapshot, current, &[], statuses).await? {
            let Some(other) = relationship.other_end(current) else {
                continue;
            };
            let other_guid = other.header.guid.clone();

            if other_guid == end_guid {
                let end = self.load_entity(snapshot, end_guid).await?;
                graph.add_entity(end);
                graph.add_relationship(relationship);
                reached = true;
                continue;
            }
            if !visited.insert(other_guid.clone()) {
                continue;
            }
            let Some(document) = snapshot.get(&DocRef::entity(&other_guid)).await? else {
                continue;
            };
            let neighbor = mapper::entity_from_document(&document)?;
            if !status_allow_list(statuses).contains(&neighbor.header.status) {
                continue;
            }
            let found = self
                .explore(
                    snapshot,
                    &other_guid,
                    end_guid,
                    depth - 1,
                    statuses,
                    visited,
                    graph,
                )
                .await?;
            if found {
                graph.add_entity(neighbor);
                graph.add_relationship(relationship);
                reached = true;
            }
        }
        Ok(reached)
    }

    async fn attached(
        &self,
        snapshot: &dyn Snapshot,
        guid: &str,
        type_names: &[String],
        statuses: &[InstanceStatus],
    ) -> RepositoryResult<Vec<Relationship>> {
        let query = QueryBuilder::new(self.registry)
            .attached_relationships_query(guid, type_names, statuses);
        let mut relationships = Vec::new();
        for document in snapshot.search(&query).await? {
            relationships.push(mapper::relationship_from_document(&document)?);
        }
        Ok(relationships)
    }

    async fn load_entity(
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

    fn entity_admissible(&self, graph: &GraphAccumulator, guid: &str) -> bool {
        graph.seen_entities.contains(guid)
    }

    fn passes_entity_filters(&self, entity: &Entity, spec: &NeighborhoodSpec) -> bool {
        if !spec.entity_types.is_empty()
            && !spec.entity_types.contains(&entity.header.type_name)
        {
            return false;
        }
        if !status_allow_list(&spec.statuses).contains(&entity.header.status) {
            return false;
        }
        if !spec.classifications.is_empty()
            && !spec
                .classifications
                .iter()
                .any(|name| entity.classification(name).is_some())
        {
            return false;
        }
        true
    }
}
