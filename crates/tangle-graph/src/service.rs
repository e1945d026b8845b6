//! Entity lifecycle and graph helpers
//!
//! Deleting an entity soft-deletes its live observations and incident
//! relationships in the same batch and flags them as cascade deletions.
//! Restoring the entity brings back only the flagged rows, so anything that
//! was deleted on its own before stays deleted.

use chrono::Utc;
use std::sync::Arc;
use tangle_core::{
    Entity, EntityId, EntityQuery, Error, Metadata, NewEntity, NewObservation, Observation,
    Relationship, RelationshipQuery, Result, TraversalEngine,
};
use tangle_storage::{StorageBackend, WriteBatch};

use crate::manager::RelationshipManager;

/// Relationship type followed by [`EntityService::all_related`]
pub const CONTAINS_RELATIONSHIP: &str = "contains";

pub struct EntityService {
    storage: Arc<dyn StorageBackend>,
    manager: Arc<RelationshipManager>,
}

impl EntityService {
    pub fn new(storage: Arc<dyn StorageBackend>, manager: Arc<RelationshipManager>) -> Self {
        Self { storage, manager }
    }

    pub fn manager(&self) -> &Arc<RelationshipManager> {
        &self.manager
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Lifecycle
    // ─────────────────────────────────────────────────────────────────────────

    pub async fn create_entity(&self, new: NewEntity) -> Result<Entity> {
        let entity = new.into_entity()?;
        self.storage.save_entity(&entity).await?;
        tracing::info!("Created entity '{}' ({})", entity.name, entity.id);
        Ok(entity)
    }

    /// Fetch a live entity
    pub async fn get_entity(&self, id: &EntityId) -> Result<Entity> {
        self.storage
            .get_entity(id)
            .await?
            .filter(|e| !e.is_deleted())
            .ok_or_else(|| Error::EntityNotFound(id.to_string()))
    }

    pub async fn find_entities(&self, query: &EntityQuery) -> Result<Vec<Entity>> {
        Ok(self.storage.list_entities(query).await?)
    }

    /// Live entities whose name is exactly `name`
    pub async fn find_by_name(&self, name: &str) -> Result<Vec<Entity>> {
        let candidates = self
            .storage
            .list_entities(&EntityQuery::new().name_like(name))
            .await?;
        Ok(candidates.into_iter().filter(|e| e.name == name).collect())
    }

    pub async fn rename(&self, id: &EntityId, name: impl Into<String>) -> Result<Entity> {
        let read = self.get_entity(id).await?;
        let mut entity = read.clone();
        entity.name = name.into();
        entity.validate()?;
        entity.updated_at = Utc::now();

        let mut batch = WriteBatch::new();
        batch.expect_entity(&read).put_entity(entity.clone());
        self.storage.apply(batch).await?;
        Ok(entity)
    }

    /// Shallow-merge `fields` into the entity's metadata and persist it
    pub async fn update_metadata(&self, id: &EntityId, fields: Metadata) -> Result<Entity> {
        let read = self.get_entity(id).await?;
        let mut entity = read.clone();
        entity.update_metadata(fields);

        let mut batch = WriteBatch::new();
        batch.expect_entity(&read).put_entity(entity.clone());
        self.storage.apply(batch).await?;
        tracing::debug!("Updated metadata of entity {}", id);
        Ok(entity)
    }

    /// Delete an entity with its observations and incident relationships.
    ///
    /// Without `force` everything is soft-deleted; with `force` the rows are
    /// removed permanently, including an entity that was already soft-deleted.
    /// The dependents are collected by the backend inside the write, so rows
    /// added concurrently are covered too.
    pub async fn delete_entity(&self, id: &EntityId, force: bool) -> Result<()> {
        let entity = self
            .storage
            .get_entity(id)
            .await?
            .filter(|e| force || !e.is_deleted())
            .ok_or_else(|| Error::EntityNotFound(id.to_string()))?;

        let mut batch = WriteBatch::new();
        if force {
            batch.remove_entity(entity.id.clone());
        } else {
            batch.soft_delete_entity(entity.id.clone(), Utc::now());
        }
        self.storage.apply(batch).await?;

        tracing::info!(
            "{} entity '{}' ({})",
            if force { "Removed" } else { "Deleted" },
            entity.name,
            entity.id
        );
        Ok(())
    }

    /// Undo a soft delete, bringing back the rows its cascade deleted.
    ///
    /// A relationship comes back only when its other endpoint is live.
    /// Restoring a live entity changes nothing.
    pub async fn restore_entity(&self, id: &EntityId) -> Result<Entity> {
        let mut batch = WriteBatch::new();
        batch.restore_entity(id.clone(), Utc::now());
        self.storage.apply(batch).await?;

        let entity = self.get_entity(id).await?;
        tracing::info!("Restored entity '{}' ({})", entity.name, entity.id);
        Ok(entity)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Observations
    // ─────────────────────────────────────────────────────────────────────────

    pub async fn add_observation(
        &self,
        entity_id: &EntityId,
        new: NewObservation,
    ) -> Result<Observation> {
        let entity = self.get_entity(entity_id).await?;
        let observation = new.into_observation(entity.id)?;
        self.storage.save_observation(&observation).await?;
        tracing::debug!("Added observation {} to entity {}", observation.id, entity_id);
        Ok(observation)
    }

    /// Live observations of an entity, oldest first
    pub async fn observations(&self, entity_id: &EntityId) -> Result<Vec<Observation>> {
        Ok(self.storage.observations_for_entity(entity_id, false).await?)
    }

    /// Live observations whose confidence lies in `[min, max]`
    pub async fn observations_with_confidence(
        &self,
        entity_id: &EntityId,
        min: f64,
        max: f64,
    ) -> Result<Vec<Observation>> {
        Ok(self
            .observations(entity_id)
            .await?
            .into_iter()
            .filter(|o| o.confidence_between(min, max))
            .collect())
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Graph helpers
    // ─────────────────────────────────────────────────────────────────────────

    /// Create a relationship from `entity` to `target`
    pub async fn relate_to(
        &self,
        entity: &Entity,
        target: &Entity,
        relationship_type: &str,
        metadata: Option<Metadata>,
    ) -> Result<Relationship> {
        self.manager
            .create_relationship(entity, target, relationship_type, metadata)
            .await
    }

    /// Live entities one outgoing edge of `relationship_type` away
    pub async fn related_of_type(
        &self,
        entity_id: &EntityId,
        relationship_type: &str,
    ) -> Result<Vec<Entity>> {
        let edges = self
            .manager
            .get_relationships(entity_id, Some(relationship_type), false)
            .await?;
        self.live_entities(edges.iter().map(|r| &r.to_id)).await
    }

    /// Entities reachable through `contains` edges, level by level.
    ///
    /// `depth = None` follows the edges as far as they go. The start entity
    /// is never part of the result.
    pub async fn all_related(&self, entity_id: &EntityId, depth: Option<u32>) -> Result<Vec<Entity>> {
        let relations = self
            .storage
            .find_relationships(&RelationshipQuery::new().of_type(CONTAINS_RELATIONSHIP))
            .await?;
        let result =
            TraversalEngine::breadth_first(entity_id, CONTAINS_RELATIONSHIP, depth, &relations);
        self.live_entities(result.visited.iter()).await
    }

    async fn live_entities<'a>(
        &self,
        ids: impl Iterator<Item = &'a EntityId>,
    ) -> Result<Vec<Entity>> {
        let mut entities = Vec::new();
        for id in ids {
            if let Some(entity) = self.storage.get_entity(id).await? {
                if !entity.is_deleted() {
                    entities.push(entity);
                }
            }
        }
        Ok(entities)
    }
}
