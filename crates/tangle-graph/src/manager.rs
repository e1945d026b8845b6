//! Validated relationship creation, deletion and traversal

use chrono::Utc;
use std::sync::Arc;
use tangle_core::limits;
use tangle_core::{
    Entity, EntityId, Error, Metadata, NewRelationship, Relationship, RelationshipId,
    RelationshipQuery, Result, TraversalEngine, TraversalResult,
};
use tangle_storage::{StorageBackend, WriteBatch};

use crate::registry::RelationshipTypeRegistry;

/// Creates and removes relationships under the registered type rules.
///
/// Bidirectional pairs are always written and removed together in a single
/// batch, so one side is never visible without the other.
pub struct RelationshipManager {
    storage: Arc<dyn StorageBackend>,
    registry: Arc<RelationshipTypeRegistry>,
}

impl RelationshipManager {
    pub fn new(storage: Arc<dyn StorageBackend>, registry: Arc<RelationshipTypeRegistry>) -> Self {
        Self { storage, registry }
    }

    pub fn registry(&self) -> &Arc<RelationshipTypeRegistry> {
        &self.registry
    }

    /// Create `from -[relationship_type]-> to`, plus its mirror for
    /// bidirectional types. Returns the primary edge.
    pub async fn create_relationship(
        &self,
        from: &Entity,
        to: &Entity,
        relationship_type: &str,
        metadata: Option<Metadata>,
    ) -> Result<Relationship> {
        let mut new = NewRelationship::new(relationship_type);
        new.metadata = metadata;
        self.create(from, to, new).await
    }

    /// General form of [`Self::create_relationship`] carrying a validity period.
    ///
    /// Endpoints are re-read from storage, so a stale handle to an entity
    /// that has since been deleted is rejected.
    pub async fn create(
        &self,
        from: &Entity,
        to: &Entity,
        new: NewRelationship,
    ) -> Result<Relationship> {
        if from.id == to.id {
            return Err(Error::SelfReference(from.id.clone()));
        }
        let from = self.live_entity(&from.id).await?;
        let to = self.live_entity(&to.id).await?;

        let definition =
            self.registry
                .validate(&new.relationship_type, &from, &to, new.metadata.as_ref())?;
        new.validate_period()?;

        let mut primary = Relationship::new(from.id.clone(), to.id.clone(), &definition.name)
            .with_metadata(new.metadata.clone())
            .with_period(new.started_at, new.ended_at);

        let mut batch = WriteBatch::new();
        match definition.inverse_type_name() {
            Some(inverse_type) => {
                let mut mirror = Relationship::new(to.id.clone(), from.id.clone(), inverse_type)
                    .with_metadata(new.metadata.clone())
                    .with_period(new.started_at, new.ended_at);
                primary.inverse_of = Some(mirror.id.clone());
                mirror.inverse_of = Some(primary.id.clone());
                batch.put_relationship(primary.clone()).put_relationship(mirror);
            }
            None => {
                batch.put_relationship(primary.clone());
            }
        }
        self.storage.apply(batch).await?;

        tracing::info!(
            "Created relationship {} -[{}]-> {}{}",
            from.id,
            definition.name,
            to.id,
            if primary.inverse_of.is_some() { " with inverse" } else { "" }
        );
        Ok(primary)
    }

    async fn live_entity(&self, id: &EntityId) -> Result<Entity> {
        self.storage
            .get_entity(id)
            .await?
            .filter(|e| !e.is_deleted())
            .ok_or_else(|| Error::EntityNotFound(id.to_string()))
    }

    /// Live edges leaving `entity`, or arriving at it when `incoming` is set
    pub async fn get_relationships(
        &self,
        entity: &EntityId,
        relationship_type: Option<&str>,
        incoming: bool,
    ) -> Result<Vec<Relationship>> {
        let mut query = if incoming {
            RelationshipQuery::new().to(entity.clone())
        } else {
            RelationshipQuery::new().from(entity.clone())
        };
        if let Some(relationship_type) = relationship_type {
            query = query.of_type(relationship_type);
        }
        Ok(self.storage.find_relationships(&query).await?)
    }

    /// Fetch one live edge
    pub async fn get_relationship(&self, id: &RelationshipId) -> Result<Relationship> {
        self.storage
            .get_relationship(id)
            .await?
            .filter(|r| !r.is_deleted())
            .ok_or_else(|| Error::RelationshipNotFound(id.to_string()))
    }

    /// Delete an edge together with its linked inverse.
    ///
    /// Soft-deletes by default; `force` removes both rows permanently, and
    /// may also purge an edge that was already soft-deleted.
    pub async fn delete_relationship(&self, id: &RelationshipId, force: bool) -> Result<()> {
        let mut relationship = self
            .storage
            .get_relationship(id)
            .await?
            .filter(|r| force || !r.is_deleted())
            .ok_or_else(|| Error::RelationshipNotFound(id.to_string()))?;

        let inverse = match &relationship.inverse_of {
            Some(inverse_id) => {
                let inverse = self.storage.get_relationship(inverse_id).await?;
                if inverse.is_none() {
                    tracing::warn!(
                        "Relationship {} points at missing inverse {}",
                        relationship.id,
                        inverse_id
                    );
                }
                inverse
            }
            None => None,
        };

        // fail rather than overwrite either row if it changed since the read
        let mut batch = WriteBatch::new();
        batch.expect_relationship(&relationship);
        if let Some(inverse) = &inverse {
            batch.expect_relationship(inverse);
        }
        if force {
            if let Some(inverse) = inverse {
                batch.remove_relationship(inverse.id);
            }
            batch.remove_relationship(relationship.id.clone());
        } else {
            let now = Utc::now();
            if let Some(mut inverse) = inverse.filter(|r| !r.is_deleted()) {
                inverse.soft_delete(now, false);
                inverse.updated_at = now;
                batch.put_relationship(inverse);
            }
            relationship.soft_delete(now, false);
            relationship.updated_at = now;
            batch.put_relationship(relationship.clone());
        }
        self.storage.apply(batch).await?;

        tracing::info!(
            "{} relationship {} ({})",
            if force { "Removed" } else { "Deleted" },
            relationship.id,
            relationship.relationship_type
        );
        Ok(())
    }

    /// Depth-first walk over live outgoing edges of the given types.
    ///
    /// The result includes `start` and every entity within `max_depth` hops.
    pub async fn traverse(
        &self,
        start: &EntityId,
        types: &[String],
        max_depth: u32,
    ) -> Result<TraversalResult> {
        limits::validate_traversal_depth(max_depth)?;

        let relations = if types.is_empty() {
            Vec::new()
        } else {
            self.storage
                .find_relationships(&RelationshipQuery::new().of_types(types.iter().cloned()))
                .await?
        };

        Ok(TraversalEngine::depth_first(start, types, max_depth, &relations))
    }
}
