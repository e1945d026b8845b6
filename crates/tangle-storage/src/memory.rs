//! In-memory storage backend for testing

use crate::batch::{Precondition, WriteBatch, WriteOp};
use crate::error::{StorageError, StorageResult};
use crate::traits::StorageBackend;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use tangle_core::{
    Entity, EntityId, EntityQuery, Observation, ObservationId, Relationship, RelationshipId,
    RelationshipQuery, RelationshipType,
};

#[derive(Debug, Clone, Default)]
struct MemoryState {
    entities: HashMap<EntityId, Entity>,
    observations: HashMap<ObservationId, Observation>,
    relationships: HashMap<RelationshipId, Relationship>,
    relationship_types: HashMap<String, RelationshipType>,
}

impl MemoryState {
    fn apply(&mut self, op: WriteOp) -> StorageResult<()> {
        match op {
            WriteOp::PutEntity(entity) => {
                self.entities.insert(entity.id.clone(), entity);
            }
            WriteOp::PutObservation(observation) => {
                let owner = self.entities.get(&observation.entity_id);
                if !owner.is_some_and(|e| observation.is_deleted() || !e.is_deleted()) {
                    return Err(StorageError::MissingEntity(observation.entity_id.to_string()));
                }
                self.observations.insert(observation.id.clone(), observation);
            }
            WriteOp::PutRelationship(relationship) => {
                self.check_relationship(&relationship)?;
                self.relationships
                    .insert(relationship.id.clone(), relationship);
            }
            WriteOp::PutRelationshipType(definition) => {
                if let Some(existing) = self.relationship_types.get(&definition.name) {
                    if existing.id != definition.id {
                        return Err(StorageError::DuplicateRelationshipType(definition.name));
                    }
                }
                self.relationship_types
                    .insert(definition.name.clone(), definition);
            }
            WriteOp::RemoveEntity(id) => {
                self.entities.remove(&id);
                self.observations.retain(|_, o| o.entity_id != id);
                let incident: Vec<RelationshipId> = self
                    .relationships
                    .values()
                    .filter(|r| r.touches(&id))
                    .map(|r| r.id.clone())
                    .collect();
                for rel_id in incident {
                    self.remove_relationship(rel_id);
                }
            }
            WriteOp::RemoveObservation(id) => {
                self.observations.remove(&id);
            }
            WriteOp::RemoveRelationship(id) => self.remove_relationship(id),
            WriteOp::SoftDeleteEntity { id, at } => self.soft_delete_entity(&id, at)?,
            WriteOp::RestoreEntity { id, at } => self.restore_entity(&id, at)?,
            WriteOp::Expect(precondition) => self.check(&precondition)?,
        }
        Ok(())
    }

    fn check(&self, precondition: &Precondition) -> StorageResult<()> {
        let current = match precondition {
            Precondition::EntityUnchanged { id, .. } => self.entities.get(id).map(|e| e.updated_at),
            Precondition::RelationshipUnchanged { id, .. } => {
                self.relationships.get(id).map(|r| r.updated_at)
            }
        };
        precondition.verify(current)
    }

    fn soft_delete_entity(&mut self, id: &EntityId, at: DateTime<Utc>) -> StorageResult<()> {
        let entity = self
            .entities
            .get_mut(id)
            .filter(|e| !e.is_deleted())
            .ok_or_else(|| StorageError::MissingEntity(id.to_string()))?;
        entity.soft_delete(at);
        entity.updated_at = at;

        for observation in self
            .observations
            .values_mut()
            .filter(|o| o.entity_id == *id && !o.is_deleted())
        {
            observation.soft_delete(at, true);
            observation.updated_at = at;
        }
        for relationship in self
            .relationships
            .values_mut()
            .filter(|r| r.touches(id) && !r.is_deleted())
        {
            relationship.soft_delete(at, true);
            relationship.updated_at = at;
        }
        Ok(())
    }

    fn restore_entity(&mut self, id: &EntityId, at: DateTime<Utc>) -> StorageResult<()> {
        let entity = self
            .entities
            .get_mut(id)
            .ok_or_else(|| StorageError::MissingEntity(id.to_string()))?;
        if !entity.is_deleted() {
            return Ok(());
        }
        entity.restore();
        entity.updated_at = at;

        for observation in self
            .observations
            .values_mut()
            .filter(|o| o.entity_id == *id && o.is_deleted() && o.cascade_deleted)
        {
            observation.restore();
            observation.updated_at = at;
        }

        let revivable: Vec<Relationship> = self
            .relationships
            .values()
            .filter(|r| r.touches(id) && r.is_deleted() && r.cascade_deleted)
            .filter(|r| {
                r.other_endpoint(id)
                    .and_then(|other| self.entities.get(other))
                    .is_some_and(|e| !e.is_deleted())
            })
            .cloned()
            .collect();
        for mut relationship in revivable {
            relationship.restore();
            relationship.updated_at = at;
            self.check_relationship(&relationship)?;
            self.relationships
                .insert(relationship.id.clone(), relationship);
        }
        Ok(())
    }

    /// Foreign keys, live endpoints for live edges, and the live
    /// (from, to, type) uniqueness rule
    fn check_relationship(&self, relationship: &Relationship) -> StorageResult<()> {
        for endpoint in [&relationship.from_id, &relationship.to_id] {
            let usable = self
                .entities
                .get(endpoint)
                .is_some_and(|e| relationship.is_deleted() || !e.is_deleted());
            if !usable {
                return Err(StorageError::MissingEntity(endpoint.to_string()));
            }
        }
        if !self
            .relationship_types
            .contains_key(&relationship.relationship_type)
        {
            return Err(StorageError::MissingRelationshipType(
                relationship.relationship_type.clone(),
            ));
        }
        if relationship.is_deleted() {
            return Ok(());
        }

        let duplicate = self.relationships.values().any(|r| {
            r.id != relationship.id
                && !r.is_deleted()
                && r.from_id == relationship.from_id
                && r.to_id == relationship.to_id
                && r.relationship_type == relationship.relationship_type
        });
        if duplicate {
            return Err(StorageError::DuplicateRelationship {
                from: relationship.from_id.to_string(),
                to: relationship.to_id.to_string(),
                relationship_type: relationship.relationship_type.clone(),
            });
        }
        Ok(())
    }

    /// Removes `id` and every relationship linked to it through `inverse_of`
    fn remove_relationship(&mut self, id: RelationshipId) {
        let mut pending = vec![id];
        while let Some(id) = pending.pop() {
            if self.relationships.remove(&id).is_none() {
                continue;
            }
            pending.extend(
                self.relationships
                    .values()
                    .filter(|r| r.inverse_of.as_ref() == Some(&id))
                    .map(|r| r.id.clone()),
            );
        }
    }

    /// Deferred check: every `inverse_of` written in the batch must resolve
    fn check_inverse_links(&self, written: &[RelationshipId]) -> StorageResult<()> {
        for id in written {
            let Some(relationship) = self.relationships.get(id) else {
                continue;
            };
            if let Some(inverse) = &relationship.inverse_of {
                if !self.relationships.contains_key(inverse) {
                    return Err(StorageError::MissingRelationship(inverse.to_string()));
                }
            }
        }
        Ok(())
    }
}

/// In-memory storage backend
///
/// Useful for testing and temporary storage. Batches are applied to a copy
/// of the state and swapped in only when every write succeeded.
pub struct MemoryStorage {
    state: RwLock<MemoryState>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self {
            state: RwLock::new(MemoryState::default()),
        }
    }

    fn read(&self) -> StorageResult<RwLockReadGuard<'_, MemoryState>> {
        self.state
            .read()
            .map_err(|e| StorageError::Database(format!("Lock error: {}", e)))
    }

    fn write(&self) -> StorageResult<RwLockWriteGuard<'_, MemoryState>> {
        self.state
            .write()
            .map_err(|e| StorageError::Database(format!("Lock error: {}", e)))
    }
}

impl Default for MemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl StorageBackend for MemoryStorage {
    async fn initialize(&self) -> StorageResult<()> {
        Ok(())
    }

    async fn close(&self) -> StorageResult<()> {
        Ok(())
    }

    async fn health_check(&self) -> StorageResult<bool> {
        Ok(self.read().is_ok())
    }

    async fn apply(&self, batch: WriteBatch) -> StorageResult<()> {
        let mut state = self.write()?;
        let size = batch.len();

        let mut next = state.clone();
        let mut written = Vec::new();
        for op in batch {
            if let WriteOp::PutRelationship(r) = &op {
                written.push(r.id.clone());
            }
            next.apply(op)?;
        }
        next.check_inverse_links(&written)?;

        *state = next;
        tracing::debug!("Applied batch of {} writes", size);
        Ok(())
    }

    // Entity operations

    async fn get_entity(&self, id: &EntityId) -> StorageResult<Option<Entity>> {
        Ok(self.read()?.entities.get(id).cloned())
    }

    async fn list_entities(&self, query: &EntityQuery) -> StorageResult<Vec<Entity>> {
        let state = self.read()?;
        let mut entities: Vec<Entity> = state
            .entities
            .values()
            .filter(|e| query.matches(e))
            .cloned()
            .collect();
        entities.sort_by(|a, b| (a.created_at, &a.id).cmp(&(b.created_at, &b.id)));
        Ok(entities)
    }

    // Observation operations

    async fn get_observation(&self, id: &ObservationId) -> StorageResult<Option<Observation>> {
        Ok(self.read()?.observations.get(id).cloned())
    }

    async fn observations_for_entity(
        &self,
        entity_id: &EntityId,
        include_deleted: bool,
    ) -> StorageResult<Vec<Observation>> {
        let state = self.read()?;
        let mut observations: Vec<Observation> = state
            .observations
            .values()
            .filter(|o| o.entity_id == *entity_id && (include_deleted || !o.is_deleted()))
            .cloned()
            .collect();
        observations.sort_by_key(|o| o.created_at);
        Ok(observations)
    }

    // Relationship operations

    async fn get_relationship(&self, id: &RelationshipId) -> StorageResult<Option<Relationship>> {
        Ok(self.read()?.relationships.get(id).cloned())
    }

    async fn find_relationships(
        &self,
        query: &RelationshipQuery,
    ) -> StorageResult<Vec<Relationship>> {
        let state = self.read()?;
        let mut relationships: Vec<Relationship> = state
            .relationships
            .values()
            .filter(|r| query.matches(r))
            .cloned()
            .collect();
        relationships.sort_by_key(|r| r.created_at);
        Ok(relationships)
    }

    // Relationship type operations

    async fn relationship_types(
        &self,
        include_deleted: bool,
    ) -> StorageResult<Vec<RelationshipType>> {
        let state = self.read()?;
        let mut types: Vec<RelationshipType> = state
            .relationship_types
            .values()
            .filter(|t| include_deleted || !t.is_deleted())
            .cloned()
            .collect();
        types.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(types)
    }

    async fn get_relationship_type(&self, name: &str) -> StorageResult<Option<RelationshipType>> {
        Ok(self.read()?.relationship_types.get(name).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tangle_core::NewObservation;

    async fn seeded() -> (MemoryStorage, Entity, Entity) {
        let storage = MemoryStorage::new();
        storage.initialize().await.unwrap();

        let a = Entity::new("Ada", "person");
        let b = Entity::new("Analytical Engine", "project");
        let mut batch = WriteBatch::new();
        batch
            .put_entity(a.clone())
            .put_entity(b.clone())
            .put_relationship_type(RelationshipType::new("works_on"));
        storage.apply(batch).await.unwrap();
        (storage, a, b)
    }

    #[tokio::test]
    async fn test_memory_storage() {
        let storage = MemoryStorage::new();

        let entity = Entity::new("TestEntity", "test");
        storage.save_entity(&entity).await.unwrap();

        let retrieved = storage.get_entity(&entity.id).await.unwrap();
        assert_eq!(retrieved.unwrap().name, "TestEntity");

        let mut batch = WriteBatch::new();
        batch.remove_entity(entity.id.clone());
        storage.apply(batch).await.unwrap();
        assert!(storage.get_entity(&entity.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_duplicate_live_relationship_rejected() {
        let (storage, a, b) = seeded().await;

        let mut batch = WriteBatch::new();
        batch.put_relationship(Relationship::new(a.id.clone(), b.id.clone(), "works_on"));
        storage.apply(batch).await.unwrap();

        let mut batch = WriteBatch::new();
        batch.put_relationship(Relationship::new(a.id.clone(), b.id.clone(), "works_on"));
        let err = storage.apply(batch).await.unwrap_err();
        assert!(matches!(err, StorageError::DuplicateRelationship { .. }));
    }

    #[tokio::test]
    async fn test_soft_deleted_relationship_does_not_block() {
        let (storage, a, b) = seeded().await;

        let mut old = Relationship::new(a.id.clone(), b.id.clone(), "works_on");
        old.soft_delete(chrono::Utc::now(), false);
        let mut batch = WriteBatch::new();
        batch
            .put_relationship(old)
            .put_relationship(Relationship::new(a.id.clone(), b.id.clone(), "works_on"));
        storage.apply(batch).await.unwrap();

        let live = storage
            .find_relationships(&RelationshipQuery::new().from(a.id.clone()))
            .await
            .unwrap();
        assert_eq!(live.len(), 1);
    }

    #[tokio::test]
    async fn test_failed_batch_writes_nothing() {
        let (storage, a, b) = seeded().await;
        let extra = Entity::new("Charles", "person");

        let mut batch = WriteBatch::new();
        batch
            .put_entity(extra.clone())
            .put_relationship(Relationship::new(a.id.clone(), b.id.clone(), "unregistered"));
        let err = storage.apply(batch).await.unwrap_err();

        assert!(matches!(err, StorageError::MissingRelationshipType(_)));
        assert!(storage.get_entity(&extra.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_dangling_inverse_rejected() {
        let (storage, a, b) = seeded().await;

        let mut rel = Relationship::new(a.id.clone(), b.id.clone(), "works_on");
        rel.inverse_of = Some(RelationshipId::new());
        let err = storage.apply(WriteOp::PutRelationship(rel).into()).await.unwrap_err();
        assert!(matches!(err, StorageError::MissingRelationship(_)));
    }

    #[tokio::test]
    async fn test_remove_entity_cascades() {
        let (storage, a, b) = seeded().await;

        let observation = NewObservation::new("Wrote the first program")
            .into_observation(a.id.clone())
            .unwrap();
        let mut forward = Relationship::new(a.id.clone(), b.id.clone(), "works_on");
        let mut backward = Relationship::new(b.id.clone(), a.id.clone(), "works_on");
        forward.inverse_of = Some(backward.id.clone());
        backward.inverse_of = Some(forward.id.clone());

        let mut batch = WriteBatch::new();
        batch
            .put_observation(observation.clone())
            .put_relationship(forward.clone())
            .put_relationship(backward.clone());
        storage.apply(batch).await.unwrap();

        let mut batch = WriteBatch::new();
        batch.remove_entity(a.id.clone());
        storage.apply(batch).await.unwrap();

        assert!(storage.get_observation(&observation.id).await.unwrap().is_none());
        assert!(storage.get_relationship(&forward.id).await.unwrap().is_none());
        assert!(storage.get_relationship(&backward.id).await.unwrap().is_none());
        assert!(storage.get_entity(&b.id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_duplicate_type_name_rejected() {
        let (storage, _, _) = seeded().await;

        let err = storage
            .save_relationship_type(&RelationshipType::new("works_on"))
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::DuplicateRelationshipType(_)));
    }

    #[tokio::test]
    async fn test_live_relationship_needs_live_endpoints() {
        let (storage, a, mut b) = seeded().await;
        b.soft_delete(Utc::now());
        storage.save_entity(&b).await.unwrap();

        let live = Relationship::new(a.id.clone(), b.id.clone(), "works_on");
        let err = storage.apply(WriteOp::PutRelationship(live).into()).await.unwrap_err();
        assert!(matches!(err, StorageError::MissingEntity(ref id) if *id == b.id.to_string()));

        let mut tombstone = Relationship::new(a.id.clone(), b.id.clone(), "works_on");
        tombstone.soft_delete(Utc::now(), true);
        storage.apply(WriteOp::PutRelationship(tombstone).into()).await.unwrap();

        let observation = NewObservation::new("Left the project")
            .into_observation(b.id.clone())
            .unwrap();
        let err = storage.save_observation(&observation).await.unwrap_err();
        assert!(matches!(err, StorageError::MissingEntity(_)));
    }

    #[tokio::test]
    async fn test_soft_delete_covers_rows_written_after_read() {
        let (storage, a, b) = seeded().await;

        // written after a caller would have listed a's dependents
        let late = Relationship::new(b.id.clone(), a.id.clone(), "works_on");
        storage.apply(WriteOp::PutRelationship(late.clone()).into()).await.unwrap();

        let at = Utc::now();
        let mut batch = WriteBatch::new();
        batch.soft_delete_entity(a.id.clone(), at);
        storage.apply(batch).await.unwrap();

        let stored = storage.get_relationship(&late.id).await.unwrap().unwrap();
        assert_eq!(stored.deleted_at, Some(at));
        assert!(stored.cascade_deleted);

        let mut batch = WriteBatch::new();
        batch.soft_delete_entity(a.id.clone(), Utc::now());
        let err = storage.apply(batch).await.unwrap_err();
        assert!(matches!(err, StorageError::MissingEntity(_)));
    }

    #[tokio::test]
    async fn test_restore_skips_edges_to_deleted_endpoints() {
        let (storage, a, b) = seeded().await;
        let edge = Relationship::new(a.id.clone(), b.id.clone(), "works_on");
        storage.apply(WriteOp::PutRelationship(edge.clone()).into()).await.unwrap();

        let mut batch = WriteBatch::new();
        batch
            .soft_delete_entity(a.id.clone(), Utc::now())
            .soft_delete_entity(b.id.clone(), Utc::now());
        storage.apply(batch).await.unwrap();

        let mut batch = WriteBatch::new();
        batch.restore_entity(a.id.clone(), Utc::now());
        storage.apply(batch).await.unwrap();
        assert!(storage.get_relationship(&edge.id).await.unwrap().unwrap().is_deleted());

        let mut batch = WriteBatch::new();
        batch.restore_entity(b.id.clone(), Utc::now());
        storage.apply(batch).await.unwrap();
        assert!(!storage.get_relationship(&edge.id).await.unwrap().unwrap().is_deleted());
    }

    #[tokio::test]
    async fn test_stale_precondition_fails_batch() {
        let (storage, a, _) = seeded().await;

        let mut renamed = a.clone();
        renamed.name = "Ada Lovelace".to_string();
        renamed.updated_at = a.updated_at + chrono::Duration::seconds(1);
        storage.save_entity(&renamed).await.unwrap();

        let mut stale = a.clone();
        stale.name = "Countess".to_string();
        let mut batch = WriteBatch::new();
        batch.expect_entity(&a).put_entity(stale);
        let err = storage.apply(batch).await.unwrap_err();
        assert!(matches!(err, StorageError::Conflict(_)));

        let stored = storage.get_entity(&a.id).await.unwrap().unwrap();
        assert_eq!(stored.name, "Ada Lovelace");
    }
}
