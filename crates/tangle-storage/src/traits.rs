//! Storage backend trait definitions

use crate::batch::{WriteBatch, WriteOp};
use crate::error::StorageResult;
use async_trait::async_trait;
use tangle_core::{
    Entity, EntityId, EntityQuery, Observation, ObservationId, Relationship, RelationshipId,
    RelationshipQuery, RelationshipType,
};

/// Trait for storage backend implementations
///
/// Reads return soft-deleted rows only when asked to (or when fetching a
/// single row by key); callers decide what a deleted row means to them.
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Initialize the storage (create tables, etc.)
    async fn initialize(&self) -> StorageResult<()>;

    /// Close the storage connection
    async fn close(&self) -> StorageResult<()>;

    /// Health check
    async fn health_check(&self) -> StorageResult<bool>;

    // ─────────────────────────────────────────────────────────────────────────
    // Writes
    // ─────────────────────────────────────────────────────────────────────────

    /// Apply every write in `batch`, or none of them
    async fn apply(&self, batch: WriteBatch) -> StorageResult<()>;

    /// Save a single entity
    async fn save_entity(&self, entity: &Entity) -> StorageResult<()> {
        self.apply(WriteOp::PutEntity(entity.clone()).into()).await
    }

    /// Save a single observation
    async fn save_observation(&self, observation: &Observation) -> StorageResult<()> {
        self.apply(WriteOp::PutObservation(observation.clone()).into())
            .await
    }

    /// Save a single relationship type
    async fn save_relationship_type(&self, definition: &RelationshipType) -> StorageResult<()> {
        self.apply(WriteOp::PutRelationshipType(definition.clone()).into())
            .await
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Entity Operations
    // ─────────────────────────────────────────────────────────────────────────

    /// Get an entity by ID, deleted or not
    async fn get_entity(&self, id: &EntityId) -> StorageResult<Option<Entity>>;

    /// List entities matching a filter
    async fn list_entities(&self, query: &EntityQuery) -> StorageResult<Vec<Entity>>;

    // ─────────────────────────────────────────────────────────────────────────
    // Observation Operations
    // ─────────────────────────────────────────────────────────────────────────

    /// Get an observation by ID, deleted or not
    async fn get_observation(&self, id: &ObservationId) -> StorageResult<Option<Observation>>;

    /// Get observations attached to an entity
    async fn observations_for_entity(
        &self,
        entity_id: &EntityId,
        include_deleted: bool,
    ) -> StorageResult<Vec<Observation>>;

    // ─────────────────────────────────────────────────────────────────────────
    // Relationship Operations
    // ─────────────────────────────────────────────────────────────────────────

    /// Get a relationship by ID, deleted or not
    async fn get_relationship(&self, id: &RelationshipId) -> StorageResult<Option<Relationship>>;

    /// Find relationships matching a filter
    async fn find_relationships(&self, query: &RelationshipQuery)
        -> StorageResult<Vec<Relationship>>;

    // ─────────────────────────────────────────────────────────────────────────
    // Relationship Type Operations
    // ─────────────────────────────────────────────────────────────────────────

    /// Get all relationship types
    async fn relationship_types(&self, include_deleted: bool)
        -> StorageResult<Vec<RelationshipType>>;

    /// Get a relationship type by name, deleted or not
    async fn get_relationship_type(&self, name: &str) -> StorageResult<Option<RelationshipType>>;
}
