//! Atomic multi-row writes
//!
//! A [`WriteBatch`] is an ordered list of row writes that a backend applies
//! all-or-nothing. Puts are upserts keyed by row id; removes are hard deletes
//! that cascade to dependent rows the way the SQLite foreign keys do.
//!
//! Writes that depend on rows read earlier either carry a [`Precondition`]
//! or are expressed as an op the backend expands under its own lock or
//! transaction ([`WriteOp::SoftDeleteEntity`], [`WriteOp::RestoreEntity`]),
//! so a concurrent writer can never slip rows past them.

use chrono::{DateTime, Utc};
use tangle_core::{
    Entity, EntityId, Observation, ObservationId, Relationship, RelationshipId, RelationshipType,
};

use crate::error::{StorageError, StorageResult};

/// Stored state a batch was built against
#[derive(Debug, Clone, PartialEq)]
pub enum Precondition {
    /// The entity row still carries this `updated_at`
    EntityUnchanged {
        id: EntityId,
        updated_at: DateTime<Utc>,
    },
    /// The relationship row still carries this `updated_at`
    RelationshipUnchanged {
        id: RelationshipId,
        updated_at: DateTime<Utc>,
    },
}

impl Precondition {
    /// Compare against the stored row's `updated_at`; `None` means the row is gone
    pub fn verify(&self, current: Option<DateTime<Utc>>) -> StorageResult<()> {
        let (kind, id, expected) = match self {
            Self::EntityUnchanged { id, updated_at } => ("entity", id.to_string(), updated_at),
            Self::RelationshipUnchanged { id, updated_at } => {
                ("relationship", id.to_string(), updated_at)
            }
        };
        match current {
            Some(at) if at == *expected => Ok(()),
            Some(_) => Err(StorageError::Conflict(format!(
                "{} {} was modified by another writer",
                kind, id
            ))),
            None => Err(match self {
                Self::EntityUnchanged { .. } => StorageError::MissingEntity(id),
                Self::RelationshipUnchanged { .. } => StorageError::MissingRelationship(id),
            }),
        }
    }
}

/// A single row write
#[derive(Debug, Clone)]
pub enum WriteOp {
    PutEntity(Entity),
    PutObservation(Observation),
    PutRelationship(Relationship),
    PutRelationshipType(RelationshipType),
    /// Also removes the entity's observations and incident relationships
    RemoveEntity(EntityId),
    RemoveObservation(ObservationId),
    /// Also removes relationships whose `inverse_of` points at it
    RemoveRelationship(RelationshipId),
    /// Soft-delete a live entity with its live observations and incident
    /// relationships, marking the dependents as cascade deletions
    SoftDeleteEntity { id: EntityId, at: DateTime<Utc> },
    /// Undo [`WriteOp::SoftDeleteEntity`]: bring back the entity and its
    /// cascade-deleted rows. A relationship only comes back when its other
    /// endpoint is live. No-op for a live entity.
    RestoreEntity { id: EntityId, at: DateTime<Utc> },
    /// Fail the whole batch unless the condition holds
    Expect(Precondition),
}

impl WriteOp {
    /// Short label used in log output
    pub fn kind(&self) -> &'static str {
        match self {
            Self::PutEntity(_) => "put_entity",
            Self::PutObservation(_) => "put_observation",
            Self::PutRelationship(_) => "put_relationship",
            Self::PutRelationshipType(_) => "put_relationship_type",
            Self::RemoveEntity(_) => "remove_entity",
            Self::RemoveObservation(_) => "remove_observation",
            Self::RemoveRelationship(_) => "remove_relationship",
            Self::SoftDeleteEntity { .. } => "soft_delete_entity",
            Self::RestoreEntity { .. } => "restore_entity",
            Self::Expect(_) => "expect",
        }
    }
}

/// Ordered set of writes applied atomically by [`crate::StorageBackend::apply`]
#[derive(Debug, Clone, Default)]
pub struct WriteBatch {
    ops: Vec<WriteOp>,
}

impl WriteBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, op: WriteOp) -> &mut Self {
        self.ops.push(op);
        self
    }

    pub fn put_entity(&mut self, entity: Entity) -> &mut Self {
        self.push(WriteOp::PutEntity(entity))
    }

    pub fn put_observation(&mut self, observation: Observation) -> &mut Self {
        self.push(WriteOp::PutObservation(observation))
    }

    pub fn put_relationship(&mut self, relationship: Relationship) -> &mut Self {
        self.push(WriteOp::PutRelationship(relationship))
    }

    pub fn put_relationship_type(&mut self, definition: RelationshipType) -> &mut Self {
        self.push(WriteOp::PutRelationshipType(definition))
    }

    pub fn remove_entity(&mut self, id: EntityId) -> &mut Self {
        self.push(WriteOp::RemoveEntity(id))
    }

    pub fn remove_observation(&mut self, id: ObservationId) -> &mut Self {
        self.push(WriteOp::RemoveObservation(id))
    }

    pub fn remove_relationship(&mut self, id: RelationshipId) -> &mut Self {
        self.push(WriteOp::RemoveRelationship(id))
    }

    pub fn soft_delete_entity(&mut self, id: EntityId, at: DateTime<Utc>) -> &mut Self {
        self.push(WriteOp::SoftDeleteEntity { id, at })
    }

    pub fn restore_entity(&mut self, id: EntityId, at: DateTime<Utc>) -> &mut Self {
        self.push(WriteOp::RestoreEntity { id, at })
    }

    /// Require `entity` to be stored exactly as it was read
    pub fn expect_entity(&mut self, entity: &Entity) -> &mut Self {
        self.push(WriteOp::Expect(Precondition::EntityUnchanged {
            id: entity.id.clone(),
            updated_at: entity.updated_at,
        }))
    }

    /// Require `relationship` to be stored exactly as it was read
    pub fn expect_relationship(&mut self, relationship: &Relationship) -> &mut Self {
        self.push(WriteOp::Expect(Precondition::RelationshipUnchanged {
            id: relationship.id.clone(),
            updated_at: relationship.updated_at,
        }))
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    pub fn ops(&self) -> &[WriteOp] {
        &self.ops
    }
}

impl IntoIterator for WriteBatch {
    type Item = WriteOp;
    type IntoIter = std::vec::IntoIter<WriteOp>;

    fn into_iter(self) -> Self::IntoIter {
        self.ops.into_iter()
    }
}

impl From<WriteOp> for WriteBatch {
    fn from(op: WriteOp) -> Self {
        Self { ops: vec![op] }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_batch_preserves_order() {
        let entity = Entity::new("Apollo", "project");
        let id = entity.id.clone();

        let mut batch = WriteBatch::new();
        batch.put_entity(entity).remove_entity(id);

        let kinds: Vec<_> = batch.ops().iter().map(WriteOp::kind).collect();
        assert_eq!(kinds, vec!["put_entity", "remove_entity"]);
        assert_eq!(batch.len(), 2);
        assert!(WriteBatch::new().is_empty());
    }

    #[test]
    fn test_precondition_verify() {
        let entity = Entity::new("Apollo", "project");
        let expected = Precondition::EntityUnchanged {
            id: entity.id.clone(),
            updated_at: entity.updated_at,
        };

        assert!(expected.verify(Some(entity.updated_at)).is_ok());

        let later = entity.updated_at + chrono::Duration::seconds(1);
        let err = expected.verify(Some(later)).unwrap_err();
        assert!(matches!(err, StorageError::Conflict(ref m) if m.contains("entity")));

        let err = expected.verify(None).unwrap_err();
        assert!(matches!(err, StorageError::MissingEntity(_)));
    }
}
