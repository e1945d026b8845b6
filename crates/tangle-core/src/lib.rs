//! Tangle Core - Data model for the Tangle knowledge graph
//!
//! This crate provides entities, observations, typed relationships, the
//! relationship type rules that validate them, and the traversal algorithms
//! shared by the storage and graph layers.

pub mod entity;
pub mod error;
pub mod limits;
pub mod metadata;
pub mod observation;
pub mod query;
pub mod relationship;
pub mod relationship_type;
pub mod rule;
pub mod traversal;

pub use entity::{Entity, EntityId, EntityType, NewEntity};
pub use error::{Error, Result};
pub use limits::ValidationError;
pub use metadata::Metadata;
pub use observation::{NewObservation, Observation, ObservationId, DEFAULT_RELIABILITY_THRESHOLD};
pub use query::{EntityQuery, RelationshipQuery};
pub use relationship::{NewRelationship, Relationship, RelationshipId};
pub use relationship_type::{AllowedEntityTypes, EndpointSide, RelationshipType, RelationshipTypeId};
pub use rule::{FieldRule, FieldRules, RuleViolation, ValueKind};
pub use traversal::{TraversalEngine, TraversalResult, TraversalStats};
