//! Relationship (edge) types and operations

use crate::entity::EntityId;
use crate::limits::ValidationError;
use crate::metadata::Metadata;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// Unique identifier for a relationship
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RelationshipId(pub Ulid);

impl RelationshipId {
    pub fn new() -> Self {
        Self(Ulid::new())
    }

    pub fn from_string(s: &str) -> Result<Self, ulid::DecodeError> {
        Ok(Self(Ulid::from_string(s)?))
    }
}

impl Default for RelationshipId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RelationshipId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A directed, typed relationship (edge) between two entities
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Relationship {
    /// Unique identifier
    pub id: RelationshipId,

    /// Source entity ID
    pub from_id: EntityId,

    /// Target entity ID
    pub to_id: EntityId,

    /// Registered relationship type name (e.g. "belongs_to")
    #[serde(rename = "type")]
    pub relationship_type: String,

    /// Arbitrary metadata, validated against the relationship type
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Metadata>,

    /// Paired edge in the opposite direction, for bidirectional types
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inverse_of: Option<RelationshipId>,

    /// When the relationship began
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,

    /// When the relationship ended
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<DateTime<Utc>>,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,

    /// Last update timestamp
    pub updated_at: DateTime<Utc>,

    /// Soft-delete marker
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<DateTime<Utc>>,

    /// Set when the current deletion came from an endpoint entity's deletion
    #[serde(default)]
    pub cascade_deleted: bool,
}

impl Relationship {
    /// Create a new relationship record
    pub fn new(from_id: EntityId, to_id: EntityId, relationship_type: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: RelationshipId::new(),
            from_id,
            to_id,
            relationship_type: relationship_type.into(),
            metadata: None,
            inverse_of: None,
            started_at: None,
            ended_at: None,
            created_at: now,
            updated_at: now,
            deleted_at: None,
            cascade_deleted: false,
        }
    }

    pub fn with_metadata(mut self, metadata: Option<Metadata>) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn with_period(
        mut self,
        started_at: Option<DateTime<Utc>>,
        ended_at: Option<DateTime<Utc>>,
    ) -> Self {
        self.started_at = started_at;
        self.ended_at = ended_at;
        self
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }

    /// Whether `entity` is either endpoint of this edge
    pub fn touches(&self, entity: &EntityId) -> bool {
        self.from_id == *entity || self.to_id == *entity
    }

    /// The endpoint opposite to `entity`, if `entity` is an endpoint at all
    pub fn other_endpoint(&self, entity: &EntityId) -> Option<&EntityId> {
        if self.from_id == *entity {
            Some(&self.to_id)
        } else if self.to_id == *entity {
            Some(&self.from_id)
        } else {
            None
        }
    }

    /// Whether the relationship's validity period covers `at`.
    ///
    /// An unset start or end leaves that side of the period open.
    pub fn is_active_at(&self, at: DateTime<Utc>) -> bool {
        self.started_at.map_or(true, |start| start <= at)
            && self.ended_at.map_or(true, |end| at < end)
    }

    pub fn soft_delete(&mut self, at: DateTime<Utc>, cascade: bool) {
        self.deleted_at = Some(at);
        self.cascade_deleted = cascade;
    }

    pub fn restore(&mut self) {
        self.deleted_at = None;
        self.cascade_deleted = false;
    }
}

/// Data for creating a new relationship
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewRelationship {
    #[serde(rename = "type")]
    pub relationship_type: String,
    #[serde(default)]
    pub metadata: Option<Metadata>,
    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub ended_at: Option<DateTime<Utc>>,
}

impl NewRelationship {
    pub fn new(relationship_type: impl Into<String>) -> Self {
        Self {
            relationship_type: relationship_type.into(),
            metadata: None,
            started_at: None,
            ended_at: None,
        }
    }

    pub fn with_metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = Some(metadata);
        self
    }

    pub fn starting_at(mut self, at: DateTime<Utc>) -> Self {
        self.started_at = Some(at);
        self
    }

    pub fn ending_at(mut self, at: DateTime<Utc>) -> Self {
        self.ended_at = Some(at);
        self
    }

    /// Reject periods that end before they start
    pub fn validate_period(&self) -> Result<(), ValidationError> {
        match (self.started_at, self.ended_at) {
            (Some(start), Some(end)) if end < start => Err(ValidationError::InvalidPeriod),
            _ => Ok(()),
        }
    }
}
