//! Entity (node) types and operations

use crate::limits::{self, ValidationError};
use crate::metadata::{self, Metadata};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use ulid::Ulid;

/// Unique identifier for an entity
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityId(pub Ulid);

impl EntityId {
    pub fn new() -> Self {
        Self(Ulid::new())
    }

    pub fn from_string(s: &str) -> Result<Self, ulid::DecodeError> {
        Ok(Self(Ulid::from_string(s)?))
    }
}

impl Default for EntityId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for EntityId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Entity type classification
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EntityType(pub String);

impl EntityType {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for EntityType {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for EntityType {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&String> for EntityType {
    fn from(s: &String) -> Self {
        Self(s.clone())
    }
}

impl std::fmt::Display for EntityType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// An entity in the knowledge graph (a node)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    /// Unique identifier
    pub id: EntityId,

    /// Entity type/category (e.g. "document", "project")
    #[serde(rename = "type")]
    pub entity_type: EntityType,

    /// Entity name
    pub name: String,

    /// Arbitrary metadata
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Metadata>,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,

    /// Last update timestamp
    pub updated_at: DateTime<Utc>,

    /// Soft-delete marker
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Entity {
    /// Create a new entity
    pub fn new(name: impl Into<String>, entity_type: impl Into<EntityType>) -> Self {
        let now = Utc::now();
        Self {
            id: EntityId::new(),
            entity_type: entity_type.into(),
            name: name.into(),
            metadata: None,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        }
    }

    /// Set the initial metadata
    pub fn with_metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = Some(metadata);
        self
    }

    /// Check the name and type constraints
    pub fn validate(&self) -> Result<(), ValidationError> {
        limits::validate_entity_type(self.entity_type.as_str())?;
        limits::validate_entity_name(&self.name)
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }

    /// Shallow-merge new top-level metadata fields into this entity
    pub fn update_metadata(&mut self, fields: Metadata) {
        metadata::merge(&mut self.metadata, fields);
        self.updated_at = Utc::now();
    }

    /// Read a metadata value by dot path, falling back to `default`
    pub fn metadata_value(&self, path: &str, default: Value) -> Value {
        metadata::lookup(self.metadata.as_ref(), path)
            .cloned()
            .unwrap_or(default)
    }

    /// Check whether the metadata value at `path` contains `value`
    pub fn has_metadata(&self, path: &str, value: &Value) -> bool {
        metadata::contains(self.metadata.as_ref(), path, value)
    }

    pub fn soft_delete(&mut self, at: DateTime<Utc>) {
        self.deleted_at = Some(at);
    }

    pub fn restore(&mut self) {
        self.deleted_at = None;
    }
}

/// Data for creating a new entity
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewEntity {
    pub name: String,
    #[serde(rename = "type")]
    pub entity_type: String,
    #[serde(default)]
    pub metadata: Option<Metadata>,
}

impl NewEntity {
    pub fn new(name: impl Into<String>, entity_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            entity_type: entity_type.into(),
            metadata: None,
        }
    }

    pub fn with_metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = Some(metadata);
        self
    }

    /// Validate and build the entity record
    pub fn into_entity(self) -> Result<Entity, ValidationError> {
        let mut entity = Entity::new(self.name, self.entity_type);
        entity.metadata = self.metadata;
        entity.validate()?;
        Ok(entity)
    }
}
