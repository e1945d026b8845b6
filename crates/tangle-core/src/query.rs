//! Attribute filters for listing entities and relationships

use crate::entity::{Entity, EntityId};
use crate::relationship::Relationship;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Entity filter builder
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EntityQuery {
    /// Exact entity type
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entity_type: Option<String>,

    /// Substring of the entity name
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name_like: Option<String>,

    /// Metadata path and the value it must contain
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<(String, Value)>,

    /// Include soft-deleted entities
    #[serde(default)]
    pub include_deleted: bool,
}

impl EntityQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn of_type(mut self, entity_type: impl Into<String>) -> Self {
        self.entity_type = Some(entity_type.into());
        self
    }

    pub fn name_like(mut self, fragment: impl Into<String>) -> Self {
        self.name_like = Some(fragment.into());
        self
    }

    pub fn with_metadata(mut self, path: impl Into<String>, value: Value) -> Self {
        self.metadata = Some((path.into(), value));
        self
    }

    pub fn with_deleted(mut self) -> Self {
        self.include_deleted = true;
        self
    }

    pub fn matches(&self, entity: &Entity) -> bool {
        if !self.include_deleted && entity.is_deleted() {
            return false;
        }
        if let Some(t) = &self.entity_type {
            if entity.entity_type.as_str() != t {
                return false;
            }
        }
        if let Some(fragment) = &self.name_like {
            if !entity.name.contains(fragment.as_str()) {
                return false;
            }
        }
        if let Some((path, value)) = &self.metadata {
            if !entity.has_metadata(path, value) {
                return false;
            }
        }
        true
    }
}

/// Relationship filter builder
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RelationshipQuery {
    /// Source entity
    #[serde(skip_serializing_if = "Option::is_none")]
    pub from: Option<EntityId>,

    /// Target entity
    #[serde(skip_serializing_if = "Option::is_none")]
    pub to: Option<EntityId>,

    /// Either endpoint
    #[serde(skip_serializing_if = "Option::is_none")]
    pub touching: Option<EntityId>,

    /// Accepted relationship types (empty = all types)
    #[serde(default)]
    pub types: Vec<String>,

    /// Include soft-deleted relationships
    #[serde(default)]
    pub include_deleted: bool,
}

impl RelationshipQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from(mut self, entity: EntityId) -> Self {
        self.from = Some(entity);
        self
    }

    pub fn to(mut self, entity: EntityId) -> Self {
        self.to = Some(entity);
        self
    }

    pub fn touching(mut self, entity: EntityId) -> Self {
        self.touching = Some(entity);
        self
    }

    pub fn of_type(mut self, relationship_type: impl Into<String>) -> Self {
        self.types.push(relationship_type.into());
        self
    }

    pub fn of_types<I, S>(mut self, types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.types.extend(types.into_iter().map(Into::into));
        self
    }

    pub fn with_deleted(mut self) -> Self {
        self.include_deleted = true;
        self
    }

    pub fn matches(&self, relationship: &Relationship) -> bool {
        if !self.include_deleted && relationship.is_deleted() {
            return false;
        }
        if self.from.as_ref().is_some_and(|id| relationship.from_id != *id) {
            return false;
        }
        if self.to.as_ref().is_some_and(|id| relationship.to_id != *id) {
            return false;
        }
        if self.touching.as_ref().is_some_and(|id| !relationship.touches(id)) {
            return false;
        }
        self.types.is_empty() || self.types.contains(&relationship.relationship_type)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_entity_query_builder() {
        let mut entity = Entity::new("Quarterly Report", "document");
        entity.update_metadata(serde_json::from_value(json!({"status": "draft"})).unwrap());

        assert!(EntityQuery::new().of_type("document").matches(&entity));
        assert!(!EntityQuery::new().of_type("project").matches(&entity));
        assert!(EntityQuery::new().name_like("Report").matches(&entity));
        assert!(!EntityQuery::new().name_like("Memo").matches(&entity));
        assert!(EntityQuery::new()
            .with_metadata("status", json!("draft"))
            .matches(&entity));
    }

    #[test]
    fn test_deleted_entities_are_hidden_by_default() {
        let mut entity = Entity::new("Old", "document");
        entity.soft_delete(chrono::Utc::now());

        assert!(!EntityQuery::new().matches(&entity));
        assert!(EntityQuery::new().with_deleted().matches(&entity));
    }

    #[test]
    fn test_relationship_query() {
        let a = EntityId::new();
        let b = EntityId::new();
        let rel = Relationship::new(a.clone(), b.clone(), "owns");

        assert!(RelationshipQuery::new().from(a.clone()).matches(&rel));
        assert!(!RelationshipQuery::new().from(b.clone()).matches(&rel));
        assert!(RelationshipQuery::new().to(b.clone()).matches(&rel));
        assert!(RelationshipQuery::new().touching(b).matches(&rel));
        assert!(RelationshipQuery::new().of_types(["knows", "owns"]).matches(&rel));
        assert!(!RelationshipQuery::new().of_type("knows").matches(&rel));
    }
}
