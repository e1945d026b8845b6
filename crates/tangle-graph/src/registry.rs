//! Cached lookup of registered relationship types
//!
//! The registry reads every live type once at construction. Writes that go
//! through [`RelationshipTypeRegistry::register`] and
//! [`RelationshipTypeRegistry::retire`] keep the cache current; changes made
//! by any other writer are only seen after [`RelationshipTypeRegistry::reload`].

use chrono::Utc;
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tangle_core::{Entity, Error, Metadata, RelationshipType, Result};
use tangle_storage::{StorageBackend, WriteBatch};

pub struct RelationshipTypeRegistry {
    storage: Arc<dyn StorageBackend>,
    types: RwLock<HashMap<String, RelationshipType>>,
}

impl RelationshipTypeRegistry {
    /// Build a registry primed with every live type in `storage`
    pub async fn load(storage: Arc<dyn StorageBackend>) -> Result<Self> {
        let registry = Self {
            storage,
            types: RwLock::new(HashMap::new()),
        };
        registry.reload().await?;
        Ok(registry)
    }

    /// Replace the cache with a fresh read of the store
    pub async fn reload(&self) -> Result<()> {
        let types = self.storage.relationship_types(false).await?;
        let count = types.len();

        let mut cache = self.write_cache();
        *cache = types.into_iter().map(|t| (t.name.clone(), t)).collect();
        drop(cache);

        tracing::debug!("Loaded {} relationship types", count);
        Ok(())
    }

    /// Persist a new type and add it to the cache.
    ///
    /// A bidirectional type whose inverse name is not registered yet brings
    /// its inverse definition along in the same batch.
    pub async fn register(&self, definition: RelationshipType) -> Result<RelationshipType> {
        definition.validate_definition()?;

        if self.is_taken(&definition.name).await? {
            return Err(Error::DuplicateRelationshipType(definition.name));
        }

        let mut batch = WriteBatch::new();
        batch.put_relationship_type(definition.clone());

        let mut inverse = definition.inverse_definition();
        if let Some(candidate) = &inverse {
            if self.is_taken(&candidate.name).await? {
                inverse = None;
            }
        }
        if let Some(inverse) = &inverse {
            batch.put_relationship_type(inverse.clone());
        }

        self.storage.apply(batch).await?;

        let mut cache = self.write_cache();
        cache.insert(definition.name.clone(), definition.clone());
        if let Some(inverse) = inverse {
            tracing::info!(
                "Registered inverse relationship type '{}' for '{}'",
                inverse.name,
                definition.name
            );
            cache.insert(inverse.name.clone(), inverse);
        }
        drop(cache);

        tracing::info!("Registered relationship type '{}'", definition.name);
        Ok(definition)
    }

    /// Look up a type by name
    pub fn get(&self, name: &str) -> Option<RelationshipType> {
        self.read_cache().get(name).cloned()
    }

    /// Whether a type is registered, per the cache
    pub fn exists(&self, name: &str) -> bool {
        self.read_cache().contains_key(name)
    }

    /// Check a prospective edge against the named type's rules
    pub fn validate(
        &self,
        name: &str,
        from: &Entity,
        to: &Entity,
        metadata: Option<&Metadata>,
    ) -> Result<RelationshipType> {
        let definition = self
            .get(name)
            .ok_or_else(|| Error::UnknownRelationshipType(name.to_string()))?;
        definition.validate_relationship(from, to, metadata)?;
        Ok(definition)
    }

    /// Every cached type, ordered by name
    pub fn all_types(&self) -> Vec<RelationshipType> {
        let mut types: Vec<RelationshipType> = self.read_cache().values().cloned().collect();
        types.sort_by(|a, b| a.name.cmp(&b.name));
        types
    }

    /// Soft-delete a type so no new edges can use it
    pub async fn retire(&self, name: &str) -> Result<RelationshipType> {
        let mut definition = self
            .get(name)
            .ok_or_else(|| Error::UnknownRelationshipType(name.to_string()))?;

        let now = Utc::now();
        definition.soft_delete(now);
        definition.updated_at = now;
        self.storage.save_relationship_type(&definition).await?;

        self.write_cache().remove(name);
        tracing::info!("Retired relationship type '{}'", name);
        Ok(definition)
    }

    /// Names stay reserved in the store after a type is retired
    async fn is_taken(&self, name: &str) -> Result<bool> {
        if self.exists(name) {
            return Ok(true);
        }
        Ok(self.storage.get_relationship_type(name).await?.is_some())
    }

    fn read_cache(&self) -> RwLockReadGuard<'_, HashMap<String, RelationshipType>> {
        self.types.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_cache(&self) -> RwLockWriteGuard<'_, HashMap<String, RelationshipType>> {
        self.types.write().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tangle_core::{FieldRule, ValueKind};
    use tangle_storage::MemoryStorage;

    fn belongs_to() -> RelationshipType {
        RelationshipType::new("belongs_to")
            .with_inverse("has")
            .allow_from(["document", "task"])
            .allow_to(["project", "folder"])
            .require_fields(["created_by"])
            .with_rule("priority", FieldRule::of_type(ValueKind::Integer))
            .with_rule("priority", FieldRule::range(1.0, 5.0))
    }

    async fn registry() -> (Arc<dyn StorageBackend>, RelationshipTypeRegistry) {
        let storage: Arc<dyn StorageBackend> = Arc::new(MemoryStorage::new());
        let registry = RelationshipTypeRegistry::load(storage.clone()).await.unwrap();
        (storage, registry)
    }

    #[tokio::test]
    async fn test_register_and_get() {
        let (_, registry) = registry().await;
        registry.register(belongs_to()).await.unwrap();

        assert!(registry.exists("belongs_to"));
        assert_eq!(registry.get("belongs_to").unwrap().inverse_type_name(), Some("has"));
        assert!(registry.get("missing").is_none());
    }

    #[tokio::test]
    async fn test_inverse_registered_alongside() {
        let (storage, registry) = registry().await;
        registry.register(belongs_to()).await.unwrap();

        let inverse = registry.get("has").unwrap();
        assert_eq!(inverse.inverse_type_name(), Some("belongs_to"));
        assert!(storage.get_relationship_type("has").await.unwrap().is_some());

        let names: Vec<_> = registry.all_types().into_iter().map(|t| t.name).collect();
        assert_eq!(names, vec!["belongs_to", "has"]);
    }

    #[tokio::test]
    async fn test_existing_inverse_is_left_alone() {
        let (_, registry) = registry().await;
        let has = registry
            .register(RelationshipType::new("has").require_fields(["since"]))
            .await
            .unwrap();
        registry.register(belongs_to()).await.unwrap();

        assert_eq!(registry.get("has").unwrap().id, has.id);
    }

    #[tokio::test]
    async fn test_duplicate_rejected() {
        let (_, registry) = registry().await;
        registry.register(RelationshipType::new("knows")).await.unwrap();

        let err = registry
            .register(RelationshipType::new("knows"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::DuplicateRelationshipType(ref n) if n == "knows"));
    }

    #[tokio::test]
    async fn test_invalid_definition_rejected() {
        let (storage, registry) = registry().await;
        let err = registry
            .register(RelationshipType::new("bad").with_rule("code", FieldRule::pattern("(")))
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Validation(_)));
        assert!(storage.relationship_types(true).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_validate() {
        let (_, registry) = registry().await;
        registry.register(belongs_to()).await.unwrap();

        let doc = Entity::new("Design notes", "document");
        let proj = Entity::new("Apollo", "project");
        let ok: Metadata = serde_json::from_value(json!({"created_by": "u", "priority": 3})).unwrap();
        let resolved = registry.validate("belongs_to", &doc, &proj, Some(&ok)).unwrap();
        assert_eq!(resolved.name, "belongs_to");

        let err = registry.validate("owns", &doc, &proj, None).unwrap_err();
        assert!(matches!(err, Error::UnknownRelationshipType(_)));
    }

    #[tokio::test]
    async fn test_stale_until_reload() {
        let (storage, registry) = registry().await;

        storage
            .save_relationship_type(&RelationshipType::new("mentions"))
            .await
            .unwrap();
        assert!(!registry.exists("mentions"));

        registry.reload().await.unwrap();
        assert!(registry.exists("mentions"));
    }

    #[tokio::test]
    async fn test_retire() {
        let (storage, registry) = registry().await;
        registry.register(RelationshipType::new("knows")).await.unwrap();

        registry.retire("knows").await.unwrap();
        assert!(!registry.exists("knows"));
        assert!(storage.get_relationship_type("knows").await.unwrap().unwrap().is_deleted());

        // a fresh registry does not resurrect it
        let reloaded = RelationshipTypeRegistry::load(storage.clone()).await.unwrap();
        assert!(!reloaded.exists("knows"));

        let err = registry.retire("knows").await.unwrap_err();
        assert!(matches!(err, Error::UnknownRelationshipType(_)));
    }
}
