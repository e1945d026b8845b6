//! CLI command implementations

pub mod completions;
pub mod config;
pub mod entity;
pub mod relation;
pub mod types;

use serde_json::Value;
use tangle_core::{Entity, EntityId, EntityQuery, Error, Metadata};

use crate::AppContext;

/// Find a live entity by ULID or by its exact name
pub async fn resolve_entity(ctx: &AppContext, reference: &str) -> anyhow::Result<Entity> {
    if let Ok(id) = EntityId::from_string(reference) {
        match ctx.service.get_entity(&id).await {
            Ok(entity) => return Ok(entity),
            Err(Error::EntityNotFound(_)) => {}
            Err(e) => return Err(e.into()),
        }
    }

    let mut matches = ctx.service.find_by_name(reference).await?;
    match matches.len() {
        0 => anyhow::bail!("Entity '{}' not found", reference),
        1 => Ok(matches.remove(0)),
        n => anyhow::bail!(
            "Name '{}' matches {} entities; use the entity ID instead",
            reference,
            n
        ),
    }
}

/// Like [`resolve_entity`], but also finds soft-deleted entities
pub async fn resolve_any_entity(ctx: &AppContext, reference: &str) -> anyhow::Result<Entity> {
    if let Ok(id) = EntityId::from_string(reference) {
        if let Some(entity) = ctx.storage.get_entity(&id).await? {
            return Ok(entity);
        }
    }

    let query = EntityQuery::new().name_like(reference).with_deleted();
    let mut matches: Vec<Entity> = ctx
        .service
        .find_entities(&query)
        .await?
        .into_iter()
        .filter(|e| e.name == reference)
        .collect();
    match matches.len() {
        0 => anyhow::bail!("Entity '{}' not found", reference),
        1 => Ok(matches.remove(0)),
        n => anyhow::bail!(
            "Name '{}' matches {} entities; use the entity ID instead",
            reference,
            n
        ),
    }
}

/// Display name for an entity id, falling back to the id itself
pub async fn entity_label(ctx: &AppContext, id: &EntityId) -> String {
    match ctx.storage.get_entity(id).await {
        Ok(Some(entity)) => entity.name,
        _ => id.to_string(),
    }
}

/// Parse repeated `KEY=VALUE` arguments into metadata.
///
/// Values that parse as JSON keep their JSON type; anything else is a string.
pub fn parse_metadata(pairs: &[String]) -> anyhow::Result<Option<Metadata>> {
    if pairs.is_empty() {
        return Ok(None);
    }

    let mut metadata = Metadata::new();
    for pair in pairs {
        let (key, raw) = pair
            .split_once('=')
            .ok_or_else(|| anyhow::anyhow!("Invalid metadata '{}': expected KEY=VALUE", pair))?;
        let key = key.trim();
        if key.is_empty() {
            anyhow::bail!("Invalid metadata '{}': empty key", pair);
        }
        metadata.insert(key.to_string(), parse_value(raw));
    }
    Ok(Some(metadata))
}

/// JSON when it parses, otherwise the raw text as a string
pub fn parse_value(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_metadata() {
        let pairs = vec![
            "created_by=alice".to_string(),
            "priority=3".to_string(),
            "tags=[\"a\",\"b\"]".to_string(),
            "note=a=b".to_string(),
        ];
        let metadata = parse_metadata(&pairs).unwrap().unwrap();

        assert_eq!(metadata["created_by"], json!("alice"));
        assert_eq!(metadata["priority"], json!(3));
        assert_eq!(metadata["tags"], json!(["a", "b"]));
        assert_eq!(metadata["note"], json!("a=b"));
    }

    #[test]
    fn test_parse_metadata_errors() {
        assert!(parse_metadata(&[]).unwrap().is_none());
        assert!(parse_metadata(&["novalue".to_string()]).is_err());
        assert!(parse_metadata(&["=x".to_string()]).is_err());
    }
}
