//! SQLite storage backend
//!
//! Each table keeps the columns needed for keys, constraints and filtering,
//! plus a `data` column holding the full JSON record.

use crate::batch::{Precondition, WriteBatch, WriteOp};
use crate::error::{StorageError, StorageResult};
use crate::migration::Migratable;
use crate::traits::StorageBackend;
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, params_from_iter, Connection, Params, Statement};
use serde::de::DeserializeOwned;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use tangle_core::{
    Entity, EntityId, EntityQuery, Observation, ObservationId, Relationship, RelationshipId,
    RelationshipQuery, RelationshipType,
};

const SCHEMA_V1: &str = r#"
    CREATE TABLE IF NOT EXISTS entities (
        id TEXT PRIMARY KEY,
        type TEXT NOT NULL CHECK (length(type) BETWEEN 1 AND 50),
        name TEXT NOT NULL CHECK (length(name) BETWEEN 1 AND 255),
        created_at TEXT NOT NULL,
        deleted_at TEXT,
        data TEXT NOT NULL
    );

    CREATE INDEX IF NOT EXISTS idx_entities_type_name ON entities(type, name);
    CREATE INDEX IF NOT EXISTS idx_entities_created_at ON entities(created_at);

    CREATE TABLE IF NOT EXISTS relationship_types (
        id TEXT PRIMARY KEY,
        name TEXT NOT NULL UNIQUE,
        deleted_at TEXT,
        data TEXT NOT NULL
    );

    CREATE TABLE IF NOT EXISTS relationships (
        id TEXT PRIMARY KEY,
        from_entity_id TEXT NOT NULL REFERENCES entities(id) ON DELETE CASCADE,
        to_entity_id TEXT NOT NULL REFERENCES entities(id) ON DELETE CASCADE,
        type TEXT NOT NULL REFERENCES relationship_types(name),
        inverse_of TEXT REFERENCES relationships(id)
            ON DELETE CASCADE DEFERRABLE INITIALLY DEFERRED,
        started_at TEXT,
        created_at TEXT NOT NULL,
        deleted_at TEXT,
        data TEXT NOT NULL
    );

    CREATE INDEX IF NOT EXISTS idx_relationships_from ON relationships(from_entity_id, type);
    CREATE INDEX IF NOT EXISTS idx_relationships_to ON relationships(to_entity_id, type);
    CREATE INDEX IF NOT EXISTS idx_relationships_started ON relationships(started_at);
    CREATE INDEX IF NOT EXISTS idx_relationships_inverse ON relationships(inverse_of);
    CREATE UNIQUE INDEX IF NOT EXISTS idx_relationships_live
        ON relationships(from_entity_id, to_entity_id, type) WHERE deleted_at IS NULL;

    CREATE TABLE IF NOT EXISTS observations (
        id TEXT PRIMARY KEY,
        entity_id TEXT NOT NULL REFERENCES entities(id) ON DELETE CASCADE,
        confidence REAL,
        created_at TEXT NOT NULL,
        deleted_at TEXT,
        data TEXT NOT NULL
    );

    CREATE INDEX IF NOT EXISTS idx_observations_entity ON observations(entity_id);
"#;

/// Fixed-width RFC 3339 so text ordering matches time ordering
fn timestamp(at: &DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn decode_rows<T: DeserializeOwned>(
    stmt: &mut Statement<'_>,
    params: impl Params,
) -> StorageResult<Vec<T>> {
    let rows = stmt.query_map(params, |row| row.get::<_, String>(0))?;

    let mut records = Vec::new();
    for row in rows {
        let data = row?;
        records.push(serde_json::from_str(&data)?);
    }
    Ok(records)
}

fn decode_one<T: DeserializeOwned>(
    conn: &Connection,
    sql: &str,
    params: impl Params,
) -> StorageResult<Option<T>> {
    match conn.query_row(sql, params, |row| row.get::<_, String>(0)) {
        Ok(data) => Ok(Some(serde_json::from_str(&data)?)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

fn exists(conn: &Connection, sql: &str, params: impl Params) -> StorageResult<bool> {
    Ok(conn.query_row(sql, params, |row| row.get::<_, bool>(0))?)
}

/// `None` when the entity row is absent, otherwise whether it is live
fn entity_liveness(conn: &Connection, id: &str) -> StorageResult<Option<bool>> {
    match conn.query_row(
        "SELECT deleted_at IS NULL FROM entities WHERE id = ?1",
        params![id],
        |row| row.get::<_, bool>(0),
    ) {
        Ok(live) => Ok(Some(live)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// SQLite storage backend
pub struct SqliteStorage {
    conn: Mutex<Connection>,
}

impl SqliteStorage {
    /// Open or create a SQLite database at the given path
    pub fn open(path: impl AsRef<Path>) -> StorageResult<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        tracing::debug!("Opening SQLite database at {}", path.display());
        Self::with_connection(Connection::open(path)?)
    }

    /// Create an in-memory SQLite database (for testing)
    pub fn in_memory() -> StorageResult<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> StorageResult<Self> {
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;

        let storage = Self {
            conn: Mutex::new(conn),
        };
        storage.migrate_to_latest()?;

        Ok(storage)
    }

    fn lock(&self) -> StorageResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| StorageError::Database(format!("Lock error: {}", e)))
    }

    fn apply_op(conn: &Connection, op: WriteOp) -> StorageResult<()> {
        match op {
            WriteOp::PutEntity(entity) => {
                let data = serde_json::to_string(&entity)?;
                conn.execute(
                    "INSERT INTO entities (id, type, name, created_at, deleted_at, data)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                     ON CONFLICT(id) DO UPDATE SET
                        type = excluded.type,
                        name = excluded.name,
                        created_at = excluded.created_at,
                        deleted_at = excluded.deleted_at,
                        data = excluded.data",
                    params![
                        entity.id.to_string(),
                        entity.entity_type.as_str(),
                        entity.name,
                        timestamp(&entity.created_at),
                        entity.deleted_at.as_ref().map(timestamp),
                        data
                    ],
                )?;
            }
            WriteOp::PutObservation(observation) => {
                let entity_id = observation.entity_id.to_string();
                match entity_liveness(conn, &entity_id)? {
                    Some(true) => {}
                    Some(false) if observation.is_deleted() => {}
                    _ => return Err(StorageError::MissingEntity(entity_id)),
                }

                let data = serde_json::to_string(&observation)?;
                conn.execute(
                    "INSERT INTO observations (id, entity_id, confidence, created_at, deleted_at, data)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                     ON CONFLICT(id) DO UPDATE SET
                        entity_id = excluded.entity_id,
                        confidence = excluded.confidence,
                        created_at = excluded.created_at,
                        deleted_at = excluded.deleted_at,
                        data = excluded.data",
                    params![
                        observation.id.to_string(),
                        entity_id,
                        observation.confidence,
                        timestamp(&observation.created_at),
                        observation.deleted_at.as_ref().map(timestamp),
                        data
                    ],
                )?;
            }
            WriteOp::PutRelationship(relationship) => {
                Self::check_relationship(conn, &relationship)?;

                let data = serde_json::to_string(&relationship)?;
                conn.execute(
                    "INSERT INTO relationships
                        (id, from_entity_id, to_entity_id, type, inverse_of,
                         started_at, created_at, deleted_at, data)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
                     ON CONFLICT(id) DO UPDATE SET
                        from_entity_id = excluded.from_entity_id,
                        to_entity_id = excluded.to_entity_id,
                        type = excluded.type,
                        inverse_of = excluded.inverse_of,
                        started_at = excluded.started_at,
                        created_at = excluded.created_at,
                        deleted_at = excluded.deleted_at,
                        data = excluded.data",
                    params![
                        relationship.id.to_string(),
                        relationship.from_id.to_string(),
                        relationship.to_id.to_string(),
                        relationship.relationship_type,
                        relationship.inverse_of.as_ref().map(|id| id.to_string()),
                        relationship.started_at.as_ref().map(timestamp),
                        timestamp(&relationship.created_at),
                        relationship.deleted_at.as_ref().map(timestamp),
                        data
                    ],
                )?;
            }
            WriteOp::PutRelationshipType(definition) => {
                let id = definition.id.to_string();
                if exists(
                    conn,
                    "SELECT EXISTS(SELECT 1 FROM relationship_types WHERE name = ?1 AND id != ?2)",
                    params![definition.name, id],
                )? {
                    return Err(StorageError::DuplicateRelationshipType(definition.name));
                }

                let data = serde_json::to_string(&definition)?;
                conn.execute(
                    "INSERT INTO relationship_types (id, name, deleted_at, data)
                     VALUES (?1, ?2, ?3, ?4)
                     ON CONFLICT(id) DO UPDATE SET
                        name = excluded.name,
                        deleted_at = excluded.deleted_at,
                        data = excluded.data",
                    params![
                        id,
                        definition.name,
                        definition.deleted_at.as_ref().map(timestamp),
                        data
                    ],
                )?;
            }
            WriteOp::RemoveEntity(id) => {
                conn.execute("DELETE FROM entities WHERE id = ?1", params![id.to_string()])?;
            }
            WriteOp::RemoveObservation(id) => {
                conn.execute("DELETE FROM observations WHERE id = ?1", params![id.to_string()])?;
            }
            WriteOp::RemoveRelationship(id) => {
                conn.execute("DELETE FROM relationships WHERE id = ?1", params![id.to_string()])?;
            }
            WriteOp::SoftDeleteEntity { id, at } => Self::soft_delete_entity(conn, &id, at)?,
            WriteOp::RestoreEntity { id, at } => Self::restore_entity(conn, &id, at)?,
            WriteOp::Expect(precondition) => Self::check(conn, &precondition)?,
        }
        Ok(())
    }

    fn check(conn: &Connection, precondition: &Precondition) -> StorageResult<()> {
        let current = match precondition {
            Precondition::EntityUnchanged { id, .. } => decode_one::<Entity>(
                conn,
                "SELECT data FROM entities WHERE id = ?1",
                params![id.to_string()],
            )?
            .map(|e| e.updated_at),
            Precondition::RelationshipUnchanged { id, .. } => decode_one::<Relationship>(
                conn,
                "SELECT data FROM relationships WHERE id = ?1",
                params![id.to_string()],
            )?
            .map(|r| r.updated_at),
        };
        precondition.verify(current)
    }

    fn soft_delete_entity(
        conn: &Connection,
        id: &EntityId,
        at: DateTime<Utc>,
    ) -> StorageResult<()> {
        let key = id.to_string();
        let mut entity: Entity = decode_one(
            conn,
            "SELECT data FROM entities WHERE id = ?1 AND deleted_at IS NULL",
            params![key],
        )?
        .ok_or_else(|| StorageError::MissingEntity(key.clone()))?;

        let observations: Vec<Observation> = decode_rows(
            &mut conn.prepare(
                "SELECT data FROM observations WHERE entity_id = ?1 AND deleted_at IS NULL",
            )?,
            params![key],
        )?;
        let relationships: Vec<Relationship> = decode_rows(
            &mut conn.prepare(
                "SELECT data FROM relationships
                 WHERE (from_entity_id = ?1 OR to_entity_id = ?1) AND deleted_at IS NULL",
            )?,
            params![key],
        )?;

        for mut observation in observations {
            observation.soft_delete(at, true);
            observation.updated_at = at;
            Self::apply_op(conn, WriteOp::PutObservation(observation))?;
        }
        for mut relationship in relationships {
            relationship.soft_delete(at, true);
            relationship.updated_at = at;
            Self::apply_op(conn, WriteOp::PutRelationship(relationship))?;
        }
        entity.soft_delete(at);
        entity.updated_at = at;
        Self::apply_op(conn, WriteOp::PutEntity(entity))
    }

    fn restore_entity(
        conn: &Connection,
        id: &EntityId,
        at: DateTime<Utc>,
    ) -> StorageResult<()> {
        let key = id.to_string();
        let mut entity: Entity = decode_one(
            conn,
            "SELECT data FROM entities WHERE id = ?1",
            params![key],
        )?
        .ok_or_else(|| StorageError::MissingEntity(key.clone()))?;
        if !entity.is_deleted() {
            return Ok(());
        }
        entity.restore();
        entity.updated_at = at;
        Self::apply_op(conn, WriteOp::PutEntity(entity))?;

        let observations: Vec<Observation> = decode_rows(
            &mut conn.prepare(
                "SELECT data FROM observations WHERE entity_id = ?1 AND deleted_at IS NOT NULL",
            )?,
            params![key],
        )?;
        for mut observation in observations.into_iter().filter(|o| o.cascade_deleted) {
            observation.restore();
            observation.updated_at = at;
            Self::apply_op(conn, WriteOp::PutObservation(observation))?;
        }

        let relationships: Vec<Relationship> = decode_rows(
            &mut conn.prepare(
                "SELECT data FROM relationships
                 WHERE (from_entity_id = ?1 OR to_entity_id = ?1) AND deleted_at IS NOT NULL",
            )?,
            params![key],
        )?;
        for mut relationship in relationships.into_iter().filter(|r| r.cascade_deleted) {
            let Some(other) = relationship.other_endpoint(id) else {
                continue;
            };
            if entity_liveness(conn, &other.to_string())? != Some(true) {
                continue;
            }
            relationship.restore();
            relationship.updated_at = at;
            Self::apply_op(conn, WriteOp::PutRelationship(relationship))?;
        }
        Ok(())
    }

    /// Report constraint failures with the offending keys before SQLite does
    fn check_relationship(conn: &Connection, relationship: &Relationship) -> StorageResult<()> {
        for endpoint in [&relationship.from_id, &relationship.to_id] {
            let endpoint = endpoint.to_string();
            match entity_liveness(conn, &endpoint)? {
                Some(true) => {}
                Some(false) if relationship.is_deleted() => {}
                _ => return Err(StorageError::MissingEntity(endpoint)),
            }
        }

        if !exists(
            conn,
            "SELECT EXISTS(SELECT 1 FROM relationship_types WHERE name = ?1)",
            params![relationship.relationship_type],
        )? {
            return Err(StorageError::MissingRelationshipType(
                relationship.relationship_type.clone(),
            ));
        }

        if relationship.is_deleted() {
            return Ok(());
        }

        let duplicate = exists(
            conn,
            "SELECT EXISTS(
                SELECT 1 FROM relationships
                WHERE from_entity_id = ?1 AND to_entity_id = ?2 AND type = ?3
                  AND deleted_at IS NULL AND id != ?4
            )",
            params![
                relationship.from_id.to_string(),
                relationship.to_id.to_string(),
                relationship.relationship_type,
                relationship.id.to_string()
            ],
        )?;
        if duplicate {
            return Err(StorageError::DuplicateRelationship {
                from: relationship.from_id.to_string(),
                to: relationship.to_id.to_string(),
                relationship_type: relationship.relationship_type.clone(),
            });
        }
        Ok(())
    }

    /// Resolve deferred `inverse_of` references before commit
    fn check_inverse_links(conn: &Connection, written: &[RelationshipId]) -> StorageResult<()> {
        for id in written {
            let dangling: Option<String> = match conn.query_row(
                "SELECT r.inverse_of FROM relationships r
                 LEFT JOIN relationships i ON i.id = r.inverse_of
                 WHERE r.id = ?1 AND r.inverse_of IS NOT NULL AND i.id IS NULL",
                params![id.to_string()],
                |row| row.get(0),
            ) {
                Ok(inverse) => Some(inverse),
                Err(rusqlite::Error::QueryReturnedNoRows) => None,
                Err(e) => return Err(e.into()),
            };
            if let Some(inverse) = dangling {
                return Err(StorageError::MissingRelationship(inverse));
            }
        }
        Ok(())
    }
}

impl Migratable for SqliteStorage {
    fn get_schema_version(&self) -> StorageResult<u32> {
        let conn = self.lock()?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL);",
        )?;

        match conn.query_row("SELECT version FROM schema_version LIMIT 1", [], |row| {
            row.get::<_, u32>(0)
        }) {
            Ok(version) => Ok(version),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(0),
            Err(e) => Err(e.into()),
        }
    }

    fn set_schema_version(&self, version: u32) -> StorageResult<()> {
        let conn = self.lock()?;
        conn.execute("DELETE FROM schema_version", [])?;
        conn.execute(
            "INSERT INTO schema_version (version) VALUES (?1)",
            params![version],
        )?;
        Ok(())
    }

    fn run_migration(&self, version: u32) -> StorageResult<()> {
        match version {
            1 => {
                let conn = self.lock()?;
                conn.execute_batch(SCHEMA_V1)?;
                Ok(())
            }
            other => Err(StorageError::Migration(format!(
                "No migration defined for schema version {}",
                other
            ))),
        }
    }
}

#[async_trait]
impl StorageBackend for SqliteStorage {
    async fn initialize(&self) -> StorageResult<()> {
        Ok(())
    }

    async fn close(&self) -> StorageResult<()> {
        Ok(())
    }

    async fn health_check(&self) -> StorageResult<bool> {
        let conn = self.lock()?;
        let one: i64 = conn.query_row("SELECT 1", [], |row| row.get(0))?;
        Ok(one == 1)
    }

    async fn apply(&self, batch: WriteBatch) -> StorageResult<()> {
        let mut conn = self.lock()?;
        let size = batch.len();
        let tx = conn
            .transaction()
            .map_err(|e| StorageError::Transaction(e.to_string()))?;

        let mut written = Vec::new();
        for op in batch {
            if let WriteOp::PutRelationship(r) = &op {
                written.push(r.id.clone());
            }
            Self::apply_op(&tx, op)?;
        }
        Self::check_inverse_links(&tx, &written)?;

        tx.commit()
            .map_err(|e| StorageError::Transaction(e.to_string()))?;
        tracing::debug!("Committed batch of {} writes", size);
        Ok(())
    }

    async fn get_entity(&self, id: &EntityId) -> StorageResult<Option<Entity>> {
        let conn = self.lock()?;
        decode_one(
            &conn,
            "SELECT data FROM entities WHERE id = ?1",
            params![id.to_string()],
        )
    }

    async fn list_entities(&self, query: &EntityQuery) -> StorageResult<Vec<Entity>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT data FROM entities
             WHERE (?1 IS NULL OR type = ?1) AND (?2 OR deleted_at IS NULL)
             ORDER BY created_at, id",
        )?;

        let entities: Vec<Entity> =
            decode_rows(&mut stmt, params![query.entity_type, query.include_deleted])?;
        Ok(entities.into_iter().filter(|e| query.matches(e)).collect())
    }

    async fn get_observation(&self, id: &ObservationId) -> StorageResult<Option<Observation>> {
        let conn = self.lock()?;
        decode_one(
            &conn,
            "SELECT data FROM observations WHERE id = ?1",
            params![id.to_string()],
        )
    }

    async fn observations_for_entity(
        &self,
        entity_id: &EntityId,
        include_deleted: bool,
    ) -> StorageResult<Vec<Observation>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT data FROM observations
             WHERE entity_id = ?1 AND (?2 OR deleted_at IS NULL)
             ORDER BY created_at, id",
        )?;
        decode_rows(&mut stmt, params![entity_id.to_string(), include_deleted])
    }

    async fn get_relationship(&self, id: &RelationshipId) -> StorageResult<Option<Relationship>> {
        let conn = self.lock()?;
        decode_one(
            &conn,
            "SELECT data FROM relationships WHERE id = ?1",
            params![id.to_string()],
        )
    }

    async fn find_relationships(
        &self,
        query: &RelationshipQuery,
    ) -> StorageResult<Vec<Relationship>> {
        let mut clauses: Vec<String> = Vec::new();
        let mut values: Vec<String> = Vec::new();

        if let Some(from) = &query.from {
            values.push(from.to_string());
            clauses.push(format!("from_entity_id = ?{}", values.len()));
        }
        if let Some(to) = &query.to {
            values.push(to.to_string());
            clauses.push(format!("to_entity_id = ?{}", values.len()));
        }
        if let Some(entity) = &query.touching {
            values.push(entity.to_string());
            let n = values.len();
            clauses.push(format!("(from_entity_id = ?{n} OR to_entity_id = ?{n})"));
        }
        if !query.types.is_empty() {
            let first = values.len() + 1;
            values.extend(query.types.iter().cloned());
            let placeholders: Vec<String> =
                (first..=values.len()).map(|i| format!("?{}", i)).collect();
            clauses.push(format!("type IN ({})", placeholders.join(", ")));
        }
        if !query.include_deleted {
            clauses.push("deleted_at IS NULL".to_string());
        }

        let mut sql = String::from("SELECT data FROM relationships");
        if !clauses.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&clauses.join(" AND "));
        }
        sql.push_str(" ORDER BY created_at, id");

        let conn = self.lock()?;
        let mut stmt = conn.prepare(&sql)?;
        decode_rows(&mut stmt, params_from_iter(values))
    }

    async fn relationship_types(
        &self,
        include_deleted: bool,
    ) -> StorageResult<Vec<RelationshipType>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT data FROM relationship_types
             WHERE (?1 OR deleted_at IS NULL)
             ORDER BY name",
        )?;
        decode_rows(&mut stmt, params![include_deleted])
    }

    async fn get_relationship_type(&self, name: &str) -> StorageResult<Option<RelationshipType>> {
        let conn = self.lock()?;
        decode_one(
            &conn,
            "SELECT data FROM relationship_types WHERE name = ?1",
            params![name],
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tangle_core::NewObservation;

    async fn seeded(storage: &SqliteStorage) -> (Entity, Entity) {
        let a = Entity::new("John", "person");
        let b = Entity::new("Google", "company");
        let mut batch = WriteBatch::new();
        batch
            .put_entity(a.clone())
            .put_entity(b.clone())
            .put_relationship_type(RelationshipType::new("works_at"));
        storage.apply(batch).await.unwrap();
        (a, b)
    }

    fn linked_pair(a: &Entity, b: &Entity, ty: &str) -> (Relationship, Relationship) {
        let mut forward = Relationship::new(a.id.clone(), b.id.clone(), ty);
        let mut backward = Relationship::new(b.id.clone(), a.id.clone(), ty);
        forward.inverse_of = Some(backward.id.clone());
        backward.inverse_of = Some(forward.id.clone());
        (forward, backward)
    }

    #[tokio::test]
    async fn test_sqlite_storage() {
        let storage = SqliteStorage::in_memory().unwrap();
        storage.initialize().await.unwrap();
        assert!(storage.health_check().await.unwrap());

        let entity = Entity::new("TestEntity", "test");
        storage.save_entity(&entity).await.unwrap();

        let retrieved = storage.get_entity(&entity.id).await.unwrap();
        assert_eq!(retrieved.unwrap().name, "TestEntity");

        let mut batch = WriteBatch::new();
        batch.remove_entity(entity.id.clone());
        storage.apply(batch).await.unwrap();
        assert!(storage.get_entity(&entity.id).await.unwrap().is_none());
    }

    #[test]
    fn test_schema_version_recorded() {
        let storage = SqliteStorage::in_memory().unwrap();
        assert_eq!(storage.get_schema_version().unwrap(), crate::CURRENT_VERSION);
        storage.migrate_to_latest().unwrap();
    }

    #[tokio::test]
    async fn test_sqlite_relations() {
        let storage = SqliteStorage::in_memory().unwrap();
        let (a, b) = seeded(&storage).await;

        let relation = Relationship::new(a.id.clone(), b.id.clone(), "works_at");
        storage
            .apply(WriteOp::PutRelationship(relation).into())
            .await
            .unwrap();

        let relations = storage
            .find_relationships(&RelationshipQuery::new().touching(a.id.clone()))
            .await
            .unwrap();
        assert_eq!(relations.len(), 1);
        assert_eq!(relations[0].relationship_type, "works_at");

        let none = storage
            .find_relationships(&RelationshipQuery::new().from(b.id.clone()).of_type("works_at"))
            .await
            .unwrap();
        assert!(none.is_empty());
    }

    #[tokio::test]
    async fn test_duplicate_and_unknown_type_rejected() {
        let storage = SqliteStorage::in_memory().unwrap();
        let (a, b) = seeded(&storage).await;

        let first = Relationship::new(a.id.clone(), b.id.clone(), "works_at");
        storage.apply(WriteOp::PutRelationship(first).into()).await.unwrap();

        let again = Relationship::new(a.id.clone(), b.id.clone(), "works_at");
        let err = storage.apply(WriteOp::PutRelationship(again).into()).await.unwrap_err();
        assert!(matches!(err, StorageError::DuplicateRelationship { .. }));

        let unknown = Relationship::new(a.id.clone(), b.id.clone(), "founded");
        let err = storage.apply(WriteOp::PutRelationship(unknown).into()).await.unwrap_err();
        assert!(matches!(err, StorageError::MissingRelationshipType(_)));
    }

    #[tokio::test]
    async fn test_failed_batch_rolls_back() {
        let storage = SqliteStorage::in_memory().unwrap();
        let (a, _) = seeded(&storage).await;
        let extra = Entity::new("Larry", "person");

        let mut batch = WriteBatch::new();
        batch
            .put_entity(extra.clone())
            .put_relationship(Relationship::new(a.id.clone(), EntityId::new(), "works_at"));
        let err = storage.apply(batch).await.unwrap_err();

        assert!(matches!(err, StorageError::MissingEntity(_)));
        assert!(storage.get_entity(&extra.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_pair_written_in_one_batch() {
        let storage = SqliteStorage::in_memory().unwrap();
        let (a, b) = seeded(&storage).await;
        let (forward, backward) = linked_pair(&a, &b, "works_at");

        let mut batch = WriteBatch::new();
        batch
            .put_relationship(forward.clone())
            .put_relationship(backward.clone());
        storage.apply(batch).await.unwrap();

        let stored = storage.get_relationship(&forward.id).await.unwrap().unwrap();
        assert_eq!(stored.inverse_of, Some(backward.id.clone()));

        // removing one side takes its partner with it
        let mut batch = WriteBatch::new();
        batch.remove_relationship(forward.id.clone());
        storage.apply(batch).await.unwrap();
        assert!(storage.get_relationship(&backward.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_dangling_inverse_rejected() {
        let storage = SqliteStorage::in_memory().unwrap();
        let (a, b) = seeded(&storage).await;

        let mut rel = Relationship::new(a.id.clone(), b.id.clone(), "works_at");
        rel.inverse_of = Some(RelationshipId::new());
        let err = storage.apply(WriteOp::PutRelationship(rel).into()).await.unwrap_err();
        assert!(matches!(err, StorageError::MissingRelationship(_)));
    }

    #[tokio::test]
    async fn test_entity_update_keeps_dependents() {
        let storage = SqliteStorage::in_memory().unwrap();
        let (mut a, b) = seeded(&storage).await;
        let relation = Relationship::new(a.id.clone(), b.id.clone(), "works_at");
        storage
            .apply(WriteOp::PutRelationship(relation.clone()).into())
            .await
            .unwrap();

        a.name = "John Smith".to_string();
        storage.save_entity(&a).await.unwrap();

        assert!(storage.get_relationship(&relation.id).await.unwrap().is_some());
        let reloaded = storage.get_entity(&a.id).await.unwrap().unwrap();
        assert_eq!(reloaded.name, "John Smith");
    }

    #[tokio::test]
    async fn test_entity_removal_cascades() {
        let storage = SqliteStorage::in_memory().unwrap();
        let (a, b) = seeded(&storage).await;
        let observation = NewObservation::new("Joined in 2020")
            .into_observation(a.id.clone())
            .unwrap();
        let (forward, backward) = linked_pair(&a, &b, "works_at");

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
    }

    #[tokio::test]
    async fn test_entity_filters() {
        let storage = SqliteStorage::in_memory().unwrap();
        let (mut a, _) = seeded(&storage).await;
        a.soft_delete(chrono::Utc::now());
        storage.save_entity(&a).await.unwrap();

        let people = storage
            .list_entities(&EntityQuery::new().of_type("person"))
            .await
            .unwrap();
        assert!(people.is_empty());

        let people = storage
            .list_entities(&EntityQuery::new().of_type("person").with_deleted())
            .await
            .unwrap();
        assert_eq!(people.len(), 1);

        let named = storage
            .list_entities(&EntityQuery::new().name_like("Goo"))
            .await
            .unwrap();
        assert_eq!(named.len(), 1);
    }

    #[tokio::test]
    async fn test_reopen_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("tangle.db");
        let entity = Entity::new("Durable", "note");

        {
            let storage = SqliteStorage::open(&path).unwrap();
            storage.save_entity(&entity).await.unwrap();
            storage
                .save_relationship_type(&RelationshipType::new("mentions"))
                .await
                .unwrap();
        }

        let storage = SqliteStorage::open(&path).unwrap();
        assert!(storage.get_entity(&entity.id).await.unwrap().is_some());
        assert_eq!(storage.relationship_types(false).await.unwrap().len(), 1);
    }
    #[tokio::test]
    async fn test_live_relationship_needs_live_endpoints() {
        let storage = SqliteStorage::in_memory().unwrap();
        let (a, mut b) = seeded(&storage).await;
        b.soft_delete(Utc::now());
        storage.save_entity(&b).await.unwrap();

        let live = Relationship::new(a.id.clone(), b.id.clone(), "works_at");
        let err = storage.apply(WriteOp::PutRelationship(live).into()).await.unwrap_err();
        assert!(matches!(err, StorageError::MissingEntity(ref id) if *id == b.id.to_string()));

        let observation = NewObservation::new("Left in 2024")
            .into_observation(b.id.clone())
            .unwrap();
        let err = storage.save_observation(&observation).await.unwrap_err();
        assert!(matches!(err, StorageError::MissingEntity(_)));
    }

    #[tokio::test]
    async fn test_soft_delete_and_restore_inside_transaction() {
        let storage = SqliteStorage::in_memory().unwrap();
        let (a, b) = seeded(&storage).await;
        let observation = NewObservation::new("Joined in 2020")
            .into_observation(a.id.clone())
            .unwrap();
        let (forward, backward) = linked_pair(&a, &b, "works_at");
        let mut batch = WriteBatch::new();
        batch
            .put_observation(observation.clone())
            .put_relationship(forward.clone())
            .put_relationship(backward.clone());
        storage.apply(batch).await.unwrap();

        let at = Utc::now();
        let mut batch = WriteBatch::new();
        batch.soft_delete_entity(a.id.clone(), at);
        storage.apply(batch).await.unwrap();

        for id in [&forward.id, &backward.id] {
            let stored = storage.get_relationship(id).await.unwrap().unwrap();
            assert_eq!(stored.deleted_at, Some(at));
            assert!(stored.cascade_deleted);
        }
        let stored = storage.get_observation(&observation.id).await.unwrap().unwrap();
        assert!(stored.cascade_deleted);
        assert!(storage.get_entity(&a.id).await.unwrap().unwrap().is_deleted());

        let mut batch = WriteBatch::new();
        batch.restore_entity(a.id.clone(), Utc::now());
        storage.apply(batch).await.unwrap();

        assert!(!storage.get_entity(&a.id).await.unwrap().unwrap().is_deleted());
        assert!(!storage.get_observation(&observation.id).await.unwrap().unwrap().is_deleted());
        let live = storage
            .find_relationships(&RelationshipQuery::new().touching(a.id.clone()))
            .await
            .unwrap();
        assert_eq!(live.len(), 2);
    }

    #[tokio::test]
    async fn test_stale_precondition_rolls_back() {
        let storage = SqliteStorage::in_memory().unwrap();
        let (a, b) = seeded(&storage).await;
        let relation = Relationship::new(a.id.clone(), b.id.clone(), "works_at");
        storage
            .apply(WriteOp::PutRelationship(relation.clone()).into())
            .await
            .unwrap();

        let mut batch = WriteBatch::new();
        batch.soft_delete_entity(a.id.clone(), Utc::now());
        storage.apply(batch).await.unwrap();

        // built from rows read before the delete above
        let mut revived = relation.clone();
        revived.metadata = None;
        let mut batch = WriteBatch::new();
        batch.expect_relationship(&relation).put_relationship(revived);
        let err = storage.apply(batch).await.unwrap_err();
        assert!(matches!(err, StorageError::Conflict(_)));
        assert!(storage.get_relationship(&relation.id).await.unwrap().unwrap().is_deleted());

        let mut batch = WriteBatch::new();
        batch.expect_entity(&Entity::new("Ghost", "person"));
        let err = storage.apply(batch).await.unwrap_err();
        assert!(matches!(err, StorageError::MissingEntity(_)));
    }
}
