//! Storage error types

use thiserror::Error;

/// Result type alias for storage operations
pub type StorageResult<T> = std::result::Result<T, StorageError>;

/// Storage-specific error types
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Duplicate relationship: {from} -[{relationship_type}]-> {to}")]
    DuplicateRelationship {
        from: String,
        to: String,
        relationship_type: String,
    },

    #[error("Duplicate relationship type: {0}")]
    DuplicateRelationshipType(String),

    #[error("Missing entity: {0}")]
    MissingEntity(String),

    #[error("Missing relationship type: {0}")]
    MissingRelationshipType(String),

    #[error("Missing relationship: {0}")]
    MissingRelationship(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Migration error: {0}")]
    Migration(String),

    #[error("Transaction error: {0}")]
    Transaction(String),

    #[cfg(feature = "sqlite")]
    #[error("SQLite error: {0}")]
    Sqlite(#[from] ::rusqlite::Error),
}

impl From<StorageError> for tangle_core::Error {
    fn from(err: StorageError) -> Self {
        use tangle_core::Error;

        match err {
            StorageError::DuplicateRelationship {
                from,
                to,
                relationship_type,
            } => Error::RelationshipExists {
                from,
                to,
                relationship_type,
            },
            StorageError::DuplicateRelationshipType(name) => Error::DuplicateRelationshipType(name),
            StorageError::MissingEntity(id) => Error::EntityNotFound(id),
            StorageError::MissingRelationshipType(name) => Error::UnknownRelationshipType(name),
            StorageError::MissingRelationship(id) => Error::RelationshipNotFound(id),
            StorageError::Conflict(reason) => Error::Conflict(reason),
            StorageError::Serialization(e) => Error::Serialization(e),
            other => Error::Storage(other.to_string()),
        }
    }
}
