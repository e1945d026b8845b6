//! Tangle Storage - Storage backends for the knowledge graph
//!
//! This crate provides the storage abstraction, atomic write batches and
//! the backends that persist entities, observations, relationship types
//! and relationships.

#![allow(clippy::result_large_err)]

pub mod batch;
pub mod error;
pub mod migration;
pub mod traits;

#[cfg(feature = "sqlite")]
pub mod sqlite;

pub mod memory;

pub use batch::{Precondition, WriteBatch, WriteOp};
pub use error::{StorageError, StorageResult};
pub use migration::{Migratable, SchemaVersion, CURRENT_VERSION};
pub use traits::StorageBackend;

#[cfg(feature = "sqlite")]
pub use sqlite::SqliteStorage;

pub use memory::MemoryStorage;
