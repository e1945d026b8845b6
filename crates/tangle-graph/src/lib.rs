//! Tangle Graph - Validated relationships over a storage backend
//!
//! [`RelationshipTypeRegistry`] caches the registered relationship types,
//! [`RelationshipManager`] creates, deletes and traverses relationships under
//! those rules, and [`EntityService`] owns the entity lifecycle including
//! cascading soft-delete and restore.

pub mod manager;
pub mod registry;
pub mod service;

pub use manager::RelationshipManager;
pub use registry::RelationshipTypeRegistry;
pub use service::{EntityService, CONTAINS_RELATIONSHIP};
