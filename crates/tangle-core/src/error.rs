//! Error types for Tangle Core

use crate::entity::EntityId;
use crate::limits::ValidationError;
use crate::relationship_type::EndpointSide;
use crate::rule::RuleViolation;
use thiserror::Error;

/// Result type alias using Tangle's Error
pub type Result<T> = std::result::Result<T, Error>;

/// Tangle error types
#[derive(Error, Debug)]
pub enum Error {
    #[error("Entity not found: {0}")]
    EntityNotFound(String),

    #[error("Observation not found: {0}")]
    ObservationNotFound(String),

    #[error("Relationship not found: {0}")]
    RelationshipNotFound(String),

    #[error("Relationship type '{0}' does not exist")]
    UnknownRelationshipType(String),

    #[error("Relationship type already exists: {0}")]
    DuplicateRelationshipType(String),

    #[error("Relationship already exists: {from} -[{relationship_type}]-> {to}")]
    RelationshipExists {
        from: String,
        to: String,
        relationship_type: String,
    },

    #[error("Cannot create self-referential relationship on entity {0}")]
    SelfReference(EntityId),

    #[error("Invalid {side} entity type '{entity_type}' for relationship type '{relationship_type}'")]
    InvalidEndpointType {
        relationship_type: String,
        side: EndpointSide,
        entity_type: String,
    },

    #[error("Missing required metadata fields for '{relationship_type}': {}", .fields.join(", "))]
    MissingMetadataFields {
        relationship_type: String,
        fields: Vec<String>,
    },

    #[error("Invalid metadata for '{relationship_type}': {}", join_violations(.violations))]
    InvalidMetadataValue {
        relationship_type: String,
        violations: Vec<RuleViolation>,
    },

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Concurrent modification: {0}")]
    Conflict(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

fn join_violations(violations: &[RuleViolation]) -> String {
    violations
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages_name_the_fault() {
        let err = Error::MissingMetadataFields {
            relationship_type: "belongs_to".to_string(),
            fields: vec!["created_by".to_string(), "owner".to_string()],
        };
        assert_eq!(
            err.to_string(),
            "Missing required metadata fields for 'belongs_to': created_by, owner"
        );

        let err = Error::InvalidEndpointType {
            relationship_type: "belongs_to".to_string(),
            side: EndpointSide::From,
            entity_type: "folder".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Invalid from entity type 'folder' for relationship type 'belongs_to'"
        );
    }
}
