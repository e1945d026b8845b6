//! Field limits and validation for persisted records

/// Maximum length for entity types (50 chars)
pub const MAX_ENTITY_TYPE_LEN: usize = 50;

/// Maximum length for entity names (255 chars)
pub const MAX_ENTITY_NAME_LEN: usize = 255;

/// Maximum length for an observation source (100 chars)
pub const MAX_OBSERVATION_SOURCE_LEN: usize = 100;

/// Maximum length for relationship type names, including inverse names (50 chars)
pub const MAX_RELATIONSHIP_TYPE_LEN: usize = 50;

/// Maximum traversal depth accepted from callers (50)
pub const MAX_TRAVERSAL_DEPTH: u32 = 50;

/// Validation error type
#[derive(Debug, Clone, PartialEq)]
pub enum ValidationError {
    EmptyEntityName,
    EntityNameTooLong { len: usize, max: usize },
    EmptyEntityType,
    EntityTypeTooLong { len: usize, max: usize },
    EmptyObservation,
    ObservationSourceTooLong { len: usize, max: usize },
    ConfidenceOutOfRange { value: f64 },
    EmptyRelationshipTypeName,
    RelationshipTypeNameTooLong { name: String, len: usize, max: usize },
    InvalidPattern { field: String, message: String },
    InvalidRange { field: String, min: f64, max: f64 },
    EmptyChoices { field: String },
    InvalidPeriod,
    TraversalDepthTooLarge { depth: u32, max: u32 },
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EmptyEntityName => write!(f, "Entity name cannot be empty"),
            Self::EntityNameTooLong { len, max } => {
                write!(f, "Entity name too long: {} chars (max {})", len, max)
            }
            Self::EmptyEntityType => write!(f, "Entity type cannot be empty"),
            Self::EntityTypeTooLong { len, max } => {
                write!(f, "Entity type too long: {} chars (max {})", len, max)
            }
            Self::EmptyObservation => write!(f, "Observation cannot be empty"),
            Self::ObservationSourceTooLong { len, max } => {
                write!(f, "Observation source too long: {} chars (max {})", len, max)
            }
            Self::ConfidenceOutOfRange { value } => {
                write!(f, "Confidence must be between 0 and 1, got {}", value)
            }
            Self::EmptyRelationshipTypeName => write!(f, "Relationship type name cannot be empty"),
            Self::RelationshipTypeNameTooLong { name, len, max } => write!(
                f,
                "Relationship type name '{}' too long: {} chars (max {})",
                name, len, max
            ),
            Self::InvalidPattern { field, message } => {
                write!(f, "Invalid pattern for field '{}': {}", field, message)
            }
            Self::InvalidRange { field, min, max } => {
                write!(f, "Invalid range for field '{}': min {} > max {}", field, min, max)
            }
            Self::EmptyChoices { field } => {
                write!(f, "Choice list for field '{}' cannot be empty", field)
            }
            Self::InvalidPeriod => write!(f, "Relationship cannot end before it starts"),
            Self::TraversalDepthTooLarge { depth, max } => {
                write!(f, "Traversal depth too large: {} (max {})", depth, max)
            }
        }
    }
}

impl std::error::Error for ValidationError {}

/// Validate entity name
pub fn validate_entity_name(name: &str) -> Result<(), ValidationError> {
    if name.trim().is_empty() {
        return Err(ValidationError::EmptyEntityName);
    }
    let len = name.chars().count();
    if len > MAX_ENTITY_NAME_LEN {
        return Err(ValidationError::EntityNameTooLong {
            len,
            max: MAX_ENTITY_NAME_LEN,
        });
    }
    Ok(())
}

/// Validate entity type
pub fn validate_entity_type(entity_type: &str) -> Result<(), ValidationError> {
    if entity_type.trim().is_empty() {
        return Err(ValidationError::EmptyEntityType);
    }
    let len = entity_type.chars().count();
    if len > MAX_ENTITY_TYPE_LEN {
        return Err(ValidationError::EntityTypeTooLong {
            len,
            max: MAX_ENTITY_TYPE_LEN,
        });
    }
    Ok(())
}

/// Validate observation content
pub fn validate_observation(content: &str) -> Result<(), ValidationError> {
    if content.trim().is_empty() {
        return Err(ValidationError::EmptyObservation);
    }
    Ok(())
}

/// Validate observation source
pub fn validate_source(source: &str) -> Result<(), ValidationError> {
    let len = source.chars().count();
    if len > MAX_OBSERVATION_SOURCE_LEN {
        return Err(ValidationError::ObservationSourceTooLong {
            len,
            max: MAX_OBSERVATION_SOURCE_LEN,
        });
    }
    Ok(())
}

/// Validate confidence score
pub fn validate_confidence(value: f64) -> Result<(), ValidationError> {
    if !(0.0..=1.0).contains(&value) {
        return Err(ValidationError::ConfidenceOutOfRange { value });
    }
    Ok(())
}

/// Validate a relationship type name (also used for inverse names)
pub fn validate_relationship_type_name(name: &str) -> Result<(), ValidationError> {
    if name.trim().is_empty() {
        return Err(ValidationError::EmptyRelationshipTypeName);
    }
    let len = name.chars().count();
    if len > MAX_RELATIONSHIP_TYPE_LEN {
        return Err(ValidationError::RelationshipTypeNameTooLong {
            name: name.to_string(),
            len,
            max: MAX_RELATIONSHIP_TYPE_LEN,
        });
    }
    Ok(())
}

/// Validate traversal depth
pub fn validate_traversal_depth(depth: u32) -> Result<(), ValidationError> {
    if depth > MAX_TRAVERSAL_DEPTH {
        return Err(ValidationError::TraversalDepthTooLarge {
            depth,
            max: MAX_TRAVERSAL_DEPTH,
        });
    }
    Ok(())
}
