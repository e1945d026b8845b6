//! Observation types - facts stored about entities

use crate::entity::EntityId;
use crate::limits::{self, ValidationError};
use crate::metadata::{self, Metadata};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use ulid::Ulid;

/// Confidence at or above which an observation counts as reliable
pub const DEFAULT_RELIABILITY_THRESHOLD: f64 = 0.7;

/// Unique identifier for an observation
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ObservationId(pub Ulid);

impl ObservationId {
    pub fn new() -> Self {
        Self(Ulid::new())
    }

    pub fn from_string(s: &str) -> Result<Self, ulid::DecodeError> {
        Ok(Self(Ulid::from_string(s)?))
    }
}

impl Default for ObservationId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ObservationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// An observation (fact) about an entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    /// Unique identifier
    pub id: ObservationId,

    /// Entity this observation belongs to
    pub entity_id: EntityId,

    /// The observation content
    pub content: String,

    /// Optional source of this observation
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,

    /// Confidence score (0.0-1.0)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,

    /// Additional context
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Metadata>,

    /// When this observation was created
    pub created_at: DateTime<Utc>,

    /// Last update timestamp
    pub updated_at: DateTime<Utc>,

    /// Soft-delete marker
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<DateTime<Utc>>,

    /// Set when the current deletion came from the owning entity's deletion
    #[serde(default)]
    pub cascade_deleted: bool,
}

impl Observation {
    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }

    /// Whether the confidence reaches `threshold`; unscored observations never do
    pub fn is_reliable(&self, threshold: f64) -> bool {
        self.confidence.is_some_and(|c| c >= threshold)
    }

    /// Inclusive confidence range check; unscored observations never match
    pub fn confidence_between(&self, min: f64, max: f64) -> bool {
        self.confidence.is_some_and(|c| c >= min && c <= max)
    }

    pub fn update_metadata(&mut self, fields: Metadata) {
        metadata::merge(&mut self.metadata, fields);
        self.updated_at = Utc::now();
    }

    pub fn metadata_value(&self, path: &str, default: Value) -> Value {
        metadata::lookup(self.metadata.as_ref(), path)
            .cloned()
            .unwrap_or(default)
    }

    pub fn soft_delete(&mut self, at: DateTime<Utc>, cascade: bool) {
        self.deleted_at = Some(at);
        self.cascade_deleted = cascade;
    }

    pub fn restore(&mut self) {
        self.deleted_at = None;
        self.cascade_deleted = false;
    }
}

/// Data for creating a new observation
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewObservation {
    pub content: String,
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub confidence: Option<f64>,
    #[serde(default)]
    pub metadata: Option<Metadata>,
}

impl NewObservation {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            ..Default::default()
        }
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = Some(confidence);
        self
    }

    pub fn with_metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = Some(metadata);
        self
    }

    /// Validate and build the observation record for `entity_id`
    pub fn into_observation(self, entity_id: EntityId) -> Result<Observation, ValidationError> {
        limits::validate_observation(&self.content)?;
        if let Some(source) = &self.source {
            limits::validate_source(source)?;
        }
        if let Some(confidence) = self.confidence {
            limits::validate_confidence(confidence)?;
        }

        let now = Utc::now();
        Ok(Observation {
            id: ObservationId::new(),
            entity_id,
            content: self.content,
            source: self.source,
            confidence: self.confidence,
            metadata: self.metadata,
            created_at: now,
            updated_at: now,
            deleted_at: None,
            cascade_deleted: false,
        })
    }
}
