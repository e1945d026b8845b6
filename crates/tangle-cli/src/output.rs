//! Output formatting utilities

use serde::Serialize;
use tangle_core::{Entity, Observation, Relationship, RelationshipType};

/// Output format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Table,
    Json,
}

impl From<&str> for OutputFormat {
    fn from(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "json" => Self::Json,
            _ => Self::Table,
        }
    }
}

impl OutputFormat {
    pub fn is_json(&self) -> bool {
        *self == Self::Json
    }
}

/// Pretty JSON for `--format json`
pub fn to_json<T: Serialize>(data: &T) -> anyhow::Result<String> {
    Ok(serde_json::to_string_pretty(data)?)
}

pub fn entity_line(entity: &Entity) -> String {
    let deleted = if entity.is_deleted() { " [deleted]" } else { "" };
    format!(
        "{} ({}) {}{}",
        entity.name, entity.entity_type, entity.id, deleted
    )
}

pub fn observation_line(observation: &Observation) -> String {
    let mut line = format!("- {}", observation.content);
    if let Some(source) = &observation.source {
        line.push_str(&format!(" [source: {}]", source));
    }
    if let Some(confidence) = observation.confidence {
        line.push_str(&format!(" (confidence: {:.2})", confidence));
    }
    line
}

/// `from -[type]-> to`, using display labels for the endpoints
pub fn relationship_line(relationship: &Relationship, from: &str, to: &str) -> String {
    let mut line = format!(
        "{} -[{}]-> {} ({})",
        from, relationship.relationship_type, to, relationship.id
    );
    if relationship.inverse_of.is_some() {
        line.push_str(" <->");
    }
    line
}

pub fn relationship_type_summary(definition: &RelationshipType) -> String {
    match definition.inverse_type_name() {
        Some(inverse) if inverse != definition.name => {
            format!("{} (inverse: {})", definition.name, inverse)
        }
        Some(_) => format!("{} (symmetric)", definition.name),
        None => definition.name.clone(),
    }
}
