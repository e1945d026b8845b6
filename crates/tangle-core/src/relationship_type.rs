//! Relationship type definitions and the rules they enforce on edges

use crate::entity::Entity;
use crate::error::{Error, Result};
use crate::limits::{self, ValidationError};
use crate::metadata::Metadata;
use crate::rule::{self, FieldRule, FieldRules};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// Unique identifier for a relationship type
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RelationshipTypeId(pub Ulid);

impl RelationshipTypeId {
    pub fn new() -> Self {
        Self(Ulid::new())
    }
}

impl Default for RelationshipTypeId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RelationshipTypeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Which end of an edge a check refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EndpointSide {
    From,
    To,
}

impl std::fmt::Display for EndpointSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::From => f.write_str("from"),
            Self::To => f.write_str("to"),
        }
    }
}

/// Entity types allowed at each end of an edge.
///
/// An empty list leaves that side unconstrained.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AllowedEntityTypes {
    #[serde(default)]
    pub from: Vec<String>,
    #[serde(default)]
    pub to: Vec<String>,
}

impl AllowedEntityTypes {
    pub fn allows(&self, side: EndpointSide, entity_type: &str) -> bool {
        let allowed = match side {
            EndpointSide::From => &self.from,
            EndpointSide::To => &self.to,
        };
        allowed.is_empty() || allowed.iter().any(|t| t == entity_type)
    }

    pub fn is_unconstrained(&self) -> bool {
        self.from.is_empty() && self.to.is_empty()
    }

    /// The same constraints seen from the opposite direction
    pub fn swapped(&self) -> Self {
        Self {
            from: self.to.clone(),
            to: self.from.clone(),
        }
    }
}

/// Declarative rule set for one named edge type
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelationshipType {
    pub id: RelationshipTypeId,

    /// Unique type name
    pub name: String,

    /// Type name of the mirror edge; the type's own name when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inverse_name: Option<String>,

    /// Whether creating an edge also creates its mirror
    #[serde(default)]
    pub is_bidirectional: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allowed_entity_types: Option<AllowedEntityTypes>,

    /// Keys that must be present in edge metadata
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub required_metadata_fields: Vec<String>,

    /// Value rules per metadata field
    #[serde(default, skip_serializing_if = "FieldRules::is_empty")]
    pub validation_rules: FieldRules,

    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<DateTime<Utc>>,
}

impl RelationshipType {
    /// Create an unconstrained, one-directional type
    pub fn new(name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: RelationshipTypeId::new(),
            name: name.into(),
            inverse_name: None,
            is_bidirectional: false,
            allowed_entity_types: None,
            required_metadata_fields: Vec::new(),
            validation_rules: FieldRules::new(),
            created_at: now,
            updated_at: now,
            deleted_at: None,
        }
    }

    /// Mirror edges use this type's own name
    pub fn bidirectional(mut self) -> Self {
        self.is_bidirectional = true;
        self
    }

    /// Mirror edges use `inverse_name`
    pub fn with_inverse(mut self, inverse_name: impl Into<String>) -> Self {
        self.is_bidirectional = true;
        self.inverse_name = Some(inverse_name.into());
        self
    }

    pub fn allow_from<I, S>(mut self, types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.allowed_entity_types
            .get_or_insert_with(AllowedEntityTypes::default)
            .from = types.into_iter().map(Into::into).collect();
        self
    }

    pub fn allow_to<I, S>(mut self, types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.allowed_entity_types
            .get_or_insert_with(AllowedEntityTypes::default)
            .to = types.into_iter().map(Into::into).collect();
        self
    }

    pub fn require_fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.required_metadata_fields = fields.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_rule(mut self, field: impl Into<String>, rule: FieldRule) -> Self {
        self.validation_rules.entry(field.into()).or_default().push(rule);
        self
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }

    pub fn soft_delete(&mut self, at: DateTime<Utc>) {
        self.deleted_at = Some(at);
    }

    /// Type name given to mirror edges, or `None` for one-directional types
    pub fn inverse_type_name(&self) -> Option<&str> {
        if !self.is_bidirectional {
            return None;
        }
        Some(self.inverse_name.as_deref().unwrap_or(&self.name))
    }

    /// Definition for the inverse type, when it differs from this one.
    ///
    /// Endpoint constraints are swapped; metadata requirements are shared
    /// because mirror edges carry the same metadata.
    pub fn inverse_definition(&self) -> Option<RelationshipType> {
        let inverse_name = self.inverse_type_name()?;
        if inverse_name == self.name {
            return None;
        }

        let mut inverse = RelationshipType::new(inverse_name).with_inverse(self.name.clone());
        inverse.allowed_entity_types = self.allowed_entity_types.as_ref().map(|a| a.swapped());
        inverse.required_metadata_fields = self.required_metadata_fields.clone();
        inverse.validation_rules = self.validation_rules.clone();
        Some(inverse)
    }

    /// Check the definition itself before it is persisted
    pub fn validate_definition(&self) -> std::result::Result<(), ValidationError> {
        limits::validate_relationship_type_name(&self.name)?;
        if let Some(inverse) = &self.inverse_name {
            limits::validate_relationship_type_name(inverse)?;
        }
        for (field, rules) in &self.validation_rules {
            for rule in rules {
                rule.validate_definition(field)?;
            }
        }
        Ok(())
    }

    /// Validate a prospective edge `from -> to` carrying `metadata`.
    ///
    /// Checks run in order (endpoint types, required fields, field rules) and
    /// stop at the first failing category.
    pub fn validate_relationship(
        &self,
        from: &Entity,
        to: &Entity,
        metadata: Option<&Metadata>,
    ) -> Result<()> {
        if let Some(allowed) = &self.allowed_entity_types {
            for (side, entity) in [(EndpointSide::From, from), (EndpointSide::To, to)] {
                if !allowed.allows(side, entity.entity_type.as_str()) {
                    return Err(Error::InvalidEndpointType {
                        relationship_type: self.name.clone(),
                        side,
                        entity_type: entity.entity_type.to_string(),
                    });
                }
            }
        }

        let missing: Vec<String> = self
            .required_metadata_fields
            .iter()
            .filter(|field| !metadata.is_some_and(|m| m.contains_key(field.as_str())))
            .cloned()
            .collect();
        if !missing.is_empty() {
            return Err(Error::MissingMetadataFields {
                relationship_type: self.name.clone(),
                fields: missing,
            });
        }

        let violations = rule::check_fields(&self.validation_rules, metadata);
        if !violations.is_empty() {
            return Err(Error::InvalidMetadataValue {
                relationship_type: self.name.clone(),
                violations,
            });
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rule::ValueKind;
    use serde_json::json;

    fn belongs_to() -> RelationshipType {
        RelationshipType::new("belongs_to")
            .with_inverse("has")
            .allow_from(["document", "task"])
            .allow_to(["project", "folder"])
            .require_fields(["created_by"])
            .with_rule("priority", FieldRule::of_type(ValueKind::Integer))
            .with_rule("priority", FieldRule::range(1.0, 5.0))
    }

    fn meta(value: serde_json::Value) -> Metadata {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_valid_relationship() {
        let doc = Entity::new("Design notes", "document");
        let proj = Entity::new("Apollo", "project");
        let m = meta(json!({"created_by": "u", "priority": 3}));

        assert!(belongs_to().validate_relationship(&doc, &proj, Some(&m)).is_ok());
    }

    #[test]
    fn test_invalid_from_type() {
        let folder = Entity::new("Archive", "folder");
        let proj = Entity::new("Apollo", "project");
        let m = meta(json!({"created_by": "u"}));

        let err = belongs_to()
            .validate_relationship(&folder, &proj, Some(&m))
            .unwrap_err();
        assert!(matches!(
            err,
            Error::InvalidEndpointType { side: EndpointSide::From, ref entity_type, .. }
                if entity_type == "folder"
        ));
    }

    #[test]
    fn test_invalid_to_type() {
        let doc = Entity::new("Design notes", "document");
        let person = Entity::new("Ada", "person");

        let err = belongs_to().validate_relationship(&doc, &person, None).unwrap_err();
        assert!(matches!(
            err,
            Error::InvalidEndpointType { side: EndpointSide::To, .. }
        ));
    }

    #[test]
    fn test_endpoint_check_runs_before_metadata_checks() {
        let folder = Entity::new("Archive", "folder");
        let proj = Entity::new("Apollo", "project");

        // metadata is missing required fields too, but the endpoint error wins
        let err = belongs_to().validate_relationship(&folder, &proj, None).unwrap_err();
        assert!(matches!(err, Error::InvalidEndpointType { .. }));
    }

    #[test]
    fn test_missing_fields_are_all_listed() {
        let ty = RelationshipType::new("reviewed").require_fields(["by", "at", "note"]);
        let a = Entity::new("A", "x");
        let b = Entity::new("B", "x");
        let m = meta(json!({"at": null}));

        match ty.validate_relationship(&a, &b, Some(&m)).unwrap_err() {
            Error::MissingMetadataFields { fields, .. } => {
                assert_eq!(fields, vec!["by".to_string(), "note".to_string()]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_invalid_metadata_value() {
        let doc = Entity::new("Design notes", "document");
        let proj = Entity::new("Apollo", "project");
        let m = meta(json!({"created_by": "u", "priority": 10}));

        match belongs_to()
            .validate_relationship(&doc, &proj, Some(&m))
            .unwrap_err()
        {
            Error::InvalidMetadataValue { violations, .. } => {
                assert_eq!(violations.len(), 1);
                assert_eq!(violations[0].field, "priority");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_unconstrained_side() {
        let ty = RelationshipType::new("mentions").allow_to(["person"]);
        let anything = Entity::new("Note", "whatever");
        let person = Entity::new("Ada", "person");

        assert!(ty.validate_relationship(&anything, &person, None).is_ok());
        assert!(ty.validate_relationship(&person, &anything, None).is_err());
    }

    #[test]
    fn test_inverse_type_name() {
        assert_eq!(belongs_to().inverse_type_name(), Some("has"));
        assert_eq!(
            RelationshipType::new("knows").bidirectional().inverse_type_name(),
            Some("knows")
        );
        assert_eq!(RelationshipType::new("owns").inverse_type_name(), None);
    }

    #[test]
    fn test_inverse_definition() {
        let inverse = belongs_to().inverse_definition().unwrap();
        assert_eq!(inverse.name, "has");
        assert_eq!(inverse.inverse_type_name(), Some("belongs_to"));
        let allowed = inverse.allowed_entity_types.unwrap();
        assert_eq!(allowed.from, vec!["project", "folder"]);
        assert_eq!(allowed.to, vec!["document", "task"]);
        assert_eq!(inverse.required_metadata_fields, vec!["created_by"]);

        assert!(RelationshipType::new("knows")
            .bidirectional()
            .inverse_definition()
            .is_none());
    }

    #[test]
    fn test_validate_definition() {
        assert!(belongs_to().validate_definition().is_ok());
        assert!(RelationshipType::new("a".repeat(51)).validate_definition().is_err());
        assert!(RelationshipType::new("x")
            .with_rule("code", FieldRule::pattern("[unclosed"))
            .validate_definition()
            .is_err());
    }
}
