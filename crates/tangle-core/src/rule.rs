//! Typed per-field validation rules for relationship metadata
//!
//! Rules are stored on a relationship type as `field -> [FieldRule]` and
//! serialize as tagged JSON, e.g. `{"rule": "range", "min": 1, "max": 5}`.

use crate::limits::ValidationError;
use crate::metadata::Metadata;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

/// Rules declared per metadata field
pub type FieldRules = BTreeMap<String, Vec<FieldRule>>;

/// JSON value kinds checked by [`FieldRule::Type`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueKind {
    String,
    Integer,
    Number,
    Boolean,
    Array,
    Object,
}

impl ValueKind {
    pub fn matches(&self, value: &Value) -> bool {
        match self {
            Self::String => value.is_string(),
            Self::Integer => match value {
                Value::Number(n) => {
                    n.is_i64() || n.is_u64() || n.as_f64().is_some_and(|f| f.fract() == 0.0)
                }
                _ => false,
            },
            Self::Number => value.is_number(),
            Self::Boolean => value.is_boolean(),
            Self::Array => value.is_array(),
            Self::Object => value.is_object(),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Integer => "integer",
            Self::Number => "number",
            Self::Boolean => "boolean",
            Self::Array => "array",
            Self::Object => "object",
        }
    }
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single validation rule applied to one metadata field
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "rule", rename_all = "snake_case")]
pub enum FieldRule {
    /// Key present with a non-empty value
    Required,
    /// Value has the given JSON kind
    Type { kind: ValueKind },
    /// Numeric value within inclusive bounds
    Range {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        min: Option<f64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        max: Option<f64>,
    },
    /// String value matching a regular expression
    Pattern { regex: String },
    /// Value equal to one of the listed values
    OneOf { values: Vec<Value> },
}

impl FieldRule {
    pub fn of_type(kind: ValueKind) -> Self {
        Self::Type { kind }
    }

    pub fn range(min: impl Into<Option<f64>>, max: impl Into<Option<f64>>) -> Self {
        Self::Range {
            min: min.into(),
            max: max.into(),
        }
    }

    pub fn pattern(regex: impl Into<String>) -> Self {
        Self::Pattern {
            regex: regex.into(),
        }
    }

    pub fn one_of(values: impl IntoIterator<Item = Value>) -> Self {
        Self::OneOf {
            values: values.into_iter().collect(),
        }
    }

    /// Check that the rule itself is well-formed
    pub fn validate_definition(&self, field: &str) -> Result<(), ValidationError> {
        match self {
            Self::Range {
                min: Some(min),
                max: Some(max),
            } if min > max => Err(ValidationError::InvalidRange {
                field: field.to_string(),
                min: *min,
                max: *max,
            }),
            Self::Pattern { regex } => Regex::new(regex).map(|_| ()).map_err(|e| {
                ValidationError::InvalidPattern {
                    field: field.to_string(),
                    message: e.to_string(),
                }
            }),
            Self::OneOf { values } if values.is_empty() => Err(ValidationError::EmptyChoices {
                field: field.to_string(),
            }),
            _ => Ok(()),
        }
    }

    /// Evaluate the rule against the (possibly absent) value of `field`.
    ///
    /// Only `Required` looks at absent or null values; every other rule
    /// passes them.
    pub fn check(&self, field: &str, value: Option<&Value>) -> Result<(), RuleViolation> {
        let present = match value {
            Some(Value::Null) | None => None,
            Some(v) => Some(v),
        };

        let failure = match (self, present) {
            (Self::Required, None) => Some("is required".to_string()),
            (Self::Required, Some(v)) if is_empty_value(v) => Some("is required".to_string()),
            (Self::Required, Some(_)) | (_, None) => None,
            (Self::Type { kind }, Some(v)) => {
                (!kind.matches(v)).then(|| format!("must be of type {}", kind))
            }
            (Self::Range { min, max }, Some(v)) => match v.as_f64() {
                None => Some("must be a number".to_string()),
                Some(n) if min.is_some_and(|m| n < m) => {
                    Some(format!("must be at least {}", min.unwrap_or_default()))
                }
                Some(n) if max.is_some_and(|m| n > m) => {
                    Some(format!("must be at most {}", max.unwrap_or_default()))
                }
                Some(_) => None,
            },
            (Self::Pattern { regex }, Some(v)) => match (v.as_str(), Regex::new(regex)) {
                (_, Err(e)) => Some(format!("has an unusable pattern: {}", e)),
                (None, _) => Some("must be a string".to_string()),
                (Some(s), Ok(re)) => (!re.is_match(s)).then(|| format!("must match {}", regex)),
            },
            (Self::OneOf { values }, Some(v)) => {
                (!values.contains(v)).then(|| "is not an allowed value".to_string())
            }
        };

        match failure {
            Some(message) => Err(RuleViolation {
                field: field.to_string(),
                rule: self.to_string(),
                message: format!("{} {}", field, message),
            }),
            None => Ok(()),
        }
    }
}

impl fmt::Display for FieldRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Required => write!(f, "required"),
            Self::Type { kind } => write!(f, "type:{}", kind),
            Self::Range { min, max } => {
                write!(f, "range:")?;
                if let Some(min) = min {
                    write!(f, "{}", min)?;
                }
                write!(f, "..")?;
                if let Some(max) = max {
                    write!(f, "{}", max)?;
                }
                Ok(())
            }
            Self::Pattern { regex } => write!(f, "pattern:{}", regex),
            Self::OneOf { .. } => write!(f, "one_of"),
        }
    }
}

fn is_empty_value(value: &Value) -> bool {
    match value {
        Value::String(s) => s.trim().is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::Object(map) => map.is_empty(),
        _ => false,
    }
}

/// A failed rule for one metadata field
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleViolation {
    pub field: String,
    pub rule: String,
    pub message: String,
}

impl fmt::Display for RuleViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.message, self.rule)
    }
}

/// Run every rule against `metadata`, collecting all violations
pub fn check_fields(rules: &FieldRules, metadata: Option<&Metadata>) -> Vec<RuleViolation> {
    rules
        .iter()
        .flat_map(|(field, field_rules)| {
            let value = metadata.and_then(|m| m.get(field));
            field_rules
                .iter()
                .filter_map(move |rule| rule.check(field, value).err())
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn priority_rules() -> FieldRules {
        let mut rules = FieldRules::new();
        rules.insert(
            "priority".to_string(),
            vec![
                FieldRule::of_type(ValueKind::Integer),
                FieldRule::range(1.0, 5.0),
            ],
        );
        rules
    }

    fn meta(value: Value) -> Metadata {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_priority_in_range() {
        let m = meta(json!({"priority": 3}));
        assert!(check_fields(&priority_rules(), Some(&m)).is_empty());
    }

    #[test]
    fn test_priority_out_of_range() {
        let m = meta(json!({"priority": 10}));
        let violations = check_fields(&priority_rules(), Some(&m));
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].field, "priority");
        assert_eq!(violations[0].rule, "range:1..5");
    }

    #[test]
    fn test_absent_field_skips_non_required_rules() {
        assert!(check_fields(&priority_rules(), None).is_empty());
        let m = meta(json!({"priority": null}));
        assert!(check_fields(&priority_rules(), Some(&m)).is_empty());
    }

    #[test]
    fn test_violations_are_aggregated() {
        let m = meta(json!({"priority": "high"}));
        let violations = check_fields(&priority_rules(), Some(&m));
        let rules: Vec<_> = violations.iter().map(|v| v.rule.as_str()).collect();
        assert_eq!(rules, vec!["type:integer", "range:1..5"]);
    }

    #[test]
    fn test_required() {
        let rule = FieldRule::Required;
        assert!(rule.check("owner", None).is_err());
        assert!(rule.check("owner", Some(&json!(null))).is_err());
        assert!(rule.check("owner", Some(&json!(""))).is_err());
        assert!(rule.check("owner", Some(&json!([]))).is_err());
        assert!(rule.check("owner", Some(&json!(false))).is_ok());
        assert!(rule.check("owner", Some(&json!("u"))).is_ok());
    }

    #[test]
    fn test_value_kinds() {
        assert!(ValueKind::Integer.matches(&json!(3)));
        assert!(ValueKind::Integer.matches(&json!(3.0)));
        assert!(!ValueKind::Integer.matches(&json!(3.5)));
        assert!(!ValueKind::Integer.matches(&json!("3")));
        assert!(ValueKind::Number.matches(&json!(3.5)));
        assert!(ValueKind::Object.matches(&json!({})));
    }

    #[test]
    fn test_pattern_and_one_of() {
        let pattern = FieldRule::pattern("^[a-z_]+$");
        assert!(pattern.check("created_by", Some(&json!("test_user"))).is_ok());
        assert!(pattern.check("created_by", Some(&json!("Test User"))).is_err());
        assert!(pattern.check("created_by", Some(&json!(5))).is_err());

        let one_of = FieldRule::one_of(vec![json!("low"), json!("high")]);
        assert!(one_of.check("level", Some(&json!("low"))).is_ok());
        assert!(one_of.check("level", Some(&json!("medium"))).is_err());
    }

    #[test]
    fn test_definition_checks() {
        assert!(FieldRule::pattern("(").validate_definition("f").is_err());
        assert!(FieldRule::range(5.0, 1.0).validate_definition("f").is_err());
        assert!(FieldRule::one_of(Vec::new()).validate_definition("f").is_err());
        assert!(FieldRule::range(None::<f64>, 1.0).validate_definition("f").is_ok());
    }

    #[test]
    fn test_serde_shape() {
        let rule: FieldRule = serde_json::from_value(json!({"rule": "range", "min": 1, "max": 5})).unwrap();
        assert_eq!(rule, FieldRule::range(1.0, 5.0));

        let rule: FieldRule = serde_json::from_value(json!({"rule": "type", "kind": "integer"})).unwrap();
        assert_eq!(rule, FieldRule::of_type(ValueKind::Integer));

        let value = serde_json::to_value(FieldRule::Required).unwrap();
        assert_eq!(value, json!({"rule": "required"}));
    }
}
