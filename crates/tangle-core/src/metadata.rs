//! Metadata maps shared by entities, observations and relationships

use serde_json::Value;
use std::collections::HashMap;

/// Free-form metadata attached to a record
pub type Metadata = HashMap<String, Value>;

/// Shallow-merge `fields` into `target`.
///
/// Top-level keys in `fields` overwrite existing keys of the same name and
/// keys present only in `target` are kept. Nested objects are replaced
/// wholesale. A missing map is treated as empty.
pub fn merge(target: &mut Option<Metadata>, fields: Metadata) {
    target.get_or_insert_with(Metadata::new).extend(fields);
}

/// Look up a value by dot-separated path.
///
/// The whole path is first tried as a literal top-level key, so keys that
/// contain dots stay reachable. Otherwise each segment walks into an object
/// by key or into an array by numeric index.
pub fn lookup<'a>(metadata: Option<&'a Metadata>, path: &str) -> Option<&'a Value> {
    let metadata = metadata?;
    if let Some(value) = metadata.get(path) {
        return Some(value);
    }

    let mut segments = path.split('.');
    let mut current = metadata.get(segments.next()?)?;
    for segment in segments {
        current = match current {
            Value::Object(map) => map.get(segment)?,
            Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(current)
}

/// Check whether the value at `path` contains `candidate`.
///
/// Scalars match by equality, arrays match when any element contains the
/// candidate (or, for an array candidate, when every candidate element is
/// contained), objects match when every candidate key is contained.
pub fn contains(metadata: Option<&Metadata>, path: &str, candidate: &Value) -> bool {
    lookup(metadata, path).is_some_and(|target| json_contains(target, candidate))
}

fn json_contains(target: &Value, candidate: &Value) -> bool {
    match (target, candidate) {
        (Value::Array(items), Value::Array(wanted)) => wanted
            .iter()
            .all(|w| items.iter().any(|item| json_contains(item, w))),
        (Value::Array(items), _) => items.iter().any(|item| json_contains(item, candidate)),
        (Value::Object(map), Value::Object(wanted)) => wanted
            .iter()
            .all(|(k, w)| map.get(k).is_some_and(|v| json_contains(v, w))),
        _ => target == candidate,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn meta(value: Value) -> Metadata {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_merge_is_shallow() {
        let mut target = Some(meta(json!({
            "keep": true,
            "nested": {"a": 1, "b": 2},
            "replace": "old"
        })));
        merge(
            &mut target,
            meta(json!({"nested": {"c": 3}, "replace": "new"})),
        );

        let target = target.unwrap();
        assert_eq!(target["keep"], json!(true));
        assert_eq!(target["nested"], json!({"c": 3}));
        assert_eq!(target["replace"], json!("new"));
    }

    #[test]
    fn test_merge_into_none() {
        let mut target = None;
        merge(&mut target, meta(json!({"a": 1})));
        assert_eq!(target.unwrap()["a"], json!(1));
    }

    #[test]
    fn test_merge_is_idempotent() {
        let mut once = Some(meta(json!({"b": 2})));
        merge(&mut once, meta(json!({"a": 1})));

        let mut twice = Some(meta(json!({"b": 2})));
        merge(&mut twice, meta(json!({"a": 1})));
        merge(&mut twice, meta(json!({"a": 1})));

        assert_eq!(once, twice);
    }

    #[test]
    fn test_lookup_dot_path() {
        let m = meta(json!({
            "level1": {"level2": {"level3": "deep value"}},
            "list": [10, {"x": "y"}],
            "dotted.key": 7
        }));

        assert_eq!(
            lookup(Some(&m), "level1.level2.level3"),
            Some(&json!("deep value"))
        );
        assert_eq!(lookup(Some(&m), "level1.missing.level3"), None);
        assert_eq!(lookup(Some(&m), "list.1.x"), Some(&json!("y")));
        assert_eq!(lookup(Some(&m), "list.5"), None);
        assert_eq!(lookup(Some(&m), "dotted.key"), Some(&json!(7)));
        assert_eq!(lookup(None, "anything"), None);
    }

    #[test]
    fn test_contains() {
        let m = meta(json!({
            "nested": {"deep": {"value": 42}},
            "tags": ["rust", "graph"],
            "status": "active"
        }));

        assert!(contains(Some(&m), "nested.deep.value", &json!(42)));
        assert!(contains(Some(&m), "tags", &json!("rust")));
        assert!(contains(Some(&m), "tags", &json!(["graph", "rust"])));
        assert!(!contains(Some(&m), "tags", &json!("python")));
        assert!(contains(Some(&m), "nested", &json!({"deep": {"value": 42}})));
        assert!(contains(Some(&m), "status", &json!("active")));
        assert!(!contains(Some(&m), "missing", &json!("active")));
    }
}
