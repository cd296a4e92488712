//! Untyped key-value payloads as delivered by the backend.
//!
//! A key that is missing was never reported; a key holding `null` was
//! reported as empty. Accessors keep that distinction by returning `Option`.

use serde_json::{Map, Value};

pub type FieldMap = Map<String, Value>;

pub const TYPE_KEY: &str = "@type";

pub fn type_tag(map: &FieldMap) -> Option<&str> {
    map.get(TYPE_KEY).and_then(Value::as_str)
}

/// Reads an int64 field. The backend serializes int64 values as JSON strings,
/// so both numbers and numeric strings are accepted.
pub fn get_i64(map: &FieldMap, key: &str) -> Option<i64> {
    match map.get(key)? {
        Value::Number(number) => number.as_i64(),
        Value::String(text) => text.parse().ok(),
        _ => None,
    }
}

pub fn get_i32(map: &FieldMap, key: &str) -> Option<i32> {
    get_i64(map, key).and_then(|value| i32::try_from(value).ok())
}

pub fn get_bool(map: &FieldMap, key: &str) -> Option<bool> {
    map.get(key).and_then(Value::as_bool)
}

pub fn get_str<'a>(map: &'a FieldMap, key: &str) -> Option<&'a str> {
    map.get(key).and_then(Value::as_str)
}

pub fn get_map<'a>(map: &'a FieldMap, key: &str) -> Option<&'a FieldMap> {
    map.get(key).and_then(Value::as_object)
}

pub fn get_list<'a>(map: &'a FieldMap, key: &str) -> Option<&'a Vec<Value>> {
    map.get(key).and_then(Value::as_array)
}

/// Walks nested objects, e.g. `["photo", "small", "local", "path"]`.
pub fn get_path<'a>(map: &'a FieldMap, path: &[&str]) -> Option<&'a Value> {
    let (last, parents) = path.split_last()?;
    let mut current = map;
    for key in parents {
        current = get_map(current, key)?;
    }
    current.get(*last)
}

/// Copies every field of `patch` into `target`, leaving other fields alone.
/// Returns whether any stored value changed.
pub fn merge_fields(target: &mut FieldMap, patch: FieldMap) -> bool {
    let mut changed = false;
    for (key, value) in patch {
        if target.get(&key) != Some(&value) {
            target.insert(key, value);
            changed = true;
        }
    }
    changed
}

/// Builds a tagged object, mostly for outgoing requests.
pub fn tagged(tag: &str) -> FieldMap {
    let mut map = FieldMap::new();
    map.insert(TYPE_KEY.to_owned(), Value::String(tag.to_owned()));
    map
}

pub fn ids_from_values(values: &[Value]) -> Vec<i64> {
    values
        .iter()
        .filter_map(|value| match value {
            Value::Number(number) => number.as_i64(),
            Value::String(text) => text.parse().ok(),
            _ => None,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn map(value: Value) -> FieldMap {
        value.as_object().cloned().expect("fixture must be an object")
    }

    #[test]
    fn int64_fields_accept_numbers_and_strings() {
        let payload = map(json!({"a": 5, "b": "-1001234567890", "c": "nope"}));

        assert_eq!(get_i64(&payload, "a"), Some(5));
        assert_eq!(get_i64(&payload, "b"), Some(-1_001_234_567_890));
        assert_eq!(get_i64(&payload, "c"), None);
        assert_eq!(get_i64(&payload, "missing"), None);
    }

    #[test]
    fn absent_and_null_fields_are_distinguishable() {
        let payload = map(json!({"photo": null}));

        assert_eq!(payload.get("photo"), Some(&Value::Null));
        assert_eq!(payload.get("title"), None);
        assert_eq!(get_str(&payload, "photo"), None);
    }

    #[test]
    fn merge_reports_change_only_when_values_differ() {
        let mut target = map(json!({"id": 1, "title": "A"}));

        assert!(!merge_fields(&mut target, map(json!({"title": "A"}))));
        assert!(merge_fields(&mut target, map(json!({"title": "B", "unread_count": 2}))));
        assert_eq!(get_str(&target, "title"), Some("B"));
        assert_eq!(get_i64(&target, "id"), Some(1));
        assert_eq!(get_i64(&target, "unread_count"), Some(2));
    }

    #[test]
    fn nested_path_lookup_stops_at_missing_levels() {
        let payload = map(json!({"photo": {"small": {"local": {"path": "/tmp/a.jpg"}}}}));

        assert_eq!(
            get_path(&payload, &["photo", "small", "local", "path"]).and_then(Value::as_str),
            Some("/tmp/a.jpg")
        );
        assert_eq!(get_path(&payload, &["photo", "big", "local", "path"]), None);
    }
}
