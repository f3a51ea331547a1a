//! Template filters used by generated charts
//!
//! Values cross the MiniJinja boundary as `serde_json::Value`; `none` and
//! undefined both map to JSON `null`.

use minijinja::{Error, ErrorKind, Value};
use serde_json::Value as JsonValue;

fn to_json(value: &Value) -> Result<JsonValue, Error> {
    if value.is_undefined() || value.is_none() {
        return Ok(JsonValue::Null);
    }
    serde_json::to_value(value).map_err(|e| Error::new(ErrorKind::InvalidOperation, e.to_string()))
}

fn invalid(message: impl Into<String>) -> Error {
    Error::new(ErrorKind::InvalidOperation, message.into())
}

/// Convert a value to YAML format
///
/// Usage: {{ values.config | toyaml }}
pub fn toyaml(value: Value) -> Result<String, Error> {
    let json_value = to_json(&value)?;

    let yaml = serde_yaml::to_string(&json_value).map_err(|e| invalid(e.to_string()))?;

    // Remove trailing newline and leading "---\n" if present
    let yaml = yaml.trim_start_matches("---\n").trim_end();

    Ok(yaml.to_string())
}

/// Convert a value to compact JSON
///
/// Usage: {{ release.namespace | tojson }}
pub fn tojson(value: Value) -> Result<String, Error> {
    let json_value = to_json(&value)?;
    serde_json::to_string(&json_value).map_err(|e| invalid(e.to_string()))
}

/// Parse a YAML (or JSON) document
///
/// Usage: {{ (snippet | fromyaml).containers }}
pub fn fromyaml(value: Value) -> Result<Value, Error> {
    if value.is_undefined() || value.is_none() {
        return Ok(Value::from(()));
    }
    let text = value
        .as_str()
        .ok_or_else(|| invalid(format!("fromyaml expects a string, got {}", value.kind())))?;

    if text.trim().is_empty() {
        return Ok(Value::from(()));
    }

    let parsed: JsonValue =
        serde_yaml::from_str(text).map_err(|e| invalid(format!("fromyaml: {}", e)))?;
    Ok(Value::from_serialize(&parsed))
}

/// Indent text and prefix it with a newline
///
/// Usage: {{ content | nindent(4) }}
#[must_use]
pub fn nindent(value: String, spaces: usize) -> String {
    let mut result = String::with_capacity(1 + value.len() + spaces * value.lines().count());
    result.push('\n');
    result.push_str(&indent(value, spaces));
    result
}

/// Indent every non-empty line, the first one included
///
/// Usage: {{ content | indent(4) }}
#[must_use]
pub fn indent(value: String, spaces: usize) -> String {
    let line_count = value.lines().count();
    let mut result = String::with_capacity(value.len() + spaces * line_count + line_count);

    let indent_str = " ".repeat(spaces);
    let mut first = true;

    for line in value.lines() {
        if !first {
            result.push('\n');
        }
        first = false;

        if !line.is_empty() {
            result.push_str(&indent_str);
        }
        result.push_str(line);
    }

    result
}

/// Deep merge `overlay` into `base`
///
/// Maps merge key by key with the overlay winning; sequences and scalars are
/// replaced. `none` anywhere in the overlay keeps the base value.
///
/// Usage: {{ defaults | merge_overwrite(values.spec | default(none)) }}
pub fn merge_overwrite(base: Value, overlay: Value) -> Result<Value, Error> {
    let mut base_json = to_json(&base)?;
    let overlay_json = to_json(&overlay)?;

    merge_overwrite_json(&mut base_json, &overlay_json);

    Ok(Value::from_serialize(&base_json))
}

fn merge_overwrite_json(base: &mut JsonValue, overlay: &JsonValue) {
    match (base, overlay) {
        (_, JsonValue::Null) => {}
        (JsonValue::Object(base_map), JsonValue::Object(overlay_map)) => {
            for (key, overlay_value) in overlay_map {
                match base_map.get_mut(key) {
                    Some(base_value) => merge_overwrite_json(base_value, overlay_value),
                    None if overlay_value.is_null() => {}
                    None => {
                        base_map.insert(key.clone(), overlay_value.clone());
                    }
                }
            }
        }
        (base, overlay) => {
            *base = overlay.clone();
        }
    }
}

fn as_list(value: JsonValue, filter: &str) -> Result<Vec<JsonValue>, Error> {
    match value {
        JsonValue::Null => Ok(Vec::new()),
        JsonValue::Array(items) => Ok(items),
        other => Err(invalid(format!("{} expects a sequence, got {}", filter, other))),
    }
}

/// Append a sequence; `none` on either side counts as empty
///
/// Usage: {{ defaults | concat(values.extra | default(none)) }}
pub fn concat(left: Value, right: Value) -> Result<Value, Error> {
    let mut items = as_list(to_json(&left)?, "concat")?;
    items.extend(as_list(to_json(&right)?, "concat")?);
    Ok(Value::from_serialize(&items))
}

/// Merge two lists of named entries, `user` first
///
/// Default entries are appended only when no user entry carries the same
/// `name`. Entries without a `name` are appended unless an equal entry is
/// already present. `none` on either side yields the other list.
///
/// Usage: {{ values.env | default(none) | merge_by_name(container.env | default(none)) }}
pub fn merge_by_name(user: Value, defaults: Value) -> Result<Value, Error> {
    let user_json = to_json(&user)?;
    let defaults_json = to_json(&defaults)?;

    if user_json.is_null() {
        return Ok(Value::from_serialize(&defaults_json));
    }
    if defaults_json.is_null() {
        return Ok(Value::from_serialize(&user_json));
    }

    let mut merged = as_list(user_json, "merge_by_name")?;
    for entry in as_list(defaults_json, "merge_by_name")? {
        let shadowed = match entry.get("name").and_then(JsonValue::as_str) {
            Some(name) => merged
                .iter()
                .any(|m| m.get("name").and_then(JsonValue::as_str) == Some(name)),
            None => merged.contains(&entry),
        };
        if !shadowed {
            merged.push(entry);
        }
    }

    Ok(Value::from_serialize(&merged))
}

/// Drop `none` entries from a map
///
/// Usage: {{ {"env": values.env | default(none)} | compact }}
pub fn compact(value: Value) -> Result<Value, Error> {
    match to_json(&value)? {
        JsonValue::Object(map) => {
            let kept: serde_json::Map<String, JsonValue> =
                map.into_iter().filter(|(_, v)| !v.is_null()).collect();
            Ok(Value::from_serialize(&kept))
        }
        _ => Ok(value),
    }
}

/// Split a string into a list; an empty string gives an empty list
///
/// Usage: {% for ns in target | splitlist(",") %}
#[must_use]
pub fn splitlist(value: String, separator: String) -> Vec<String> {
    if value.is_empty() {
        return Vec::new();
    }
    value.split(separator.as_str()).map(str::to_string).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn v(json: JsonValue) -> Value {
        Value::from_serialize(&json)
    }

    fn back(value: Value) -> JsonValue {
        serde_json::to_value(&value).unwrap()
    }

    #[test]
    fn test_toyaml() {
        let yaml = toyaml(v(json!({"name": "test", "port": 8080}))).unwrap();
        assert!(yaml.contains("name: test"));
        assert!(yaml.contains("port: 8080"));
        assert!(!yaml.ends_with('\n'));
    }

    #[test]
    fn test_tojson_does_not_escape_html() {
        assert_eq!(tojson(Value::from("a<b")).unwrap(), "\"a<b\"");
        assert_eq!(tojson(Value::from(())).unwrap(), "null");
    }

    #[test]
    fn test_fromyaml() {
        let parsed = fromyaml(Value::from("replicas: 2\nnames: [a, b]\n")).unwrap();
        assert_eq!(back(parsed), json!({"replicas": 2, "names": ["a", "b"]}));

        let parsed = fromyaml(Value::from("{\"a\": [1]}")).unwrap();
        assert_eq!(back(parsed), json!({"a": [1]}));

        assert!(fromyaml(Value::from("  \n")).unwrap().is_none());
        assert!(fromyaml(Value::from("a: [")).is_err());
    }

    #[test]
    fn test_nindent() {
        assert_eq!(nindent("line1\nline2".to_string(), 2), "\n  line1\n  line2");
    }

    #[test]
    fn test_indent_skips_empty_lines() {
        assert_eq!(indent("a:\n\n  b: 1".to_string(), 4), "    a:\n\n      b: 1");
    }

    #[test]
    fn test_merge_overwrite() {
        let base = v(json!({"a": {"x": 1, "y": [1, 2]}, "b": "keep"}));
        let overlay = v(json!({"a": {"y": [3], "z": true}, "b": null}));

        let merged = back(merge_overwrite(base, overlay).unwrap());

        assert_eq!(merged, json!({"a": {"x": 1, "y": [3], "z": true}, "b": "keep"}));
    }

    #[test]
    fn test_merge_overwrite_none_overlay_keeps_base() {
        let merged = merge_overwrite(v(json!({"a": 1})), Value::UNDEFINED).unwrap();
        assert_eq!(back(merged), json!({"a": 1}));
    }

    #[test]
    fn test_concat() {
        let joined = concat(v(json!([1, 2])), v(json!([3]))).unwrap();
        assert_eq!(back(joined), json!([1, 2, 3]));

        let joined = concat(v(json!([1])), Value::from(())).unwrap();
        assert_eq!(back(joined), json!([1]));

        assert!(concat(v(json!([1])), v(json!({"a": 1}))).is_err());
    }

    #[test]
    fn test_merge_by_name_user_wins() {
        let user = v(json!([{"name": "b", "value": "2"}]));
        let defaults = v(json!([{"name": "a"}, {"name": "b", "value": "1"}]));

        let merged = back(merge_by_name(user, defaults).unwrap());

        assert_eq!(merged, json!([{"name": "b", "value": "2"}, {"name": "a"}]));
    }

    #[test]
    fn test_merge_by_name_unnamed_entries() {
        let user = v(json!([{"key": "k", "operator": "Exists"}]));
        let defaults = v(json!([
            {"key": "k", "operator": "Exists"},
            {"key": "other", "operator": "Exists"}
        ]));

        let merged = back(merge_by_name(user, defaults).unwrap());

        assert_eq!(
            merged,
            json!([
                {"key": "k", "operator": "Exists"},
                {"key": "other", "operator": "Exists"}
            ])
        );
    }

    #[test]
    fn test_merge_by_name_none_sides() {
        let list = json!([{"name": "a"}]);
        assert_eq!(back(merge_by_name(Value::from(()), v(list.clone())).unwrap()), list);
        assert_eq!(back(merge_by_name(v(list.clone()), Value::UNDEFINED).unwrap()), list);
        assert!(merge_by_name(Value::from(()), Value::from(())).unwrap().is_none());
    }

    #[test]
    fn test_compact() {
        let compacted = compact(v(json!({"a": null, "b": 1}))).unwrap();
        assert_eq!(back(compacted), json!({"b": 1}));
    }

    #[test]
    fn test_splitlist() {
        assert_eq!(splitlist("a,b".to_string(), ",".to_string()), vec!["a", "b"]);
        assert!(splitlist(String::new(), ",".to_string()).is_empty());
    }
}
