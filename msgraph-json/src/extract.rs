use serde_json::{Map, Value};

/// Project the value at a dotted `path` of `body` into `{key: value}`.
///
/// Segments select object properties, or array elements when the segment is
/// an index. The path `@` selects the whole body. A path that does not
/// resolve yields `{key: null}`; a path with an empty segment is invalid and
/// yields `None`.
pub fn extract(body: &Value, key: &str, path: &str) -> Option<Value> {
    let found = if path == "@" {
        body.clone()
    } else {
        let segments: Vec<&str> = path.split('.').collect();
        if segments.iter().any(|s| s.is_empty()) {
            tracing::debug!("Ignoring export value {}: invalid path {:?}", key, path);
            return None;
        }
        lookup(body, &segments).cloned().unwrap_or(Value::Null)
    };
    let mut result = Map::new();
    result.insert(key.to_string(), found);
    Some(Value::Object(result))
}

fn lookup<'a>(mut value: &'a Value, segments: &[&str]) -> Option<&'a Value> {
    for segment in segments {
        value = match value {
            Value::Object(map) => map.get(*segment)?,
            Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(value)
}
