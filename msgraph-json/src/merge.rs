use serde_json::Value;

/// Merge `new` into `old`, `new` winning wherever both have a value.
///
/// Objects are merged key by key. Arrays of equal length are merged by
/// position; otherwise `new` replaces `old`. A `null` in `new` replaces
/// whatever `old` has.
pub fn merge(old: Value, new: Value) -> Value {
    match (old, new) {
        (Value::Object(mut old), Value::Object(new)) => {
            for (key, value) in new {
                let merged = match old.remove(&key) {
                    Some(existing) => merge(existing, value),
                    None => value,
                };
                old.insert(key, merged);
            }
            Value::Object(old)
        }
        (Value::Array(old), Value::Array(new)) if old.len() == new.len() => {
            Value::Array(old.into_iter().zip(new).map(|(o, n)| merge(o, n)).collect())
        }
        (_, new) => new,
    }
}
