use serde_json::{Map, Value};

use crate::compare::{deep_equal, is_empty};

/// Tolerances applied when comparing a desired document with an observed one.
///
/// The same option must be passed to [`crate::diff`] and [`reconcile`] for a
/// given resource, otherwise a reconciled document may diff as changed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpdateOption {
    /// Strings that differ only by case are considered equal.
    pub ignore_casing: bool,
    /// Properties the server omits (or masks) keep their desired value.
    pub ignore_missing_property: bool,
    /// Explicit `null`s in the desired document are kept as they are.
    pub ignore_null_property: bool,
}

impl UpdateOption {
    /// Tolerate server-side normalization and write-only properties.
    ///
    /// Used right after a write, where the server response is expected to
    /// echo the request but may mask secrets or change casing.
    pub fn after_write() -> Self {
        UpdateOption {
            ignore_casing: true,
            ignore_missing_property: true,
            ignore_null_property: false,
        }
    }
}

/// Produce a document with the shape of `old` (the desired document), but
/// carrying the values of `new` (the observed document).
///
/// Keys that only exist in `new` are never added to objects. Arrays of objects
/// with a `name` are matched by identity, so reordering on the server side is
/// tolerated, and observed items the user did not write are appended.
pub fn reconcile(old: &Value, new: &Value, option: &UpdateOption) -> Value {
    if deep_equal(old, new) {
        return old.clone();
    }
    match (old, new) {
        (Value::Object(old_map), Value::Object(new_map)) => {
            Value::Object(reconcile_objects(old_map, new_map, option))
        }
        (Value::Array(old_items), Value::Array(new_items)) => {
            Value::Array(reconcile_arrays(old_items, new_items, option))
        }
        (Value::String(old_str), Value::String(new_str)) => {
            if option.ignore_casing && equal_fold(old_str, new_str) {
                return old.clone();
            }
            if option.ignore_missing_property && is_placeholder(new_str) {
                return old.clone();
            }
            new.clone()
        }
        _ => new.clone(),
    }
}

fn reconcile_objects(
    old: &Map<String, Value>,
    new: &Map<String, Value>,
    option: &UpdateOption,
) -> Map<String, Value> {
    let mut result = Map::new();
    for (key, value) in old {
        match new.get(key) {
            _ if value.is_null() && option.ignore_null_property => {
                result.insert(key.clone(), Value::Null);
            }
            Some(observed) if !observed.is_null() => {
                result.insert(key.clone(), reconcile(value, observed, option));
            }
            _ if option.ignore_missing_property || is_empty(value) => {
                result.insert(key.clone(), value.clone());
            }
            // missing on the server: drop it, so the next plan shows the drift
            _ => {}
        }
    }
    result
}

fn reconcile_arrays(old: &[Value], new: &[Value], option: &UpdateOption) -> Vec<Value> {
    if old.is_empty() {
        return new.to_vec();
    }

    if !old.iter().any(|item| identifier(item).is_some()) {
        if old.len() != new.len() {
            return new.to_vec();
        }
        return old
            .iter()
            .zip(new)
            .map(|(o, n)| reconcile(o, n, option))
            .collect();
    }

    let mut used = vec![false; new.len()];
    let mut pairs: Vec<Option<usize>> = vec![None; old.len()];

    // Exact matches first, so an identity match cannot take an observed item
    // that a later desired item is identical to.
    for (i, item) in old.iter().enumerate() {
        if let Some(j) = (0..new.len()).find(|&j| !used[j] && deep_equal(item, &new[j])) {
            used[j] = true;
            pairs[i] = Some(j);
        }
    }

    for (i, item) in old.iter().enumerate() {
        if pairs[i].is_some() {
            continue;
        }
        let Some(id) = identifier(item) else {
            continue;
        };
        if let Some(j) = (0..new.len()).find(|&j| !used[j] && identifier(&new[j]) == Some(id)) {
            used[j] = true;
            pairs[i] = Some(j);
        }
    }

    let mut result: Vec<Value> = old
        .iter()
        .zip(&pairs)
        .filter_map(|(item, pair)| pair.map(|j| reconcile(item, &new[j], option)))
        .collect();
    result.extend(
        new.iter()
            .zip(&used)
            .filter(|(_, used)| !**used)
            .map(|(item, _)| item.clone()),
    );
    result
}

/// The natural key of an array item: a non-empty string `name` property.
fn identifier(item: &Value) -> Option<&str> {
    item.as_object()?
        .get("name")?
        .as_str()
        .filter(|name| !name.is_empty())
}

/// What the API returns instead of a secret it will not echo back.
fn is_placeholder(s: &str) -> bool {
    s.is_empty() || s == "<redacted>" || s.chars().all(|c| c == '*')
}

pub(crate) fn equal_fold(a: &str, b: &str) -> bool {
    a == b
        || a.chars()
            .flat_map(char::to_lowercase)
            .eq(b.chars().flat_map(char::to_lowercase))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ignore_missing() -> UpdateOption {
        UpdateOption {
            ignore_missing_property: true,
            ..Default::default()
        }
    }

    #[test]
    fn missing_property_kept_when_tolerated() {
        let old = json!({"a": 1, "b": 2});
        let new = json!({"a": 10});
        assert_eq!(
            reconcile(&old, &new, &ignore_missing()),
            json!({"a": 10, "b": 2})
        );
    }

    #[test]
    fn missing_property_dropped_by_default() {
        let old = json!({"a": 1, "b": 2});
        let new = json!({"a": 10});
        assert_eq!(
            reconcile(&old, &new, &UpdateOption::default()),
            json!({"a": 10})
        );
    }

    #[test]
    fn missing_zero_values_are_kept() {
        let old = json!({"a": 1, "enabled": false, "tags": [], "note": ""});
        let new = json!({"a": 1, "extra": true});
        assert_eq!(
            reconcile(&old, &new, &UpdateOption::default()),
            json!({"a": 1, "enabled": false, "tags": [], "note": ""})
        );
    }

    #[test]
    fn observed_null_counts_as_missing() {
        let old = json!({"a": "x", "b": "y"});
        let new = json!({"a": null, "b": "z"});
        assert_eq!(
            reconcile(&old, &new, &UpdateOption::default()),
            json!({"b": "z"})
        );
    }

    #[test]
    fn desired_nulls_kept_when_tolerated() {
        let old = json!({"a": null, "b": 1});
        let new = json!({"a": "server", "b": 1, "c": 3});
        let option = UpdateOption {
            ignore_null_property: true,
            ..Default::default()
        };
        assert_eq!(reconcile(&old, &new, &option), json!({"a": null, "b": 1}));
    }

    #[test]
    fn observed_only_keys_are_not_surfaced() {
        let old = json!({"displayName": "app"});
        let new = json!({"displayName": "app2", "id": "1", "createdDateTime": "2024-01-01"});
        assert_eq!(
            reconcile(&old, &new, &UpdateOption::default()),
            json!({"displayName": "app2"})
        );
    }

    #[test]
    fn casing_tolerance() {
        let option = UpdateOption {
            ignore_casing: true,
            ..Default::default()
        };
        assert_eq!(
            reconcile(&json!("Contoso"), &json!("contoso"), &option),
            json!("Contoso")
        );
        assert_eq!(
            reconcile(&json!("Contoso"), &json!("contoso"), &UpdateOption::default()),
            json!("contoso")
        );
    }

    #[test]
    fn equal_fold_folds_per_character() {
        assert!(equal_fold("Contoso", "cONTOSO"));
        assert!(equal_fold("ÄRGER", "ärger"));
        assert!(equal_fold("", ""));
        assert!(!equal_fold("Contoso", "Contoso Ltd"));
        assert!(!equal_fold("ab", "a"));
    }

    #[test]
    fn redaction_tolerance() {
        for masked in ["<redacted>", "", "****"] {
            assert_eq!(
                reconcile(&json!("my-secret"), &json!(masked), &ignore_missing()),
                json!("my-secret")
            );
        }
        assert_eq!(
            reconcile(
                &json!("my-secret"),
                &json!("<redacted>"),
                &UpdateOption::default()
            ),
            json!("<redacted>")
        );
    }

    #[test]
    fn server_value_wins_by_default() {
        assert_eq!(
            reconcile(&json!({"n": 1}), &json!({"n": 2}), &UpdateOption::default()),
            json!({"n": 2})
        );
        assert_eq!(
            reconcile(&json!("a"), &json!(3), &UpdateOption::default()),
            json!(3)
        );
    }

    #[test]
    fn named_items_follow_identity_not_position() {
        let old = json!([
            {"name": "a", "value": 1},
            {"name": "b", "value": 2}
        ]);
        let new = json!([
            {"name": "b", "value": 2},
            {"name": "a", "value": 3},
            {"name": "c", "value": 4}
        ]);
        assert_eq!(
            reconcile(&old, &new, &UpdateOption::default()),
            json!([
                {"name": "a", "value": 3},
                {"name": "b", "value": 2},
                {"name": "c", "value": 4}
            ])
        );
    }

    #[test]
    fn exact_match_takes_precedence_over_identity() {
        let old = json!([
            {"name": "a", "value": 1},
            {"name": "a", "value": 2}
        ]);
        let new = json!([
            {"name": "a", "value": 2},
            {"name": "a", "value": 5}
        ]);
        assert_eq!(
            reconcile(&old, &new, &UpdateOption::default()),
            json!([
                {"name": "a", "value": 5},
                {"name": "a", "value": 2}
            ])
        );
    }

    #[test]
    fn unmatched_desired_items_are_dropped() {
        let old = json!([{"name": "a"}, {"name": "gone"}]);
        let new = json!([{"name": "a"}]);
        assert_eq!(
            reconcile(&old, &new, &UpdateOption::default()),
            json!([{"name": "a"}])
        );
    }

    #[test]
    fn scalar_arrays_are_positional() {
        assert_eq!(
            reconcile(
                &json!(["A", "B"]),
                &json!(["a", "c"]),
                &UpdateOption {
                    ignore_casing: true,
                    ..Default::default()
                }
            ),
            json!(["A", "c"])
        );
        assert_eq!(
            reconcile(&json!([1, 2]), &json!([1, 2, 3]), &UpdateOption::default()),
            json!([1, 2, 3])
        );
    }

    #[test]
    fn empty_desired_array_takes_observed() {
        assert_eq!(
            reconcile(&json!([]), &json!([{"name": "x"}]), &UpdateOption::default()),
            json!([{"name": "x"}])
        );
    }

    #[test]
    fn after_write_absorbs_normalization() {
        let desired = json!({
            "displayName": "Contoso",
            "passwordCredentials": [{"displayName": "k", "secretText": "s3cr3t"}],
            "notes": "write-only"
        });
        let observed = json!({
            "id": "1",
            "displayName": "contoso",
            "passwordCredentials": [{"displayName": "k", "secretText": null}]
        });
        assert_eq!(
            reconcile(&desired, &observed, &UpdateOption::after_write()),
            desired
        );
    }
}
