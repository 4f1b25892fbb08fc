use serde_json::{Map, Value};

use crate::compare::deep_equal;
use crate::update::{equal_fold, UpdateOption};

/// Compute the patch that turns `previous` into `desired`.
///
/// Returns `None` when there is nothing to send. Keys removed from `desired`
/// are omitted from the patch, unless `ignore_null_property` is set, in which
/// case they are sent as explicit `null`s. Arrays are compared by position; if
/// anything in an array changed, the whole desired array is part of the patch.
pub fn diff(previous: &Value, desired: &Value, option: &UpdateOption) -> Option<Value> {
    if deep_equal(previous, desired) {
        return None;
    }
    match (previous, desired) {
        (Value::Object(previous), Value::Object(desired)) => {
            let patch = diff_objects(previous, desired, option);
            if patch.is_empty() {
                None
            } else {
                Some(Value::Object(patch))
            }
        }
        (Value::Array(previous), Value::Array(desired)) => {
            let changed = previous.len() != desired.len()
                || previous
                    .iter()
                    .zip(desired)
                    .any(|(p, d)| diff(p, d, option).is_some());
            changed.then(|| Value::Array(desired.clone()))
        }
        (Value::String(p), Value::String(d)) if option.ignore_casing && equal_fold(p, d) => None,
        _ => Some(desired.clone()),
    }
}

fn diff_objects(
    previous: &Map<String, Value>,
    desired: &Map<String, Value>,
    option: &UpdateOption,
) -> Map<String, Value> {
    let mut patch = Map::new();
    for (key, old) in previous {
        match desired.get(key) {
            None if option.ignore_null_property => {
                patch.insert(key.clone(), Value::Null);
            }
            None => {}
            Some(new) => {
                // A change to `0`, `false` or `""` is still a change.
                if let Some(changed) = diff(old, new, option) {
                    patch.insert(key.clone(), changed);
                }
            }
        }
    }
    for (key, new) in desired {
        if !previous.contains_key(key) {
            patch.insert(key.clone(), new.clone());
        }
    }
    patch
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{reconcile, UpdateOption};
    use serde_json::json;

    fn none() -> UpdateOption {
        UpdateOption::default()
    }

    #[test]
    fn identical_documents_have_no_patch() {
        let all = UpdateOption {
            ignore_casing: true,
            ignore_missing_property: true,
            ignore_null_property: true,
        };
        for doc in [
            json!(null),
            json!("x"),
            json!([1, {"a": [2]}]),
            json!({"a": {"b": [null, true]}, "c": 1.5}),
        ] {
            assert_eq!(diff(&doc, &doc, &none()), None);
            assert_eq!(diff(&doc, &doc, &all), None);
        }
    }

    #[test]
    fn nested_map_diff() {
        let previous = json!({"a": 1, "b": 2, "c": {"d": 4}});
        let desired = json!({"a": 1, "b": 3, "c": {"d": 4, "e": 5}, "f": 6});
        assert_eq!(
            diff(&previous, &desired, &none()),
            Some(json!({"b": 3, "c": {"e": 5}, "f": 6}))
        );
    }

    #[test]
    fn array_length_change_replaces_array() {
        assert_eq!(
            diff(&json!([1, 2, 3]), &json!([1, 2, 3, 4]), &none()),
            Some(json!([1, 2, 3, 4]))
        );
    }

    #[test]
    fn array_element_change_replaces_array() {
        assert_eq!(
            diff(
                &json!({"tags": ["a", {"x": 1}]}),
                &json!({"tags": ["a", {"x": 2}]}),
                &none()
            ),
            Some(json!({"tags": ["a", {"x": 2}]}))
        );
    }

    #[test]
    fn removed_keys_are_not_deleted() {
        let previous = json!({"a": 1, "b": 2});
        let desired = json!({"a": 1});
        assert_eq!(diff(&previous, &desired, &none()), None);

        let option = UpdateOption {
            ignore_null_property: true,
            ..Default::default()
        };
        assert_eq!(
            diff(&previous, &desired, &option),
            Some(json!({"b": null}))
        );
    }

    #[test]
    fn change_to_zero_value_is_sent() {
        assert_eq!(
            diff(
                &json!({"enabled": true, "count": 3}),
                &json!({"enabled": false, "count": 0}),
                &none()
            ),
            Some(json!({"enabled": false, "count": 0}))
        );
    }

    #[test]
    fn casing_only_change() {
        let previous = json!({"displayName": "Contoso"});
        let desired = json!({"displayName": "contoso"});
        assert_eq!(
            diff(&previous, &desired, &none()),
            Some(json!({"displayName": "contoso"}))
        );
        let option = UpdateOption {
            ignore_casing: true,
            ..Default::default()
        };
        assert_eq!(diff(&previous, &desired, &option), None);
    }

    #[test]
    fn numbers_compare_by_value() {
        assert_eq!(diff(&json!({"n": 1}), &json!({"n": 1.0}), &none()), None);
    }

    #[test]
    fn kind_change_sends_desired() {
        assert_eq!(
            diff(&json!({"a": "1"}), &json!({"a": {"b": 1}}), &none()),
            Some(json!({"a": {"b": 1}}))
        );
    }

    #[test]
    fn reconciled_patch_converges() {
        let previous = json!({"a": 1, "b": {"c": 2, "d": [1, 2]}, "e": "x"});
        let desired = json!({"a": 1, "b": {"c": 3, "d": [1, 2, 3]}, "e": "x", "f": true});
        let patch = diff(&previous, &desired, &none()).unwrap();
        assert_eq!(patch, json!({"b": {"c": 3, "d": [1, 2, 3]}, "f": true}));

        let updated = crate::merge(previous.clone(), patch);
        let canonical = reconcile(&updated, &desired, &none());
        assert_eq!(canonical, desired);
        assert_eq!(diff(&canonical, &desired, &none()), None);
    }
}
