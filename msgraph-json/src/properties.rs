//! Generated-input checks of how diff, merge and reconcile fit together.

use proptest::prelude::*;
use serde_json::Value;

use crate::{deep_equal, diff, merge, reconcile, UpdateOption};

/// Documents over a small alphabet, so that keys collide and strings differ
/// only by case often enough to matter.
fn arb_document(keys: &'static str) -> impl Strategy<Value = Value> {
    let leaf = prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::Bool),
        (-3i64..3).prop_map(Value::from),
        (-2.0f64..2.0).prop_map(Value::from),
        "[a-bA-B*]{0,2}".prop_map(Value::String),
    ];
    leaf.prop_recursive(4, 48, 4, move |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..4).prop_map(Value::Array),
            prop::collection::btree_map(keys, inner, 0..4)
                .prop_map(|m| Value::Object(m.into_iter().collect())),
        ]
    })
}

/// Any document, including arrays of named objects.
fn arb_json() -> impl Strategy<Value = Value> {
    arb_document("[a-d]|name")
}

/// Documents whose arrays are reconciled by position.
fn arb_unnamed_json() -> impl Strategy<Value = Value> {
    arb_document("[a-d]")
}

fn arb_option() -> impl Strategy<Value = UpdateOption> {
    (any::<bool>(), any::<bool>(), any::<bool>()).prop_map(
        |(ignore_casing, ignore_missing_property, ignore_null_property)| UpdateOption {
            ignore_casing,
            ignore_missing_property,
            ignore_null_property,
        },
    )
}

/// Options under which a removed key is not re-sent as `null`.
fn arb_converging_option() -> impl Strategy<Value = UpdateOption> {
    (any::<bool>(), any::<bool>()).prop_map(|(ignore_casing, ignore_missing_property)| {
        UpdateOption {
            ignore_casing,
            ignore_missing_property,
            ignore_null_property: false,
        }
    })
}

/// What the server holds after `patch` was sent for `previous`.
fn apply(previous: &Value, patch: Option<Value>) -> Value {
    match patch {
        Some(patch) => merge(previous.clone(), patch),
        None => previous.clone(),
    }
}

proptest! {
    #[test]
    fn diff_of_identical_documents_is_empty(t in arb_json(), option in arb_option()) {
        prop_assert_eq!(diff(&t, &t, &option), None);
    }

    #[test]
    fn applied_patch_leaves_nothing_to_send(
        previous in arb_json(),
        desired in arb_json(),
        option in arb_converging_option(),
    ) {
        let updated = apply(&previous, diff(&previous, &desired, &option));
        prop_assert_eq!(diff(&updated, &desired, &option), None);
    }

    #[test]
    fn reconciled_update_leaves_nothing_to_send(
        previous in arb_unnamed_json(),
        desired in arb_unnamed_json(),
        option in arb_converging_option(),
    ) {
        let updated = apply(&previous, diff(&previous, &desired, &option));
        let canonical = reconcile(&updated, &desired, &option);
        prop_assert_eq!(diff(&canonical, &desired, &option), None);
    }

    #[test]
    fn reconcile_against_itself_is_identity(t in arb_json(), option in arb_option()) {
        prop_assert!(deep_equal(&reconcile(&t, &t, &option), &t));
    }

    #[test]
    fn merge_result_covers_new(old in arb_json(), new in arb_json()) {
        let merged = merge(old, new.clone());
        prop_assert_eq!(diff(&merged, &new, &UpdateOption::default()), None);
    }

    #[test]
    fn merge_with_itself_is_identity(t in arb_json()) {
        prop_assert_eq!(merge(t.clone(), t.clone()), t);
    }

    #[test]
    fn merge_of_objects_is_a_union_where_new_wins(old in arb_json(), new in arb_json()) {
        let merged = merge(old.clone(), new.clone());
        match (&old, &new) {
            (Value::Object(o), Value::Object(n)) => {
                let Value::Object(m) = &merged else {
                    return Err(TestCaseError::fail("merged objects must give an object"));
                };
                let union = o.keys().chain(n.keys().filter(|k| !o.contains_key(*k)));
                prop_assert_eq!(m.len(), union.count());
                for (key, value) in m {
                    let expected = match (o.get(key), n.get(key)) {
                        (Some(o), Some(n)) => merge(o.clone(), n.clone()),
                        (None, Some(n)) => n.clone(),
                        (Some(o), None) => o.clone(),
                        (None, None) => return Err(TestCaseError::fail("key from nowhere")),
                    };
                    prop_assert_eq!(value, &expected);
                }
            }
            (Value::Array(o), Value::Array(n)) if o.len() == n.len() => {
                let positional: Vec<Value> = o
                    .iter()
                    .zip(n)
                    .map(|(o, n)| merge(o.clone(), n.clone()))
                    .collect();
                prop_assert_eq!(&merged, &Value::Array(positional));
            }
            _ => prop_assert_eq!(&merged, &new),
        }
    }
}
