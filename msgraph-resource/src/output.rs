use std::collections::BTreeMap;

use serde_json::{Map, Value};

/// Project `body` into the `output` property.
///
/// Each entry of `response_export_values` maps an output key to a path in the
/// body; see [`msgraph_json::extract`]. Invalid paths are left out.
pub fn build_output(body: &Value, response_export_values: &BTreeMap<String, String>) -> Value {
    response_export_values
        .iter()
        .filter_map(|(key, path)| msgraph_json::extract(body, key, path))
        .fold(Value::Object(Map::new()), msgraph_json::merge)
}
