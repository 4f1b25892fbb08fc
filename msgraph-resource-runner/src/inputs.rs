//! Input properties assembled from command line arguments.

use anyhow::{bail, Context as _, Result};
use serde_json::{Map, Value};

/// Combine `--inputs-json` with the individual `--input-json NAME JSON` and
/// `--input-str NAME STR` pairs.
///
/// clap does not tell us the order in which the flags were given, so a later
/// flag cannot override an earlier one. Duplicate names are rejected instead,
/// which keeps overriding available as a future extension.
pub fn collect_inputs(
    inputs_json: Option<&str>,
    input_json: &[String],
    input_str: &[String],
) -> Result<Map<String, Value>> {
    let mut inputs = match inputs_json {
        Some(json) => match serde_json::from_str::<Value>(json)
            .context("failed to parse value of --inputs-json")?
        {
            Value::Object(map) => map,
            _ => bail!("--inputs-json must be a JSON object"),
        },
        None => Map::new(),
    };

    for pair in input_json.chunks(2) {
        let [name, json] = pair else {
            bail!("--input-json takes a NAME and a JSON value");
        };
        if inputs.contains_key(name) {
            bail!("duplicate input: {}", name);
        }
        let value = serde_json::from_str(json)
            .with_context(|| format!("failed to parse JSON value for input: {}", name))?;
        inputs.insert(name.clone(), value);
    }
    for pair in input_str.chunks(2) {
        let [name, s] = pair else {
            bail!("--input-str takes a NAME and a string");
        };
        if inputs.contains_key(name) {
            bail!("duplicate input: {}", name);
        }
        inputs.insert(name.clone(), Value::String(s.clone()));
    }
    Ok(inputs)
}
