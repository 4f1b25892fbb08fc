//! The state file: an append-only stream of JSON Patch events.
//!
//! Replaying every event in order, starting from `null`, yields the state
//! document `{"_type": "msgraphState", "resources": {...}}`.

use anyhow::{bail, Context as _, Result};
use chrono::Utc;
use msgraph_resource::schema::v0::ExtantResource;
use serde_json::{de::IoRead, json, Deserializer, StreamDeserializer, Value};
use std::{
    collections::BTreeMap,
    fs::{File, OpenOptions},
    io::{self, BufReader, Seek as _, Write},
    path::Path,
    sync::Arc,
};

pub const STATE_TYPE: &str = "msgraphState";

#[derive(Debug, Clone, PartialEq, Eq, serde::Deserialize, serde::Serialize)]
pub struct StateEvent {
    pub index: u64,
    pub meta: StateEventMeta,
    pub patch: json_patch::Patch,
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Deserialize, serde::Serialize)]
pub struct StateEventMeta {
    pub time: String,
    #[serde(flatten)]
    pub other_fields: Value,
}

/// The state document.
#[derive(Debug, Clone, PartialEq, serde::Deserialize)]
pub struct State {
    #[serde(rename = "_type", deserialize_with = "type_is_msgraph_state")]
    _type: String,
    pub resources: BTreeMap<String, ExtantResource>,
}

fn type_is_msgraph_state<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let s: String = serde::Deserialize::deserialize(deserializer)?;
    if s == STATE_TYPE {
        Ok(s)
    } else {
        Err(serde::de::Error::custom(format!(
            "unexpected _type in state: expected '{}', got '{}'",
            STATE_TYPE, s
        )))
    }
}

pub struct StateEventStream<'a, R: io::Read> {
    iter: StreamDeserializer<'a, IoRead<R>, StateEvent>,
    /// The validated first event, yielded before the rest.
    first_event: Option<StateEvent>,
}

impl<'a, R: io::Read> StateEventStream<'a, R> {
    pub fn open_from_reader(reader: R) -> Result<StateEventStream<'a, R>> {
        let deserializer = Deserializer::from_reader(reader);
        let mut iter = deserializer.into_iter();
        let first_event = match iter.next() {
            Some(Ok(ev @ StateEvent { index, .. })) => {
                if index != 0 {
                    bail!("Expected initial state event with index 0, got {}", index);
                }
                ev
            }
            Some(Err(e)) => bail!(
                "State file invalid: error parsing initial state event: {}",
                e
            ),
            None => bail!("State file invalid: no initial state event"),
        };
        Ok(StateEventStream {
            iter,
            first_event: Some(first_event),
        })
    }
}

impl<R: io::Read> Iterator for StateEventStream<'_, R> {
    type Item = Result<StateEvent>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.first_event.is_some() {
            self.first_event.take().map(Ok)
        } else {
            self.iter.next().map(|r| r.map_err(Into::into))
        }
    }
}

pub fn apply_state_event(state: &mut Value, event: &StateEvent) -> Result<()> {
    json_patch::patch(state, event.patch.0.as_slice()).map_err(Into::into)
}

/// Replay `events`, checking that their indices are consecutive. Returns the
/// index the next event must have.
pub fn apply_state_events(
    state: &mut Value,
    events: impl Iterator<Item = Result<StateEvent>>,
) -> Result<u64> {
    let mut next_index = 0;
    for event in events {
        let event = event?;
        if event.index != next_index {
            bail!(
                "State file invalid: expected event {}, got {}",
                next_index,
                event.index
            );
        }
        apply_state_event(state, &event)
            .with_context(|| format!("failed to apply state event {}", event.index))?;
        next_index += 1;
    }
    Ok(next_index)
}

/// Write access to a state file.
pub struct StateHandle {
    file: Arc<File>,
    locking: fd_lock::RwLock<Arc<File>>,
    expected_size: Option<u64>,
}

impl StateHandle {
    pub fn open<P: AsRef<Path>>(name: P, create_new: bool) -> Result<StateHandle> {
        let file = OpenOptions::new()
            .read(true)
            .append(true)
            .create_new(create_new)
            .open(name)?;
        let file = Arc::new(file);
        let locking = fd_lock::RwLock::new(file.clone());
        let mut handle = StateHandle {
            file,
            locking,
            expected_size: None,
        };
        if create_new {
            handle.append(&[&init_event()?])?;
        }
        Ok(handle)
    }

    fn lock_write(
        locking: &mut fd_lock::RwLock<Arc<File>>,
    ) -> Result<fd_lock::RwLockWriteGuard<'_, Arc<File>>> {
        if locking.try_write().is_err() {
            tracing::info!("Waiting for state file write lock");
        }
        Ok(locking.write()?)
    }

    pub fn append(&mut self, events: &[&StateEvent]) -> Result<()> {
        let lock_guard = Self::lock_write(&mut self.locking)?;
        let pos = (&*self.file).seek(io::SeekFrom::End(0))?;
        match self.expected_size {
            None => self.expected_size = Some(pos),
            Some(expected_size) => {
                if pos != expected_size {
                    tracing::error!(
                        "Detected concurrent writing. Foreign bytes: [{}..{})",
                        expected_size,
                        pos
                    );
                    tracing::error!("Concurrent state manipulation may require manual intervention to avoid orphaned directory objects");
                }
            }
        }
        let mut writer = io::BufWriter::new(&*self.file);

        for event in events {
            // Pretty, so that the file can be reviewed by hand.
            serde_json::to_writer_pretty(&mut writer, event)?;
            writer.write_all(b"\n")?;
        }
        writer.flush()?;
        drop(writer);

        self.expected_size = Some((&*self.file).stream_position()?);

        drop(lock_guard);
        Ok(())
    }
}

fn init_event() -> Result<StateEvent> {
    let patch = serde_json::from_value(json!([{
        "op": "add",
        "path": "",
        "value": {
            "_type": STATE_TYPE,
            "resources": {},
        },
    }]))?;
    Ok(StateEvent {
        index: 0,
        meta: StateEventMeta {
            time: Utc::now().to_rfc3339(),
            other_fields: json!({}),
        },
        patch,
    })
}

/// A state file opened for reading and writing, with its current document.
pub struct StateStore {
    handle: StateHandle,
    document: Value,
    next_index: u64,
}

impl StateStore {
    /// Open the state file at `path`, creating it when it does not exist.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<StateStore> {
        let path = path.as_ref();
        let exists = path.exists();
        let handle = StateHandle::open(path, !exists)
            .with_context(|| format!("failed to open state file {}", path.display()))?;
        let reader = BufReader::new(
            File::open(path)
                .with_context(|| format!("failed to read state file {}", path.display()))?,
        );
        let mut document = Value::Null;
        let next_index =
            apply_state_events(&mut document, StateEventStream::open_from_reader(reader)?)?;
        let store = StateStore {
            handle,
            document,
            next_index,
        };
        // Reject foreign documents before anything is appended to them.
        store.state()?;
        Ok(store)
    }

    pub fn document(&self) -> &Value {
        &self.document
    }

    pub fn state(&self) -> Result<State> {
        serde_json::from_value(self.document.clone()).context("failed to parse state document")
    }

    pub fn resource(&self, name: &str) -> Result<Option<ExtantResource>> {
        match self.document.get("resources").and_then(|r| r.get(name)) {
            Some(value) => Ok(Some(
                serde_json::from_value(value.clone())
                    .with_context(|| format!("failed to parse state of resource {}", name))?,
            )),
            None => Ok(None),
        }
    }

    /// Record the outcome of `event` on resource `name`; `None` removes it.
    pub fn commit(
        &mut self,
        event: &str,
        name: &str,
        resource: Option<&ExtantResource>,
    ) -> Result<()> {
        let mut document = self.document.clone();
        let Some(resources) = document.get_mut("resources").and_then(Value::as_object_mut) else {
            bail!("State document has no resources");
        };
        match resource {
            Some(resource) => {
                resources.insert(name.to_string(), serde_json::to_value(resource)?);
            }
            None => {
                resources.remove(name);
            }
        }
        let patch = json_patch::diff(&self.document, &document);
        if patch.0.is_empty() {
            tracing::debug!("State of {} is unchanged after {}", name, event);
            return Ok(());
        }
        let event = StateEvent {
            index: self.next_index,
            meta: StateEventMeta {
                time: Utc::now().to_rfc3339(),
                other_fields: json!({
                    "resource": name,
                    "event": event,
                }),
            },
            patch,
        };
        self.handle.append(&[&event])?;
        self.document = document;
        self.next_index += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use msgraph_resource::schema::v0::{InputProperties, OutputProperties};

    const BASIC_EXAMPLE: &str = r#"
    {
        "index": 0,
        "meta": {"time":"2024-03-04T07:40:00Z"},
        "patch": [
            {
                "op": "add",
                "value": { "_type": "msgraphState", "resources": {} },
                "path": ""
            }
        ]
    }
    {
        "index": 1,
        "meta": {"time":"2024-03-04T07:41:00Z", "resource": "ops", "event": "create"},
        "patch": [
            {
                "op": "add",
                "value": {
                    "type": "msgraph_resource",
                    "inputProperties": { "url": "groups" },
                    "outputProperties": { "id": "g1" }
                },
                "path": "/resources/ops"
            }
        ]
    }
"#;

    fn group(id: &str) -> ExtantResource {
        let inputs = json!({"url": "groups", "body": {"displayName": "Ops"}});
        let outputs = json!({"id": id});
        ExtantResource {
            type_: "msgraph_resource".into(),
            input_properties: InputProperties(inputs.as_object().unwrap().clone()),
            output_properties: Some(OutputProperties(outputs.as_object().unwrap().clone())),
        }
    }

    #[test]
    fn test_open_state_stream() {
        let stream = StateEventStream::open_from_reader(BASIC_EXAMPLE.as_bytes()).unwrap();
        let events: Vec<_> = stream.collect();
        assert_eq!(events.len(), 2);
        let second = events[1].as_ref().unwrap();
        assert_eq!(second.index, 1);
        assert_eq!(second.meta.other_fields["resource"], "ops");
    }

    #[test]
    fn test_resolve_state() {
        let stream = StateEventStream::open_from_reader(BASIC_EXAMPLE.as_bytes()).unwrap();
        let mut document = Value::Null;
        let next = apply_state_events(&mut document, stream).unwrap();
        assert_eq!(next, 2);
        let state: State = serde_json::from_value(document).unwrap();
        assert_eq!(
            state.resources["ops"].output_properties.as_ref().unwrap()["id"],
            "g1"
        );
    }

    #[test]
    fn test_open_state_stream_invalid_index() {
        let input = r#"{"index":1,"meta":{"time":"2024-06-04T07:40:00Z"},"patch":[]}"#;
        assert!(StateEventStream::open_from_reader(input.as_bytes()).is_err());
    }

    #[test]
    fn test_open_state_stream_empty() {
        assert!(StateEventStream::open_from_reader("".as_bytes()).is_err());
    }

    #[test]
    fn test_open_state_stream_no_patch() {
        let input = r#"{"index":0,"meta":{"time":"2024-06-04T07:40:00Z"}}"#;
        assert!(StateEventStream::open_from_reader(input.as_bytes()).is_err());
    }

    #[test]
    fn test_gap_in_indices() {
        let input = r#"{"index":0,"meta":{"time":"2024-06-04T07:40:00Z"},"patch":[]}
{"index":2,"meta":{"time":"2024-06-04T07:40:00Z"},"patch":[]}"#;
        let stream = StateEventStream::open_from_reader(input.as_bytes()).unwrap();
        let mut document = Value::Null;
        assert!(apply_state_events(&mut document, stream).is_err());
    }

    #[test]
    fn test_foreign_state_type() {
        let document = json!({"_type": "nixopsState", "resources": {}});
        assert!(serde_json::from_value::<State>(document).is_err());
    }

    #[test]
    fn test_store_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");

        let mut store = StateStore::open(&path).unwrap();
        assert_eq!(store.state().unwrap().resources.len(), 0);
        store.commit("create", "ops", Some(&group("g1"))).unwrap();
        // Unchanged state appends nothing.
        store.commit("refresh", "ops", Some(&group("g1"))).unwrap();
        drop(store);

        let mut store = StateStore::open(&path).unwrap();
        assert_eq!(store.resource("ops").unwrap(), Some(group("g1")));
        store.commit("delete", "ops", None).unwrap();
        drop(store);

        let store = StateStore::open(&path).unwrap();
        assert_eq!(store.resource("ops").unwrap(), None);

        let contents = std::fs::read_to_string(&path).unwrap();
        let events: Vec<StateEvent> = StateEventStream::open_from_reader(contents.as_bytes())
            .unwrap()
            .collect::<Result<_>>()
            .unwrap();
        assert_eq!(events.len(), 3);
        assert_eq!(events[2].meta.other_fields["event"], "delete");
    }

    #[test]
    fn test_store_rejects_garbage() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        std::fs::write(&path, "not json").unwrap();
        assert!(StateStore::open(&path).is_err());
    }
}
