//! `msgraph_resource_collection`: the complete membership of a `$ref`
//! collection, such as the members of a group.
//!
//! Membership is authoritative: references that are not configured are
//! removed.

use std::collections::{BTreeMap, BTreeSet};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{info_span, Instrument as _};

use super::validate_retry;
use crate::{
    address,
    client::{ApiVersion, GraphClient, QueryParameters, RequestOptions},
    error::{Error, Operation, Result},
    framework::{Instance, ManagedResource, Plan},
    retry::RetryPolicy,
    timeouts::{with_deadline, Timeouts},
};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CollectionInputs {
    /// The membership collection, e.g. `groups/<id>/members/$ref`.
    pub url: String,
    #[serde(default)]
    pub api_version: ApiVersion,
    /// Ids of the directory objects that are members.
    #[serde(default)]
    pub reference_ids: Vec<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub read_query_parameters: QueryParameters,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry: Option<RetryPolicy>,
    #[serde(default, skip_serializing_if = "Timeouts::is_default")]
    pub timeouts: Timeouts,
}

impl CollectionInputs {
    fn validate(&self) -> Result<()> {
        address::validate_collection_url(&self.url)?;
        validate_retry(&self.retry)?;
        let mut seen = BTreeSet::new();
        for id in &self.reference_ids {
            if id.is_empty() {
                return Err(Error::InvalidConfig(
                    "reference_ids must not contain empty ids".to_string(),
                ));
            }
            if !seen.insert(id) {
                return Err(Error::InvalidConfig(format!(
                    "reference_ids contains {} more than once",
                    id
                )));
            }
        }
        Ok(())
    }

    fn write_options(&self) -> RequestOptions {
        RequestOptions::default().with_retry(self.retry.clone())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectionOutputs {
    /// The collection URL without `/$ref`.
    pub id: String,
}

type CollectionInstance = Instance<CollectionInputs, CollectionOutputs>;

pub struct MSGraphResourceCollection;

async fn add_references(
    client: &dyn GraphClient,
    inputs: &CollectionInputs,
    ids: &[&String],
) -> Result<()> {
    let options = inputs.write_options();
    for id in ids {
        let body = json!({
            "@odata.id": address::directory_object_reference(client.host(), inputs.api_version, id)
        });
        tracing::debug!("Adding {} to {}", id, inputs.url);
        client
            .create(&inputs.url, inputs.api_version, &body, &options)
            .await
            .map_err(Error::transport(Operation::Create))?;
    }
    Ok(())
}

async fn remove_references(
    client: &dyn GraphClient,
    inputs: &CollectionInputs,
    ids: &[&String],
) -> Result<()> {
    let options = inputs.write_options();
    for id in ids {
        tracing::debug!("Removing {} from {}", id, inputs.url);
        client
            .delete(&address::item_url(&inputs.url, id), inputs.api_version, &options)
            .await
            .map_err(Error::transport(Operation::Delete))?;
    }
    Ok(())
}

fn member_id(item: &Value) -> Option<&str> {
    item.get("id")
        .and_then(Value::as_str)
        .or_else(|| address::referenced_id(item))
}

#[async_trait]
impl ManagedResource for MSGraphResourceCollection {
    type Inputs = CollectionInputs;
    type Outputs = CollectionOutputs;

    async fn create(
        &self,
        client: &dyn GraphClient,
        inputs: CollectionInputs,
    ) -> Result<CollectionInstance> {
        inputs.validate()?;
        let ids: Vec<&String> = inputs.reference_ids.iter().collect();
        with_deadline(
            Operation::Create,
            inputs.timeouts.create(),
            add_references(client, &inputs, &ids),
        )
        .instrument(info_span!("creating collection", url = %inputs.url))
        .await?;
        let outputs = CollectionOutputs {
            id: address::ref_base(&inputs.url).to_string(),
        };
        Ok(Instance { inputs, outputs })
    }

    async fn read(
        &self,
        client: &dyn GraphClient,
        prior: CollectionInstance,
    ) -> Result<Option<CollectionInstance>> {
        let Instance {
            mut inputs,
            outputs,
        } = prior;
        let options = RequestOptions::new(&BTreeMap::new(), &inputs.read_query_parameters)
            .with_retry(inputs.retry.clone());
        let members = with_deadline(Operation::Read, inputs.timeouts.read(), async {
            match client
                .list(address::ref_base(&inputs.url), inputs.api_version, &options)
                .await
            {
                Ok(items) => Ok(Some(items)),
                Err(e) if e.is_not_found() => Ok(None),
                Err(e) => Err(Error::transport(Operation::Read)(e)),
            }
        })
        .instrument(info_span!("reading collection", url = %inputs.url))
        .await?;

        let Some(members) = members else {
            tracing::info!(
                "Collection {} no longer exists; removing it from the state",
                inputs.url
            );
            return Ok(None);
        };
        let remote: Vec<String> = members
            .iter()
            .filter_map(member_id)
            .map(str::to_string)
            .collect();

        // Known members keep their position, so reading does not reorder them.
        let mut reference_ids: Vec<String> = inputs
            .reference_ids
            .iter()
            .filter(|id| remote.contains(id))
            .cloned()
            .collect();
        for id in remote {
            if !reference_ids.contains(&id) {
                reference_ids.push(id);
            }
        }
        inputs.reference_ids = reference_ids;
        Ok(Some(Instance { inputs, outputs }))
    }

    async fn update(
        &self,
        client: &dyn GraphClient,
        prior: CollectionInstance,
        inputs: CollectionInputs,
    ) -> Result<CollectionInstance> {
        inputs.validate()?;
        let current = &prior.inputs.reference_ids;
        let to_add: Vec<&String> = inputs
            .reference_ids
            .iter()
            .filter(|id| !current.contains(id))
            .collect();
        let to_remove: Vec<&String> = current
            .iter()
            .filter(|id| !inputs.reference_ids.contains(id))
            .collect();
        if to_add.is_empty() && to_remove.is_empty() {
            tracing::info!("Skipping update for collection {}: members unchanged", inputs.url);
        } else {
            with_deadline(Operation::Update, inputs.timeouts.update(), async {
                add_references(client, &inputs, &to_add).await?;
                remove_references(client, &inputs, &to_remove).await
            })
            .instrument(info_span!("updating collection", url = %inputs.url))
            .await?;
        }
        Ok(Instance {
            inputs,
            outputs: prior.outputs,
        })
    }

    async fn delete(&self, client: &dyn GraphClient, prior: CollectionInstance) -> Result<()> {
        let inputs = &prior.inputs;
        let ids: Vec<&String> = inputs.reference_ids.iter().collect();
        with_deadline(
            Operation::Delete,
            inputs.timeouts.delete(),
            remove_references(client, inputs, &ids),
        )
        .instrument(info_span!("deleting collection", url = %inputs.url))
        .await
    }

    fn plan(
        &self,
        prior: &CollectionInstance,
        mut inputs: CollectionInputs,
    ) -> Result<Plan<CollectionInputs>> {
        let mut requires_replace = Vec::new();
        if inputs.url != prior.inputs.url {
            requires_replace.push("url".to_string());
        }
        if inputs.api_version != prior.inputs.api_version {
            requires_replace.push("api_version".to_string());
        }
        if inputs.reference_ids != prior.inputs.reference_ids
            && sorted(&inputs.reference_ids) == sorted(&prior.inputs.reference_ids)
        {
            inputs.reference_ids = prior.inputs.reference_ids.clone();
        }
        Ok(Plan {
            inputs,
            requires_replace,
        })
    }

    fn import(&self, id: &str) -> Result<CollectionInstance> {
        let (path, api_version) = address::split_import_id(id)?;
        let url = if address::is_ref(path) {
            path.to_string()
        } else {
            format!("{}{}", path, address::REF_SUFFIX)
        };
        address::validate_collection_url(&url)
            .map_err(|_| Error::InvalidImportId(id.to_string()))?;
        Ok(Instance {
            outputs: CollectionOutputs {
                id: address::ref_base(&url).to_string(),
            },
            inputs: CollectionInputs {
                url,
                api_version,
                ..Default::default()
            },
        })
    }
}

fn sorted(ids: &[String]) -> Vec<&String> {
    let mut ids: Vec<&String> = ids.iter().collect();
    ids.sort();
    ids
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::Method;
    use crate::testing::{not_found, FakeClient};

    const URL: &str = "groups/g1/members/$ref";

    fn inputs(ids: &[&str]) -> CollectionInputs {
        CollectionInputs {
            url: URL.to_string(),
            reference_ids: ids.iter().map(|s| s.to_string()).collect(),
            ..Default::default()
        }
    }

    fn instance(ids: &[&str]) -> CollectionInstance {
        Instance {
            inputs: inputs(ids),
            outputs: CollectionOutputs {
                id: "groups/g1/members".to_string(),
            },
        }
    }

    #[tokio::test]
    async fn create_adds_every_reference() {
        let client = FakeClient::new([]);
        let created = MSGraphResourceCollection
            .create(&client, inputs(&["u1", "u2"]))
            .await
            .unwrap();
        assert_eq!(created.outputs.id, "groups/g1/members");
        let calls = client.calls();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].method, Method::Post);
        assert_eq!(calls[0].url, URL);
        assert_eq!(
            calls[1].body,
            Some(json!({"@odata.id": "https://graph.microsoft.com/v1.0/directoryObjects/u2"}))
        );
    }

    #[tokio::test]
    async fn create_validates_before_sending() {
        let client = FakeClient::new([]);
        let mut bad_url = inputs(&["u1"]);
        bad_url.url = "groups/g1/members".to_string();
        assert!(matches!(
            MSGraphResourceCollection.create(&client, bad_url).await,
            Err(Error::InvalidConfig(_))
        ));
        assert!(matches!(
            MSGraphResourceCollection
                .create(&client, inputs(&["u1", "u1"]))
                .await,
            Err(Error::InvalidConfig(_))
        ));
        assert!(client.calls().is_empty());
    }

    #[tokio::test]
    async fn read_keeps_known_order_and_appends_new_members() {
        let client = FakeClient::new([Ok(json!([
            {"@odata.type": "#microsoft.graph.user", "id": "u3"},
            {"id": "u1"},
            {"@odata.id": "https://graph.microsoft.com/v1.0/directoryObjects/u4"}
        ]))]);
        let current = MSGraphResourceCollection
            .read(&client, instance(&["u2", "u1"]))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(current.inputs.reference_ids, vec!["u1", "u3", "u4"]);
        assert_eq!(
            client.requests(),
            vec![(Method::Get, "groups/g1/members".to_string())]
        );
    }

    #[tokio::test]
    async fn read_missing_collection() {
        let client = FakeClient::new([Err(not_found())]);
        let r = MSGraphResourceCollection
            .read(&client, instance(&["u1"]))
            .await
            .unwrap();
        assert_eq!(r, None);
    }

    #[tokio::test]
    async fn update_applies_set_difference() {
        let client = FakeClient::new([]);
        let updated = MSGraphResourceCollection
            .update(&client, instance(&["u1", "u2"]), inputs(&["u2", "u3"]))
            .await
            .unwrap();
        assert_eq!(updated.inputs.reference_ids, vec!["u2", "u3"]);
        assert_eq!(
            client.requests(),
            vec![
                (Method::Post, URL.to_string()),
                (Method::Delete, "groups/g1/members/u1/$ref".to_string())
            ]
        );
    }

    #[tokio::test]
    async fn update_without_changes() {
        let client = FakeClient::new([]);
        MSGraphResourceCollection
            .update(&client, instance(&["u1"]), inputs(&["u1"]))
            .await
            .unwrap();
        assert!(client.calls().is_empty());
    }

    #[tokio::test]
    async fn delete_removes_every_member() {
        let client = FakeClient::new([]);
        MSGraphResourceCollection
            .delete(&client, instance(&["u1", "u2"]))
            .await
            .unwrap();
        assert_eq!(
            client.requests(),
            vec![
                (Method::Delete, "groups/g1/members/u1/$ref".to_string()),
                (Method::Delete, "groups/g1/members/u2/$ref".to_string())
            ]
        );
    }

    #[test]
    fn plan_ignores_order() {
        let prior = instance(&["u1", "u2"]);
        let plan = MSGraphResourceCollection
            .plan(&prior, inputs(&["u2", "u1"]))
            .unwrap();
        assert_eq!(plan.inputs.reference_ids, vec!["u1", "u2"]);
        assert!(plan.requires_replace.is_empty());

        let plan = MSGraphResourceCollection
            .plan(&prior, inputs(&["u2", "u3"]))
            .unwrap();
        assert_eq!(plan.inputs.reference_ids, vec!["u2", "u3"]);
    }

    #[test]
    fn plan_replaces_on_address_change() {
        let prior = instance(&["u1"]);
        let mut moved = inputs(&["u1"]);
        moved.url = "groups/g2/members/$ref".to_string();
        moved.api_version = ApiVersion::Beta;
        assert_eq!(
            MSGraphResourceCollection
                .plan(&prior, moved)
                .unwrap()
                .requires_replace,
            vec!["url", "api_version"]
        );
    }

    #[test]
    fn import_collection() {
        let imported = MSGraphResourceCollection
            .import("groups/g1/members")
            .unwrap();
        assert_eq!(imported.inputs.url, URL);
        assert_eq!(imported.outputs.id, "groups/g1/members");
        assert!(imported.inputs.reference_ids.is_empty());
        assert!(matches!(
            MSGraphResourceCollection.import("https://graph.microsoft.com/v1.0/groups/g1/members"),
            Err(Error::InvalidImportId(_))
        ));
    }
}
