//! `msgraph_resource`: an object in a Graph collection, or a `$ref`
//! membership reference.

use std::collections::BTreeMap;

use async_trait::async_trait;
use msgraph_json::{deep_equal, diff, is_empty, reconcile, UpdateOption};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{info_span, Instrument as _};

use super::validate_retry;
use crate::{
    address,
    client::{ApiVersion, GraphClient, QueryParameters, RequestOptions},
    error::{ClientError, Error, Operation, Result},
    framework::{Instance, ManagedResource, Plan},
    output::build_output,
    retry::RetryPolicy,
    timeouts::{with_deadline, Timeouts},
};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResourceInputs {
    /// The collection the object lives in, e.g. `groups`, or a membership
    /// collection ending in `/$ref`.
    pub url: String,
    #[serde(default)]
    pub api_version: ApiVersion,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub body: Value,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub create_query_parameters: QueryParameters,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub update_query_parameters: QueryParameters,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub read_query_parameters: QueryParameters,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub delete_query_parameters: QueryParameters,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub headers: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub response_export_values: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry: Option<RetryPolicy>,
    #[serde(default, skip_serializing_if = "Timeouts::is_default")]
    pub timeouts: Timeouts,
}

impl ResourceInputs {
    fn options(&self, query_parameters: &QueryParameters) -> RequestOptions {
        RequestOptions::new(&self.headers, query_parameters).with_retry(self.retry.clone())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceOutputs {
    pub id: String,
    pub resource_url: String,
    #[serde(default)]
    pub output: Value,
}

type ResourceInstance = Instance<ResourceInputs, ResourceOutputs>;

pub struct MSGraphResource;

#[async_trait]
impl ManagedResource for MSGraphResource {
    type Inputs = ResourceInputs;
    type Outputs = ResourceOutputs;

    async fn create(
        &self,
        client: &dyn GraphClient,
        mut inputs: ResourceInputs,
    ) -> Result<ResourceInstance> {
        validate_retry(&inputs.retry)?;
        let reference = if address::is_ref(&inputs.url) {
            let id = address::referenced_id(&inputs.body).ok_or_else(|| {
                Error::MalformedBody(format!(
                    "the body of {} must contain an \"@odata.id\" reference",
                    inputs.url
                ))
            })?;
            Some(id.to_string())
        } else {
            None
        };

        let span = info_span!("creating resource", url = %inputs.url);
        let limit = inputs.timeouts.create();
        with_deadline(Operation::Create, limit, async move {
            let response = client
                .create(
                    &inputs.url,
                    inputs.api_version,
                    &inputs.body,
                    &inputs.options(&inputs.create_query_parameters),
                )
                .await
                .map_err(Error::transport(Operation::Create))?;

            if let Some(id) = reference {
                // Nothing to read back: the membership has no body of its own.
                let outputs = ResourceOutputs {
                    resource_url: address::resource_url(&inputs.url, &id),
                    output: build_output(&response, &inputs.response_export_values),
                    id,
                };
                return Ok(Instance { inputs, outputs });
            }

            let id = response
                .get("id")
                .and_then(Value::as_str)
                .filter(|id| !id.is_empty())
                .ok_or_else(|| {
                    Error::transport(Operation::Create)(ClientError::Decode(
                        "the response does not contain an \"id\"".to_string(),
                    ))
                })?
                .to_string();
            let item = address::item_url(&inputs.url, &id);
            let read_options = RequestOptions::new(&inputs.headers, &inputs.read_query_parameters)
                .with_retry(Some(RetryPolicy::read_after_create(inputs.retry.as_ref())))
                .retrying_not_found();
            let observed = client
                .read(&item, inputs.api_version, &read_options)
                .await
                .map_err(Error::transport(Operation::Read))?;

            if !inputs.body.is_null() {
                inputs.body = reconcile(&inputs.body, &observed, &UpdateOption::after_write());
            }
            let outputs = ResourceOutputs {
                id,
                resource_url: item,
                output: build_output(&observed, &inputs.response_export_values),
            };
            Ok(Instance { inputs, outputs })
        })
        .instrument(span)
        .await
    }

    async fn read(
        &self,
        client: &dyn GraphClient,
        prior: ResourceInstance,
    ) -> Result<Option<ResourceInstance>> {
        let Instance {
            mut inputs,
            mut outputs,
        } = prior;
        if address::is_ref(&inputs.url) {
            return Ok(Some(Instance { inputs, outputs }));
        }

        let item = address::item_url(&inputs.url, &outputs.id);
        let options = inputs.options(&inputs.read_query_parameters);
        let observed = with_deadline(Operation::Read, inputs.timeouts.read(), async {
            match client.read(&item, inputs.api_version, &options).await {
                Ok(body) => Ok(Some(body)),
                Err(e) if e.is_not_found() => Ok(None),
                Err(e) => Err(Error::transport(Operation::Read)(e)),
            }
        })
        .instrument(info_span!("reading resource", url = %item))
        .await?;

        let Some(observed) = observed else {
            tracing::info!("Resource {} no longer exists; removing it from the state", item);
            return Ok(None);
        };
        if !inputs.body.is_null() {
            inputs.body = reconcile(&inputs.body, &observed, &UpdateOption::default());
        }
        outputs.output = build_output(&observed, &inputs.response_export_values);
        Ok(Some(Instance { inputs, outputs }))
    }

    async fn update(
        &self,
        client: &dyn GraphClient,
        prior: ResourceInstance,
        mut inputs: ResourceInputs,
    ) -> Result<ResourceInstance> {
        validate_retry(&inputs.retry)?;
        let item = address::item_url(&prior.inputs.url, &prior.outputs.id);
        let patch = diff(&prior.inputs.body, &inputs.body, &UpdateOption::default())
            .filter(|patch| !is_empty(patch));
        let Some(patch) = patch else {
            tracing::info!("Skipping update for resource {}: body unchanged", item);
            return Ok(Instance {
                inputs,
                outputs: prior.outputs,
            });
        };

        let span = info_span!("updating resource", url = %item);
        let limit = inputs.timeouts.update();
        let outputs = prior.outputs;
        with_deadline(Operation::Update, limit, async move {
            client
                .update(
                    &item,
                    inputs.api_version,
                    &patch,
                    &inputs.options(&inputs.update_query_parameters),
                )
                .await
                .map_err(Error::transport(Operation::Update))?;
            let observed = client
                .read(
                    &item,
                    inputs.api_version,
                    &inputs.options(&inputs.read_query_parameters),
                )
                .await
                .map_err(Error::transport(Operation::Read))?;

            if !inputs.body.is_null() {
                inputs.body = reconcile(&inputs.body, &observed, &UpdateOption::after_write());
            }
            let outputs = ResourceOutputs {
                output: build_output(&observed, &inputs.response_export_values),
                ..outputs
            };
            Ok(Instance { inputs, outputs })
        })
        .instrument(span)
        .await
    }

    async fn delete(&self, client: &dyn GraphClient, prior: ResourceInstance) -> Result<()> {
        let inputs = &prior.inputs;
        let item = address::item_url(&inputs.url, &prior.outputs.id);
        let options = inputs.options(&inputs.delete_query_parameters);
        with_deadline(Operation::Delete, inputs.timeouts.delete(), async {
            client
                .delete(&item, inputs.api_version, &options)
                .await
                .map_err(Error::transport(Operation::Delete))
        })
        .instrument(info_span!("deleting resource", url = %item))
        .await
    }

    fn plan(
        &self,
        prior: &ResourceInstance,
        inputs: ResourceInputs,
    ) -> Result<Plan<ResourceInputs>> {
        let mut requires_replace = Vec::new();
        if inputs.url != prior.inputs.url {
            requires_replace.push("url".to_string());
        }
        // A membership reference cannot be patched, only removed and added.
        if address::is_ref(&inputs.url) {
            if !deep_equal(&inputs.body, &prior.inputs.body) {
                requires_replace.push("body".to_string());
            }
            if inputs.response_export_values != prior.inputs.response_export_values {
                requires_replace.push("response_export_values".to_string());
            }
            if inputs.api_version != prior.inputs.api_version {
                requires_replace.push("api_version".to_string());
            }
        }
        Ok(Plan {
            inputs,
            requires_replace,
        })
    }

    fn import(&self, id: &str) -> Result<ResourceInstance> {
        let address = address::parse_import_id(id)?;
        Ok(Instance {
            outputs: ResourceOutputs {
                resource_url: address::resource_url(&address.url, &address.id),
                id: address.id,
                output: Value::Object(Map::new()),
            },
            inputs: ResourceInputs {
                url: address.url,
                api_version: address.api_version,
                ..Default::default()
            },
        })
    }
}
