//! `msgraph_update_resource`: some properties of an object that is managed
//! elsewhere.
//!
//! The object itself is never created or deleted; create and update both
//! patch it, and delete merely stops managing it.

use std::collections::BTreeMap;

use async_trait::async_trait;
use msgraph_json::{diff, is_empty, reconcile, UpdateOption};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{info_span, Instrument as _};

use super::validate_retry;
use crate::{
    address,
    client::{ApiVersion, GraphClient, QueryParameters, RequestOptions},
    error::{Error, Operation, Result},
    framework::{Instance, ManagedResource, Plan},
    output::build_output,
    retry::RetryPolicy,
    timeouts::{with_deadline, Timeouts},
};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UpdateResourceInputs {
    /// The object, e.g. `applications/<id>`.
    pub url: String,
    #[serde(default)]
    pub api_version: ApiVersion,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub body: Value,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub update_query_parameters: QueryParameters,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub read_query_parameters: QueryParameters,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub headers: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub response_export_values: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry: Option<RetryPolicy>,
    #[serde(default, skip_serializing_if = "Timeouts::is_default")]
    pub timeouts: Timeouts,
}

impl UpdateResourceInputs {
    fn options(&self, query_parameters: &QueryParameters) -> RequestOptions {
        RequestOptions::new(&self.headers, query_parameters).with_retry(self.retry.clone())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdateResourceOutputs {
    pub id: String,
    #[serde(default)]
    pub output: Value,
}

type UpdateInstance = Instance<UpdateResourceInputs, UpdateResourceOutputs>;

pub struct MSGraphUpdateResource;

impl MSGraphUpdateResource {
    /// Patch the object with `patch`, then read it back.
    async fn apply(
        client: &dyn GraphClient,
        operation: Operation,
        limit: std::time::Duration,
        mut inputs: UpdateResourceInputs,
        patch: Value,
    ) -> Result<UpdateInstance> {
        let span = info_span!("patching resource", url = %inputs.url);
        with_deadline(operation, limit, async move {
            client
                .update(
                    &inputs.url,
                    inputs.api_version,
                    &patch,
                    &inputs.options(&inputs.update_query_parameters),
                )
                .await
                .map_err(Error::transport(operation))?;
            let observed = client
                .read(
                    &inputs.url,
                    inputs.api_version,
                    &inputs.options(&inputs.read_query_parameters),
                )
                .await
                .map_err(Error::transport(Operation::Read))?;

            if !inputs.body.is_null() {
                inputs.body = reconcile(&inputs.body, &observed, &UpdateOption::after_write());
            }
            let outputs = UpdateResourceOutputs {
                id: address::last_segment(&inputs.url).to_string(),
                output: build_output(&observed, &inputs.response_export_values),
            };
            Ok(Instance { inputs, outputs })
        })
        .instrument(span)
        .await
    }
}

#[async_trait]
impl ManagedResource for MSGraphUpdateResource {
    type Inputs = UpdateResourceInputs;
    type Outputs = UpdateResourceOutputs;

    async fn create(
        &self,
        client: &dyn GraphClient,
        inputs: UpdateResourceInputs,
    ) -> Result<UpdateInstance> {
        validate_retry(&inputs.retry)?;
        let patch = inputs.body.clone();
        let limit = inputs.timeouts.create();
        Self::apply(client, Operation::Create, limit, inputs, patch).await
    }

    async fn read(
        &self,
        client: &dyn GraphClient,
        prior: UpdateInstance,
    ) -> Result<Option<UpdateInstance>> {
        let Instance {
            mut inputs,
            mut outputs,
        } = prior;
        let options = inputs.options(&inputs.read_query_parameters);
        let observed = with_deadline(Operation::Read, inputs.timeouts.read(), async {
            match client.read(&inputs.url, inputs.api_version, &options).await {
                Ok(body) => Ok(Some(body)),
                Err(e) if e.is_not_found() => Ok(None),
                Err(e) => Err(Error::transport(Operation::Read)(e)),
            }
        })
        .instrument(info_span!("reading resource", url = %inputs.url))
        .await?;

        let Some(observed) = observed else {
            tracing::info!(
                "Resource {} no longer exists; removing it from the state",
                inputs.url
            );
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
        prior: UpdateInstance,
        inputs: UpdateResourceInputs,
    ) -> Result<UpdateInstance> {
        validate_retry(&inputs.retry)?;
        let patch = diff(&prior.inputs.body, &inputs.body, &UpdateOption::default())
            .filter(|patch| !is_empty(patch));
        let Some(patch) = patch else {
            tracing::info!("Skipping update for resource {}: body unchanged", inputs.url);
            return Ok(Instance {
                inputs,
                outputs: prior.outputs,
            });
        };
        let limit = inputs.timeouts.update();
        Self::apply(client, Operation::Update, limit, inputs, patch).await
    }

    async fn delete(&self, _client: &dyn GraphClient, prior: UpdateInstance) -> Result<()> {
        tracing::info!(
            "No longer managing {}; its properties are left as they are",
            prior.inputs.url
        );
        Ok(())
    }

    fn plan(
        &self,
        prior: &UpdateInstance,
        inputs: UpdateResourceInputs,
    ) -> Result<Plan<UpdateResourceInputs>> {
        if inputs.url != prior.inputs.url {
            return Ok(Plan {
                inputs,
                requires_replace: vec!["url".to_string()],
            });
        }
        Ok(Plan::in_place(inputs))
    }

    fn import(&self, id: &str) -> Result<UpdateInstance> {
        let (url, api_version) = address::split_import_id(id)?;
        Ok(Instance {
            outputs: UpdateResourceOutputs {
                id: address::last_segment(url).to_string(),
                output: Value::Object(Map::new()),
            },
            inputs: UpdateResourceInputs {
                url: url.to_string(),
                api_version,
                ..Default::default()
            },
        })
    }
}
