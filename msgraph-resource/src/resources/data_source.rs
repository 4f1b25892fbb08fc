//! Read-only counterparts of `msgraph_resource` and
//! `msgraph_resource_action`.

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info_span, Instrument as _};

use super::{
    action::{parse_method, ActionCall},
    validate_retry,
};
use crate::{
    client::{ApiVersion, GraphClient, Method, QueryParameters, RequestOptions},
    error::{Error, Operation, Result},
    framework::DataSource,
    output::build_output,
    retry::RetryPolicy,
    timeouts::{with_deadline, Timeouts},
};

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ResourceDataInputs {
    /// The object to read, e.g. `users/<id>`.
    pub url: String,
    #[serde(default)]
    pub api_version: ApiVersion,
    #[serde(default)]
    pub query_parameters: QueryParameters,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    #[serde(default)]
    pub response_export_values: BTreeMap<String, String>,
    #[serde(default)]
    pub retry: Option<RetryPolicy>,
    #[serde(default)]
    pub timeouts: Timeouts,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DataOutputs {
    pub id: String,
    pub output: Value,
}

pub struct ResourceDataSource;

#[async_trait]
impl DataSource for ResourceDataSource {
    type Inputs = ResourceDataInputs;
    type Outputs = DataOutputs;

    async fn read(
        &self,
        client: &dyn GraphClient,
        inputs: ResourceDataInputs,
    ) -> Result<DataOutputs> {
        validate_retry(&inputs.retry)?;
        let options = RequestOptions::new(&inputs.headers, &inputs.query_parameters)
            .with_retry(inputs.retry.clone());
        let body = with_deadline(Operation::Read, inputs.timeouts.read(), async {
            client
                .read(&inputs.url, inputs.api_version, &options)
                .await
                .map_err(Error::transport(Operation::Read))
        })
        .instrument(info_span!("reading data source", url = %inputs.url))
        .await?;
        Ok(DataOutputs {
            output: build_output(&body, &inputs.response_export_values),
            id: inputs.url,
        })
    }
}

fn default_method() -> String {
    Method::Get.to_string()
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ActionDataInputs {
    pub resource_url: String,
    #[serde(default)]
    pub action: Option<String>,
    #[serde(default = "default_method")]
    pub method: String,
    #[serde(default)]
    pub api_version: ApiVersion,
    #[serde(default)]
    pub body: Value,
    #[serde(default)]
    pub query_parameters: QueryParameters,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    #[serde(default)]
    pub response_export_values: BTreeMap<String, String>,
    #[serde(default)]
    pub retry: Option<RetryPolicy>,
    #[serde(default)]
    pub timeouts: Timeouts,
}

pub struct ActionDataSource;

#[async_trait]
impl DataSource for ActionDataSource {
    type Inputs = ActionDataInputs;
    type Outputs = DataOutputs;

    async fn read(
        &self,
        client: &dyn GraphClient,
        inputs: ActionDataInputs,
    ) -> Result<DataOutputs> {
        validate_retry(&inputs.retry)?;
        let call = ActionCall {
            resource_url: &inputs.resource_url,
            action: inputs.action.as_deref(),
            method: parse_method(&inputs.method)?,
            api_version: inputs.api_version,
            body: &inputs.body,
            options: RequestOptions::new(&inputs.headers, &inputs.query_parameters)
                .with_retry(inputs.retry.clone()),
            response_export_values: &inputs.response_export_values,
        };
        let (id, output) = call
            .execute(client, Operation::Read, inputs.timeouts.read())
            .await?;
        Ok(DataOutputs { id, output })
    }
}
