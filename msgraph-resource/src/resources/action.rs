//! `msgraph_resource_action`: a one-shot call, such as `addPassword` on an
//! application, executed whenever the resource is created or updated.

use std::{collections::BTreeMap, str::FromStr, time::Duration};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info_span, Instrument as _};

use super::validate_retry;
use crate::{
    address,
    client::{ApiVersion, GraphClient, Method, QueryParameters, RequestOptions},
    error::{Error, Operation, Result},
    framework::{Instance, ManagedResource, Plan},
    output::build_output,
    retry::RetryPolicy,
    timeouts::{with_deadline, Timeouts},
};

fn default_method() -> String {
    Method::Post.to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionInputs {
    /// The object the action applies to, e.g. `applications/<id>`.
    pub resource_url: String,
    /// Appended to `resource_url` when set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,
    #[serde(default = "default_method")]
    pub method: String,
    #[serde(default)]
    pub api_version: ApiVersion,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub body: Value,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub query_parameters: QueryParameters,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub headers: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub response_export_values: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry: Option<RetryPolicy>,
    #[serde(default, skip_serializing_if = "Timeouts::is_default")]
    pub timeouts: Timeouts,
}

impl Default for ActionInputs {
    fn default() -> Self {
        ActionInputs {
            resource_url: String::new(),
            action: None,
            method: default_method(),
            api_version: ApiVersion::default(),
            body: Value::Null,
            query_parameters: QueryParameters::new(),
            headers: BTreeMap::new(),
            response_export_values: BTreeMap::new(),
            retry: None,
            timeouts: Timeouts::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionOutputs {
    pub id: String,
    #[serde(default)]
    pub output: Value,
}

type ActionInstance = Instance<ActionInputs, ActionOutputs>;

pub(crate) fn parse_method(method: &str) -> Result<Method> {
    Method::from_str(method).map_err(|_| {
        Error::InvalidConfig(format!(
            "method {:?} is not one of GET, POST, PATCH, PUT, DELETE",
            method
        ))
    })
}

/// A call to `resource_url[/action]`, shared by the action resource and
/// the action data source.
pub(crate) struct ActionCall<'a> {
    pub resource_url: &'a str,
    pub action: Option<&'a str>,
    pub method: Method,
    pub api_version: ApiVersion,
    pub body: &'a Value,
    pub options: RequestOptions,
    pub response_export_values: &'a BTreeMap<String, String>,
}

impl ActionCall<'_> {
    pub fn url(&self) -> String {
        address::action_url(self.resource_url, self.action)
    }

    /// Execute the call within `limit`; returns the URL and the exported
    /// output.
    pub async fn execute(
        &self,
        client: &dyn GraphClient,
        operation: Operation,
        limit: Duration,
    ) -> Result<(String, Value)> {
        let url = self.url();
        let body = (!self.body.is_null()).then_some(self.body);
        let span = info_span!("executing action", method = %self.method, url = %url);
        let response = with_deadline(operation, limit, async {
            client
                .action(self.method, &url, self.api_version, body, &self.options)
                .await
                .map_err(Error::transport(Operation::Action))
        })
        .instrument(span)
        .await?;
        let output = build_output(&response, self.response_export_values);
        Ok((url, output))
    }
}

pub struct MSGraphResourceAction;

impl MSGraphResourceAction {
    async fn run(client: &dyn GraphClient, inputs: ActionInputs) -> Result<ActionInstance> {
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
            .execute(client, Operation::Create, inputs.timeouts.create())
            .await?;
        Ok(Instance {
            inputs,
            outputs: ActionOutputs { id, output },
        })
    }
}

#[async_trait]
impl ManagedResource for MSGraphResourceAction {
    type Inputs = ActionInputs;
    type Outputs = ActionOutputs;

    async fn create(
        &self,
        client: &dyn GraphClient,
        inputs: ActionInputs,
    ) -> Result<ActionInstance> {
        Self::run(client, inputs).await
    }

    async fn read(
        &self,
        _client: &dyn GraphClient,
        prior: ActionInstance,
    ) -> Result<Option<ActionInstance>> {
        Ok(Some(prior))
    }

    async fn update(
        &self,
        client: &dyn GraphClient,
        _prior: ActionInstance,
        inputs: ActionInputs,
    ) -> Result<ActionInstance> {
        Self::run(client, inputs).await
    }

    async fn delete(&self, _client: &dyn GraphClient, prior: ActionInstance) -> Result<()> {
        tracing::info!("Forgetting action {}; nothing to undo", prior.outputs.id);
        Ok(())
    }

    fn plan(&self, prior: &ActionInstance, inputs: ActionInputs) -> Result<Plan<ActionInputs>> {
        parse_method(&inputs.method)?;
        let mut requires_replace = Vec::new();
        if inputs.resource_url != prior.inputs.resource_url {
            requires_replace.push("resource_url".to_string());
        }
        if inputs.action != prior.inputs.action {
            requires_replace.push("action".to_string());
        }
        if inputs.method != prior.inputs.method {
            requires_replace.push("method".to_string());
        }
        if inputs.api_version != prior.inputs.api_version {
            requires_replace.push("api_version".to_string());
        }
        Ok(Plan {
            inputs,
            requires_replace,
        })
    }

    fn import(&self, _id: &str) -> Result<ActionInstance> {
        Err(Error::NotSupported(
            "msgraph_resource_action cannot be imported".to_string(),
        ))
    }
}
