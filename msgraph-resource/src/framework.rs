use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};
use serde_json::{Map, Value};

use crate::{
    client::GraphClient,
    error::{Error, Result},
    schema::v0::{self, ExtantResource, InputProperties, OutputProperties},
};

/// The operations a host performs on resources, in terms of the v0 messages.
#[async_trait]
pub trait ResourceProvider: Send + Sync {
    async fn create(&self, request: v0::CreateResourceRequest)
        -> Result<v0::CreateResourceResponse>;
    async fn read(&self, request: v0::ReadResourceRequest) -> Result<v0::ReadResourceResponse>;
    async fn update(&self, request: v0::UpdateResourceRequest)
        -> Result<v0::UpdateResourceResponse>;
    async fn delete(&self, request: v0::DeleteResourceRequest)
        -> Result<v0::DeleteResourceResponse>;
    async fn plan(&self, request: v0::PlanResourceRequest) -> Result<v0::PlanResourceResponse>;
    async fn import(&self, request: v0::ImportResourceRequest)
        -> Result<v0::ImportResourceResponse>;
    async fn read_data_source(
        &self,
        request: v0::ReadDataSourceRequest,
    ) -> Result<v0::ReadDataSourceResponse>;
}

/// A resource as known after a successful operation.
#[derive(Debug, Clone, PartialEq)]
pub struct Instance<I, O> {
    pub inputs: I,
    pub outputs: O,
}

/// The outcome of comparing new inputs with the prior state.
#[derive(Debug, Clone, PartialEq)]
pub struct Plan<I> {
    pub inputs: I,
    /// Names of the inputs that force the resource to be replaced.
    pub requires_replace: Vec<String>,
}

impl<I> Plan<I> {
    pub fn in_place(inputs: I) -> Self {
        Plan {
            inputs,
            requires_replace: Vec::new(),
        }
    }
}

/// A resource kind with typed inputs and outputs.
///
/// Operations return the new instance only when they succeed; a failed
/// operation leaves the prior state as it was.
#[async_trait]
pub trait ManagedResource: Send + Sync {
    type Inputs: Serialize + DeserializeOwned + Send + Sync + 'static;
    type Outputs: Serialize + DeserializeOwned + Send + Sync + 'static;

    async fn create(
        &self,
        client: &dyn GraphClient,
        inputs: Self::Inputs,
    ) -> Result<Instance<Self::Inputs, Self::Outputs>>;

    /// Refresh the instance; `None` when it no longer exists remotely.
    async fn read(
        &self,
        client: &dyn GraphClient,
        prior: Instance<Self::Inputs, Self::Outputs>,
    ) -> Result<Option<Instance<Self::Inputs, Self::Outputs>>>;

    async fn update(
        &self,
        client: &dyn GraphClient,
        prior: Instance<Self::Inputs, Self::Outputs>,
        inputs: Self::Inputs,
    ) -> Result<Instance<Self::Inputs, Self::Outputs>>;

    async fn delete(
        &self,
        client: &dyn GraphClient,
        prior: Instance<Self::Inputs, Self::Outputs>,
    ) -> Result<()>;

    fn plan(
        &self,
        prior: &Instance<Self::Inputs, Self::Outputs>,
        inputs: Self::Inputs,
    ) -> Result<Plan<Self::Inputs>>;

    fn import(&self, id: &str) -> Result<Instance<Self::Inputs, Self::Outputs>>;
}

/// A read-only resource kind.
#[async_trait]
pub trait DataSource: Send + Sync {
    type Inputs: DeserializeOwned + Send + Sync + 'static;
    type Outputs: Serialize + Send + Sync + 'static;

    async fn read(&self, client: &dyn GraphClient, inputs: Self::Inputs)
        -> Result<Self::Outputs>;
}

pub(crate) fn parse_input_properties<T: DeserializeOwned>(
    input_properties: &Map<String, Value>,
    resource_type: &str,
) -> Result<T> {
    serde_json::from_value(Value::Object(input_properties.clone())).map_err(|e| {
        Error::MalformedBody(format!(
            "could not deserialize input properties for {} resource: {}",
            resource_type, e
        ))
    })
}

/// Parse the typed instance a state record describes.
pub(crate) fn parse_extant<I: DeserializeOwned, O: DeserializeOwned>(
    resource: &ExtantResource,
) -> Result<Instance<I, O>> {
    let type_ = resource.type_.as_str();
    let inputs = serde_json::from_value(Value::Object(resource.input_properties.0.clone()))
        .map_err(|e| {
            Error::PriorStateInvalid(format!(
                "could not deserialize recorded input properties for {} resource: {}",
                type_, e
            ))
        })?;
    let outputs = resource.output_properties.as_ref().ok_or_else(|| {
        Error::PriorStateInvalid(format!(
            "the recorded {} resource has no output properties",
            type_
        ))
    })?;
    let outputs = serde_json::from_value(Value::Object(outputs.0.clone())).map_err(|e| {
        Error::PriorStateInvalid(format!(
            "could not deserialize recorded output properties for {} resource: {}",
            type_, e
        ))
    })?;
    Ok(Instance { inputs, outputs })
}

fn to_properties<T: Serialize>(value: &T) -> Result<Map<String, Value>> {
    match serde_json::to_value(value) {
        Ok(Value::Object(o)) => Ok(o),
        Ok(_) => Err(Error::MalformedBody("expected an object".to_string())),
        Err(e) => Err(Error::MalformedBody(e.to_string())),
    }
}

pub(crate) fn to_extant<I: Serialize, O: Serialize>(
    type_: &v0::ResourceType,
    instance: &Instance<I, O>,
) -> Result<ExtantResource> {
    Ok(ExtantResource {
        type_: type_.clone(),
        input_properties: InputProperties(to_properties(&instance.inputs)?),
        output_properties: Some(OutputProperties(to_properties(&instance.outputs)?)),
    })
}

pub(crate) async fn do_create<R: ManagedResource>(
    resource: &R,
    client: &dyn GraphClient,
    request: v0::CreateResourceRequest,
) -> Result<v0::CreateResourceResponse> {
    let inputs: R::Inputs =
        parse_input_properties(&request.input_properties, request.type_.as_str())?;
    let instance = resource.create(client, inputs).await?;
    let extant = to_extant(&request.type_, &instance)?;
    Ok(v0::CreateResourceResponse {
        input_properties: extant.input_properties,
        output_properties: extant.output_properties.unwrap_or_default(),
    })
}

pub(crate) async fn do_read<R: ManagedResource>(
    resource: &R,
    client: &dyn GraphClient,
    request: v0::ReadResourceRequest,
) -> Result<v0::ReadResourceResponse> {
    let prior = parse_extant(&request.resource)?;
    let current = resource.read(client, prior).await?;
    Ok(v0::ReadResourceResponse {
        resource: current
            .map(|instance| to_extant(&request.resource.type_, &instance))
            .transpose()?,
    })
}

pub(crate) async fn do_update<R: ManagedResource>(
    resource: &R,
    client: &dyn GraphClient,
    request: v0::UpdateResourceRequest,
) -> Result<v0::UpdateResourceResponse> {
    let type_ = &request.resource.type_;
    let inputs: R::Inputs = parse_input_properties(&request.input_properties, type_.as_str())?;
    let prior = parse_extant(&request.resource)?;
    let instance = resource.update(client, prior, inputs).await?;
    let extant = to_extant(type_, &instance)?;
    Ok(v0::UpdateResourceResponse {
        input_properties: extant.input_properties,
        output_properties: extant.output_properties.unwrap_or_default(),
    })
}

pub(crate) async fn do_delete<R: ManagedResource>(
    resource: &R,
    client: &dyn GraphClient,
    request: v0::DeleteResourceRequest,
) -> Result<v0::DeleteResourceResponse> {
    let prior = parse_extant(&request.resource)?;
    resource.delete(client, prior).await?;
    Ok(v0::DeleteResourceResponse {})
}

pub(crate) fn do_plan<R: ManagedResource>(
    resource: &R,
    request: v0::PlanResourceRequest,
) -> Result<v0::PlanResourceResponse> {
    let type_ = &request.resource.type_;
    let inputs: R::Inputs = parse_input_properties(&request.input_properties, type_.as_str())?;
    let prior = parse_extant(&request.resource)?;
    let plan = resource.plan(&prior, inputs)?;
    Ok(v0::PlanResourceResponse {
        input_properties: InputProperties(to_properties(&plan.inputs)?),
        requires_replace: plan.requires_replace,
    })
}

pub(crate) fn do_import<R: ManagedResource>(
    resource: &R,
    request: v0::ImportResourceRequest,
) -> Result<v0::ImportResourceResponse> {
    let instance = resource.import(&request.id)?;
    Ok(v0::ImportResourceResponse {
        resource: to_extant(&request.type_, &instance)?,
    })
}

pub(crate) async fn do_read_data_source<D: DataSource>(
    data_source: &D,
    client: &dyn GraphClient,
    request: v0::ReadDataSourceRequest,
) -> Result<v0::ReadDataSourceResponse> {
    let inputs: D::Inputs =
        parse_input_properties(&request.input_properties, request.type_.as_str())?;
    let outputs = data_source.read(client, inputs).await?;
    Ok(v0::ReadDataSourceResponse {
        output_properties: OutputProperties(to_properties(&outputs)?),
    })
}
