//! The runner commands that change resources, each recorded in the state
//! only once the provider reports success.

use anyhow::{bail, Context as _, Result};
use msgraph_resource::{
    framework::ResourceProvider,
    schema::v0::{self, ExtantResource, InputProperties, OutputProperties, ResourceType},
};
use tracing::{info_span, Instrument as _};

use crate::state::StateStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    Created,
    Updated,
    Replaced,
    Unchanged,
}

async fn create(
    provider: &dyn ResourceProvider,
    store: &mut StateStore,
    name: &str,
    type_: &ResourceType,
    inputs: InputProperties,
) -> Result<()> {
    let response = provider
        .create(v0::CreateResourceRequest {
            type_: type_.clone(),
            input_properties: inputs,
        })
        .await
        .with_context(|| format!("failed to create resource {}", name))?;
    store.commit(
        "create",
        name,
        Some(&ExtantResource {
            type_: type_.clone(),
            input_properties: response.input_properties,
            output_properties: Some(response.output_properties),
        }),
    )
}

async fn delete(
    provider: &dyn ResourceProvider,
    store: &mut StateStore,
    name: &str,
    resource: ExtantResource,
) -> Result<()> {
    provider
        .delete(v0::DeleteResourceRequest { resource })
        .await
        .with_context(|| format!("failed to delete resource {}", name))?;
    store.commit("delete", name, None)
}

fn existing(store: &StateStore, name: &str) -> Result<ExtantResource> {
    match store.resource(name)? {
        Some(resource) => Ok(resource),
        None => bail!("Resource {} is not in the state", name),
    }
}

/// Bring resource `name` to the desired `inputs`.
pub async fn apply(
    provider: &dyn ResourceProvider,
    store: &mut StateStore,
    name: &str,
    type_: ResourceType,
    inputs: InputProperties,
) -> Result<ApplyOutcome> {
    let span = info_span!("applying resource", name = name, r#type = %type_);
    async move {
        let Some(prior) = store.resource(name)? else {
            create(provider, store, name, &type_, inputs).await?;
            return Ok(ApplyOutcome::Created);
        };

        if prior.type_ != type_ {
            tracing::info!(
                "Replacing resource {}: type changed from {} to {}",
                name,
                prior.type_,
                type_
            );
            delete(provider, store, name, prior).await?;
            create(provider, store, name, &type_, inputs).await?;
            return Ok(ApplyOutcome::Replaced);
        }

        let plan = provider
            .plan(v0::PlanResourceRequest {
                resource: prior.clone(),
                input_properties: inputs,
            })
            .await
            .with_context(|| format!("failed to plan resource {}", name))?;

        if !plan.requires_replace.is_empty() {
            tracing::info!(
                "Replacing resource {}: {} cannot be changed in place",
                name,
                plan.requires_replace.join(", ")
            );
            delete(provider, store, name, prior).await?;
            create(provider, store, name, &type_, plan.input_properties).await?;
            return Ok(ApplyOutcome::Replaced);
        }

        if plan.input_properties == prior.input_properties {
            tracing::info!("Skipping update for resource {}: inputs unchanged", name);
            return Ok(ApplyOutcome::Unchanged);
        }

        let response = provider
            .update(v0::UpdateResourceRequest {
                resource: prior,
                input_properties: plan.input_properties,
            })
            .await
            .with_context(|| format!("failed to update resource {}", name))?;
        store.commit(
            "update",
            name,
            Some(&ExtantResource {
                type_,
                input_properties: response.input_properties,
                output_properties: Some(response.output_properties),
            }),
        )?;
        Ok(ApplyOutcome::Updated)
    }
    .instrument(span)
    .await
}

/// Read resource `name` back; forget it when it no longer exists.
pub async fn refresh(
    provider: &dyn ResourceProvider,
    store: &mut StateStore,
    name: &str,
) -> Result<Option<ExtantResource>> {
    let prior = existing(store, name)?;
    let response = provider
        .read(v0::ReadResourceRequest { resource: prior })
        .instrument(info_span!("refreshing resource", name = name))
        .await
        .with_context(|| format!("failed to read resource {}", name))?;
    match &response.resource {
        Some(resource) => store.commit("refresh", name, Some(resource))?,
        None => {
            tracing::info!("Resource {} no longer exists; forgetting it", name);
            store.commit("forget", name, None)?;
        }
    }
    Ok(response.resource)
}

pub async fn destroy(
    provider: &dyn ResourceProvider,
    store: &mut StateStore,
    name: &str,
) -> Result<()> {
    let prior = existing(store, name)?;
    delete(provider, store, name, prior)
        .instrument(info_span!("destroying resource", name = name))
        .await
}

/// Adopt the existing object `id` as resource `name`, and read it.
pub async fn import(
    provider: &dyn ResourceProvider,
    store: &mut StateStore,
    name: &str,
    type_: ResourceType,
    id: &str,
) -> Result<ExtantResource> {
    if store.resource(name)?.is_some() {
        bail!("Resource {} is already in the state", name);
    }
    let imported = provider
        .import(v0::ImportResourceRequest {
            type_,
            id: id.to_string(),
        })
        .await
        .with_context(|| format!("failed to import {} as {}", id, name))?;
    let response = provider
        .read(v0::ReadResourceRequest {
            resource: imported.resource,
        })
        .instrument(info_span!("reading imported resource", name = name))
        .await
        .with_context(|| format!("failed to read imported resource {}", name))?;
    let Some(resource) = response.resource else {
        bail!("Cannot import {}: it does not exist", id);
    };
    store.commit("import", name, Some(&resource))?;
    Ok(resource)
}

pub async fn read_data(
    provider: &dyn ResourceProvider,
    type_: ResourceType,
    inputs: InputProperties,
) -> Result<OutputProperties> {
    let response = provider
        .read_data_source(v0::ReadDataSourceRequest {
            type_: type_.clone(),
            input_properties: inputs,
        })
        .await
        .with_context(|| format!("failed to read {} data source", type_))?;
    Ok(response.output_properties)
}
