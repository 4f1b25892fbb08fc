//! The provider: routes each request to the resource kind it names.

use std::sync::Arc;

use async_trait::async_trait;

use crate::{
    client::GraphClient,
    error::{Error, Result},
    framework::{
        do_create, do_delete, do_import, do_plan, do_read, do_read_data_source, do_update,
        ResourceProvider,
    },
    resources::{
        action::MSGraphResourceAction,
        collection::MSGraphResourceCollection,
        data_source::{ActionDataSource, ResourceDataSource},
        resource::MSGraphResource,
        update_resource::MSGraphUpdateResource,
        MSGRAPH_RESOURCE, MSGRAPH_RESOURCE_ACTION, MSGRAPH_RESOURCE_COLLECTION,
        MSGRAPH_UPDATE_RESOURCE,
    },
    schema::v0,
};

/// Run `$body` with `$r` bound to the managed resource kind named by `$type_`.
macro_rules! with_resource {
    ($type_:expr, $r:ident => $body:expr) => {
        match $type_.as_str() {
            MSGRAPH_RESOURCE => {
                let $r = &MSGraphResource;
                $body
            }
            MSGRAPH_UPDATE_RESOURCE => {
                let $r = &MSGraphUpdateResource;
                $body
            }
            MSGRAPH_RESOURCE_COLLECTION => {
                let $r = &MSGraphResourceCollection;
                $body
            }
            MSGRAPH_RESOURCE_ACTION => {
                let $r = &MSGraphResourceAction;
                $body
            }
            other => Err(Error::UnknownResourceType(other.to_string())),
        }
    };
}

pub struct GraphProvider {
    client: Arc<dyn GraphClient>,
}

impl GraphProvider {
    pub fn new(client: Arc<dyn GraphClient>) -> Self {
        GraphProvider { client }
    }
}

#[async_trait]
impl ResourceProvider for GraphProvider {
    async fn create(
        &self,
        request: v0::CreateResourceRequest,
    ) -> Result<v0::CreateResourceResponse> {
        let client = self.client.as_ref();
        with_resource!(request.type_.clone(), r => do_create(r, client, request).await)
    }

    async fn read(&self, request: v0::ReadResourceRequest) -> Result<v0::ReadResourceResponse> {
        let client = self.client.as_ref();
        with_resource!(request.resource.type_.clone(), r => do_read(r, client, request).await)
    }

    async fn update(
        &self,
        request: v0::UpdateResourceRequest,
    ) -> Result<v0::UpdateResourceResponse> {
        let client = self.client.as_ref();
        with_resource!(request.resource.type_.clone(), r => do_update(r, client, request).await)
    }

    async fn delete(
        &self,
        request: v0::DeleteResourceRequest,
    ) -> Result<v0::DeleteResourceResponse> {
        let client = self.client.as_ref();
        with_resource!(request.resource.type_.clone(), r => do_delete(r, client, request).await)
    }

    async fn plan(&self, request: v0::PlanResourceRequest) -> Result<v0::PlanResourceResponse> {
        with_resource!(request.resource.type_.clone(), r => do_plan(r, request))
    }

    async fn import(
        &self,
        request: v0::ImportResourceRequest,
    ) -> Result<v0::ImportResourceResponse> {
        with_resource!(request.type_.clone(), r => do_import(r, request))
    }

    async fn read_data_source(
        &self,
        request: v0::ReadDataSourceRequest,
    ) -> Result<v0::ReadDataSourceResponse> {
        let client = self.client.as_ref();
        let type_ = request.type_.clone();
        match type_.as_str() {
            MSGRAPH_RESOURCE => do_read_data_source(&ResourceDataSource, client, request).await,
            MSGRAPH_RESOURCE_ACTION => {
                do_read_data_source(&ActionDataSource, client, request).await
            }
            other => Err(Error::UnknownResourceType(format!("data source {}", other))),
        }
    }
}
