//! The resource kinds and data sources of the provider.

pub mod action;
pub mod collection;
pub mod data_source;
pub mod resource;
pub mod update_resource;

use crate::{error::Result, retry::RetryPolicy};

pub const MSGRAPH_RESOURCE: &str = "msgraph_resource";
pub const MSGRAPH_UPDATE_RESOURCE: &str = "msgraph_update_resource";
pub const MSGRAPH_RESOURCE_COLLECTION: &str = "msgraph_resource_collection";
pub const MSGRAPH_RESOURCE_ACTION: &str = "msgraph_resource_action";

fn validate_retry(retry: &Option<RetryPolicy>) -> Result<()> {
    match retry {
        Some(policy) => policy.validate(),
        None => Ok(()),
    }
}
