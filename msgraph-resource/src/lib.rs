//! A resource provider for generic Microsoft Graph resources.
//!
//! Resources are addressed by a relative URL and described by a schema-less
//! JSON body. The lifecycle of each resource kind lives in [`resources`]; the
//! JSON comparison and reconciliation it relies on lives in `msgraph-json`.
//!
//! Network access goes through the [`client::GraphClient`] trait, which the
//! runner implements over HTTP. [`provider::GraphProvider`] ties everything
//! together behind the [`framework::ResourceProvider`] interface.

pub mod address;
pub mod client;
pub mod error;
pub mod framework;
pub mod output;
pub mod provider;
pub mod resources;
pub mod retry;
pub mod schema;
pub mod timeouts;

#[cfg(test)]
mod testing;

pub use error::{ClientError, Error, Operation, Result};
