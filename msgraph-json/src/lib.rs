//! Operations on schema-less JSON documents, as used to reconcile a desired
//! Microsoft Graph resource body with what the API reports back.
//!
//! All functions work on [`serde_json::Value`]. Four operations matter:
//!
//! - [`diff`] computes the patch to send when a body changes.
//! - [`reconcile`] folds a server response back into the shape the user wrote.
//! - [`merge`] combines partial documents, the newer side winning.
//! - [`is_empty`] decides whether a patch is worth sending at all.
//!
//! [`diff`] and [`reconcile`] take the same [`UpdateOption`], so that their
//! notions of "changed" agree.
//!
//! ## Arrays
//!
//! [`diff`] compares arrays by position only. [`reconcile`] additionally
//! matches objects by their `name` property, because the server may reorder
//! collections. Graph replaces arrays wholesale on PATCH, so the diff never
//! needs more than a changed/unchanged answer per array.

mod compare;
mod diff;
mod extract;
mod merge;
#[cfg(test)]
mod properties;
mod update;

pub use compare::{deep_equal, is_empty};
pub use diff::diff;
pub use extract::extract;
pub use merge::merge;
pub use update::{reconcile, UpdateOption};
