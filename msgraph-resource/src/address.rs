//! Resource URLs: items, `$ref` membership references, and import ids.

use serde_json::Value;

use crate::{
    client::ApiVersion,
    error::{Error, Result},
};

pub const REF_SUFFIX: &str = "/$ref";

/// Whether `url` addresses collection membership rather than an object.
pub fn is_ref(url: &str) -> bool {
    url.ends_with(REF_SUFFIX)
}

/// The collection a `$ref` URL belongs to.
pub fn ref_base(url: &str) -> &str {
    url.strip_suffix(REF_SUFFIX).unwrap_or(url)
}

/// The URL of the item `id` in the collection `url`.
///
/// For a `$ref` collection this is the membership reference,
/// `groups/1/members/$ref` becoming `groups/1/members/<id>/$ref`.
pub fn item_url(url: &str, id: &str) -> String {
    if is_ref(url) {
        format!("{}/{}{}", ref_base(url), id, REF_SUFFIX)
    } else {
        format!("{}/{}", url, id)
    }
}

/// The user-facing URL of an item: `$ref` suffix left out.
pub fn resource_url(url: &str, id: &str) -> String {
    format!("{}/{}", ref_base(url), id)
}

pub fn last_segment(url: &str) -> &str {
    url.rsplit('/').next().unwrap_or(url)
}

/// The id of the object an `{"@odata.id": ...}` reference points to.
pub fn referenced_id(body: &Value) -> Option<&str> {
    body.get("@odata.id")
        .and_then(Value::as_str)
        .map(last_segment)
        .filter(|id| !id.is_empty())
}

/// The absolute `@odata.id` of a directory object.
pub fn directory_object_reference(host: &str, api_version: ApiVersion, id: &str) -> String {
    format!(
        "{}/{}/directoryObjects/{}",
        host.trim_end_matches('/'),
        api_version,
        id
    )
}

/// `resource_url`, or `resource_url/action` when an action is named.
pub fn action_url(resource_url: &str, action: Option<&str>) -> String {
    match action {
        Some(action) if !action.is_empty() => format!("{}/{}", resource_url, action),
        _ => resource_url.to_string(),
    }
}

/// Check that `url` can serve as the collection of a membership resource.
///
/// Returns an error for the first problem found.
pub fn validate_collection_url(url: &str) -> Result<()> {
    let invalid = |reason: &str| Err(Error::InvalidConfig(format!("url {:?}: {}", url, reason)));

    if url.starts_with("http://") || url.starts_with("https://") {
        return invalid("must be relative, e.g. \"groups/<id>/members/$ref\"");
    }
    if url.starts_with('/') {
        return invalid("must not start with '/'");
    }
    if !is_ref(url) {
        return invalid("must end with '/$ref'");
    }
    if ref_base(url).is_empty() {
        return invalid("a path must precede '/$ref'");
    }
    if url.matches(REF_SUFFIX).count() > 1 {
        return invalid("contains '/$ref' more than once");
    }
    if url.contains("//") {
        return invalid("contains an empty path segment");
    }
    if url.to_lowercase().contains("approleassignments") {
        tracing::warn!(
            "Collection {} looks like appRoleAssignments, which this resource is not meant to manage",
            url
        );
    }
    Ok(())
}

/// An address recovered from an import id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportAddress {
    /// The collection, `$ref` suffixed for membership references.
    pub url: String,
    pub id: String,
    pub api_version: ApiVersion,
}

/// Split an import id such as `groups/1?api-version=beta` into its path and
/// api version.
pub fn split_import_id(import_id: &str) -> Result<(&str, ApiVersion)> {
    let (path, query) = match import_id.split_once('?') {
        Some((path, query)) => (path, Some(query)),
        None => (import_id, None),
    };
    let api_version = match query.and_then(|q| {
        url::form_urlencoded::parse(q.as_bytes())
            .find(|(k, _)| k == "api-version")
            .map(|(_, v)| v.into_owned())
    }) {
        Some(v) if !v.is_empty() => v
            .parse()
            .map_err(|_| Error::InvalidImportId(import_id.to_string()))?,
        _ => ApiVersion::default(),
    };
    let path = path.trim_start_matches('/');
    if path.is_empty() {
        return Err(Error::InvalidImportId(import_id.to_string()));
    }
    Ok((path, api_version))
}

/// Parse `<collection>/<id>` or `<collection>/<id>/$ref`, optionally followed
/// by `?api-version=<version>`.
pub fn parse_import_id(import_id: &str) -> Result<ImportAddress> {
    let (path, api_version) = split_import_id(import_id)?;
    let invalid = || Error::InvalidImportId(import_id.to_string());

    let (collection, id) = ref_base(path).rsplit_once('/').ok_or_else(invalid)?;
    if collection.is_empty() || id.is_empty() {
        return Err(invalid());
    }
    let url = if is_ref(path) {
        format!("{}{}", collection, REF_SUFFIX)
    } else {
        collection.to_string()
    };
    Ok(ImportAddress {
        url,
        id: id.to_string(),
        api_version,
    })
}
