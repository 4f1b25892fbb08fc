use std::{collections::BTreeMap, fmt, str::FromStr};

use async_trait::async_trait;
use serde_json::Value;

use crate::{error::ClientError, retry::RetryPolicy};

/// Query parameters; a name may be repeated.
pub type QueryParameters = BTreeMap<String, Vec<String>>;

/// The Graph API version a request is sent to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum ApiVersion {
    #[default]
    #[serde(rename = "v1.0")]
    V1,
    #[serde(rename = "beta")]
    Beta,
}

impl ApiVersion {
    pub fn as_str(&self) -> &'static str {
        match self {
            ApiVersion::V1 => "v1.0",
            ApiVersion::Beta => "beta",
        }
    }
}

impl fmt::Display for ApiVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ApiVersion {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "v1.0" => Ok(ApiVersion::V1),
            "beta" => Ok(ApiVersion::Beta),
            _ => Err(format!(
                "unsupported api version {:?}, expected \"v1.0\" or \"beta\"",
                s
            )),
        }
    }
}

/// HTTP methods an action may use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Post,
    Patch,
    Put,
    Delete,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Patch => "PATCH",
            Method::Put => "PUT",
            Method::Delete => "DELETE",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Method {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "GET" => Ok(Method::Get),
            "POST" => Ok(Method::Post),
            "PATCH" => Ok(Method::Patch),
            "PUT" => Ok(Method::Put),
            "DELETE" => Ok(Method::Delete),
            _ => Err(format!(
                "unsupported method {:?}, expected one of GET, POST, PATCH, PUT, DELETE",
                s
            )),
        }
    }
}

/// Per-request settings.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RequestOptions {
    pub headers: BTreeMap<String, String>,
    pub query_parameters: QueryParameters,
    /// Error messages that warrant another attempt.
    pub retry: Option<RetryPolicy>,
    /// Whether [`Self::retry`] applies to 404 responses. Off except when
    /// reading back an object that was just created.
    pub retry_not_found: bool,
}

impl RequestOptions {
    pub fn new(headers: &BTreeMap<String, String>, query_parameters: &QueryParameters) -> Self {
        RequestOptions {
            headers: headers.clone(),
            query_parameters: query_parameters.clone(),
            retry: None,
            retry_not_found: false,
        }
    }

    pub fn with_retry(mut self, retry: Option<RetryPolicy>) -> Self {
        self.retry = retry;
        self
    }

    pub fn retrying_not_found(mut self) -> Self {
        self.retry_not_found = true;
        self
    }
}

/// Access to the Microsoft Graph API.
///
/// `url` arguments are relative to `<host>/<api_version>/`. Implementations
/// are responsible for authentication, paging and retrying according to
/// [`RequestOptions::retry`]. A 404 is only retried when
/// [`RequestOptions::retry_not_found`] is set.
#[async_trait]
pub trait GraphClient: Send + Sync {
    /// The scheme and authority requests go to, e.g. `https://graph.microsoft.com`.
    fn host(&self) -> &str;

    async fn read(
        &self,
        url: &str,
        api_version: ApiVersion,
        options: &RequestOptions,
    ) -> Result<Value, ClientError>;

    async fn create(
        &self,
        url: &str,
        api_version: ApiVersion,
        body: &Value,
        options: &RequestOptions,
    ) -> Result<Value, ClientError>;

    async fn update(
        &self,
        url: &str,
        api_version: ApiVersion,
        body: &Value,
        options: &RequestOptions,
    ) -> Result<Value, ClientError>;

    async fn delete(
        &self,
        url: &str,
        api_version: ApiVersion,
        options: &RequestOptions,
    ) -> Result<(), ClientError>;

    async fn action(
        &self,
        method: Method,
        url: &str,
        api_version: ApiVersion,
        body: Option<&Value>,
        options: &RequestOptions,
    ) -> Result<Value, ClientError>;

    /// Read a collection, following `@odata.nextLink`, and return the items of
    /// every page.
    async fn list(
        &self,
        url: &str,
        api_version: ApiVersion,
        options: &RequestOptions,
    ) -> Result<Vec<Value>, ClientError>;
}
