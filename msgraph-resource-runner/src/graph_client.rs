//! [`GraphClient`] over HTTP.

use std::time::Duration;

use async_trait::async_trait;
use msgraph_resource::{
    client::{ApiVersion, GraphClient, Method, RequestOptions},
    ClientError,
};
use reqwest::{header, StatusCode};
use serde_json::Value;

/// How often and how patiently failed requests are retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetrySettings {
    /// Attempts after a throttling or server error, on top of the first.
    pub max_transient_retries: u32,
    /// First back-off delay; it doubles after each attempt.
    pub initial_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetrySettings {
    fn default() -> Self {
        RetrySettings {
            max_transient_retries: 3,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
        }
    }
}

/// The statuses that count as success for a kind of request.
#[derive(Debug, Clone, Copy)]
enum Expect {
    Read,
    Create,
    Update,
    Delete,
    AnySuccess,
}

impl Expect {
    fn accepts(self, status: StatusCode) -> bool {
        let code = status.as_u16();
        match self {
            Expect::Read => code == 200,
            Expect::Create => matches!(code, 200 | 201 | 202 | 204),
            Expect::Update => matches!(code, 200 | 202 | 204),
            Expect::Delete => code == 204,
            Expect::AnySuccess => status.is_success(),
        }
    }
}

struct Failure {
    error: ClientError,
    retry_after: Option<Duration>,
}

impl From<ClientError> for Failure {
    fn from(error: ClientError) -> Self {
        Failure {
            error,
            retry_after: None,
        }
    }
}

pub struct HttpGraphClient {
    http: reqwest::Client,
    host: String,
    token: Option<String>,
    retry: RetrySettings,
}

impl HttpGraphClient {
    pub fn new(host: &str, token: Option<String>) -> Self {
        HttpGraphClient {
            http: reqwest::Client::new(),
            host: host.trim_end_matches('/').to_string(),
            token,
            retry: RetrySettings::default(),
        }
    }

    pub fn with_retry_settings(mut self, retry: RetrySettings) -> Self {
        self.retry = retry;
        self
    }

    fn url(&self, url: &str, api_version: ApiVersion) -> String {
        if url.starts_with("https://") || url.starts_with("http://") {
            url.to_string()
        } else {
            format!(
                "{}/{}/{}",
                self.host,
                api_version,
                url.trim_start_matches('/')
            )
        }
    }

    async fn send(
        &self,
        method: Method,
        url: &str,
        body: Option<&Value>,
        options: &RequestOptions,
        expect: Expect,
    ) -> Result<Value, ClientError> {
        let mut transient_retries = 0;
        let mut delay = self.retry.initial_delay;
        loop {
            let failure = match self.send_once(method, url, body, options, expect).await {
                Ok(value) => return Ok(value),
                Err(failure) => failure,
            };
            let wait = if is_transient(&failure.error)
                && transient_retries < self.retry.max_transient_retries
            {
                transient_retries += 1;
                failure.retry_after.unwrap_or(delay)
            } else if (options.retry_not_found || !failure.error.is_not_found())
                && options
                    .retry
                    .as_ref()
                    .is_some_and(|policy| policy.matches(&failure.error.to_string()))
            {
                delay
            } else {
                return Err(failure.error);
            };
            tracing::debug!(
                "Retrying {} {} in {:?} after: {}",
                method,
                url,
                wait,
                failure.error
            );
            tokio::time::sleep(wait).await;
            delay = (delay * 2).min(self.retry.max_delay);
        }
    }

    async fn send_once(
        &self,
        method: Method,
        url: &str,
        body: Option<&Value>,
        options: &RequestOptions,
        expect: Expect,
    ) -> Result<Value, Failure> {
        let mut request = self
            .http
            .request(to_reqwest(method), url)
            .header(header::ACCEPT, "application/json");
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }
        for (name, value) in &options.headers {
            request = request.header(name, value);
        }
        let query: Vec<(&str, &str)> = options
            .query_parameters
            .iter()
            .flat_map(|(name, values)| values.iter().map(move |v| (name.as_str(), v.as_str())))
            .collect();
        if !query.is_empty() {
            request = request.query(&query);
        }
        if let Some(body) = body {
            request = request.json(body);
        }

        tracing::debug!("{} {}", method, url);
        let response = request
            .send()
            .await
            .map_err(|e| ClientError::Transport(e.to_string()))?;
        let status = response.status();
        let retry_after = retry_after(response.headers());
        let text = response
            .text()
            .await
            .map_err(|e| ClientError::Transport(e.to_string()))?;

        if !expect.accepts(status) {
            return Err(Failure {
                error: decode_error(status, &text),
                retry_after,
            });
        }
        if text.trim().is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_str(&text).map_err(|e| {
            Failure::from(ClientError::Decode(format!(
                "response to {} {} is not JSON: {}",
                method, url, e
            )))
        })
    }
}

fn to_reqwest(method: Method) -> reqwest::Method {
    match method {
        Method::Get => reqwest::Method::GET,
        Method::Post => reqwest::Method::POST,
        Method::Patch => reqwest::Method::PATCH,
        Method::Put => reqwest::Method::PUT,
        Method::Delete => reqwest::Method::DELETE,
    }
}

fn is_transient(error: &ClientError) -> bool {
    matches!(error.status(), Some(408 | 429 | 500 | 502 | 503 | 504))
}

/// `Retry-After` in its delay-seconds form.
fn retry_after(headers: &header::HeaderMap) -> Option<Duration> {
    headers
        .get(header::RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}

/// Decode a Graph error body, `{"error": {"code": ..., "message": ...}}`.
fn decode_error(status: StatusCode, body: &str) -> ClientError {
    let error = serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|mut v| v.get_mut("error").map(Value::take));
    let field = |name: &str| {
        error
            .as_ref()
            .and_then(|e| e.get(name))
            .and_then(Value::as_str)
            .map(str::to_string)
    };
    ClientError::Response {
        status: status.as_u16(),
        code: field("code")
            .unwrap_or_else(|| status.canonical_reason().unwrap_or("Unknown").to_string()),
        message: field("message").unwrap_or_else(|| body.to_string()),
    }
}

#[async_trait]
impl GraphClient for HttpGraphClient {
    fn host(&self) -> &str {
        &self.host
    }

    async fn read(
        &self,
        url: &str,
        api_version: ApiVersion,
        options: &RequestOptions,
    ) -> Result<Value, ClientError> {
        let url = self.url(url, api_version);
        self.send(Method::Get, &url, None, options, Expect::Read)
            .await
    }

    async fn create(
        &self,
        url: &str,
        api_version: ApiVersion,
        body: &Value,
        options: &RequestOptions,
    ) -> Result<Value, ClientError> {
        let url = self.url(url, api_version);
        self.send(Method::Post, &url, Some(body), options, Expect::Create)
            .await
    }

    async fn update(
        &self,
        url: &str,
        api_version: ApiVersion,
        body: &Value,
        options: &RequestOptions,
    ) -> Result<Value, ClientError> {
        let url = self.url(url, api_version);
        self.send(Method::Patch, &url, Some(body), options, Expect::Update)
            .await
    }

    async fn delete(
        &self,
        url: &str,
        api_version: ApiVersion,
        options: &RequestOptions,
    ) -> Result<(), ClientError> {
        let url = self.url(url, api_version);
        self.send(Method::Delete, &url, None, options, Expect::Delete)
            .await
            .map(|_| ())
    }

    async fn action(
        &self,
        method: Method,
        url: &str,
        api_version: ApiVersion,
        body: Option<&Value>,
        options: &RequestOptions,
    ) -> Result<Value, ClientError> {
        let url = self.url(url, api_version);
        self.send(method, &url, body, options, Expect::AnySuccess)
            .await
    }

    async fn list(
        &self,
        url: &str,
        api_version: ApiVersion,
        options: &RequestOptions,
    ) -> Result<Vec<Value>, ClientError> {
        let mut items = Vec::new();
        let mut next = self.url(url, api_version);
        let mut options = options.clone();
        loop {
            let mut page = self
                .send(Method::Get, &next, None, &options, Expect::Read)
                .await?;
            let next_link = page
                .get("@odata.nextLink")
                .and_then(Value::as_str)
                .map(str::to_string);
            match page.get_mut("value").map(Value::take) {
                Some(Value::Array(values)) => items.extend(values),
                _ => {
                    return Err(ClientError::Decode(format!(
                        "response to GET {} has no value array",
                        next
                    )))
                }
            }
            match next_link {
                Some(link) => {
                    // The link carries the query of the first request.
                    options.query_parameters.clear();
                    next = link;
                }
                None => return Ok(items),
            }
        }
    }
}
