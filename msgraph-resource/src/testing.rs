use std::{collections::VecDeque, sync::Mutex, time::Duration};

use async_trait::async_trait;
use serde_json::Value;

use crate::{
    client::{ApiVersion, GraphClient, Method, RequestOptions},
    error::ClientError,
};

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Call {
    pub method: Method,
    pub url: String,
    pub api_version: ApiVersion,
    pub body: Option<Value>,
    pub options: RequestOptions,
}

/// A client that records requests and answers them from a script.
///
/// Requests beyond the script are answered with `null`.
pub(crate) struct FakeClient {
    calls: Mutex<Vec<Call>>,
    responses: Mutex<VecDeque<Result<Value, ClientError>>>,
    delay: Option<Duration>,
}

impl FakeClient {
    pub fn new(responses: impl IntoIterator<Item = Result<Value, ClientError>>) -> Self {
        FakeClient {
            calls: Mutex::new(Vec::new()),
            responses: Mutex::new(responses.into_iter().collect()),
            delay: None,
        }
    }

    /// Answer every request after `delay`.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn requests(&self) -> Vec<(Method, String)> {
        self.calls()
            .into_iter()
            .map(|c| (c.method, c.url))
            .collect()
    }

    async fn respond(
        &self,
        method: Method,
        url: &str,
        api_version: ApiVersion,
        body: Option<&Value>,
        options: &RequestOptions,
    ) -> Result<Value, ClientError> {
        self.calls.lock().unwrap().push(Call {
            method,
            url: url.to_string(),
            api_version,
            body: body.cloned(),
            options: options.clone(),
        });
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Ok(Value::Null))
    }
}

pub(crate) fn not_found() -> ClientError {
    ClientError::Response {
        status: 404,
        code: "Request_ResourceNotFound".to_string(),
        message: "Resource does not exist or one of its queried reference-property objects are not present.".to_string(),
    }
}

pub(crate) fn bad_request(message: &str) -> ClientError {
    ClientError::Response {
        status: 400,
        code: "Request_BadRequest".to_string(),
        message: message.to_string(),
    }
}

#[async_trait]
impl GraphClient for FakeClient {
    fn host(&self) -> &str {
        "https://graph.microsoft.com"
    }

    async fn read(
        &self,
        url: &str,
        api_version: ApiVersion,
        options: &RequestOptions,
    ) -> Result<Value, ClientError> {
        self.respond(Method::Get, url, api_version, None, options)
            .await
    }

    async fn create(
        &self,
        url: &str,
        api_version: ApiVersion,
        body: &Value,
        options: &RequestOptions,
    ) -> Result<Value, ClientError> {
        self.respond(Method::Post, url, api_version, Some(body), options)
            .await
    }

    async fn update(
        &self,
        url: &str,
        api_version: ApiVersion,
        body: &Value,
        options: &RequestOptions,
    ) -> Result<Value, ClientError> {
        self.respond(Method::Patch, url, api_version, Some(body), options)
            .await
    }

    async fn delete(
        &self,
        url: &str,
        api_version: ApiVersion,
        options: &RequestOptions,
    ) -> Result<(), ClientError> {
        self.respond(Method::Delete, url, api_version, None, options)
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
        self.respond(method, url, api_version, body, options).await
    }

    async fn list(
        &self,
        url: &str,
        api_version: ApiVersion,
        options: &RequestOptions,
    ) -> Result<Vec<Value>, ClientError> {
        match self
            .respond(Method::Get, url, api_version, None, options)
            .await?
        {
            Value::Array(items) => Ok(items),
            Value::Null => Ok(Vec::new()),
            other => Err(ClientError::Decode(format!("not a list: {}", other))),
        }
    }
}
