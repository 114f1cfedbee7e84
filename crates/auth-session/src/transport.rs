//! Transport boundary: request templates, responses, and the HTTP client seam.

use crate::{AuthError, AuthResult};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use std::collections::BTreeMap;
use tracing::debug;

pub use reqwest::Method;

/// An outbound request template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestConfig {
    pub method: Method,
    pub url: String,
    pub headers: BTreeMap<String, String>,
    pub body: Option<String>,
    /// Storage key of the session that decorated this request. Responses are
    /// routed back to their session through this tag.
    pub session_key: Option<String>,
}

impl RequestConfig {
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: BTreeMap::new(),
            body: None,
            session_key: None,
        }
    }

    pub fn get(url: impl Into<String>) -> Self {
        Self::new(Method::GET, url)
    }

    pub fn post(url: impl Into<String>) -> Self {
        Self::new(Method::POST, url)
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = Some(body.into());
        self
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).map(String::as_str)
    }
}

/// A response together with the request that produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
    pub config: RequestConfig,
}

impl HttpResponse {
    pub fn new(status: u16, body: impl Into<String>, config: RequestConfig) -> Self {
        Self {
            status,
            body: body.into(),
            config,
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Decode the body as JSON.
    pub fn json<T: DeserializeOwned>(&self) -> AuthResult<T> {
        Ok(serde_json::from_str(&self.body)?)
    }
}

/// Issues a request described by a [`RequestConfig`].
///
/// Non-2xx statuses are responses, not errors. `Err` means no response was
/// received at all.
#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn send(&self, config: &RequestConfig) -> AuthResult<HttpResponse>;
}

/// [`HttpTransport`] backed by reqwest.
#[derive(Debug, Clone, Default)]
pub struct ReqwestTransport {
    http_client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a custom HTTP client (for connection pool reuse or proxies).
    pub fn with_http_client(http_client: reqwest::Client) -> Self {
        Self { http_client }
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn send(&self, config: &RequestConfig) -> AuthResult<HttpResponse> {
        debug!(method = %config.method, url = %config.url, "Sending request");

        let mut request = self
            .http_client
            .request(config.method.clone(), &config.url);
        for (name, value) in &config.headers {
            request = request.header(name.as_str(), value.as_str());
        }
        if let Some(body) = &config.body {
            request = request.body(body.clone());
        }

        let response = request.send().await.map_err(AuthError::Http)?;
        let status = response.status().as_u16();
        let body = response.text().await?;

        Ok(HttpResponse::new(status, body, config.clone()))
    }
}
