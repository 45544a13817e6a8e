//! HTTP execution
//!
//! [`Client`] is cheap to clone and safe to share; every clone talks to the
//! same base URL with the same credential. Requests run on spawned tokio
//! tasks, so a live runtime is required, and complete through promises
//! rather than awaitable futures — the feed layer is callback-driven.

use std::time::Duration;

use reqwest::header::LINK;
use reqwest::Method;
use serde::de::DeserializeOwned;
use thiserror::Error;
use tracing::debug;
use url::Url;

use super::pagination::{Page, Pagination, RequestRange};
use crate::signal::Promise;

/// Errors from the REST surface.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("invalid url: {0}")]
    Url(#[from] url::ParseError),

    #[error("http transport error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("server returned status {status} for {endpoint}")]
    Api { status: u16, endpoint: String },

    #[error("response decoding error: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("operation requires an access credential")]
    MissingToken,
}

/// Result type for REST operations.
pub type Result<T> = std::result::Result<T, ClientError>;

/// Configuration for a [`Client`].
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// User agent presented to the server.
    pub user_agent: String,
    /// Per-request timeout.
    pub request_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            user_agent: concat!("fedistream/", env!("CARGO_PKG_VERSION")).to_string(),
            request_timeout: Duration::from_secs(30),
        }
    }
}

/// A description of one API call, independent of any client.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub(crate) method: Method,
    pub(crate) path: String,
    pub(crate) query: Vec<(String, String)>,
    pub(crate) form: Vec<(String, String)>,
}

impl ApiRequest {
    pub fn get(path: impl Into<String>) -> Self {
        Self {
            method: Method::GET,
            path: path.into(),
            query: Vec::new(),
            form: Vec::new(),
        }
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self {
            method: Method::POST,
            path: path.into(),
            query: Vec::new(),
            form: Vec::new(),
        }
    }

    pub fn query(mut self, key: &str, value: impl Into<String>) -> Self {
        self.query.push((key.to_string(), value.into()));
        self
    }

    pub fn form(mut self, key: &str, value: impl Into<String>) -> Self {
        self.form.push((key.to_string(), value.into()));
        self
    }

    /// Address a page of a paged endpoint.
    pub fn range(mut self, range: &RequestRange) -> Self {
        if let RequestRange::Cursor(cursor) = range {
            cursor.apply(&mut self.query);
        }
        self
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn query_params(&self) -> &[(String, String)] {
        &self.query
    }

    pub fn form_params(&self) -> &[(String, String)] {
        &self.form
    }
}

/// HTTP client bound to one instance and, optionally, one access credential.
#[derive(Clone)]
pub struct Client {
    http: reqwest::Client,
    base_url: Url,
    access_token: Option<String>,
}

impl Client {
    /// Anonymous client for `base_url` (e.g. `https://example.social`).
    pub fn new(base_url: &str) -> Result<Self> {
        Self::build(base_url, None, ClientConfig::default())
    }

    /// Credentialed client.
    pub fn with_token(base_url: &str, access_token: impl Into<String>) -> Result<Self> {
        Self::build(base_url, Some(access_token.into()), ClientConfig::default())
    }

    pub fn build(
        base_url: &str,
        access_token: Option<String>,
        config: ClientConfig,
    ) -> Result<Self> {
        // `Url::join` treats a base without a trailing slash as a file.
        let normalized = if base_url.ends_with('/') {
            base_url.to_string()
        } else {
            format!("{base_url}/")
        };
        let base_url = Url::parse(&normalized)?;

        let http = reqwest::Client::builder()
            .user_agent(&config.user_agent)
            .timeout(config.request_timeout)
            .build()?;

        Ok(Self {
            http,
            base_url,
            access_token,
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub fn access_token(&self) -> Option<&str> {
        self.access_token.as_deref()
    }

    /// Run a request, decoding the body into `T`.
    pub fn run<T>(&self, request: ApiRequest) -> Promise<T>
    where
        T: DeserializeOwned + Clone + Send + Sync + 'static,
    {
        let promise = Promise::new();
        let client = self.clone();
        let target = promise.clone();
        tokio::spawn(async move {
            match client.execute::<T>(request).await {
                Ok((value, _)) => target.forward(value),
                Err(err) => target.throw(err),
            }
        });
        promise
    }

    /// Run a request against a paged endpoint, decoding the body into a list
    /// of `T` and the `Link` header into the page's cursors.
    pub fn run_paginated<T>(&self, request: ApiRequest) -> Promise<Page<T>>
    where
        T: DeserializeOwned + Clone + Send + Sync + 'static,
    {
        let promise = Promise::new();
        let client = self.clone();
        let target = promise.clone();
        tokio::spawn(async move {
            match client.execute::<Vec<T>>(request).await {
                Ok((items, pagination)) => target.forward(Page::new(items, pagination)),
                Err(err) => target.throw(err),
            }
        });
        promise
    }

    async fn execute<T: DeserializeOwned>(&self, request: ApiRequest) -> Result<(T, Pagination)> {
        let url = self.base_url.join(&request.path)?;
        debug!(method = %request.method, %url, "api request");

        let mut builder = self.http.request(request.method, url);
        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        if !request.form.is_empty() {
            builder = builder.form(&request.form);
        }
        if let Some(token) = &self.access_token {
            builder = builder.bearer_auth(token);
        }

        let response = builder.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(ClientError::Api {
                status: status.as_u16(),
                endpoint: request.path,
            });
        }

        let pagination = response
            .headers()
            .get(LINK)
            .and_then(|value| value.to_str().ok())
            .map(Pagination::from_link_header)
            .unwrap_or_default();

        let body = response.bytes().await?;
        let value = serde_json::from_slice(&body)?;
        Ok((value, pagination))
    }
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("base_url", &self.base_url.as_str())
            .field("authenticated", &self.access_token.is_some())
            .finish()
    }
}
