use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use http::header::{HeaderMap, HeaderName, ACCEPT, LINK};
use http::{Method, StatusCode};
use oci_spec::distribution::ErrorResponse;

use crate::config::{Credentials, RegistryConfig};
use crate::errors::{Error, Result};

pub static DOCKER_CONTENT_DIGEST: HeaderName = HeaderName::from_static("docker-content-digest");
pub static DOCKER_DISTRIBUTION_API_VERSION: HeaderName =
    HeaderName::from_static("docker-distribution-api-version");

/// A single call against the upstream Distribution API.
#[derive(Clone, Debug)]
pub struct UpstreamRequest {
    pub method: Method,
    /// Path relative to the registry host, always starting with `/v2/`.
    pub path: String,
    pub query: Vec<(&'static str, String)>,
    pub accept: Option<String>,
    pub credentials: Option<Credentials>,
}

impl UpstreamRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: Vec::new(),
            accept: None,
            credentials: None,
        }
    }

    pub fn accept(mut self, accept: impl Into<String>) -> Self {
        self.accept = Some(accept.into());
        self
    }

    pub fn query(mut self, key: &'static str, value: impl Into<String>) -> Self {
        self.query.push((key, value.into()));
        self
    }
}

/// Fully buffered upstream response.
#[derive(Clone, Debug)]
pub struct UpstreamResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl UpstreamResponse {
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    pub fn header_str(&self, name: &HeaderName) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    pub fn content_digest(&self) -> Option<&str> {
        self.header_str(&DOCKER_CONTENT_DIGEST)
            .filter(|s| !s.is_empty())
    }

    pub fn link(&self) -> Option<&str> {
        self.header_str(&LINK)
    }

    /// Convert a non-2xx response into [`Error::UpstreamStatus`], pulling the first message out
    /// of a distribution-spec error body when there is one.
    pub fn status_error(&self) -> Error {
        Error::UpstreamStatus {
            status: self.status,
            message: distribution_error_message(&self.body),
        }
    }
}

fn distribution_error_message(body: &Bytes) -> Option<String> {
    let response: ErrorResponse = serde_json::from_slice(body).ok()?;
    response.errors().iter().find_map(|info| {
        info.message()
            .clone()
            .filter(|m| !m.is_empty())
            .or_else(|| Some(format!("{:?}", info.code())))
    })
}

/// Transport to the upstream registry.
///
/// Implementations perform exactly one HTTP exchange per call; there is no retry or backoff at
/// this layer or any layer above it.
#[async_trait]
pub trait Upstream: Send + Sync + 'static {
    async fn send(&self, request: UpstreamRequest) -> Result<UpstreamResponse>;
}

/// [`Upstream`] implementation backed by a [`reqwest::Client`].
pub struct HttpUpstream {
    host: String,
    client: reqwest::Client,
}

impl HttpUpstream {
    pub fn new(config: &RegistryConfig) -> Result<Self> {
        if !(config.host.starts_with("http://") || config.host.starts_with("https://")) {
            return Err(Error::InvalidRegistryUrl(config.host.clone()));
        }
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = config.timeout() {
            builder = builder.timeout(timeout);
        }
        Ok(Self {
            host: config.host.trim_end_matches('/').to_string(),
            client: builder.build()?,
        })
    }
}

#[async_trait]
impl Upstream for HttpUpstream {
    async fn send(&self, request: UpstreamRequest) -> Result<UpstreamResponse> {
        let url = format!("{}{}", self.host, request.path);
        tracing::debug!(method = %request.method, %url, "upstream request");

        let mut builder = self.client.request(request.method.clone(), &url);
        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        if let Some(accept) = &request.accept {
            builder = builder.header(ACCEPT, accept.as_str());
        }
        if let Some(credentials) = &request.credentials {
            builder = builder.basic_auth(&credentials.username, Some(&credentials.password));
        }

        let response = builder.send().await?;
        let status = response.status();
        let headers = response.headers().clone();
        let body = if request.method == Method::HEAD {
            Bytes::new()
        } else {
            response.bytes().await?
        };
        tracing::debug!(method = %request.method, %url, %status, "upstream response");

        Ok(UpstreamResponse {
            status,
            headers,
            body,
        })
    }
}

/// Upstream handle bound to one caller's credentials.
///
/// Cheap to clone; every concurrent branch of an aggregation or deletion gets its own copy so
/// nothing mutable is shared between them.
#[derive(Clone)]
pub struct RegistrySession {
    upstream: Arc<dyn Upstream>,
    credentials: Option<Credentials>,
}

impl RegistrySession {
    pub fn new(upstream: Arc<dyn Upstream>, credentials: Option<Credentials>) -> Self {
        Self {
            upstream,
            credentials,
        }
    }

    pub async fn send(&self, mut request: UpstreamRequest) -> Result<UpstreamResponse> {
        request.credentials = self.credentials.clone();
        self.upstream.send(request).await
    }

    /// Check `GET /v2/`.
    pub async fn check_version(&self) -> Result<UpstreamResponse> {
        self.send(UpstreamRequest::new(Method::GET, "/v2/")).await
    }
}
