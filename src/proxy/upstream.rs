//! Outbound HTTP client

use crate::config::UpstreamConfig;
use crate::domain::HttpMethod;
use crate::errors::{Error, Result};
use crate::ssrf::SsrfGuard;
use async_trait::async_trait;
use axum::http::HeaderMap;
use bytes::{Bytes, BytesMut};
use reqwest::dns::{Addrs, Name, Resolve, Resolving};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;
use url::Url;

#[derive(Debug, Clone)]
pub struct UpstreamRequest {
    pub method: HttpMethod,
    pub url: Url,
    pub headers: HeaderMap,
    pub body: Option<Bytes>,
    pub timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct UpstreamResponse {
    pub status: u16,
    pub headers: HeaderMap,
    pub body: Bytes,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum UpstreamError {
    #[error("Upstream request timed out")]
    Timeout,

    #[error("Connection failed: {0}")]
    Connect(String),

    #[error("Failed to read response body: {0}")]
    Body(String),

    #[error("Response body exceeds {limit} bytes")]
    TooLarge { limit: usize },
}

impl UpstreamError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout)
    }
}

#[async_trait]
pub trait UpstreamClient: Send + Sync {
    async fn send(
        &self,
        request: UpstreamRequest,
    ) -> std::result::Result<UpstreamResponse, UpstreamError>;
}

/// reqwest-backed client. Redirects are never followed so a 3xx cannot steer
/// the gateway to an address the SSRF guard did not check.
#[derive(Debug, Clone)]
pub struct ReqwestUpstreamClient {
    client: reqwest::Client,
    max_response_bytes: usize,
}

impl ReqwestUpstreamClient {
    /// Client that resolves hostnames through the operating system
    pub fn new(config: &UpstreamConfig) -> Result<Self> {
        Self::build(config, None)
    }

    /// Client whose hostname lookups go through `guard`, so a connection is
    /// only ever made to an address the guard has vetted
    pub fn with_guard(config: &UpstreamConfig, guard: Arc<SsrfGuard>) -> Result<Self> {
        Self::build(config, Some(Arc::new(GuardedResolver { guard })))
    }

    fn build(config: &UpstreamConfig, resolver: Option<Arc<GuardedResolver>>) -> Result<Self> {
        let mut builder = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .timeout(config.request_timeout())
            .pool_idle_timeout(Duration::from_secs(config.pool_idle_timeout_seconds))
            .user_agent(config.user_agent.clone());
        if let Some(resolver) = resolver {
            builder = builder.dns_resolver(resolver);
        }
        let client = builder
            .build()
            .map_err(|e| Error::transport(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { client, max_response_bytes: config.max_response_bytes })
    }
}

/// reqwest resolver that only yields addresses outside the guard's blocked ranges
struct GuardedResolver {
    guard: Arc<SsrfGuard>,
}

impl Resolve for GuardedResolver {
    fn resolve(&self, name: Name) -> Resolving {
        let guard = self.guard.clone();
        Box::pin(async move {
            // the connector substitutes the URL's port
            let addrs = guard.resolve_checked(name.as_str(), 0).await?;
            let addrs: Addrs = Box::new(addrs.into_iter().map(|ip| SocketAddr::new(ip, 0)));
            Ok::<_, Box<dyn std::error::Error + Send + Sync>>(addrs)
        })
    }
}

#[async_trait]
impl UpstreamClient for ReqwestUpstreamClient {
    async fn send(
        &self,
        request: UpstreamRequest,
    ) -> std::result::Result<UpstreamResponse, UpstreamError> {
        let mut builder = self
            .client
            .request(request.method.to_http(), request.url)
            .headers(request.headers)
            .timeout(request.timeout);
        if let Some(body) = request.body {
            builder = builder.body(body);
        }

        let mut response = builder.send().await.map_err(|e| {
            if e.is_timeout() {
                UpstreamError::Timeout
            } else {
                UpstreamError::Connect(e.to_string())
            }
        })?;

        let status = response.status().as_u16();
        let headers = response.headers().clone();

        if response.content_length().is_some_and(|len| len > self.max_response_bytes as u64) {
            return Err(UpstreamError::TooLarge { limit: self.max_response_bytes });
        }

        let mut body = BytesMut::new();
        while let Some(chunk) = response.chunk().await.map_err(|e| {
            if e.is_timeout() {
                UpstreamError::Timeout
            } else {
                UpstreamError::Body(e.to_string())
            }
        })? {
            if body.len() + chunk.len() > self.max_response_bytes {
                return Err(UpstreamError::TooLarge { limit: self.max_response_bytes });
            }
            body.extend_from_slice(&chunk);
        }

        debug!(status, body_length = body.len(), "Upstream response received");
        Ok(UpstreamResponse { status, headers, body: body.freeze() })
    }
}
