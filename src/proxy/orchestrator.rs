//! Per-request pipeline
//!
//! Route match, authorization, cache lookup, SSRF check on the resolved
//! upstream URL, then a retry loop in which every attempt asks the breaker
//! for admission, injects credentials and makes the call. Each attempt's
//! outcome is reported to the breaker. The response is transformed, cached
//! when eligible and returned.

use super::credentials::CredentialInjector;
use super::error::GatewayError;
use super::retry::calculate_backoff;
use super::upstream::{UpstreamClient, UpstreamError, UpstreamRequest, UpstreamResponse};
use crate::cache::{CacheKey, CachedResponse, ResponseCache};
use crate::circuit_breaker::{CallOutcome, CircuitBreakerRegistry};
use crate::config::AppConfig;
use crate::domain::{
    CallerContext, Connector, ConnectorId, HttpMethod, Route, RouteId, CORRELATION_HEADER,
};
use crate::observability::MetricsRecorder;
use crate::routing::{template, RouteMatch, RouteMatcher};
use crate::secrets::SecretResolver;
use crate::ssrf::SsrfGuard;
use crate::store::{AuditEvent, AuditOutcome, AuditSink, ConfigStore};
use crate::transform::{Transform, TransformError};
use axum::http::header::{CONTENT_TYPE, ETAG, USER_AGENT};
use axum::http::{HeaderMap, HeaderName, HeaderValue, StatusCode};
use bytes::Bytes;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn, Instrument};
use url::Url;

/// Inbound headers forwarded to the upstream
pub const FORWARDED_REQUEST_HEADERS: &[&str] = &[
    "accept",
    "accept-language",
    "content-type",
    "user-agent",
    "if-none-match",
    "if-modified-since",
];

/// Upstream headers relayed to the caller
pub const RELAYED_RESPONSE_HEADERS: &[&str] = &[
    "content-type",
    "cache-control",
    "etag",
    "last-modified",
    "content-language",
    "expires",
    "vary",
    "retry-after",
];

/// Reports whether the response came from the cache
pub const CACHE_STATUS_HEADER: &str = "x-cache";

#[derive(Debug, Clone)]
pub struct PipelineSettings {
    /// Bound on the whole pipeline for one inbound request
    pub request_deadline: Duration,
    /// Per-attempt timeout for connectors without their own
    pub default_timeout: Duration,
    /// Bound on a single cache round trip
    pub cache_timeout: Duration,
    pub max_cache_entry_bytes: usize,
    pub user_agent: String,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            request_deadline: Duration::from_secs(30),
            default_timeout: Duration::from_secs(10),
            cache_timeout: Duration::from_millis(250),
            max_cache_entry_bytes: 1024 * 1024,
            user_agent: format!("flowgate/{}", crate::VERSION),
        }
    }
}

impl PipelineSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            request_deadline: config.server.request_deadline(),
            default_timeout: config.upstream.request_timeout(),
            cache_timeout: config.cache.store_timeout(),
            max_cache_entry_bytes: config.cache.max_entry_bytes,
            user_agent: config.upstream.user_agent.clone(),
        }
    }
}

/// An authenticated inbound call
#[derive(Debug, Clone)]
pub struct ProxyRequest {
    pub caller: CallerContext,
    pub method: HttpMethod,
    /// Full inbound path including the module prefix, e.g. `/api/posts/1`
    pub path: String,
    pub query: Option<String>,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl ProxyRequest {
    pub fn new(caller: CallerContext, method: HttpMethod, path: impl Into<String>) -> Self {
        Self {
            caller,
            method,
            path: path.into(),
            query: None,
            headers: HeaderMap::new(),
            body: Bytes::new(),
        }
    }

    pub fn with_query(mut self, query: impl Into<String>) -> Self {
        self.query = Some(query.into());
        self
    }

    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        self.headers = headers;
        self
    }

    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheStatus {
    Hit,
    Miss,
    /// Route or method not cacheable
    Bypass,
}

#[derive(Debug, Clone)]
pub struct ProxyResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
    pub cache_status: CacheStatus,
}

impl ProxyResponse {
    fn from_cached(cached: CachedResponse) -> Self {
        let mut headers = HeaderMap::new();
        for (name, value) in &cached.headers {
            let parsed = (HeaderName::from_bytes(name.as_bytes()), HeaderValue::from_str(value));
            if let (Ok(name), Ok(value)) = parsed {
                headers.append(name, value);
            }
        }
        headers.insert(axum::http::header::AGE, HeaderValue::from(cached.age_seconds()));
        Self {
            status: StatusCode::from_u16(cached.status).unwrap_or(StatusCode::OK),
            headers,
            body: cached.body,
            cache_status: CacheStatus::Hit,
        }
    }

    fn to_cached(&self) -> CachedResponse {
        let headers = self
            .headers
            .iter()
            .filter(|(name, _)| name.as_str() != CACHE_STATUS_HEADER)
            .filter_map(|(name, value)| {
                value.to_str().ok().map(|v| (name.as_str().to_string(), v.to_string()))
            })
            .collect();
        CachedResponse::new(self.status.as_u16(), headers, self.body.clone())
    }
}

/// Collaborators wired into the pipeline at startup
#[derive(Clone)]
pub struct GatewayComponents {
    pub store: Arc<dyn ConfigStore>,
    pub guard: Arc<SsrfGuard>,
    pub breakers: Arc<CircuitBreakerRegistry>,
    pub secrets: SecretResolver,
    pub cache: Arc<dyn ResponseCache>,
    pub upstream: Arc<dyn UpstreamClient>,
    pub audit: Arc<dyn AuditSink>,
}

/// Route, connector and per-step facts collected for the audit record
#[derive(Debug, Default)]
struct Trace {
    route: Option<(RouteId, ConnectorId)>,
}

pub struct ProxyOrchestrator {
    matcher: RouteMatcher,
    guard: Arc<SsrfGuard>,
    breakers: Arc<CircuitBreakerRegistry>,
    credentials: CredentialInjector,
    cache: Arc<dyn ResponseCache>,
    upstream: Arc<dyn UpstreamClient>,
    audit: Arc<dyn AuditSink>,
    metrics: MetricsRecorder,
    settings: PipelineSettings,
}

impl ProxyOrchestrator {
    pub fn new(components: GatewayComponents, settings: PipelineSettings) -> Self {
        let credentials = CredentialInjector::new(
            components.secrets,
            components.guard.clone(),
            components.upstream.clone(),
        );
        Self {
            matcher: RouteMatcher::new(components.store),
            guard: components.guard,
            breakers: components.breakers,
            credentials,
            cache: components.cache,
            upstream: components.upstream,
            audit: components.audit,
            metrics: MetricsRecorder::new(),
            settings,
        }
    }

    pub fn breakers(&self) -> &Arc<CircuitBreakerRegistry> {
        &self.breakers
    }

    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    /// Run the pipeline for one request under the request deadline.
    ///
    /// Every call produces exactly one audit event and one request metric,
    /// unless the caller goes away and this future is dropped.
    pub async fn handle(&self, request: ProxyRequest) -> Result<ProxyResponse, GatewayError> {
        let started = Instant::now();
        let mut trace = Trace::default();

        let deadline = self.settings.request_deadline;
        let result = match tokio::time::timeout(deadline, self.run(&request, &mut trace)).await {
            Ok(result) => result,
            Err(_) => Err(GatewayError::DeadlineExceeded),
        };

        let (outcome, status) = match &result {
            Ok(response) if response.cache_status == CacheStatus::Hit => {
                (AuditOutcome::CacheHit, response.status.as_u16())
            }
            Ok(response) if response.status.is_server_error() => {
                (AuditOutcome::Failure, response.status.as_u16())
            }
            Ok(response) => (AuditOutcome::Success, response.status.as_u16()),
            Err(err) => (err.audit_outcome(), err.status_code().as_u16()),
        };

        if let Err(err) = &result {
            log_failure(err, &request);
        }

        let elapsed = started.elapsed();
        self.metrics.record_proxied_request(
            request.caller.tenant_id.as_str(),
            outcome.as_str(),
            status,
            elapsed.as_secs_f64(),
        );

        let mut event = AuditEvent::new(
            request.caller.tenant_id.clone(),
            request.method,
            request.path.clone(),
            request.caller.correlation_id.clone(),
        );
        if let Some((route_id, connector_id)) = trace.route {
            event = event.with_route(route_id, connector_id);
        }
        self.audit.record(event.finish(outcome, status, elapsed)).await;

        result
    }

    async fn run(
        &self,
        request: &ProxyRequest,
        trace: &mut Trace,
    ) -> Result<ProxyResponse, GatewayError> {
        let caller = &request.caller;
        let RouteMatch { route, connector, params } =
            self.matcher.find(&caller.tenant_id, request.method, &request.path).await?;
        trace.route = Some((route.id.clone(), connector.id.clone()));

        authorize(&route, caller)?;

        let request_transform = compile_transform(&route, route.request_transform.as_ref())?;
        let response_transform = compile_transform(&route, route.response_transform.as_ref())?;

        let query_params = parse_query(request.query.as_deref());
        let cache_key = (route.is_cacheable() && request.method == HttpMethod::Get)
            .then(|| CacheKey::for_request(&route, request.method, &params, &query_params));

        if let Some(key) = &cache_key {
            if let Some(cached) = self.cache_lookup(key).await {
                debug!(route_id = %route.id, "Serving cached response");
                let mut response = ProxyResponse::from_cached(cached);
                response.headers.insert(CACHE_STATUS_HEADER, HeaderValue::from_static("HIT"));
                return Ok(response);
            }
        }

        let upstream_path = template::render(&route.upstream_path, &params)
            .map_err(|e| GatewayError::internal(format!("route '{}': {}", route.id, e)))?;
        let raw_url =
            template::upstream_url(&connector.base_url, &upstream_path, request.query.as_deref());
        let url = self.guard.validate(&raw_url).await.map_err(|e| {
            self.metrics.record_ssrf_rejection();
            GatewayError::from(e)
        })?;

        let (body, json_body) = prepare_body(&route, request, request_transform.as_ref(), &params)?;
        let headers = self.forward_headers(request, json_body);

        let upstream = self.call_upstream(&connector, request.method, url, headers, body).await?;
        let mut response = relay(upstream, &route, response_transform.as_ref(), &params)?;

        match cache_key {
            Some(key) => {
                response.headers.insert(CACHE_STATUS_HEADER, HeaderValue::from_static("MISS"));
                response.cache_status = CacheStatus::Miss;
                if response.status.is_success() {
                    self.cache_store(key, &response, route.cache.ttl()).await;
                }
            }
            None => response.cache_status = CacheStatus::Bypass,
        }

        Ok(response)
    }

    /// The retry loop. Each pass is one decision: breaker admission,
    /// credentials, the call, and the outcome report.
    async fn call_upstream(
        &self,
        connector: &Connector,
        method: HttpMethod,
        url: Url,
        headers: HeaderMap,
        body: Option<Bytes>,
    ) -> Result<UpstreamResponse, GatewayError> {
        let timeout = connector.timeout(self.settings.default_timeout);
        let attempts = if method.is_idempotent() { connector.retry.attempts() } else { 1 };
        let connector_label = connector.id.as_str();

        let mut attempt: u32 = 1;
        loop {
            let permit = self.breakers.try_acquire(&connector.id, &connector.circuit_breaker)?;

            let mut request_headers = headers.clone();
            for (name, value) in self.credentials.headers_for(connector, timeout).await?.iter() {
                request_headers.insert(name.clone(), value.clone());
            }

            let request = UpstreamRequest {
                method,
                url: url.clone(),
                headers: request_headers,
                body: body.clone(),
                timeout,
            };

            let span = crate::upstream_span!(connector.id, attempt);
            let started = Instant::now();
            let result = tokio::time::timeout(timeout, self.upstream.send(request))
                .instrument(span.clone())
                .await;
            let elapsed = started.elapsed().as_secs_f64();

            let error = match result {
                Ok(Ok(response)) => {
                    span.record("status", response.status);
                    let failed = response.status >= 500;
                    permit.record(if failed { CallOutcome::Failure } else { CallOutcome::Success });
                    self.metrics.record_upstream_attempt(connector_label, !failed, elapsed);
                    return Ok(response);
                }
                Ok(Err(UpstreamError::TooLarge { limit })) => {
                    // Over the size cap: no breaker outcome, no retry
                    drop(permit);
                    warn!(
                        connector_id = %connector.id,
                        limit,
                        "Upstream response exceeds size limit"
                    );
                    return Err(GatewayError::UpstreamResponseTooLarge {
                        connector_id: connector.id.clone(),
                        limit,
                    });
                }
                Ok(Err(e)) if e.is_timeout() => {
                    GatewayError::UpstreamTimeout { connector_id: connector.id.clone() }
                }
                Ok(Err(e)) => GatewayError::UpstreamUnreachable {
                    connector_id: connector.id.clone(),
                    reason: e.to_string(),
                },
                Err(_) => GatewayError::UpstreamTimeout { connector_id: connector.id.clone() },
            };

            permit.record(CallOutcome::Failure);
            self.metrics.record_upstream_attempt(connector_label, false, elapsed);

            if attempt >= attempts {
                return Err(error);
            }

            let delay = calculate_backoff(&connector.retry.backoff, attempt - 1);
            warn!(
                connector_id = %connector.id,
                attempt,
                delay_ms = delay.as_millis() as u64,
                error = %error,
                "Upstream attempt failed, retrying"
            );
            self.metrics.record_retry(connector_label);
            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }

    fn forward_headers(&self, request: &ProxyRequest, json_body: bool) -> HeaderMap {
        let mut headers = HeaderMap::new();
        for name in FORWARDED_REQUEST_HEADERS {
            for value in request.headers.get_all(*name) {
                headers.append(HeaderName::from_static(name), value.clone());
            }
        }

        if !headers.contains_key(USER_AGENT) {
            if let Ok(value) = HeaderValue::from_str(&self.settings.user_agent) {
                headers.insert(USER_AGENT, value);
            }
        }
        if let Ok(value) = HeaderValue::from_str(request.caller.correlation_id.as_str()) {
            headers.insert(CORRELATION_HEADER, value);
        }
        if json_body {
            headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        }
        headers
    }

    async fn cache_lookup(&self, key: &CacheKey) -> Option<CachedResponse> {
        match tokio::time::timeout(self.settings.cache_timeout, self.cache.get(key)).await {
            Ok(Ok(hit)) => {
                self.metrics.record_cache_lookup(hit.is_some());
                hit
            }
            Ok(Err(e)) => {
                warn!(error = %e, "Cache lookup failed, treating as miss");
                self.metrics.record_cache_lookup(false);
                None
            }
            Err(_) => {
                warn!("Cache lookup timed out, treating as miss");
                self.metrics.record_cache_lookup(false);
                None
            }
        }
    }

    async fn cache_store(&self, key: CacheKey, response: &ProxyResponse, ttl: Duration) {
        if response.body.len() > self.settings.max_cache_entry_bytes {
            debug!(body_length = response.body.len(), "Response too large to cache");
            return;
        }

        let write = self.cache.put(key, response.to_cached(), ttl);
        match tokio::time::timeout(self.settings.cache_timeout, write).await {
            Ok(Ok(())) => {
                if let Some(count) = self.cache.entry_count().await {
                    self.metrics.update_cache_entries(count);
                }
            }
            Ok(Err(e)) => warn!(error = %e, "Cache write failed, skipping"),
            Err(_) => warn!("Cache write timed out, skipping"),
        }
    }
}

impl std::fmt::Debug for ProxyOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProxyOrchestrator")
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

fn authorize(route: &Route, caller: &CallerContext) -> Result<(), GatewayError> {
    if route.auth_required && caller.is_anonymous() {
        return Err(GatewayError::Unauthorized);
    }
    if !route.permits_role(caller.role.as_deref()) {
        return Err(if caller.is_anonymous() {
            GatewayError::Unauthorized
        } else {
            GatewayError::Forbidden
        });
    }
    Ok(())
}

fn compile_transform(
    route: &Route,
    definition: Option<&Value>,
) -> Result<Option<Transform>, GatewayError> {
    definition
        .map(Transform::compile)
        .transpose()
        .map_err(|source| invalid_transform(route, source))
}

fn invalid_transform(route: &Route, source: TransformError) -> GatewayError {
    GatewayError::InvalidTransform { route_id: route.id.clone(), source }
}

fn encode_json(doc: &Value) -> Result<Bytes, GatewayError> {
    serde_json::to_vec(doc).map(Bytes::from).map_err(|e| GatewayError::internal(e.to_string()))
}

/// First value wins for repeated keys
fn parse_query(query: Option<&str>) -> HashMap<String, String> {
    let mut params = HashMap::new();
    if let Some(query) = query {
        for (key, value) in url::form_urlencoded::parse(query.as_bytes()) {
            params.entry(key.into_owned()).or_insert_with(|| value.into_owned());
        }
    }
    params
}

/// Outbound body and whether it was rewritten as JSON.
///
/// With a request transform the body must be JSON; an empty body on a
/// method that carries one starts as `{}`.
fn prepare_body(
    route: &Route,
    request: &ProxyRequest,
    transform: Option<&Transform>,
    params: &HashMap<String, String>,
) -> Result<(Option<Bytes>, bool), GatewayError> {
    let carries_body = !request.body.is_empty()
        || matches!(request.method, HttpMethod::Post | HttpMethod::Put | HttpMethod::Patch);

    match transform {
        Some(transform) if carries_body => {
            let doc: Value = if request.body.iter().all(u8::is_ascii_whitespace) {
                Value::Object(Default::default())
            } else {
                serde_json::from_slice(&request.body)
                    .map_err(|_| GatewayError::bad_request("Request body must be valid JSON"))?
            };
            let doc = transform.apply_to(doc, params).map_err(|e| invalid_transform(route, e))?;
            Ok((Some(encode_json(&doc)?), true))
        }
        _ if request.body.is_empty() => Ok((None, false)),
        _ => Ok((Some(request.body.clone()), false)),
    }
}

/// Build the caller response from the allow-listed upstream headers, applying
/// the response transform to successful JSON bodies.
fn relay(
    upstream: UpstreamResponse,
    route: &Route,
    transform: Option<&Transform>,
    params: &HashMap<String, String>,
) -> Result<ProxyResponse, GatewayError> {
    let status =
        StatusCode::from_u16(upstream.status).map_err(|_| GatewayError::UpstreamUnreachable {
            connector_id: route.connector_id.clone(),
            reason: format!("invalid status {}", upstream.status),
        })?;

    let mut headers = HeaderMap::new();
    for name in RELAYED_RESPONSE_HEADERS {
        for value in upstream.headers.get_all(*name) {
            headers.append(HeaderName::from_static(name), value.clone());
        }
    }

    let mut body = upstream.body;
    if let Some(transform) = transform.filter(|_| status.is_success()) {
        match serde_json::from_slice::<Value>(&body) {
            Ok(doc) => {
                let doc = transform.apply_to(doc, params).map_err(|e| invalid_transform(route, e))?;
                body = encode_json(&doc)?;
                headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
                headers.remove(ETAG);
            }
            Err(_) => {
                warn!(
                    route_id = %route.id,
                    "Upstream response is not JSON, response transform skipped"
                );
            }
        }
    }

    Ok(ProxyResponse { status, headers, body, cache_status: CacheStatus::Bypass })
}

fn log_failure(err: &GatewayError, request: &ProxyRequest) {
    let correlation_id = request.caller.correlation_id.as_str();
    match err {
        GatewayError::InvalidTransform { route_id, source } => {
            error!(route_id = %route_id, correlation_id, error = %source, "Route transform failed");
        }
        GatewayError::SsrfBlocked(reason) => {
            warn!(correlation_id, reason = %reason, "Upstream URL blocked");
        }
        err if err.status_code().is_server_error() => {
            warn!(correlation_id, error = %err, path = %request.path, "Proxied request failed");
        }
        err => {
            info!(correlation_id, error = %err, path = %request.path, "Proxied request rejected");
        }
    }
}
