//! Request handlers
//!
//! Caller identity arrives in trusted headers set by the identity middleware
//! in front of the gateway; this layer only parses them.

use axum::body::{Body, Bytes};
use axum::extract::State;
use axum::http::{HeaderMap, HeaderValue, Method, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use tracing::Instrument;

use super::error::ApiError;
use super::server::AppState;
use crate::circuit_breaker::CircuitSnapshot;
use crate::domain::{
    CallerContext, CorrelationId, HttpMethod, TenantId, CORRELATION_HEADER, ROLE_HEADER,
    TENANT_HEADER, USER_HEADER,
};
use crate::proxy::{GatewayError, ProxyRequest};

/// Longest correlation id accepted from the caller
const MAX_CORRELATION_ID_LEN: usize = 128;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub circuits: Vec<CircuitSnapshot>,
}

pub async fn health_handler(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    let circuits = state.orchestrator.breakers().snapshot();
    (StatusCode::OK, Json(HealthResponse { status: "ok", version: crate::VERSION, circuits }))
}

/// Every non-health path lands here and goes through the pipeline
pub async fn proxy_handler(
    State(state): State<AppState>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, ApiError> {
    let correlation_id = correlation_id_from(&headers);
    let span = crate::request_span!(method, uri.path());
    span.record("correlation_id", correlation_id.as_str());

    let caller = caller_from_headers(&headers, correlation_id.clone())
        .map_err(|e| ApiError::new(e, Some(correlation_id.clone())))?;
    span.record("tenant_id", caller.tenant_id.as_str());

    let method = HttpMethod::from_http(&method).ok_or_else(|| {
        ApiError::new(GatewayError::bad_request("Unsupported method"), Some(correlation_id.clone()))
    })?;

    let mut request =
        ProxyRequest::new(caller, method, uri.path()).with_headers(headers).with_body(body);
    if let Some(query) = uri.query() {
        request = request.with_query(query);
    }

    let response = state
        .orchestrator
        .handle(request)
        .instrument(span)
        .await
        .map_err(|e| ApiError::new(e, Some(correlation_id.clone())))?;

    let mut out = (response.status, response.headers, Body::from(response.body)).into_response();
    if let Ok(value) = HeaderValue::from_str(correlation_id.as_str()) {
        out.headers_mut().insert(CORRELATION_HEADER, value);
    }
    Ok(out)
}

/// Build the caller context from the trusted identity headers.
///
/// A missing tenant means the request never went through the identity
/// middleware and is rejected as unauthenticated.
pub fn caller_from_headers(
    headers: &HeaderMap,
    correlation_id: CorrelationId,
) -> Result<CallerContext, GatewayError> {
    let tenant = match headers.get(TENANT_HEADER) {
        None => return Err(GatewayError::Unauthorized),
        Some(value) => value
            .to_str()
            .ok()
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .ok_or_else(|| GatewayError::bad_request("Invalid tenant header"))?,
    };

    let mut caller = CallerContext::new(TenantId::from(tenant)).with_correlation_id(correlation_id);

    if let Some(user) = header_str(headers, USER_HEADER) {
        let role = header_str(headers, ROLE_HEADER).map(str::to_string);
        caller = caller.with_user(user, role);
    }

    Ok(caller)
}

/// Caller-supplied correlation id when it is usable, otherwise a fresh one
pub fn correlation_id_from(headers: &HeaderMap) -> CorrelationId {
    header_str(headers, CORRELATION_HEADER)
        .filter(|v| v.len() <= MAX_CORRELATION_ID_LEN)
        .map(CorrelationId::from)
        .unwrap_or_default()
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok()).map(str::trim).filter(|v| !v.is_empty())
}
