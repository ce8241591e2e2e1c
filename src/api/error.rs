use axum::http::header::RETRY_AFTER;
use axum::http::{HeaderValue, StatusCode};
use axum::{response::IntoResponse, Json};
use serde::Serialize;

use crate::domain::{CorrelationId, CORRELATION_HEADER};
use crate::proxy::GatewayError;

/// A pipeline failure on its way to the caller
#[derive(Debug)]
pub struct ApiError {
    error: GatewayError,
    correlation_id: Option<CorrelationId>,
}

impl ApiError {
    pub fn new(error: GatewayError, correlation_id: Option<CorrelationId>) -> Self {
        Self { error, correlation_id }
    }

    pub fn error(&self) -> &GatewayError {
        &self.error
    }

    pub fn status_code(&self) -> StatusCode {
        self.error.status_code()
    }
}

impl From<GatewayError> for ApiError {
    fn from(error: GatewayError) -> Self {
        Self::new(error, None)
    }
}

#[derive(Serialize)]
struct ErrorBody {
    error: &'static str,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    correlation_id: Option<String>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let status = self.status_code();
        let body = ErrorBody {
            error: self.error.kind(),
            message: self.error.public_message(),
            correlation_id: self.correlation_id.as_ref().map(|id| id.as_str().to_string()),
        };

        let mut response = (status, Json(body)).into_response();
        let headers = response.headers_mut();

        if let Some(retry_after) = self.error.retry_after() {
            // whole seconds, rounded up so callers never retry early
            let secs = retry_after.as_secs() + u64::from(retry_after.subsec_nanos() > 0);
            headers.insert(RETRY_AFTER, HeaderValue::from(secs.max(1)));
        }
        if let Some(value) =
            self.correlation_id.as_ref().and_then(|id| HeaderValue::from_str(id.as_str()).ok())
        {
            headers.insert(CORRELATION_HEADER, value);
        }

        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ConnectorId;
    use crate::ssrf::SsrfError;
    use axum::body::to_bytes;
    use std::time::Duration;

    async fn body_json(response: axum::response::Response) -> serde_json::Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn circuit_open_sets_retry_after() {
        let err = GatewayError::CircuitOpen {
            connector_id: ConnectorId::from("c-1"),
            retry_after: Duration::from_millis(2_500),
        };
        let response = ApiError::new(err, Some(CorrelationId::from("corr-9"))).into_response();

        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(response.headers().get(RETRY_AFTER).unwrap(), "3");
        assert_eq!(response.headers().get(CORRELATION_HEADER).unwrap(), "corr-9");

        let body = body_json(response).await;
        assert_eq!(body["error"], "circuit_open");
        assert_eq!(body["correlation_id"], "corr-9");
    }

    #[tokio::test]
    async fn ssrf_detail_is_not_exposed() {
        let blocked = SsrfError::BlockedAddress("169.254.169.254".parse().unwrap());
        let err = GatewayError::SsrfBlocked(blocked);
        let response = ApiError::from(err).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(response.headers().get(RETRY_AFTER).is_none());

        let body = body_json(response).await;
        assert_eq!(body["message"], "request blocked");
        assert!(!body.to_string().contains("169.254"));
        assert!(body.get("correlation_id").is_none());
    }
}
