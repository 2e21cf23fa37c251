//! HTTP error envelope and request metadata shared by all services.
//!
//! Every AgentOS service renders failures in the same wire shape:
//!
//! ```json
//! {"error": {"code": "...", "message": "...", "retryable": false},
//!  "correlation_id": "..."}
//! ```
//!
//! `correlation_id` is taken from `X-Correlation-Id`, else `X-Request-Id`,
//! else empty. `retryable` is true for 5xx and 429 responses.

use axum::Json;
use axum::extract::FromRequestParts;
use axum::http::{HeaderMap, StatusCode};
use axum::http::request::Parts;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

/// Per-request correlation metadata.
///
/// Extracted from headers; the request-ID middleware guarantees
/// `X-Request-Id` is present by the time handlers run.
#[derive(Debug, Clone, Default)]
pub struct RequestMeta {
    /// Correlation identifier echoed in response envelopes.
    pub correlation_id: String,
    /// Request identifier echoed as `X-Request-Id`.
    pub request_id: String,
}

impl RequestMeta {
    /// Derives request metadata from headers.
    #[must_use]
    pub fn from_headers(headers: &HeaderMap) -> Self {
        Self {
            correlation_id: correlation_id(headers),
            request_id: header_value(headers, "X-Request-Id"),
        }
    }
}

impl<S> FromRequestParts<S> for RequestMeta
where
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(Self::from_headers(&parts.headers))
    }
}

/// Returns the correlation id for a request: `X-Correlation-Id`, else
/// `X-Request-Id`, else empty.
#[must_use]
pub fn correlation_id(headers: &HeaderMap) -> String {
    let correlation = header_value(headers, "X-Correlation-Id");
    if correlation.is_empty() {
        header_value(headers, "X-Request-Id")
    } else {
        correlation
    }
}

fn header_value(headers: &HeaderMap, name: &str) -> String {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default()
        .to_string()
}

/// Wire-level error detail.
#[derive(Debug, Serialize)]
pub struct ApiErrorDetail {
    /// Stable machine-readable error code.
    pub code: String,
    /// Human-readable message (safe for clients).
    pub message: String,
    /// Whether the caller may retry the request.
    pub retryable: bool,
}

/// Standard JSON error response body.
#[derive(Debug, Serialize)]
pub struct ApiErrorBody {
    /// Error detail.
    pub error: ApiErrorDetail,
    /// Correlation identifier for tracing.
    pub correlation_id: String,
}

/// HTTP API error carrying a stable machine-readable code.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    code: &'static str,
    message: String,
    retryable: bool,
    correlation_id: String,
}

impl ApiError {
    fn new(
        status: StatusCode,
        code: &'static str,
        message: impl Into<String>,
        retryable: bool,
    ) -> Self {
        Self {
            status,
            code,
            message: message.into(),
            retryable,
            correlation_id: String::new(),
        }
    }

    /// 405 `method_not_allowed`.
    #[must_use]
    pub fn method_not_allowed() -> Self {
        Self::new(
            StatusCode::METHOD_NOT_ALLOWED,
            "method_not_allowed",
            "method not allowed",
            false,
        )
    }

    /// 404 `not_found`.
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, "not_found", message, false)
    }

    /// 400 `invalid_json`.
    #[must_use]
    pub fn invalid_json() -> Self {
        Self::new(
            StatusCode::BAD_REQUEST,
            "invalid_json",
            "invalid json body",
            false,
        )
    }

    /// 400 `invalid_request`.
    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "invalid_request", message, false)
    }

    /// 401 `unauthorized`.
    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, "unauthorized", message, false)
    }

    /// 400 `tenant_mismatch` (header and token tenants disagree).
    #[must_use]
    pub fn tenant_mismatch() -> Self {
        Self::new(
            StatusCode::BAD_REQUEST,
            "tenant_mismatch",
            "tenant_id mismatch between token and header",
            false,
        )
    }

    /// 403 `tenant_unknown` (resolved tenant has no record).
    #[must_use]
    pub fn tenant_unknown() -> Self {
        Self::new(
            StatusCode::FORBIDDEN,
            "tenant_unknown",
            "tenant not found",
            false,
        )
    }

    /// 403 `forbidden`.
    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(StatusCode::FORBIDDEN, "forbidden", message, false)
    }

    /// 409 `conflict`.
    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(StatusCode::CONFLICT, "conflict", message, false)
    }

    /// 409 `invalid_state_transition`.
    pub fn invalid_state_transition(message: impl Into<String>) -> Self {
        Self::new(
            StatusCode::CONFLICT,
            "invalid_state_transition",
            message,
            false,
        )
    }

    /// 429 `quota_exceeded` (retryable).
    pub fn quota_exceeded(message: impl Into<String>) -> Self {
        Self::new(
            StatusCode::TOO_MANY_REQUESTS,
            "quota_exceeded",
            message,
            true,
        )
    }

    /// 403 `policy_blocked`.
    pub fn policy_blocked(message: impl Into<String>) -> Self {
        Self::new(StatusCode::FORBIDDEN, "policy_blocked", message, false)
    }

    /// 404 `model_not_found`.
    #[must_use]
    pub fn model_not_found() -> Self {
        Self::new(
            StatusCode::NOT_FOUND,
            "model_not_found",
            "model not found",
            false,
        )
    }

    /// 502 `provider_error` (retryable).
    pub fn provider_error(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_GATEWAY, "provider_error", message, true)
    }

    /// 502 `forward_failed` (retryable).
    pub fn forward_failed(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_GATEWAY, "forward_failed", message, true)
    }

    /// 502 `events_proxy_failed` (retryable).
    pub fn events_proxy_failed(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_GATEWAY, "events_proxy_failed", message, true)
    }

    /// 500 `run_persist_failed` (retryable).
    pub fn run_persist_failed(message: impl Into<String>) -> Self {
        Self::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            "run_persist_failed",
            message,
            true,
        )
    }

    /// 500 `run_lookup_failed` (retryable).
    pub fn run_lookup_failed(message: impl Into<String>) -> Self {
        Self::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            "run_lookup_failed",
            message,
            true,
        )
    }

    /// 401 `jwt_verification_failed`.
    pub fn jwt_verification_failed(message: impl Into<String>) -> Self {
        Self::new(
            StatusCode::UNAUTHORIZED,
            "jwt_verification_failed",
            message,
            false,
        )
    }

    /// 503 `unavailable` (retryable).
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::new(StatusCode::SERVICE_UNAVAILABLE, "unavailable", message, true)
    }

    /// 500 internal error, rendered with the given code.
    pub fn internal(code: &'static str, message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, code, message, true)
    }

    /// Attaches a correlation id echoed in the response envelope.
    #[must_use]
    pub fn with_correlation_id(mut self, correlation_id: impl Into<String>) -> Self {
        self.correlation_id = correlation_id.into();
        self
    }

    /// Returns the HTTP status code for this error.
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        self.status
    }

    /// Returns the stable machine-readable error code.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        self.code
    }

    /// Returns the human-readable error message.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Returns whether the caller may retry.
    #[must_use]
    pub const fn retryable(&self) -> bool {
        self.retryable
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(ApiErrorBody {
                error: ApiErrorDetail {
                    code: self.code.to_string(),
                    message: self.message,
                    retryable: self.retryable,
                },
                correlation_id: self.correlation_id,
            }),
        )
            .into_response()
    }
}

impl From<crate::auth::AuthError> for ApiError {
    fn from(value: crate::auth::AuthError) -> Self {
        match value {
            crate::auth::AuthError::TenantMismatch => Self::tenant_mismatch(),
            crate::auth::AuthError::TenantRequired => Self::unauthorized(value.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn correlation_prefers_correlation_header() {
        let mut headers = HeaderMap::new();
        headers.insert("X-Correlation-Id", HeaderValue::from_static("corr-1"));
        headers.insert("X-Request-Id", HeaderValue::from_static("req-1"));
        assert_eq!(correlation_id(&headers), "corr-1");
    }

    #[test]
    fn correlation_falls_back_to_request_id() {
        let mut headers = HeaderMap::new();
        headers.insert("X-Request-Id", HeaderValue::from_static("req-1"));
        assert_eq!(correlation_id(&headers), "req-1");
    }

    #[test]
    fn quota_errors_are_retryable() {
        let err = ApiError::quota_exceeded("run create QPS exceeded");
        assert_eq!(err.status(), StatusCode::TOO_MANY_REQUESTS);
        assert!(err.retryable());
    }

    #[tokio::test]
    async fn envelope_shape_is_stable() {
        let response = ApiError::not_found("run not found")
            .with_correlation_id("corr-9")
            .into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let body = axum::body::to_bytes(response.into_body(), 1024)
            .await
            .expect("read body");
        let value: serde_json::Value = serde_json::from_slice(&body).expect("parse body");
        assert_eq!(value["error"]["code"], "not_found");
        assert_eq!(value["error"]["retryable"], false);
        assert_eq!(value["correlation_id"], "corr-9");
    }
}
