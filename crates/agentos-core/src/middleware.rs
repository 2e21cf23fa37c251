//! Shared HTTP middleware: auth context, request IDs, metrics protection.
//!
//! Ordering matters: the request-ID layer runs outermost so every response
//! (including auth failures) carries `X-Request-Id`; the auth layer injects
//! the [`AuthContext`] used by handlers and the metrics guard.

use std::sync::Arc;

use axum::extract::{Request, State};
use axum::http::HeaderValue;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

use crate::auth::{self, AuthContext};
use crate::http::{ApiError, correlation_id};
use crate::id;

/// Header name for request IDs.
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Derives the [`AuthContext`] from headers and injects it into request
/// extensions for downstream extractors.
pub async fn auth_middleware(mut request: Request, next: Next) -> Response {
    let ctx = AuthContext::from_headers(request.headers());
    request.extensions_mut().insert(ctx);
    next.run(request).await
}

/// Ensures `X-Request-Id` is present on the request and echoed on the
/// response, generating `req_…` when absent.
pub async fn request_id_middleware(mut request: Request, next: Next) -> Response {
    let request_id = request
        .headers()
        .get(REQUEST_ID_HEADER)
        .and_then(|value| value.to_str().ok())
        .filter(|value| !value.is_empty())
        .map_or_else(id::request_id, str::to_string);

    if let Ok(value) = HeaderValue::from_str(&request_id) {
        request.headers_mut().insert(REQUEST_ID_HEADER, value);
    }

    let mut response = next.run(request).await;
    if let Ok(value) = HeaderValue::from_str(&request_id) {
        response.headers_mut().insert(REQUEST_ID_HEADER, value);
    }
    response
}

/// Guard configuration for the `/metrics` endpoint.
#[derive(Debug, Clone, Default)]
pub struct MetricsGuard {
    /// When true, `/metrics` requires a resolved tenant.
    pub require_auth: bool,
    /// Default tenant applied during resolution (dev/demo shortcut).
    pub default_tenant: Option<String>,
}

/// Enforces tenant auth on `/metrics` when configured.
pub async fn metrics_guard_middleware(
    State(guard): State<Arc<MetricsGuard>>,
    request: Request,
    next: Next,
) -> Response {
    if guard.require_auth {
        let ctx = request
            .extensions()
            .get::<AuthContext>()
            .cloned()
            .unwrap_or_else(|| AuthContext::from_headers(request.headers()));
        if auth::require_tenant(&ctx, guard.default_tenant.as_deref()).is_err() {
            let correlation = correlation_id(request.headers());
            return ApiError::unauthorized("tenant_id required")
                .with_correlation_id(correlation)
                .into_response();
        }
    }
    next.run(request).await
}
