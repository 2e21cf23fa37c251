//! Metrics instrumentation for the AgentOS services.
//!
//! Provides a Prometheus-backed recorder plus middleware and counter helpers
//! for:
//! - Request throughput and duration
//! - Quota denials
//! - Federation forward failures

use std::sync::OnceLock;
use std::time::Instant;

use axum::extract::{Request, State};
use axum::http::StatusCode;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use metrics::{counter, describe_counter, describe_histogram, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

/// HTTP request counter.
pub const HTTP_REQUESTS_TOTAL: &str = "agentos_http_requests_total";

/// HTTP request duration histogram.
pub const HTTP_REQUEST_DURATION: &str = "agentos_http_request_duration_seconds";

/// Quota denial counter.
pub const QUOTA_DENIED_TOTAL: &str = "agentos_quota_denied_total";

/// Federation forward failure counter.
pub const FED_FORWARD_FAILURES_TOTAL: &str = "agentos_federation_forward_failures_total";

static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Initializes the global metrics recorder with a Prometheus exporter.
///
/// Safe to call multiple times; subsequent calls are no-ops. Returns a handle
/// for rendering metrics, also stored globally for the `/metrics` endpoint.
///
/// # Panics
///
/// Panics if the Prometheus recorder cannot be installed. Metrics are
/// critical infrastructure; services do not start without them.
#[allow(clippy::panic)]
pub fn init_metrics() -> PrometheusHandle {
    PROMETHEUS_HANDLE
        .get_or_init(|| {
            let handle = PrometheusBuilder::new()
                .install_recorder()
                .unwrap_or_else(|e| panic!("failed to install prometheus recorder: {e}"));

            describe_counter!(
                HTTP_REQUESTS_TOTAL,
                "Total HTTP requests served by AgentOS services."
            );
            describe_histogram!(
                HTTP_REQUEST_DURATION,
                "HTTP request duration in seconds."
            );
            describe_counter!(QUOTA_DENIED_TOTAL, "Total quota denials.");
            describe_counter!(
                FED_FORWARD_FAILURES_TOTAL,
                "Federation forward failures (remote run create failures)."
            );

            tracing::info!("Prometheus metrics recorder initialized");
            handle
        })
        .clone()
}

/// Returns the global Prometheus handle, if initialized.
#[must_use]
pub fn prometheus_handle() -> Option<PrometheusHandle> {
    PROMETHEUS_HANDLE.get().cloned()
}

/// Middleware recording request counters and latency per service.
///
/// Captures `agentos_http_requests_total{service, method, code}` and
/// `agentos_http_request_duration_seconds{service, method, code}`.
pub async fn http_metrics_middleware(
    State(service): State<&'static str>,
    request: Request,
    next: Next,
) -> Response {
    let start = Instant::now();
    let method = request.method().to_string();

    let response = next.run(request).await;

    let code = response.status().as_u16().to_string();
    let labels = [
        ("service", service.to_string()),
        ("method", method),
        ("code", code),
    ];
    counter!(HTTP_REQUESTS_TOTAL, &labels).increment(1);
    histogram!(HTTP_REQUEST_DURATION, &labels).record(start.elapsed().as_secs_f64());

    response
}

/// Handler for the `/metrics` endpoint: Prometheus text exposition.
pub async fn serve_metrics() -> impl IntoResponse {
    prometheus_handle().map_or_else(
        || {
            (
                StatusCode::SERVICE_UNAVAILABLE,
                [("content-type", "text/plain; charset=utf-8")],
                "metrics not initialized".to_string(),
            )
        },
        |handle| {
            (
                StatusCode::OK,
                [("content-type", "text/plain; charset=utf-8")],
                handle.render(),
            )
        },
    )
}

/// Records a quota denial.
pub fn record_quota_denied(service: &'static str, kind: &'static str) {
    counter!(QUOTA_DENIED_TOTAL, "service" => service, "kind" => kind).increment(1);
}

/// Records a federation forward failure.
pub fn record_forward_failure(service: &'static str, reason: &'static str) {
    counter!(FED_FORWARD_FAILURES_TOTAL, "service" => service, "reason" => reason).increment(1);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_render_with_labels() {
        let handle = init_metrics();
        record_quota_denied("agent-orchestrator", "runs_create_qps");
        record_forward_failure("federation", "forward_run_failed");

        let rendered = handle.render();
        assert!(rendered.contains(QUOTA_DENIED_TOTAL));
        assert!(rendered.contains("runs_create_qps"));
        assert!(rendered.contains("forward_run_failed"));
    }
}
