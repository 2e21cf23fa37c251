//! Run lifecycle routes: create, read, events, cancel.
//!
//! Admission order on create is QPS first, then the in-flight concurrency
//! slot; the slot is released on every later failure path and on idempotency
//! replays. Reads apply age-based auto-progression: the lifecycle stub that
//! stands in for a real scheduler. It lives behind the store's read path so a
//! worker signal can replace it without changing the API contract.

use std::collections::HashMap;
use std::sync::Arc;

use axum::Json;
use axum::Router;
use axum::body::{Body, Bytes};
use axum::extract::{Path, State};
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use chrono::{Duration, Utc};

use agentos_core::audit::AuditEntry;
use agentos_core::auth::AuthContext;
use agentos_core::event::{self, Event, EventEnvelope, TraceContext};
use agentos_core::http::{ApiError, RequestMeta};
use agentos_core::{id, metrics};

use crate::SERVICE_NAME;
use crate::server::AppState;
use crate::store::StoreError;
use crate::types::{
    Run, RunCancelResponse, RunCreateRequest, RunCreateResponse, RunGetResponse, RunOutput,
    RunStatus,
};

/// Queued runs promote to `running` after this age.
const AUTO_START_AFTER: i64 = 1;
/// Non-terminal runs promote to `completed` after this age.
const AUTO_COMPLETE_AFTER: i64 = 5;

/// Creates run routes.
pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/v1/agents/{agent_id}/runs", post(create_run))
        .route("/v1/runs/{run_id}", get(get_run).post(cancel_run))
        .route("/v1/runs/{run_id}/events", get(run_events))
}

/// Create a run.
///
/// POST /v1/agents/{agent\_id}/runs
#[utoipa::path(
    post,
    path = "/v1/agents/{agent_id}/runs",
    tag = "runs",
    params(("agent_id" = String, Path, description = "Agent identifier")),
    request_body = RunCreateRequest,
    responses(
        (status = 201, description = "Run created", body = RunCreateResponse),
        (status = 200, description = "Idempotency replay", body = RunCreateResponse),
        (status = 400, description = "Invalid request"),
        (status = 401, description = "Tenant required"),
        (status = 403, description = "Unknown tenant"),
        (status = 409, description = "Run already exists"),
        (status = 429, description = "Quota exceeded"),
    )
)]
pub(crate) async fn create_run(
    State(state): State<Arc<AppState>>,
    ctx: AuthContext,
    meta: RequestMeta,
    Path(agent_id): Path<String>,
    body: Bytes,
) -> Result<Response, ApiError> {
    let tenant_id = state.resolve_tenant(&ctx, &meta.correlation_id)?;

    if !state.limiter.allow_qps(&tenant_id) {
        metrics::record_quota_denied(SERVICE_NAME, "runs_create_qps");
        audit_denied(&state, &tenant_id, &ctx, &meta, "qps_exceeded");
        return Err(ApiError::quota_exceeded("run create QPS exceeded")
            .with_correlation_id(&meta.correlation_id));
    }
    if !state.limiter.try_inc_concurrent(&tenant_id) {
        metrics::record_quota_denied(SERVICE_NAME, "runs_concurrency");
        audit_denied(&state, &tenant_id, &ctx, &meta, "concurrent_exceeded");
        return Err(ApiError::quota_exceeded("concurrent runs exceeded")
            .with_correlation_id(&meta.correlation_id));
    }

    // The concurrency slot is held from here on; every failure path below
    // must release it.
    let request: RunCreateRequest = match serde_json::from_slice(&body) {
        Ok(request) => request,
        Err(_) => {
            state.limiter.dec_concurrent(&tenant_id);
            return Err(ApiError::invalid_json().with_correlation_id(&meta.correlation_id));
        }
    };

    let idempotency_key = request
        .idempotency_key
        .as_deref()
        .filter(|key| !key.is_empty());
    if let Some(key) = idempotency_key {
        match state.runs.get_by_idempotency_key(&tenant_id, key).await {
            Ok(Some(existing)) => {
                state.limiter.dec_concurrent(&tenant_id);
                let response = RunCreateResponse {
                    run: existing,
                    correlation_id: meta.correlation_id.clone(),
                };
                return Ok((StatusCode::OK, Json(response)).into_response());
            }
            Ok(None) => {}
            Err(err) => {
                // Fail open for availability; the create proceeds and persists.
                tracing::warn!(
                    tenant = %tenant_id,
                    error = %err,
                    "idempotency lookup failed; proceeding with create"
                );
            }
        }
    }

    let run_id = id::new("run");
    let run = Run {
        tenant_id: tenant_id.clone(),
        agent_id: agent_id.clone(),
        run_id: run_id.clone(),
        status: RunStatus::Queued,
        created_at: Utc::now(),
        started_at: None,
        completed_at: None,
        events_url: format!("/v1/runs/{run_id}/events"),
        run_options: request.run_options,
        output: None,
        error: None,
        idempotency_key: idempotency_key.map(str::to_string),
    };

    if let Err(err) = state.runs.create(run.clone()).await {
        state.limiter.dec_concurrent(&tenant_id);
        let api_err = match err {
            StoreError::RunExists => ApiError::conflict("failed to persist run"),
            StoreError::InvalidRun => ApiError::invalid_request("failed to persist run"),
            other => {
                tracing::error!(tenant = %tenant_id, error = %other, "run create failed");
                ApiError::run_persist_failed("failed to persist run")
            }
        };
        return Err(api_err.with_correlation_id(&meta.correlation_id));
    }

    state.audit.log(AuditEntry {
        tenant_id: tenant_id.clone(),
        principal_id: ctx.principal_id.clone(),
        action: "runs.create".to_string(),
        resource: format!("run/{run_id}"),
        outcome: "allowed".to_string(),
        correlation_id: meta.correlation_id.clone(),
        request_id: meta.request_id.clone(),
        meta: Some(HashMap::from([(
            "agent_id".to_string(),
            serde_json::Value::String(agent_id),
        )])),
        ..AuditEntry::default()
    });

    let response = RunCreateResponse {
        run,
        correlation_id: meta.correlation_id,
    };
    Ok((StatusCode::CREATED, Json(response)).into_response())
}

/// Get a run, applying age-based auto-progression.
///
/// GET /v1/runs/{run\_id}
#[utoipa::path(
    get,
    path = "/v1/runs/{run_id}",
    tag = "runs",
    params(("run_id" = String, Path, description = "Run identifier")),
    responses(
        (status = 200, description = "Run found", body = RunGetResponse),
        (status = 404, description = "Run not found"),
    )
)]
pub(crate) async fn get_run(
    State(state): State<Arc<AppState>>,
    ctx: AuthContext,
    meta: RequestMeta,
    Path(run_id): Path<String>,
) -> Result<Response, ApiError> {
    if run_id.ends_with(":cancel") {
        return Err(ApiError::method_not_allowed().with_correlation_id(&meta.correlation_id));
    }
    let tenant_id = state.resolve_tenant(&ctx, &meta.correlation_id)?;

    let mut run = state
        .runs
        .get(&tenant_id, &run_id)
        .await
        .map_err(|err| {
            tracing::error!(tenant = %tenant_id, error = %err, "run lookup failed");
            ApiError::run_lookup_failed("failed to load run")
                .with_correlation_id(&meta.correlation_id)
        })?
        .ok_or_else(|| {
            ApiError::not_found("run not found").with_correlation_id(&meta.correlation_id)
        })?;

    if auto_progress(&mut run) {
        if run.status == RunStatus::Completed {
            state.limiter.dec_concurrent(&tenant_id);
        }
        state.runs.save(run.clone()).await.map_err(|err| {
            tracing::error!(tenant = %tenant_id, error = %err, "run promotion persist failed");
            ApiError::run_persist_failed("failed to persist run update")
                .with_correlation_id(&meta.correlation_id)
        })?;
    }

    Ok(Json(RunGetResponse {
        run,
        correlation_id: meta.correlation_id,
    })
    .into_response())
}

/// Promotes a run according to its age. Returns true when the run changed.
///
/// Queued runs older than one second start; non-terminal runs older than
/// five seconds complete with stub output. The prior-status check is what
/// guarantees the in-flight counter is decremented at most once per run:
/// terminal runs never promote again.
fn auto_progress(run: &mut Run) -> bool {
    let age = Utc::now() - run.created_at;
    let mut updated = false;

    if run.status == RunStatus::Queued && age > Duration::seconds(AUTO_START_AFTER) {
        run.status = RunStatus::Running;
        if run.started_at.is_none() {
            run.started_at = Some(Utc::now());
        }
        updated = true;
    }
    if matches!(run.status, RunStatus::Queued | RunStatus::Running)
        && age > Duration::seconds(AUTO_COMPLETE_AFTER)
    {
        run.status = RunStatus::Completed;
        run.completed_at = Some(Utc::now());
        run.output = Some(RunOutput {
            output_type: "text".to_string(),
            text: "stub completed output".to_string(),
            artifacts: Vec::new(),
        });
        updated = true;
    }
    updated
}

/// Stream run events as SSE.
///
/// GET /v1/runs/{run\_id}/events
#[utoipa::path(
    get,
    path = "/v1/runs/{run_id}/events",
    tag = "runs",
    params(("run_id" = String, Path, description = "Run identifier")),
    responses(
        (status = 200, description = "SSE stream", body = String, content_type = "text/event-stream"),
        (status = 404, description = "Run not found"),
    )
)]
pub(crate) async fn run_events(
    State(state): State<Arc<AppState>>,
    ctx: AuthContext,
    meta: RequestMeta,
    Path(run_id): Path<String>,
) -> Result<Response, ApiError> {
    let tenant_id = state.resolve_tenant(&ctx, &meta.correlation_id)?;

    let run = state
        .runs
        .get(&tenant_id, &run_id)
        .await
        .map_err(|err| {
            tracing::error!(tenant = %tenant_id, error = %err, "run lookup failed");
            ApiError::run_lookup_failed("failed to load run")
                .with_correlation_id(&meta.correlation_id)
        })?
        .ok_or_else(|| {
            ApiError::not_found("run not found").with_correlation_id(&meta.correlation_id)
        })?;

    let envelope = EventEnvelope {
        event: Event {
            event_id: id::new("evt"),
            sequence: 1,
            time: Utc::now().to_rfc3339(),
            event_type: "agentos.run.step.completed".to_string(),
            tenant_id: run.tenant_id,
            agent_id: run.agent_id,
            run_id: run.run_id,
            step_id: "step_1".to_string(),
            trace: TraceContext::zero(),
            payload: serde_json::Map::from_iter([(
                "status".to_string(),
                serde_json::Value::String("ok".to_string()),
            )]),
        },
    };
    let frame = event::sse_frame(&serde_json::to_value(&envelope).unwrap_or_default());

    Ok(sse_response(frame))
}

/// Cancel a run.
///
/// POST /v1/runs/{run\_id}:cancel
#[utoipa::path(
    post,
    path = "/v1/runs/{run_id}:cancel",
    tag = "runs",
    params(("run_id" = String, Path, description = "Run identifier")),
    responses(
        (status = 200, description = "Run canceled", body = RunCancelResponse),
        (status = 404, description = "Run not found"),
        (status = 409, description = "Terminal state"),
    )
)]
pub(crate) async fn cancel_run(
    State(state): State<Arc<AppState>>,
    ctx: AuthContext,
    meta: RequestMeta,
    Path(run_id): Path<String>,
) -> Result<Response, ApiError> {
    let Some(run_id) = run_id.strip_suffix(":cancel").map(str::to_string) else {
        return Err(ApiError::method_not_allowed().with_correlation_id(&meta.correlation_id));
    };
    let tenant_id = state.resolve_tenant(&ctx, &meta.correlation_id)?;

    let mut run = state
        .runs
        .get(&tenant_id, &run_id)
        .await
        .map_err(|err| {
            tracing::error!(tenant = %tenant_id, error = %err, "run lookup failed");
            ApiError::run_lookup_failed("failed to load run")
                .with_correlation_id(&meta.correlation_id)
        })?
        // Tenant isolation: cross-tenant cancels look like missing runs.
        .ok_or_else(|| {
            ApiError::not_found("run not found").with_correlation_id(&meta.correlation_id)
        })?;

    if run.status.is_terminal() {
        return Err(ApiError::invalid_state_transition(format!(
            "cannot cancel run in {} state",
            run.status
        ))
        .with_correlation_id(&meta.correlation_id));
    }

    run.status = RunStatus::Canceled;
    run.completed_at = Some(Utc::now());

    state.runs.save(run.clone()).await.map_err(|err| {
        tracing::error!(tenant = %tenant_id, error = %err, "run cancel persist failed");
        ApiError::run_persist_failed("failed to persist run cancellation")
            .with_correlation_id(&meta.correlation_id)
    })?;

    // The prior status was non-terminal, so this is the single decrement for
    // this run's lifetime.
    state.limiter.dec_concurrent(&tenant_id);

    state.audit.log(AuditEntry {
        tenant_id: tenant_id.clone(),
        principal_id: ctx.principal_id.clone(),
        action: "runs.cancel".to_string(),
        resource: format!("run/{run_id}"),
        outcome: "allowed".to_string(),
        correlation_id: meta.correlation_id.clone(),
        request_id: meta.request_id.clone(),
        ..AuditEntry::default()
    });

    Ok(Json(RunCancelResponse {
        run,
        correlation_id: meta.correlation_id,
    })
    .into_response())
}

fn audit_denied(
    state: &AppState,
    tenant_id: &str,
    ctx: &AuthContext,
    meta: &RequestMeta,
    reason: &str,
) {
    state.audit.log(AuditEntry {
        tenant_id: tenant_id.to_string(),
        principal_id: ctx.principal_id.clone(),
        action: "runs.create".to_string(),
        resource: SERVICE_NAME.to_string(),
        outcome: "denied".to_string(),
        correlation_id: meta.correlation_id.clone(),
        request_id: meta.request_id.clone(),
        meta: Some(HashMap::from([(
            "reason".to_string(),
            serde_json::Value::String(reason.to_string()),
        )])),
        ..AuditEntry::default()
    });
}

fn sse_response(frame: String) -> Response {
    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "text/event-stream")
        .header(header::CACHE_CONTROL, "no-cache")
        .header(header::CONNECTION, "keep-alive")
        .body(Body::from(frame))
        .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response())
}
