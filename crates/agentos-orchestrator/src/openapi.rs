//! OpenAPI document for the orchestrator API surface.

use axum::Json;
use axum::response::IntoResponse;
use utoipa::OpenApi;

use crate::routes::{agents, runs};
use crate::types::{
    Agent, AgentGetResponse, AgentListResponse, HealthResponse, Run, RunCancelResponse,
    RunCreateRequest, RunCreateResponse, RunError, RunGetResponse, RunOptions, RunOutput,
    RunStatus,
};

/// OpenAPI document for the Agent Orchestrator.
#[derive(OpenApi)]
#[openapi(
    info(
        title = "AgentOS Agent Orchestrator API",
        description = "Tenant-scoped agent run lifecycle and event streaming."
    ),
    paths(
        runs::create_run,
        runs::get_run,
        runs::run_events,
        runs::cancel_run,
        agents::list_agents,
        agents::get_agent,
    ),
    components(schemas(
        Agent,
        AgentGetResponse,
        AgentListResponse,
        HealthResponse,
        Run,
        RunCancelResponse,
        RunCreateRequest,
        RunCreateResponse,
        RunError,
        RunGetResponse,
        RunOptions,
        RunOutput,
        RunStatus,
    ))
)]
pub struct ApiDoc;

/// Serves the OpenAPI document at `/openapi.json`.
pub async fn serve_openapi() -> impl IntoResponse {
    Json(ApiDoc::openapi())
}
