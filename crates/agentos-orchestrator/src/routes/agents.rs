//! Agent catalog routes.

use std::sync::Arc;

use axum::Json;
use axum::Router;
use axum::extract::{Path, State};
use axum::response::IntoResponse;
use axum::routing::get;

use agentos_core::auth::AuthContext;
use agentos_core::http::{ApiError, RequestMeta};

use crate::server::AppState;
use crate::types::{AgentGetResponse, AgentListResponse};

/// Creates agent routes.
pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/v1/agents", get(list_agents))
        .route("/v1/agents/{agent_id}", get(get_agent))
}

/// List agents owned by the tenant.
///
/// GET /v1/agents
#[utoipa::path(
    get,
    path = "/v1/agents",
    tag = "agents",
    responses(
        (status = 200, description = "Agents listed", body = AgentListResponse),
        (status = 401, description = "Tenant required"),
        (status = 403, description = "Unknown tenant"),
    )
)]
pub(crate) async fn list_agents(
    State(state): State<Arc<AppState>>,
    ctx: AuthContext,
    meta: RequestMeta,
) -> Result<impl IntoResponse, ApiError> {
    let tenant_id = state.resolve_tenant(&ctx, &meta.correlation_id)?;

    let agents = state.agents.list(&tenant_id).await.map_err(|err| {
        tracing::error!(tenant = %tenant_id, error = %err, "agent list failed");
        ApiError::internal("agent_list_failed", "failed to list agents")
            .with_correlation_id(&meta.correlation_id)
    })?;

    Ok(Json(AgentListResponse {
        agents,
        correlation_id: meta.correlation_id,
    }))
}

/// Get an agent by id.
///
/// GET /v1/agents/{agent\_id}
#[utoipa::path(
    get,
    path = "/v1/agents/{agent_id}",
    tag = "agents",
    params(("agent_id" = String, Path, description = "Agent identifier")),
    responses(
        (status = 200, description = "Agent found", body = AgentGetResponse),
        (status = 404, description = "Agent not found"),
    )
)]
pub(crate) async fn get_agent(
    State(state): State<Arc<AppState>>,
    ctx: AuthContext,
    meta: RequestMeta,
    Path(agent_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let tenant_id = state.resolve_tenant(&ctx, &meta.correlation_id)?;

    let agent = state
        .agents
        .get(&tenant_id, &agent_id)
        .await
        .map_err(|err| {
            tracing::error!(tenant = %tenant_id, error = %err, "agent lookup failed");
            ApiError::internal("agent_lookup_failed", "failed to load agent")
                .with_correlation_id(&meta.correlation_id)
        })?
        // Missing and cross-tenant agents are indistinguishable.
        .ok_or_else(|| {
            ApiError::not_found("agent not found").with_correlation_id(&meta.correlation_id)
        })?;

    Ok(Json(AgentGetResponse {
        agent,
        correlation_id: meta.correlation_id,
    }))
}
