//! Tenant admin routes, gated by the `tenants:admin` scope.
//!
//! Admin calls authenticate by scope alone; they do not require the caller's
//! own tenant to resolve. Seeded default tenants cannot be deleted.

use std::sync::Arc;

use axum::Json;
use axum::Router;
use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;

use agentos_core::audit::AuditEntry;
use agentos_core::auth::AuthContext;
use agentos_core::http::{ApiError, RequestMeta};
use agentos_core::tenant::{Tenant, TenantStoreError};

use crate::server::AppState;

/// Scope required for all tenant admin endpoints.
const ADMIN_SCOPE: &str = "tenants:admin";

/// Response envelope for a single tenant.
#[derive(Debug, serde::Serialize)]
pub struct TenantResponse {
    /// The tenant record.
    pub tenant: Tenant,
    /// Correlation identifier.
    pub correlation_id: String,
}

/// Response envelope for tenant listing.
#[derive(Debug, serde::Serialize)]
pub struct TenantListResponse {
    /// All tenant records.
    pub tenants: Vec<Tenant>,
    /// Correlation identifier.
    pub correlation_id: String,
}

/// Response envelope for tenant deletion.
#[derive(Debug, serde::Serialize)]
pub struct TenantDeleteResponse {
    /// Identifier of the deleted tenant.
    pub deleted: String,
    /// Correlation identifier.
    pub correlation_id: String,
}

/// Creates tenant admin routes.
pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/v1/admin/tenants", get(list_tenants).post(create_tenant))
        .route(
            "/v1/admin/tenants/{tenant_id}",
            get(get_tenant)
                .put(update_tenant)
                .patch(update_tenant)
                .delete(delete_tenant),
        )
}

fn require_admin(ctx: &AuthContext, meta: &RequestMeta) -> Result<(), ApiError> {
    if ctx.has_scope(ADMIN_SCOPE) {
        Ok(())
    } else {
        Err(ApiError::forbidden("admin scope required").with_correlation_id(&meta.correlation_id))
    }
}

pub(crate) async fn list_tenants(
    State(state): State<Arc<AppState>>,
    ctx: AuthContext,
    meta: RequestMeta,
) -> Result<impl IntoResponse, ApiError> {
    require_admin(&ctx, &meta)?;
    Ok(Json(TenantListResponse {
        tenants: state.tenants.list(),
        correlation_id: meta.correlation_id,
    }))
}

pub(crate) async fn create_tenant(
    State(state): State<Arc<AppState>>,
    ctx: AuthContext,
    meta: RequestMeta,
    body: Bytes,
) -> Result<Response, ApiError> {
    require_admin(&ctx, &meta)?;

    let tenant: Tenant = serde_json::from_slice(&body)
        .map_err(|_| ApiError::invalid_json().with_correlation_id(&meta.correlation_id))?;

    let created = state.tenants.create(tenant).map_err(|err| {
        map_store_error(err).with_correlation_id(&meta.correlation_id)
    })?;

    audit_admin(&state, &ctx, &meta, "tenants.create", &created.tenant_id);

    Ok((
        StatusCode::CREATED,
        Json(TenantResponse {
            tenant: created,
            correlation_id: meta.correlation_id,
        }),
    )
        .into_response())
}

pub(crate) async fn get_tenant(
    State(state): State<Arc<AppState>>,
    ctx: AuthContext,
    meta: RequestMeta,
    Path(tenant_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    require_admin(&ctx, &meta)?;

    let tenant = state.tenants.get(&tenant_id).ok_or_else(|| {
        ApiError::not_found("tenant not found").with_correlation_id(&meta.correlation_id)
    })?;

    Ok(Json(TenantResponse {
        tenant,
        correlation_id: meta.correlation_id,
    }))
}

pub(crate) async fn update_tenant(
    State(state): State<Arc<AppState>>,
    ctx: AuthContext,
    meta: RequestMeta,
    Path(tenant_id): Path<String>,
    body: Bytes,
) -> Result<impl IntoResponse, ApiError> {
    require_admin(&ctx, &meta)?;

    let update: Tenant = serde_json::from_slice(&body)
        .map_err(|_| ApiError::invalid_json().with_correlation_id(&meta.correlation_id))?;

    let updated = state.tenants.update(&tenant_id, update).map_err(|err| {
        map_store_error(err).with_correlation_id(&meta.correlation_id)
    })?;

    audit_admin(&state, &ctx, &meta, "tenants.update", &tenant_id);

    Ok(Json(TenantResponse {
        tenant: updated,
        correlation_id: meta.correlation_id,
    }))
}

pub(crate) async fn delete_tenant(
    State(state): State<Arc<AppState>>,
    ctx: AuthContext,
    meta: RequestMeta,
    Path(tenant_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    require_admin(&ctx, &meta)?;

    state.tenants.delete(&tenant_id).map_err(|err| {
        map_store_error(err).with_correlation_id(&meta.correlation_id)
    })?;

    audit_admin(&state, &ctx, &meta, "tenants.delete", &tenant_id);

    Ok(Json(TenantDeleteResponse {
        deleted: tenant_id,
        correlation_id: meta.correlation_id,
    }))
}

fn map_store_error(err: TenantStoreError) -> ApiError {
    match err {
        TenantStoreError::TenantExists => ApiError::conflict(err.to_string()),
        TenantStoreError::NotFound => ApiError::not_found(err.to_string()),
        TenantStoreError::InvalidTenant | TenantStoreError::ProtectedDefault => {
            ApiError::invalid_request(err.to_string())
        }
    }
}

fn audit_admin(
    state: &AppState,
    ctx: &AuthContext,
    meta: &RequestMeta,
    action: &str,
    tenant_id: &str,
) {
    state.audit.log(AuditEntry {
        tenant_id: tenant_id.to_string(),
        principal_id: ctx.principal_id.clone(),
        action: action.to_string(),
        resource: format!("tenant/{tenant_id}"),
        outcome: "allowed".to_string(),
        correlation_id: meta.correlation_id.clone(),
        request_id: meta.request_id.clone(),
        ..AuditEntry::default()
    });
}
