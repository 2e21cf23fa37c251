//! Model Policy server wiring: state, router, and handlers.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::Json;
use axum::Router;
use axum::body::Bytes;
use axum::extract::State;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use tower_http::trace::TraceLayer;

use agentos_core::audit::{AuditEntry, AuditLogger};
use agentos_core::auth::{self, AuthContext};
use agentos_core::error::{Error, Result};
use agentos_core::http::{ApiError, RequestMeta};
use agentos_core::middleware::{
    MetricsGuard, auth_middleware, metrics_guard_middleware, request_id_middleware,
};
use agentos_core::quota::Limiter;
use agentos_core::tenant::TenantStore;
use agentos_core::metrics;

use crate::SERVICE_NAME;
use crate::config::PolicyConfig;
use crate::engine::{Decision, PolicyEngine};
use crate::providers::ProviderRegistry;
use crate::types::{
    HealthResponse, ModelInvokeRequest, ModelInvokeResponse, ModelsListResponse,
    PolicyCheckRequest, PolicyCheckResponse,
};
use crate::usage::UsageMeter;

/// Shared application state for all request handlers.
#[derive(Clone)]
pub struct AppState {
    /// Server configuration.
    pub config: PolicyConfig,
    /// Per-tenant quota gate.
    pub limiter: Arc<Limiter>,
    /// Audit logger.
    pub audit: AuditLogger,
    /// Model catalog.
    pub providers: Arc<ProviderRegistry>,
    /// Policy engine.
    pub engine: PolicyEngine,
    /// Usage meter feeding budget checks.
    pub usage: Arc<UsageMeter>,
    /// Tenant records carrying per-tenant policy.
    pub tenants: Arc<TenantStore>,
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl AppState {
    fn resolve_tenant(
        &self,
        ctx: &AuthContext,
        correlation_id: &str,
    ) -> std::result::Result<String, ApiError> {
        auth::require_tenant(ctx, self.config.default_tenant.as_deref())
            .map_err(|err| ApiError::from(err).with_correlation_id(correlation_id))
    }
}

/// The Model Policy server.
pub struct Server {
    state: AppState,
}

impl std::fmt::Debug for Server {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Server")
            .field("config", &self.state.config)
            .finish_non_exhaustive()
    }
}

impl Server {
    /// Creates a server from configuration with default components.
    #[must_use]
    pub fn new(config: PolicyConfig) -> Self {
        Self::builder().config(config).build()
    }

    /// Creates a new [`ServerBuilder`].
    #[must_use]
    pub fn builder() -> ServerBuilder {
        ServerBuilder::default()
    }

    /// Returns the shared state (primarily for tests).
    #[must_use]
    pub fn state(&self) -> &AppState {
        &self.state
    }

    /// Creates the router with all routes and middleware.
    #[must_use]
    pub fn router(&self) -> Router {
        let state = Arc::new(self.state.clone());

        let metrics_guard = Arc::new(MetricsGuard {
            require_auth: state.config.metrics_require_auth,
            default_tenant: state.config.default_tenant.clone(),
        });

        Router::new()
            .route("/v1/health", get(health))
            .route("/v1/models", get(list_models))
            .route("/v1/models:invoke", post(invoke_model))
            .route("/v1/policy:check", post(policy_check))
            .route(
                "/metrics",
                get(metrics::serve_metrics).layer(axum::middleware::from_fn_with_state(
                    metrics_guard,
                    metrics_guard_middleware,
                )),
            )
            .with_state(state)
            .layer(axum::middleware::from_fn(auth_middleware))
            .layer(TraceLayer::new_for_http())
            .layer(axum::middleware::from_fn_with_state(
                SERVICE_NAME,
                metrics::http_metrics_middleware,
            ))
            .layer(axum::middleware::from_fn(request_id_middleware))
    }

    /// Starts the server and blocks until shutdown.
    ///
    /// # Errors
    ///
    /// Returns an error if validation fails or the port cannot be bound.
    pub async fn serve(&self) -> Result<()> {
        self.state.config.validate()?;
        metrics::init_metrics();

        let addr = SocketAddr::from(([0, 0, 0, 0], self.state.config.http_port));
        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .map_err(|err| Error::Internal(format!("failed to bind to {addr}: {err}")))?;

        tracing::info!(
            port = self.state.config.http_port,
            profile = self.state.config.profile.as_str(),
            "Starting Model Policy"
        );

        axum::serve(listener, self.router())
            .await
            .map_err(|err| Error::Internal(format!("server error: {err}")))?;
        Ok(())
    }
}

/// Builder for constructing a policy server.
pub struct ServerBuilder {
    config: PolicyConfig,
    tenants: Arc<TenantStore>,
    providers: Arc<ProviderRegistry>,
    audit: Option<AuditLogger>,
}

impl Default for ServerBuilder {
    fn default() -> Self {
        Self {
            config: PolicyConfig::default(),
            tenants: Arc::new(TenantStore::new()),
            providers: Arc::new(ProviderRegistry::new()),
            audit: None,
        }
    }
}

impl std::fmt::Debug for ServerBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerBuilder")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl ServerBuilder {
    /// Sets the full configuration.
    #[must_use]
    pub fn config(mut self, config: PolicyConfig) -> Self {
        self.config = config;
        self
    }

    /// Sets the tenant store (carrying per-tenant policies).
    #[must_use]
    pub fn tenant_store(mut self, tenants: Arc<TenantStore>) -> Self {
        self.tenants = tenants;
        self
    }

    /// Sets the provider registry.
    #[must_use]
    pub fn providers(mut self, providers: Arc<ProviderRegistry>) -> Self {
        self.providers = providers;
        self
    }

    /// Sets the audit logger (primarily for tests).
    #[must_use]
    pub fn audit(mut self, audit: AuditLogger) -> Self {
        self.audit = Some(audit);
        self
    }

    /// Builds the server, seeding the default tenant when configured.
    #[must_use]
    pub fn build(self) -> Server {
        let limiter = Arc::new(Limiter::new(self.config.invoke_qps, u32::MAX));
        let audit = self
            .audit
            .unwrap_or_else(|| AuditLogger::from_env(SERVICE_NAME));

        if let Some(default_tenant) = self.config.default_tenant.as_deref() {
            self.tenants.ensure_default(default_tenant);
        }

        Server {
            state: AppState {
                config: self.config,
                limiter,
                audit,
                providers: self.providers,
                engine: PolicyEngine::new(),
                usage: Arc::new(UsageMeter::new()),
                tenants: self.tenants,
            },
        }
    }
}

async fn health() -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok".to_string(),
        service: SERVICE_NAME.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

async fn list_models(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(ModelsListResponse {
        models: state.providers.models(),
    })
}

async fn invoke_model(
    State(state): State<Arc<AppState>>,
    ctx: AuthContext,
    meta: RequestMeta,
    body: Bytes,
) -> std::result::Result<Response, ApiError> {
    let tenant_id = state.resolve_tenant(&ctx, &meta.correlation_id)?;

    if !state.limiter.allow_qps(&tenant_id) {
        metrics::record_quota_denied(SERVICE_NAME, "models_invoke_qps");
        audit_invoke(&state, &tenant_id, &ctx, &meta, SERVICE_NAME, "denied", |m| {
            m.insert(
                "reason".to_string(),
                serde_json::Value::String("qps_exceeded".to_string()),
            );
        });
        return Err(ApiError::quota_exceeded("invoke QPS exceeded")
            .with_correlation_id(&meta.correlation_id));
    }

    let request: ModelInvokeRequest = serde_json::from_slice(&body)
        .map_err(|_| ApiError::invalid_json().with_correlation_id(&meta.correlation_id))?;

    let tenant_policy = state
        .tenants
        .get(&tenant_id)
        .and_then(|tenant| tenant.policy);

    let (decision, reasons) =
        state
            .engine
            .evaluate(&tenant_id, &ctx, &request, tenant_policy.as_ref());
    if decision != Decision::Allow {
        let resource = format!("model/{}", request.model_id);
        audit_invoke(&state, &tenant_id, &ctx, &meta, &resource, "denied", |m| {
            m.insert(
                "policy_reasons".to_string(),
                serde_json::Value::from(reasons.clone()),
            );
        });
        return Err(ApiError::policy_blocked(reasons.join("; "))
            .with_correlation_id(&meta.correlation_id));
    }

    // Budget ordering: deny when the current bucket has reached the limit,
    // before any new usage is recorded.
    if let Some(policy) = tenant_policy.as_ref() {
        let (allowed, reason) = state.usage.check_budget(&tenant_id, policy);
        if !allowed {
            let reason = reason.unwrap_or_else(|| "token_budget_exceeded".to_string());
            let resource = format!("model/{}", request.model_id);
            audit_invoke(&state, &tenant_id, &ctx, &meta, &resource, "denied", |m| {
                m.insert(
                    "reason".to_string(),
                    serde_json::Value::String(reason.clone()),
                );
            });
            return Err(
                ApiError::policy_blocked(reason).with_correlation_id(&meta.correlation_id)
            );
        }
    }

    let (provider, model) = state
        .providers
        .resolve(&request.model_id)
        .ok_or_else(|| ApiError::model_not_found().with_correlation_id(&meta.correlation_id))?;

    let (output, usage) = provider.invoke(&request).map_err(|err| {
        ApiError::provider_error(err.to_string()).with_correlation_id(&meta.correlation_id)
    })?;

    state.usage.record(&tenant_id, &usage);

    let resource = format!("model/{}", request.model_id);
    audit_invoke(&state, &tenant_id, &ctx, &meta, &resource, "allowed", |m| {
        m.insert(
            "operation".to_string(),
            serde_json::Value::String(request.operation.clone()),
        );
        m.insert(
            "model_id".to_string(),
            serde_json::Value::String(model.model_id.clone()),
        );
        m.insert(
            "provider".to_string(),
            serde_json::Value::String(model.provider.clone()),
        );
    });

    Ok(Json(ModelInvokeResponse {
        output,
        usage: Some(usage),
        correlation_id: meta.correlation_id,
    })
    .into_response())
}

async fn policy_check(
    State(state): State<Arc<AppState>>,
    ctx: AuthContext,
    meta: RequestMeta,
    body: Bytes,
) -> std::result::Result<Response, ApiError> {
    let tenant_id = state.resolve_tenant(&ctx, &meta.correlation_id)?;

    let request: PolicyCheckRequest = serde_json::from_slice(&body)
        .map_err(|_| ApiError::invalid_json().with_correlation_id(&meta.correlation_id))?;

    let (decision, reasons) = state.engine.evaluate_policy_check(&tenant_id, &ctx, &request);

    state.audit.log(AuditEntry {
        tenant_id: tenant_id.clone(),
        principal_id: ctx.principal_id.clone(),
        action: "policy.check".to_string(),
        resource: "policy".to_string(),
        outcome: decision.as_str().to_string(),
        correlation_id: meta.correlation_id.clone(),
        request_id: meta.request_id.clone(),
        meta: Some(HashMap::from([(
            "action".to_string(),
            serde_json::Value::String(request.action.clone()),
        )])),
        ..AuditEntry::default()
    });

    Ok(Json(PolicyCheckResponse {
        decision: decision.as_str().to_string(),
        reasons,
        correlation_id: meta.correlation_id,
    })
    .into_response())
}

fn audit_invoke(
    state: &AppState,
    tenant_id: &str,
    ctx: &AuthContext,
    meta: &RequestMeta,
    resource: &str,
    outcome: &str,
    fill: impl FnOnce(&mut HashMap<String, serde_json::Value>),
) {
    let mut extra = HashMap::new();
    fill(&mut extra);
    state.audit.log(AuditEntry {
        tenant_id: tenant_id.to_string(),
        principal_id: ctx.principal_id.clone(),
        action: "models.invoke".to_string(),
        resource: resource.to_string(),
        outcome: outcome.to_string(),
        correlation_id: meta.correlation_id.clone(),
        request_id: meta.request_id.clone(),
        meta: Some(extra),
        ..AuditEntry::default()
    });
}
