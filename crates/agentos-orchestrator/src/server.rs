//! Orchestrator server wiring: state, router, and lifecycle.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Json;
use axum::Router;
use axum::response::IntoResponse;
use axum::routing::get;
use tower_http::trace::TraceLayer;

use agentos_core::audit::AuditLogger;
use agentos_core::auth::{self, AuthContext};
use agentos_core::error::{Error, Result};
use agentos_core::http::ApiError;
use agentos_core::middleware::{
    MetricsGuard, auth_middleware, metrics_guard_middleware, request_id_middleware,
};
use agentos_core::quota::Limiter;
use agentos_core::tenant::TenantStore;

use crate::SERVICE_NAME;
use crate::config::OrchestratorConfig;
use crate::store::{AgentStore, FileAgentStore, FileRunStore, RunStore};
use crate::types::{Agent, HealthResponse};

/// Shared application state for all request handlers.
#[derive(Clone)]
pub struct AppState {
    /// Server configuration.
    pub config: OrchestratorConfig,
    /// Run persistence port.
    pub runs: Arc<dyn RunStore>,
    /// Agent persistence port.
    pub agents: Arc<dyn AgentStore>,
    /// Tenant admin store.
    pub tenants: Arc<TenantStore>,
    /// Per-tenant quota gate.
    pub limiter: Arc<Limiter>,
    /// Audit logger.
    pub audit: AuditLogger,
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("config", &self.config)
            .field("runs", &"<RunStore>")
            .field("agents", &"<AgentStore>")
            .finish_non_exhaustive()
    }
}

impl AppState {
    /// Resolves the request tenant and verifies it has a tenant record.
    ///
    /// Tenant resolution failures map to `tenant_mismatch` (400) or
    /// `unauthorized` (401); an unknown tenant maps to `tenant_unknown`
    /// (403).
    ///
    /// # Errors
    ///
    /// Returns the mapped [`ApiError`] with the correlation id attached.
    pub fn resolve_tenant(
        &self,
        ctx: &AuthContext,
        correlation_id: &str,
    ) -> std::result::Result<String, ApiError> {
        let tenant = auth::require_tenant(ctx, self.config.default_tenant.as_deref())
            .map_err(|err| ApiError::from(err).with_correlation_id(correlation_id))?;
        if !self.tenants.exists(&tenant) {
            return Err(ApiError::tenant_unknown().with_correlation_id(correlation_id));
        }
        Ok(tenant)
    }
}

/// The Agent Orchestrator server.
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
    /// Creates a server with file-backed stores from the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error when persisted state cannot be loaded.
    pub fn new(config: OrchestratorConfig) -> Result<Self> {
        let runs = FileRunStore::open(&config.run_store_file)
            .map_err(|err| Error::storage(format!("run store: {err}")))?;
        let agents = FileAgentStore::open(&config.agent_store_dir)
            .map_err(|err| Error::storage(format!("agent store: {err}")))?;
        Ok(Self::builder()
            .config(config)
            .run_store(Arc::new(runs))
            .agent_store(Arc::new(agents))
            .build())
    }

    /// Creates a new [`ServerBuilder`].
    #[must_use]
    pub fn builder() -> ServerBuilder {
        ServerBuilder::default()
    }

    /// Returns the server configuration.
    #[must_use]
    pub fn config(&self) -> &OrchestratorConfig {
        &self.state.config
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
            .route("/openapi.json", get(crate::openapi::serve_openapi))
            .route(
                "/metrics",
                get(agentos_core::metrics::serve_metrics).layer(
                    axum::middleware::from_fn_with_state(metrics_guard, metrics_guard_middleware),
                ),
            )
            .merge(crate::routes::routes())
            .with_state(state)
            // Order matters: request-id outermost so every response carries
            // X-Request-Id, then metrics, trace, auth context.
            .layer(axum::middleware::from_fn(auth_middleware))
            .layer(TraceLayer::new_for_http())
            .layer(axum::middleware::from_fn_with_state(
                SERVICE_NAME,
                agentos_core::metrics::http_metrics_middleware,
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
        agentos_core::metrics::init_metrics();

        let addr = SocketAddr::from(([0, 0, 0, 0], self.state.config.http_port));
        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .map_err(|err| Error::Internal(format!("failed to bind to {addr}: {err}")))?;

        tracing::info!(
            port = self.state.config.http_port,
            profile = self.state.config.profile.as_str(),
            "Starting Agent Orchestrator"
        );

        axum::serve(listener, self.router())
            .await
            .map_err(|err| Error::Internal(format!("server error: {err}")))?;
        Ok(())
    }
}

/// Builder for constructing an orchestrator server.
pub struct ServerBuilder {
    config: OrchestratorConfig,
    runs: Arc<dyn RunStore>,
    agents: Arc<dyn AgentStore>,
    tenants: Arc<TenantStore>,
    audit: Option<AuditLogger>,
}

impl Default for ServerBuilder {
    fn default() -> Self {
        Self {
            config: OrchestratorConfig::default(),
            runs: Arc::new(FileRunStore::in_memory()),
            agents: Arc::new(FileAgentStore::in_memory()),
            tenants: Arc::new(TenantStore::new()),
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
    pub fn config(mut self, config: OrchestratorConfig) -> Self {
        self.config = config;
        self
    }

    /// Sets the run store.
    #[must_use]
    pub fn run_store(mut self, runs: Arc<dyn RunStore>) -> Self {
        self.runs = runs;
        self
    }

    /// Sets the agent store.
    #[must_use]
    pub fn agent_store(mut self, agents: Arc<dyn AgentStore>) -> Self {
        self.agents = agents;
        self
    }

    /// Sets the tenant store.
    #[must_use]
    pub fn tenant_store(mut self, tenants: Arc<TenantStore>) -> Self {
        self.tenants = tenants;
        self
    }

    /// Sets the audit logger (primarily for tests).
    #[must_use]
    pub fn audit(mut self, audit: AuditLogger) -> Self {
        self.audit = Some(audit);
        self
    }

    /// Builds the server, seeding the default tenant and demo agent when a
    /// default tenant is configured.
    #[must_use]
    pub fn build(self) -> Server {
        let limiter = Arc::new(Limiter::new(
            self.config.run_create_qps,
            self.config.concurrent_runs,
        ));
        let audit = self
            .audit
            .unwrap_or_else(|| AuditLogger::from_env(SERVICE_NAME));

        let state = AppState {
            config: self.config,
            runs: self.runs,
            agents: self.agents,
            tenants: self.tenants,
            limiter,
            audit,
        };

        if let Some(default_tenant) = state.config.default_tenant.clone() {
            state.tenants.ensure_default(&default_tenant);
            seed_demo_agent(&state, &default_tenant);
        }

        Server { state }
    }
}

/// Seeds the demo agent for the default tenant. Existing records win.
fn seed_demo_agent(state: &AppState, tenant_id: &str) {
    let now = chrono::Utc::now();
    let demo = Agent {
        agent_id: "agt_demo".to_string(),
        tenant_id: tenant_id.to_string(),
        name: "Demo Agent".to_string(),
        description: "Sample agent for validation".to_string(),
        version: "1.0".to_string(),
        status: "active".to_string(),
        created_at: now,
        updated_at: now,
    };
    let agents = Arc::clone(&state.agents);
    if let Ok(handle) = tokio::runtime::Handle::try_current() {
        handle.spawn(async move {
            // Ignore the duplicate error when the agent is already persisted.
            let _ = agents.create(demo).await;
        });
    }
}

async fn health() -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok".to_string(),
        service: SERVICE_NAME.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}
