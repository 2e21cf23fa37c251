//! Federation server wiring: state, router, and handlers.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::Json;
use axum::Router;
use axum::body::Bytes;
use axum::extract::{Path, Query, Request, State};
use axum::http::StatusCode;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use chrono::Utc;
use serde_json::Value;
use tower_http::trace::TraceLayer;

use agentos_core::audit::{AuditEntry, AuditLogger};
use agentos_core::auth::{self, AuthContext};
use agentos_core::error::{Error, Result};
use agentos_core::http::{ApiError, RequestMeta, correlation_id};
use agentos_core::metrics;
use agentos_core::middleware::{
    MetricsGuard, auth_middleware, metrics_guard_middleware, request_id_middleware,
};
use agentos_core::event;

use crate::SERVICE_NAME;
use crate::config::FederationConfig;
use crate::event_store::EventStore;
use crate::forward_index::ForwardIndex;
use crate::forwarder::Forwarder;
use crate::jwt::{JwtError, JwtVerifier};
use crate::peers::PeerRegistry;
use crate::sse_proxy::{SseProxy, stream_stored_events};
use crate::types::{
    ForwardRequest, ForwardResponse, ForwardedRunView, ForwardedTo, HealthResponse,
    IngestRequest, IngestResponse, PeerCapabilitiesResponse, PeerResponse,
};

/// Shared application state for all request handlers.
#[derive(Clone)]
pub struct AppState {
    /// Server configuration.
    pub config: FederationConfig,
    /// Static peer catalog; absent in unconfigured dev setups.
    pub registry: Option<Arc<PeerRegistry>>,
    /// Outbound run forwarder.
    pub forwarder: Arc<Forwarder>,
    /// Persistent forward routing index.
    pub index: Arc<ForwardIndex>,
    /// Push-mode event ingest buffer.
    pub events: Arc<EventStore>,
    /// SSE back-haul proxy.
    pub proxy: Arc<SseProxy>,
    /// Optional bearer signature verifier.
    pub jwt: Arc<Option<JwtVerifier>>,
    /// Audit logger.
    pub audit: AuditLogger,
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("config", &self.config)
            .field("registry", &self.registry.is_some())
            .field("jwt", &self.jwt.is_some())
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

/// The Federation server.
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
    /// Creates a server from configuration: loads the peer registry and
    /// forward index, builds the mTLS-aware forwarder, and picks up the JWT
    /// verifier when configured.
    ///
    /// # Errors
    ///
    /// Returns an error when persisted state or certificate material cannot
    /// be loaded.
    pub fn new(config: FederationConfig) -> Result<Self> {
        let registry = match &config.peers_file {
            Some(path) => Some(Arc::new(PeerRegistry::load(path)?)),
            None => None,
        };
        let forwarder = Forwarder::new(config.forward_max_attempts, config.forward_base_backoff)?;
        let index = ForwardIndex::open(&config.forward_index_file)
            .map_err(|err| Error::storage(format!("forward index: {err}")))?;

        Ok(Self::builder()
            .config(config)
            .maybe_registry(registry)
            .forwarder(Arc::new(forwarder))
            .forward_index(Arc::new(index))
            .jwt_verifier(JwtVerifier::from_env())
            .build())
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
        let jwt_layer = axum::middleware::from_fn_with_state(
            Arc::clone(&state.jwt),
            jwt_verify_middleware,
        );

        let federation = Router::new()
            .route("/v1/federation/peer", get(peer))
            .route("/v1/federation/peer/capabilities", get(peer_capabilities))
            .route("/v1/federation/runs:forward", post(forward_run))
            .route("/v1/federation/runs/{run_id}/events", get(run_events))
            .route("/v1/federation/events:ingest", post(ingest_events))
            .layer(jwt_layer);

        Router::new()
            // Health stays reachable without a bearer token.
            .route("/v1/federation/health", get(health))
            .route(
                "/metrics",
                get(metrics::serve_metrics).layer(axum::middleware::from_fn_with_state(
                    metrics_guard,
                    metrics_guard_middleware,
                )),
            )
            .merge(federation)
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
            mtls = self.state.config.require_mtls,
            "Starting Federation node"
        );

        axum::serve(listener, self.router())
            .await
            .map_err(|err| Error::Internal(format!("server error: {err}")))?;
        Ok(())
    }
}

/// Builder for constructing a federation server.
pub struct ServerBuilder {
    config: FederationConfig,
    registry: Option<Arc<PeerRegistry>>,
    forwarder: Option<Arc<Forwarder>>,
    index: Arc<ForwardIndex>,
    events: Arc<EventStore>,
    jwt: Option<JwtVerifier>,
    audit: Option<AuditLogger>,
}

impl Default for ServerBuilder {
    fn default() -> Self {
        Self {
            config: FederationConfig::default(),
            registry: None,
            forwarder: None,
            index: Arc::new(ForwardIndex::in_memory()),
            events: Arc::new(EventStore::new()),
            jwt: None,
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
    pub fn config(mut self, config: FederationConfig) -> Self {
        self.config = config;
        self
    }

    /// Sets the peer registry.
    #[must_use]
    pub fn registry(mut self, registry: Arc<PeerRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Sets an optional peer registry.
    #[must_use]
    pub fn maybe_registry(mut self, registry: Option<Arc<PeerRegistry>>) -> Self {
        self.registry = registry;
        self
    }

    /// Sets the forwarder.
    #[must_use]
    pub fn forwarder(mut self, forwarder: Arc<Forwarder>) -> Self {
        self.forwarder = Some(forwarder);
        self
    }

    /// Sets the forward index.
    #[must_use]
    pub fn forward_index(mut self, index: Arc<ForwardIndex>) -> Self {
        self.index = index;
        self
    }

    /// Sets the event ingest store.
    #[must_use]
    pub fn event_store(mut self, events: Arc<EventStore>) -> Self {
        self.events = events;
        self
    }

    /// Sets the JWT verifier.
    #[must_use]
    pub fn jwt_verifier(mut self, jwt: Option<JwtVerifier>) -> Self {
        self.jwt = jwt;
        self
    }

    /// Sets the audit logger (primarily for tests).
    #[must_use]
    pub fn audit(mut self, audit: AuditLogger) -> Self {
        self.audit = Some(audit);
        self
    }

    /// Builds the server.
    ///
    /// # Panics
    ///
    /// Panics only if the default forwarder cannot construct a plain HTTP
    /// client, which would mean the TLS backend itself is broken.
    #[must_use]
    pub fn build(self) -> Server {
        let forwarder = self.forwarder.unwrap_or_else(|| {
            Arc::new(
                Forwarder::new(
                    self.config.forward_max_attempts,
                    self.config.forward_base_backoff,
                )
                .expect("default forwarder"),
            )
        });
        let audit = self
            .audit
            .unwrap_or_else(|| AuditLogger::from_env(SERVICE_NAME));

        Server {
            state: AppState {
                config: self.config,
                registry: self.registry,
                forwarder,
                index: self.index,
                events: self.events,
                proxy: Arc::new(SseProxy::new()),
                jwt: Arc::new(self.jwt),
                audit,
            },
        }
    }
}

/// Verifies bearer signatures when a key is configured; otherwise passes
/// through and claim extraction alone drives identity.
async fn jwt_verify_middleware(
    State(jwt): State<Arc<Option<JwtVerifier>>>,
    request: Request,
    next: Next,
) -> Response {
    let Some(verifier) = jwt.as_ref() else {
        return next.run(request).await;
    };

    let correlation = correlation_id(request.headers());
    let token = request
        .headers()
        .get("Authorization")
        .and_then(|value| value.to_str().ok())
        .and_then(|raw| {
            raw.to_ascii_lowercase()
                .starts_with("bearer ")
                .then(|| raw["bearer ".len()..].trim().to_string())
        })
        .filter(|token| !token.is_empty());

    let Some(token) = token else {
        return ApiError::unauthorized("missing bearer token")
            .with_correlation_id(correlation)
            .into_response();
    };

    if let Err(err) = verifier.verify(&token) {
        let message = match err {
            JwtError::TokenExpired => "token expired",
            _ => "invalid token",
        };
        return ApiError::jwt_verification_failed(message)
            .with_correlation_id(correlation)
            .into_response();
    }

    next.run(request).await
}

async fn health() -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok".to_string(),
        service: SERVICE_NAME.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

async fn peer(
    State(state): State<Arc<AppState>>,
    meta: RequestMeta,
) -> std::result::Result<Response, ApiError> {
    let registry = state.registry.as_ref().ok_or_else(|| {
        ApiError::unavailable("peer registry not configured")
            .with_correlation_id(&meta.correlation_id)
    })?;
    Ok(Json(PeerResponse {
        peer: registry.local().clone(),
        correlation_id: meta.correlation_id,
    })
    .into_response())
}

async fn peer_capabilities(
    State(state): State<Arc<AppState>>,
    meta: RequestMeta,
) -> std::result::Result<Response, ApiError> {
    let registry = state.registry.as_ref().ok_or_else(|| {
        ApiError::unavailable("peer registry not configured")
            .with_correlation_id(&meta.correlation_id)
    })?;
    Ok(Json(PeerCapabilitiesResponse {
        stack_id: registry.local().stack_id.clone(),
        protocol: "1.0".to_string(),
        capabilities: vec![
            "runs.forward".to_string(),
            "events.ingest".to_string(),
            "events.sse_proxy".to_string(),
        ],
        event_backhaul: serde_json::json!({"mode": "sse_proxy"}),
    })
    .into_response())
}

async fn forward_run(
    State(state): State<Arc<AppState>>,
    ctx: AuthContext,
    meta: RequestMeta,
    body: Bytes,
) -> std::result::Result<Response, ApiError> {
    let tenant_id = state.resolve_tenant(&ctx, &meta.correlation_id)?;

    let request: ForwardRequest = serde_json::from_slice(&body)
        .map_err(|_| ApiError::invalid_json().with_correlation_id(&meta.correlation_id))?;
    let forward = request.forward;

    // The body's auth block must agree with the resolved request tenant.
    if let Some(body_tenant) = forward.auth.tenant_id.as_deref().filter(|t| !t.is_empty()) {
        if body_tenant != tenant_id {
            return Err(ApiError::tenant_mismatch().with_correlation_id(&meta.correlation_id));
        }
    }

    let agent_id = forward.run_request.agent_id.clone();
    if agent_id.is_empty() {
        return Err(
            ApiError::invalid_request("forward.run_request.agent_id required")
                .with_correlation_id(&meta.correlation_id),
        );
    }
    let stack_id = forward.target_selector.stack_id.clone();
    if stack_id.is_empty() {
        return Err(
            ApiError::invalid_request("forward.target_selector.stack_id required")
                .with_correlation_id(&meta.correlation_id),
        );
    }

    let registry = state.registry.as_ref().ok_or_else(|| {
        ApiError::unavailable("peer registry not configured")
            .with_correlation_id(&meta.correlation_id)
    })?;
    let peer = registry.get(&stack_id).ok_or_else(|| {
        ApiError::invalid_request(format!("unknown target stack_id: {stack_id}"))
            .with_correlation_id(&meta.correlation_id)
    })?;

    let principal_id = forward
        .auth
        .principal_id
        .clone()
        .filter(|p| !p.is_empty())
        .unwrap_or_else(|| ctx.principal_id.clone());
    let remote_body = forward.run_request.to_remote_body();

    let forwarded = state
        .forwarder
        .forward_run(
            &peer.endpoints.agent_orchestrator_base_url,
            &agent_id,
            &tenant_id,
            Some(principal_id.as_str()),
            ctx.bearer_token.as_deref(),
            &remote_body,
        )
        .await
        .map_err(|err| {
            metrics::record_forward_failure(SERVICE_NAME, "forward_run_failed");
            audit_forward(&state, &tenant_id, &ctx, &meta, &stack_id, "denied");
            tracing::warn!(
                tenant = %tenant_id,
                stack = %stack_id,
                error = %err,
                "forward failed"
            );
            ApiError::forward_failed("remote run create failed")
                .with_correlation_id(&meta.correlation_id)
        })?;

    // The mapping is what routes later event-stream requests; losing it
    // strands the run, so the forward fails closed here.
    state
        .index
        .put(
            &tenant_id,
            &forwarded.run_id,
            &stack_id,
            &forwarded.events_url,
        )
        .map_err(|err| {
            tracing::error!(tenant = %tenant_id, error = %err, "forward index persist failed");
            ApiError::run_persist_failed("failed to persist forward mapping")
                .with_correlation_id(&meta.correlation_id)
        })?;

    audit_forward(&state, &tenant_id, &ctx, &meta, &stack_id, "allowed");

    let response = ForwardResponse {
        forwarded_to: ForwardedTo {
            stack_id,
            remote_run_id: forwarded.run_id.clone(),
        },
        run: ForwardedRunView {
            tenant_id,
            agent_id,
            run_id: forwarded.run_id.clone(),
            status: forwarded.status,
            created_at: Utc::now(),
            events_url: format!("/v1/federation/runs/{}/events", forwarded.run_id),
        },
        correlation_id: meta.correlation_id,
    };
    Ok((StatusCode::OK, Json(response)).into_response())
}

async fn run_events(
    State(state): State<Arc<AppState>>,
    ctx: AuthContext,
    meta: RequestMeta,
    Path(run_id): Path<String>,
    Query(query): Query<HashMap<String, String>>,
) -> std::result::Result<Response, ApiError> {
    let tenant_id = state.resolve_tenant(&ctx, &meta.correlation_id)?;

    let from_sequence = query
        .get("from_sequence")
        .and_then(|raw| raw.trim().parse::<i64>().ok())
        .unwrap_or(0);

    // Pull-mode back-haul: a forwarded run proxies the remote stream.
    if let Some(target) = state.index.get(&tenant_id, &run_id) {
        return state
            .proxy
            .proxy(
                &target.remote_events_url,
                &tenant_id,
                Some(ctx.principal_id.as_str()),
                ctx.bearer_token.as_deref(),
                from_sequence,
            )
            .await
            .map_err(|err| {
                tracing::warn!(
                    tenant = %tenant_id,
                    run = %run_id,
                    stack = %target.remote_stack_id,
                    error = %err,
                    "event proxy failed"
                );
                ApiError::events_proxy_failed("remote event stream unavailable")
                    .with_correlation_id(&meta.correlation_id)
            });
    }

    // Push-mode back-haul: events previously delivered via ingest.
    if let Some(envelopes) = state.events.list_from_sequence(&tenant_id, &run_id, from_sequence) {
        return Ok(stream_stored_events(&envelopes));
    }

    Err(ApiError::not_found("run not found").with_correlation_id(&meta.correlation_id))
}

async fn ingest_events(
    State(state): State<Arc<AppState>>,
    ctx: AuthContext,
    meta: RequestMeta,
    body: Bytes,
) -> std::result::Result<Response, ApiError> {
    let tenant_id = state.resolve_tenant(&ctx, &meta.correlation_id)?;

    let request: IngestRequest = serde_json::from_slice(&body)
        .map_err(|_| ApiError::invalid_json().with_correlation_id(&meta.correlation_id))?;

    if let Some(body_tenant) = request
        .auth
        .as_ref()
        .and_then(|auth| auth.tenant_id.as_deref())
        .filter(|t| !t.is_empty())
    {
        if body_tenant != tenant_id {
            return Err(ApiError::tenant_mismatch().with_correlation_id(&meta.correlation_id));
        }
    }

    // Envelopes group by their run; ones without a run_id cannot be stored.
    let mut by_run: Vec<(String, Vec<Value>)> = Vec::new();
    let mut rejected = 0;
    for envelope in request.events {
        let run_id = event::envelope_event(&envelope)
            .and_then(event::event_run_id)
            .map(str::to_string);
        match run_id {
            Some(run_id) => match by_run.iter_mut().find(|(id, _)| *id == run_id) {
                Some((_, group)) => group.push(envelope),
                None => by_run.push((run_id, vec![envelope])),
            },
            None => rejected += 1,
        }
    }

    let mut accepted = 0;
    for (run_id, envelopes) in by_run {
        let (run_accepted, run_rejected) = state.events.ingest(&tenant_id, &run_id, envelopes);
        accepted += run_accepted;
        rejected += run_rejected;
    }

    state.audit.log(AuditEntry {
        tenant_id: tenant_id.clone(),
        principal_id: ctx.principal_id.clone(),
        action: "events.ingest".to_string(),
        resource: SERVICE_NAME.to_string(),
        outcome: "allowed".to_string(),
        correlation_id: meta.correlation_id.clone(),
        request_id: meta.request_id.clone(),
        meta: Some(HashMap::from([
            (
                "accepted".to_string(),
                Value::Number(serde_json::Number::from(accepted)),
            ),
            (
                "rejected".to_string(),
                Value::Number(serde_json::Number::from(rejected)),
            ),
        ])),
        ..AuditEntry::default()
    });

    Ok(Json(IngestResponse {
        accepted,
        rejected,
        correlation_id: meta.correlation_id,
    })
    .into_response())
}

fn audit_forward(
    state: &AppState,
    tenant_id: &str,
    ctx: &AuthContext,
    meta: &RequestMeta,
    stack_id: &str,
    outcome: &str,
) {
    state.audit.log(AuditEntry {
        tenant_id: tenant_id.to_string(),
        principal_id: ctx.principal_id.clone(),
        action: "runs.forward".to_string(),
        resource: format!("stack/{stack_id}"),
        outcome: outcome.to_string(),
        correlation_id: meta.correlation_id.clone(),
        request_id: meta.request_id.clone(),
        ..AuditEntry::default()
    });
}
