//! End-to-end forward and back-haul tests against a live remote stub.
//!
//! A throwaway axum server stands in for the remote Agent Orchestrator; the
//! federation node forwards to it and proxies its event stream back.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use anyhow::{Context, Result};
use axum::Router;
use axum::body::Body;
use axum::extract::{Query, State};
use axum::http::{HeaderMap, Request, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use serde_json::{Value, json};
use tower::ServiceExt;

use agentos_core::audit::{AuditLogger, TestAuditSink};
use agentos_federation::config::FederationConfig;
use agentos_federation::forwarder::Forwarder;
use agentos_federation::peers::{PeerEndpoints, PeerInfo, PeerRegistry, PeersFile};
use agentos_federation::server::{Server, ServerBuilder};

#[derive(Clone, Default)]
struct RemoteState {
    attempts: Arc<AtomicUsize>,
    failures_before_success: Arc<AtomicUsize>,
    /// When non-zero, every create answers with this status.
    fixed_status: Arc<AtomicUsize>,
    seen_tenant: Arc<std::sync::Mutex<String>>,
    seen_auth: Arc<std::sync::Mutex<String>>,
    seen_query: Arc<std::sync::Mutex<String>>,
    events_body: Arc<std::sync::Mutex<String>>,
}

async fn remote_create_run(State(state): State<RemoteState>, headers: HeaderMap) -> Response {
    let attempt = state.attempts.fetch_add(1, Ordering::SeqCst) + 1;
    if let Some(tenant) = headers.get("X-Tenant-Id").and_then(|v| v.to_str().ok()) {
        *state.seen_tenant.lock().expect("lock") = tenant.to_string();
    }
    if let Some(auth) = headers.get("Authorization").and_then(|v| v.to_str().ok()) {
        *state.seen_auth.lock().expect("lock") = auth.to_string();
    }

    let fixed = state.fixed_status.load(Ordering::SeqCst);
    if fixed != 0 {
        let status = StatusCode::from_u16(u16::try_from(fixed).unwrap_or(500))
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        return (status, "fixed response").into_response();
    }
    if attempt <= state.failures_before_success.load(Ordering::SeqCst) {
        return (StatusCode::BAD_GATEWAY, "upstream glitch").into_response();
    }

    axum::Json(json!({"run": {
        "run_id": "run123",
        "events_url": "/v1/runs/run123/events",
        "status": "running"
    }}))
    .into_response()
}

async fn remote_events(
    State(state): State<RemoteState>,
    Query(query): Query<std::collections::HashMap<String, String>>,
) -> Response {
    *state.seen_query.lock().expect("lock") = query
        .get("from_sequence")
        .cloned()
        .unwrap_or_default();
    let body = state.events_body.lock().expect("lock").clone();
    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "text/event-stream")
        .body(Body::from(body))
        .expect("response")
}

async fn start_remote(state: RemoteState) -> Result<String> {
    let router = Router::new()
        .route("/v1/agents/{agent_id}/runs", post(remote_create_run))
        .route("/v1/runs/{run_id}/events", get(remote_events))
        .with_state(state);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    tokio::spawn(async move {
        let _ = axum::serve(listener, router).await;
    });
    Ok(format!("http://{addr}"))
}

fn federation_server(remote_base: &str) -> Server {
    let registry = Arc::new(PeerRegistry::from_file(PeersFile {
        local: PeerInfo {
            stack_id: "stack-a".to_string(),
            ..PeerInfo::default()
        },
        peers: vec![PeerInfo {
            stack_id: "stack-b".to_string(),
            endpoints: PeerEndpoints {
                agent_orchestrator_base_url: remote_base.to_string(),
                ..PeerEndpoints::default()
            },
            ..PeerInfo::default()
        }],
    }));

    let forwarder =
        Forwarder::new(3, Duration::from_millis(10)).expect("forwarder");

    ServerBuilder::default()
        .config(FederationConfig::default())
        .registry(registry)
        .forwarder(Arc::new(forwarder))
        .audit(AuditLogger::new(Arc::new(TestAuditSink::new())))
        .build()
}

fn sse_frame(event_id: &str, sequence: i64) -> String {
    let envelope = json!({"event": {"event_id": event_id, "sequence": sequence}});
    format!("event: agentos.event\ndata: {envelope}\n\n")
}

async fn send(router: &Router, request: Request<Body>) -> Result<(StatusCode, Value)> {
    let response = router
        .clone()
        .oneshot(request)
        .await
        .unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), 1024 * 1024)
        .await
        .context("read body")?;
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).context("parse body")?
    };
    Ok((status, value))
}

fn forward_request() -> Result<Request<Body>> {
    Ok(Request::builder()
        .method("POST")
        .uri("/v1/federation/runs:forward")
        .header("X-Tenant-Id", "tnt_fed")
        .header("Content-Type", "application/json")
        .body(Body::from(
            json!({"forward": {
                "target_selector": {"stack_id": "stack-b"},
                "auth": {"tenant_id": "tnt_fed", "principal_id": "usr_1"},
                "run_request": {
                    "agent_id": "agt_remote",
                    "input": {"type": "text", "text": "hello"}
                }
            }})
            .to_string(),
        ))?)
}

#[tokio::test]
async fn forward_retries_transient_failures() -> Result<()> {
    let remote = RemoteState::default();
    remote.failures_before_success.store(1, Ordering::SeqCst);
    let base = start_remote(remote.clone()).await?;

    let server = federation_server(&base);
    let router = server.router();

    let (status, body) = send(&router, forward_request()?).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["forwarded_to"]["stack_id"], "stack-b");
    assert_eq!(body["forwarded_to"]["remote_run_id"], "run123");
    assert_eq!(body["run"]["run_id"], "run123");
    assert_eq!(body["run"]["status"], "running");
    assert_eq!(body["run"]["events_url"], "/v1/federation/runs/run123/events");

    // One 502 plus the successful retry.
    assert_eq!(remote.attempts.load(Ordering::SeqCst), 2);
    assert_eq!(*remote.seen_tenant.lock().expect("lock"), "tnt_fed");

    // The forward mapping is persisted with the absolutized remote URL.
    let target = server
        .state()
        .index
        .get("tnt_fed", "run123")
        .context("forward mapping")?;
    assert_eq!(target.remote_stack_id, "stack-b");
    assert_eq!(target.remote_events_url, format!("{base}/v1/runs/run123/events"));
    Ok(())
}

#[tokio::test]
async fn forward_fails_fast_on_client_errors() -> Result<()> {
    let remote = RemoteState::default();
    remote.fixed_status.store(400, Ordering::SeqCst);
    let base = start_remote(remote.clone()).await?;

    let server = federation_server(&base);
    let router = server.router();

    let (status, body) = send(&router, forward_request()?).await?;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(body["error"]["code"], "forward_failed");
    assert_eq!(body["error"]["retryable"], true);

    // 4xx is non-retryable: a single attempt, and no routing state behind.
    assert_eq!(remote.attempts.load(Ordering::SeqCst), 1);
    assert!(server.state().index.get("tnt_fed", "run123").is_none());
    Ok(())
}

#[tokio::test]
async fn forward_exhaustion_surfaces_as_502() -> Result<()> {
    let remote = RemoteState::default();
    remote.failures_before_success.store(100, Ordering::SeqCst);
    let base = start_remote(remote.clone()).await?;

    let server = federation_server(&base);
    let router = server.router();

    let (status, body) = send(&router, forward_request()?).await?;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(body["error"]["code"], "forward_failed");
    // The configured budget of three attempts was spent.
    assert_eq!(remote.attempts.load(Ordering::SeqCst), 3);
    Ok(())
}

#[tokio::test]
async fn proxied_events_are_deduped_and_monotonic() -> Result<()> {
    let remote = RemoteState::default();
    let mut stream = String::new();
    stream.push_str(&sse_frame("e1", 1));
    stream.push_str(&sse_frame("e1", 2)); // duplicate event id
    stream.push_str(&sse_frame("e2", 2));
    stream.push_str(&sse_frame("e3", 2)); // non-monotonic sequence
    stream.push_str(&sse_frame("e4", 0)); // unordered, always passes
    stream.push_str(&sse_frame("e5", 3));
    *remote.events_body.lock().expect("lock") = stream;
    let base = start_remote(remote.clone()).await?;

    let server = federation_server(&base);
    let router = server.router();

    let (status, _) = send(&router, forward_request()?).await?;
    assert_eq!(status, StatusCode::OK);

    let response = router
        .clone()
        .oneshot(
            Request::builder()
                .uri("/v1/federation/runs/run123/events")
                .header("X-Tenant-Id", "tnt_fed")
                .body(Body::empty())?,
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response
            .headers()
            .get("content-type")
            .and_then(|v| v.to_str().ok()),
        Some("text/event-stream")
    );

    let body = axum::body::to_bytes(response.into_body(), 1024 * 1024).await?;
    let text = String::from_utf8(body.to_vec())?;
    let ids: Vec<String> = text
        .lines()
        .filter_map(|line| line.strip_prefix("data: "))
        .filter_map(|payload| serde_json::from_str::<Value>(payload).ok())
        .filter_map(|env| env["event"]["event_id"].as_str().map(str::to_string))
        .collect();
    assert_eq!(ids, vec!["e1", "e2", "e4", "e5"]);
    Ok(())
}

#[tokio::test]
async fn from_sequence_cursor_reaches_the_remote() -> Result<()> {
    let remote = RemoteState::default();
    *remote.events_body.lock().expect("lock") = sse_frame("e9", 9);
    let base = start_remote(remote.clone()).await?;

    let server = federation_server(&base);
    let router = server.router();

    send(&router, forward_request()?).await?;

    let (status, _) = send(
        &router,
        Request::builder()
            .uri("/v1/federation/runs/run123/events?from_sequence=4")
            .header("X-Tenant-Id", "tnt_fed")
            .body(Body::empty())?,
    )
    .await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(*remote.seen_query.lock().expect("lock"), "4");
    Ok(())
}

#[tokio::test]
async fn cross_tenant_backhaul_is_not_found() -> Result<()> {
    let remote = RemoteState::default();
    let base = start_remote(remote).await?;

    let server = federation_server(&base);
    let router = server.router();

    send(&router, forward_request()?).await?;

    let (status, body) = send(
        &router,
        Request::builder()
            .uri("/v1/federation/runs/run123/events")
            .header("X-Tenant-Id", "tnt_other")
            .body(Body::empty())?,
    )
    .await?;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["code"], "not_found");
    Ok(())
}

#[tokio::test]
async fn bearer_tokens_propagate_to_the_remote() -> Result<()> {
    let remote = RemoteState::default();
    let base = start_remote(remote.clone()).await?;

    let server = federation_server(&base);
    let router = server.router();

    let engine = &base64::engine::general_purpose::URL_SAFE_NO_PAD;
    let header_b64 = base64::Engine::encode(engine, br#"{"alg":"none"}"#);
    let payload_b64 = base64::Engine::encode(engine, br#"{"tenant_id":"tnt_fed"}"#);
    let token = format!("{header_b64}.{payload_b64}.sig");

    let mut request = forward_request()?;
    request.headers_mut().insert(
        "Authorization",
        format!("Bearer {token}").parse().context("header")?,
    );
    let (status, _) = send(&router, request).await?;
    assert_eq!(status, StatusCode::OK);

    assert_eq!(
        *remote.seen_auth.lock().expect("lock"),
        format!("Bearer {token}")
    );
    Ok(())
}
