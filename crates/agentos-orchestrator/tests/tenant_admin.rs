//! Integration tests for the tenant admin API.

use std::sync::Arc;

use anyhow::{Context, Result};
use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use serde_json::{Value, json};
use tower::ServiceExt;

use agentos_core::audit::{AuditLogger, TestAuditSink};
use agentos_orchestrator::config::OrchestratorConfig;
use agentos_orchestrator::server::{Server, ServerBuilder};

fn test_server(default_tenant: Option<&str>) -> Server {
    ServerBuilder::default()
        .config(OrchestratorConfig {
            default_tenant: default_tenant.map(str::to_string),
            ..OrchestratorConfig::default()
        })
        .audit(AuditLogger::new(Arc::new(TestAuditSink::new())))
        .build()
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

fn admin_request(method: &str, uri: &str, body: Option<Value>) -> Result<Request<Body>> {
    let builder = Request::builder()
        .method(method)
        .uri(uri)
        .header("X-Scopes", "tenants:admin");
    let request = match body {
        Some(value) => builder
            .header("Content-Type", "application/json")
            .body(Body::from(value.to_string()))?,
        None => builder.body(Body::empty())?,
    };
    Ok(request)
}

#[tokio::test]
async fn admin_scope_is_required() -> Result<()> {
    let server = test_server(None);
    let router = server.router();

    let (status, body) = send(
        &router,
        Request::builder()
            .uri("/v1/admin/tenants")
            .header("X-Tenant-Id", "tnt_any")
            .body(Body::empty())?,
    )
    .await?;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"]["code"], "forbidden");
    Ok(())
}

#[tokio::test]
async fn scope_comparison_ignores_case_and_whitespace() -> Result<()> {
    let server = test_server(None);
    let router = server.router();

    let (status, _) = send(
        &router,
        Request::builder()
            .uri("/v1/admin/tenants")
            .header("X-Scopes", " Tenants:Admin ")
            .body(Body::empty())?,
    )
    .await?;
    assert_eq!(status, StatusCode::OK);
    Ok(())
}

#[tokio::test]
async fn tenant_crud_round_trip() -> Result<()> {
    let server = test_server(None);
    let router = server.router();

    let (status, created) = send(
        &router,
        admin_request(
            "POST",
            "/v1/admin/tenants",
            Some(json!({"tenant_id": "tnt_crud", "name": "CRUD", "plan_tier": "free"})),
        )?,
    )
    .await?;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(created["tenant"]["tenant_id"], "tnt_crud");
    assert_eq!(created["tenant"]["status"], "active");

    // Duplicate create conflicts.
    let (status, conflict) = send(
        &router,
        admin_request(
            "POST",
            "/v1/admin/tenants",
            Some(json!({"tenant_id": "tnt_crud"})),
        )?,
    )
    .await?;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(conflict["error"]["code"], "conflict");

    let (status, fetched) = send(
        &router,
        admin_request("GET", "/v1/admin/tenants/tnt_crud", None)?,
    )
    .await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(fetched["tenant"]["name"], "CRUD");

    let (status, updated) = send(
        &router,
        admin_request(
            "PATCH",
            "/v1/admin/tenants/tnt_crud",
            Some(json!({"plan_tier": "pro"})),
        )?,
    )
    .await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(updated["tenant"]["plan_tier"], "pro");
    assert_eq!(updated["tenant"]["name"], "CRUD");

    let (status, deleted) = send(
        &router,
        admin_request("DELETE", "/v1/admin/tenants/tnt_crud", None)?,
    )
    .await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(deleted["deleted"], "tnt_crud");

    let (status, _) = send(
        &router,
        admin_request("GET", "/v1/admin/tenants/tnt_crud", None)?,
    )
    .await?;
    assert_eq!(status, StatusCode::NOT_FOUND);
    Ok(())
}

#[tokio::test]
async fn seeded_default_tenant_survives_delete() -> Result<()> {
    let server = test_server(Some("tnt_default"));
    let router = server.router();

    let (status, body) = send(
        &router,
        admin_request("DELETE", "/v1/admin/tenants/tnt_default", None)?,
    )
    .await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "invalid_request");

    let (status, fetched) = send(
        &router,
        admin_request("GET", "/v1/admin/tenants/tnt_default", None)?,
    )
    .await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(fetched["tenant"]["tenant_id"], "tnt_default");
    Ok(())
}

#[tokio::test]
async fn tenant_policy_round_trips_through_admin() -> Result<()> {
    let server = test_server(None);
    let router = server.router();

    let (status, created) = send(
        &router,
        admin_request(
            "POST",
            "/v1/admin/tenants",
            Some(json!({
                "tenant_id": "tnt_pol",
                "policy": {
                    "denied_models": ["local-stub-llm"],
                    "max_tokens_per_hour": 100
                }
            })),
        )?,
    )
    .await?;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(created["tenant"]["policy"]["denied_models"][0], "local-stub-llm");
    assert_eq!(created["tenant"]["policy"]["max_tokens_per_hour"], 100);
    Ok(())
}

#[tokio::test]
async fn default_tenant_allows_headerless_requests() -> Result<()> {
    let server = test_server(Some("tnt_default"));
    let router = server.router();

    // No tenant headers at all: the configured default applies and the
    // seeded record satisfies the existence check.
    let (status, body) = send(
        &router,
        Request::builder().uri("/v1/agents").body(Body::empty())?,
    )
    .await?;
    assert_eq!(status, StatusCode::OK);
    assert!(body["agents"].is_array());
    Ok(())
}
