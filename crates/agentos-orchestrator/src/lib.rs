//! # agentos-orchestrator
//!
//! The Agent Orchestrator service of the AgentOS control plane.
//!
//! Accepts agent runs, tracks their lifecycle, and streams their events:
//!
//! - **Runs API**: idempotent create, read with age-based auto-progression,
//!   cancellation, SSE event streaming
//! - **Run Store**: tenant-partitioned durable key→run map with an
//!   idempotency-key index
//! - **Agent Catalog**: tenant-scoped agent metadata
//! - **Tenant Admin**: CRUD gated by the `tenants:admin` scope
//!
//! ## Endpoints
//!
//! ```text
//! GET  /v1/health
//! GET  /v1/agents
//! GET  /v1/agents/{agent_id}
//! POST /v1/agents/{agent_id}/runs
//! GET  /v1/runs/{run_id}
//! GET  /v1/runs/{run_id}/events          (SSE)
//! POST /v1/runs/{run_id}:cancel
//! CRUD /v1/admin/tenants[/{tenant_id}]
//! GET  /metrics
//! GET  /openapi.json
//! ```

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(rust_2018_idioms)]
#![warn(clippy::pedantic)]

pub mod config;
pub mod openapi;
pub mod routes;
pub mod server;
pub mod store;
pub mod types;

/// Service identifier used in metrics, audit, and health responses.
pub const SERVICE_NAME: &str = "agent-orchestrator";

pub use config::OrchestratorConfig;
pub use server::{AppState, Server, ServerBuilder};
