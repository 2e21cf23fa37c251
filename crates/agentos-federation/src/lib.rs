//! # agentos-federation
//!
//! The Federation node of the AgentOS control plane.
//!
//! Forwards agent runs to peer stacks and hauls their event streams back to
//! local callers:
//!
//! - **Forwarder**: outbound run create with classified retry and optional
//!   mTLS client transport
//! - **Forward Index**: persistent `(tenant, run)` → peer routing map
//! - **SSE Proxy**: deduplicating, monotonic, cursor-resumable stream relay
//! - **Event Ingest Store**: push-mode event buffer with ordering invariants
//! - **Peer Registry**: static peer catalog from a JSON descriptor
//! - **JWT Verification**: optional bearer signature checks at the edge
//!
//! ## Endpoints
//!
//! ```text
//! GET  /v1/federation/health
//! GET  /v1/federation/peer
//! GET  /v1/federation/peer/capabilities
//! POST /v1/federation/runs:forward
//! GET  /v1/federation/runs/{run_id}/events     (SSE, ?from_sequence=N)
//! POST /v1/federation/events:ingest
//! GET  /metrics
//! ```

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(rust_2018_idioms)]
#![warn(clippy::pedantic)]

pub mod config;
pub mod event_store;
pub mod forward_index;
pub mod forwarder;
pub mod jwt;
pub mod peers;
pub mod server;
pub mod sse_proxy;
pub mod types;

/// Service identifier used in metrics, audit, and health responses.
pub const SERVICE_NAME: &str = "federation";

pub use config::FederationConfig;
pub use server::{AppState, Server, ServerBuilder};
