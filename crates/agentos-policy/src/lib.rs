//! # agentos-policy
//!
//! The Model Policy service of the AgentOS control plane.
//!
//! Gates and meters model invocations per tenant:
//!
//! - **Policy Engine**: explicit-deny, scope, deny-list, allow-list ordering
//! - **Usage Meter**: per-tenant counters with hourly/daily token buckets
//! - **Budget**: deny-before-record enforcement of token budgets
//! - **Provider Registry**: model catalog with a local stub provider
//!
//! ## Endpoints
//!
//! ```text
//! GET  /v1/health
//! GET  /v1/models
//! POST /v1/models:invoke
//! POST /v1/policy:check
//! GET  /metrics
//! ```

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(rust_2018_idioms)]
#![warn(clippy::pedantic)]

pub mod config;
pub mod engine;
pub mod providers;
pub mod server;
pub mod types;
pub mod usage;

/// Service identifier used in metrics, audit, and health responses.
pub const SERVICE_NAME: &str = "model-policy";

pub use config::PolicyConfig;
pub use server::{AppState, Server, ServerBuilder};
