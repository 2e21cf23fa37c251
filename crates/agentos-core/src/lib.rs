//! # agentos-core
//!
//! Shared substrate for the AgentOS control plane services.
//!
//! This crate provides the primitives used across the Agent Orchestrator,
//! Model Policy, and Federation services:
//!
//! - **Identity**: Header/bearer-claim auth context and tenant resolution
//! - **Tenants**: Tenant records, policy, and the admin store
//! - **HTTP Substrate**: Error envelope, request-ID middleware, metrics guard
//! - **Quota**: Per-tenant QPS token bucket and in-flight counters
//! - **Audit**: JSON-lines security decision logging
//! - **Configuration**: Deployment profiles, env helpers, prod validation
//!
//! ## Crate Boundary
//!
//! `agentos-core` is the only crate allowed to define shared primitives.
//! Service crates compose these into their own routers and stores; no service
//! crate depends on another service crate.

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(rust_2018_idioms)]
#![warn(clippy::pedantic)]

pub mod audit;
pub mod auth;
pub mod config;
pub mod error;
pub mod event;
pub mod http;
pub mod id;
pub mod metrics;
pub mod middleware;
pub mod observability;
pub mod quota;
pub mod secrets;
pub mod tenant;

pub use auth::{AuthContext, AuthError};
pub use error::{Error, Result};
pub use event::{Event, EventEnvelope, TraceContext};
pub use http::{ApiError, RequestMeta};
pub use observability::{LogFormat, init_logging};
pub use quota::Limiter;
pub use tenant::{Tenant, TenantPolicy, TenantStore};
