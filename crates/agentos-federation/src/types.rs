//! Wire types for the Federation API.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::peers::PeerInfo;

/// Health check response.
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    /// Service status.
    pub status: String,
    /// Service identifier.
    pub service: String,
    /// Build version.
    pub version: String,
}

/// Target peer selector for a forward.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TargetSelector {
    /// Stack to forward to.
    #[serde(default)]
    pub stack_id: String,
}

/// Caller identity carried in the forward body.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ForwardAuth {
    /// Tenant on whose behalf the run executes.
    #[serde(default)]
    pub tenant_id: Option<String>,
    /// Acting principal.
    #[serde(default)]
    pub principal_id: Option<String>,
}

/// The run create carried inside a forward request.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ForwardRunRequest {
    /// Agent to run on the remote stack.
    #[serde(default)]
    pub agent_id: String,
    /// Run input.
    #[serde(default)]
    pub input: Option<Value>,
    /// Caller context.
    #[serde(default)]
    pub context: Option<Value>,
    /// Tool descriptors.
    #[serde(default)]
    pub tooling: Option<Value>,
    /// Run options.
    #[serde(default)]
    pub run_options: Option<Value>,
    /// Idempotency key, forwarded verbatim.
    #[serde(default)]
    pub idempotency_key: Option<String>,
}

impl ForwardRunRequest {
    /// Builds the remote run create body (the agent goes in the URL).
    #[must_use]
    pub fn to_remote_body(&self) -> Value {
        let mut body = serde_json::Map::new();
        if let Some(input) = &self.input {
            body.insert("input".to_string(), input.clone());
        }
        if let Some(context) = &self.context {
            body.insert("context".to_string(), context.clone());
        }
        if let Some(tooling) = &self.tooling {
            body.insert("tooling".to_string(), tooling.clone());
        }
        if let Some(run_options) = &self.run_options {
            body.insert("run_options".to_string(), run_options.clone());
        }
        if let Some(key) = &self.idempotency_key {
            body.insert(
                "idempotency_key".to_string(),
                Value::String(key.clone()),
            );
        }
        Value::Object(body)
    }
}

/// Inner forward specification.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ForwardSpec {
    /// Peer selection.
    #[serde(default)]
    pub target_selector: TargetSelector,
    /// Caller identity.
    #[serde(default)]
    pub auth: ForwardAuth,
    /// The run to create remotely.
    #[serde(default)]
    pub run_request: ForwardRunRequest,
}

/// Request body for `POST /v1/federation/runs:forward`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ForwardRequest {
    /// The forward specification.
    #[serde(default)]
    pub forward: ForwardSpec,
}

/// Where a run was forwarded.
#[derive(Debug, Serialize, Deserialize)]
pub struct ForwardedTo {
    /// Target stack.
    pub stack_id: String,
    /// Run identifier assigned by the remote orchestrator.
    pub remote_run_id: String,
}

/// Local view of a forwarded run.
#[derive(Debug, Serialize, Deserialize)]
pub struct ForwardedRunView {
    /// Owning tenant.
    pub tenant_id: String,
    /// Agent the run was created for.
    pub agent_id: String,
    /// Remote run identifier.
    pub run_id: String,
    /// Remote run status.
    pub status: String,
    /// Forward time.
    pub created_at: DateTime<Utc>,
    /// Local event stream URL for back-haul.
    pub events_url: String,
}

/// Response for `POST /v1/federation/runs:forward`.
#[derive(Debug, Serialize, Deserialize)]
pub struct ForwardResponse {
    /// Routing summary.
    pub forwarded_to: ForwardedTo,
    /// Local view of the remote run.
    pub run: ForwardedRunView,
    /// Correlation identifier.
    pub correlation_id: String,
}

/// Request body for `POST /v1/federation/events:ingest`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct IngestRequest {
    /// Originating peer, when known.
    #[serde(default)]
    pub peer_id: Option<String>,
    /// Caller identity.
    #[serde(default)]
    pub auth: Option<ForwardAuth>,
    /// Raw event envelopes.
    #[serde(default)]
    pub events: Vec<Value>,
}

/// Response for `POST /v1/federation/events:ingest`.
#[derive(Debug, Serialize, Deserialize)]
pub struct IngestResponse {
    /// Envelopes accepted into the store.
    pub accepted: usize,
    /// Envelopes rejected by validation or ordering.
    pub rejected: usize,
    /// Correlation identifier.
    pub correlation_id: String,
}

/// Response for `GET /v1/federation/peer`.
#[derive(Debug, Serialize)]
pub struct PeerResponse {
    /// The local stack identity.
    pub peer: PeerInfo,
    /// Correlation identifier.
    pub correlation_id: String,
}

/// Response for `GET /v1/federation/peer/capabilities`.
#[derive(Debug, Serialize, Deserialize)]
pub struct PeerCapabilitiesResponse {
    /// The local stack identifier.
    pub stack_id: String,
    /// Federation protocol version.
    pub protocol: String,
    /// Supported federation capabilities.
    pub capabilities: Vec<String>,
    /// Event back-haul configuration.
    pub event_backhaul: Value,
}
