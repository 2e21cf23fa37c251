//! Wire and stored types for the orchestrator API.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use utoipa::ToSchema;

/// Run lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    /// Accepted, not yet started.
    Queued,
    /// Executing.
    Running,
    /// Finished successfully. Terminal.
    Completed,
    /// Finished with an error. Terminal.
    Failed,
    /// Canceled by the caller. Terminal.
    Canceled,
}

impl RunStatus {
    /// Returns true for terminal states; terminal states are sticky.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Canceled)
    }

    /// Returns the lowercase wire name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Canceled => "canceled",
        }
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Caller-supplied run options.
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct RunOptions {
    /// Scheduling priority hint.
    #[serde(default)]
    pub priority: String,
    /// Overall run timeout in milliseconds.
    #[serde(default)]
    pub timeout_ms: i64,
    /// Maximum number of agent steps.
    #[serde(default)]
    pub max_steps: i64,
    /// Whether the caller intends to stream events.
    #[serde(default)]
    pub stream_events: bool,
}

/// Run output produced on completion.
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct RunOutput {
    /// Output type (`text`).
    #[serde(default, skip_serializing_if = "String::is_empty")]
    #[serde(rename = "type")]
    pub output_type: String,
    /// Output text.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub text: String,
    /// Produced artifacts.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    #[schema(value_type = Vec<Object>)]
    pub artifacts: Vec<Value>,
}

/// Run failure detail.
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct RunError {
    /// Machine-readable error code.
    pub code: String,
    /// Human-readable message.
    pub message: String,
    /// Additional context.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Option<Object>)]
    pub details: Option<Value>,
}

/// A tracked agent run.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Run {
    /// Owning tenant.
    pub tenant_id: String,
    /// Agent the run was created for.
    pub agent_id: String,
    /// Run identifier (`run_…`), unique within the tenant.
    pub run_id: String,
    /// Current lifecycle status.
    pub status: RunStatus,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Time the run left `queued`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    /// Time the run reached a terminal state.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    /// Relative URL of the run's SSE event stream.
    pub events_url: String,
    /// Caller-supplied options.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_options: Option<RunOptions>,
    /// Output, present once completed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<RunOutput>,
    /// Failure detail, present once failed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<RunError>,
    /// Idempotency key the run was created with.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub idempotency_key: Option<String>,
}

/// Tenant-scoped agent metadata.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Agent {
    /// Agent identifier, unique within the tenant.
    pub agent_id: String,
    /// Owning tenant.
    pub tenant_id: String,
    /// Display name.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,
    /// Description.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
    /// Agent version.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub version: String,
    /// Lifecycle status.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub status: String,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Last update time.
    pub updated_at: DateTime<Utc>,
}

/// Request body for `POST /v1/agents/{agent_id}/runs`.
#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct RunCreateRequest {
    /// Run input (free-form).
    #[serde(default)]
    #[schema(value_type = Option<Object>)]
    pub input: Option<Value>,
    /// Caller context (free-form).
    #[serde(default)]
    #[schema(value_type = Option<Object>)]
    pub context: Option<Value>,
    /// Tool descriptors (free-form).
    #[serde(default)]
    #[schema(value_type = Option<Object>)]
    pub tooling: Option<Value>,
    /// Run options.
    #[serde(default)]
    pub run_options: Option<RunOptions>,
    /// Idempotency key; at most one run per `(tenant, key)`.
    #[serde(default)]
    pub idempotency_key: Option<String>,
}

/// Health check response.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct HealthResponse {
    /// Service status.
    pub status: String,
    /// Service identifier.
    pub service: String,
    /// Build version.
    pub version: String,
}

/// Response envelope for run creation.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct RunCreateResponse {
    /// The created (or replayed) run.
    pub run: Run,
    /// Correlation identifier.
    pub correlation_id: String,
}

/// Response envelope for run reads.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct RunGetResponse {
    /// The run.
    pub run: Run,
    /// Correlation identifier.
    pub correlation_id: String,
}

/// Response envelope for run cancellation.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct RunCancelResponse {
    /// The canceled run.
    pub run: Run,
    /// Correlation identifier.
    pub correlation_id: String,
}

/// Response envelope for agent listing.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct AgentListResponse {
    /// Agents owned by the tenant.
    pub agents: Vec<Agent>,
    /// Correlation identifier.
    pub correlation_id: String,
}

/// Response envelope for agent reads.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct AgentGetResponse {
    /// The agent.
    pub agent: Agent,
    /// Correlation identifier.
    pub correlation_id: String,
}
