//! Wire types for the Model Policy API.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A model catalog entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Model {
    /// Model identifier.
    pub model_id: String,
    /// Backing provider name.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub provider: String,
    /// Human-readable display name.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub display_name: String,
    /// Capability flags.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub capabilities: Option<serde_json::Map<String, Value>>,
}

/// Response for `GET /v1/models`.
#[derive(Debug, Serialize, Deserialize)]
pub struct ModelsListResponse {
    /// Registered models.
    pub models: Vec<Model>,
}

/// Request body for `POST /v1/models:invoke`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ModelInvokeRequest {
    /// Operation name; `deny`/`block` are explicit policy denials.
    #[serde(default)]
    pub operation: String,
    /// Requested model.
    #[serde(default)]
    pub model_id: String,
    /// Invocation input.
    #[serde(default)]
    pub input: serde_json::Map<String, Value>,
    /// Invocation options; `deny: true` is an explicit policy denial.
    #[serde(default)]
    pub options: serde_json::Map<String, Value>,
    /// Trace context.
    #[serde(default)]
    pub trace: Option<Value>,
}

/// Response for `POST /v1/models:invoke`.
#[derive(Debug, Serialize, Deserialize)]
pub struct ModelInvokeResponse {
    /// Provider output.
    pub output: serde_json::Map<String, Value>,
    /// Usage metrics reported by the provider.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<serde_json::Map<String, Value>>,
    /// Correlation identifier.
    pub correlation_id: String,
}

/// Request body for `POST /v1/policy:check`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PolicyCheckRequest {
    /// Action under evaluation.
    #[serde(default)]
    pub action: String,
    /// Resource under evaluation.
    #[serde(default)]
    pub resource: Option<Value>,
    /// Additional context.
    #[serde(default)]
    pub context: Option<Value>,
}

/// Response for `POST /v1/policy:check`.
#[derive(Debug, Serialize, Deserialize)]
pub struct PolicyCheckResponse {
    /// Decision (`allow` / `deny`).
    pub decision: String,
    /// Reasons backing the decision.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub reasons: Vec<String>,
    /// Correlation identifier.
    pub correlation_id: String,
}

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
