//! Event envelope contract shared by the orchestrator and federation node.
//!
//! Events cross the wire wrapped in an envelope carrying ordering and
//! identity metadata. The identity fields (`event_id`, `sequence`, `run_id`)
//! are strongly typed when produced locally; ingested envelopes are handled
//! as raw JSON with lenient accessors, since remote peers may extend the
//! payload freely.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// SSE event name used for every AgentOS event frame.
pub const SSE_EVENT_NAME: &str = "agentos.event";

/// W3C-style trace context carried on events.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TraceContext {
    /// `traceparent` header value.
    pub traceparent: String,
    /// Span identifier, when known.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub span_id: String,
    /// `tracestate` header value.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub tracestate: String,
}

impl TraceContext {
    /// Returns a zeroed trace context for locally synthesized events.
    #[must_use]
    pub fn zero() -> Self {
        Self {
            traceparent: "00-00000000000000000000000000000000-0000000000000000-01".to_string(),
            ..Self::default()
        }
    }
}

/// A single agent event.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Event {
    /// Unique event identifier within `(tenant_id, run_id)`.
    pub event_id: String,
    /// Ordering sequence (≥ 1); 0 means unordered.
    pub sequence: i64,
    /// Event time (RFC 3339).
    pub time: String,
    /// Event type, e.g. `agentos.run.step.completed`.
    #[serde(rename = "type")]
    pub event_type: String,
    /// Owning tenant.
    pub tenant_id: String,
    /// Agent that produced the event.
    pub agent_id: String,
    /// Run the event belongs to.
    pub run_id: String,
    /// Step identifier, when applicable.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub step_id: String,
    /// Trace context.
    pub trace: TraceContext,
    /// Free-form payload.
    pub payload: serde_json::Map<String, Value>,
}

/// Envelope wrapping a single event.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EventEnvelope {
    /// The wrapped event.
    pub event: Event,
}

/// Renders an envelope (or any JSON value) as one SSE frame:
/// `event: agentos.event\ndata: <json>\n\n`.
#[must_use]
pub fn sse_frame(envelope: &Value) -> String {
    format!("event: {SSE_EVENT_NAME}\ndata: {envelope}\n\n")
}

/// Returns the `event` object of a raw envelope, if present.
#[must_use]
pub fn envelope_event(envelope: &Value) -> Option<&serde_json::Map<String, Value>> {
    envelope.get("event")?.as_object()
}

/// Returns the `event_id` of a raw event object, if present and non-empty.
#[must_use]
pub fn event_id(event: &serde_json::Map<String, Value>) -> Option<&str> {
    event
        .get("event_id")
        .and_then(Value::as_str)
        .filter(|id| !id.is_empty())
}

/// Returns the `run_id` of a raw event object, if present and non-empty.
#[must_use]
pub fn event_run_id(event: &serde_json::Map<String, Value>) -> Option<&str> {
    event
        .get("run_id")
        .and_then(Value::as_str)
        .filter(|id| !id.is_empty())
}

/// Extracts the event sequence, coercing from an integer, float, or numeric
/// string. Missing or unparseable sequences yield 0 (unordered).
#[must_use]
pub fn event_sequence(event: &serde_json::Map<String, Value>) -> i64 {
    match event.get("sequence") {
        Some(Value::Number(number)) => number
            .as_i64()
            .or_else(|| number.as_f64().map(|value| value as i64))
            .unwrap_or(0),
        Some(Value::String(raw)) => raw.trim().parse::<i64>().unwrap_or(0),
        _ => 0,
    }
}
