//! Streaming SSE back-haul from a remote peer to a local client.
//!
//! The proxy is a line-oriented relay: every remote line forwards verbatim
//! except `data:` lines whose envelope fails one of two per-connection
//! filters — an event-ID dedupe set and a monotonic sequence cursor
//! (`sequence == 0` is unordered and exempt). Buffered lines flush on each
//! event block's terminating blank line. The stream runs until either side
//! closes; there is no overall timeout.

use std::collections::HashSet;

use axum::body::Body;
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use futures::StreamExt;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

use agentos_core::event;

/// Proxy failures surfaced before streaming begins.
#[derive(Debug, thiserror::Error)]
pub enum ProxyError {
    /// The remote stream could not be reached.
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
    /// The remote answered with a non-2xx status.
    #[error("remote events returned {0}")]
    RemoteStatus(StatusCode),
}

/// SSE relay from remote peers.
#[derive(Debug, Clone)]
pub struct SseProxy {
    client: reqwest::Client,
}

impl Default for SseProxy {
    fn default() -> Self {
        Self::new()
    }
}

impl SseProxy {
    /// Creates a proxy client. Streaming connections carry no overall
    /// timeout.
    #[must_use]
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }

    /// Opens the remote stream and returns the relaying SSE response.
    ///
    /// `from_sequence > 0` is appended as a `from_sequence` query parameter,
    /// preserving any existing query string.
    ///
    /// # Errors
    ///
    /// Returns a [`ProxyError`] when the remote is unreachable or answers
    /// with a non-2xx status.
    pub async fn proxy(
        &self,
        remote_events_url: &str,
        tenant_id: &str,
        principal_id: Option<&str>,
        bearer_token: Option<&str>,
        from_sequence: i64,
    ) -> Result<Response, ProxyError> {
        let url = with_from_sequence(remote_events_url, from_sequence);

        let mut request = self
            .client
            .get(&url)
            .header(header::ACCEPT, "text/event-stream")
            .header("X-Tenant-Id", tenant_id);
        if let Some(principal) = principal_id.filter(|p| !p.is_empty()) {
            request = request.header("X-Principal-Id", principal);
        }
        if let Some(bearer) = bearer_token.filter(|t| !t.is_empty()) {
            request = request.header(header::AUTHORIZATION, format!("Bearer {bearer}"));
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(ProxyError::RemoteStatus(status));
        }

        let (tx, rx) = mpsc::channel::<Result<Bytes, std::io::Error>>(16);
        tokio::spawn(relay(response, tx));

        Ok(sse_response(Body::from_stream(ReceiverStream::new(rx))))
    }
}

/// Renders stored envelopes as a framed SSE response (push-mode back-haul).
#[must_use]
pub fn stream_stored_events(envelopes: &[Value]) -> Response {
    let mut body = String::new();
    for envelope in envelopes {
        body.push_str(&event::sse_frame(envelope));
    }
    sse_response(Body::from(body))
}

fn sse_response(body: Body) -> Response {
    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "text/event-stream")
        .header(header::CACHE_CONTROL, "no-cache")
        .header(header::CONNECTION, "keep-alive")
        .body(body)
        .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response())
}

/// Per-connection relay loop: reads the remote byte stream, filters complete
/// lines, and forwards one event block per channel send.
async fn relay(response: reqwest::Response, tx: mpsc::Sender<Result<Bytes, std::io::Error>>) {
    let mut filter = LineFilter::new();
    let mut pending = Vec::new();
    let mut block = Vec::new();

    let mut stream = response.bytes_stream();
    while let Some(chunk) = stream.next().await {
        let chunk = match chunk {
            Ok(chunk) => chunk,
            Err(err) => {
                tracing::debug!(error = %err, "remote event stream error");
                break;
            }
        };
        pending.extend_from_slice(&chunk);

        while let Some(pos) = pending.iter().position(|byte| *byte == b'\n') {
            let line: Vec<u8> = pending.drain(..=pos).collect();
            let is_blank = filter.apply(&line, &mut block);
            if is_blank && !block.is_empty() {
                // Flush the completed event block.
                if tx.send(Ok(Bytes::from(std::mem::take(&mut block)))).await.is_err() {
                    return;
                }
            }
        }
    }

    // Remote EOF: forward whatever is left.
    block.extend_from_slice(&pending);
    if !block.is_empty() {
        let _ = tx.send(Ok(Bytes::from(block))).await;
    }
}

/// The per-connection dedupe set and monotonic cursor.
struct LineFilter {
    seen_event_ids: HashSet<String>,
    last_sequence: i64,
}

impl LineFilter {
    fn new() -> Self {
        Self {
            seen_event_ids: HashSet::new(),
            last_sequence: 0,
        }
    }

    /// Applies the filters to one complete line, appending it to `block`
    /// when it passes. Returns true when the line is an event-terminating
    /// blank line.
    fn apply(&mut self, line: &[u8], block: &mut Vec<u8>) -> bool {
        let trimmed = std::str::from_utf8(line)
            .unwrap_or_default()
            .trim_end_matches(['\r', '\n']);

        if let Some(payload) = trimmed.strip_prefix("data:") {
            if !self.passes(payload.trim()) {
                return false;
            }
        }

        block.extend_from_slice(line);
        trimmed.is_empty()
    }

    fn passes(&mut self, payload: &str) -> bool {
        let Ok(envelope) = serde_json::from_str::<Value>(payload) else {
            // Non-envelope payloads forward untouched.
            return true;
        };
        let Some(event_obj) = event::envelope_event(&envelope) else {
            return true;
        };

        let sequence = event::event_sequence(event_obj);
        if let Some(event_id) = event::event_id(event_obj) {
            if !self.seen_event_ids.insert(event_id.to_string()) {
                return false;
            }
        }
        if sequence != 0 && sequence <= self.last_sequence {
            return false;
        }
        self.last_sequence = self.last_sequence.max(sequence);
        true
    }
}

fn with_from_sequence(url: &str, from_sequence: i64) -> String {
    if from_sequence <= 0 {
        return url.to_string();
    }
    if url.contains('?') {
        format!("{url}&from_sequence={from_sequence}")
    } else {
        format!("{url}?from_sequence={from_sequence}")
    }
}
