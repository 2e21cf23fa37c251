//! Outbound run forwarding to peer orchestrators.
//!
//! Retry classification: transport errors and 5xx responses retry with
//! linear backoff (`base × attempt`); 4xx responses fail immediately; 2xx
//! responses must carry `run.run_id` and `run.events_url` or the forward
//! fails without retry. The client enforces a bounded deadline; when client
//! certificate material is configured the transport speaks mTLS with a
//! TLS 1.2 floor.

use std::time::Duration;

use reqwest::StatusCode;
use serde_json::Value;

use agentos_core::{error::Result, secrets};

/// Successful forward result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForwardedRun {
    /// Run identifier assigned by the remote orchestrator.
    pub run_id: String,
    /// Absolute URL of the remote run's event stream.
    pub events_url: String,
    /// Remote run status (`queued` when the remote omits it).
    pub status: String,
}

/// Forwarding failures, classified for retry.
#[derive(Debug, thiserror::Error)]
pub enum ForwardError {
    /// The request never produced an HTTP response.
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
    /// The remote returned a non-2xx status.
    #[error("remote agent-orchestrator returned {status}")]
    RemoteStatus {
        /// The status returned by the remote orchestrator.
        status: StatusCode,
    },
    /// The remote 2xx response was missing required fields.
    #[error("invalid remote response: {0}")]
    InvalidResponse(String),
}

/// Forwards run create requests to peer orchestrators.
#[derive(Debug, Clone)]
pub struct Forwarder {
    client: reqwest::Client,
    max_attempts: u32,
    base_backoff: Duration,
}

impl Forwarder {
    /// Creates a forwarder with the given retry budget.
    ///
    /// Client cert/key (and optional CA) are loaded from
    /// `AGENTOS_FED_CLIENT_CERT` / `AGENTOS_FED_CLIENT_KEY` /
    /// `AGENTOS_FED_CA_CERT`; absent material falls back to plain HTTP.
    ///
    /// # Errors
    ///
    /// Returns an error when configured certificate material cannot be
    /// parsed.
    pub fn new(max_attempts: u32, base_backoff: Duration) -> Result<Self> {
        let mut builder = reqwest::Client::builder().timeout(Duration::from_secs(10));

        let client_cert = secrets::load("AGENTOS_FED_CLIENT_CERT")?;
        let client_key = secrets::load("AGENTOS_FED_CLIENT_KEY")?;
        let ca_cert = secrets::load("AGENTOS_FED_CA_CERT")?;

        if client_cert.is_some() || client_key.is_some() || ca_cert.is_some() {
            builder = builder
                .use_rustls_tls()
                .min_tls_version(reqwest::tls::Version::TLS_1_2);

            if let (Some(cert), Some(key)) = (client_cert.as_deref(), client_key.as_deref()) {
                let identity = reqwest::Identity::from_pem(format!("{cert}\n{key}").as_bytes())
                    .map_err(|err| {
                        agentos_core::Error::InvalidInput(format!(
                            "federation client cert invalid: {err}"
                        ))
                    })?;
                builder = builder.identity(identity);
            }
            if let Some(ca) = ca_cert.as_deref() {
                let certificate = reqwest::Certificate::from_pem(ca.as_bytes()).map_err(|err| {
                    agentos_core::Error::InvalidInput(format!("federation CA cert invalid: {err}"))
                })?;
                builder = builder.add_root_certificate(certificate);
            }
        }

        let client = builder.build().map_err(|err| {
            agentos_core::Error::Internal(format!("failed to build forward client: {err}"))
        })?;

        Ok(Self {
            client,
            max_attempts: max_attempts.max(1),
            base_backoff,
        })
    }

    /// Forwards a run create to the remote orchestrator.
    ///
    /// # Errors
    ///
    /// Returns the last classified [`ForwardError`] once the retry budget is
    /// exhausted, or immediately for non-retryable failures.
    pub async fn forward_run(
        &self,
        remote_base_url: &str,
        agent_id: &str,
        tenant_id: &str,
        principal_id: Option<&str>,
        bearer_token: Option<&str>,
        run_create_body: &Value,
    ) -> std::result::Result<ForwardedRun, ForwardError> {
        let base = remote_base_url.trim_end_matches('/');
        let url = format!("{base}/v1/agents/{agent_id}/runs");

        let mut last_err: Option<ForwardError> = None;
        for attempt in 1..=self.max_attempts {
            let mut request = self
                .client
                .post(&url)
                .header(reqwest::header::CONTENT_TYPE, "application/json")
                .header("X-Tenant-Id", tenant_id)
                .json(run_create_body);
            if let Some(principal) = principal_id.filter(|p| !p.is_empty()) {
                request = request.header("X-Principal-Id", principal);
            }
            if let Some(bearer) = bearer_token.filter(|t| !t.is_empty()) {
                request = request.header(reqwest::header::AUTHORIZATION, format!("Bearer {bearer}"));
            }

            match request.send().await {
                Err(err) => {
                    tracing::debug!(attempt, url = %url, error = %err, "forward transport error");
                    last_err = Some(ForwardError::Transport(err));
                }
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        let decoded: Value = response
                            .json()
                            .await
                            .map_err(|err| ForwardError::InvalidResponse(err.to_string()))?;
                        return parse_forwarded_run(&decoded, base);
                    }

                    tracing::debug!(attempt, url = %url, status = %status, "forward rejected");
                    let err = ForwardError::RemoteStatus { status };
                    if status.is_client_error() {
                        return Err(err);
                    }
                    last_err = Some(err);
                }
            }

            if attempt < self.max_attempts {
                tokio::time::sleep(self.base_backoff * attempt).await;
            }
        }

        Err(last_err.unwrap_or(ForwardError::InvalidResponse(
            "forward retry budget exhausted".to_string(),
        )))
    }
}

fn parse_forwarded_run(
    decoded: &Value,
    base: &str,
) -> std::result::Result<ForwardedRun, ForwardError> {
    let run = decoded.get("run").and_then(Value::as_object);
    let run_id = run
        .and_then(|run| run.get("run_id"))
        .and_then(Value::as_str)
        .unwrap_or_default();
    let events_url = run
        .and_then(|run| run.get("events_url"))
        .and_then(Value::as_str)
        .unwrap_or_default();
    if run_id.is_empty() || events_url.is_empty() {
        return Err(ForwardError::InvalidResponse(
            "remote response missing run_id/events_url".to_string(),
        ));
    }

    let status = run
        .and_then(|run| run.get("status"))
        .and_then(Value::as_str)
        .filter(|status| !status.is_empty())
        .unwrap_or("queued");

    Ok(ForwardedRun {
        run_id: run_id.to_string(),
        events_url: absolutize_events_url(events_url, base),
        status: status.to_string(),
    })
}

/// Normalizes a remote `events_url` to an absolute URL.
///
/// A leading `/` joins the remote base; a scheme-prefixed URL passes through
/// verbatim; anything else joins the base with `/`.
#[must_use]
pub fn absolutize_events_url(events_url: &str, remote_base_url: &str) -> String {
    let base = remote_base_url.trim_end_matches('/');
    if events_url.starts_with('/') {
        format!("{base}{events_url}")
    } else if events_url.starts_with("http://") || events_url.starts_with("https://") {
        events_url.to_string()
    } else {
        format!("{base}/{events_url}")
    }
}
