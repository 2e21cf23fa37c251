//! Security audit logging.
//!
//! Audit entries capture security-relevant decisions (allow/deny) on mutating
//! and policy-gated actions. Entries are JSON lines written through a sink;
//! audit failures never block the operation being audited.
//!
//! Sinks are selected by `AGENTOS_AUDIT_SINK`:
//! - `stdout`
//! - `stderr`
//! - `file:/path/to/audit.log` (default `file:data/audit/<service>.audit.log`)

use std::collections::HashMap;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config;

/// A single audit entry.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuditEntry {
    /// When the decision was made; filled at emit time when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time: Option<DateTime<Utc>>,
    /// Tenant the decision applies to.
    pub tenant_id: String,
    /// Acting principal, when known.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub principal_id: String,
    /// Action identifier, e.g. `runs.create`.
    pub action: String,
    /// Resource acted on, e.g. `run/run_123`. Must not contain secrets.
    pub resource: String,
    /// Decision outcome (`allowed` / `denied`).
    pub outcome: String,
    /// Correlation identifier for tracing.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub correlation_id: String,
    /// Request identifier.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub request_id: String,
    /// Additional structured context.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<HashMap<String, Value>>,
}

/// Destination for audit entries.
///
/// Implementations must be lightweight and non-blocking; audit is always
/// best-effort.
pub trait AuditSink: Send + Sync {
    /// Emits an audit entry.
    fn emit(&self, entry: AuditEntry);

    /// Flushes buffered entries. Called on shutdown; default is a no-op.
    fn flush(&self) {}
}

enum Writer {
    Stdout,
    Stderr,
    File(std::fs::File),
}

/// JSON-lines sink writing to stdout, stderr, or an append-only file.
pub struct JsonLineSink {
    writer: Mutex<Writer>,
}

impl std::fmt::Debug for JsonLineSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JsonLineSink").finish_non_exhaustive()
    }
}

impl JsonLineSink {
    /// Creates a sink writing to stdout.
    #[must_use]
    pub fn stdout() -> Self {
        Self {
            writer: Mutex::new(Writer::Stdout),
        }
    }

    /// Creates a sink writing to stderr.
    #[must_use]
    pub fn stderr() -> Self {
        Self {
            writer: Mutex::new(Writer::Stderr),
        }
    }

    /// Creates a sink appending to the given file, creating parent
    /// directories as needed.
    ///
    /// # Errors
    ///
    /// Returns an error when the file cannot be opened for append.
    pub fn file(path: impl AsRef<Path>) -> std::io::Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            writer: Mutex::new(Writer::File(file)),
        })
    }

    fn write_line(&self, line: &[u8]) {
        let mut guard = self
            .writer
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        let result = match &mut *guard {
            Writer::Stdout => {
                let mut out = std::io::stdout().lock();
                out.write_all(line).and_then(|()| out.write_all(b"\n"))
            }
            Writer::Stderr => {
                let mut out = std::io::stderr().lock();
                out.write_all(line).and_then(|()| out.write_all(b"\n"))
            }
            Writer::File(file) => file
                .write_all(line)
                .and_then(|()| file.write_all(b"\n"))
                .and_then(|()| file.flush()),
        };
        if let Err(err) = result {
            tracing::warn!(error = %err, "audit write failed");
        }
    }
}

impl AuditSink for JsonLineSink {
    fn emit(&self, entry: AuditEntry) {
        match serde_json::to_vec(&entry) {
            Ok(line) => self.write_line(&line),
            Err(err) => tracing::warn!(error = %err, "audit serialization failed"),
        }
    }

    fn flush(&self) {
        let mut guard = self
            .writer
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        if let Writer::File(file) = &mut *guard {
            if let Err(err) = file.flush() {
                tracing::warn!(error = %err, "audit flush failed");
            }
        }
    }
}

/// Test sink that captures entries for assertions.
#[derive(Debug, Default)]
pub struct TestAuditSink {
    entries: Mutex<Vec<AuditEntry>>,
}

impl TestAuditSink {
    /// Creates an empty capturing sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a copy of all captured entries.
    #[must_use]
    pub fn entries(&self) -> Vec<AuditEntry> {
        self.entries
            .lock()
            .map(|guard| guard.clone())
            .unwrap_or_default()
    }

    /// Returns the captured entries for the given action.
    #[must_use]
    pub fn find_by_action(&self, action: &str) -> Vec<AuditEntry> {
        self.entries()
            .into_iter()
            .filter(|entry| entry.action == action)
            .collect()
    }
}

impl AuditSink for TestAuditSink {
    fn emit(&self, entry: AuditEntry) {
        if let Ok(mut guard) = self.entries.lock() {
            guard.push(entry);
        }
    }
}

/// Audit logger routing entries to a configured sink.
#[derive(Clone)]
pub struct AuditLogger {
    sink: Arc<dyn AuditSink>,
}

impl std::fmt::Debug for AuditLogger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuditLogger").finish_non_exhaustive()
    }
}

impl AuditLogger {
    /// Creates a logger with an explicit sink.
    #[must_use]
    pub fn new(sink: Arc<dyn AuditSink>) -> Self {
        Self { sink }
    }

    /// Creates a logger from `AGENTOS_AUDIT_SINK`, defaulting to
    /// `file:data/audit/<service>.audit.log` and falling back to stdout when
    /// the file cannot be opened.
    #[must_use]
    pub fn from_env(service: &str) -> Self {
        let sink = config::env_string("AGENTOS_AUDIT_SINK")
            .unwrap_or_else(|| format!("file:data/audit/{service}.audit.log"));

        let sink: Arc<dyn AuditSink> = match sink.as_str() {
            "stdout" => Arc::new(JsonLineSink::stdout()),
            "stderr" => Arc::new(JsonLineSink::stderr()),
            other => {
                let path = other.strip_prefix("file:").unwrap_or(other);
                match JsonLineSink::file(path) {
                    Ok(file_sink) => Arc::new(file_sink),
                    Err(err) => {
                        tracing::warn!(
                            path = %path,
                            error = %err,
                            "audit file sink unavailable; falling back to stdout"
                        );
                        Arc::new(JsonLineSink::stdout())
                    }
                }
            }
        };
        Self { sink }
    }

    /// Emits an entry, stamping the time when unset.
    pub fn log(&self, mut entry: AuditEntry) {
        if entry.time.is_none() {
            entry.time = Some(Utc::now());
        }
        self.sink.emit(entry);
    }

    /// Flushes the underlying sink (shutdown hook).
    pub fn close(&self) {
        self.sink.flush();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(action: &str, outcome: &str) -> AuditEntry {
        AuditEntry {
            tenant_id: "tnt_a".to_string(),
            action: action.to_string(),
            resource: "run/run_1".to_string(),
            outcome: outcome.to_string(),
            ..AuditEntry::default()
        }
    }

    #[test]
    fn logger_stamps_time() {
        let sink = Arc::new(TestAuditSink::new());
        let logger = AuditLogger::new(sink.clone());
        logger.log(entry("runs.create", "allowed"));

        let captured = sink.entries();
        assert_eq!(captured.len(), 1);
        assert!(captured[0].time.is_some());
    }

    #[test]
    fn find_by_action_filters() {
        let sink = Arc::new(TestAuditSink::new());
        let logger = AuditLogger::new(sink.clone());
        logger.log(entry("runs.create", "allowed"));
        logger.log(entry("runs.cancel", "allowed"));

        assert_eq!(sink.find_by_action("runs.cancel").len(), 1);
        assert_eq!(sink.find_by_action("runs.create").len(), 1);
    }

    #[test]
    fn file_sink_appends_json_lines() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("audit").join("test.audit.log");
        let logger = AuditLogger::new(Arc::new(JsonLineSink::file(&path)?));

        logger.log(entry("runs.create", "allowed"));
        logger.log(entry("runs.cancel", "denied"));
        logger.close();

        let contents = std::fs::read_to_string(&path)?;
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 2);
        let first: AuditEntry = serde_json::from_str(lines[0])?;
        assert_eq!(first.action, "runs.create");
        assert_eq!(first.outcome, "allowed");
        Ok(())
    }
}
