//! Persistent forward index: `(tenant, remote run)` → peer routing.
//!
//! The index is what lets a later event-stream request find the owning peer
//! without any directory service. Records serialize as a JSON array written
//! via temp-file + rename under the store mutex, and load at startup. `get`
//! is tenant-strict: the wrong tenant observes nothing.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde::{Deserialize, Serialize};

use agentos_core::error::{Error, Result};

/// Routing target for a forwarded run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForwardTarget {
    /// Stack the run was forwarded to.
    pub remote_stack_id: String,
    /// Absolute URL of the remote event stream.
    pub remote_events_url: String,
}

/// On-disk record shape.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct ForwardRecord {
    tenant_id: String,
    run_id: String,
    remote_stack_id: String,
    remote_events_url: String,
}

/// Persistent `(tenant_id, run_id)` → [`ForwardTarget`] map.
#[derive(Debug)]
pub struct ForwardIndex {
    path: Option<PathBuf>,
    state: Mutex<HashMap<(String, String), ForwardTarget>>,
}

impl ForwardIndex {
    /// Opens (or initializes) an index at the given path.
    ///
    /// # Errors
    ///
    /// Returns an error when an existing file cannot be read or parsed.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let mut state = HashMap::new();
        match std::fs::read(&path) {
            Ok(bytes) if !bytes.is_empty() => {
                let records: Vec<ForwardRecord> = serde_json::from_slice(&bytes)?;
                for record in records {
                    state.insert(
                        (record.tenant_id, record.run_id),
                        ForwardTarget {
                            remote_stack_id: record.remote_stack_id,
                            remote_events_url: record.remote_events_url,
                        },
                    );
                }
            }
            Ok(_) => {}
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
            Err(err) => return Err(err.into()),
        }
        Ok(Self {
            path: Some(path),
            state: Mutex::new(state),
        })
    }

    /// Creates an index without a backing file (tests and dev).
    #[must_use]
    pub fn in_memory() -> Self {
        Self {
            path: None,
            state: Mutex::new(HashMap::new()),
        }
    }

    /// Records the routing target for a forwarded run and persists.
    ///
    /// # Errors
    ///
    /// Returns an error when the index file cannot be written.
    pub fn put(
        &self,
        tenant_id: &str,
        run_id: &str,
        remote_stack_id: &str,
        remote_events_url: &str,
    ) -> Result<()> {
        if tenant_id.is_empty() || run_id.is_empty() {
            return Err(Error::InvalidInput(
                "forward index requires tenant_id and run_id".to_string(),
            ));
        }
        let mut state = self.lock();
        state.insert(
            (tenant_id.to_string(), run_id.to_string()),
            ForwardTarget {
                remote_stack_id: remote_stack_id.to_string(),
                remote_events_url: remote_events_url.to_string(),
            },
        );
        self.persist_locked(&state)
    }

    /// Returns the routing target, tenant-strict.
    #[must_use]
    pub fn get(&self, tenant_id: &str, run_id: &str) -> Option<ForwardTarget> {
        if tenant_id.is_empty() || run_id.is_empty() {
            return None;
        }
        self.lock()
            .get(&(tenant_id.to_string(), run_id.to_string()))
            .cloned()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<(String, String), ForwardTarget>> {
        self.state
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    fn persist_locked(&self, state: &HashMap<(String, String), ForwardTarget>) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let mut records: Vec<ForwardRecord> = state
            .iter()
            .map(|((tenant_id, run_id), target)| ForwardRecord {
                tenant_id: tenant_id.clone(),
                run_id: run_id.clone(),
                remote_stack_id: target.remote_stack_id.clone(),
                remote_events_url: target.remote_events_url.clone(),
            })
            .collect();
        records.sort_by(|a, b| (&a.tenant_id, &a.run_id).cmp(&(&b.tenant_id, &b.run_id)));

        let bytes = serde_json::to_vec_pretty(&records)?;
        let tmp = temp_path(path);
        std::fs::write(&tmp, bytes)?;
        std::fs::rename(&tmp, path)?;
        Ok(())
    }
}

fn temp_path(path: &Path) -> PathBuf {
    let mut tmp = path.as_os_str().to_os_string();
    tmp.push(".tmp");
    PathBuf::from(tmp)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn put_then_get_round_trips() -> anyhow::Result<()> {
        let index = ForwardIndex::in_memory();
        index.put("tnt_a", "run_1", "stack-b", "http://b/v1/runs/run_1/events")?;

        let target = index.get("tnt_a", "run_1").expect("target");
        assert_eq!(target.remote_stack_id, "stack-b");
        assert_eq!(target.remote_events_url, "http://b/v1/runs/run_1/events");
        Ok(())
    }

    #[test]
    fn get_is_tenant_strict() -> anyhow::Result<()> {
        let index = ForwardIndex::in_memory();
        index.put("tnt_a", "run_1", "stack-b", "http://b/events")?;

        assert!(index.get("tnt_b", "run_1").is_none());
        assert!(index.get("", "run_1").is_none());
        assert!(index.get("tnt_a", "").is_none());
        Ok(())
    }

    #[test]
    fn mappings_survive_reopen() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("forward-index.json");

        {
            let index = ForwardIndex::open(&path)?;
            index.put("tnt_a", "run_1", "stack-b", "http://b/events")?;
            index.put("tnt_a", "run_2", "stack-c", "http://c/events")?;
        }

        let reopened = ForwardIndex::open(&path)?;
        assert_eq!(
            reopened.get("tnt_a", "run_2").expect("target").remote_stack_id,
            "stack-c"
        );
        Ok(())
    }

    #[test]
    fn file_is_a_json_array_of_records() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("forward-index.json");
        let index = ForwardIndex::open(&path)?;
        index.put("tnt_a", "run_1", "stack-b", "http://b/events")?;

        let value: serde_json::Value = serde_json::from_slice(&std::fs::read(&path)?)?;
        let records = value.as_array().expect("array");
        assert_eq!(records.len(), 1);
        assert_eq!(records[0]["tenant_id"], "tnt_a");
        assert_eq!(records[0]["remote_stack_id"], "stack-b");
        Ok(())
    }

    #[test]
    fn identity_fields_are_required() {
        let index = ForwardIndex::in_memory();
        assert!(index.put("", "run_1", "stack-b", "http://b").is_err());
        assert!(index.put("tnt_a", "", "stack-b", "http://b").is_err());
    }
}
