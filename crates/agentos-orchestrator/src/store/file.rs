//! File-backed run store.
//!
//! Runs live in one JSON document mapping `tenant/{tenant_id}/runs/{run_id}`
//! to the stored record. All records load at startup; writes serialize
//! through the store mutex and reach durability via write-to-temp + rename.
//! The idempotency index is rebuilt from the loaded records and maintained on
//! every write; it is never persisted separately.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use async_trait::async_trait;

use super::{RunStore, StoreError};
use crate::types::Run;

#[derive(Debug, Default)]
struct RunMaps {
    /// `tenant/{tenant_id}/runs/{run_id}` → run.
    runs: HashMap<String, Run>,
    /// `(tenant_id, idempotency_key)` → storage key.
    idempotency: HashMap<(String, String), String>,
}

/// File-backed [`RunStore`] persisted as a single JSON document.
#[derive(Debug)]
pub struct FileRunStore {
    path: Option<PathBuf>,
    state: Mutex<RunMaps>,
}

impl FileRunStore {
    /// Opens (or initializes) a store at the given path, loading all
    /// persisted records.
    ///
    /// # Errors
    ///
    /// Returns an error when an existing file cannot be read or parsed.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let mut maps = RunMaps::default();
        match std::fs::read(&path) {
            Ok(bytes) if !bytes.is_empty() => {
                let persisted: HashMap<String, Run> = serde_json::from_slice(&bytes)?;
                for (key, run) in persisted {
                    index_idempotency(&mut maps.idempotency, &run, &key);
                    maps.runs.insert(key, run);
                }
            }
            Ok(_) => {}
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
            Err(err) => return Err(err.into()),
        }
        Ok(Self {
            path: Some(path),
            state: Mutex::new(maps),
        })
    }

    /// Creates a store without a backing file (tests and dev).
    #[must_use]
    pub fn in_memory() -> Self {
        Self {
            path: None,
            state: Mutex::new(RunMaps::default()),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, RunMaps> {
        self.state
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    fn persist_locked(&self, maps: &RunMaps) -> Result<(), StoreError> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let bytes = serde_json::to_vec_pretty(&maps.runs)?;
        let tmp = temp_path(path);
        std::fs::write(&tmp, bytes)?;
        std::fs::rename(&tmp, path)?;
        Ok(())
    }
}

#[async_trait]
impl RunStore for FileRunStore {
    async fn create(&self, run: Run) -> Result<(), StoreError> {
        validate(&run)?;
        let key = storage_key(&run.tenant_id, &run.run_id);

        let mut maps = self.lock();
        if maps.runs.contains_key(&key) {
            return Err(StoreError::RunExists);
        }
        index_idempotency(&mut maps.idempotency, &run, &key);
        maps.runs.insert(key, run);
        self.persist_locked(&maps)
    }

    async fn get(&self, tenant_id: &str, run_id: &str) -> Result<Option<Run>, StoreError> {
        if tenant_id.is_empty() || run_id.is_empty() {
            return Ok(None);
        }
        let maps = self.lock();
        Ok(maps.runs.get(&storage_key(tenant_id, run_id)).cloned())
    }

    async fn get_by_idempotency_key(
        &self,
        tenant_id: &str,
        key: &str,
    ) -> Result<Option<Run>, StoreError> {
        if tenant_id.is_empty() || key.is_empty() {
            return Ok(None);
        }
        let maps = self.lock();
        let storage_key = maps
            .idempotency
            .get(&(tenant_id.to_string(), key.to_string()));
        Ok(storage_key.and_then(|found| maps.runs.get(found)).cloned())
    }

    async fn save(&self, run: Run) -> Result<(), StoreError> {
        validate(&run)?;
        let key = storage_key(&run.tenant_id, &run.run_id);

        let mut maps = self.lock();
        index_idempotency(&mut maps.idempotency, &run, &key);
        maps.runs.insert(key, run);
        self.persist_locked(&maps)
    }
}

fn validate(run: &Run) -> Result<(), StoreError> {
    if run.tenant_id.is_empty() || run.run_id.is_empty() {
        return Err(StoreError::InvalidRun);
    }
    Ok(())
}

fn storage_key(tenant_id: &str, run_id: &str) -> String {
    format!("tenant/{tenant_id}/runs/{run_id}")
}

fn index_idempotency(
    index: &mut HashMap<(String, String), String>,
    run: &Run,
    storage_key: &str,
) {
    if let Some(key) = run.idempotency_key.as_deref() {
        if !key.is_empty() {
            index.insert(
                (run.tenant_id.clone(), key.to_string()),
                storage_key.to_string(),
            );
        }
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
    use crate::types::RunStatus;
    use chrono::Utc;

    fn run(tenant: &str, run_id: &str) -> Run {
        Run {
            tenant_id: tenant.to_string(),
            agent_id: "agt_test".to_string(),
            run_id: run_id.to_string(),
            status: RunStatus::Queued,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            events_url: format!("/v1/runs/{run_id}/events"),
            run_options: None,
            output: None,
            error: None,
            idempotency_key: None,
        }
    }

    #[tokio::test]
    async fn create_then_get_round_trips() -> anyhow::Result<()> {
        let store = FileRunStore::in_memory();
        store.create(run("tnt_a", "run_1")).await?;

        let loaded = store.get("tnt_a", "run_1").await?.expect("run");
        assert_eq!(loaded.run_id, "run_1");
        assert_eq!(loaded.status, RunStatus::Queued);
        Ok(())
    }

    #[tokio::test]
    async fn create_rejects_duplicates() -> anyhow::Result<()> {
        let store = FileRunStore::in_memory();
        store.create(run("tnt_a", "run_1")).await?;
        let err = store.create(run("tnt_a", "run_1")).await.unwrap_err();
        assert!(matches!(err, StoreError::RunExists));
        Ok(())
    }

    #[tokio::test]
    async fn identity_fields_are_required() {
        let store = FileRunStore::in_memory();
        let err = store.create(run("", "run_1")).await.unwrap_err();
        assert!(matches!(err, StoreError::InvalidRun));
        let err = store.create(run("tnt_a", "")).await.unwrap_err();
        assert!(matches!(err, StoreError::InvalidRun));
    }

    #[tokio::test]
    async fn cross_tenant_lookup_is_not_found() -> anyhow::Result<()> {
        let store = FileRunStore::in_memory();
        store.create(run("tnt_alpha", "run_1")).await?;
        assert!(store.get("tnt_beta", "run_1").await?.is_none());
        Ok(())
    }

    #[tokio::test]
    async fn idempotency_index_is_per_tenant() -> anyhow::Result<()> {
        let store = FileRunStore::in_memory();
        let mut first = run("tnt_t3", "run_1");
        first.idempotency_key = Some("k1".to_string());
        store.create(first).await?;

        let mut other_tenant = run("tnt_t4", "run_2");
        other_tenant.idempotency_key = Some("k1".to_string());
        store.create(other_tenant).await?;

        let hit = store
            .get_by_idempotency_key("tnt_t3", "k1")
            .await?
            .expect("hit");
        assert_eq!(hit.run_id, "run_1");

        let hit = store
            .get_by_idempotency_key("tnt_t4", "k1")
            .await?
            .expect("hit");
        assert_eq!(hit.run_id, "run_2");

        assert!(store.get_by_idempotency_key("tnt_t3", "k2").await?.is_none());
        Ok(())
    }

    #[tokio::test]
    async fn persisted_state_survives_reopen() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("runs.json");

        {
            let store = FileRunStore::open(&path)?;
            let mut created = run("tnt_a", "run_1");
            created.idempotency_key = Some("k1".to_string());
            store.create(created).await?;
        }

        let reopened = FileRunStore::open(&path)?;
        let loaded = reopened.get("tnt_a", "run_1").await?.expect("run");
        assert_eq!(loaded.agent_id, "agt_test");

        let by_key = reopened
            .get_by_idempotency_key("tnt_a", "k1")
            .await?
            .expect("index rebuilt");
        assert_eq!(by_key.run_id, "run_1");
        Ok(())
    }

    #[tokio::test]
    async fn save_overwrites_existing_state() -> anyhow::Result<()> {
        let store = FileRunStore::in_memory();
        store.create(run("tnt_a", "run_1")).await?;

        let mut updated = run("tnt_a", "run_1");
        updated.status = RunStatus::Canceled;
        updated.completed_at = Some(Utc::now());
        store.save(updated).await?;

        let loaded = store.get("tnt_a", "run_1").await?.expect("run");
        assert_eq!(loaded.status, RunStatus::Canceled);
        assert!(loaded.completed_at.is_some());
        Ok(())
    }
}
