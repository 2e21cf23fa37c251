//! File-backed agent store.
//!
//! Agents persist one file per record under
//! `<dir>/<tenant_id>/<agent_id>.json`, written via temp + rename. The full
//! tree loads at startup.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Mutex;

use async_trait::async_trait;

use super::{AgentStore, StoreError};
use crate::types::Agent;

/// File-backed [`AgentStore`].
#[derive(Debug)]
pub struct FileAgentStore {
    dir: Option<PathBuf>,
    state: Mutex<HashMap<String, Agent>>,
}

impl FileAgentStore {
    /// Opens (or initializes) a store rooted at the given directory.
    ///
    /// # Errors
    ///
    /// Returns an error when existing records cannot be read or parsed.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let dir = dir.into();
        let mut agents = HashMap::new();

        match std::fs::read_dir(&dir) {
            Ok(tenants) => {
                for tenant_entry in tenants {
                    let tenant_entry = tenant_entry?;
                    if !tenant_entry.file_type()?.is_dir() {
                        continue;
                    }
                    for agent_entry in std::fs::read_dir(tenant_entry.path())? {
                        let path = agent_entry?.path();
                        if path.extension().and_then(|ext| ext.to_str()) != Some("json") {
                            continue;
                        }
                        let bytes = std::fs::read(&path)?;
                        if bytes.is_empty() {
                            continue;
                        }
                        let agent: Agent = serde_json::from_slice(&bytes)?;
                        if !agent.tenant_id.is_empty() && !agent.agent_id.is_empty() {
                            agents.insert(storage_key(&agent.tenant_id, &agent.agent_id), agent);
                        }
                    }
                }
            }
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
            Err(err) => return Err(err.into()),
        }

        Ok(Self {
            dir: Some(dir),
            state: Mutex::new(agents),
        })
    }

    /// Creates a store without a backing directory (tests and dev).
    #[must_use]
    pub fn in_memory() -> Self {
        Self {
            dir: None,
            state: Mutex::new(HashMap::new()),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, Agent>> {
        self.state
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    fn persist(&self, agent: &Agent) -> Result<(), StoreError> {
        let Some(dir) = &self.dir else {
            return Ok(());
        };
        let tenant_dir = dir.join(&agent.tenant_id);
        std::fs::create_dir_all(&tenant_dir)?;

        let path = tenant_dir.join(format!("{}.json", agent.agent_id));
        let bytes = serde_json::to_vec_pretty(agent)?;
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, bytes)?;
        std::fs::rename(&tmp, &path)?;
        Ok(())
    }
}

#[async_trait]
impl AgentStore for FileAgentStore {
    async fn create(&self, agent: Agent) -> Result<(), StoreError> {
        validate(&agent)?;
        let key = storage_key(&agent.tenant_id, &agent.agent_id);

        let mut state = self.lock();
        if state.contains_key(&key) {
            return Err(StoreError::AgentExists);
        }
        self.persist(&agent)?;
        state.insert(key, agent);
        Ok(())
    }

    async fn get(&self, tenant_id: &str, agent_id: &str) -> Result<Option<Agent>, StoreError> {
        if tenant_id.is_empty() || agent_id.is_empty() {
            return Ok(None);
        }
        Ok(self.lock().get(&storage_key(tenant_id, agent_id)).cloned())
    }

    async fn list(&self, tenant_id: &str) -> Result<Vec<Agent>, StoreError> {
        if tenant_id.is_empty() {
            return Ok(Vec::new());
        }
        let mut agents: Vec<Agent> = self
            .lock()
            .values()
            .filter(|agent| agent.tenant_id == tenant_id)
            .cloned()
            .collect();
        agents.sort_by(|a, b| a.agent_id.cmp(&b.agent_id));
        Ok(agents)
    }

    async fn save(&self, agent: Agent) -> Result<(), StoreError> {
        validate(&agent)?;
        let key = storage_key(&agent.tenant_id, &agent.agent_id);

        let mut state = self.lock();
        self.persist(&agent)?;
        state.insert(key, agent);
        Ok(())
    }
}

fn validate(agent: &Agent) -> Result<(), StoreError> {
    if agent.tenant_id.is_empty() || agent.agent_id.is_empty() {
        return Err(StoreError::InvalidAgent);
    }
    Ok(())
}

fn storage_key(tenant_id: &str, agent_id: &str) -> String {
    format!("tenant/{tenant_id}/agents/{agent_id}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn agent(tenant: &str, id: &str) -> Agent {
        let now = Utc::now();
        Agent {
            agent_id: id.to_string(),
            tenant_id: tenant.to_string(),
            name: "Demo Agent".to_string(),
            description: String::new(),
            version: "1.0".to_string(),
            status: "active".to_string(),
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn create_rejects_duplicates() -> anyhow::Result<()> {
        let store = FileAgentStore::in_memory();
        store.create(agent("tnt_a", "agt_1")).await?;
        let err = store.create(agent("tnt_a", "agt_1")).await.unwrap_err();
        assert!(matches!(err, StoreError::AgentExists));
        Ok(())
    }

    #[tokio::test]
    async fn list_is_tenant_scoped() -> anyhow::Result<()> {
        let store = FileAgentStore::in_memory();
        store.create(agent("tnt_a", "agt_1")).await?;
        store.create(agent("tnt_a", "agt_2")).await?;
        store.create(agent("tnt_b", "agt_3")).await?;

        let agents = store.list("tnt_a").await?;
        assert_eq!(agents.len(), 2);
        assert!(agents.iter().all(|a| a.tenant_id == "tnt_a"));
        assert!(store.list("tnt_c").await?.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn records_survive_reopen() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        {
            let store = FileAgentStore::open(dir.path())?;
            store.create(agent("tnt_a", "agt_1")).await?;
        }
        let reopened = FileAgentStore::open(dir.path())?;
        let loaded = reopened.get("tnt_a", "agt_1").await?.expect("agent");
        assert_eq!(loaded.name, "Demo Agent");
        Ok(())
    }
}
