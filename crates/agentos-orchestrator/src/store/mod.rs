//! Persistence ports for run and agent state.
//!
//! Stores are tenant-partitioned: every lookup is keyed by
//! `(tenant_id, resource_id)` and cross-tenant reads behave exactly like
//! lookups of records that do not exist. The file-backed implementations in
//! this module are the defaults; any durable key-value adapter satisfying the
//! traits may replace them.

pub mod agents;
pub mod file;

use async_trait::async_trait;

use crate::types::{Agent, Run};

pub use agents::FileAgentStore;
pub use file::FileRunStore;

/// Store operation failures.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// A run already exists for `(tenant_id, run_id)`.
    #[error("run already exists")]
    RunExists,
    /// A run is missing required identity fields.
    #[error("invalid run")]
    InvalidRun,
    /// An agent already exists for `(tenant_id, agent_id)`.
    #[error("agent already exists")]
    AgentExists,
    /// An agent is missing required identity fields.
    #[error("invalid agent")]
    InvalidAgent,
    /// The backing file could not be read or written.
    #[error("storage i/o error: {0}")]
    Io(#[from] std::io::Error),
    /// A persisted record could not be encoded or decoded.
    #[error("storage serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Tenant-scoped persistence port for run state.
#[async_trait]
pub trait RunStore: Send + Sync {
    /// Persists a new run.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::RunExists`] on `(tenant_id, run_id)` collision
    /// and [`StoreError::InvalidRun`] when identity fields are empty.
    async fn create(&self, run: Run) -> Result<(), StoreError>;

    /// Returns the run, tenant-scoped. Cross-tenant lookups return `None`.
    ///
    /// # Errors
    ///
    /// Returns an error only on storage faults.
    async fn get(&self, tenant_id: &str, run_id: &str) -> Result<Option<Run>, StoreError>;

    /// Returns the run created with the given idempotency key, if any.
    ///
    /// # Errors
    ///
    /// Returns an error only on storage faults.
    async fn get_by_idempotency_key(
        &self,
        tenant_id: &str,
        key: &str,
    ) -> Result<Option<Run>, StoreError>;

    /// Upserts a run.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::InvalidRun`] when identity fields are empty.
    async fn save(&self, run: Run) -> Result<(), StoreError>;
}

/// Tenant-scoped persistence port for agent metadata.
#[async_trait]
pub trait AgentStore: Send + Sync {
    /// Persists a new agent.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::AgentExists`] on identifier collision and
    /// [`StoreError::InvalidAgent`] when identity fields are empty.
    async fn create(&self, agent: Agent) -> Result<(), StoreError>;

    /// Returns the agent, tenant-scoped.
    ///
    /// # Errors
    ///
    /// Returns an error only on storage faults.
    async fn get(&self, tenant_id: &str, agent_id: &str) -> Result<Option<Agent>, StoreError>;

    /// Returns all agents owned by the tenant.
    ///
    /// # Errors
    ///
    /// Returns an error only on storage faults.
    async fn list(&self, tenant_id: &str) -> Result<Vec<Agent>, StoreError>;

    /// Upserts an agent.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::InvalidAgent`] when identity fields are empty.
    async fn save(&self, agent: Agent) -> Result<(), StoreError>;
}
