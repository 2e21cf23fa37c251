//! Orchestrator configuration loaded from environment variables.

use std::path::PathBuf;

use agentos_core::config::{self, Profile};
use agentos_core::error::Result;

/// Configuration for the Agent Orchestrator service.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// HTTP listen port.
    pub http_port: u16,
    /// Deployment profile.
    pub profile: Profile,
    /// Default tenant applied when neither header nor token carries one
    /// (dev/demo shortcut; a prod startup error).
    pub default_tenant: Option<String>,
    /// Path of the run store JSON document.
    pub run_store_file: PathBuf,
    /// Directory holding per-agent JSON records.
    pub agent_store_dir: PathBuf,
    /// Per-tenant run create QPS.
    pub run_create_qps: u32,
    /// Per-tenant concurrent run cap.
    pub concurrent_runs: u32,
    /// Whether `/metrics` requires a resolved tenant.
    pub metrics_require_auth: bool,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            http_port: 8081,
            profile: Profile::Dev,
            default_tenant: None,
            run_store_file: PathBuf::from("data/agent-orchestrator/runs.json"),
            agent_store_dir: PathBuf::from("data/agents"),
            run_create_qps: 10,
            concurrent_runs: 25,
            metrics_require_auth: false,
        }
    }
}

impl OrchestratorConfig {
    /// Loads configuration from environment variables.
    ///
    /// Supported env vars:
    /// - `AGENTOS_HTTP_PORT`
    /// - `AGENTOS_PROFILE`
    /// - `AGENTOS_DEFAULT_TENANT`
    /// - `AGENTOS_RUN_STORE_FILE`
    /// - `AGENTOS_AGENT_STORE_DIR`
    /// - `AGENTOS_QUOTA_RUN_CREATE_QPS`
    /// - `AGENTOS_QUOTA_CONCURRENT_RUNS`
    /// - `AGENTOS_METRICS_REQUIRE_AUTH`
    ///
    /// # Errors
    ///
    /// Returns an error if any variable is present but cannot be parsed.
    pub fn from_env() -> Result<Self> {
        let mut cfg = Self {
            profile: Profile::from_env(),
            default_tenant: config::env_string("AGENTOS_DEFAULT_TENANT"),
            metrics_require_auth: config::metrics_require_auth(),
            ..Self::default()
        };

        if let Some(port) = config::env_u16("AGENTOS_HTTP_PORT")? {
            cfg.http_port = port;
        }
        if let Some(path) = config::env_string("AGENTOS_RUN_STORE_FILE") {
            cfg.run_store_file = PathBuf::from(path);
        }
        if let Some(dir) = config::env_string("AGENTOS_AGENT_STORE_DIR") {
            cfg.agent_store_dir = PathBuf::from(dir);
        }
        if let Some(qps) = config::env_u32("AGENTOS_QUOTA_RUN_CREATE_QPS")? {
            if qps > 0 {
                cfg.run_create_qps = qps;
            }
        }
        if let Some(concurrent) = config::env_u32("AGENTOS_QUOTA_CONCURRENT_RUNS")? {
            if concurrent > 0 {
                cfg.concurrent_runs = concurrent;
            }
        }

        Ok(cfg)
    }

    /// Enforces prod safety requirements; services refuse to start otherwise.
    ///
    /// # Errors
    ///
    /// Returns an error describing every violated requirement.
    pub fn validate(&self) -> Result<()> {
        config::validate_service_config(crate::SERVICE_NAME, self.profile)
    }
}
