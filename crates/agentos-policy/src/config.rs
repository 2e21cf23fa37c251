//! Model Policy configuration loaded from environment variables.

use agentos_core::config::{self, Profile};
use agentos_core::error::Result;

/// Configuration for the Model Policy service.
#[derive(Debug, Clone)]
pub struct PolicyConfig {
    /// HTTP listen port.
    pub http_port: u16,
    /// Deployment profile.
    pub profile: Profile,
    /// Default tenant (dev/demo shortcut; a prod startup error).
    pub default_tenant: Option<String>,
    /// Per-tenant invoke QPS.
    pub invoke_qps: u32,
    /// Whether `/metrics` requires a resolved tenant.
    pub metrics_require_auth: bool,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            http_port: 8082,
            profile: Profile::Dev,
            default_tenant: None,
            invoke_qps: 20,
            metrics_require_auth: false,
        }
    }
}

impl PolicyConfig {
    /// Loads configuration from environment variables.
    ///
    /// Supported env vars:
    /// - `AGENTOS_HTTP_PORT`
    /// - `AGENTOS_PROFILE`
    /// - `AGENTOS_DEFAULT_TENANT`
    /// - `AGENTOS_QUOTA_INVOKE_QPS`
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
        if let Some(qps) = config::env_u32("AGENTOS_QUOTA_INVOKE_QPS")? {
            if qps > 0 {
                cfg.invoke_qps = qps;
            }
        }

        Ok(cfg)
    }

    /// Enforces prod safety requirements.
    ///
    /// # Errors
    ///
    /// Returns an error describing every violated requirement.
    pub fn validate(&self) -> Result<()> {
        config::validate_service_config(crate::SERVICE_NAME, self.profile)
    }
}
