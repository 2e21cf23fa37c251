//! Federation configuration loaded from environment variables.

use std::path::PathBuf;
use std::time::Duration;

use agentos_core::config::{self, Profile};
use agentos_core::error::{Error, Result};
use agentos_core::secrets;

/// Configuration for the Federation service.
#[derive(Debug, Clone)]
pub struct FederationConfig {
    /// HTTP listen port.
    pub http_port: u16,
    /// Deployment profile.
    pub profile: Profile,
    /// Default tenant (dev/demo shortcut; a prod startup error).
    pub default_tenant: Option<String>,
    /// Path of the peer registry descriptor, when configured.
    pub peers_file: Option<PathBuf>,
    /// Path of the persistent forward index.
    pub forward_index_file: PathBuf,
    /// Maximum forward attempts per run.
    pub forward_max_attempts: u32,
    /// Linear backoff base between forward attempts.
    pub forward_base_backoff: Duration,
    /// Whether inbound connections must present client certificates.
    pub require_mtls: bool,
    /// Whether `/metrics` requires a resolved tenant.
    pub metrics_require_auth: bool,
}

impl Default for FederationConfig {
    fn default() -> Self {
        Self {
            http_port: 8083,
            profile: Profile::Dev,
            default_tenant: None,
            peers_file: None,
            forward_index_file: PathBuf::from("data/federation/forward-index.json"),
            forward_max_attempts: 3,
            forward_base_backoff: Duration::from_millis(250),
            require_mtls: false,
            metrics_require_auth: false,
        }
    }
}

impl FederationConfig {
    /// Loads configuration from environment variables.
    ///
    /// Supported env vars:
    /// - `AGENTOS_HTTP_PORT`
    /// - `AGENTOS_PROFILE`
    /// - `AGENTOS_DEFAULT_TENANT`
    /// - `AGENTOS_PEERS_FILE`
    /// - `AGENTOS_FED_FORWARD_INDEX_FILE`
    /// - `AGENTOS_FED_FORWARD_MAX_ATTEMPTS`
    /// - `AGENTOS_FED_FORWARD_BASE_BACKOFF_MS`
    /// - `AGENTOS_FED_REQUIRE_MTLS`
    /// - `AGENTOS_METRICS_REQUIRE_AUTH`
    ///
    /// Certificate material and the JWT public key resolve separately
    /// through the secrets loader (`*_FILE` variants included).
    ///
    /// # Errors
    ///
    /// Returns an error if any variable is present but cannot be parsed.
    pub fn from_env() -> Result<Self> {
        let mut cfg = Self {
            profile: Profile::from_env(),
            default_tenant: config::env_string("AGENTOS_DEFAULT_TENANT"),
            peers_file: config::env_string("AGENTOS_PEERS_FILE").map(PathBuf::from),
            metrics_require_auth: config::metrics_require_auth(),
            ..Self::default()
        };

        if let Some(port) = config::env_u16("AGENTOS_HTTP_PORT")? {
            cfg.http_port = port;
        }
        if let Some(path) = config::env_string("AGENTOS_FED_FORWARD_INDEX_FILE") {
            cfg.forward_index_file = PathBuf::from(path);
        }
        if let Some(attempts) = config::env_u32("AGENTOS_FED_FORWARD_MAX_ATTEMPTS")? {
            if attempts > 0 {
                cfg.forward_max_attempts = attempts;
            }
        }
        if let Some(backoff_ms) = config::env_u64("AGENTOS_FED_FORWARD_BASE_BACKOFF_MS")? {
            if backoff_ms > 0 {
                cfg.forward_base_backoff = Duration::from_millis(backoff_ms);
            }
        }
        if let Some(raw) = config::env_string("AGENTOS_FED_REQUIRE_MTLS") {
            cfg.require_mtls = raw.eq_ignore_ascii_case("true") || raw == "1";
        }

        Ok(cfg)
    }

    /// Enforces prod safety requirements plus mTLS material checks.
    ///
    /// TLS termination itself is delegated to the fronting listener; this
    /// validation guarantees the certificate material resolves before the
    /// service reports healthy.
    ///
    /// # Errors
    ///
    /// Returns an error describing every violated requirement.
    pub fn validate(&self) -> Result<()> {
        config::validate_service_config(crate::SERVICE_NAME, self.profile)?;

        if self.require_mtls {
            for name in [
                "AGENTOS_FED_SERVER_CERT",
                "AGENTOS_FED_SERVER_KEY",
                "AGENTOS_FED_CA_CERT",
            ] {
                secrets::require(name).map_err(|err| {
                    Error::InvalidInput(format!("AGENTOS_FED_REQUIRE_MTLS=true: {err}"))
                })?;
            }
        }
        Ok(())
    }
}
