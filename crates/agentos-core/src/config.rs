//! Deployment profiles, environment parsing, and prod safety validation.
//!
//! Every service loads its configuration from `AGENTOS_*` environment
//! variables through the typed helpers here. The `prod` profile fails fast at
//! startup when unsafe shortcuts (default tenant, dev headers, open metrics)
//! are configured.

use crate::error::{Error, Result};

/// Deployment profile for runtime guardrails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Profile {
    /// Local development (default-tenant shortcut allowed).
    #[default]
    Dev,
    /// Demo deployments (default-tenant shortcut allowed).
    Demo,
    /// Production (unsafe shortcuts are startup errors).
    Prod,
}

impl Profile {
    /// Returns the active profile from `AGENTOS_PROFILE`, defaulting to dev.
    #[must_use]
    pub fn from_env() -> Self {
        match env_string("AGENTOS_PROFILE")
            .unwrap_or_default()
            .to_ascii_lowercase()
            .as_str()
        {
            "demo" => Self::Demo,
            "prod" => Self::Prod,
            _ => Self::Dev,
        }
    }

    /// Returns true for the prod profile.
    #[must_use]
    pub const fn is_prod(self) -> bool {
        matches!(self, Self::Prod)
    }

    /// Returns the profile name as configured.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Dev => "dev",
            Self::Demo => "demo",
            Self::Prod => "prod",
        }
    }
}

/// Enforces prod-mode requirements for a service, failing fast on unsafe
/// defaults. Non-prod profiles always validate.
///
/// Checks, in prod:
/// - `AGENTOS_DEFAULT_TENANT` must be empty
/// - `AGENTOS_ALLOW_DEV_HEADERS` must be disabled
/// - `AGENTOS_METRICS_REQUIRE_AUTH` must be `1`
/// - federation only: `AGENTOS_PEERS_FILE` must point at a readable file
///
/// # Errors
///
/// Returns `Error::InvalidInput` listing every violated requirement.
pub fn validate_service_config(service: &str, profile: Profile) -> Result<()> {
    if !profile.is_prod() {
        return Ok(());
    }

    let mut problems = Vec::new();

    if env_string("AGENTOS_DEFAULT_TENANT").is_some() {
        problems.push("AGENTOS_DEFAULT_TENANT must be empty in prod".to_string());
    }
    if env_string("AGENTOS_ALLOW_DEV_HEADERS").as_deref() == Some("1") {
        problems.push("AGENTOS_ALLOW_DEV_HEADERS must be disabled in prod".to_string());
    }
    if env_string("AGENTOS_METRICS_REQUIRE_AUTH").as_deref() != Some("1") {
        problems
            .push("AGENTOS_METRICS_REQUIRE_AUTH must be set to 1 in prod to protect /metrics"
                .to_string());
    }

    if service.eq_ignore_ascii_case("federation") {
        match env_string("AGENTOS_PEERS_FILE") {
            None => problems.push(
                "AGENTOS_PEERS_FILE is required in prod (path to peer registry JSON)".to_string(),
            ),
            Some(path) => {
                if let Err(err) = std::fs::metadata(&path) {
                    problems.push(format!("AGENTOS_PEERS_FILE={path} not readable: {err}"));
                }
            }
        }
    }

    if problems.is_empty() {
        return Ok(());
    }
    Err(Error::InvalidInput(format!(
        "configuration invalid for profile=prod (service={service}): {}",
        problems.join("; ")
    )))
}

/// Returns a trimmed, non-empty environment value.
#[must_use]
pub fn env_string(name: &str) -> Option<String> {
    std::env::var(name).ok().and_then(|value| {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    })
}

/// Parses an environment value as `u16`.
///
/// # Errors
///
/// Returns `Error::InvalidInput` when the value is present but unparseable.
pub fn env_u16(name: &str) -> Result<Option<u16>> {
    let Some(value) = env_string(name) else {
        return Ok(None);
    };
    value
        .parse::<u16>()
        .map(Some)
        .map_err(|err| Error::InvalidInput(format!("{name} must be a u16: {err}")))
}

/// Parses an environment value as `u32`.
///
/// # Errors
///
/// Returns `Error::InvalidInput` when the value is present but unparseable.
pub fn env_u32(name: &str) -> Result<Option<u32>> {
    let Some(value) = env_string(name) else {
        return Ok(None);
    };
    value
        .parse::<u32>()
        .map(Some)
        .map_err(|err| Error::InvalidInput(format!("{name} must be a u32: {err}")))
}

/// Parses an environment value as `u64`.
///
/// # Errors
///
/// Returns `Error::InvalidInput` when the value is present but unparseable.
pub fn env_u64(name: &str) -> Result<Option<u64>> {
    let Some(value) = env_string(name) else {
        return Ok(None);
    };
    value
        .parse::<u64>()
        .map(Some)
        .map_err(|err| Error::InvalidInput(format!("{name} must be a u64: {err}")))
}

/// Parses a boolean value (`true/false/1/0/yes/no`).
///
/// # Errors
///
/// Returns `Error::InvalidInput` for unrecognized values.
pub fn parse_bool(name: &str, value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "y" => Ok(true),
        "false" | "0" | "no" | "n" => Ok(false),
        _ => Err(Error::InvalidInput(format!(
            "{name} must be a boolean (true/false/1/0)"
        ))),
    }
}

/// Parses an environment value as a boolean.
///
/// # Errors
///
/// Returns `Error::InvalidInput` for unrecognized values.
pub fn env_bool(name: &str) -> Result<Option<bool>> {
    let Some(value) = env_string(name) else {
        return Ok(None);
    };
    parse_bool(name, &value).map(Some)
}

/// Returns whether `/metrics` endpoints must require a resolved tenant.
///
/// Default is false for local/dev; set `AGENTOS_METRICS_REQUIRE_AUTH=1` to
/// enable.
#[must_use]
pub fn metrics_require_auth() -> bool {
    env_string("AGENTOS_METRICS_REQUIRE_AUTH").as_deref() == Some("1")
}
