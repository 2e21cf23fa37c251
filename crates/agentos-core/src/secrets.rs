//! Secret resolution from environment variables and `*_FILE` paths.
//!
//! Secrets resolve in order: the env var itself, then a path named by the
//! `<NAME>_FILE` variant. Values are never logged; only the source is.

use crate::config;
use crate::error::{Error, Result};

/// Loads a secret by name.
///
/// Returns `Ok(None)` when neither the env var nor its `_FILE` variant is
/// set, so callers decide strictness.
///
/// # Errors
///
/// Returns an error when a configured `_FILE` path cannot be read.
pub fn load(name: &str) -> Result<Option<String>> {
    let name = name.trim();
    if name.is_empty() {
        return Err(Error::InvalidInput("secret name required".to_string()));
    }
    if let Some(value) = config::env_string(name) {
        tracing::debug!(secret = name, "loaded secret from env");
        return Ok(Some(value));
    }
    if let Some(path) = config::env_string(&format!("{name}_FILE")) {
        let contents = std::fs::read_to_string(&path).map_err(|err| {
            Error::InvalidInput(format!("{name}_FILE read failed ({path}): {err}"))
        })?;
        tracing::debug!(secret = name, "loaded secret from file");
        return Ok(Some(contents.trim().to_string()));
    }
    Ok(None)
}

/// Loads a secret, erroring when it resolves to nothing.
///
/// # Errors
///
/// Returns an error when the secret is missing or its `_FILE` path is
/// unreadable.
pub fn require(name: &str) -> Result<String> {
    load(name)?.ok_or_else(|| {
        Error::InvalidInput(format!("secret {} is required but missing", name.trim()))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_name_is_rejected() {
        assert!(load("").is_err());
        assert!(load("   ").is_err());
    }

    #[test]
    fn missing_secret_resolves_to_none() {
        assert!(load("AGENTOS_TEST_SECRET_DOES_NOT_EXIST")
            .expect("load")
            .is_none());
        assert!(require("AGENTOS_TEST_SECRET_DOES_NOT_EXIST").is_err());
    }
}
