//! Static peer registry loaded from a JSON descriptor.
//!
//! The descriptor carries the local stack identity plus the reachable peers;
//! `AGENTOS_STACK_ID` / `AGENTOS_ENVIRONMENT` / `AGENTOS_REGION` override the
//! local identity, which keeps one descriptor usable across a multi-node
//! compose deployment.

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use agentos_core::config;
use agentos_core::error::{Error, Result};

/// Service endpoints exposed by a stack.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PeerEndpoints {
    /// Base URL of the peer's Agent Orchestrator.
    #[serde(default)]
    pub agent_orchestrator_base_url: String,
    /// Base URL of the peer's Model Policy service.
    #[serde(default)]
    pub model_policy_base_url: String,
}

/// Build metadata advertised by a stack.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PeerBuild {
    /// Release version.
    #[serde(default)]
    pub version: String,
    /// Git commit.
    #[serde(default)]
    pub git_sha: String,
    /// Build timestamp.
    #[serde(default)]
    pub timestamp: String,
}

/// A federated stack reachable by `stack_id`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PeerInfo {
    /// Stack identifier.
    pub stack_id: String,
    /// Deployment environment (dev/demo/prod).
    #[serde(default)]
    pub environment: String,
    /// Deployment region.
    #[serde(default)]
    pub region: String,
    /// Supported API versions.
    #[serde(default)]
    pub api_versions: Vec<String>,
    /// Service endpoints.
    #[serde(default)]
    pub endpoints: PeerEndpoints,
    /// Build metadata.
    #[serde(default)]
    pub build: PeerBuild,
}

/// On-disk descriptor shape: `{local, peers}`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PeersFile {
    /// This node's identity.
    pub local: PeerInfo,
    /// Reachable peers.
    #[serde(default)]
    pub peers: Vec<PeerInfo>,
}

/// Peer lookup by `stack_id`.
#[derive(Debug, Clone)]
pub struct PeerRegistry {
    local: PeerInfo,
    peers: HashMap<String, PeerInfo>,
}

impl PeerRegistry {
    /// Loads the registry from a descriptor file, applying env overrides to
    /// the local identity.
    ///
    /// # Errors
    ///
    /// Returns an error when the file cannot be read or parsed.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let bytes = std::fs::read(path).map_err(|err| {
            Error::InvalidInput(format!("peers file {} not readable: {err}", path.display()))
        })?;
        let mut file: PeersFile = serde_json::from_slice(&bytes).map_err(|err| {
            Error::InvalidInput(format!("peers file {} invalid: {err}", path.display()))
        })?;

        if let Some(stack_id) = config::env_string("AGENTOS_STACK_ID") {
            file.local.stack_id = stack_id;
        }
        if let Some(environment) = config::env_string("AGENTOS_ENVIRONMENT") {
            file.local.environment = environment;
        }
        if let Some(region) = config::env_string("AGENTOS_REGION") {
            file.local.region = region;
        }

        Ok(Self::from_file(file))
    }

    /// Builds a registry from an already-parsed descriptor.
    #[must_use]
    pub fn from_file(file: PeersFile) -> Self {
        let peers = file
            .peers
            .into_iter()
            .filter(|peer| !peer.stack_id.is_empty())
            .map(|peer| (peer.stack_id.clone(), peer))
            .collect();
        Self {
            local: file.local,
            peers,
        }
    }

    /// Returns the local stack identity.
    #[must_use]
    pub fn local(&self) -> &PeerInfo {
        &self.local
    }

    /// Returns the peer registered under the given `stack_id`.
    #[must_use]
    pub fn get(&self, stack_id: &str) -> Option<&PeerInfo> {
        self.peers.get(stack_id)
    }
}
