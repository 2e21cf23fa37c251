//! Model provider registry and the local stub provider.
//!
//! The registry resolves a requested model to its provider, falling back to
//! the registry default when the model is unknown. The stub provider echoes
//! the input text and reports a word-count token estimate, which is what
//! feeds the usage meter in dev stacks.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use chrono::Utc;
use serde_json::{Value, json};

use crate::types::{Model, ModelInvokeRequest};

/// Provider invocation failure.
#[derive(Debug, thiserror::Error)]
#[error("provider error: {0}")]
pub struct ProviderError(pub String);

/// A model provider.
pub trait Provider: Send + Sync {
    /// Invokes the model, returning `(output, usage)`.
    ///
    /// # Errors
    ///
    /// Returns a [`ProviderError`] when the upstream invocation fails.
    fn invoke(
        &self,
        request: &ModelInvokeRequest,
    ) -> Result<
        (
            serde_json::Map<String, Value>,
            serde_json::Map<String, Value>,
        ),
        ProviderError,
    >;
}

struct ProviderEntry {
    model: Model,
    provider: Arc<dyn Provider>,
    default: bool,
}

/// Model catalog mapping model IDs to providers.
pub struct ProviderRegistry {
    entries: RwLock<HashMap<String, ProviderEntry>>,
}

impl std::fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderRegistry").finish_non_exhaustive()
    }
}

impl Default for ProviderRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ProviderRegistry {
    /// Creates a registry pre-seeded with the local stub provider.
    #[must_use]
    pub fn new() -> Self {
        let registry = Self {
            entries: RwLock::new(HashMap::new()),
        };
        registry.register(
            Model {
                model_id: "local-stub-llm".to_string(),
                provider: "stub".to_string(),
                display_name: "Local Stub LLM".to_string(),
                capabilities: Some(
                    json!({"chat": true})
                        .as_object()
                        .cloned()
                        .unwrap_or_default(),
                ),
            },
            Arc::new(StubProvider),
            true,
        );
        registry
    }

    /// Registers a model with its provider.
    pub fn register(&self, model: Model, provider: Arc<dyn Provider>, default: bool) {
        let mut entries = self.write();
        entries.insert(
            model.model_id.clone(),
            ProviderEntry {
                model,
                provider,
                default,
            },
        );
    }

    /// Returns all registered models.
    #[must_use]
    pub fn models(&self) -> Vec<Model> {
        let mut models: Vec<Model> = self.read().values().map(|e| e.model.clone()).collect();
        models.sort_by(|a, b| a.model_id.cmp(&b.model_id));
        models
    }

    /// Resolves a model ID to `(provider, model)`, falling back to the
    /// registry default for unknown IDs.
    #[must_use]
    pub fn resolve(&self, model_id: &str) -> Option<(Arc<dyn Provider>, Model)> {
        let entries = self.read();
        if let Some(entry) = entries.get(model_id) {
            return Some((Arc::clone(&entry.provider), entry.model.clone()));
        }
        entries
            .values()
            .find(|entry| entry.default)
            .map(|entry| (Arc::clone(&entry.provider), entry.model.clone()))
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, HashMap<String, ProviderEntry>> {
        self.entries
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, HashMap<String, ProviderEntry>> {
        self.entries
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

/// Local stub provider used by dev stacks.
#[derive(Debug, Default, Clone, Copy)]
pub struct StubProvider;

impl Provider for StubProvider {
    fn invoke(
        &self,
        request: &ModelInvokeRequest,
    ) -> Result<
        (
            serde_json::Map<String, Value>,
            serde_json::Map<String, Value>,
        ),
        ProviderError,
    > {
        let text = request
            .input
            .get("text")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|text| !text.is_empty())
            .map_or_else(|| "stub response".to_string(), |text| format!("stub: {text}"));

        let now = Utc::now().to_rfc3339();
        let prompt_tokens = token_estimate(&request.input);

        let output = json!({
            "type": "text",
            "text": text,
            "echo": request.input,
            "ts": now,
        });
        let usage = json!({
            "prompt_tokens": prompt_tokens,
            "completion_tokens": 32,
            "total_tokens": prompt_tokens + 32,
            "model_id": request.model_id,
            "provider": "stub",
            "timestamp": now,
        });

        Ok((
            output.as_object().cloned().unwrap_or_default(),
            usage.as_object().cloned().unwrap_or_default(),
        ))
    }
}

fn token_estimate(input: &serde_json::Map<String, Value>) -> i64 {
    if input.is_empty() {
        return 8;
    }
    match input.get("text").and_then(Value::as_str) {
        Some(text) => {
            let words = text.split_whitespace().count() as i64;
            if words < 4 { 8 } else { words * 4 }
        }
        None => 12,
    }
}
