//! Tenant records and the admin tenant store.
//!
//! Tenants are the isolation boundary for every resource in the control
//! plane. The store keeps records in memory behind a read/write lock; reads
//! take the shared lock, mutations the exclusive one. Tenants seeded as the
//! process default (dev/demo profiles) are protected from deletion.

use std::collections::{HashMap, HashSet};
use std::sync::RwLock;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Per-tenant model policy.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct TenantPolicy {
    /// When non-empty, only these models may be invoked.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub allowed_models: Vec<String>,
    /// Models the tenant may never invoke. Checked before the allow list.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub denied_models: Vec<String>,
    /// Hourly token budget; `None` or a value ≤ 0 disables the dimension.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens_per_hour: Option<i64>,
    /// Daily token budget; `None` or a value ≤ 0 disables the dimension.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens_per_day: Option<i64>,
}

/// A tenant admin record.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Tenant {
    /// Tenant identifier (unique).
    pub tenant_id: String,
    /// Display name.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,
    /// Lifecycle status (`active` on create when unset).
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub status: String,
    /// Commercial plan tier.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub plan_tier: String,
    /// Feature entitlements.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entitlements: Option<serde_json::Map<String, Value>>,
    /// Quota overrides.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quotas: Option<serde_json::Map<String, Value>>,
    /// Free-form metadata.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Map<String, Value>>,
    /// Model policy for this tenant.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub policy: Option<TenantPolicy>,
    /// Creation timestamp.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    /// Last update timestamp.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

/// Tenant store failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum TenantStoreError {
    /// The record is missing its identity field.
    #[error("invalid tenant")]
    InvalidTenant,
    /// A tenant with this identifier already exists.
    #[error("tenant already exists")]
    TenantExists,
    /// No tenant with this identifier exists.
    #[error("tenant not found")]
    NotFound,
    /// Seeded default tenants cannot be deleted.
    #[error("cannot delete default tenant")]
    ProtectedDefault,
}

#[derive(Debug, Default)]
struct StoreState {
    tenants: HashMap<String, Tenant>,
    defaults: HashSet<String>,
}

/// In-memory tenant admin store.
#[derive(Debug, Default)]
pub struct TenantStore {
    state: RwLock<StoreState>,
}

impl TenantStore {
    /// Creates an empty tenant store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds a default tenant if it does not already exist and marks it as
    /// protected from deletion.
    pub fn ensure_default(&self, tenant_id: &str) {
        if tenant_id.is_empty() {
            return;
        }
        let mut state = write_lock(&self.state);
        if !state.tenants.contains_key(tenant_id) {
            let now = Utc::now();
            state.tenants.insert(
                tenant_id.to_string(),
                Tenant {
                    tenant_id: tenant_id.to_string(),
                    name: "default tenant".to_string(),
                    status: "active".to_string(),
                    plan_tier: "default".to_string(),
                    created_at: Some(now),
                    updated_at: Some(now),
                    ..Tenant::default()
                },
            );
        }
        state.defaults.insert(tenant_id.to_string());
    }

    /// Creates a tenant.
    ///
    /// # Errors
    ///
    /// Returns [`TenantStoreError::InvalidTenant`] when the identity field is
    /// empty and [`TenantStoreError::TenantExists`] on identifier collision.
    pub fn create(&self, mut tenant: Tenant) -> Result<Tenant, TenantStoreError> {
        if tenant.tenant_id.is_empty() {
            return Err(TenantStoreError::InvalidTenant);
        }
        let now = Utc::now();
        if tenant.status.is_empty() {
            tenant.status = "active".to_string();
        }
        if tenant.created_at.is_none() {
            tenant.created_at = Some(now);
        }
        tenant.updated_at = Some(now);

        let mut state = write_lock(&self.state);
        if state.tenants.contains_key(&tenant.tenant_id) {
            return Err(TenantStoreError::TenantExists);
        }
        state
            .tenants
            .insert(tenant.tenant_id.clone(), tenant.clone());
        Ok(tenant)
    }

    /// Applies a partial update: only populated fields replace stored ones.
    ///
    /// # Errors
    ///
    /// Returns [`TenantStoreError::NotFound`] for unknown tenants.
    pub fn update(&self, tenant_id: &str, update: Tenant) -> Result<Tenant, TenantStoreError> {
        if tenant_id.is_empty() {
            return Err(TenantStoreError::InvalidTenant);
        }
        let mut state = write_lock(&self.state);
        let current = state
            .tenants
            .get_mut(tenant_id)
            .ok_or(TenantStoreError::NotFound)?;

        if !update.name.is_empty() {
            current.name = update.name;
        }
        if !update.plan_tier.is_empty() {
            current.plan_tier = update.plan_tier;
        }
        if !update.status.is_empty() {
            current.status = update.status;
        }
        if update.entitlements.is_some() {
            current.entitlements = update.entitlements;
        }
        if update.quotas.is_some() {
            current.quotas = update.quotas;
        }
        if update.metadata.is_some() {
            current.metadata = update.metadata;
        }
        if update.policy.is_some() {
            current.policy = update.policy;
        }
        current.updated_at = Some(Utc::now());
        Ok(current.clone())
    }

    /// Deletes a tenant. Seeded defaults are protected.
    ///
    /// # Errors
    ///
    /// Returns [`TenantStoreError::NotFound`] for unknown tenants and
    /// [`TenantStoreError::ProtectedDefault`] for seeded defaults.
    pub fn delete(&self, tenant_id: &str) -> Result<Tenant, TenantStoreError> {
        if tenant_id.is_empty() {
            return Err(TenantStoreError::InvalidTenant);
        }
        let mut state = write_lock(&self.state);
        if !state.tenants.contains_key(tenant_id) {
            return Err(TenantStoreError::NotFound);
        }
        if state.defaults.contains(tenant_id) {
            return Err(TenantStoreError::ProtectedDefault);
        }
        state
            .tenants
            .remove(tenant_id)
            .ok_or(TenantStoreError::NotFound)
    }

    /// Returns the tenant record, if any.
    #[must_use]
    pub fn get(&self, tenant_id: &str) -> Option<Tenant> {
        if tenant_id.is_empty() {
            return None;
        }
        read_lock(&self.state).tenants.get(tenant_id).cloned()
    }

    /// Returns true when a tenant record exists.
    #[must_use]
    pub fn exists(&self, tenant_id: &str) -> bool {
        !tenant_id.is_empty() && read_lock(&self.state).tenants.contains_key(tenant_id)
    }

    /// Returns all tenant records.
    #[must_use]
    pub fn list(&self) -> Vec<Tenant> {
        read_lock(&self.state).tenants.values().cloned().collect()
    }
}

fn read_lock(state: &RwLock<StoreState>) -> std::sync::RwLockReadGuard<'_, StoreState> {
    state.read().unwrap_or_else(std::sync::PoisonError::into_inner)
}

fn write_lock(state: &RwLock<StoreState>) -> std::sync::RwLockWriteGuard<'_, StoreState> {
    state
        .write()
        .unwrap_or_else(std::sync::PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tenant(id: &str) -> Tenant {
        Tenant {
            tenant_id: id.to_string(),
            ..Tenant::default()
        }
    }

    #[test]
    fn create_defaults_status_and_timestamps() {
        let store = TenantStore::new();
        let created = store.create(tenant("tnt_a")).expect("create");
        assert_eq!(created.status, "active");
        assert!(created.created_at.is_some());
        assert!(created.updated_at.is_some());
    }

    #[test]
    fn create_rejects_duplicates_and_empty_ids() {
        let store = TenantStore::new();
        store.create(tenant("tnt_a")).expect("create");
        assert_eq!(
            store.create(tenant("tnt_a")).unwrap_err(),
            TenantStoreError::TenantExists
        );
        assert_eq!(
            store.create(tenant("")).unwrap_err(),
            TenantStoreError::InvalidTenant
        );
    }

    #[test]
    fn update_is_partial() {
        let store = TenantStore::new();
        store
            .create(Tenant {
                tenant_id: "tnt_a".to_string(),
                name: "alpha".to_string(),
                plan_tier: "free".to_string(),
                ..Tenant::default()
            })
            .expect("create");

        let updated = store
            .update(
                "tnt_a",
                Tenant {
                    plan_tier: "pro".to_string(),
                    ..Tenant::default()
                },
            )
            .expect("update");
        assert_eq!(updated.name, "alpha");
        assert_eq!(updated.plan_tier, "pro");
    }

    #[test]
    fn update_replaces_policy_when_present() {
        let store = TenantStore::new();
        store.create(tenant("tnt_a")).expect("create");
        let updated = store
            .update(
                "tnt_a",
                Tenant {
                    policy: Some(TenantPolicy {
                        denied_models: vec!["local-stub-llm".to_string()],
                        ..TenantPolicy::default()
                    }),
                    ..Tenant::default()
                },
            )
            .expect("update");
        assert_eq!(
            updated.policy.expect("policy").denied_models,
            vec!["local-stub-llm"]
        );
    }

    #[test]
    fn seeded_default_cannot_be_deleted() {
        let store = TenantStore::new();
        store.ensure_default("tnt_default");
        assert_eq!(
            store.delete("tnt_default").unwrap_err(),
            TenantStoreError::ProtectedDefault
        );
        assert!(store.exists("tnt_default"));
    }

    #[test]
    fn ensure_default_marks_existing_tenant_protected() {
        let store = TenantStore::new();
        store.create(tenant("tnt_a")).expect("create");
        store.ensure_default("tnt_a");
        assert_eq!(
            store.delete("tnt_a").unwrap_err(),
            TenantStoreError::ProtectedDefault
        );
    }

    #[test]
    fn delete_removes_regular_tenants() {
        let store = TenantStore::new();
        store.create(tenant("tnt_a")).expect("create");
        store.delete("tnt_a").expect("delete");
        assert!(!store.exists("tnt_a"));
        assert_eq!(
            store.delete("tnt_a").unwrap_err(),
            TenantStoreError::NotFound
        );
    }
}
