//! Policy evaluation for model invocations.
//!
//! Evaluation order is deliberate: explicit denials first, then scope, then
//! the tenant's deny list, then its allow list. The deny list is consulted
//! before the allow list so a model present in both stays denied.

use agentos_core::auth::AuthContext;
use agentos_core::tenant::TenantPolicy;

use crate::types::{ModelInvokeRequest, PolicyCheckRequest};

/// Policy decision outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// The request may proceed.
    Allow,
    /// The request is blocked.
    Deny,
}

impl Decision {
    /// Returns the lowercase wire name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Allow => "allow",
            Self::Deny => "deny",
        }
    }
}

/// Stateless policy engine.
#[derive(Debug, Default, Clone, Copy)]
pub struct PolicyEngine;

impl PolicyEngine {
    /// Creates a policy engine.
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Evaluates a model invocation.
    #[must_use]
    pub fn evaluate(
        &self,
        tenant_id: &str,
        ctx: &AuthContext,
        request: &ModelInvokeRequest,
        tenant_policy: Option<&TenantPolicy>,
    ) -> (Decision, Vec<String>) {
        let denials = explicit_denials(request);
        if !denials.is_empty() {
            return (Decision::Deny, denials);
        }

        if !ctx.scopes.is_empty() && !ctx.has_scope("models:invoke") {
            return (
                Decision::Deny,
                vec!["scope_missing:models:invoke".to_string()],
            );
        }

        if let Some(policy) = tenant_policy {
            if contains_model(&policy.denied_models, &request.model_id) {
                return (
                    Decision::Deny,
                    vec![format!("model_denied:{}", request.model_id)],
                );
            }
            if !policy.allowed_models.is_empty()
                && !contains_model(&policy.allowed_models, &request.model_id)
            {
                return (
                    Decision::Deny,
                    vec![format!("model_not_allowed:{}", request.model_id)],
                );
            }
        }

        if tenant_id.is_empty() {
            return (Decision::Deny, vec!["tenant_missing".to_string()]);
        }

        (Decision::Allow, vec!["policy_allow".to_string()])
    }

    /// Evaluates a generic policy check.
    #[must_use]
    pub fn evaluate_policy_check(
        &self,
        tenant_id: &str,
        ctx: &AuthContext,
        request: &PolicyCheckRequest,
    ) -> (Decision, Vec<String>) {
        if tenant_id.is_empty() {
            return (Decision::Deny, vec!["tenant_missing".to_string()]);
        }
        if request.action.eq_ignore_ascii_case("deny") {
            return (Decision::Deny, vec!["explicit_deny_action".to_string()]);
        }
        if !ctx.scopes.is_empty() && !ctx.has_scope("policy:check") {
            return (
                Decision::Deny,
                vec!["scope_missing:policy:check".to_string()],
            );
        }
        (Decision::Allow, vec!["policy_allow".to_string()])
    }
}

fn explicit_denials(request: &ModelInvokeRequest) -> Vec<String> {
    let mut reasons = Vec::new();
    if request.options.get("deny").and_then(serde_json::Value::as_bool) == Some(true) {
        reasons.push("option_deny=true".to_string());
    }
    if request.operation.eq_ignore_ascii_case("deny")
        || request.operation.eq_ignore_ascii_case("block")
    {
        reasons.push("operation_blocked".to_string());
    }
    reasons
}

fn contains_model(models: &[String], target: &str) -> bool {
    models
        .iter()
        .any(|model| model.eq_ignore_ascii_case(target))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn invoke(model_id: &str) -> ModelInvokeRequest {
        ModelInvokeRequest {
            model_id: model_id.to_string(),
            ..ModelInvokeRequest::default()
        }
    }

    fn ctx_with_scopes(scopes: &[&str]) -> AuthContext {
        AuthContext {
            scopes: scopes.iter().map(|s| (*s).to_string()).collect(),
            ..AuthContext::default()
        }
    }

    #[test]
    fn plain_requests_are_allowed() {
        let engine = PolicyEngine::new();
        let (decision, reasons) =
            engine.evaluate("tnt_a", &AuthContext::default(), &invoke("m1"), None);
        assert_eq!(decision, Decision::Allow);
        assert_eq!(reasons, vec!["policy_allow"]);
    }

    #[test]
    fn option_deny_blocks() {
        let engine = PolicyEngine::new();
        let mut request = invoke("m1");
        request
            .options
            .insert("deny".to_string(), serde_json::Value::Bool(true));
        let (decision, reasons) =
            engine.evaluate("tnt_a", &AuthContext::default(), &request, None);
        assert_eq!(decision, Decision::Deny);
        assert_eq!(reasons, vec!["option_deny=true"]);
    }

    #[test]
    fn deny_and_block_operations_are_blocked() {
        let engine = PolicyEngine::new();
        for operation in ["deny", "BLOCK"] {
            let mut request = invoke("m1");
            request.operation = operation.to_string();
            let (decision, reasons) =
                engine.evaluate("tnt_a", &AuthContext::default(), &request, None);
            assert_eq!(decision, Decision::Deny, "operation {operation}");
            assert_eq!(reasons, vec!["operation_blocked"]);
        }
    }

    #[test]
    fn missing_invoke_scope_denies_when_scopes_present() {
        let engine = PolicyEngine::new();
        let ctx = ctx_with_scopes(&["tenants:admin"]);
        let (decision, reasons) = engine.evaluate("tnt_a", &ctx, &invoke("m1"), None);
        assert_eq!(decision, Decision::Deny);
        assert_eq!(reasons, vec!["scope_missing:models:invoke"]);

        // Empty scope sets skip the check entirely.
        let (decision, _) =
            engine.evaluate("tnt_a", &AuthContext::default(), &invoke("m1"), None);
        assert_eq!(decision, Decision::Allow);
    }

    #[test]
    fn deny_list_blocks_case_insensitively() {
        let engine = PolicyEngine::new();
        let policy = TenantPolicy {
            denied_models: vec!["local-stub-llm".to_string()],
            ..TenantPolicy::default()
        };
        let (decision, reasons) = engine.evaluate(
            "tnt_a",
            &AuthContext::default(),
            &invoke("Local-Stub-LLM"),
            Some(&policy),
        );
        assert_eq!(decision, Decision::Deny);
        assert_eq!(reasons, vec!["model_denied:Local-Stub-LLM"]);
    }

    #[test]
    fn deny_list_wins_over_allow_list() {
        let engine = PolicyEngine::new();
        let policy = TenantPolicy {
            allowed_models: vec!["m1".to_string()],
            denied_models: vec!["m1".to_string()],
            ..TenantPolicy::default()
        };
        let (decision, reasons) = engine.evaluate(
            "tnt_a",
            &AuthContext::default(),
            &invoke("m1"),
            Some(&policy),
        );
        assert_eq!(decision, Decision::Deny);
        assert_eq!(reasons, vec!["model_denied:m1"]);
    }

    #[test]
    fn allow_list_excludes_unlisted_models() {
        let engine = PolicyEngine::new();
        let policy = TenantPolicy {
            allowed_models: vec!["m1".to_string()],
            ..TenantPolicy::default()
        };
        let (decision, reasons) = engine.evaluate(
            "tnt_a",
            &AuthContext::default(),
            &invoke("m2"),
            Some(&policy),
        );
        assert_eq!(decision, Decision::Deny);
        assert_eq!(reasons, vec!["model_not_allowed:m2"]);

        let (decision, _) = engine.evaluate(
            "tnt_a",
            &AuthContext::default(),
            &invoke("M1"),
            Some(&policy),
        );
        assert_eq!(decision, Decision::Allow);
    }

    #[test]
    fn empty_tenant_is_denied_last() {
        let engine = PolicyEngine::new();
        let (decision, reasons) =
            engine.evaluate("", &AuthContext::default(), &invoke("m1"), None);
        assert_eq!(decision, Decision::Deny);
        assert_eq!(reasons, vec!["tenant_missing"]);
    }

    #[test]
    fn policy_check_denies_explicit_action() {
        let engine = PolicyEngine::new();
        let request = PolicyCheckRequest {
            action: "DENY".to_string(),
            ..PolicyCheckRequest::default()
        };
        let (decision, reasons) =
            engine.evaluate_policy_check("tnt_a", &AuthContext::default(), &request);
        assert_eq!(decision, Decision::Deny);
        assert_eq!(reasons, vec!["explicit_deny_action"]);
    }

    #[test]
    fn policy_check_requires_check_scope_when_scoped() {
        let engine = PolicyEngine::new();
        let ctx = ctx_with_scopes(&["models:invoke"]);
        let request = PolicyCheckRequest {
            action: "read".to_string(),
            ..PolicyCheckRequest::default()
        };
        let (decision, reasons) = engine.evaluate_policy_check("tnt_a", &ctx, &request);
        assert_eq!(decision, Decision::Deny);
        assert_eq!(reasons, vec!["scope_missing:policy:check"]);
    }
}
