//! Auth context extraction and tenant resolution.
//!
//! Every request derives an [`AuthContext`] from two channels: the
//! `X-Tenant-Id` / `X-Principal-Id` / `X-Scopes` header family and the claims
//! of a bearer token, when present. The two channels are reconciled by
//! [`require_tenant`]: a disagreement between header tenant and token tenant
//! is an error, never a silent override.
//!
//! Claim extraction here is deliberately signature-blind; it only decodes the
//! payload segment. Signature verification, where configured, is a separate
//! federation-level concern.

use axum::extract::FromRequestParts;
use axum::http::HeaderMap;
use axum::http::request::Parts;
use base64::Engine;
use serde_json::Value;

use crate::http::ApiError;

/// Resolved per-request identity view.
#[derive(Debug, Clone, Default)]
pub struct AuthContext {
    /// Tenant identifier from the `X-Tenant-Id` header (pre-reconciliation),
    /// falling back to the token tenant when the header is absent.
    pub tenant_id: String,
    /// Principal identifier (header, falling back to token claims).
    pub principal_id: String,
    /// Scopes from `X-Scopes` (space/comma delimited) or token claims.
    pub scopes: Vec<String>,
    /// Subject type (header or `subject_type`/`principal_type` claim).
    pub subject_type: String,
    /// API key identifier (header or `api_key_id` claim).
    pub api_key_id: String,
    /// Raw bearer token, when present.
    pub bearer_token: Option<String>,
    /// Tenant claim extracted from the token (`tenant_id`, alias `tid`).
    pub token_tenant_id: Option<String>,
    /// Principal claim extracted from the token (`principal_id`, alias `sub`).
    pub token_principal_id: Option<String>,
}

impl AuthContext {
    /// Derives an auth context from request headers and (optionally) the
    /// bearer token payload.
    #[must_use]
    #[allow(clippy::missing_panics_doc)]
    pub fn from_headers(headers: &HeaderMap) -> Self {
        let mut ctx = Self {
            tenant_id: header_string(headers, "X-Tenant-Id"),
            principal_id: header_string(headers, "X-Principal-Id"),
            scopes: parse_scopes(&header_string(headers, "X-Scopes")),
            subject_type: header_string(headers, "X-Subject-Type"),
            api_key_id: header_string(headers, "X-Api-Key-Id"),
            ..Self::default()
        };

        let Some(token) = bearer_token(headers) else {
            return ctx;
        };
        let claims = parse_jwt_claims(&token);
        ctx.bearer_token = Some(token);
        let Some(claims) = claims else {
            return ctx;
        };

        ctx.token_tenant_id = claim_string(&claims, &["tenant_id", "tid"]);
        ctx.token_principal_id = claim_string(&claims, &["principal_id", "sub"]);

        if ctx.principal_id.is_empty() {
            if let Some(principal) = ctx.token_principal_id.as_deref() {
                ctx.principal_id = principal.to_string();
            }
        }
        if ctx.tenant_id.is_empty() {
            if let Some(tenant) = ctx.token_tenant_id.as_deref() {
                ctx.tenant_id = tenant.to_string();
            }
        }
        if ctx.scopes.is_empty() {
            ctx.scopes = parse_scopes_claim(&claims);
        }
        if ctx.subject_type.is_empty() {
            if let Some(value) = claim_string(&claims, &["subject_type", "principal_type"]) {
                ctx.subject_type = value;
            }
        }
        if ctx.api_key_id.is_empty() {
            if let Some(value) = claim_string(&claims, &["api_key_id"]) {
                ctx.api_key_id = value;
            }
        }

        ctx
    }

    /// Returns true if the context carries the given scope.
    ///
    /// Comparison is case-insensitive and trims whitespace.
    #[must_use]
    pub fn has_scope(&self, target: &str) -> bool {
        let target = target.trim();
        self.scopes
            .iter()
            .any(|scope| scope.trim().eq_ignore_ascii_case(target))
    }
}

impl<S> FromRequestParts<S> for AuthContext
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        if let Some(existing) = parts.extensions.get::<Self>() {
            return Ok(existing.clone());
        }
        let ctx = Self::from_headers(&parts.headers);
        parts.extensions.insert(ctx.clone());
        Ok(ctx)
    }
}

/// Tenant resolution failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum AuthError {
    /// No tenant could be resolved from headers, token, or defaults.
    #[error("tenant_id required")]
    TenantRequired,
    /// Header tenant and token tenant are both present and disagree.
    #[error("tenant_id mismatch between token and header")]
    TenantMismatch,
}

/// Returns the resolved tenant id, reconciling header and token channels.
///
/// The token tenant wins when only one channel is present; a disagreement
/// between the two is an error. When neither is present the configured
/// default tenant (dev/demo shortcut) is used.
///
/// # Errors
///
/// Returns [`AuthError::TenantMismatch`] when header and token tenants differ,
/// and [`AuthError::TenantRequired`] when no tenant can be resolved.
pub fn require_tenant(
    ctx: &AuthContext,
    default_tenant: Option<&str>,
) -> Result<String, AuthError> {
    let token_tenant = ctx.token_tenant_id.as_deref().unwrap_or("").trim();
    let header_tenant = ctx.tenant_id.trim();

    if !token_tenant.is_empty() && !header_tenant.is_empty() && token_tenant != header_tenant {
        return Err(AuthError::TenantMismatch);
    }
    if !token_tenant.is_empty() {
        return Ok(token_tenant.to_string());
    }
    if !header_tenant.is_empty() {
        return Ok(header_tenant.to_string());
    }
    if let Some(default) = default_tenant {
        let default = default.trim();
        if !default.is_empty() {
            return Ok(default.to_string());
        }
    }
    Err(AuthError::TenantRequired)
}

fn header_string(headers: &HeaderMap, name: &str) -> String {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .unwrap_or_default()
        .to_string()
}

fn bearer_token(headers: &HeaderMap) -> Option<String> {
    let raw = header_string(headers, "Authorization");
    let lowered = raw.to_ascii_lowercase();
    let token = lowered
        .strip_prefix("bearer ")
        .map(|_| raw["bearer ".len()..].trim())?;
    if token.is_empty() {
        None
    } else {
        Some(token.to_string())
    }
}

fn parse_scopes(raw: &str) -> Vec<String> {
    raw.replace(',', " ")
        .split_whitespace()
        .map(str::to_string)
        .collect()
}

fn parse_scopes_claim(claims: &serde_json::Map<String, Value>) -> Vec<String> {
    if let Some(Value::Array(items)) = claims.get("scopes") {
        return scopes_from_array(items);
    }
    if let Some(Value::String(raw)) = claims.get("scope") {
        return parse_scopes(raw);
    }
    match claims.get("scp") {
        Some(Value::Array(items)) => scopes_from_array(items),
        Some(Value::String(raw)) => parse_scopes(raw),
        _ => Vec::new(),
    }
}

fn scopes_from_array(items: &[Value]) -> Vec<String> {
    items
        .iter()
        .filter_map(Value::as_str)
        .map(str::trim)
        .filter(|scope| !scope.is_empty())
        .map(str::to_string)
        .collect()
}

fn claim_string(claims: &serde_json::Map<String, Value>, names: &[&str]) -> Option<String> {
    names
        .iter()
        .filter_map(|name| claims.get(*name).and_then(Value::as_str))
        .map(str::trim)
        .find(|value| !value.is_empty())
        .map(str::to_string)
}

/// Decodes the payload segment of a JWT without verifying its signature.
fn parse_jwt_claims(token: &str) -> Option<serde_json::Map<String, Value>> {
    let payload = token.split('.').nth(1)?;
    let decoded = base64::engine::general_purpose::URL_SAFE_NO_PAD
        .decode(payload)
        .ok()?;
    match serde_json::from_slice::<Value>(&decoded).ok()? {
        Value::Object(map) => Some(map),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn token_with_claims(claims: &Value) -> String {
        let engine = &base64::engine::general_purpose::URL_SAFE_NO_PAD;
        let header = engine.encode(br#"{"alg":"none","typ":"JWT"}"#);
        let payload = engine.encode(serde_json::to_vec(claims).expect("serialize claims"));
        format!("{header}.{payload}.sig")
    }

    fn headers_with(pairs: &[(&str, &str)]) -> HeaderMap {
        let mut headers = HeaderMap::new();
        for (name, value) in pairs {
            headers.insert(
                axum::http::header::HeaderName::try_from(*name).expect("header name"),
                HeaderValue::from_str(value).expect("header value"),
            );
        }
        headers
    }

    #[test]
    fn context_from_plain_headers() {
        let headers = headers_with(&[
            ("X-Tenant-Id", "tnt_a"),
            ("X-Principal-Id", "usr_1"),
            ("X-Scopes", "tenants:admin, models:invoke"),
        ]);
        let ctx = AuthContext::from_headers(&headers);
        assert_eq!(ctx.tenant_id, "tnt_a");
        assert_eq!(ctx.principal_id, "usr_1");
        assert_eq!(ctx.scopes, vec!["tenants:admin", "models:invoke"]);
    }

    #[test]
    fn token_claims_fill_missing_fields() {
        let token = token_with_claims(&serde_json::json!({
            "tid": "tnt_token",
            "sub": "usr_token",
            "scope": "models:invoke",
            "principal_type": "service",
            "api_key_id": "key_1",
        }));
        let headers = headers_with(&[("Authorization", &format!("Bearer {token}"))]);
        let ctx = AuthContext::from_headers(&headers);
        assert_eq!(ctx.token_tenant_id.as_deref(), Some("tnt_token"));
        assert_eq!(ctx.tenant_id, "tnt_token");
        assert_eq!(ctx.principal_id, "usr_token");
        assert_eq!(ctx.scopes, vec!["models:invoke"]);
        assert_eq!(ctx.subject_type, "service");
        assert_eq!(ctx.api_key_id, "key_1");
    }

    #[test]
    fn primary_claim_names_win_over_aliases() {
        let token = token_with_claims(&serde_json::json!({
            "tenant_id": "tnt_primary",
            "tid": "tnt_alias",
            "principal_id": "usr_primary",
            "sub": "usr_alias",
        }));
        let headers = headers_with(&[("Authorization", &format!("Bearer {token}"))]);
        let ctx = AuthContext::from_headers(&headers);
        assert_eq!(ctx.token_tenant_id.as_deref(), Some("tnt_primary"));
        assert_eq!(ctx.token_principal_id.as_deref(), Some("usr_primary"));
    }

    #[test]
    fn scp_list_claim_is_accepted() {
        let token = token_with_claims(&serde_json::json!({
            "scp": ["a:read", " b:write "],
        }));
        let headers = headers_with(&[("Authorization", &format!("Bearer {token}"))]);
        let ctx = AuthContext::from_headers(&headers);
        assert_eq!(ctx.scopes, vec!["a:read", "b:write"]);
    }

    #[test]
    fn malformed_token_is_ignored() {
        let headers = headers_with(&[
            ("X-Tenant-Id", "tnt_a"),
            ("Authorization", "Bearer not-a-jwt"),
        ]);
        let ctx = AuthContext::from_headers(&headers);
        assert_eq!(ctx.tenant_id, "tnt_a");
        assert!(ctx.token_tenant_id.is_none());
        assert_eq!(ctx.bearer_token.as_deref(), Some("not-a-jwt"));
    }

    #[test]
    fn require_tenant_token_wins() {
        let ctx = AuthContext {
            token_tenant_id: Some("tnt_token".to_string()),
            ..AuthContext::default()
        };
        assert_eq!(require_tenant(&ctx, None).unwrap(), "tnt_token");
    }

    #[test]
    fn require_tenant_mismatch_is_an_error() {
        let ctx = AuthContext {
            tenant_id: "tnt_header".to_string(),
            token_tenant_id: Some("tnt_token".to_string()),
            ..AuthContext::default()
        };
        assert_eq!(
            require_tenant(&ctx, None).unwrap_err(),
            AuthError::TenantMismatch
        );
    }

    #[test]
    fn require_tenant_matching_channels_agree() {
        let ctx = AuthContext {
            tenant_id: "tnt_a".to_string(),
            token_tenant_id: Some("tnt_a".to_string()),
            ..AuthContext::default()
        };
        assert_eq!(require_tenant(&ctx, None).unwrap(), "tnt_a");
    }

    #[test]
    fn require_tenant_falls_back_to_default() {
        let ctx = AuthContext::default();
        assert_eq!(
            require_tenant(&ctx, Some("tnt_default")).unwrap(),
            "tnt_default"
        );
        assert_eq!(
            require_tenant(&ctx, None).unwrap_err(),
            AuthError::TenantRequired
        );
    }

    #[test]
    fn scope_check_trims_and_ignores_case() {
        let ctx = AuthContext {
            scopes: vec![" Tenants:Admin ".to_string()],
            ..AuthContext::default()
        };
        assert!(ctx.has_scope("tenants:admin"));
        assert!(!ctx.has_scope("models:invoke"));
    }
}
