//! The security gate: the runtime's single authentication/authorization
//! entry point (spec §4.4).
//!
//! A turn never calls `api_key::verify` or `jwt::verify_token` directly;
//! it calls [`SecurityGate::authenticate`], which tries whichever
//! credential was supplied, resolves the caller's effective permissions
//! through [`rbac::RbacRegistry`], and returns one [`AuthResult`]. Rate
//! limiting, quota, and content safety are separate checks a caller
//! invokes against that `AuthResult` once authenticated — they are not
//! part of establishing identity, so they live in their own methods
//! rather than being folded into `authenticate`.

mod api_key;
mod content;
mod jwt;
mod quota;
mod rate_limit;
mod rbac;

pub use api_key::{ApiKey, ApiKeyStatus, ApiKeyStore, IssuedKey, ServiceAccount};
pub use content::{scan, ContentCheckResult, ContentFlag};
pub use jwt::{Claims, JwtAuthService, TokenType, DEFAULT_ACCESS_TTL_SECS, DEFAULT_REFRESH_TTL_SECS};
pub use quota::{QuotaResource, QuotaTracker};
pub use rate_limit::{default_configs, RateLimitConfig, RateLimiter};
pub use rbac::RbacRegistry;

use crate::{Error, Result};
use std::collections::HashSet;

/// Which credential path authenticated the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthMethod {
    ApiKey,
    Jwt,
}

/// The outcome of a successful [`SecurityGate::authenticate`] call:
/// everything downstream checks (RBAC, rate limit, quota) need.
#[derive(Debug, Clone)]
pub struct AuthResult {
    pub subject_id: String,
    pub method: AuthMethod,
    pub roles: HashSet<String>,
    pub permissions: HashSet<String>,
}

impl AuthResult {
    pub fn has_permission(&self, permission: &str) -> bool {
        self.permissions.contains(permission)
    }
}

/// Credentials a caller may present. Exactly one of `api_key`/`jwt`
/// determines which path [`SecurityGate::authenticate`] takes; both
/// present is an error (spec: a single turn authenticates one way).
#[derive(Debug, Clone, Default)]
pub struct Credentials {
    pub api_key: Option<String>,
    pub jwt: Option<String>,
}

impl Credentials {
    pub fn api_key(key: impl Into<String>) -> Self {
        Self {
            api_key: Some(key.into()),
            jwt: None,
        }
    }

    pub fn jwt(token: impl Into<String>) -> Self {
        Self {
            api_key: None,
            jwt: Some(token.into()),
        }
    }
}

/// Bundles the API-key store, JWT service, and RBAC registry behind one
/// authentication entry point, plus the rate limiter/quota
/// tracker/content scanner a turn consults once authenticated.
pub struct SecurityGate {
    pub api_keys: ApiKeyStore,
    pub jwt: JwtAuthService,
    pub rbac: RbacRegistry,
    pub rate_limiter: RateLimiter,
    pub quotas: QuotaTracker,
}

impl SecurityGate {
    pub fn new(jwt_secret: &[u8]) -> Self {
        Self {
            api_keys: ApiKeyStore::new(),
            jwt: JwtAuthService::new(jwt_secret),
            rbac: RbacRegistry::new(),
            rate_limiter: RateLimiter::new(),
            quotas: QuotaTracker::new(),
        }
    }

    /// Establishes identity from whichever credential is present, then
    /// resolves effective permissions: the raw grants carried on the
    /// credential (an API key's own `permissions`, or a JWT's
    /// `permissions` claim) unioned with whatever the RBAC registry
    /// adds for the credential's roles.
    pub fn authenticate(&self, credentials: &Credentials, now: u64) -> Result<AuthResult> {
        match (&credentials.api_key, &credentials.jwt) {
            (Some(_), Some(_)) => Err(Error::auth_failed(
                "only one of api_key or jwt may be supplied",
            )),
            (Some(key), None) => {
                let (account_id, mut permissions) = self.api_keys.verify(key, now)?;
                let roles = HashSet::new();
                permissions.extend(self.rbac.effective_permissions(&roles));
                Ok(AuthResult {
                    subject_id: account_id,
                    method: AuthMethod::ApiKey,
                    roles,
                    permissions,
                })
            }
            (None, Some(token)) => {
                let claims = self.jwt.verify_token(token, TokenType::Access)?;
                let roles: HashSet<String> = claims.roles.into_iter().collect();
                let mut permissions: HashSet<String> = claims.permissions.into_iter().collect();
                permissions.extend(self.rbac.effective_permissions(&roles));
                Ok(AuthResult {
                    subject_id: claims.sub,
                    method: AuthMethod::Jwt,
                    roles,
                    permissions,
                })
            }
            (None, None) => Err(Error::auth_failed("no credential supplied")),
        }
    }

    /// RBAC check: fails `PermissionDenied` if `auth` lacks `permission`.
    pub fn require_permission(&self, auth: &AuthResult, permission: &str) -> Result<()> {
        if auth.has_permission(permission) {
            Ok(())
        } else {
            Err(Error::permission_denied(permission))
        }
    }

    /// Rate-limit check for `(resource_type, auth.subject_id)`. Fails
    /// `RateLimited` without incrementing past the cap.
    pub fn check_rate_limit(&self, auth: &AuthResult, resource_type: &str, now: u64) -> Result<()> {
        if self.rate_limiter.check_limit(resource_type, &auth.subject_id, now) {
            Ok(())
        } else {
            Err(Error::rate_limited(resource_type))
        }
    }

    /// Quota check for `(resource, auth.subject_id)`. Does not consume
    /// the quota — call [`QuotaTracker::use_quota`] separately once the
    /// resource has actually been spent.
    pub fn check_quota(&self, auth: &AuthResult, resource: QuotaResource, amount: u64) -> Result<()> {
        if self.quotas.check_quota(&auth.subject_id, resource, amount) {
            Ok(())
        } else {
            Err(Error::quota_exceeded(resource.to_string()))
        }
    }

    /// Content-safety check. Returns `ContentBlocked` only for content
    /// flagged as unsafe to use even after redaction (spec: "by
    /// rewrite" is the stated recovery path, so callers that want to
    /// redact-and-continue should call [`scan`] directly instead).
    pub fn check_content(&self, text: &str) -> Result<ContentCheckResult> {
        let result = scan(text);
        if result.is_flagged && !result.safe_to_use {
            return Err(Error::content_blocked(
                result.flags.iter().map(|f| f.to_string()).collect::<Vec<_>>().join(", "),
            ));
        }
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gate() -> SecurityGate {
        SecurityGate::new(b"test-secret-key-for-unit-tests")
    }

    #[test]
    fn test_authenticate_with_api_key() {
        let gate = gate();
        let issued = gate
            .api_keys
            .create_key("acct1", HashSet::from(["model:use".to_string()]), 0, None)
            .unwrap();

        let auth = gate.authenticate(&Credentials::api_key(issued.wire_key), 1).unwrap();
        assert_eq!(auth.subject_id, "acct1");
        assert_eq!(auth.method, AuthMethod::ApiKey);
        assert!(auth.has_permission("model:use"));
    }

    #[test]
    fn test_authenticate_with_jwt() {
        let gate = gate();
        let token = gate
            .jwt
            .create_access_token("user1", vec!["member".into()], vec!["api:use".into()], Default::default(), 1_900_000_000)
            .unwrap();

        let auth = gate.authenticate(&Credentials::jwt(token), 1_900_000_000).unwrap();
        assert_eq!(auth.subject_id, "user1");
        assert_eq!(auth.method, AuthMethod::Jwt);
        assert!(auth.has_permission("api:use"));
    }

    #[test]
    fn test_authenticate_with_no_credential_fails() {
        let gate = gate();
        assert!(gate.authenticate(&Credentials::default(), 0).is_err());
    }

    #[test]
    fn test_authenticate_with_both_credentials_fails() {
        let gate = gate();
        let creds = Credentials {
            api_key: Some("x".to_string()),
            jwt: Some("y".to_string()),
        };
        assert!(gate.authenticate(&creds, 0).is_err());
    }

    #[test]
    fn test_permission_denied_scenario() {
        let gate = gate();
        let issued = gate.api_keys.create_key("acct1", HashSet::new(), 0, None).unwrap();
        let auth = gate.authenticate(&Credentials::api_key(issued.wire_key), 1).unwrap();

        let err = gate.require_permission(&auth, "admin:manage").unwrap_err();
        assert!(matches!(err, Error::PermissionDenied(_)));
    }

    #[test]
    fn test_rbac_roles_expand_permissions_for_jwt_auth() {
        let mut gate = gate();
        gate.rbac.add_role("guest", ["read"], Vec::<String>::new()).unwrap();

        let token = gate
            .jwt
            .create_access_token("user1", vec!["guest".into()], vec![], Default::default(), 1_900_000_000)
            .unwrap();
        let auth = gate.authenticate(&Credentials::jwt(token), 1_900_000_000).unwrap();
        assert!(auth.has_permission("read"));
    }

    #[test]
    fn test_rate_limited_scenario_end_to_end() {
        let gate = gate();
        gate.rate_limiter.set_config("model", RateLimitConfig::new(2, 60));
        let issued = gate.api_keys.create_key("acct1", HashSet::new(), 0, None).unwrap();
        let auth = gate.authenticate(&Credentials::api_key(issued.wire_key), 1).unwrap();

        assert!(gate.check_rate_limit(&auth, "model", 1).is_ok());
        assert!(gate.check_rate_limit(&auth, "model", 2).is_ok());
        assert!(matches!(
            gate.check_rate_limit(&auth, "model", 3).unwrap_err(),
            Error::RateLimited(_)
        ));
    }

    #[test]
    fn test_content_blocked_for_credential_like_text() {
        let gate = gate();
        let err = gate.check_content("here is my key sk-abcdefghijklmnopqrstuvwxyz").unwrap_err();
        assert!(matches!(err, Error::ContentBlocked(_)));
    }
}
