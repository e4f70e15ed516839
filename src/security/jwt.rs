//! JWT access/refresh token issuance and verification.
//!
//! Grounded on `original_source/agent_cores/security/jwt_auth.py`'s
//! `JWTAuthService`: `create_access_token`/`create_refresh_token` both
//! delegate to a private `_create_token` that stamps `{sub, iss, iat,
//! exp, type, permissions}`; `verify_token` decodes and checks `type`
//! matches what the caller expected. This module adds `roles` and a
//! free-form `metadata` map per spec §3's claim shape, and uses the
//! `jsonwebtoken` crate in place of the original's PyJWT.

use crate::{Error, Result};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// The platform's issuer claim, stamped on every token this service
/// mints.
pub const ISSUER: &str = "agent-orchestrator";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenType {
    Access,
    Refresh,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub iss: String,
    pub iat: u64,
    pub exp: u64,
    #[serde(rename = "type")]
    pub token_type: TokenType,
    #[serde(default)]
    pub roles: Vec<String>,
    #[serde(default)]
    pub permissions: Vec<String>,
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
}

/// Default access-token lifetime (spec default, mirrors the original's
/// 30-minute access / 7-day refresh split).
pub const DEFAULT_ACCESS_TTL_SECS: u64 = 30 * 60;
pub const DEFAULT_REFRESH_TTL_SECS: u64 = 7 * 24 * 60 * 60;

/// Issues and verifies JWTs against a single shared secret. One instance
/// per deployment; the secret is read from `JWT_SECRET_KEY` (spec §6).
pub struct JwtAuthService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    access_ttl_secs: u64,
    refresh_ttl_secs: u64,
}

impl JwtAuthService {
    pub fn new(secret: &[u8]) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
            access_ttl_secs: DEFAULT_ACCESS_TTL_SECS,
            refresh_ttl_secs: DEFAULT_REFRESH_TTL_SECS,
        }
    }

    pub fn with_ttls(mut self, access_ttl_secs: u64, refresh_ttl_secs: u64) -> Self {
        self.access_ttl_secs = access_ttl_secs;
        self.refresh_ttl_secs = refresh_ttl_secs;
        self
    }

    fn create_token(
        &self,
        sub: &str,
        token_type: TokenType,
        roles: Vec<String>,
        permissions: Vec<String>,
        metadata: HashMap<String, serde_json::Value>,
        now: u64,
        ttl_secs: u64,
    ) -> Result<String> {
        let claims = Claims {
            sub: sub.to_string(),
            iss: ISSUER.to_string(),
            iat: now,
            exp: now + ttl_secs,
            token_type,
            roles,
            permissions,
            metadata,
        };

        Ok(encode(&Header::default(), &claims, &self.encoding_key)?)
    }

    pub fn create_access_token(
        &self,
        sub: &str,
        roles: Vec<String>,
        permissions: Vec<String>,
        metadata: HashMap<String, serde_json::Value>,
        now: u64,
    ) -> Result<String> {
        self.create_token(sub, TokenType::Access, roles, permissions, metadata, now, self.access_ttl_secs)
    }

    pub fn create_refresh_token(&self, sub: &str, now: u64) -> Result<String> {
        self.create_token(sub, TokenType::Refresh, Vec::new(), Vec::new(), HashMap::new(), now, self.refresh_ttl_secs)
    }

    /// Decodes `token` and checks it is of `expected_type`. `exp`/`iat`
    /// validation is handled by `jsonwebtoken`'s default `Validation`.
    pub fn verify_token(&self, token: &str, expected_type: TokenType) -> Result<Claims> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[ISSUER]);

        let data = decode::<Claims>(token, &self.decoding_key, &validation)?;
        if data.claims.token_type != expected_type {
            return Err(Error::auth_failed("token type mismatch"));
        }
        Ok(data.claims)
    }

    /// Issues a fresh access token from a verified refresh token. The
    /// refresh token carries no roles/permissions of its own, so the
    /// caller supplies the current ones to stamp onto the new access
    /// token (mirrors `JWTAuthService.refresh_access_token` re-reading
    /// the account's live permission set rather than trusting a stale
    /// claim).
    pub fn refresh_access_token(
        &self,
        refresh_token: &str,
        roles: Vec<String>,
        permissions: Vec<String>,
        metadata: HashMap<String, serde_json::Value>,
        now: u64,
    ) -> Result<String> {
        let claims = self.verify_token(refresh_token, TokenType::Refresh)?;
        self.create_access_token(&claims.sub, roles, permissions, metadata, now)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service() -> JwtAuthService {
        JwtAuthService::new(b"test-secret-key-for-unit-tests")
    }

    #[test]
    fn test_access_token_round_trip() {
        let svc = service();
        let token = svc
            .create_access_token("user1", vec!["member".into()], vec!["api:use".into()], HashMap::new(), 0)
            .unwrap();

        let claims = svc.verify_token(&token, TokenType::Access).unwrap();
        assert_eq!(claims.sub, "user1");
        assert_eq!(claims.iss, ISSUER);
        assert!(claims.permissions.contains(&"api:use".to_string()));
    }

    #[test]
    fn test_refresh_token_cannot_verify_as_access() {
        let svc = service();
        let token = svc.create_refresh_token("user1", 0).unwrap();
        assert!(svc.verify_token(&token, TokenType::Access).is_err());
        assert!(svc.verify_token(&token, TokenType::Refresh).is_ok());
    }

    #[test]
    fn test_expired_token_rejected() {
        let svc = service().with_ttls(1, 1);
        let token = svc
            .create_access_token("user1", vec![], vec![], HashMap::new(), 0)
            .unwrap();

        // `jsonwebtoken`'s default validation checks exp against real
        // wall-clock time, so a token minted far in the past is already
        // expired by the time this test runs.
        assert!(svc.verify_token(&token, TokenType::Access).is_err());
    }

    #[test]
    fn test_refresh_access_token_reissues() {
        let svc = service();
        let refresh = svc.create_refresh_token("user1", 1_900_000_000).unwrap();
        let access = svc
            .refresh_access_token(&refresh, vec!["member".into()], vec!["api:use".into()], HashMap::new(), 1_900_000_000)
            .unwrap();

        let claims = svc.verify_token(&access, TokenType::Access).unwrap();
        assert_eq!(claims.sub, "user1");
        assert_eq!(claims.token_type, TokenType::Access);
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let svc = service();
        let other = JwtAuthService::new(b"a-completely-different-secret");
        let token = svc
            .create_access_token("user1", vec![], vec![], HashMap::new(), 1_900_000_000)
            .unwrap();

        assert!(other.verify_token(&token, TokenType::Access).is_err());
    }
}
