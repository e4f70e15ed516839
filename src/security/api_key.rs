//! API-key issuance and verification.
//!
//! Grounded on `original_source/agent_cores/security/api_key.py`'s
//! `APIKeyManager` (prefix/secret split, revoke, rotate, expiry) and
//! `agent_cores/security/utils.py`'s `format_api_key`/`split_api_key`/
//! `hash_secret`/`verify_secret`. The original hashes the secret half with
//! bcrypt; this module uses `argon2` instead — a modern, purpose-built
//! password-hashing crate already in the dependency table, and a closer
//! match to bcrypt's threat model than a bare digest would be (see
//! DESIGN.md for the full rationale).

use crate::{Error, Result};
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use rand::distributions::{Alphanumeric, DistString};
use rand::rngs::OsRng as RandOsRng;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// Length of the key prefix (spec §6: "8 characters of the configured
/// alphabet").
pub const PREFIX_LEN: usize = 8;
/// Length of the secret half, before hashing.
pub const SECRET_LEN: usize = 32;
/// Delimiter between prefix and secret in the wire format.
pub const DELIMITER: char = '.';

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApiKeyStatus {
    Active,
    Revoked,
    Expired,
    Disabled,
}

/// The account an API key authenticates as. Distinct from a human user:
/// service accounts carry their own permission set and can be disabled
/// independently of any individual key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceAccount {
    pub account_id: String,
    pub name: String,
    pub permissions: HashSet<String>,
    pub enabled: bool,
}

impl ServiceAccount {
    pub fn new(account_id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            account_id: account_id.into(),
            name: name.into(),
            permissions: HashSet::new(),
            enabled: true,
        }
    }
}

/// A single issued API key. `secret_hash` is the argon2 hash of the
/// secret half; the plaintext secret is never stored.
#[derive(Clone, Serialize, Deserialize)]
pub struct ApiKey {
    pub prefix: String,
    secret_hash: String,
    pub account_id: String,
    pub permissions: HashSet<String>,
    pub status: ApiKeyStatus,
    pub created_at: u64,
    pub expires_at: Option<u64>,
    pub last_used_at: Option<u64>,
}

impl std::fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiKey")
            .field("prefix", &self.prefix)
            .field("secret_hash", &"<redacted>")
            .field("account_id", &self.account_id)
            .field("permissions", &self.permissions)
            .field("status", &self.status)
            .field("created_at", &self.created_at)
            .field("expires_at", &self.expires_at)
            .field("last_used_at", &self.last_used_at)
            .finish()
    }
}

/// Result of a successful [`ApiKeyStore::create_key`] call: the only time
/// the plaintext secret exists, since it is hashed immediately after.
pub struct IssuedKey {
    pub wire_key: String,
    pub record: ApiKey,
}

fn random_alphanumeric(len: usize) -> String {
    Alphanumeric.sample_string(&mut RandOsRng, len)
}

fn hash_secret(secret: &str) -> Result<String> {
    let salt = SaltString::generate(&mut RandOsRng);
    Argon2::default()
        .hash_password(secret.as_bytes(), &salt)
        .map(|h| h.to_string())
        .map_err(|e| Error::internal(format!("secret hashing failed: {e}")))
}

fn verify_secret(secret: &str, hash: &str) -> bool {
    let Ok(parsed) = PasswordHash::new(hash) else {
        return false;
    };
    Argon2::default()
        .verify_password(secret.as_bytes(), &parsed)
        .is_ok()
}

/// Splits `<prefix>.<secret>` into its two halves. Fails `MalformedKey`
/// (surfaced as [`Error::AuthFailed`]) if the delimiter is absent or
/// either half has the wrong length.
pub fn split_wire_key(wire_key: &str) -> Result<(&str, &str)> {
    let (prefix, secret) = wire_key
        .split_once(DELIMITER)
        .ok_or_else(|| Error::auth_failed("malformed API key"))?;

    if prefix.len() != PREFIX_LEN || secret.len() != SECRET_LEN {
        return Err(Error::auth_failed("malformed API key"));
    }

    Ok((prefix, secret))
}

/// In-memory registry of issued keys, keyed by prefix. Grounded on
/// `APIKeyManager`'s `self.keys` dict; the original persists to a
/// database, but the spec's testable surface only requires the
/// lifecycle semantics, not a storage backend.
#[derive(Default)]
pub struct ApiKeyStore {
    keys: std::sync::Mutex<HashMap<String, ApiKey>>,
}

impl ApiKeyStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Issues a fresh key for `account_id`. `expires_in_secs = Some(0)`
    /// creates an already-expired key (used by the expiry lifecycle
    /// test); `None` means no expiry.
    pub fn create_key(
        &self,
        account_id: impl Into<String>,
        permissions: HashSet<String>,
        now: u64,
        expires_in_secs: Option<u64>,
    ) -> Result<IssuedKey> {
        let account_id = account_id.into();
        let prefix = random_alphanumeric(PREFIX_LEN);
        let secret = random_alphanumeric(SECRET_LEN);
        let secret_hash = hash_secret(&secret)?;
        let expires_at = expires_in_secs.map(|secs| now + secs);

        let record = ApiKey {
            prefix: prefix.clone(),
            secret_hash,
            account_id,
            permissions,
            status: ApiKeyStatus::Active,
            created_at: now,
            expires_at,
            last_used_at: None,
        };

        let wire_key = format!("{prefix}{DELIMITER}{secret}");
        self.keys.lock().unwrap().insert(prefix, record.clone());

        Ok(IssuedKey { wire_key, record })
    }

    /// Verifies `wire_key` at time `now`, updating `last_used_at` and
    /// transitioning `Active` keys past `expires_at` to `Expired` on
    /// first use. Returns the verified record's `account_id` and
    /// `permissions` on success.
    pub fn verify(&self, wire_key: &str, now: u64) -> Result<(String, HashSet<String>)> {
        let (prefix, secret) = split_wire_key(wire_key)?;

        let mut guard = self.keys.lock().unwrap();
        let record = guard
            .get_mut(prefix)
            .ok_or_else(|| Error::auth_failed("unknown API key"))?;

        if record.status == ApiKeyStatus::Active {
            if let Some(expires_at) = record.expires_at {
                if now >= expires_at {
                    record.status = ApiKeyStatus::Expired;
                }
            }
        }

        match record.status {
            ApiKeyStatus::Revoked => return Err(Error::auth_failed("API key revoked")),
            ApiKeyStatus::Expired => return Err(Error::auth_failed("API key expired")),
            ApiKeyStatus::Disabled => return Err(Error::auth_failed("service account disabled")),
            ApiKeyStatus::Active => {}
        }

        if !verify_secret(secret, &record.secret_hash) {
            return Err(Error::auth_failed("invalid API key secret"));
        }

        record.last_used_at = Some(now);
        Ok((record.account_id.clone(), record.permissions.clone()))
    }

    pub fn revoke(&self, prefix: &str) -> Result<()> {
        let mut guard = self.keys.lock().unwrap();
        let record = guard
            .get_mut(prefix)
            .ok_or_else(|| Error::auth_failed("unknown API key"))?;
        record.status = ApiKeyStatus::Revoked;
        Ok(())
    }

    /// Revokes `old_prefix` and issues a new key carrying the same
    /// permissions and account (spec: "rotation yields a new key whose
    /// prefix differs from the old and whose permissions default to the
    /// old's permissions").
    pub fn rotate(&self, old_prefix: &str, now: u64, expires_in_secs: Option<u64>) -> Result<IssuedKey> {
        let (account_id, permissions) = {
            let guard = self.keys.lock().unwrap();
            let record = guard
                .get(old_prefix)
                .ok_or_else(|| Error::auth_failed("unknown API key"))?;
            (record.account_id.clone(), record.permissions.clone())
        };

        self.revoke(old_prefix)?;
        self.create_key(account_id, permissions, now, expires_in_secs)
    }

    /// Lists keys, optionally including expired ones without forcing a
    /// lazy status transition (spec scenario: "listing keys with
    /// `include_expired=false` omits it; with `include_expired=true`
    /// includes it with `status="expired"`").
    pub fn list(&self, now: u64, include_expired: bool) -> Vec<ApiKey> {
        let mut guard = self.keys.lock().unwrap();
        for record in guard.values_mut() {
            if record.status == ApiKeyStatus::Active {
                if let Some(expires_at) = record.expires_at {
                    if now >= expires_at {
                        record.status = ApiKeyStatus::Expired;
                    }
                }
            }
        }

        guard
            .values()
            .filter(|r| include_expired || r.status != ApiKeyStatus::Expired)
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_issue_and_verify_round_trip() {
        let store = ApiKeyStore::new();
        let issued = store
            .create_key("acct1", HashSet::from(["model:use".to_string()]), 0, None)
            .unwrap();

        let (account_id, permissions) = store.verify(&issued.wire_key, 1).unwrap();
        assert_eq!(account_id, "acct1");
        assert!(permissions.contains("model:use"));
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let store = ApiKeyStore::new();
        let issued = store.create_key("acct1", HashSet::new(), 0, None).unwrap();
        let tampered = format!("{}.{}", issued.record.prefix, "x".repeat(SECRET_LEN));
        assert!(store.verify(&tampered, 1).is_err());
    }

    #[test]
    fn test_malformed_key_rejected() {
        let store = ApiKeyStore::new();
        assert!(store.verify("not-a-valid-key", 0).is_err());
        assert!(store.verify("short.short", 0).is_err());
    }

    #[test]
    fn test_unknown_prefix_rejected() {
        let store = ApiKeyStore::new();
        let fake = format!("{}.{}", "a".repeat(PREFIX_LEN), "b".repeat(SECRET_LEN));
        assert!(store.verify(&fake, 0).is_err());
    }

    #[test]
    fn test_revoke_then_verify_fails() {
        let store = ApiKeyStore::new();
        let issued = store.create_key("acct1", HashSet::new(), 0, None).unwrap();
        store.revoke(&issued.record.prefix).unwrap();
        assert!(store.verify(&issued.wire_key, 1).is_err());
    }

    #[test]
    fn test_expiry_lifecycle() {
        let store = ApiKeyStore::new();
        let issued = store
            .create_key("acct1", HashSet::new(), 0, Some(0))
            .unwrap();

        let err = store.verify(&issued.wire_key, 1).unwrap_err();
        assert!(matches!(err, Error::AuthFailed(_)));

        let listed = store.list(1, false);
        assert!(listed.is_empty());

        let listed_all = store.list(1, true);
        assert_eq!(listed_all.len(), 1);
        assert_eq!(listed_all[0].status, ApiKeyStatus::Expired);
    }

    #[test]
    fn test_rotate_yields_new_prefix_same_permissions() {
        let store = ApiKeyStore::new();
        let perms = HashSet::from(["api:use".to_string()]);
        let issued = store.create_key("acct1", perms.clone(), 0, None).unwrap();

        let rotated = store.rotate(&issued.record.prefix, 1, None).unwrap();
        assert_ne!(rotated.record.prefix, issued.record.prefix);
        assert_eq!(rotated.record.permissions, perms);

        assert!(store.verify(&issued.wire_key, 2).is_err());
        assert!(store.verify(&rotated.wire_key, 2).is_ok());
    }
}
