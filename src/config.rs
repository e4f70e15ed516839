//! Environment-driven runtime configuration.
//!
//! Every knob here is resolved the same way the teacher crate resolves
//! provider URLs: check an environment variable first, fall back to a
//! documented default, never panic on a missing or malformed value (bad
//! values are reported through [`crate::Error::Config`] wherever they're
//! acted on rather than at load time, except where parsing genuinely
//! cannot proceed).
//!
//! # Recognized environment variables
//!
//! | Variable                  | Default                        |
//! |----------------------------|--------------------------------|
//! | `USE_REDIS`                | autodetect (`REDIS_URL` present) |
//! | `REDIS_URL`                 | `redis://localhost:6379/0`     |
//! | `REDIS_PREFIX`              | `agent:session:`               |
//! | `REDIS_EXPIRY`              | `86400` (seconds)               |
//! | `REDIS_MAX_CONNECTIONS`     | `10`                            |
//! | `REDIS_SOCKET_TIMEOUT`      | `5` (seconds)                    |
//! | `CONTEXT_MAX_MESSAGES`      | `20`                            |
//! | `CONTEXT_MAX_CONTENT_LENGTH`| `10000`                         |
//! | `JWT_SECRET_KEY`            | none (required to issue tokens) |

use std::env;
use std::time::Duration;

/// Resolved runtime configuration, built once at startup and handed to the
/// services that need it (session store, security gate).
///
/// Unlike the teacher's `Provider` helpers (which resolve a single URL),
/// this struct resolves the whole environment up front into a typed value,
/// matching the original Python runtime's `RuntimeService.__init__`
/// env-detection behavior.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    /// Whether the session store should use the Redis backend.
    pub use_redis: bool,
    /// Redis connection string.
    pub redis_url: String,
    /// Key prefix for every Redis key the session store writes.
    pub redis_prefix: String,
    /// TTL, in seconds, applied to every session key on write.
    pub redis_expiry_secs: u64,
    /// Max connections in the Redis connection pool.
    pub redis_max_connections: u32,
    /// Socket timeout for Redis operations.
    pub redis_socket_timeout: Duration,
    /// Max messages retained per session before FIFO eviction.
    pub context_max_messages: usize,
    /// Max characters retained per message before truncation.
    pub context_max_content_length: usize,
    /// HMAC secret used to sign and verify JWTs. `None` disables the JWT
    /// auth path (API-key auth still works).
    pub jwt_secret_key: Option<String>,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            use_redis: false,
            redis_url: default_redis_url(),
            redis_prefix: default_redis_prefix(),
            redis_expiry_secs: 86_400,
            redis_max_connections: 10,
            redis_socket_timeout: Duration::from_secs(5),
            context_max_messages: 20,
            context_max_content_length: 10_000,
            jwt_secret_key: None,
        }
    }
}

fn default_redis_url() -> String {
    "redis://localhost:6379/0".to_string()
}

fn default_redis_prefix() -> String {
    "agent:session:".to_string()
}

impl RuntimeConfig {
    /// Resolve configuration from the process environment, falling back to
    /// [`RuntimeConfig::default`] for anything unset.
    ///
    /// `USE_REDIS` autodetects to `true` when `REDIS_URL` is present and
    /// `USE_REDIS` itself is unset, mirroring the original runtime's
    /// priority order (explicit param > env var > autodetect).
    pub fn from_env() -> Self {
        let redis_url_set = env::var("REDIS_URL").ok();
        let use_redis = match env::var("USE_REDIS") {
            Ok(v) => parse_bool(&v).unwrap_or(redis_url_set.is_some()),
            Err(_) => redis_url_set.is_some(),
        };

        Self {
            use_redis,
            redis_url: redis_url_set.unwrap_or_else(default_redis_url),
            redis_prefix: env::var("REDIS_PREFIX").unwrap_or_else(|_| default_redis_prefix()),
            redis_expiry_secs: env_parse_or("REDIS_EXPIRY", 86_400),
            redis_max_connections: env_parse_or("REDIS_MAX_CONNECTIONS", 10),
            redis_socket_timeout: Duration::from_secs(env_parse_or("REDIS_SOCKET_TIMEOUT", 5)),
            context_max_messages: env_parse_or("CONTEXT_MAX_MESSAGES", 20),
            context_max_content_length: env_parse_or("CONTEXT_MAX_CONTENT_LENGTH", 10_000),
            jwt_secret_key: env::var("JWT_SECRET_KEY").ok(),
        }
    }
}

fn parse_bool(v: &str) -> Option<bool> {
    match v.to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn env_parse_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.parse::<T>().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    // Environment variable tests must not run concurrently with each other;
    // std::env is process-global.
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    fn clear_env() {
        for key in [
            "USE_REDIS",
            "REDIS_URL",
            "REDIS_PREFIX",
            "REDIS_EXPIRY",
            "REDIS_MAX_CONNECTIONS",
            "REDIS_SOCKET_TIMEOUT",
            "CONTEXT_MAX_MESSAGES",
            "CONTEXT_MAX_CONTENT_LENGTH",
            "JWT_SECRET_KEY",
        ] {
            unsafe { env::remove_var(key) };
        }
    }

    #[test]
    fn test_defaults() {
        let _guard = ENV_LOCK.lock().unwrap();
        clear_env();
        let config = RuntimeConfig::from_env();
        assert!(!config.use_redis);
        assert_eq!(config.redis_prefix, "agent:session:");
        assert_eq!(config.context_max_messages, 20);
        assert_eq!(config.context_max_content_length, 10_000);
        assert!(config.jwt_secret_key.is_none());
    }

    #[test]
    fn test_autodetect_redis_from_url() {
        let _guard = ENV_LOCK.lock().unwrap();
        clear_env();
        unsafe { env::set_var("REDIS_URL", "redis://example:6379/1") };
        let config = RuntimeConfig::from_env();
        assert!(config.use_redis);
        assert_eq!(config.redis_url, "redis://example:6379/1");
        clear_env();
    }

    #[test]
    fn test_explicit_use_redis_overrides_autodetect() {
        let _guard = ENV_LOCK.lock().unwrap();
        clear_env();
        unsafe { env::set_var("REDIS_URL", "redis://example:6379/1") };
        unsafe { env::set_var("USE_REDIS", "false") };
        let config = RuntimeConfig::from_env();
        assert!(!config.use_redis);
        clear_env();
    }

    #[test]
    fn test_malformed_numeric_env_falls_back_to_default() {
        let _guard = ENV_LOCK.lock().unwrap();
        clear_env();
        unsafe { env::set_var("CONTEXT_MAX_MESSAGES", "not-a-number") };
        let config = RuntimeConfig::from_env();
        assert_eq!(config.context_max_messages, 20);
        clear_env();
    }
}
