//! Fixed-window rate limiting.
//!
//! Grounded on `original_source/security/rate_limiter.py`'s `RateLimiter`:
//! `RateLimitConfig`/`RateLimitCounter` dataclasses, per-resource-type
//! defaults set up in `_initialize_default_configs`, and `check_limit`'s
//! check-then-increment-or-reset semantics. The original keys counters by
//! `(resource_type, identifier)` in an in-process dict; this module does
//! the same with a `DashMap` so concurrent turns for different users
//! never contend on a single lock.

use dashmap::DashMap;

/// `(limit, window_secs)` for one resource type.
#[derive(Debug, Clone, Copy)]
pub struct RateLimitConfig {
    pub limit: u32,
    pub window_secs: u64,
}

impl RateLimitConfig {
    pub const fn new(limit: u32, window_secs: u64) -> Self {
        Self { limit, window_secs }
    }
}

#[derive(Debug, Clone, Copy)]
struct Counter {
    count: u32,
    window_start: u64,
}

/// Exact defaults confirmed against the original's
/// `_initialize_default_configs`.
pub fn default_configs() -> Vec<(&'static str, RateLimitConfig)> {
    vec![
        ("model", RateLimitConfig::new(60, 60)),
        ("api", RateLimitConfig::new(120, 60)),
        ("search", RateLimitConfig::new(30, 60)),
        ("file", RateLimitConfig::new(60, 60)),
        ("admin", RateLimitConfig::new(20, 60)),
    ]
}

pub struct RateLimiter {
    configs: DashMap<String, RateLimitConfig>,
    counters: DashMap<(String, String), Counter>,
}

impl RateLimiter {
    /// Builds a limiter seeded with [`default_configs`].
    pub fn new() -> Self {
        let configs = DashMap::new();
        for (resource, config) in default_configs() {
            configs.insert(resource.to_string(), config);
        }
        Self {
            configs,
            counters: DashMap::new(),
        }
    }

    pub fn set_config(&self, resource_type: impl Into<String>, config: RateLimitConfig) {
        self.configs.insert(resource_type.into(), config);
    }

    fn config_for(&self, resource_type: &str) -> RateLimitConfig {
        self.configs
            .get(resource_type)
            .map(|c| *c)
            .unwrap_or(RateLimitConfig::new(60, 60))
    }

    /// Checks and, if under the cap, increments the counter for
    /// `(resource_type, identifier)` at time `now`. Returns `true` if
    /// the request is allowed. A window roll-over (elapsed time since
    /// `window_start` exceeds `window_secs`) resets the counter before
    /// checking, matching the original's lazy-reset behavior rather
    /// than a background sweep.
    pub fn check_limit(&self, resource_type: &str, identifier: &str, now: u64) -> bool {
        let config = self.config_for(resource_type);
        let key = (resource_type.to_string(), identifier.to_string());

        let mut entry = self
            .counters
            .entry(key)
            .or_insert(Counter { count: 0, window_start: now });

        if now.saturating_sub(entry.window_start) >= config.window_secs {
            entry.count = 0;
            entry.window_start = now;
        }

        if entry.count >= config.limit {
            return false;
        }

        entry.count += 1;
        true
    }

    /// Remaining requests in the current window, without incrementing.
    pub fn remaining(&self, resource_type: &str, identifier: &str, now: u64) -> u32 {
        let config = self.config_for(resource_type);
        let key = (resource_type.to_string(), identifier.to_string());

        match self.counters.get(&key) {
            Some(entry) if now.saturating_sub(entry.window_start) < config.window_secs => {
                config.limit.saturating_sub(entry.count)
            }
            _ => config.limit,
        }
    }

    pub fn reset(&self, resource_type: &str, identifier: &str) {
        self.counters
            .remove(&(resource_type.to_string(), identifier.to_string()));
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new()
    }
}
