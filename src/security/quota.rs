//! Resource quotas: cumulative usage caps distinct from the rate
//! limiter's per-window counters (spec §4.4).
//!
//! Where the rate limiter bounds requests-per-window, quotas bound
//! total consumption over the account's lifetime (or billing period) —
//! model tokens, model calls, API calls, storage. A quota check is a
//! reservation: `check_quota` fails if granting `amount` would push
//! cumulative usage past the cap, without mutating state; `use_quota`
//! commits the reservation. Callers are expected to check then use,
//! mirroring a two-phase reserve/commit rather than a single
//! check-and-increment, since quota amounts (token counts) are often
//! known only after the fact.

use dashmap::DashMap;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuotaResource {
    ModelTokens,
    ModelCalls,
    ApiCalls,
    StorageMb,
}

impl std::fmt::Display for QuotaResource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            QuotaResource::ModelTokens => "model_tokens",
            QuotaResource::ModelCalls => "model_calls",
            QuotaResource::ApiCalls => "api_calls",
            QuotaResource::StorageMb => "storage_mb",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct Usage {
    used: u64,
    cap: u64,
}

/// Per-account cumulative usage tracking, keyed by `(account_id,
/// resource)`.
pub struct QuotaTracker {
    usage: DashMap<(String, QuotaResource), Usage>,
}

impl QuotaTracker {
    pub fn new() -> Self {
        Self {
            usage: DashMap::new(),
        }
    }

    /// Sets the cap for `(account_id, resource)`. Existing usage is
    /// preserved; only the ceiling changes.
    pub fn set_cap(&self, account_id: impl Into<String>, resource: QuotaResource, cap: u64) {
        let mut entry = self
            .usage
            .entry((account_id.into(), resource))
            .or_insert(Usage { used: 0, cap: u64::MAX });
        entry.cap = cap;
    }

    /// True iff consuming `amount` more would stay within the cap.
    /// Does not mutate usage.
    pub fn check_quota(&self, account_id: &str, resource: QuotaResource, amount: u64) -> bool {
        match self.usage.get(&(account_id.to_string(), resource)) {
            Some(entry) => entry.used.saturating_add(amount) <= entry.cap,
            None => true,
        }
    }

    /// Commits `amount` of usage unconditionally. Callers should have
    /// already called [`Self::check_quota`]; this method does not
    /// re-check the cap, matching a reserve-then-consume flow where the
    /// caller already decided to proceed.
    pub fn use_quota(&self, account_id: impl Into<String>, resource: QuotaResource, amount: u64) {
        let mut entry = self
            .usage
            .entry((account_id.into(), resource))
            .or_insert(Usage { used: 0, cap: u64::MAX });
        entry.used = entry.used.saturating_add(amount);
    }

    pub fn used(&self, account_id: &str, resource: QuotaResource) -> u64 {
        self.usage
            .get(&(account_id.to_string(), resource))
            .map(|e| e.used)
            .unwrap_or(0)
    }

    pub fn reset(&self, account_id: &str, resource: QuotaResource) {
        if let Some(mut entry) = self.usage.get_mut(&(account_id.to_string(), resource)) {
            entry.used = 0;
        }
    }
}

impl Default for QuotaTracker {
    fn default() -> Self {
        Self::new()
    }
}
