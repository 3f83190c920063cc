//! Record of business actions already performed.

use chrono::{DateTime, Utc};
use moka::future::Cache;
use std::time::Duration;

#[cfg(test)]
#[path = "idempotency_tests.rs"]
mod tests;

/// Default lifetime of an idempotency entry
pub const DEFAULT_IDEMPOTENCY_TTL: Duration = Duration::from_secs(60 * 60);

const MAX_ENTRIES: u64 = 100_000;

/// TTL cache of idempotency keys whose action succeeded
///
/// Entries expire after the TTL; clones share the same entries.
#[derive(Clone)]
pub struct IdempotencyCache {
    entries: Cache<String, DateTime<Utc>>,
    ttl: Duration,
}

impl IdempotencyCache {
    pub fn new(ttl: Duration) -> Self {
        let entries = Cache::builder()
            .max_capacity(MAX_ENTRIES)
            .time_to_live(ttl)
            .build();

        Self { entries, ttl }
    }

    /// Check whether the action for this key already succeeded
    pub async fn contains(&self, key: &str) -> bool {
        self.entries.get(key).await.is_some()
    }

    /// Record that the action for this key succeeded
    pub async fn record(&self, key: &str) {
        self.entries.insert(key.to_string(), Utc::now()).await;
    }

    /// When the action for this key was recorded
    pub async fn recorded_at(&self, key: &str) -> Option<DateTime<Utc>> {
        self.entries.get(key).await
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }
}

impl Default for IdempotencyCache {
    fn default() -> Self {
        Self::new(DEFAULT_IDEMPOTENCY_TTL)
    }
}

impl std::fmt::Debug for IdempotencyCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdempotencyCache")
            .field("ttl", &self.ttl)
            .field("entries", &self.entries.entry_count())
            .finish()
    }
}
