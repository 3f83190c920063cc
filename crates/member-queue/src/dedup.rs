//! Duplicate-suppression cache shared by every client of a registry.
//!
//! Entries map `(queue name, content hash)` to the time the message was first
//! yielded and expire after a fixed time-to-live. The cache lives only in
//! memory, so a restart empties it; it narrows, but does not close, the window
//! in which an at-least-once transport can hand the same message out twice.

use crate::message::{QueueName, Timestamp};
use moka::future::Cache;
use std::time::Duration;

/// Default time-to-live of a dedup entry
pub const DEFAULT_DEDUP_TTL: Duration = Duration::from_secs(60 * 60);

const DEFAULT_MAX_ENTRIES: u64 = 100_000;

/// Process-wide TTL cache of messages already yielded to consumers
///
/// Cloning is cheap and every clone shares the same entries.
#[derive(Clone)]
pub struct DedupCache {
    entries: Cache<(QueueName, String), Timestamp>,
    ttl: Duration,
}

impl DedupCache {
    /// Create a cache whose entries expire `ttl` after insertion
    pub fn new(ttl: Duration) -> Self {
        let entries = Cache::builder()
            .max_capacity(DEFAULT_MAX_ENTRIES)
            .time_to_live(ttl)
            .build();

        Self { entries, ttl }
    }

    /// Check whether the content hash was seen on this queue within the TTL
    pub async fn contains(&self, queue: &QueueName, content_hash: &str) -> bool {
        self.entries
            .get(&(queue.clone(), content_hash.to_string()))
            .await
            .is_some()
    }

    /// Record the content hash as seen on this queue
    pub async fn insert(&self, queue: &QueueName, content_hash: &str) {
        self.entries
            .insert((queue.clone(), content_hash.to_string()), Timestamp::now())
            .await;
    }

    /// When the content hash was first recorded, if it has not expired
    pub async fn seen_at(&self, queue: &QueueName, content_hash: &str) -> Option<Timestamp> {
        self.entries
            .get(&(queue.clone(), content_hash.to_string()))
            .await
    }

    /// Configured time-to-live
    pub fn ttl(&self) -> Duration {
        self.ttl
    }
}

impl Default for DedupCache {
    fn default() -> Self {
        Self::new(DEFAULT_DEDUP_TTL)
    }
}

impl std::fmt::Debug for DedupCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DedupCache")
            .field("ttl", &self.ttl)
            .field("entry_count", &self.entries.entry_count())
            .finish()
    }
}

#[cfg(test)]
#[path = "dedup_tests.rs"]
mod tests;
