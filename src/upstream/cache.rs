//! Time-bounded LRU cache for successful upstream responses, keyed by full request URL.

use std::num::NonZeroUsize;
use std::time::{Duration, Instant};

use lru::LruCache;
use tokio::sync::Mutex;

#[derive(Debug, Clone)]
struct CachedBody {
    status: u16,
    body: serde_json::Value,
    stored_at: Instant,
}

/// Shared cache of upstream JSON bodies.
pub struct ResponseCache {
    entries: Mutex<LruCache<String, CachedBody>>,
    ttl: Duration,
}

impl ResponseCache {
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
            ttl,
        }
    }

    /// Return the cached status and body for `key` if it is younger than the TTL.
    pub async fn get(&self, key: &str) -> Option<(u16, serde_json::Value)> {
        let mut entries = self.entries.lock().await;
        let is_fresh = entries
            .peek(key)
            .map(|entry| entry.stored_at.elapsed() < self.ttl)?;

        if is_fresh {
            entries
                .get(key)
                .map(|entry| (entry.status, entry.body.clone()))
        } else {
            entries.pop(key);
            None
        }
    }

    pub async fn insert(&self, key: String, status: u16, body: serde_json::Value) {
        if self.ttl.is_zero() {
            return;
        }
        self.entries.lock().await.put(
            key,
            CachedBody {
                status,
                body,
                stored_at: Instant::now(),
            },
        );
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.lock().await.is_empty()
    }
}
