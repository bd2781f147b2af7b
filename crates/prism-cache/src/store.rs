//! In-process cache store.
//!
//! Fallback `CacheStore` used when no remote key-value store is
//! configured. Expiry is enforced lazily on read; expired keys are purged
//! at lookup time.

use std::collections::HashMap;

use async_trait::async_trait;
use prism_core::{CacheStore, Result};
use tokio::sync::Mutex;
use tokio::time::{Duration, Instant};
use tracing::debug;

struct StoredValue {
    value: String,
    expires_at: Instant,
}

/// In-memory `CacheStore` with per-key TTL.
#[derive(Default)]
pub struct MemoryCacheStore {
    entries: Mutex<HashMap<String, StoredValue>>,
}

impl MemoryCacheStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live (non-expired) keys.
    pub async fn len(&self) -> usize {
        let now = Instant::now();
        let entries = self.entries.lock().await;
        entries.values().filter(|v| v.expires_at > now).count()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl CacheStore for MemoryCacheStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut entries = self.entries.lock().await;
        match entries.get(key) {
            Some(stored) if stored.expires_at > Instant::now() => Ok(Some(stored.value.clone())),
            Some(_) => {
                debug!(cache_key = key, "Expired key purged on read");
                entries.remove(key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn set_with_ttl(&self, key: &str, value: &str, ttl_secs: u64) -> Result<()> {
        let stored = StoredValue {
            value: value.to_string(),
            expires_at: Instant::now() + Duration::from_secs(ttl_secs),
        };
        self.entries.lock().await.insert(key.to_string(), stored);
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.entries.lock().await.remove(key);
        Ok(())
    }
}
