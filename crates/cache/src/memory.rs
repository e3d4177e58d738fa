use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tokio::time::Instant;

use crate::store::Cache;
use crate::{CacheError, Result};

struct Entry {
    value: String,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

/// In-memory cache with optional per-entry TTL.
///
/// Expired entries are dropped lazily on read. Clones share the same storage.
#[derive(Clone, Default)]
pub struct InMemoryCache {
    entries: Arc<RwLock<HashMap<String, Entry>>>,
    fail_on_get: Arc<AtomicBool>,
    fail_on_set: Arc<AtomicBool>,
    fail_on_delete: Arc<AtomicBool>,
}

impl InMemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_fail_on_get(&self, fail: bool) {
        self.fail_on_get.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_on_set(&self, fail: bool) {
        self.fail_on_set.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_on_delete(&self, fail: bool) {
        self.fail_on_delete.store(fail, Ordering::SeqCst);
    }

    /// Whether a live entry exists for `key`.
    pub async fn contains(&self, key: &str) -> bool {
        let now = Instant::now();
        self.entries
            .read()
            .await
            .get(key)
            .is_some_and(|entry| !entry.is_expired(now))
    }

    /// Number of stored entries, expired ones included.
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl Cache for InMemoryCache {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        if self.fail_on_get.load(Ordering::SeqCst) {
            return Err(CacheError::Unavailable(format!("get {key} rejected")));
        }

        let now = Instant::now();
        {
            let entries = self.entries.read().await;
            match entries.get(key) {
                None => return Ok(None),
                Some(entry) if !entry.is_expired(now) => return Ok(Some(entry.value.clone())),
                Some(_) => {}
            }
        }

        // Expired: drop it unless a writer replaced it in between.
        let mut entries = self.entries.write().await;
        if entries.get(key).is_some_and(|entry| entry.is_expired(now)) {
            entries.remove(key);
        }
        Ok(None)
    }

    async fn set(&self, key: &str, value: String, ttl: Option<Duration>) -> Result<()> {
        if self.fail_on_set.load(Ordering::SeqCst) {
            return Err(CacheError::Unavailable(format!("set {key} rejected")));
        }

        let expires_at = ttl.map(|ttl| Instant::now() + ttl);
        self.entries
            .write()
            .await
            .insert(key.to_string(), Entry { value, expires_at });
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        if self.fail_on_delete.load(Ordering::SeqCst) {
            return Err(CacheError::Unavailable(format!("delete {key} rejected")));
        }

        self.entries.write().await.remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn set_get_delete() {
        let cache = InMemoryCache::new();

        assert_eq!(cache.get("k").await.unwrap(), None);

        cache.set("k", "v".to_string(), None).await.unwrap();
        assert_eq!(cache.get("k").await.unwrap(), Some("v".to_string()));

        cache.delete("k").await.unwrap();
        assert_eq!(cache.get("k").await.unwrap(), None);

        // Deleting again is fine.
        cache.delete("k").await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn entries_expire_after_ttl() {
        let cache = InMemoryCache::new();
        cache
            .set("k", "v".to_string(), Some(Duration::from_secs(30)))
            .await
            .unwrap();

        tokio::time::advance(Duration::from_secs(29)).await;
        assert!(cache.get("k").await.unwrap().is_some());

        tokio::time::advance(Duration::from_secs(1)).await;
        assert!(cache.get("k").await.unwrap().is_none());
        assert!(cache.is_empty().await);
    }

    #[tokio::test]
    async fn zero_ttl_expires_immediately() {
        let cache = InMemoryCache::new();
        cache
            .set("k", "v".to_string(), Some(Duration::ZERO))
            .await
            .unwrap();
        assert!(!cache.contains("k").await);
    }

    #[tokio::test]
    async fn injected_failures() {
        let cache = InMemoryCache::new();

        cache.set_fail_on_set(true);
        assert!(cache.set("k", "v".to_string(), None).await.is_err());
        cache.set_fail_on_set(false);
        cache.set("k", "v".to_string(), None).await.unwrap();

        cache.set_fail_on_get(true);
        assert!(matches!(
            cache.get("k").await,
            Err(CacheError::Unavailable(_))
        ));
        cache.set_fail_on_get(false);

        cache.set_fail_on_delete(true);
        assert!(cache.delete("k").await.is_err());
        assert!(cache.contains("k").await);
    }
}
