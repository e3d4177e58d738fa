//! Typed cache-aside access for one key namespace.

use std::fmt::Display;
use std::future::Future;
use std::marker::PhantomData;
use std::time::Duration;

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::store::Cache;
use crate::{CacheError, Result};

/// A typed view over a [`Cache`] where every key is `"{prefix}:{id}"` and
/// every value is the JSON form of `T`.
pub struct CacheNamespace<C, T> {
    cache: C,
    prefix: &'static str,
    ttl: Option<Duration>,
    _value: PhantomData<fn() -> T>,
}

impl<C: Clone, T> Clone for CacheNamespace<C, T> {
    fn clone(&self) -> Self {
        Self {
            cache: self.cache.clone(),
            prefix: self.prefix,
            ttl: self.ttl,
            _value: PhantomData,
        }
    }
}

impl<C, T> CacheNamespace<C, T>
where
    C: Cache,
    T: Serialize + DeserializeOwned + Send,
{
    /// Entries written through this namespace never expire.
    pub fn new(cache: C, prefix: &'static str) -> Self {
        Self {
            cache,
            prefix,
            ttl: None,
            _value: PhantomData,
        }
    }

    pub fn with_ttl(mut self, ttl: Option<Duration>) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn prefix(&self) -> &'static str {
        self.prefix
    }

    /// Cache key for `id`.
    pub fn key(&self, id: impl Display) -> String {
        format!("{}:{}", self.prefix, id)
    }

    /// Reads and decodes the cached value for `id`.
    pub async fn get(&self, id: impl Display) -> Result<Option<T>> {
        match self.cache.get(&self.key(id)).await? {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    /// Stores `value` for `id`, replacing any previous entry.
    pub async fn put(&self, id: impl Display, value: &T) -> Result<()> {
        let raw = serde_json::to_string(value)?;
        self.cache.set(&self.key(id), raw, self.ttl).await
    }

    /// Deletes the entry for `id`.
    pub async fn invalidate(&self, id: impl Display) -> Result<()> {
        self.cache.delete(&self.key(id)).await?;
        metrics::counter!("cache_invalidations_total", "namespace" => self.prefix).increment(1);
        Ok(())
    }

    /// Returns the cached value for `id`, computing and storing it on a miss.
    ///
    /// Cache failures are returned, never swallowed: a failed read does not
    /// fall through to `compute`, and a failed store after `compute` is an
    /// error even though the computed value is available.
    pub async fn get_or_compute<F, Fut, E>(&self, id: impl Display, compute: F) -> std::result::Result<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = std::result::Result<T, E>>,
        E: From<CacheError>,
    {
        let key = self.key(id);

        if let Some(raw) = self.cache.get(&key).await? {
            metrics::counter!("cache_hits_total", "namespace" => self.prefix).increment(1);
            tracing::debug!(%key, "Cache hit");
            let value = serde_json::from_str(&raw).map_err(CacheError::from)?;
            return Ok(value);
        }

        metrics::counter!("cache_misses_total", "namespace" => self.prefix).increment(1);
        tracing::debug!(%key, "Cache miss");

        let value = compute().await?;
        let raw = serde_json::to_string(&value).map_err(CacheError::from)?;
        self.cache.set(&key, raw, self.ttl).await?;

        Ok(value)
    }
}
