use lru::LruCache;
use std::num::NonZeroUsize;
use std::sync::{Mutex, MutexGuard};

use crate::error::Result;
use crate::query::ComposedQuery;

/// Thread-safe LRU cache of composed property queries
///
/// Keyed by application context. Composition is pure, so a cached query is
/// always identical to a freshly composed one; the cache only saves the
/// string assembly. A capacity of 0 disables caching.
pub struct QueryCache {
    cache: Option<Mutex<LruCache<String, ComposedQuery>>>,
}

impl QueryCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            cache: NonZeroUsize::new(capacity).map(|cap| Mutex::new(LruCache::new(cap))),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.cache.is_some()
    }

    fn lock(&self) -> Option<MutexGuard<'_, LruCache<String, ComposedQuery>>> {
        // A panic while holding the lock cannot leave a half-written entry.
        self.cache
            .as_ref()
            .map(|m| m.lock().unwrap_or_else(|poisoned| poisoned.into_inner()))
    }

    pub fn get(&self, key: &str) -> Option<ComposedQuery> {
        self.lock()?.get(key).cloned()
    }

    pub fn put(&self, key: String, query: ComposedQuery) {
        if let Some(mut cache) = self.lock() {
            cache.put(key, query);
        }
    }

    /// Cached query for `key`, composing and storing it on a miss.
    pub fn get_or_compose<F>(&self, key: &str, compose: F) -> Result<ComposedQuery>
    where
        F: FnOnce() -> Result<ComposedQuery>,
    {
        if let Some(hit) = self.get(key) {
            log::debug!("query cache hit for {}", key);
            return Ok(hit);
        }
        let query = compose()?;
        self.put(key.to_string(), query.clone());
        Ok(query)
    }

    pub fn len(&self) -> usize {
        self.lock().map(|c| c.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        if let Some(mut cache) = self.lock() {
            cache.clear();
        }
    }
}
