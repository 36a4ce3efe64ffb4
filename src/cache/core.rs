use std::num::NonZeroUsize;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use lru::LruCache;
use parking_lot::RwLock;

use crate::cache::config::CacheConfig;
use crate::cache::metrics::{CacheMetrics, CacheMetricsSnapshot};
use crate::cache::size::approximate_object_size;
use crate::object::ObjectType;

/// A decoded git object as cached in memory: type plus owned content bytes.
#[derive(Debug, Clone)]
pub struct CachedObject {
    pub object_type: ObjectType,
    pub content: Vec<u8>,
}

/// Byte- and entry-bounded LRU over decoded objects, keyed by hash.
#[derive(Clone)]
pub struct Cache {
    store: Arc<RwLock<LruCache<String, CachedObject>>>,
    config: Arc<RwLock<CacheConfig>>,
    metrics: Arc<CacheMetrics>,
    current_bytes: Arc<std::sync::atomic::AtomicU64>,
}

impl Cache {
    #[must_use]
    pub fn new(config: CacheConfig) -> Self {
        let cap = NonZeroUsize::new(config.max_entries.max(1)).unwrap();
        Self {
            store: Arc::new(RwLock::new(LruCache::new(cap))),
            config: Arc::new(RwLock::new(config)),
            metrics: Arc::new(CacheMetrics::default()),
            current_bytes: Arc::new(std::sync::atomic::AtomicU64::new(0)),
        }
    }

    /// Returns the cached object, updating its recency. Counts as a hit or miss.
    pub fn get(&self, hash: &str) -> Option<CachedObject> {
        let mut guard = self.store.write();
        let found = guard.get(hash).cloned();
        if found.is_some() {
            self.metrics.hits.fetch_add(1, Ordering::Relaxed);
            crate::trace_dev!("cache hit for {hash}");
        } else {
            self.metrics.misses.fetch_add(1, Ordering::Relaxed);
        }
        found
    }

    /// Presence check that does not update recency and is not reflected in
    /// hit/miss metrics.
    pub fn has(&self, hash: &str) -> bool {
        self.store.read().peek(hash).is_some()
    }

    /// Inserts or replaces an entry, evicting least-recently-used entries
    /// until both bounds are satisfied. Objects larger than `max_bytes` are
    /// not cached at all.
    pub fn set(&self, hash: String, object: CachedObject) {
        let new_size = approximate_object_size(&object);
        let max_bytes = self.config.read().max_bytes;
        if new_size > max_bytes {
            return;
        }

        let mut guard = self.store.write();
        let replacing = guard.peek(&hash).is_some();
        if let Some(old) = guard.peek(&hash) {
            let old_size = approximate_object_size(old);
            self.current_bytes.fetch_sub(old_size, Ordering::Relaxed);
        }

        let max_entries = self.config.read().max_entries;
        while (!replacing && guard.len() >= max_entries)
            || self.current_bytes.load(Ordering::Relaxed) + new_size > max_bytes
        {
            let Some((_, evicted)) = guard.pop_lru() else { break };
            let evicted_size = approximate_object_size(&evicted);
            self.current_bytes.fetch_sub(evicted_size, Ordering::Relaxed);
            self.metrics.evictions.fetch_add(1, Ordering::Relaxed);
        }

        guard.put(hash, object);
        self.current_bytes.fetch_add(new_size, Ordering::Relaxed);
    }

    pub fn delete(&self, hash: &str) -> bool {
        let mut guard = self.store.write();
        if let Some(removed) = guard.pop(hash) {
            let size = approximate_object_size(&removed);
            self.current_bytes.fetch_sub(size, Ordering::Relaxed);
            true
        } else {
            false
        }
    }

    /// Empties the cache. Statistics (hits/misses/evictions) are preserved.
    pub fn clear(&self) {
        self.store.write().clear();
        self.current_bytes.store(0, Ordering::Relaxed);
    }

    #[must_use]
    pub fn size(&self) -> usize {
        self.store.read().len()
    }

    #[must_use]
    pub fn bytes(&self) -> u64 {
        self.current_bytes.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn stats(&self) -> CacheMetricsSnapshot {
        let config = self.config.read();
        self.metrics.snapshot(self.size(), self.bytes(), config.max_entries, config.max_bytes)
    }

    pub fn reset_stats(&self) {
        self.metrics.reset();
    }

    pub fn set_max_entries(&self, max_entries: usize) {
        let nz = NonZeroUsize::new(max_entries.max(1)).unwrap();
        self.config.write().max_entries = nz.get();
        self.store.write().resize(nz);
    }

    pub fn set_max_bytes(&self, max_bytes: u64) {
        self.config.write().max_bytes = max_bytes;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn obj(n: usize) -> CachedObject {
        CachedObject { object_type: ObjectType::Blob, content: vec![0u8; n] }
    }

    #[test]
    fn get_updates_recency_has_does_not() {
        let cache = Cache::new(CacheConfig { max_entries: 2, max_bytes: 1024 });
        cache.set("a".into(), obj(4));
        cache.set("b".into(), obj(4));
        assert!(cache.has("a"));
        assert_eq!(cache.stats().hits, 0);
        cache.get("a");
        cache.set("c".into(), obj(4));
        // "a" was touched more recently than "b" via get(), so "b" evicts.
        assert!(cache.has("a"));
        assert!(!cache.has("b"));
    }

    #[test]
    fn replacing_existing_key_at_capacity_does_not_evict_others() {
        let cache = Cache::new(CacheConfig { max_entries: 2, max_bytes: 1024 });
        cache.set("a".into(), obj(4));
        cache.set("b".into(), obj(4));
        cache.set("a".into(), obj(8));
        assert!(cache.has("a"));
        assert!(cache.has("b"));
        assert_eq!(cache.stats().evictions, 0);
    }

    #[test]
    fn oversized_object_is_not_cached() {
        let cache = Cache::new(CacheConfig { max_entries: 10, max_bytes: 32 });
        cache.set("big".into(), obj(1024));
        assert!(!cache.has("big"));
    }

    #[test]
    fn clear_preserves_statistics() {
        let cache = Cache::new(CacheConfig { max_entries: 10, max_bytes: 1024 });
        cache.set("a".into(), obj(4));
        cache.get("a");
        cache.get("missing");
        cache.clear();
        assert_eq!(cache.size(), 0);
        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
    }
}
