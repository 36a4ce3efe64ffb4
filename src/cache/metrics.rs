use std::sync::atomic::{AtomicU64, Ordering};

/// Simple counters for observing cache behavior.
#[derive(Default)]
pub struct CacheMetrics {
    pub hits: AtomicU64,
    pub misses: AtomicU64,
    pub evictions: AtomicU64,
}

impl CacheMetrics {
    pub fn snapshot(
        &self,
        entry_count: usize,
        total_bytes: u64,
        max_entries: usize,
        max_bytes: u64,
    ) -> CacheMetricsSnapshot {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let total = hits + misses;
        let hit_ratio = if total == 0 { 0.0 } else { hits as f64 / total as f64 };
        CacheMetricsSnapshot {
            hits,
            misses,
            hit_ratio,
            entry_count,
            total_bytes,
            max_entries,
            max_bytes,
            evictions: self.evictions.load(Ordering::Relaxed),
        }
    }

    /// Counters reset; `clear` on the cache preserves these (spec: `clear`
    /// preserves statistics), so this is only called by `reset_stats`.
    pub fn reset(&self) {
        self.hits.store(0, Ordering::Relaxed);
        self.misses.store(0, Ordering::Relaxed);
        self.evictions.store(0, Ordering::Relaxed);
    }
}

#[derive(Debug, Clone, Copy, serde::Serialize)]
pub struct CacheMetricsSnapshot {
    pub hits: u64,
    pub misses: u64,
    pub hit_ratio: f64,
    pub entry_count: usize,
    pub total_bytes: u64,
    pub max_entries: usize,
    pub max_bytes: u64,
    pub evictions: u64,
}
