//! Refcount store (component G). Per-hash operations serialize through a
//! fixed-size striped lock table (1024 stripes keyed by hash prefix),
//! bounding lock-table memory regardless of key-space size, per the design
//! notes' cross-language redesign guidance.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use parking_lot::Mutex;
use serde::Serialize;

const STRIPE_COUNT: usize = 1024;

#[derive(Debug, Clone, Copy, Default)]
pub struct RefcountEntry {
    pub count: u32,
    pub size: u64,
}

#[derive(Default)]
pub struct RefcountMetrics {
    pub increments: AtomicU64,
    pub decrements: AtomicU64,
    pub cas_total: AtomicU64,
    pub cas_failures: AtomicU64,
    pub contention: AtomicU64,
    pub total_lock_wait_ms: AtomicU64,
    pub gc_signals: AtomicU64,
    pub batch_ops: AtomicU64,
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct RefcountMetricsSnapshot {
    pub increments: u64,
    pub decrements: u64,
    pub cas_total: u64,
    pub cas_failures: u64,
    pub contention: u64,
    pub total_lock_wait_ms: u64,
    pub gc_signals: u64,
    pub batch_ops: u64,
}

impl RefcountMetrics {
    fn snapshot(&self) -> RefcountMetricsSnapshot {
        RefcountMetricsSnapshot {
            increments: self.increments.load(Ordering::Relaxed),
            decrements: self.decrements.load(Ordering::Relaxed),
            cas_total: self.cas_total.load(Ordering::Relaxed),
            cas_failures: self.cas_failures.load(Ordering::Relaxed),
            contention: self.contention.load(Ordering::Relaxed),
            total_lock_wait_ms: self.total_lock_wait_ms.load(Ordering::Relaxed),
            gc_signals: self.gc_signals.load(Ordering::Relaxed),
            batch_ops: self.batch_ops.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct RefcountStats {
    pub total_objects: usize,
    pub total_references: u64,
    pub deduplicated_bytes: u64,
    pub average_refcount: f64,
}

pub struct RefcountStore {
    stripes: Vec<Mutex<HashMap<String, RefcountEntry>>>,
    metrics: RefcountMetrics,
}

fn stripe_index(hash: &str) -> usize {
    let mut acc: usize = 0;
    for &b in hash.as_bytes().iter().take(8) {
        acc = acc.wrapping_mul(31).wrapping_add(b as usize);
    }
    acc % STRIPE_COUNT
}

impl Default for RefcountStore {
    fn default() -> Self {
        Self::new()
    }
}

impl RefcountStore {
    #[must_use]
    pub fn new() -> Self {
        let mut stripes = Vec::with_capacity(STRIPE_COUNT);
        stripes.resize_with(STRIPE_COUNT, || Mutex::new(HashMap::new()));
        Self { stripes, metrics: RefcountMetrics::default() }
    }

    fn lock(&self, hash: &str) -> parking_lot::MutexGuard<'_, HashMap<String, RefcountEntry>> {
        let start = Instant::now();
        let stripe = &self.stripes[stripe_index(hash)];
        if let Some(guard) = stripe.try_lock() {
            return guard;
        }
        self.metrics.contention.fetch_add(1, Ordering::Relaxed);
        let guard = stripe.lock();
        self.metrics
            .total_lock_wait_ms
            .fetch_add(start.elapsed().as_millis() as u64, Ordering::Relaxed);
        guard
    }

    #[must_use]
    pub fn get(&self, hash: &str) -> u32 {
        self.lock(hash).get(hash).map_or(0, |e| e.count)
    }

    pub fn set(&self, hash: &str, count: u32) {
        self.lock(hash).entry(hash.to_string()).or_default().count = count;
    }

    pub fn increment(&self, hash: &str) -> u32 {
        self.metrics.increments.fetch_add(1, Ordering::Relaxed);
        let mut guard = self.lock(hash);
        let entry = guard.entry(hash.to_string()).or_default();
        entry.count += 1;
        entry.count
    }

    pub fn decrement(&self, hash: &str) -> u32 {
        self.metrics.decrements.fetch_add(1, Ordering::Relaxed);
        let mut guard = self.lock(hash);
        let Some(entry) = guard.get_mut(hash) else { return 0 };
        entry.count = entry.count.saturating_sub(1);
        entry.count
    }

    pub fn compare_and_swap(&self, hash: &str, expected: u32, new: u32) -> bool {
        self.metrics.cas_total.fetch_add(1, Ordering::Relaxed);
        let mut guard = self.lock(hash);
        let entry = guard.entry(hash.to_string()).or_default();
        if entry.count == expected {
            entry.count = new;
            true
        } else {
            self.metrics.cas_failures.fetch_add(1, Ordering::Relaxed);
            false
        }
    }

    /// `on_zero` fires iff this call transitioned a positive count to zero.
    pub fn decrement_with_gc_signal(&self, hash: &str, on_zero: impl FnOnce()) -> u32 {
        self.metrics.decrements.fetch_add(1, Ordering::Relaxed);
        let transitioned = {
            let mut guard = self.lock(hash);
            let Some(entry) = guard.get_mut(hash) else { return 0 };
            let was_positive = entry.count > 0;
            entry.count = entry.count.saturating_sub(1);
            was_positive && entry.count == 0
        };
        if transitioned {
            self.metrics.gc_signals.fetch_add(1, Ordering::Relaxed);
            on_zero();
        }
        self.get(hash)
    }

    pub fn batch_increment(&self, hashes: &[String]) -> HashMap<String, u32> {
        self.metrics.batch_ops.fetch_add(1, Ordering::Relaxed);
        hashes.iter().map(|h| (h.clone(), self.increment(h))).collect()
    }

    pub fn batch_decrement(
        &self,
        hashes: &[String],
        mut on_zero: Option<&mut dyn FnMut(&str)>,
    ) -> (HashMap<String, u32>, Vec<String>) {
        self.metrics.batch_ops.fetch_add(1, Ordering::Relaxed);
        let mut new_counts = HashMap::with_capacity(hashes.len());
        let mut reached_zero = Vec::new();
        for hash in hashes {
            let hit_zero = std::cell::Cell::new(false);
            let new = self.decrement_with_gc_signal(hash, || hit_zero.set(true));
            new_counts.insert(hash.clone(), new);
            if hit_zero.get() {
                reached_zero.push(hash.clone());
                if let Some(cb) = on_zero.as_deref_mut() {
                    cb(hash);
                }
            }
        }
        (new_counts, reached_zero)
    }

    pub fn set_size(&self, hash: &str, size: u64) {
        self.lock(hash).entry(hash.to_string()).or_default().size = size;
    }

    #[must_use]
    pub fn get_size(&self, hash: &str) -> u64 {
        self.lock(hash).get(hash).map_or(0, |e| e.size)
    }

    pub fn delete(&self, hash: &str) {
        self.lock(hash).remove(hash);
    }

    /// Snapshot of every tracked hash, for GC scans. Takes each stripe lock
    /// in turn rather than a single whole-table lock.
    #[must_use]
    pub fn entries(&self) -> Vec<(String, RefcountEntry)> {
        let mut out = Vec::new();
        for stripe in &self.stripes {
            out.extend(stripe.lock().iter().map(|(k, v)| (k.clone(), *v)));
        }
        out
    }

    #[must_use]
    pub fn metrics_snapshot(&self) -> RefcountMetricsSnapshot {
        self.metrics.snapshot()
    }

    #[must_use]
    pub fn calculate_stats(&self) -> RefcountStats {
        let mut total_objects = 0usize;
        let mut total_references = 0u64;
        let mut deduplicated_bytes = 0u64;
        for stripe in &self.stripes {
            for entry in stripe.lock().values() {
                if entry.count == 0 {
                    continue;
                }
                total_objects += 1;
                total_references += u64::from(entry.count);
                if entry.count > 1 {
                    deduplicated_bytes += u64::from(entry.count - 1) * entry.size;
                }
            }
        }
        let average_refcount =
            if total_objects == 0 { 0.0 } else { total_references as f64 / total_objects as f64 };
        RefcountStats { total_objects, total_references, deduplicated_bytes, average_refcount }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decrement_never_goes_negative() {
        let store = RefcountStore::new();
        assert_eq!(store.decrement("x"), 0);
        store.increment("x");
        assert_eq!(store.decrement("x"), 0);
    }

    #[test]
    fn gc_signal_fires_once_per_zero_transition() {
        let store = RefcountStore::new();
        store.increment("x");
        store.increment("x");
        let mut fired = 0;
        store.decrement_with_gc_signal("x", || fired += 1);
        assert_eq!(fired, 0);
        store.decrement_with_gc_signal("x", || fired += 1);
        assert_eq!(fired, 1);
        store.decrement_with_gc_signal("x", || fired += 1);
        assert_eq!(fired, 1);
    }

    #[test]
    fn dedup_stats_match_spec_scenario() {
        let store = RefcountStore::new();
        store.set_size("dup", 64);
        store.increment("dup");
        store.increment("dup");
        store.increment("dup");
        let stats = store.calculate_stats();
        assert_eq!(stats.total_references, 3);
        assert_eq!(stats.deduplicated_bytes, 2 * 64);
    }
}
