//! Existence cache (component F): bloom filter + TTL positive cache for
//! fast membership checks ahead of a storage round-trip.
//!
//! The bloom filter shape (`bits`, `k`) is grounded on
//! `recovery::wasp::types::BloomFilter`, generalized per the design notes to
//! a packed `u32` word array with double-hashing over two disjoint 32-bit
//! slices of the hex hash, so no external hash family is required.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use parking_lot::RwLock;
use serde::Serialize;

/// Result of an existence check: the bloom filter guarantees no false
/// negatives, so `Absent` is certain while `Unknown` means "consult
/// storage".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Existence {
    Present,
    Absent,
    Unknown,
}

struct Bloom {
    bits: Vec<u32>,
    m_bits: usize,
    k: u32,
}

impl Bloom {
    /// `m = ceil(-n*ln(p) / ln(2)^2)` rounded up to a 32-bit word boundary;
    /// `k = ceil((m/n)*ln(2))`, minimum 1.
    fn sized_for(expected_items: usize, false_positive_rate: f64) -> Self {
        let n = (expected_items.max(1)) as f64;
        let p = false_positive_rate.clamp(1e-6, 0.5);
        let m_bits_raw = (-n * p.ln() / std::f64::consts::LN_2.powi(2)).ceil() as usize;
        let m_words = m_bits_raw.div_ceil(32).max(1);
        let m_bits = m_words * 32;
        let k = (((m_bits as f64) / n) * std::f64::consts::LN_2).ceil().max(1.0) as u32;
        Self { bits: vec![0u32; m_words], m_bits, k }
    }

    /// Two disjoint 32-bit slices of the hex hash, parsed as u32, feed a
    /// double-hashing scheme: `position_i = (h1 + i*h2) % m_bits`.
    fn slices(hash_hex: &str) -> (u32, u32) {
        let bytes = hash_hex.as_bytes();
        let mut h1: u32 = 0x9e37_79b9;
        let mut h2: u32 = 0x85eb_ca6b;
        let mid = bytes.len() / 2;
        for &b in &bytes[..mid] {
            h1 = h1.wrapping_mul(31).wrapping_add(u32::from(b));
        }
        for &b in &bytes[mid..] {
            h2 = h2.wrapping_mul(31).wrapping_add(u32::from(b));
        }
        if h2 == 0 {
            h2 = 1;
        }
        (h1, h2)
    }

    fn positions(&self, hash_hex: &str) -> impl Iterator<Item = usize> + '_ {
        let (h1, h2) = Self::slices(hash_hex);
        let m_bits = self.m_bits as u64;
        (0..self.k).map(move |i| {
            let pos = (u64::from(h1).wrapping_add(u64::from(i) * u64::from(h2))) % m_bits;
            pos as usize
        })
    }

    fn insert(&mut self, hash_hex: &str) {
        for pos in self.positions(hash_hex) {
            self.bits[pos / 32] |= 1 << (pos % 32);
        }
    }

    fn contains(&self, hash_hex: &str) -> bool {
        self.positions(hash_hex).all(|pos| self.bits[pos / 32] & (1 << (pos % 32)) != 0)
    }

    fn reset(&mut self) {
        self.bits.iter_mut().for_each(|w| *w = 0);
    }
}

#[derive(Clone, Debug)]
pub struct ExistenceCacheConfig {
    pub expected_items: usize,
    pub false_positive_rate: f64,
    pub ttl: Duration,
    pub capacity: usize,
}

impl Default for ExistenceCacheConfig {
    fn default() -> Self {
        Self {
            expected_items: 100_000,
            false_positive_rate: 0.01,
            ttl: Duration::from_secs(300),
            capacity: 100_000,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct ExistenceCacheStats {
    pub bloom_bits: usize,
    pub positive_entries: usize,
    pub capacity: usize,
}

pub struct ExistenceCache {
    bloom: RwLock<Bloom>,
    positive: RwLock<HashMap<String, Instant>>,
    config: ExistenceCacheConfig,
}

impl ExistenceCache {
    #[must_use]
    pub fn new(config: ExistenceCacheConfig) -> Self {
        let bloom = Bloom::sized_for(config.expected_items, config.false_positive_rate);
        Self { bloom: RwLock::new(bloom), positive: RwLock::new(HashMap::new()), config }
    }

    /// Bloom rejects → `Absent`; otherwise consult the unexpired positive
    /// map; absent from both → `Unknown` (caller must check storage).
    pub fn check(&self, hash: &str) -> Existence {
        if !self.bloom.read().contains(hash) {
            return Existence::Absent;
        }
        match self.positive.read().get(hash) {
            Some(expires_at) if *expires_at > Instant::now() => Existence::Present,
            _ => Existence::Unknown,
        }
    }

    /// On `exists = true`, adds to the bloom (never removed individually —
    /// false positives are acceptable, false negatives are not). Always
    /// refreshes the positive map's TTL entry.
    pub fn record(&self, hash: &str, exists: bool) {
        if exists {
            self.bloom.write().insert(hash);
        }
        self.evict_if_at_capacity();
        self.positive.write().insert(hash.to_string(), Instant::now() + self.config.ttl);
    }

    pub fn record_put(&self, hash: &str) {
        self.record(hash, true);
    }

    /// Removes the positive-map entry only; the bloom is left untouched.
    pub fn record_delete(&self, hash: &str) {
        self.invalidate(hash);
    }

    pub fn invalidate(&self, hash: &str) {
        self.positive.write().remove(hash);
    }

    fn evict_if_at_capacity(&self) {
        let mut map = self.positive.write();
        if map.len() < self.config.capacity {
            return;
        }
        let evict_count = (map.len() / 4).max(1);
        let mut by_age: Vec<(String, Instant)> =
            map.iter().map(|(k, v)| (k.clone(), *v)).collect();
        by_age.sort_by_key(|(_, expires_at)| *expires_at);
        for (key, _) in by_age.into_iter().take(evict_count) {
            map.remove(&key);
        }
    }

    /// Resets the positive map, and the bloom filter too when `also_bloom`.
    pub fn clear(&self, also_bloom: bool) {
        self.positive.write().clear();
        if also_bloom {
            self.bloom.write().reset();
        }
    }

    #[must_use]
    pub fn stats(&self) -> ExistenceCacheStats {
        ExistenceCacheStats {
            bloom_bits: self.bloom.read().m_bits,
            positive_entries: self.positive.read().len(),
            capacity: self.config.capacity,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const H1: &str = "e69de29bb2d1d6434b8b29ae775ad8c2e48c5391";
    const H2: &str = "b6fc4c620b67d95f953a5c1c1230aaab5db5a1b0";

    #[test]
    fn bloom_never_yields_false_negative_after_record_put() {
        let cache = ExistenceCache::new(ExistenceCacheConfig::default());
        cache.record_put(H1);
        assert_eq!(cache.check(H1), Existence::Present);
    }

    #[test]
    fn unrecorded_hash_may_be_absent_or_unknown_never_present() {
        let cache = ExistenceCache::new(ExistenceCacheConfig::default());
        assert_ne!(cache.check(H2), Existence::Present);
    }

    #[test]
    fn record_delete_clears_positive_but_not_bloom() {
        let cache = ExistenceCache::new(ExistenceCacheConfig::default());
        cache.record_put(H1);
        cache.record_delete(H1);
        // bloom still contains it, so the cache can no longer certify absence.
        assert_ne!(cache.check(H1), Existence::Absent);
        assert_ne!(cache.check(H1), Existence::Present);
    }

    #[test]
    fn clear_also_bloom_resets_everything() {
        let cache = ExistenceCache::new(ExistenceCacheConfig::default());
        cache.record_put(H1);
        cache.clear(true);
        assert_eq!(cache.check(H1), Existence::Absent);
    }
}
