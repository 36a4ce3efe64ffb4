//! CAS orchestrator (component H): `put`/`get`/`has`/`delete`/`gc` and their
//! batch counterparts, coordinating the cache, existence cache, refcount
//! store, and zlib framing around a `BlobStorage` backend.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex as StdMutex};

use futures::stream::{self, StreamExt};
use serde::Serialize;
use tokio::sync::Notify;

use crate::cache::{Cache, CacheConfig, CacheMetricsSnapshot, CachedObject};
use crate::errors::{CasError, Result};
use crate::existence_cache::{Existence, ExistenceCache, ExistenceCacheConfig, ExistenceCacheStats};
use crate::hash::{self, Algorithm};
use crate::object::{self, ObjectType};
use crate::path_map::{self, PathMapper, PathMapperOptions};
use crate::refcount::{RefcountMetricsSnapshot, RefcountStats, RefcountStore};
use crate::storage::BlobStorage;
use crate::zlib::{self, CompressOptions};

#[derive(Debug, Clone)]
pub struct CasOptions {
    pub algorithm: Algorithm,
    pub path_mapper: PathMapperOptions,
    pub cache: CacheConfig,
    pub existence_cache: Option<ExistenceCacheConfig>,
    pub compress: CompressOptions,
    pub batch_concurrency: usize,
}

impl Default for CasOptions {
    fn default() -> Self {
        Self {
            algorithm: Algorithm::Sha1,
            path_mapper: PathMapperOptions::default(),
            cache: CacheConfig::default(),
            existence_cache: Some(ExistenceCacheConfig::default()),
            compress: CompressOptions::default(),
            batch_concurrency: 10,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PutResult {
    pub hash: String,
    pub written: bool,
    pub index: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct HasResult {
    pub hash: String,
    pub exists: bool,
    pub index: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct GcResult {
    pub scanned: usize,
    pub deleted_count: usize,
    pub bytes_freed: u64,
    pub dry_run: bool,
    pub deleted_hashes: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct GcOptions {
    pub dry_run: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct CasStats {
    pub cache: CacheMetricsSnapshot,
    pub existence_cache: Option<ExistenceCacheStats>,
    pub refcount: RefcountStats,
    pub refcount_ops: RefcountMetricsSnapshot,
}

pub struct Object {
    pub object_type: ObjectType,
    pub content: Vec<u8>,
}

/// Synchronous check-and-insert for in-flight writes, guarded by a plain
/// `std::sync::Mutex` so the check happens before any `.await` — the
/// invariant the design notes call out for in-flight write coordination.
struct InFlightWrites {
    waiters: StdMutex<HashMap<String, Arc<Notify>>>,
}

impl InFlightWrites {
    fn new() -> Self {
        Self { waiters: StdMutex::new(HashMap::new()) }
    }

    /// Returns `Ok(())` if this call became the writer for `path`; returns
    /// `Err(notify)` if another writer is already in flight, to be awaited.
    fn claim(&self, path: &str) -> std::result::Result<(), Arc<Notify>> {
        let mut guard = self.waiters.lock().unwrap();
        if let Some(existing) = guard.get(path) {
            return Err(existing.clone());
        }
        guard.insert(path.to_string(), Arc::new(Notify::new()));
        Ok(())
    }

    fn release(&self, path: &str) {
        let notify = {
            let mut guard = self.waiters.lock().unwrap();
            guard.remove(path)
        };
        if let Some(notify) = notify {
            notify.notify_waiters();
        }
    }
}

pub struct Cas {
    backend: Arc<dyn BlobStorage>,
    mapper: PathMapper,
    algorithm: Algorithm,
    compress_opts: CompressOptions,
    cache: Cache,
    existence: Option<ExistenceCache>,
    refcounts: RefcountStore,
    in_flight: InFlightWrites,
    batch_concurrency: usize,
    puts: AtomicU64,
    gets: AtomicU64,
}

impl Cas {
    #[must_use]
    pub fn new(backend: Arc<dyn BlobStorage>, options: CasOptions) -> Self {
        Self {
            backend,
            mapper: path_map::create_mapper(options.path_mapper),
            algorithm: options.algorithm,
            compress_opts: options.compress,
            cache: Cache::new(options.cache),
            existence: options.existence_cache.map(ExistenceCache::new),
            refcounts: RefcountStore::new(),
            in_flight: InFlightWrites::new(),
            batch_concurrency: options.batch_concurrency.max(1),
            puts: AtomicU64::new(0),
            gets: AtomicU64::new(0),
        }
    }

    fn validate_hash(&self, hash: &str) -> Result<String> {
        if !hash::is_valid_hash(hash, None) {
            return Err(CasError::invalid("cas::validate_hash", "malformed hash"));
        }
        Ok(hash::normalize_hash(hash))
    }

    pub async fn put(&self, object_type: ObjectType, bytes: &[u8]) -> Result<PutResult> {
        self.puts.fetch_add(1, Ordering::Relaxed);
        let object_bytes = object::build(object_type, bytes);
        let digest = hash::hash(self.algorithm, &object_bytes);
        let path = self.mapper.hash_to_path(&digest)?;

        let written = if self.backend.has_atomic_write_if_absent() {
            let compressed = zlib::compress(&object_bytes, self.compress_opts)
                .map_err(|e| CasError::format("cas::put", e.to_string()))?;
            self.backend.write_if_absent(&path, &compressed).await.inspect_err(|e| {
                log::warn!("cas::put: backend write_if_absent failed for {path}: {e}");
            })?
        } else {
            match self.in_flight.claim(&path) {
                Ok(()) => {
                    let result = async {
                        if self.backend.exists(&path).await? {
                            return Ok(false);
                        }
                        let compressed = zlib::compress(&object_bytes, self.compress_opts)
                            .map_err(|e| CasError::format("cas::put", e.to_string()))?;
                        self.backend.write(&path, &compressed).await?;
                        Ok(true)
                    }
                    .await;
                    self.in_flight.release(&path);
                    result.inspect_err(|e| {
                        log::warn!("cas::put: backend write failed for {path}: {e}");
                    })?
                }
                Err(notify) => {
                    notify.notified().await;
                    false
                }
            }
        };

        self.refcounts.increment(&digest);
        self.refcounts.set_size(&digest, bytes.len() as u64);
        if let Some(ec) = &self.existence {
            ec.record_put(&digest);
        }

        Ok(PutResult { hash: digest, written, index: 0 })
    }

    pub async fn put_batch(
        &self,
        items: Vec<(ObjectType, Vec<u8>)>,
        mut on_progress: impl FnMut(usize, usize),
    ) -> Vec<Result<PutResult>> {
        let total = items.len();
        let concurrency = self.batch_concurrency;
        let mut results: Vec<Result<PutResult>> = stream::iter(items.into_iter().enumerate())
            .map(|(index, (object_type, bytes))| async move {
                let mut result = self.put(object_type, &bytes).await;
                if let Ok(r) = &mut result {
                    r.index = index;
                }
                (index, result)
            })
            .buffer_unordered(concurrency)
            .collect::<Vec<_>>()
            .await;
        results.sort_by_key(|(index, _)| *index);
        let mut done = 0usize;
        results
            .into_iter()
            .map(|(_, r)| {
                done += 1;
                on_progress(done, total);
                r
            })
            .collect()
    }

    pub async fn get(&self, hash: &str) -> Result<Option<Object>> {
        self.gets.fetch_add(1, Ordering::Relaxed);
        let digest = self.validate_hash(hash)?;

        if let Some(cached) = self.cache.get(&digest) {
            return Ok(Some(Object { object_type: cached.object_type, content: cached.content }));
        }

        let path = self.mapper.hash_to_path(&digest)?;
        let Some(stored) = self.backend.get(&path).await.inspect_err(|e| {
            log::warn!("cas::get: backend read failed for {path}: {e}");
        })?
        else {
            return Ok(None);
        };
        let decompressed =
            zlib::decompress(&stored).map_err(|e| CasError::format("cas::get", e.to_string()))?;
        let parsed =
            object::parse(&decompressed).map_err(|e| CasError::format("cas::get", e.to_string()))?;

        let content = parsed.content.to_vec();
        self.cache.set(
            digest.clone(),
            CachedObject { object_type: parsed.object_type, content: content.clone() },
        );
        Ok(Some(Object { object_type: parsed.object_type, content }))
    }

    pub async fn has(&self, hash: &str) -> Result<bool> {
        let digest = self.validate_hash(hash)?;
        if let Some(ec) = &self.existence {
            match ec.check(&digest) {
                Existence::Present => return Ok(true),
                Existence::Absent => return Ok(false),
                Existence::Unknown => {}
            }
        }
        let path = self.mapper.hash_to_path(&digest)?;
        let exists = self.backend.exists(&path).await?;
        if let Some(ec) = &self.existence {
            ec.record(&digest, exists);
        }
        Ok(exists)
    }

    pub async fn has_batch(&self, hashes: Vec<String>) -> Result<Vec<HasResult>> {
        let digests: Vec<String> =
            hashes.iter().map(|h| self.validate_hash(h)).collect::<Result<_>>()?;

        let results: Vec<(usize, Result<bool>)> = stream::iter(digests.into_iter().enumerate())
            .map(|(index, digest)| async move { (index, self.has(&digest).await) })
            .buffer_unordered(self.batch_concurrency)
            .collect()
            .await;

        let mut out = Vec::with_capacity(results.len());
        for (index, result) in results {
            out.push(HasResult { hash: hashes[index].clone(), exists: result?, index });
        }
        out.sort_by_key(|r| r.index);
        Ok(out)
    }

    /// Decrements the refcount; deletes the blob only if this call
    /// transitioned the count from positive to zero.
    pub async fn delete(&self, hash: &str) -> Result<()> {
        let digest = self.validate_hash(hash)?;
        let mut became_zero = false;
        self.refcounts.decrement_with_gc_signal(&digest, || became_zero = true);
        if became_zero {
            self.purge_blob(&digest).await?;
        }
        Ok(())
    }

    /// Unconditionally deletes the blob and invalidates caches, regardless
    /// of refcount.
    pub async fn force_delete(&self, hash: &str) -> Result<()> {
        let digest = self.validate_hash(hash)?;
        self.refcounts.delete(&digest);
        self.purge_blob(&digest).await
    }

    async fn purge_blob(&self, digest: &str) -> Result<()> {
        let path = self.mapper.hash_to_path(digest)?;
        self.backend.delete(&path).await.inspect_err(|e| {
            log::warn!("cas::purge_blob: backend delete failed for {path}: {e}");
        })?;
        self.cache.delete(digest);
        if let Some(ec) = &self.existence {
            ec.record_delete(digest);
        }
        Ok(())
    }

    pub async fn gc(&self, opts: GcOptions, mut on_progress: impl FnMut(usize)) -> Result<GcResult> {
        let entries = self.refcounts.entries();
        log::info!("gc: scanning {} refcount entries, dry_run={}", entries.len(), opts.dry_run);
        let mut scanned = 0usize;
        let mut deleted_hashes = Vec::new();
        let mut bytes_freed = 0u64;

        for (digest, entry) in entries {
            scanned += 1;
            on_progress(scanned);
            if entry.count != 0 {
                continue;
            }
            if !opts.dry_run {
                self.purge_blob(&digest).await?;
                self.refcounts.delete(&digest);
            }
            deleted_hashes.push(digest);
            bytes_freed += entry.size;
        }

        log::info!(
            "gc: scanned={scanned}, deleted={}, bytes_freed={bytes_freed}, dry_run={}",
            deleted_hashes.len(),
            opts.dry_run
        );
        Ok(GcResult {
            scanned,
            deleted_count: deleted_hashes.len(),
            bytes_freed,
            dry_run: opts.dry_run,
            deleted_hashes,
        })
    }

    #[must_use]
    pub fn stats(&self) -> CasStats {
        CasStats {
            cache: self.cache.stats(),
            existence_cache: self.existence.as_ref().map(ExistenceCache::stats),
            refcount: self.refcounts.calculate_stats(),
            refcount_ops: self.refcounts.metrics_snapshot(),
        }
    }

    #[must_use]
    pub fn cache_stats(&self) -> CacheMetricsSnapshot {
        self.cache.stats()
    }

    #[must_use]
    pub fn existence_cache_stats(&self) -> Option<ExistenceCacheStats> {
        self.existence.as_ref().map(ExistenceCache::stats)
    }

    pub fn clear_cache(&self) {
        self.cache.clear();
    }

    pub fn reset_cache_stats(&self) {
        self.cache.reset_stats();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::InMemoryBlobStorage;

    fn cas() -> Cas {
        Cas::new(Arc::new(InMemoryBlobStorage::new()), CasOptions::default())
    }

    #[tokio::test]
    async fn empty_blob_matches_known_vector() {
        let c = cas();
        let result = c.put(ObjectType::Blob, b"").await.unwrap();
        assert_eq!(result.hash, "e69de29bb2d1d6434b8b29ae775ad8c2e48c5391");
        let object = c.get(&result.hash).await.unwrap().unwrap();
        assert_eq!(object.content, b"");
    }

    #[tokio::test]
    async fn hello_blob_matches_known_vector() {
        let c = cas();
        let result = c.put(ObjectType::Blob, b"hello").await.unwrap();
        assert_eq!(result.hash, "b6fc4c620b67d95f953a5c1c1230aaab5db5a1b0");
    }

    #[tokio::test]
    async fn what_is_up_doc_matches_known_vector() {
        let c = cas();
        let result = c.put(ObjectType::Blob, b"what is up, doc?").await.unwrap();
        assert_eq!(result.hash, "bd9dbf5aae1a3862dd1526723246b20206e5fc37");
    }

    #[tokio::test]
    async fn dedup_and_refcount_scenario() {
        let c = cas();
        let futs = (0..3).map(|_| c.put(ObjectType::Blob, b"dup"));
        let results = futures::future::join_all(futs).await;
        let hashes: std::collections::HashSet<_> =
            results.iter().map(|r| r.as_ref().unwrap().hash.clone()).collect();
        assert_eq!(hashes.len(), 1);
        let written_count = results.iter().filter(|r| r.as_ref().unwrap().written).count();
        assert_eq!(written_count, 1);
        let hash = hashes.into_iter().next().unwrap();
        assert_eq!(c.refcounts.get(&hash), 3);
        let stats = c.refcounts.calculate_stats();
        assert_eq!(stats.deduplicated_bytes, 2 * 3);
    }

    #[tokio::test]
    async fn gc_scenario() {
        let c = cas();
        let mut hash = String::new();
        for _ in 0..3 {
            hash = c.put(ObjectType::Blob, b"dup").await.unwrap().hash;
        }
        for _ in 0..3 {
            c.delete(&hash).await.unwrap();
        }
        let result = c.gc(GcOptions { dry_run: false }, |_| {}).await.unwrap();
        assert_eq!(result.deleted_count, 1);
        assert!(c.get(&hash).await.unwrap().is_none());

        let put_again = c.put(ObjectType::Blob, b"dup").await.unwrap();
        assert_eq!(put_again.hash, hash);
        assert!(put_again.written);
    }
}
