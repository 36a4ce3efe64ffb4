//! Test support (component L): deterministic fixtures and injectable-latency
//! backends for exercising the CAS/VFS stack without real disk or network
//! I/O. Gated behind the `test-support` Cargo feature so it never ships in
//! release builds, the way `rand` itself is feature-gated in the manifest.

use std::fs;
use std::path::Path;
use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

/// Create a unique temp file path with the given stem and extension in the OS temp dir.
pub fn temp_path(stem: &str, ext: &str) -> PathBuf {
    let now = SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_nanos();
    let mut p = std::env::temp_dir();
    p.push(format!("{}_{}.{}", stem, now, ext));
    p
}

/// Create a unique, empty temporary directory under the OS temp dir.
/// If the directory exists, it is removed first.
pub fn temp_dir(stem: &str) -> PathBuf {
    let now = SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_nanos();
    let mut p = std::env::temp_dir();
    p.push(format!("{}_{}", stem, now));
    if p.exists() {
        let _ = fs::remove_dir_all(&p);
    }
    fs::create_dir_all(&p).expect("create temp_dir failed");
    p
}

/// Join a file path inside a directory (does not create the file).
pub fn temp_file_in(dir: &Path, name: &str) -> PathBuf {
    dir.join(name)
}

#[cfg(feature = "test-support")]
mod fixtures {
    use rand::{RngCore, SeedableRng};
    use rand::rngs::StdRng;
    use std::sync::Arc;
    use std::time::Duration;

    use crate::errors::Result;
    use crate::storage::{BlobStorage, ListOptions, ListResult};

    /// Deterministic pseudo-random byte buffer for fixtures that need
    /// "realistic" content without depending on wall-clock entropy or
    /// checked-in binary blobs.
    #[must_use]
    pub fn deterministic_bytes(seed: u64, len: usize) -> Vec<u8> {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut buf = vec![0u8; len];
        rng.fill_bytes(&mut buf);
        buf
    }

    /// Wraps a `BlobStorage` backend with a fixed artificial delay on every
    /// call, for exercising timeout and contention paths deterministically.
    pub struct DelayedBlobStorage<B: BlobStorage> {
        inner: B,
        delay: Duration,
    }

    impl<B: BlobStorage> DelayedBlobStorage<B> {
        pub fn new(inner: B, delay: Duration) -> Self {
            Self { inner, delay }
        }
    }

    #[async_trait::async_trait]
    impl<B: BlobStorage> BlobStorage for DelayedBlobStorage<B> {
        async fn write(&self, path: &str, bytes: &[u8]) -> Result<()> {
            tokio::time::sleep(self.delay).await;
            self.inner.write(path, bytes).await
        }

        async fn get(&self, path: &str) -> Result<Option<Vec<u8>>> {
            tokio::time::sleep(self.delay).await;
            self.inner.get(path).await
        }

        async fn exists(&self, path: &str) -> Result<bool> {
            tokio::time::sleep(self.delay).await;
            self.inner.exists(path).await
        }

        async fn delete(&self, path: &str) -> Result<()> {
            tokio::time::sleep(self.delay).await;
            self.inner.delete(path).await
        }

        async fn list(&self, opts: ListOptions) -> Result<ListResult> {
            tokio::time::sleep(self.delay).await;
            self.inner.list(opts).await
        }

        fn has_atomic_write_if_absent(&self) -> bool {
            self.inner.has_atomic_write_if_absent()
        }
    }

    /// Known git loose-object fixtures: (`object_type`, content, expected
    /// SHA-1 hex digest of the built object).
    #[must_use]
    pub fn known_blob_vectors() -> Vec<(&'static str, &'static [u8], &'static str)> {
        vec![
            ("blob", b"", "e69de29bb2d1d6434b8b29ae775ad8c2e48c5391"),
            ("blob", b"hello", "b6fc4c620b67d95f953a5c1c1230aaab5db5a1b0"),
            (
                "blob",
                b"what is up, doc?",
                "bd9dbf5aae1a3862dd1526723246b20206e5fc37",
            ),
        ]
    }

    #[must_use]
    pub fn arc_backend<B: BlobStorage + 'static>(backend: B) -> Arc<dyn BlobStorage> {
        Arc::new(backend)
    }
}

#[cfg(feature = "test-support")]
pub use fixtures::{
    DelayedBlobStorage, arc_backend, deterministic_bytes, known_blob_vectors,
};
