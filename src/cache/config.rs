/// Configuration for the object cache.
#[derive(Clone, Debug)]
pub struct CacheConfig {
    pub max_entries: usize,
    pub max_bytes: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self { max_entries: 4096, max_bytes: 64 * 1024 * 1024 }
    }
}
