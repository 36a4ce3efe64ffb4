//! Configuration (component P): defaults mirror `CacheConfig`'s
//! mutable-behind-a-lock style, loaded from a TOML file via `toml` +
//! `dirs_next`, the way the teacher locates its config directory.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::errors::{CasError, Result};
use crate::extent::Compression;
use crate::hash::Algorithm;

fn default_page_size() -> u32 {
    4096
}
fn default_extent_size() -> u64 {
    2 * 1024 * 1024
}
fn default_base_dir() -> String {
    "objects".to_string()
}
fn default_prefix_len() -> usize {
    2
}
fn default_max_cache_entries() -> usize {
    4096
}
fn default_max_cache_bytes() -> u64 {
    64 * 1024 * 1024
}
fn default_batch_concurrency() -> usize {
    10
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum HashAlgorithm {
    Sha1,
    Sha256,
    Sha384,
    Sha512,
}

impl Default for HashAlgorithm {
    fn default() -> Self {
        Self::Sha1
    }
}

impl From<HashAlgorithm> for Algorithm {
    fn from(value: HashAlgorithm) -> Self {
        match value {
            HashAlgorithm::Sha1 => Algorithm::Sha1,
            HashAlgorithm::Sha256 => Algorithm::Sha256,
            HashAlgorithm::Sha384 => Algorithm::Sha384,
            HashAlgorithm::Sha512 => Algorithm::Sha512,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CompressionKind {
    None,
    Gzip,
    Zstd,
}

impl CompressionKind {
    #[must_use]
    pub fn to_extent_compression(self) -> Compression {
        match self {
            Self::None => Compression::None,
            Self::Gzip => Compression::Gzip,
            #[cfg(feature = "zstd-extents")]
            Self::Zstd => Compression::Zstd,
            #[cfg(not(feature = "zstd-extents"))]
            Self::Zstd => Compression::None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CasConfig {
    #[serde(default = "default_base_dir")]
    pub base_dir: String,
    #[serde(default = "default_prefix_len")]
    pub prefix_len: usize,
    #[serde(default)]
    pub hash_algorithm: HashAlgorithm,
    #[serde(default = "default_max_cache_entries")]
    pub max_cache_entries: usize,
    #[serde(default = "default_max_cache_bytes")]
    pub max_cache_bytes: u64,
    #[serde(default = "default_batch_concurrency")]
    pub batch_concurrency: usize,
    pub compression: CompressionKind,
}

impl Default for CasConfig {
    fn default() -> Self {
        Self {
            base_dir: default_base_dir(),
            prefix_len: default_prefix_len(),
            hash_algorithm: HashAlgorithm::default(),
            max_cache_entries: default_max_cache_entries(),
            max_cache_bytes: default_max_cache_bytes(),
            batch_concurrency: default_batch_concurrency(),
            compression: CompressionKind::None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VfsConfig {
    #[serde(default = "default_page_size")]
    pub page_size: u32,
    #[serde(default = "default_extent_size")]
    pub extent_size: u64,
    #[serde(default = "default_base_dir")]
    pub extents_base_dir: String,
    pub compression: CompressionKind,
}

impl Default for VfsConfig {
    fn default() -> Self {
        Self {
            page_size: default_page_size(),
            extent_size: default_extent_size(),
            extents_base_dir: "extents".to_string(),
            compression: CompressionKind::None,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub cas: CasConfig,
    pub vfs: VfsConfig,
}

impl Config {
    pub fn from_str(raw: &str) -> Result<Self> {
        toml::from_str(raw).map_err(CasError::from)
    }

    /// Loads from an explicit path, or `{config_dir}/casfs/config.toml` if
    /// `path` is `None`. Missing files yield the defaults, matching the
    /// teacher's pattern of tolerating an absent `log4rs.yaml`.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let resolved = match path {
            Some(p) => p.to_path_buf(),
            None => default_config_path(),
        };
        match std::fs::read_to_string(&resolved) {
            Ok(raw) => Self::from_str(&raw),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(CasError::from(e)),
        }
    }
}

#[must_use]
pub fn default_config_path() -> PathBuf {
    dirs_next::config_dir().unwrap_or_else(|| PathBuf::from(".")).join("casfs").join("config.toml")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec_constants() {
        let cfg = Config::default();
        assert_eq!(cfg.vfs.page_size, 4096);
        assert_eq!(cfg.vfs.extent_size, 2 * 1024 * 1024);
        assert_eq!(cfg.cas.base_dir, "objects");
        assert_eq!(cfg.cas.prefix_len, 2);
    }

    #[test]
    fn partial_toml_fills_in_remaining_defaults() {
        let cfg = Config::from_str("[cas]\nbase_dir = \"store\"\n").unwrap();
        assert_eq!(cfg.cas.base_dir, "store");
        assert_eq!(cfg.cas.prefix_len, 2);
        assert_eq!(cfg.vfs.page_size, 4096);
    }
}
