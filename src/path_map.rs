//! Path mapper (component D). Bidirectional map between a hash and its
//! storage path, bijective after case normalization.

use crate::errors::CasError;
use crate::hash::{detect_algorithm, normalize_hash};

#[derive(Debug, Clone)]
pub struct PathMapperOptions {
    pub base_dir: String,
    pub prefix_len: usize,
}

impl Default for PathMapperOptions {
    fn default() -> Self {
        Self { base_dir: "objects".to_string(), prefix_len: 2 }
    }
}

#[derive(Debug, Clone)]
pub struct PathMapper {
    opts: PathMapperOptions,
}

#[must_use]
pub fn create_mapper(opts: PathMapperOptions) -> PathMapper {
    PathMapper { opts }
}

impl PathMapper {
    pub fn hash_to_path(&self, hash: &str) -> Result<String, CasError> {
        hash_to_path(hash, &self.opts)
    }

    pub fn path_to_hash(&self, path: &str) -> Result<String, CasError> {
        path_to_hash(path, &self.opts)
    }
}

pub fn hash_to_path(hash: &str, opts: &PathMapperOptions) -> Result<String, CasError> {
    if !(1..=8).contains(&opts.prefix_len) {
        return Err(CasError::invalid("hash_to_path", "prefix_len must be in 1..=8"));
    }
    if detect_algorithm(hash).is_none() {
        return Err(CasError::invalid("hash_to_path", "unrecognized hash length"));
    }
    if hash.len() <= opts.prefix_len {
        return Err(CasError::invalid("hash_to_path", "hash shorter than prefix_len"));
    }
    let normalized = normalize_hash(hash);
    let (prefix, rest) = normalized.split_at(opts.prefix_len);
    Ok(format!("{}/{}/{}", opts.base_dir, prefix, rest))
}

pub fn path_to_hash(path: &str, opts: &PathMapperOptions) -> Result<String, CasError> {
    let stripped = path
        .strip_prefix(&opts.base_dir)
        .and_then(|p| p.strip_prefix('/'))
        .ok_or_else(|| CasError::invalid("path_to_hash", "path outside base_dir"))?;

    let mut parts = stripped.splitn(2, '/');
    let prefix = parts.next().ok_or_else(|| CasError::invalid("path_to_hash", "malformed path"))?;
    let rest = parts.next().ok_or_else(|| CasError::invalid("path_to_hash", "malformed path"))?;

    if prefix.len() != opts.prefix_len {
        return Err(CasError::invalid("path_to_hash", "prefix length mismatch"));
    }

    let candidate = format!("{prefix}{rest}");
    if detect_algorithm(&candidate).is_none() {
        return Err(CasError::invalid("path_to_hash", "unrecognized hash length"));
    }
    if !candidate.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Err(CasError::invalid("path_to_hash", "non-hex characters in path"));
    }
    Ok(normalize_hash(&candidate))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_empty_blob_hash() {
        let opts = PathMapperOptions::default();
        let hash = "e69de29bb2d1d6434b8b29ae775ad8c2e48c5391";
        let path = hash_to_path(hash, &opts).unwrap();
        assert_eq!(path, "objects/e6/9de29bb2d1d6434b8b29ae775ad8c2e48c5391");
        assert_eq!(path_to_hash(&path, &opts).unwrap(), hash);
    }

    #[test]
    fn maps_sha256_hash() {
        let opts = PathMapperOptions::default();
        let hash = "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824";
        let path = hash_to_path(hash, &opts).unwrap();
        assert_eq!(
            path,
            "objects/2c/f24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824"
        );
        assert_eq!(path_to_hash(&path, &opts).unwrap(), hash);
    }

    #[test]
    fn normalizes_case() {
        let opts = PathMapperOptions::default();
        let hash = "E69DE29BB2D1D6434B8B29AE775AD8C2E48C5391";
        let path = hash_to_path(hash, &opts).unwrap();
        assert_eq!(path, "objects/e6/9de29bb2d1d6434b8b29ae775ad8c2e48c5391");
    }

    #[test]
    fn rejects_bad_prefix_len() {
        let opts = PathMapperOptions { prefix_len: 0, ..Default::default() };
        assert!(hash_to_path("e69de29bb2d1d6434b8b29ae775ad8c2e48c5391", &opts).is_err());
    }
}
