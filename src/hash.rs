//! Hashing and hex codec (component A).
//!
//! Mirrors git's own hash surface: SHA-1 by default, with SHA-256/384/512
//! available for repositories that opt into a wider digest. The hex alphabet
//! is looked up through a static table the way `utils::num` favors table-driven
//! conversions over repeated arithmetic.

use std::io::Read;

use lru::LruCache;
use parking_lot::Mutex;
use sha1::Sha1;
use sha2::{Digest, Sha256, Sha384, Sha512};
use std::num::NonZeroUsize;

use crate::errors::{CasError, Result};

/// Supported digest algorithms, inferable from hex length alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Algorithm {
    Sha1,
    Sha256,
    Sha384,
    Sha512,
}

impl Algorithm {
    #[must_use]
    pub fn hex_len(self) -> usize {
        match self {
            Self::Sha1 => 40,
            Self::Sha256 => 64,
            Self::Sha384 => 96,
            Self::Sha512 => 128,
        }
    }

    #[must_use]
    pub fn from_hex_len(len: usize) -> Option<Self> {
        match len {
            40 => Some(Self::Sha1),
            64 => Some(Self::Sha256),
            96 => Some(Self::Sha384),
            128 => Some(Self::Sha512),
            _ => None,
        }
    }
}

const HEX_CHARS: &[u8; 16] = b"0123456789abcdef";

/// 256-entry lookup table mapping a byte to its two lowercase hex chars.
static HEX_TABLE: [[u8; 2]; 256] = {
    let mut table = [[0u8; 2]; 256];
    let mut i = 0;
    while i < 256 {
        table[i] = [HEX_CHARS[i >> 4], HEX_CHARS[i & 0x0f]];
        i += 1;
    }
    table
};

#[must_use]
pub fn to_hex(bytes: &[u8]) -> String {
    let mut s = String::with_capacity(bytes.len() * 2);
    for &b in bytes {
        let pair = HEX_TABLE[b as usize];
        s.push(pair[0] as char);
        s.push(pair[1] as char);
    }
    s
}

fn hex_nibble(c: u8) -> Option<u8> {
    match c {
        b'0'..=b'9' => Some(c - b'0'),
        b'a'..=b'f' => Some(c - b'a' + 10),
        b'A'..=b'F' => Some(c - b'A' + 10),
        _ => None,
    }
}

pub fn from_hex(s: &str) -> Result<Vec<u8>> {
    let bytes = s.as_bytes();
    if bytes.len() % 2 != 0 {
        return Err(CasError::invalid("from_hex", "odd-length hex string"));
    }
    let mut out = Vec::with_capacity(bytes.len() / 2);
    for pair in bytes.chunks_exact(2) {
        let hi = hex_nibble(pair[0])
            .ok_or_else(|| CasError::invalid("from_hex", "non-hex character"))?;
        let lo = hex_nibble(pair[1])
            .ok_or_else(|| CasError::invalid("from_hex", "non-hex character"))?;
        out.push((hi << 4) | lo);
    }
    Ok(out)
}

/// Validate and normalize a hash string: lowercase, hex-only, length matching
/// a known algorithm. `expected` optionally constrains which algorithm.
pub fn is_valid_hash(s: &str, expected: Option<Algorithm>) -> bool {
    let Some(algo) = detect_algorithm(s) else { return false };
    if let Some(exp) = expected {
        if exp != algo {
            return false;
        }
    }
    s.bytes().all(|b| hex_nibble(b).is_some())
}

#[must_use]
pub fn detect_algorithm(s: &str) -> Option<Algorithm> {
    Algorithm::from_hex_len(s.len())
}

/// Normalize a hash to lowercase; callers should validate first.
#[must_use]
pub fn normalize_hash(s: &str) -> String {
    s.to_ascii_lowercase()
}

fn digest_bytes(algorithm: Algorithm, bytes: &[u8]) -> Vec<u8> {
    match algorithm {
        Algorithm::Sha1 => Sha1::digest(bytes).to_vec(),
        Algorithm::Sha256 => Sha256::digest(bytes).to_vec(),
        Algorithm::Sha384 => Sha384::digest(bytes).to_vec(),
        Algorithm::Sha512 => Sha512::digest(bytes).to_vec(),
    }
}

#[must_use]
pub fn hash(algorithm: Algorithm, bytes: &[u8]) -> String {
    to_hex(&digest_bytes(algorithm, bytes))
}

/// Incremental hasher matching the design notes' "small state struct with
/// update/finalize/reset" shape.
pub enum StreamingHasher {
    Sha1(Box<Sha1>, u64),
    Sha256(Box<Sha256>, u64),
    Sha384(Box<Sha384>, u64),
    Sha512(Box<Sha512>, u64),
}

impl StreamingHasher {
    #[must_use]
    pub fn new(algorithm: Algorithm) -> Self {
        match algorithm {
            Algorithm::Sha1 => Self::Sha1(Box::new(Sha1::new()), 0),
            Algorithm::Sha256 => Self::Sha256(Box::new(Sha256::new()), 0),
            Algorithm::Sha384 => Self::Sha384(Box::new(Sha384::new()), 0),
            Algorithm::Sha512 => Self::Sha512(Box::new(Sha512::new()), 0),
        }
    }

    pub fn update(&mut self, chunk: &[u8]) {
        match self {
            Self::Sha1(h, n) => {
                h.update(chunk);
                *n += chunk.len() as u64;
            }
            Self::Sha256(h, n) => {
                h.update(chunk);
                *n += chunk.len() as u64;
            }
            Self::Sha384(h, n) => {
                h.update(chunk);
                *n += chunk.len() as u64;
            }
            Self::Sha512(h, n) => {
                h.update(chunk);
                *n += chunk.len() as u64;
            }
        }
    }

    #[must_use]
    pub fn bytes_processed(&self) -> u64 {
        match self {
            Self::Sha1(_, n) | Self::Sha256(_, n) | Self::Sha384(_, n) | Self::Sha512(_, n) => *n,
        }
    }

    #[must_use]
    pub fn finalize(self) -> String {
        match self {
            Self::Sha1(h, _) => to_hex(&h.finalize()),
            Self::Sha256(h, _) => to_hex(&h.finalize()),
            Self::Sha384(h, _) => to_hex(&h.finalize()),
            Self::Sha512(h, _) => to_hex(&h.finalize()),
        }
    }
}

/// Consume `reader` in fixed-size chunks, reporting progress after each
/// update via `on_progress`.
pub fn hash_stream(
    mut reader: impl Read,
    algorithm: Algorithm,
    mut on_progress: impl FnMut(u64),
) -> Result<String> {
    let mut hasher = StreamingHasher::new(algorithm);
    let mut buf = [0u8; 64 * 1024];
    loop {
        let n = reader.read(&mut buf).map_err(CasError::from)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
        on_progress(hasher.bytes_processed());
    }
    Ok(hasher.finalize())
}

/// Optional result cache keyed by `(algorithm, content-hash-of-input)`. Must
/// be explicitly enabled; untrusted input keyed by its own hash can be used
/// to probe cache timing, so this stays off by default.
pub struct HashCache {
    inner: Mutex<LruCache<(Algorithm, String), String>>,
}

impl HashCache {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let cap = NonZeroUsize::new(capacity.max(1)).unwrap();
        Self { inner: Mutex::new(LruCache::new(cap)) }
    }

    pub fn get_or_compute(&self, algorithm: Algorithm, bytes: &[u8]) -> String {
        let key_digest = to_hex(&Sha256::digest(bytes));
        let key = (algorithm, key_digest);
        if let Some(hit) = self.inner.lock().get(&key) {
            return hit.clone();
        }
        let computed = hash(algorithm, bytes);
        self.inner.lock().put(key, computed.clone());
        computed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hex_round_trip() {
        let bytes = [0u8, 1, 2, 254, 255, 16, 17];
        let hex = to_hex(&bytes);
        assert_eq!(from_hex(&hex).unwrap(), bytes);
    }

    #[test]
    fn detects_algorithm_by_length() {
        assert_eq!(Algorithm::from_hex_len(40), Some(Algorithm::Sha1));
        assert_eq!(Algorithm::from_hex_len(64), Some(Algorithm::Sha256));
        assert_eq!(Algorithm::from_hex_len(96), Some(Algorithm::Sha384));
        assert_eq!(Algorithm::from_hex_len(128), Some(Algorithm::Sha512));
        assert_eq!(Algorithm::from_hex_len(41), None);
    }

    #[test]
    fn sha256_of_hello_matches_known_vector() {
        assert_eq!(
            hash(Algorithm::Sha256, b"hello"),
            "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824"
        );
    }

    #[test]
    fn streaming_hasher_matches_one_shot() {
        let mut h = StreamingHasher::new(Algorithm::Sha1);
        h.update(b"hel");
        h.update(b"lo");
        assert_eq!(h.finalize(), hash(Algorithm::Sha1, b"hello"));
    }
}
