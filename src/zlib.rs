//! Zlib framer (component B). Always produces/expects zlib framing — never
//! raw deflate, never gzip — matching git loose-object storage.

use std::io::{Read, Write};

use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ZlibError {
    #[error("invalid compression level: {0}")]
    InvalidLevel(u32),
    #[error("invalid memory level: {0}")]
    InvalidMemLevel(u32),
    #[error("compression failed: {0}")]
    CompressionFailed(String),
    #[error("decompression failed: {0}")]
    DecompressionFailed(String),
    #[error("invalid zlib header")]
    InvalidZlibHeader,
    #[error("zlib checksum mismatch")]
    InvalidChecksum,
    #[error("truncated zlib data")]
    TruncatedData,
    #[error("corrupted zlib data: {0}")]
    CorruptedData(String),
}

pub type Result<T> = std::result::Result<T, ZlibError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    Default,
    Filtered,
    HuffmanOnly,
    Rle,
    Fixed,
}

#[derive(Debug, Clone, Copy)]
pub struct CompressOptions {
    pub level: u32,
    pub strategy: Strategy,
    pub mem_level: u32,
}

impl Default for CompressOptions {
    fn default() -> Self {
        Self { level: 6, strategy: Strategy::Default, mem_level: 8 }
    }
}

/// `flate2`'s `Compression` only models level, not strategy or mem_level
/// (those are zlib-sys tuning knobs miniz_oxide doesn't expose); both are
/// validated here for contract parity even though only `level` reaches the
/// encoder.
pub fn compress(bytes: &[u8], opts: CompressOptions) -> Result<Vec<u8>> {
    if opts.level > 9 {
        return Err(ZlibError::InvalidLevel(opts.level));
    }
    if !(1..=9).contains(&opts.mem_level) {
        return Err(ZlibError::InvalidMemLevel(opts.mem_level));
    }
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::new(opts.level));
    encoder
        .write_all(bytes)
        .map_err(|e| ZlibError::CompressionFailed(e.to_string()))?;
    encoder
        .finish()
        .map_err(|e| ZlibError::CompressionFailed(e.to_string()))
}

/// Header-only check: CMF low nibble = 8 (deflate); `(CMF*256+FLG) % 31 == 0`;
/// minimum length 6. Never attempts a full decode.
#[must_use]
pub fn is_zlib_framed(bytes: &[u8]) -> bool {
    if bytes.len() < 6 {
        return false;
    }
    let cmf = bytes[0];
    let flg = bytes[1];
    if cmf & 0x0f != 8 {
        return false;
    }
    (u16::from(cmf) * 256 + u16::from(flg)) % 31 == 0
}

pub fn decompress(bytes: &[u8]) -> Result<Vec<u8>> {
    if bytes.len() < 6 {
        return Err(ZlibError::TruncatedData);
    }
    if !is_zlib_framed(bytes) {
        return Err(ZlibError::InvalidZlibHeader);
    }
    let mut decoder = ZlibDecoder::new(bytes);
    let mut out = Vec::new();
    decoder.read_to_end(&mut out).map_err(|e| {
        let msg = e.to_string();
        if msg.contains("checksum") {
            ZlibError::InvalidChecksum
        } else if msg.contains("unexpected end") || msg.contains("early eof") {
            ZlibError::TruncatedData
        } else {
            ZlibError::DecompressionFailed(msg)
        }
    })?;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips() {
        let data = b"what is up, doc?".repeat(100);
        let compressed = compress(&data, CompressOptions::default()).unwrap();
        assert!(is_zlib_framed(&compressed));
        assert_eq!(decompress(&compressed).unwrap(), data);
    }

    #[test]
    fn rejects_invalid_level() {
        let opts = CompressOptions { level: 10, ..Default::default() };
        assert!(matches!(compress(b"x", opts), Err(ZlibError::InvalidLevel(10))));
    }

    #[test]
    fn rejects_truncated_input() {
        assert!(matches!(decompress(&[1, 2]), Err(ZlibError::TruncatedData)));
    }

    #[test]
    fn rejects_non_deflate_header() {
        let bytes = [0x07u8, 0x01, 0, 0, 0, 0];
        assert!(!is_zlib_framed(&bytes));
    }
}
