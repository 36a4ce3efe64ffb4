//! On-disk extent framing: 64-byte header, presence bitmap, page payload.
//! Grounded on `recovery::wasp::page::PageHeader`'s fixed-layout,
//! checksum-in-header shape, generalized from a single page's CRC32 to a
//! whole extent's xxhash64-over-payload per the data model.

use crate::errors::{CasError, Result};

pub const MAGIC: &[u8; 4] = b"EXT1";
pub const VERSION: u16 = 1;
pub const HEADER_LEN: usize = 64;

pub const FLAG_COMPRESSED: u16 = 0b01;

#[derive(Debug, Clone, Copy)]
pub struct ExtentHeader {
    pub flags: u16,
    pub page_size: u32,
    pub page_count: u32,
    pub payload_size: u32,
    pub checksum: u64,
}

impl ExtentHeader {
    #[must_use]
    pub fn is_compressed(&self) -> bool {
        self.flags & FLAG_COMPRESSED != 0
    }

    #[must_use]
    pub fn encode(&self) -> [u8; HEADER_LEN] {
        let mut out = [0u8; HEADER_LEN];
        out[0..4].copy_from_slice(MAGIC);
        out[4..6].copy_from_slice(&VERSION.to_le_bytes());
        out[6..8].copy_from_slice(&self.flags.to_le_bytes());
        out[8..12].copy_from_slice(&self.page_size.to_le_bytes());
        out[12..16].copy_from_slice(&self.page_count.to_le_bytes());
        out[16..20].copy_from_slice(&self.payload_size.to_le_bytes());
        out[20..28].copy_from_slice(&self.checksum.to_le_bytes());
        // bytes [28..64) are reserved and left zeroed.
        out
    }

    pub fn decode(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < HEADER_LEN {
            return Err(CasError::format("extent::header", "truncated header"));
        }
        if &bytes[0..4] != MAGIC {
            return Err(CasError::format("extent::header", "bad magic"));
        }
        let version = u16::from_le_bytes(bytes[4..6].try_into().unwrap());
        if version != VERSION {
            return Err(CasError::format("extent::header", format!("unsupported version {version}")));
        }
        let flags = u16::from_le_bytes(bytes[6..8].try_into().unwrap());
        let page_size = u32::from_le_bytes(bytes[8..12].try_into().unwrap());
        let page_count = u32::from_le_bytes(bytes[12..16].try_into().unwrap());
        let payload_size = u32::from_le_bytes(bytes[16..20].try_into().unwrap());
        let checksum = u64::from_le_bytes(bytes[20..28].try_into().unwrap());
        Ok(Self { flags, page_size, page_count, payload_size, checksum })
    }
}

#[must_use]
pub fn bitmap_len(page_count: u32) -> usize {
    (page_count as usize).div_ceil(8)
}

#[must_use]
pub fn bitmap_set(bitmap: &mut [u8], index: usize) {
    bitmap[index / 8] |= 1 << (index % 8);
}

#[must_use]
pub fn bitmap_get(bitmap: &[u8], index: usize) -> bool {
    bitmap[index / 8] & (1 << (index % 8)) != 0
}

#[must_use]
pub fn checksum(payload: &[u8]) -> u64 {
    xxhash_rust::xxh64::xxh64(payload, 0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_round_trips() {
        let header = ExtentHeader {
            flags: FLAG_COMPRESSED,
            page_size: 4096,
            page_count: 16,
            payload_size: 2048,
            checksum: 0xdead_beef,
        };
        let encoded = header.encode();
        assert_eq!(encoded.len(), HEADER_LEN);
        let decoded = ExtentHeader::decode(&encoded).unwrap();
        assert_eq!(decoded.flags, header.flags);
        assert_eq!(decoded.page_count, header.page_count);
        assert_eq!(decoded.checksum, header.checksum);
        assert!(decoded.is_compressed());
    }

    #[test]
    fn bitmap_tracks_sparse_presence() {
        let mut bitmap = vec![0u8; bitmap_len(10)];
        bitmap_set(&mut bitmap, 3);
        bitmap_set(&mut bitmap, 9);
        assert!(bitmap_get(&bitmap, 3));
        assert!(bitmap_get(&bitmap, 9));
        assert!(!bitmap_get(&bitmap, 4));
    }
}
