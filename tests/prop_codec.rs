use std::sync::Arc;

use proptest::prelude::*;

use casfs::extent::{Compression, ExtentPacker, ExtentPackerConfig};
use casfs::hash::{from_hex, to_hex};
use casfs::storage::{InMemoryBlobStorage, InMemoryMetadataStore};
use casfs::zlib::{CompressOptions, compress, decompress};

const PAGE_SIZE: u32 = 16;

fn extent_packer() -> ExtentPacker {
    ExtentPacker::new(
        Arc::new(InMemoryBlobStorage::new()),
        Arc::new(InMemoryMetadataStore::new()),
        ExtentPackerConfig {
            page_size: PAGE_SIZE,
            extent_size: u64::from(PAGE_SIZE) * 4,
            compression: Compression::None,
            extents_base_dir: "extents".to_string(),
        },
    )
}

proptest! {
    #[test]
    fn hex_roundtrip(bytes in proptest::collection::vec(any::<u8>(), 0..256)) {
        let hex = to_hex(&bytes);
        let decoded = from_hex(&hex).unwrap();
        prop_assert_eq!(decoded, bytes);
    }

    #[test]
    fn zlib_roundtrip(bytes in proptest::collection::vec(any::<u8>(), 0..4096)) {
        let framed = compress(&bytes, CompressOptions::default()).unwrap();
        let unframed = decompress(&framed).unwrap();
        prop_assert_eq!(unframed, bytes);
    }

    #[test]
    fn vfs_path_normalize_never_panics(segments in proptest::collection::vec("[a-zA-Z0-9._]{0,8}", 0..6)) {
        let path = format!("/{}", segments.join("/"));
        let normalized = casfs::vfs::normalize(&path);
        prop_assert!(normalized.is_ok());
    }

    /// Writes a random sparse sequence of pages (some indices skipped) and
    /// asserts every written page reads back exactly, while untouched pages
    /// in between read back as absent, through an arbitrary flush boundary.
    #[test]
    fn extent_page_roundtrip_under_sparse_writes(
        writes in proptest::collection::vec(
            (0u32..12, proptest::collection::vec(any::<u8>(), PAGE_SIZE as usize..=PAGE_SIZE as usize)),
            1..16,
        )
    ) {
        let rt = tokio::runtime::Runtime::new().unwrap();
        let (last_write, reads): (
            std::collections::HashMap<u32, Vec<u8>>,
            std::collections::HashMap<u32, Option<Vec<u8>>>,
        ) = rt.block_on(async {
            let packer = extent_packer();
            let mut last_write: std::collections::HashMap<u32, Vec<u8>> = std::collections::HashMap::new();

            for (page_num, bytes) in &writes {
                packer.write_page(1, *page_num, bytes).await.unwrap();
                last_write.insert(*page_num, bytes.clone());
            }
            packer.flush_file(1).await.unwrap();

            let mut reads = std::collections::HashMap::new();
            for page_num in 0u32..12 {
                reads.insert(page_num, packer.read_page(1, page_num).await.unwrap());
            }
            (last_write, reads)
        });

        for (page_num, expected) in &last_write {
            prop_assert_eq!(reads.get(page_num).cloned().flatten(), Some(expected.clone()));
        }
        let touched: std::collections::HashSet<u32> = last_write.keys().copied().collect();
        for page_num in 0u32..12 {
            if !touched.contains(&page_num) {
                prop_assert_eq!(reads.get(&page_num).cloned().flatten(), None);
            }
        }
    }
}
