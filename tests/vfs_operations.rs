use std::sync::Arc;

use casfs::extent::{ExtentPacker, ExtentPackerConfig};
use casfs::storage::{InMemoryBlobStorage, InMemoryMetadataStore};
use casfs::vfs::{MkdirOptions, OpenFlags, Vfs};

fn vfs() -> Vfs {
    let backend = Arc::new(InMemoryBlobStorage::new());
    let metadata = Arc::new(InMemoryMetadataStore::new());
    let packer = Arc::new(ExtentPacker::new(
        backend,
        metadata,
        ExtentPackerConfig { page_size: 64, extent_size: 256, ..Default::default() },
    ));
    Vfs::new(packer)
}

#[tokio::test]
async fn write_file_then_read_file_roundtrips() {
    let vfs = vfs();
    vfs.write_file("/greeting.txt", b"hello, vfs", 0o644).await.unwrap();
    let data = vfs.read_file("/greeting.txt").await.unwrap();
    assert_eq!(data, b"hello, vfs");
}

#[tokio::test]
async fn partial_write_does_not_clobber_neighboring_bytes() {
    let vfs = vfs();
    vfs.write_file("/data.bin", &[0xAA; 200], 0o644).await.unwrap();

    let fd = vfs.open("/data.bin", OpenFlags::parse("r+").unwrap(), 0o644).unwrap();
    vfs.write(fd, &[0xBB; 10], Some(50)).await.unwrap();
    vfs.close(fd).unwrap();

    let data = vfs.read_file("/data.bin").await.unwrap();
    assert_eq!(&data[0..50], &[0xAA; 50]);
    assert_eq!(&data[50..60], &[0xBB; 10]);
    assert_eq!(&data[60..200], &[0xAA; 140]);
}

#[tokio::test]
async fn mkdir_recursive_then_readdir_lists_children() {
    let vfs = vfs();
    vfs.mkdir("/a/b/c", MkdirOptions { recursive: true, ..Default::default() }).unwrap();
    vfs.write_file("/a/b/file.txt", b"x", 0o644).await.unwrap();

    let children = vfs.readdir("/a/b").unwrap();
    assert_eq!(children, vec!["c".to_string(), "file.txt".to_string()]);
}

#[tokio::test]
async fn rename_directory_preserves_descendants() {
    let vfs = vfs();
    vfs.mkdir("/src", MkdirOptions::default()).unwrap();
    vfs.write_file("/src/leaf.txt", b"keep me", 0o644).await.unwrap();

    vfs.rename("/src", "/dst").await.unwrap();

    assert!(!vfs.exists("/src"));
    assert!(vfs.exists("/dst/leaf.txt"));
    let data = vfs.read_file("/dst/leaf.txt").await.unwrap();
    assert_eq!(data, b"keep me");
}

#[tokio::test]
async fn unlink_removes_file_but_not_directory() {
    let vfs = vfs();
    vfs.mkdir("/dir", MkdirOptions::default()).unwrap();
    vfs.write_file("/dir/f.txt", b"y", 0o644).await.unwrap();
    vfs.unlink("/dir/f.txt").unwrap();

    assert!(!vfs.exists("/dir/f.txt"));
    assert!(vfs.exists("/dir"));
}

#[tokio::test]
async fn lstat_reports_size_and_file_mode() {
    let vfs = vfs();
    vfs.write_file("/sized.txt", b"0123456789", 0o644).await.unwrap();
    let stat = vfs.lstat("/sized.txt").unwrap();
    assert_eq!(stat.size, 10);
    assert_eq!(stat.blocks, 1);
}

#[tokio::test]
async fn symlink_readlink_roundtrips() {
    let vfs = vfs();
    vfs.write_file("/target.txt", b"z", 0o644).await.unwrap();
    vfs.symlink("/target.txt", "/link.txt").unwrap();
    assert_eq!(vfs.readlink("/link.txt").unwrap(), "/target.txt");
}
