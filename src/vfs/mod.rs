//! POSIX-like page-VFS (component J): a filesystem surface over the extent
//! packer. State shape follows the design notes' "single map path→metadata
//! plus a directories set" recommendation, collapsed into one
//! `HashMap<String, Entry>` keyed by normalized path (directory-ness lives
//! in `Entry::kind`), the way `recovery::wasp::tree::CowTree` keeps one node
//! map rather than separate indexes per kind.

mod flags;
mod path;

pub use flags::OpenFlags;
pub use path::normalize;

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use parking_lot::RwLock;
use serde::Serialize;

use crate::errors::{CasError, Result, VfsErrno};
use crate::extent::ExtentPacker;

pub const S_IFREG: u32 = 0o100_000;
pub const S_IFDIR: u32 = 0o040_000;
pub const S_IFLNK: u32 = 0o120_000;

fn now_ms() -> i64 {
    SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_millis() as i64).unwrap_or(0)
}

#[derive(Debug, Clone)]
enum EntryKind {
    Directory,
    File { file_id: u64 },
    Symlink { target: String },
}

#[derive(Debug, Clone)]
struct Entry {
    kind: EntryKind,
    mode: u32,
    size: u64,
    inode: u64,
    atime_ms: i64,
    mtime_ms: i64,
    ctime_ms: i64,
    birthtime_ms: i64,
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct Stat {
    pub size: u64,
    pub mode: u32,
    pub inode: u64,
    pub atime_ms: i64,
    pub mtime_ms: i64,
    pub ctime_ms: i64,
    pub birthtime_ms: i64,
    pub blocks: u64,
}

fn stat_of(entry: &Entry) -> Stat {
    Stat {
        size: entry.size,
        mode: entry.mode,
        inode: entry.inode,
        atime_ms: entry.atime_ms,
        mtime_ms: entry.mtime_ms,
        ctime_ms: entry.ctime_ms,
        birthtime_ms: entry.birthtime_ms,
        blocks: entry.size.div_ceil(512),
    }
}

struct OpenFd {
    path: String,
    file_id: u64,
    flags: OpenFlags,
    position: u64,
    mode: u32,
}

#[derive(Debug, Clone)]
pub struct MkdirOptions {
    pub recursive: bool,
    pub mode: u32,
}

impl Default for MkdirOptions {
    fn default() -> Self {
        Self { recursive: false, mode: 0o755 }
    }
}

pub struct Vfs {
    packer: Arc<ExtentPacker>,
    tree: RwLock<HashMap<String, Entry>>,
    fds: RwLock<HashMap<u32, OpenFd>>,
    fd_counter: AtomicU32,
    inode_counter: AtomicU64,
    next_file_id: AtomicU64,
}

impl Vfs {
    #[must_use]
    pub fn new(packer: Arc<ExtentPacker>) -> Self {
        let mut tree = HashMap::new();
        let now = now_ms();
        tree.insert(
            "/".to_string(),
            Entry {
                kind: EntryKind::Directory,
                mode: S_IFDIR | 0o755,
                size: 0,
                inode: 1,
                atime_ms: now,
                mtime_ms: now,
                ctime_ms: now,
                birthtime_ms: now,
            },
        );
        Self {
            packer,
            tree: RwLock::new(tree),
            fds: RwLock::new(HashMap::new()),
            fd_counter: AtomicU32::new(3),
            inode_counter: AtomicU64::new(2),
            next_file_id: AtomicU64::new(1),
        }
    }

    fn parent_of(path: &str) -> String {
        if path == "/" {
            return "/".to_string();
        }
        match path.rfind('/') {
            Some(0) => "/".to_string(),
            Some(idx) => path[..idx].to_string(),
            None => "/".to_string(),
        }
    }

    fn parent_exists_as_dir(&self, path: &str) -> bool {
        let parent = Self::parent_of(path);
        matches!(self.tree.read().get(&parent), Some(e) if matches!(e.kind, EntryKind::Directory))
    }

    pub fn open(&self, path: &str, flags: OpenFlags, mode: u32) -> Result<u32> {
        let path = normalize(path)?;
        let mut tree = self.tree.write();

        if let Some(existing) = tree.get(&path) {
            if matches!(existing.kind, EntryKind::Directory) {
                return Err(CasError::wrong_kind("vfs::open", path, VfsErrno::EISDIR));
            }
            if flags.exclusive() {
                return Err(CasError::already_exists("vfs::open", path));
            }
        } else {
            if !flags.creates() {
                return Err(CasError::not_found("vfs::open", path));
            }
            drop(tree);
            if !self.parent_exists_as_dir(&path) {
                return Err(CasError::not_found("vfs::open", Self::parent_of(&path)));
            }
            tree = self.tree.write();
            let now = now_ms();
            let inode = self.inode_counter.fetch_add(1, Ordering::Relaxed);
            let file_id = self.next_file_id.fetch_add(1, Ordering::Relaxed);
            tree.insert(
                path.clone(),
                Entry {
                    kind: EntryKind::File { file_id },
                    mode: S_IFREG | (mode & 0o7777),
                    size: 0,
                    inode,
                    atime_ms: now,
                    mtime_ms: now,
                    ctime_ms: now,
                    birthtime_ms: now,
                },
            );
        }

        let entry = tree.get_mut(&path).expect("entry just inserted or found");
        let EntryKind::File { file_id } = entry.kind else {
            return Err(CasError::wrong_kind("vfs::open", path, VfsErrno::EISDIR));
        };

        if flags.truncates() {
            entry.size = 0;
            entry.mtime_ms = now_ms();
            entry.ctime_ms = entry.mtime_ms;
        }
        let position = if flags.appends() { entry.size } else { 0 };
        let file_mode = entry.mode;
        drop(tree);

        let fd = self.fd_counter.fetch_add(1, Ordering::Relaxed);
        self.fds.write().insert(fd, OpenFd { path, file_id, flags, position, mode: file_mode });
        Ok(fd)
    }

    pub fn close(&self, fd: u32) -> Result<()> {
        self.fds
            .write()
            .remove(&fd)
            .map(|_| ())
            .ok_or_else(|| CasError::posix("vfs::close", fd.to_string(), VfsErrno::EBADF))
    }

    pub async fn read(&self, fd: u32, len: usize, pos: Option<u64>) -> Result<Vec<u8>> {
        let (file_id, path, read_pos) = {
            let mut fds = self.fds.write();
            let entry = fds
                .get_mut(&fd)
                .ok_or_else(|| CasError::posix("vfs::read", fd.to_string(), VfsErrno::EBADF))?;
            if !entry.flags.readable() {
                return Err(CasError::posix("vfs::read", fd.to_string(), VfsErrno::EINVAL));
            }
            let read_pos = pos.unwrap_or(entry.position);
            (entry.file_id, entry.path.clone(), read_pos)
        };

        let file_size = {
            let tree = self.tree.read();
            tree.get(&path).map(|e| e.size).unwrap_or(0)
        };

        let page_size = u64::from(self.packer.page_size());
        let mut out = Vec::with_capacity(len);
        let mut remaining = len as u64;
        let mut cursor = read_pos;

        while remaining > 0 && cursor < file_size {
            let page_num = (cursor / page_size) as u32;
            let page_offset = (cursor % page_size) as usize;
            let page = self.packer.read_page(file_id, page_num).await?;
            let page_bytes = page.unwrap_or_else(|| vec![0u8; page_size as usize]);
            let available = (page_size as usize - page_offset).min(remaining as usize);
            let clamp = (file_size - cursor).min(available as u64) as usize;
            out.extend_from_slice(&page_bytes[page_offset..page_offset + clamp]);
            cursor += clamp as u64;
            remaining -= clamp as u64;
            if clamp < available {
                break;
            }
        }

        if pos.is_none() {
            if let Some(entry) = self.fds.write().get_mut(&fd) {
                entry.position = cursor;
            }
        }
        if let Some(entry) = self.tree.write().get_mut(&path) {
            entry.atime_ms = now_ms();
        }
        Ok(out)
    }

    pub async fn write(&self, fd: u32, bytes: &[u8], pos: Option<u64>) -> Result<usize> {
        let (file_id, path, write_pos) = {
            let mut fds = self.fds.write();
            let entry = fds
                .get_mut(&fd)
                .ok_or_else(|| CasError::posix("vfs::write", fd.to_string(), VfsErrno::EBADF))?;
            if !entry.flags.writable() {
                return Err(CasError::posix("vfs::write", fd.to_string(), VfsErrno::EBADF));
            }
            let write_pos = if entry.flags.appends() {
                let size = self.tree.read().get(&entry.path).map(|e| e.size).unwrap_or(0);
                entry.position = size;
                size
            } else {
                pos.unwrap_or(entry.position)
            };
            (entry.file_id, entry.path.clone(), write_pos)
        };

        let page_size = u64::from(self.packer.page_size()) as usize;
        let mut cursor = write_pos;
        let mut written = 0usize;
        let mut remaining = bytes.len();

        while remaining > 0 {
            let page_num = (cursor / page_size as u64) as u32;
            let page_offset = (cursor % page_size as u64) as usize;
            let take = (page_size - page_offset).min(remaining);

            let mut page = if page_offset != 0 || take < page_size {
                self.packer
                    .read_page(file_id, page_num)
                    .await?
                    .unwrap_or_else(|| vec![0u8; page_size])
            } else {
                vec![0u8; page_size]
            };

            page[page_offset..page_offset + take]
                .copy_from_slice(&bytes[written..written + take]);
            self.packer.write_page(file_id, page_num, &page).await?;

            cursor += take as u64;
            written += take;
            remaining -= take;
        }

        let new_size = write_pos + written as u64;
        {
            let mut tree = self.tree.write();
            if let Some(entry) = tree.get_mut(&path) {
                if new_size > entry.size {
                    entry.size = new_size;
                }
                let now = now_ms();
                entry.mtime_ms = now;
                entry.ctime_ms = now;
            }
        }
        self.packer.set_file_size(file_id, new_size).await?;

        if pos.is_none() {
            if let Some(entry) = self.fds.write().get_mut(&fd) {
                entry.position = cursor;
            }
        }
        Ok(written)
    }

    pub async fn read_file(&self, path: &str) -> Result<Vec<u8>> {
        let path = normalize(path)?;
        let size = {
            let tree = self.tree.read();
            let entry = tree
                .get(&path)
                .ok_or_else(|| CasError::not_found("vfs::read_file", path.clone()))?;
            if matches!(entry.kind, EntryKind::Directory) {
                return Err(CasError::wrong_kind("vfs::read_file", path, VfsErrno::EISDIR));
            }
            entry.size
        };
        let fd = self.open(&path, OpenFlags::parse("r")?, 0o644)?;
        let result = self.read(fd, size as usize, Some(0)).await;
        self.close(fd)?;
        result
    }

    pub async fn write_file(&self, path: &str, data: &[u8], mode: u32) -> Result<()> {
        let fd = self.open(path, OpenFlags::parse("w")?, mode)?;
        let result = self.write(fd, data, Some(0)).await;
        self.close(fd)?;
        result.map(|_| ())
    }

    pub async fn truncate(&self, path: &str, len: u64) -> Result<()> {
        let path = normalize(path)?;
        let file_id = {
            let mut tree = self.tree.write();
            let entry = tree
                .get_mut(&path)
                .ok_or_else(|| CasError::not_found("vfs::truncate", path.clone()))?;
            let EntryKind::File { file_id } = entry.kind else {
                return Err(CasError::wrong_kind("vfs::truncate", path, VfsErrno::EISDIR));
            };
            entry.size = len;
            let now = now_ms();
            entry.mtime_ms = now;
            entry.ctime_ms = now;
            file_id
        };
        self.packer.truncate(file_id, len).await
    }

    pub fn mkdir(&self, path: &str, opts: MkdirOptions) -> Result<()> {
        let path = normalize(path)?;
        let mut tree = self.tree.write();

        if tree.contains_key(&path) {
            if opts.recursive {
                return Ok(());
            }
            return Err(CasError::already_exists("vfs::mkdir", path));
        }

        let mut segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
        if !opts.recursive {
            segments.pop();
        }
        let parent = Self::parent_of(&path);
        if !opts.recursive && !matches!(tree.get(&parent), Some(e) if matches!(e.kind, EntryKind::Directory))
        {
            return Err(CasError::not_found("vfs::mkdir", parent));
        }

        let mut built = String::new();
        let mut to_create = Vec::new();
        for seg in &segments {
            built.push('/');
            built.push_str(seg);
            if !tree.contains_key(&built) {
                to_create.push(built.clone());
            }
        }
        if opts.recursive {
            to_create.push(path.clone());
            to_create.dedup();
        }

        let now = now_ms();
        for dir_path in to_create {
            let inode = self.inode_counter.fetch_add(1, Ordering::Relaxed);
            tree.insert(
                dir_path,
                Entry {
                    kind: EntryKind::Directory,
                    mode: S_IFDIR | (opts.mode & 0o7777),
                    size: 0,
                    inode,
                    atime_ms: now,
                    mtime_ms: now,
                    ctime_ms: now,
                    birthtime_ms: now,
                },
            );
        }
        Ok(())
    }

    #[must_use]
    pub fn readdir(&self, path: &str) -> Result<Vec<String>> {
        let path = normalize(path)?;
        let tree = self.tree.read();
        let entry =
            tree.get(&path).ok_or_else(|| CasError::not_found("vfs::readdir", path.clone()))?;
        if !matches!(entry.kind, EntryKind::Directory) {
            return Err(CasError::wrong_kind("vfs::readdir", path, VfsErrno::ENOTDIR));
        }
        let prefix = if path == "/" { "/".to_string() } else { format!("{path}/") };
        let mut children: Vec<String> = tree
            .keys()
            .filter(|k| {
                k.starts_with(&prefix)
                    && !k[prefix.len()..].contains('/')
                    && k.as_str() != path
            })
            .map(|k| k[prefix.len()..].to_string())
            .collect();
        children.sort();
        Ok(children)
    }

    pub fn rmdir(&self, path: &str) -> Result<()> {
        let path = normalize(path)?;
        if path == "/" {
            return Err(CasError::invalid("vfs::rmdir", "cannot remove root"));
        }
        let mut tree = self.tree.write();
        let entry =
            tree.get(&path).ok_or_else(|| CasError::not_found("vfs::rmdir", path.clone()))?;
        if !matches!(entry.kind, EntryKind::Directory) {
            return Err(CasError::wrong_kind("vfs::rmdir", path, VfsErrno::ENOTDIR));
        }
        let prefix = format!("{path}/");
        if tree.keys().any(|k| k.starts_with(&prefix)) {
            return Err(CasError::posix("vfs::rmdir", path, VfsErrno::ENOTEMPTY));
        }
        tree.remove(&path);
        Ok(())
    }

    pub async fn rename(&self, old: &str, new: &str) -> Result<()> {
        let old = normalize(old)?;
        let new = normalize(new)?;
        let mut tree = self.tree.write();

        let old_entry =
            tree.get(&old).cloned().ok_or_else(|| CasError::not_found("vfs::rename", old.clone()))?;

        match tree.get(&new) {
            Some(existing) if matches!(existing.kind, EntryKind::Directory) => {
                if !matches!(old_entry.kind, EntryKind::Directory) {
                    return Err(CasError::wrong_kind("vfs::rename", new, VfsErrno::EISDIR));
                }
                let prefix = format!("{new}/");
                if tree.keys().any(|k| k.starts_with(&prefix)) {
                    return Err(CasError::posix("vfs::rename", new, VfsErrno::ENOTEMPTY));
                }
            }
            Some(_) if matches!(old_entry.kind, EntryKind::Directory) => {
                return Err(CasError::already_exists("vfs::rename", new));
            }
            _ => {}
        }

        if matches!(old_entry.kind, EntryKind::Directory) {
            let old_prefix = format!("{old}/");
            let descendants: Vec<String> =
                tree.keys().filter(|k| k.starts_with(&old_prefix)).cloned().collect();
            for descendant in descendants {
                if let Some(e) = tree.remove(&descendant) {
                    let rest = &descendant[old_prefix.len()..];
                    tree.insert(format!("{new}/{rest}"), e);
                }
            }
        }
        tree.remove(&old);
        tree.insert(new, old_entry);
        Ok(())
    }

    pub fn unlink(&self, path: &str) -> Result<()> {
        let path = normalize(path)?;
        let mut tree = self.tree.write();
        let entry =
            tree.get(&path).ok_or_else(|| CasError::not_found("vfs::unlink", path.clone()))?;
        if matches!(entry.kind, EntryKind::Directory) {
            return Err(CasError::wrong_kind("vfs::unlink", path, VfsErrno::EISDIR));
        }
        tree.remove(&path);
        Ok(())
    }

    #[must_use]
    pub fn exists(&self, path: &str) -> bool {
        normalize(path).ok().is_some_and(|p| self.tree.read().contains_key(&p))
    }

    pub fn lstat(&self, path: &str) -> Result<Stat> {
        let path = normalize(path)?;
        let tree = self.tree.read();
        let entry =
            tree.get(&path).ok_or_else(|| CasError::not_found("vfs::lstat", path.clone()))?;
        Ok(stat_of(entry))
    }

    pub fn fstat(&self, fd: u32) -> Result<Stat> {
        let path = self
            .fds
            .read()
            .get(&fd)
            .map(|f| f.path.clone())
            .ok_or_else(|| CasError::posix("vfs::fstat", fd.to_string(), VfsErrno::EBADF))?;
        self.lstat(&path)
    }

    pub fn chmod(&self, path: &str, mode: u32) -> Result<()> {
        let path = normalize(path)?;
        let mut tree = self.tree.write();
        let entry =
            tree.get_mut(&path).ok_or_else(|| CasError::not_found("vfs::chmod", path.clone()))?;
        let type_bits = entry.mode & !0o7777;
        entry.mode = type_bits | (mode & 0o7777);
        entry.ctime_ms = now_ms();
        Ok(())
    }

    pub fn utimes(&self, path: &str, atime_ms: i64, mtime_ms: i64) -> Result<()> {
        let path = normalize(path)?;
        let mut tree = self.tree.write();
        let entry =
            tree.get_mut(&path).ok_or_else(|| CasError::not_found("vfs::utimes", path.clone()))?;
        entry.atime_ms = atime_ms;
        entry.mtime_ms = mtime_ms;
        Ok(())
    }

    pub fn symlink(&self, target: &str, path: &str) -> Result<()> {
        let path = normalize(path)?;
        let mut tree = self.tree.write();
        if tree.contains_key(&path) {
            return Err(CasError::already_exists("vfs::symlink", path));
        }
        drop(tree);
        if !self.parent_exists_as_dir(&path) {
            return Err(CasError::not_found("vfs::symlink", Self::parent_of(&path)));
        }
        tree = self.tree.write();
        let now = now_ms();
        let inode = self.inode_counter.fetch_add(1, Ordering::Relaxed);
        tree.insert(
            path,
            Entry {
                kind: EntryKind::Symlink { target: target.to_string() },
                mode: S_IFLNK | 0o777,
                size: target.len() as u64,
                inode,
                atime_ms: now,
                mtime_ms: now,
                ctime_ms: now,
                birthtime_ms: now,
            },
        );
        Ok(())
    }

    pub fn readlink(&self, path: &str) -> Result<String> {
        let path = normalize(path)?;
        let tree = self.tree.read();
        let entry =
            tree.get(&path).ok_or_else(|| CasError::not_found("vfs::readlink", path.clone()))?;
        match &entry.kind {
            EntryKind::Symlink { target } => Ok(target.clone()),
            _ => Err(CasError::posix("vfs::readlink", path, VfsErrno::EINVAL)),
        }
    }

    /// No-op relative to the metadata store's own durability, matching the
    /// teacher's choice of `flush()` over `sync_data()` on every append.
    pub fn fsync(&self, fd: u32) -> Result<()> {
        if self.fds.read().contains_key(&fd) {
            Ok(())
        } else {
            Err(CasError::posix("vfs::fsync", fd.to_string(), VfsErrno::EBADF))
        }
    }

    pub async fn flush(&self, file_id: u64) -> Result<()> {
        self.packer.flush_file(file_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extent::{ExtentPacker, ExtentPackerConfig};
    use crate::storage::{InMemoryBlobStorage, InMemoryMetadataStore};

    fn vfs() -> Vfs {
        let packer = ExtentPacker::new(
            Arc::new(InMemoryBlobStorage::new()),
            Arc::new(InMemoryMetadataStore::new()),
            ExtentPackerConfig { page_size: 16, extent_size: 16 * 4, ..Default::default() },
        );
        Vfs::new(Arc::new(packer))
    }

    #[tokio::test]
    async fn write_then_read_reproduces_bytes_with_leading_zeros() {
        let v = vfs();
        let fd = v.open("/a.txt", OpenFlags::parse("w").unwrap(), 0o644).unwrap();
        v.write(fd, b"hello", Some(5)).await.unwrap();
        v.close(fd).unwrap();

        let stat = v.lstat("/a.txt").unwrap();
        assert_eq!(stat.size, 10);

        let data = v.read_file("/a.txt").await.unwrap();
        assert_eq!(data, b"\0\0\0\0\0hello");
    }

    #[tokio::test]
    async fn readdir_lists_immediate_children_sorted() {
        let v = vfs();
        v.mkdir("/dir", MkdirOptions::default()).unwrap();
        v.write_file("/dir/b.txt", b"b", 0o644).await.unwrap();
        v.write_file("/dir/a.txt", b"a", 0o644).await.unwrap();
        assert_eq!(v.readdir("/dir").unwrap(), vec!["a.txt", "b.txt"]);
    }

    #[tokio::test]
    async fn rename_preserves_descendant_reachability() {
        let v = vfs();
        v.mkdir("/dir", MkdirOptions::default()).unwrap();
        v.write_file("/dir/f.txt", b"x", 0o644).await.unwrap();
        v.rename("/dir", "/dir2").await.unwrap();
        assert!(v.exists("/dir2/f.txt"));
        assert!(!v.exists("/dir"));
    }

    #[test]
    fn rmdir_rejects_non_empty() {
        let v = vfs();
        v.mkdir("/dir", MkdirOptions::default()).unwrap();
        v.symlink("target", "/dir/link").unwrap();
        assert!(v.rmdir("/dir").is_err());
    }

    #[tokio::test]
    async fn unaligned_write_spanning_multiple_pages_writes_every_byte() {
        let v = vfs();
        let fd = v.open("/b.bin", OpenFlags::parse("w").unwrap(), 0o644).unwrap();
        let payload: Vec<u8> = (0..20u8).collect();
        let written = v.write(fd, &payload, Some(10)).await.unwrap();
        v.close(fd).unwrap();

        assert_eq!(written, 20);
        let data = v.read_file("/b.bin").await.unwrap();
        assert_eq!(data.len(), 30);
        assert_eq!(&data[10..30], &payload[..]);
    }
}
