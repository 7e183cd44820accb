//! Defines the read-only wrapper. Mutations are rejected on both the
//! filesystem surface and every handle it returns; reads and metadata
//! queries pass through unchanged.

use std::io::SeekFrom;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;

use crate::vfs::{
    ErrorKind, File, FileInfo, FileTime, Fs, OpenFlags, VfsError, VfsResult,
};

/// Wraps any filesystem, rejecting every mutating operation with a
/// read-only error.
pub struct ReadOnlyFs {
    inner: Arc<dyn Fs>,
}

impl ReadOnlyFs {
    pub fn new(inner: Arc<dyn Fs>) -> ReadOnlyFs {
        ReadOnlyFs { inner }
    }

    fn reject(op: &'static str, p: &Path) -> VfsError {
        VfsError::path(op, p.display().to_string(), ErrorKind::ReadOnly)
    }

    fn reject_link(op: &'static str, old: &Path, new: &Path) -> VfsError {
        VfsError::link(
            op,
            old.display().to_string(),
            new.display().to_string(),
            ErrorKind::ReadOnly,
        )
    }
}

#[async_trait]
impl Fs for ReadOnlyFs {
    fn name(&self) -> String {
        self.inner.name()
    }

    async fn open_file(&self, p: &Path, flags: OpenFlags, perm: u32) -> VfsResult<Box<dyn File>> {
        if flags.writable() || flags.truncate || flags.creating() {
            return Err(Self::reject("open", p));
        }
        let inner = self.inner.open_file(p, flags, perm).await?;
        Ok(Box::new(ReadOnlyFile { inner }))
    }

    async fn create(&self, p: &Path) -> VfsResult<Box<dyn File>> {
        Err(Self::reject("create", p))
    }

    async fn mkdir(&self, p: &Path, _perm: u32) -> VfsResult<()> {
        Err(Self::reject("mkdir", p))
    }

    async fn mkdir_all(&self, p: &Path, _perm: u32) -> VfsResult<()> {
        Err(Self::reject("mkdir", p))
    }

    async fn remove(&self, p: &Path) -> VfsResult<()> {
        Err(Self::reject("remove", p))
    }

    async fn remove_all(&self, p: &Path) -> VfsResult<()> {
        Err(Self::reject("removeall", p))
    }

    async fn rename(&self, old: &Path, new: &Path) -> VfsResult<()> {
        Err(Self::reject_link("rename", old, new))
    }

    async fn link(&self, old: &Path, new: &Path) -> VfsResult<()> {
        Err(Self::reject_link("link", old, new))
    }

    async fn symlink(&self, target: &Path, link: &Path) -> VfsResult<()> {
        Err(Self::reject_link("symlink", target, link))
    }

    async fn stat(&self, p: &Path) -> VfsResult<FileInfo> {
        self.inner.stat(p).await
    }

    async fn lstat(&self, p: &Path) -> VfsResult<FileInfo> {
        self.inner.lstat(p).await
    }

    async fn read_link(&self, p: &Path) -> VfsResult<PathBuf> {
        self.inner.read_link(p).await
    }

    async fn chmod(&self, p: &Path, _mode: u32) -> VfsResult<()> {
        Err(Self::reject("chmod", p))
    }

    async fn chown(&self, p: &Path, _uid: u32, _gid: u32) -> VfsResult<()> {
        Err(Self::reject("chown", p))
    }

    async fn lchown(&self, p: &Path, _uid: u32, _gid: u32) -> VfsResult<()> {
        Err(Self::reject("lchown", p))
    }

    async fn chtimes(&self, p: &Path, _atime: FileTime, _mtime: FileTime) -> VfsResult<()> {
        Err(Self::reject("chtimes", p))
    }

    async fn close(&self) -> VfsResult<()> {
        self.inner.close().await
    }
}

struct ReadOnlyFile {
    inner: Box<dyn File>,
}

impl ReadOnlyFile {
    fn reject(&self, op: &'static str) -> VfsError {
        VfsError::path(op, self.inner.name(), ErrorKind::ReadOnly)
    }
}

#[async_trait]
impl File for ReadOnlyFile {
    fn name(&self) -> String {
        self.inner.name()
    }

    async fn stat(&self) -> VfsResult<FileInfo> {
        self.inner.stat().await
    }

    async fn read(&self, buf: &mut [u8]) -> VfsResult<usize> {
        self.inner.read(buf).await
    }

    async fn read_at(&self, buf: &mut [u8], offset: u64) -> VfsResult<usize> {
        self.inner.read_at(buf, offset).await
    }

    async fn write(&self, _buf: &[u8]) -> VfsResult<usize> {
        Err(self.reject("write"))
    }

    async fn write_at(&self, _buf: &[u8], _offset: u64) -> VfsResult<usize> {
        Err(self.reject("writeat"))
    }

    async fn seek(&self, pos: SeekFrom) -> VfsResult<u64> {
        self.inner.seek(pos).await
    }

    async fn truncate(&self, _size: u64) -> VfsResult<()> {
        Err(self.reject("truncate"))
    }

    async fn chmod(&self, _mode: u32) -> VfsResult<()> {
        Err(self.reject("chmod"))
    }

    async fn chown(&self, _uid: u32, _gid: u32) -> VfsResult<()> {
        Err(self.reject("chown"))
    }

    async fn sync(&self) -> VfsResult<()> {
        self.inner.sync().await
    }

    async fn read_dir(&self, count: Option<usize>) -> VfsResult<Vec<FileInfo>> {
        self.inner.read_dir(count).await
    }

    async fn read_dir_names(&self, count: Option<usize>) -> VfsResult<Vec<String>> {
        self.inner.read_dir_names(count).await
    }

    async fn close(&self) -> VfsResult<()> {
        self.inner.close().await
    }
}
