//! Defines the path-separator adapters. Each wrapper converts path
//! strings at its outer surface and delegates everything else unchanged.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;

use crate::path;
use crate::vfs::{File, FileInfo, FileTime, Fs, OpenFlags, VfsResult};

fn outer_to_os(p: &Path) -> PathBuf {
    match p.to_str() {
        Some(s) => path::from_slash(s),
        None => p.to_path_buf(),
    }
}

fn outer_to_slash(p: &Path) -> PathBuf {
    match path::to_slash(p) {
        Ok(s) => PathBuf::from(s),
        Err(_) => p.to_path_buf(),
    }
}

/// Accepts slash-form paths at the outer surface and hands the wrapped
/// filesystem platform-form paths.
pub struct OsPathFs {
    inner: Arc<dyn Fs>,
}

impl OsPathFs {
    pub fn new(inner: Arc<dyn Fs>) -> OsPathFs {
        OsPathFs { inner }
    }
}

#[async_trait]
impl Fs for OsPathFs {
    fn name(&self) -> String {
        self.inner.name()
    }

    async fn open_file(&self, p: &Path, flags: OpenFlags, perm: u32) -> VfsResult<Box<dyn File>> {
        self.inner.open_file(&outer_to_os(p), flags, perm).await
    }

    async fn mkdir(&self, p: &Path, perm: u32) -> VfsResult<()> {
        self.inner.mkdir(&outer_to_os(p), perm).await
    }

    async fn mkdir_all(&self, p: &Path, perm: u32) -> VfsResult<()> {
        self.inner.mkdir_all(&outer_to_os(p), perm).await
    }

    async fn remove(&self, p: &Path) -> VfsResult<()> {
        self.inner.remove(&outer_to_os(p)).await
    }

    async fn remove_all(&self, p: &Path) -> VfsResult<()> {
        self.inner.remove_all(&outer_to_os(p)).await
    }

    async fn rename(&self, old: &Path, new: &Path) -> VfsResult<()> {
        self.inner.rename(&outer_to_os(old), &outer_to_os(new)).await
    }

    async fn link(&self, old: &Path, new: &Path) -> VfsResult<()> {
        self.inner.link(&outer_to_os(old), &outer_to_os(new)).await
    }

    async fn symlink(&self, target: &Path, link: &Path) -> VfsResult<()> {
        self.inner.symlink(&outer_to_os(target), &outer_to_os(link)).await
    }

    async fn stat(&self, p: &Path) -> VfsResult<FileInfo> {
        self.inner.stat(&outer_to_os(p)).await
    }

    async fn lstat(&self, p: &Path) -> VfsResult<FileInfo> {
        self.inner.lstat(&outer_to_os(p)).await
    }

    async fn read_link(&self, p: &Path) -> VfsResult<PathBuf> {
        let target = self.inner.read_link(&outer_to_os(p)).await?;
        Ok(outer_to_slash(&target))
    }

    async fn chmod(&self, p: &Path, mode: u32) -> VfsResult<()> {
        self.inner.chmod(&outer_to_os(p), mode).await
    }

    async fn chown(&self, p: &Path, uid: u32, gid: u32) -> VfsResult<()> {
        self.inner.chown(&outer_to_os(p), uid, gid).await
    }

    async fn lchown(&self, p: &Path, uid: u32, gid: u32) -> VfsResult<()> {
        self.inner.lchown(&outer_to_os(p), uid, gid).await
    }

    async fn chtimes(&self, p: &Path, atime: FileTime, mtime: FileTime) -> VfsResult<()> {
        self.inner.chtimes(&outer_to_os(p), atime, mtime).await
    }

    async fn close(&self) -> VfsResult<()> {
        self.inner.close().await
    }
}

/// Accepts platform-form paths at the outer surface and hands the wrapped
/// filesystem slash-form paths.
pub struct SlashPathFs {
    inner: Arc<dyn Fs>,
}

impl SlashPathFs {
    pub fn new(inner: Arc<dyn Fs>) -> SlashPathFs {
        SlashPathFs { inner }
    }
}

#[async_trait]
impl Fs for SlashPathFs {
    fn name(&self) -> String {
        self.inner.name()
    }

    async fn open_file(&self, p: &Path, flags: OpenFlags, perm: u32) -> VfsResult<Box<dyn File>> {
        self.inner.open_file(&outer_to_slash(p), flags, perm).await
    }

    async fn mkdir(&self, p: &Path, perm: u32) -> VfsResult<()> {
        self.inner.mkdir(&outer_to_slash(p), perm).await
    }

    async fn mkdir_all(&self, p: &Path, perm: u32) -> VfsResult<()> {
        self.inner.mkdir_all(&outer_to_slash(p), perm).await
    }

    async fn remove(&self, p: &Path) -> VfsResult<()> {
        self.inner.remove(&outer_to_slash(p)).await
    }

    async fn remove_all(&self, p: &Path) -> VfsResult<()> {
        self.inner.remove_all(&outer_to_slash(p)).await
    }

    async fn rename(&self, old: &Path, new: &Path) -> VfsResult<()> {
        self.inner.rename(&outer_to_slash(old), &outer_to_slash(new)).await
    }

    async fn link(&self, old: &Path, new: &Path) -> VfsResult<()> {
        self.inner.link(&outer_to_slash(old), &outer_to_slash(new)).await
    }

    async fn symlink(&self, target: &Path, link: &Path) -> VfsResult<()> {
        self.inner.symlink(&outer_to_slash(target), &outer_to_slash(link)).await
    }

    async fn stat(&self, p: &Path) -> VfsResult<FileInfo> {
        self.inner.stat(&outer_to_slash(p)).await
    }

    async fn lstat(&self, p: &Path) -> VfsResult<FileInfo> {
        self.inner.lstat(&outer_to_slash(p)).await
    }

    async fn read_link(&self, p: &Path) -> VfsResult<PathBuf> {
        let target = self.inner.read_link(&outer_to_slash(p)).await?;
        Ok(outer_to_os(&target))
    }

    async fn chmod(&self, p: &Path, mode: u32) -> VfsResult<()> {
        self.inner.chmod(&outer_to_slash(p), mode).await
    }

    async fn chown(&self, p: &Path, uid: u32, gid: u32) -> VfsResult<()> {
        self.inner.chown(&outer_to_slash(p), uid, gid).await
    }

    async fn lchown(&self, p: &Path, uid: u32, gid: u32) -> VfsResult<()> {
        self.inner.lchown(&outer_to_slash(p), uid, gid).await
    }

    async fn chtimes(&self, p: &Path, atime: FileTime, mtime: FileTime) -> VfsResult<()> {
        self.inner.chtimes(&outer_to_slash(p), atime, mtime).await
    }

    async fn close(&self) -> VfsResult<()> {
        self.inner.close().await
    }
}
