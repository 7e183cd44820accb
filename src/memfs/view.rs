//! Defines the in-memory file view --- a growable byte buffer behind a
//! single reader-writer lock --- and the allocator producing it.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::clock::WallClock;
use crate::vfs::file::MODE_PERM_MASK;
use crate::vfs::{
    ErrorKind, File, FileInfo, FileType, FileView, OpenFile, OpenFlags, VfsResult, ViewAllocator,
    ViewStore,
};

struct ViewState {
    name: String,
    data: Vec<u8>,
    mode: u32,
    uid: u32,
    gid: u32,
    atime: crate::vfs::FileTime,
    mtime: crate::vfs::FileTime,
}

/// In-process byte buffer implementing [`FileView`].
///
/// Reads share the lock; writes and truncation are exclusive. Writes past
/// the current end grow the buffer and zero-fill the bytes they skip.
pub struct MemFileView {
    clock: Arc<dyn WallClock>,
    state: RwLock<ViewState>,
}

impl MemFileView {
    pub fn new(name: impl Into<String>, perm: u32, clock: Arc<dyn WallClock>) -> Arc<MemFileView> {
        let now = clock.now();
        Arc::new(MemFileView {
            clock,
            state: RwLock::new(ViewState {
                name: name.into(),
                data: Vec::new(),
                mode: perm & MODE_PERM_MASK,
                uid: 0,
                gid: 0,
                atime: now,
                mtime: now,
            }),
        })
    }

    async fn resize(&self, size: u64) -> VfsResult<()> {
        let size = usize::try_from(size).map_err(|_| ErrorKind::Invalid)?;
        let mut state = self.state.write().await;
        state.data.resize(size, 0);
        state.mtime = self.clock.now();
        Ok(())
    }

    async fn info(&self) -> FileInfo {
        let state = self.state.read().await;
        let name = state.name.rsplit(['/', '\\']).next().unwrap_or(&state.name).to_owned();
        FileInfo {
            name,
            size: state.data.len() as u64,
            mode: state.mode | FileType::Regular.mode_bits(),
            file_type: FileType::Regular,
            uid: state.uid,
            gid: state.gid,
            atime: state.atime,
            mtime: state.mtime,
            ident: None,
        }
    }
}

#[async_trait]
impl ViewStore for MemFileView {
    async fn size(&self) -> VfsResult<u64> {
        Ok(self.state.read().await.data.len() as u64)
    }

    async fn read_at(&self, buf: &mut [u8], offset: u64) -> VfsResult<usize> {
        let state = self.state.read().await;
        let len = state.data.len() as u64;
        if offset >= len {
            return Ok(0);
        }
        let start = offset as usize;
        let n = buf.len().min(state.data.len() - start);
        buf[..n].copy_from_slice(&state.data[start..start + n]);
        Ok(n)
    }

    async fn write_at(&self, buf: &[u8], offset: u64) -> VfsResult<usize> {
        let end = offset.checked_add(buf.len() as u64).ok_or(ErrorKind::Invalid)?;
        let end = usize::try_from(end).map_err(|_| ErrorKind::Invalid)?;
        let start = offset as usize;
        let mut state = self.state.write().await;
        if state.data.len() < end {
            state.data.resize(end, 0);
        }
        state.data[start..end].copy_from_slice(buf);
        state.mtime = self.clock.now();
        Ok(buf.len())
    }

    async fn truncate(&self, size: u64) -> VfsResult<()> {
        self.resize(size).await
    }

    async fn stat(&self) -> VfsResult<FileInfo> {
        Ok(self.info().await)
    }

    async fn set_mode(&self, mode: u32) -> VfsResult<()> {
        self.state.write().await.mode = mode & MODE_PERM_MASK;
        Ok(())
    }

    async fn set_owner(&self, uid: u32, gid: u32) -> VfsResult<()> {
        let mut state = self.state.write().await;
        state.uid = uid;
        state.gid = gid;
        Ok(())
    }
}

#[async_trait]
impl FileView for MemFileView {
    async fn open(self: Arc<Self>, flags: OpenFlags) -> VfsResult<Box<dyn File>> {
        let name = self.state.read().await.name.clone();
        Ok(Box::new(OpenFile::new(self, name, flags)))
    }

    async fn stat(&self) -> VfsResult<FileInfo> {
        Ok(self.info().await)
    }

    async fn truncate(&self, size: u64) -> VfsResult<()> {
        self.resize(size).await
    }

    async fn rename(&self, new_name: &str) -> VfsResult<()> {
        self.state.write().await.name = new_name.to_owned();
        Ok(())
    }

    async fn close(&self) -> VfsResult<()> {
        Ok(())
    }
}

/// Allocator producing [`MemFileView`] instances.
pub struct MemViewAllocator {
    clock: Arc<dyn WallClock>,
}

impl MemViewAllocator {
    pub fn new(clock: Arc<dyn WallClock>) -> MemViewAllocator {
        MemViewAllocator { clock }
    }
}

#[async_trait]
impl ViewAllocator for MemViewAllocator {
    async fn allocate(&self, path: &Path, perm: u32) -> VfsResult<Arc<dyn FileView>> {
        let name = path.to_string_lossy().into_owned();
        Ok(MemFileView::new(name, perm, self.clock.clone()))
    }
}
