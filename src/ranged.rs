//! Defines a windowed, read-only view over another file view.

use std::io::SeekFrom;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::vfs::{
    ErrorKind, File, FileInfo, FileView, OpenFlags, VfsError, VfsResult,
};

/// A `[offset, offset + len)` window over another [`FileView`].
///
/// Construction verifies that the underlying view supports random-access
/// reads by trial-reading a single byte. Handles opened on the window read
/// only inside it and refuse every mutation with a read-only error; the
/// reported size equals the window length.
pub struct RangedView {
    inner: Arc<dyn FileView>,
    offset: u64,
    len: u64,
}

impl RangedView {
    pub async fn new(
        inner: Arc<dyn FileView>,
        offset: u64,
        len: u64,
    ) -> VfsResult<Arc<RangedView>> {
        let probe = inner.clone().open(OpenFlags::read_only()).await?;
        let mut byte = [0u8; 1];
        probe.read_at(&mut byte, offset).await?;
        probe.close().await?;
        Ok(Arc::new(RangedView { inner, offset, len }))
    }
}

#[async_trait]
impl FileView for RangedView {
    async fn open(self: Arc<Self>, _flags: OpenFlags) -> VfsResult<Box<dyn File>> {
        let inner = self.inner.clone().open(OpenFlags::read_only()).await?;
        Ok(Box::new(RangedFile {
            inner,
            offset: self.offset,
            len: self.len,
            pos: Mutex::new(0),
        }))
    }

    async fn stat(&self) -> VfsResult<FileInfo> {
        let mut info = self.inner.stat().await?;
        info.size = self.len;
        Ok(info)
    }

    async fn truncate(&self, _size: u64) -> VfsResult<()> {
        Err(VfsError::Kind(ErrorKind::ReadOnly))
    }

    async fn rename(&self, new_name: &str) -> VfsResult<()> {
        self.inner.rename(new_name).await
    }

    async fn close(&self) -> VfsResult<()> {
        self.inner.close().await
    }
}

struct RangedFile {
    inner: Box<dyn File>,
    offset: u64,
    len: u64,
    pos: Mutex<u64>,
}

impl RangedFile {
    fn fail(&self, op: &'static str, kind: ErrorKind) -> VfsError {
        VfsError::path(op, self.inner.name(), kind)
    }

    async fn window_read(&self, buf: &mut [u8], at: u64) -> VfsResult<usize> {
        if at >= self.len {
            return Ok(0);
        }
        let want = (buf.len() as u64).min(self.len - at) as usize;
        self.inner.read_at(&mut buf[..want], self.offset + at).await
    }
}

#[async_trait]
impl File for RangedFile {
    fn name(&self) -> String {
        self.inner.name()
    }

    async fn stat(&self) -> VfsResult<FileInfo> {
        let mut info = self.inner.stat().await?;
        info.size = self.len;
        Ok(info)
    }

    async fn read(&self, buf: &mut [u8]) -> VfsResult<usize> {
        let mut pos = self.pos.lock().await;
        let n = self.window_read(buf, *pos).await?;
        *pos += n as u64;
        Ok(n)
    }

    async fn read_at(&self, buf: &mut [u8], offset: u64) -> VfsResult<usize> {
        self.window_read(buf, offset).await
    }

    async fn write(&self, _buf: &[u8]) -> VfsResult<usize> {
        Err(self.fail("write", ErrorKind::ReadOnly))
    }

    async fn write_at(&self, _buf: &[u8], _offset: u64) -> VfsResult<usize> {
        Err(self.fail("writeat", ErrorKind::ReadOnly))
    }

    async fn seek(&self, pos: SeekFrom) -> VfsResult<u64> {
        let mut cursor = self.pos.lock().await;
        let target = match pos {
            SeekFrom::Start(offset) => i128::from(offset),
            SeekFrom::Current(delta) => i128::from(*cursor) + i128::from(delta),
            SeekFrom::End(delta) => i128::from(self.len) + i128::from(delta),
        };
        if target < 0 || target > i128::from(u64::MAX) {
            return Err(self.fail("seek", ErrorKind::Invalid));
        }
        *cursor = target as u64;
        Ok(*cursor)
    }

    async fn truncate(&self, _size: u64) -> VfsResult<()> {
        Err(self.fail("truncate", ErrorKind::ReadOnly))
    }

    async fn chmod(&self, _mode: u32) -> VfsResult<()> {
        Err(self.fail("chmod", ErrorKind::ReadOnly))
    }

    async fn chown(&self, _uid: u32, _gid: u32) -> VfsResult<()> {
        Err(self.fail("chown", ErrorKind::ReadOnly))
    }

    async fn sync(&self) -> VfsResult<()> {
        Ok(())
    }

    async fn read_dir(&self, _count: Option<usize>) -> VfsResult<Vec<FileInfo>> {
        Err(self.fail("readdir", ErrorKind::NotADirectory))
    }

    async fn read_dir_names(&self, _count: Option<usize>) -> VfsResult<Vec<String>> {
        Err(self.fail("readdirnames", ErrorKind::NotADirectory))
    }

    async fn close(&self) -> VfsResult<()> {
        self.inner.close().await
    }
}
