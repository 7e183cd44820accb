//! Defines the reusable open-file handle --- [`OpenFile`] --- and the
//! random-access storage contract it drives.

use std::io::SeekFrom;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;

use super::error::{ErrorKind, VfsError, VfsResult};
use super::file::FileInfo;
use super::flags::OpenFlags;
use super::File;

/// Random-access storage a [`FileView`](super::FileView) backend exposes to
/// [`OpenFile`].
///
/// Implementations are shared by every handle opened on the same view;
/// reads may run concurrently, writes are serialized by the store itself.
#[async_trait]
pub trait ViewStore: Send + Sync {
    /// Current content length in bytes.
    async fn size(&self) -> VfsResult<u64>;

    /// Reads up to `buf.len()` bytes at `offset`. Returns zero at or past
    /// the end of the content.
    async fn read_at(&self, buf: &mut [u8], offset: u64) -> VfsResult<usize>;

    /// Writes `buf` at `offset`, growing the content when the write lands
    /// past the current end. Introduced bytes read as zero.
    async fn write_at(&self, buf: &[u8], offset: u64) -> VfsResult<usize>;

    /// Shrinks or zero-extends the content to `size`.
    async fn truncate(&self, size: u64) -> VfsResult<()>;

    /// Attributes of the stored content.
    async fn stat(&self) -> VfsResult<FileInfo>;

    /// Updates the permission bits kept with the content.
    async fn set_mode(&self, mode: u32) -> VfsResult<()>;

    /// Updates the owner kept with the content.
    async fn set_owner(&self, uid: u32, gid: u32) -> VfsResult<()>;

    /// Flushes the content to stable storage.
    async fn sync(&self) -> VfsResult<()> {
        Ok(())
    }
}

struct HandleState {
    pos: u64,
    closed: bool,
}

/// Per-open cursor over a [`ViewStore`].
///
/// Each open yields an independent handle: cursors are private, bytes are
/// shared through the store. The handle enforces the open flag set and
/// close-exactly-once semantics.
pub struct OpenFile {
    store: Arc<dyn ViewStore>,
    name: String,
    flags: OpenFlags,
    state: Mutex<HandleState>,
}

impl OpenFile {
    /// Creates a handle positioned at offset zero.
    pub fn new(store: Arc<dyn ViewStore>, name: impl Into<String>, flags: OpenFlags) -> Self {
        OpenFile {
            store,
            name: name.into(),
            flags,
            state: Mutex::new(HandleState { pos: 0, closed: false }),
        }
    }

    fn fail(&self, op: &'static str, kind: ErrorKind) -> VfsError {
        VfsError::path(op, self.name.clone(), kind)
    }

    fn wrap(&self, op: &'static str, err: VfsError) -> VfsError {
        VfsError::wrap_path(op, self.name.clone(), err)
    }
}

#[async_trait]
impl File for OpenFile {
    fn name(&self) -> String {
        self.name.clone()
    }

    async fn stat(&self) -> VfsResult<FileInfo> {
        let state = self.state.lock().await;
        if state.closed {
            return Err(self.fail("stat", ErrorKind::AlreadyClosed));
        }
        self.store.stat().await.map_err(|e| self.wrap("stat", e))
    }

    async fn read(&self, buf: &mut [u8]) -> VfsResult<usize> {
        let mut state = self.state.lock().await;
        if state.closed {
            return Err(self.fail("read", ErrorKind::AlreadyClosed));
        }
        if !self.flags.readable() {
            return Err(self.fail("read", ErrorKind::BadDescriptor));
        }
        let n = self.store.read_at(buf, state.pos).await.map_err(|e| self.wrap("read", e))?;
        state.pos += n as u64;
        Ok(n)
    }

    async fn read_at(&self, buf: &mut [u8], offset: u64) -> VfsResult<usize> {
        let state = self.state.lock().await;
        if state.closed {
            return Err(self.fail("readat", ErrorKind::AlreadyClosed));
        }
        if !self.flags.readable() {
            return Err(self.fail("readat", ErrorKind::BadDescriptor));
        }
        drop(state);
        self.store.read_at(buf, offset).await.map_err(|e| self.wrap("readat", e))
    }

    async fn write(&self, buf: &[u8]) -> VfsResult<usize> {
        let mut state = self.state.lock().await;
        if state.closed {
            return Err(self.fail("write", ErrorKind::AlreadyClosed));
        }
        if !self.flags.writable() {
            return Err(self.fail("write", ErrorKind::BadDescriptor));
        }
        if self.flags.append {
            state.pos = self.store.size().await.map_err(|e| self.wrap("write", e))?;
        }
        let n = self.store.write_at(buf, state.pos).await.map_err(|e| self.wrap("write", e))?;
        state.pos += n as u64;
        Ok(n)
    }

    async fn write_at(&self, buf: &[u8], offset: u64) -> VfsResult<usize> {
        let state = self.state.lock().await;
        if state.closed {
            return Err(self.fail("writeat", ErrorKind::AlreadyClosed));
        }
        if !self.flags.writable() {
            return Err(self.fail("writeat", ErrorKind::BadDescriptor));
        }
        if self.flags.append {
            return Err(self.fail("writeat", ErrorKind::Invalid));
        }
        drop(state);
        self.store.write_at(buf, offset).await.map_err(|e| self.wrap("writeat", e))
    }

    async fn seek(&self, pos: SeekFrom) -> VfsResult<u64> {
        let mut state = self.state.lock().await;
        if state.closed {
            return Err(self.fail("seek", ErrorKind::AlreadyClosed));
        }
        let target = match pos {
            SeekFrom::Start(offset) => i128::from(offset),
            SeekFrom::Current(delta) => i128::from(state.pos) + i128::from(delta),
            SeekFrom::End(delta) => {
                let size = self.store.size().await.map_err(|e| self.wrap("seek", e))?;
                i128::from(size) + i128::from(delta)
            }
        };
        if target < 0 || target > i128::from(u64::MAX) {
            return Err(self.fail("seek", ErrorKind::Invalid));
        }
        state.pos = target as u64;
        Ok(state.pos)
    }

    async fn truncate(&self, size: u64) -> VfsResult<()> {
        let state = self.state.lock().await;
        if state.closed {
            return Err(self.fail("truncate", ErrorKind::AlreadyClosed));
        }
        if !self.flags.writable() {
            return Err(self.fail("truncate", ErrorKind::BadDescriptor));
        }
        drop(state);
        self.store.truncate(size).await.map_err(|e| self.wrap("truncate", e))
    }

    async fn chmod(&self, mode: u32) -> VfsResult<()> {
        let state = self.state.lock().await;
        if state.closed {
            return Err(self.fail("chmod", ErrorKind::AlreadyClosed));
        }
        drop(state);
        self.store.set_mode(mode).await.map_err(|e| self.wrap("chmod", e))
    }

    async fn chown(&self, uid: u32, gid: u32) -> VfsResult<()> {
        let state = self.state.lock().await;
        if state.closed {
            return Err(self.fail("chown", ErrorKind::AlreadyClosed));
        }
        drop(state);
        self.store.set_owner(uid, gid).await.map_err(|e| self.wrap("chown", e))
    }

    async fn sync(&self) -> VfsResult<()> {
        let state = self.state.lock().await;
        if state.closed {
            return Err(self.fail("sync", ErrorKind::AlreadyClosed));
        }
        drop(state);
        self.store.sync().await.map_err(|e| self.wrap("sync", e))
    }

    async fn read_dir(&self, _count: Option<usize>) -> VfsResult<Vec<FileInfo>> {
        let state = self.state.lock().await;
        if state.closed {
            return Err(self.fail("readdir", ErrorKind::AlreadyClosed));
        }
        Err(self.fail("readdir", ErrorKind::NotADirectory))
    }

    async fn read_dir_names(&self, _count: Option<usize>) -> VfsResult<Vec<String>> {
        let state = self.state.lock().await;
        if state.closed {
            return Err(self.fail("readdirnames", ErrorKind::AlreadyClosed));
        }
        Err(self.fail("readdirnames", ErrorKind::NotADirectory))
    }

    async fn close(&self) -> VfsResult<()> {
        let mut state = self.state.lock().await;
        if state.closed {
            return Err(self.fail("close", ErrorKind::AlreadyClosed));
        }
        state.closed = true;
        Ok(())
    }
}
