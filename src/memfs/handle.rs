//! Defines the handles returned by the synthetic filesystem --- the
//! entry-aware file wrapper and the snapshot-based directory handle.

use std::io::SeekFrom;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::vfs::{ErrorKind, File, FileIdent, FileInfo, VfsError, VfsResult};

use super::node::{DirNode, FileNode, Node};

/// File handle that keeps entry metadata authoritative.
///
/// I/O goes to the handle produced by the backing view; attribute updates
/// land on the directory entry, so hard links keep their independent
/// modes while sharing bytes.
pub(crate) struct EntryFile {
    inner: Box<dyn File>,
    entry: Arc<FileNode>,
    path: String,
    device: u64,
}

impl EntryFile {
    pub fn new(inner: Box<dyn File>, entry: Arc<FileNode>, path: String, device: u64) -> EntryFile {
        EntryFile { inner, entry, path, device }
    }
}

#[async_trait]
impl File for EntryFile {
    fn name(&self) -> String {
        self.path.clone()
    }

    async fn stat(&self) -> VfsResult<FileInfo> {
        // The inner stat also rejects closed handles.
        let inner = self.inner.stat().await?;
        let meta = *self.entry.meta.read().await;
        let name = self.path.rsplit(['/', '\\']).next().unwrap_or(&self.path).to_owned();
        Ok(FileInfo {
            name,
            size: inner.size,
            mode: meta.mode,
            file_type: inner.file_type,
            uid: meta.uid,
            gid: meta.gid,
            atime: meta.atime,
            mtime: meta.mtime,
            ident: Some(FileIdent { device: self.device, inode: self.entry.ino }),
        })
    }

    async fn read(&self, buf: &mut [u8]) -> VfsResult<usize> {
        self.inner.read(buf).await
    }

    async fn read_at(&self, buf: &mut [u8], offset: u64) -> VfsResult<usize> {
        self.inner.read_at(buf, offset).await
    }

    async fn write(&self, buf: &[u8]) -> VfsResult<usize> {
        self.inner.write(buf).await
    }

    async fn write_at(&self, buf: &[u8], offset: u64) -> VfsResult<usize> {
        self.inner.write_at(buf, offset).await
    }

    async fn seek(&self, pos: SeekFrom) -> VfsResult<u64> {
        self.inner.seek(pos).await
    }

    async fn truncate(&self, size: u64) -> VfsResult<()> {
        self.inner.truncate(size).await
    }

    async fn chmod(&self, mode: u32) -> VfsResult<()> {
        self.inner.chmod(mode).await?;
        self.entry.meta.write().await.set_perm(mode);
        Ok(())
    }

    async fn chown(&self, uid: u32, gid: u32) -> VfsResult<()> {
        self.inner.chown(uid, gid).await?;
        let mut meta = self.entry.meta.write().await;
        meta.uid = uid;
        meta.gid = gid;
        Ok(())
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

struct DirState {
    snapshot: Option<Vec<FileInfo>>,
    offset: usize,
    closed: bool,
}

/// Directory handle with snapshot-based iteration.
///
/// The child list is captured lazily on the first read and stays stable
/// under concurrent mutations of the directory, matching host `getdents`
/// behavior. Seeking resets the snapshot.
pub(crate) struct DirHandle {
    path: String,
    node: Arc<DirNode>,
    device: u64,
    state: Mutex<DirState>,
}

impl DirHandle {
    pub fn new(path: String, node: Arc<DirNode>, device: u64) -> DirHandle {
        DirHandle {
            path,
            node,
            device,
            state: Mutex::new(DirState { snapshot: None, offset: 0, closed: false }),
        }
    }

    fn fail(&self, op: &'static str, kind: ErrorKind) -> VfsError {
        VfsError::path(op, self.path.clone(), kind)
    }

    async fn take_slice(
        &self,
        op: &'static str,
        count: Option<usize>,
    ) -> VfsResult<Vec<FileInfo>> {
        let mut state = self.state.lock().await;
        if state.closed {
            return Err(self.fail(op, ErrorKind::AlreadyClosed));
        }
        if state.snapshot.is_none() {
            if !self.node.meta.read().await.can_read() {
                return Err(self.fail(op, ErrorKind::Permission));
            }
            let entries = self.node.children.read().await.entries();
            let mut infos = Vec::with_capacity(entries.len());
            for (name, child) in entries {
                let info = child
                    .info(&name, self.device)
                    .await
                    .map_err(|e| VfsError::wrap_path(op, self.path.clone(), e))?;
                infos.push(info);
            }
            state.snapshot = Some(infos);
        }
        let offset = state.offset;
        let snapshot = state.snapshot.as_deref().unwrap_or_default();
        let (out, end) = match count {
            None => (snapshot[offset.min(snapshot.len())..].to_vec(), snapshot.len()),
            Some(n) => {
                if offset >= snapshot.len() {
                    return Err(self.fail(op, ErrorKind::Eof));
                }
                let end = (offset + n).min(snapshot.len());
                (snapshot[offset..end].to_vec(), end)
            }
        };
        state.offset = end;
        Ok(out)
    }
}

#[async_trait]
impl File for DirHandle {
    fn name(&self) -> String {
        self.path.clone()
    }

    async fn stat(&self) -> VfsResult<FileInfo> {
        let state = self.state.lock().await;
        if state.closed {
            return Err(self.fail("stat", ErrorKind::AlreadyClosed));
        }
        drop(state);
        let name = self.path.rsplit(['/', '\\']).next().unwrap_or(".").to_owned();
        Node::Dir(self.node.clone())
            .info(&name, self.device)
            .await
            .map_err(|e| VfsError::wrap_path("stat", self.path.clone(), e))
    }

    async fn read(&self, _buf: &mut [u8]) -> VfsResult<usize> {
        Err(self.fail("read", ErrorKind::IsADirectory))
    }

    async fn read_at(&self, _buf: &mut [u8], _offset: u64) -> VfsResult<usize> {
        Err(self.fail("readat", ErrorKind::IsADirectory))
    }

    async fn write(&self, _buf: &[u8]) -> VfsResult<usize> {
        Err(self.fail("write", ErrorKind::BadDescriptor))
    }

    async fn write_at(&self, _buf: &[u8], _offset: u64) -> VfsResult<usize> {
        Err(self.fail("writeat", ErrorKind::BadDescriptor))
    }

    async fn seek(&self, _pos: SeekFrom) -> VfsResult<u64> {
        let mut state = self.state.lock().await;
        if state.closed {
            return Err(self.fail("seek", ErrorKind::AlreadyClosed));
        }
        state.snapshot = None;
        state.offset = 0;
        Ok(0)
    }

    async fn truncate(&self, _size: u64) -> VfsResult<()> {
        Err(self.fail("truncate", ErrorKind::BadDescriptor))
    }

    async fn chmod(&self, mode: u32) -> VfsResult<()> {
        let state = self.state.lock().await;
        if state.closed {
            return Err(self.fail("chmod", ErrorKind::AlreadyClosed));
        }
        drop(state);
        self.node.meta.write().await.set_perm(mode);
        Ok(())
    }

    async fn chown(&self, uid: u32, gid: u32) -> VfsResult<()> {
        let state = self.state.lock().await;
        if state.closed {
            return Err(self.fail("chown", ErrorKind::AlreadyClosed));
        }
        drop(state);
        let mut meta = self.node.meta.write().await;
        meta.uid = uid;
        meta.gid = gid;
        Ok(())
    }

    async fn sync(&self) -> VfsResult<()> {
        Ok(())
    }

    async fn read_dir(&self, count: Option<usize>) -> VfsResult<Vec<FileInfo>> {
        self.take_slice("readdir", count).await
    }

    async fn read_dir_names(&self, count: Option<usize>) -> VfsResult<Vec<String>> {
        let infos = self.take_slice("readdirnames", count).await?;
        Ok(infos.into_iter().map(|info| info.name).collect())
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
