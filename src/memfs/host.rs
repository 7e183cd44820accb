//! Defines the host fallback used by lax containment --- opening and
//! inspecting paths that symlink substitution carried outside the root.
//!
//! Only evaluation is delegated: structural mutations of the host tree
//! stay out of scope and fail with `Unsupported`.

use std::io::SeekFrom;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs;
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};
use tokio::sync::Mutex;

use crate::vfs::error::map_io_error;
use crate::vfs::{
    ErrorKind, File, FileIdent, FileInfo, FileTime, FileType, OpenFlags, VfsError, VfsResult,
};

/// Translates host metadata into the attribute representation.
pub(crate) fn host_info(meta: &std::fs::Metadata, name: &str) -> FileInfo {
    let file_type = if meta.file_type().is_dir() {
        FileType::Directory
    } else if meta.file_type().is_symlink() {
        FileType::Symlink
    } else {
        FileType::Regular
    };
    #[cfg(unix)]
    {
        use std::os::unix::fs::MetadataExt;
        FileInfo {
            name: name.to_owned(),
            size: meta.len(),
            mode: meta.mode(),
            file_type,
            uid: meta.uid(),
            gid: meta.gid(),
            atime: FileTime { seconds: meta.atime(), nanos: meta.atime_nsec() as u32 },
            mtime: FileTime { seconds: meta.mtime(), nanos: meta.mtime_nsec() as u32 },
            ident: Some(FileIdent { device: meta.dev(), inode: meta.ino() }),
        }
    }
    #[cfg(not(unix))]
    {
        let perm = if meta.permissions().readonly() { 0o555 } else { 0o755 };
        FileInfo {
            name: name.to_owned(),
            size: meta.len(),
            mode: perm | file_type.mode_bits(),
            file_type,
            uid: 0,
            gid: 0,
            atime: FileTime::ZERO,
            mtime: FileTime::ZERO,
            ident: None,
        }
    }
}

fn base_name(path: &Path) -> String {
    path.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_else(|| ".".to_owned())
}

/// Stats a host path, following or not following a final symlink.
pub(crate) async fn stat(path: &Path, follow: bool) -> VfsResult<FileInfo> {
    let meta = if follow {
        fs::metadata(path).await
    } else {
        fs::symlink_metadata(path).await
    };
    let meta = meta.map_err(|e| VfsError::Kind(map_io_error(&e)))?;
    Ok(host_info(&meta, &base_name(path)))
}

/// Reads the target of a host symlink.
pub(crate) async fn read_link(path: &Path) -> VfsResult<PathBuf> {
    fs::read_link(path).await.map_err(|e| VfsError::Kind(map_io_error(&e)))
}

/// Applies permission bits to a host path.
pub(crate) async fn set_perm(path: &Path, mode: u32) -> VfsResult<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(path, std::fs::Permissions::from_mode(mode & 0o777))
            .await
            .map_err(|e| VfsError::Kind(map_io_error(&e)))
    }
    #[cfg(not(unix))]
    {
        let _ = (path, mode);
        Err(VfsError::Kind(ErrorKind::Unsupported))
    }
}

/// Opens a host path with the given flag set.
pub(crate) async fn open(path: PathBuf, flags: OpenFlags, perm: u32) -> VfsResult<Box<dyn File>> {
    let mut options = fs::OpenOptions::new();
    options
        .read(flags.read)
        .write(flags.write)
        .append(flags.append)
        .create(flags.create)
        .create_new(flags.create_new)
        .truncate(flags.truncate);
    #[cfg(unix)]
    if flags.creating() {
        options.mode(perm & 0o777);
    }
    #[cfg(not(unix))]
    let _ = perm;
    let meta = fs::metadata(&path).await.ok();
    if let Some(meta) = &meta {
        if meta.is_dir() {
            if flags.writable() || flags.truncate {
                return Err(VfsError::Kind(ErrorKind::IsADirectory));
            }
            return Ok(Box::new(HostFile::directory(path)));
        }
    }
    let file = options.open(&path).await.map_err(|e| VfsError::Kind(map_io_error(&e)))?;
    Ok(Box::new(HostFile::regular(path, flags, file)))
}

enum HostKind {
    Regular(Mutex<Option<fs::File>>),
    Directory(Mutex<DirState>),
}

struct DirState {
    snapshot: Option<Vec<FileInfo>>,
    offset: usize,
    closed: bool,
}

/// Handle over a host path reached through a lax symlink escape.
pub(crate) struct HostFile {
    path: PathBuf,
    flags: OpenFlags,
    kind: HostKind,
}

impl HostFile {
    fn regular(path: PathBuf, flags: OpenFlags, file: fs::File) -> HostFile {
        HostFile { path, flags, kind: HostKind::Regular(Mutex::new(Some(file))) }
    }

    fn directory(path: PathBuf) -> HostFile {
        HostFile {
            path,
            flags: OpenFlags::read_only(),
            kind: HostKind::Directory(Mutex::new(DirState {
                snapshot: None,
                offset: 0,
                closed: false,
            })),
        }
    }

    fn display(&self) -> String {
        self.path.display().to_string()
    }

    fn fail(&self, op: &'static str, kind: ErrorKind) -> VfsError {
        VfsError::path(op, self.display(), kind)
    }

    fn io(&self, op: &'static str, err: &std::io::Error) -> VfsError {
        VfsError::path(op, self.display(), map_io_error(err))
    }

    async fn list(&self, op: &'static str, count: Option<usize>) -> VfsResult<Vec<FileInfo>> {
        let state = match &self.kind {
            HostKind::Directory(state) => state,
            HostKind::Regular(_) => return Err(self.fail(op, ErrorKind::NotADirectory)),
        };
        let mut state = state.lock().await;
        if state.closed {
            return Err(self.fail(op, ErrorKind::AlreadyClosed));
        }
        if state.snapshot.is_none() {
            let mut reader = fs::read_dir(&self.path).await.map_err(|e| self.io(op, &e))?;
            let mut names = Vec::new();
            while let Some(entry) = reader.next_entry().await.map_err(|e| self.io(op, &e))? {
                names.push(entry.file_name());
            }
            names.sort_by_key(|name| name.to_string_lossy().into_owned());
            let mut infos = Vec::with_capacity(names.len());
            for name in names {
                let child = self.path.join(&name);
                let meta =
                    fs::symlink_metadata(&child).await.map_err(|e| self.io(op, &e))?;
                infos.push(host_info(&meta, &name.to_string_lossy()));
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
impl File for HostFile {
    fn name(&self) -> String {
        self.display()
    }

    async fn stat(&self) -> VfsResult<FileInfo> {
        match &self.kind {
            HostKind::Regular(file) => {
                let guard = file.lock().await;
                let file = guard.as_ref().ok_or_else(|| self.fail("stat", ErrorKind::AlreadyClosed))?;
                let meta = file.metadata().await.map_err(|e| self.io("stat", &e))?;
                Ok(host_info(&meta, &base_name(&self.path)))
            }
            HostKind::Directory(_) => stat(&self.path, true)
                .await
                .map_err(|e| VfsError::wrap_path("stat", self.display(), e)),
        }
    }

    async fn read(&self, buf: &mut [u8]) -> VfsResult<usize> {
        let file = match &self.kind {
            HostKind::Regular(file) => file,
            HostKind::Directory(_) => return Err(self.fail("read", ErrorKind::IsADirectory)),
        };
        if !self.flags.readable() {
            return Err(self.fail("read", ErrorKind::BadDescriptor));
        }
        let mut guard = file.lock().await;
        let file = guard.as_mut().ok_or_else(|| self.fail("read", ErrorKind::AlreadyClosed))?;
        file.read(buf).await.map_err(|e| self.io("read", &e))
    }

    async fn read_at(&self, buf: &mut [u8], offset: u64) -> VfsResult<usize> {
        let file = match &self.kind {
            HostKind::Regular(file) => file,
            HostKind::Directory(_) => return Err(self.fail("readat", ErrorKind::IsADirectory)),
        };
        if !self.flags.readable() {
            return Err(self.fail("readat", ErrorKind::BadDescriptor));
        }
        let mut guard = file.lock().await;
        let file = guard.as_mut().ok_or_else(|| self.fail("readat", ErrorKind::AlreadyClosed))?;
        let saved = file.stream_position().await.map_err(|e| self.io("readat", &e))?;
        file.seek(SeekFrom::Start(offset)).await.map_err(|e| self.io("readat", &e))?;
        let n = file.read(buf).await.map_err(|e| self.io("readat", &e))?;
        file.seek(SeekFrom::Start(saved)).await.map_err(|e| self.io("readat", &e))?;
        Ok(n)
    }

    async fn write(&self, buf: &[u8]) -> VfsResult<usize> {
        let file = match &self.kind {
            HostKind::Regular(file) => file,
            HostKind::Directory(_) => return Err(self.fail("write", ErrorKind::BadDescriptor)),
        };
        if !self.flags.writable() {
            return Err(self.fail("write", ErrorKind::BadDescriptor));
        }
        let mut guard = file.lock().await;
        let file = guard.as_mut().ok_or_else(|| self.fail("write", ErrorKind::AlreadyClosed))?;
        file.write(buf).await.map_err(|e| self.io("write", &e))
    }

    async fn write_at(&self, buf: &[u8], offset: u64) -> VfsResult<usize> {
        let file = match &self.kind {
            HostKind::Regular(file) => file,
            HostKind::Directory(_) => return Err(self.fail("writeat", ErrorKind::BadDescriptor)),
        };
        if !self.flags.writable() {
            return Err(self.fail("writeat", ErrorKind::BadDescriptor));
        }
        if self.flags.append {
            return Err(self.fail("writeat", ErrorKind::Invalid));
        }
        let mut guard = file.lock().await;
        let file = guard.as_mut().ok_or_else(|| self.fail("writeat", ErrorKind::AlreadyClosed))?;
        let saved = file.stream_position().await.map_err(|e| self.io("writeat", &e))?;
        file.seek(SeekFrom::Start(offset)).await.map_err(|e| self.io("writeat", &e))?;
        let n = file.write(buf).await.map_err(|e| self.io("writeat", &e))?;
        file.seek(SeekFrom::Start(saved)).await.map_err(|e| self.io("writeat", &e))?;
        Ok(n)
    }

    async fn seek(&self, pos: SeekFrom) -> VfsResult<u64> {
        let file = match &self.kind {
            HostKind::Regular(file) => file,
            HostKind::Directory(_) => return Err(self.fail("seek", ErrorKind::IsADirectory)),
        };
        let mut guard = file.lock().await;
        let file = guard.as_mut().ok_or_else(|| self.fail("seek", ErrorKind::AlreadyClosed))?;
        file.seek(pos).await.map_err(|e| self.io("seek", &e))
    }

    async fn truncate(&self, size: u64) -> VfsResult<()> {
        let file = match &self.kind {
            HostKind::Regular(file) => file,
            HostKind::Directory(_) => return Err(self.fail("truncate", ErrorKind::BadDescriptor)),
        };
        if !self.flags.writable() {
            return Err(self.fail("truncate", ErrorKind::BadDescriptor));
        }
        let guard = file.lock().await;
        let file = guard.as_ref().ok_or_else(|| self.fail("truncate", ErrorKind::AlreadyClosed))?;
        file.set_len(size).await.map_err(|e| self.io("truncate", &e))
    }

    async fn chmod(&self, mode: u32) -> VfsResult<()> {
        set_perm(&self.path, mode)
            .await
            .map_err(|e| VfsError::wrap_path("chmod", self.display(), e))
    }

    async fn chown(&self, _uid: u32, _gid: u32) -> VfsResult<()> {
        Err(self.fail("chown", ErrorKind::Unsupported))
    }

    async fn sync(&self) -> VfsResult<()> {
        let file = match &self.kind {
            HostKind::Regular(file) => file,
            HostKind::Directory(_) => return Ok(()),
        };
        let guard = file.lock().await;
        let file = guard.as_ref().ok_or_else(|| self.fail("sync", ErrorKind::AlreadyClosed))?;
        file.sync_all().await.map_err(|e| self.io("sync", &e))
    }

    async fn read_dir(&self, count: Option<usize>) -> VfsResult<Vec<FileInfo>> {
        self.list("readdir", count).await
    }

    async fn read_dir_names(&self, count: Option<usize>) -> VfsResult<Vec<String>> {
        let infos = self.list("readdirnames", count).await?;
        Ok(infos.into_iter().map(|info| info.name).collect())
    }

    async fn close(&self) -> VfsResult<()> {
        match &self.kind {
            HostKind::Regular(file) => {
                let mut guard = file.lock().await;
                if guard.take().is_none() {
                    return Err(self.fail("close", ErrorKind::AlreadyClosed));
                }
                Ok(())
            }
            HostKind::Directory(state) => {
                let mut state = state.lock().await;
                if state.closed {
                    return Err(self.fail("close", ErrorKind::AlreadyClosed));
                }
                state.closed = true;
                Ok(())
            }
        }
    }
}
