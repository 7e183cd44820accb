//! Defines the virtual file system capability surface --- [`Fs`], [`File`] and
//! the backing-storage contracts consumed by filesystem implementations.
//!
//! The traits are object safe: implementations are normally handled as
//! `Arc<dyn Fs>` and open handles as `Box<dyn File>`. All operations are
//! async and may be invoked concurrently from any task.

pub mod error;
pub mod file;
pub mod flags;
pub mod handle;
pub mod view;

use std::io::SeekFrom;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;

pub use error::{CloseAllError, ErrorKind, MultiReadError, VfsError, VfsResult};
pub use file::{FileIdent, FileInfo, FileTime, FileType};
pub use flags::OpenFlags;
pub use handle::{OpenFile, ViewStore};
pub use view::{FileView, ViewAllocator};

/// Maximum number of symbolic links traversed while resolving a path.
///
/// Matches the resolution limit enforced by common kernels; crossing it
/// fails with [`ErrorKind::Loop`].
pub const SYMLINK_BUDGET: usize = 40;

/// Maximum length of a single name component passed into [`Fs`] methods.
pub const MAX_NAME_LEN: usize = 255;

/// Virtual file system interface.
///
/// Paths are OS-style at this boundary; implementations normalize them to
/// slash form internally. All paths are interpreted relative to the
/// filesystem root and must stay inside it.
#[async_trait]
pub trait Fs: Send + Sync {
    /// Returns a human-readable name identifying this filesystem instance.
    fn name(&self) -> String;

    /// Opens a file with the given flag set and creation permissions.
    ///
    /// `perm` is consulted only when the open creates the file; it is
    /// masked by the filesystem umask.
    async fn open_file(&self, path: &Path, flags: OpenFlags, perm: u32)
        -> VfsResult<Box<dyn File>>;

    /// Opens a file for reading.
    async fn open(&self, path: &Path) -> VfsResult<Box<dyn File>> {
        self.open_file(path, OpenFlags::read_only(), 0).await
    }

    /// Creates or truncates a file and opens it for writing.
    async fn create(&self, path: &Path) -> VfsResult<Box<dyn File>> {
        self.open_file(path, OpenFlags::create_truncate(), 0o666).await
    }

    /// Creates a directory. The parent must exist and be writable.
    async fn mkdir(&self, path: &Path, perm: u32) -> VfsResult<()>;

    /// Creates a directory together with any missing parents.
    async fn mkdir_all(&self, path: &Path, perm: u32) -> VfsResult<()>;

    /// Removes a file, symlink or empty directory.
    async fn remove(&self, path: &Path) -> VfsResult<()>;

    /// Removes a path and any children it contains. A missing target is
    /// not an error.
    async fn remove_all(&self, path: &Path) -> VfsResult<()>;

    /// Moves `old` to `new`, replacing a compatible entry at `new`.
    async fn rename(&self, old: &Path, new: &Path) -> VfsResult<()>;

    /// Creates a hard link at `new` referring to the regular file at `old`.
    async fn link(&self, old: &Path, new: &Path) -> VfsResult<()>;

    /// Creates a symbolic link at `link` storing `target` verbatim.
    ///
    /// The target is not validated; it is evaluated when the link is used.
    async fn symlink(&self, target: &Path, link: &Path) -> VfsResult<()>;

    /// Returns information about the path, following symlinks.
    async fn stat(&self, path: &Path) -> VfsResult<FileInfo>;

    /// Returns information about the path without following a final symlink.
    async fn lstat(&self, path: &Path) -> VfsResult<FileInfo>;

    /// Returns the target stored in the symlink at `path`.
    async fn read_link(&self, path: &Path) -> VfsResult<PathBuf>;

    /// Changes the permission bits of the entry at `path`.
    async fn chmod(&self, path: &Path, mode: u32) -> VfsResult<()>;

    /// Changes the owner of the entry at `path`, following symlinks.
    async fn chown(&self, path: &Path, uid: u32, gid: u32) -> VfsResult<()>;

    /// Changes the owner of the entry at `path` without following a final
    /// symlink.
    async fn lchown(&self, path: &Path, uid: u32, gid: u32) -> VfsResult<()>;

    /// Updates access and modification times. A zero [`FileTime`] leaves
    /// the corresponding timestamp unchanged.
    async fn chtimes(&self, path: &Path, atime: FileTime, mtime: FileTime) -> VfsResult<()>;

    /// Releases resources held by the filesystem itself.
    async fn close(&self) -> VfsResult<()> {
        Ok(())
    }
}

/// A filesystem with strict containment that can re-anchor itself.
#[async_trait]
pub trait RootedFs: Fs {
    /// Returns a sub-filesystem rooted at the named directory. Path
    /// resolution in the result refuses any escape from the new root.
    async fn open_root(&self, path: &Path) -> VfsResult<Arc<dyn RootedFs>>;
}

/// A filesystem with lax containment that can re-anchor itself.
#[async_trait]
pub trait UnrootedFs: Fs {
    /// Returns a sub-filesystem rooted at the named directory. Symlinks in
    /// the result may lead outside the root; literal `..` traversal past
    /// the root still fails.
    async fn open_unrooted(&self, path: &Path) -> VfsResult<Arc<dyn UnrootedFs>>;
}

/// An open file handle.
///
/// [`File::read`] and [`File::write`] use the handle cursor;
/// [`File::read_at`] and [`File::write_at`] ignore it. Handles are owned by
/// the caller and must be closed exactly once.
#[async_trait]
pub trait File: Send + Sync {
    /// Returns the name the handle was opened under.
    fn name(&self) -> String;

    /// Returns information about the open file.
    async fn stat(&self) -> VfsResult<FileInfo>;

    /// Reads from the cursor position, advancing it by the returned count.
    async fn read(&self, buf: &mut [u8]) -> VfsResult<usize>;

    /// Reads at an absolute offset without touching the cursor.
    async fn read_at(&self, buf: &mut [u8], offset: u64) -> VfsResult<usize>;

    /// Writes at the cursor position, advancing it by the returned count.
    ///
    /// In append mode the cursor is moved to the current end of the file
    /// immediately before each write.
    async fn write(&self, buf: &[u8]) -> VfsResult<usize>;

    /// Writes at an absolute offset without touching the cursor. Fails with
    /// [`ErrorKind::Invalid`] on handles opened in append mode.
    async fn write_at(&self, buf: &[u8], offset: u64) -> VfsResult<usize>;

    /// Writes a string at the cursor position.
    async fn write_str(&self, s: &str) -> VfsResult<usize> {
        self.write(s.as_bytes()).await
    }

    /// Repositions the cursor. Seeking before the start of the file fails
    /// with [`ErrorKind::Invalid`]; seeking past the end is allowed and
    /// writes there grow the file.
    async fn seek(&self, pos: SeekFrom) -> VfsResult<u64>;

    /// Shrinks or zero-extends the file to `size`. Requires a writable
    /// handle.
    async fn truncate(&self, size: u64) -> VfsResult<()>;

    /// Changes the permission bits of the open file.
    async fn chmod(&self, mode: u32) -> VfsResult<()>;

    /// Changes the owner of the open file.
    async fn chown(&self, uid: u32, gid: u32) -> VfsResult<()>;

    /// Flushes file content to stable storage. In-memory backends succeed
    /// trivially.
    async fn sync(&self) -> VfsResult<()>;

    /// Reads directory entries from a handle opened on a directory.
    ///
    /// The listing is snapshotted on the first call; later mutations of the
    /// directory are not observed until a seek resets the snapshot. With
    /// `count` set, at most that many entries are returned and exhaustion
    /// fails with [`ErrorKind::Eof`]; with `count` of `None` the remainder
    /// is returned.
    async fn read_dir(&self, count: Option<usize>) -> VfsResult<Vec<FileInfo>>;

    /// Like [`File::read_dir`] but returns only the entry names.
    async fn read_dir_names(&self, count: Option<usize>) -> VfsResult<Vec<String>>;

    /// Closes the handle. A second close fails with
    /// [`ErrorKind::AlreadyClosed`] and has no further effect.
    async fn close(&self) -> VfsResult<()>;
}
