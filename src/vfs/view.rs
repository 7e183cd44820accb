//! Defines the backing-storage contracts consumed by filesystem cores ---
//! [`FileView`] and [`ViewAllocator`].

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;

use super::{File, FileInfo, OpenFlags, VfsResult};

/// Backing storage of a single file's bytes.
///
/// One instance represents the bytes of one file. Several directory
/// entries may share an instance (hard links). A view is created by a
/// [`ViewAllocator`] or an adapter and receives a close notification when
/// the last entry referring to it is detached; it must stay usable until
/// every handle derived from it has been closed.
#[async_trait]
pub trait FileView: Send + Sync {
    /// Opens a handle over the stored bytes. Backends may ignore flags
    /// they cannot honor.
    async fn open(self: Arc<Self>, flags: OpenFlags) -> VfsResult<Box<dyn File>>;

    /// Returns attributes of the stored bytes.
    async fn stat(&self) -> VfsResult<FileInfo>;

    /// Shrinks or zero-extends the stored bytes. Backends may refuse.
    async fn truncate(&self, size: u64) -> VfsResult<()>;

    /// Advisory notification that the file is now reachable under
    /// `new_name`.
    async fn rename(&self, new_name: &str) -> VfsResult<()>;

    /// Notification that the last name referring to the view was detached.
    async fn close(&self) -> VfsResult<()>;
}

/// Produces file views for files created through the filesystem.
///
/// [`ViewAllocator::allocate`] is called at most once per create; the
/// allocation may have side effects on the backing store.
#[async_trait]
pub trait ViewAllocator: Send + Sync {
    /// Allocates storage for a new file at `path` with permission bits
    /// `perm`.
    async fn allocate(&self, path: &Path, perm: u32) -> VfsResult<Arc<dyn FileView>>;
}
