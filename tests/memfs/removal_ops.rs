use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;

use arbor_vfs::clock::SystemClock;
use arbor_vfs::memfs::{MemFileView, MemFs};
use arbor_vfs::vfs::{
    ErrorKind, File, FileInfo, FileView, Fs as _, OpenFlags, VfsError, VfsResult, ViewAllocator,
};

use super::common::{p, read, write};

#[tokio::test]
async fn remove_detaches_files_and_symlinks() {
    let fs = MemFs::new();
    write(&fs, "f", b"data").await;
    fs.symlink(p("f"), p("l")).await.unwrap();

    fs.remove(p("l")).await.unwrap();
    assert_eq!(fs.lstat(p("l")).await.unwrap_err().kind(), ErrorKind::NotFound);
    assert!(fs.stat(p("f")).await.is_ok());

    fs.remove(p("f")).await.unwrap();
    assert_eq!(fs.stat(p("f")).await.unwrap_err().kind(), ErrorKind::NotFound);
}

#[tokio::test]
async fn remove_rejects_the_root_and_non_empty_directories() {
    let fs = MemFs::new();
    assert_eq!(fs.remove(p(".")).await.unwrap_err().kind(), ErrorKind::Invalid);

    fs.mkdir(p("d"), 0o755).await.unwrap();
    write(&fs, "d/f", b"data").await;
    assert_eq!(fs.remove(p("d")).await.unwrap_err().kind(), ErrorKind::NotEmpty);

    fs.remove(p("d/f")).await.unwrap();
    fs.remove(p("d")).await.unwrap();
    assert_eq!(fs.stat(p("d")).await.unwrap_err().kind(), ErrorKind::NotFound);
}

#[tokio::test]
async fn remove_missing_entry_fails_not_found() {
    let fs = MemFs::new();
    assert_eq!(fs.remove(p("ghost")).await.unwrap_err().kind(), ErrorKind::NotFound);
}

#[tokio::test]
async fn remove_all_clears_a_subtree_and_ignores_missing_targets() {
    let fs = MemFs::new();
    fs.mkdir_all(p("a/b/c"), 0o755).await.unwrap();
    write(&fs, "a/b/f1", b"x").await;
    write(&fs, "a/b/c/f2", b"y").await;

    fs.remove_all(p("a")).await.unwrap();
    assert_eq!(fs.stat(p("a")).await.unwrap_err().kind(), ErrorKind::NotFound);

    fs.remove_all(p("a")).await.unwrap();
    fs.remove_all(p("never/existed")).await.unwrap();
}

#[tokio::test]
async fn unlinked_file_stays_readable_through_open_handles() {
    let fs = MemFs::new();
    write(&fs, "f", b"still here").await;
    let handle = fs.open(p("f")).await.unwrap();
    fs.remove(p("f")).await.unwrap();

    let mut buf = [0u8; 10];
    assert_eq!(handle.read(&mut buf).await.unwrap(), 10);
    assert_eq!(&buf, b"still here");
    handle.close().await.unwrap();
}

#[tokio::test]
async fn hard_link_removal_notifies_only_the_last_name() {
    let fs = MemFs::new();
    write(&fs, "a", b"data").await;
    fs.link(p("a"), p("b")).await.unwrap();

    fs.remove(p("a")).await.unwrap();
    assert_eq!(read(&fs, "b").await, b"data");
    fs.remove(p("b")).await.unwrap();
}

/// View whose close notification always fails.
struct GrumpyView {
    inner: Arc<MemFileView>,
}

#[async_trait]
impl FileView for GrumpyView {
    async fn open(self: Arc<Self>, flags: OpenFlags) -> VfsResult<Box<dyn File>> {
        self.inner.clone().open(flags).await
    }

    async fn stat(&self) -> VfsResult<FileInfo> {
        self.inner.stat().await
    }

    async fn truncate(&self, size: u64) -> VfsResult<()> {
        FileView::truncate(self.inner.as_ref(), size).await
    }

    async fn rename(&self, new_name: &str) -> VfsResult<()> {
        self.inner.rename(new_name).await
    }

    async fn close(&self) -> VfsResult<()> {
        Err(VfsError::Kind(ErrorKind::Io))
    }
}

struct GrumpyAllocator;

#[async_trait]
impl ViewAllocator for GrumpyAllocator {
    async fn allocate(&self, path: &Path, perm: u32) -> VfsResult<Arc<dyn FileView>> {
        let name = path.to_string_lossy().into_owned();
        let inner = MemFileView::new(name, perm, Arc::new(SystemClock));
        Ok(Arc::new(GrumpyView { inner }))
    }
}

#[tokio::test]
async fn close_errors_on_unlink_are_reported_but_do_not_block_removal() {
    let fs = MemFs::builder().allocator(Arc::new(GrumpyAllocator)).build();
    write(&fs, "f", b"data").await;

    let err = fs.remove(p("f")).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ClosedWithError);
    assert_eq!(fs.stat(p("f")).await.unwrap_err().kind(), ErrorKind::NotFound);
}
