use std::sync::Arc;

use arbor_vfs::clock::FixedClock;
use arbor_vfs::memfs::MemFs;
use arbor_vfs::vfs::{ErrorKind, FileTime, Fs as _};

use super::common::{p, write};

fn fixed_fs(seconds: i64) -> MemFs {
    MemFs::builder().clock(Arc::new(FixedClock(FileTime { seconds, nanos: 0 }))).build()
}

#[tokio::test]
async fn chmod_updates_permission_bits_only() {
    let fs = MemFs::new();
    write(&fs, "f", b"data").await;
    fs.chmod(p("f"), 0o600).await.unwrap();
    let info = fs.stat(p("f")).await.unwrap();
    assert_eq!(info.perm(), 0o600);
    assert!(!info.is_dir());
}

#[tokio::test]
async fn chown_and_lchown_target_different_nodes() {
    let fs = MemFs::new();
    write(&fs, "f", b"data").await;
    fs.symlink(p("f"), p("l")).await.unwrap();

    fs.chown(p("l"), 10, 20).await.unwrap();
    let through = fs.stat(p("f")).await.unwrap();
    assert_eq!((through.uid, through.gid), (10, 20));

    fs.lchown(p("l"), 30, 40).await.unwrap();
    let link = fs.lstat(p("l")).await.unwrap();
    assert_eq!((link.uid, link.gid), (30, 40));
    let through = fs.stat(p("f")).await.unwrap();
    assert_eq!((through.uid, through.gid), (10, 20));
}

#[tokio::test]
async fn chtimes_with_zero_leaves_the_field_untouched() {
    let fs = fixed_fs(1000);
    write(&fs, "f", b"data").await;

    let mtime = FileTime { seconds: 2000, nanos: 5 };
    fs.chtimes(p("f"), FileTime::ZERO, mtime).await.unwrap();
    let info = fs.stat(p("f")).await.unwrap();
    assert_eq!(info.mtime, mtime);
    assert_eq!(info.atime.seconds, 1000);

    let atime = FileTime { seconds: 3000, nanos: 0 };
    fs.chtimes(p("f"), atime, FileTime::ZERO).await.unwrap();
    let info = fs.stat(p("f")).await.unwrap();
    assert_eq!(info.atime, atime);
    assert_eq!(info.mtime, mtime);
}

#[tokio::test]
async fn creation_times_come_from_the_injected_clock() {
    let fs = fixed_fs(42);
    fs.mkdir(p("d"), 0o755).await.unwrap();
    let info = fs.stat(p("d")).await.unwrap();
    assert_eq!(info.mtime.seconds, 42);
}

#[tokio::test]
async fn umask_masks_creation_permissions() {
    let fs = MemFs::builder().umask(0o077).build();
    fs.mkdir(p("d"), 0o777).await.unwrap();
    assert_eq!(fs.stat(p("d")).await.unwrap().perm(), 0o700);

    let handle = fs.open_file(
        p("f"),
        arbor_vfs::vfs::OpenFlags::create_truncate(),
        0o666,
    )
    .await
    .unwrap();
    handle.close().await.unwrap();
    assert_eq!(fs.stat(p("f")).await.unwrap().perm(), 0o600);
}

#[tokio::test]
async fn parent_write_bit_gates_mutations() {
    let fs = MemFs::new();
    fs.mkdir(p("locked"), 0o500).await.unwrap();
    let err = fs.mkdir(p("locked/sub"), 0o755).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Permission);
    let err = match fs.create(p("locked/file")).await {
        Err(e) => e,
        Ok(_) => panic!("expected error"),
    };
    assert_eq!(err.kind(), ErrorKind::Permission);
}

#[tokio::test]
async fn file_read_bit_gates_reads() {
    let fs = MemFs::new();
    write(&fs, "secret", b"data").await;
    fs.chmod(p("secret"), 0o200).await.unwrap();
    let err = match fs.open(p("secret")).await {
        Err(e) => e,
        Ok(_) => panic!("expected error"),
    };
    assert_eq!(err.kind(), ErrorKind::Permission);
}

#[tokio::test]
async fn chmod_on_the_root_can_seal_the_tree() {
    let fs = MemFs::new();
    write(&fs, "f", b"data").await;

    fs.chmod(p("."), 0o000).await.unwrap();
    let err = fs.stat(p("f")).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Permission);

    fs.chmod(p("."), 0o755).await.unwrap();
    assert!(fs.stat(p("f")).await.is_ok());
}

#[tokio::test]
async fn hard_links_share_identity_but_not_metadata() {
    let fs = MemFs::new();
    write(&fs, "a", b"data").await;
    fs.link(p("a"), p("b")).await.unwrap();

    let a = fs.stat(p("a")).await.unwrap();
    let b = fs.stat(p("b")).await.unwrap();
    assert_eq!(a.ident, b.ident);

    fs.chmod(p("b"), 0o600).await.unwrap();
    assert_eq!(fs.stat(p("a")).await.unwrap().perm(), 0o644);
    assert_eq!(fs.stat(p("b")).await.unwrap().perm(), 0o600);
}

#[tokio::test]
async fn handle_chmod_lands_on_the_entry() {
    let fs = MemFs::new();
    write(&fs, "f", b"data").await;
    let handle = fs.open_file(p("f"), arbor_vfs::vfs::OpenFlags::read_write(), 0).await.unwrap();
    handle.chmod(0o640).await.unwrap();
    handle.close().await.unwrap();
    assert_eq!(fs.stat(p("f")).await.unwrap().perm(), 0o640);
}

#[tokio::test]
async fn invalid_and_escaping_paths_are_distinguished() {
    let fs = MemFs::new();
    assert_eq!(fs.stat(p("")).await.unwrap_err().kind(), ErrorKind::Invalid);
    assert_eq!(fs.stat(p("/etc/passwd")).await.unwrap_err().kind(), ErrorKind::PathEscapes);
    assert_eq!(fs.stat(p("../up")).await.unwrap_err().kind(), ErrorKind::PathEscapes);
    assert_eq!(fs.stat(p("a/../../b")).await.unwrap_err().kind(), ErrorKind::PathEscapes);

    // Interior parent components that stay inside the root are fine.
    write(&fs, "a", b"data").await;
    assert!(fs.stat(p("b/../a")).await.is_ok());
}
