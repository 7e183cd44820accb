use std::io::SeekFrom;

use arbor_vfs::memfs::MemFs;
use arbor_vfs::vfs::{ErrorKind, Fs as _};

use super::common::{dir_names, p, write};

#[tokio::test]
async fn mkdir_requires_an_existing_parent() {
    let fs = MemFs::new();
    let err = fs.mkdir(p("a/b"), 0o755).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);

    fs.mkdir(p("a"), 0o755).await.unwrap();
    fs.mkdir(p("a/b"), 0o755).await.unwrap();
    let err = fs.mkdir(p("a"), 0o755).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Exists);
}

#[tokio::test]
async fn mkdir_all_creates_every_missing_prefix() {
    let fs = MemFs::new();
    fs.mkdir_all(p("a/b/c"), 0o750).await.unwrap();
    assert!(fs.stat(p("a")).await.unwrap().is_dir());
    assert!(fs.stat(p("a/b/c")).await.unwrap().is_dir());
    assert_eq!(fs.stat(p("a/b/c")).await.unwrap().perm(), 0o750);

    // Idempotent on an existing tree.
    fs.mkdir_all(p("a/b/c"), 0o750).await.unwrap();
}

#[tokio::test]
async fn mkdir_all_fails_on_a_file_prefix() {
    let fs = MemFs::new();
    write(&fs, "a", b"file").await;
    let err = fs.mkdir_all(p("a/b"), 0o755).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotADirectory);
}

#[tokio::test]
async fn readdir_returns_children_in_insertion_order() {
    let fs = MemFs::new();
    fs.mkdir(p("d"), 0o755).await.unwrap();
    write(&fs, "d/zeta", b"").await;
    write(&fs, "d/alpha", b"").await;
    fs.mkdir(p("d/midway"), 0o755).await.unwrap();

    assert_eq!(dir_names(&fs, "d").await, vec!["zeta", "alpha", "midway"]);
}

#[tokio::test]
async fn readdir_snapshot_is_stable_under_mutation() {
    let fs = MemFs::new();
    fs.mkdir(p("d"), 0o755).await.unwrap();
    write(&fs, "d/a", b"").await;
    write(&fs, "d/b", b"").await;

    let handle = fs.open(p("d")).await.unwrap();
    let first = handle.read_dir(Some(1)).await.unwrap();
    assert_eq!(first.len(), 1);
    assert_eq!(first[0].name, "a");

    // Mutation after the snapshot was taken is not observed.
    write(&fs, "d/c", b"").await;
    let rest = handle.read_dir(None).await.unwrap();
    let rest_names: Vec<&str> = rest.iter().map(|info| info.name.as_str()).collect();
    assert_eq!(rest_names, vec!["b"]);

    // A seek resets the snapshot and picks up the new entry.
    handle.seek(SeekFrom::Start(0)).await.unwrap();
    let all = handle.read_dir(None).await.unwrap();
    let all_names: Vec<&str> = all.iter().map(|info| info.name.as_str()).collect();
    assert_eq!(all_names, vec!["a", "b", "c"]);
    handle.close().await.unwrap();
}

#[tokio::test]
async fn exhausted_bounded_readdir_reports_end_of_stream() {
    let fs = MemFs::new();
    fs.mkdir(p("d"), 0o755).await.unwrap();
    write(&fs, "d/only", b"").await;

    let handle = fs.open(p("d")).await.unwrap();
    assert_eq!(handle.read_dir(Some(5)).await.unwrap().len(), 1);
    let err = handle.read_dir(Some(5)).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Eof);

    // Unbounded reads report exhaustion as an empty slice instead.
    assert!(handle.read_dir(None).await.unwrap().is_empty());
    handle.close().await.unwrap();
}

#[tokio::test]
async fn directory_handles_reject_byte_io() {
    let fs = MemFs::new();
    fs.mkdir(p("d"), 0o755).await.unwrap();
    let handle = fs.open(p("d")).await.unwrap();

    let mut buf = [0u8; 4];
    assert_eq!(handle.read(&mut buf).await.unwrap_err().kind(), ErrorKind::IsADirectory);
    assert_eq!(handle.read_at(&mut buf, 0).await.unwrap_err().kind(), ErrorKind::IsADirectory);
    assert_eq!(handle.write(b"x").await.unwrap_err().kind(), ErrorKind::BadDescriptor);
    assert_eq!(handle.write_at(b"x", 0).await.unwrap_err().kind(), ErrorKind::BadDescriptor);
    handle.close().await.unwrap();
}

#[tokio::test]
async fn readdir_on_a_file_handle_fails() {
    let fs = MemFs::new();
    write(&fs, "f", b"data").await;
    let handle = fs.open(p("f")).await.unwrap();
    let err = handle.read_dir(None).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotADirectory);
    handle.close().await.unwrap();
}

#[tokio::test]
async fn listing_requires_the_read_bit() {
    let fs = MemFs::new();
    fs.mkdir(p("d"), 0o755).await.unwrap();
    write(&fs, "d/x", b"").await;
    fs.chmod(p("d"), 0o311).await.unwrap();

    let handle = fs.open(p("d")).await.unwrap();
    let err = handle.read_dir(None).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Permission);
    handle.close().await.unwrap();

    // Lookup through the directory still works with the search bit set.
    assert!(!fs.stat(p("d/x")).await.unwrap().is_dir());
}

#[tokio::test]
async fn root_listing_uses_the_dot_name() {
    let fs = MemFs::new();
    write(&fs, "top", b"").await;
    let handle = fs.open(p(".")).await.unwrap();
    let info = handle.stat().await.unwrap();
    assert_eq!(info.name, ".");
    assert!(info.is_dir());
    assert_eq!(dir_names(&fs, ".").await, vec!["top"]);
    handle.close().await.unwrap();
}
