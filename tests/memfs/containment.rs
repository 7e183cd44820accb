use arbor_vfs::memfs::{Containment, MemFs};
use arbor_vfs::vfs::{ErrorKind, Fs as _, RootedFs, UnrootedFs};

use super::common::{p, read, write};

#[tokio::test]
async fn strict_fs_rejects_escaping_symlink_targets() {
    let fs = MemFs::new();
    fs.symlink(p("../../etc/passwd"), p("link")).await.unwrap();

    let err = match fs.open(p("link")).await {
        Err(e) => e,
        Ok(_) => panic!("expected error"),
    };
    assert_eq!(err.kind(), ErrorKind::PathEscapes);

    // The link itself stays visible to lstat and readlink.
    assert!(fs.lstat(p("link")).await.unwrap().is_symlink());
    assert_eq!(fs.read_link(p("link")).await.unwrap(), p("../../etc/passwd"));
}

#[tokio::test]
async fn strict_fs_rejects_absolute_symlink_targets() {
    let fs = MemFs::new();
    fs.symlink(p("/etc/passwd"), p("link")).await.unwrap();
    let err = fs.stat(p("link")).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::PathEscapes);
}

#[cfg(unix)]
#[tokio::test]
async fn lax_fs_follows_symlinks_onto_the_host() {
    let tempdir = tempfile::TempDir::new().expect("create temp dir");
    std::fs::write(tempdir.path().join("outside.txt"), b"host bytes").expect("seed host file");
    let anchor = tempdir.path().join("anchor");
    std::fs::create_dir(&anchor).expect("create anchor dir");

    let fs = MemFs::builder()
        .containment(Containment::Lax)
        .host_anchor(&anchor)
        .build();

    // Relative escape, joined onto the anchor.
    fs.symlink(p("../outside.txt"), p("rel")).await.unwrap();
    assert_eq!(read(&fs, "rel").await, b"host bytes");

    // Absolute escape, evaluated literally.
    let absolute = tempdir.path().join("outside.txt");
    fs.symlink(&absolute, p("abs")).await.unwrap();
    assert_eq!(fs.stat(p("abs")).await.unwrap().size, 10);

    // Literal dot-dot traversal still fails even in lax mode.
    let err = match fs.open(p("..")).await {
        Err(e) => e,
        Ok(_) => panic!("expected error"),
    };
    assert_eq!(err.kind(), ErrorKind::PathEscapes);
    let err = fs.stat(p("../outside.txt")).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::PathEscapes);
}

#[tokio::test]
async fn lax_fs_without_anchor_rejects_relative_escapes() {
    let fs = MemFs::builder().containment(Containment::Lax).build();
    fs.symlink(p("../free.txt"), p("link")).await.unwrap();
    let err = match fs.open(p("link")).await {
        Err(e) => e,
        Ok(_) => panic!("expected error"),
    };
    assert_eq!(err.kind(), ErrorKind::PathEscapes);
}

#[tokio::test]
async fn open_root_reanchors_strict_containment() {
    let fs = MemFs::new();
    fs.mkdir_all(p("jail/cell"), 0o755).await.unwrap();
    write(&fs, "jail/cell/note", b"inside").await;
    write(&fs, "outside", b"outside").await;

    let sub = fs.open_root(p("jail")).await.unwrap();
    let handle = sub.open(p("cell/note")).await.unwrap();
    let mut buf = [0u8; 6];
    assert_eq!(handle.read(&mut buf).await.unwrap(), 6);
    assert_eq!(&buf, b"inside");
    handle.close().await.unwrap();
    assert_eq!(sub.stat(p("outside")).await.unwrap_err().kind(), ErrorKind::NotFound);
    assert_eq!(sub.stat(p("..")).await.unwrap_err().kind(), ErrorKind::PathEscapes);

    // Escaping symlinks are judged against the new root.
    fs.symlink(p("../outside"), p("jail/up")).await.unwrap();
    assert_eq!(sub.stat(p("up")).await.unwrap_err().kind(), ErrorKind::PathEscapes);

    // The parent filesystem resolves the same link happily.
    assert_eq!(read(&fs, "jail/up").await, b"outside");
}

#[tokio::test]
async fn open_root_requires_a_directory() {
    let fs = MemFs::new();
    write(&fs, "f", b"").await;
    let err = match fs.open_root(p("f")).await {
        Err(e) => e,
        Ok(_) => panic!("expected error"),
    };
    assert_eq!(err.kind(), ErrorKind::NotADirectory);
    let err = match fs.open_root(p("missing")).await {
        Err(e) => e,
        Ok(_) => panic!("expected error"),
    };
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[tokio::test]
async fn open_unrooted_switches_to_lax_containment() {
    let fs = MemFs::new();
    fs.mkdir(p("zone"), 0o755).await.unwrap();
    let sub = fs.open_unrooted(p("zone")).await.unwrap();
    // Literal traversal past the new root still fails.
    assert_eq!(sub.stat(p("..")).await.unwrap_err().kind(), ErrorKind::PathEscapes);
}

#[tokio::test]
async fn nested_sub_filesystems_share_the_tree() {
    let fs = MemFs::new();
    fs.mkdir_all(p("a/b"), 0o755).await.unwrap();
    let sub = fs.open_root(p("a")).await.unwrap();
    let handle = sub.create(p("b/made-inside")).await.unwrap();
    handle.write(b"x").await.unwrap();
    handle.close().await.unwrap();
    assert_eq!(read(&fs, "a/b/made-inside").await, b"x");
}
