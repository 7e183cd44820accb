use arbor_vfs::memfs::MemFs;
use arbor_vfs::vfs::{ErrorKind, FileType, Fs as _};

use super::common::{p, read, write};

#[tokio::test]
async fn stat_follows_symlinks_and_lstat_does_not() {
    let fs = MemFs::new();
    write(&fs, "target.txt", b"payload").await;
    fs.symlink(p("target.txt"), p("link")).await.unwrap();

    let through = fs.stat(p("link")).await.unwrap();
    assert_eq!(through.file_type, FileType::Regular);
    assert_eq!(through.size, 7);

    let link = fs.lstat(p("link")).await.unwrap();
    assert_eq!(link.file_type, FileType::Symlink);
    assert_eq!(link.size, "target.txt".len() as u64);
}

#[tokio::test]
async fn read_link_returns_the_raw_target() {
    let fs = MemFs::new();
    fs.symlink(p("anything/at/all"), p("link")).await.unwrap();
    assert_eq!(fs.read_link(p("link")).await.unwrap(), p("anything/at/all"));

    write(&fs, "plain", b"").await;
    let err = fs.read_link(p("plain")).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Invalid);
}

#[tokio::test]
async fn symlink_targets_are_not_validated_at_creation() {
    let fs = MemFs::new();
    fs.symlink(p("does/not/exist"), p("dangling")).await.unwrap();
    assert_eq!(fs.stat(p("dangling")).await.unwrap_err().kind(), ErrorKind::NotFound);
}

#[tokio::test]
async fn lookups_descend_through_symlinked_directories() {
    let fs = MemFs::new();
    fs.mkdir_all(p("real/sub"), 0o755).await.unwrap();
    write(&fs, "real/sub/f", b"deep").await;
    fs.symlink(p("real"), p("alias")).await.unwrap();

    assert_eq!(read(&fs, "alias/sub/f").await, b"deep");
}

#[tokio::test]
async fn symlink_chains_resolve_to_the_final_target() {
    let fs = MemFs::new();
    write(&fs, "end", b"done").await;
    fs.symlink(p("end"), p("hop1")).await.unwrap();
    fs.symlink(p("hop1"), p("hop2")).await.unwrap();
    fs.symlink(p("hop2"), p("hop3")).await.unwrap();
    assert_eq!(read(&fs, "hop3").await, b"done");
}

#[tokio::test]
async fn mutual_symlinks_fail_with_a_loop_error() {
    let fs = MemFs::new();
    fs.symlink(p("b"), p("a")).await.unwrap();
    fs.symlink(p("a"), p("b")).await.unwrap();

    let err = match fs.open(p("a")).await {
        Err(e) => e,
        Ok(_) => panic!("expected error"),
    };
    assert_eq!(err.kind(), ErrorKind::Loop);
    assert!(err.to_string().contains("too many levels of symbolic links"));

    let err = fs.stat(p("b")).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Loop);

    // The links themselves are still inspectable.
    assert!(fs.lstat(p("a")).await.unwrap().is_symlink());
}

#[tokio::test]
async fn chains_beyond_the_budget_fail_with_a_loop_error() {
    let fs = MemFs::new();
    write(&fs, "real", b"x").await;
    fs.symlink(p("real"), p("chain0")).await.unwrap();
    for i in 1..=40 {
        let target = format!("chain{}", i - 1);
        let link = format!("chain{i}");
        fs.symlink(p(&target), p(&link)).await.unwrap();
    }

    // Forty hops resolve; the forty-first does not.
    assert_eq!(read(&fs, "chain39").await, b"x");
    let err = match fs.open(p("chain40")).await {
        Err(e) => e,
        Ok(_) => panic!("expected error"),
    };
    assert_eq!(err.kind(), ErrorKind::Loop);
}

#[tokio::test]
async fn self_referential_symlink_is_a_loop() {
    let fs = MemFs::new();
    fs.symlink(p("me"), p("me")).await.unwrap();
    let err = match fs.open(p("me")).await {
        Err(e) => e,
        Ok(_) => panic!("expected error"),
    };
    assert_eq!(err.kind(), ErrorKind::Loop);
}

#[tokio::test]
async fn symlink_over_an_existing_name_fails() {
    let fs = MemFs::new();
    write(&fs, "f", b"").await;
    let err = fs.symlink(p("anywhere"), p("f")).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Exists);
}
