use std::path::PathBuf;

use arbor_vfs::fixture::Fixture;
use arbor_vfs::memfs::MemFs;
use arbor_vfs::vfs::{ErrorKind, Fs as _, VfsError};
use arbor_vfs::walk::{walk, Flow, WalkOptions};

use super::common::p;

async fn sample_fs() -> MemFs {
    let fs = MemFs::new();
    Fixture::parse("a/\na/f.txt: one\nb.txt: two\nlink -> b.txt\n")
        .unwrap()
        .apply(&fs)
        .await
        .unwrap();
    fs
}

#[tokio::test]
async fn unresolved_walk_visits_the_tree_and_unfollowed_links() {
    let fs = sample_fs().await;
    let mut seen: Vec<(String, String, bool)> = Vec::new();
    walk(&fs, p("."), WalkOptions::default(), |virt, real, info, err| {
        assert!(err.is_none());
        let info = info.expect("info present");
        seen.push((virt.display().to_string(), real.display().to_string(), info.is_symlink()));
        Ok(Flow::Continue)
    })
    .await
    .unwrap();

    let expect = vec![
        (".".to_owned(), ".".to_owned(), false),
        ("./a".to_owned(), "./a".to_owned(), false),
        ("./a/f.txt".to_owned(), "./a/f.txt".to_owned(), false),
        ("./b.txt".to_owned(), "./b.txt".to_owned(), false),
        ("./link".to_owned(), "./link".to_owned(), true),
    ];
    assert_eq!(seen, expect);
}

#[tokio::test]
async fn resolved_walk_reports_the_target_real_path() {
    let fs = sample_fs().await;
    let mut links: Vec<(String, String)> = Vec::new();
    walk(&fs, p("."), WalkOptions { resolve_symlinks: true }, |virt, real, info, err| {
        assert!(err.is_none());
        let info = info.expect("info present");
        assert!(!info.is_symlink());
        if virt.ends_with("link") {
            links.push((virt.display().to_string(), real.display().to_string()));
        }
        Ok(Flow::Continue)
    })
    .await
    .unwrap();
    assert_eq!(links, vec![("./link".to_owned(), "b.txt".to_owned())]);
}

#[tokio::test]
async fn mutual_symlinks_surface_a_loop_error_and_walk_completes() {
    let fs = MemFs::new();
    fs.symlink(p("b"), p("a")).await.unwrap();
    fs.symlink(p("a"), p("b")).await.unwrap();

    let mut loops = 0;
    walk(&fs, p("."), WalkOptions { resolve_symlinks: true }, |_virt, _real, _info, err| {
        if let Some(err) = err {
            assert_eq!(err.kind(), ErrorKind::Loop);
            loops += 1;
        }
        Ok(Flow::Continue)
    })
    .await
    .unwrap();
    assert!(loops >= 1);
}

#[tokio::test]
async fn symlink_cycle_back_to_an_ancestor_terminates() {
    let fs = MemFs::new();
    fs.mkdir_all(p("top/mid"), 0o755).await.unwrap();
    fs.symlink(p("../.."), p("top/mid/up")).await.unwrap();

    let mut visits: Vec<String> = Vec::new();
    walk(&fs, p("."), WalkOptions { resolve_symlinks: true }, |virt, _real, info, err| {
        assert!(err.is_none());
        let _ = info.expect("info present");
        visits.push(virt.display().to_string());
        Ok(Flow::Continue)
    })
    .await
    .unwrap();

    // The cycle node is visited once and never descended into.
    assert_eq!(visits, vec![".", "./top", "./top/mid", "./top/mid/up"]);
}

#[tokio::test]
async fn skip_dir_prunes_a_subtree() {
    let fs = MemFs::new();
    Fixture::parse("keep/\nkeep/k.txt: x\nprune/\nprune/hidden.txt: y\n")
        .unwrap()
        .apply(&fs)
        .await
        .unwrap();

    let mut visits: Vec<PathBuf> = Vec::new();
    walk(&fs, p("."), WalkOptions::default(), |virt, _real, _info, _err| {
        visits.push(virt.to_path_buf());
        if virt.ends_with("prune") {
            return Ok(Flow::SkipDir);
        }
        Ok(Flow::Continue)
    })
    .await
    .unwrap();

    assert!(visits.iter().any(|path| path.ends_with("k.txt")));
    assert!(!visits.iter().any(|path| path.ends_with("hidden.txt")));
}

#[tokio::test]
async fn skip_all_stops_the_walk_without_error() {
    let fs = sample_fs().await;
    let mut count = 0;
    walk(&fs, p("."), WalkOptions::default(), |_virt, _real, _info, _err| {
        count += 1;
        if count == 2 {
            return Ok(Flow::SkipAll);
        }
        Ok(Flow::Continue)
    })
    .await
    .unwrap();
    assert_eq!(count, 2);
}

#[tokio::test]
async fn visitor_errors_abort_the_walk() {
    let fs = sample_fs().await;
    let mut count = 0;
    let err = walk(&fs, p("."), WalkOptions::default(), |_virt, _real, _info, _err| {
        count += 1;
        Err(VfsError::Kind(ErrorKind::Io))
    })
    .await
    .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Io);
    assert_eq!(count, 1);
}

#[tokio::test]
async fn unreadable_directories_are_routed_through_the_visitor() {
    let fs = MemFs::new();
    fs.mkdir(p("sealed"), 0o755).await.unwrap();
    fs.chmod(p("sealed"), 0o311).await.unwrap();

    let mut failures: Vec<String> = Vec::new();
    walk(&fs, p("."), WalkOptions::default(), |virt, _real, _info, err| {
        if let Some(err) = err {
            assert_eq!(err.kind(), ErrorKind::Permission);
            failures.push(virt.display().to_string());
        }
        Ok(Flow::Continue)
    })
    .await
    .unwrap();
    assert_eq!(failures, vec!["./sealed"]);
}

#[tokio::test]
async fn walking_a_single_file_visits_just_that_file() {
    let fs = sample_fs().await;
    let mut visits = 0;
    walk(&fs, p("b.txt"), WalkOptions::default(), |virt, real, info, err| {
        assert!(err.is_none());
        assert_eq!(virt, p("b.txt"));
        assert_eq!(real, p("b.txt"));
        assert!(!info.expect("info present").is_dir());
        visits += 1;
        Ok(Flow::Continue)
    })
    .await
    .unwrap();
    assert_eq!(visits, 1);
}
