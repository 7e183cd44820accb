//! Defines the tree walker --- a traversal over any [`Fs`] that detects
//! filesystem loops by backing identity and keeps symlink resolution
//! within a budget.
//!
//! The walk is depth first in readdir order. Directory identities are
//! tracked down the active branch only, so revisiting the same real
//! target from a sibling branch is not treated as a loop.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use tracing::trace;

use crate::path;
use crate::vfs::{ErrorKind, FileIdent, FileInfo, Fs, VfsError, VfsResult, SYMLINK_BUDGET};

/// Walk configuration.
#[derive(Debug, Default, Clone, Copy)]
pub struct WalkOptions {
    /// Follow symlinks and emit the resolved target for each entry.
    pub resolve_symlinks: bool,
}

/// Visitor verdict for one entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    /// Keep walking.
    Continue,
    /// Skip the children of the directory just visited; on a non-directory
    /// entry, skip the remainder of the containing directory.
    SkipDir,
    /// Stop the whole walk without error.
    SkipAll,
}

#[derive(Hash, PartialEq, Eq, Clone)]
enum IdentKey {
    Ident(FileIdent),
    Path(String),
}

struct Frame {
    virtual_dir: PathBuf,
    /// Canonical path of the directory; empty once resolution left the
    /// tree.
    real_dir: PathBuf,
    children: Vec<FileInfo>,
    index: usize,
    budget: usize,
    key: Option<IdentKey>,
}

/// Walks the tree under `root`, invoking `visit` with
/// `(virtual_path, real_path, info, error)` for every entry.
///
/// Errors encountered at an entry are routed through the visitor, which
/// decides whether the walk continues. An error returned by the visitor
/// aborts the walk and is handed back to the caller.
pub async fn walk<F>(fs: &dyn Fs, root: &Path, options: WalkOptions, mut visit: F) -> VfsResult<()>
where
    F: FnMut(&Path, &Path, Option<&FileInfo>, Option<&VfsError>) -> VfsResult<Flow> + Send,
{
    let mut visited: HashSet<IdentKey> = HashSet::new();
    let mut stack: Vec<Frame> = Vec::new();

    let mut budget = SYMLINK_BUDGET;
    let root_info = match fs.lstat(root).await {
        Ok(info) => info,
        Err(err) => {
            visit(root, root, None, Some(&err))?;
            return Ok(());
        }
    };
    let mut real = Some(root.to_path_buf());
    let mut info = root_info;
    if options.resolve_symlinks && info.is_symlink() {
        match resolve_chain(fs, root, &mut budget).await {
            Ok((resolved_real, resolved_info)) => {
                real = resolved_real;
                info = resolved_info;
            }
            Err(err) => {
                visit(root, real.as_deref().unwrap_or(Path::new("")), Some(&info), Some(&err))?;
                return Ok(());
            }
        }
    }
    let real_path = real.clone().unwrap_or_default();
    match visit(root, &real_path, Some(&info), None)? {
        Flow::SkipAll | Flow::SkipDir => return Ok(()),
        Flow::Continue => {}
    }
    if !info.is_dir() {
        return Ok(());
    }
    match enter_dir(fs, root, &real_path, &info, budget, &mut visited, &mut visit).await? {
        Enter::Descend(frame) => stack.push(frame),
        Enter::Skip => {}
        Enter::Stop => return Ok(()),
    }

    'frames: while let Some(frame) = stack.last_mut() {
        if frame.index >= frame.children.len() {
            if let Some(key) = stack.pop().and_then(|frame| frame.key) {
                visited.remove(&key);
            }
            continue;
        }
        let child = frame.children[frame.index].clone();
        frame.index += 1;

        let virtual_path = frame.virtual_dir.join(&child.name);
        let outside = frame.real_dir.as_os_str().is_empty();
        let mut real = if outside {
            None
        } else {
            Some(frame.real_dir.join(&child.name))
        };
        let mut info = child;
        let mut budget = frame.budget;

        if options.resolve_symlinks && info.is_symlink() {
            match resolve_chain(fs, &virtual_path, &mut budget).await {
                Ok((resolved_real, resolved_info)) => {
                    real = resolved_real;
                    info = resolved_info;
                }
                Err(err) => {
                    let shown = real.clone().unwrap_or_default();
                    match visit(&virtual_path, &shown, Some(&info), Some(&err))? {
                        Flow::Continue => continue 'frames,
                        Flow::SkipDir => {
                            if let Some(key) = stack.pop().and_then(|frame| frame.key) {
                                visited.remove(&key);
                            }
                            continue 'frames;
                        }
                        Flow::SkipAll => return Ok(()),
                    }
                }
            }
        }

        let real_path = real.unwrap_or_default();
        match visit(&virtual_path, &real_path, Some(&info), None)? {
            Flow::Continue => {}
            Flow::SkipDir => {
                if !info.is_dir() {
                    if let Some(key) = stack.pop().and_then(|frame| frame.key) {
                        visited.remove(&key);
                    }
                }
                continue;
            }
            Flow::SkipAll => return Ok(()),
        }
        if !info.is_dir() {
            continue;
        }
        match enter_dir(fs, &virtual_path, &real_path, &info, budget, &mut visited, &mut visit)
            .await?
        {
            Enter::Descend(frame) => stack.push(frame),
            Enter::Skip => {}
            Enter::Stop => return Ok(()),
        }
    }
    Ok(())
}

enum Enter {
    Descend(Frame),
    Skip,
    Stop,
}

/// Prepares the frame for descending into a directory, suppressing the
/// descent when its identity was already seen on the active branch.
async fn enter_dir<F>(
    fs: &dyn Fs,
    virtual_path: &Path,
    real_path: &Path,
    info: &FileInfo,
    budget: usize,
    visited: &mut HashSet<IdentKey>,
    visit: &mut F,
) -> VfsResult<Enter>
where
    F: FnMut(&Path, &Path, Option<&FileInfo>, Option<&VfsError>) -> VfsResult<Flow> + Send,
{
    let key = match info.ident {
        Some(ident) => IdentKey::Ident(ident),
        None => {
            let fallback = if real_path.as_os_str().is_empty() { virtual_path } else { real_path };
            IdentKey::Path(fallback.display().to_string())
        }
    };
    if visited.contains(&key) {
        trace!(path = %virtual_path.display(), "directory already on branch, skipping children");
        return Ok(Enter::Skip);
    }
    let children = match list_dir(fs, virtual_path).await {
        Ok(children) => children,
        Err(err) => {
            return match visit(virtual_path, real_path, Some(info), Some(&err))? {
                Flow::SkipAll => Ok(Enter::Stop),
                Flow::Continue | Flow::SkipDir => Ok(Enter::Skip),
            };
        }
    };
    visited.insert(key.clone());
    Ok(Enter::Descend(Frame {
        virtual_dir: virtual_path.to_path_buf(),
        real_dir: real_path.to_path_buf(),
        children,
        index: 0,
        budget,
        key: Some(key),
    }))
}

async fn list_dir(fs: &dyn Fs, dir: &Path) -> VfsResult<Vec<FileInfo>> {
    let handle = fs.open(dir).await?;
    let result = handle.read_dir(None).await;
    let _ = handle.close().await;
    result
}

/// Follows a symlink chain to its first non-symlink target.
///
/// Returns the canonical in-tree path of the target, or `None` when the
/// chain leaves the tree and the target is served by the host. The budget
/// is decremented by every chain step.
async fn resolve_chain(
    fs: &dyn Fs,
    start: &Path,
    budget: &mut usize,
) -> VfsResult<(Option<PathBuf>, FileInfo)> {
    let mut current = start.to_path_buf();
    let mut prev: Option<String> = None;
    let mut prev_prev: Option<String> = None;
    loop {
        let info = fs.lstat(&current).await?;
        if !info.is_symlink() {
            return Ok((Some(current), info));
        }
        if *budget == 0 {
            return Err(VfsError::path("walk", current.display().to_string(), ErrorKind::Loop));
        }
        *budget -= 1;

        let current_slash = path::to_slash(&current)
            .map_err(|kind| VfsError::path("walk", current.display().to_string(), kind))?;
        let cleaned = path::clean(&current_slash);
        if prev_prev.as_deref() == Some(cleaned.as_str()) {
            return Err(VfsError::path("walk", current.display().to_string(), ErrorKind::Loop));
        }

        let target = fs.read_link(&current).await?;
        let target_slash = path::to_slash(&target)
            .map_err(|kind| VfsError::path("walk", current.display().to_string(), kind))?;
        let (dir, _) = path::split_parent(&cleaned);
        let escapes = target_slash.starts_with('/') || {
            let joined = path::clean(&path::join(dir, &target_slash));
            joined == ".." || joined.starts_with("../")
        };
        if escapes {
            // The target lives outside the tree; let the filesystem's own
            // containment decide, and report an empty real path.
            let info = fs.stat(&current).await?;
            return Ok((None, info));
        }
        let next = path::clean(&path::join(dir, &target_slash));
        prev_prev = prev.take();
        prev = Some(cleaned);
        current = path::from_slash(&next);
    }
}
