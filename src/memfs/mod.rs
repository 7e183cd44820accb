//! Defines the synthetic in-memory filesystem --- [`MemFs`].
//!
//! The tree lives in process memory; file bytes sit behind pluggable
//! [`FileView`] providers supplied by a [`ViewAllocator`]. Containment is
//! chosen at construction: a strict filesystem rejects every escape from
//! its root, a lax one lets symlink targets continue on the host.

mod handle;
mod host;
mod node;
mod resolver;
mod view;

pub use view::{MemFileView, MemViewAllocator};

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use crate::clock::{SystemClock, WallClock};
use crate::path;
use crate::vfs::{
    ErrorKind, File, FileInfo, FileTime, FileType, Fs, OpenFlags, RootedFs, UnrootedFs, VfsError,
    VfsResult, ViewAllocator,
};

use handle::{DirHandle, EntryFile};
use node::{DirNode, FileNode, Meta, Node, SymlinkNode, ViewShare};
use resolver::{Resolved, ResolvedDir, Resolver};

static NEXT_DEVICE: AtomicU64 = AtomicU64::new(1);

const ROOT_INO: u64 = 1;

/// Root containment policy.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Containment {
    /// Reject literal `..` escapes and symlink targets leading outside.
    Strict,
    /// Reject literal `..` escapes but evaluate escaping symlink targets
    /// on the host.
    Lax,
}

enum AllocatorChoice {
    Memory,
    None,
    Custom(Arc<dyn ViewAllocator>),
}

/// Builder for [`MemFs`].
pub struct MemFsBuilder {
    name: String,
    clock: Arc<dyn WallClock>,
    allocator: AllocatorChoice,
    umask: u32,
    containment: Containment,
    host_anchor: Option<PathBuf>,
}

impl MemFsBuilder {
    fn new() -> MemFsBuilder {
        MemFsBuilder {
            name: "memfs".to_owned(),
            clock: Arc::new(SystemClock),
            allocator: AllocatorChoice::Memory,
            umask: 0o022,
            containment: Containment::Strict,
            host_anchor: None,
        }
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn clock(mut self, clock: Arc<dyn WallClock>) -> Self {
        self.clock = clock;
        self
    }

    /// Replaces the default in-memory allocator.
    pub fn allocator(mut self, allocator: Arc<dyn ViewAllocator>) -> Self {
        self.allocator = AllocatorChoice::Custom(allocator);
        self
    }

    /// Removes the allocator entirely; creates then fail read-only.
    pub fn no_allocator(mut self) -> Self {
        self.allocator = AllocatorChoice::None;
        self
    }

    pub fn umask(mut self, umask: u32) -> Self {
        self.umask = umask & 0o777;
        self
    }

    pub fn containment(mut self, containment: Containment) -> Self {
        self.containment = containment;
        self
    }

    /// Host directory that relative escaping symlink targets are joined
    /// onto in lax mode. Without one, only absolute targets can leave the
    /// root.
    pub fn host_anchor(mut self, anchor: impl Into<PathBuf>) -> Self {
        self.host_anchor = Some(anchor.into());
        self
    }

    pub fn build(self) -> MemFs {
        let now = self.clock.now();
        let allocator: Option<Arc<dyn ViewAllocator>> = match self.allocator {
            AllocatorChoice::Memory => Some(Arc::new(MemViewAllocator::new(self.clock.clone()))),
            AllocatorChoice::None => None,
            AllocatorChoice::Custom(custom) => Some(custom),
        };
        MemFs {
            name: self.name,
            root: DirNode::new(ROOT_INO, 0o755, now),
            clock: self.clock,
            allocator,
            umask: self.umask,
            containment: self.containment,
            host_anchor: self.host_anchor,
            device: NEXT_DEVICE.fetch_add(1, Ordering::Relaxed),
            next_ino: Arc::new(AtomicU64::new(ROOT_INO + 1)),
        }
    }
}

/// Synthetic filesystem backed by an in-memory tree.
///
/// Operations may be invoked concurrently; each directory and each file
/// view carries its own lock and no global lock exists.
pub struct MemFs {
    name: String,
    root: Arc<DirNode>,
    clock: Arc<dyn WallClock>,
    allocator: Option<Arc<dyn ViewAllocator>>,
    umask: u32,
    containment: Containment,
    host_anchor: Option<PathBuf>,
    device: u64,
    next_ino: Arc<AtomicU64>,
}

impl MemFs {
    /// A strict, empty filesystem with the default allocator and clock.
    pub fn new() -> MemFs {
        MemFs::builder().build()
    }

    pub fn builder() -> MemFsBuilder {
        MemFsBuilder::new()
    }

    pub fn containment(&self) -> Containment {
        self.containment
    }

    fn resolver(&self) -> Resolver<'_> {
        Resolver {
            root: &self.root,
            containment: self.containment,
            host_anchor: self.host_anchor.as_deref(),
        }
    }

    fn mint_ino(&self) -> u64 {
        self.next_ino.fetch_add(1, Ordering::Relaxed)
    }

    fn now(&self) -> FileTime {
        self.clock.now()
    }

    /// Validates a boundary path and returns its display and cleaned
    /// slash forms.
    fn local(&self, op: &'static str, p: &Path) -> VfsResult<(String, String)> {
        let display = p.display().to_string();
        let slash =
            path::to_slash(p).map_err(|kind| VfsError::path(op, display.clone(), kind))?;
        let cleaned = path::ensure_local(&slash)
            .map_err(|kind| VfsError::path(op, display.clone(), kind))?;
        Ok((display, cleaned))
    }

    async fn entry(
        &self,
        op: &'static str,
        display: &str,
        cleaned: &str,
        skip_last: bool,
    ) -> VfsResult<Resolved> {
        self.resolver()
            .resolve(cleaned, skip_last)
            .await
            .map_err(|kind| VfsError::path(op, display, kind))
    }

    async fn parent_of(
        &self,
        op: &'static str,
        display: &str,
        cleaned: &str,
    ) -> VfsResult<ResolvedDir> {
        let (dir_part, _) = path::split_parent(cleaned);
        self.resolver()
            .resolve_dir(dir_part)
            .await
            .map_err(|kind| VfsError::path(op, display, kind))
    }

    async fn touch(&self, dir: &Arc<DirNode>) {
        dir.meta.write().await.mtime = self.now();
    }

    fn base_name(cleaned: &str) -> &str {
        path::split_parent(cleaned).1
    }
}

/// Validates that `victim` may be replaced by `moved` in a rename.
async fn check_replace(moved: &Node, victim: &Node) -> Result<(), ErrorKind> {
    match (victim, moved) {
        (Node::Dir(dir), Node::Dir(_)) => {
            if dir.children.read().await.is_empty() {
                Ok(())
            } else {
                Err(ErrorKind::NotEmpty)
            }
        }
        (Node::Dir(_), _) => Err(ErrorKind::IsADirectory),
        (_, Node::Dir(_)) => Err(ErrorKind::NotADirectory),
        _ => Ok(()),
    }
}

impl Default for MemFs {
    fn default() -> Self {
        MemFs::new()
    }
}

#[async_trait]
impl Fs for MemFs {
    fn name(&self) -> String {
        self.name.clone()
    }

    async fn open_file(
        &self,
        p: &Path,
        flags: OpenFlags,
        perm: u32,
    ) -> VfsResult<Box<dyn File>> {
        const OP: &str = "open";
        let (display, mut cleaned) = self.local(OP, p)?;
        let mut hops = 0usize;
        loop {
            match self.resolver().resolve(&cleaned, false).await {
                Ok(Resolved::Entry { node, .. }) => {
                    if flags.create_new {
                        return Err(VfsError::path(OP, display, ErrorKind::Exists));
                    }
                    match node {
                        Node::Dir(dir) => {
                            if flags.writable() || flags.truncate {
                                return Err(VfsError::path(
                                    OP,
                                    display,
                                    ErrorKind::IsADirectory,
                                ));
                            }
                            return Ok(Box::new(DirHandle::new(display, dir, self.device)));
                        }
                        Node::File(file) => {
                            let meta = *file.meta.read().await;
                            if flags.readable() && !meta.can_read() {
                                return Err(VfsError::path(OP, display, ErrorKind::Permission));
                            }
                            if (flags.writable() || flags.truncate) && !meta.can_write() {
                                return Err(VfsError::path(OP, display, ErrorKind::Permission));
                            }
                            if flags.truncate {
                                file.share
                                    .view
                                    .truncate(0)
                                    .await
                                    .map_err(|e| VfsError::wrap_path(OP, display.clone(), e))?;
                            }
                            let inner = file
                                .share
                                .view
                                .clone()
                                .open(flags)
                                .await
                                .map_err(|e| VfsError::wrap_path(OP, display.clone(), e))?;
                            return Ok(Box::new(EntryFile::new(
                                inner,
                                file,
                                display,
                                self.device,
                            )));
                        }
                        Node::Symlink(_) => {
                            return Err(VfsError::path(OP, display, ErrorKind::Invalid));
                        }
                    }
                }
                Ok(Resolved::Host(target)) => {
                    return host::open(target, flags, perm & !self.umask)
                        .await
                        .map_err(|e| VfsError::wrap_path(OP, display, e));
                }
                Err(ErrorKind::NotFound) if flags.creating() => {
                    let parent = self.parent_of(OP, &display, &cleaned).await?;
                    let name = Self::base_name(&cleaned).to_owned();
                    let (dir, dir_real) = match parent {
                        ResolvedDir::Entry { dir, real } => (dir, real),
                        ResolvedDir::Host(dir_path) => {
                            return host::open(dir_path.join(&name), flags, perm & !self.umask)
                                .await
                                .map_err(|e| VfsError::wrap_path(OP, display, e));
                        }
                    };
                    if !dir.meta.read().await.can_write() {
                        return Err(VfsError::path(OP, display, ErrorKind::Permission));
                    }
                    // A dangling symlink occupies the name: creation lands
                    // on its substituted target, as the host would do.
                    let occupant = dir.children.read().await.get(&name);
                    if let Some(Node::Symlink(link)) = occupant {
                        if flags.create_new {
                            return Err(VfsError::path(OP, display, ErrorKind::Exists));
                        }
                        hops += 1;
                        if hops > crate::vfs::SYMLINK_BUDGET {
                            return Err(VfsError::path(OP, display, ErrorKind::Loop));
                        }
                        cleaned = match self.substitute_for_create(
                            OP, &display, &dir_real, &link.target, flags, perm,
                        ).await? {
                            CreateTarget::Local(next) => next,
                            CreateTarget::Opened(handle) => return Ok(handle),
                        };
                        continue;
                    }
                    let allocator = self
                        .allocator
                        .as_ref()
                        .ok_or_else(|| {
                            VfsError::path(OP, display.clone(), ErrorKind::ReadOnly)
                        })?
                        .clone();
                    let masked = perm & !self.umask & 0o777;
                    let view = allocator
                        .allocate(&path::from_slash(&cleaned), masked)
                        .await
                        .map_err(|e| VfsError::wrap_path(OP, display.clone(), e))?;
                    {
                        let mut children = dir.children.write().await;
                        if children.contains(&name) {
                            // Lost the race; evaluate the winner instead.
                            continue;
                        }
                        let entry = Arc::new(FileNode {
                            ino: self.mint_ino(),
                            meta: tokio::sync::RwLock::new(Meta::new(
                                FileType::Regular,
                                masked,
                                self.now(),
                            )),
                            share: ViewShare::new(view.clone()),
                        });
                        children.insert(&name, Node::File(entry.clone()));
                        drop(children);
                        self.touch(&dir).await;
                        debug!(path = %cleaned, "created file");
                        let inner = view
                            .open(flags)
                            .await
                            .map_err(|e| VfsError::wrap_path(OP, display.clone(), e))?;
                        return Ok(Box::new(EntryFile::new(inner, entry, display, self.device)));
                    }
                }
                Err(kind) => return Err(VfsError::path(OP, display, kind)),
            }
        }
    }

    async fn mkdir(&self, p: &Path, perm: u32) -> VfsResult<()> {
        const OP: &str = "mkdir";
        let (display, cleaned) = self.local(OP, p)?;
        if cleaned == "." {
            return Err(VfsError::path(OP, display, ErrorKind::Exists));
        }
        let parent = self.parent_of(OP, &display, &cleaned).await?;
        let dir = match parent {
            ResolvedDir::Entry { dir, .. } => dir,
            ResolvedDir::Host(_) => {
                return Err(VfsError::path(OP, display, ErrorKind::Unsupported));
            }
        };
        if !dir.meta.read().await.can_write() {
            return Err(VfsError::path(OP, display, ErrorKind::Permission));
        }
        let name = Self::base_name(&cleaned);
        let mut children = dir.children.write().await;
        if children.contains(name) {
            return Err(VfsError::path(OP, display, ErrorKind::Exists));
        }
        let node = DirNode::new(self.mint_ino(), perm & !self.umask, self.now());
        children.insert(name, Node::Dir(node));
        drop(children);
        self.touch(&dir).await;
        debug!(path = %cleaned, "created directory");
        Ok(())
    }

    async fn mkdir_all(&self, p: &Path, perm: u32) -> VfsResult<()> {
        const OP: &str = "mkdir";
        let (display, cleaned) = self.local(OP, p)?;
        if cleaned == "." {
            return Ok(());
        }
        for prefix in path::prefixes(&cleaned) {
            match self.resolver().resolve(prefix, false).await {
                Ok(Resolved::Entry { node: Node::Dir(_), .. }) => {}
                Ok(Resolved::Entry { .. }) => {
                    return Err(VfsError::path(
                        OP,
                        path::from_slash(prefix).display().to_string(),
                        ErrorKind::NotADirectory,
                    ));
                }
                Ok(Resolved::Host(_)) => {
                    return Err(VfsError::path(OP, display, ErrorKind::Unsupported));
                }
                Err(ErrorKind::NotFound) => {
                    match self.mkdir(&path::from_slash(prefix), perm).await {
                        Ok(()) => {}
                        Err(err) if err.kind() == ErrorKind::Exists => {}
                        Err(err) => return Err(err),
                    }
                }
                Err(kind) => return Err(VfsError::path(OP, display, kind)),
            }
        }
        Ok(())
    }

    async fn remove(&self, p: &Path) -> VfsResult<()> {
        const OP: &str = "remove";
        let (display, cleaned) = self.local(OP, p)?;
        if cleaned == "." {
            return Err(VfsError::path(OP, display, ErrorKind::Invalid));
        }
        let parent = self.parent_of(OP, &display, &cleaned).await?;
        let dir = match parent {
            ResolvedDir::Entry { dir, .. } => dir,
            ResolvedDir::Host(_) => {
                return Err(VfsError::path(OP, display, ErrorKind::Unsupported));
            }
        };
        if !dir.meta.read().await.can_write() {
            return Err(VfsError::path(OP, display, ErrorKind::Permission));
        }
        let name = Self::base_name(&cleaned);
        let mut children = dir.children.write().await;
        let node = children
            .get(name)
            .ok_or_else(|| VfsError::path(OP, display.clone(), ErrorKind::NotFound))?;
        if let Node::Dir(sub) = &node {
            if !sub.children.read().await.is_empty() {
                return Err(VfsError::path(OP, display, ErrorKind::NotEmpty));
            }
        }
        children.remove(name);
        drop(children);
        self.touch(&dir).await;
        debug!(path = %cleaned, "removed entry");
        if let Node::File(file) = node {
            if let Err(err) = file.share.release().await {
                return Err(VfsError::wrap_path(
                    OP,
                    display,
                    VfsError::ViewClose { source: Box::new(err) },
                ));
            }
        }
        Ok(())
    }

    async fn remove_all(&self, p: &Path) -> VfsResult<()> {
        const OP: &str = "removeall";
        let (display, cleaned) = self.local(OP, p)?;
        if cleaned == "." {
            return Err(VfsError::path(OP, display, ErrorKind::Invalid));
        }
        let parent = match self.parent_of(OP, &display, &cleaned).await {
            Ok(parent) => parent,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(()),
            Err(err) => return Err(err),
        };
        let dir = match parent {
            ResolvedDir::Entry { dir, .. } => dir,
            ResolvedDir::Host(_) => {
                return Err(VfsError::path(OP, display, ErrorKind::Unsupported));
            }
        };
        if !dir.meta.read().await.can_write() {
            return Err(VfsError::path(OP, display, ErrorKind::Permission));
        }
        let name = Self::base_name(&cleaned);
        let detached = {
            let mut children = dir.children.write().await;
            children.remove(name)
        };
        let Some(detached) = detached else {
            return Ok(());
        };
        self.touch(&dir).await;
        debug!(path = %cleaned, "removed subtree");
        let mut shares = Vec::new();
        let mut stack = vec![detached];
        while let Some(node) = stack.pop() {
            match node {
                Node::File(file) => shares.push(file.share.clone()),
                Node::Symlink(_) => {}
                Node::Dir(sub) => {
                    let entries = sub.children.read().await.entries();
                    stack.extend(entries.into_iter().map(|(_, child)| child));
                }
            }
        }
        let mut first_err = None;
        for share in shares {
            if let Err(err) = share.release().await {
                first_err.get_or_insert(err);
            }
        }
        match first_err {
            None => Ok(()),
            Some(err) => Err(VfsError::wrap_path(
                OP,
                display,
                VfsError::ViewClose { source: Box::new(err) },
            )),
        }
    }

    async fn rename(&self, old: &Path, new: &Path) -> VfsResult<()> {
        const OP: &str = "rename";
        let old_display = old.display().to_string();
        let new_display = new.display().to_string();
        let fail = |kind| VfsError::link(OP, old_display.clone(), new_display.clone(), kind);
        let old_clean = path::to_slash(old)
            .and_then(|s| path::ensure_local(&s))
            .map_err(&fail)?;
        let new_clean = path::to_slash(new)
            .and_then(|s| path::ensure_local(&s))
            .map_err(&fail)?;
        if old_clean == "." || new_clean == "." {
            return Err(fail(ErrorKind::Invalid));
        }
        if old_clean == new_clean {
            return Ok(());
        }
        if new_clean.starts_with(&format!("{old_clean}/")) {
            return Err(fail(ErrorKind::Invalid));
        }
        let (old_dir_part, old_name) = path::split_parent(&old_clean);
        let (new_dir_part, new_name) = path::split_parent(&new_clean);
        let (old_dir, old_real) = match self.resolver().resolve_dir(old_dir_part).await {
            Ok(ResolvedDir::Entry { dir, real }) => (dir, real),
            Ok(ResolvedDir::Host(_)) => return Err(fail(ErrorKind::Unsupported)),
            Err(kind) => return Err(fail(kind)),
        };
        let (new_dir, new_real) = match self.resolver().resolve_dir(new_dir_part).await {
            Ok(ResolvedDir::Entry { dir, real }) => (dir, real),
            Ok(ResolvedDir::Host(_)) => return Err(fail(ErrorKind::Unsupported)),
            Err(kind) => return Err(fail(kind)),
        };
        if !old_dir.meta.read().await.can_write() || !new_dir.meta.read().await.can_write() {
            return Err(fail(ErrorKind::Permission));
        }

        let same_dir = Arc::ptr_eq(&old_dir, &new_dir);
        let moved;
        let victim;
        if same_dir {
            let mut children = old_dir.children.write().await;
            moved = children.get(old_name).ok_or_else(|| fail(ErrorKind::NotFound))?;
            victim = children.get(new_name);
            if let Some(existing) = &victim {
                check_replace(&moved, existing).await.map_err(&fail)?;
            }
            children.insert(new_name, moved.clone());
            children.remove(old_name);
        } else {
            // Cross-directory renames take both child locks in
            // lexicographic order of the directories' canonical paths.
            let (mut source, mut target) = if old_real <= new_real {
                let source = old_dir.children.write().await;
                let target = new_dir.children.write().await;
                (source, target)
            } else {
                let target = new_dir.children.write().await;
                let source = old_dir.children.write().await;
                (source, target)
            };
            moved = source.get(old_name).ok_or_else(|| fail(ErrorKind::NotFound))?;
            victim = target.get(new_name);
            if let Some(existing) = &victim {
                check_replace(&moved, existing).await.map_err(&fail)?;
            }
            target.insert(new_name, moved.clone());
            source.remove(old_name);
        }
        self.touch(&old_dir).await;
        if !same_dir {
            self.touch(&new_dir).await;
        }
        debug!(from = %old_clean, to = %new_clean, "renamed entry");
        if let Some(Node::File(file)) = victim {
            if let Err(err) = file.share.release().await {
                return Err(VfsError::wrap_link(
                    OP,
                    old_display,
                    new_display,
                    VfsError::ViewClose { source: Box::new(err) },
                ));
            }
        }
        if let Node::File(file) = &moved {
            if let Err(err) = file.share.view.rename(&new_clean).await {
                tracing::trace!(path = %new_clean, error = %err, "rename notification failed");
            }
        }
        Ok(())
    }

    async fn link(&self, old: &Path, new: &Path) -> VfsResult<()> {
        const OP: &str = "link";
        let old_display = old.display().to_string();
        let new_display = new.display().to_string();
        let fail = |kind| VfsError::link(OP, old_display.clone(), new_display.clone(), kind);
        let old_clean = path::to_slash(old)
            .and_then(|s| path::ensure_local(&s))
            .map_err(&fail)?;
        let new_clean = path::to_slash(new)
            .and_then(|s| path::ensure_local(&s))
            .map_err(&fail)?;
        let source = match self.resolver().resolve(&old_clean, false).await {
            Ok(Resolved::Entry { node: Node::File(file), .. }) => file,
            Ok(Resolved::Entry { .. }) => return Err(fail(ErrorKind::Permission)),
            Ok(Resolved::Host(_)) => return Err(fail(ErrorKind::Unsupported)),
            Err(kind) => return Err(fail(kind)),
        };
        if new_clean == "." {
            return Err(fail(ErrorKind::Exists));
        }
        let (new_dir_part, new_name) = path::split_parent(&new_clean);
        let dir = match self.resolver().resolve_dir(new_dir_part).await {
            Ok(ResolvedDir::Entry { dir, .. }) => dir,
            Ok(ResolvedDir::Host(_)) => return Err(fail(ErrorKind::Unsupported)),
            Err(kind) => return Err(fail(kind)),
        };
        if !dir.meta.read().await.can_write() {
            return Err(fail(ErrorKind::Permission));
        }
        let mut children = dir.children.write().await;
        if children.contains(new_name) {
            return Err(fail(ErrorKind::Exists));
        }
        source.share.retain();
        let meta = *source.meta.read().await;
        let entry = Arc::new(FileNode {
            ino: source.ino,
            meta: tokio::sync::RwLock::new(meta),
            share: source.share.clone(),
        });
        children.insert(new_name, Node::File(entry));
        drop(children);
        self.touch(&dir).await;
        debug!(from = %old_clean, to = %new_clean, "linked file");
        Ok(())
    }

    async fn symlink(&self, target: &Path, link: &Path) -> VfsResult<()> {
        const OP: &str = "symlink";
        let target_display = target.display().to_string();
        let link_display = link.display().to_string();
        let fail = |kind| VfsError::link(OP, target_display.clone(), link_display.clone(), kind);
        let target_slash = path::to_slash(target).map_err(&fail)?;
        if target_slash.is_empty() {
            return Err(fail(ErrorKind::Invalid));
        }
        let link_clean = path::to_slash(link)
            .and_then(|s| path::ensure_local(&s))
            .map_err(&fail)?;
        if link_clean == "." {
            return Err(fail(ErrorKind::Exists));
        }
        let (dir_part, name) = path::split_parent(&link_clean);
        let dir = match self.resolver().resolve_dir(dir_part).await {
            Ok(ResolvedDir::Entry { dir, .. }) => dir,
            Ok(ResolvedDir::Host(_)) => return Err(fail(ErrorKind::Unsupported)),
            Err(kind) => return Err(fail(kind)),
        };
        if !dir.meta.read().await.can_write() {
            return Err(fail(ErrorKind::Permission));
        }
        let mut children = dir.children.write().await;
        if children.contains(name) {
            return Err(fail(ErrorKind::Exists));
        }
        let entry = Arc::new(SymlinkNode {
            ino: self.mint_ino(),
            meta: tokio::sync::RwLock::new(Meta::new(FileType::Symlink, 0o777, self.now())),
            target: target_slash,
        });
        children.insert(name, Node::Symlink(entry));
        drop(children);
        self.touch(&dir).await;
        debug!(link = %link_clean, "created symlink");
        Ok(())
    }

    async fn stat(&self, p: &Path) -> VfsResult<FileInfo> {
        const OP: &str = "stat";
        let (display, cleaned) = self.local(OP, p)?;
        match self.entry(OP, &display, &cleaned, false).await? {
            Resolved::Entry { node, real } => node
                .info(Self::base_name(&real), self.device)
                .await
                .map_err(|e| VfsError::wrap_path(OP, display, e)),
            Resolved::Host(target) => host::stat(&target, true)
                .await
                .map_err(|e| VfsError::wrap_path(OP, display, e)),
        }
    }

    async fn lstat(&self, p: &Path) -> VfsResult<FileInfo> {
        const OP: &str = "lstat";
        let (display, cleaned) = self.local(OP, p)?;
        match self.entry(OP, &display, &cleaned, true).await? {
            Resolved::Entry { node, real } => node
                .info(Self::base_name(&real), self.device)
                .await
                .map_err(|e| VfsError::wrap_path(OP, display, e)),
            Resolved::Host(target) => host::stat(&target, false)
                .await
                .map_err(|e| VfsError::wrap_path(OP, display, e)),
        }
    }

    async fn read_link(&self, p: &Path) -> VfsResult<PathBuf> {
        const OP: &str = "readlink";
        let (display, cleaned) = self.local(OP, p)?;
        match self.entry(OP, &display, &cleaned, true).await? {
            Resolved::Entry { node: Node::Symlink(link), .. } => {
                Ok(path::from_slash(&link.target))
            }
            Resolved::Entry { .. } => Err(VfsError::path(OP, display, ErrorKind::Invalid)),
            Resolved::Host(target) => host::read_link(&target)
                .await
                .map_err(|e| VfsError::wrap_path(OP, display, e)),
        }
    }

    async fn chmod(&self, p: &Path, mode: u32) -> VfsResult<()> {
        const OP: &str = "chmod";
        let (display, cleaned) = self.local(OP, p)?;
        match self.entry(OP, &display, &cleaned, false).await? {
            Resolved::Entry { node, .. } => {
                node.meta().write().await.set_perm(mode);
                Ok(())
            }
            Resolved::Host(target) => host::set_perm(&target, mode)
                .await
                .map_err(|e| VfsError::wrap_path(OP, display, e)),
        }
    }

    async fn chown(&self, p: &Path, uid: u32, gid: u32) -> VfsResult<()> {
        const OP: &str = "chown";
        let (display, cleaned) = self.local(OP, p)?;
        match self.entry(OP, &display, &cleaned, false).await? {
            Resolved::Entry { node, .. } => {
                let mut meta = node.meta().write().await;
                meta.uid = uid;
                meta.gid = gid;
                Ok(())
            }
            Resolved::Host(_) => Err(VfsError::path(OP, display, ErrorKind::Unsupported)),
        }
    }

    async fn lchown(&self, p: &Path, uid: u32, gid: u32) -> VfsResult<()> {
        const OP: &str = "lchown";
        let (display, cleaned) = self.local(OP, p)?;
        match self.entry(OP, &display, &cleaned, true).await? {
            Resolved::Entry { node, .. } => {
                let mut meta = node.meta().write().await;
                meta.uid = uid;
                meta.gid = gid;
                Ok(())
            }
            Resolved::Host(_) => Err(VfsError::path(OP, display, ErrorKind::Unsupported)),
        }
    }

    async fn chtimes(&self, p: &Path, atime: FileTime, mtime: FileTime) -> VfsResult<()> {
        const OP: &str = "chtimes";
        let (display, cleaned) = self.local(OP, p)?;
        match self.entry(OP, &display, &cleaned, false).await? {
            Resolved::Entry { node, .. } => {
                let mut meta = node.meta().write().await;
                if !atime.is_zero() {
                    meta.atime = atime;
                }
                if !mtime.is_zero() {
                    meta.mtime = mtime;
                }
                Ok(())
            }
            Resolved::Host(_) => Err(VfsError::path(OP, display, ErrorKind::Unsupported)),
        }
    }
}

#[async_trait]
impl RootedFs for MemFs {
    async fn open_root(&self, p: &Path) -> VfsResult<Arc<dyn RootedFs>> {
        let fs = self.reanchor("openroot", p, Containment::Strict).await?;
        Ok(Arc::new(fs))
    }
}

#[async_trait]
impl UnrootedFs for MemFs {
    async fn open_unrooted(&self, p: &Path) -> VfsResult<Arc<dyn UnrootedFs>> {
        let fs = self.reanchor("openunrooted", p, Containment::Lax).await?;
        Ok(Arc::new(fs))
    }
}

enum CreateTarget {
    /// Creation continues at this in-tree path.
    Local(String),
    /// Creation escaped in lax mode and the host handle is already open.
    Opened(Box<dyn File>),
}

impl MemFs {
    /// Resolves where a create through a dangling symlink should land.
    async fn substitute_for_create(
        &self,
        op: &'static str,
        display: &str,
        dir_real: &str,
        target: &str,
        flags: OpenFlags,
        perm: u32,
    ) -> VfsResult<CreateTarget> {
        if target.is_empty() || target.contains('\0') {
            return Err(VfsError::path(op, display, ErrorKind::Invalid));
        }
        let host_path = if target.starts_with('/') {
            match self.containment {
                Containment::Strict => {
                    return Err(VfsError::path(op, display, ErrorKind::PathEscapes));
                }
                Containment::Lax => path::from_slash(target),
            }
        } else {
            let substitute = path::clean(&path::join(dir_real, target));
            if substitute == ".." || substitute.starts_with("../") {
                match (self.containment, self.host_anchor.as_deref()) {
                    (Containment::Lax, Some(anchor)) => anchor.join(path::from_slash(&substitute)),
                    _ => return Err(VfsError::path(op, display, ErrorKind::PathEscapes)),
                }
            } else {
                return Ok(CreateTarget::Local(substitute));
            }
        };
        let handle = host::open(host_path, flags, perm & !self.umask)
            .await
            .map_err(|e| VfsError::wrap_path(op, display, e))?;
        Ok(CreateTarget::Opened(handle))
    }

    async fn reanchor(
        &self,
        op: &'static str,
        p: &Path,
        containment: Containment,
    ) -> VfsResult<MemFs> {
        let (display, cleaned) = self.local(op, p)?;
        let dir = match self.entry(op, &display, &cleaned, false).await? {
            Resolved::Entry { node: Node::Dir(dir), .. } => dir,
            Resolved::Entry { .. } => {
                return Err(VfsError::path(op, display, ErrorKind::NotADirectory));
            }
            Resolved::Host(_) => {
                return Err(VfsError::path(op, display, ErrorKind::Unsupported));
            }
        };
        Ok(MemFs {
            name: self.name.clone(),
            root: dir,
            clock: self.clock.clone(),
            allocator: self.allocator.clone(),
            umask: self.umask,
            containment,
            host_anchor: self.host_anchor.clone(),
            device: self.device,
            next_ino: self.next_ino.clone(),
        })
    }
}
