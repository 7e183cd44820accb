//! Defines the synthetic directory tree --- tagged nodes, ordered child
//! collections and the link set shared by hard links.
//!
//! Each directory carries its own reader-writer lock over the child
//! collection; entry metadata sits behind a separate lock so lookups do
//! not contend with attribute updates. Children never refer back to their
//! parent; every resolution descends from the filesystem root.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::RwLock;

use crate::vfs::file::MODE_PERM_MASK;
use crate::vfs::{FileIdent, FileInfo, FileTime, FileType, FileView, VfsResult};

/// Mutable attributes of a single directory entry.
#[derive(Debug, Copy, Clone)]
pub(crate) struct Meta {
    pub mode: u32,
    pub uid: u32,
    pub gid: u32,
    pub atime: FileTime,
    pub mtime: FileTime,
}

impl Meta {
    pub fn new(file_type: FileType, perm: u32, now: FileTime) -> Meta {
        Meta {
            mode: (perm & MODE_PERM_MASK) | file_type.mode_bits(),
            uid: 0,
            gid: 0,
            atime: now,
            mtime: now,
        }
    }

    /// Owner-class search bit, required on every directory along a lookup.
    pub fn can_search(&self) -> bool {
        self.mode & 0o100 != 0
    }

    /// Owner-class write bit, required on the parent of any mutation.
    pub fn can_write(&self) -> bool {
        self.mode & 0o200 != 0
    }

    /// Owner-class read bit, required to read a file or list a directory.
    pub fn can_read(&self) -> bool {
        self.mode & 0o400 != 0
    }

    /// Replaces the permission bits, keeping the type bits intact.
    pub fn set_perm(&mut self, perm: u32) {
        self.mode = (self.mode & !MODE_PERM_MASK) | (perm & MODE_PERM_MASK);
    }
}

/// A directory node.
pub(crate) struct DirNode {
    pub ino: u64,
    pub meta: RwLock<Meta>,
    pub children: RwLock<Children>,
}

impl DirNode {
    pub fn new(ino: u64, perm: u32, now: FileTime) -> Arc<DirNode> {
        Arc::new(DirNode {
            ino,
            meta: RwLock::new(Meta::new(FileType::Directory, perm, now)),
            children: RwLock::new(Children::new()),
        })
    }
}

/// A regular file node. Hard links are additional `FileNode`s sharing the
/// same [`ViewShare`] and inode but carrying their own metadata.
pub(crate) struct FileNode {
    pub ino: u64,
    pub meta: RwLock<Meta>,
    pub share: Arc<ViewShare>,
}

/// A symbolic link node. Owns nothing but its target string.
pub(crate) struct SymlinkNode {
    pub ino: u64,
    pub meta: RwLock<Meta>,
    /// Slash-normalized target, stored verbatim and evaluated at use time.
    pub target: String,
}

/// A node in the synthetic tree.
#[derive(Clone)]
pub(crate) enum Node {
    Dir(Arc<DirNode>),
    File(Arc<FileNode>),
    Symlink(Arc<SymlinkNode>),
}

impl Node {
    pub fn file_type(&self) -> FileType {
        match self {
            Node::Dir(_) => FileType::Directory,
            Node::File(_) => FileType::Regular,
            Node::Symlink(_) => FileType::Symlink,
        }
    }

    pub fn ino(&self) -> u64 {
        match self {
            Node::Dir(node) => node.ino,
            Node::File(node) => node.ino,
            Node::Symlink(node) => node.ino,
        }
    }

    pub fn meta(&self) -> &RwLock<Meta> {
        match self {
            Node::Dir(node) => &node.meta,
            Node::File(node) => &node.meta,
            Node::Symlink(node) => &node.meta,
        }
    }

    /// Builds the attribute record for this node under the given name.
    pub async fn info(&self, name: &str, device: u64) -> VfsResult<FileInfo> {
        let meta = *self.meta().read().await;
        let size = match self {
            Node::Dir(_) => 0,
            Node::File(node) => node.share.view.stat().await?.size,
            Node::Symlink(node) => node.target.len() as u64,
        };
        Ok(FileInfo {
            name: name.to_owned(),
            size,
            mode: meta.mode,
            file_type: self.file_type(),
            uid: meta.uid,
            gid: meta.gid,
            atime: meta.atime,
            mtime: meta.mtime,
            ident: Some(FileIdent { device, inode: self.ino() }),
        })
    }
}

/// Ordered, name-keyed child collection of a directory.
///
/// The map and the order sequence always agree: every name in the map
/// appears exactly once in the sequence. Insertion order is preserved and
/// replacing an existing name keeps its position.
pub(crate) struct Children {
    order: Vec<String>,
    map: HashMap<String, Node>,
}

impl Children {
    pub fn new() -> Children {
        Children { order: Vec::new(), map: HashMap::new() }
    }

    pub fn get(&self, name: &str) -> Option<Node> {
        self.map.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.map.contains_key(name)
    }

    pub fn insert(&mut self, name: &str, node: Node) {
        if self.map.insert(name.to_owned(), node).is_none() {
            self.order.push(name.to_owned());
        }
    }

    pub fn remove(&mut self, name: &str) -> Option<Node> {
        let node = self.map.remove(name)?;
        self.order.retain(|entry| entry != name);
        Some(node)
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Children in insertion order.
    pub fn entries(&self) -> Vec<(String, Node)> {
        self.order
            .iter()
            .map(|name| (name.clone(), self.map[name].clone()))
            .collect()
    }
}

/// Ownership of one [`FileView`] shared by every hard link to it.
///
/// The view receives its close notification when the last link is
/// detached; open handles keep the view alive past that point through
/// their own reference.
pub(crate) struct ViewShare {
    pub view: Arc<dyn FileView>,
    links: AtomicUsize,
}

impl ViewShare {
    pub fn new(view: Arc<dyn FileView>) -> Arc<ViewShare> {
        Arc::new(ViewShare { view, links: AtomicUsize::new(1) })
    }

    /// Records one more hard link.
    pub fn retain(&self) {
        self.links.fetch_add(1, Ordering::SeqCst);
    }

    /// Drops one hard link, notifying the view when it was the last.
    pub async fn release(&self) -> VfsResult<()> {
        if self.links.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.view.close().await
        } else {
            Ok(())
        }
    }
}
