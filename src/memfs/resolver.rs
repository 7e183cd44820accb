//! Defines the path resolver --- the component-by-component walk that
//! enforces root containment and follows symlinks with loop detection.
//!
//! Resolution keeps a cleaned path under work and restarts from its first
//! component after every symlink substitution, so each newly introduced
//! component is checked like any other. The symlink budget is shared
//! across the whole walk, mirroring kernel behavior for chained links.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::path;
use crate::vfs::{ErrorKind, SYMLINK_BUDGET};

use super::node::{DirNode, Node};
use super::Containment;

/// Outcome of a resolution.
pub(crate) enum Resolved {
    /// The path names an entry of the synthetic tree. `real` is its
    /// canonical in-tree path (`.` for the root).
    Entry { node: Node, real: String },
    /// Lax mode only: a symlink substitution left the tree and the path
    /// continues on the host.
    Host(PathBuf),
}

/// Outcome of resolving the parent directory of a mutation target.
pub(crate) enum ResolvedDir {
    Entry { dir: Arc<DirNode>, real: String },
    Host(PathBuf),
}

pub(crate) struct Resolver<'a> {
    pub root: &'a Arc<DirNode>,
    pub containment: Containment,
    pub host_anchor: Option<&'a Path>,
}

enum Substituted {
    /// The substitute stayed inside the root.
    Local(String),
    /// The substitute leads outside; the payload is the host path it
    /// denotes, including any remaining components.
    Escape(PathBuf),
}

impl Resolver<'_> {
    /// Resolves a cleaned local path to an entry.
    ///
    /// With `skip_last` set the final component is not substituted, so a
    /// symlink at the end of the path is returned as itself.
    pub async fn resolve(&self, target: &str, skip_last: bool) -> Result<Resolved, ErrorKind> {
        let mut budget = SYMLINK_BUDGET;
        let mut prev: Option<String> = None;
        let mut prev_prev: Option<String> = None;
        let mut current = target.to_owned();

        'restart: loop {
            if current == "." {
                let node = Node::Dir(self.root.clone());
                return Ok(Resolved::Entry { node, real: ".".to_owned() });
            }
            let comps: Vec<String> = current.split('/').map(str::to_owned).collect();
            let mut dir = self.root.clone();
            let mut prefix = String::from(".");
            for (i, comp) in comps.iter().enumerate() {
                let last = i + 1 == comps.len();
                if !dir.meta.read().await.can_search() {
                    return Err(ErrorKind::Permission);
                }
                let child = dir.children.read().await.get(comp).ok_or(ErrorKind::NotFound)?;
                let child_path = path::join(&prefix, comp);
                match child {
                    Node::Symlink(link) if !(last && skip_last) => {
                        if budget == 0 {
                            return Err(ErrorKind::Loop);
                        }
                        budget -= 1;
                        if prev_prev.as_deref() == Some(current.as_str()) {
                            return Err(ErrorKind::Loop);
                        }
                        let remainder = comps[i + 1..].join("/");
                        match self.substitute(&prefix, &link.target, &remainder)? {
                            Substituted::Local(next) => {
                                prev_prev = prev.take();
                                prev = Some(current);
                                current = next;
                                continue 'restart;
                            }
                            Substituted::Escape(host) => {
                                return match self.containment {
                                    Containment::Strict => Err(ErrorKind::PathEscapes),
                                    Containment::Lax => Ok(Resolved::Host(host)),
                                };
                            }
                        }
                    }
                    node if last => return Ok(Resolved::Entry { node, real: child_path }),
                    Node::Dir(next) => {
                        dir = next;
                        prefix = child_path;
                    }
                    _ => return Err(ErrorKind::NotADirectory),
                }
            }
            return Err(ErrorKind::NotFound);
        }
    }

    /// Resolves a cleaned local path that must name a directory, checking
    /// its search bit so callers may look up children in it.
    pub async fn resolve_dir(&self, target: &str) -> Result<ResolvedDir, ErrorKind> {
        match self.resolve(target, false).await? {
            Resolved::Entry { node: Node::Dir(dir), real } => {
                if !dir.meta.read().await.can_search() {
                    return Err(ErrorKind::Permission);
                }
                Ok(ResolvedDir::Entry { dir, real })
            }
            Resolved::Entry { .. } => Err(ErrorKind::NotADirectory),
            Resolved::Host(host) => Ok(ResolvedDir::Host(host)),
        }
    }

    /// Replaces a symlink component with its target and classifies the
    /// result as local or escaping.
    fn substitute(
        &self,
        prefix: &str,
        target: &str,
        remainder: &str,
    ) -> Result<Substituted, ErrorKind> {
        if target.is_empty() || target.contains('\0') {
            return Err(ErrorKind::Invalid);
        }
        if target.starts_with('/') {
            if matches!(self.containment, Containment::Strict) {
                return Ok(Substituted::Escape(PathBuf::new()));
            }
            let mut host = path::from_slash(target);
            if !remainder.is_empty() {
                host.push(path::from_slash(remainder));
            }
            return Ok(Substituted::Escape(host));
        }
        let substitute = path::clean(&path::join(prefix, target));
        if substitute == ".." || substitute.starts_with("../") {
            let anchor = match self.containment {
                // Strict resolution reports the escape before anchoring
                // matters.
                Containment::Strict => return Ok(Substituted::Escape(PathBuf::new())),
                Containment::Lax => self.host_anchor.ok_or(ErrorKind::PathEscapes)?,
            };
            let mut host = anchor.join(path::from_slash(&substitute));
            if !remainder.is_empty() {
                host.push(path::from_slash(remainder));
            }
            return Ok(Substituted::Escape(host));
        }
        if remainder.is_empty() {
            Ok(Substituted::Local(substitute))
        } else {
            Ok(Substituted::Local(path::join(&substitute, remainder)))
        }
    }
}
