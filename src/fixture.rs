//! Defines the line-oriented fixture language used to materialize a tree
//! on any filesystem.
//!
//! Grammar, one entry per line:
//!
//! ```text
//! dir/                  create a directory (recursively)
//! dir/ 750              ... with permissions
//! file.txt: content     write a file
//! file.txt: 600 content ... with permissions
//! name -> target        create a symlink
//! ```
//!
//! Blank or unrecognized lines are rejected. Permissions are octal and
//! masked to the low nine bits.

use std::path::Path;

use thiserror::Error;

use crate::path;
use crate::vfs::{Fs, OpenFlags, VfsResult};

const DEFAULT_DIR_PERM: u32 = 0o755;
const DEFAULT_FILE_PERM: u32 = 0o644;

/// A line the parser could not understand.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("fixture line {line}: unrecognized entry {text:?}")]
pub struct FixtureError {
    pub line: usize,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Entry {
    Dir { path: String, perm: u32 },
    File { path: String, perm: u32, content: Vec<u8> },
    Symlink { link: String, target: String },
}

/// A parsed fixture, ready to be applied to a filesystem.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fixture {
    entries: Vec<Entry>,
}

impl Fixture {
    /// Parses fixture text. Every line must match the grammar.
    pub fn parse(input: &str) -> Result<Fixture, FixtureError> {
        let mut entries = Vec::new();
        for (index, line) in input.lines().enumerate() {
            let entry = parse_line(line).ok_or_else(|| FixtureError {
                line: index + 1,
                text: line.to_owned(),
            })?;
            entries.push(entry);
        }
        Ok(Fixture { entries })
    }

    /// Materializes the fixture on `fs`, creating missing parents for
    /// file entries.
    pub async fn apply(&self, fs: &dyn Fs) -> VfsResult<()> {
        for entry in &self.entries {
            match entry {
                Entry::Dir { path: dir, perm } => {
                    fs.mkdir_all(&path::from_slash(dir), *perm).await?;
                }
                Entry::File { path: file, perm, content } => {
                    let (parent, _) = path::split_parent(file);
                    if parent != "." {
                        fs.mkdir_all(&path::from_slash(parent), DEFAULT_DIR_PERM).await?;
                    }
                    let flags = OpenFlags::create_truncate();
                    let handle =
                        fs.open_file(&path::from_slash(file), flags, *perm).await?;
                    let mut written = 0;
                    while written < content.len() {
                        written += handle.write(&content[written..]).await?;
                    }
                    handle.close().await?;
                }
                Entry::Symlink { link, target } => {
                    fs.symlink(&path::from_slash(target), &path::from_slash(link)).await?;
                }
            }
        }
        Ok(())
    }
}

/// Parses fixture text and applies it in one step.
pub async fn materialize(fs: &dyn Fs, input: &str) -> VfsResult<()> {
    let fixture = Fixture::parse(input).map_err(|_| crate::vfs::ErrorKind::Invalid)?;
    fixture.apply(fs).await
}

fn parse_perm(token: &str) -> Option<u32> {
    if token.is_empty() {
        return None;
    }
    u32::from_str_radix(token, 8).ok().map(|perm| perm & 0o777)
}

fn parse_line(line: &str) -> Option<Entry> {
    if line.trim().is_empty() {
        return None;
    }
    let mut tokens = line.split_whitespace();
    let head = tokens.next()?;
    if head.ends_with('/') && head.len() > 1 {
        let dir = head.trim_end_matches('/');
        if !valid_path(dir) {
            return None;
        }
        let perm = match tokens.next() {
            None => DEFAULT_DIR_PERM,
            Some(token) => parse_perm(token)?,
        };
        if tokens.next().is_some() {
            return None;
        }
        return Some(Entry::Dir { path: dir.to_owned(), perm });
    }
    if let Some(colon) = line.find(':') {
        let (file, rest) = line.split_at(colon);
        if !valid_path(file) {
            return None;
        }
        let rest = rest[1..].strip_prefix(' ').unwrap_or(&rest[1..]);
        let (perm, content) = match rest.split_once(' ') {
            Some((first, tail)) => match parse_perm(first) {
                Some(perm) => (perm, tail),
                None => (DEFAULT_FILE_PERM, rest),
            },
            None => (DEFAULT_FILE_PERM, rest),
        };
        return Some(Entry::File {
            path: file.to_owned(),
            perm,
            content: content.as_bytes().to_vec(),
        });
    }
    if let Some((link, target)) = line.split_once(" -> ") {
        let link = link.trim();
        let target = target.trim();
        if !valid_path(link) || target.is_empty() {
            return None;
        }
        return Some(Entry::Symlink { link: link.to_owned(), target: target.to_owned() });
    }
    None
}

fn valid_path(p: &str) -> bool {
    !p.is_empty() && !p.contains(char::is_whitespace) && Path::new(p).is_relative()
}
