//! Defines the attribute records returned by stat-style operations.

/// Type bits embedded in a mode word.
pub const MODE_REGULAR: u32 = 0o100000;
/// Directory type bits.
pub const MODE_DIR: u32 = 0o040000;
/// Symbolic link type bits.
pub const MODE_SYMLINK: u32 = 0o120000;
/// Mask selecting the type bits of a mode word.
pub const MODE_TYPE_MASK: u32 = 0o170000;
/// Mask selecting the permission bits of a mode word.
pub const MODE_PERM_MASK: u32 = 0o777;

/// File type.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum FileType {
    Regular,
    Directory,
    Symlink,
}

impl FileType {
    /// Returns the type bits matching this variant.
    pub fn mode_bits(self) -> u32 {
        match self {
            FileType::Regular => MODE_REGULAR,
            FileType::Directory => MODE_DIR,
            FileType::Symlink => MODE_SYMLINK,
        }
    }

    pub fn is_dir(self) -> bool {
        self == FileType::Directory
    }

    pub fn is_symlink(self) -> bool {
        self == FileType::Symlink
    }
}

/// Time of file events, seconds and nanoseconds since the Unix epoch.
///
/// The zero value is used as a "leave unchanged" marker by
/// [`Fs::chtimes`](super::Fs::chtimes).
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FileTime {
    pub seconds: i64,
    pub nanos: u32,
}

impl FileTime {
    /// The zero timestamp.
    pub const ZERO: FileTime = FileTime { seconds: 0, nanos: 0 };

    pub fn is_zero(self) -> bool {
        self == FileTime::ZERO
    }
}

/// Stable identity of a filesystem object, used by the walker to detect
/// revisits of the same backing target.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct FileIdent {
    /// Device or filesystem instance the object lives on.
    pub device: u64,
    /// Inode number within the device.
    pub inode: u64,
}

/// File attributes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileInfo {
    /// Base name of the entry, without separators.
    pub name: String,
    /// Content length in bytes. Directories report zero; symlinks report
    /// the length of their target string.
    pub size: u64,
    /// Permission bits combined with the type bits of the variant.
    pub mode: u32,
    pub file_type: FileType,
    pub uid: u32,
    pub gid: u32,
    pub atime: FileTime,
    pub mtime: FileTime,
    /// Identity of the backing object, when the backend can answer.
    pub ident: Option<FileIdent>,
}

impl FileInfo {
    pub fn is_dir(&self) -> bool {
        self.file_type.is_dir()
    }

    pub fn is_symlink(&self) -> bool {
        self.file_type.is_symlink()
    }

    /// Returns only the permission bits of the mode word.
    pub fn perm(&self) -> u32 {
        self.mode & MODE_PERM_MASK
    }
}
