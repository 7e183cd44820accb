//! Defines the flag set accepted by [`Fs::open_file`](super::Fs::open_file).

/// Open flag set.
///
/// The shape mirrors `std::fs::OpenOptions`: each flag is independent and
/// the combination is validated by the filesystem at open time.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
pub struct OpenFlags {
    /// Allow reads through the handle.
    pub read: bool,
    /// Allow writes through the handle.
    pub write: bool,
    /// Position every write at the current end of the file.
    pub append: bool,
    /// Create the file when it does not exist.
    pub create: bool,
    /// Create the file, failing when it already exists.
    pub create_new: bool,
    /// Truncate the file to zero length on open.
    pub truncate: bool,
}

impl OpenFlags {
    /// Flags for a plain read.
    pub fn read_only() -> Self {
        OpenFlags { read: true, ..Default::default() }
    }

    /// Flags for a plain write to an existing file.
    pub fn write_only() -> Self {
        OpenFlags { write: true, ..Default::default() }
    }

    /// Flags for reading and writing an existing file.
    pub fn read_write() -> Self {
        OpenFlags { read: true, write: true, ..Default::default() }
    }

    /// The flag set used by `Create`: write, create, truncate.
    pub fn create_truncate() -> Self {
        OpenFlags { write: true, create: true, truncate: true, ..Default::default() }
    }

    pub fn with_append(mut self) -> Self {
        self.append = true;
        self.write = true;
        self
    }

    pub fn with_create(mut self) -> Self {
        self.create = true;
        self
    }

    pub fn with_create_new(mut self) -> Self {
        self.create_new = true;
        self
    }

    pub fn with_truncate(mut self) -> Self {
        self.truncate = true;
        self
    }

    /// Reports whether the handle may modify content.
    pub fn writable(&self) -> bool {
        self.write || self.append
    }

    /// Reports whether the handle may read content.
    pub fn readable(&self) -> bool {
        self.read
    }

    /// Reports whether the open is allowed to create the file.
    pub fn creating(&self) -> bool {
        self.create || self.create_new
    }
}
