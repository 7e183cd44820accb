//! Defines the error taxonomy observed through [`Fs`](super::Fs) and
//! [`File`](super::File) operations.
//!
//! Every failure carries the operation name, the affected path or paths,
//! and a sentinel [`ErrorKind`] comparable for equality. Errors from
//! external file views are wrapped only to attach the operation and path;
//! the inner kind stays reachable through [`VfsError::kind`].

use std::io;

use thiserror::Error;

/// Result of [`Fs`](super::Fs) and [`File`](super::File) operations.
pub type VfsResult<T> = std::result::Result<T, VfsError>;

/// Sentinel error kinds.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Error)]
pub enum ErrorKind {
    /// The file or directory name specified does not exist.
    #[error("no such file or directory")]
    NotFound,
    /// The file specified already exists.
    #[error("file exists")]
    Exists,
    /// A non-directory was named where a directory operation needs one.
    #[error("not a directory")]
    NotADirectory,
    /// A directory was named in a non-directory operation.
    #[error("is a directory")]
    IsADirectory,
    /// An attempt was made to remove or replace a directory that was not
    /// empty.
    #[error("directory not empty")]
    NotEmpty,
    /// Invalid argument or unsupported argument for an operation.
    #[error("invalid argument")]
    Invalid,
    /// The handle does not permit the requested direction of transfer.
    #[error("bad file descriptor")]
    BadDescriptor,
    /// The caller does not have the permission bits required by the
    /// operation.
    #[error("permission denied")]
    Permission,
    /// A modifying operation was attempted on a read-only filesystem or
    /// view.
    #[error("read-only file system")]
    ReadOnly,
    /// The path, or a symlink substitution made while resolving it, leads
    /// outside the filesystem root.
    #[error("path escapes from parent")]
    PathEscapes,
    /// The handle was already closed.
    #[error("file already closed")]
    AlreadyClosed,
    /// Symlink resolution revisited an earlier path or exhausted its
    /// budget. The message matches the platform wording so portable tests
    /// recognize it.
    #[error("too many levels of symbolic links")]
    Loop,
    /// A view's close notification failed while its name was being
    /// detached. The structural change still happened.
    #[error("close failed during unlink")]
    ClosedWithError,
    /// Operation is not supported by this backend.
    #[error("operation not supported")]
    Unsupported,
    /// End of stream reached with a positive count outstanding.
    #[error("end of file")]
    Eof,
    /// A sub-reader reported end of stream while bytes remained in its
    /// declared range.
    #[error("unexpected end of file")]
    UnexpectedEof,
    /// A sub-reader returned more bytes than its declared size.
    #[error("reader returned more bytes than its declared size")]
    InvalidSize,
    /// A read was canceled through its cancellation handle.
    #[error("operation canceled")]
    Canceled,
    /// A hard error occurred in an underlying backend.
    #[error("input/output error")]
    Io,
}

/// Error produced by [`Fs`](super::Fs) and [`File`](super::File)
/// operations.
#[derive(Debug, Error)]
pub enum VfsError {
    /// Failure of an operation on a single path.
    #[error("{op} {path}: {source}")]
    Path {
        /// Operation name, lower case.
        op: &'static str,
        /// The path as supplied by the caller.
        path: String,
        /// The underlying failure.
        #[source]
        source: Box<VfsError>,
    },
    /// Failure of an operation relating two paths.
    #[error("{op} {old} {new}: {source}")]
    Link {
        /// Operation name, lower case.
        op: &'static str,
        /// The source path.
        old: String,
        /// The destination path.
        new: String,
        /// The underlying failure.
        #[source]
        source: Box<VfsError>,
    },
    /// A view close notification failed while its last name was being
    /// detached. The name is gone; the cause is preserved.
    #[error("close on unlink: {source}")]
    ViewClose {
        /// The close error reported by the view.
        #[source]
        source: Box<VfsError>,
    },
    /// Failure inside a concatenated read.
    #[error(transparent)]
    MultiRead(#[from] MultiReadError),
    /// Aggregate of close failures from a concatenated reader.
    #[error(transparent)]
    CloseAll(#[from] CloseAllError),
    /// A bare sentinel, used by view backends and wrapped by the core.
    #[error(transparent)]
    Kind(#[from] ErrorKind),
}

impl VfsError {
    /// Returns the sentinel kind behind any number of wrapping layers.
    pub fn kind(&self) -> ErrorKind {
        match self {
            VfsError::Path { source, .. } => source.kind(),
            VfsError::Link { source, .. } => source.kind(),
            VfsError::ViewClose { .. } => ErrorKind::ClosedWithError,
            VfsError::MultiRead(err) => err.kind,
            VfsError::CloseAll(_) => ErrorKind::ClosedWithError,
            VfsError::Kind(kind) => *kind,
        }
    }

    /// Reports whether the error bottoms out at `kind`.
    pub fn is(&self, kind: ErrorKind) -> bool {
        self.kind() == kind
    }

    /// Wraps a sentinel with an operation name and path.
    pub fn path(op: &'static str, path: impl Into<String>, kind: ErrorKind) -> Self {
        VfsError::Path { op, path: path.into(), source: Box::new(VfsError::Kind(kind)) }
    }

    /// Wraps an existing error with an operation name and path.
    pub fn wrap_path(op: &'static str, path: impl Into<String>, source: VfsError) -> Self {
        VfsError::Path { op, path: path.into(), source: Box::new(source) }
    }

    /// Wraps a sentinel with an operation name and the two paths it
    /// relates.
    pub fn link(
        op: &'static str,
        old: impl Into<String>,
        new: impl Into<String>,
        kind: ErrorKind,
    ) -> Self {
        VfsError::Link { op, old: old.into(), new: new.into(), source: Box::new(VfsError::Kind(kind)) }
    }

    /// Wraps an existing error with an operation name and two paths.
    pub fn wrap_link(
        op: &'static str,
        old: impl Into<String>,
        new: impl Into<String>,
        source: VfsError,
    ) -> Self {
        VfsError::Link { op, old: old.into(), new: new.into(), source: Box::new(source) }
    }
}

/// Detailed failure raised when a sub-reader of a concatenated stream
/// violates its declared size.
#[derive(Debug, Error)]
#[error("segment {segment} at offset {segment_offset} (stream offset {stream_offset}): {kind}")]
pub struct MultiReadError {
    /// Index of the offending segment.
    pub segment: usize,
    /// Offset within the segment at which the violation was observed.
    pub segment_offset: u64,
    /// Offset within the virtual stream.
    pub stream_offset: u64,
    /// The sentinel classifying the violation.
    pub kind: ErrorKind,
    /// The sub-reader error, when one was returned.
    #[source]
    pub source: Option<Box<VfsError>>,
}

/// Aggregate of per-segment close failures, indices preserved.
#[derive(Debug, Error)]
#[error("closing {} of {total} segments failed", failures.len())]
pub struct CloseAllError {
    /// Pairs of segment index and the close error it produced.
    pub failures: Vec<(usize, VfsError)>,
    /// Total number of segments that were asked to close.
    pub total: usize,
}

/// Maps a host `io::Error` to the closest sentinel kind.
pub fn map_io_error(err: &io::Error) -> ErrorKind {
    use io::ErrorKind::*;
    match err.kind() {
        NotFound => ErrorKind::NotFound,
        PermissionDenied => ErrorKind::Permission,
        AlreadyExists => ErrorKind::Exists,
        InvalidInput | InvalidData => ErrorKind::Invalid,
        NotADirectory => ErrorKind::NotADirectory,
        IsADirectory => ErrorKind::IsADirectory,
        DirectoryNotEmpty => ErrorKind::NotEmpty,
        ReadOnlyFilesystem => ErrorKind::ReadOnly,
        UnexpectedEof => ErrorKind::UnexpectedEof,
        Unsupported => ErrorKind::Unsupported,
        _ if is_filesystem_loop(err) => ErrorKind::Loop,
        _ => ErrorKind::Io,
    }
}

/// `io::ErrorKind::FilesystemLoop` is still gated behind the unstable
/// `io_error_more` feature, so detect the ELOOP errno directly instead.
#[cfg(unix)]
fn is_filesystem_loop(err: &io::Error) -> bool {
    const ELOOP: i32 = 40;
    err.raw_os_error() == Some(ELOOP)
}

#[cfg(not(unix))]
fn is_filesystem_loop(_err: &io::Error) -> bool {
    false
}
