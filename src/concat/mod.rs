//! Defines the concatenated reader --- a virtual, random-access
//! concatenation of sized byte sources --- and the cancellable decorator
//! layered over readers of the same shape.


use std::io::SeekFrom;
use std::sync::{Arc, Mutex, OnceLock};

use async_trait::async_trait;

use crate::vfs::{CloseAllError, ErrorKind, MultiReadError, VfsError, VfsResult};

/// Segment count up to which the containing segment is found by linear
/// scan; larger tables use binary search. Observable results never depend
/// on the crossover.
const LINEAR_SCAN_MAX: usize = 32;

/// A byte source with random-access reads and a declared size.
///
/// The declared size is a contract: reading inside `[0, size)` must yield
/// bytes, and the reader must never produce more than its declaration.
#[async_trait]
pub trait SizedReaderAt: Send + Sync {
    /// Reads up to `buf.len()` bytes at `offset`.
    async fn read_at(&self, buf: &mut [u8], offset: u64) -> VfsResult<usize>;

    /// Releases resources held by the reader.
    async fn close(&self) -> VfsResult<()> {
        Ok(())
    }
}

struct Segment {
    reader: Box<dyn SizedReaderAt>,
    start: u64,
    size: u64,
}

/// Random-access virtual concatenation of sized readers.
///
/// Reads crossing segment boundaries are stitched together; the cursor
/// used by [`ConcatReader::read`] and [`ConcatReader::seek`] is private to
/// this reader.
pub struct ConcatReader {
    segments: Vec<Segment>,
    total: u64,
    pos: Mutex<u64>,
}

impl ConcatReader {
    /// Builds the concatenation from `(reader, size)` pairs, precomputing
    /// each segment's starting offset in the virtual stream.
    pub fn new(parts: Vec<(Box<dyn SizedReaderAt>, u64)>) -> ConcatReader {
        let mut segments = Vec::with_capacity(parts.len());
        let mut start = 0u64;
        for (reader, size) in parts {
            segments.push(Segment { reader, start, size });
            start += size;
        }
        ConcatReader { segments, total: start, pos: Mutex::new(0) }
    }

    /// Total size of the virtual stream.
    pub fn size(&self) -> u64 {
        self.total
    }

    /// Index of the segment containing `offset`. The offset must be in
    /// range.
    fn segment_at(&self, offset: u64) -> usize {
        if self.segments.len() <= LINEAR_SCAN_MAX {
            for (i, segment) in self.segments.iter().enumerate() {
                if offset < segment.start + segment.size {
                    return i;
                }
            }
            self.segments.len().saturating_sub(1)
        } else {
            match self.segments.binary_search_by(|segment| segment.start.cmp(&offset)) {
                Ok(i) => i,
                Err(i) => i.saturating_sub(1),
            }
        }
    }

    /// Reads at an absolute offset.
    ///
    /// Requests past the virtual end return zero bytes; requests crossing
    /// it are clamped. A sub-reader that over-delivers or reports a
    /// premature end fails with a [`MultiReadError`] naming the segment.
    pub async fn read_at(&self, buf: &mut [u8], offset: u64) -> VfsResult<usize> {
        if offset >= self.total || buf.is_empty() {
            return Ok(0);
        }
        let want = (buf.len() as u64).min(self.total - offset) as usize;
        let mut filled = 0usize;
        let mut index = self.segment_at(offset);
        while filled < want {
            let segment = &self.segments[index];
            let stream_offset = offset + filled as u64;
            let segment_offset = stream_offset - segment.start;
            if segment_offset >= segment.size {
                index += 1;
                continue;
            }
            let room = (segment.size - segment_offset).min((want - filled) as u64) as usize;
            let n = segment
                .reader
                .read_at(&mut buf[filled..filled + room], segment_offset)
                .await
                .map_err(|err| MultiReadError {
                    segment: index,
                    segment_offset,
                    stream_offset,
                    kind: err.kind(),
                    source: Some(Box::new(err)),
                })?;
            if n > room {
                return Err(VfsError::MultiRead(MultiReadError {
                    segment: index,
                    segment_offset,
                    stream_offset,
                    kind: ErrorKind::InvalidSize,
                    source: None,
                }));
            }
            if n == 0 {
                return Err(VfsError::MultiRead(MultiReadError {
                    segment: index,
                    segment_offset,
                    stream_offset,
                    kind: ErrorKind::UnexpectedEof,
                    source: None,
                }));
            }
            filled += n;
        }
        Ok(filled)
    }

    /// Reads from the cursor, advancing it by the returned count. Returns
    /// zero at the end of the stream.
    pub async fn read(&self, buf: &mut [u8]) -> VfsResult<usize> {
        let offset = *self.pos.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        let n = self.read_at(buf, offset).await?;
        *self.pos.lock().unwrap_or_else(|poisoned| poisoned.into_inner()) = offset + n as u64;
        Ok(n)
    }

    /// Repositions the cursor. Seeking before the start fails with
    /// [`ErrorKind::Invalid`].
    pub fn seek(&self, pos: SeekFrom) -> VfsResult<u64> {
        let mut cursor = self.pos.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        let target = match pos {
            SeekFrom::Start(offset) => i128::from(offset),
            SeekFrom::Current(delta) => i128::from(*cursor) + i128::from(delta),
            SeekFrom::End(delta) => i128::from(self.total) + i128::from(delta),
        };
        if target < 0 || target > i128::from(u64::MAX) {
            return Err(VfsError::Kind(ErrorKind::Invalid));
        }
        *cursor = target as u64;
        Ok(*cursor)
    }

    /// Closes every sub-reader, aggregating failures with their segment
    /// indices preserved.
    pub async fn close(&self) -> VfsResult<()> {
        let mut failures = Vec::new();
        for (index, segment) in self.segments.iter().enumerate() {
            if let Err(err) = segment.reader.close().await {
                failures.push((index, err));
            }
        }
        if failures.is_empty() {
            Ok(())
        } else {
            Err(VfsError::CloseAll(CloseAllError { failures, total: self.segments.len() }))
        }
    }
}

#[async_trait]
impl SizedReaderAt for ConcatReader {
    async fn read_at(&self, buf: &mut [u8], offset: u64) -> VfsResult<usize> {
        ConcatReader::read_at(self, buf, offset).await
    }

    async fn close(&self) -> VfsResult<()> {
        ConcatReader::close(self).await
    }
}

/// Signals cancellation into a [`CancellableReader`].
#[derive(Clone)]
pub struct CancelHandle {
    cause: Arc<OnceLock<String>>,
}

impl CancelHandle {
    /// Cancels the reader. The first cause sticks; later calls are
    /// ignored.
    pub fn cancel(&self, cause: impl Into<String>) {
        let _ = self.cause.set(cause.into());
    }
}

/// Decorator that makes a reader cancellable.
///
/// Once the paired [`CancelHandle`] fires, every subsequent read fails
/// with [`ErrorKind::Canceled`]; the check happens before delegating.
pub struct CancellableReader<R> {
    inner: R,
    cause: Arc<OnceLock<String>>,
}

impl<R> CancellableReader<R> {
    pub fn new(inner: R) -> (CancellableReader<R>, CancelHandle) {
        let cause = Arc::new(OnceLock::new());
        let handle = CancelHandle { cause: cause.clone() };
        (CancellableReader { inner, cause }, handle)
    }

    fn check(&self, op: &'static str) -> VfsResult<()> {
        match self.cause.get() {
            Some(cause) => Err(VfsError::path(op, cause.clone(), ErrorKind::Canceled)),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl<R: SizedReaderAt> SizedReaderAt for CancellableReader<R> {
    async fn read_at(&self, buf: &mut [u8], offset: u64) -> VfsResult<usize> {
        self.check("readat")?;
        self.inner.read_at(buf, offset).await
    }

    async fn close(&self) -> VfsResult<()> {
        self.inner.close().await
    }
}
