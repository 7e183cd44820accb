//! Defines the wall clock used to timestamp filesystem metadata.

use std::time::{SystemTime, UNIX_EPOCH};

use crate::vfs::FileTime;

/// Produces timestamps for metadata updates.
///
/// The clock is injected at filesystem construction so tests can pin time.
pub trait WallClock: Send + Sync {
    fn now(&self) -> FileTime;
}

/// The system clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl WallClock for SystemClock {
    fn now(&self) -> FileTime {
        let duration = SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default();
        FileTime { seconds: duration.as_secs() as i64, nanos: duration.subsec_nanos() }
    }
}

/// A clock pinned to a single instant, for tests.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub FileTime);

impl WallClock for FixedClock {
    fn now(&self) -> FileTime {
        self.0
    }
}
