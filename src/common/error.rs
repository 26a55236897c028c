//! Error types for hashdb.

use thiserror::Error;

/// Convenient Result type alias.
///
/// Instead of writing `Result<T, Error>` everywhere, we can write `Result<T>`.
pub type Result<T> = std::result::Result<T, Error>;

/// All possible errors in hashdb.
///
/// Capacity exhaustion and not-found conditions are *not* represented here;
/// they are ordinary return values (`Ok(false)` / `Ok(None)`). The variants
/// below are either I/O failures or violations of the pinning discipline,
/// which indicate caller misuse and must not be ignored.
#[derive(Debug, Error)]
pub enum Error {
    /// I/O error from disk operations.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Buffer pool has no free frames and cannot evict any pages.
    ///
    /// This happens when all frames are pinned.
    #[error("buffer pool has no free or evictable frames")]
    NoFreeFrames,

    /// The page is not resident in the buffer pool.
    #[error("page {0} is not resident in the buffer pool")]
    PageNotResident(u32),

    /// Attempted to delete a page that is still pinned.
    #[error("page {0} is still pinned")]
    PagePinned(u32),

    /// A replacer operation named a frame outside `[0, replacer_size)`.
    #[error("frame {0} is outside the replacer's range")]
    FrameOutOfRange(usize),

    /// A replacer operation named a frame it has never seen.
    #[error("frame {0} is not tracked by the replacer")]
    FrameNotTracked(usize),

    /// Attempted to remove a frame from the replacer while it is pinned.
    #[error("frame {0} is not evictable and cannot be removed from the replacer")]
    FrameNotEvictable(usize),

    /// The disk scheduler's worker thread is gone.
    #[error("disk scheduler has shut down")]
    SchedulerShutdown,
}
