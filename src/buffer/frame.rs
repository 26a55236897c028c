//! Frame - a slot in the buffer pool.
//!
//! Each frame holds one page plus the metadata the pool needs to manage it:
//! which page occupies it, how many users have it pinned, and whether it has
//! been modified since it was last written to disk.
//!
//! # Synchronization
//! - `page` sits behind an `RwLock`; page guards take it as the page latch.
//! - `pin_count` and `is_dirty` are atomics so the pool can inspect them
//!   without touching the page latch.
//! - `page_id` has its own small mutex; it changes only while the pool's
//!   bookkeeping lock is held.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use parking_lot::{Mutex, RwLock};

use crate::common::PageId;
use crate::storage::page::Page;

/// A buffer pool slot holding one page.
pub struct Frame {
    page: RwLock<Page>,
    page_id: Mutex<Option<PageId>>,
    pin_count: AtomicU32,
    is_dirty: AtomicBool,
}

impl Frame {
    /// Create an empty frame.
    pub fn new() -> Self {
        Self {
            page: RwLock::new(Page::new()),
            page_id: Mutex::new(None),
            pin_count: AtomicU32::new(0),
            is_dirty: AtomicBool::new(false),
        }
    }

    /// The page latch, read side.
    pub fn page(&self) -> parking_lot::RwLockReadGuard<'_, Page> {
        self.page.read()
    }

    /// The page latch, write side.
    pub fn page_mut(&self) -> parking_lot::RwLockWriteGuard<'_, Page> {
        self.page.write()
    }

    /// Page currently occupying this frame, if any.
    pub fn page_id(&self) -> Option<PageId> {
        *self.page_id.lock()
    }

    /// Record which page occupies this frame.
    pub fn set_page_id(&self, page_id: Option<PageId>) {
        *self.page_id.lock() = page_id;
    }

    /// Increment the pin count, returning the new value.
    pub fn pin(&self) -> u32 {
        self.pin_count.fetch_add(1, Ordering::AcqRel) + 1
    }

    /// Decrement the pin count, returning the new value.
    ///
    /// Panics on underflow: an unpin without a matching pin is a bug in the
    /// pool or a guard, never valid at runtime.
    pub fn unpin(&self) -> u32 {
        let prev = self.pin_count.fetch_sub(1, Ordering::AcqRel);
        assert!(prev > 0, "unpin on frame with pin count 0");
        prev - 1
    }

    /// Current pin count.
    pub fn pin_count(&self) -> u32 {
        self.pin_count.load(Ordering::Acquire)
    }

    /// True when no one holds a pin.
    pub fn is_evictable(&self) -> bool {
        self.pin_count() == 0
    }

    /// Mark the frame's page as modified.
    pub fn mark_dirty(&self) {
        self.is_dirty.store(true, Ordering::Release);
    }

    /// Clear the dirty flag (after the page reaches disk).
    pub fn clear_dirty(&self) {
        self.is_dirty.store(false, Ordering::Release);
    }

    /// Whether the page differs from its on-disk image.
    pub fn is_dirty(&self) -> bool {
        self.is_dirty.load(Ordering::Acquire)
    }

    /// Return the frame to its empty state. Caller must ensure no pins
    /// remain and any dirty data has been flushed.
    pub fn reset(&self) {
        debug_assert_eq!(self.pin_count(), 0);
        self.page.write().reset();
        self.set_page_id(None);
        self.pin_count.store(0, Ordering::Release);
        self.clear_dirty();
    }
}

impl Default for Frame {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_frame_is_empty() {
        let frame = Frame::new();
        assert_eq!(frame.page_id(), None);
        assert_eq!(frame.pin_count(), 0);
        assert!(!frame.is_dirty());
        assert!(frame.is_evictable());
    }

    #[test]
    fn test_pin_unpin() {
        let frame = Frame::new();
        assert_eq!(frame.pin(), 1);
        assert_eq!(frame.pin(), 2);
        assert!(!frame.is_evictable());
        assert_eq!(frame.unpin(), 1);
        assert_eq!(frame.unpin(), 0);
        assert!(frame.is_evictable());
    }

    #[test]
    #[should_panic(expected = "pin count 0")]
    fn test_unpin_underflow_panics() {
        let frame = Frame::new();
        frame.unpin();
    }

    #[test]
    fn test_dirty_flag() {
        let frame = Frame::new();
        frame.mark_dirty();
        assert!(frame.is_dirty());
        frame.clear_dirty();
        assert!(!frame.is_dirty());
    }

    #[test]
    fn test_reset_clears_state() {
        let frame = Frame::new();
        frame.set_page_id(Some(PageId::new(7)));
        frame.page_mut().as_mut_slice()[0] = 0xFF;
        frame.mark_dirty();

        frame.reset();

        assert_eq!(frame.page_id(), None);
        assert!(!frame.is_dirty());
        assert_eq!(frame.page().as_slice()[0], 0);
    }

    #[test]
    fn test_page_latch_allows_concurrent_readers() {
        let frame = Frame::new();
        let r1 = frame.page();
        let r2 = frame.page();
        assert_eq!(r1.as_slice()[0], r2.as_slice()[0]);
    }
}
