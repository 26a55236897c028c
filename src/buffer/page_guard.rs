//! RAII page guards.
//!
//! A guard represents a pin on a resident page. Dropping the guard releases
//! the pin (and latch, if held), so callers cannot leak pins on early return
//! or panic.
//!
//! - [`BasicPageGuard`] holds only the pin. It is a staging handle: upgrade
//!   it to a read or write guard to actually access the page.
//! - [`PageReadGuard`] holds the pin plus the page's read latch.
//! - [`PageWriteGuard`] holds the pin plus the write latch, and marks the
//!   frame dirty on release.
//!
//! Guards are tied to the pool's lifetime and are not `Clone`: one guard is
//! one pin.

use std::ops::{Deref, DerefMut};

use parking_lot::{RwLockReadGuard, RwLockWriteGuard};

use crate::buffer::BufferPoolManager;
use crate::common::{FrameId, PageId};
use crate::storage::page::Page;

/// A pin on a page without a latch.
///
/// Useful for keeping a page resident across an operation without blocking
/// readers or writers, and as the common starting point for
/// [`upgrade_read`](BasicPageGuard::upgrade_read) /
/// [`upgrade_write`](BasicPageGuard::upgrade_write). The upgrade consumes the
/// guard and transfers its pin, so the page cannot be evicted in between.
pub struct BasicPageGuard<'a> {
    bpm: Option<&'a BufferPoolManager>,
    frame_id: FrameId,
    page_id: PageId,
}

impl<'a> BasicPageGuard<'a> {
    pub(crate) fn new(bpm: &'a BufferPoolManager, frame_id: FrameId, page_id: PageId) -> Self {
        Self {
            bpm: Some(bpm),
            frame_id,
            page_id,
        }
    }

    /// Id of the guarded page.
    pub fn page_id(&self) -> PageId {
        self.page_id
    }

    /// Release the pin early. Safe to call more than once; the pin is
    /// released only the first time. Using the guard afterwards is a bug.
    pub fn drop_guard(&mut self) {
        if let Some(bpm) = self.bpm.take() {
            bpm.unpin_page_internal(self.frame_id, false);
        }
    }

    /// Trade the pin for a read-latched guard. Blocks until no writer holds
    /// the latch.
    pub fn upgrade_read(mut self) -> PageReadGuard<'a> {
        // Take the pool reference so our Drop does not release the pin; the
        // read guard inherits it.
        let bpm = self.bpm.take().unwrap_or_else(|| {
            panic!("upgrade_read on dropped guard for {}", self.page_id)
        });
        let lock = bpm.frame(self.frame_id).page();
        PageReadGuard {
            bpm,
            frame_id: self.frame_id,
            page_id: self.page_id,
            lock: Some(lock),
        }
    }

    /// Trade the pin for a write-latched guard. Blocks until the page has no
    /// other readers or writers.
    pub fn upgrade_write(mut self) -> PageWriteGuard<'a> {
        let bpm = self.bpm.take().unwrap_or_else(|| {
            panic!("upgrade_write on dropped guard for {}", self.page_id)
        });
        let lock = bpm.frame(self.frame_id).page_mut();
        PageWriteGuard {
            bpm,
            frame_id: self.frame_id,
            page_id: self.page_id,
            lock: Some(lock),
        }
    }
}

impl Drop for BasicPageGuard<'_> {
    fn drop(&mut self) {
        self.drop_guard();
    }
}

/// A pin plus the read latch on a page.
pub struct PageReadGuard<'a> {
    bpm: &'a BufferPoolManager,
    frame_id: FrameId,
    page_id: PageId,
    lock: Option<RwLockReadGuard<'a, Page>>,
}

impl PageReadGuard<'_> {
    /// Id of the guarded page.
    pub fn page_id(&self) -> PageId {
        self.page_id
    }

    /// Release the latch and pin early. Safe to call more than once; they
    /// are released only the first time. Using the guard afterwards panics.
    pub fn drop_guard(&mut self) {
        if let Some(lock) = self.lock.take() {
            drop(lock);
            self.bpm.unpin_page_internal(self.frame_id, false);
        }
    }
}

impl Deref for PageReadGuard<'_> {
    type Target = Page;

    fn deref(&self) -> &Page {
        match &self.lock {
            Some(lock) => lock,
            None => panic!("access through dropped read guard for {}", self.page_id),
        }
    }
}

impl Drop for PageReadGuard<'_> {
    fn drop(&mut self) {
        self.drop_guard();
    }
}

/// A pin plus the write latch on a page. The frame is marked dirty when the
/// guard is released, since the page may have been modified through it.
pub struct PageWriteGuard<'a> {
    bpm: &'a BufferPoolManager,
    frame_id: FrameId,
    page_id: PageId,
    lock: Option<RwLockWriteGuard<'a, Page>>,
}

impl PageWriteGuard<'_> {
    /// Id of the guarded page.
    pub fn page_id(&self) -> PageId {
        self.page_id
    }

    /// Release the latch and pin early. Safe to call more than once; they
    /// are released only the first time. Using the guard afterwards panics.
    pub fn drop_guard(&mut self) {
        if let Some(lock) = self.lock.take() {
            drop(lock);
            self.bpm.unpin_page_internal(self.frame_id, true);
        }
    }
}

impl Deref for PageWriteGuard<'_> {
    type Target = Page;

    fn deref(&self) -> &Page {
        match &self.lock {
            Some(lock) => lock,
            None => panic!("access through dropped write guard for {}", self.page_id),
        }
    }
}

impl DerefMut for PageWriteGuard<'_> {
    fn deref_mut(&mut self) -> &mut Page {
        match &mut self.lock {
            Some(lock) => lock,
            None => panic!("access through dropped write guard for {}", self.page_id),
        }
    }
}

impl Drop for PageWriteGuard<'_> {
    fn drop(&mut self) {
        self.drop_guard();
    }
}
