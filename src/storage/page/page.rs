//! Page - the fundamental 4KB unit of storage.
//!
//! A [`Page`] is a raw 4KB byte array that serves as the unit of I/O between
//! disk and memory. Pages are stored in frames within the buffer pool, and
//! callers reinterpret their bytes as typed page layouts through [`Page::view`]
//! and [`Page::view_mut`].

use bytemuck::{AnyBitPattern, Pod};

use crate::common::config::PAGE_SIZE;

/// A page of data (4KB, 4KB-aligned).
///
/// This is the fundamental unit of I/O between disk and memory.
///
/// # Typed views
/// [`Page::view`] / [`Page::view_mut`] reinterpret the leading bytes of the
/// page as a `bytemuck`-checked plain-old-data layout. The projection borrows
/// from the page, so it cannot outlive the guard that grants access to the
/// page; mutable projections are only reachable through a write-latched guard.
///
/// # Clone
/// `Page` does not implement `Clone` in production code: copying 4KB should
/// be explicit ([`Page::to_boxed`]). A `#[cfg(test)]` Clone is provided for
/// tests.
#[repr(align(4096))]
pub struct Page {
    data: [u8; PAGE_SIZE],
}

impl Page {
    /// Create a new zeroed page.
    #[inline]
    pub fn new() -> Self {
        Self {
            data: [0u8; PAGE_SIZE],
        }
    }

    /// Get immutable slice of page data.
    #[inline]
    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    /// Get mutable slice of page data.
    #[inline]
    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.data
    }

    /// Zero out the entire page.
    pub fn reset(&mut self) {
        self.data.fill(0);
    }

    /// Copy another page's bytes into this one.
    pub fn copy_from(&mut self, other: &Page) {
        self.data.copy_from_slice(&other.data);
    }

    /// Explicitly copy this page into a boxed buffer (e.g. for a disk request).
    pub fn to_boxed(&self) -> Box<Page> {
        let mut copy = Box::new(Page::new());
        copy.data.copy_from_slice(&self.data);
        copy
    }

    /// Get the size of a page.
    #[inline]
    pub const fn size() -> usize {
        PAGE_SIZE
    }

    /// Reinterpret the leading bytes of the page as a typed layout.
    ///
    /// The page is 4096-aligned, so any `T` with alignment <= 4096 projects
    /// from offset 0 without copying.
    pub fn view<T: AnyBitPattern>(&self) -> &T {
        bytemuck::from_bytes(&self.data[..std::mem::size_of::<T>()])
    }

    /// Reinterpret the leading bytes of the page as a mutable typed layout.
    pub fn view_mut<T: Pod>(&mut self) -> &mut T {
        bytemuck::from_bytes_mut(&mut self.data[..std::mem::size_of::<T>()])
    }
}

impl Default for Page {
    fn default() -> Self {
        Self::new()
    }
}

// Clone only available in tests - forces explicit copying in production.
#[cfg(test)]
impl Clone for Page {
    fn clone(&self) -> Self {
        let mut new_page = Page::new();
        new_page.data.copy_from_slice(&self.data);
        new_page
    }
}
