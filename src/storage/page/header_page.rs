//! Hash table header page.
//!
//! The header page sits at the root of the extendible hash index. It routes
//! the most-significant bits of a key's hash to one of up to 512 directory
//! pages, which lets the index scale past the capacity of a single directory.
//!
//! Layout (little-endian, plain-old-data):
//! ```text
//! +----------------------------------+--------------+
//! | directory_page_ids: [u32; 512]   | max_depth: u32 |
//! +----------------------------------+--------------+
//! ```

use bytemuck::{Pod, Zeroable};

use crate::common::config::{HTABLE_HEADER_ARRAY_SIZE, HTABLE_HEADER_MAX_DEPTH};
use crate::common::PageId;

/// Root page of the extendible hash index.
///
/// Obtained by projecting a write-latched page with [`Page::view_mut`] and a
/// read-latched page with [`Page::view`]. Must be initialized with
/// [`HashHeaderPage::init`] before first use.
///
/// [`Page::view`]: crate::storage::page::Page::view
/// [`Page::view_mut`]: crate::storage::page::Page::view_mut
#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable)]
pub struct HashHeaderPage {
    directory_page_ids: [u32; HTABLE_HEADER_ARRAY_SIZE],
    max_depth: u32,
}

impl HashHeaderPage {
    /// Initialize the header in place: every directory slot is cleared to the
    /// invalid sentinel. `max_depth` is clamped to the largest depth the
    /// fixed-size array can address.
    pub fn init(&mut self, max_depth: u32) {
        self.max_depth = max_depth.min(HTABLE_HEADER_MAX_DEPTH);
        self.directory_page_ids.fill(PageId::INVALID.0);
    }

    /// Route a 32-bit hash to a directory slot using its most-significant
    /// `max_depth` bits. A depth of zero routes everything to slot 0.
    #[inline]
    pub fn hash_to_directory_index(&self, hash: u32) -> usize {
        if self.max_depth == 0 {
            0
        } else {
            (hash >> (32 - self.max_depth)) as usize
        }
    }

    /// Page id stored in the given directory slot (may be invalid).
    #[inline]
    pub fn directory_page_id(&self, directory_idx: usize) -> PageId {
        PageId(self.directory_page_ids[directory_idx])
    }

    /// Point a directory slot at a page.
    #[inline]
    pub fn set_directory_page_id(&mut self, directory_idx: usize, page_id: PageId) {
        self.directory_page_ids[directory_idx] = page_id.0;
    }

    /// Number of addressable directory slots (`2^max_depth`).
    #[inline]
    pub fn max_size(&self) -> usize {
        1usize << self.max_depth
    }

    /// Configured depth of this header.
    #[inline]
    pub fn max_depth(&self) -> u32 {
        self.max_depth
    }
}
