//! Hash table directory page.
//!
//! A directory page maps the low `global_depth` bits of a key's hash to a
//! bucket page, and tracks a per-slot local depth that records how many of
//! those bits the slot's bucket actually distinguishes. Doubling the
//! directory (`incr_global_depth`) mirrors the existing mapping into the new
//! upper half, so every bucket stays reachable under the longer mask.
//!
//! Layout (little-endian, plain-old-data):
//! ```text
//! +------------------------------+--------------------------+-----------+--------------+
//! | bucket_page_ids: [u32; 512]  | local_depths: [u8; 512]  | max_depth | global_depth |
//! +------------------------------+--------------------------+-----------+--------------+
//! ```

use bytemuck::{Pod, Zeroable};

use crate::common::config::{HTABLE_DIRECTORY_ARRAY_SIZE, HTABLE_DIRECTORY_MAX_DEPTH};
use crate::common::PageId;

/// Second-level page of the extendible hash index.
///
/// Invariants maintained by the index operations:
/// - `global_depth <= max_depth`
/// - `local_depth(i) <= global_depth` for every slot `i < size()`
/// - slots whose low `local_depth` bits agree point at the same bucket
#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable)]
pub struct HashDirectoryPage {
    bucket_page_ids: [u32; HTABLE_DIRECTORY_ARRAY_SIZE],
    local_depths: [u8; HTABLE_DIRECTORY_ARRAY_SIZE],
    max_depth: u32,
    global_depth: u32,
}

impl HashDirectoryPage {
    /// Initialize the directory in place at global depth zero with every
    /// bucket slot cleared. `max_depth` is clamped to the array capacity.
    pub fn init(&mut self, max_depth: u32) {
        self.max_depth = max_depth.min(HTABLE_DIRECTORY_MAX_DEPTH);
        self.global_depth = 0;
        self.bucket_page_ids.fill(PageId::INVALID.0);
        self.local_depths.fill(0);
    }

    /// Route a 32-bit hash to a bucket slot using its low `global_depth` bits.
    #[inline]
    pub fn hash_to_bucket_index(&self, hash: u32) -> usize {
        (hash as usize) & (self.size() - 1)
    }

    /// Page id stored in the given bucket slot (may be invalid).
    #[inline]
    pub fn bucket_page_id(&self, bucket_idx: usize) -> PageId {
        PageId(self.bucket_page_ids[bucket_idx])
    }

    /// Point a bucket slot at a page.
    #[inline]
    pub fn set_bucket_page_id(&mut self, bucket_idx: usize, page_id: PageId) {
        self.bucket_page_ids[bucket_idx] = page_id.0;
    }

    /// Local depth recorded for the given slot.
    #[inline]
    pub fn local_depth(&self, bucket_idx: usize) -> u32 {
        self.local_depths[bucket_idx] as u32
    }

    /// Record a slot's local depth.
    #[inline]
    pub fn set_local_depth(&mut self, bucket_idx: usize, local_depth: u32) {
        self.local_depths[bucket_idx] = local_depth as u8;
    }

    /// The slot whose bucket is the split image of `bucket_idx`: the index
    /// that differs only in the bucket's highest distinguishing bit.
    ///
    /// Callers must ensure the slot's local depth is nonzero.
    #[inline]
    pub fn split_image_index(&self, bucket_idx: usize) -> usize {
        let local_depth = self.local_depth(bucket_idx);
        bucket_idx ^ (1usize << (local_depth - 1))
    }

    /// Current global depth.
    #[inline]
    pub fn global_depth(&self) -> u32 {
        self.global_depth
    }

    /// Configured maximum depth of this directory.
    #[inline]
    pub fn max_depth(&self) -> u32 {
        self.max_depth
    }

    /// Number of live slots (`2^global_depth`).
    #[inline]
    pub fn size(&self) -> usize {
        1usize << self.global_depth
    }

    /// Maximum number of slots (`2^max_depth`).
    #[inline]
    pub fn max_size(&self) -> usize {
        1usize << self.max_depth
    }

    /// Double the directory. The existing mapping is mirrored into the new
    /// upper half so each bucket becomes reachable through two slots.
    ///
    /// Callers must check `global_depth() < max_depth()` first.
    pub fn incr_global_depth(&mut self) {
        debug_assert!(self.global_depth < self.max_depth);
        let old_size = self.size();
        for i in old_size..(2 * old_size) {
            self.bucket_page_ids[i] = self.bucket_page_ids[i - old_size];
            self.local_depths[i] = self.local_depths[i - old_size];
        }
        self.global_depth += 1;
    }

    /// Halve the directory. The upper half must already be a mirror of the
    /// lower half (every local depth strictly below global depth), which
    /// [`HashDirectoryPage::can_shrink`] checks.
    pub fn decr_global_depth(&mut self) {
        debug_assert!(self.global_depth > 0);
        self.global_depth -= 1;
    }

    /// True when every slot's local depth is strictly below the global depth,
    /// i.e. halving the directory would lose no information. Always false at
    /// global depth zero, since local depths cannot go below zero.
    pub fn can_shrink(&self) -> bool {
        if self.global_depth == 0 {
            return false;
        }
        (0..self.size()).all(|i| self.local_depth(i) < self.global_depth)
    }
}
