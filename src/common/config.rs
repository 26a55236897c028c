//! Configuration constants for hashdb.

/// Size of a page in bytes (4KB).
///
/// Matches the OS page size on most systems and the common database page
/// size. Pages are aligned to 4096 bytes for efficient direct I/O.
pub const PAGE_SIZE: usize = 4096;

/// Number of directory-page-id slots in a hash table header page.
///
/// 512 slots of 4 bytes each fit comfortably in one page and cap the header
/// depth at 9 bits.
pub const HTABLE_HEADER_ARRAY_SIZE: usize = 512;

/// Maximum header depth implied by [`HTABLE_HEADER_ARRAY_SIZE`].
pub const HTABLE_HEADER_MAX_DEPTH: u32 = 9;

/// Number of bucket slots in a hash table directory page.
pub const HTABLE_DIRECTORY_ARRAY_SIZE: usize = 512;

/// Maximum global depth implied by [`HTABLE_DIRECTORY_ARRAY_SIZE`].
pub const HTABLE_DIRECTORY_MAX_DEPTH: u32 = 9;
