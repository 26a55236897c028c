//! Page types and layout.
//!
//! This module contains:
//! - [`Page`] - The raw 4KB data container
//! - [`HashHeaderPage`] - Top-level hash-to-directory mapping
//! - [`HashDirectoryPage`] - Global/local depth bookkeeping for the hash index
//! - [`HashBucketRef`] / [`HashBucketMut`] - Typed views over bucket pages

mod bucket_page;
mod directory_page;
mod header_page;
#[allow(clippy::module_inception)]
mod page;

pub use bucket_page::{HashBucketMut, HashBucketRef};
pub use directory_page::HashDirectoryPage;
pub use header_page::HashHeaderPage;
pub use page::Page;
