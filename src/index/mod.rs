//! Disk-backed index structures.
//!
//! This module contains:
//! - [`DiskExtendibleHashTable`] - A bucket-splitting hash index over the
//!   buffer pool
//! - [`KeyComparator`] / [`KeyHasher`] - The pluggable key seams

mod extendible_hash_table;
mod key;

pub use extendible_hash_table::DiskExtendibleHashTable;
pub use key::{Crc32KeyHasher, IdentityKeyHasher, KeyComparator, KeyHasher, OrdComparator};
