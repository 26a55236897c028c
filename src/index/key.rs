//! Key comparison and hashing seams for index structures.
//!
//! Keys are plain-old-data so they can live inside on-disk pages. Equality
//! and hashing are pulled out into traits so an index can be instantiated
//! over schema-aware comparators later without touching the page layouts.

use std::cmp::Ordering;

use bytemuck::Pod;

/// Total order over keys. Indexes only rely on equality, but a total order
/// keeps the same seam usable for ordered structures.
pub trait KeyComparator<K> {
    fn compare(&self, a: &K, b: &K) -> Ordering;
}

/// Comparator for keys with a native `Ord`.
#[derive(Debug, Clone, Copy, Default)]
pub struct OrdComparator;

impl<K: Ord> KeyComparator<K> for OrdComparator {
    #[inline]
    fn compare(&self, a: &K, b: &K) -> Ordering {
        a.cmp(b)
    }
}

/// Maps a key to the 32-bit hash that drives directory and bucket routing.
///
/// The hash must be a pure function of the key's bytes: the index persists
/// placements derived from it, so it has to be stable across processes and
/// runs.
pub trait KeyHasher<K> {
    fn hash_key(&self, key: &K) -> u32;
}

/// CRC32 over the key's byte representation. Stable across runs, which
/// `std::hash` explicitly is not.
#[derive(Debug, Clone, Copy, Default)]
pub struct Crc32KeyHasher;

impl<K: Pod> KeyHasher<K> for Crc32KeyHasher {
    #[inline]
    fn hash_key(&self, key: &K) -> u32 {
        crc32fast::hash(bytemuck::bytes_of(key))
    }
}

/// Uses the key itself as its hash. Only for integer keys; handy in tests
/// where the exact bucket placement matters.
#[derive(Debug, Clone, Copy, Default)]
pub struct IdentityKeyHasher;

impl KeyHasher<u32> for IdentityKeyHasher {
    #[inline]
    fn hash_key(&self, key: &u32) -> u32 {
        *key
    }
}

impl KeyHasher<i32> for IdentityKeyHasher {
    #[inline]
    fn hash_key(&self, key: &i32) -> u32 {
        *key as u32
    }
}
