//! Hash table bucket page.
//!
//! Buckets hold the actual key/value entries of the extendible hash index as
//! a packed, unordered array. Because the key and value types are generic
//! over plain-old-data, the layout cannot be a single `Pod` struct; instead
//! the bucket is accessed through byte-level views over the page.
//!
//! Layout (little-endian):
//! ```text
//! +------------+----------------+---------------------------------------+
//! | size: u32  | max_size: u32  | entries: (K, V) pairs, tightly packed |
//! +------------+----------------+---------------------------------------+
//! ```
//!
//! Entries are packed with `stride = size_of::<K>() + size_of::<V>()` and no
//! per-entry padding, so reads go through `pod_read_unaligned`. Removal
//! swap-fills from the tail; order is not preserved.

use std::marker::PhantomData;

use bytemuck::Pod;

use crate::common::config::PAGE_SIZE;
use crate::index::KeyComparator;

const SIZE_OFFSET: usize = 0;
const MAX_SIZE_OFFSET: usize = 4;
const ENTRIES_OFFSET: usize = 8;

#[inline]
fn stride<K, V>() -> usize {
    std::mem::size_of::<K>() + std::mem::size_of::<V>()
}

#[inline]
fn read_u32(data: &[u8], offset: usize) -> u32 {
    let mut raw = [0u8; 4];
    raw.copy_from_slice(&data[offset..offset + 4]);
    u32::from_le_bytes(raw)
}

#[inline]
fn write_u32(data: &mut [u8], offset: usize, value: u32) {
    data[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
}

/// Read-only view of a bucket page's bytes.
pub struct HashBucketRef<'a, K, V> {
    data: &'a [u8],
    _marker: PhantomData<(K, V)>,
}

/// Mutable view of a bucket page's bytes.
pub struct HashBucketMut<'a, K, V> {
    data: &'a mut [u8],
    _marker: PhantomData<(K, V)>,
}

impl<'a, K: Pod, V: Pod> HashBucketRef<'a, K, V> {
    /// Wrap a page's byte slice. The page must already be initialized.
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            _marker: PhantomData,
        }
    }

    /// Most entries a bucket of this key/value shape can hold.
    pub fn capacity() -> usize {
        (PAGE_SIZE - ENTRIES_OFFSET) / stride::<K, V>()
    }

    /// Number of entries currently stored.
    #[inline]
    pub fn size(&self) -> usize {
        read_u32(self.data, SIZE_OFFSET) as usize
    }

    /// Configured maximum number of entries.
    #[inline]
    pub fn max_size(&self) -> usize {
        read_u32(self.data, MAX_SIZE_OFFSET) as usize
    }

    #[inline]
    pub fn is_full(&self) -> bool {
        self.size() == self.max_size()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.size() == 0
    }

    /// Key stored at slot `idx` (copied out, entries are unaligned).
    pub fn key_at(&self, idx: usize) -> K {
        debug_assert!(idx < self.size());
        let start = ENTRIES_OFFSET + idx * stride::<K, V>();
        bytemuck::pod_read_unaligned(&self.data[start..start + std::mem::size_of::<K>()])
    }

    /// Value stored at slot `idx`.
    pub fn value_at(&self, idx: usize) -> V {
        debug_assert!(idx < self.size());
        let start = ENTRIES_OFFSET + idx * stride::<K, V>() + std::mem::size_of::<K>();
        bytemuck::pod_read_unaligned(&self.data[start..start + std::mem::size_of::<V>()])
    }

    /// Linear scan for `key`, returning its value if present.
    pub fn lookup<C: KeyComparator<K>>(&self, key: &K, cmp: &C) -> Option<V> {
        for idx in 0..self.size() {
            if cmp.compare(&self.key_at(idx), key).is_eq() {
                return Some(self.value_at(idx));
            }
        }
        None
    }
}

impl<'a, K: Pod, V: Pod> HashBucketMut<'a, K, V> {
    /// Wrap a page's mutable byte slice.
    pub fn new(data: &'a mut [u8]) -> Self {
        Self {
            data,
            _marker: PhantomData,
        }
    }

    /// Reborrow as a read-only view.
    pub fn as_ref(&self) -> HashBucketRef<'_, K, V> {
        HashBucketRef::new(self.data)
    }

    /// Initialize the bucket in place as empty. `max_size` is clamped to the
    /// page's physical capacity for this key/value shape.
    pub fn init(&mut self, max_size: usize) {
        let max_size = max_size.min(HashBucketRef::<K, V>::capacity());
        write_u32(self.data, SIZE_OFFSET, 0);
        write_u32(self.data, MAX_SIZE_OFFSET, max_size as u32);
    }

    /// Insert a key/value pair. Returns false if the bucket is full or the
    /// key is already present.
    pub fn insert<C: KeyComparator<K>>(&mut self, key: &K, value: &V, cmp: &C) -> bool {
        {
            let view = self.as_ref();
            if view.is_full() || view.lookup(key, cmp).is_some() {
                return false;
            }
        }
        self.append(key, value);
        true
    }

    /// Append an entry without the full/duplicate checks. Used when
    /// redistributing entries during a split, where both are already known to
    /// hold.
    pub fn append(&mut self, key: &K, value: &V) {
        let idx = self.as_ref().size();
        debug_assert!(idx < self.as_ref().max_size());
        let start = ENTRIES_OFFSET + idx * stride::<K, V>();
        let key_size = std::mem::size_of::<K>();
        self.data[start..start + key_size].copy_from_slice(bytemuck::bytes_of(key));
        self.data[start + key_size..start + stride::<K, V>()]
            .copy_from_slice(bytemuck::bytes_of(value));
        write_u32(self.data, SIZE_OFFSET, (idx + 1) as u32);
    }

    /// Remove the entry for `key` by swapping the last entry into its slot.
    /// Returns false if the key is not present.
    pub fn remove<C: KeyComparator<K>>(&mut self, key: &K, cmp: &C) -> bool {
        let (idx, size) = {
            let view = self.as_ref();
            let size = view.size();
            let mut found = None;
            for i in 0..size {
                if cmp.compare(&view.key_at(i), key).is_eq() {
                    found = Some(i);
                    break;
                }
            }
            match found {
                Some(i) => (i, size),
                None => return false,
            }
        };

        let entry_stride = stride::<K, V>();
        if idx != size - 1 {
            let src = ENTRIES_OFFSET + (size - 1) * entry_stride;
            let dst = ENTRIES_OFFSET + idx * entry_stride;
            self.data.copy_within(src..src + entry_stride, dst);
        }
        write_u32(self.data, SIZE_OFFSET, (size - 1) as u32);
        true
    }

    /// Drop all entries, keeping `max_size`.
    pub fn clear(&mut self) {
        write_u32(self.data, SIZE_OFFSET, 0);
    }
}
