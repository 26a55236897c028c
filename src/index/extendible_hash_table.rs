//! Disk-backed extendible hash table.
//!
//! Three page types make up the index:
//! - one header page routing the high bits of a key's hash to a directory,
//! - directory pages routing the low bits to a bucket at the current global
//!   depth,
//! - bucket pages holding the entries.
//!
//! Directories and buckets are allocated lazily on first insert. A full
//! bucket splits (doubling the directory first when its local depth has
//! caught up with the global depth); an emptied bucket merges back into its
//! split image, cascading while the merged bucket stays empty, and the
//! directory halves while every local depth sits below the global depth.
//!
//! # Concurrency
//! Operations latch top-down (header, then directory, then bucket) and hold
//! their latches until they finish. Mutating operations take write latches
//! on the directory and bucket; lookups take read latches all the way down.
//! The fixed order makes deadlock impossible, at the cost of serializing
//! writers that share a directory.

use std::marker::PhantomData;
use std::sync::Arc;

use bytemuck::Pod;

use crate::buffer::{BufferPoolManager, PageWriteGuard};
use crate::common::{Error, PageId, Result};
use crate::index::{KeyComparator, KeyHasher};
use crate::storage::page::{HashBucketMut, HashBucketRef, HashDirectoryPage, HashHeaderPage};

/// Extendible hash index over the buffer pool.
///
/// Keys and values are plain-old-data so entries can be stored directly in
/// bucket pages. Duplicate keys are rejected; an insert of an existing key
/// returns `Ok(false)` and leaves the stored value untouched.
pub struct DiskExtendibleHashTable<K, V, C, H> {
    bpm: Arc<BufferPoolManager>,
    cmp: C,
    hasher: H,
    header_page_id: PageId,
    directory_max_depth: u32,
    bucket_max_size: usize,
    _marker: PhantomData<(K, V)>,
}

impl<K, V, C, H> DiskExtendibleHashTable<K, V, C, H>
where
    K: Pod,
    V: Pod,
    C: KeyComparator<K>,
    H: KeyHasher<K>,
{
    /// Create a new table, allocating and initializing its header page.
    ///
    /// `header_max_depth` and `directory_max_depth` cap how far the two
    /// routing levels can grow; `bucket_max_size` caps entries per bucket
    /// (clamped to what a page can physically hold).
    pub fn new(
        bpm: Arc<BufferPoolManager>,
        cmp: C,
        hasher: H,
        header_max_depth: u32,
        directory_max_depth: u32,
        bucket_max_size: usize,
    ) -> Result<Self> {
        let header_page_id = {
            let mut header_guard = bpm.new_page()?;
            header_guard.view_mut::<HashHeaderPage>().init(header_max_depth);
            header_guard.page_id()
        };
        Ok(Self {
            bpm,
            cmp,
            hasher,
            header_page_id,
            directory_max_depth,
            bucket_max_size,
            _marker: PhantomData,
        })
    }

    /// Attach to an existing table whose header page is already on disk.
    ///
    /// The header's own max depth is persisted in the page; only the limits
    /// that apply to future directories and buckets need to be supplied, and
    /// they should match the values the table was created with.
    pub fn open(
        bpm: Arc<BufferPoolManager>,
        cmp: C,
        hasher: H,
        header_page_id: PageId,
        directory_max_depth: u32,
        bucket_max_size: usize,
    ) -> Self {
        Self {
            bpm,
            cmp,
            hasher,
            header_page_id,
            directory_max_depth,
            bucket_max_size,
            _marker: PhantomData,
        }
    }

    /// Page id of the header, the table's persistent root.
    pub fn header_page_id(&self) -> PageId {
        self.header_page_id
    }

    // ===== Lookup =====

    /// Look up the value stored for `key`.
    ///
    /// A table too large for the buffer pool to walk reports the key as
    /// absent rather than failing.
    pub fn get(&self, key: &K) -> Result<Option<V>> {
        match self.get_inner(key) {
            Err(Error::NoFreeFrames) => Ok(None),
            other => other,
        }
    }

    fn get_inner(&self, key: &K) -> Result<Option<V>> {
        let hash = self.hasher.hash_key(key);

        let header_guard = self.bpm.fetch_page_read(self.header_page_id)?;
        let directory_page_id = {
            let header = header_guard.view::<HashHeaderPage>();
            header.directory_page_id(header.hash_to_directory_index(hash))
        };
        if !directory_page_id.is_valid() {
            return Ok(None);
        }

        let directory_guard = self.bpm.fetch_page_read(directory_page_id)?;
        let bucket_page_id = {
            let directory = directory_guard.view::<HashDirectoryPage>();
            directory.bucket_page_id(directory.hash_to_bucket_index(hash))
        };
        if !bucket_page_id.is_valid() {
            return Ok(None);
        }

        let bucket_guard = self.bpm.fetch_page_read(bucket_page_id)?;
        let bucket = HashBucketRef::<K, V>::new(bucket_guard.as_slice());
        Ok(bucket.lookup(key, &self.cmp))
    }

    // ===== Insert =====

    /// Insert a key/value pair. Returns `Ok(false)` when the key already
    /// exists, or when the table cannot grow any further (bucket full with
    /// the directory at maximum depth, or no pool frame available for the
    /// pages a split needs).
    pub fn insert(&self, key: &K, value: &V) -> Result<bool> {
        match self.insert_inner(key, value) {
            Err(Error::NoFreeFrames) => Ok(false),
            other => other,
        }
    }

    fn insert_inner(&self, key: &K, value: &V) -> Result<bool> {
        let hash = self.hasher.hash_key(key);

        let mut header_guard = self.bpm.fetch_page_write(self.header_page_id)?;
        let (directory_idx, directory_page_id) = {
            let header = header_guard.view::<HashHeaderPage>();
            let idx = header.hash_to_directory_index(hash);
            (idx, header.directory_page_id(idx))
        };

        if !directory_page_id.is_valid() {
            return self.insert_into_new_directory(&mut header_guard, directory_idx, hash, key, value);
        }

        let mut directory_guard = self.bpm.fetch_page_write(directory_page_id)?;
        let (bucket_idx, bucket_page_id) = {
            let directory = directory_guard.view::<HashDirectoryPage>();
            let idx = directory.hash_to_bucket_index(hash);
            (idx, directory.bucket_page_id(idx))
        };

        if !bucket_page_id.is_valid() {
            return self.insert_into_new_bucket(&mut directory_guard, bucket_idx, key, value);
        }

        let mut bucket_guard = self.bpm.fetch_page_write(bucket_page_id)?;

        if HashBucketRef::<K, V>::new(bucket_guard.as_slice())
            .lookup(key, &self.cmp)
            .is_some()
        {
            return Ok(false);
        }

        loop {
            {
                let mut bucket = HashBucketMut::<K, V>::new(bucket_guard.as_mut_slice());
                if !bucket.as_ref().is_full() {
                    let inserted = bucket.insert(key, value, &self.cmp);
                    debug_assert!(inserted);
                    return Ok(true);
                }
            }

            // Bucket full: split it, doubling the directory first if its
            // local depth has caught up with the global depth.
            {
                let (local_depth, global_depth, max_depth) = {
                    let directory = directory_guard.view::<HashDirectoryPage>();
                    let idx = directory.hash_to_bucket_index(hash);
                    (
                        directory.local_depth(idx),
                        directory.global_depth(),
                        directory.max_depth(),
                    )
                };
                if local_depth == global_depth {
                    if global_depth >= max_depth {
                        return Ok(false);
                    }
                    directory_guard.view_mut::<HashDirectoryPage>().incr_global_depth();
                }
            }

            self.split_bucket(&mut directory_guard, &mut bucket_guard, hash)?;

            // The split may have moved our hash to the new bucket.
            let target_page_id = {
                let directory = directory_guard.view::<HashDirectoryPage>();
                directory.bucket_page_id(directory.hash_to_bucket_index(hash))
            };
            if target_page_id != bucket_guard.page_id() {
                bucket_guard.drop_guard();
                bucket_guard = self.bpm.fetch_page_write(target_page_id)?;
            }
        }
    }

    /// First insert routed to an empty header slot: allocate and wire up a
    /// directory, then fall through to the empty-bucket path.
    fn insert_into_new_directory(
        &self,
        header_guard: &mut PageWriteGuard<'_>,
        directory_idx: usize,
        hash: u32,
        key: &K,
        value: &V,
    ) -> Result<bool> {
        let mut directory_guard = self.bpm.new_page()?;
        directory_guard
            .view_mut::<HashDirectoryPage>()
            .init(self.directory_max_depth);
        header_guard
            .view_mut::<HashHeaderPage>()
            .set_directory_page_id(directory_idx, directory_guard.page_id());

        let bucket_idx = directory_guard
            .view::<HashDirectoryPage>()
            .hash_to_bucket_index(hash);
        self.insert_into_new_bucket(&mut directory_guard, bucket_idx, key, value)
    }

    /// Insert routed to an empty directory slot. Only reachable on a fresh
    /// directory at global depth zero, so the new bucket's local depth is 0.
    fn insert_into_new_bucket(
        &self,
        directory_guard: &mut PageWriteGuard<'_>,
        bucket_idx: usize,
        key: &K,
        value: &V,
    ) -> Result<bool> {
        let mut bucket_guard = self.bpm.new_page()?;
        {
            let mut bucket = HashBucketMut::<K, V>::new(bucket_guard.as_mut_slice());
            bucket.init(self.bucket_max_size);
            let inserted = bucket.insert(key, value, &self.cmp);
            debug_assert!(inserted);
        }

        let directory = directory_guard.view_mut::<HashDirectoryPage>();
        directory.set_bucket_page_id(bucket_idx, bucket_guard.page_id());
        directory.set_local_depth(bucket_idx, 0);
        Ok(true)
    }

    /// Split the bucket holding `hash` into itself and a new split image at
    /// one deeper local depth, redistributing entries by their new
    /// distinguishing bit.
    fn split_bucket(
        &self,
        directory_guard: &mut PageWriteGuard<'_>,
        bucket_guard: &mut PageWriteGuard<'_>,
        hash: u32,
    ) -> Result<()> {
        let (old_idx, new_local_depth) = {
            let directory = directory_guard.view::<HashDirectoryPage>();
            let idx = directory.hash_to_bucket_index(hash);
            (idx, directory.local_depth(idx) + 1)
        };
        let new_mask = (1usize << new_local_depth) - 1;
        let new_idx = old_idx ^ (1usize << (new_local_depth - 1));

        let mut new_bucket_guard = self.bpm.new_page()?;
        let new_page_id = new_bucket_guard.page_id();
        HashBucketMut::<K, V>::new(new_bucket_guard.as_mut_slice()).init(self.bucket_max_size);

        Self::update_directory_mapping(
            directory_guard.view_mut::<HashDirectoryPage>(),
            new_idx,
            new_page_id,
            new_local_depth,
            new_mask,
        );

        // Redistribute: entries whose hash carries the new bit move over.
        let entries: Vec<(K, V)> = {
            let bucket = HashBucketRef::<K, V>::new(bucket_guard.as_slice());
            (0..bucket.size())
                .map(|i| (bucket.key_at(i), bucket.value_at(i)))
                .collect()
        };
        HashBucketMut::<K, V>::new(bucket_guard.as_mut_slice()).clear();
        for (k, v) in entries {
            let h = self.hasher.hash_key(&k) as usize;
            if h & new_mask == new_idx & new_mask {
                HashBucketMut::<K, V>::new(new_bucket_guard.as_mut_slice()).append(&k, &v);
            } else {
                HashBucketMut::<K, V>::new(bucket_guard.as_mut_slice()).append(&k, &v);
            }
        }
        Ok(())
    }

    /// Repoint every directory slot affected by a split. Slots that shared
    /// the old bucket (agree on the old low bits) and carry the new
    /// distinguishing bit move to the new bucket; the rest keep the old
    /// bucket. All of them record the deeper local depth.
    fn update_directory_mapping(
        directory: &mut HashDirectoryPage,
        new_idx: usize,
        new_page_id: PageId,
        new_local_depth: u32,
        new_mask: usize,
    ) {
        let old_mask = new_mask >> 1;
        for i in 0..directory.size() {
            if i & old_mask != new_idx & old_mask {
                continue;
            }
            if i & new_mask == new_idx & new_mask {
                directory.set_bucket_page_id(i, new_page_id);
            }
            directory.set_local_depth(i, new_local_depth);
        }
    }

    // ===== Remove =====

    /// Remove `key`, returning whether it was present. Empty buckets merge
    /// back into their split images and the directory shrinks as far as the
    /// local depths allow.
    pub fn remove(&self, key: &K) -> Result<bool> {
        match self.remove_inner(key) {
            Err(Error::NoFreeFrames) => Ok(false),
            other => other,
        }
    }

    fn remove_inner(&self, key: &K) -> Result<bool> {
        let hash = self.hasher.hash_key(key);

        let header_guard = self.bpm.fetch_page_read(self.header_page_id)?;
        let directory_page_id = {
            let header = header_guard.view::<HashHeaderPage>();
            header.directory_page_id(header.hash_to_directory_index(hash))
        };
        if !directory_page_id.is_valid() {
            return Ok(false);
        }

        let mut directory_guard = self.bpm.fetch_page_write(directory_page_id)?;
        let bucket_page_id = {
            let directory = directory_guard.view::<HashDirectoryPage>();
            directory.bucket_page_id(directory.hash_to_bucket_index(hash))
        };
        if !bucket_page_id.is_valid() {
            return Ok(false);
        }

        let mut bucket_guard = self.bpm.fetch_page_write(bucket_page_id)?;
        if !HashBucketMut::<K, V>::new(bucket_guard.as_mut_slice()).remove(key, &self.cmp) {
            return Ok(false);
        }

        // Merge emptied buckets into their split images, cascading while the
        // surviving bucket is itself empty.
        loop {
            let (is_empty, bucket_idx, local_depth) = {
                let bucket = HashBucketRef::<K, V>::new(bucket_guard.as_slice());
                let directory = directory_guard.view::<HashDirectoryPage>();
                let idx = directory.hash_to_bucket_index(hash);
                (bucket.is_empty(), idx, directory.local_depth(idx))
            };
            if !is_empty || local_depth == 0 {
                break;
            }

            let (sibling_page_id, sibling_local_depth) = {
                let directory = directory_guard.view::<HashDirectoryPage>();
                let image_idx = directory.split_image_index(bucket_idx);
                (
                    directory.bucket_page_id(image_idx),
                    directory.local_depth(image_idx),
                )
            };
            let empty_page_id = bucket_guard.page_id();
            // Only merge a proper image pair: same depth, distinct buckets.
            if sibling_local_depth != local_depth || sibling_page_id == empty_page_id {
                break;
            }

            bucket_guard.drop_guard();
            self.bpm.delete_page(empty_page_id)?;

            {
                let directory = directory_guard.view_mut::<HashDirectoryPage>();
                for i in 0..directory.size() {
                    let page_id = directory.bucket_page_id(i);
                    if page_id == empty_page_id || page_id == sibling_page_id {
                        directory.set_bucket_page_id(i, sibling_page_id);
                        directory.set_local_depth(i, local_depth - 1);
                    }
                }
            }

            bucket_guard = self.bpm.fetch_page_write(sibling_page_id)?;
        }

        {
            let directory = directory_guard.view_mut::<HashDirectoryPage>();
            while directory.can_shrink() {
                directory.decr_global_depth();
            }
        }
        Ok(true)
    }

    // ===== Introspection =====

    /// Global depth of the directory in the given header slot, or `None` if
    /// that slot has no directory yet.
    pub fn directory_global_depth(&self, directory_idx: usize) -> Result<Option<u32>> {
        let header_guard = self.bpm.fetch_page_read(self.header_page_id)?;
        let directory_page_id = header_guard
            .view::<HashHeaderPage>()
            .directory_page_id(directory_idx);
        if !directory_page_id.is_valid() {
            return Ok(None);
        }
        let directory_guard = self.bpm.fetch_page_read(directory_page_id)?;
        Ok(Some(directory_guard.view::<HashDirectoryPage>().global_depth()))
    }

    /// Walk the whole table and panic on any structural violation. Test
    /// support; prohibitively slow on large tables.
    pub fn verify_integrity(&self) -> Result<()> {
        let header_guard = self.bpm.fetch_page_read(self.header_page_id)?;
        let header = header_guard.view::<HashHeaderPage>();

        for directory_idx in 0..header.max_size() {
            let directory_page_id = header.directory_page_id(directory_idx);
            if !directory_page_id.is_valid() {
                continue;
            }
            let directory_guard = self.bpm.fetch_page_read(directory_page_id)?;
            let directory = directory_guard.view::<HashDirectoryPage>();

            assert!(
                directory.global_depth() <= directory.max_depth(),
                "global depth {} exceeds max depth {}",
                directory.global_depth(),
                directory.max_depth()
            );

            let mut pointer_counts: std::collections::HashMap<PageId, usize> =
                std::collections::HashMap::new();
            for i in 0..directory.size() {
                *pointer_counts.entry(directory.bucket_page_id(i)).or_insert(0) += 1;
            }

            for i in 0..directory.size() {
                let bucket_page_id = directory.bucket_page_id(i);
                let local_depth = directory.local_depth(i);

                assert!(
                    bucket_page_id.is_valid(),
                    "directory slot {i} has no bucket"
                );
                assert!(
                    local_depth <= directory.global_depth(),
                    "slot {i}: local depth {} exceeds global depth {}",
                    local_depth,
                    directory.global_depth()
                );

                // A bucket at depth d is shared by exactly 2^(gd - d) slots.
                let expected = 1usize << (directory.global_depth() - local_depth);
                assert_eq!(
                    pointer_counts.get(&bucket_page_id).copied(),
                    Some(expected),
                    "bucket {} has the wrong number of directory pointers",
                    bucket_page_id
                );

                // Every slot agreeing on the low local_depth bits must share
                // this bucket and depth.
                let mask = (1usize << local_depth) - 1;
                for j in 0..directory.size() {
                    if j & mask == i & mask {
                        assert_eq!(
                            directory.bucket_page_id(j),
                            bucket_page_id,
                            "slots {i} and {j} disagree on bucket"
                        );
                        assert_eq!(
                            directory.local_depth(j),
                            local_depth,
                            "slots {i} and {j} disagree on local depth"
                        );
                    }
                }

                let bucket_guard = self.bpm.fetch_page_read(bucket_page_id)?;
                let bucket = HashBucketRef::<K, V>::new(bucket_guard.as_slice());
                assert!(
                    bucket.size() <= bucket.max_size(),
                    "bucket {} overflows its max size",
                    bucket_page_id
                );
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::{IdentityKeyHasher, OrdComparator};
    use crate::storage::DiskManager;
    use tempfile::NamedTempFile;

    type TestTable = DiskExtendibleHashTable<u32, u32, OrdComparator, IdentityKeyHasher>;

    fn table(
        pool_size: usize,
        header_depth: u32,
        directory_depth: u32,
        bucket_size: usize,
    ) -> (TestTable, NamedTempFile) {
        let tmp = NamedTempFile::new().unwrap();
        let dm = DiskManager::create(tmp.path()).unwrap();
        let bpm = Arc::new(BufferPoolManager::new(pool_size, 2, dm));
        let ht = TestTable::new(
            bpm,
            OrdComparator,
            IdentityKeyHasher,
            header_depth,
            directory_depth,
            bucket_size,
        )
        .unwrap();
        (ht, tmp)
    }

    #[test]
    fn test_empty_table_lookup_and_remove() {
        let (ht, _tmp) = table(16, 2, 3, 4);
        assert_eq!(ht.get(&1).unwrap(), None);
        assert!(!ht.remove(&1).unwrap());
        assert_eq!(ht.directory_global_depth(0).unwrap(), None);
    }

    #[test]
    fn test_insert_get_remove_single() {
        let (ht, _tmp) = table(16, 2, 3, 4);

        assert!(ht.insert(&5, &500).unwrap());
        assert_eq!(ht.get(&5).unwrap(), Some(500));
        assert!(ht.remove(&5).unwrap());
        assert_eq!(ht.get(&5).unwrap(), None);
    }

    #[test]
    fn test_duplicate_insert_rejected() {
        let (ht, _tmp) = table(16, 2, 3, 4);

        assert!(ht.insert(&9, &1).unwrap());
        assert!(!ht.insert(&9, &2).unwrap());
        assert_eq!(ht.get(&9).unwrap(), Some(1));
    }

    #[test]
    fn test_split_on_full_bucket() {
        // Bucket size 2: the third colliding insert forces a split.
        let (ht, _tmp) = table(16, 1, 3, 2);

        for k in 0..4u32 {
            assert!(ht.insert(&k, &(k * 10)).unwrap(), "insert {k}");
        }
        assert!(ht.directory_global_depth(0).unwrap().unwrap() >= 1);
        for k in 0..4u32 {
            assert_eq!(ht.get(&k).unwrap(), Some(k * 10));
        }
        ht.verify_integrity().unwrap();
    }

    #[test]
    fn test_cascading_split_in_single_insert() {
        // Keys 0, 8, 16 share the low 3 bits. With bucket size 2, inserting
        // 16 must split repeatedly until bit 3 separates 8 from 16.
        let (ht, _tmp) = table(32, 0, 9, 2);

        assert!(ht.insert(&0, &0).unwrap());
        assert!(ht.insert(&8, &8).unwrap());
        assert!(ht.insert(&16, &16).unwrap());

        assert_eq!(ht.directory_global_depth(0).unwrap(), Some(4));
        for k in [0u32, 8, 16] {
            assert_eq!(ht.get(&k).unwrap(), Some(k));
        }
        ht.verify_integrity().unwrap();
    }

    #[test]
    fn test_insert_fails_at_max_directory_depth() {
        // Directory capped at depth 2 with bucket size 2 holds at most 8
        // entries of a dense key run; the ninth cannot fit.
        let (ht, _tmp) = table(16, 0, 2, 2);

        for k in 0..8u32 {
            assert!(ht.insert(&k, &(k + 100)).unwrap(), "insert {k}");
        }
        assert!(!ht.insert(&8, &999).unwrap());

        // Failed insert leaves existing entries untouched.
        for k in 0..8u32 {
            assert_eq!(ht.get(&k).unwrap(), Some(k + 100));
        }
        ht.verify_integrity().unwrap();
    }

    #[test]
    fn test_remove_merges_and_shrinks() {
        let (ht, _tmp) = table(16, 1, 3, 2);

        for k in 0..5u32 {
            assert!(ht.insert(&k, &k).unwrap());
        }
        assert!(ht.directory_global_depth(0).unwrap().unwrap() > 0);

        for k in 0..5u32 {
            assert!(ht.remove(&k).unwrap(), "remove {k}");
        }
        assert_eq!(ht.directory_global_depth(0).unwrap(), Some(0));
        for k in 0..5u32 {
            assert_eq!(ht.get(&k).unwrap(), None);
        }
        ht.verify_integrity().unwrap();
    }

    #[test]
    fn test_growth_and_recursive_merge() {
        let (ht, _tmp) = table(64, 1, 9, 2);

        for k in 0..50u32 {
            assert!(ht.insert(&k, &(k * 2)).unwrap(), "insert {k}");
        }
        ht.verify_integrity().unwrap();
        for k in 0..50u32 {
            assert_eq!(ht.get(&k).unwrap(), Some(k * 2));
        }

        for k in 0..50u32 {
            assert!(ht.remove(&k).unwrap(), "remove {k}");
        }
        assert_eq!(ht.directory_global_depth(0).unwrap(), Some(0));
        ht.verify_integrity().unwrap();
    }

    #[test]
    fn test_multiple_directories() {
        // Header depth 2 routes on the top two bits: keys with different
        // high bits land in different directories.
        let (ht, _tmp) = table(32, 2, 3, 4);

        let keys = [0u32, 0x4000_0001, 0x8000_0002, 0xC000_0003];
        for (i, k) in keys.iter().enumerate() {
            assert!(ht.insert(k, &(i as u32)).unwrap());
        }
        for (i, k) in keys.iter().enumerate() {
            assert_eq!(ht.get(k).unwrap(), Some(i as u32));
        }
        // Each header slot got its own directory.
        for i in 0..4 {
            assert_eq!(ht.directory_global_depth(i).unwrap(), Some(0));
        }
        ht.verify_integrity().unwrap();
    }

    #[test]
    fn test_works_with_tiny_pool() {
        // An insert can pin header + directory + old and new bucket at once.
        let (ht, _tmp) = table(5, 1, 5, 2);

        for k in 0..20u32 {
            assert!(ht.insert(&k, &k).unwrap(), "insert {k}");
        }
        for k in 0..20u32 {
            assert_eq!(ht.get(&k).unwrap(), Some(k));
        }
        ht.verify_integrity().unwrap();
    }
}
