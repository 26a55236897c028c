//! LRU-K replacement policy.
//!
//! LRU-K evicts the frame with the largest backward k-distance: the gap
//! between now and the k-th most recent access. Frames with fewer than k
//! recorded accesses have infinite backward k-distance and are evicted
//! first, oldest first access wins among them. This resists scan pollution
//! better than plain LRU, since a frame only earns protection after k
//! touches.

use std::collections::{BTreeMap, VecDeque};

use parking_lot::Mutex;

use crate::common::{Error, FrameId, Result};

struct LruKNode {
    /// Timestamps of the last (up to) k accesses, oldest first.
    history: VecDeque<u64>,
    is_evictable: bool,
}

struct Inner {
    /// BTreeMap keeps iteration in frame-id order, making ties deterministic.
    node_store: BTreeMap<FrameId, LruKNode>,
    current_timestamp: u64,
    curr_size: usize,
}

/// Tracks access history per frame and picks eviction victims by backward
/// k-distance. Only frames marked evictable are candidates.
pub struct LruKReplacer {
    inner: Mutex<Inner>,
    replacer_size: usize,
    k: usize,
}

impl LruKReplacer {
    /// Create a replacer tracking up to `num_frames` frames with history
    /// depth `k`.
    pub fn new(num_frames: usize, k: usize) -> Self {
        assert!(k > 0, "k must be at least 1");
        Self {
            inner: Mutex::new(Inner {
                node_store: BTreeMap::new(),
                current_timestamp: 0,
                curr_size: 0,
            }),
            replacer_size: num_frames,
            k,
        }
    }

    /// Record an access to a frame. Starts tracking the frame (non-evictable)
    /// on first access.
    pub fn record_access(&self, frame_id: FrameId) -> Result<()> {
        if frame_id.0 >= self.replacer_size {
            return Err(Error::FrameOutOfRange(frame_id.0));
        }
        let mut inner = self.inner.lock();
        let now = inner.current_timestamp;
        inner.current_timestamp += 1;

        let node = inner.node_store.entry(frame_id).or_insert_with(|| LruKNode {
            history: VecDeque::with_capacity(self.k),
            is_evictable: false,
        });
        if node.history.len() == self.k {
            node.history.pop_front();
        }
        node.history.push_back(now);
        Ok(())
    }

    /// Mark a tracked frame evictable or not, adjusting the candidate count.
    pub fn set_evictable(&self, frame_id: FrameId, evictable: bool) -> Result<()> {
        let mut inner = self.inner.lock();
        let node = inner
            .node_store
            .get_mut(&frame_id)
            .ok_or(Error::FrameNotTracked(frame_id.0))?;
        if node.is_evictable != evictable {
            node.is_evictable = evictable;
            if evictable {
                inner.curr_size += 1;
            } else {
                inner.curr_size -= 1;
            }
        }
        Ok(())
    }

    /// Stop tracking a frame, discarding its history. A no-op for frames the
    /// replacer has never seen; an error for a tracked frame that is still
    /// pinned.
    pub fn remove(&self, frame_id: FrameId) -> Result<()> {
        let mut inner = self.inner.lock();
        match inner.node_store.get(&frame_id) {
            None => Ok(()),
            Some(node) if !node.is_evictable => Err(Error::FrameNotEvictable(frame_id.0)),
            Some(_) => {
                inner.node_store.remove(&frame_id);
                inner.curr_size -= 1;
                Ok(())
            }
        }
    }

    /// Evict the evictable frame with the largest backward k-distance,
    /// removing it from the replacer. Returns `None` when no frame is
    /// evictable.
    ///
    /// Frames with fewer than k accesses always beat fully-warmed frames;
    /// among those, the earliest first access wins.
    pub fn evict(&self) -> Option<FrameId> {
        let mut inner = self.inner.lock();
        let now = inner.current_timestamp;

        let mut victim: Option<FrameId> = None;
        let mut victim_cold = false;
        let mut victim_key: u64 = 0;

        for (&frame_id, node) in &inner.node_store {
            if !node.is_evictable {
                continue;
            }
            // Tracked nodes always have at least one recorded access.
            let first = match node.history.front() {
                Some(&t) => t,
                None => continue,
            };
            if node.history.len() < self.k {
                // Infinite distance: earliest first access wins.
                if !victim_cold || first < victim_key {
                    victim = Some(frame_id);
                    victim_cold = true;
                    victim_key = first;
                }
            } else if !victim_cold {
                let distance = now - first;
                if victim.is_none() || distance > victim_key {
                    victim = Some(frame_id);
                    victim_key = distance;
                }
            }
        }

        let frame_id = victim?;
        inner.node_store.remove(&frame_id);
        inner.curr_size -= 1;
        Some(frame_id)
    }

    /// Number of evictable frames.
    pub fn size(&self) -> usize {
        self.inner.lock().curr_size
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fid(id: usize) -> FrameId {
        FrameId::new(id)
    }

    #[test]
    fn test_evict_prefers_under_k_frames() {
        let replacer = LruKReplacer::new(7, 2);

        // Frame 1 gets two accesses; frame 2 only one.
        replacer.record_access(fid(1)).unwrap();
        replacer.record_access(fid(1)).unwrap();
        replacer.record_access(fid(2)).unwrap();
        replacer.set_evictable(fid(1), true).unwrap();
        replacer.set_evictable(fid(2), true).unwrap();

        // Frame 2 has infinite backward k-distance and goes first.
        assert_eq!(replacer.evict(), Some(fid(2)));
        assert_eq!(replacer.evict(), Some(fid(1)));
        assert_eq!(replacer.evict(), None);
    }

    #[test]
    fn test_under_k_ties_break_on_first_access() {
        let replacer = LruKReplacer::new(7, 3);

        replacer.record_access(fid(3)).unwrap();
        replacer.record_access(fid(5)).unwrap();
        replacer.record_access(fid(3)).unwrap();
        replacer.set_evictable(fid(3), true).unwrap();
        replacer.set_evictable(fid(5), true).unwrap();

        // Both are under k; frame 3 was touched first.
        assert_eq!(replacer.evict(), Some(fid(3)));
        assert_eq!(replacer.evict(), Some(fid(5)));
    }

    #[test]
    fn test_backward_k_distance_ordering() {
        let replacer = LruKReplacer::new(7, 2);

        // Warm both frames to k accesses; frame 1's 2nd-most-recent access
        // is older than frame 2's.
        replacer.record_access(fid(1)).unwrap(); // t=0
        replacer.record_access(fid(2)).unwrap(); // t=1
        replacer.record_access(fid(1)).unwrap(); // t=2
        replacer.record_access(fid(2)).unwrap(); // t=3
        replacer.set_evictable(fid(1), true).unwrap();
        replacer.set_evictable(fid(2), true).unwrap();

        assert_eq!(replacer.evict(), Some(fid(1)));
        assert_eq!(replacer.evict(), Some(fid(2)));
    }

    #[test]
    fn test_non_evictable_frames_skipped() {
        let replacer = LruKReplacer::new(7, 2);

        replacer.record_access(fid(1)).unwrap();
        replacer.record_access(fid(2)).unwrap();
        replacer.set_evictable(fid(2), true).unwrap();

        assert_eq!(replacer.size(), 1);
        assert_eq!(replacer.evict(), Some(fid(2)));
        // Frame 1 was never marked evictable.
        assert_eq!(replacer.evict(), None);
        assert_eq!(replacer.size(), 0);
    }

    #[test]
    fn test_set_evictable_toggling_adjusts_size() {
        let replacer = LruKReplacer::new(7, 2);

        replacer.record_access(fid(1)).unwrap();
        replacer.set_evictable(fid(1), true).unwrap();
        assert_eq!(replacer.size(), 1);

        // Redundant toggles don't double-count.
        replacer.set_evictable(fid(1), true).unwrap();
        assert_eq!(replacer.size(), 1);

        replacer.set_evictable(fid(1), false).unwrap();
        assert_eq!(replacer.size(), 0);
    }

    #[test]
    fn test_record_access_out_of_range() {
        let replacer = LruKReplacer::new(4, 2);
        assert!(matches!(
            replacer.record_access(fid(4)),
            Err(Error::FrameOutOfRange(4))
        ));
    }

    #[test]
    fn test_set_evictable_untracked() {
        let replacer = LruKReplacer::new(4, 2);
        assert!(matches!(
            replacer.set_evictable(fid(0), true),
            Err(Error::FrameNotTracked(0))
        ));
    }

    #[test]
    fn test_remove_semantics() {
        let replacer = LruKReplacer::new(4, 2);

        // Never-seen frame: fine.
        replacer.remove(fid(3)).unwrap();

        replacer.record_access(fid(1)).unwrap();
        assert!(matches!(
            replacer.remove(fid(1)),
            Err(Error::FrameNotEvictable(1))
        ));

        replacer.set_evictable(fid(1), true).unwrap();
        replacer.remove(fid(1)).unwrap();
        assert_eq!(replacer.size(), 0);

        // History is gone; re-access starts fresh.
        replacer.record_access(fid(1)).unwrap();
        replacer.set_evictable(fid(1), true).unwrap();
        assert_eq!(replacer.evict(), Some(fid(1)));
    }

    #[test]
    fn test_evict_removes_history() {
        let replacer = LruKReplacer::new(4, 2);

        replacer.record_access(fid(0)).unwrap();
        replacer.record_access(fid(0)).unwrap();
        replacer.set_evictable(fid(0), true).unwrap();
        assert_eq!(replacer.evict(), Some(fid(0)));

        // After eviction the frame is untracked again.
        assert!(matches!(
            replacer.set_evictable(fid(0), true),
            Err(Error::FrameNotTracked(0))
        ));
    }

    #[test]
    fn test_scan_resistance() {
        let replacer = LruKReplacer::new(10, 2);

        // Hot frame accessed twice.
        replacer.record_access(fid(0)).unwrap();
        replacer.record_access(fid(0)).unwrap();
        replacer.set_evictable(fid(0), true).unwrap();

        // A scan touches many frames once each.
        for i in 1..=5 {
            replacer.record_access(fid(i)).unwrap();
            replacer.set_evictable(fid(i), true).unwrap();
        }

        // The scanned frames all go before the hot frame.
        for i in 1..=5 {
            assert_eq!(replacer.evict(), Some(fid(i)));
        }
        assert_eq!(replacer.evict(), Some(fid(0)));
    }
}
