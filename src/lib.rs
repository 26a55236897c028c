//! # hashdb
//!
//! The storage kernel of an embedded database: a paged buffer cache with
//! LRU-K eviction, RAII page guards, an asynchronous disk scheduler, and a
//! disk-backed extendible hash index built on top of it.
//!
//! ## Architecture
//!
//! ```text
//!  DiskExtendibleHashTable        (index)
//!          |
//!  BufferPoolManager              (buffer)
//!   |  guards, frames, LRU-K
//!          |
//!  DiskScheduler -> DiskManager   (storage)
//!          |
//!       database file
//! ```
//!
//! ## Module map
//!
//! - [`common`] - Ids, configuration constants, error types
//! - [`storage`] - Disk manager, disk scheduler, page layouts
//! - [`buffer`] - Buffer pool manager, frames, replacer, page guards
//! - [`index`] - Extendible hash table and key seams
//!
//! ## Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use hashdb::{
//!     BufferPoolManager, Crc32KeyHasher, DiskExtendibleHashTable, DiskManager, OrdComparator,
//! };
//!
//! # fn main() -> hashdb::Result<()> {
//! let disk = DiskManager::create("demo.db")?;
//! let bpm = Arc::new(BufferPoolManager::new(64, 2, disk));
//!
//! let table: DiskExtendibleHashTable<u64, u64, _, _> =
//!     DiskExtendibleHashTable::new(bpm, OrdComparator, Crc32KeyHasher, 2, 9, 128)?;
//!
//! table.insert(&42, &4200)?;
//! assert_eq!(table.get(&42)?, Some(4200));
//! # Ok(())
//! # }
//! ```

pub mod buffer;
pub mod common;
pub mod index;
pub mod storage;

pub use buffer::{
    BasicPageGuard, BufferPoolManager, BufferPoolStats, Frame, LruKReplacer, PageReadGuard,
    PageWriteGuard, StatsSnapshot,
};
pub use common::config::PAGE_SIZE;
pub use common::{Error, FrameId, PageId, Result};
pub use index::{
    Crc32KeyHasher, DiskExtendibleHashTable, IdentityKeyHasher, KeyComparator, KeyHasher,
    OrdComparator,
};
pub use storage::page::Page;
pub use storage::{DiskManager, DiskScheduler};
