//! Buffer pool - in-memory page cache.
//!
//! This module contains:
//! - [`BufferPoolManager`] - The main page cache with pin/unpin semantics
//! - [`Frame`] - A slot in the pool holding one page
//! - [`replacer`] - Eviction policies ([`LruKReplacer`])
//! - Page guards - RAII pin + latch handles over resident pages
//! - [`BufferPoolStats`] - Hit/miss/eviction counters

mod buffer_pool_manager;
mod frame;
mod page_guard;
pub mod replacer;
mod stats;

pub use buffer_pool_manager::BufferPoolManager;
pub use frame::Frame;
pub use page_guard::{BasicPageGuard, PageReadGuard, PageWriteGuard};
pub use replacer::LruKReplacer;
pub use stats::{BufferPoolStats, StatsSnapshot};
