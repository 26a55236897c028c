//! Storage layer - disk I/O and page formats.
//!
//! This module handles persistent storage:
//! - [`DiskManager`] - Low-level file I/O
//! - [`DiskScheduler`] - Asynchronous request queue in front of the disk manager
//! - [`page`] - Page types and layouts

mod disk_manager;
mod disk_scheduler;
pub mod page;

pub use disk_manager::DiskManager;
pub use disk_scheduler::{DiskRequest, DiskScheduler};
