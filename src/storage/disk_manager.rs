//! Disk manager - low-level page I/O.
//!
//! The disk manager reads and writes fixed-size pages at offsets derived from
//! their page id. It knows nothing about page contents or allocation; page id
//! assignment lives in the buffer pool manager, which hands out ids from a
//! monotonic counter. A read past the current end of file returns a zeroed
//! page, so a freshly allocated id can be fetched before its first write.

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

use crate::common::config::PAGE_SIZE;
use crate::common::{PageId, Result};
use crate::storage::page::Page;

/// Manages page-granularity I/O against a single database file.
///
/// Not internally synchronized. The [`DiskScheduler`] owns the disk manager
/// on its worker thread and serializes all access to it.
///
/// [`DiskScheduler`]: crate::storage::DiskScheduler
pub struct DiskManager {
    file: File,
}

impl DiskManager {
    /// Create a new database file, truncating any existing one.
    pub fn create(path: impl AsRef<Path>) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;
        Ok(Self { file })
    }

    /// Open an existing database file.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let file = OpenOptions::new().read(true).write(true).open(path)?;
        Ok(Self { file })
    }

    /// Open a database file, creating it if it does not exist.
    pub fn open_or_create(path: impl AsRef<Path>) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(path)?;
        Ok(Self { file })
    }

    /// Read a page from disk.
    ///
    /// Reading a page that lies partly or wholly beyond the end of the file
    /// yields zeroes for the missing bytes. That is the expected state of an
    /// allocated-but-never-written page.
    pub fn read_page(&mut self, page_id: PageId) -> Result<Box<Page>> {
        let offset = page_id.0 as u64 * PAGE_SIZE as u64;
        let mut page = Box::new(Page::new());

        let file_size = self.file_size()?;
        if offset >= file_size {
            return Ok(page);
        }

        self.file.seek(SeekFrom::Start(offset))?;
        let available = ((file_size - offset) as usize).min(PAGE_SIZE);
        self.file
            .read_exact(&mut page.as_mut_slice()[..available])?;
        Ok(page)
    }

    /// Write a page to disk and flush it, extending the file if needed.
    pub fn write_page(&mut self, page_id: PageId, page: &Page) -> Result<()> {
        let offset = page_id.0 as u64 * PAGE_SIZE as u64;

        let end = offset + PAGE_SIZE as u64;
        if self.file_size()? < end {
            self.file.set_len(end)?;
        }

        self.file.seek(SeekFrom::Start(offset))?;
        self.file.write_all(page.as_slice())?;
        self.file.sync_all()?;
        Ok(())
    }

    /// Current size of the database file in bytes.
    pub fn file_size(&self) -> Result<u64> {
        Ok(self.file.metadata()?.len())
    }
}
