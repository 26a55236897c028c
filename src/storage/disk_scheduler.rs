//! Disk scheduler - asynchronous request queue over the disk manager.
//!
//! The scheduler owns the [`DiskManager`] on a dedicated worker thread and
//! serializes all I/O through a channel. Callers enqueue read or write
//! requests and receive a completion channel to block on, so the buffer pool
//! can issue I/O without holding the disk manager itself.

use std::thread::JoinHandle;

use crate::common::{Error, PageId, Result};
use crate::storage::page::Page;
use crate::storage::DiskManager;

/// A request enqueued with the scheduler's worker thread.
pub enum DiskRequest {
    /// Read the page into a fresh buffer and send it back on `done`.
    Read {
        page_id: PageId,
        done: flume::Sender<Result<Box<Page>>>,
    },
    /// Write the buffer to disk and send the outcome back on `done`.
    Write {
        page_id: PageId,
        data: Box<Page>,
        done: flume::Sender<Result<()>>,
    },
    /// Stop the worker thread.
    Shutdown,
}

/// Schedules page reads and writes onto a background worker thread.
///
/// Requests for the same page are ordered by the channel; the single worker
/// processes them one at a time, so a read scheduled after a write observes
/// the written data.
pub struct DiskScheduler {
    request_tx: flume::Sender<DiskRequest>,
    worker: Option<JoinHandle<()>>,
}

impl DiskScheduler {
    /// Spawn the worker thread, transferring ownership of the disk manager
    /// to it.
    pub fn new(mut disk_manager: DiskManager) -> Self {
        let (request_tx, request_rx) = flume::unbounded::<DiskRequest>();

        let worker = std::thread::spawn(move || {
            while let Ok(request) = request_rx.recv() {
                match request {
                    DiskRequest::Read { page_id, done } => {
                        // Receiver may have given up; nothing to do then.
                        let _ = done.send(disk_manager.read_page(page_id));
                    }
                    DiskRequest::Write {
                        page_id,
                        data,
                        done,
                    } => {
                        let _ = done.send(disk_manager.write_page(page_id, &data));
                    }
                    DiskRequest::Shutdown => break,
                }
            }
        });

        Self {
            request_tx,
            worker: Some(worker),
        }
    }

    /// Enqueue a read. The returned channel yields the page once the worker
    /// has read it.
    pub fn schedule_read(&self, page_id: PageId) -> Result<flume::Receiver<Result<Box<Page>>>> {
        let (done_tx, done_rx) = flume::bounded(1);
        self.request_tx
            .send(DiskRequest::Read {
                page_id,
                done: done_tx,
            })
            .map_err(|_| Error::SchedulerShutdown)?;
        Ok(done_rx)
    }

    /// Enqueue a write of the given buffer. The returned channel yields the
    /// outcome once the worker has written and flushed it.
    pub fn schedule_write(
        &self,
        page_id: PageId,
        data: Box<Page>,
    ) -> Result<flume::Receiver<Result<()>>> {
        let (done_tx, done_rx) = flume::bounded(1);
        self.request_tx
            .send(DiskRequest::Write {
                page_id,
                data,
                done: done_tx,
            })
            .map_err(|_| Error::SchedulerShutdown)?;
        Ok(done_rx)
    }

    /// Block until a completion channel yields its result.
    pub fn wait<T>(rx: flume::Receiver<Result<T>>) -> Result<T> {
        rx.recv().map_err(|_| Error::SchedulerShutdown)?
    }
}

impl Drop for DiskScheduler {
    fn drop(&mut self) {
        let _ = self.request_tx.send(DiskRequest::Shutdown);
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}
