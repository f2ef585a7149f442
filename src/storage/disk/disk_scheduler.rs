use std::sync::mpsc;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::{unbounded, Receiver, Sender};

use crate::common::{BrambleError, PageId, Result, PAGE_SIZE};

use super::DiskManager;

/// Represents a disk I/O request
pub struct DiskRequest {
    /// Whether this is a write (true) or read (false) request
    pub is_write: bool,
    /// Pointer to the data buffer (must be PAGE_SIZE bytes).
    /// For reads: data will be written here.
    /// For writes: data will be read from here.
    pub data: *mut u8,
    /// The page ID to read/write
    pub page_id: PageId,
    /// Single-shot signal, sent `true` once the request completed
    pub completion: mpsc::Sender<bool>,
}

// Safety: a DiskRequest is consumed by exactly one shard worker, and the
// caller keeps the data buffer alive and un-aliased until the completion
// signal fires.
unsafe impl Send for DiskRequest {}

impl DiskRequest {
    pub fn read(page_id: PageId, data: *mut u8, completion: mpsc::Sender<bool>) -> Self {
        Self {
            is_write: false,
            data,
            page_id,
            completion,
        }
    }

    pub fn write(page_id: PageId, data: *mut u8, completion: mpsc::Sender<bool>) -> Self {
        Self {
            is_write: true,
            data,
            page_id,
            completion,
        }
    }
}

/// DiskScheduler dispatches page I/O to a fixed set of shard queues, each
/// drained by its own worker thread.
///
/// Requests scheduled with the same shard key are processed strictly in
/// submission order. The buffer pool relies on this to chain a dirty-page
/// writeback in front of the read that reuses the same frame, with no
/// explicit barrier between the two.
pub struct DiskScheduler {
    /// The disk manager performing the actual I/O
    disk_manager: Arc<DiskManager>,
    /// One queue per shard; `None` is the shutdown terminator
    shards: Vec<Sender<Option<DiskRequest>>>,
    /// Worker threads, one per shard
    workers: Vec<JoinHandle<()>>,
}

impl DiskScheduler {
    pub fn new(disk_manager: Arc<DiskManager>, num_shards: usize) -> Self {
        assert!(num_shards > 0);

        let mut shards = Vec::with_capacity(num_shards);
        let mut workers = Vec::with_capacity(num_shards);

        for _ in 0..num_shards {
            let (tx, rx) = unbounded::<Option<DiskRequest>>();
            let dm = Arc::clone(&disk_manager);
            workers.push(thread::spawn(move || Self::worker_loop(dm, rx)));
            shards.push(tx);
        }

        Self {
            disk_manager,
            shards,
            workers,
        }
    }

    /// Enqueues the request on the shard selected by `shard_key`.
    pub fn schedule(&self, request: DiskRequest, shard_key: usize) -> Result<()> {
        let shard = shard_key % self.shards.len();
        self.shards[shard]
            .send(Some(request))
            .map_err(|e| BrambleError::DiskScheduler(format!("failed to schedule request: {e}")))
    }

    /// Schedules a read and blocks until it completed.
    pub fn schedule_read_sync(&self, page_id: PageId, data: &mut [u8]) -> Result<()> {
        assert_eq!(data.len(), PAGE_SIZE);

        let (tx, rx) = mpsc::channel();
        self.schedule(
            DiskRequest::read(page_id, data.as_mut_ptr(), tx),
            page_id.as_u32() as usize,
        )?;
        rx.recv()
            .map_err(|e| BrambleError::DiskScheduler(format!("completion dropped: {e}")))?;
        Ok(())
    }

    /// Schedules a write and blocks until it completed.
    pub fn schedule_write_sync(&self, page_id: PageId, data: &[u8]) -> Result<()> {
        assert_eq!(data.len(), PAGE_SIZE);

        let (tx, rx) = mpsc::channel();
        // The worker only reads from the buffer for writes.
        self.schedule(
            DiskRequest::write(page_id, data.as_ptr() as *mut u8, tx),
            page_id.as_u32() as usize,
        )?;
        rx.recv()
            .map_err(|e| BrambleError::DiskScheduler(format!("completion dropped: {e}")))?;
        Ok(())
    }

    /// Grows the backing file so that pages `0..max_page_id` fit.
    pub fn increase_disk_space(&self, max_page_id: u64) -> Result<()> {
        self.disk_manager.increase_disk_space(max_page_id)
    }

    /// Tells the disk manager to deallocate a page.
    pub fn deallocate_page(&self, page_id: PageId) -> Result<()> {
        self.disk_manager.delete_page(page_id)
    }

    pub fn disk_manager(&self) -> &Arc<DiskManager> {
        &self.disk_manager
    }

    pub fn num_shards(&self) -> usize {
        self.shards.len()
    }

    fn worker_loop(disk_manager: Arc<DiskManager>, receiver: Receiver<Option<DiskRequest>>) {
        while let Ok(Some(request)) = receiver.recv() {
            let success = if request.is_write {
                // Safety: the scheduling contract keeps the buffer valid
                // until we signal completion below.
                let data = unsafe { std::slice::from_raw_parts(request.data, PAGE_SIZE) };
                disk_manager.write_page(request.page_id, data).is_ok()
            } else {
                // Safety: as above; reads have exclusive access to the
                // buffer until completion.
                let data = unsafe { std::slice::from_raw_parts_mut(request.data, PAGE_SIZE) };
                disk_manager.read_page(request.page_id, data).is_ok()
            };

            let _ = request.completion.send(success);
        }
    }
}

impl Drop for DiskScheduler {
    fn drop(&mut self) {
        for shard in &self.shards {
            let _ = shard.send(None);
        }
        for worker in self.workers.drain(..) {
            let _ = worker.join();
        }
    }
}
