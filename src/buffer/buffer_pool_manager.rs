use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{mpsc, Arc};

use parking_lot::Mutex;

use crate::common::{AccessKind, FrameId, PageId, Result, INVALID_PAGE_ID};
use crate::storage::disk::{DiskManager, DiskRequest, DiskScheduler};

use super::{FrameHeader, LruKReplacer, ReadPageGuard, WritePageGuard};

pub(crate) struct BpmInner {
    pub(crate) page_table: HashMap<PageId, FrameId>,
    pub(crate) free_frames: Vec<FrameId>,
}

/// Shared state between the manager and the guards it hands out.
pub(crate) struct BufferPoolState {
    pub(crate) frames: Vec<Arc<FrameHeader>>,
    /// The BPM latch: protects the page table and the free list, and
    /// serializes replacer coordination.
    pub(crate) inner: Mutex<BpmInner>,
    pub(crate) replacer: LruKReplacer,
}

/// BufferPoolManager caches database pages in a fixed set of frames,
/// evicting with the LRU-K policy and scheduling all I/O through the
/// sharded disk scheduler.
///
/// Page latches are only ever acquired after the BPM latch has been
/// released, and threads that hit a page whose read is still in flight
/// wait on the frame's I/O-done signal rather than on the BPM latch.
pub struct BufferPoolManager {
    /// Number of frames in the buffer pool
    num_frames: usize,
    /// Next page id to hand out; pages are never reused
    next_page_id: AtomicU32,
    /// Shared state
    state: Arc<BufferPoolState>,
    /// Disk scheduler for async I/O
    disk_scheduler: DiskScheduler,
}

impl BufferPoolManager {
    /// Creates a new BufferPoolManager with the given pool size, k value
    /// for LRU-K, and disk manager.
    pub fn new(num_frames: usize, k: usize, disk_manager: Arc<DiskManager>) -> Self {
        let mut frames = Vec::with_capacity(num_frames);
        let mut free_frames = Vec::with_capacity(num_frames);

        for i in 0..num_frames {
            let frame_id = FrameId::new(i as u32);
            frames.push(Arc::new(FrameHeader::new(frame_id)));
            free_frames.push(frame_id);
        }
        // Pop from the back; hand out frame 0 first.
        free_frames.reverse();

        let state = Arc::new(BufferPoolState {
            frames,
            inner: Mutex::new(BpmInner {
                page_table: HashMap::new(),
                free_frames,
            }),
            replacer: LruKReplacer::new(k, num_frames),
        });

        Self {
            num_frames,
            next_page_id: AtomicU32::new(0),
            state,
            disk_scheduler: DiskScheduler::new(disk_manager, crate::common::DISK_SCHEDULER_SHARDS),
        }
    }

    /// Allocates a new page id and makes room for it on disk. No frame is
    /// bound until the page is fetched.
    pub fn new_page(&self) -> Result<PageId> {
        let page_id = self.next_page_id.fetch_add(1, Ordering::AcqRel);
        self.disk_scheduler.increase_disk_space(page_id as u64 + 1)?;
        Ok(PageId::new(page_id))
    }

    /// Fetches a page for shared read access. Returns None when the page
    /// id is invalid or every frame is pinned.
    pub fn checked_read_page(&self, page_id: PageId, access: AccessKind) -> Option<ReadPageGuard> {
        if page_id == INVALID_PAGE_ID {
            return None;
        }
        let frame = self.fetch_frame(page_id, access)?;
        // Safety: the frame is kept alive by the shared pool state.
        Some(unsafe { ReadPageGuard::new(page_id, frame, Arc::clone(&self.state)) })
    }

    /// Fetches a page for exclusive write access. Returns None when the
    /// page id is invalid or every frame is pinned.
    pub fn checked_write_page(&self, page_id: PageId, access: AccessKind) -> Option<WritePageGuard> {
        if page_id == INVALID_PAGE_ID {
            return None;
        }
        let frame = self.fetch_frame(page_id, access)?;
        // Safety: the frame is kept alive by the shared pool state.
        Some(unsafe { WritePageGuard::new(page_id, frame, Arc::clone(&self.state)) })
    }

    /// Aborting wrapper around `checked_read_page`, for callers that treat
    /// frame exhaustion as unrecoverable (tests, mostly).
    pub fn read_page(&self, page_id: PageId, access: AccessKind) -> ReadPageGuard {
        self.checked_read_page(page_id, access)
            .expect("buffer pool has no frame available for read")
    }

    /// Aborting wrapper around `checked_write_page`.
    pub fn write_page(&self, page_id: PageId, access: AccessKind) -> WritePageGuard {
        self.checked_write_page(page_id, access)
            .expect("buffer pool has no frame available for write")
    }

    /// Writes the page back to disk if cached and clears its dirty flag.
    pub fn flush_page(&self, page_id: PageId) -> Result<bool> {
        let inner = self.state.inner.lock();

        let Some(&frame_id) = inner.page_table.get(&page_id) else {
            return Ok(false);
        };
        let frame = &self.state.frames[frame_id.as_usize()];
        frame.set_dirty(false);

        let (tx, rx) = mpsc::channel();
        self.disk_scheduler.schedule(
            DiskRequest::write(page_id, frame.data_ptr(), tx),
            frame_id.as_usize(),
        )?;
        let _ = rx.recv();

        Ok(true)
    }

    /// Flushes every cached dirty page. There is no atomicity across
    /// frames; pages dirtied during the sweep may or may not be included.
    pub fn flush_all_pages(&self) -> Result<()> {
        let pages: Vec<PageId> = {
            let inner = self.state.inner.lock();
            inner
                .page_table
                .iter()
                .filter(|(_, fid)| self.state.frames[fid.as_usize()].is_dirty())
                .map(|(&pid, _)| pid)
                .collect()
        };

        for page_id in pages {
            self.flush_page(page_id)?;
        }
        Ok(())
    }

    /// Drops a page from the pool and deallocates it on disk. Returns
    /// false when the page is pinned; an uncached page is trivially gone.
    pub fn delete_page(&self, page_id: PageId) -> Result<bool> {
        let mut inner = self.state.inner.lock();

        let Some(&frame_id) = inner.page_table.get(&page_id) else {
            return Ok(true);
        };
        let frame = &self.state.frames[frame_id.as_usize()];
        if frame.pin_count() > 0 {
            return Ok(false);
        }

        inner.page_table.remove(&page_id);
        self.state.replacer.remove(frame_id);
        inner.free_frames.push(frame_id);
        frame.reset();

        self.disk_scheduler.deallocate_page(page_id)?;
        Ok(true)
    }

    /// Returns the pin count for a cached page.
    pub fn get_pin_count(&self, page_id: PageId) -> Option<u32> {
        let inner = self.state.inner.lock();
        inner
            .page_table
            .get(&page_id)
            .map(|fid| self.state.frames[fid.as_usize()].pin_count())
    }

    pub fn size(&self) -> usize {
        self.num_frames
    }

    pub fn free_frame_count(&self) -> usize {
        self.state.inner.lock().free_frames.len()
    }

    pub fn disk_manager(&self) -> &Arc<DiskManager> {
        self.disk_scheduler.disk_manager()
    }

    /// Pins the frame holding `page_id`, reading it from disk first if it
    /// is not cached. Returns the frame with its I/O completed.
    fn fetch_frame(&self, page_id: PageId, access: AccessKind) -> Option<Arc<FrameHeader>> {
        let mut inner = self.state.inner.lock();

        if let Some(&frame_id) = inner.page_table.get(&page_id) {
            let frame = Arc::clone(&self.state.frames[frame_id.as_usize()]);
            frame.pin();
            self.state.replacer.record_access(frame_id, access);
            self.state.replacer.set_evictable(frame_id, false);
            drop(inner);

            frame.wait_io_done();
            return Some(frame);
        }

        let frame_id = match inner.free_frames.pop() {
            Some(frame_id) => frame_id,
            None => self.state.replacer.evict()?,
        };
        let frame = Arc::clone(&self.state.frames[frame_id.as_usize()]);

        let old_page_id = frame.page_id();
        let was_dirty = frame.is_dirty();
        if old_page_id != INVALID_PAGE_ID {
            inner.page_table.remove(&old_page_id);
        }
        inner.page_table.insert(page_id, frame_id);

        frame.set_pin_count(1);
        frame.set_dirty(false);
        frame.begin_io();
        frame.set_page_id(page_id);
        self.state.replacer.record_access(frame_id, access);
        self.state.replacer.set_evictable(frame_id, false);

        // Writeback and read go to the same shard; per-shard FIFO makes
        // the read observe the frame only after the old page left it.
        let shard = frame_id.as_usize();
        let mut write_rx = None;
        if was_dirty {
            let (tx, rx) = mpsc::channel();
            if self
                .disk_scheduler
                .schedule(DiskRequest::write(old_page_id, frame.data_ptr(), tx), shard)
                .is_ok()
            {
                write_rx = Some(rx);
            } else {
                log::error!("failed to schedule writeback of {old_page_id}");
            }
        }

        let (tx, read_rx) = mpsc::channel();
        if self
            .disk_scheduler
            .schedule(DiskRequest::read(page_id, frame.data_ptr(), tx), shard)
            .is_err()
        {
            log::error!("failed to schedule read of {page_id}");
        }
        drop(inner);

        if let Some(rx) = write_rx {
            let _ = rx.recv();
        }
        let _ = read_rx.recv();
        frame.complete_io();

        Some(frame)
    }
}
