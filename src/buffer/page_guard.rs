use std::ops::{Deref, DerefMut};
use std::sync::Arc;

use parking_lot::{RwLockReadGuard, RwLockWriteGuard};

use crate::common::{PageId, PAGE_SIZE};

use super::buffer_pool_manager::BufferPoolState;
use super::FrameHeader;

/// RAII guard for shared read access to a page.
///
/// Construction acquires the frame's read latch; dropping the guard
/// releases the latch, then decrements the pin count under the BPM latch
/// and marks the frame evictable once nobody holds it.
pub struct ReadPageGuard {
    page_id: PageId,
    frame: Arc<FrameHeader>,
    state: Arc<BufferPoolState>,
    /// Read latch on the page data; None only while dropping
    data_guard: Option<RwLockReadGuard<'static, Box<[u8; PAGE_SIZE]>>>,
}

impl ReadPageGuard {
    /// # Safety
    /// The frame must stay alive for the guard's lifetime; the pool state
    /// passed in owns it.
    pub(crate) unsafe fn new(
        page_id: PageId,
        frame: Arc<FrameHeader>,
        state: Arc<BufferPoolState>,
    ) -> Self {
        let data_guard = frame.data.read();
        // The frame is kept alive via Arc, so the latch may outlive the
        // borrow checker's view of it.
        let data_guard: RwLockReadGuard<'static, Box<[u8; PAGE_SIZE]>> =
            std::mem::transmute(data_guard);

        Self {
            page_id,
            frame,
            state,
            data_guard: Some(data_guard),
        }
    }

    pub fn page_id(&self) -> PageId {
        self.page_id
    }

    /// Returns the page bytes. Panics if the guard was already released.
    pub fn data(&self) -> &[u8] {
        &self.data_guard.as_ref().expect("use after release")[..]
    }

    /// Drops this guard, releasing the page.
    pub fn drop_guard(self) {
        drop(self);
    }
}

impl Deref for ReadPageGuard {
    type Target = [u8];

    fn deref(&self) -> &Self::Target {
        self.data()
    }
}

impl Drop for ReadPageGuard {
    fn drop(&mut self) {
        // Release the frame latch before touching pool bookkeeping.
        self.data_guard.take();

        let _bpm_latch = self.state.inner.lock();
        if let Some(0) = self.frame.unpin() {
            self.state
                .replacer
                .set_evictable(self.frame.frame_id(), true);
        }
    }
}

/// RAII guard for exclusive write access to a page.
///
/// The frame is flagged dirty the first time the data is borrowed
/// mutably; the flag lands on the frame when the guard drops.
pub struct WritePageGuard {
    page_id: PageId,
    frame: Arc<FrameHeader>,
    state: Arc<BufferPoolState>,
    is_dirty: bool,
    /// Write latch on the page data; None only while dropping
    data_guard: Option<RwLockWriteGuard<'static, Box<[u8; PAGE_SIZE]>>>,
}

impl WritePageGuard {
    /// # Safety
    /// See `ReadPageGuard::new`.
    pub(crate) unsafe fn new(
        page_id: PageId,
        frame: Arc<FrameHeader>,
        state: Arc<BufferPoolState>,
    ) -> Self {
        let data_guard = frame.data.write();
        let data_guard: RwLockWriteGuard<'static, Box<[u8; PAGE_SIZE]>> =
            std::mem::transmute(data_guard);

        Self {
            page_id,
            frame,
            state,
            is_dirty: false,
            data_guard: Some(data_guard),
        }
    }

    pub fn page_id(&self) -> PageId {
        self.page_id
    }

    /// Returns the page bytes. Panics if the guard was already released.
    pub fn data(&self) -> &[u8] {
        &self.data_guard.as_ref().expect("use after release")[..]
    }

    /// Returns the page bytes mutably and marks the page dirty.
    pub fn data_mut(&mut self) -> &mut [u8] {
        self.is_dirty = true;
        &mut self.data_guard.as_mut().expect("use after release")[..]
    }

    /// Drops this guard, releasing the page.
    pub fn drop_guard(self) {
        drop(self);
    }
}

impl Deref for WritePageGuard {
    type Target = [u8];

    fn deref(&self) -> &Self::Target {
        self.data()
    }
}

impl DerefMut for WritePageGuard {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.data_mut()
    }
}

impl Drop for WritePageGuard {
    fn drop(&mut self) {
        self.data_guard.take();

        let _bpm_latch = self.state.inner.lock();
        if self.is_dirty {
            self.frame.set_dirty(true);
        }
        if let Some(0) = self.frame.unpin() {
            self.state
                .replacer
                .set_evictable(self.frame.frame_id(), true);
        }
    }
}
