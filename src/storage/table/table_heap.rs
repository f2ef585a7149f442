use std::sync::Arc;

use bytes::Bytes;
use parking_lot::Mutex;

use crate::buffer::BufferPoolManager;
use crate::common::{
    AccessKind, BrambleError, PageId, RecordId, Result, PAGE_SIZE,
};
use crate::storage::page::{TablePage, TablePageRef};
use crate::tuple::{Tuple, TupleMeta};

use super::table_iterator::TableIterator;

/// Upper bound on a single tuple: it must fit an empty page together with
/// its slot entry.
const MAX_TUPLE_SIZE: usize = PAGE_SIZE - 32;

/// TableHeap is an append-only collection of table pages linked in a
/// forward list. Tuples never move once inserted; updates either rewrite
/// the slot in place or go through delete-and-reinsert at the executor
/// level.
pub struct TableHeap {
    bpm: Arc<BufferPoolManager>,
    first_page_id: PageId,
    /// Tail of the page list; also serializes appends
    last_page_id: Mutex<PageId>,
}

impl TableHeap {
    /// Creates a heap with one empty page.
    pub fn new(bpm: Arc<BufferPoolManager>) -> Result<Self> {
        let first_page_id = bpm.new_page()?;
        {
            let mut guard = bpm
                .checked_write_page(first_page_id, AccessKind::Unknown)
                .ok_or(BrambleError::BufferPoolFull)?;
            TablePage::new(guard.data_mut()).init(first_page_id);
        }

        Ok(Self {
            bpm,
            first_page_id,
            last_page_id: Mutex::new(first_page_id),
        })
    }

    pub fn first_page_id(&self) -> PageId {
        self.first_page_id
    }

    pub fn buffer_pool(&self) -> &Arc<BufferPoolManager> {
        &self.bpm
    }

    /// Appends a tuple to the heap, growing it by a page when the tail is
    /// full. Returns the new tuple's record id.
    pub fn insert_tuple(&self, meta: TupleMeta, tuple: &Tuple) -> Result<RecordId> {
        if tuple.data().len() > MAX_TUPLE_SIZE {
            return Err(BrambleError::TupleTooLarge {
                tuple_size: tuple.data().len(),
                available: MAX_TUPLE_SIZE,
            });
        }

        let mut last_page_id = self.last_page_id.lock();
        loop {
            let mut guard = self
                .bpm
                .checked_write_page(*last_page_id, AccessKind::Unknown)
                .ok_or(BrambleError::BufferPoolFull)?;
            let mut page = TablePage::new(guard.data_mut());

            if let Some(slot) = page.insert_tuple(meta, tuple.data()) {
                return Ok(RecordId::new(*last_page_id, slot));
            }

            // Tail is full; chain a fresh page and retry there.
            let next_page_id = self.bpm.new_page()?;
            page.set_next_page_id(next_page_id);
            drop(guard);

            let mut next_guard = self
                .bpm
                .checked_write_page(next_page_id, AccessKind::Unknown)
                .ok_or(BrambleError::BufferPoolFull)?;
            TablePage::new(next_guard.data_mut()).init(next_page_id);
            *last_page_id = next_page_id;
        }
    }

    /// Reads a tuple and its metadata.
    pub fn get_tuple(&self, rid: RecordId) -> Result<(TupleMeta, Tuple)> {
        let guard = self
            .bpm
            .checked_read_page(rid.page_id, AccessKind::Unknown)
            .ok_or(BrambleError::BufferPoolFull)?;
        let page = TablePageRef::new(guard.data());

        let meta = page
            .meta(rid.slot_id)
            .ok_or(BrambleError::InvalidRecordId(rid))?;
        let bytes = page
            .tuple_bytes(rid.slot_id)
            .ok_or(BrambleError::InvalidRecordId(rid))?;
        Ok((meta, Tuple::from_bytes(rid, Bytes::copy_from_slice(bytes))))
    }

    pub fn get_tuple_meta(&self, rid: RecordId) -> Result<TupleMeta> {
        let guard = self
            .bpm
            .checked_read_page(rid.page_id, AccessKind::Unknown)
            .ok_or(BrambleError::BufferPoolFull)?;
        TablePageRef::new(guard.data())
            .meta(rid.slot_id)
            .ok_or(BrambleError::InvalidRecordId(rid))
    }

    /// Overwrites a tuple's metadata (commit stamping, logical deletes).
    pub fn update_tuple_meta(&self, meta: TupleMeta, rid: RecordId) -> Result<()> {
        let mut guard = self
            .bpm
            .checked_write_page(rid.page_id, AccessKind::Unknown)
            .ok_or(BrambleError::BufferPoolFull)?;
        if TablePage::new(guard.data_mut()).update_meta(meta, rid.slot_id) {
            Ok(())
        } else {
            Err(BrambleError::InvalidRecordId(rid))
        }
    }

    /// Rewrites a tuple's payload and metadata in place.
    ///
    /// When `expected` is given, the slot's current metadata must still
    /// match it; a mismatch means another transaction slipped in between
    /// the caller's read and this write, and surfaces as a write conflict.
    pub fn update_tuple_in_place(
        &self,
        meta: TupleMeta,
        tuple: &Tuple,
        rid: RecordId,
        expected: Option<TupleMeta>,
    ) -> Result<()> {
        let mut guard = self
            .bpm
            .checked_write_page(rid.page_id, AccessKind::Unknown)
            .ok_or(BrambleError::BufferPoolFull)?;
        let mut page = TablePage::new(guard.data_mut());

        if let Some(expected) = expected {
            let current = page
                .as_ref()
                .meta(rid.slot_id)
                .ok_or(BrambleError::InvalidRecordId(rid))?;
            if current != expected {
                return Err(BrambleError::WriteConflict(format!(
                    "tuple {rid} changed under the update"
                )));
            }
        }

        if page.update_tuple_in_place(meta, tuple.data(), rid.slot_id) {
            Ok(())
        } else {
            Err(BrambleError::InvalidRecordId(rid))
        }
    }

    /// Forward iterator over every slot in the heap.
    pub fn iter(self: &Arc<Self>) -> TableIterator {
        TableIterator::new(Arc::clone(self), self.first_page_id)
    }
}
