use std::sync::Arc;

use bytes::Bytes;

use crate::common::{AccessKind, PageId, RecordId, SlotId, INVALID_PAGE_ID};
use crate::storage::page::TablePageRef;
use crate::tuple::{Tuple, TupleMeta};

use super::table_heap::TableHeap;

/// Forward iterator over a table heap, yielding every slot together with
/// its metadata. Pages are pinned one at a time with Scan accesses so a
/// long scan stays in the replacer's scan tier.
pub struct TableIterator {
    heap: Arc<TableHeap>,
    page_id: PageId,
    slot: u16,
}

impl TableIterator {
    pub(crate) fn new(heap: Arc<TableHeap>, first_page_id: PageId) -> Self {
        Self {
            heap,
            page_id: first_page_id,
            slot: 0,
        }
    }
}

impl Iterator for TableIterator {
    type Item = (RecordId, TupleMeta, Tuple);

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if self.page_id == INVALID_PAGE_ID {
                return None;
            }

            let guard = self
                .heap
                .buffer_pool()
                .checked_read_page(self.page_id, AccessKind::Scan)?;
            let page = TablePageRef::new(guard.data());

            if self.slot < page.num_slots() {
                let slot = SlotId::new(self.slot);
                self.slot += 1;

                let rid = RecordId::new(self.page_id, slot);
                let meta = page.meta(slot)?;
                let bytes = Bytes::copy_from_slice(page.tuple_bytes(slot)?);
                return Some((rid, meta, Tuple::from_bytes(rid, bytes)));
            }

            self.page_id = page.next_page_id().unwrap_or(INVALID_PAGE_ID);
            self.slot = 0;
        }
    }
}
