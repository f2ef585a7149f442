use std::sync::Arc;

use crate::buffer::{BufferPoolManager, ReadPageGuard};
use crate::common::{AccessKind, RecordId, INVALID_PAGE_ID};

use super::btree_page::{IndexKey, LeafPageRef};

/// Forward iterator over the tree's leaf chain. Holds a read latch on
/// exactly one leaf at a time and walks `next_page_id` links in key
/// order.
pub struct BTreeIterator {
    bpm: Arc<BufferPoolManager>,
    leaf: Option<ReadPageGuard>,
    index: usize,
}

impl BTreeIterator {
    pub(crate) fn new(bpm: Arc<BufferPoolManager>, leaf: ReadPageGuard, index: usize) -> Self {
        Self {
            bpm,
            leaf: Some(leaf),
            index,
        }
    }

    pub(crate) fn empty(bpm: Arc<BufferPoolManager>) -> Self {
        Self {
            bpm,
            leaf: None,
            index: 0,
        }
    }
}

impl Iterator for BTreeIterator {
    type Item = (IndexKey, RecordId);

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let next_page = {
                let guard = self.leaf.as_ref()?;
                let leaf = LeafPageRef::new(guard.data());
                if self.index < leaf.size() {
                    let item = (leaf.key_at(self.index), leaf.rid_at(self.index));
                    self.index += 1;
                    return Some(item);
                }
                leaf.next_page_id()
            };

            if next_page == INVALID_PAGE_ID {
                self.leaf = None;
                return None;
            }

            let next_guard = self.bpm.checked_read_page(next_page, AccessKind::Index)?;
            self.leaf = Some(next_guard);
            self.index = 0;
        }
    }
}
