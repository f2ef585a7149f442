use std::collections::VecDeque;
use std::sync::Arc;

use crate::buffer::{BufferPoolManager, ReadPageGuard, WritePageGuard};
use crate::common::{
    AccessKind, BrambleError, PageId, RecordId, Result, INVALID_PAGE_ID,
};

use super::btree_iterator::BTreeIterator;
use super::btree_page::{
    read_root_page_id, BTreeHeaderPage, BTreePageRef, IndexKey, InternalPage, InternalPageRef,
    LeafPage, LeafPageRef,
};
use super::KeyComparator;

#[derive(Clone, Copy)]
enum TreeOp {
    Insert,
    Delete,
}

/// Latch-crabbing context: the write guards still held on the path from
/// the root (plus the header guard), all released the moment a child
/// proves it cannot split or underflow.
#[derive(Default)]
struct Context {
    header: Option<WritePageGuard>,
    write_set: VecDeque<WritePageGuard>,
    /// Pages emptied by merges, reclaimed after every latch is gone
    orphans: Vec<PageId>,
}

/// A concurrent B+Tree mapping fixed-width keys to record ids. The header
/// page pins down the current root; `INVALID_PAGE_ID` there means the
/// tree is empty. Keys are unique.
pub struct BPlusTree {
    bpm: Arc<BufferPoolManager>,
    comparator: Arc<dyn KeyComparator>,
    header_page_id: PageId,
    leaf_max_size: usize,
    internal_max_size: usize,
}

impl BPlusTree {
    /// Creates an empty tree, allocating its header page.
    pub fn new(
        bpm: Arc<BufferPoolManager>,
        comparator: Arc<dyn KeyComparator>,
        leaf_max_size: usize,
        internal_max_size: usize,
    ) -> Result<Self> {
        let header_page_id = bpm.new_page()?;
        {
            let mut guard = bpm
                .checked_write_page(header_page_id, AccessKind::Index)
                .ok_or(BrambleError::BufferPoolFull)?;
            BTreeHeaderPage::new(guard.data_mut()).set_root_page_id(INVALID_PAGE_ID);
        }

        Ok(Self {
            bpm,
            comparator,
            header_page_id,
            leaf_max_size,
            internal_max_size,
        })
    }

    pub fn header_page_id(&self) -> PageId {
        self.header_page_id
    }

    pub fn is_empty(&self) -> Result<bool> {
        let guard = self.read_guard(self.header_page_id)?;
        Ok(read_root_page_id(guard.data()) == INVALID_PAGE_ID)
    }

    /// Point lookup. Readers crab hand over hand, dropping each parent
    /// right after its child is latched.
    pub fn get_value(&self, key: &IndexKey) -> Result<Option<RecordId>> {
        let header_guard = self.read_guard(self.header_page_id)?;
        let root_id = read_root_page_id(header_guard.data());
        if root_id == INVALID_PAGE_ID {
            return Ok(None);
        }

        let mut guard = self.read_guard(root_id)?;
        drop(header_guard);

        loop {
            if BTreePageRef::new(guard.data()).is_leaf() {
                let leaf = LeafPageRef::new(guard.data());
                let found = leaf
                    .find_key(key, self.comparator.as_ref())
                    .map(|pos| leaf.rid_at(pos));
                return Ok(found);
            }
            let view = InternalPageRef::new(guard.data());
            let child = view.child_at(view.child_index_for(key, self.comparator.as_ref()));
            guard = self.read_guard(child)?;
        }
    }

    /// Inserts a key. Returns false (and changes nothing) on duplicates.
    pub fn insert(&self, key: &IndexKey, rid: RecordId) -> Result<bool> {
        let mut ctx = Context::default();
        let mut header_guard = self.write_guard(self.header_page_id)?;
        let root_id = read_root_page_id(header_guard.data());

        if root_id == INVALID_PAGE_ID {
            let root_id = self.bpm.new_page()?;
            {
                let mut root_guard = self.write_guard(root_id)?;
                let mut root = LeafPage::new(root_guard.data_mut());
                root.init(self.leaf_max_size);
                root.insert(key, rid, self.comparator.as_ref());
            }
            BTreeHeaderPage::new(header_guard.data_mut()).set_root_page_id(root_id);
            return Ok(true);
        }

        ctx.header = Some(header_guard);
        self.descend_for_write(key, root_id, TreeOp::Insert, &mut ctx)?;

        let mut leaf_guard = ctx
            .write_set
            .pop_back()
            .expect("descend always latches the leaf");
        let leaf_id = leaf_guard.page_id();
        let mut leaf = LeafPage::new(leaf_guard.data_mut());

        if !leaf.insert(key, rid, self.comparator.as_ref()) {
            return Ok(false);
        }
        if leaf.size() <= leaf.max_size() {
            return Ok(true);
        }

        // The leaf overflowed by one entry; split it and push the right
        // half's first key into the parent.
        let right_id = self.bpm.new_page()?;
        let mut right_guard = self.write_guard(right_id)?;
        let sep = {
            let mut right = LeafPage::new(right_guard.data_mut());
            right.init(self.leaf_max_size);
            let sep = leaf.split_into(&mut right);
            right.set_next_page_id(leaf.next_page_id());
            sep
        };
        leaf.set_next_page_id(right_id);

        drop(leaf);
        drop(leaf_guard);
        drop(right_guard);
        self.insert_into_parent(&mut ctx, leaf_id, sep, right_id)?;
        Ok(true)
    }

    /// Removes a key if present, redistributing or merging on underflow.
    pub fn remove(&self, key: &IndexKey) -> Result<()> {
        let mut ctx = Context::default();
        let header_guard = self.write_guard(self.header_page_id)?;
        let root_id = read_root_page_id(header_guard.data());
        if root_id == INVALID_PAGE_ID {
            return Ok(());
        }

        ctx.header = Some(header_guard);
        self.descend_for_write(key, root_id, TreeOp::Delete, &mut ctx)?;

        let mut leaf_guard = ctx
            .write_set
            .pop_back()
            .expect("descend always latches the leaf");
        let leaf_id = leaf_guard.page_id();
        let mut leaf = LeafPage::new(leaf_guard.data_mut());

        if !leaf.remove(key, self.comparator.as_ref()) {
            return Ok(());
        }

        if ctx.write_set.is_empty() {
            // The leaf is the root; it only dies when it empties out.
            if leaf.size() == 0 {
                drop(leaf);
                drop(leaf_guard);
                let header_guard = ctx
                    .header
                    .as_mut()
                    .expect("root delete without header latch");
                BTreeHeaderPage::new(header_guard.data_mut()).set_root_page_id(INVALID_PAGE_ID);
                ctx.orphans.push(leaf_id);
            }
            self.finish(ctx);
            return Ok(());
        }

        if leaf.size() >= leaf.min_size() {
            return Ok(());
        }

        drop(leaf);
        self.fix_leaf_underflow(&mut ctx, leaf_guard, leaf_id)?;
        self.finish(ctx);
        Ok(())
    }

    /// Iterator positioned at the smallest key.
    pub fn iter(&self) -> Result<BTreeIterator> {
        let header_guard = self.read_guard(self.header_page_id)?;
        let root_id = read_root_page_id(header_guard.data());
        if root_id == INVALID_PAGE_ID {
            return Ok(BTreeIterator::empty(Arc::clone(&self.bpm)));
        }

        let mut guard = self.read_guard(root_id)?;
        drop(header_guard);
        loop {
            if BTreePageRef::new(guard.data()).is_leaf() {
                return Ok(BTreeIterator::new(Arc::clone(&self.bpm), guard, 0));
            }
            let child = InternalPageRef::new(guard.data()).child_at(0);
            guard = self.read_guard(child)?;
        }
    }

    /// Iterator positioned at the first key >= `key`.
    pub fn iter_from(&self, key: &IndexKey) -> Result<BTreeIterator> {
        let header_guard = self.read_guard(self.header_page_id)?;
        let root_id = read_root_page_id(header_guard.data());
        if root_id == INVALID_PAGE_ID {
            return Ok(BTreeIterator::empty(Arc::clone(&self.bpm)));
        }

        let mut guard = self.read_guard(root_id)?;
        drop(header_guard);
        loop {
            if BTreePageRef::new(guard.data()).is_leaf() {
                let pos = LeafPageRef::new(guard.data()).lower_bound(key, self.comparator.as_ref());
                return Ok(BTreeIterator::new(Arc::clone(&self.bpm), guard, pos));
            }
            let view = InternalPageRef::new(guard.data());
            let child = view.child_at(view.child_index_for(key, self.comparator.as_ref()));
            guard = self.read_guard(child)?;
        }
    }

    fn read_guard(&self, page_id: PageId) -> Result<ReadPageGuard> {
        self.bpm
            .checked_read_page(page_id, AccessKind::Index)
            .ok_or(BrambleError::BufferPoolFull)
    }

    fn write_guard(&self, page_id: PageId) -> Result<WritePageGuard> {
        self.bpm
            .checked_write_page(page_id, AccessKind::Index)
            .ok_or(BrambleError::BufferPoolFull)
    }

    /// Descends to the leaf for `key`, keeping write latches only along
    /// the potentially-splitting (or potentially-underflowing) suffix of
    /// the path. A "safe" child lets every ancestor latch go.
    fn descend_for_write(
        &self,
        key: &IndexKey,
        root_id: PageId,
        op: TreeOp,
        ctx: &mut Context,
    ) -> Result<()> {
        let mut page_id = root_id;
        loop {
            let guard = self.write_guard(page_id)?;
            let (is_leaf, is_safe) = {
                let view = BTreePageRef::new(guard.data());
                let is_safe = match op {
                    TreeOp::Insert => view.size() < view.max_size() - 1,
                    TreeOp::Delete => view.size() > view.min_size(),
                };
                (view.is_leaf(), is_safe)
            };

            if is_safe {
                ctx.header = None;
                ctx.write_set.clear();
            }
            ctx.write_set.push_back(guard);

            if is_leaf {
                return Ok(());
            }
            let back = ctx.write_set.back().unwrap();
            let view = InternalPageRef::new(back.data());
            page_id = view.child_at(view.child_index_for(key, self.comparator.as_ref()));
        }
    }

    /// Inserts a separator into the parent of a freshly split pair,
    /// splitting upward as needed; grows a new root at the top.
    fn insert_into_parent(
        &self,
        ctx: &mut Context,
        left_id: PageId,
        key: IndexKey,
        right_id: PageId,
    ) -> Result<()> {
        let Some(mut parent_guard) = ctx.write_set.pop_back() else {
            let root_id = self.bpm.new_page()?;
            {
                let mut root_guard = self.write_guard(root_id)?;
                let mut root = InternalPage::new(root_guard.data_mut());
                root.init(self.internal_max_size);
                root.populate_new_root(left_id, &key, right_id);
            }
            let header_guard = ctx
                .header
                .as_mut()
                .expect("root split without header latch");
            BTreeHeaderPage::new(header_guard.data_mut()).set_root_page_id(root_id);
            log::debug!("b+tree root grew to {root_id}");
            return Ok(());
        };

        let parent_id = parent_guard.page_id();
        let mut parent = InternalPage::new(parent_guard.data_mut());
        let idx = parent
            .find_child_index(left_id)
            .expect("split child is missing from its parent");
        parent.insert_at(idx + 1, &key, right_id);

        if parent.size() <= parent.max_size() {
            return Ok(());
        }

        let new_right_id = self.bpm.new_page()?;
        let mut right_guard = self.write_guard(new_right_id)?;
        let sep = {
            let mut right = InternalPage::new(right_guard.data_mut());
            right.init(self.internal_max_size);
            parent.split_into(&mut right)
        };

        drop(parent);
        drop(parent_guard);
        drop(right_guard);
        self.insert_into_parent(ctx, parent_id, sep, new_right_id)
    }

    /// Repairs an underflowed leaf: redistribution from a sibling when
    /// possible, otherwise a merge that recurses into the parent.
    fn fix_leaf_underflow(
        &self,
        ctx: &mut Context,
        mut leaf_guard: WritePageGuard,
        leaf_id: PageId,
    ) -> Result<()> {
        let mut parent_guard = ctx
            .write_set
            .pop_back()
            .expect("underflowed non-root leaf has a latched parent");
        let parent_id = parent_guard.page_id();
        let mut parent = InternalPage::new(parent_guard.data_mut());

        let idx = parent
            .find_child_index(leaf_id)
            .expect("leaf is missing from its parent");
        let left_id = (idx > 0).then(|| parent.child_at(idx - 1));
        let right_id = (idx < parent.size()).then(|| parent.child_at(idx + 1));

        let mut leaf = LeafPage::new(leaf_guard.data_mut());

        if let Some(left_id) = left_id {
            let mut left_guard = self.write_guard(left_id)?;
            let mut left = LeafPage::new(left_guard.data_mut());
            if left.size() > left.min_size() {
                let last = left.size() - 1;
                let (moved_key, moved_rid) = (left.key_at(last), left.rid_at(last));
                left.remove_at(last);
                leaf.push_front(&moved_key, moved_rid);
                parent.set_key_at(idx, &leaf.key_at(0));
                return Ok(());
            }
        }

        if let Some(right_id) = right_id {
            let mut right_guard = self.write_guard(right_id)?;
            let mut right = LeafPage::new(right_guard.data_mut());
            if right.size() > right.min_size() {
                let (moved_key, moved_rid) = (right.key_at(0), right.rid_at(0));
                right.remove_at(0);
                leaf.push_back(&moved_key, moved_rid);
                parent.set_key_at(idx + 1, &right.key_at(0));
                return Ok(());
            }
        }

        if let Some(left_id) = left_id {
            // Merge this leaf into its left sibling.
            let mut left_guard = self.write_guard(left_id)?;
            let mut left = LeafPage::new(left_guard.data_mut());
            left.absorb(&leaf);
            left.set_next_page_id(leaf.next_page_id());
            drop(left);
            drop(left_guard);
            drop(leaf);
            drop(leaf_guard);
            ctx.orphans.push(leaf_id);

            parent.remove_at(idx);
            drop(parent);
            return self.fix_internal_underflow(ctx, parent_guard, parent_id);
        }

        if let Some(right_id) = right_id {
            // Absorb the right sibling into this leaf.
            let mut right_guard = self.write_guard(right_id)?;
            let right = LeafPage::new(right_guard.data_mut());
            leaf.absorb(&right);
            leaf.set_next_page_id(right.next_page_id());
            drop(right);
            drop(right_guard);
            ctx.orphans.push(right_id);

            parent.remove_at(idx + 1);
            drop(parent);
            drop(leaf);
            drop(leaf_guard);
            return self.fix_internal_underflow(ctx, parent_guard, parent_id);
        }

        unreachable!("a non-root node always has a sibling");
    }

    /// Repairs an underflowed internal node; collapses the root when it
    /// runs out of keys entirely.
    fn fix_internal_underflow(
        &self,
        ctx: &mut Context,
        mut node_guard: WritePageGuard,
        node_id: PageId,
    ) -> Result<()> {
        if ctx.write_set.is_empty() {
            // The node is the root. An empty internal root hands the
            // tree over to its only child.
            let survivor = {
                let node = InternalPageRef::new(node_guard.data());
                (node.size() == 0).then(|| node.child_at(0))
            };
            if let Some(child) = survivor {
                let header_guard = ctx
                    .header
                    .as_mut()
                    .expect("root shrink without header latch");
                BTreeHeaderPage::new(header_guard.data_mut()).set_root_page_id(child);
                drop(node_guard);
                ctx.orphans.push(node_id);
                log::debug!("b+tree root shrank to {child}");
            }
            return Ok(());
        }

        {
            let view = BTreePageRef::new(node_guard.data());
            if view.size() >= view.min_size() {
                return Ok(());
            }
        }

        let mut parent_guard = ctx
            .write_set
            .pop_back()
            .expect("underflowed non-root node has a latched parent");
        let parent_id = parent_guard.page_id();
        let mut parent = InternalPage::new(parent_guard.data_mut());

        let idx = parent
            .find_child_index(node_id)
            .expect("node is missing from its parent");
        let left_id = (idx > 0).then(|| parent.child_at(idx - 1));
        let right_id = (idx < parent.size()).then(|| parent.child_at(idx + 1));

        let mut node = InternalPage::new(node_guard.data_mut());

        if let Some(left_id) = left_id {
            let mut left_guard = self.write_guard(left_id)?;
            let mut left = InternalPage::new(left_guard.data_mut());
            if left.size() > left.min_size() {
                let sep = parent.key_at(idx);
                let new_sep = node.rotate_from_left(&sep, &mut left);
                parent.set_key_at(idx, &new_sep);
                return Ok(());
            }
        }

        if let Some(right_id) = right_id {
            let mut right_guard = self.write_guard(right_id)?;
            let mut right = InternalPage::new(right_guard.data_mut());
            if right.size() > right.min_size() {
                let sep = parent.key_at(idx + 1);
                let new_sep = node.rotate_from_right(&sep, &mut right);
                parent.set_key_at(idx + 1, &new_sep);
                return Ok(());
            }
        }

        if let Some(left_id) = left_id {
            let mut left_guard = self.write_guard(left_id)?;
            let mut left = InternalPage::new(left_guard.data_mut());
            let sep = parent.key_at(idx);
            left.absorb(&sep, &node);
            drop(left);
            drop(left_guard);
            drop(node);
            drop(node_guard);
            ctx.orphans.push(node_id);

            parent.remove_at(idx);
            drop(parent);
            return self.fix_internal_underflow(ctx, parent_guard, parent_id);
        }

        if let Some(right_id) = right_id {
            let mut right_guard = self.write_guard(right_id)?;
            let right = InternalPage::new(right_guard.data_mut());
            let sep = parent.key_at(idx + 1);
            node.absorb(&sep, &right);
            drop(right);
            drop(right_guard);
            ctx.orphans.push(right_id);

            parent.remove_at(idx + 1);
            drop(parent);
            drop(node);
            drop(node_guard);
            return self.fix_internal_underflow(ctx, parent_guard, parent_id);
        }

        unreachable!("a non-root node always has a sibling");
    }

    /// Drops every remaining latch, then hands merged-away pages back to
    /// the buffer pool.
    fn finish(&self, mut ctx: Context) {
        ctx.header = None;
        ctx.write_set.clear();
        for page_id in ctx.orphans.drain(..) {
            let _ = self.bpm.delete_page(page_id);
        }
    }
}
