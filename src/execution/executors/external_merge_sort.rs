use std::cmp::Ordering;
use std::sync::Arc;

use bytes::Bytes;

use crate::buffer::BufferPoolManager;
use crate::common::{
    AccessKind, BrambleError, PageId, RecordId, Result, SlotId, PAGE_SIZE,
};
use crate::execution::{Executor, ExecutorContext, OrderByType, SortPlan};
use crate::tuple::{Schema, Tuple, Value, FIXED_VALUE_SIZE};

/// Sort page layout:
///
/// +--------+----------------------+-----+----------------------+
/// | HEADER | keys(1) rid tuple(1) | ... | keys(n) rid tuple(n) |
/// +--------+----------------------+-----+----------------------+
///
/// Header: size u32 | max_size u32 | key_count u32 | tuple_size u32.
/// Entries are fixed width: each sort key value takes FIXED_VALUE_SIZE
/// bytes, the rid eight, the tuple its schema's storage size. Only
/// fixed-width tuples can be spilled.
const SORT_PAGE_HEADER: usize = 16;
const RID_SIZE: usize = 8;

fn entry_size(key_count: usize, tuple_size: usize) -> usize {
    key_count * FIXED_VALUE_SIZE + RID_SIZE + tuple_size
}

fn page_capacity(key_count: usize, tuple_size: usize) -> usize {
    (PAGE_SIZE - SORT_PAGE_HEADER) / entry_size(key_count, tuple_size)
}

type SortEntry = (Vec<Value>, RecordId, Bytes);

struct SortPage<'a> {
    data: &'a mut [u8],
}

impl<'a> SortPage<'a> {
    fn new(data: &'a mut [u8]) -> Self {
        assert_eq!(data.len(), PAGE_SIZE);
        Self { data }
    }

    fn init(&mut self, key_count: usize, tuple_size: usize) {
        let max_size = page_capacity(key_count, tuple_size);
        self.data.fill(0);
        self.data[0..4].copy_from_slice(&0u32.to_le_bytes());
        self.data[4..8].copy_from_slice(&(max_size as u32).to_le_bytes());
        self.data[8..12].copy_from_slice(&(key_count as u32).to_le_bytes());
        self.data[12..16].copy_from_slice(&(tuple_size as u32).to_le_bytes());
    }

    fn append(&mut self, keys: &[Value], rid: RecordId, tuple_data: &[u8]) {
        let view = SortPageRef::new(self.data);
        let (size, max_size) = (view.size(), view.max_size());
        let (key_count, tuple_size) = (view.key_count(), view.tuple_size());
        assert!(size < max_size, "sort page overflow");
        assert_eq!(keys.len(), key_count);
        assert_eq!(tuple_data.len(), tuple_size);

        let mut offset = SORT_PAGE_HEADER + size * entry_size(key_count, tuple_size);
        for key in keys {
            self.data[offset..offset + FIXED_VALUE_SIZE].copy_from_slice(&key.encode_fixed());
            offset += FIXED_VALUE_SIZE;
        }
        self.data[offset..offset + 4].copy_from_slice(&rid.page_id.as_u32().to_le_bytes());
        self.data[offset + 4..offset + 6].copy_from_slice(&rid.slot_id.as_u16().to_le_bytes());
        offset += RID_SIZE;
        self.data[offset..offset + tuple_size].copy_from_slice(tuple_data);

        self.data[0..4].copy_from_slice(&((size + 1) as u32).to_le_bytes());
    }
}

struct SortPageRef<'a> {
    data: &'a [u8],
}

impl<'a> SortPageRef<'a> {
    fn new(data: &'a [u8]) -> Self {
        assert_eq!(data.len(), PAGE_SIZE);
        Self { data }
    }

    fn size(&self) -> usize {
        u32::from_le_bytes(self.data[0..4].try_into().unwrap()) as usize
    }

    fn max_size(&self) -> usize {
        u32::from_le_bytes(self.data[4..8].try_into().unwrap()) as usize
    }

    fn key_count(&self) -> usize {
        u32::from_le_bytes(self.data[8..12].try_into().unwrap()) as usize
    }

    fn tuple_size(&self) -> usize {
        u32::from_le_bytes(self.data[12..16].try_into().unwrap()) as usize
    }

    fn entry(&self, index: usize) -> SortEntry {
        assert!(index < self.size());
        let (key_count, tuple_size) = (self.key_count(), self.tuple_size());
        let mut offset = SORT_PAGE_HEADER + index * entry_size(key_count, tuple_size);

        let mut keys = Vec::with_capacity(key_count);
        for _ in 0..key_count {
            keys.push(Value::decode_fixed(
                &self.data[offset..offset + FIXED_VALUE_SIZE],
            ));
            offset += FIXED_VALUE_SIZE;
        }
        let page_id = u32::from_le_bytes(self.data[offset..offset + 4].try_into().unwrap());
        let slot = u16::from_le_bytes(self.data[offset + 4..offset + 6].try_into().unwrap());
        offset += RID_SIZE;
        let rid = RecordId::new(PageId::new(page_id), SlotId::new(slot));
        let tuple = Bytes::copy_from_slice(&self.data[offset..offset + tuple_size]);

        (keys, rid, tuple)
    }
}

/// Lexicographic comparison over the order-by list; DEFAULT sorts
/// ascending. NULLs compare equal to everything, which keeps the order
/// stable without inventing a NULL ordering.
pub struct TupleComparator {
    order_bys: Vec<OrderByType>,
}

impl TupleComparator {
    pub fn new(order_bys: Vec<OrderByType>) -> Self {
        Self { order_bys }
    }

    pub fn compare(&self, a: &[Value], b: &[Value]) -> Ordering {
        for (i, order) in self.order_bys.iter().enumerate() {
            let Some(ordering) = a[i].compare(&b[i]) else {
                continue;
            };
            if ordering == Ordering::Equal {
                continue;
            }
            return match order {
                OrderByType::Default | OrderByType::Asc => ordering,
                OrderByType::Desc => ordering.reverse(),
            };
        }
        Ordering::Equal
    }
}

/// Reads one sorted run front to back, one page pinned at a time.
struct RunCursor<'a> {
    bpm: &'a Arc<BufferPoolManager>,
    pages: &'a [PageId],
    page_idx: usize,
    slot: usize,
    pending: Option<SortEntry>,
}

impl<'a> RunCursor<'a> {
    fn new(bpm: &'a Arc<BufferPoolManager>, pages: &'a [PageId]) -> Self {
        Self {
            bpm,
            pages,
            page_idx: 0,
            slot: 0,
            pending: None,
        }
    }

    fn peek(&mut self) -> Result<Option<&SortEntry>> {
        if self.pending.is_none() {
            self.pending = self.read_next()?;
        }
        Ok(self.pending.as_ref())
    }

    fn take(&mut self) -> Result<Option<SortEntry>> {
        self.peek()?;
        Ok(self.pending.take())
    }

    fn read_next(&mut self) -> Result<Option<SortEntry>> {
        while self.page_idx < self.pages.len() {
            let guard = self
                .bpm
                .checked_read_page(self.pages[self.page_idx], AccessKind::Scan)
                .ok_or(BrambleError::BufferPoolFull)?;
            let page = SortPageRef::new(guard.data());
            if self.slot < page.size() {
                let entry = page.entry(self.slot);
                self.slot += 1;
                return Ok(Some(entry));
            }
            self.page_idx += 1;
            self.slot = 0;
        }
        Ok(None)
    }
}

/// External merge sort: buffers child tuples into sorted spill pages,
/// then 2-way merges runs until one remains, and scans it.
pub struct ExternalMergeSortExecutor {
    ctx: Arc<ExecutorContext>,
    plan: SortPlan,
    child: Box<dyn Executor>,
    cmp: TupleComparator,
    sorted: bool,
    run: Vec<PageId>,
    page_idx: usize,
    slot: usize,
}

impl ExternalMergeSortExecutor {
    pub fn new(ctx: Arc<ExecutorContext>, plan: SortPlan, child: Box<dyn Executor>) -> Self {
        let cmp = TupleComparator::new(plan.order_bys.iter().map(|(o, _)| *o).collect());
        Self {
            ctx,
            plan,
            child,
            cmp,
            sorted: false,
            run: Vec::new(),
            page_idx: 0,
            slot: 0,
        }
    }

    fn sort_key(&self, tuple: &Tuple, schema: &Schema) -> Vec<Value> {
        self.plan
            .order_bys
            .iter()
            .map(|(_, expr)| expr.evaluate(tuple, schema))
            .collect()
    }

    fn write_page(
        &self,
        entries: &mut Vec<SortEntry>,
        key_count: usize,
        tuple_size: usize,
    ) -> Result<PageId> {
        let page_id = self.ctx.bpm.new_page()?;
        let mut guard = self
            .ctx
            .bpm
            .checked_write_page(page_id, AccessKind::Scan)
            .ok_or(BrambleError::BufferPoolFull)?;
        let mut page = SortPage::new(guard.data_mut());
        page.init(key_count, tuple_size);
        for (keys, rid, data) in entries.iter() {
            page.append(keys, *rid, data);
        }
        entries.clear();
        Ok(page_id)
    }

    fn merge_runs(
        &self,
        a: &[PageId],
        b: &[PageId],
        capacity: usize,
        key_count: usize,
        tuple_size: usize,
    ) -> Result<Vec<PageId>> {
        let mut out_pages = Vec::new();
        let mut out_buf: Vec<SortEntry> = Vec::with_capacity(capacity);
        let mut cursor_a = RunCursor::new(&self.ctx.bpm, a);
        let mut cursor_b = RunCursor::new(&self.ctx.bpm, b);

        loop {
            let take_a = match (cursor_a.peek()?, cursor_b.peek()?) {
                (None, None) => break,
                (Some(_), None) => true,
                (None, Some(_)) => false,
                (Some(ea), Some(eb)) => self.cmp.compare(&ea.0, &eb.0) != Ordering::Greater,
            };
            let entry = if take_a {
                cursor_a.take()?
            } else {
                cursor_b.take()?
            }
            .expect("peeked entry vanished");

            out_buf.push(entry);
            if out_buf.len() == capacity {
                out_pages.push(self.write_page(&mut out_buf, key_count, tuple_size)?);
            }
        }
        if !out_buf.is_empty() {
            out_pages.push(self.write_page(&mut out_buf, key_count, tuple_size)?);
        }
        Ok(out_pages)
    }

    fn sort(&mut self) -> Result<()> {
        let schema = self.child.output_schema();
        let tuple_size = schema.storage_size().ok_or_else(|| {
            BrambleError::Execution("external sort requires fixed-width tuples".into())
        })?;
        let key_count = self.plan.order_bys.len();
        let capacity = page_capacity(key_count, tuple_size);
        if capacity == 0 {
            return Err(BrambleError::Execution(
                "sort entry does not fit in a page".into(),
            ));
        }

        // Pass 1: sorted runs, one page each.
        let mut runs: Vec<Vec<PageId>> = Vec::new();
        let mut buffer: Vec<SortEntry> = Vec::with_capacity(capacity);
        while let Some((tuple, rid)) = self.child.next()? {
            if buffer.len() == capacity {
                buffer.sort_by(|x, y| self.cmp.compare(&x.0, &y.0));
                runs.push(vec![self.write_page(&mut buffer, key_count, tuple_size)?]);
            }
            let keys = self.sort_key(&tuple, &schema);
            buffer.push((keys, rid, tuple.into_bytes()));
        }
        if !buffer.is_empty() {
            buffer.sort_by(|x, y| self.cmp.compare(&x.0, &y.0));
            runs.push(vec![self.write_page(&mut buffer, key_count, tuple_size)?]);
        }

        // Pass 2..n: pairwise 2-way merges until one run stands.
        while runs.len() > 1 {
            let mut merged = Vec::with_capacity(runs.len() / 2 + 1);
            let mut i = 0;
            while i + 1 < runs.len() {
                let out = self.merge_runs(&runs[i], &runs[i + 1], capacity, key_count, tuple_size)?;
                for page_id in runs[i].iter().chain(runs[i + 1].iter()) {
                    let _ = self.ctx.bpm.delete_page(*page_id);
                }
                merged.push(out);
                i += 2;
            }
            if i < runs.len() {
                merged.push(runs[i].clone());
            }
            runs = merged;
        }

        self.run = runs.pop().unwrap_or_default();
        Ok(())
    }
}

impl Executor for ExternalMergeSortExecutor {
    fn init(&mut self) -> Result<()> {
        self.child.init()?;
        if !self.sorted {
            self.sort()?;
            self.sorted = true;
        }
        self.page_idx = 0;
        self.slot = 0;
        Ok(())
    }

    fn next(&mut self) -> Result<Option<(Tuple, RecordId)>> {
        loop {
            if self.page_idx >= self.run.len() {
                return Ok(None);
            }
            let guard = self
                .ctx
                .bpm
                .checked_read_page(self.run[self.page_idx], AccessKind::Scan)
                .ok_or(BrambleError::BufferPoolFull)?;
            let page = SortPageRef::new(guard.data());

            if self.slot < page.size() {
                let (_, rid, data) = page.entry(self.slot);
                self.slot += 1;
                return Ok(Some((Tuple::from_bytes(rid, data), rid)));
            }
            self.page_idx += 1;
            self.slot = 0;
        }
    }

    fn output_schema(&self) -> Arc<Schema> {
        Arc::clone(&self.plan.output_schema)
    }
}
