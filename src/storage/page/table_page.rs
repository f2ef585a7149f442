use crate::common::{PageId, SlotId, Timestamp, INVALID_PAGE_ID, PAGE_SIZE};
use crate::tuple::TupleMeta;

/// Table page layout:
///
/// +------------------+
/// | Page Header      |  (16 bytes)
/// +------------------+
/// | Slot Array       |  (grows downward)
/// +------------------+
/// | Free Space       |
/// +------------------+
/// | Tuple Data       |  (grows upward from the page end)
/// +------------------+
///
/// Each slot carries the tuple's location plus its MVCC metadata:
///   offset u16 | length u16 | ts u64 | is_deleted u8 | pad
/// A length of 0 marks a slot that was never written.
const HEADER_SIZE: usize = 16;
const SLOT_SIZE: usize = 16;

const PAGE_ID_OFFSET: usize = 0;
const NEXT_PAGE_ID_OFFSET: usize = 4;
const NUM_SLOTS_OFFSET: usize = 8;
const FREE_SPACE_START_OFFSET: usize = 10;
const FREE_SPACE_END_OFFSET: usize = 12;

const SLOT_TUPLE_OFFSET: usize = 0;
const SLOT_TUPLE_LEN: usize = 2;
const SLOT_TS: usize = 4;
const SLOT_DELETED: usize = 12;

fn slot_base(slot: usize) -> usize {
    HEADER_SIZE + slot * SLOT_SIZE
}

/// Read-only view over a table page.
pub struct TablePageRef<'a> {
    data: &'a [u8],
}

impl<'a> TablePageRef<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        assert_eq!(data.len(), PAGE_SIZE);
        Self { data }
    }

    pub fn page_id(&self) -> PageId {
        PageId::new(read_u32(self.data, PAGE_ID_OFFSET))
    }

    pub fn next_page_id(&self) -> Option<PageId> {
        let raw = read_u32(self.data, NEXT_PAGE_ID_OFFSET);
        (raw != INVALID_PAGE_ID.as_u32()).then(|| PageId::new(raw))
    }

    pub fn num_slots(&self) -> u16 {
        read_u16(self.data, NUM_SLOTS_OFFSET)
    }

    pub fn free_space(&self) -> usize {
        let start = read_u16(self.data, FREE_SPACE_START_OFFSET) as usize;
        let end = read_u16(self.data, FREE_SPACE_END_OFFSET) as usize;
        end - start
    }

    pub fn meta(&self, slot: SlotId) -> Option<TupleMeta> {
        let base = self.valid_slot(slot)?;
        Some(TupleMeta::new(
            read_u64(self.data, base + SLOT_TS),
            self.data[base + SLOT_DELETED] != 0,
        ))
    }

    pub fn tuple_bytes(&self, slot: SlotId) -> Option<&'a [u8]> {
        let base = self.valid_slot(slot)?;
        let offset = read_u16(self.data, base + SLOT_TUPLE_OFFSET) as usize;
        let len = read_u16(self.data, base + SLOT_TUPLE_LEN) as usize;
        Some(&self.data[offset..offset + len])
    }

    fn valid_slot(&self, slot: SlotId) -> Option<usize> {
        if slot.as_u16() >= self.num_slots() {
            return None;
        }
        let base = slot_base(slot.as_usize());
        let len = read_u16(self.data, base + SLOT_TUPLE_LEN);
        (len != 0).then_some(base)
    }
}

/// Mutable view over a table page.
pub struct TablePage<'a> {
    data: &'a mut [u8],
}

impl<'a> TablePage<'a> {
    pub fn new(data: &'a mut [u8]) -> Self {
        assert_eq!(data.len(), PAGE_SIZE);
        Self { data }
    }

    /// Initializes a fresh table page.
    pub fn init(&mut self, page_id: PageId) {
        self.data.fill(0);
        write_u32(self.data, PAGE_ID_OFFSET, page_id.as_u32());
        write_u32(self.data, NEXT_PAGE_ID_OFFSET, INVALID_PAGE_ID.as_u32());
        write_u16(self.data, NUM_SLOTS_OFFSET, 0);
        write_u16(self.data, FREE_SPACE_START_OFFSET, HEADER_SIZE as u16);
        write_u16(self.data, FREE_SPACE_END_OFFSET, PAGE_SIZE as u16);
    }

    pub fn as_ref(&self) -> TablePageRef<'_> {
        TablePageRef::new(self.data)
    }

    pub fn set_next_page_id(&mut self, page_id: PageId) {
        write_u32(self.data, NEXT_PAGE_ID_OFFSET, page_id.as_u32());
    }

    /// Appends a tuple, returning its slot, or None when the page has no
    /// room left for the payload plus a slot entry.
    pub fn insert_tuple(&mut self, meta: TupleMeta, tuple: &[u8]) -> Option<SlotId> {
        let free_start = read_u16(self.data, FREE_SPACE_START_OFFSET) as usize;
        let free_end = read_u16(self.data, FREE_SPACE_END_OFFSET) as usize;
        if free_end - free_start < tuple.len() + SLOT_SIZE {
            return None;
        }

        let num_slots = read_u16(self.data, NUM_SLOTS_OFFSET);
        let offset = free_end - tuple.len();
        self.data[offset..free_end].copy_from_slice(tuple);

        let base = slot_base(num_slots as usize);
        write_u16(self.data, base + SLOT_TUPLE_OFFSET, offset as u16);
        write_u16(self.data, base + SLOT_TUPLE_LEN, tuple.len() as u16);
        self.write_meta(base, meta);

        write_u16(self.data, NUM_SLOTS_OFFSET, num_slots + 1);
        write_u16(self.data, FREE_SPACE_START_OFFSET, (base + SLOT_SIZE) as u16);
        write_u16(self.data, FREE_SPACE_END_OFFSET, offset as u16);

        Some(SlotId::new(num_slots))
    }

    /// Overwrites a slot's metadata.
    pub fn update_meta(&mut self, meta: TupleMeta, slot: SlotId) -> bool {
        match self.as_ref().valid_slot(slot) {
            Some(base) => {
                self.write_meta(base, meta);
                true
            }
            None => false,
        }
    }

    /// Rewrites a tuple in place. The new payload must have the same
    /// length as the stored one; layouts are immutable once inserted.
    pub fn update_tuple_in_place(&mut self, meta: TupleMeta, tuple: &[u8], slot: SlotId) -> bool {
        let Some(base) = self.as_ref().valid_slot(slot) else {
            return false;
        };
        let offset = read_u16(self.data, base + SLOT_TUPLE_OFFSET) as usize;
        let len = read_u16(self.data, base + SLOT_TUPLE_LEN) as usize;
        if len != tuple.len() {
            return false;
        }
        self.data[offset..offset + len].copy_from_slice(tuple);
        self.write_meta(base, meta);
        true
    }

    fn write_meta(&mut self, slot_base: usize, meta: TupleMeta) {
        write_u64(self.data, slot_base + SLOT_TS, meta.ts);
        self.data[slot_base + SLOT_DELETED] = u8::from(meta.is_deleted);
    }
}

fn read_u16(data: &[u8], offset: usize) -> u16 {
    u16::from_le_bytes(data[offset..offset + 2].try_into().unwrap())
}

fn write_u16(data: &mut [u8], offset: usize, value: u16) {
    data[offset..offset + 2].copy_from_slice(&value.to_le_bytes());
}

fn read_u32(data: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes(data[offset..offset + 4].try_into().unwrap())
}

fn write_u32(data: &mut [u8], offset: usize, value: u32) {
    data[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
}

fn read_u64(data: &[u8], offset: usize) -> u64 {
    u64::from_le_bytes(data[offset..offset + 8].try_into().unwrap())
}

fn write_u64(data: &mut [u8], offset: usize, value: Timestamp) {
    data[offset..offset + 8].copy_from_slice(&value.to_le_bytes());
}
