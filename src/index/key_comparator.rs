use std::cmp::Ordering;

/// Orders raw index keys. The tree stores keys as opaque fixed-width
/// byte strings; the comparator knows what they mean.
pub trait KeyComparator: Send + Sync {
    fn compare(&self, a: &[u8], b: &[u8]) -> Ordering;
}

/// Signed 64-bit little-endian keys; what integer key schemas encode to.
pub struct Int64Comparator;

impl KeyComparator for Int64Comparator {
    fn compare(&self, a: &[u8], b: &[u8]) -> Ordering {
        let a_val = i64::from_le_bytes(a[..8].try_into().unwrap());
        let b_val = i64::from_le_bytes(b[..8].try_into().unwrap());
        a_val.cmp(&b_val)
    }
}

/// Plain lexicographic ordering over the raw bytes.
pub struct BytewiseComparator;

impl KeyComparator for BytewiseComparator {
    fn compare(&self, a: &[u8], b: &[u8]) -> Ordering {
        a.cmp(b)
    }
}
