mod data_type;
mod schema;
#[allow(clippy::module_inception)]
mod tuple;
mod value;

pub use data_type::DataType;
pub use schema::{Column, Schema, SchemaBuilder};
pub use tuple::Tuple;
pub use value::{Value, FIXED_VALUE_SIZE};

use crate::common::{Timestamp, TXN_START_ID};

/// Per-tuple metadata stored in the slot array of a table page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TupleMeta {
    /// Commit timestamp, or the writing transaction's temporary
    /// timestamp while that transaction is still running.
    pub ts: Timestamp,
    pub is_deleted: bool,
}

impl TupleMeta {
    pub fn new(ts: Timestamp, is_deleted: bool) -> Self {
        Self { ts, is_deleted }
    }

    /// True when the timestamp is a running transaction's marker.
    pub fn is_temp(&self) -> bool {
        self.ts >= TXN_START_ID
    }

    /// The human-readable form: temp timestamps print as their
    /// transaction number.
    pub fn readable_ts(&self) -> Timestamp {
        if self.is_temp() {
            self.ts ^ TXN_START_ID
        } else {
            self.ts
        }
    }
}
