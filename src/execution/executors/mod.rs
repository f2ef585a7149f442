mod aggregation;
mod delete;
mod external_merge_sort;
mod hash_join;
mod index_scan;
mod insert;
mod limit;
mod nested_index_join;
mod nested_loop_join;
mod seq_scan;
mod update;
mod values;

pub use aggregation::AggregationExecutor;
pub use delete::DeleteExecutor;
pub use external_merge_sort::{ExternalMergeSortExecutor, TupleComparator};
pub use hash_join::HashJoinExecutor;
pub use index_scan::IndexScanExecutor;
pub use insert::InsertExecutor;
pub use limit::LimitExecutor;
pub use nested_index_join::NestedIndexJoinExecutor;
pub use nested_loop_join::NestedLoopJoinExecutor;
pub use seq_scan::SeqScanExecutor;
pub use update::UpdateExecutor;
pub use values::ValuesExecutor;

use crate::common::{RecordId, SlotId, Timestamp, INVALID_PAGE_ID};
use crate::tuple::{Schema, Tuple, Value};
use crate::txn::Transaction;

/// True when a tuple stamped `base_ts` cannot be written by `txn`:
/// someone else committed it past our snapshot, or another running
/// transaction holds it with a temp timestamp.
pub(crate) fn is_write_conflict(base_ts: Timestamp, txn: &Transaction) -> bool {
    base_ts != txn.temp_ts() && base_ts > txn.read_ts()
}

/// The one-row `(count)` output emitted by Insert/Update/Delete.
pub(crate) fn count_tuple(count: i32, schema: &Schema) -> (Tuple, RecordId) {
    let tuple = Tuple::new(&[Value::Integer(count)], schema);
    (tuple, RecordId::new(INVALID_PAGE_ID, SlotId::new(0)))
}

/// Placeholder rid for synthesized tuples (joins, aggregates).
pub(crate) fn no_rid() -> RecordId {
    RecordId::new(INVALID_PAGE_ID, SlotId::new(0))
}
