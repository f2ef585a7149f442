use std::sync::Arc;

use crate::common::{BrambleError, RecordId, Result};
use crate::execution::{DeletePlan, Executor, ExecutorContext};
use crate::tuple::{Schema, Tuple, TupleMeta};
use crate::txn::generate_new_undo_log;

use super::{count_tuple, is_write_conflict};

/// Logically deletes each child row under the transaction's temp
/// timestamp, recording a full pre-image for first touches. Secondary
/// index entries go away; the primary entry stays so the tombstone
/// remains addressable. Emits the affected-row count once.
pub struct DeleteExecutor {
    ctx: Arc<ExecutorContext>,
    plan: DeletePlan,
    child: Box<dyn Executor>,
    done: bool,
}

impl DeleteExecutor {
    pub fn new(ctx: Arc<ExecutorContext>, plan: DeletePlan, child: Box<dyn Executor>) -> Self {
        Self {
            ctx,
            plan,
            child,
            done: false,
        }
    }
}

impl Executor for DeleteExecutor {
    fn init(&mut self) -> Result<()> {
        self.done = false;
        self.child.init()
    }

    fn next(&mut self) -> Result<Option<(Tuple, RecordId)>> {
        if self.done {
            return Ok(None);
        }
        self.done = true;

        let table = self
            .ctx
            .catalog
            .get_table(self.plan.table_oid)
            .ok_or_else(|| BrambleError::Execution("delete from unknown table".into()))?;
        let indexes = self.ctx.catalog.table_indexes(&table.name);
        let txn = &self.ctx.txn;
        let txn_mgr = &self.ctx.txn_mgr;

        let mut count = 0i32;
        while let Some((base_tuple, rid)) = self.child.next()? {
            let base_meta = table.heap.get_tuple_meta(rid)?;
            if is_write_conflict(base_meta.ts, txn) {
                txn.set_tainted();
                log::debug!("txn{} tainted deleting {rid}", txn.human_id());
                return Err(BrambleError::WriteConflict(format!(
                    "tuple {rid} was modified past this snapshot"
                )));
            }

            let meta = TupleMeta::new(txn.temp_ts(), true);
            if !txn.in_write_set(self.plan.table_oid, rid) {
                txn.append_write_set(self.plan.table_oid, rid);
                let prev_link = txn_mgr.undo_link(rid);
                let undo = generate_new_undo_log(
                    &table.schema,
                    Some(&base_tuple),
                    None,
                    base_meta.ts,
                    prev_link,
                );
                let link = txn.append_undo_log(undo);
                txn_mgr.update_tuple_and_undo_link(
                    &table.heap,
                    rid,
                    Some(link),
                    meta,
                    &base_tuple,
                    Some(base_meta),
                )?;
            } else {
                // Deleting a tuple we already wrote: the existing log
                // keeps the pre-transaction image.
                table.heap.update_tuple_meta(meta, rid)?;
            }

            for info in indexes.iter().filter(|info| !info.is_primary_key) {
                let key = base_tuple.key_from_tuple(
                    &table.schema,
                    info.index.key_schema(),
                    info.index.key_attrs(),
                );
                info.index.delete_entry(&key, rid)?;
            }
            count += 1;
        }

        Ok(Some(count_tuple(count, &self.plan.output_schema)))
    }

    fn output_schema(&self) -> Arc<Schema> {
        Arc::clone(&self.plan.output_schema)
    }
}
