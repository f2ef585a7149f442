use std::sync::Arc;

use crate::catalog::{IndexInfo, TableInfo};
use crate::common::{BrambleError, RecordId, Result};
use crate::execution::{Executor, ExecutorContext, InsertPlan};
use crate::tuple::{Schema, Tuple, TupleMeta};
use crate::txn::{generate_new_undo_log, generate_updated_undo_log};

use super::{count_tuple, is_write_conflict};

/// Appends the child's rows to the table, maintaining every index.
/// A primary-key hit on a live tuple is a write conflict; a hit on a
/// tombstone turns into an in-place resurrection of the old slot.
/// Emits the affected-row count exactly once.
pub struct InsertExecutor {
    ctx: Arc<ExecutorContext>,
    plan: InsertPlan,
    child: Box<dyn Executor>,
    done: bool,
}

impl InsertExecutor {
    pub fn new(ctx: Arc<ExecutorContext>, plan: InsertPlan, child: Box<dyn Executor>) -> Self {
        Self {
            ctx,
            plan,
            child,
            done: false,
        }
    }

    /// Reuses a tombstoned slot for a re-inserted primary key.
    fn insert_into_tombstone(
        &self,
        table: &Arc<TableInfo>,
        rid: RecordId,
        tuple: &Tuple,
    ) -> Result<()> {
        let txn = &self.ctx.txn;
        let txn_mgr = &self.ctx.txn_mgr;

        let base_meta = table.heap.get_tuple_meta(rid)?;
        if is_write_conflict(base_meta.ts, txn) {
            txn.set_tainted();
            return Err(BrambleError::WriteConflict(format!(
                "tombstone at {rid} is owned by another transaction"
            )));
        }

        let prev_link = txn_mgr.undo_link(rid);
        let meta = TupleMeta::new(txn.temp_ts(), false);

        if !txn.in_write_set(self.plan.table_oid, rid) {
            txn.append_write_set(self.plan.table_oid, rid);
            let undo = generate_new_undo_log(&table.schema, None, Some(tuple), base_meta.ts, prev_link);
            let link = txn.append_undo_log(undo);
            txn_mgr.update_tuple_and_undo_link(
                &table.heap,
                rid,
                Some(link),
                meta,
                tuple,
                Some(base_meta),
            )?;
        } else {
            // Our own tombstone; the existing log already points at the
            // pre-transaction version.
            if let Some(link) = prev_link.filter(|l| l.prev_txn == txn.txn_id()) {
                if let Some(old_log) = txn.undo_log(link.prev_log_idx) {
                    let merged =
                        generate_updated_undo_log(&table.schema, None, Some(tuple), &old_log);
                    txn.modify_undo_log(link.prev_log_idx, merged);
                }
            }
            table.heap.update_tuple_in_place(meta, tuple, rid, None)?;
        }
        Ok(())
    }

    fn insert_fresh(
        &self,
        table: &Arc<TableInfo>,
        indexes: &[Arc<IndexInfo>],
        tuple: &Tuple,
    ) -> Result<()> {
        let txn = &self.ctx.txn;

        let rid = table
            .heap
            .insert_tuple(TupleMeta::new(txn.temp_ts(), false), tuple)?;
        txn.append_write_set(self.plan.table_oid, rid);

        for info in indexes {
            let key = tuple.key_from_tuple(
                &table.schema,
                info.index.key_schema(),
                info.index.key_attrs(),
            );
            let inserted = info.index.insert_entry(&key, rid)?;
            if !inserted && info.is_primary_key {
                txn.set_tainted();
                return Err(BrambleError::WriteConflict(
                    "repeated insertion of the same primary key".into(),
                ));
            }
        }
        Ok(())
    }
}

impl Executor for InsertExecutor {
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
            .ok_or_else(|| BrambleError::Execution("insert into unknown table".into()))?;
        let indexes = self.ctx.catalog.table_indexes(&table.name);
        let pkey = indexes.iter().find(|info| info.is_primary_key).cloned();

        let mut count = 0i32;
        while let Some((tuple, _)) = self.child.next()? {
            if let Some(pkey) = &pkey {
                let key = tuple.key_from_tuple(
                    &table.schema,
                    pkey.index.key_schema(),
                    pkey.index.key_attrs(),
                );
                let mut result = Vec::new();
                pkey.index.scan_key(&key, &mut result)?;

                if let Some(&existing) = result.first() {
                    let base_meta = table.heap.get_tuple_meta(existing)?;
                    if !base_meta.is_deleted {
                        self.ctx.txn.set_tainted();
                        return Err(BrambleError::WriteConflict(
                            "repeated insertion of the same primary key".into(),
                        ));
                    }
                    self.insert_into_tombstone(&table, existing, &tuple)?;
                    // The delete that produced the tombstone dropped its
                    // secondary entries; put them back for the new image.
                    for info in indexes.iter().filter(|info| !info.is_primary_key) {
                        let key = tuple.key_from_tuple(
                            &table.schema,
                            info.index.key_schema(),
                            info.index.key_attrs(),
                        );
                        info.index.insert_entry(&key, existing)?;
                    }
                    count += 1;
                    continue;
                }
            }

            self.insert_fresh(&table, &indexes, &tuple)?;
            count += 1;
        }

        Ok(Some(count_tuple(count, &self.plan.output_schema)))
    }

    fn output_schema(&self) -> Arc<Schema> {
        Arc::clone(&self.plan.output_schema)
    }
}
