use std::sync::Arc;

use crate::catalog::{IndexInfo, TableInfo};
use crate::common::{BrambleError, RecordId, Result};
use crate::execution::{Executor, ExecutorContext, Expression, UpdatePlan};
use crate::tuple::{Schema, Tuple, TupleMeta, Value};
use crate::txn::{generate_new_undo_log, generate_updated_undo_log};

use super::{count_tuple, is_write_conflict};

/// MVCC update. Buffers every child row before writing anything, so the
/// scan feeding it never sees its own output. Updates that leave the
/// primary key alone rewrite tuples in place; key-changing updates run
/// as a delete phase followed by a reinsert phase that reuses
/// tombstoned slots where the new keys land on them.
pub struct UpdateExecutor {
    ctx: Arc<ExecutorContext>,
    plan: UpdatePlan,
    child: Box<dyn Executor>,
    done: bool,
}

impl UpdateExecutor {
    pub fn new(ctx: Arc<ExecutorContext>, plan: UpdatePlan, child: Box<dyn Executor>) -> Self {
        Self {
            ctx,
            plan,
            child,
            done: false,
        }
    }

    fn new_tuple_for(&self, base: &Tuple, schema: &Schema) -> Tuple {
        let values: Vec<Value> = self
            .plan
            .target_expressions
            .iter()
            .map(|expr| expr.evaluate(base, schema))
            .collect();
        Tuple::new(&values, schema)
    }

    fn check_conflict(&self, rid: RecordId, base_meta: TupleMeta) -> Result<()> {
        if is_write_conflict(base_meta.ts, &self.ctx.txn) {
            self.ctx.txn.set_tainted();
            log::debug!("txn{} tainted updating {rid}", self.ctx.txn.human_id());
            return Err(BrambleError::WriteConflict(format!(
                "tuple {rid} was modified past this snapshot"
            )));
        }
        Ok(())
    }

    /// Rewrites one tuple in place, creating or merging its undo log.
    fn write_version(
        &self,
        table: &Arc<TableInfo>,
        rid: RecordId,
        base_tuple: &Tuple,
        base_meta: TupleMeta,
        new_tuple: Option<&Tuple>,
    ) -> Result<()> {
        let txn = &self.ctx.txn;
        let txn_mgr = &self.ctx.txn_mgr;
        let is_delete = new_tuple.is_none();
        let meta = TupleMeta::new(txn.temp_ts(), is_delete);

        if !txn.in_write_set(self.plan.table_oid, rid) {
            txn.append_write_set(self.plan.table_oid, rid);
            let prev_link = txn_mgr.undo_link(rid);
            let undo = generate_new_undo_log(
                &table.schema,
                Some(base_tuple),
                new_tuple,
                base_meta.ts,
                prev_link,
            );
            let link = txn.append_undo_log(undo);
            txn_mgr.update_tuple_and_undo_link(
                &table.heap,
                rid,
                Some(link),
                meta,
                new_tuple.unwrap_or(base_tuple),
                Some(base_meta),
            )?;
        } else {
            let prev_link = txn_mgr.undo_link(rid);
            if let Some(link) = prev_link.filter(|l| l.prev_txn == txn.txn_id()) {
                if let Some(old_log) = txn.undo_log(link.prev_log_idx) {
                    let merged = generate_updated_undo_log(
                        &table.schema,
                        Some(base_tuple),
                        new_tuple,
                        &old_log,
                    );
                    txn.modify_undo_log(link.prev_log_idx, merged);
                }
            }
            match new_tuple {
                Some(tuple) => table.heap.update_tuple_in_place(meta, tuple, rid, None)?,
                None => table.heap.update_tuple_meta(meta, rid)?,
            }
        }
        Ok(())
    }

    fn maintain_secondary_indexes(
        &self,
        table: &Arc<TableInfo>,
        indexes: &[Arc<IndexInfo>],
        old_tuple: &Tuple,
        old_rid: RecordId,
        new_tuple: &Tuple,
        new_rid: RecordId,
    ) -> Result<()> {
        for info in indexes.iter().filter(|info| !info.is_primary_key) {
            let old_key = old_tuple.key_from_tuple(
                &table.schema,
                info.index.key_schema(),
                info.index.key_attrs(),
            );
            let new_key = new_tuple.key_from_tuple(
                &table.schema,
                info.index.key_schema(),
                info.index.key_attrs(),
            );
            let key_changed = old_key.value(info.index.key_schema(), 0)
                != new_key.value(info.index.key_schema(), 0);
            if key_changed || old_rid != new_rid {
                info.index.delete_entry(&old_key, old_rid)?;
                info.index.insert_entry(&new_key, new_rid)?;
            }
        }
        Ok(())
    }

    fn update_in_place(
        &self,
        table: &Arc<TableInfo>,
        indexes: &[Arc<IndexInfo>],
        buffered: &[(Tuple, RecordId)],
    ) -> Result<i32> {
        let mut count = 0i32;
        for (base_tuple, rid) in buffered {
            let base_meta = table.heap.get_tuple_meta(*rid)?;
            self.check_conflict(*rid, base_meta)?;

            let mut new_tuple = self.new_tuple_for(base_tuple, &table.schema);
            new_tuple.set_rid(*rid);

            self.write_version(table, *rid, base_tuple, base_meta, Some(&new_tuple))?;
            self.maintain_secondary_indexes(table, indexes, base_tuple, *rid, &new_tuple, *rid)?;
            count += 1;
        }
        Ok(count)
    }

    fn update_with_key_change(
        &self,
        table: &Arc<TableInfo>,
        indexes: &[Arc<IndexInfo>],
        pkey: &Arc<IndexInfo>,
        buffered: &[(Tuple, RecordId)],
    ) -> Result<i32> {
        let txn = &self.ctx.txn;

        // Phase 1: logically delete every affected row, full pre-image.
        for (base_tuple, rid) in buffered {
            let base_meta = table.heap.get_tuple_meta(*rid)?;
            self.check_conflict(*rid, base_meta)?;
            self.write_version(table, *rid, base_tuple, base_meta, None)?;
        }

        // Phase 2: bring the rewritten rows back in.
        let mut count = 0i32;
        for (base_tuple, old_rid) in buffered {
            let new_tuple = self.new_tuple_for(base_tuple, &table.schema);

            let new_key = new_tuple.key_from_tuple(
                &table.schema,
                pkey.index.key_schema(),
                pkey.index.key_attrs(),
            );
            let mut result = Vec::new();
            pkey.index.scan_key(&new_key, &mut result)?;

            let new_rid = if let Some(&existing) = result.first() {
                let existing_meta = table.heap.get_tuple_meta(existing)?;
                if !existing_meta.is_deleted {
                    txn.set_tainted();
                    return Err(BrambleError::WriteConflict(
                        "update collides with a live primary key".into(),
                    ));
                }
                self.check_conflict(existing, existing_meta)?;

                let mut reinserted = new_tuple.clone();
                reinserted.set_rid(existing);
                if !txn.in_write_set(self.plan.table_oid, existing) {
                    txn.append_write_set(self.plan.table_oid, existing);
                    let prev_link = self.ctx.txn_mgr.undo_link(existing);
                    let undo = generate_new_undo_log(
                        &table.schema,
                        None,
                        Some(&reinserted),
                        existing_meta.ts,
                        prev_link,
                    );
                    let link = txn.append_undo_log(undo);
                    self.ctx.txn_mgr.update_tuple_and_undo_link(
                        &table.heap,
                        existing,
                        Some(link),
                        TupleMeta::new(txn.temp_ts(), false),
                        &reinserted,
                        Some(existing_meta),
                    )?;
                } else {
                    table.heap.update_tuple_in_place(
                        TupleMeta::new(txn.temp_ts(), false),
                        &reinserted,
                        existing,
                        None,
                    )?;
                }
                existing
            } else {
                let rid = table
                    .heap
                    .insert_tuple(TupleMeta::new(txn.temp_ts(), false), &new_tuple)?;
                txn.append_write_set(self.plan.table_oid, rid);
                let inserted = pkey.index.insert_entry(&new_key, rid)?;
                if !inserted {
                    txn.set_tainted();
                    return Err(BrambleError::WriteConflict(
                        "update collides with a live primary key".into(),
                    ));
                }
                rid
            };

            self.maintain_secondary_indexes(
                table, indexes, base_tuple, *old_rid, &new_tuple, new_rid,
            )?;
            count += 1;
        }
        Ok(count)
    }
}

impl Executor for UpdateExecutor {
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
            .ok_or_else(|| BrambleError::Execution("update of unknown table".into()))?;
        let indexes = self.ctx.catalog.table_indexes(&table.name);
        let pkey = indexes.iter().find(|info| info.is_primary_key).cloned();

        // Materialize the child before touching the heap.
        let mut buffered = Vec::new();
        while let Some(item) = self.child.next()? {
            buffered.push(item);
        }

        // The key is "touched" unless its target expression is the
        // identity column reference.
        let pk_touched = pkey.as_ref().is_some_and(|pkey| {
            pkey.index.key_attrs().iter().any(|&attr| {
                !matches!(
                    &self.plan.target_expressions[attr],
                    Expression::Column { col_idx, .. } if *col_idx == attr
                )
            })
        });

        let count = match (&pkey, pk_touched) {
            (Some(pkey), true) => {
                self.update_with_key_change(&table, &indexes, pkey, &buffered)?
            }
            _ => self.update_in_place(&table, &indexes, &buffered)?,
        };

        Ok(Some(count_tuple(count, &self.plan.output_schema)))
    }

    fn output_schema(&self) -> Arc<Schema> {
        Arc::clone(&self.plan.output_schema)
    }
}
