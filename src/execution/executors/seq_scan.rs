use std::sync::Arc;

use crate::common::{BrambleError, RecordId, Result};
use crate::execution::{Executor, ExecutorContext, SeqScanPlan};
use crate::storage::table::TableIterator;
use crate::tuple::{Schema, Tuple};

/// Walks the table heap and resolves each slot through the version store
/// to the snapshot of the running transaction.
pub struct SeqScanExecutor {
    ctx: Arc<ExecutorContext>,
    plan: SeqScanPlan,
    iter: Option<TableIterator>,
}

impl SeqScanExecutor {
    pub fn new(ctx: Arc<ExecutorContext>, plan: SeqScanPlan) -> Self {
        Self {
            ctx,
            plan,
            iter: None,
        }
    }
}

impl Executor for SeqScanExecutor {
    fn init(&mut self) -> Result<()> {
        let table = self
            .ctx
            .catalog
            .get_table(self.plan.table_oid)
            .ok_or_else(|| BrambleError::TableNotFound(self.plan.table_name.clone()))?;
        self.iter = Some(table.heap.iter());
        Ok(())
    }

    fn next(&mut self) -> Result<Option<(Tuple, RecordId)>> {
        let iter = self
            .iter
            .as_mut()
            .ok_or_else(|| BrambleError::Execution("seq scan used before init".into()))?;

        for (rid, meta, base_tuple) in iter.by_ref() {
            let Some(tuple) = self.ctx.txn_mgr.readable_tuple(
                &self.plan.output_schema,
                &base_tuple,
                meta,
                &self.ctx.txn,
            ) else {
                continue;
            };

            if let Some(filter) = &self.plan.filter {
                if !filter.matches(&tuple, &self.plan.output_schema) {
                    continue;
                }
            }
            return Ok(Some((tuple, rid)));
        }
        Ok(None)
    }

    fn output_schema(&self) -> Arc<Schema> {
        Arc::clone(&self.plan.output_schema)
    }
}
