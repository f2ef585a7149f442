use std::sync::Arc;

use crate::common::{BrambleError, RecordId, Result};
use crate::execution::{Executor, ExecutorContext, IndexScanPlan};
use crate::index::BTreeIterator;
use crate::tuple::{Schema, Tuple};

/// Probes the index once per predicate key, or, with no keys, streams
/// the whole index in key order. Every RID resolves through MVCC.
pub struct IndexScanExecutor {
    ctx: Arc<ExecutorContext>,
    plan: IndexScanPlan,
    key_at: usize,
    iter: Option<BTreeIterator>,
    probe_schema: Schema,
}

impl IndexScanExecutor {
    pub fn new(ctx: Arc<ExecutorContext>, plan: IndexScanPlan) -> Self {
        Self {
            ctx,
            plan,
            key_at: 0,
            iter: None,
            probe_schema: Schema::new(vec![]),
        }
    }

    fn resolve(&self, rid: RecordId) -> Result<Option<Tuple>> {
        let table = self
            .ctx
            .catalog
            .get_table(self.plan.table_oid)
            .ok_or_else(|| BrambleError::Execution("index scan over unknown table".into()))?;
        let (meta, base_tuple) = table.heap.get_tuple(rid)?;
        Ok(self.ctx.txn_mgr.readable_tuple(
            &self.plan.output_schema,
            &base_tuple,
            meta,
            &self.ctx.txn,
        ))
    }
}

impl Executor for IndexScanExecutor {
    fn init(&mut self) -> Result<()> {
        self.key_at = 0;
        self.iter = None;
        if self.plan.pred_keys.is_empty() {
            let index = self
                .ctx
                .catalog
                .get_index(self.plan.index_oid)
                .ok_or_else(|| BrambleError::IndexNotFound(self.plan.index_oid.to_string()))?;
            self.iter = Some(index.index.iter()?);
        }
        Ok(())
    }

    fn next(&mut self) -> Result<Option<(Tuple, RecordId)>> {
        if self.plan.pred_keys.is_empty() {
            // Ordered full scan over the leaf chain.
            loop {
                let Some((_, rid)) = self.iter.as_mut().and_then(|it| it.next()) else {
                    return Ok(None);
                };
                if let Some(tuple) = self.resolve(rid)? {
                    return Ok(Some((tuple, rid)));
                }
            }
        }

        let index = self
            .ctx
            .catalog
            .get_index(self.plan.index_oid)
            .ok_or_else(|| BrambleError::IndexNotFound(self.plan.index_oid.to_string()))?;

        while self.key_at < self.plan.pred_keys.len() {
            let expr = &self.plan.pred_keys[self.key_at];
            self.key_at += 1;

            let probe = Tuple::new(&[], &self.probe_schema);
            let key_value = expr.evaluate(&probe, &self.probe_schema);
            let key = Tuple::new(&[key_value], index.index.key_schema());

            let mut result = Vec::new();
            index.index.scan_key(&key, &mut result)?;

            if let Some(&rid) = result.first() {
                if let Some(tuple) = self.resolve(rid)? {
                    return Ok(Some((tuple, rid)));
                }
            }
        }
        Ok(None)
    }

    fn output_schema(&self) -> Arc<Schema> {
        Arc::clone(&self.plan.output_schema)
    }
}
