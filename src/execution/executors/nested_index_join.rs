use std::sync::Arc;

use crate::common::{BrambleError, RecordId, Result};
use crate::execution::{Executor, ExecutorContext, JoinType, NestedIndexJoinPlan};
use crate::tuple::{Schema, Tuple, Value};

use super::no_rid;

/// For each outer row, evaluates the key predicate and probes the inner
/// table's index. Matches resolve through MVCC; left joins NULL-pad the
/// inner side when the probe misses.
pub struct NestedIndexJoinExecutor {
    ctx: Arc<ExecutorContext>,
    plan: NestedIndexJoinPlan,
    child: Box<dyn Executor>,
}

impl NestedIndexJoinExecutor {
    pub fn new(
        ctx: Arc<ExecutorContext>,
        plan: NestedIndexJoinPlan,
        child: Box<dyn Executor>,
    ) -> Self {
        Self { ctx, plan, child }
    }

    fn joined(&self, left: &Tuple, right: Option<&Tuple>) -> Tuple {
        let left_schema = self.child.output_schema();

        let mut values = left.values(&left_schema);
        match right {
            Some(right) => values.extend(right.values(&self.plan.inner_schema)),
            None => values.extend(vec![Value::Null; self.plan.inner_schema.column_count()]),
        }
        Tuple::new(&values, &self.plan.output_schema)
    }
}

impl Executor for NestedIndexJoinExecutor {
    fn init(&mut self) -> Result<()> {
        self.child.init()
    }

    fn next(&mut self) -> Result<Option<(Tuple, RecordId)>> {
        let index = self
            .ctx
            .catalog
            .get_index(self.plan.index_oid)
            .ok_or_else(|| BrambleError::IndexNotFound(self.plan.index_oid.to_string()))?;
        let table = self
            .ctx
            .catalog
            .get_table(self.plan.inner_table_oid)
            .ok_or_else(|| BrambleError::Execution("index join over unknown table".into()))?;
        let left_schema = self.child.output_schema();

        while let Some((left_tuple, _)) = self.child.next()? {
            let key_value = self.plan.key_predicate.evaluate(&left_tuple, &left_schema);
            let key = Tuple::new(&[key_value], index.index.key_schema());

            let mut result = Vec::new();
            index.index.scan_key(&key, &mut result)?;

            let inner = match result.first() {
                Some(&rid) => {
                    let (meta, base_tuple) = table.heap.get_tuple(rid)?;
                    self.ctx.txn_mgr.readable_tuple(
                        &self.plan.inner_schema,
                        &base_tuple,
                        meta,
                        &self.ctx.txn,
                    )
                }
                None => None,
            };

            match inner {
                Some(inner_tuple) => {
                    return Ok(Some((self.joined(&left_tuple, Some(&inner_tuple)), no_rid())));
                }
                None => {
                    if self.plan.join_type == JoinType::Left {
                        return Ok(Some((self.joined(&left_tuple, None), no_rid())));
                    }
                }
            }
        }
        Ok(None)
    }

    fn output_schema(&self) -> Arc<Schema> {
        Arc::clone(&self.plan.output_schema)
    }
}
