use std::sync::Arc;

use crate::common::{RecordId, Result};
use crate::execution::{Executor, ValuesPlan};
use crate::tuple::{Schema, Tuple, Value};

use super::no_rid;

/// Emits literal rows; the canonical child of Insert.
pub struct ValuesExecutor {
    plan: ValuesPlan,
    cursor: usize,
    empty_schema: Schema,
}

impl ValuesExecutor {
    pub fn new(plan: ValuesPlan) -> Self {
        Self {
            plan,
            cursor: 0,
            empty_schema: Schema::new(vec![]),
        }
    }
}

impl Executor for ValuesExecutor {
    fn init(&mut self) -> Result<()> {
        self.cursor = 0;
        Ok(())
    }

    fn next(&mut self) -> Result<Option<(Tuple, RecordId)>> {
        let Some(row) = self.plan.rows.get(self.cursor) else {
            return Ok(None);
        };
        self.cursor += 1;

        let probe = Tuple::new(&[], &self.empty_schema);
        let values: Vec<Value> = row
            .iter()
            .map(|expr| expr.evaluate(&probe, &self.empty_schema))
            .collect();
        Ok(Some((
            Tuple::new(&values, &self.plan.output_schema),
            no_rid(),
        )))
    }

    fn output_schema(&self) -> Arc<Schema> {
        Arc::clone(&self.plan.output_schema)
    }
}
