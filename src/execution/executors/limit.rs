use std::sync::Arc;

use crate::common::{RecordId, Result};
use crate::execution::{Executor, LimitPlan};
use crate::tuple::{Schema, Tuple};

/// Passes through at most `limit` rows from its child.
pub struct LimitExecutor {
    plan: LimitPlan,
    child: Box<dyn Executor>,
    emitted: usize,
}

impl LimitExecutor {
    pub fn new(plan: LimitPlan, child: Box<dyn Executor>) -> Self {
        Self {
            plan,
            child,
            emitted: 0,
        }
    }
}

impl Executor for LimitExecutor {
    fn init(&mut self) -> Result<()> {
        self.emitted = 0;
        self.child.init()
    }

    fn next(&mut self) -> Result<Option<(Tuple, RecordId)>> {
        if self.emitted >= self.plan.limit {
            return Ok(None);
        }
        match self.child.next()? {
            Some(item) => {
                self.emitted += 1;
                Ok(Some(item))
            }
            None => Ok(None),
        }
    }

    fn output_schema(&self) -> Arc<Schema> {
        Arc::clone(&self.plan.output_schema)
    }
}
