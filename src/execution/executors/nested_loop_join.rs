use std::sync::Arc;

use crate::common::{RecordId, Result};
use crate::execution::{Executor, JoinType, NestedLoopJoinPlan};
use crate::tuple::{Schema, Tuple, Value};

use super::no_rid;

/// Classic nested-loop join. The right side is materialized once; each
/// left row is checked against every right row. Left joins pad the right
/// columns with NULL when nothing matched.
pub struct NestedLoopJoinExecutor {
    plan: NestedLoopJoinPlan,
    left: Box<dyn Executor>,
    right: Box<dyn Executor>,
    right_rows: Vec<Tuple>,
    right_loaded: bool,
    current_left: Option<Tuple>,
    right_pos: usize,
    matched: bool,
}

impl NestedLoopJoinExecutor {
    pub fn new(
        plan: NestedLoopJoinPlan,
        left: Box<dyn Executor>,
        right: Box<dyn Executor>,
    ) -> Self {
        Self {
            plan,
            left,
            right,
            right_rows: Vec::new(),
            right_loaded: false,
            current_left: None,
            right_pos: 0,
            matched: false,
        }
    }

    fn joined(&self, left: &Tuple, right: Option<&Tuple>) -> Tuple {
        let left_schema = self.left.output_schema();
        let right_schema = self.right.output_schema();

        let mut values = left.values(&left_schema);
        match right {
            Some(right) => values.extend(right.values(&right_schema)),
            None => values.extend(vec![Value::Null; right_schema.column_count()]),
        }
        Tuple::new(&values, &self.plan.output_schema)
    }
}

impl Executor for NestedLoopJoinExecutor {
    fn init(&mut self) -> Result<()> {
        self.left.init()?;
        self.right.init()?;
        self.right_rows.clear();
        self.right_loaded = false;
        self.current_left = None;
        self.right_pos = 0;
        self.matched = false;
        Ok(())
    }

    fn next(&mut self) -> Result<Option<(Tuple, RecordId)>> {
        if !self.right_loaded {
            while let Some((tuple, _)) = self.right.next()? {
                self.right_rows.push(tuple);
            }
            self.right_loaded = true;
        }

        let left_schema = self.left.output_schema();
        let right_schema = self.right.output_schema();

        loop {
            if self.current_left.is_none() {
                let Some((tuple, _)) = self.left.next()? else {
                    return Ok(None);
                };
                self.current_left = Some(tuple);
                self.right_pos = 0;
                self.matched = false;
            }
            let left = self.current_left.clone().unwrap();

            while self.right_pos < self.right_rows.len() {
                let right = &self.right_rows[self.right_pos];
                self.right_pos += 1;

                let accept = match &self.plan.predicate {
                    None => true,
                    Some(pred) => {
                        pred.evaluate_join(&left, &left_schema, Some(right), &right_schema)
                            .as_bool()
                            == Some(true)
                    }
                };
                if accept {
                    self.matched = true;
                    return Ok(Some((self.joined(&left, Some(right)), no_rid())));
                }
            }

            let had_match = self.matched;
            self.current_left = None;
            if self.plan.join_type == JoinType::Left && !had_match {
                return Ok(Some((self.joined(&left, None), no_rid())));
            }
        }
    }

    fn output_schema(&self) -> Arc<Schema> {
        Arc::clone(&self.plan.output_schema)
    }
}
