use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use crate::common::{RecordId, Result};
use crate::execution::{Executor, HashJoinPlan, JoinType};
use crate::tuple::{Schema, Tuple, Value};

use super::no_rid;

/// Hash join: builds a table over the right child keyed on its join
/// expressions, then streams the left child through it.
pub struct HashJoinExecutor {
    plan: HashJoinPlan,
    left: Box<dyn Executor>,
    right: Box<dyn Executor>,
    table: HashMap<Vec<Value>, Vec<Tuple>>,
    built: bool,
    pending: VecDeque<Tuple>,
}

impl HashJoinExecutor {
    pub fn new(plan: HashJoinPlan, left: Box<dyn Executor>, right: Box<dyn Executor>) -> Self {
        Self {
            plan,
            left,
            right,
            table: HashMap::new(),
            built: false,
            pending: VecDeque::new(),
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

impl Executor for HashJoinExecutor {
    fn init(&mut self) -> Result<()> {
        self.left.init()?;
        self.right.init()?;
        self.table.clear();
        self.built = false;
        self.pending.clear();
        Ok(())
    }

    fn next(&mut self) -> Result<Option<(Tuple, RecordId)>> {
        if !self.built {
            let right_schema = self.right.output_schema();
            while let Some((tuple, _)) = self.right.next()? {
                let key: Vec<Value> = self
                    .plan
                    .right_key_exprs
                    .iter()
                    .map(|expr| expr.evaluate(&tuple, &right_schema))
                    .collect();
                self.table.entry(key).or_default().push(tuple);
            }
            self.built = true;
        }

        if let Some(tuple) = self.pending.pop_front() {
            return Ok(Some((tuple, no_rid())));
        }

        let left_schema = self.left.output_schema();
        while let Some((left_tuple, _)) = self.left.next()? {
            let key: Vec<Value> = self
                .plan
                .left_key_exprs
                .iter()
                .map(|expr| expr.evaluate(&left_tuple, &left_schema))
                .collect();

            match self.table.get(&key) {
                Some(matches) => {
                    let rows: Vec<Tuple> = matches
                        .iter()
                        .map(|right_tuple| self.joined(&left_tuple, Some(right_tuple)))
                        .collect();
                    self.pending.extend(rows);
                }
                None => {
                    if self.plan.join_type == JoinType::Left {
                        return Ok(Some((self.joined(&left_tuple, None), no_rid())));
                    }
                    continue;
                }
            }

            if let Some(tuple) = self.pending.pop_front() {
                return Ok(Some((tuple, no_rid())));
            }
        }
        Ok(None)
    }

    fn output_schema(&self) -> Arc<Schema> {
        Arc::clone(&self.plan.output_schema)
    }
}
