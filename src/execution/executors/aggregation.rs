use std::collections::HashMap;
use std::collections::VecDeque;
use std::sync::Arc;

use crate::common::{RecordId, Result};
use crate::execution::{AggregationPlan, AggregationType, Executor};
use crate::tuple::{Schema, Tuple, Value};

use super::no_rid;

/// Hash aggregation over the group-by keys. Materializes the child on
/// the first `next` call, then drains the hash table. Empty input with
/// no group-by emits the zero-or-null row.
pub struct AggregationExecutor {
    plan: AggregationPlan,
    child: Box<dyn Executor>,
    built: bool,
    results: VecDeque<Tuple>,
}

impl AggregationExecutor {
    pub fn new(plan: AggregationPlan, child: Box<dyn Executor>) -> Self {
        Self {
            plan,
            child,
            built: false,
            results: VecDeque::new(),
        }
    }

    fn initial_aggregates(&self) -> Vec<Value> {
        self.plan
            .agg_types
            .iter()
            .map(|agg| match agg {
                AggregationType::CountStar => Value::Integer(0),
                _ => Value::Null,
            })
            .collect()
    }

    fn combine(&self, entry: &mut [Value], inputs: &[Value]) {
        for (i, agg) in self.plan.agg_types.iter().enumerate() {
            let input = &inputs[i];
            match agg {
                AggregationType::CountStar => {
                    let current = entry[i].as_i64().unwrap_or(0);
                    entry[i] = Value::Integer(current as i32 + 1);
                }
                AggregationType::Count => {
                    if !input.is_null() {
                        let current = match &entry[i] {
                            Value::Null => 0,
                            other => other.as_i64().unwrap_or(0),
                        };
                        entry[i] = Value::Integer(current as i32 + 1);
                    }
                }
                AggregationType::Sum => {
                    if !input.is_null() {
                        entry[i] = match (&entry[i], input.as_i64()) {
                            (Value::Null, _) => input.clone(),
                            (acc, Some(v)) => {
                                let sum = acc.as_i64().unwrap_or(0) + v;
                                match input {
                                    Value::Integer(_) => Value::Integer(sum as i32),
                                    _ => Value::BigInt(sum),
                                }
                            }
                            (acc, None) => acc.clone(),
                        };
                    }
                }
                AggregationType::Min => {
                    if !input.is_null()
                        && (entry[i].is_null()
                            || input.compare(&entry[i]) == Some(std::cmp::Ordering::Less))
                    {
                        entry[i] = input.clone();
                    }
                }
                AggregationType::Max => {
                    if !input.is_null()
                        && (entry[i].is_null()
                            || input.compare(&entry[i]) == Some(std::cmp::Ordering::Greater))
                    {
                        entry[i] = input.clone();
                    }
                }
            }
        }
    }

    fn build(&mut self) -> Result<()> {
        let child_schema = self.child.output_schema();
        let mut table: HashMap<Vec<Value>, Vec<Value>> = HashMap::new();

        while let Some((tuple, _)) = self.child.next()? {
            let key: Vec<Value> = self
                .plan
                .group_bys
                .iter()
                .map(|expr| expr.evaluate(&tuple, &child_schema))
                .collect();
            let inputs: Vec<Value> = self
                .plan
                .aggregates
                .iter()
                .map(|expr| expr.evaluate(&tuple, &child_schema))
                .collect();

            let init = self.initial_aggregates();
            let entry = table.entry(key).or_insert(init);
            self.combine(entry, &inputs);
        }

        if table.is_empty() && self.plan.group_bys.is_empty() {
            // No input, no groups: CountStar is zero, everything else
            // NULL.
            let values = self.initial_aggregates();
            self.results
                .push_back(Tuple::new(&values, &self.plan.output_schema));
            return Ok(());
        }

        for (key, aggregates) in table {
            let mut values = key;
            values.extend(aggregates);
            self.results
                .push_back(Tuple::new(&values, &self.plan.output_schema));
        }
        Ok(())
    }
}

impl Executor for AggregationExecutor {
    fn init(&mut self) -> Result<()> {
        self.child.init()?;
        self.built = false;
        self.results.clear();
        Ok(())
    }

    fn next(&mut self) -> Result<Option<(Tuple, RecordId)>> {
        if !self.built {
            self.build()?;
            self.built = true;
        }
        Ok(self.results.pop_front().map(|tuple| (tuple, no_rid())))
    }

    fn output_schema(&self) -> Arc<Schema> {
        Arc::clone(&self.plan.output_schema)
    }
}
