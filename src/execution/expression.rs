use std::cmp::Ordering;

use crate::tuple::{Schema, Tuple, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComparisonOp {
    Equal,
    NotEqual,
    LessThan,
    LessThanOrEqual,
    GreaterThan,
    GreaterThanOrEqual,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogicOp {
    And,
    Or,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArithmeticOp {
    Add,
    Subtract,
    Multiply,
}

/// Expression tree evaluated against one tuple (scans, updates) or a
/// pair of tuples (join predicates, where `tuple_idx` picks the side).
#[derive(Debug, Clone)]
pub enum Expression {
    Column { tuple_idx: usize, col_idx: usize },
    Constant(Value),
    Comparison {
        op: ComparisonOp,
        left: Box<Expression>,
        right: Box<Expression>,
    },
    Logic {
        op: LogicOp,
        left: Box<Expression>,
        right: Box<Expression>,
    },
    Arithmetic {
        op: ArithmeticOp,
        left: Box<Expression>,
        right: Box<Expression>,
    },
}

impl Expression {
    pub fn column(col_idx: usize) -> Expression {
        Expression::Column {
            tuple_idx: 0,
            col_idx,
        }
    }

    pub fn column_of(tuple_idx: usize, col_idx: usize) -> Expression {
        Expression::Column { tuple_idx, col_idx }
    }

    pub fn constant(value: impl Into<Value>) -> Expression {
        Expression::Constant(value.into())
    }

    pub fn compare(op: ComparisonOp, left: Expression, right: Expression) -> Expression {
        Expression::Comparison {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    pub fn equals(left: Expression, right: Expression) -> Expression {
        Self::compare(ComparisonOp::Equal, left, right)
    }

    pub fn and(left: Expression, right: Expression) -> Expression {
        Expression::Logic {
            op: LogicOp::And,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    pub fn or(left: Expression, right: Expression) -> Expression {
        Expression::Logic {
            op: LogicOp::Or,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    /// Evaluates against a single tuple; column references resolve
    /// through `schema` regardless of their tuple index.
    pub fn evaluate(&self, tuple: &Tuple, schema: &Schema) -> Value {
        match self {
            Expression::Column { col_idx, .. } => tuple.value(schema, *col_idx),
            Expression::Constant(value) => value.clone(),
            Expression::Comparison { op, left, right } => compare_values(
                *op,
                &left.evaluate(tuple, schema),
                &right.evaluate(tuple, schema),
            ),
            Expression::Logic { op, left, right } => combine_bools(
                *op,
                left.evaluate(tuple, schema),
                right.evaluate(tuple, schema),
            ),
            Expression::Arithmetic { op, left, right } => arithmetic(
                *op,
                &left.evaluate(tuple, schema),
                &right.evaluate(tuple, schema),
            ),
        }
    }

    /// Evaluates a join predicate: `tuple_idx` 0 reads the left tuple,
    /// 1 the right. A missing right side (left-join probing) reads NULL.
    pub fn evaluate_join(
        &self,
        left: &Tuple,
        left_schema: &Schema,
        right: Option<&Tuple>,
        right_schema: &Schema,
    ) -> Value {
        match self {
            Expression::Column { tuple_idx, col_idx } => {
                if *tuple_idx == 0 {
                    left.value(left_schema, *col_idx)
                } else {
                    match right {
                        Some(right) => right.value(right_schema, *col_idx),
                        None => Value::Null,
                    }
                }
            }
            Expression::Constant(value) => value.clone(),
            Expression::Comparison { op, left: l, right: r } => compare_values(
                *op,
                &l.evaluate_join(left, left_schema, right, right_schema),
                &r.evaluate_join(left, left_schema, right, right_schema),
            ),
            Expression::Logic { op, left: l, right: r } => combine_bools(
                *op,
                l.evaluate_join(left, left_schema, right, right_schema),
                r.evaluate_join(left, left_schema, right, right_schema),
            ),
            Expression::Arithmetic { op, left: l, right: r } => arithmetic(
                *op,
                &l.evaluate_join(left, left_schema, right, right_schema),
                &r.evaluate_join(left, left_schema, right, right_schema),
            ),
        }
    }

    /// True when the predicate holds for the tuple (NULL counts as no).
    pub fn matches(&self, tuple: &Tuple, schema: &Schema) -> bool {
        self.evaluate(tuple, schema).as_bool() == Some(true)
    }
}

fn compare_values(op: ComparisonOp, left: &Value, right: &Value) -> Value {
    let Some(ordering) = left.compare(right) else {
        return Value::Null;
    };
    let result = match op {
        ComparisonOp::Equal => ordering == Ordering::Equal,
        ComparisonOp::NotEqual => ordering != Ordering::Equal,
        ComparisonOp::LessThan => ordering == Ordering::Less,
        ComparisonOp::LessThanOrEqual => ordering != Ordering::Greater,
        ComparisonOp::GreaterThan => ordering == Ordering::Greater,
        ComparisonOp::GreaterThanOrEqual => ordering != Ordering::Less,
    };
    Value::Boolean(result)
}

fn combine_bools(op: LogicOp, left: Value, right: Value) -> Value {
    let (l, r) = (left.as_bool(), right.as_bool());
    match op {
        LogicOp::And => match (l, r) {
            (Some(false), _) | (_, Some(false)) => Value::Boolean(false),
            (Some(true), Some(true)) => Value::Boolean(true),
            _ => Value::Null,
        },
        LogicOp::Or => match (l, r) {
            (Some(true), _) | (_, Some(true)) => Value::Boolean(true),
            (Some(false), Some(false)) => Value::Boolean(false),
            _ => Value::Null,
        },
    }
}

fn arithmetic(op: ArithmeticOp, left: &Value, right: &Value) -> Value {
    let (Some(l), Some(r)) = (left.as_i64(), right.as_i64()) else {
        return Value::Null;
    };
    let out = match op {
        ArithmeticOp::Add => l + r,
        ArithmeticOp::Subtract => l - r,
        ArithmeticOp::Multiply => l * r,
    };
    // Stay in the narrower type when both inputs were 32-bit.
    match (left, right) {
        (Value::Integer(_), Value::Integer(_)) => Value::Integer(out as i32),
        _ => Value::BigInt(out),
    }
}
