use crate::catalog::Catalog;
use crate::execution::{ComparisonOp, Expression, IndexScanPlan, LogicOp, PlanNode};
use crate::tuple::Value;

use super::map_children;

/// Rewrites `SELECT ... WHERE col = c1 OR col = c2 OR ...` over an
/// indexed column into an index scan probing the (deduplicated)
/// constants. Any AND, inequality, or second column rejects the rewrite
/// and keeps the sequential scan.
pub fn optimize_seq_scan_as_index_scan(plan: PlanNode, catalog: &Catalog) -> PlanNode {
    let plan = map_children(plan, &mut |child| {
        optimize_seq_scan_as_index_scan(child, catalog)
    });

    let PlanNode::SeqScan(seq) = plan else {
        return plan;
    };
    let Some(filter) = &seq.filter else {
        return PlanNode::SeqScan(seq);
    };

    let mut columns = Vec::new();
    let mut constants = Vec::new();
    if !collect_or_equalities(filter, &mut columns, &mut constants) {
        return PlanNode::SeqScan(seq);
    }
    // Every equality must target one and the same column.
    if columns.windows(2).any(|pair| pair[0] != pair[1]) {
        return PlanNode::SeqScan(seq);
    }
    let column = columns[0];

    let indexes = catalog.table_indexes(&seq.table_name);
    let Some(info) = indexes
        .iter()
        .find(|info| info.index.key_attrs()[0] == column)
    else {
        return PlanNode::SeqScan(seq);
    };

    // Duplicate constants probe the index once.
    let mut seen: Vec<Value> = Vec::new();
    let mut pred_keys = Vec::new();
    for value in constants {
        if !seen.iter().any(|v| v.compare_equals(&value)) {
            pred_keys.push(Expression::Constant(value.clone()));
            seen.push(value);
        }
    }

    PlanNode::IndexScan(IndexScanPlan {
        table_oid: seq.table_oid,
        index_oid: info.oid,
        output_schema: seq.output_schema,
        filter: seq.filter,
        pred_keys,
    })
}

/// Accepts only `(col = const)` leaves glued by OR. Pushes the column
/// index and the constant of each leaf.
fn collect_or_equalities(
    expr: &Expression,
    columns: &mut Vec<usize>,
    constants: &mut Vec<Value>,
) -> bool {
    match expr {
        Expression::Logic {
            op: LogicOp::Or,
            left,
            right,
        } => collect_or_equalities(left, columns, constants)
            && collect_or_equalities(right, columns, constants),
        Expression::Comparison {
            op: ComparisonOp::Equal,
            left,
            right,
        } => match (left.as_ref(), right.as_ref()) {
            (Expression::Column { col_idx, .. }, Expression::Constant(value))
            | (Expression::Constant(value), Expression::Column { col_idx, .. }) => {
                columns.push(*col_idx);
                constants.push(value.clone());
                true
            }
            _ => false,
        },
        _ => false,
    }
}
