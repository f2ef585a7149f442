use crate::execution::{ComparisonOp, Expression, HashJoinPlan, LogicOp, PlanNode};

use super::map_children;

/// Rewrites a nested-loop join whose predicate is a conjunction of
/// column-to-column equalities into a hash join, splitting the equality
/// sides into aligned key lists. Any OR, non-equality comparator or
/// non-column operand keeps the nested loop.
pub fn optimize_nlj_as_hash_join(plan: PlanNode) -> PlanNode {
    let plan = map_children(plan, &mut optimize_nlj_as_hash_join);

    let PlanNode::NestedLoopJoin(nlj) = plan else {
        return plan;
    };
    let Some(predicate) = &nlj.predicate else {
        return PlanNode::NestedLoopJoin(nlj);
    };

    let mut left_keys = Vec::new();
    let mut right_keys = Vec::new();
    if !collect_and_equalities(predicate, &mut left_keys, &mut right_keys) {
        return PlanNode::NestedLoopJoin(nlj);
    }

    PlanNode::HashJoin(HashJoinPlan {
        left: nlj.left,
        right: nlj.right,
        left_key_exprs: left_keys,
        right_key_exprs: right_keys,
        join_type: nlj.join_type,
        output_schema: nlj.output_schema,
    })
}

/// Accepts only `(left-col = right-col)` leaves glued by AND. The key
/// expressions are re-rooted at tuple index 0 because each side later
/// evaluates against its own child schema.
fn collect_and_equalities(
    expr: &Expression,
    left_keys: &mut Vec<Expression>,
    right_keys: &mut Vec<Expression>,
) -> bool {
    match expr {
        Expression::Logic {
            op: LogicOp::And,
            left,
            right,
        } => collect_and_equalities(left, left_keys, right_keys)
            && collect_and_equalities(right, left_keys, right_keys),
        Expression::Comparison {
            op: ComparisonOp::Equal,
            left,
            right,
        } => match (left.as_ref(), right.as_ref()) {
            (
                Expression::Column {
                    tuple_idx: left_side,
                    col_idx: left_col,
                },
                Expression::Column {
                    tuple_idx: right_side,
                    col_idx: right_col,
                },
            ) if left_side != right_side => {
                if *left_side == 0 {
                    left_keys.push(Expression::column(*left_col));
                    right_keys.push(Expression::column(*right_col));
                } else {
                    left_keys.push(Expression::column(*right_col));
                    right_keys.push(Expression::column(*left_col));
                }
                true
            }
            _ => false,
        },
        _ => false,
    }
}
