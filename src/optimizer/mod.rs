mod nlj_as_hash_join;
mod seq_scan_as_index_scan;

pub use nlj_as_hash_join::optimize_nlj_as_hash_join;
pub use seq_scan_as_index_scan::optimize_seq_scan_as_index_scan;

use crate::catalog::Catalog;
use crate::execution::PlanNode;

/// Applies every rewrite bottom-up.
pub fn optimize(plan: PlanNode, catalog: &Catalog) -> PlanNode {
    let plan = optimize_seq_scan_as_index_scan(plan, catalog);
    optimize_nlj_as_hash_join(plan)
}

/// Rebuilds a plan node with its children mapped through `f`. Leaves
/// pass through untouched.
pub(crate) fn map_children<F: FnMut(PlanNode) -> PlanNode>(plan: PlanNode, f: &mut F) -> PlanNode {
    match plan {
        PlanNode::SeqScan(_) | PlanNode::IndexScan(_) | PlanNode::Values(_) => plan,
        PlanNode::Insert(mut p) => {
            p.child = Box::new(f(*p.child));
            PlanNode::Insert(p)
        }
        PlanNode::Update(mut p) => {
            p.child = Box::new(f(*p.child));
            PlanNode::Update(p)
        }
        PlanNode::Delete(mut p) => {
            p.child = Box::new(f(*p.child));
            PlanNode::Delete(p)
        }
        PlanNode::NestedLoopJoin(mut p) => {
            p.left = Box::new(f(*p.left));
            p.right = Box::new(f(*p.right));
            PlanNode::NestedLoopJoin(p)
        }
        PlanNode::HashJoin(mut p) => {
            p.left = Box::new(f(*p.left));
            p.right = Box::new(f(*p.right));
            PlanNode::HashJoin(p)
        }
        PlanNode::NestedIndexJoin(mut p) => {
            p.child = Box::new(f(*p.child));
            PlanNode::NestedIndexJoin(p)
        }
        PlanNode::Aggregation(mut p) => {
            p.child = Box::new(f(*p.child));
            PlanNode::Aggregation(p)
        }
        PlanNode::Limit(mut p) => {
            p.child = Box::new(f(*p.child));
            PlanNode::Limit(p)
        }
        PlanNode::Sort(mut p) => {
            p.child = Box::new(f(*p.child));
            PlanNode::Sort(p)
        }
    }
}
