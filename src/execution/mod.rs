pub mod executors;
mod expression;
mod plan;

pub use expression::{ArithmeticOp, ComparisonOp, Expression, LogicOp};
pub use plan::{
    AggregationPlan, AggregationType, DeletePlan, HashJoinPlan, IndexScanPlan, InsertPlan,
    JoinType, LimitPlan, NestedIndexJoinPlan, NestedLoopJoinPlan, OrderByType, PlanNode,
    SeqScanPlan, SortPlan, UpdatePlan, ValuesPlan,
};

use std::sync::Arc;

use crate::buffer::BufferPoolManager;
use crate::catalog::Catalog;
use crate::common::{RecordId, Result};
use crate::tuple::{Schema, Tuple};
use crate::txn::{Transaction, TransactionManager};

use executors::{
    AggregationExecutor, DeleteExecutor, ExternalMergeSortExecutor, HashJoinExecutor,
    IndexScanExecutor, InsertExecutor, LimitExecutor, NestedIndexJoinExecutor,
    NestedLoopJoinExecutor, SeqScanExecutor, UpdateExecutor, ValuesExecutor,
};

/// Everything an executor needs to reach the engine.
pub struct ExecutorContext {
    pub bpm: Arc<BufferPoolManager>,
    pub catalog: Arc<Catalog>,
    pub txn_mgr: Arc<TransactionManager>,
    pub txn: Arc<Transaction>,
}

impl ExecutorContext {
    pub fn new(
        catalog: Arc<Catalog>,
        txn_mgr: Arc<TransactionManager>,
        txn: Arc<Transaction>,
    ) -> Arc<Self> {
        Arc::new(Self {
            bpm: Arc::clone(catalog.buffer_pool()),
            catalog,
            txn_mgr,
            txn,
        })
    }
}

/// The pull interface every operator implements. `init` is an idempotent
/// reset; `next` yields tuples until None. Write conflicts surface as
/// `Err(BrambleError::WriteConflict)` after tainting the transaction.
pub trait Executor {
    fn init(&mut self) -> Result<()>;
    fn next(&mut self) -> Result<Option<(Tuple, RecordId)>>;
    fn output_schema(&self) -> Arc<Schema>;
}

/// Builds the executor tree for a plan.
pub fn create_executor(ctx: &Arc<ExecutorContext>, plan: &PlanNode) -> Box<dyn Executor> {
    match plan {
        PlanNode::SeqScan(p) => Box::new(SeqScanExecutor::new(Arc::clone(ctx), p.clone())),
        PlanNode::IndexScan(p) => Box::new(IndexScanExecutor::new(Arc::clone(ctx), p.clone())),
        PlanNode::Values(p) => Box::new(ValuesExecutor::new(p.clone())),
        PlanNode::Insert(p) => {
            let child = create_executor(ctx, &p.child);
            Box::new(InsertExecutor::new(Arc::clone(ctx), p.clone(), child))
        }
        PlanNode::Update(p) => {
            let child = create_executor(ctx, &p.child);
            Box::new(UpdateExecutor::new(Arc::clone(ctx), p.clone(), child))
        }
        PlanNode::Delete(p) => {
            let child = create_executor(ctx, &p.child);
            Box::new(DeleteExecutor::new(Arc::clone(ctx), p.clone(), child))
        }
        PlanNode::NestedLoopJoin(p) => {
            let left = create_executor(ctx, &p.left);
            let right = create_executor(ctx, &p.right);
            Box::new(NestedLoopJoinExecutor::new(p.clone(), left, right))
        }
        PlanNode::HashJoin(p) => {
            let left = create_executor(ctx, &p.left);
            let right = create_executor(ctx, &p.right);
            Box::new(HashJoinExecutor::new(p.clone(), left, right))
        }
        PlanNode::NestedIndexJoin(p) => {
            let child = create_executor(ctx, &p.child);
            Box::new(NestedIndexJoinExecutor::new(Arc::clone(ctx), p.clone(), child))
        }
        PlanNode::Aggregation(p) => {
            let child = create_executor(ctx, &p.child);
            Box::new(AggregationExecutor::new(p.clone(), child))
        }
        PlanNode::Limit(p) => {
            let child = create_executor(ctx, &p.child);
            Box::new(LimitExecutor::new(p.clone(), child))
        }
        PlanNode::Sort(p) => {
            let child = create_executor(ctx, &p.child);
            Box::new(ExternalMergeSortExecutor::new(Arc::clone(ctx), p.clone(), child))
        }
    }
}

/// Convenience driver: builds, initializes and drains a plan.
pub fn execute_plan(ctx: &Arc<ExecutorContext>, plan: &PlanNode) -> Result<Vec<Tuple>> {
    let mut executor = create_executor(ctx, plan);
    executor.init()?;
    let mut out = Vec::new();
    while let Some((tuple, _rid)) = executor.next()? {
        out.push(tuple);
    }
    Ok(out)
}
