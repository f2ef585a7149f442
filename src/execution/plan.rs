use std::sync::Arc;

use crate::common::{IndexOid, TableOid};
use crate::tuple::Schema;

use super::expression::Expression;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinType {
    Inner,
    Left,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderByType {
    /// Unspecified direction; sorts ascending
    Default,
    Asc,
    Desc,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregationType {
    CountStar,
    Count,
    Sum,
    Min,
    Max,
}

/// The plan tree handed to the executor factory. One variant per
/// operator; executors are paired with plans by this tag.
#[derive(Debug, Clone)]
pub enum PlanNode {
    SeqScan(SeqScanPlan),
    IndexScan(IndexScanPlan),
    Values(ValuesPlan),
    Insert(InsertPlan),
    Update(UpdatePlan),
    Delete(DeletePlan),
    NestedLoopJoin(NestedLoopJoinPlan),
    HashJoin(HashJoinPlan),
    NestedIndexJoin(NestedIndexJoinPlan),
    Aggregation(AggregationPlan),
    Limit(LimitPlan),
    Sort(SortPlan),
}

impl PlanNode {
    pub fn output_schema(&self) -> &Arc<Schema> {
        match self {
            PlanNode::SeqScan(p) => &p.output_schema,
            PlanNode::IndexScan(p) => &p.output_schema,
            PlanNode::Values(p) => &p.output_schema,
            PlanNode::Insert(p) => &p.output_schema,
            PlanNode::Update(p) => &p.output_schema,
            PlanNode::Delete(p) => &p.output_schema,
            PlanNode::NestedLoopJoin(p) => &p.output_schema,
            PlanNode::HashJoin(p) => &p.output_schema,
            PlanNode::NestedIndexJoin(p) => &p.output_schema,
            PlanNode::Aggregation(p) => &p.output_schema,
            PlanNode::Limit(p) => &p.output_schema,
            PlanNode::Sort(p) => &p.output_schema,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SeqScanPlan {
    pub table_oid: TableOid,
    pub table_name: String,
    pub output_schema: Arc<Schema>,
    pub filter: Option<Expression>,
}

#[derive(Debug, Clone)]
pub struct IndexScanPlan {
    pub table_oid: TableOid,
    pub index_oid: IndexOid,
    pub output_schema: Arc<Schema>,
    /// Carried over from the rewritten seq scan
    pub filter: Option<Expression>,
    /// Constant probe keys; empty means a full ordered scan
    pub pred_keys: Vec<Expression>,
}

/// Literal rows, the canonical Insert child.
#[derive(Debug, Clone)]
pub struct ValuesPlan {
    pub rows: Vec<Vec<Expression>>,
    pub output_schema: Arc<Schema>,
}

#[derive(Debug, Clone)]
pub struct InsertPlan {
    pub table_oid: TableOid,
    pub child: Box<PlanNode>,
    /// Single integer column: the affected-row count
    pub output_schema: Arc<Schema>,
}

#[derive(Debug, Clone)]
pub struct UpdatePlan {
    pub table_oid: TableOid,
    pub child: Box<PlanNode>,
    /// One expression per table column, producing the new value
    pub target_expressions: Vec<Expression>,
    pub output_schema: Arc<Schema>,
}

#[derive(Debug, Clone)]
pub struct DeletePlan {
    pub table_oid: TableOid,
    pub child: Box<PlanNode>,
    pub output_schema: Arc<Schema>,
}

#[derive(Debug, Clone)]
pub struct NestedLoopJoinPlan {
    pub left: Box<PlanNode>,
    pub right: Box<PlanNode>,
    pub predicate: Option<Expression>,
    pub join_type: JoinType,
    pub output_schema: Arc<Schema>,
}

#[derive(Debug, Clone)]
pub struct HashJoinPlan {
    pub left: Box<PlanNode>,
    pub right: Box<PlanNode>,
    pub left_key_exprs: Vec<Expression>,
    pub right_key_exprs: Vec<Expression>,
    pub join_type: JoinType,
    pub output_schema: Arc<Schema>,
}

#[derive(Debug, Clone)]
pub struct NestedIndexJoinPlan {
    pub child: Box<PlanNode>,
    pub inner_table_oid: TableOid,
    pub index_oid: IndexOid,
    /// Evaluated over each outer row to form the probe key
    pub key_predicate: Expression,
    pub join_type: JoinType,
    pub inner_schema: Arc<Schema>,
    pub output_schema: Arc<Schema>,
}

#[derive(Debug, Clone)]
pub struct AggregationPlan {
    pub child: Box<PlanNode>,
    pub group_bys: Vec<Expression>,
    pub aggregates: Vec<Expression>,
    pub agg_types: Vec<AggregationType>,
    pub output_schema: Arc<Schema>,
}

#[derive(Debug, Clone)]
pub struct LimitPlan {
    pub child: Box<PlanNode>,
    pub limit: usize,
    pub output_schema: Arc<Schema>,
}

#[derive(Debug, Clone)]
pub struct SortPlan {
    pub child: Box<PlanNode>,
    pub order_bys: Vec<(OrderByType, Expression)>,
    pub output_schema: Arc<Schema>,
}
