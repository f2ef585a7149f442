use std::sync::Arc;

use bramble::buffer::BufferPoolManager;
use bramble::catalog::{Catalog, TableInfo};
use bramble::execution::{
    execute_plan, ComparisonOp, Expression, ExecutorContext, InsertPlan, JoinType,
    NestedLoopJoinPlan, PlanNode, SeqScanPlan, ValuesPlan,
};
use bramble::optimizer::{optimize_nlj_as_hash_join, optimize_seq_scan_as_index_scan};
use bramble::storage::disk::DiskManager;
use bramble::tuple::{DataType, Schema, Tuple, Value};
use bramble::txn::{IsolationLevel, Transaction, TransactionManager};
use tempfile::NamedTempFile;

fn setup() -> (Arc<Catalog>, Arc<TransactionManager>, NamedTempFile) {
    let temp = NamedTempFile::new().unwrap();
    let dm = Arc::new(DiskManager::new(temp.path()).unwrap());
    let bpm = Arc::new(BufferPoolManager::new(256, 2, dm));
    let catalog = Arc::new(Catalog::new(bpm));
    let txn_mgr = Arc::new(TransactionManager::new(Arc::clone(&catalog)));
    (catalog, txn_mgr, temp)
}

fn two_ints() -> Schema {
    Schema::builder()
        .column("v1", DataType::Integer)
        .column("v2", DataType::Integer)
        .build()
}

fn ctx_for(
    catalog: &Arc<Catalog>,
    txn_mgr: &Arc<TransactionManager>,
    txn: &Arc<Transaction>,
) -> Arc<ExecutorContext> {
    ExecutorContext::new(Arc::clone(catalog), Arc::clone(txn_mgr), Arc::clone(txn))
}

fn insert_rows(ctx: &Arc<ExecutorContext>, table: &Arc<TableInfo>, rows: &[(i32, i32)]) {
    let rows = rows
        .iter()
        .map(|&(a, b)| {
            vec![
                Expression::constant(Value::Integer(a)),
                Expression::constant(Value::Integer(b)),
            ]
        })
        .collect();
    let plan = PlanNode::Insert(InsertPlan {
        table_oid: table.oid,
        child: Box::new(PlanNode::Values(ValuesPlan {
            rows,
            output_schema: Arc::clone(&table.schema),
        })),
        output_schema: Schema::builder()
            .column("count", DataType::Integer)
            .build_arc(),
    });
    execute_plan(ctx, &plan).unwrap();
}

fn scan_with_filter(table: &Arc<TableInfo>, filter: Expression) -> PlanNode {
    PlanNode::SeqScan(SeqScanPlan {
        table_oid: table.oid,
        table_name: table.name.clone(),
        output_schema: Arc::clone(&table.schema),
        filter: Some(filter),
    })
}

fn sorted_rows(tuples: &[Tuple], schema: &Schema) -> Vec<(i32, i32)> {
    let mut rows: Vec<(i32, i32)> = tuples
        .iter()
        .map(|t| match (t.value(schema, 0), t.value(schema, 1)) {
            (Value::Integer(a), Value::Integer(b)) => (a, b),
            other => panic!("unexpected row {other:?}"),
        })
        .collect();
    rows.sort_unstable();
    rows
}

#[test]
fn test_or_equalities_rewrite_to_index_scan_with_dedup() {
    // WHERE v1 = 1 OR v1 = 2 OR v1 = 2 on a v1-indexed table becomes an
    // index scan probing [1, 2].
    let (catalog, txn_mgr, _temp) = setup();
    let table = catalog.create_table("t", two_ints()).unwrap();
    catalog
        .create_index("t_v1", "t", vec![0], true, 16, 16)
        .unwrap();

    let txn = txn_mgr.begin(IsolationLevel::SnapshotIsolation);
    let ctx = ctx_for(&catalog, &txn_mgr, &txn);
    insert_rows(&ctx, &table, &[(1, 10), (2, 20), (3, 30)]);

    let filter = Expression::or(
        Expression::or(
            Expression::equals(Expression::column(0), Expression::constant(1)),
            Expression::equals(Expression::column(0), Expression::constant(2)),
        ),
        Expression::equals(Expression::column(0), Expression::constant(2)),
    );
    let plan = scan_with_filter(&table, filter);
    let optimized = optimize_seq_scan_as_index_scan(plan.clone(), &catalog);

    let PlanNode::IndexScan(index_scan) = &optimized else {
        panic!("expected an index scan, got {optimized:?}");
    };
    assert_eq!(index_scan.pred_keys.len(), 2);

    // Rewrite soundness: both plans return the same rows.
    let via_index = execute_plan(&ctx, &optimized).unwrap();
    let via_seq = execute_plan(&ctx, &plan).unwrap();
    assert_eq!(
        sorted_rows(&via_index, &table.schema),
        vec![(1, 10), (2, 20)]
    );
    assert_eq!(
        sorted_rows(&via_index, &table.schema),
        sorted_rows(&via_seq, &table.schema)
    );
}

#[test]
fn test_index_scan_rewrite_rejections() {
    let (catalog, txn_mgr, _temp) = setup();
    let table = catalog.create_table("t", two_ints()).unwrap();
    catalog
        .create_index("t_v1", "t", vec![0], true, 16, 16)
        .unwrap();
    let _txn = txn_mgr.begin(IsolationLevel::SnapshotIsolation);

    // AND of equalities: stays sequential.
    let plan = scan_with_filter(
        &table,
        Expression::and(
            Expression::equals(Expression::column(0), Expression::constant(1)),
            Expression::equals(Expression::column(1), Expression::constant(2)),
        ),
    );
    assert!(matches!(
        optimize_seq_scan_as_index_scan(plan, &catalog),
        PlanNode::SeqScan(_)
    ));

    // OR across two different columns: stays sequential.
    let plan = scan_with_filter(
        &table,
        Expression::or(
            Expression::equals(Expression::column(0), Expression::constant(1)),
            Expression::equals(Expression::column(1), Expression::constant(2)),
        ),
    );
    assert!(matches!(
        optimize_seq_scan_as_index_scan(plan, &catalog),
        PlanNode::SeqScan(_)
    ));

    // Inequality: stays sequential.
    let plan = scan_with_filter(
        &table,
        Expression::compare(
            ComparisonOp::LessThan,
            Expression::column(0),
            Expression::constant(5),
        ),
    );
    assert!(matches!(
        optimize_seq_scan_as_index_scan(plan, &catalog),
        PlanNode::SeqScan(_)
    ));

    // Equality over the non-indexed column: stays sequential.
    let plan = scan_with_filter(
        &table,
        Expression::equals(Expression::column(1), Expression::constant(5)),
    );
    assert!(matches!(
        optimize_seq_scan_as_index_scan(plan, &catalog),
        PlanNode::SeqScan(_)
    ));
}

#[test]
fn test_conjunctive_column_equalities_rewrite_to_hash_join() {
    // WHERE a.x = b.y AND a.z = b.w becomes a hash join keyed on
    // [x, z] / [y, w].
    let (catalog, txn_mgr, _temp) = setup();
    let a = catalog.create_table("a", two_ints()).unwrap();
    let b = catalog.create_table("b", two_ints()).unwrap();

    let txn = txn_mgr.begin(IsolationLevel::SnapshotIsolation);
    let ctx = ctx_for(&catalog, &txn_mgr, &txn);
    insert_rows(&ctx, &a, &[(1, 2), (3, 4)]);
    insert_rows(&ctx, &b, &[(1, 2), (3, 5)]);

    let join_schema = Schema::builder()
        .column("x", DataType::Integer)
        .column("z", DataType::Integer)
        .column("y", DataType::Integer)
        .column("w", DataType::Integer)
        .build_arc();

    let predicate = Expression::and(
        Expression::equals(Expression::column_of(0, 0), Expression::column_of(1, 0)),
        Expression::equals(Expression::column_of(0, 1), Expression::column_of(1, 1)),
    );
    let nlj = PlanNode::NestedLoopJoin(NestedLoopJoinPlan {
        left: Box::new(PlanNode::SeqScan(SeqScanPlan {
            table_oid: a.oid,
            table_name: a.name.clone(),
            output_schema: Arc::clone(&a.schema),
            filter: None,
        })),
        right: Box::new(PlanNode::SeqScan(SeqScanPlan {
            table_oid: b.oid,
            table_name: b.name.clone(),
            output_schema: Arc::clone(&b.schema),
            filter: None,
        })),
        predicate: Some(predicate),
        join_type: JoinType::Inner,
        output_schema: Arc::clone(&join_schema),
    });

    let optimized = optimize_nlj_as_hash_join(nlj.clone());
    let PlanNode::HashJoin(hash_join) = &optimized else {
        panic!("expected a hash join, got {optimized:?}");
    };
    assert_eq!(hash_join.left_key_exprs.len(), 2);
    assert_eq!(hash_join.right_key_exprs.len(), 2);

    // One matching pair: (1,2) on both sides.
    let via_hash = execute_plan(&ctx, &optimized).unwrap();
    assert_eq!(via_hash.len(), 1);
    assert_eq!(
        via_hash[0].values(&join_schema),
        vec![
            Value::Integer(1),
            Value::Integer(2),
            Value::Integer(1),
            Value::Integer(2)
        ]
    );

    // Rewrite soundness against the original nested loop.
    let via_nlj = execute_plan(&ctx, &nlj).unwrap();
    assert_eq!(via_nlj.len(), 1);
    assert_eq!(via_nlj[0].values(&join_schema), via_hash[0].values(&join_schema));
}

#[test]
fn test_hash_join_rewrite_rejections() {
    let (catalog, _txn_mgr, _temp) = setup();
    let a = catalog.create_table("a", two_ints()).unwrap();
    let b = catalog.create_table("b", two_ints()).unwrap();

    let make_nlj = |predicate| {
        PlanNode::NestedLoopJoin(NestedLoopJoinPlan {
            left: Box::new(PlanNode::SeqScan(SeqScanPlan {
                table_oid: a.oid,
                table_name: a.name.clone(),
                output_schema: Arc::clone(&a.schema),
                filter: None,
            })),
            right: Box::new(PlanNode::SeqScan(SeqScanPlan {
                table_oid: b.oid,
                table_name: b.name.clone(),
                output_schema: Arc::clone(&b.schema),
                filter: None,
            })),
            predicate: Some(predicate),
            join_type: JoinType::Inner,
            output_schema: Schema::builder().column("x", DataType::Integer).build_arc(),
        })
    };

    // OR of equalities: rejected.
    let plan = make_nlj(Expression::or(
        Expression::equals(Expression::column_of(0, 0), Expression::column_of(1, 0)),
        Expression::equals(Expression::column_of(0, 1), Expression::column_of(1, 1)),
    ));
    assert!(matches!(
        optimize_nlj_as_hash_join(plan),
        PlanNode::NestedLoopJoin(_)
    ));

    // Non-equality comparator: rejected.
    let plan = make_nlj(Expression::compare(
        ComparisonOp::LessThan,
        Expression::column_of(0, 0),
        Expression::column_of(1, 0),
    ));
    assert!(matches!(
        optimize_nlj_as_hash_join(plan),
        PlanNode::NestedLoopJoin(_)
    ));

    // Column-to-constant: rejected.
    let plan = make_nlj(Expression::equals(
        Expression::column_of(0, 0),
        Expression::constant(3),
    ));
    assert!(matches!(
        optimize_nlj_as_hash_join(plan),
        PlanNode::NestedLoopJoin(_)
    ));

    // Both columns from the same side: rejected.
    let plan = make_nlj(Expression::equals(
        Expression::column_of(0, 0),
        Expression::column_of(0, 1),
    ));
    assert!(matches!(
        optimize_nlj_as_hash_join(plan),
        PlanNode::NestedLoopJoin(_)
    ));
}
