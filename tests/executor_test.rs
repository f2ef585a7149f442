use std::sync::Arc;

use bramble::buffer::BufferPoolManager;
use bramble::catalog::{Catalog, TableInfo};
use bramble::execution::{
    execute_plan, AggregationPlan, AggregationType, Expression, ExecutorContext, HashJoinPlan,
    InsertPlan, JoinType, LimitPlan, NestedIndexJoinPlan, NestedLoopJoinPlan, PlanNode,
    SeqScanPlan, UpdatePlan, ValuesPlan,
};
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
        .column("a", DataType::Integer)
        .column("b", DataType::Integer)
        .build()
}

fn count_schema() -> Arc<Schema> {
    Schema::builder()
        .column("count", DataType::Integer)
        .build_arc()
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
        output_schema: count_schema(),
    });
    execute_plan(ctx, &plan).unwrap();
}

fn seq_scan(table: &Arc<TableInfo>) -> Box<PlanNode> {
    Box::new(PlanNode::SeqScan(SeqScanPlan {
        table_oid: table.oid,
        table_name: table.name.clone(),
        output_schema: Arc::clone(&table.schema),
        filter: None,
    }))
}

fn join_schema() -> Arc<Schema> {
    Schema::builder()
        .column("a", DataType::Integer)
        .column("b", DataType::Integer)
        .column("c", DataType::Integer)
        .column("d", DataType::Integer)
        .build_arc()
}

fn rows_of(tuples: &[Tuple], schema: &Schema) -> Vec<Vec<Value>> {
    let mut rows: Vec<Vec<Value>> = tuples.iter().map(|t| t.values(schema)).collect();
    rows.sort_by_key(|row| {
        row.iter()
            .map(|v| v.as_i64().unwrap_or(i64::MIN))
            .collect::<Vec<_>>()
    });
    rows
}

fn ints(values: &[Option<i32>]) -> Vec<Value> {
    values
        .iter()
        .map(|v| match v {
            Some(v) => Value::Integer(*v),
            None => Value::Null,
        })
        .collect()
}

#[test]
fn test_nested_loop_join_inner_and_left() {
    let (catalog, txn_mgr, _temp) = setup();
    let left = catalog.create_table("l", two_ints()).unwrap();
    let right = catalog.create_table("r", two_ints()).unwrap();

    let txn = txn_mgr.begin(IsolationLevel::SnapshotIsolation);
    let ctx = ctx_for(&catalog, &txn_mgr, &txn);
    insert_rows(&ctx, &left, &[(1, 10), (2, 20), (3, 30)]);
    insert_rows(&ctx, &right, &[(1, 100), (1, 101), (3, 300)]);

    let predicate = Expression::equals(
        Expression::column_of(0, 0),
        Expression::column_of(1, 0),
    );

    let inner = PlanNode::NestedLoopJoin(NestedLoopJoinPlan {
        left: seq_scan(&left),
        right: seq_scan(&right),
        predicate: Some(predicate.clone()),
        join_type: JoinType::Inner,
        output_schema: join_schema(),
    });
    let result = execute_plan(&ctx, &inner).unwrap();
    assert_eq!(
        rows_of(&result, &join_schema()),
        vec![
            ints(&[Some(1), Some(10), Some(1), Some(100)]),
            ints(&[Some(1), Some(10), Some(1), Some(101)]),
            ints(&[Some(3), Some(30), Some(3), Some(300)]),
        ]
    );

    let left_join = PlanNode::NestedLoopJoin(NestedLoopJoinPlan {
        left: seq_scan(&left),
        right: seq_scan(&right),
        predicate: Some(predicate),
        join_type: JoinType::Left,
        output_schema: join_schema(),
    });
    let result = execute_plan(&ctx, &left_join).unwrap();
    assert_eq!(
        rows_of(&result, &join_schema()),
        vec![
            ints(&[Some(1), Some(10), Some(1), Some(100)]),
            ints(&[Some(1), Some(10), Some(1), Some(101)]),
            ints(&[Some(2), Some(20), None, None]),
            ints(&[Some(3), Some(30), Some(3), Some(300)]),
        ]
    );
}

#[test]
fn test_hash_join_matches_nested_loop() {
    let (catalog, txn_mgr, _temp) = setup();
    let left = catalog.create_table("l", two_ints()).unwrap();
    let right = catalog.create_table("r", two_ints()).unwrap();

    let txn = txn_mgr.begin(IsolationLevel::SnapshotIsolation);
    let ctx = ctx_for(&catalog, &txn_mgr, &txn);
    insert_rows(&ctx, &left, &[(1, 2), (2, 3), (5, 6), (7, 8)]);
    insert_rows(&ctx, &right, &[(1, 2), (2, 4), (5, 6), (9, 9)]);

    // Join on both columns.
    let hash = PlanNode::HashJoin(HashJoinPlan {
        left: seq_scan(&left),
        right: seq_scan(&right),
        left_key_exprs: vec![Expression::column(0), Expression::column(1)],
        right_key_exprs: vec![Expression::column(0), Expression::column(1)],
        join_type: JoinType::Inner,
        output_schema: join_schema(),
    });
    let result = execute_plan(&ctx, &hash).unwrap();
    assert_eq!(
        rows_of(&result, &join_schema()),
        vec![
            ints(&[Some(1), Some(2), Some(1), Some(2)]),
            ints(&[Some(5), Some(6), Some(5), Some(6)]),
        ]
    );

    let hash_left = PlanNode::HashJoin(HashJoinPlan {
        left: seq_scan(&left),
        right: seq_scan(&right),
        left_key_exprs: vec![Expression::column(0), Expression::column(1)],
        right_key_exprs: vec![Expression::column(0), Expression::column(1)],
        join_type: JoinType::Left,
        output_schema: join_schema(),
    });
    let result = execute_plan(&ctx, &hash_left).unwrap();
    assert_eq!(result.len(), 4);
}

#[test]
fn test_nested_index_join() {
    let (catalog, txn_mgr, _temp) = setup();
    let outer = catalog.create_table("outer_t", two_ints()).unwrap();
    let inner = catalog.create_table("inner_t", two_ints()).unwrap();
    let index = catalog
        .create_index("inner_pk", "inner_t", vec![0], true, 16, 16)
        .unwrap();

    let txn = txn_mgr.begin(IsolationLevel::SnapshotIsolation);
    let ctx = ctx_for(&catalog, &txn_mgr, &txn);
    insert_rows(&ctx, &outer, &[(1, 10), (2, 20), (4, 40)]);
    insert_rows(&ctx, &inner, &[(1, 111), (2, 222), (3, 333)]);

    let plan = PlanNode::NestedIndexJoin(NestedIndexJoinPlan {
        child: seq_scan(&outer),
        inner_table_oid: inner.oid,
        index_oid: index.oid,
        key_predicate: Expression::column(0),
        join_type: JoinType::Left,
        inner_schema: Arc::clone(&inner.schema),
        output_schema: join_schema(),
    });
    let result = execute_plan(&ctx, &plan).unwrap();
    assert_eq!(
        rows_of(&result, &join_schema()),
        vec![
            ints(&[Some(1), Some(10), Some(1), Some(111)]),
            ints(&[Some(2), Some(20), Some(2), Some(222)]),
            ints(&[Some(4), Some(40), None, None]),
        ]
    );
}

#[test]
fn test_aggregation_with_group_by() {
    let (catalog, txn_mgr, _temp) = setup();
    let table = catalog.create_table("t", two_ints()).unwrap();

    let txn = txn_mgr.begin(IsolationLevel::SnapshotIsolation);
    let ctx = ctx_for(&catalog, &txn_mgr, &txn);
    insert_rows(&ctx, &table, &[(1, 10), (1, 20), (2, 5), (2, 7), (2, 9)]);

    let output_schema = Schema::builder()
        .column("a", DataType::Integer)
        .column("cnt", DataType::Integer)
        .column("sum", DataType::Integer)
        .column("min", DataType::Integer)
        .column("max", DataType::Integer)
        .build_arc();
    let plan = PlanNode::Aggregation(AggregationPlan {
        child: seq_scan(&table),
        group_bys: vec![Expression::column(0)],
        aggregates: vec![
            Expression::column(1),
            Expression::column(1),
            Expression::column(1),
            Expression::column(1),
        ],
        agg_types: vec![
            AggregationType::CountStar,
            AggregationType::Sum,
            AggregationType::Min,
            AggregationType::Max,
        ],
        output_schema: Arc::clone(&output_schema),
    });

    let result = execute_plan(&ctx, &plan).unwrap();
    assert_eq!(
        rows_of(&result, &output_schema),
        vec![
            ints(&[Some(1), Some(2), Some(30), Some(10), Some(20)]),
            ints(&[Some(2), Some(3), Some(21), Some(5), Some(9)]),
        ]
    );
}

#[test]
fn test_aggregation_empty_input_zero_or_null() {
    let (catalog, txn_mgr, _temp) = setup();
    let table = catalog.create_table("t", two_ints()).unwrap();

    let txn = txn_mgr.begin(IsolationLevel::SnapshotIsolation);
    let ctx = ctx_for(&catalog, &txn_mgr, &txn);

    let output_schema = Schema::builder()
        .column("cnt_star", DataType::Integer)
        .column("cnt", DataType::Integer)
        .column("sum", DataType::Integer)
        .build_arc();
    let plan = PlanNode::Aggregation(AggregationPlan {
        child: seq_scan(&table),
        group_bys: vec![],
        aggregates: vec![
            Expression::column(0),
            Expression::column(0),
            Expression::column(1),
        ],
        agg_types: vec![
            AggregationType::CountStar,
            AggregationType::Count,
            AggregationType::Sum,
        ],
        output_schema: Arc::clone(&output_schema),
    });

    let result = execute_plan(&ctx, &plan).unwrap();
    assert_eq!(result.len(), 1);
    assert_eq!(
        result[0].values(&output_schema),
        ints(&[Some(0), None, None])
    );

    // With a group-by, empty input emits nothing.
    let grouped = PlanNode::Aggregation(AggregationPlan {
        child: seq_scan(&table),
        group_bys: vec![Expression::column(0)],
        aggregates: vec![Expression::column(1)],
        agg_types: vec![AggregationType::Sum],
        output_schema: Schema::builder()
            .column("a", DataType::Integer)
            .column("sum", DataType::Integer)
            .build_arc(),
    });
    assert!(execute_plan(&ctx, &grouped).unwrap().is_empty());
}

#[test]
fn test_limit() {
    let (catalog, txn_mgr, _temp) = setup();
    let table = catalog.create_table("t", two_ints()).unwrap();

    let txn = txn_mgr.begin(IsolationLevel::SnapshotIsolation);
    let ctx = ctx_for(&catalog, &txn_mgr, &txn);
    insert_rows(&ctx, &table, &(0..20).map(|i| (i, i)).collect::<Vec<_>>());

    let plan = PlanNode::Limit(LimitPlan {
        child: seq_scan(&table),
        limit: 7,
        output_schema: Arc::clone(&table.schema),
    });
    assert_eq!(execute_plan(&ctx, &plan).unwrap().len(), 7);

    let generous = PlanNode::Limit(LimitPlan {
        child: seq_scan(&table),
        limit: 100,
        output_schema: Arc::clone(&table.schema),
    });
    assert_eq!(execute_plan(&ctx, &generous).unwrap().len(), 20);
}

#[test]
fn test_update_changing_primary_key() {
    let (catalog, txn_mgr, _temp) = setup();
    let table = catalog.create_table("t", two_ints()).unwrap();
    let pk = catalog
        .create_index("t_pk", "t", vec![0], true, 16, 16)
        .unwrap();

    let t1 = txn_mgr.begin(IsolationLevel::SnapshotIsolation);
    let ctx1 = ctx_for(&catalog, &txn_mgr, &t1);
    insert_rows(&ctx1, &table, &[(1, 10), (2, 20)]);
    txn_mgr.commit(&t1).unwrap();

    // UPDATE t SET a = a + 10 touches the key: delete-then-reinsert.
    let t2 = txn_mgr.begin(IsolationLevel::SnapshotIsolation);
    let ctx2 = ctx_for(&catalog, &txn_mgr, &t2);
    let plan = PlanNode::Update(UpdatePlan {
        table_oid: table.oid,
        child: seq_scan(&table),
        target_expressions: vec![
            Expression::Arithmetic {
                op: bramble::execution::ArithmeticOp::Add,
                left: Box::new(Expression::column(0)),
                right: Box::new(Expression::constant(10)),
            },
            Expression::column(1),
        ],
        output_schema: count_schema(),
    });
    let result = execute_plan(&ctx2, &plan).unwrap();
    assert_eq!(result[0].value(&count_schema(), 0), Value::Integer(2));
    txn_mgr.commit(&t2).unwrap();

    // New keys resolve through the primary index; old keys are
    // tombstones.
    let fresh = txn_mgr.begin(IsolationLevel::SnapshotIsolation);
    let fctx = ctx_for(&catalog, &txn_mgr, &fresh);
    let scan = PlanNode::SeqScan(SeqScanPlan {
        table_oid: table.oid,
        table_name: table.name.clone(),
        output_schema: Arc::clone(&table.schema),
        filter: None,
    });
    let rows = execute_plan(&fctx, &scan).unwrap();
    assert_eq!(
        rows_of(&rows, &table.schema),
        vec![
            ints(&[Some(11), Some(10)]),
            ints(&[Some(12), Some(20)]),
        ]
    );

    let key_schema = pk.index.key_schema();
    for (key_value, expect_hit) in [(11, true), (12, true)] {
        let key = Tuple::new(&[Value::Integer(key_value)], key_schema);
        let mut found = Vec::new();
        pk.index.scan_key(&key, &mut found).unwrap();
        assert_eq!(!found.is_empty(), expect_hit, "key {key_value}");
    }
}

#[test]
fn test_index_scan_full_scan_in_key_order() {
    let (catalog, txn_mgr, _temp) = setup();
    let table = catalog.create_table("t", two_ints()).unwrap();
    let index = catalog
        .create_index("t_pk", "t", vec![0], true, 16, 16)
        .unwrap();

    let t1 = txn_mgr.begin(IsolationLevel::SnapshotIsolation);
    let ctx1 = ctx_for(&catalog, &txn_mgr, &t1);
    insert_rows(&ctx1, &table, &[(5, 50), (1, 10), (9, 90), (3, 30)]);
    txn_mgr.commit(&t1).unwrap();

    // Delete one row so the scan has an invisible entry to skip.
    let t2 = txn_mgr.begin(IsolationLevel::SnapshotIsolation);
    let ctx2 = ctx_for(&catalog, &txn_mgr, &t2);
    let delete = PlanNode::Delete(bramble::execution::DeletePlan {
        table_oid: table.oid,
        child: Box::new(PlanNode::SeqScan(SeqScanPlan {
            table_oid: table.oid,
            table_name: table.name.clone(),
            output_schema: Arc::clone(&table.schema),
            filter: Some(Expression::equals(
                Expression::column(0),
                Expression::constant(3),
            )),
        })),
        output_schema: count_schema(),
    });
    execute_plan(&ctx2, &delete).unwrap();
    txn_mgr.commit(&t2).unwrap();

    let reader = txn_mgr.begin(IsolationLevel::SnapshotIsolation);
    let rctx = ctx_for(&catalog, &txn_mgr, &reader);
    let plan = PlanNode::IndexScan(bramble::execution::IndexScanPlan {
        table_oid: table.oid,
        index_oid: index.oid,
        output_schema: Arc::clone(&table.schema),
        filter: None,
        pred_keys: vec![],
    });
    let result = execute_plan(&rctx, &plan).unwrap();

    // Key order, tombstone skipped.
    let keys: Vec<i32> = result
        .iter()
        .map(|t| match t.value(&table.schema, 0) {
            Value::Integer(v) => v,
            other => panic!("unexpected {other}"),
        })
        .collect();
    assert_eq!(keys, vec![1, 5, 9]);
}

#[test]
fn test_index_scan_probe_keys() {
    let (catalog, txn_mgr, _temp) = setup();
    let table = catalog.create_table("t", two_ints()).unwrap();
    let index = catalog
        .create_index("t_pk", "t", vec![0], true, 16, 16)
        .unwrap();

    let txn = txn_mgr.begin(IsolationLevel::SnapshotIsolation);
    let ctx = ctx_for(&catalog, &txn_mgr, &txn);
    insert_rows(&ctx, &table, &[(1, 10), (2, 20), (3, 30)]);

    let plan = PlanNode::IndexScan(bramble::execution::IndexScanPlan {
        table_oid: table.oid,
        index_oid: index.oid,
        output_schema: Arc::clone(&table.schema),
        filter: None,
        pred_keys: vec![
            Expression::constant(3),
            Expression::constant(7),
            Expression::constant(1),
        ],
    });
    let result = execute_plan(&ctx, &plan).unwrap();
    assert_eq!(
        rows_of(&result, &table.schema),
        vec![
            ints(&[Some(1), Some(10)]),
            ints(&[Some(3), Some(30)]),
        ]
    );
}
