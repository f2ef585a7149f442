use std::sync::Arc;

use bramble::catalog::{Catalog, TableInfo};
use bramble::common::BrambleError;
use bramble::buffer::BufferPoolManager;
use bramble::execution::{
    execute_plan, DeletePlan, Expression, ExecutorContext, InsertPlan, PlanNode, SeqScanPlan,
    UpdatePlan, ValuesPlan,
};
use bramble::storage::disk::DiskManager;
use bramble::tuple::{DataType, Schema, Tuple, Value};
use bramble::txn::{IsolationLevel, Transaction, TransactionManager, TransactionState};
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
        .column("id", DataType::Integer)
        .column("v", DataType::Integer)
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

fn insert_rows(
    ctx: &Arc<ExecutorContext>,
    table: &Arc<TableInfo>,
    rows: &[(i32, i32)],
) -> bramble::Result<i32> {
    let rows = rows
        .iter()
        .map(|&(id, v)| {
            vec![
                Expression::constant(Value::Integer(id)),
                Expression::constant(Value::Integer(v)),
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
    let result = execute_plan(ctx, &plan)?;
    match result[0].value(&count_schema(), 0) {
        Value::Integer(count) => Ok(count),
        other => panic!("unexpected count {other}"),
    }
}

fn seq_scan_plan(table: &Arc<TableInfo>, filter: Option<Expression>) -> PlanNode {
    PlanNode::SeqScan(SeqScanPlan {
        table_oid: table.oid,
        table_name: table.name.clone(),
        output_schema: Arc::clone(&table.schema),
        filter,
    })
}

fn scan_rows(ctx: &Arc<ExecutorContext>, table: &Arc<TableInfo>) -> Vec<(i32, i32)> {
    let mut rows: Vec<(i32, i32)> = execute_plan(ctx, &seq_scan_plan(table, None))
        .unwrap()
        .iter()
        .map(|t| row_of(t, &table.schema))
        .collect();
    rows.sort_unstable();
    rows
}

fn row_of(tuple: &Tuple, schema: &Schema) -> (i32, i32) {
    match (tuple.value(schema, 0), tuple.value(schema, 1)) {
        (Value::Integer(a), Value::Integer(b)) => (a, b),
        other => panic!("unexpected row {other:?}"),
    }
}

fn delete_where_id(
    ctx: &Arc<ExecutorContext>,
    table: &Arc<TableInfo>,
    id: i32,
) -> bramble::Result<Vec<Tuple>> {
    let filter = Expression::equals(Expression::column(0), Expression::constant(id));
    let plan = PlanNode::Delete(DeletePlan {
        table_oid: table.oid,
        child: Box::new(seq_scan_plan(table, Some(filter))),
        output_schema: count_schema(),
    });
    execute_plan(ctx, &plan)
}

fn update_v_where_id(
    ctx: &Arc<ExecutorContext>,
    table: &Arc<TableInfo>,
    id: i32,
    new_v: i32,
) -> bramble::Result<Vec<Tuple>> {
    let filter = Expression::equals(Expression::column(0), Expression::constant(id));
    let plan = PlanNode::Update(UpdatePlan {
        table_oid: table.oid,
        child: Box::new(seq_scan_plan(table, Some(filter))),
        target_expressions: vec![Expression::column(0), Expression::constant(new_v)],
        output_schema: count_schema(),
    });
    execute_plan(ctx, &plan)
}

#[test]
fn test_seq_scan_snapshot_visibility() {
    // Insert {1,2,3}, commit. A reader that started before a later
    // delete of row 2 keeps seeing all three rows; a reader that starts
    // after sees two.
    let (catalog, txn_mgr, _temp) = setup();
    let table = catalog.create_table("t", two_ints()).unwrap();

    let t1 = txn_mgr.begin(IsolationLevel::SnapshotIsolation);
    let ctx1 = ctx_for(&catalog, &txn_mgr, &t1);
    assert_eq!(
        insert_rows(&ctx1, &table, &[(1, 10), (2, 20), (3, 30)]).unwrap(),
        3
    );
    assert!(txn_mgr.commit(&t1).unwrap());
    assert_eq!(t1.commit_ts(), 1);

    let t2 = txn_mgr.begin(IsolationLevel::SnapshotIsolation);
    assert_eq!(t2.read_ts(), 1);
    let ctx2 = ctx_for(&catalog, &txn_mgr, &t2);

    let t3 = txn_mgr.begin(IsolationLevel::SnapshotIsolation);
    let ctx3 = ctx_for(&catalog, &txn_mgr, &t3);
    delete_where_id(&ctx3, &table, 2).unwrap();
    assert!(txn_mgr.commit(&t3).unwrap());
    assert_eq!(t3.commit_ts(), 2);

    // T2 reads its snapshot through the undo chain.
    assert_eq!(scan_rows(&ctx2, &table), vec![(1, 10), (2, 20), (3, 30)]);

    let t4 = txn_mgr.begin(IsolationLevel::SnapshotIsolation);
    let ctx4 = ctx_for(&catalog, &txn_mgr, &t4);
    assert_eq!(scan_rows(&ctx4, &table), vec![(1, 10), (3, 30)]);
}

#[test]
fn test_uncommitted_writes_invisible_to_others() {
    let (catalog, txn_mgr, _temp) = setup();
    let table = catalog.create_table("t", two_ints()).unwrap();

    let writer = txn_mgr.begin(IsolationLevel::SnapshotIsolation);
    let wctx = ctx_for(&catalog, &txn_mgr, &writer);
    insert_rows(&wctx, &table, &[(1, 10)]).unwrap();

    let reader = txn_mgr.begin(IsolationLevel::SnapshotIsolation);
    let rctx = ctx_for(&catalog, &txn_mgr, &reader);
    assert_eq!(scan_rows(&rctx, &table), vec![]);

    // The writer itself sees its tentative row.
    assert_eq!(scan_rows(&wctx, &table), vec![(1, 10)]);

    assert!(txn_mgr.commit(&writer).unwrap());
    // Still invisible to the old snapshot.
    assert_eq!(scan_rows(&rctx, &table), vec![]);

    let late = txn_mgr.begin(IsolationLevel::SnapshotIsolation);
    let lctx = ctx_for(&catalog, &txn_mgr, &late);
    assert_eq!(scan_rows(&lctx, &table), vec![(1, 10)]);
}

#[test]
fn test_update_reconstructs_old_version_for_old_readers() {
    let (catalog, txn_mgr, _temp) = setup();
    let table = catalog.create_table("t", two_ints()).unwrap();

    let t1 = txn_mgr.begin(IsolationLevel::SnapshotIsolation);
    insert_rows(&ctx_for(&catalog, &txn_mgr, &t1), &table, &[(1, 10)]).unwrap();
    txn_mgr.commit(&t1).unwrap();

    let old_reader = txn_mgr.begin(IsolationLevel::SnapshotIsolation);
    let old_ctx = ctx_for(&catalog, &txn_mgr, &old_reader);

    let updater = txn_mgr.begin(IsolationLevel::SnapshotIsolation);
    let uctx = ctx_for(&catalog, &txn_mgr, &updater);
    update_v_where_id(&uctx, &table, 1, 99).unwrap();
    // Repeated self-update merges into the same undo log.
    update_v_where_id(&uctx, &table, 1, 100).unwrap();
    txn_mgr.commit(&updater).unwrap();

    // The old reader still reconstructs the original image.
    assert_eq!(scan_rows(&old_ctx, &table), vec![(1, 10)]);

    let fresh = txn_mgr.begin(IsolationLevel::SnapshotIsolation);
    let fctx = ctx_for(&catalog, &txn_mgr, &fresh);
    assert_eq!(scan_rows(&fctx, &table), vec![(1, 100)]);
}

#[test]
fn test_write_write_conflict_taints() {
    let (catalog, txn_mgr, _temp) = setup();
    let table = catalog.create_table("t", two_ints()).unwrap();

    let t1 = txn_mgr.begin(IsolationLevel::SnapshotIsolation);
    insert_rows(&ctx_for(&catalog, &txn_mgr, &t1), &table, &[(1, 10)]).unwrap();
    txn_mgr.commit(&t1).unwrap();

    let a = txn_mgr.begin(IsolationLevel::SnapshotIsolation);
    let b = txn_mgr.begin(IsolationLevel::SnapshotIsolation);
    let actx = ctx_for(&catalog, &txn_mgr, &a);
    let bctx = ctx_for(&catalog, &txn_mgr, &b);

    update_v_where_id(&actx, &table, 1, 20).unwrap();

    let result = update_v_where_id(&bctx, &table, 1, 30);
    assert!(matches!(result, Err(BrambleError::WriteConflict(_))));
    assert_eq!(b.state(), TransactionState::Tainted);
    txn_mgr.abort(&b).unwrap();
    assert_eq!(b.state(), TransactionState::Aborted);

    assert!(txn_mgr.commit(&a).unwrap());
    let fresh = txn_mgr.begin(IsolationLevel::SnapshotIsolation);
    let fctx = ctx_for(&catalog, &txn_mgr, &fresh);
    assert_eq!(scan_rows(&fctx, &table), vec![(1, 20)]);
}

#[test]
fn test_commit_ts_monotonic() {
    let (catalog, txn_mgr, _temp) = setup();
    let table = catalog.create_table("t", two_ints()).unwrap();

    let mut last = 0;
    for i in 0..5 {
        let txn = txn_mgr.begin(IsolationLevel::SnapshotIsolation);
        insert_rows(&ctx_for(&catalog, &txn_mgr, &txn), &table, &[(i, i)]).unwrap();
        assert!(txn_mgr.commit(&txn).unwrap());
        assert!(txn.commit_ts() > last);
        last = txn.commit_ts();
    }
    assert_eq!(txn_mgr.last_commit_ts(), last);
}

#[test]
fn test_watermark_tracks_running_txns() {
    let (catalog, txn_mgr, _temp) = setup();
    let table = catalog.create_table("t", two_ints()).unwrap();

    assert_eq!(txn_mgr.watermark(), 0);

    let t1 = txn_mgr.begin(IsolationLevel::SnapshotIsolation);
    insert_rows(&ctx_for(&catalog, &txn_mgr, &t1), &table, &[(1, 1)]).unwrap();
    txn_mgr.commit(&t1).unwrap();

    // Nothing running: the watermark rides last_commit_ts.
    assert_eq!(txn_mgr.watermark(), 1);

    let t2 = txn_mgr.begin(IsolationLevel::SnapshotIsolation);
    assert_eq!(txn_mgr.watermark(), 1);

    let t3 = txn_mgr.begin(IsolationLevel::SnapshotIsolation);
    insert_rows(&ctx_for(&catalog, &txn_mgr, &t3), &table, &[(2, 2)]).unwrap();
    txn_mgr.commit(&t3).unwrap();
    // T2 still pins the watermark at its read ts.
    assert_eq!(txn_mgr.watermark(), 1);

    txn_mgr.abort(&t2).unwrap();
    assert_eq!(txn_mgr.watermark(), 2);
}

#[test]
fn test_garbage_collection_reclaims_unreachable_txns() {
    let (catalog, txn_mgr, _temp) = setup();
    let table = catalog.create_table("t", two_ints()).unwrap();

    // Insert-only transaction: no undo logs, reclaimable right away.
    let t1 = txn_mgr.begin(IsolationLevel::SnapshotIsolation);
    let t1_id = t1.txn_id();
    insert_rows(&ctx_for(&catalog, &txn_mgr, &t1), &table, &[(1, 10)]).unwrap();
    txn_mgr.commit(&t1).unwrap();

    // Updating transaction: holds the undo log for (1, 10).
    let t2 = txn_mgr.begin(IsolationLevel::SnapshotIsolation);
    let t2_id = t2.txn_id();
    update_v_where_id(&ctx_for(&catalog, &txn_mgr, &t2), &table, 1, 20).unwrap();
    txn_mgr.commit(&t2).unwrap();

    // A reader that may still need t2's undo log.
    let pinner = txn_mgr.begin(IsolationLevel::SnapshotIsolation);

    txn_mgr.garbage_collection();
    assert!(txn_mgr.get_txn(t1_id).is_none());
    assert!(txn_mgr.get_txn(t2_id).is_some());

    txn_mgr.abort(&pinner).unwrap();
    let t3 = txn_mgr.begin(IsolationLevel::SnapshotIsolation);
    insert_rows(&ctx_for(&catalog, &txn_mgr, &t3), &table, &[(9, 9)]).unwrap();
    txn_mgr.commit(&t3).unwrap();

    txn_mgr.garbage_collection();
    assert!(txn_mgr.get_txn(t2_id).is_none());
}

#[test]
fn test_primary_key_tombstone_reuse() {
    let (catalog, txn_mgr, _temp) = setup();
    let table = catalog.create_table("t", two_ints()).unwrap();
    catalog
        .create_index("t_pk", "t", vec![0], true, 16, 16)
        .unwrap();

    let t1 = txn_mgr.begin(IsolationLevel::SnapshotIsolation);
    insert_rows(&ctx_for(&catalog, &txn_mgr, &t1), &table, &[(1, 10)]).unwrap();
    txn_mgr.commit(&t1).unwrap();

    // Duplicate insert conflicts and taints.
    let dup = txn_mgr.begin(IsolationLevel::SnapshotIsolation);
    let dctx = ctx_for(&catalog, &txn_mgr, &dup);
    let result = insert_rows(&dctx, &table, &[(1, 99)]);
    assert!(matches!(result, Err(BrambleError::WriteConflict(_))));
    assert_eq!(dup.state(), TransactionState::Tainted);
    txn_mgr.abort(&dup).unwrap();

    // Delete then re-insert the same key: the tombstoned slot is reused.
    let t2 = txn_mgr.begin(IsolationLevel::SnapshotIsolation);
    delete_where_id(&ctx_for(&catalog, &txn_mgr, &t2), &table, 1).unwrap();
    txn_mgr.commit(&t2).unwrap();

    let t3 = txn_mgr.begin(IsolationLevel::SnapshotIsolation);
    let ctx3 = ctx_for(&catalog, &txn_mgr, &t3);
    assert_eq!(insert_rows(&ctx3, &table, &[(1, 20)]).unwrap(), 1);
    txn_mgr.commit(&t3).unwrap();

    let fresh = txn_mgr.begin(IsolationLevel::SnapshotIsolation);
    let fctx = ctx_for(&catalog, &txn_mgr, &fresh);
    assert_eq!(scan_rows(&fctx, &table), vec![(1, 20)]);
}

#[test]
fn test_delete_then_insert_same_txn() {
    let (catalog, txn_mgr, _temp) = setup();
    let table = catalog.create_table("t", two_ints()).unwrap();
    catalog
        .create_index("t_pk", "t", vec![0], true, 16, 16)
        .unwrap();

    let t1 = txn_mgr.begin(IsolationLevel::SnapshotIsolation);
    insert_rows(&ctx_for(&catalog, &txn_mgr, &t1), &table, &[(7, 70)]).unwrap();
    txn_mgr.commit(&t1).unwrap();

    let old_reader = txn_mgr.begin(IsolationLevel::SnapshotIsolation);
    let octx = ctx_for(&catalog, &txn_mgr, &old_reader);

    let t2 = txn_mgr.begin(IsolationLevel::SnapshotIsolation);
    let ctx2 = ctx_for(&catalog, &txn_mgr, &t2);
    delete_where_id(&ctx2, &table, 7).unwrap();
    assert_eq!(scan_rows(&ctx2, &table), vec![]);
    insert_rows(&ctx2, &table, &[(7, 71)]).unwrap();
    assert_eq!(scan_rows(&ctx2, &table), vec![(7, 71)]);
    txn_mgr.commit(&t2).unwrap();

    // The pre-existing snapshot still sees the original row.
    assert_eq!(scan_rows(&octx, &table), vec![(7, 70)]);
}
