use std::sync::Arc;

use bramble::buffer::BufferPoolManager;
use bramble::catalog::Catalog;
use bramble::execution::{
    execute_plan, ExecutorContext, Expression, InsertPlan, PlanNode, SeqScanPlan, ValuesPlan,
};
use bramble::optimizer::optimize;
use bramble::storage::disk::DiskManager;
use bramble::tuple::{DataType, Schema, Value};
use bramble::txn::{IsolationLevel, TransactionManager};

/// Small end-to-end demo: create a table with a primary key, insert a
/// few rows, and scan them back through the MVCC read path.
fn main() -> bramble::Result<()> {
    env_logger::init();

    let disk_manager = Arc::new(DiskManager::new("bramble-demo.db")?);
    let bpm = Arc::new(BufferPoolManager::new(128, 2, disk_manager));
    let catalog = Arc::new(Catalog::new(bpm));
    let txn_mgr = Arc::new(TransactionManager::new(Arc::clone(&catalog)));

    let schema = Schema::builder()
        .column("id", DataType::Integer)
        .column("score", DataType::Integer)
        .build();
    let table = catalog.create_table("players", schema)?;
    catalog.create_index("players_pk", "players", vec![0], true, 64, 64)?;

    let txn = txn_mgr.begin(IsolationLevel::SnapshotIsolation);
    let ctx = ExecutorContext::new(
        Arc::clone(&catalog),
        Arc::clone(&txn_mgr),
        Arc::clone(&txn),
    );

    let rows: Vec<Vec<Expression>> = (1..=5)
        .map(|i| {
            vec![
                Expression::constant(Value::Integer(i)),
                Expression::constant(Value::Integer(i * 100)),
            ]
        })
        .collect();
    let insert = PlanNode::Insert(InsertPlan {
        table_oid: table.oid,
        child: Box::new(PlanNode::Values(ValuesPlan {
            rows,
            output_schema: Arc::clone(&table.schema),
        })),
        output_schema: Schema::builder().column("count", DataType::Integer).build_arc(),
    });
    let result = execute_plan(&ctx, &insert)?;
    println!(
        "inserted {} rows",
        result[0].value(&insert.output_schema(), 0)
    );
    txn_mgr.commit(&txn)?;

    let reader = txn_mgr.begin(IsolationLevel::SnapshotIsolation);
    let ctx = ExecutorContext::new(Arc::clone(&catalog), Arc::clone(&txn_mgr), reader);

    let scan = PlanNode::SeqScan(SeqScanPlan {
        table_oid: table.oid,
        table_name: table.name.clone(),
        output_schema: Arc::clone(&table.schema),
        filter: None,
    });
    let scan = optimize(scan, &catalog);
    for tuple in execute_plan(&ctx, &scan)? {
        println!("{}", tuple.to_display(&table.schema));
    }

    Ok(())
}
