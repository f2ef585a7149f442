use std::collections::HashMap;
use std::fmt::Write as _;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};

use crate::catalog::Catalog;
use crate::common::{
    BrambleError, RecordId, Result, Timestamp, TxnId, TXN_START_ID,
};
use crate::storage::table::TableHeap;
use crate::tuple::{Schema, Tuple, TupleMeta};

use super::transaction::{IsolationLevel, Transaction, TransactionState, UndoLink, UndoLog};
use super::version_store::{reconstruct_tuple, undo_log_schema, VersionStore};
use super::watermark::Watermark;

/// Coordinates transaction lifecycles, commit timestamps, the version
/// store and garbage collection.
pub struct TransactionManager {
    catalog: Arc<Catalog>,
    next_txn_id: AtomicU64,
    txn_map: RwLock<HashMap<TxnId, Arc<Transaction>>>,
    running_txns: Mutex<Watermark>,
    last_commit_ts: AtomicU64,
    /// Serializes the whole commit protocol
    commit_mutex: Mutex<()>,
    version_store: VersionStore,
}

impl TransactionManager {
    pub fn new(catalog: Arc<Catalog>) -> Self {
        Self {
            catalog,
            next_txn_id: AtomicU64::new(TXN_START_ID + 1),
            txn_map: RwLock::new(HashMap::new()),
            running_txns: Mutex::new(Watermark::new()),
            last_commit_ts: AtomicU64::new(0),
            commit_mutex: Mutex::new(()),
            version_store: VersionStore::new(),
        }
    }

    pub fn catalog(&self) -> &Arc<Catalog> {
        &self.catalog
    }

    pub fn last_commit_ts(&self) -> Timestamp {
        self.last_commit_ts.load(Ordering::Acquire)
    }

    pub fn watermark(&self) -> Timestamp {
        self.running_txns.lock().watermark()
    }

    /// Starts a transaction reading as of the last committed timestamp.
    pub fn begin(&self, isolation_level: IsolationLevel) -> Arc<Transaction> {
        let mut txn_map = self.txn_map.write();
        let txn_id = self.next_txn_id.fetch_add(1, Ordering::AcqRel);

        // The snapshot is taken under the watermark lock so a commit
        // cannot advance its own commit-ts bookkeeping in between.
        let mut running = self.running_txns.lock();
        let read_ts = self.last_commit_ts.load(Ordering::Acquire);
        running.add_txn(read_ts);
        drop(running);

        let txn = Arc::new(Transaction::new(txn_id, read_ts, isolation_level));
        txn_map.insert(txn_id, Arc::clone(&txn));
        txn
    }

    pub fn get_txn(&self, txn_id: TxnId) -> Option<Arc<Transaction>> {
        self.txn_map.read().get(&txn_id).cloned()
    }

    /// Hook for serializable validation. The current implementation
    /// admits every transaction.
    pub fn verify_txn(&self, _txn: &Transaction) -> bool {
        true
    }

    /// Commits: stamps every written tuple with the new commit timestamp
    /// and publishes it by advancing `last_commit_ts`.
    pub fn commit(&self, txn: &Arc<Transaction>) -> Result<bool> {
        let commit_guard = self.commit_mutex.lock();

        if txn.state() != TransactionState::Running {
            return Err(BrambleError::TxnNotRunning);
        }

        let commit_ts = self.last_commit_ts.load(Ordering::Acquire) + 1;

        if txn.isolation_level() == IsolationLevel::Serializable && !self.verify_txn(txn) {
            drop(commit_guard);
            self.abort(txn)?;
            return Ok(false);
        }

        for (oid, rids) in txn.write_set_snapshot() {
            let table = self.catalog.get_table(oid).ok_or_else(|| {
                BrambleError::Execution(format!("write set references unknown table {oid}"))
            })?;
            for rid in rids {
                let is_deleted = table.heap.get_tuple_meta(rid)?.is_deleted;
                table
                    .heap
                    .update_tuple_meta(TupleMeta::new(commit_ts, is_deleted), rid)?;
            }
        }

        txn.set_commit_ts(commit_ts);
        txn.set_state(TransactionState::Committed);
        self.last_commit_ts.fetch_add(1, Ordering::AcqRel);

        let mut running = self.running_txns.lock();
        running.update_commit_ts(commit_ts);
        running.remove_txn(txn.read_ts());
        Ok(true)
    }

    /// Aborts a running or tainted transaction. Heap tuples already
    /// stamped with the temp timestamp are left as-is; other writers
    /// treat them as conflicts until they are overwritten.
    pub fn abort(&self, txn: &Arc<Transaction>) -> Result<()> {
        match txn.state() {
            TransactionState::Running | TransactionState::Tainted => {}
            _ => return Err(BrambleError::TxnNotRunning),
        }

        txn.set_state(TransactionState::Aborted);
        self.running_txns.lock().remove_txn(txn.read_ts());
        Ok(())
    }

    /// Stop-the-world sweep: drops terminal transactions whose undo logs
    /// no live reader can reach anymore.
    pub fn garbage_collection(&self) {
        let watermark = self.running_txns.lock().watermark();
        let mut txn_map = self.txn_map.write();
        let before = txn_map.len();

        txn_map.retain(|_, txn| {
            let reclaimable = matches!(
                txn.state(),
                TransactionState::Committed | TransactionState::Aborted
            ) && (txn.undo_log_count() == 0 || txn.commit_ts() < watermark);
            !reclaimable
        });

        log::info!(
            "gc reclaimed {} transactions below watermark {watermark}",
            before - txn_map.len()
        );
    }

    pub fn undo_link(&self, rid: RecordId) -> Option<UndoLink> {
        self.version_store.undo_link(rid)
    }

    pub fn set_undo_link(&self, rid: RecordId, link: Option<UndoLink>) {
        self.version_store.set_undo_link(rid, link);
    }

    /// Resolves an undo link to its log. A dangling link (the owning
    /// transaction was collected) ends the chain.
    pub fn get_undo_log(&self, link: UndoLink) -> Option<UndoLog> {
        let txn = self.txn_map.read().get(&link.prev_txn).cloned()?;
        txn.undo_log(link.prev_log_idx)
    }

    /// Gathers the undo logs needed to roll a tuple back to `txn`'s read
    /// timestamp. An empty vector means the base tuple itself is
    /// readable; None means the tuple did not exist at that time.
    pub fn collect_undo_logs(
        &self,
        base_meta: TupleMeta,
        undo_link: Option<UndoLink>,
        txn: &Transaction,
    ) -> Option<Vec<UndoLog>> {
        if txn.temp_ts() == base_meta.ts || txn.read_ts() >= base_meta.ts {
            return Some(Vec::new());
        }

        let mut logs = Vec::new();
        let mut link = undo_link;
        while let Some(current) = link {
            let log = self.get_undo_log(current)?;
            link = log.prev_version;
            let log_ts = log.ts;
            logs.push(log);
            if txn.read_ts() >= log_ts {
                return Some(logs);
            }
        }
        None
    }

    /// The MVCC read path: the version of the tuple at `rid` visible to
    /// `txn`, or None when it is invisible at the transaction's snapshot.
    pub fn readable_tuple(
        &self,
        schema: &Schema,
        base_tuple: &Tuple,
        base_meta: TupleMeta,
        txn: &Transaction,
    ) -> Option<Tuple> {
        let undo_link = self.undo_link(base_tuple.rid());
        let logs = self.collect_undo_logs(base_meta, undo_link, txn)?;
        reconstruct_tuple(schema, base_tuple, base_meta, &logs)
    }

    /// Publishes a new tuple version: links the undo record first, then
    /// stamps the heap. `expected` guards against a concurrent writer
    /// slipping in between the caller's read and this write.
    pub fn update_tuple_and_undo_link(
        &self,
        heap: &TableHeap,
        rid: RecordId,
        link: Option<UndoLink>,
        meta: TupleMeta,
        tuple: &Tuple,
        expected: Option<TupleMeta>,
    ) -> Result<()> {
        self.version_store.set_undo_link(rid, link);
        heap.update_tuple_in_place(meta, tuple, rid, expected)
    }

    /// Renders the heap with its version chains, for debugging MVCC
    /// state. Temp timestamps print as `ts=N*`.
    pub fn debug_dump(&self, info: &str, schema: &Schema, heap: &Arc<TableHeap>) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "debug_dump: {info}");

        for (rid, meta, tuple) in heap.iter() {
            let _ = write!(out, "RID={rid} ts={}{} ", meta.readable_ts(),
                if meta.is_temp() { "*" } else { "" });
            if meta.is_deleted {
                let _ = writeln!(out, "<del>");
            } else {
                let _ = writeln!(out, "{}", tuple.to_display(schema));
            }

            let mut link = self.undo_link(rid);
            while let Some(current) = link {
                let Some(log) = self.get_undo_log(current) else {
                    break;
                };
                let _ = write!(
                    out,
                    "  txn{}@{} ts={} ",
                    current.prev_txn ^ TXN_START_ID,
                    current.prev_log_idx,
                    log.ts
                );
                if log.is_deleted {
                    let _ = writeln!(out, "<del>");
                } else {
                    let (log_schema, attrs) = undo_log_schema(schema, &log);
                    let rendered: Vec<String> = (0..schema.column_count())
                        .map(|i| match attrs.iter().position(|&a| a == i) {
                            Some(j) => log.tuple.value(&log_schema, j).to_string(),
                            None => "_".to_string(),
                        })
                        .collect();
                    let _ = writeln!(out, "({})", rendered.join(", "));
                }
                link = log.prev_version;
            }
        }
        out
    }
}
