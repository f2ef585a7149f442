use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::{Mutex, RwLock};

use crate::common::{RecordId, TableOid, Timestamp, TxnId, INVALID_TS, TXN_START_ID};
use crate::tuple::Tuple;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IsolationLevel {
    SnapshotIsolation,
    Serializable,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionState {
    Running,
    /// Hit a write-write conflict; the statement unwound and only Abort
    /// remains legal.
    Tainted,
    Committed,
    Aborted,
}

/// Points at one undo log inside the owning transaction's log vector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct UndoLink {
    pub prev_txn: TxnId,
    pub prev_log_idx: usize,
}

/// A compact pre-image: enough of the overwritten tuple to walk one step
/// back in time.
#[derive(Debug, Clone)]
pub struct UndoLog {
    /// The tuple did not exist before this version
    pub is_deleted: bool,
    /// Which columns the partial tuple carries
    pub modified_fields: Vec<bool>,
    /// Projection of the pre-image over the modified columns
    pub tuple: Tuple,
    /// Timestamp the pre-image belonged to
    pub ts: Timestamp,
    /// Next-older version, or None at the end of the chain
    pub prev_version: Option<UndoLink>,
}

/// A transaction. Shared via Arc between the manager and executors;
/// mutable pieces sit behind their own locks.
pub struct Transaction {
    txn_id: TxnId,
    isolation_level: IsolationLevel,
    read_ts: Timestamp,
    commit_ts: AtomicU64,
    state: Mutex<TransactionState>,
    write_set: Mutex<HashMap<TableOid, HashSet<RecordId>>>,
    undo_logs: RwLock<Vec<UndoLog>>,
}

impl Transaction {
    pub(crate) fn new(txn_id: TxnId, read_ts: Timestamp, isolation_level: IsolationLevel) -> Self {
        assert!(txn_id >= TXN_START_ID);
        Self {
            txn_id,
            isolation_level,
            read_ts,
            commit_ts: AtomicU64::new(INVALID_TS),
            state: Mutex::new(TransactionState::Running),
            write_set: Mutex::new(HashMap::new()),
            undo_logs: RwLock::new(Vec::new()),
        }
    }

    pub fn txn_id(&self) -> TxnId {
        self.txn_id
    }

    /// The small per-session number humans see in dumps.
    pub fn human_id(&self) -> u64 {
        self.txn_id ^ TXN_START_ID
    }

    /// The tentative timestamp this transaction stamps its writes with.
    pub fn temp_ts(&self) -> Timestamp {
        self.txn_id
    }

    pub fn read_ts(&self) -> Timestamp {
        self.read_ts
    }

    pub fn commit_ts(&self) -> Timestamp {
        self.commit_ts.load(Ordering::Acquire)
    }

    pub(crate) fn set_commit_ts(&self, ts: Timestamp) {
        self.commit_ts.store(ts, Ordering::Release);
    }

    pub fn isolation_level(&self) -> IsolationLevel {
        self.isolation_level
    }

    pub fn state(&self) -> TransactionState {
        *self.state.lock()
    }

    pub(crate) fn set_state(&self, state: TransactionState) {
        *self.state.lock() = state;
    }

    /// Marks the transaction tainted ahead of raising a write conflict.
    pub fn set_tainted(&self) {
        let mut state = self.state.lock();
        if *state == TransactionState::Running {
            *state = TransactionState::Tainted;
        }
    }

    pub fn append_write_set(&self, oid: TableOid, rid: RecordId) {
        self.write_set.lock().entry(oid).or_default().insert(rid);
    }

    pub fn in_write_set(&self, oid: TableOid, rid: RecordId) -> bool {
        self.write_set
            .lock()
            .get(&oid)
            .is_some_and(|rids| rids.contains(&rid))
    }

    pub fn write_set_snapshot(&self) -> Vec<(TableOid, Vec<RecordId>)> {
        self.write_set
            .lock()
            .iter()
            .map(|(oid, rids)| (*oid, rids.iter().copied().collect()))
            .collect()
    }

    /// Appends an undo log and returns the link other versions use to
    /// reach it.
    pub fn append_undo_log(&self, log: UndoLog) -> UndoLink {
        let mut logs = self.undo_logs.write();
        logs.push(log);
        UndoLink {
            prev_txn: self.txn_id,
            prev_log_idx: logs.len() - 1,
        }
    }

    /// Replaces an existing undo log in place (repeated self-writes).
    pub fn modify_undo_log(&self, index: usize, log: UndoLog) {
        self.undo_logs.write()[index] = log;
    }

    pub fn undo_log(&self, index: usize) -> Option<UndoLog> {
        self.undo_logs.read().get(index).cloned()
    }

    pub fn undo_log_count(&self) -> usize {
        self.undo_logs.read().len()
    }
}
