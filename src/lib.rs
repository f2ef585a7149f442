//! Bramble - a disk-backed multi-version relational execution engine
//!
//! The engine stores data in a single page file and caches pages in a
//! fixed-size buffer pool. On top of that sit a concurrent B+Tree index,
//! an MVCC transaction layer with per-tuple undo chains, and a pull-based
//! executor tree for the core relational operators.
//!
//! # Architecture
//!
//! - **Storage** (`storage`): disk manager over one append-growable page
//!   file, a sharded asynchronous disk scheduler with per-shard FIFO
//!   ordering, slotted table pages with per-tuple `(ts, is_deleted)`
//!   metadata, and the table heap.
//! - **Buffer pool** (`buffer`): `BufferPoolManager` with LRU-K eviction
//!   (scan-resistant three-tier replacer), per-frame I/O-completion
//!   signals, and RAII read/write page guards.
//! - **Index** (`index`): a concurrent B+Tree using latch crabbing, plus
//!   the catalog-facing `TableIndex` wrapper.
//! - **Transactions** (`txn`): snapshot timestamps, undo-log version
//!   chains, a read-timestamp watermark, and stop-the-world garbage
//!   collection.
//! - **Execution** (`execution`): plans, expressions, and the executors
//!   for scans, DML, joins, aggregation, limit and external merge sort.
//! - **Optimizer** (`optimizer`): seq-scan-to-index-scan and
//!   NLJ-to-hash-join rewrites.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use bramble::buffer::BufferPoolManager;
//! use bramble::catalog::Catalog;
//! use bramble::storage::disk::DiskManager;
//! use bramble::tuple::{DataType, Schema};
//! use bramble::txn::{IsolationLevel, TransactionManager};
//!
//! let disk_manager = Arc::new(DiskManager::new("test.db").unwrap());
//! let bpm = Arc::new(BufferPoolManager::new(128, 2, disk_manager));
//! let catalog = Arc::new(Catalog::new(bpm));
//! let txn_mgr = Arc::new(TransactionManager::new(Arc::clone(&catalog)));
//!
//! let schema = Schema::builder()
//!     .column("id", DataType::Integer)
//!     .column("v", DataType::Integer)
//!     .build();
//! catalog.create_table("t", schema).unwrap();
//!
//! let txn = txn_mgr.begin(IsolationLevel::SnapshotIsolation);
//! // ... build plans, run executors ...
//! txn_mgr.commit(&txn).unwrap();
//! ```

pub mod buffer;
pub mod catalog;
pub mod common;
pub mod execution;
pub mod index;
pub mod optimizer;
pub mod storage;
pub mod tuple;
pub mod txn;

// Re-export commonly used types at the crate root
pub use common::{BrambleError, PageId, RecordId, Result, SlotId};
