use thiserror::Error;

use super::types::{FrameId, PageId, RecordId};

/// Database error types
#[derive(Error, Debug)]
pub enum BrambleError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Page {0} not found")]
    PageNotFound(PageId),

    #[error("Frame {0} not found")]
    FrameNotFound(FrameId),

    #[error("Buffer pool is full, no evictable frames available")]
    BufferPoolFull,

    #[error("Invalid page ID: {0}")]
    InvalidPageId(PageId),

    #[error("Page {0} is still pinned")]
    PageStillPinned(PageId),

    #[error("Disk scheduler error: {0}")]
    DiskScheduler(String),

    #[error("Page is full")]
    PageFull,

    #[error("Tuple too large: {tuple_size} bytes does not fit in a page ({available} free)")]
    TupleTooLarge { tuple_size: usize, available: usize },

    #[error("Invalid record id: {0}")]
    InvalidRecordId(RecordId),

    #[error("Duplicate key")]
    DuplicateKey,

    #[error("Table {0} not found")]
    TableNotFound(String),

    #[error("Index {0} not found")]
    IndexNotFound(String),

    #[error("Transaction is not in a runnable state")]
    TxnNotRunning,

    #[error("Write-write conflict: {0}")]
    WriteConflict(String),

    #[error("Execution error: {0}")]
    Execution(String),
}

pub type Result<T> = std::result::Result<T, BrambleError>;
