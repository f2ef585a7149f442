mod transaction;
mod transaction_manager;
mod version_store;
mod watermark;

pub use transaction::{IsolationLevel, Transaction, TransactionState, UndoLink, UndoLog};
pub use transaction_manager::TransactionManager;
pub use version_store::{
    generate_new_undo_log, generate_updated_undo_log, reconstruct_tuple, undo_log_schema,
    VersionStore,
};
pub use watermark::Watermark;
