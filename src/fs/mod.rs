//! Transactional file operations.
//!
//! [`TxFileManager`] is the entry point. Each operation runs immediately;
//! when an ambient transaction exists it is journaled first so the
//! transaction can undo it on rollback.

pub mod config;
pub mod enlistment;
pub mod journal;
pub mod manager;
pub mod tree;

pub use config::TxFileManagerConfig;
pub use enlistment::{JournalStats, TxEnlistment};
pub use journal::RollbackOperation;
pub use manager::{FileOperations, TxFileManager};
pub use tree::{copy_tree, copy_tree_with};
