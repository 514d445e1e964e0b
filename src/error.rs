//! Error types for txfs.
//!
//! All operations return `Result<T>` which aliases `Result<T, TxError>`.

use crate::txn::{EnlistmentNotification, TransactionStatus};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;

/// Errors from transactional file operations and the coordinator.
#[derive(Debug, Error)]
pub enum TxError {
    /// Enlistment requested with anything but `EnlistmentOptions::None`.
    #[error("Enlistment options must be None")]
    InvalidEnlistmentOptions,

    /// Protocol phase invoked on a transaction in the wrong state.
    #[error("Cannot {action} transaction, as it is not active. Transaction status: {status}")]
    InvalidState {
        action: &'static str,
        status: TransactionStatus,
    },

    /// `complete()` called twice on the same scope.
    #[error("Complete has already been called")]
    AlreadyCompleted,

    /// A scope is already current on this thread.
    #[error("An ambient transaction is already active on this thread")]
    AmbientTransactionActive,

    /// Directory created by the transaction gained content before rollback.
    #[error("Failed to delete directory {0}. Directory was not empty")]
    DirectoryNotEmpty(PathBuf),

    /// A participant could not undo its journal.
    #[error("Failed to roll back: {source}")]
    RollbackFailed {
        #[source]
        source: Box<TxError>,
    },

    /// One or more participants failed during the coordinator's rollback sweep.
    #[error(transparent)]
    Rollback(#[from] RollbackError),

    /// File system operation failed.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// Unexpected error.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Result type alias for txfs operations.
pub type Result<T> = std::result::Result<T, TxError>;

/// A participant whose rollback callback failed, with the failure.
#[derive(Debug)]
pub struct FailedParticipant {
    pub participant: Arc<dyn EnlistmentNotification>,
    pub error: TxError,
}

/// Aggregate of every rollback failure seen during one sweep.
///
/// Raised only after all participants were asked to roll back.
#[derive(Debug)]
pub struct RollbackError {
    failed: Vec<FailedParticipant>,
}

impl RollbackError {
    pub(crate) fn new(failed: Vec<FailedParticipant>) -> Self {
        Self { failed }
    }

    /// Participants that failed, in the order they were visited.
    pub fn failed_participants(&self) -> &[FailedParticipant] {
        &self.failed
    }
}

impl fmt::Display for RollbackError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Rollback failed for {} participant{}",
            self.failed.len(),
            if self.failed.len() == 1 { "" } else { "s" }
        )?;
        for (i, failed) in self.failed.iter().enumerate() {
            let sep = if i == 0 { ": " } else { "; " };
            write!(f, "{sep}{}", failed.error)?;
        }
        Ok(())
    }
}

impl std::error::Error for RollbackError {}
