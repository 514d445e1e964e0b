//! Ambient transaction lifecycle.
//!
//! A [`TransactionScope`] creates a transaction and publishes it as the
//! current thread's ambient transaction until the scope is released. On
//! release the transaction is either already resolved by
//! [`complete`](TransactionScope::complete) or rolled back. This holds on
//! every exit path, including early returns and panics.

use super::transaction::{Transaction, TransactionStatus};
use crate::error::{Result, TxError};

use std::marker::PhantomData;
use std::sync::Arc;

/// Owns the ambient transaction for the current thread.
///
/// The ambient slot is thread-local, so a scope must be released on the
/// thread that opened it and cannot be sent elsewhere:
///
/// ```compile_fail
/// use txfs::txn::TransactionScope;
///
/// let scope = TransactionScope::new().unwrap();
/// std::thread::spawn(move || drop(scope));
/// ```
#[must_use = "TransactionScope must be completed, or it rolls back when dropped"]
pub struct TransactionScope {
    transaction: Arc<Transaction>,
    completed: bool,
    released: bool,
    _not_send: PhantomData<*const ()>,
}

impl TransactionScope {
    /// Creates a transaction and makes it the ambient transaction.
    ///
    /// Fails if this thread already has an ambient transaction.
    pub fn new() -> Result<Self> {
        if Transaction::current().is_some() {
            return Err(TxError::AmbientTransactionActive);
        }

        let transaction = Transaction::new();
        Transaction::set_current(Some(Arc::clone(&transaction)));
        log::debug!("{}: scope opened", transaction.id());

        Ok(Self {
            transaction,
            completed: false,
            released: false,
            _not_send: PhantomData,
        })
    }

    pub fn transaction(&self) -> &Arc<Transaction> {
        &self.transaction
    }

    pub fn is_completed(&self) -> bool {
        self.completed
    }

    /// Polls participants and commits if all of them voted to commit.
    ///
    /// If a participant voted against committing while the transaction is
    /// still active, the transaction is rolled back here. Returns the
    /// resulting status.
    pub fn complete(&mut self) -> Result<TransactionStatus> {
        if self.completed {
            return Err(TxError::AlreadyCompleted);
        }

        let vote_to_commit = self.transaction.prepare()?;
        self.completed = true;

        if self.transaction.status().is_active() {
            if vote_to_commit {
                self.transaction.commit()?;
            } else {
                log::warn!("{}: participant voted to roll back", self.transaction.id());
                self.transaction.rollback()?;
            }
        }

        Ok(self.transaction.status())
    }

    /// Releases the scope, surfacing any rollback error.
    ///
    /// Rolls back unless [`complete`](Self::complete) was called. The ambient
    /// transaction is cleared regardless of the outcome.
    pub fn dispose(mut self) -> Result<()> {
        self.release()
    }

    fn release(&mut self) -> Result<()> {
        if self.released {
            return Ok(());
        }
        self.released = true;

        let result = if self.completed {
            Ok(())
        } else {
            log::info!("{}: scope released without completion, rolling back", self.transaction.id());
            self.transaction.rollback()
        };

        Transaction::set_current(None);
        result
    }
}

impl Drop for TransactionScope {
    fn drop(&mut self) {
        if let Err(e) = self.release() {
            log::error!("{}: rollback on scope release failed: {}", self.transaction.id(), e);
        }
    }
}
