//! The transaction coordinator.
//!
//! ## Protocol
//!
//! 1. **Enlist**: participants register via [`Transaction::enlist_volatile`]
//! 2. **Prepare**: every participant votes; the votes are AND-ed
//! 3. **Commit**: participants finalize their work
//! 4. **Rollback** (instead of 3): participants undo their work
//!
//! Participants are visited in reverse enlistment order in every phase, so
//! the most recently enlisted participant unwinds first. A participant that
//! acknowledges with [`Enlistment::done`] is dropped from the transaction.
//! Any participant left unacknowledged after a phase moves the transaction
//! to [`TransactionStatus::InDoubt`] and triggers an in-doubt sweep.

use super::enlistment::{Enlistment, EnlistmentNotification, EnlistmentOptions, PreparingEnlistment};
use crate::error::{FailedParticipant, Result, RollbackError, TxError};

use parking_lot::Mutex;
use std::cell::RefCell;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_TXN_ID: AtomicU64 = AtomicU64::new(1);

thread_local! {
    static CURRENT: RefCell<Option<Arc<Transaction>>> = const { RefCell::new(None) };
}

/// Process-unique identifier of a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TransactionId(u64);

impl TransactionId {
    fn next() -> Self {
        TransactionId(NEXT_TXN_ID.fetch_add(1, Ordering::SeqCst))
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "txn_{}", self.0)
    }
}

/// Transaction lifecycle.
///
/// ```text
/// Active ──prepare/commit──> Committed
///   │            │
///   │            └─unacknowledged──> InDoubt
///   └──rollback──> Aborted
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionStatus {
    Active,
    InDoubt,
    Committed,
    Aborted,
}

impl TransactionStatus {
    pub fn is_active(&self) -> bool {
        matches!(self, TransactionStatus::Active)
    }
}

impl fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransactionStatus::Active => write!(f, "Active"),
            TransactionStatus::InDoubt => write!(f, "InDoubt"),
            TransactionStatus::Committed => write!(f, "Committed"),
            TransactionStatus::Aborted => write!(f, "Aborted"),
        }
    }
}

/// Point-in-time snapshot of a transaction's identity and status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransactionInformation {
    pub local_identifier: TransactionId,
    pub status: TransactionStatus,
}

/// A transaction coordinating any number of participants.
///
/// Has no timeout; once started it runs until it is committed, rolled back
/// or left in doubt.
pub struct Transaction {
    id: TransactionId,
    status: Mutex<TransactionStatus>,
    participants: Mutex<Vec<Arc<dyn EnlistmentNotification>>>,
}

impl Transaction {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            id: TransactionId::next(),
            status: Mutex::new(TransactionStatus::Active),
            participants: Mutex::new(Vec::new()),
        })
    }

    /// Returns the ambient transaction of the current thread, if any.
    pub fn current() -> Option<Arc<Transaction>> {
        CURRENT.with(|current| current.borrow().clone())
    }

    pub(crate) fn set_current(transaction: Option<Arc<Transaction>>) {
        CURRENT.with(|current| *current.borrow_mut() = transaction);
    }

    pub fn id(&self) -> TransactionId {
        self.id
    }

    pub fn status(&self) -> TransactionStatus {
        *self.status.lock()
    }

    pub fn information(&self) -> TransactionInformation {
        TransactionInformation {
            local_identifier: self.id,
            status: self.status(),
        }
    }

    /// Number of participants still enlisted.
    pub fn participant_count(&self) -> usize {
        self.participants.lock().len()
    }

    fn set_status(&self, status: TransactionStatus) {
        *self.status.lock() = status;
    }

    fn ensure_active(&self, action: &'static str) -> Result<()> {
        let status = self.status();
        if status.is_active() {
            Ok(())
        } else {
            Err(TxError::InvalidState { action, status })
        }
    }

    /// Enlists a participant.
    ///
    /// Duplicate enlistment is not checked here; participants guard against
    /// enlisting themselves twice.
    pub fn enlist_volatile(
        &self,
        participant: Arc<dyn EnlistmentNotification>,
        options: EnlistmentOptions,
    ) -> Result<()> {
        if options != EnlistmentOptions::None {
            return Err(TxError::InvalidEnlistmentOptions);
        }

        log::debug!("{}: enlisting {:?}", self.id, participant);
        self.participants.lock().push(participant);
        Ok(())
    }

    /// Visits participants in reverse enlistment order, removing those for
    /// which `visit` reports done.
    ///
    /// The list is detached while callbacks run so a participant may call
    /// back into the transaction. Participants enlisted during the sweep are
    /// kept after the survivors.
    fn sweep<F>(&self, mut visit: F)
    where
        F: FnMut(&Arc<dyn EnlistmentNotification>) -> bool,
    {
        let mut participants = std::mem::take(&mut *self.participants.lock());

        for i in (0..participants.len()).rev() {
            if visit(&participants[i]) {
                participants.remove(i);
            }
        }

        let mut guard = self.participants.lock();
        participants.append(&mut guard);
        *guard = participants;
    }

    /// Polls every participant for its vote.
    ///
    /// Returns `true` only if all participants voted to commit. A participant
    /// that does not vote moves the transaction in doubt.
    pub fn prepare(&self) -> Result<bool> {
        self.ensure_active("prepare")?;

        let mut vote_to_commit = true;
        let mut in_doubt = false;

        self.sweep(|participant| {
            let mut enlistment = PreparingEnlistment::new();
            let vote = match participant.prepare(&mut enlistment) {
                Ok(()) => enlistment.vote_to_commit(),
                Err(e) => {
                    log::error!("{}: prepare failed for {:?}: {}", self.id, participant, e);
                    None
                }
            };

            match vote {
                Some(vote) => {
                    vote_to_commit &= vote;
                    enlistment.is_done()
                }
                None => {
                    vote_to_commit = false;
                    in_doubt = true;
                    false
                }
            }
        });

        if in_doubt {
            log::warn!("{}: participant did not vote, transaction is in doubt", self.id);
            self.set_status(TransactionStatus::InDoubt);
            self.notify_in_doubt();
        }

        Ok(vote_to_commit)
    }

    /// Tells every participant to commit.
    pub fn commit(&self) -> Result<()> {
        self.ensure_active("commit")?;

        self.sweep(|participant| {
            let mut enlistment = Enlistment::new();
            if let Err(e) = participant.commit(&mut enlistment) {
                log::error!("{}: commit failed for {:?}: {}", self.id, participant, e);
            }
            enlistment.is_done()
        });

        if self.participant_count() > 0 {
            log::warn!(
                "{}: {} participant(s) did not acknowledge commit",
                self.id,
                self.participant_count()
            );
            self.set_status(TransactionStatus::InDoubt);
            self.notify_in_doubt();
        } else {
            self.set_status(TransactionStatus::Committed);
            log::info!("{}: committed", self.id);
        }

        Ok(())
    }

    /// Tells every participant to roll back.
    ///
    /// Every participant gets a rollback attempt. Failures are collected and
    /// returned together as [`TxError::Rollback`] once the sweep is over.
    pub fn rollback(&self) -> Result<()> {
        if self.status() == TransactionStatus::Aborted {
            return Ok(());
        }

        let mut failed = Vec::new();

        self.sweep(|participant| {
            let mut enlistment = Enlistment::new();
            if let Err(error) = participant.rollback(&mut enlistment) {
                log::error!("{}: rollback failed for {:?}: {}", self.id, participant, error);
                failed.push(FailedParticipant {
                    participant: Arc::clone(participant),
                    error,
                });
            }
            enlistment.is_done()
        });

        if self.participant_count() > 0 {
            log::warn!(
                "{}: {} participant(s) did not acknowledge rollback",
                self.id,
                self.participant_count()
            );
            self.set_status(TransactionStatus::InDoubt);
            self.notify_in_doubt();
        } else {
            self.set_status(TransactionStatus::Aborted);
            log::info!("{}: rolled back", self.id);
        }

        if failed.is_empty() {
            Ok(())
        } else {
            Err(RollbackError::new(failed).into())
        }
    }

    /// Tells the remaining participants that the outcome is in doubt.
    fn notify_in_doubt(&self) {
        if self.status() != TransactionStatus::InDoubt {
            return;
        }

        self.sweep(|participant| {
            let mut enlistment = Enlistment::new();
            if let Err(e) = participant.in_doubt(&mut enlistment) {
                log::error!("{}: in-doubt notification failed for {:?}: {}", self.id, participant, e);
            }
            enlistment.is_done()
        });
    }

    /// Rolls back if the transaction is still active.
    pub fn dispose(&self) -> Result<()> {
        if self.status().is_active() {
            self.rollback()
        } else {
            Ok(())
        }
    }
}

impl fmt::Debug for Transaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transaction")
            .field("id", &self.id)
            .field("status", &self.status())
            .field("participants", &self.participant_count())
            .finish()
    }
}
