//! Handshake tokens exchanged between the coordinator and a participant.

use crate::error::Result;
use std::fmt;

/// Options accepted by [`Transaction::enlist_volatile`](super::Transaction::enlist_volatile).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EnlistmentOptions {
    #[default]
    None,
    /// Not supported by this coordinator; rejected at enlistment.
    EnlistDuringPrepareRequired,
}

/// Completion token handed to a participant for one protocol callback.
#[derive(Debug, Default)]
pub struct Enlistment {
    done_processing: bool,
}

impl Enlistment {
    pub fn new() -> Self {
        Self::default()
    }

    /// Acknowledges that the participant has finished with this transaction.
    pub fn done(&mut self) {
        self.done_processing = true;
    }

    pub fn is_done(&self) -> bool {
        self.done_processing
    }
}

/// Token handed to a participant during the prepare phase.
///
/// Carries the participant's vote. `None` until the participant calls
/// [`prepared`](Self::prepared) or [`force_rollback`](Self::force_rollback).
#[derive(Debug, Default)]
pub struct PreparingEnlistment {
    base: Enlistment,
    vote_to_commit: Option<bool>,
}

impl PreparingEnlistment {
    pub fn new() -> Self {
        Self::default()
    }

    /// Acknowledges completion. An unset vote counts as a vote to commit.
    pub fn done(&mut self) {
        self.base.done();
        if self.vote_to_commit.is_none() {
            self.vote_to_commit = Some(true);
        }
    }

    pub fn prepared(&mut self) {
        self.vote_to_commit = Some(true);
    }

    pub fn force_rollback(&mut self) {
        self.vote_to_commit = Some(false);
    }

    pub fn vote_to_commit(&self) -> Option<bool> {
        self.vote_to_commit
    }

    pub fn is_done(&self) -> bool {
        self.base.is_done()
    }
}

/// Participant contract for a [`Transaction`](super::Transaction).
///
/// Every callback reports its outcome as a `Result`. An `Err` from
/// `prepare` counts as a missing vote; from `commit` or `in_doubt` it leaves
/// the participant unacknowledged; from `rollback` it is collected into the
/// transaction's aggregate [`RollbackError`](crate::error::RollbackError).
pub trait EnlistmentNotification: Send + Sync + fmt::Debug {
    fn prepare(&self, enlistment: &mut PreparingEnlistment) -> Result<()>;

    fn commit(&self, enlistment: &mut Enlistment) -> Result<()>;

    /// May run on a different thread than the one that did the work.
    fn rollback(&self, enlistment: &mut Enlistment) -> Result<()>;

    fn in_doubt(&self, enlistment: &mut Enlistment) -> Result<()>;
}
