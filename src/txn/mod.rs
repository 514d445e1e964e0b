//! Two-phase-commit coordination.
//!
//! A [`Transaction`] drives its enlisted participants through prepare and
//! commit, or through rollback. A [`TransactionScope`] owns the ambient
//! transaction for the current thread and resolves it when released.

pub mod enlistment;
pub mod scope;
pub mod transaction;

pub use enlistment::{Enlistment, EnlistmentNotification, EnlistmentOptions, PreparingEnlistment};
pub use scope::TransactionScope;
pub use transaction::{Transaction, TransactionId, TransactionInformation, TransactionStatus};
