//! Two-phase commit participants.

use crate::transaction::handle::TransactionInformation;

/// Vote cast by an enlisted resource during prepare.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Vote {
    Prepared,
    /// Refuse to commit; the whole transaction rolls back.
    ForceRollback(String),
}

/// A resource taking part in the final commit of a transaction.
///
/// `prepare` is called for every enlistment before any `commit`. If one votes
/// [`Vote::ForceRollback`] the remaining prepares are skipped and every
/// enlistment receives `rollback` instead.
pub trait EnlistmentNotification: Send + Sync {
    fn prepare(&self, transaction: &TransactionInformation) -> Vote;

    fn commit(&self, transaction: &TransactionInformation);

    fn rollback(&self, transaction: &TransactionInformation);
}
