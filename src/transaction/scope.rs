//! Resource-scoped transaction context handed to persistence code during commit.

use std::fmt;
use std::thread::{self, ThreadId};

use chrono::TimeDelta;

use crate::transaction::error::AbortReason;
use crate::transaction::handle::Transaction;

/// How the transaction of a scope was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeKind {
    /// The root's own handle, used on the thread that opened the root.
    Owned,
    /// A dependent clone, used when committing from a foreign thread.
    Dependent,
    /// The ambient handle shared by a nested unit on its own thread.
    Joined,
}

/// A transaction context that lives for one commit call.
///
/// Dropping a scope that was never completed aborts its transaction.
pub struct TransactionScope {
    transaction: Transaction,
    kind: ScopeKind,
    timeout: TimeDelta,
    thread: ThreadId,
    completed: bool,
}

impl TransactionScope {
    pub(crate) fn new(transaction: Transaction, kind: ScopeKind, timeout: TimeDelta) -> Self {
        Self {
            transaction,
            kind,
            timeout,
            thread: thread::current().id(),
            completed: false,
        }
    }

    pub fn transaction(&self) -> &Transaction {
        &self.transaction
    }

    pub fn kind(&self) -> ScopeKind {
        self.kind
    }

    pub fn timeout(&self) -> TimeDelta {
        self.timeout
    }

    /// Thread the scope was entered on.
    pub fn thread(&self) -> ThreadId {
        self.thread
    }

    /// Vote to commit. The transaction itself is completed by its owner.
    pub fn complete(mut self) {
        self.completed = true;
    }
}

impl Drop for TransactionScope {
    fn drop(&mut self) {
        if !self.completed {
            self.transaction.abort(AbortReason::ScopeNotCompleted);
        }
    }
}

impl fmt::Debug for TransactionScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransactionScope")
            .field("transaction", &self.transaction)
            .field("kind", &self.kind)
            .field("timeout", &self.timeout)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transaction::{CommittableTransaction, TransactionOptions, TransactionStatus};

    #[test]
    fn test_completed_scope_leaves_transaction_open() {
        let tx = CommittableTransaction::new(&TransactionOptions::default());
        let scope = TransactionScope::new(tx.transaction().clone(), ScopeKind::Owned, TimeDelta::seconds(1));
        assert_eq!(scope.thread(), thread::current().id());
        scope.complete();

        assert_eq!(tx.transaction().status(), TransactionStatus::Active);
        tx.commit().unwrap();
    }

    #[test]
    fn test_abandoned_scope_aborts() {
        let tx = CommittableTransaction::new(&TransactionOptions::default());
        {
            let _scope =
                TransactionScope::new(tx.transaction().clone(), ScopeKind::Joined, TimeDelta::seconds(1));
        }
        assert_eq!(tx.transaction().status(), TransactionStatus::Aborted);
        assert_eq!(
            tx.transaction().abort_reason(),
            Some(AbortReason::ScopeNotCompleted)
        );
    }
}
