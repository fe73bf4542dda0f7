//! Transaction error types.

use thiserror::Error;

/// Result type for transaction resource operations.
pub type TransactionResult<T> = Result<T, TransactionAbortedError>;

/// Why a transaction was aborted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AbortReason {
    /// The deadline derived from the transaction timeout passed.
    Timeout { timeout_ms: i64 },
    /// Explicit rollback.
    Rollback(String),
    /// A `TransactionScope` was released without being completed.
    ScopeNotCompleted,
    /// A dependent clone was released without being completed.
    DependentNotCompleted,
    /// A rollback-if-not-complete dependent was outstanding at commit.
    DependentOutstanding,
    /// An enlisted resource voted to roll back during prepare.
    EnlistmentVotedNo(String),
    /// Commit was attempted on a transaction that already committed.
    AlreadyCommitted,
}

impl std::fmt::Display for AbortReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AbortReason::Timeout { timeout_ms } => write!(f, "timed out after {timeout_ms}ms"),
            AbortReason::Rollback(reason) => write!(f, "rolled back: {reason}"),
            AbortReason::ScopeNotCompleted => write!(f, "transaction scope released without completion"),
            AbortReason::DependentNotCompleted => write!(f, "dependent clone released without completion"),
            AbortReason::DependentOutstanding => write!(f, "dependent clone still outstanding at commit"),
            AbortReason::EnlistmentVotedNo(reason) => write!(f, "enlisted resource refused to prepare: {reason}"),
            AbortReason::AlreadyCommitted => write!(f, "transaction already committed"),
        }
    }
}

/// The transaction could not commit.
#[derive(Debug, Clone, Error)]
#[error("transaction {local_id} aborted: {reason}")]
pub struct TransactionAbortedError {
    /// Local identifier of the aborted transaction.
    pub local_id: String,
    pub reason: AbortReason,
}

impl TransactionAbortedError {
    pub fn new(local_id: impl Into<String>, reason: AbortReason) -> Self {
        Self {
            local_id: local_id.into(),
            reason,
        }
    }

    /// Check if retrying the work in a fresh transaction may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.reason,
            AbortReason::Timeout { .. } | AbortReason::EnlistmentVotedNo(_)
        )
    }
}
