//! Unit of work error types.
//!
//! Two families live here:
//! - [`UnitOfWorkError`]: the caller broke the coordinator's contract. These
//!   are returned as `Err` and are never folded into a response.
//! - [`PersistenceError`]: expected failures. These travel inside a
//!   [`ServiceResponse`] as a [`ResponseError`].

use chrono::TimeDelta;
use thiserror::Error;

use crate::response::{ResponseError, ServiceResponse};
use crate::transaction::{IsolationLevel, TransactionAbortedError};
use crate::uow::id::UnitOfWorkId;

/// Result type for unit of work operations.
pub type UnitOfWorkResult<T> = Result<T, UnitOfWorkError>;

/// Contract violations.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum UnitOfWorkError {
    #[error("transaction timeout must not be negative, got {}ms", .timeout.num_milliseconds())]
    NegativeTimeout { timeout: TimeDelta },

    #[error(
        "nested units of work must use the isolation level of their parent to join the \
         ambient transaction (parent: {parent}, child: {child})"
    )]
    IsolationMismatch {
        parent: IsolationLevel,
        child: IsolationLevel,
    },

    #[error("unit of work {0} is currently committing")]
    Committing(UnitOfWorkId),

    #[error("unit of work {0} has already been committed")]
    AlreadyCommitted(UnitOfWorkId),

    #[error("unit of work {0} has already been aborted")]
    AlreadyAborted(UnitOfWorkId),

    #[error("unit of work {0} has been disposed")]
    Disposed(UnitOfWorkId),
}

impl UnitOfWorkError {
    /// Always true: every variant means the caller misused the coordinator.
    pub fn is_contract_violation(&self) -> bool {
        true
    }

    /// The unit the violation concerns, if one was constructed.
    pub fn unit_id(&self) -> Option<UnitOfWorkId> {
        match self {
            UnitOfWorkError::NegativeTimeout { .. } | UnitOfWorkError::IsolationMismatch { .. } => None,
            UnitOfWorkError::Committing(id)
            | UnitOfWorkError::AlreadyCommitted(id)
            | UnitOfWorkError::AlreadyAborted(id)
            | UnitOfWorkError::Disposed(id) => Some(*id),
        }
    }
}

/// Expected persistence failures.
#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("unit of work {0} cannot be committed while its ambient context is still in use")]
    UnitOfWorkNonCommittable(UnitOfWorkId),

    #[error("unit of work {0} has no scope transaction")]
    ScopeTransactionIsNull(UnitOfWorkId),

    #[error("unit of work {unit_id} failed to commit transaction {local_id}: {source}")]
    CommitFailed {
        unit_id: UnitOfWorkId,
        local_id: String,
        #[source]
        source: TransactionAbortedError,
    },
}

impl PersistenceError {
    /// Stable code used in the response.
    pub fn code(&self) -> &'static str {
        match self {
            PersistenceError::UnitOfWorkNonCommittable(_) => "UnitOfWorkNonCommittable",
            PersistenceError::ScopeTransactionIsNull(_) => "ScopeTransactionIsNull",
            PersistenceError::CommitFailed { .. } => "CommitFailed",
        }
    }

    /// The unit the failure belongs to.
    pub fn unit_id(&self) -> UnitOfWorkId {
        match self {
            PersistenceError::UnitOfWorkNonCommittable(id)
            | PersistenceError::ScopeTransactionIsNull(id) => *id,
            PersistenceError::CommitFailed { unit_id, .. } => *unit_id,
        }
    }

    pub fn into_response<T>(self) -> ServiceResponse<T> {
        ServiceResponse::Error(self.into())
    }
}

impl From<PersistenceError> for ResponseError {
    fn from(err: PersistenceError) -> Self {
        ResponseError::new(err.code(), err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transaction::AbortReason;

    #[test]
    fn test_persistence_error_codes() {
        let id = UnitOfWorkId::new();
        let response: ServiceResponse<()> = PersistenceError::UnitOfWorkNonCommittable(id).into_response();
        let err = response.error().unwrap();
        assert_eq!(err.code(), "UnitOfWorkNonCommittable");
        assert_eq!(
            err.downcast_ref::<PersistenceError>().map(PersistenceError::unit_id),
            Some(id)
        );
    }

    #[test]
    fn test_commit_failed_keeps_cause() {
        let id = UnitOfWorkId::new();
        let err = PersistenceError::CommitFailed {
            unit_id: id,
            local_id: "tx:7".into(),
            source: TransactionAbortedError::new("tx:7", AbortReason::ScopeNotCompleted),
        };
        let message = err.to_string();
        assert!(message.contains(&id.to_string()));
        assert!(message.contains("tx:7"));
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn test_contract_violation_messages() {
        let err = UnitOfWorkError::NegativeTimeout {
            timeout: TimeDelta::seconds(-1),
        };
        assert_eq!(err.to_string(), "transaction timeout must not be negative, got -1000ms");

        let err = UnitOfWorkError::IsolationMismatch {
            parent: IsolationLevel::Serializable,
            child: IsolationLevel::ReadCommitted,
        };
        assert!(err.to_string().contains("SERIALIZABLE"));
        assert!(err.is_contract_violation());
        assert_eq!(err.unit_id(), None);

        let id = UnitOfWorkId::new();
        assert_eq!(UnitOfWorkError::Disposed(id).unit_id(), Some(id));
    }
}
