//! In-process transaction handles.
//!
//! A [`CommittableTransaction`] is owned by exactly one root unit of work.
//! [`Transaction`] is a cheap alias of the same underlying transaction that
//! nested units hold. A [`DependentTransaction`] is a clone registered with
//! the transaction: while it is outstanding the owner's commit waits for it
//! (or aborts, depending on [`DependentCloneOption`]).

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, TimeDelta, Utc};
use parking_lot::{Condvar, Mutex, MutexGuard};
use serde::{Deserialize, Serialize};
use ulid::Ulid;

use crate::transaction::enlistment::{EnlistmentNotification, Vote};
use crate::transaction::error::{AbortReason, TransactionAbortedError, TransactionResult};
use crate::transaction::isolation::IsolationLevel;
use crate::transaction::options::TransactionOptions;
use crate::transaction::status::TransactionStatus;

static NEXT_SEQUENCE: AtomicU64 = AtomicU64::new(1);

/// How a dependent clone interacts with the owner's commit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DependentCloneOption {
    /// The owner's commit blocks until the clone completes or is released.
    BlockCommitUntilComplete,
    /// The owner's commit aborts if the clone has not completed.
    RollbackIfNotComplete,
}

/// Diagnostic snapshot of a transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionInformation {
    /// Identifier unique within this process, shared by all clones.
    pub local_identifier: String,
    pub creation_time: DateTime<Utc>,
    pub status: TransactionStatus,
    pub isolation_level: IsolationLevel,
}

struct TransactionState {
    status: TransactionStatus,
    abort_reason: Option<AbortReason>,
    /// Outstanding block-until-complete clones.
    blocking: usize,
    /// Outstanding rollback-if-not-complete clones.
    non_blocking: usize,
    clones_issued: u64,
    committing: bool,
    timeout: TimeDelta,
    enlistments: Vec<Arc<dyn EnlistmentNotification>>,
}

struct TransactionInner {
    local_id: String,
    isolation: IsolationLevel,
    created_at: DateTime<Utc>,
    started: Instant,
    state: Mutex<TransactionState>,
    changed: Condvar,
}

/// Shared, non-owning handle to a transaction.
#[derive(Clone)]
pub struct Transaction {
    inner: Arc<TransactionInner>,
}

impl Transaction {
    fn new(options: &TransactionOptions) -> Self {
        let sequence = NEXT_SEQUENCE.fetch_add(1, Ordering::Relaxed);
        Self {
            inner: Arc::new(TransactionInner {
                local_id: format!("{}:{}", Ulid::new().to_string().to_lowercase(), sequence),
                isolation: options.isolation_level(),
                created_at: Utc::now(),
                started: Instant::now(),
                state: Mutex::new(TransactionState {
                    status: TransactionStatus::Active,
                    abort_reason: None,
                    blocking: 0,
                    non_blocking: 0,
                    clones_issued: 0,
                    committing: false,
                    timeout: options.timeout(),
                    enlistments: Vec::new(),
                }),
                changed: Condvar::new(),
            }),
        }
    }

    pub fn local_identifier(&self) -> &str {
        &self.inner.local_id
    }

    pub fn isolation_level(&self) -> IsolationLevel {
        self.inner.isolation
    }

    pub fn timeout(&self) -> TimeDelta {
        self.inner.state.lock().timeout
    }

    /// Shorten the timeout; longer values are ignored.
    pub(crate) fn lower_timeout(&self, timeout: TimeDelta) {
        let mut state = self.inner.state.lock();
        if timeout < state.timeout {
            state.timeout = timeout;
            drop(state);
            self.inner.changed.notify_all();
        }
    }

    pub fn status(&self) -> TransactionStatus {
        self.inner.state.lock().status
    }

    /// Why the transaction aborted, if it did.
    pub fn abort_reason(&self) -> Option<AbortReason> {
        self.inner.state.lock().abort_reason.clone()
    }

    pub fn information(&self) -> TransactionInformation {
        TransactionInformation {
            local_identifier: self.inner.local_id.clone(),
            creation_time: self.inner.created_at,
            status: self.status(),
            isolation_level: self.inner.isolation,
        }
    }

    /// Total number of dependent clones ever created.
    pub fn dependent_clones_issued(&self) -> u64 {
        self.inner.state.lock().clones_issued
    }

    /// Number of dependent clones not yet completed or released.
    pub fn outstanding_dependents(&self) -> usize {
        let state = self.inner.state.lock();
        state.blocking + state.non_blocking
    }

    /// Check if both handles refer to the same underlying transaction.
    pub fn same_transaction(&self, other: &Transaction) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Enlist a resource in the final two-phase commit.
    pub fn enlist(&self, enlistment: Arc<dyn EnlistmentNotification>) -> TransactionResult<()> {
        let mut state = self.inner.state.lock();
        if state.status != TransactionStatus::Active || state.committing {
            return Err(self.aborted_error(&state));
        }
        state.enlistments.push(enlistment);
        Ok(())
    }

    /// Create a dependent clone registered against this transaction.
    pub fn dependent_clone(&self, option: DependentCloneOption) -> DependentTransaction {
        let mut state = self.inner.state.lock();
        match option {
            DependentCloneOption::BlockCommitUntilComplete => state.blocking += 1,
            DependentCloneOption::RollbackIfNotComplete => state.non_blocking += 1,
        }
        state.clones_issued += 1;
        DependentTransaction {
            transaction: self.clone(),
            option,
            released: false,
        }
    }

    /// Abort the transaction. Has no effect once it has committed.
    pub fn rollback(&self, reason: impl Into<String>) {
        self.abort(AbortReason::Rollback(reason.into()));
    }

    pub(crate) fn abort(&self, reason: AbortReason) {
        let state = self.inner.state.lock();
        if state.status != TransactionStatus::Active {
            return;
        }
        let _ = self.abort_locked(state, reason);
    }

    /// Mark aborted, wake any committer, and roll back enlistments outside the lock.
    fn abort_locked(
        &self,
        mut state: MutexGuard<'_, TransactionState>,
        reason: AbortReason,
    ) -> TransactionAbortedError {
        state.status = TransactionStatus::Aborted;
        state.abort_reason = Some(reason.clone());
        let enlistments = std::mem::take(&mut state.enlistments);
        drop(state);
        self.inner.changed.notify_all();

        tracing::warn!(transaction = %self.inner.local_id, %reason, "transaction aborted");
        let info = self.information();
        for enlistment in &enlistments {
            enlistment.rollback(&info);
        }
        TransactionAbortedError::new(self.inner.local_id.clone(), reason)
    }

    fn aborted_error(&self, state: &TransactionState) -> TransactionAbortedError {
        let reason = match state.status {
            TransactionStatus::Committed => AbortReason::AlreadyCommitted,
            _ => state
                .abort_reason
                .clone()
                .unwrap_or_else(|| AbortReason::Rollback("transaction is not active".into())),
        };
        TransactionAbortedError::new(self.inner.local_id.clone(), reason)
    }

    /// `None` means no deadline: a zero timeout, or one too large to
    /// represent.
    fn deadline(&self, state: &TransactionState) -> Option<Instant> {
        if state.timeout <= TimeDelta::zero() {
            return None;
        }
        let timeout = state.timeout.to_std().ok()?;
        self.inner.started.checked_add(timeout)
    }

    fn release_dependent(&self, option: DependentCloneOption, completed: bool) {
        let mut state = self.inner.state.lock();
        match option {
            DependentCloneOption::BlockCommitUntilComplete => {
                state.blocking = state.blocking.saturating_sub(1)
            }
            DependentCloneOption::RollbackIfNotComplete => {
                state.non_blocking = state.non_blocking.saturating_sub(1)
            }
        }
        if !completed && state.status == TransactionStatus::Active {
            let _ = self.abort_locked(state, AbortReason::DependentNotCompleted);
            return;
        }
        drop(state);
        self.inner.changed.notify_all();
    }

    fn commit(&self) -> TransactionResult<()> {
        let mut state = self.inner.state.lock();

        loop {
            let deadline = self.deadline(&state);
            if state.status != TransactionStatus::Active {
                return Err(self.aborted_error(&state));
            }
            if state.non_blocking > 0 {
                return Err(self.abort_locked(state, AbortReason::DependentOutstanding));
            }
            if state.blocking == 0 && !state.committing {
                break;
            }
            if let Some(deadline) = deadline {
                if Instant::now() >= deadline {
                    let timeout_ms = state.timeout.num_milliseconds();
                    return Err(self.abort_locked(state, AbortReason::Timeout { timeout_ms }));
                }
            }

            tracing::debug!(
                transaction = %self.inner.local_id,
                outstanding = state.blocking,
                "waiting for dependent clones"
            );
            match deadline {
                Some(deadline) => {
                    let _ = self.inner.changed.wait_until(&mut state, deadline);
                }
                None => self.inner.changed.wait(&mut state),
            }
        }

        state.committing = true;
        let enlistments = std::mem::take(&mut state.enlistments);
        drop(state);

        let info = self.information();
        let refusal = enlistments.iter().find_map(|enlistment| match enlistment.prepare(&info) {
            Vote::Prepared => None,
            Vote::ForceRollback(why) => Some(why),
        });

        let mut state = self.inner.state.lock();
        state.committing = false;
        state.enlistments = enlistments;

        if let Some(why) = refusal {
            return Err(self.abort_locked(state, AbortReason::EnlistmentVotedNo(why)));
        }
        if state.status != TransactionStatus::Active {
            // Aborted by another handle while preparing.
            let reason = state
                .abort_reason
                .clone()
                .unwrap_or(AbortReason::DependentNotCompleted);
            let enlistments = std::mem::take(&mut state.enlistments);
            drop(state);
            let info = self.information();
            for enlistment in &enlistments {
                enlistment.rollback(&info);
            }
            return Err(TransactionAbortedError::new(self.inner.local_id.clone(), reason));
        }

        state.status = TransactionStatus::Committed;
        let enlistments = std::mem::take(&mut state.enlistments);
        drop(state);
        self.inner.changed.notify_all();

        let info = self.information();
        for enlistment in &enlistments {
            enlistment.commit(&info);
        }
        tracing::debug!(transaction = %self.inner.local_id, "transaction committed");
        Ok(())
    }
}

impl fmt::Debug for Transaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transaction")
            .field("local_id", &self.inner.local_id)
            .field("isolation", &self.inner.isolation)
            .field("status", &self.status())
            .finish()
    }
}

/// The owning handle of a transaction.
///
/// Dropping it while the transaction is still active rolls it back.
pub struct CommittableTransaction {
    transaction: Transaction,
}

impl CommittableTransaction {
    /// Start a new transaction with the given options.
    pub fn new(options: &TransactionOptions) -> Self {
        let transaction = Transaction::new(options);
        tracing::debug!(
            transaction = %transaction.local_identifier(),
            isolation = %options.isolation_level(),
            timeout_ms = options.timeout().num_milliseconds(),
            "transaction created"
        );
        Self { transaction }
    }

    pub fn transaction(&self) -> &Transaction {
        &self.transaction
    }

    /// Commit the transaction.
    ///
    /// Blocks while block-until-complete dependent clones are outstanding,
    /// bounded by the transaction timeout.
    pub fn commit(&self) -> TransactionResult<()> {
        self.transaction.commit()
    }
}

impl Drop for CommittableTransaction {
    fn drop(&mut self) {
        self.transaction.abort(AbortReason::Rollback(
            "owning handle released before commit".into(),
        ));
    }
}

impl fmt::Debug for CommittableTransaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("CommittableTransaction")
            .field(&self.transaction)
            .finish()
    }
}

/// A dependent clone of a transaction.
///
/// Releasing it without calling [`complete`](Self::complete) aborts the
/// transaction it was cloned from.
pub struct DependentTransaction {
    transaction: Transaction,
    option: DependentCloneOption,
    released: bool,
}

impl DependentTransaction {
    pub fn transaction(&self) -> &Transaction {
        &self.transaction
    }

    pub fn option(&self) -> DependentCloneOption {
        self.option
    }

    /// Signal that the work done under this clone is complete.
    pub fn complete(mut self) {
        self.released = true;
        self.transaction.release_dependent(self.option, true);
    }
}

impl Drop for DependentTransaction {
    fn drop(&mut self) {
        if !self.released {
            self.released = true;
            self.transaction.release_dependent(self.option, false);
        }
    }
}

impl fmt::Debug for DependentTransaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DependentTransaction")
            .field("transaction", &self.transaction)
            .field("option", &self.option)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;
    use std::thread;
    use std::time::Duration;

    #[derive(Default)]
    struct Recorder {
        refuse: Option<String>,
        events: Mutex<Vec<&'static str>>,
    }

    impl EnlistmentNotification for Recorder {
        fn prepare(&self, _transaction: &TransactionInformation) -> Vote {
            self.events.lock().push("prepare");
            match &self.refuse {
                Some(why) => Vote::ForceRollback(why.clone()),
                None => Vote::Prepared,
            }
        }

        fn commit(&self, _transaction: &TransactionInformation) {
            self.events.lock().push("commit");
        }

        fn rollback(&self, _transaction: &TransactionInformation) {
            self.events.lock().push("rollback");
        }
    }

    fn options() -> TransactionOptions {
        TransactionOptions::default().with_timeout(TimeDelta::seconds(5))
    }

    #[test]
    fn test_commit_runs_two_phases() {
        let tx = CommittableTransaction::new(&options());
        let recorder = Arc::new(Recorder::default());
        tx.transaction().enlist(recorder.clone()).unwrap();

        tx.commit().unwrap();

        assert_eq!(tx.transaction().status(), TransactionStatus::Committed);
        assert_eq!(*recorder.events.lock(), vec!["prepare", "commit"]);
    }

    #[test]
    fn test_enlistment_vote_aborts() {
        let tx = CommittableTransaction::new(&options());
        let recorder = Arc::new(Recorder {
            refuse: Some("constraint violated".into()),
            ..Default::default()
        });
        tx.transaction().enlist(recorder.clone()).unwrap();

        let err = tx.commit().unwrap_err();

        assert_eq!(
            err.reason,
            AbortReason::EnlistmentVotedNo("constraint violated".into())
        );
        assert_eq!(err.local_id, tx.transaction().local_identifier());
        assert_eq!(tx.transaction().status(), TransactionStatus::Aborted);
        assert_eq!(*recorder.events.lock(), vec!["prepare", "rollback"]);
    }

    #[test]
    fn test_commit_twice_fails() {
        let tx = CommittableTransaction::new(&options());
        tx.commit().unwrap();
        let err = tx.commit().unwrap_err();
        assert_eq!(err.reason, AbortReason::AlreadyCommitted);
    }

    #[test]
    fn test_commit_blocks_until_dependent_completes() {
        let tx = Arc::new(CommittableTransaction::new(&options()));
        let dependent = tx
            .transaction()
            .dependent_clone(DependentCloneOption::BlockCommitUntilComplete);
        assert_eq!(tx.transaction().outstanding_dependents(), 1);

        let (done_tx, done_rx) = mpsc::channel();
        let committer = {
            let tx = tx.clone();
            thread::spawn(move || {
                let result = tx.commit();
                done_tx.send(()).unwrap();
                result
            })
        };

        // The owner cannot finish while the clone is outstanding.
        assert!(done_rx.recv_timeout(Duration::from_millis(100)).is_err());

        dependent.complete();
        done_rx.recv_timeout(Duration::from_secs(5)).unwrap();
        committer.join().unwrap().unwrap();
        assert_eq!(tx.transaction().status(), TransactionStatus::Committed);
    }

    #[test]
    fn test_released_dependent_aborts_owner() {
        let tx = CommittableTransaction::new(&options());
        let dependent = tx
            .transaction()
            .dependent_clone(DependentCloneOption::BlockCommitUntilComplete);
        drop(dependent);

        assert_eq!(tx.transaction().outstanding_dependents(), 0);
        let err = tx.commit().unwrap_err();
        assert_eq!(err.reason, AbortReason::DependentNotCompleted);
    }

    #[test]
    fn test_rollback_if_not_complete_dependent() {
        let tx = CommittableTransaction::new(&options());
        let _dependent = tx
            .transaction()
            .dependent_clone(DependentCloneOption::RollbackIfNotComplete);

        let err = tx.commit().unwrap_err();
        assert_eq!(err.reason, AbortReason::DependentOutstanding);
    }

    #[test]
    fn test_commit_times_out_waiting_for_dependent() {
        let tx = CommittableTransaction::new(
            &TransactionOptions::default().with_timeout(TimeDelta::milliseconds(50)),
        );
        let _dependent = tx
            .transaction()
            .dependent_clone(DependentCloneOption::BlockCommitUntilComplete);

        let err = tx.commit().unwrap_err();
        assert_eq!(err.reason, AbortReason::Timeout { timeout_ms: 50 });
        assert!(err.is_retryable());
    }

    #[test]
    fn test_lowered_timeout_applies_to_waiting_commit() {
        let tx = CommittableTransaction::new(&options());
        let _dependent = tx
            .transaction()
            .dependent_clone(DependentCloneOption::BlockCommitUntilComplete);
        tx.transaction().lower_timeout(TimeDelta::milliseconds(20));
        tx.transaction().lower_timeout(TimeDelta::seconds(30));

        assert_eq!(tx.transaction().timeout(), TimeDelta::milliseconds(20));
        let err = tx.commit().unwrap_err();
        assert_eq!(err.reason, AbortReason::Timeout { timeout_ms: 20 });
    }

    #[test]
    fn test_zero_timeout_has_no_deadline() {
        let tx = Arc::new(CommittableTransaction::new(
            &TransactionOptions::default().with_timeout(TimeDelta::zero()),
        ));
        let dependent = tx
            .transaction()
            .dependent_clone(DependentCloneOption::BlockCommitUntilComplete);

        let committer = {
            let tx = tx.clone();
            thread::spawn(move || tx.commit())
        };
        thread::sleep(Duration::from_millis(30));
        dependent.complete();

        committer.join().unwrap().unwrap();
        assert_eq!(tx.transaction().status(), TransactionStatus::Committed);
    }

    #[test]
    fn test_expired_timeout_without_waiters_still_commits() {
        let tx = CommittableTransaction::new(
            &TransactionOptions::default().with_timeout(TimeDelta::milliseconds(1)),
        );
        thread::sleep(Duration::from_millis(10));
        tx.commit().unwrap();
    }

    #[test]
    fn test_drop_rolls_back_active_transaction() {
        let tx = CommittableTransaction::new(&options());
        let alias = tx.transaction().clone();
        let recorder = Arc::new(Recorder::default());
        alias.enlist(recorder.clone()).unwrap();

        drop(tx);

        assert_eq!(alias.status(), TransactionStatus::Aborted);
        assert_eq!(*recorder.events.lock(), vec!["rollback"]);
    }

    #[test]
    fn test_information_serializes() {
        let tx = CommittableTransaction::new(&options());
        let json = serde_json::to_value(tx.transaction().information()).unwrap();
        assert_eq!(json["localIdentifier"], tx.transaction().local_identifier());
        assert_eq!(json["status"], "Active");
        assert_eq!(json["isolationLevel"], "SERIALIZABLE");
        assert!(json["creationTime"].is_string());
    }

    #[test]
    fn test_clones_share_identity() {
        let tx = CommittableTransaction::new(&options());
        let dependent = tx
            .transaction()
            .dependent_clone(DependentCloneOption::BlockCommitUntilComplete);
        assert!(dependent.transaction().same_transaction(tx.transaction()));
        assert_eq!(
            dependent.transaction().information().local_identifier,
            tx.transaction().local_identifier()
        );
        assert_eq!(tx.transaction().dependent_clones_issued(), 1);
        dependent.complete();
        tx.commit().unwrap();
    }
}
