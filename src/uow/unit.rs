//! The unit of work coordinator.
//!
//! [`ScopedUnitOfWork`] drives the commit/dispose state machine once for any
//! persistence technology. The technology itself plugs in through
//! [`PersistenceContext`].

use std::sync::Arc;

use chrono::TimeDelta;
use parking_lot::Mutex;

use crate::config::PersistenceOptions;
use crate::response::ServiceResponse;
use crate::transaction::{
    CommittableTransaction, DependentCloneOption, DependentTransaction, ScopeKind, Transaction,
    TransactionInformation, TransactionOptions, TransactionScope, TransactionStatus,
};
use crate::uow::ambient::AmbientContextManager;
use crate::uow::error::{PersistenceError, UnitOfWorkError, UnitOfWorkResult};
use crate::uow::id::UnitOfWorkId;
use crate::uow::scope::UnitScope;

/// Persistence capability a unit of work coordinates.
pub trait PersistenceContext: Send + Sync {
    /// Commit the application's pending work inside `scope`.
    fn commit_transaction(&self, scope: &TransactionScope) -> ServiceResponse<()>;

    /// Signal the underlying resource to discard pending work.
    fn rollback(&self);

    /// Release connections, sessions and the like.
    fn dispose_managed_resources(&self);
}

impl<T: PersistenceContext + ?Sized> PersistenceContext for Arc<T> {
    fn commit_transaction(&self, scope: &TransactionScope) -> ServiceResponse<()> {
        (**self).commit_transaction(scope)
    }

    fn rollback(&self) {
        (**self).rollback()
    }

    fn dispose_managed_resources(&self) {
        (**self).dispose_managed_resources()
    }
}

/// A transactional unit of work.
pub trait UnitOfWork: Send + Sync {
    /// This unit's node in its parent/child chain.
    fn scope(&self) -> &UnitScope;

    fn id(&self) -> UnitOfWorkId {
        self.scope().id()
    }

    fn status(&self) -> TransactionStatus {
        self.scope().status()
    }

    /// Commit the unit.
    ///
    /// `Err` means the caller broke the contract (double commit, use after
    /// dispose). Every expected failure comes back as a
    /// [`ServiceResponse::Error`].
    fn commit(&self) -> UnitOfWorkResult<ServiceResponse<()>>;

    fn rollback(&self);

    /// Release resources if the ambient context allows it. Idempotent.
    fn dispose(&self);

    /// Information about the transaction in use. `None` unless committing.
    fn transaction_information(&self) -> UnitOfWorkResult<Option<TransactionInformation>>;
}

/// Builder for [`ScopedUnitOfWork`].
pub struct UnitOfWorkBuilder<'p, P> {
    ambient: Arc<dyn AmbientContextManager>,
    persistence: P,
    parent: Option<&'p UnitScope>,
    options: TransactionOptions,
}

impl<'p, P: PersistenceContext> UnitOfWorkBuilder<'p, P> {
    /// Nest the new unit under `parent`.
    pub fn parent<U: UnitOfWork + ?Sized>(mut self, parent: &'p U) -> Self {
        self.parent = Some(parent.scope());
        self
    }

    /// Set the transaction options.
    pub fn options(mut self, options: TransactionOptions) -> Self {
        self.options = options;
        self
    }

    /// Take the transaction options from configuration.
    pub fn persistence_options(mut self, options: &PersistenceOptions) -> Self {
        self.options = options.transaction_options();
        self
    }

    /// Validate the options against the parent chain and open the unit on
    /// the current thread.
    pub fn build(self) -> UnitOfWorkResult<ScopedUnitOfWork<P>> {
        let options = resolve_options(self.parent, self.options)?;
        let scope = UnitScope::new(self.parent.cloned(), options);

        tracing::debug!(
            unit_id = %scope.id(),
            parent = ?scope.parent().map(UnitScope::id),
            isolation = %options.isolation_level(),
            timeout_ms = options.timeout().num_milliseconds(),
            "unit of work opened"
        );
        self.ambient.unit_created(&scope);

        Ok(ScopedUnitOfWork {
            scope,
            ambient: self.ambient,
            persistence: self.persistence,
            commit_gate: Mutex::new(()),
            current: Mutex::new(None),
        })
    }
}

/// Check construction preconditions and bring the chain to one timeout.
///
/// The chain shares the shortest requested timeout: a shorter child lowers
/// every ancestor, a longer child adopts its parent's.
fn resolve_options(
    parent: Option<&UnitScope>,
    options: TransactionOptions,
) -> UnitOfWorkResult<TransactionOptions> {
    if options.timeout() < TimeDelta::zero() {
        return Err(UnitOfWorkError::NegativeTimeout {
            timeout: options.timeout(),
        });
    }

    let Some(parent) = parent else {
        return Ok(options);
    };

    let parent_options = parent.options();
    if parent_options.isolation_level() != options.isolation_level() {
        return Err(UnitOfWorkError::IsolationMismatch {
            parent: parent_options.isolation_level(),
            child: options.isolation_level(),
        });
    }

    if options.timeout() < parent_options.timeout() {
        tracing::debug!(
            parent = %parent.id(),
            timeout_ms = options.timeout().num_milliseconds(),
            "lowering ancestor timeouts"
        );
        for scope in std::iter::once(parent).chain(parent.ancestors()) {
            scope.lower_timeout(options.timeout());
        }
        Ok(options)
    } else {
        Ok(options.with_timeout(parent_options.timeout()))
    }
}

/// The unit of work coordinator.
///
/// Dropping the unit disposes it. Unlike [`UnitOfWork::dispose`], dropping
/// does not wait for the ambient context manager's permission.
pub struct ScopedUnitOfWork<P: PersistenceContext> {
    scope: UnitScope,
    ambient: Arc<dyn AmbientContextManager>,
    persistence: P,
    commit_gate: Mutex<()>,
    /// Handle in use while committing.
    current: Mutex<Option<Transaction>>,
}

impl<P: PersistenceContext> ScopedUnitOfWork<P> {
    /// Start building a unit of work with default options.
    pub fn builder<'p>(
        ambient: Arc<dyn AmbientContextManager>,
        persistence: P,
    ) -> UnitOfWorkBuilder<'p, P> {
        UnitOfWorkBuilder {
            ambient,
            persistence,
            parent: None,
            options: TransactionOptions::default(),
        }
    }

    pub fn persistence(&self) -> &P {
        &self.persistence
    }

    pub fn options(&self) -> TransactionOptions {
        self.scope.options()
    }

    pub fn parent(&self) -> Option<&UnitScope> {
        self.scope.parent()
    }

    /// Pick the transaction context for the calling thread.
    ///
    /// Foreign threads always go through a dependent clone so the root
    /// cannot complete while this commit is outstanding.
    fn enter_scope(&self, transaction: Transaction) -> (TransactionScope, Option<DependentTransaction>) {
        let timeout = self.scope.options().timeout();
        if !self.scope.is_scope_thread() {
            let dependent = transaction.dependent_clone(DependentCloneOption::BlockCommitUntilComplete);
            let scope = TransactionScope::new(dependent.transaction().clone(), ScopeKind::Dependent, timeout);
            (scope, Some(dependent))
        } else if self.scope.is_root() {
            (TransactionScope::new(transaction, ScopeKind::Owned, timeout), None)
        } else {
            (TransactionScope::new(transaction, ScopeKind::Joined, timeout), None)
        }
    }

    /// Release resources and unregister. Runs at most once.
    fn release(&self) {
        if !self.scope.mark_disposed() {
            return;
        }

        self.persistence.dispose_managed_resources();
        if self.scope.is_root() {
            self.scope.release_transaction();
        }
        self.ambient.unit_disposed(&self.scope);
        tracing::debug!(unit_id = %self.scope.id(), "unit of work disposed");
    }

    fn commit_owned(&self, owned: &CommittableTransaction) -> ServiceResponse<()> {
        match owned.commit() {
            Ok(()) => ServiceResponse::Data(()),
            Err(source) => {
                self.scope.set_status(TransactionStatus::Aborted);
                let local_id = owned.transaction().local_identifier().to_string();
                tracing::warn!(
                    unit_id = %self.scope.id(),
                    transaction = %local_id,
                    error = %source,
                    "final commit aborted"
                );
                PersistenceError::CommitFailed {
                    unit_id: self.scope.id(),
                    local_id,
                    source,
                }
                .into_response()
            }
        }
    }
}

impl<P: PersistenceContext> UnitOfWork for ScopedUnitOfWork<P> {
    fn scope(&self) -> &UnitScope {
        &self.scope
    }

    fn commit(&self) -> UnitOfWorkResult<ServiceResponse<()>> {
        let id = self.scope.id();
        if self.scope.is_disposed() {
            return Err(UnitOfWorkError::Disposed(id));
        }
        let Some(_gate) = self.commit_gate.try_lock() else {
            return Err(UnitOfWorkError::Committing(id));
        };
        match self.scope.status() {
            TransactionStatus::Active => return Err(UnitOfWorkError::Committing(id)),
            TransactionStatus::Committed => return Err(UnitOfWorkError::AlreadyCommitted(id)),
            TransactionStatus::Aborted => return Err(UnitOfWorkError::AlreadyAborted(id)),
            TransactionStatus::InDoubt => {}
        }

        if !self.ambient.can_commit_unit_of_work(&self.scope) {
            tracing::warn!(unit_id = %id, "ambient context refused commit");
            return Ok(PersistenceError::UnitOfWorkNonCommittable(id).into_response());
        }

        let Some(transaction) = self.scope.scope_transaction() else {
            tracing::warn!(unit_id = %id, "scope transaction already released");
            return Ok(PersistenceError::ScopeTransactionIsNull(id).into_response());
        };

        let owned = if self.scope.is_root() {
            self.scope.owned_transaction()
        } else {
            None
        };
        let (scope, dependent) = self.enter_scope(transaction);

        tracing::debug!(
            unit_id = %id,
            kind = ?scope.kind(),
            transaction = %scope.transaction().local_identifier(),
            "committing unit of work"
        );
        *self.current.lock() = Some(scope.transaction().clone());
        self.scope.set_status(TransactionStatus::Active);

        let response = self
            .persistence
            .commit_transaction(&scope)
            .catch(|error| {
                self.scope.set_status(TransactionStatus::Aborted);
                tracing::warn!(unit_id = %id, code = error.code(), "unit of work aborted");
            })
            .bind(move |()| {
                self.scope.set_status(TransactionStatus::Committed);
                scope.complete();
                if let Some(dependent) = dependent {
                    dependent.complete();
                }
                // Only the root completes the shared transaction.
                match owned {
                    Some(owned) => self.commit_owned(&owned),
                    None => ServiceResponse::Data(()),
                }
            })
            .on_data(|()| tracing::info!(unit_id = %id, "unit of work committed"));

        *self.current.lock() = None;
        Ok(response)
    }

    fn rollback(&self) {
        tracing::debug!(unit_id = %self.scope.id(), status = %self.scope.status(), "rolling back unit of work");
        self.persistence.rollback();
    }

    fn dispose(&self) {
        if self.scope.is_disposed() {
            return;
        }
        if !self.ambient.can_dispose_unit_of_work(&self.scope) {
            tracing::debug!(unit_id = %self.scope.id(), "ambient context deferred dispose");
            return;
        }
        self.release();
    }

    fn transaction_information(&self) -> UnitOfWorkResult<Option<TransactionInformation>> {
        if self.scope.is_disposed() {
            return Err(UnitOfWorkError::Disposed(self.scope.id()));
        }
        if self.scope.status() != TransactionStatus::Active {
            return Ok(None);
        }
        Ok(self.current.lock().as_ref().map(Transaction::information))
    }
}

/// The last chance to release: a refusal from the ambient context cannot be
/// retried once the unit is gone, so dropping releases regardless.
impl<P: PersistenceContext> Drop for ScopedUnitOfWork<P> {
    fn drop(&mut self) {
        if self.scope.is_disposed() {
            return;
        }
        if !self.ambient.can_dispose_unit_of_work(&self.scope) {
            tracing::warn!(
                unit_id = %self.scope.id(),
                "unit of work dropped while its ambient context is still in use"
            );
        }
        self.release();
    }
}

impl<P: PersistenceContext> std::fmt::Debug for ScopedUnitOfWork<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScopedUnitOfWork")
            .field("scope", &self.scope)
            .field("options", &self.scope.options())
            .finish()
    }
}
