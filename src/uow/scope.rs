//! The shared, thread-safe node each unit of work contributes to its chain.
//!
//! Ambient context managers inspect units through this type, and nested
//! units reach their root's transaction through it.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;
use std::thread::{self, ThreadId};

use chrono::TimeDelta;
use parking_lot::{Mutex, RwLock};

use crate::transaction::{CommittableTransaction, Transaction, TransactionOptions, TransactionStatus};
use crate::uow::id::UnitOfWorkId;

enum TransactionSlot {
    /// Not created yet; roots create it on first use.
    Pending,
    Live(Arc<CommittableTransaction>),
    Released,
}

struct ScopeInner {
    id: UnitOfWorkId,
    parent: Option<UnitScope>,
    scope_thread: ThreadId,
    options: RwLock<TransactionOptions>,
    status: AtomicU8,
    disposed: AtomicBool,
    /// Only used by roots.
    transaction: Mutex<TransactionSlot>,
}

/// Cloneable view of one unit of work within its parent/child chain.
#[derive(Clone)]
pub struct UnitScope {
    inner: Arc<ScopeInner>,
}

impl UnitScope {
    /// Open a scope on the current thread.
    pub(crate) fn new(parent: Option<UnitScope>, options: TransactionOptions) -> Self {
        Self {
            inner: Arc::new(ScopeInner {
                id: UnitOfWorkId::new(),
                parent,
                scope_thread: thread::current().id(),
                options: RwLock::new(options),
                status: AtomicU8::new(TransactionStatus::InDoubt.as_u8()),
                disposed: AtomicBool::new(false),
                transaction: Mutex::new(TransactionSlot::Pending),
            }),
        }
    }

    pub fn id(&self) -> UnitOfWorkId {
        self.inner.id
    }

    pub fn parent(&self) -> Option<&UnitScope> {
        self.inner.parent.as_ref()
    }

    pub fn is_root(&self) -> bool {
        self.inner.parent.is_none()
    }

    /// Number of ancestors; zero for a root.
    pub fn depth(&self) -> usize {
        self.ancestors().count()
    }

    /// Ancestors from the direct parent up to the root.
    pub fn ancestors(&self) -> impl Iterator<Item = &UnitScope> {
        std::iter::successors(self.parent(), |&scope| scope.parent())
    }

    pub fn root(&self) -> &UnitScope {
        self.ancestors().last().unwrap_or(self)
    }

    /// Check if `id` is a (transitive) ancestor of this scope.
    pub fn has_ancestor(&self, id: UnitOfWorkId) -> bool {
        self.ancestors().any(|scope| scope.id() == id)
    }

    /// Thread the unit was opened on.
    pub fn scope_thread(&self) -> ThreadId {
        self.inner.scope_thread
    }

    pub fn is_scope_thread(&self) -> bool {
        thread::current().id() == self.inner.scope_thread
    }

    pub fn options(&self) -> TransactionOptions {
        *self.inner.options.read()
    }

    pub fn status(&self) -> TransactionStatus {
        TransactionStatus::from_u8(self.inner.status.load(Ordering::Acquire))
    }

    pub fn is_disposed(&self) -> bool {
        self.inner.disposed.load(Ordering::Acquire)
    }

    /// Check if a root transaction has been created for the chain.
    pub fn has_transaction(&self) -> bool {
        matches!(*self.root().inner.transaction.lock(), TransactionSlot::Live(_))
    }

    pub(crate) fn set_status(&self, status: TransactionStatus) {
        self.inner.status.store(status.as_u8(), Ordering::Release);
    }

    /// Mark disposed; returns `false` if it already was.
    pub(crate) fn mark_disposed(&self) -> bool {
        !self.inner.disposed.swap(true, Ordering::AcqRel)
    }

    /// Lower this scope's timeout, replacing its options wholesale.
    pub(crate) fn lower_timeout(&self, timeout: TimeDelta) {
        {
            let mut options = self.inner.options.write();
            if timeout >= options.timeout() {
                return;
            }
            *options = options.with_timeout(timeout);
        }
        if let TransactionSlot::Live(ref owned) = *self.inner.transaction.lock() {
            owned.transaction().lower_timeout(timeout);
        }
    }

    /// The chain's transaction. Roots create it on first use; nested units
    /// alias their root's. `None` once the root has released it.
    pub(crate) fn scope_transaction(&self) -> Option<Transaction> {
        if let Some(parent) = self.parent() {
            return parent.scope_transaction();
        }
        let mut slot = self.inner.transaction.lock();
        match *slot {
            TransactionSlot::Pending => {
                let owned = Arc::new(CommittableTransaction::new(&self.options()));
                let transaction = owned.transaction().clone();
                *slot = TransactionSlot::Live(owned);
                Some(transaction)
            }
            TransactionSlot::Live(ref owned) => Some(owned.transaction().clone()),
            TransactionSlot::Released => None,
        }
    }

    /// The owning handle, for roots whose transaction is live.
    pub(crate) fn owned_transaction(&self) -> Option<Arc<CommittableTransaction>> {
        match *self.inner.transaction.lock() {
            TransactionSlot::Live(ref owned) => Some(owned.clone()),
            _ => None,
        }
    }

    /// Give up the owning handle. An uncommitted transaction rolls back once
    /// no commit call still holds it.
    pub(crate) fn release_transaction(&self) {
        let previous = std::mem::replace(&mut *self.inner.transaction.lock(), TransactionSlot::Released);
        drop(previous);
    }
}

impl PartialEq for UnitScope {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for UnitScope {}

impl fmt::Debug for UnitScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UnitScope")
            .field("id", &self.inner.id)
            .field("parent", &self.parent().map(UnitScope::id))
            .field("status", &self.status())
            .field("disposed", &self.is_disposed())
            .finish()
    }
}
