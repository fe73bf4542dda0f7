//! txscope - nested, thread-aware units of work over an ambient transaction
//!
//! A unit of work is a bounded scope of transactional operations. Units nest:
//! a root owns a transaction, and nested units join it. Any unit may be
//! committed from a thread other than the one that opened it. When that
//! happens the commit runs against a dependent clone, which holds the root's
//! commit open until the clone completes.
//!
//! Expected commit outcomes are reported as a [`response::ServiceResponse`].
//! Contract violations (double commit, use after dispose, invalid options)
//! come back as [`uow::UnitOfWorkError`].
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use txscope::response::ServiceResponse;
//! use txscope::transaction::TransactionScope;
//! use txscope::uow::{PersistenceContext, ScopeRegistry, ScopedUnitOfWork, UnitOfWork};
//!
//! struct Noop;
//!
//! impl PersistenceContext for Noop {
//!     fn commit_transaction(&self, _scope: &TransactionScope) -> ServiceResponse<()> {
//!         ServiceResponse::Data(())
//!     }
//!     fn rollback(&self) {}
//!     fn dispose_managed_resources(&self) {}
//! }
//!
//! let ambient = Arc::new(ScopeRegistry::new());
//! let root = ScopedUnitOfWork::builder(ambient.clone(), Noop).build().unwrap();
//! let child = ScopedUnitOfWork::builder(ambient, Noop).parent(&root).build().unwrap();
//!
//! assert!(child.commit().unwrap().is_data());
//! assert!(root.commit().unwrap().is_data());
//! ```

pub mod config;
pub mod response;
pub mod transaction;
pub mod uow;
