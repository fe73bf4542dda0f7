//! Transaction resource for units of work.
//!
//! This module provides the in-process transaction a chain of units of work
//! shares. The root unit owns a [`CommittableTransaction`]; nested units hold
//! [`Transaction`] aliases; commits from foreign threads go through a
//! [`DependentTransaction`] that keeps the owner's commit open until it
//! completes.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                 CommittableTransaction                      │
//! │        (owned by the root unit, completes the chain)        │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!        ┌─────────────────────┼─────────────────────┐
//!        │                     │                     │
//!        ▼                     ▼                     ▼
//!  ┌─────────────┐       ┌─────────────┐       ┌─────────────┐
//!  │ Transaction │       │  Dependent  │       │ Enlistment  │
//!  │   (alias)   │       │    clone    │       │  (2PC vote) │
//!  └─────────────┘       └─────────────┘       └─────────────┘
//!                              │
//!                              ▼
//!                     ┌─────────────────┐
//!                     │TransactionScope │
//!                     │ (one commit)    │
//!                     └─────────────────┘
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use txscope::transaction::{CommittableTransaction, DependentCloneOption, TransactionOptions};
//!
//! let tx = CommittableTransaction::new(&TransactionOptions::default());
//! let dependent = tx.transaction().dependent_clone(DependentCloneOption::BlockCommitUntilComplete);
//!
//! std::thread::spawn(move || {
//!     // ... work ...
//!     dependent.complete();
//! });
//!
//! tx.commit()?; // waits for the dependent clone
//! ```

mod enlistment;
mod error;
mod handle;
mod isolation;
mod options;
mod scope;
mod status;

pub use enlistment::{EnlistmentNotification, Vote};
pub use error::{AbortReason, TransactionAbortedError, TransactionResult};
pub use handle::{
    CommittableTransaction, DependentCloneOption, DependentTransaction, Transaction,
    TransactionInformation,
};
pub use isolation::IsolationLevel;
pub use options::{TransactionOptions, DEFAULT_TRANSACTION_TIMEOUT};
pub use scope::{ScopeKind, TransactionScope};
pub use status::TransactionStatus;
