//! Units of work.
//!
//! ```text
//!   root (thread A)  ── owns ──>  CommittableTransaction
//!     │                                  ^
//!     ├─ child (thread A) ── joins ──────┤
//!     └─ child (thread A, committed on B) ── dependent clone ──┘
//! ```
//!
//! - [`ScopedUnitOfWork`] coordinates commit and dispose for one unit.
//! - [`UnitScope`] is the unit's node in its chain, shared with the
//!   [`AmbientContextManager`] that decides when commit and dispose may run.
//! - [`PersistenceContext`] is the persistence capability being coordinated.
//! - [`commit_concurrently`] commits a batch of units on worker threads.

mod ambient;
mod error;
mod id;
mod parallel;
mod scope;
mod unit;

pub use ambient::{AmbientContextManager, ScopeRegistry};
pub use error::{PersistenceError, UnitOfWorkError, UnitOfWorkResult};
pub use id::UnitOfWorkId;
pub use parallel::{commit_concurrently, CommitOutcome};
pub use scope::UnitScope;
pub use unit::{PersistenceContext, ScopedUnitOfWork, UnitOfWork, UnitOfWorkBuilder};
