//! Result protocol for expected outcomes.
//!
//! A [`ServiceResponse`] is either data or a [`ResponseError`]. The
//! coordinator returns one from every commit instead of failing, so callers
//! can chain follow-up work with the combinators and decide on their own
//! whether to continue, compensate or abort.
//!
//! # Usage
//!
//! ```ignore
//! use txscope::response::ServiceResponse;
//!
//! let total = unit
//!     .commit()?
//!     .catch(|e| tracing::warn!(code = e.code(), "commit failed"))
//!     .fmap(|()| 1);
//! ```

mod error;
mod service_response;

pub use error::ResponseError;
pub use service_response::ServiceResponse;
