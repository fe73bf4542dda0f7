//! Error payload carried by a failed [`ServiceResponse`](super::ServiceResponse).

use std::borrow::Cow;
use std::error::Error as StdError;
use std::fmt;
use std::sync::Arc;

use thiserror::Error;

/// A failure reported through the result protocol.
///
/// The `code` is stable and meant for matching; the wrapped error keeps the
/// full context (and can be downcast back to its concrete type).
#[derive(Clone)]
pub struct ResponseError {
    code: Cow<'static, str>,
    error: Arc<dyn StdError + Send + Sync>,
}

/// Plain message error for callers that have nothing richer to wrap.
#[derive(Debug, Error)]
#[error("{0}")]
struct MessageError(String);

impl ResponseError {
    /// Wrap an error under the given code.
    pub fn new<E>(code: impl Into<Cow<'static, str>>, error: E) -> Self
    where
        E: StdError + Send + Sync + 'static,
    {
        Self {
            code: code.into(),
            error: Arc::new(error),
        }
    }

    /// Create an error from a code and a message.
    pub fn message(code: impl Into<Cow<'static, str>>, message: impl Into<String>) -> Self {
        Self::new(code, MessageError(message.into()))
    }

    /// The stable error code.
    pub fn code(&self) -> &str {
        &self.code
    }

    /// The wrapped error.
    pub fn inner(&self) -> &(dyn StdError + Send + Sync + 'static) {
        self.error.as_ref()
    }

    /// Downcast the wrapped error to a concrete type.
    pub fn downcast_ref<E: StdError + 'static>(&self) -> Option<&E> {
        self.error.downcast_ref::<E>()
    }
}

impl fmt::Debug for ResponseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResponseError")
            .field("code", &self.code)
            .field("error", &self.error)
            .finish()
    }
}

impl fmt::Display for ResponseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.error)
    }
}

impl StdError for ResponseError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        Some(self.error.as_ref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, thiserror::Error)]
    #[error("disk full")]
    struct DiskFull;

    #[test]
    fn test_message_error() {
        let err = ResponseError::message("Validation", "name is required");
        assert_eq!(err.code(), "Validation");
        assert_eq!(err.to_string(), "Validation: name is required");
        assert_eq!(err.inner().to_string(), "name is required");
        assert!(err.downcast_ref::<MessageError>().is_some());
    }

    #[test]
    fn test_downcast_wrapped_error() {
        let err = ResponseError::new("Io", DiskFull);
        assert!(err.downcast_ref::<DiskFull>().is_some());
        assert!(err.downcast_ref::<MessageError>().is_none());
        assert_eq!(err.source().map(|s| s.to_string()), Some("disk full".into()));
    }
}
