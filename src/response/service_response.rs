//! Either-style success/failure container.

use crate::response::error::ResponseError;

/// The outcome of an operation whose failures are expected.
#[must_use = "a ServiceResponse may carry an error that should be inspected"]
#[derive(Debug, Clone)]
pub enum ServiceResponse<T> {
    /// Success.
    Data(T),
    /// Expected failure.
    Error(ResponseError),
}

impl<T> ServiceResponse<T> {
    /// Check if this response carries data.
    pub fn is_data(&self) -> bool {
        matches!(self, ServiceResponse::Data(_))
    }

    /// Check if this response carries an error.
    pub fn is_error(&self) -> bool {
        matches!(self, ServiceResponse::Error(_))
    }

    pub fn data(&self) -> Option<&T> {
        match self {
            ServiceResponse::Data(data) => Some(data),
            ServiceResponse::Error(_) => None,
        }
    }

    pub fn error(&self) -> Option<&ResponseError> {
        match self {
            ServiceResponse::Data(_) => None,
            ServiceResponse::Error(error) => Some(error),
        }
    }

    /// Chain another fallible step onto the data, short-circuiting on error.
    pub fn bind<U, F>(self, f: F) -> ServiceResponse<U>
    where
        F: FnOnce(T) -> ServiceResponse<U>,
    {
        match self {
            ServiceResponse::Data(data) => f(data),
            ServiceResponse::Error(error) => ServiceResponse::Error(error),
        }
    }

    /// Map the data, leaving an error untouched.
    pub fn fmap<U, F>(self, f: F) -> ServiceResponse<U>
    where
        F: FnOnce(T) -> U,
    {
        match self {
            ServiceResponse::Data(data) => ServiceResponse::Data(f(data)),
            ServiceResponse::Error(error) => ServiceResponse::Error(error),
        }
    }

    /// Run `f` if this is an error. Returns the response unchanged.
    pub fn catch<F>(self, f: F) -> Self
    where
        F: FnOnce(&ResponseError),
    {
        if let ServiceResponse::Error(ref error) = self {
            f(error);
        }
        self
    }

    /// Run `f` if this carries data. Returns the response unchanged.
    pub fn on_data<F>(self, f: F) -> Self
    where
        F: FnOnce(&T),
    {
        if let ServiceResponse::Data(ref data) = self {
            f(data);
        }
        self
    }

    /// Redirect control flow on error with a new response.
    pub fn catch_and_continue<F>(self, f: F) -> Self
    where
        F: FnOnce(ResponseError) -> ServiceResponse<T>,
    {
        match self {
            ServiceResponse::Data(data) => ServiceResponse::Data(data),
            ServiceResponse::Error(error) => f(error),
        }
    }

    /// Replace an error with a value.
    pub fn recover<F>(self, f: F) -> Self
    where
        F: FnOnce(ResponseError) -> T,
    {
        match self {
            ServiceResponse::Data(data) => ServiceResponse::Data(data),
            ServiceResponse::Error(error) => ServiceResponse::Data(f(error)),
        }
    }

    /// Run `f` regardless of the outcome.
    pub fn run<F>(self, f: F) -> Self
    where
        F: FnOnce(),
    {
        f();
        self
    }

    /// Collapse both sides into one value.
    pub fn fold<U, E, D>(self, on_error: E, on_data: D) -> U
    where
        E: FnOnce(ResponseError) -> U,
        D: FnOnce(T) -> U,
    {
        match self {
            ServiceResponse::Data(data) => on_data(data),
            ServiceResponse::Error(error) => on_error(error),
        }
    }

    /// Convert into a standard `Result` for use with `?`.
    pub fn into_result(self) -> Result<T, ResponseError> {
        match self {
            ServiceResponse::Data(data) => Ok(data),
            ServiceResponse::Error(error) => Err(error),
        }
    }
}

impl<T> From<Result<T, ResponseError>> for ServiceResponse<T> {
    fn from(result: Result<T, ResponseError>) -> Self {
        match result {
            Ok(data) => ServiceResponse::Data(data),
            Err(error) => ServiceResponse::Error(error),
        }
    }
}

impl<T> From<ResponseError> for ServiceResponse<T> {
    fn from(error: ResponseError) -> Self {
        ServiceResponse::Error(error)
    }
}
