// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Error types for cache operations.

use std::fmt;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// An error from a cache operation.
///
/// This is an opaque error type that wraps the underlying cause from a cache implementation.
/// Use [`std::error::Error::source()`] to access the cause if needed.
///
/// # Example
///
/// ```
/// use larder_tier::Error;
///
/// let error = Error::unavailable("connection refused");
/// assert!(error.is_unavailable());
/// ```
#[derive(Debug, thiserror::Error)]
#[error("{kind}: {cause}")]
pub struct Error {
    kind: ErrorKind,
    #[source]
    cause: BoxError,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ErrorKind {
    Operation,
    Unavailable,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Operation => f.write_str("cache operation failed"),
            Self::Unavailable => f.write_str("cache tier unavailable"),
        }
    }
}

impl Error {
    /// Creates a new error from any type that can be converted to an error.
    ///
    /// # Examples
    ///
    /// ```
    /// use larder_tier::Error;
    ///
    /// let error = Error::from_message("operation failed");
    /// assert!(!error.is_unavailable());
    /// ```
    pub fn from_message(cause: impl Into<BoxError>) -> Self {
        Self {
            kind: ErrorKind::Operation,
            cause: cause.into(),
        }
    }

    /// Wraps an error returned by the storage backend.
    pub fn from_source<E>(source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::from_message(source)
    }

    /// Creates an error signalling that the tier could not be reached.
    ///
    /// Selectors fall back to another tier on this kind of error.
    pub fn unavailable(cause: impl Into<BoxError>) -> Self {
        Self {
            kind: ErrorKind::Unavailable,
            cause: cause.into(),
        }
    }

    /// Returns `true` if the tier could not be reached.
    #[must_use]
    pub fn is_unavailable(&self) -> bool {
        self.kind == ErrorKind::Unavailable
    }
}

/// A specialized [`Result`] type for cache operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use std::error::Error as _;

    use super::*;

    static_assertions::assert_impl_all!(Error: Send, Sync, std::error::Error);

    #[test]
    fn display_contains_kind_and_cause() {
        let error = Error::from_message("disk full");
        assert_eq!(error.to_string(), "cache operation failed: disk full");

        let error = Error::unavailable("connection refused");
        assert_eq!(error.to_string(), "cache tier unavailable: connection refused");
    }

    #[test]
    fn from_source_keeps_source_chain() {
        let io = std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset by peer");
        let error = Error::from_source(io);

        let source = error.source().expect("source should be kept");
        assert!(source.to_string().contains("reset by peer"));
        assert!(!error.is_unavailable());
    }

    #[test]
    fn result_type_alias_propagates_errors() {
        fn returns_err() -> Result<i32> {
            Err(Error::from_message("expected failure"))
        }

        let err = returns_err().expect_err("should return an error");
        assert!(err.to_string().contains("expected failure"));
    }
}
