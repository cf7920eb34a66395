// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Error types for historical cache operations.

use std::fmt;

use crate::Key;

/// The category of an [`Error`].
///
/// Absent values are never errors; lookups report them as `Ok(None)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum ErrorKind {
    /// The backend reader or frontier probe could not answer.
    Backend,
    /// A range load returned values that are not sorted ascending by key.
    UnsortedValues,
    /// A forward query was asked to shift by zero units.
    InvalidShift,
}

impl ErrorKind {
    /// Returns a stable, human-readable name for this kind.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Backend => "backend unavailable",
            Self::UnsortedValues => "range load not sorted ascending",
            Self::InvalidShift => "shift units must be positive",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An error from a historical cache operation.
///
/// The [`kind`](Error::kind) tells callers how to react; the underlying
/// cause, if any, is available through [`std::error::Error::source()`].
///
/// # Examples
///
/// ```
/// use histocache_tier::{Error, ErrorKind};
///
/// let error = Error::backend("connection reset");
/// assert_eq!(error.kind(), ErrorKind::Backend);
/// assert!(error.to_string().contains("connection reset"));
/// ```
#[ohno::error]
#[display("{kind}")]
pub struct Error {
    kind: ErrorKind,
}

impl Error {
    /// Creates a backend error from any underlying failure.
    ///
    /// Reader and probe implementations use this to report I/O problems.
    pub fn backend(cause: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        Self::caused_by(ErrorKind::Backend, cause)
    }

    /// Creates the error raised when a range load yields `next` after `previous`
    /// although `next` sorts before it.
    #[must_use]
    pub fn unsorted(previous: Key, next: Key) -> Self {
        Self::caused_by(
            ErrorKind::UnsortedValues,
            format!("not ascending sorted: [{previous}] is followed by [{next}]"),
        )
    }

    /// Creates the error raised for a non-positive shift count.
    #[must_use]
    pub fn invalid_shift(units: usize) -> Self {
        Self::caused_by(ErrorKind::InvalidShift, format!("got {units} shift units"))
    }

    /// Returns the category of this error.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }
}

/// A specialized [`Result`] type for historical cache operations.
pub type Result<T> = std::result::Result<T, Error>;
