//! Error Types
//!
//! Storage errors surfaced by every [`Store`](crate::Store) backend.
//!
//! # Example
//!
//! ```
//! use accord_core::StoreError;
//!
//! let err = StoreError::Unavailable {
//!     cause: "connection reset".to_string(),
//! };
//! assert!(err.is_retryable());
//! assert_eq!(err.to_string(), "Store unavailable: connection reset");
//! ```

use serde::Serialize;
use thiserror::Error;

/// Error returned by storage backends.
///
/// Absence (unknown employee, unknown ledger event) is not an error: store
/// operations report it as `Ok(None)` or `Ok(false)`.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StoreError {
    /// Transport-level fault: lost connection, timeout, serialization failure.
    ///
    /// The caller may retry the whole operation.
    #[error("Store unavailable: {cause}")]
    Unavailable {
        /// Description of the underlying fault
        cause: String,
    },

    /// A uniqueness constraint was violated.
    #[error("Conflict: duplicate id {id}")]
    Conflict {
        /// The key that already exists
        id: String,
    },

    /// Any other backend failure (constraint, malformed row, query error).
    #[error("Store backend error: {message}")]
    Backend {
        /// Backend-provided description
        message: String,
    },
}

impl StoreError {
    /// Shorthand for [`StoreError::Unavailable`].
    pub fn unavailable(cause: impl Into<String>) -> Self {
        Self::Unavailable {
            cause: cause.into(),
        }
    }

    /// Shorthand for [`StoreError::Backend`].
    pub fn backend(message: impl Into<String>) -> Self {
        Self::Backend {
            message: message.into(),
        }
    }

    /// Returns true if the caller may retry the operation.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Unavailable { .. })
    }

    /// Returns true if this is a uniqueness violation.
    #[must_use]
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }
}

/// Result alias for storage operations.
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// A string did not name a known enumeration literal.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown {kind} value: {value:?}")]
pub struct ParseEnumError {
    /// Name of the enumeration being parsed
    pub kind: &'static str,
    /// The rejected input
    pub value: String,
}

impl ParseEnumError {
    pub(crate) fn new(kind: &'static str, value: &str) -> Self {
        Self {
            kind,
            value: value.to_string(),
        }
    }
}
