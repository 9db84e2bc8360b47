//! Error types for the accord-governance crate.

use accord_core::{LedgerStatus, ScotiaId, StoreError};
use thiserror::Error;

/// Result alias for governance operations.
pub type Result<T> = std::result::Result<T, GovernanceError>;

/// Errors surfaced by lifecycle, reporting and ledger operations.
///
/// A ticket skipped by deduplication is not an error; see
/// [`AppendOutcome`](crate::AppendOutcome).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GovernanceError {
    // Lookup errors (fatal to the operation, nothing persisted)
    /// The operation referenced an unknown employee.
    #[error("Employee not found: {0}")]
    EmployeeNotFound(ScotiaId),

    /// The employee is inactive and cannot receive new access.
    #[error("Employee is inactive: {0}")]
    EmployeeInactive(ScotiaId),

    /// Onboarding against a placement with no policy rows.
    #[error("No policy for position {position} in unit {unit}")]
    NoPolicyForPosition { unit: String, position: String },

    /// An employee with this id already exists.
    #[error("Duplicate employee: {0}")]
    DuplicateEmployee(String),

    /// No policy row carries this logical access name.
    #[error("Unknown application: {0}")]
    UnknownApplication(String),

    /// The ledger event does not exist.
    #[error("Ledger event not found: {0}")]
    LedgerEventNotFound(i64),

    /// The requested status change is not allowed.
    #[error("Invalid status transition: {from} -> {to}")]
    InvalidStatusTransition {
        from: LedgerStatus,
        to: LedgerStatus,
    },

    // Store errors
    /// Transport fault or timeout. The caller may retry the operation.
    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),

    /// A uniqueness constraint other than the employee id was violated.
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Non-retryable backend failure.
    #[error("Store error: {0}")]
    Store(StoreError),

    // Configuration errors
    /// Required configuration is missing.
    #[error("Configuration missing: {var}")]
    ConfigMissing { var: String },

    /// Configuration value is invalid.
    #[error("Configuration invalid for {var}: {reason}")]
    ConfigInvalid { var: String, reason: String },
}

impl GovernanceError {
    /// Returns true if the caller may retry the whole operation.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::StoreUnavailable(_))
    }

    /// Returns true if the error reports a missing record.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::EmployeeNotFound(_) | Self::LedgerEventNotFound(_) | Self::UnknownApplication(_)
        )
    }
}

impl From<StoreError> for GovernanceError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Unavailable { cause } => Self::StoreUnavailable(cause),
            StoreError::Conflict { id } => Self::Conflict(id),
            other @ StoreError::Backend { .. } => Self::Store(other),
        }
    }
}
