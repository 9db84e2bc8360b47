//! Type definitions for the access reconciliation domain.
//!
//! Includes the headcount record, policy matrix rows, ledger events and the
//! enumerations whose literal spellings are part of the external interface.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ParseEnumError;
use crate::ids::{CaseId, ScotiaId};

/// Description prefix marking a lateral-movement revoke.
pub const REVOKE_PREFIX: &str = "Revoke:";

/// Description prefix marking a lateral-movement grant.
pub const GRANT_PREFIX: &str = "Grant:";

// ============================================================================
// Enums
// ============================================================================

/// Lifecycle process that produced a ledger event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessAccess {
    /// Joiner: initial grants from policy.
    Onboarding,
    /// Leaver: revocation of everything held.
    Offboarding,
    /// Mover: revokes and grants between two placements.
    LateralMovement,
    /// Ad-hoc grant requested by a responsible person.
    ManualAccess,
}

impl ProcessAccess {
    /// All variants, in declaration order.
    pub const ALL: [Self; 4] = [
        Self::Onboarding,
        Self::Offboarding,
        Self::LateralMovement,
        Self::ManualAccess,
    ];

    /// The stored literal.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Onboarding => "onboarding",
            Self::Offboarding => "offboarding",
            Self::LateralMovement => "lateral_movement",
            Self::ManualAccess => "manual_access",
        }
    }
}

impl fmt::Display for ProcessAccess {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProcessAccess {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|p| p.as_str() == s)
            .ok_or_else(|| ParseEnumError::new("process_access", s))
    }
}

/// Status of a ledger event.
///
/// Transitions: `Pending → In-Progress | Completed | Cancelled | Rejected`,
/// `In-Progress → Completed | Cancelled | Rejected`. The remaining statuses
/// are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum LedgerStatus {
    /// Ticket raised, not yet picked up.
    Pending,
    /// Ticket being worked.
    #[serde(rename = "In-Progress")]
    InProgress,
    /// Change applied in the target application.
    Completed,
    /// Ticket withdrawn.
    Cancelled,
    /// Ticket refused by the application owner.
    Rejected,
}

impl LedgerStatus {
    /// All variants, in declaration order.
    pub const ALL: [Self; 5] = [
        Self::Pending,
        Self::InProgress,
        Self::Completed,
        Self::Cancelled,
        Self::Rejected,
    ];

    /// The stored literal.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "Pending",
            Self::InProgress => "In-Progress",
            Self::Completed => "Completed",
            Self::Cancelled => "Cancelled",
            Self::Rejected => "Rejected",
        }
    }

    /// Whether an event in this status counts towards effective state.
    #[must_use]
    pub const fn is_effective(self) -> bool {
        matches!(self, Self::Pending | Self::InProgress | Self::Completed)
    }

    /// Whether no further transition is allowed.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled | Self::Rejected)
    }

    /// Whether `self → next` is a legal transition.
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        match self {
            Self::Pending => !matches!(next, Self::Pending),
            Self::InProgress => next.is_terminal(),
            Self::Completed | Self::Cancelled | Self::Rejected => false,
        }
    }
}

impl fmt::Display for LedgerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LedgerStatus {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| ParseEnumError::new("status", s))
    }
}

/// Whether an event adds or removes access.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccessDirection {
    /// The event grants the access.
    Grant,
    /// The event removes the access.
    Revoke,
}

impl AccessDirection {
    /// Derive the direction of an event from its process and description.
    ///
    /// Lateral movements carry their direction in the description prefix.
    #[must_use]
    pub fn of(process: ProcessAccess, description: Option<&str>) -> Self {
        match process {
            ProcessAccess::Onboarding | ProcessAccess::ManualAccess => Self::Grant,
            ProcessAccess::Offboarding => Self::Revoke,
            ProcessAccess::LateralMovement => {
                if description.is_some_and(|d| d.starts_with(REVOKE_PREFIX)) {
                    Self::Revoke
                } else {
                    Self::Grant
                }
            }
        }
    }
}

impl fmt::Display for AccessDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Grant => write!(f, "grant"),
            Self::Revoke => write!(f, "revoke"),
        }
    }
}

/// Transaction isolation requested from relational backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IsolationLevel {
    /// Read committed; relies on the dedup query for duplicate suppression.
    ReadCommitted,
    /// Repeatable read snapshot.
    RepeatableRead,
    /// Full serializability.
    #[default]
    Serializable,
}

impl IsolationLevel {
    /// SQL spelling used in `SET TRANSACTION ISOLATION LEVEL`.
    #[must_use]
    pub const fn as_sql(self) -> &'static str {
        match self {
            Self::ReadCommitted => "READ COMMITTED",
            Self::RepeatableRead => "REPEATABLE READ",
            Self::Serializable => "SERIALIZABLE",
        }
    }
}

impl FromStr for IsolationLevel {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace([' ', '-'], "_").as_str() {
            "read_committed" => Ok(Self::ReadCommitted),
            "repeatable_read" => Ok(Self::RepeatableRead),
            "serializable" => Ok(Self::Serializable),
            _ => Err(ParseEnumError::new("isolation_level", s)),
        }
    }
}

// ============================================================================
// Access key
// ============================================================================

/// An `(application, role)` pair.
///
/// `role_name = None` is its own value, distinct from every named role, and
/// sorts before all of them.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct AccessKey {
    /// Logical access name of the application.
    pub app_access_name: String,
    /// Role within the application, if any.
    pub role_name: Option<String>,
}

impl AccessKey {
    /// Build a key from borrowed parts.
    pub fn new(app_access_name: impl Into<String>, role_name: Option<&str>) -> Self {
        Self {
            app_access_name: app_access_name.into(),
            role_name: role_name.map(str::to_string),
        }
    }
}

impl fmt::Display for AccessKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.role_name {
            Some(role) => write!(f, "{}/{}", self.app_access_name, role),
            None => write!(f, "{}/<none>", self.app_access_name),
        }
    }
}

// ============================================================================
// Employee
// ============================================================================

/// Authoritative headcount record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Employee {
    /// Headcount identifier.
    pub scotia_id: ScotiaId,
    /// Display name.
    pub full_name: String,
    /// Corporate email.
    pub email: String,
    /// Position, matched exactly against `Application::position_role`.
    pub position: String,
    /// Organizational unit, matched exactly against `Application::unit`.
    pub unit: String,
    /// `false` once offboarded. Never flipped back by the engine.
    pub active: bool,
    /// Hire date, if known.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub start_date: Option<DateTime<Utc>>,
    /// When the employee was deactivated.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub end_date: Option<DateTime<Utc>>,
}

impl Employee {
    /// A new active employee with no lifecycle timestamps.
    pub fn new(
        scotia_id: impl Into<ScotiaId>,
        full_name: impl Into<String>,
        email: impl Into<String>,
        position: impl Into<String>,
        unit: impl Into<String>,
    ) -> Self {
        Self {
            scotia_id: scotia_id.into(),
            full_name: full_name.into(),
            email: email.into(),
            position: position.into(),
            unit: unit.into(),
            active: true,
            start_date: None,
            end_date: None,
        }
    }
}

/// How [`StoreTransaction::upsert_employee`](crate::StoreTransaction::upsert_employee)
/// treats an existing record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertMode {
    /// Fail with `Conflict` if the id exists.
    Insert,
    /// Overwrite the existing record's attributes.
    Replace,
}

// ============================================================================
// Application (policy matrix row)
// ============================================================================

/// One row of the policy matrix.
///
/// A logical access name may appear on many rows, one per entitled
/// `(unit, position_role)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Application {
    /// Surrogate identifier.
    pub id: i64,
    /// Business name of the access target.
    pub logical_access_name: String,
    /// Unit entitled by this row.
    pub unit: String,
    /// Position entitled by this row.
    pub position_role: String,
    /// Role granted inside the application.
    pub role_name: Option<String>,
    /// Access category.
    pub access_category: Option<String>,
    /// Application owner.
    pub owner: Option<String>,
    /// Free-form description.
    pub description: Option<String>,
}

impl Application {
    /// The `(app, role)` pair this row entitles.
    #[must_use]
    pub fn access_key(&self) -> AccessKey {
        AccessKey::new(self.logical_access_name.clone(), self.role_name.as_deref())
    }
}

/// Input for creating a policy row.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewApplication {
    pub logical_access_name: String,
    pub unit: String,
    pub position_role: String,
    pub role_name: Option<String>,
    pub access_category: Option<String>,
    pub owner: Option<String>,
    pub description: Option<String>,
}

impl NewApplication {
    /// A policy row entitling `(unit, position_role)` to `(app, role)`.
    pub fn entitle(
        logical_access_name: impl Into<String>,
        role_name: Option<&str>,
        unit: impl Into<String>,
        position_role: impl Into<String>,
    ) -> Self {
        Self {
            logical_access_name: logical_access_name.into(),
            unit: unit.into(),
            position_role: position_role.into(),
            role_name: role_name.map(str::to_string),
            ..Default::default()
        }
    }
}

// ============================================================================
// Ledger
// ============================================================================

/// Append-only record of one access transition for one employee.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEvent {
    /// Surrogate identifier; increases with insertion order.
    pub id: i64,
    pub scotia_id: ScotiaId,
    pub case_id: CaseId,
    pub process_access: ProcessAccess,
    pub app_access_name: String,
    pub role_name: Option<String>,
    pub status: LedgerStatus,
    /// UTC, second precision.
    pub record_date: DateTime<Utc>,
    pub responsible: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub closing_date: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub quality_status: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub quality_comment: Option<String>,
}

impl LedgerEvent {
    /// The `(app, role)` partition this event belongs to.
    #[must_use]
    pub fn access_key(&self) -> AccessKey {
        AccessKey::new(self.app_access_name.clone(), self.role_name.as_deref())
    }

    /// Whether this event grants or revokes.
    #[must_use]
    pub fn direction(&self) -> AccessDirection {
        AccessDirection::of(self.process_access, self.description.as_deref())
    }

    /// Whether, as the latest event of its partition, this event means the
    /// access is held.
    #[must_use]
    pub fn confers_access(&self) -> bool {
        self.direction() == AccessDirection::Grant && self.status.is_effective()
    }
}

/// A ledger event before the store assigns its surrogate id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewLedgerEvent {
    pub scotia_id: ScotiaId,
    pub case_id: CaseId,
    pub process_access: ProcessAccess,
    pub app_access_name: String,
    pub role_name: Option<String>,
    pub status: LedgerStatus,
    pub record_date: DateTime<Utc>,
    pub responsible: String,
    pub description: Option<String>,
}

impl NewLedgerEvent {
    /// Whether this event grants or revokes.
    #[must_use]
    pub fn direction(&self) -> AccessDirection {
        AccessDirection::of(self.process_access, self.description.as_deref())
    }

    /// The `(app, role)` partition this event belongs to.
    #[must_use]
    pub fn access_key(&self) -> AccessKey {
        AccessKey::new(self.app_access_name.clone(), self.role_name.as_deref())
    }
}

/// Mutation applied to an existing ledger event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerStatusUpdate {
    pub status: LedgerStatus,
    pub closing_date: Option<DateTime<Utc>>,
    pub quality_status: Option<String>,
    pub quality_comment: Option<String>,
}

impl LedgerStatusUpdate {
    /// Change only the status.
    #[must_use]
    pub fn status(status: LedgerStatus) -> Self {
        Self {
            status,
            closing_date: None,
            quality_status: None,
            quality_comment: None,
        }
    }

    /// Apply this update to an event in place. `None` fields keep their value.
    pub fn apply_to(&self, event: &mut LedgerEvent) {
        event.status = self.status;
        if let Some(closing_date) = self.closing_date {
            event.closing_date = Some(closing_date);
        }
        if let Some(quality_status) = &self.quality_status {
            event.quality_status = Some(quality_status.clone());
        }
        if let Some(quality_comment) = &self.quality_comment {
            event.quality_comment = Some(quality_comment.clone());
        }
    }
}
