//! Strongly typed identifiers.
//!
//! Employees are keyed by their headcount identifier (`scotia_id`), and all
//! ledger events emitted by one lifecycle invocation share a [`CaseId`].

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Headcount identifier of an employee.
///
/// Compared byte-for-byte; the ingest boundary is responsible for
/// canonicalization.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ScotiaId(String);

impl ScotiaId {
    /// Wrap a raw identifier.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Unwrap into the inner string.
    #[must_use]
    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Display for ScotiaId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ScotiaId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for ScotiaId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl AsRef<str> for ScotiaId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Correlation identifier shared by every event of one lifecycle invocation.
///
/// Format: `CASE-YYYYMMDDhhmmss-<scotia_id>`, UTC.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CaseId(String);

impl CaseId {
    /// Prefix carried by every generated case identifier.
    pub const PREFIX: &'static str = "CASE";

    /// Build the case identifier for an invocation started at `at`.
    #[must_use]
    pub fn generate(at: DateTime<Utc>, scotia_id: &ScotiaId) -> Self {
        Self(format!(
            "{}-{}-{}",
            Self::PREFIX,
            at.format("%Y%m%d%H%M%S"),
            scotia_id
        ))
    }

    /// Wrap a case identifier read back from storage.
    pub fn from_raw(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    /// Borrow the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CaseId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_case_id_format() {
        let at = Utc.with_ymd_and_hms(2024, 12, 31, 23, 59, 7).unwrap();
        let case_id = CaseId::generate(at, &ScotiaId::from("E42"));
        assert_eq!(case_id.as_str(), "CASE-20241231235907-E42");
    }

    #[test]
    fn test_case_id_ignores_subseconds() {
        let at = Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap()
            + chrono::Duration::milliseconds(999);
        let case_id = CaseId::generate(at, &ScotiaId::from("E1"));
        assert_eq!(case_id.as_str(), "CASE-20240102030405-E1");
    }

    #[test]
    fn test_scotia_id_serializes_transparently() {
        let json = serde_json::to_string(&ScotiaId::from("E1")).unwrap();
        assert_eq!(json, "\"E1\"");
    }
}
