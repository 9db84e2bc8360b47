//! Accord Core Library
//!
//! Domain types and the storage contract shared by the access reconciliation
//! engine.
//!
//! # Modules
//!
//! - [`ids`] - Strongly typed identifiers (`ScotiaId`, `CaseId`)
//! - [`types`] - Employees, policy rows, ledger events and their enumerations
//! - [`store`] - The transactional [`Store`] contract every backend implements
//! - [`memory`] - [`InMemoryStore`], a serializable in-process backend with fault injection
//! - [`error`] - Storage error type ([`StoreError`])
//!
//! # Example
//!
//! ```
//! use accord_core::{AccessKey, CaseId, ScotiaId};
//! use chrono::{TimeZone, Utc};
//!
//! let employee = ScotiaId::from("E1");
//! let at = Utc.with_ymd_and_hms(2024, 3, 1, 9, 30, 0).unwrap();
//! let case_id = CaseId::generate(at, &employee);
//! assert_eq!(case_id.as_str(), "CASE-20240301093000-E1");
//!
//! let key = AccessKey::new("JIRA", Some("Viewer"));
//! assert_eq!(key.to_string(), "JIRA/Viewer");
//! ```

pub mod error;
pub mod ids;
pub mod memory;
pub mod store;
pub mod types;

pub use error::{ParseEnumError, StoreError, StoreResult};
pub use ids::{CaseId, ScotiaId};
pub use memory::{InMemoryStore, InMemoryTransaction};
pub use store::{Store, StoreTransaction};
pub use types::{
    AccessDirection, AccessKey, Application, Employee, IsolationLevel, LedgerEvent,
    LedgerStatus, LedgerStatusUpdate, NewApplication, NewLedgerEvent, ProcessAccess, UpsertMode,
    GRANT_PREFIX, REVOKE_PREFIX,
};
