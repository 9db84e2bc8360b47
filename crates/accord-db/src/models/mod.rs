//! Row models and queries.
//!
//! Each model maps one table to its domain type and exposes the queries the
//! [`PgStore`](crate::PgStore) needs. Queries take a `&mut PgConnection` so
//! they run inside the caller's transaction.

pub mod application;
pub mod employee;
pub mod ledger;

pub use application::ApplicationRow;
pub use employee::EmployeeRow;
pub use ledger::LedgerRow;
