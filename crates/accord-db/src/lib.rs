//! PostgreSQL backend for the access reconciliation engine.
//!
//! [`PgStore`] implements [`accord_core::Store`] over an `SQLx` pool. Every
//! transaction runs at the configured isolation level with a local
//! statement timeout, so a lifecycle invocation either commits all of its
//! ledger rows and employee changes or none of them.
//!
//! Integration tests need a live database and run with
//! `--features integration` and `TEST_DATABASE_URL` set.

pub mod error;
pub mod migrations;
pub mod models;
pub mod store;

pub use error::DbError;
pub use migrations::run_migrations;
pub use store::{PgStore, PgStoreConfig, PgTransaction};
