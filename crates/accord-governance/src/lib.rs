//! Access reconciliation engine.
//!
//! Compares what employees can access (the projection of an append-only
//! ledger of access tickets) with what the policy matrix says their
//! placement entitles them to, and emits grant and revoke tickets to close
//! the gap during onboarding, lateral movement, offboarding, manual
//! requests and conciliation.
//!
//! # Services
//!
//! The [`services`] module provides:
//! - [`services::LifecycleEngine`] - Joiner, mover, leaver, manual access and conciliation flows
//! - [`services::TicketWriter`] - Deduplicated appends to the ledger
//! - [`services::AccessProjector`] - Effective access from ledger history
//! - [`services::PolicyResolver`] - Target access of a `(unit, position)` placement
//! - [`services::Reporter`] - Reconciliation and ledger projection reports
//! - [`services::LedgerService`] - Ticket status updates and history
//! - [`services::HeadcountService`] - Employee ingest
//!
//! [`AccessGovernance`] wires all of them over one [`accord_core::Store`].
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//!
//! use accord_core::{Employee, InMemoryStore, NewApplication, Store};
//! use accord_governance::{AccessGovernance, EngineConfig};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> accord_governance::Result<()> {
//! let store = Arc::new(InMemoryStore::new());
//! store
//!     .insert_application(&NewApplication::entitle("JIRA", Some("Viewer"), "TECH", "ANALYST"))
//!     .await?;
//!
//! let engine = AccessGovernance::new(store, EngineConfig::default(), None)?;
//! engine
//!     .headcount()
//!     .register(&Employee::new("E1", "Ada", "ada@example.com", "ANALYST", "TECH"))
//!     .await?;
//!
//! let batch = engine
//!     .lifecycle()
//!     .onboarding(&"E1".into(), "ANALYST", "TECH", "hr")
//!     .await?;
//! assert_eq!(batch.granted, 1);
//! # Ok(())
//! # }
//! ```

pub mod clock;
pub mod config;
pub mod engine;
pub mod error;
pub mod services;

// Re-export commonly used types
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{ClockSource, EngineConfig};
pub use engine::AccessGovernance;
pub use error::{GovernanceError, Result};
pub use services::{
    AccessChange, AccessDelta, AccessProjector, AppendOutcome, BatchResult, CurrentAccess,
    EffectiveAccess, HeadcountService, HeldAccess, LedgerProjectionReport, LedgerService,
    LifecycleEngine, PolicyResolver, ProjectedAccess, QualityReview, ReconciliationReport,
    ReconciliationRun, Reporter, ReportSummary, RunTotals, SkipReason, SkippedTicket,
    StoreDeadline, TicketWriter,
};
