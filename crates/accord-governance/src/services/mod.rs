//! Service layer for access reconciliation.
//!
//! Pure pieces (projection, policy targets, deltas) sit next to the
//! store-backed services that drive them.

pub mod deadline;
pub mod headcount;
pub mod ledger;
pub mod lifecycle;
pub mod policy;
pub mod projector;
pub mod reconciler;
pub mod reporter;
pub mod ticket_writer;

// Re-export commonly used types
pub use deadline::StoreDeadline;
pub use headcount::HeadcountService;
pub use ledger::{LedgerService, QualityReview};
pub use lifecycle::{BatchResult, LifecycleEngine, SkippedTicket};
pub use policy::{target_of, PolicyResolver};
pub use projector::{project, AccessProjector, EffectiveAccess, HeldAccess};
pub use reconciler::{reconcile, AccessDelta};
pub use reporter::{
    AccessChange, CurrentAccess, LedgerProjectionReport, ProjectedAccess, ReconciliationReport,
    ReconciliationRun, Reporter, ReportSummary, RunTotals,
};
pub use ticket_writer::{AppendOutcome, SkipReason, TicketWriter};
