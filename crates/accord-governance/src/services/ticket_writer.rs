//! Ticket writer: the only producer of ledger events.
//!
//! Before inserting, the writer looks for an event with the same
//! `(scotia_id, app, role, process_access, direction, status)` recorded
//! inside the deduplication window, then for one with the same
//! `(scotia_id, app, role, process_access, direction)` in the same case.
//! Either match skips the insert.

use std::fmt;

use accord_core::{LedgerEvent, NewLedgerEvent, StoreTransaction};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::services::deadline::StoreDeadline;

// ============================================================================
// Outcomes
// ============================================================================

/// Why a ticket was not inserted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SkipReason {
    /// A matching event exists inside the deduplication window.
    DuplicateWithinWindow {
        /// Window length in seconds.
        window_secs: i64,
    },
    /// A matching event exists in the same case.
    DuplicateInCase,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DuplicateWithinWindow { window_secs } if window_secs % 3600 == 0 => {
                write!(f, "duplicate within {}h", window_secs / 3600)
            }
            Self::DuplicateWithinWindow { window_secs } => {
                write!(f, "duplicate within {window_secs}s")
            }
            Self::DuplicateInCase => f.write_str("duplicate in case"),
        }
    }
}

/// Result of [`TicketWriter::append`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppendOutcome {
    /// The event was stored.
    Inserted(LedgerEvent),
    /// The event was a duplicate and nothing was stored.
    Skipped(SkipReason),
}

impl AppendOutcome {
    #[must_use]
    pub fn is_inserted(&self) -> bool {
        matches!(self, Self::Inserted(_))
    }
}

// ============================================================================
// Writer
// ============================================================================

/// Whether two events address the same ticket, ignoring status and time.
fn same_ticket(existing: &LedgerEvent, ticket: &NewLedgerEvent) -> bool {
    existing.scotia_id == ticket.scotia_id
        && existing.app_access_name == ticket.app_access_name
        && existing.role_name == ticket.role_name
        && existing.process_access == ticket.process_access
        && existing.direction() == ticket.direction()
}

/// Appends ledger events under the deduplication discipline.
#[derive(Debug, Clone, Copy)]
pub struct TicketWriter {
    dedup_window: Duration,
    deadline: StoreDeadline,
}

impl TicketWriter {
    /// A writer with the given window. A non-positive window disables the
    /// time-based check.
    #[must_use]
    pub fn new(dedup_window: Duration, deadline: StoreDeadline) -> Self {
        Self {
            dedup_window,
            deadline,
        }
    }

    /// The configured deduplication window.
    #[must_use]
    pub fn dedup_window(&self) -> Duration {
        self.dedup_window
    }

    /// Append `ticket` unless it duplicates an existing event.
    ///
    /// `now` anchors the window; it is normally the ticket's `record_date`.
    pub async fn append(
        &self,
        tx: &mut dyn StoreTransaction,
        ticket: &NewLedgerEvent,
        now: DateTime<Utc>,
    ) -> Result<AppendOutcome> {
        if let Some(reason) = self.find_duplicate(tx, ticket, now).await? {
            tracing::info!(
                scotia_id = %ticket.scotia_id,
                case_id = %ticket.case_id,
                access = %ticket.access_key(),
                process = %ticket.process_access,
                reason = %reason,
                "Ticket skipped"
            );
            return Ok(AppendOutcome::Skipped(reason));
        }

        let event = self.deadline.run(tx.insert_ledger(ticket)).await?;
        tracing::debug!(
            ledger_id = event.id,
            scotia_id = %event.scotia_id,
            case_id = %event.case_id,
            access = %event.access_key(),
            direction = %event.direction(),
            "Ticket appended"
        );
        Ok(AppendOutcome::Inserted(event))
    }

    async fn find_duplicate(
        &self,
        tx: &mut dyn StoreTransaction,
        ticket: &NewLedgerEvent,
        now: DateTime<Utc>,
    ) -> Result<Option<SkipReason>> {
        if self.dedup_window > Duration::zero() {
            let recent = self
                .deadline
                .run(tx.find_recent_ledger(
                    &ticket.scotia_id,
                    &ticket.app_access_name,
                    ticket.process_access,
                    self.dedup_window,
                    now,
                ))
                .await?;
            if recent
                .iter()
                .any(|e| same_ticket(e, ticket) && e.status == ticket.status)
            {
                return Ok(Some(SkipReason::DuplicateWithinWindow {
                    window_secs: self.dedup_window.num_seconds(),
                }));
            }
        }

        let in_case = self
            .deadline
            .run(tx.list_ledger_for_case(&ticket.case_id))
            .await?;
        if in_case.iter().any(|e| same_ticket(e, ticket)) {
            return Ok(Some(SkipReason::DuplicateInCase));
        }

        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use accord_core::{
        CaseId, Employee, InMemoryStore, LedgerStatus, ProcessAccess, ScotiaId, Store, UpsertMode,
    };
    use chrono::TimeZone;

    fn at(hours: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 8, 0, 0).unwrap() + Duration::hours(hours)
    }

    fn ticket(
        case_at: DateTime<Utc>,
        record_date: DateTime<Utc>,
        role: Option<&str>,
    ) -> NewLedgerEvent {
        let scotia_id = ScotiaId::from("E1");
        NewLedgerEvent {
            case_id: CaseId::generate(case_at, &scotia_id),
            scotia_id,
            process_access: ProcessAccess::Onboarding,
            app_access_name: "JIRA".into(),
            role_name: role.map(str::to_string),
            status: LedgerStatus::Pending,
            record_date,
            responsible: "hr".into(),
            description: None,
        }
    }

    async fn store() -> InMemoryStore {
        let store = InMemoryStore::new();
        store
            .upsert_employee(
                &Employee::new("E1", "Ada", "ada@example.com", "ANALYST", "TECH"),
                UpsertMode::Insert,
            )
            .await
            .unwrap();
        store
    }

    fn writer(hours: i64) -> TicketWriter {
        TicketWriter::new(Duration::hours(hours), StoreDeadline::default())
    }

    #[test]
    fn test_skip_reason_display() {
        let reason = SkipReason::DuplicateWithinWindow { window_secs: 86_400 };
        assert_eq!(reason.to_string(), "duplicate within 24h");
        let reason = SkipReason::DuplicateWithinWindow { window_secs: 90 };
        assert_eq!(reason.to_string(), "duplicate within 90s");
        assert_eq!(SkipReason::DuplicateInCase.to_string(), "duplicate in case");
    }

    #[tokio::test]
    async fn test_duplicate_within_window_is_skipped() {
        let store = store().await;
        let writer = writer(24);
        let mut tx = store.begin().await.unwrap();

        let first = ticket(at(0), at(0), Some("Viewer"));
        assert!(writer.append(tx.as_mut(), &first, at(0)).await.unwrap().is_inserted());

        let again = ticket(at(23), at(23), Some("Viewer"));
        let outcome = writer.append(tx.as_mut(), &again, at(23)).await.unwrap();
        assert_eq!(
            outcome,
            AppendOutcome::Skipped(SkipReason::DuplicateWithinWindow { window_secs: 86_400 })
        );

        let later = ticket(at(25), at(25), Some("Viewer"));
        assert!(writer.append(tx.as_mut(), &later, at(25)).await.unwrap().is_inserted());
        tx.commit().await.unwrap();

        assert_eq!(store.ledger_len().await, 2);
    }

    #[tokio::test]
    async fn test_other_role_is_not_a_duplicate() {
        let store = store().await;
        let writer = writer(24);
        let mut tx = store.begin().await.unwrap();

        let viewer = ticket(at(0), at(0), Some("Viewer"));
        let admin = ticket(at(0), at(0), Some("Admin"));
        let no_role = ticket(at(0), at(0), None);
        for t in [&viewer, &admin, &no_role] {
            assert!(writer.append(tx.as_mut(), t, at(0)).await.unwrap().is_inserted());
        }
        tx.commit().await.unwrap();
        assert_eq!(store.ledger_len().await, 3);
    }

    #[tokio::test]
    async fn test_other_status_within_window_is_not_a_duplicate() {
        let store = store().await;
        let writer = writer(24);
        let mut tx = store.begin().await.unwrap();

        let mut completed = ticket(at(0), at(0), None);
        completed.status = LedgerStatus::Completed;
        assert!(writer.append(tx.as_mut(), &completed, at(0)).await.unwrap().is_inserted());

        let pending = ticket(at(1), at(1), None);
        assert!(writer.append(tx.as_mut(), &pending, at(1)).await.unwrap().is_inserted());
    }

    #[tokio::test]
    async fn test_in_case_duplicate_with_window_disabled() {
        let store = store().await;
        let writer = writer(0);
        let mut tx = store.begin().await.unwrap();

        let first = ticket(at(0), at(0), None);
        assert!(writer.append(tx.as_mut(), &first, at(0)).await.unwrap().is_inserted());

        let mut cancelled = ticket(at(0), at(0), None);
        cancelled.status = LedgerStatus::Cancelled;
        let outcome = writer.append(tx.as_mut(), &cancelled, at(0)).await.unwrap();
        assert_eq!(outcome, AppendOutcome::Skipped(SkipReason::DuplicateInCase));

        let next_case = ticket(at(1), at(1), None);
        assert!(writer.append(tx.as_mut(), &next_case, at(1)).await.unwrap().is_inserted());
    }

    #[tokio::test]
    async fn test_insert_failure_propagates() {
        let store = store().await;
        store.fail_ledger_inserts_after(0);
        let mut tx = store.begin().await.unwrap();

        let err = writer(24)
            .append(tx.as_mut(), &ticket(at(0), at(0), None), at(0))
            .await
            .unwrap_err();
        assert!(err.is_retryable());
    }
}
