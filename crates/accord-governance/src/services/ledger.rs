//! Ledger status updates and history queries.
//!
//! Events are never deleted and never edited beyond their status, closing
//! date and quality fields. Status moves along
//! `Pending → In-Progress → {Completed, Cancelled, Rejected}`, with `Pending`
//! also allowed to jump straight to a terminal status.

use std::sync::Arc;

use accord_core::{CaseId, LedgerEvent, LedgerStatus, LedgerStatusUpdate, ScotiaId, Store};
use serde::{Deserialize, Serialize};

use crate::clock::Clock;
use crate::error::{GovernanceError, Result};
use crate::services::deadline::StoreDeadline;

/// Quality review attached to a ledger event.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QualityReview {
    pub quality_status: Option<String>,
    pub quality_comment: Option<String>,
}

/// Ledger maintenance for the operators working the tickets.
pub struct LedgerService {
    store: Arc<dyn Store>,
    clock: Arc<dyn Clock>,
    deadline: StoreDeadline,
}

impl LedgerService {
    /// Create a new ledger service.
    pub fn new(store: Arc<dyn Store>, clock: Arc<dyn Clock>, deadline: StoreDeadline) -> Self {
        Self {
            store,
            clock,
            deadline,
        }
    }

    /// Move an event to `status` and attach an optional quality review.
    ///
    /// Re-applying the current status only records the review, if any.
    /// Entering a terminal status stamps `closing_date`.
    ///
    /// # Errors
    ///
    /// `LedgerEventNotFound`, `InvalidStatusTransition`, or a store error.
    pub async fn update_status(
        &self,
        event_id: i64,
        status: LedgerStatus,
        review: Option<QualityReview>,
    ) -> Result<LedgerEvent> {
        let mut tx = self.deadline.run(self.store.begin()).await?;
        let current = self
            .deadline
            .run(tx.get_ledger_event(event_id))
            .await?
            .ok_or(GovernanceError::LedgerEventNotFound(event_id))?;

        let same_status = current.status == status;
        if !same_status && !current.status.can_transition_to(status) {
            return Err(GovernanceError::InvalidStatusTransition {
                from: current.status,
                to: status,
            });
        }
        if same_status && review.is_none() {
            return Ok(current);
        }

        let mut update = LedgerStatusUpdate::status(status);
        if !same_status && status.is_terminal() {
            update.closing_date = Some(self.clock.record_date());
        }
        if let Some(review) = review {
            update.quality_status = review.quality_status;
            update.quality_comment = review.quality_comment;
        }

        let updated = self
            .deadline
            .run(tx.update_ledger_status(event_id, &update))
            .await?
            .ok_or(GovernanceError::LedgerEventNotFound(event_id))?;
        self.deadline.run(tx.commit()).await?;

        tracing::info!(
            ledger_id = event_id,
            case_id = %updated.case_id,
            from = %current.status,
            to = %updated.status,
            "Ledger status updated"
        );
        Ok(updated)
    }

    /// Apply `status` to every event of a case that can take it.
    ///
    /// Events already in `status` or unable to transition are left alone.
    pub async fn update_case_status(
        &self,
        case_id: &CaseId,
        status: LedgerStatus,
    ) -> Result<Vec<LedgerEvent>> {
        let mut tx = self.deadline.run(self.store.begin()).await?;
        let events = self.deadline.run(tx.list_ledger_for_case(case_id)).await?;

        let mut update = LedgerStatusUpdate::status(status);
        if status.is_terminal() {
            update.closing_date = Some(self.clock.record_date());
        }

        let mut updated = Vec::new();
        for event in events {
            if !event.status.can_transition_to(status) {
                continue;
            }
            if let Some(event) = self
                .deadline
                .run(tx.update_ledger_status(event.id, &update))
                .await?
            {
                updated.push(event);
            }
        }
        self.deadline.run(tx.commit()).await?;

        tracing::info!(
            case_id = %case_id,
            status = %status,
            updated = updated.len(),
            "Case status updated"
        );
        Ok(updated)
    }

    /// Fetch one event.
    pub async fn get(&self, event_id: i64) -> Result<Option<LedgerEvent>> {
        let mut tx = self.deadline.run(self.store.begin()).await?;
        let event = self.deadline.run(tx.get_ledger_event(event_id)).await?;
        self.deadline.run(tx.commit()).await?;
        Ok(event)
    }

    /// Every event of an employee, newest first.
    pub async fn history(&self, scotia_id: &ScotiaId) -> Result<Vec<LedgerEvent>> {
        self.deadline.run(self.store.list_ledger_for(scotia_id)).await
    }

    /// Every event of a case, in insertion order.
    pub async fn case_events(&self, case_id: &CaseId) -> Result<Vec<LedgerEvent>> {
        let mut tx = self.deadline.run(self.store.begin()).await?;
        let events = self.deadline.run(tx.list_ledger_for_case(case_id)).await?;
        self.deadline.run(tx.commit()).await?;
        Ok(events)
    }
}
