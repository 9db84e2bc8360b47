//! Lifecycle engine.
//!
//! Each process runs in one store transaction under one case id: the
//! employee read, policy reads, effective-access read, ticket inserts and
//! the employee mutation either all commit or all roll back. Revokes are
//! emitted before grants, each in `(app, role)` order.

use std::collections::BTreeSet;
use std::sync::Arc;

use accord_core::{
    AccessDirection, AccessKey, CaseId, Employee, LedgerEvent, LedgerStatus, NewLedgerEvent,
    ProcessAccess, ScotiaId, Store, StoreTransaction, GRANT_PREFIX, REVOKE_PREFIX,
};
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::clock::Clock;
use crate::error::{GovernanceError, Result};
use crate::services::deadline::StoreDeadline;
use crate::services::policy::{application_exists, resolve_target};
use crate::services::projector::read_effective;
use crate::services::reconciler::{reconcile, MISSING_ACCESS, NOT_AUTHORIZED};
use crate::services::ticket_writer::{AppendOutcome, SkipReason, TicketWriter};

// ============================================================================
// Batch result
// ============================================================================

/// A ticket the writer declined.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedTicket {
    pub ticket: NewLedgerEvent,
    pub reason: SkipReason,
}

/// Outcome of one lifecycle invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BatchResult {
    pub case_id: CaseId,
    pub process_access: ProcessAccess,
    /// Inserted grant events.
    pub granted: usize,
    /// Inserted revoke events.
    pub revoked: usize,
    /// Tickets skipped as duplicates.
    pub skipped: usize,
    /// Inserted events in emission order.
    pub inserted: Vec<LedgerEvent>,
    pub skipped_tickets: Vec<SkippedTicket>,
}

impl BatchResult {
    fn new(case_id: CaseId, process_access: ProcessAccess) -> Self {
        Self {
            case_id,
            process_access,
            granted: 0,
            revoked: 0,
            skipped: 0,
            inserted: Vec::new(),
            skipped_tickets: Vec::new(),
        }
    }

    fn record(&mut self, ticket: NewLedgerEvent, outcome: AppendOutcome) {
        match outcome {
            AppendOutcome::Inserted(event) => {
                match event.direction() {
                    AccessDirection::Grant => self.granted += 1,
                    AccessDirection::Revoke => self.revoked += 1,
                }
                self.inserted.push(event);
            }
            AppendOutcome::Skipped(reason) => {
                self.skipped += 1;
                self.skipped_tickets.push(SkippedTicket { ticket, reason });
            }
        }
    }

    /// Number of tickets considered.
    #[must_use]
    pub fn total(&self) -> usize {
        self.inserted.len() + self.skipped
    }
}

// ============================================================================
// Invocation
// ============================================================================

/// Fixed inputs shared by every ticket of one invocation.
struct Invocation {
    scotia_id: ScotiaId,
    case_id: CaseId,
    process_access: ProcessAccess,
    responsible: String,
    now: DateTime<Utc>,
}

impl Invocation {
    fn ticket(&self, key: &AccessKey, description: String) -> NewLedgerEvent {
        NewLedgerEvent {
            scotia_id: self.scotia_id.clone(),
            case_id: self.case_id.clone(),
            process_access: self.process_access,
            app_access_name: key.app_access_name.clone(),
            role_name: key.role_name.clone(),
            status: LedgerStatus::Pending,
            record_date: self.now,
            responsible: self.responsible.clone(),
            description: Some(description),
        }
    }

    fn batch(&self) -> BatchResult {
        BatchResult::new(self.case_id.clone(), self.process_access)
    }
}

fn require_active(employee: &Employee) -> Result<()> {
    if employee.active {
        Ok(())
    } else {
        Err(GovernanceError::EmployeeInactive(employee.scotia_id.clone()))
    }
}

// ============================================================================
// Engine
// ============================================================================

/// Orchestrates onboarding, lateral movement, offboarding, manual access
/// and conciliation.
pub struct LifecycleEngine {
    store: Arc<dyn Store>,
    clock: Arc<dyn Clock>,
    writer: TicketWriter,
    deadline: StoreDeadline,
}

impl LifecycleEngine {
    /// Create a new lifecycle engine.
    pub fn new(
        store: Arc<dyn Store>,
        clock: Arc<dyn Clock>,
        writer: TicketWriter,
        deadline: StoreDeadline,
    ) -> Self {
        Self {
            store,
            clock,
            writer,
            deadline,
        }
    }

    /// Grant the policy of `(unit, position)` to a new hire.
    ///
    /// Records the placement on the employee when it differs.
    ///
    /// # Errors
    ///
    /// `EmployeeNotFound`, `EmployeeInactive`, `NoPolicyForPosition`, or a
    /// store error. Nothing is persisted on error.
    pub async fn onboarding(
        &self,
        scotia_id: &ScotiaId,
        position: &str,
        unit: &str,
        responsible: &str,
    ) -> Result<BatchResult> {
        let inv = self.open(scotia_id, ProcessAccess::Onboarding, responsible);
        let mut tx = self.deadline.run(self.store.begin()).await?;
        let outcome = self.onboard_in(tx.as_mut(), &inv, position, unit).await;
        self.finish(tx, &inv, outcome).await
    }

    /// Move an employee to a new placement, revoking what the old placement
    /// granted and granting what the new one adds.
    ///
    /// # Errors
    ///
    /// `EmployeeNotFound`, `EmployeeInactive`, or a store error.
    pub async fn lateral_movement(
        &self,
        scotia_id: &ScotiaId,
        new_position: &str,
        new_unit: &str,
        responsible: &str,
    ) -> Result<BatchResult> {
        let inv = self.open(scotia_id, ProcessAccess::LateralMovement, responsible);
        let mut tx = self.deadline.run(self.store.begin()).await?;
        let outcome = self
            .move_in(tx.as_mut(), &inv, new_position, new_unit)
            .await;
        self.finish(tx, &inv, outcome).await
    }

    /// Revoke everything an employee holds and deactivate them.
    ///
    /// Offboarding an already inactive employee is a benign no-op apart from
    /// revoking anything still held.
    ///
    /// # Errors
    ///
    /// `EmployeeNotFound` or a store error.
    pub async fn offboarding(
        &self,
        scotia_id: &ScotiaId,
        responsible: &str,
    ) -> Result<BatchResult> {
        let inv = self.open(scotia_id, ProcessAccess::Offboarding, responsible);
        let mut tx = self.deadline.run(self.store.begin()).await?;
        let outcome = self.offboard_in(tx.as_mut(), &inv).await;
        self.finish(tx, &inv, outcome).await
    }

    /// Grant one application outside the policy matrix.
    ///
    /// # Errors
    ///
    /// `EmployeeNotFound`, `EmployeeInactive`, `UnknownApplication`, or a
    /// store error.
    pub async fn manual_access(
        &self,
        scotia_id: &ScotiaId,
        app_access_name: &str,
        role_name: Option<&str>,
        responsible: &str,
        description: Option<&str>,
    ) -> Result<BatchResult> {
        let inv = self.open(scotia_id, ProcessAccess::ManualAccess, responsible);
        let mut tx = self.deadline.run(self.store.begin()).await?;
        let key = AccessKey::new(app_access_name, role_name);
        let outcome = self.grant_manual_in(tx.as_mut(), &inv, &key, description).await;
        self.finish(tx, &inv, outcome).await
    }

    /// Persist the reconciliation delta of an employee as tickets.
    ///
    /// Inactive employees have an empty target, so everything they still
    /// hold is revoked.
    ///
    /// # Errors
    ///
    /// `EmployeeNotFound` or a store error.
    pub async fn conciliate(&self, scotia_id: &ScotiaId, responsible: &str) -> Result<BatchResult> {
        let inv = self.open(scotia_id, ProcessAccess::LateralMovement, responsible);
        let mut tx = self.deadline.run(self.store.begin()).await?;
        let outcome = self.conciliate_in(tx.as_mut(), &inv).await;
        self.finish(tx, &inv, outcome).await
    }

    // ------------------------------------------------------------------
    // Flows
    // ------------------------------------------------------------------

    async fn onboard_in(
        &self,
        tx: &mut dyn StoreTransaction,
        inv: &Invocation,
        position: &str,
        unit: &str,
    ) -> Result<BatchResult> {
        let employee = self.load_employee(tx, &inv.scotia_id).await?;
        require_active(&employee)?;

        let target = resolve_target(tx, self.deadline, unit, position).await?;
        if target.is_empty() {
            return Err(GovernanceError::NoPolicyForPosition {
                unit: unit.to_string(),
                position: position.to_string(),
            });
        }

        self.place(tx, &employee, position, unit).await?;

        let description = format!("{GRANT_PREFIX} Onboarding as {position} in {unit}");
        let mut batch = inv.batch();
        self.emit_all(tx, inv, &mut batch, &target, &description).await?;
        Ok(batch)
    }

    async fn move_in(
        &self,
        tx: &mut dyn StoreTransaction,
        inv: &Invocation,
        new_position: &str,
        new_unit: &str,
    ) -> Result<BatchResult> {
        let employee = self.load_employee(tx, &inv.scotia_id).await?;
        require_active(&employee)?;

        let old_target =
            resolve_target(tx, self.deadline, &employee.unit, &employee.position).await?;
        let new_target = resolve_target(tx, self.deadline, new_unit, new_position).await?;
        let to_revoke: BTreeSet<AccessKey> =
            old_target.difference(&new_target).cloned().collect();
        let to_grant: BTreeSet<AccessKey> = new_target.difference(&old_target).cloned().collect();

        let mut batch = inv.batch();
        let revoke = format!(
            "{REVOKE_PREFIX} Leaving {} in {}",
            employee.position, employee.unit
        );
        self.emit_all(tx, inv, &mut batch, &to_revoke, &revoke).await?;
        let grant = format!("{GRANT_PREFIX} Moving to {new_position} in {new_unit}");
        self.emit_all(tx, inv, &mut batch, &to_grant, &grant).await?;

        self.place(tx, &employee, new_position, new_unit).await?;
        Ok(batch)
    }

    async fn offboard_in(
        &self,
        tx: &mut dyn StoreTransaction,
        inv: &Invocation,
    ) -> Result<BatchResult> {
        let employee = self.load_employee(tx, &inv.scotia_id).await?;
        let effective = read_effective(tx, self.deadline, &inv.scotia_id).await?;

        let description = format!("{REVOKE_PREFIX} Offboarding");
        let mut batch = inv.batch();
        self.emit_all(tx, inv, &mut batch, &effective.keys(), &description)
            .await?;

        self.deadline
            .run(tx.set_employee_inactive(&inv.scotia_id, inv.now))
            .await?;
        if employee.active {
            tracing::info!(
                scotia_id = %inv.scotia_id,
                case_id = %inv.case_id,
                "Employee deactivated"
            );
        } else {
            tracing::info!(
                scotia_id = %inv.scotia_id,
                case_id = %inv.case_id,
                "Employee already inactive"
            );
        }
        Ok(batch)
    }

    async fn grant_manual_in(
        &self,
        tx: &mut dyn StoreTransaction,
        inv: &Invocation,
        key: &AccessKey,
        description: Option<&str>,
    ) -> Result<BatchResult> {
        let employee = self.load_employee(tx, &inv.scotia_id).await?;
        require_active(&employee)?;

        if !application_exists(tx, self.deadline, &key.app_access_name).await? {
            return Err(GovernanceError::UnknownApplication(
                key.app_access_name.clone(),
            ));
        }

        let description = description.map_or_else(
            || format!("{GRANT_PREFIX} Manual access requested by {}", inv.responsible),
            str::to_string,
        );
        let mut batch = inv.batch();
        self.emit(tx, &mut batch, inv.ticket(key, description), inv.now)
            .await?;
        Ok(batch)
    }

    async fn conciliate_in(
        &self,
        tx: &mut dyn StoreTransaction,
        inv: &Invocation,
    ) -> Result<BatchResult> {
        let employee = self.load_employee(tx, &inv.scotia_id).await?;
        let effective = read_effective(tx, self.deadline, &inv.scotia_id).await?;
        let target = if employee.active {
            resolve_target(tx, self.deadline, &employee.unit, &employee.position).await?
        } else {
            BTreeSet::new()
        };
        let delta = reconcile(&effective.keys(), &target);

        let mut batch = inv.batch();
        let revoke = format!("{REVOKE_PREFIX} {NOT_AUTHORIZED}");
        self.emit_all(tx, inv, &mut batch, &delta.to_revoke, &revoke)
            .await?;
        let grant = format!("{GRANT_PREFIX} {MISSING_ACCESS}");
        self.emit_all(tx, inv, &mut batch, &delta.to_grant, &grant)
            .await?;
        Ok(batch)
    }

    // ------------------------------------------------------------------
    // Helpers
    // ------------------------------------------------------------------

    fn open(
        &self,
        scotia_id: &ScotiaId,
        process_access: ProcessAccess,
        responsible: &str,
    ) -> Invocation {
        let now = self.clock.record_date();
        let case_id = CaseId::generate(now, scotia_id);
        tracing::info!(
            scotia_id = %scotia_id,
            case_id = %case_id,
            process = %process_access,
            responsible = %responsible,
            "Case opened"
        );
        Invocation {
            scotia_id: scotia_id.clone(),
            case_id,
            process_access,
            responsible: responsible.to_string(),
            now,
        }
    }

    async fn finish(
        &self,
        tx: Box<dyn StoreTransaction>,
        inv: &Invocation,
        outcome: Result<BatchResult>,
    ) -> Result<BatchResult> {
        match outcome {
            Ok(batch) => {
                self.deadline.run(tx.commit()).await?;
                tracing::info!(
                    scotia_id = %inv.scotia_id,
                    case_id = %inv.case_id,
                    process = %inv.process_access,
                    granted = batch.granted,
                    revoked = batch.revoked,
                    skipped = batch.skipped,
                    "Case committed"
                );
                Ok(batch)
            }
            Err(err) => {
                if let Err(rollback_err) = self.deadline.run(tx.rollback()).await {
                    tracing::warn!(
                        case_id = %inv.case_id,
                        error = %rollback_err,
                        "Rollback failed"
                    );
                }
                tracing::warn!(
                    scotia_id = %inv.scotia_id,
                    case_id = %inv.case_id,
                    process = %inv.process_access,
                    error = %err,
                    "Case aborted"
                );
                Err(err)
            }
        }
    }

    async fn load_employee(
        &self,
        tx: &mut dyn StoreTransaction,
        scotia_id: &ScotiaId,
    ) -> Result<Employee> {
        self.deadline
            .run(tx.get_employee(scotia_id))
            .await?
            .ok_or_else(|| GovernanceError::EmployeeNotFound(scotia_id.clone()))
    }

    /// Record a placement on the employee if it changed.
    async fn place(
        &self,
        tx: &mut dyn StoreTransaction,
        employee: &Employee,
        position: &str,
        unit: &str,
    ) -> Result<()> {
        if employee.position == position && employee.unit == unit {
            return Ok(());
        }
        self.deadline
            .run(tx.update_employee_position(&employee.scotia_id, position, unit))
            .await?;
        tracing::info!(
            scotia_id = %employee.scotia_id,
            from_position = %employee.position,
            from_unit = %employee.unit,
            to_position = %position,
            to_unit = %unit,
            "Employee placement updated"
        );
        Ok(())
    }

    async fn emit_all(
        &self,
        tx: &mut dyn StoreTransaction,
        inv: &Invocation,
        batch: &mut BatchResult,
        keys: &BTreeSet<AccessKey>,
        description: &str,
    ) -> Result<()> {
        for key in keys {
            let ticket = inv.ticket(key, description.to_string());
            self.emit(tx, batch, ticket, inv.now).await?;
        }
        Ok(())
    }

    async fn emit(
        &self,
        tx: &mut dyn StoreTransaction,
        batch: &mut BatchResult,
        ticket: NewLedgerEvent,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let outcome = self.writer.append(tx, &ticket, now).await?;
        batch.record(ticket, outcome);
        Ok(())
    }
}
