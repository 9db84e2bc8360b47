//! Reconciliation and ledger-projection reports.
//!
//! Reports are values for external consumers (spreadsheet exports,
//! dashboards). Field names are stable; optional fields may be absent.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use accord_core::{
    AccessKey, CaseId, Employee, LedgerEvent, ScotiaId, Store, StoreTransaction,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::clock::Clock;
use crate::error::{GovernanceError, Result};
use crate::services::deadline::StoreDeadline;
use crate::services::policy::resolve_target;
use crate::services::projector::{project, EffectiveAccess};
use crate::services::reconciler::{reconcile, MISSING_ACCESS, NOT_AUTHORIZED};

// ============================================================================
// Report types
// ============================================================================

/// An access currently held.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CurrentAccess {
    pub app_access_name: String,
    pub role_name: Option<String>,
    pub granted_at: DateTime<Utc>,
}

/// A change needed to conform to policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessChange {
    pub app_access_name: String,
    pub role_name: Option<String>,
    pub reason: String,
}

impl AccessChange {
    fn new(key: &AccessKey, reason: &str) -> Self {
        Self {
            app_access_name: key.app_access_name.clone(),
            role_name: key.role_name.clone(),
            reason: reason.to_string(),
        }
    }
}

/// Counters of a [`ReconciliationReport`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportSummary {
    pub total_current: usize,
    pub total_required: usize,
    pub to_grant_count: usize,
    pub to_revoke_count: usize,
}

/// Effective versus target access of one employee.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconciliationReport {
    pub employee: Employee,
    pub current_access: Vec<CurrentAccess>,
    pub to_grant: Vec<AccessChange>,
    pub to_revoke: Vec<AccessChange>,
    #[serde(default)]
    pub keep: Vec<AccessKey>,
    pub summary: ReportSummary,
    pub generated_at: DateTime<Utc>,
}

impl ReconciliationReport {
    /// Whether the employee's access differs from policy.
    #[must_use]
    pub fn has_drift(&self) -> bool {
        self.summary.to_grant_count > 0 || self.summary.to_revoke_count > 0
    }
}

/// An access currently held, with the event that conferred it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectedAccess {
    pub app_access_name: String,
    pub role_name: Option<String>,
    pub granted_at: DateTime<Utc>,
    pub case_id: CaseId,
}

/// An employee's ledger with its projection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerProjectionReport {
    pub employee: Employee,
    /// Newest first.
    pub events: Vec<LedgerEvent>,
    pub effective: Vec<ProjectedAccess>,
    pub by_status: BTreeMap<String, usize>,
    pub by_process: BTreeMap<String, usize>,
    pub generated_at: DateTime<Utc>,
}

/// Totals of a [`ReconciliationRun`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunTotals {
    pub employees: usize,
    pub with_drift: usize,
    pub to_grant: usize,
    pub to_revoke: usize,
}

/// Reconciliation reports of every employee from one snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconciliationRun {
    pub run_id: Uuid,
    pub generated_at: DateTime<Utc>,
    pub reports: Vec<ReconciliationReport>,
    pub totals: RunTotals,
}

// ============================================================================
// Builders
// ============================================================================

/// Assemble a reconciliation report from projector and resolver outputs.
///
/// Inactive employees have an empty target.
#[must_use]
pub fn build_report(
    employee: Employee,
    effective: &EffectiveAccess,
    target: &BTreeSet<AccessKey>,
    generated_at: DateTime<Utc>,
) -> ReconciliationReport {
    let delta = reconcile(&effective.keys(), target);

    let current_access: Vec<CurrentAccess> = effective
        .iter()
        .map(|held| CurrentAccess {
            app_access_name: held.app_access_name.clone(),
            role_name: held.role_name.clone(),
            granted_at: held.granted_at,
        })
        .collect();
    let to_grant: Vec<AccessChange> = delta
        .to_grant
        .iter()
        .map(|key| AccessChange::new(key, MISSING_ACCESS))
        .collect();
    let to_revoke: Vec<AccessChange> = delta
        .to_revoke
        .iter()
        .map(|key| AccessChange::new(key, NOT_AUTHORIZED))
        .collect();

    let summary = ReportSummary {
        total_current: current_access.len(),
        total_required: target.len(),
        to_grant_count: to_grant.len(),
        to_revoke_count: to_revoke.len(),
    };

    ReconciliationReport {
        employee,
        current_access,
        to_grant,
        to_revoke,
        keep: delta.keep.into_iter().collect(),
        summary,
        generated_at,
    }
}

/// Assemble a ledger projection report. `events` must be the employee's
/// full ledger.
#[must_use]
pub fn build_projection(
    employee: Employee,
    events: Vec<LedgerEvent>,
    generated_at: DateTime<Utc>,
) -> LedgerProjectionReport {
    let effective = project(&events)
        .iter()
        .map(|held| ProjectedAccess {
            app_access_name: held.app_access_name.clone(),
            role_name: held.role_name.clone(),
            granted_at: held.granted_at,
            case_id: held.case_id.clone(),
        })
        .collect();

    let mut by_status = BTreeMap::new();
    let mut by_process = BTreeMap::new();
    for event in &events {
        *by_status.entry(event.status.to_string()).or_insert(0) += 1;
        *by_process
            .entry(event.process_access.to_string())
            .or_insert(0) += 1;
    }

    LedgerProjectionReport {
        employee,
        events,
        effective,
        by_status,
        by_process,
        generated_at,
    }
}

// ============================================================================
// Service
// ============================================================================

/// Read-only reporting over the store.
pub struct Reporter {
    store: Arc<dyn Store>,
    clock: Arc<dyn Clock>,
    deadline: StoreDeadline,
}

impl Reporter {
    /// Create a new reporter.
    pub fn new(store: Arc<dyn Store>, clock: Arc<dyn Clock>, deadline: StoreDeadline) -> Self {
        Self {
            store,
            clock,
            deadline,
        }
    }

    /// Reconciliation report of one employee.
    ///
    /// # Errors
    ///
    /// `EmployeeNotFound` or a store error.
    pub async fn reconciliation_report(
        &self,
        scotia_id: &ScotiaId,
    ) -> Result<ReconciliationReport> {
        let mut tx = self.deadline.run(self.store.begin()).await?;
        let employee = self
            .deadline
            .run(tx.get_employee(scotia_id))
            .await?
            .ok_or_else(|| GovernanceError::EmployeeNotFound(scotia_id.clone()))?;
        let report = self.report_in(tx.as_mut(), employee).await?;
        self.deadline.run(tx.commit()).await?;
        Ok(report)
    }

    /// Ledger and projection of one employee.
    ///
    /// # Errors
    ///
    /// `EmployeeNotFound` or a store error.
    pub async fn ledger_projection(
        &self,
        scotia_id: &ScotiaId,
    ) -> Result<LedgerProjectionReport> {
        let mut tx = self.deadline.run(self.store.begin()).await?;
        let employee = self
            .deadline
            .run(tx.get_employee(scotia_id))
            .await?
            .ok_or_else(|| GovernanceError::EmployeeNotFound(scotia_id.clone()))?;
        let events = self.deadline.run(tx.list_ledger_for(scotia_id)).await?;
        self.deadline.run(tx.commit()).await?;
        Ok(build_projection(employee, events, self.clock.now()))
    }

    /// Reconciliation reports of every employee, read in one transaction.
    pub async fn reconcile_all(&self, active_only: bool) -> Result<ReconciliationRun> {
        let run_id = Uuid::new_v4();
        tracing::info!(run_id = %run_id, active_only, "Reconciliation run started");

        let mut tx = self.deadline.run(self.store.begin()).await?;
        let employees = self.deadline.run(tx.list_employees(active_only)).await?;

        let mut reports = Vec::with_capacity(employees.len());
        let mut totals = RunTotals::default();
        for employee in employees {
            let report = self.report_in(tx.as_mut(), employee).await?;
            totals.employees += 1;
            totals.to_grant += report.summary.to_grant_count;
            totals.to_revoke += report.summary.to_revoke_count;
            if report.has_drift() {
                totals.with_drift += 1;
            }
            reports.push(report);
        }
        self.deadline.run(tx.commit()).await?;

        tracing::info!(
            run_id = %run_id,
            employees = totals.employees,
            with_drift = totals.with_drift,
            to_grant = totals.to_grant,
            to_revoke = totals.to_revoke,
            "Reconciliation run finished"
        );
        Ok(ReconciliationRun {
            run_id,
            generated_at: self.clock.now(),
            reports,
            totals,
        })
    }

    async fn report_in(
        &self,
        tx: &mut dyn StoreTransaction,
        employee: Employee,
    ) -> Result<ReconciliationReport> {
        let events = self
            .deadline
            .run(tx.list_ledger_for(&employee.scotia_id))
            .await?;
        let effective = project(&events);
        let target = if employee.active {
            resolve_target(tx, self.deadline, &employee.unit, &employee.position).await?
        } else {
            BTreeSet::new()
        };
        Ok(build_report(employee, &effective, &target, self.clock.now()))
    }
}
